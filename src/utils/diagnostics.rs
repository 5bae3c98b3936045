//! System Diagnostics and Status Reporting
//!
//! Startup information about the host and the memory the configured pools
//! can grow to.

use std::time::{Duration, Instant};

use sysinfo::System;
use tracing::{info, warn};

use crate::config::Config;
use crate::pipeline::BasicFeature;

/// System information for diagnostics
#[derive(Debug, Clone)]
pub struct SystemInfo {
    /// Operating system name (e.g., "Linux", "Ubuntu")
    pub os_name: String,
    /// Operating system version string
    pub os_version: String,

    /// Kernel version string
    pub kernel_version: String,

    /// Number of logical CPU cores
    pub cpu_count: usize,

    /// Total system memory in megabytes
    pub total_memory_mb: u64,

    /// Memory available for new allocations in megabytes
    pub available_memory_mb: u64,
}

impl SystemInfo {
    /// Gather system information
    pub fn gather() -> Self {
        let mut sys = System::new();
        sys.refresh_memory();
        sys.refresh_cpu();

        Self {
            os_name: System::name().unwrap_or_else(|| "Unknown".to_string()),
            os_version: System::os_version().unwrap_or_else(|| "Unknown".to_string()),
            kernel_version: System::kernel_version().unwrap_or_else(|| "Unknown".to_string()),
            cpu_count: sys.cpus().len(),
            total_memory_mb: sys.total_memory() / 1024 / 1024,
            available_memory_mb: sys.available_memory() / 1024 / 1024,
        }
    }

    /// Log system information
    pub fn log(&self) {
        info!("=== System Information ===");
        info!("  OS: {} {}", self.os_name, self.os_version);
        info!("  Kernel: {}", self.kernel_version);
        info!("  CPUs: {}", self.cpu_count);
        info!(
            "  Memory: {} MB ({} MB available)",
            self.total_memory_mb, self.available_memory_mb
        );
    }
}

/// Worst-case memory held by fully grown pools
#[derive(Debug, Clone, Default)]
pub struct PoolFootprint {
    /// Bytes for one slot's tracked buffers
    pub per_slot_bytes: usize,
    /// Slot count
    pub slots: usize,
    /// Tracked buffers across every slot
    pub tracked_bytes: usize,
}

impl PoolFootprint {
    /// Estimate for the session configured in `config`
    pub fn estimate(config: &Config) -> Self {
        let feature = BasicFeature::new(&config.session, &config.recycle);
        let per_slot_bytes = feature
            .tracked_buffer_params()
            .iter()
            .filter_map(|(_, params)| params.layout().ok())
            .map(|layout| layout.size)
            .sum();

        let slots = config.pool.max_ref_slots + config.pool.max_non_ref_slots;
        Self {
            per_slot_bytes,
            slots,
            tracked_bytes: per_slot_bytes * slots,
        }
    }

    pub fn tracked_mb(&self) -> f64 {
        self.tracked_bytes as f64 / (1024.0 * 1024.0)
    }
}

/// Wall-clock timer for a run
#[derive(Debug, Clone)]
pub struct RunTimer {
    start_time: Instant,
}

impl RunTimer {
    pub fn start() -> Self {
        Self {
            start_time: Instant::now(),
        }
    }

    pub fn elapsed(&self) -> Duration {
        self.start_time.elapsed()
    }

    /// Frames per second for `frames` encoded since start
    pub fn fps(&self, frames: u32) -> f64 {
        let secs = self.elapsed().as_secs_f64();
        if secs <= 0.0 {
            return 0.0;
        }
        frames as f64 / secs
    }
}

/// Log complete diagnostics on startup
pub fn log_startup_diagnostics(config: &Config) {
    info!("╔════════════════════════════════════════════════════════════╗");
    info!("║          Startup Diagnostics                              ║");
    info!("╚════════════════════════════════════════════════════════════╝");

    let sys_info = SystemInfo::gather();
    sys_info.log();

    let footprint = PoolFootprint::estimate(config);
    info!("=== Buffer Pools ===");
    info!(
        "  Slots: {} ({} reference + {} non-reference)",
        footprint.slots, config.pool.max_ref_slots, config.pool.max_non_ref_slots
    );
    info!("  Per slot: {} KB", footprint.per_slot_bytes / 1024);
    info!("  Tracked buffers (worst case): {:.1} MB", footprint.tracked_mb());

    if sys_info.available_memory_mb > 0
        && footprint.tracked_mb() > sys_info.available_memory_mb as f64
    {
        warn!(
            "Tracked buffers may need {:.1} MB but only {} MB is available",
            footprint.tracked_mb(),
            sys_info.available_memory_mb
        );
    }

    info!("  Version: {}", env!("CARGO_PKG_VERSION"));
    #[cfg(debug_assertions)]
    info!("  Build: debug");
    #[cfg(not(debug_assertions))]
    info!("  Build: release");
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::buffers::BufferType;

    #[test]
    fn test_system_info_gather() {
        let info = SystemInfo::gather();
        assert!(!info.os_name.is_empty());
        assert!(info.total_memory_mb > 0);
    }

    #[test]
    fn test_footprint_scales_with_slots() {
        let mut config = Config::default();
        let full = PoolFootprint::estimate(&config);
        assert_eq!(full.slots, 19);
        assert!(full.per_slot_bytes > 0);

        config.pool.max_ref_slots = 1;
        config.pool.max_non_ref_slots = 0;
        let single = PoolFootprint::estimate(&config);
        assert_eq!(single.tracked_bytes, full.per_slot_bytes);
    }

    #[test]
    fn test_footprint_matches_registered_params() {
        let config = Config::default();
        let params = BasicFeature::new(&config.session, &config.recycle).tracked_buffer_params();
        let expected: usize = params.iter().map(|(_, p)| p.layout().unwrap().size).sum();
        assert_eq!(PoolFootprint::estimate(&config).per_slot_bytes, expected);

        let compressible: Vec<_> = params
            .iter()
            .filter(|(_, p)| p.compressible)
            .map(|(buffer_type, _)| *buffer_type)
            .collect();
        assert_eq!(
            compressible,
            vec![BufferType::Ds4xSurface, BufferType::Ds8xSurface]
        );
    }

    #[test]
    fn test_run_timer() {
        let timer = RunTimer::start();
        assert!(timer.elapsed() < Duration::from_secs(5));
        assert!(timer.fps(0) >= 0.0);
    }
}
