//! Configuration type definitions

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Tracked buffer slot pool configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrackedBufferConfig {
    /// Slots available to frames used as references
    pub max_ref_slots: usize,

    /// Additional slots for non-reference frames in flight
    pub max_non_ref_slots: usize,

    /// How long `acquire` waits for a free slot (ms)
    pub wait_timeout_ms: u64,

    /// Release unreferenced slots only once the pool is full
    #[serde(default)]
    pub lazy_release: bool,
}

/// Recycled resource configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RecycleConfig {
    /// Cycle length for ids registered without an explicit limit
    pub default_limit: usize,

    /// Entries kept for PAK info buffers
    #[serde(default = "default_pak_info_limit")]
    pub pak_info_limit: usize,
}

fn default_pak_info_limit() -> usize {
    6
}

/// Simulated encode session
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionConfig {
    /// Frame width in pixels
    pub width: u32,

    /// Frame height in pixels
    pub height: u32,

    /// Frames to encode
    pub frames: u32,

    /// Keyframe interval (0 = only the first frame)
    pub gop_size: u32,

    /// Previous reference frames each frame may use
    pub num_ref_frames: usize,

    /// Every Nth frame is encoded as a non-reference frame (0 = never)
    #[serde(default)]
    pub non_ref_interval: u32,

    /// Frames allowed in flight on the hardware
    pub sync_depth: usize,

    /// Simulated hardware latency per frame (ms)
    pub hw_latency_ms: u64,

    /// Largest coding unit size (16, 32 or 64)
    #[serde(default = "default_lcu_size")]
    pub lcu_size: u32,

    /// Register bitrate control buffers
    #[serde(default = "default_brc")]
    pub brc: bool,
}

fn default_brc() -> bool {
    true
}

fn default_lcu_size() -> u32 {
    64
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Log level ("trace", "debug", "info", "warn", "error")
    pub level: String,

    /// Directory for rolling log files
    pub log_dir: Option<PathBuf>,
}

impl Default for TrackedBufferConfig {
    fn default() -> Self {
        Self {
            max_ref_slots: 16,
            max_non_ref_slots: 3,
            wait_timeout_ms: 1000,
            lazy_release: false,
        }
    }
}

impl Default for RecycleConfig {
    fn default() -> Self {
        Self {
            default_limit: 6,
            pak_info_limit: default_pak_info_limit(),
        }
    }
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            width: 1920,
            height: 1080,
            frames: 120,
            gop_size: 60,
            num_ref_frames: 4,
            non_ref_interval: 0,
            sync_depth: 2,
            hw_latency_ms: 2,
            lcu_size: default_lcu_size(),
            brc: default_brc(),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            log_dir: None,
        }
    }
}
