//! Configuration management
//!
//! Handles loading, validation, and merging of configuration from:
//! - TOML files
//! - Environment variables (through clap)
//! - CLI arguments

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use crate::pipeline::MAX_FRAME_DIMENSION;

pub mod types;

pub use types::{LoggingConfig, RecycleConfig, SessionConfig, TrackedBufferConfig};

/// Main configuration structure
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    /// Tracked buffer slot pool
    #[serde(default)]
    pub pool: TrackedBufferConfig,
    /// Recycled resources
    #[serde(default)]
    pub recycle: RecycleConfig,
    /// Simulated encode session
    #[serde(default)]
    pub session: SessionConfig,
    /// Logging configuration
    #[serde(default)]
    pub logging: LoggingConfig,
}

impl Config {
    /// Load configuration from file
    pub fn load(path: &str) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .context(format!("Failed to read config file: {}", path))?;

        let config: Config = toml::from_str(&content).context("Failed to parse config file")?;

        config.validate()?;
        Ok(config)
    }

    /// Create default configuration
    pub fn default_config() -> Result<Self> {
        let config = Self::default();
        config.validate()?;
        Ok(config)
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<()> {
        if self.pool.max_ref_slots + self.pool.max_non_ref_slots == 0 {
            anyhow::bail!("Tracked buffer needs at least one slot");
        }
        if self.pool.wait_timeout_ms == 0 {
            anyhow::bail!("wait_timeout_ms must be greater than zero");
        }

        if self.recycle.default_limit == 0 {
            anyhow::bail!("Recycle default_limit must be at least 1");
        }
        if self.recycle.pak_info_limit == 0 {
            anyhow::bail!("Recycle pak_info_limit must be at least 1");
        }

        let session = &self.session;
        if session.width == 0 || session.height == 0 {
            anyhow::bail!(
                "Invalid frame size: {}x{}",
                session.width,
                session.height
            );
        }
        if session.width > MAX_FRAME_DIMENSION || session.height > MAX_FRAME_DIMENSION {
            anyhow::bail!(
                "Frame size {}x{} exceeds the {} pixel limit",
                session.width,
                session.height,
                MAX_FRAME_DIMENSION
            );
        }
        match session.lcu_size {
            16 | 32 | 64 => {}
            other => anyhow::bail!("Invalid LCU size: {}", other),
        }
        if session.sync_depth == 0 {
            anyhow::bail!("sync_depth must be at least 1");
        }

        // Every in-flight frame plus the live references needs its own slot
        let needed = session.num_ref_frames + session.sync_depth;
        let slots = self.pool.max_ref_slots + self.pool.max_non_ref_slots;
        if needed > slots {
            anyhow::bail!(
                "num_ref_frames ({}) + sync_depth ({}) exceeds the {} available slots",
                session.num_ref_frames,
                session.sync_depth,
                slots
            );
        }

        match self.logging.level.as_str() {
            "trace" | "debug" | "info" | "warn" | "error" => {}
            _ => anyhow::bail!("Invalid log level: {}", self.logging.level),
        }

        Ok(())
    }

    /// Override config with CLI arguments
    pub fn with_overrides(
        mut self,
        frames: Option<u32>,
        width: Option<u32>,
        height: Option<u32>,
    ) -> Self {
        if let Some(frames) = frames {
            self.session.frames = frames;
        }
        if let Some(width) = width {
            self.session.width = width;
        }
        if let Some(height) = height {
            self.session.height = height;
        }
        self
    }
}
