//! Utility Functions and Diagnostics
//!
//! - [`diagnostics`]: host information and pool memory estimates logged at
//!   startup
//! - [`errors`]: user-facing error reports with troubleshooting hints
//!
//! ```rust,no_run
//! use lamco_encode_buffers::config::Config;
//! use lamco_encode_buffers::utils::{format_user_error, PoolFootprint};
//!
//! let config = Config::default();
//! let footprint = PoolFootprint::estimate(&config);
//! println!("Tracked buffers need up to {:.1} MB", footprint.tracked_mb());
//!
//! let error = anyhow::anyhow!("Failed to parse config file");
//! eprintln!("{}", format_user_error(&error));
//! ```

pub mod diagnostics;
pub mod errors;

pub use diagnostics::{log_startup_diagnostics, PoolFootprint, RunTimer, SystemInfo};
pub use errors::format_user_error;
