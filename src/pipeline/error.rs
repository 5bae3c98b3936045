//! Pipeline error types

use thiserror::Error;

use crate::buffers::PoolError;

/// Errors from driving frames through the encode pipeline
#[derive(Debug, Error)]
pub enum PipelineError {
    /// A buffer pool operation failed
    #[error(transparent)]
    Pool(#[from] PoolError),

    /// Completion reported for a frame that was never submitted
    #[error("Frame {0} is not in flight")]
    UnknownFrame(u32),

    /// Hardware reported nothing within the wait window
    #[error("No frame completed within {timeout_ms}ms ({in_flight} in flight)")]
    CompletionTimeout { timeout_ms: u64, in_flight: usize },

    /// Simulator thread could not be started or stopped
    #[error("Hardware thread error: {0}")]
    Thread(String),

    /// Simulator channel closed unexpectedly
    #[error("Hardware channel closed")]
    ChannelClosed,
}

impl PipelineError {
    /// Whether the current frame submission must be abandoned
    pub fn is_fatal_for_frame(&self) -> bool {
        match self {
            PipelineError::Pool(e) => e.is_fatal_for_frame(),
            _ => true,
        }
    }
}

pub type PipelineResult<T> = Result<T, PipelineError>;
