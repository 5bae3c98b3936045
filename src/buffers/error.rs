//! Error types for the encode buffer pools
//!
//! Every pool operation returns [`PoolResult`]. The pipeline layer is expected
//! to abort the current frame submission on any error; nothing in the pools
//! retries on its own.

use thiserror::Error;

use super::types::{BufferType, RecycleResId};
use crate::allocator::ResourceKind;

/// Unified error type for tracked and recycled buffer pools
#[derive(Debug, Error)]
pub enum PoolError {
    // =========================================================================
    // Caller Errors (non-fatal to the pool)
    // =========================================================================
    /// A precondition on the arguments was violated
    ///
    /// Also covers double release and release of a resource that does not
    /// belong to the pool. The pool state is left untouched.
    #[error("Invalid parameter: {0}")]
    InvalidParameter(String),

    /// No allocation parameters were registered for this buffer type
    #[error("Buffer type {0} has no registered allocation parameters")]
    NotRegistered(BufferType),

    /// No recycle queue was registered for this id
    #[error("Recycle resource {0} is not registered")]
    RecycleNotRegistered(RecycleResId),

    /// Slot index is outside the slot array
    #[error("Slot index {index} out of range (slot count {count})")]
    SlotOutOfRange { index: usize, count: usize },

    /// Resources can only be materialized for a busy slot
    #[error("Slot {index} is not busy")]
    SlotNotBusy { index: usize },

    /// Surface requested for a linear buffer type or vice versa
    #[error("Resource kind mismatch: requested {requested}, registered {registered}")]
    KindMismatch {
        requested: ResourceKind,
        registered: ResourceKind,
    },

    // =========================================================================
    // Resource Errors
    // =========================================================================
    /// Every resource the pool may allocate is currently handed out
    #[error("Buffer pool exhausted (need {needed}, have {available})")]
    PoolExhausted { needed: usize, available: usize },

    /// The allocation backend refused the request
    #[error("Resource allocation failed: {0}")]
    AllocationFailed(String),

    // =========================================================================
    // Synchronization Errors
    // =========================================================================
    /// No slot became free within the bounded wait
    #[error("Timed out after {timeout_ms}ms waiting for a free buffer slot")]
    WaitTimeout { timeout_ms: u64 },
}

impl PoolError {
    /// Check if the current frame submission must be aborted
    pub fn is_fatal_for_frame(&self) -> bool {
        matches!(
            self,
            PoolError::WaitTimeout { .. }
                | PoolError::PoolExhausted { .. }
                | PoolError::AllocationFailed(_)
        )
    }

    /// Check if the same call might succeed once in-flight frames complete
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            PoolError::PoolExhausted { .. } | PoolError::WaitTimeout { .. }
        )
    }
}

/// Result type for pool operations
pub type PoolResult<T> = Result<T, PoolError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_is_fatal_for_frame() {
        let err = PoolError::WaitTimeout { timeout_ms: 500 };
        assert!(err.is_fatal_for_frame());

        let err = PoolError::InvalidParameter("double release".to_string());
        assert!(!err.is_fatal_for_frame());
    }

    #[test]
    fn test_error_is_recoverable() {
        let err = PoolError::PoolExhausted {
            needed: 1,
            available: 0,
        };
        assert!(err.is_recoverable());

        let err = PoolError::NotRegistered(BufferType::MvTemporalBuffer);
        assert!(!err.is_recoverable());
    }

    #[test]
    fn test_error_display() {
        let err = PoolError::KindMismatch {
            requested: ResourceKind::Surface,
            registered: ResourceKind::Buffer,
        };
        assert_eq!(
            err.to_string(),
            "Resource kind mismatch: requested surface, registered buffer"
        );

        let err = PoolError::NotRegistered(BufferType::Ds4xSurface);
        assert!(err.to_string().contains("ds4xSurface"));
    }
}
