//! Per-frame reference picture list

use super::error::{PoolError, PoolResult};

/// Maximum reference frames a single picture may list (HEVC bound)
pub const MAX_NUM_REF_FRAME: usize = 15;

/// Reference list record supplied by the codec pipeline for each frame
///
/// The tracked buffer only reads `frame_idx`, `ref_frames` and
/// `used_as_ref`. `scaling_idx` is written by
/// [`TrackedBuffer::acquire`](super::TrackedBuffer::acquire) with the slot
/// assigned to this frame.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReferenceList {
    /// Index of the current frame in the codec's picture table
    pub frame_idx: u32,

    /// Frame indices this picture predicts from
    pub ref_frames: Vec<u32>,

    /// Whether later pictures may reference this one
    pub used_as_ref: bool,

    /// Slot assigned by the tracked buffer
    pub scaling_idx: Option<usize>,
}

impl ReferenceList {
    /// Reference frame with no references of its own (an intra picture)
    pub fn new(frame_idx: u32) -> Self {
        Self {
            frame_idx,
            ref_frames: Vec::new(),
            used_as_ref: true,
            scaling_idx: None,
        }
    }

    pub fn with_refs(mut self, refs: impl IntoIterator<Item = u32>) -> Self {
        self.ref_frames = refs.into_iter().collect();
        self
    }

    pub fn used_as_reference(mut self, used: bool) -> Self {
        self.used_as_ref = used;
        self
    }

    /// Whether `frame_idx` appears among this picture's references
    pub fn references(&self, frame_idx: u32) -> bool {
        self.ref_frames.contains(&frame_idx)
    }

    pub(crate) fn validate(&self) -> PoolResult<()> {
        if self.ref_frames.len() > MAX_NUM_REF_FRAME {
            return Err(PoolError::InvalidParameter(format!(
                "frame {} lists {} references (max {})",
                self.frame_idx,
                self.ref_frames.len(),
                MAX_NUM_REF_FRAME
            )));
        }
        if self.references(self.frame_idx) {
            return Err(PoolError::InvalidParameter(format!(
                "frame {} lists itself as a reference",
                self.frame_idx
            )));
        }
        Ok(())
    }
}
