//! Buffer slot state

use std::collections::HashMap;

use super::types::BufferType;
use crate::allocator::ResourceHandle;

/// One reusable binding between a frame and its tracked resources
///
/// Slots live in the owning tracked buffer's slot array and hold no
/// reference back to it; returning resources to their queues is the owner's
/// job, using what [`BufferSlot::reset`] hands back.
#[derive(Debug)]
pub(crate) struct BufferSlot {
    busy: bool,
    frame_idx: Option<u32>,
    /// Hardware has not yet reported completion for the acquiring frame
    in_flight: bool,
    /// Dropped from the reference list while in flight
    pending_release: bool,
    resources: HashMap<BufferType, ResourceHandle>,
}

impl BufferSlot {
    pub(crate) fn new() -> Self {
        Self {
            busy: false,
            frame_idx: None,
            in_flight: false,
            pending_release: false,
            resources: HashMap::new(),
        }
    }

    pub(crate) fn is_free(&self) -> bool {
        !self.busy
    }

    pub(crate) fn frame_idx(&self) -> Option<u32> {
        self.frame_idx
    }

    pub(crate) fn is_in_flight(&self) -> bool {
        self.in_flight
    }

    pub(crate) fn is_pending_release(&self) -> bool {
        self.pending_release
    }

    pub(crate) fn set_pending_release(&mut self, pending: bool) {
        self.pending_release = pending;
    }

    /// Bind the slot to `frame_idx`; the slot must be free
    pub(crate) fn acquire(&mut self, frame_idx: u32) {
        debug_assert!(self.is_free());
        self.busy = true;
        self.frame_idx = Some(frame_idx);
        self.in_flight = true;
        self.pending_release = false;
    }

    /// Hardware finished the frame that acquired this slot
    pub(crate) fn complete(&mut self) {
        self.in_flight = false;
    }

    /// Free the slot, handing back every attached resource
    pub(crate) fn reset(&mut self) -> Vec<(BufferType, ResourceHandle)> {
        self.busy = false;
        self.frame_idx = None;
        self.in_flight = false;
        self.pending_release = false;
        self.resources.drain().collect()
    }

    pub(crate) fn resource(&self, buffer_type: BufferType) -> Option<&ResourceHandle> {
        self.resources.get(&buffer_type)
    }

    pub(crate) fn attach(&mut self, buffer_type: BufferType, resource: ResourceHandle) {
        self.resources.insert(buffer_type, resource);
    }

    pub(crate) fn detach(&mut self, buffer_type: BufferType) -> Option<ResourceHandle> {
        self.resources.remove(&buffer_type)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::allocator::{AllocParams, EncodeAllocator};

    #[test]
    fn test_slot_lifecycle() {
        let mut slot = BufferSlot::new();
        assert!(slot.is_free());

        slot.acquire(7);
        assert!(!slot.is_free());
        assert_eq!(slot.frame_idx(), Some(7));
        assert!(slot.is_in_flight());

        slot.complete();
        assert!(!slot.is_in_flight());

        let released = slot.reset();
        assert!(released.is_empty());
        assert!(slot.is_free());
        assert_eq!(slot.frame_idx(), None);
    }

    #[test]
    fn test_reset_hands_back_resources() {
        let allocator = EncodeAllocator::system_memory();
        let handle = allocator
            .allocate(&AllocParams::buffer("mvTemporalBuffer", 64))
            .unwrap();

        let mut slot = BufferSlot::new();
        slot.acquire(0);
        slot.attach(BufferType::MvTemporalBuffer, handle.clone());
        assert!(slot.resource(BufferType::MvTemporalBuffer).is_some());

        let released = slot.reset();
        assert_eq!(released.len(), 1);
        assert_eq!(released[0].0, BufferType::MvTemporalBuffer);
        assert_eq!(released[0].1.id(), handle.id());
        assert!(slot.resource(BufferType::MvTemporalBuffer).is_none());

        allocator.destroy(&handle).unwrap();
    }
}
