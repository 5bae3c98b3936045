//! Reference-tracked buffer slots
//!
//! A [`TrackedBuffer`] hands every frame entering the encoder a slot index.
//! Downstream command programming uses that index to pick the frame's
//! per-reference resources (motion-vector buffer, downscaled surfaces, ...),
//! so two frames that are both live references must never share a slot.
//!
//! # Slot lifecycle
//!
//! ```text
//!            acquire()                       release() / eviction
//!   Free ───────────────▶ Busy + in flight ─────────────────────────▶ Free
//!                              │   ▲
//!           dropped from refs  │   │ referenced again
//!           while in flight    ▼   │
//!                         Busy + pending release ──release()──▶ Free
//! ```
//!
//! Producers are frames entering encode (`acquire`); consumers are frames
//! whose hardware work completed (`release`). When every slot is busy,
//! `acquire` waits, in arrival order, for a slot to be freed and gives up
//! after the configured timeout.

use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::{Condvar, Mutex, MutexGuard};
use tracing::{debug, info, trace, warn};

use super::error::{PoolError, PoolResult};
use super::queue::BufferQueue;
use super::ref_list::ReferenceList;
use super::slot::BufferSlot;
use super::stats::TrackedBufferStats;
use super::types::BufferType;
use crate::allocator::{AllocParams, EncodeAllocator, GpuResource, ResourceHandle, ResourceKind};
use crate::config::TrackedBufferConfig;

/// Fixed-size pool of reference-aware buffer slots
pub struct TrackedBuffer {
    allocator: Arc<EncodeAllocator>,
    wait_timeout: Duration,
    lazy_release: bool,
    state: Mutex<TrackedState>,
    slot_freed: Condvar,
}

struct TrackedState {
    slots: Vec<BufferSlot>,
    params: HashMap<BufferType, AllocParams>,
    queues: HashMap<BufferType, BufferQueue>,
    /// Queues replaced by a size change that still have resources out
    old_queues: Vec<BufferQueue>,
    current: Option<usize>,
    /// Tickets of blocked `acquire` calls, oldest first
    waiters: VecDeque<u64>,
    next_ticket: u64,
    stats: TrackedBufferStats,
}

impl TrackedBuffer {
    /// Create a pool with `max_ref_slots + max_non_ref_slots` slots
    pub fn new(allocator: Arc<EncodeAllocator>, config: &TrackedBufferConfig) -> PoolResult<Self> {
        let slot_count = config.max_ref_slots + config.max_non_ref_slots;
        if slot_count == 0 {
            return Err(PoolError::InvalidParameter(
                "tracked buffer needs at least one slot".to_string(),
            ));
        }

        info!(
            "Tracked buffer: {} reference + {} non-reference slots, wait timeout {}ms",
            config.max_ref_slots, config.max_non_ref_slots, config.wait_timeout_ms
        );

        Ok(Self {
            allocator,
            wait_timeout: Duration::from_millis(config.wait_timeout_ms),
            lazy_release: config.lazy_release,
            state: Mutex::new(TrackedState {
                slots: (0..slot_count).map(|_| BufferSlot::new()).collect(),
                params: HashMap::new(),
                queues: HashMap::new(),
                old_queues: Vec::new(),
                current: None,
                waiters: VecDeque::new(),
                next_ticket: 0,
                stats: TrackedBufferStats::new(),
            }),
            slot_freed: Condvar::new(),
        })
    }

    /// Register allocation parameters for a buffer type
    ///
    /// Registering different parameters for a type that already has a queue
    /// retires that queue the same way [`on_size_change`](Self::on_size_change)
    /// does.
    pub fn register_param(&self, buffer_type: BufferType, params: AllocParams) -> PoolResult<()> {
        params.layout()?;

        let mut state = self.state.lock();
        if state.params.get(&buffer_type) == Some(&params) {
            return Ok(());
        }

        if let Some(queue) = state.queues.remove(&buffer_type) {
            debug!("{} parameters changed, retiring its queue", buffer_type);
            state.retire_queue(queue);
        }
        debug!(
            "Registered {} ({} {}x{}, {} bytes)",
            buffer_type, params.kind, params.width, params.height, params.bytes
        );
        state.params.insert(buffer_type, params);
        Ok(())
    }

    /// Assign a slot to the frame described by `ref_list`
    ///
    /// On a keyframe every slot is reset first. Slots whose frame is no
    /// longer referenced are released eagerly, or with `lazy_release` only
    /// once the pool is full and then a single one. Blocks while no slot is
    /// free, up to the configured timeout.
    ///
    /// The assigned index is written to `ref_list.scaling_idx` and returned.
    pub fn acquire(
        &self,
        ref_list: &mut ReferenceList,
        is_idr_frame: bool,
        lazy_release: bool,
    ) -> PoolResult<usize> {
        ref_list.validate()?;

        let mut state = self.state.lock();

        if is_idr_frame {
            for index in 0..state.slots.len() {
                if !state.slots[index].is_free() {
                    state.reset_slot(index);
                }
            }
            state.stats.idr_resets += 1;
            debug!("Keyframe {}: all slots reset", ref_list.frame_idx);
        }

        let freed = state.release_unused_slots(ref_list, lazy_release);
        if freed > 0 && !state.waiters.is_empty() {
            self.slot_freed.notify_all();
        }

        let index = match state.first_free_slot() {
            Some(index) if state.waiters.is_empty() => index,
            _ => self.wait_for_slot(&mut state, ref_list.frame_idx)?,
        };

        state.slots[index].acquire(ref_list.frame_idx);
        state.current = Some(index);
        let busy = state.busy_slots();
        state.stats.record_acquire(busy);
        ref_list.scaling_idx = Some(index);

        debug!(
            "Frame {} acquired slot {} ({}/{} busy)",
            ref_list.frame_idx,
            index,
            busy,
            state.slots.len()
        );
        Ok(index)
    }

    /// [`acquire`](Self::acquire) using the configured release policy
    pub fn acquire_default(&self, ref_list: &mut ReferenceList, is_idr_frame: bool) -> PoolResult<usize> {
        self.acquire(ref_list, is_idr_frame, self.lazy_release)
    }

    /// Report that hardware finished the frame described by `ref_list`
    ///
    /// Frees the frame's slot right away if the frame is not used as a
    /// reference, or if it was already dropped from the reference list while
    /// in flight. Also destroys retired queues whose resources have all come
    /// back.
    pub fn release(&self, ref_list: &ReferenceList) -> PoolResult<()> {
        let index = ref_list.scaling_idx.ok_or_else(|| {
            PoolError::InvalidParameter(format!(
                "frame {} was never assigned a slot",
                ref_list.frame_idx
            ))
        })?;

        let mut state = self.state.lock();
        let count = state.slots.len();
        if index >= count {
            return Err(PoolError::SlotOutOfRange { index, count });
        }

        let owned = {
            let slot = &state.slots[index];
            !slot.is_free() && slot.frame_idx() == Some(ref_list.frame_idx)
        };

        if !owned {
            // Reclaimed by a keyframe reset or already released
            trace!(
                "Frame {} no longer owns slot {}, nothing to release",
                ref_list.frame_idx,
                index
            );
            state.stats.stale_releases += 1;
        } else {
            state.slots[index].complete();
            if !ref_list.used_as_ref || state.slots[index].is_pending_release() {
                state.reset_slot(index);
                state.stats.releases += 1;
                debug!("Frame {} released slot {}", ref_list.frame_idx, index);
                self.slot_freed.notify_all();
            }
        }

        state.sweep_old_queues();
        Ok(())
    }

    /// Frame geometry changed
    ///
    /// Live queues are retired: destroyed now if all their resources are
    /// free, otherwise parked until the slots holding them are released.
    /// New allocations use whatever parameters are registered next.
    pub fn on_size_change(&self) {
        let mut state = self.state.lock();
        let queues: Vec<BufferQueue> = state.queues.drain().map(|(_, queue)| queue).collect();
        let retired = queues.len();
        for queue in queues {
            state.retire_queue(queue);
        }
        state.stats.resize_events += 1;
        info!(
            "Frame size changed: retired {} queues, {} awaiting outstanding resources",
            retired,
            state.old_queues.len()
        );
    }

    /// Surface of `buffer_type` for the busy slot `index`
    pub fn get_surface(&self, buffer_type: BufferType, index: usize) -> PoolResult<ResourceHandle> {
        self.get_resource(buffer_type, index, ResourceKind::Surface)
    }

    /// Linear buffer of `buffer_type` for the busy slot `index`
    pub fn get_buffer(&self, buffer_type: BufferType, index: usize) -> PoolResult<ResourceHandle> {
        self.get_resource(buffer_type, index, ResourceKind::Buffer)
    }

    /// Slot assigned by the most recent `acquire`
    pub fn current_index(&self) -> Option<usize> {
        self.state.lock().current
    }

    pub fn slot_count(&self) -> usize {
        self.state.lock().slots.len()
    }

    pub fn busy_slots(&self) -> usize {
        self.state.lock().busy_slots()
    }

    /// Frame currently bound to slot `index`
    pub fn frame_in_slot(&self, index: usize) -> Option<u32> {
        self.state
            .lock()
            .slots
            .get(index)
            .and_then(BufferSlot::frame_idx)
    }

    /// Live queues (one per materialized buffer type)
    pub fn queue_count(&self) -> usize {
        self.state.lock().queues.len()
    }

    /// Retired queues still waiting for resources to come back
    pub fn old_queue_count(&self) -> usize {
        self.state.lock().old_queues.len()
    }

    /// Whether `acquire_default` releases lazily
    pub fn lazy_release(&self) -> bool {
        self.lazy_release
    }

    pub fn wait_timeout(&self) -> Duration {
        self.wait_timeout
    }

    pub fn stats(&self) -> TrackedBufferStats {
        self.state.lock().stats.clone()
    }

    fn get_resource(
        &self,
        buffer_type: BufferType,
        index: usize,
        requested: ResourceKind,
    ) -> PoolResult<ResourceHandle> {
        let mut guard = self.state.lock();
        let state = &mut *guard;

        let count = state.slots.len();
        let slot = state
            .slots
            .get_mut(index)
            .ok_or(PoolError::SlotOutOfRange { index, count })?;
        if slot.is_free() {
            return Err(PoolError::SlotNotBusy { index });
        }

        let params = state
            .params
            .get(&buffer_type)
            .ok_or(PoolError::NotRegistered(buffer_type))?;
        if params.kind != requested {
            return Err(PoolError::KindMismatch {
                requested,
                registered: params.kind,
            });
        }

        if let Some(existing) = slot.resource(buffer_type) {
            if existing.params() == params {
                return Ok(existing.clone());
            }
        }

        // Anything still attached predates the current parameters
        if let Some(stale) = slot.detach(buffer_type) {
            trace!("Slot {} dropping stale {} {}", index, buffer_type, stale.id());
            if let Err(e) =
                return_to_queue(&mut state.queues, &mut state.old_queues, buffer_type, &stale)
            {
                warn!("Failed to return stale {}: {}", buffer_type, e);
            }
        }

        let queue = state.queues.entry(buffer_type).or_insert_with(|| {
            BufferQueue::new(self.allocator.clone(), params.clone(), count)
        });
        let resource = queue.acquire_resource()?;
        slot.attach(buffer_type, resource.clone());
        Ok(resource)
    }

    fn wait_for_slot(
        &self,
        state: &mut MutexGuard<'_, TrackedState>,
        frame_idx: u32,
    ) -> PoolResult<usize> {
        let ticket = state.next_ticket;
        state.next_ticket += 1;
        state.waiters.push_back(ticket);
        state.stats.waits += 1;

        let start = Instant::now();
        let deadline = start + self.wait_timeout;
        debug!(
            "Frame {} waiting for a free slot ({} waiters)",
            frame_idx,
            state.waiters.len()
        );

        let mut timed_out = false;
        loop {
            if state.waiters.front() == Some(&ticket) {
                if let Some(index) = state.first_free_slot() {
                    state.waiters.pop_front();
                    if !state.waiters.is_empty() {
                        // Next in line may find another free slot
                        self.slot_freed.notify_all();
                    }
                    state.stats.record_wait(start.elapsed());
                    return Ok(index);
                }
            }

            if timed_out {
                state.waiters.retain(|t| *t != ticket);
                self.slot_freed.notify_all();
                state.stats.wait_timeouts += 1;
                let timeout_ms = self.wait_timeout.as_millis() as u64;
                warn!(
                    "Frame {} timed out after {}ms waiting for a buffer slot",
                    frame_idx, timeout_ms
                );
                return Err(PoolError::WaitTimeout { timeout_ms });
            }

            timed_out = self.slot_freed.wait_until(state, deadline).timed_out();
        }
    }
}

impl TrackedState {
    fn first_free_slot(&self) -> Option<usize> {
        self.slots.iter().position(BufferSlot::is_free)
    }

    fn busy_slots(&self) -> usize {
        self.slots.iter().filter(|slot| !slot.is_free()).count()
    }

    fn reset_slot(&mut self, index: usize) {
        for (buffer_type, resource) in self.slots[index].reset() {
            if let Err(e) =
                return_to_queue(&mut self.queues, &mut self.old_queues, buffer_type, &resource)
            {
                warn!("Slot {}: failed to return {}: {}", index, buffer_type, e);
            }
        }
    }

    /// Release slots whose frame is absent from `ref_list`; returns slots freed
    fn release_unused_slots(&mut self, ref_list: &ReferenceList, lazy_release: bool) -> usize {
        // Referenced again: cancel any release deferred by an earlier acquire
        let mut candidates = Vec::new();
        for (index, slot) in self.slots.iter_mut().enumerate() {
            let Some(frame_idx) = slot.frame_idx() else {
                continue;
            };
            if ref_list.references(frame_idx) {
                slot.set_pending_release(false);
            } else {
                candidates.push(index);
            }
        }

        if lazy_release {
            if self.first_free_slot().is_some() {
                return 0;
            }

            let idle = candidates
                .iter()
                .copied()
                .find(|&index| !self.slots[index].is_in_flight());
            if let Some(index) = idle {
                self.evict(index);
                return 1;
            }
            if let Some(index) = candidates
                .iter()
                .copied()
                .find(|&index| !self.slots[index].is_pending_release())
            {
                self.evict(index);
            }
            return 0;
        }

        let mut freed = 0;
        for index in candidates {
            if self.evict(index) {
                freed += 1;
            }
        }
        freed
    }

    /// Free an unreferenced slot, or defer it while hardware still uses it
    fn evict(&mut self, index: usize) -> bool {
        let slot = &mut self.slots[index];
        if slot.is_in_flight() {
            if !slot.is_pending_release() {
                slot.set_pending_release(true);
                self.stats.deferred_releases += 1;
                trace!("Slot {} unreferenced but in flight, deferring", index);
            }
            return false;
        }

        trace!("Slot {} (frame {:?}) evicted", index, slot.frame_idx());
        self.reset_slot(index);
        self.stats.slots_evicted += 1;
        true
    }

    fn retire_queue(&mut self, queue: BufferQueue) {
        if queue.safe_to_destroy() {
            drop(queue);
            self.stats.queues_destroyed += 1;
        } else {
            debug!(
                "Parking {} queue ({} of {} resources outstanding)",
                queue.params().name,
                queue.allocated_count() - queue.free_count(),
                queue.allocated_count()
            );
            self.old_queues.push(queue);
            self.stats.queues_deferred += 1;
        }
    }

    fn sweep_old_queues(&mut self) {
        let before = self.old_queues.len();
        // Dropping a queue destroys its resources
        self.old_queues.retain(|queue| !queue.safe_to_destroy());
        let destroyed = before - self.old_queues.len();
        if destroyed > 0 {
            debug!("Destroyed {} retired queues", destroyed);
            self.stats.queues_destroyed += destroyed as u64;
        }
    }
}

/// Hand a slot's resource back to whichever queue allocated it
fn return_to_queue(
    queues: &mut HashMap<BufferType, BufferQueue>,
    old_queues: &mut [BufferQueue],
    buffer_type: BufferType,
    resource: &GpuResource,
) -> PoolResult<()> {
    if let Some(queue) = queues.get_mut(&buffer_type) {
        if queue.owns(resource) {
            return queue.release_resource(resource);
        }
    }
    match old_queues.iter_mut().find(|queue| queue.owns(resource)) {
        Some(queue) => queue.release_resource(resource),
        None => Err(PoolError::InvalidParameter(format!(
            "{} ({}) has no owning queue",
            resource.name(),
            resource.id()
        ))),
    }
}

impl Drop for TrackedBuffer {
    fn drop(&mut self) {
        let state = self.state.get_mut();
        for index in 0..state.slots.len() {
            if !state.slots[index].is_free() {
                state.reset_slot(index);
            }
        }
        state.queues.clear();
        state.old_queues.clear();
    }
}

impl std::fmt::Debug for TrackedBuffer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = self.state.lock();
        f.debug_struct("TrackedBuffer")
            .field("slots", &state.slots.len())
            .field("busy", &state.busy_slots())
            .field("current", &state.current)
            .field("queues", &state.queues.len())
            .field("old_queues", &state.old_queues.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::allocator::SurfaceFormat;

    fn config(refs: usize, non_refs: usize) -> TrackedBufferConfig {
        TrackedBufferConfig {
            max_ref_slots: refs,
            max_non_ref_slots: non_refs,
            wait_timeout_ms: 50,
            lazy_release: false,
        }
    }

    fn tracked(refs: usize, non_refs: usize) -> (Arc<EncodeAllocator>, TrackedBuffer) {
        let allocator = Arc::new(EncodeAllocator::system_memory());
        let tracked = TrackedBuffer::new(allocator.clone(), &config(refs, non_refs)).unwrap();
        (allocator, tracked)
    }

    #[test]
    fn test_zero_slots_rejected() {
        let allocator = Arc::new(EncodeAllocator::system_memory());
        assert!(TrackedBuffer::new(allocator, &config(0, 0)).is_err());
    }

    #[test]
    fn test_acquire_assigns_scaling_idx() {
        let (_, tracked) = tracked(2, 1);
        let mut list = ReferenceList::new(0);
        let index = tracked.acquire(&mut list, true, false).unwrap();
        assert_eq!(list.scaling_idx, Some(index));
        assert_eq!(tracked.current_index(), Some(index));
        assert_eq!(tracked.frame_in_slot(index), Some(0));
    }

    #[test]
    fn test_referenced_frames_keep_distinct_slots() {
        let (_, tracked) = tracked(3, 0);
        let mut f0 = ReferenceList::new(0);
        let mut f1 = ReferenceList::new(1).with_refs([0]);
        let mut f2 = ReferenceList::new(2).with_refs([0, 1]);

        let s0 = tracked.acquire(&mut f0, true, false).unwrap();
        let s1 = tracked.acquire(&mut f1, false, false).unwrap();
        let s2 = tracked.acquire(&mut f2, false, false).unwrap();

        assert_ne!(s0, s1);
        assert_ne!(s1, s2);
        assert_ne!(s0, s2);
        assert_eq!(tracked.busy_slots(), 3);
    }

    #[test]
    fn test_eager_release_frees_unreferenced_completed_slots() {
        let (_, tracked) = tracked(2, 0);
        let mut f0 = ReferenceList::new(0);
        let mut f1 = ReferenceList::new(1).with_refs([0]);
        tracked.acquire(&mut f0, true, false).unwrap();
        tracked.release(&f0).unwrap();
        tracked.acquire(&mut f1, false, false).unwrap();
        tracked.release(&f1).unwrap();

        // Frame 2 only references frame 1, so frame 0's slot is reclaimed
        let mut f2 = ReferenceList::new(2).with_refs([1]);
        let s2 = tracked.acquire(&mut f2, false, false).unwrap();
        assert_eq!(Some(s2), f0.scaling_idx);
        assert_eq!(tracked.stats().slots_evicted, 1);
    }

    #[test]
    fn test_lazy_release_only_when_full() {
        let (_, tracked) = tracked(3, 0);
        let mut f0 = ReferenceList::new(0);
        tracked.acquire(&mut f0, true, true).unwrap();
        tracked.release(&f0).unwrap();

        // Not full yet: frame 0 stays resident even though unreferenced
        let mut f1 = ReferenceList::new(1);
        tracked.acquire(&mut f1, false, true).unwrap();
        tracked.release(&f1).unwrap();
        assert_eq!(tracked.frame_in_slot(f0.scaling_idx.unwrap()), Some(0));

        let mut f2 = ReferenceList::new(2);
        tracked.acquire(&mut f2, false, true).unwrap();
        tracked.release(&f2).unwrap();
        assert_eq!(tracked.busy_slots(), 3);

        // Full: exactly one unreferenced slot is reclaimed
        let mut f3 = ReferenceList::new(3).with_refs([1, 2]);
        let s3 = tracked.acquire(&mut f3, false, true).unwrap();
        assert_eq!(Some(s3), f0.scaling_idx);
        assert_eq!(tracked.stats().slots_evicted, 1);
    }

    #[test]
    fn test_lazy_rereference_cancels_deferred_release() {
        let (_, tracked) = tracked(3, 0);
        let mut f0 = ReferenceList::new(0);
        let mut f1 = ReferenceList::new(1).with_refs([0]).used_as_reference(false);
        let mut f2 = ReferenceList::new(2).with_refs([0]);
        let s0 = tracked.acquire(&mut f0, true, true).unwrap();
        let s1 = tracked.acquire(&mut f1, false, true).unwrap();
        tracked.acquire(&mut f2, false, true).unwrap();

        // Full and all in flight: frame 0 is marked for release, nothing frees
        let mut f3 = ReferenceList::new(3).with_refs([2]);
        let err = tracked.acquire(&mut f3, false, true).unwrap_err();
        assert!(matches!(err, PoolError::WaitTimeout { .. }));
        assert_eq!(tracked.stats().deferred_releases, 1);

        tracked.release(&f1).unwrap();

        // A free slot exists, but frame 0 is referenced again
        let mut f4 = ReferenceList::new(4).with_refs([0, 2]);
        assert_eq!(tracked.acquire(&mut f4, false, true).unwrap(), s1);

        tracked.release(&f0).unwrap();
        assert_eq!(tracked.frame_in_slot(s0), Some(0));
        assert_eq!(tracked.busy_slots(), 3);
    }

    #[test]
    fn test_lazy_release_defers_in_flight_candidate() {
        let allocator = Arc::new(EncodeAllocator::system_memory());
        let mut cfg = config(2, 0);
        cfg.wait_timeout_ms = 5000;
        cfg.lazy_release = true;
        let tracked = Arc::new(TrackedBuffer::new(allocator, &cfg).unwrap());

        let mut f0 = ReferenceList::new(0);
        let mut f1 = ReferenceList::new(1).with_refs([0]);
        let s0 = tracked.acquire_default(&mut f0, true).unwrap();
        tracked.acquire_default(&mut f1, false).unwrap();

        let waiter = {
            let tracked = tracked.clone();
            std::thread::spawn(move || {
                let mut f2 = ReferenceList::new(2).with_refs([1]);
                tracked.acquire_default(&mut f2, false)
            })
        };

        let deadline = Instant::now() + Duration::from_secs(5);
        while tracked.stats().waits == 0 && Instant::now() < deadline {
            std::thread::sleep(Duration::from_millis(2));
        }
        assert_eq!(tracked.stats().waits, 1);
        assert_eq!(tracked.stats().deferred_releases, 1);
        assert_eq!(tracked.frame_in_slot(s0), Some(0));

        // Completing the deferred frame hands its slot to the waiter
        tracked.release(&f0).unwrap();
        assert_eq!(waiter.join().unwrap().unwrap(), s0);
        assert_eq!(tracked.frame_in_slot(s0), Some(2));
        assert_eq!(tracked.stats().wait_timeouts, 0);
    }

    #[test]
    fn test_lazy_release_with_free_slot_evicts_nothing() {
        let (_, tracked) = tracked(2, 0);
        let mut f0 = ReferenceList::new(0);
        tracked.acquire(&mut f0, true, true).unwrap();
        tracked.release(&f0).unwrap();

        let mut f1 = ReferenceList::new(1);
        tracked.acquire(&mut f1, false, true).unwrap();
        assert_eq!(tracked.frame_in_slot(f0.scaling_idx.unwrap()), Some(0));
        assert_eq!(tracked.stats().deferred_releases, 0);
        assert_eq!(tracked.stats().slots_evicted, 0);
    }

    #[test]
    fn test_non_reference_frame_freed_on_release() {
        let (_, tracked) = tracked(1, 1);
        let mut f0 = ReferenceList::new(0);
        tracked.acquire(&mut f0, true, false).unwrap();
        let mut b = ReferenceList::new(1).with_refs([0]).used_as_reference(false);
        tracked.acquire(&mut b, false, false).unwrap();
        assert_eq!(tracked.busy_slots(), 2);

        tracked.release(&b).unwrap();
        assert_eq!(tracked.busy_slots(), 1);
        assert_eq!(tracked.stats().releases, 1);
    }

    #[test]
    fn test_idr_resets_all_slots() {
        let (_, tracked) = tracked(3, 0);
        let mut f0 = ReferenceList::new(0);
        let mut f1 = ReferenceList::new(1).with_refs([0]);
        tracked.acquire(&mut f0, true, false).unwrap();
        tracked.acquire(&mut f1, false, false).unwrap();

        let mut idr = ReferenceList::new(2);
        let index = tracked.acquire(&mut idr, true, false).unwrap();
        assert_eq!(tracked.busy_slots(), 1);
        assert_eq!(tracked.frame_in_slot(index), Some(2));

        // Completions for reclaimed frames are harmless
        tracked.release(&f0).unwrap();
        tracked.release(&f1).unwrap();
        assert_eq!(tracked.stats().stale_releases, 2);
        assert_eq!(tracked.busy_slots(), 1);
    }

    #[test]
    fn test_wait_times_out() {
        let (_, tracked) = tracked(1, 0);
        let mut f0 = ReferenceList::new(0);
        tracked.acquire(&mut f0, true, false).unwrap();

        // Frame 0 is still in flight, so it cannot be reclaimed
        let mut f1 = ReferenceList::new(1);
        let err = tracked.acquire(&mut f1, false, false).unwrap_err();
        assert!(matches!(err, PoolError::WaitTimeout { timeout_ms: 50 }));
        assert!(f1.scaling_idx.is_none());

        let stats = tracked.stats();
        assert_eq!(stats.waits, 1);
        assert_eq!(stats.wait_timeouts, 1);
        assert_eq!(stats.deferred_releases, 1);
    }

    #[test]
    fn test_release_without_slot_rejected() {
        let (_, tracked) = tracked(1, 0);
        let list = ReferenceList::new(0);
        assert!(matches!(
            tracked.release(&list),
            Err(PoolError::InvalidParameter(_))
        ));

        let mut list = ReferenceList::new(0);
        list.scaling_idx = Some(5);
        assert!(matches!(
            tracked.release(&list),
            Err(PoolError::SlotOutOfRange { index: 5, count: 1 })
        ));
    }

    #[test]
    fn test_get_resource_errors() {
        let (_, tracked) = tracked(2, 0);
        tracked
            .register_param(
                BufferType::MvTemporalBuffer,
                AllocParams::buffer("mvTemporalBuffer", 256),
            )
            .unwrap();

        assert!(matches!(
            tracked.get_buffer(BufferType::MvTemporalBuffer, 0),
            Err(PoolError::SlotNotBusy { index: 0 })
        ));
        assert!(matches!(
            tracked.get_buffer(BufferType::MvTemporalBuffer, 9),
            Err(PoolError::SlotOutOfRange { .. })
        ));

        let mut f0 = ReferenceList::new(0);
        let index = tracked.acquire(&mut f0, true, false).unwrap();
        assert!(matches!(
            tracked.get_surface(BufferType::MvTemporalBuffer, index),
            Err(PoolError::KindMismatch { .. })
        ));
        assert!(matches!(
            tracked.get_surface(BufferType::Ds4xSurface, index),
            Err(PoolError::NotRegistered(BufferType::Ds4xSurface))
        ));
    }

    #[test]
    fn test_get_resource_is_stable_per_slot() {
        let (allocator, tracked) = tracked(2, 0);
        tracked
            .register_param(
                BufferType::Ds4xSurface,
                AllocParams::surface("ds4x", 64, 64, SurfaceFormat::Nv12),
            )
            .unwrap();

        let mut f0 = ReferenceList::new(0);
        let index = tracked.acquire(&mut f0, true, false).unwrap();
        let a = tracked.get_surface(BufferType::Ds4xSurface, index).unwrap();
        let b = tracked.get_surface(BufferType::Ds4xSurface, index).unwrap();
        assert_eq!(a.id(), b.id());
        assert_eq!(allocator.allocation_count(), 1);
        assert_eq!(tracked.queue_count(), 1);
    }

    #[test]
    fn test_size_change_defers_outstanding_queue() {
        let (allocator, tracked) = tracked(2, 0);
        tracked
            .register_param(BufferType::MbCodedBuffer, AllocParams::buffer("mbCode", 128))
            .unwrap();

        let mut f0 = ReferenceList::new(0);
        let index = tracked.acquire(&mut f0, true, false).unwrap();
        let old = tracked.get_buffer(BufferType::MbCodedBuffer, index).unwrap();

        tracked.on_size_change();
        tracked
            .register_param(BufferType::MbCodedBuffer, AllocParams::buffer("mbCode", 512))
            .unwrap();
        assert_eq!(tracked.queue_count(), 0);
        assert_eq!(tracked.old_queue_count(), 1);

        // Same slot now gets a buffer with the new size
        let new = tracked.get_buffer(BufferType::MbCodedBuffer, index).unwrap();
        assert_ne!(old.id(), new.id());
        assert_eq!(new.size(), 512);

        // Stale buffer went back to the parked queue; the next release sweeps it
        let mut f1 = ReferenceList::new(1);
        tracked.acquire(&mut f1, false, false).unwrap();
        tracked.release(&f1).unwrap();
        assert_eq!(tracked.old_queue_count(), 0);
        assert_eq!(allocator.live_resources(), 1);
    }

    #[test]
    fn test_size_change_destroys_idle_queues_immediately() {
        let (allocator, tracked) = tracked(1, 0);
        tracked
            .register_param(BufferType::MbCodedBuffer, AllocParams::buffer("mbCode", 128))
            .unwrap();
        let mut f0 = ReferenceList::new(0).used_as_reference(false);
        let index = tracked.acquire(&mut f0, true, false).unwrap();
        tracked.get_buffer(BufferType::MbCodedBuffer, index).unwrap();
        tracked.release(&f0).unwrap();

        tracked.on_size_change();
        assert_eq!(tracked.old_queue_count(), 0);
        assert_eq!(allocator.live_resources(), 0);
        assert_eq!(tracked.stats().queues_destroyed, 1);
    }

    #[test]
    fn test_drop_returns_everything() {
        let allocator = Arc::new(EncodeAllocator::system_memory());
        {
            let tracked = TrackedBuffer::new(allocator.clone(), &config(2, 1)).unwrap();
            tracked
                .register_param(BufferType::MbCodedBuffer, AllocParams::buffer("mbCode", 64))
                .unwrap();
            let mut f0 = ReferenceList::new(0);
            let index = tracked.acquire(&mut f0, true, false).unwrap();
            tracked.get_buffer(BufferType::MbCodedBuffer, index).unwrap();
            tracked.on_size_change();
        }
        assert_eq!(allocator.live_resources(), 0);
    }
}
