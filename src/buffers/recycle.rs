//! Round-robin recycled resources
//!
//! Unlike the tracked buffer, recycled resources carry no reference
//! tracking: the resource for a frame is simply the one at
//! `frame_index % max_limit`. The caller guarantees that no more than
//! `max_limit` frames using a given id are in flight at once.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;
use serde::Serialize;
use tracing::{debug, info};

use super::error::{PoolError, PoolResult};
use super::types::RecycleResId;
use crate::allocator::{AllocParams, EncodeAllocator, ResourceHandle, ResourceKind};
use crate::config::RecycleConfig;

/// Fixed-capacity cyclic pool for one recycled id
pub struct RecycleQueue {
    allocator: Arc<EncodeAllocator>,
    params: AllocParams,
    resources: Vec<Option<ResourceHandle>>,
}

impl RecycleQueue {
    pub fn new(
        allocator: Arc<EncodeAllocator>,
        params: AllocParams,
        max_limit: usize,
    ) -> PoolResult<Self> {
        if max_limit == 0 {
            return Err(PoolError::InvalidParameter(format!(
                "{}: recycle limit must be at least 1",
                params.name
            )));
        }
        params.layout()?;

        Ok(Self {
            allocator,
            params,
            resources: vec![None; max_limit],
        })
    }

    /// Resource for `frame_index`, allocated on first use of its position
    pub fn get_resource(&mut self, frame_index: u32) -> PoolResult<ResourceHandle> {
        let position = frame_index as usize % self.resources.len();
        if let Some(resource) = &self.resources[position] {
            return Ok(resource.clone());
        }

        let resource = self.allocator.allocate(&self.params)?;
        debug!(
            "{} recycle position {} allocated as {}",
            self.params.name,
            position,
            resource.id()
        );
        self.resources[position] = Some(resource.clone());
        Ok(resource)
    }

    pub fn max_limit(&self) -> usize {
        self.resources.len()
    }

    /// Positions that have been materialized so far
    pub fn allocated_count(&self) -> usize {
        self.resources.iter().filter(|r| r.is_some()).count()
    }

    pub fn params(&self) -> &AllocParams {
        &self.params
    }

    fn destroy(&mut self) {
        for resource in self.resources.iter_mut().filter_map(Option::take) {
            if let Err(e) = self.allocator.destroy(&resource) {
                tracing::warn!("Failed to destroy {}: {}", resource.id(), e);
            }
        }
    }
}

impl Drop for RecycleQueue {
    fn drop(&mut self) {
        self.destroy();
    }
}

impl std::fmt::Debug for RecycleQueue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RecycleQueue")
            .field("name", &self.params.name)
            .field("max_limit", &self.max_limit())
            .field("allocated", &self.allocated_count())
            .finish()
    }
}

/// Snapshot of recycled resource usage
#[derive(Debug, Clone, Default, Serialize)]
pub struct RecycleStats {
    /// Registered ids
    pub queues: usize,
    /// Materialized resources across all queues
    pub resources_allocated: usize,
    /// Queues replaced by a registration with new parameters
    pub reregistrations: u64,
}

/// Registry of recycle queues keyed by [`RecycleResId`]
pub struct RecycleResource {
    allocator: Arc<EncodeAllocator>,
    default_limit: usize,
    queues: Mutex<HashMap<RecycleResId, RecycleQueue>>,
    reregistrations: AtomicU64,
}

impl RecycleResource {
    pub fn new(allocator: Arc<EncodeAllocator>, config: &RecycleConfig) -> Self {
        Self {
            allocator,
            default_limit: config.default_limit,
            queues: Mutex::new(HashMap::new()),
            reregistrations: AtomicU64::new(0),
        }
    }

    /// Limit applied by [`register_default`](Self::register_default)
    pub fn default_limit(&self) -> usize {
        self.default_limit
    }

    /// Register `id` with the configured default limit
    pub fn register_default(&self, id: RecycleResId, params: AllocParams) -> PoolResult<()> {
        self.register_resource(id, params, self.default_limit)
    }

    /// Register allocation parameters and cycle length for `id`
    ///
    /// Registering the same parameters and limit again is a no-op. Anything
    /// else replaces the queue and frees its resources.
    pub fn register_resource(
        &self,
        id: RecycleResId,
        params: AllocParams,
        max_limit: usize,
    ) -> PoolResult<()> {
        let mut queues = self.queues.lock();

        if let Some(existing) = queues.get(&id) {
            if existing.params() == &params && existing.max_limit() == max_limit {
                return Ok(());
            }
            info!(
                "Re-registering {} ({} -> {} entries)",
                id,
                existing.max_limit(),
                max_limit
            );
            self.reregistrations.fetch_add(1, Ordering::Relaxed);
        }

        let queue = RecycleQueue::new(self.allocator.clone(), params, max_limit)?;
        // Replaced queue is dropped here, freeing its resources
        queues.insert(id, queue);
        Ok(())
    }

    pub fn is_registered(&self, id: RecycleResId) -> bool {
        self.queues.lock().contains_key(&id)
    }

    /// Linear buffer for `frame_index`
    pub fn get_buffer(&self, id: RecycleResId, frame_index: u32) -> PoolResult<ResourceHandle> {
        self.get(id, frame_index, ResourceKind::Buffer)
    }

    /// Surface for `frame_index`
    pub fn get_surface(&self, id: RecycleResId, frame_index: u32) -> PoolResult<ResourceHandle> {
        self.get(id, frame_index, ResourceKind::Surface)
    }

    pub fn stats(&self) -> RecycleStats {
        let queues = self.queues.lock();
        RecycleStats {
            queues: queues.len(),
            resources_allocated: queues.values().map(RecycleQueue::allocated_count).sum(),
            reregistrations: self.reregistrations.load(Ordering::Relaxed),
        }
    }

    fn get(
        &self,
        id: RecycleResId,
        frame_index: u32,
        requested: ResourceKind,
    ) -> PoolResult<ResourceHandle> {
        let mut queues = self.queues.lock();
        let queue = queues
            .get_mut(&id)
            .ok_or(PoolError::RecycleNotRegistered(id))?;

        if queue.params().kind != requested {
            return Err(PoolError::KindMismatch {
                requested,
                registered: queue.params().kind,
            });
        }
        queue.get_resource(frame_index)
    }
}

impl std::fmt::Debug for RecycleResource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RecycleResource")
            .field("default_limit", &self.default_limit)
            .field("stats", &self.stats())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::allocator::SurfaceFormat;

    fn recycle() -> (Arc<EncodeAllocator>, RecycleResource) {
        let allocator = Arc::new(EncodeAllocator::system_memory());
        let recycle = RecycleResource::new(allocator.clone(), &RecycleConfig::default());
        (allocator, recycle)
    }

    #[test]
    fn test_positions_wrap_modulo_limit() {
        let allocator = Arc::new(EncodeAllocator::system_memory());
        let mut queue =
            RecycleQueue::new(allocator.clone(), AllocParams::buffer("pakInfo", 64), 2).unwrap();

        let r0 = queue.get_resource(0).unwrap();
        let r1 = queue.get_resource(1).unwrap();
        let r2 = queue.get_resource(2).unwrap();

        assert_ne!(r0.id(), r1.id());
        assert_eq!(r0.id(), r2.id());
        assert_eq!(queue.allocated_count(), 2);
        assert_eq!(allocator.allocation_count(), 2);
    }

    #[test]
    fn test_lazy_growth_out_of_order() {
        let allocator = Arc::new(EncodeAllocator::system_memory());
        let mut queue =
            RecycleQueue::new(allocator, AllocParams::buffer("streamIn", 64), 8).unwrap();

        queue.get_resource(5).unwrap();
        assert_eq!(queue.allocated_count(), 1);
        queue.get_resource(13).unwrap();
        assert_eq!(queue.allocated_count(), 1);
    }

    #[test]
    fn test_zero_limit_rejected() {
        let allocator = Arc::new(EncodeAllocator::system_memory());
        let err = RecycleQueue::new(allocator, AllocParams::buffer("pakInfo", 64), 0).unwrap_err();
        assert!(matches!(err, PoolError::InvalidParameter(_)));
    }

    #[test]
    fn test_unregistered_id() {
        let (_, recycle) = recycle();
        let err = recycle.get_buffer(RecycleResId::PakInfo, 0).unwrap_err();
        assert!(matches!(err, PoolError::RecycleNotRegistered(RecycleResId::PakInfo)));
    }

    #[test]
    fn test_kind_mismatch() {
        let (_, recycle) = recycle();
        recycle
            .register_resource(
                RecycleResId::PreEncRawSurface,
                AllocParams::surface("preEncRaw", 64, 64, SurfaceFormat::Nv12),
                2,
            )
            .unwrap();

        assert!(recycle.get_surface(RecycleResId::PreEncRawSurface, 0).is_ok());
        assert!(matches!(
            recycle.get_buffer(RecycleResId::PreEncRawSurface, 0),
            Err(PoolError::KindMismatch { .. })
        ));
    }

    #[test]
    fn test_reregistration() {
        let (allocator, recycle) = recycle();
        let params = AllocParams::buffer("vdencStats", 64);
        recycle
            .register_resource(RecycleResId::VdencStatsBuffer, params.clone(), 1)
            .unwrap();
        let first = recycle.get_buffer(RecycleResId::VdencStatsBuffer, 0).unwrap();

        // Same registration keeps the queue
        recycle
            .register_resource(RecycleResId::VdencStatsBuffer, params, 1)
            .unwrap();
        let same = recycle.get_buffer(RecycleResId::VdencStatsBuffer, 0).unwrap();
        assert_eq!(first.id(), same.id());

        // New size replaces it and frees the old resource
        recycle
            .register_resource(
                RecycleResId::VdencStatsBuffer,
                AllocParams::buffer("vdencStats", 128),
                1,
            )
            .unwrap();
        assert_eq!(allocator.live_resources(), 0);
        let replaced = recycle.get_buffer(RecycleResId::VdencStatsBuffer, 0).unwrap();
        assert_ne!(first.id(), replaced.id());
        assert_eq!(replaced.size(), 128);
        assert_eq!(recycle.stats().reregistrations, 1);
    }

    #[test]
    fn test_default_limit() {
        let (_, recycle) = recycle();
        recycle
            .register_default(RecycleResId::StreamInBuffer, AllocParams::buffer("streamIn", 64))
            .unwrap();

        let limit = recycle.default_limit() as u32;
        let first = recycle.get_buffer(RecycleResId::StreamInBuffer, 0).unwrap();
        let wrapped = recycle
            .get_buffer(RecycleResId::StreamInBuffer, limit)
            .unwrap();
        assert_eq!(first.id(), wrapped.id());
        assert_eq!(recycle.stats().resources_allocated, 1);
    }
}
