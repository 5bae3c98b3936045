//! Pool of identically-parameterized resources for one buffer type

use std::collections::VecDeque;
use std::sync::Arc;

use tracing::{debug, warn};

use super::error::{PoolError, PoolResult};
use crate::allocator::{AllocParams, EncodeAllocator, GpuResource, ResourceHandle};

/// Reference-counted pool backing one [`BufferType`](super::BufferType)
///
/// Resources are allocated on demand up to `max_count` and recycled through
/// a free list. A resource is never handed out twice without an intervening
/// [`release_resource`](Self::release_resource).
pub struct BufferQueue {
    allocator: Arc<EncodeAllocator>,
    params: AllocParams,
    max_count: usize,
    allocated: Vec<ResourceHandle>,
    free: VecDeque<ResourceHandle>,
}

impl BufferQueue {
    pub fn new(allocator: Arc<EncodeAllocator>, params: AllocParams, max_count: usize) -> Self {
        Self {
            allocator,
            params,
            max_count,
            allocated: Vec::new(),
            free: VecDeque::new(),
        }
    }

    /// Take a free resource, allocating a new one while under `max_count`
    pub fn acquire_resource(&mut self) -> PoolResult<ResourceHandle> {
        if let Some(resource) = self.free.pop_front() {
            return Ok(resource);
        }

        if self.allocated.len() >= self.max_count {
            warn!(
                "{} queue exhausted: all {} resources in use",
                self.params.name, self.max_count
            );
            return Err(PoolError::PoolExhausted {
                needed: 1,
                available: 0,
            });
        }

        let resource = self.allocator.allocate(&self.params)?;
        self.allocated.push(resource.clone());
        debug!(
            "{} queue grew to {}/{}",
            self.params.name,
            self.allocated.len(),
            self.max_count
        );
        Ok(resource)
    }

    /// Return a resource obtained from [`acquire_resource`](Self::acquire_resource)
    ///
    /// Foreign resources and resources that are already free are rejected
    /// without touching the free list.
    pub fn release_resource(&mut self, resource: &GpuResource) -> PoolResult<()> {
        if !self.owns(resource) {
            return Err(PoolError::InvalidParameter(format!(
                "{} ({}) does not belong to the {} queue",
                resource.name(),
                resource.id(),
                self.params.name
            )));
        }
        if self.free.iter().any(|r| r.id() == resource.id()) {
            return Err(PoolError::InvalidParameter(format!(
                "{} ({}) released twice",
                resource.name(),
                resource.id()
            )));
        }

        let handle = self
            .allocated
            .iter()
            .find(|r| r.id() == resource.id())
            .cloned()
            .ok_or_else(|| PoolError::InvalidParameter(format!("{} vanished", resource.id())))?;
        self.free.push_back(handle);
        Ok(())
    }

    /// Every allocated resource is back in the free list
    pub fn safe_to_destroy(&self) -> bool {
        self.free.len() == self.allocated.len()
    }

    /// Whether `resource` was allocated by this queue
    pub fn owns(&self, resource: &GpuResource) -> bool {
        self.allocated.iter().any(|r| r.id() == resource.id())
    }

    pub fn params(&self) -> &AllocParams {
        &self.params
    }

    pub fn max_count(&self) -> usize {
        self.max_count
    }

    /// Resources allocated over the lifetime of the queue
    pub fn allocated_count(&self) -> usize {
        self.allocated.len()
    }

    pub fn free_count(&self) -> usize {
        self.free.len()
    }

    /// Return every allocation to the allocator
    ///
    /// Outstanding resources are destroyed as well; callers that care should
    /// check [`safe_to_destroy`](Self::safe_to_destroy) first.
    pub fn destroy(&mut self) {
        if !self.safe_to_destroy() {
            warn!(
                "Destroying {} queue with {} resources still in use",
                self.params.name,
                self.allocated.len() - self.free.len()
            );
        }
        self.free.clear();
        for resource in self.allocated.drain(..) {
            if let Err(e) = self.allocator.destroy(&resource) {
                warn!("Failed to destroy {}: {}", resource.id(), e);
            }
        }
    }
}

impl Drop for BufferQueue {
    fn drop(&mut self) {
        if !self.allocated.is_empty() {
            self.destroy();
        }
    }
}

impl std::fmt::Debug for BufferQueue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BufferQueue")
            .field("name", &self.params.name)
            .field("max_count", &self.max_count)
            .field("allocated", &self.allocated.len())
            .field("free", &self.free.len())
            .finish()
    }
}
