//! Graphics resource allocation
//!
//! [`EncodeAllocator`] is the single entry point the buffer pools use to
//! create and destroy resources. It validates allocation parameters, computes
//! surface layouts, tracks memory compression (MMC) state and delegates the
//! actual allocation to a [`ResourceAllocator`] backend.
//!
//! # Architecture
//!
//! ```text
//! TrackedBuffer / RecycleResource
//!              │
//!              ▼
//!       EncodeAllocator   (validation, layout, MMC, counters)
//!              │
//!              ▼
//!   dyn ResourceAllocator
//!      ├─ SystemMemoryAllocator (host memory)
//!      └─ device backends
//! ```

mod resource;
mod system;

pub use resource::{
    align_up, align_up_usize, AllocParams, GpuResource, MemoryPool, MmcMode, ResourceHandle,
    ResourceId, ResourceKind, ResourceLayout, SurfaceFormat, SurfaceInfo, TileType,
    MAX_SURFACE_DIMENSION, PAGE_SIZE, YTILE_H_ALIGNMENT,
};
pub use system::SystemMemoryAllocator;

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;
use tracing::{debug, warn};

use crate::buffers::{PoolError, PoolResult};

/// Allocation backend interface
///
/// Backends own the memory behind a [`ResourceId`]. They are shared between
/// the pools of one pipeline and may be called from the completion thread,
/// hence `Send + Sync`.
#[cfg_attr(test, mockall::automock)]
pub trait ResourceAllocator: Send + Sync {
    /// Allocate memory for a resource with an already validated layout
    fn allocate(&self, params: &AllocParams, layout: &ResourceLayout) -> PoolResult<ResourceId>;

    /// Free a resource previously returned by `allocate`
    fn destroy(&self, id: ResourceId) -> PoolResult<()>;

    /// Backend identifier for logging
    fn backend_name(&self) -> &'static str;

    /// Number of allocations not yet destroyed
    fn live_resources(&self) -> usize;
}

/// Thin wrapper over a [`ResourceAllocator`] backend
pub struct EncodeAllocator {
    backend: Arc<dyn ResourceAllocator>,
    mmc: Mutex<HashMap<ResourceId, MmcMode>>,
    allocations: AtomicU64,
    destroys: AtomicU64,
}

impl EncodeAllocator {
    pub fn new(backend: Arc<dyn ResourceAllocator>) -> Self {
        debug!("Encode allocator using {} backend", backend.backend_name());
        Self {
            backend,
            mmc: Mutex::new(HashMap::new()),
            allocations: AtomicU64::new(0),
            destroys: AtomicU64::new(0),
        }
    }

    /// Allocator backed by host memory
    pub fn system_memory() -> Self {
        Self::new(Arc::new(SystemMemoryAllocator::new()))
    }

    /// Allocate a resource of the kind described by `params`
    pub fn allocate(&self, params: &AllocParams) -> PoolResult<ResourceHandle> {
        let layout = params.layout()?;
        let id = self.backend.allocate(params, &layout).map_err(|e| {
            warn!("Failed to allocate {}: {}", params.name, e);
            e
        })?;

        if params.kind == ResourceKind::Surface {
            let mode = if params.compressible {
                MmcMode::MediaCompressed
            } else {
                MmcMode::Disabled
            };
            self.mmc.lock().insert(id, mode);
        }

        self.allocations.fetch_add(1, Ordering::Relaxed);
        debug!(
            "Allocated {} {} ({} bytes) as {}",
            params.kind, params.name, layout.size, id
        );
        Ok(Arc::new(GpuResource::new(id, params.clone(), layout)))
    }

    /// Allocate a linear buffer
    pub fn allocate_buffer(&self, params: &AllocParams) -> PoolResult<ResourceHandle> {
        Self::expect_kind(params, ResourceKind::Buffer)?;
        self.allocate(params)
    }

    /// Allocate a 2D surface
    pub fn allocate_surface(&self, params: &AllocParams) -> PoolResult<ResourceHandle> {
        Self::expect_kind(params, ResourceKind::Surface)?;
        self.allocate(params)
    }

    /// Return a resource to the backend
    pub fn destroy(&self, resource: &GpuResource) -> PoolResult<()> {
        self.backend.destroy(resource.id())?;
        self.mmc.lock().remove(&resource.id());
        self.destroys.fetch_add(1, Ordering::Relaxed);
        debug!("Destroyed {} {}", resource.name(), resource.id());
        Ok(())
    }

    /// Describe a surface, including its current MMC state
    pub fn surface_info(&self, resource: &GpuResource) -> PoolResult<SurfaceInfo> {
        if resource.kind() != ResourceKind::Surface {
            return Err(PoolError::KindMismatch {
                requested: ResourceKind::Surface,
                registered: resource.kind(),
            });
        }
        let params = resource.params();
        Ok(SurfaceInfo {
            width: params.width,
            height: params.height,
            pitch: resource.layout().pitch,
            format: params.format,
            tile: params.tile,
            uv_offset: resource.layout().uv_offset,
            mmc_mode: self.mmc_mode(resource),
        })
    }

    /// Update the compression state recorded for a surface
    pub fn set_mmc_mode(&self, resource: &GpuResource, mode: MmcMode) -> PoolResult<()> {
        let mut mmc = self.mmc.lock();
        match mmc.get_mut(&resource.id()) {
            Some(current) => {
                *current = mode;
                Ok(())
            }
            None => Err(PoolError::InvalidParameter(format!(
                "{} ({}) is not a live surface",
                resource.name(),
                resource.id()
            ))),
        }
    }

    /// Compression state of a surface (`Disabled` for buffers)
    pub fn mmc_mode(&self, resource: &GpuResource) -> MmcMode {
        self.mmc
            .lock()
            .get(&resource.id())
            .copied()
            .unwrap_or_default()
    }

    pub fn backend_name(&self) -> &'static str {
        self.backend.backend_name()
    }

    /// Total successful allocations since creation
    pub fn allocation_count(&self) -> u64 {
        self.allocations.load(Ordering::Relaxed)
    }

    /// Total destroys since creation
    pub fn destroy_count(&self) -> u64 {
        self.destroys.load(Ordering::Relaxed)
    }

    /// Allocations the backend still holds
    pub fn live_resources(&self) -> usize {
        self.backend.live_resources()
    }

    fn expect_kind(params: &AllocParams, kind: ResourceKind) -> PoolResult<()> {
        if params.kind != kind {
            return Err(PoolError::KindMismatch {
                requested: kind,
                registered: params.kind,
            });
        }
        Ok(())
    }
}

impl std::fmt::Debug for EncodeAllocator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EncodeAllocator")
            .field("backend", &self.backend.backend_name())
            .field("allocations", &self.allocation_count())
            .field("destroys", &self.destroy_count())
            .finish()
    }
}
