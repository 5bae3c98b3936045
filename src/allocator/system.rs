//! Host-memory allocation backend
//!
//! Backs every resource with a zeroed `Vec<u8>`. Used when no GPU device is
//! available and by the test suite, which relies on `live_resources()` to
//! check that pools return everything they allocate.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};

use parking_lot::Mutex;
use tracing::{trace, warn};

use super::{AllocParams, ResourceAllocator, ResourceId, ResourceLayout};
use crate::buffers::{PoolError, PoolResult};

/// Allocator that places resources in host memory
pub struct SystemMemoryAllocator {
    next_id: AtomicU64,
    allocations: Mutex<HashMap<ResourceId, Vec<u8>>>,
    /// Upper bound on live bytes (None = unbounded)
    budget: Option<usize>,
}

impl SystemMemoryAllocator {
    pub fn new() -> Self {
        Self {
            next_id: AtomicU64::new(1),
            allocations: Mutex::new(HashMap::new()),
            budget: None,
        }
    }

    /// Allocator that fails once `bytes` of live memory would be exceeded
    pub fn with_budget(bytes: usize) -> Self {
        Self {
            budget: Some(bytes),
            ..Self::new()
        }
    }

    /// Bytes currently held by live allocations
    pub fn live_bytes(&self) -> usize {
        self.allocations.lock().values().map(Vec::len).sum()
    }

    /// Copy of the backing bytes of a live resource
    #[cfg(test)]
    pub(crate) fn read(&self, id: ResourceId) -> Option<Vec<u8>> {
        self.allocations.lock().get(&id).cloned()
    }

    /// Overwrite the backing bytes of a live resource with `value`
    #[cfg(test)]
    pub(crate) fn fill(&self, id: ResourceId, value: u8) -> PoolResult<()> {
        let mut allocations = self.allocations.lock();
        let data = allocations.get_mut(&id).ok_or_else(|| {
            PoolError::InvalidParameter(format!("{} is not a live allocation", id))
        })?;
        data.fill(value);
        Ok(())
    }
}

impl Default for SystemMemoryAllocator {
    fn default() -> Self {
        Self::new()
    }
}

impl ResourceAllocator for SystemMemoryAllocator {
    fn allocate(&self, params: &AllocParams, layout: &ResourceLayout) -> PoolResult<ResourceId> {
        let mut allocations = self.allocations.lock();

        if let Some(budget) = self.budget {
            let live: usize = allocations.values().map(Vec::len).sum();
            if live + layout.size > budget {
                warn!(
                    "Host memory budget exceeded allocating {} ({} + {} > {} bytes)",
                    params.name, live, layout.size, budget
                );
                return Err(PoolError::AllocationFailed(format!(
                    "{}: {} bytes exceeds remaining budget of {} bytes",
                    params.name,
                    layout.size,
                    budget.saturating_sub(live)
                )));
            }
        }

        let id = ResourceId(self.next_id.fetch_add(1, Ordering::Relaxed));
        allocations.insert(id, vec![0u8; layout.size]);
        trace!("Allocated {} ({}, {} bytes)", id, params.name, layout.size);
        Ok(id)
    }

    fn destroy(&self, id: ResourceId) -> PoolResult<()> {
        match self.allocations.lock().remove(&id) {
            Some(_) => {
                trace!("Freed {}", id);
                Ok(())
            }
            None => Err(PoolError::InvalidParameter(format!(
                "{} is not a live allocation",
                id
            ))),
        }
    }

    fn backend_name(&self) -> &'static str {
        "system"
    }

    fn live_resources(&self) -> usize {
        self.allocations.lock().len()
    }
}
