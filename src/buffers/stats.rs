//! Tracked buffer statistics
//!
//! Counters describing slot turnover, waits and resize handling. A snapshot
//! is taken under the tracked buffer lock, so all fields are consistent with
//! each other.

use std::time::Duration;

use serde::Serialize;

/// Cumulative tracked buffer statistics
#[derive(Debug, Clone, Default, Serialize)]
pub struct TrackedBufferStats {
    /// Successful `acquire` calls
    pub acquires: u64,

    /// Keyframes that forced every slot free
    pub idr_resets: u64,

    /// Slots freed because their frame left the reference list
    pub slots_evicted: u64,

    /// Evictions deferred until the frame's hardware work completed
    pub deferred_releases: u64,

    /// `release` calls that freed a slot
    pub releases: u64,

    /// `release` calls for a frame whose slot had already been reclaimed
    pub stale_releases: u64,

    /// `acquire` calls that had to wait for a free slot
    pub waits: u64,

    /// Waits that ran out of time
    pub wait_timeouts: u64,

    /// Longest completed wait (ms)
    pub max_wait_ms: f32,

    /// Average completed wait (ms)
    pub avg_wait_ms: f32,

    /// Highest number of simultaneously busy slots
    pub peak_busy_slots: usize,

    /// `on_size_change` calls
    pub resize_events: u64,

    /// Queues parked in the old-queue list
    pub queues_deferred: u64,

    /// Queues destroyed (immediately or after being parked)
    pub queues_destroyed: u64,
}

impl TrackedBufferStats {
    pub fn new() -> Self {
        Self::default()
    }

    pub(crate) fn record_acquire(&mut self, busy_slots: usize) {
        self.acquires += 1;
        self.peak_busy_slots = self.peak_busy_slots.max(busy_slots);
    }

    pub(crate) fn record_wait(&mut self, waited: Duration) {
        let ms = waited.as_secs_f32() * 1000.0;
        let completed = self.waits - self.wait_timeouts;
        if completed <= 1 {
            self.avg_wait_ms = ms;
        } else {
            // Exponential moving average (α = 0.1)
            self.avg_wait_ms = self.avg_wait_ms * 0.9 + ms * 0.1;
        }
        self.max_wait_ms = self.max_wait_ms.max(ms);
    }

    /// Fraction of acquires that had to wait
    pub fn wait_ratio(&self) -> f32 {
        if self.acquires == 0 {
            return 0.0;
        }
        self.waits as f32 / self.acquires as f32
    }
}

impl std::fmt::Display for TrackedBufferStats {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "acquires={} releases={} evicted={} deferred={} idr_resets={} waits={} \
             timeouts={} max_wait={:.2}ms peak_busy={} resizes={}",
            self.acquires,
            self.releases,
            self.slots_evicted,
            self.deferred_releases,
            self.idr_resets,
            self.waits,
            self.wait_timeouts,
            self.max_wait_ms,
            self.peak_busy_slots,
            self.resize_events
        )
    }
}
