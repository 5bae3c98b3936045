//! Encode buffer pools
//!
//! Two pools sit between the codec pipeline and the allocator:
//!
//! - [`TrackedBuffer`]: reference-aware slots. A frame keeps its slot (and
//!   the per-slot resources like collocated MVs and downscaled surfaces) for
//!   as long as later frames reference it.
//! - [`RecycleResource`]: plain round-robin pools indexed by
//!   `frame_index % limit`, for per-frame scratch and statistics buffers.
//!
//! # Architecture
//!
//! ```text
//! TrackedBuffer
//!   ├─> BufferSlot[max_ref + max_non_ref]   frame idx, busy, BufferType -> resource
//!   ├─> BufferQueue per BufferType          free list over allocated resources
//!   └─> old queues                          retired by a size change, awaiting returns
//!
//! RecycleResource
//!   └─> RecycleQueue per RecycleResId       lazily filled cyclic array
//! ```

mod error;
mod queue;
mod recycle;
mod ref_list;
mod slot;
mod stats;
mod tracked;
mod types;

pub use error::{PoolError, PoolResult};
pub use queue::BufferQueue;
pub use recycle::{RecycleQueue, RecycleResource, RecycleStats};
pub use ref_list::{ReferenceList, MAX_NUM_REF_FRAME};
pub use stats::TrackedBufferStats;
pub use tracked::TrackedBuffer;
pub use types::{BufferType, RecycleResId};
