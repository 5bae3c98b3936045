//! # lamco-encode-buffers
//!
//! Reference-tracked GPU surface and buffer pools for hardware video encode
//! pipelines.
//!
//! A codec pipeline needs a handful of per-frame resources (PAK output,
//! collocated motion vectors, downscaled surfaces for motion search) that
//! must survive for as long as later frames reference the frame, plus
//! scratch and statistics buffers that only need to outlive the hardware
//! pass. This crate manages both:
//!
//! - [`buffers::TrackedBuffer`] - slot pool keyed by the reference list
//! - [`buffers::RecycleResource`] - round-robin pools keyed by frame number
//! - [`allocator::EncodeAllocator`] - validation, layout and MMC state over a
//!   pluggable [`allocator::ResourceAllocator`] backend
//!
//! # Architecture
//!
//! ```text
//! lamco-encode-buffers
//!   ├─> EncodePipeline (frame loop, reference window, sync depth)
//!   │     ├─> BasicFeature      geometry -> allocation params
//!   │     └─> HardwareSimulator completion thread
//!   ├─> TrackedBuffer    slots + per-type queues + retired queues
//!   ├─> RecycleResource  cyclic per-id queues
//!   └─> EncodeAllocator  -> SystemMemoryAllocator (host memory)
//! ```
//!
//! # Frame Flow
//!
//! **Prepare:** reference list → `acquire` → slot → tracked + recycled buffers
//!
//! **Complete:** hardware done → `release` → slot freed if unreferenced

#![warn(clippy::all)]

/// Resource allocation
pub mod allocator;

/// Tracked and recycled buffer pools
pub mod buffers;

/// Configuration
pub mod config;

/// Frame pipeline driving the pools
pub mod pipeline;

/// Utility functions
pub mod utils;

pub use allocator::{AllocParams, EncodeAllocator, GpuResource, ResourceAllocator, ResourceHandle};
pub use buffers::{
    BufferType, PoolError, PoolResult, RecycleResId, RecycleResource, ReferenceList,
    TrackedBuffer,
};
pub use config::Config;
pub use pipeline::{EncodePipeline, FrameParams, FrameResources, PipelineError};
