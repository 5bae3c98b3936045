//! Encode pipeline
//!
//! Drives frames through the buffer pools the way a codec pipeline does:
//!
//! ```text
//! prepare(frame)
//!   ├─> size change?  on_size_change + re-register params (forces a keyframe)
//!   ├─> reference list from the sliding window of recent reference frames
//!   ├─> TrackedBuffer::acquire -> slot
//!   ├─> tracked buffers for the slot (mbCode, mvTemporal, 4x/8x DS)
//!   └─> recycled buffers for the frame (stats, PAK info, CU record, ...)
//! submit -> HardwareSimulator -> completion -> complete(frame) -> release
//! ```
//!
//! [`EncodePipeline::run`] keeps at most `sync_depth` frames in flight.

mod error;
mod feature;
mod hardware;

pub use error::{PipelineError, PipelineResult};
pub use feature::{
    BasicFeature, CACHELINE_SIZE, MACROBLOCK_SIZE, MAX_FRAME_DIMENSION, MIN_LCU_SIZE, MIN_TILE_SIZE,
};
pub use hardware::{FrameCompletion, HardwareCommand, HardwareSimulator};

use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;
use tracing::{debug, info, warn};

use crate::allocator::{EncodeAllocator, ResourceHandle, SurfaceInfo};
use crate::buffers::{
    BufferType, PoolError, PoolResult, RecycleResId, RecycleResource, RecycleStats, ReferenceList,
    TrackedBuffer, TrackedBufferStats,
};
use crate::config::Config;

/// Per-frame picture parameters
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FrameParams {
    pub frame_num: u32,
    pub width: u32,
    pub height: u32,
    pub is_idr: bool,
    pub used_as_ref: bool,
}

/// Everything the command programming for one frame needs
#[derive(Debug, Clone)]
pub struct FrameResources {
    pub frame_num: u32,
    /// Tracked buffer slot assigned to the frame
    pub slot: usize,
    pub ref_list: ReferenceList,

    pub mb_code: ResourceHandle,
    pub mv_temporal: ResourceHandle,
    pub ds4x: ResourceHandle,
    pub ds4x_info: SurfaceInfo,
    pub ds8x: ResourceHandle,
    pub ds8x_info: SurfaceInfo,

    pub frame_stats: ResourceHandle,
    pub vdenc_stats: ResourceHandle,
    pub stream_in: ResourceHandle,
    /// Not available when every CU record buffer is in flight
    pub cu_record: Option<ResourceHandle>,
    pub pak_info: Option<ResourceHandle>,
}

/// Frame size switch applied part-way through a run
#[derive(Debug, Clone, Copy)]
pub struct ResizePlan {
    pub at_frame: u32,
    pub width: u32,
    pub height: u32,
}

/// Summary of a [`EncodePipeline::run`]
#[derive(Debug, Clone, Serialize)]
pub struct RunReport {
    pub frames: u32,
    pub keyframes: u32,
    pub resizes: u32,
    pub allocations: u64,
    pub destroys: u64,
    pub live_resources: usize,
    pub tracked: TrackedBufferStats,
    pub recycle: RecycleStats,
}

struct InFlightFrame {
    ref_list: ReferenceList,
    recycle_idx: Option<usize>,
}

/// One encode stream: pools, feature and hardware
pub struct EncodePipeline {
    allocator: Arc<EncodeAllocator>,
    tracked: Arc<TrackedBuffer>,
    recycle: RecycleResource,
    feature: BasicFeature,
    hardware: HardwareSimulator,
    gop_size: u32,
    num_ref_frames: usize,
    non_ref_interval: u32,
    sync_depth: usize,
    lazy_release: bool,
    completion_timeout: Duration,
    /// Most recent reference frames, oldest first
    ref_window: VecDeque<u32>,
    in_flight: HashMap<u32, InFlightFrame>,
    /// CU record positions held by in-flight frames
    recycle_idxes: Vec<usize>,
    keyframes: u32,
    resizes: u32,
}

impl EncodePipeline {
    /// Build the pools for `config` and register the initial parameters
    pub fn new(allocator: Arc<EncodeAllocator>, config: &Config) -> PipelineResult<Self> {
        let feature = BasicFeature::new(&config.session, &config.recycle);
        feature.validate()?;

        let tracked = Arc::new(TrackedBuffer::new(allocator.clone(), &config.pool)?);
        let recycle = RecycleResource::new(allocator.clone(), &config.recycle);

        feature.update_tracked_buffer_parameters(&tracked)?;
        feature.register_recycle_resources(&recycle)?;

        let hardware = HardwareSimulator::new(Duration::from_millis(config.session.hw_latency_ms))?;

        // Hardware gets the slot wait plus its own latency for every frame ahead
        let completion_timeout = Duration::from_millis(
            config.pool.wait_timeout_ms
                + config.session.hw_latency_ms * config.session.sync_depth as u64,
        );

        info!(
            "Encode pipeline {}x{}: {} slots, sync depth {}, {} backend",
            config.session.width,
            config.session.height,
            tracked.slot_count(),
            config.session.sync_depth,
            allocator.backend_name()
        );

        Ok(Self {
            allocator,
            tracked,
            recycle,
            feature,
            hardware,
            gop_size: config.session.gop_size,
            num_ref_frames: config.session.num_ref_frames,
            non_ref_interval: config.session.non_ref_interval,
            sync_depth: config.session.sync_depth,
            lazy_release: config.pool.lazy_release,
            completion_timeout,
            ref_window: VecDeque::new(),
            in_flight: HashMap::new(),
            recycle_idxes: Vec::new(),
            keyframes: 0,
            resizes: 0,
        })
    }

    /// Picture parameters for frame `frame_num` of the configured GOP
    pub fn frame_params(&self, frame_num: u32, width: u32, height: u32) -> FrameParams {
        let is_idr = frame_num == 0 || (self.gop_size > 0 && frame_num % self.gop_size == 0);
        let used_as_ref =
            is_idr || self.non_ref_interval == 0 || frame_num % self.non_ref_interval != 0;
        FrameParams {
            frame_num,
            width,
            height,
            is_idr,
            used_as_ref,
        }
    }

    /// Acquire a slot and gather every buffer the frame needs
    ///
    /// A frame size change forces a keyframe. On failure after the slot was
    /// acquired, the slot is given back before returning.
    pub fn prepare(&mut self, frame: &FrameParams) -> PipelineResult<FrameResources> {
        if self.in_flight.contains_key(&frame.frame_num) {
            return Err(PoolError::InvalidParameter(format!(
                "frame {} is already in flight",
                frame.frame_num
            ))
            .into());
        }

        let mut is_idr = frame.is_idr;
        if self.feature.set_frame_size(frame.width, frame.height)? {
            self.tracked.on_size_change();
            self.feature.update_tracked_buffer_parameters(&self.tracked)?;
            self.feature.register_recycle_resources(&self.recycle)?;
            self.resizes += 1;
            is_idr = true;
        }

        if is_idr {
            self.ref_window.clear();
            self.keyframes += 1;
        }

        let mut ref_list = ReferenceList::new(frame.frame_num)
            .with_refs(self.ref_window.iter().copied())
            .used_as_reference(frame.used_as_ref || is_idr);

        let slot = self.tracked.acquire(&mut ref_list, is_idr, self.lazy_release)?;

        let recycle_idx = self.take_recycle_idx();
        let resources = match self.gather(frame.frame_num, slot, &ref_list, recycle_idx) {
            Ok(resources) => resources,
            Err(e) => {
                warn!("Frame {}: {}, giving back slot {}", frame.frame_num, e, slot);
                if let Some(idx) = recycle_idx {
                    self.recycle_idxes.retain(|i| *i != idx);
                }
                let abandoned = ref_list.clone().used_as_reference(false);
                if let Err(release_err) = self.tracked.release(&abandoned) {
                    warn!("Failed to give back slot {}: {}", slot, release_err);
                }
                return Err(e.into());
            }
        };

        if ref_list.used_as_ref {
            self.ref_window.push_back(frame.frame_num);
            while self.ref_window.len() > self.num_ref_frames {
                self.ref_window.pop_front();
            }
        }

        self.in_flight.insert(
            frame.frame_num,
            InFlightFrame {
                ref_list: ref_list.clone(),
                recycle_idx,
            },
        );

        debug!(
            "Frame {} prepared: slot {}, refs {:?}{}",
            frame.frame_num,
            slot,
            ref_list.ref_frames,
            if is_idr { " (IDR)" } else { "" }
        );

        Ok(resources)
    }

    /// Hardware finished `frame_num`: free its slot and CU record position
    pub fn complete(&mut self, frame_num: u32) -> PipelineResult<()> {
        let frame = self
            .in_flight
            .remove(&frame_num)
            .ok_or(PipelineError::UnknownFrame(frame_num))?;

        if let Some(idx) = frame.recycle_idx {
            self.recycle_idxes.retain(|i| *i != idx);
        }
        self.tracked.release(&frame.ref_list)?;
        Ok(())
    }

    /// Hand a prepared frame to the hardware
    pub fn submit(&self, resources: &FrameResources) -> PipelineResult<()> {
        self.hardware.submit(resources.frame_num)
    }

    /// Wait for the next hardware completion and complete that frame
    pub fn drain_one(&mut self) -> PipelineResult<u32> {
        let completion = self
            .hardware
            .recv_completion_timeout(self.completion_timeout)
            .ok_or(PipelineError::CompletionTimeout {
                timeout_ms: self.completion_timeout.as_millis() as u64,
                in_flight: self.in_flight.len(),
            })?;
        self.complete(completion.frame_num)?;
        Ok(completion.frame_num)
    }

    /// Encode `frames` frames, optionally switching size part-way
    pub fn run(&mut self, frames: u32, resize: Option<ResizePlan>) -> PipelineResult<RunReport> {
        let (base_width, base_height) = self.feature.frame_size();
        let keyframes_before = self.keyframes;
        let resizes_before = self.resizes;

        for frame_num in 0..frames {
            let (width, height) = match resize {
                Some(plan) if frame_num >= plan.at_frame => (plan.width, plan.height),
                _ => (base_width, base_height),
            };

            // Resolution changes start a new sequence once the old one drains
            let depth = if (width, height) != self.feature.frame_size() {
                1
            } else {
                self.sync_depth
            };
            while self.in_flight.len() >= depth {
                self.drain_one()?;
            }

            let params = self.frame_params(frame_num, width, height);
            let resources = self.prepare(&params)?;
            self.submit(&resources)?;
        }

        while !self.in_flight.is_empty() {
            self.drain_one()?;
        }

        let report = RunReport {
            frames,
            keyframes: self.keyframes - keyframes_before,
            resizes: self.resizes - resizes_before,
            allocations: self.allocator.allocation_count(),
            destroys: self.allocator.destroy_count(),
            live_resources: self.allocator.live_resources(),
            tracked: self.tracked.stats(),
            recycle: self.recycle.stats(),
        };
        info!(
            "Encoded {} frames ({} keyframes, {} resizes): {}",
            report.frames, report.keyframes, report.resizes, report.tracked
        );
        Ok(report)
    }

    pub fn tracked(&self) -> &Arc<TrackedBuffer> {
        &self.tracked
    }

    pub fn recycle(&self) -> &RecycleResource {
        &self.recycle
    }

    pub fn feature(&self) -> &BasicFeature {
        &self.feature
    }

    pub fn in_flight(&self) -> usize {
        self.in_flight.len()
    }

    /// Reference frames the next frame will predict from
    pub fn reference_window(&self) -> Vec<u32> {
        self.ref_window.iter().copied().collect()
    }

    fn gather(
        &self,
        frame_num: u32,
        slot: usize,
        ref_list: &ReferenceList,
        recycle_idx: Option<usize>,
    ) -> PoolResult<FrameResources> {
        let tracked = &self.tracked;
        let ds4x = tracked.get_surface(BufferType::Ds4xSurface, slot)?;
        let ds8x = tracked.get_surface(BufferType::Ds8xSurface, slot)?;

        Ok(FrameResources {
            frame_num,
            slot,
            ref_list: ref_list.clone(),
            mb_code: tracked.get_buffer(BufferType::MbCodedBuffer, slot)?,
            mv_temporal: tracked.get_buffer(BufferType::MvTemporalBuffer, slot)?,
            ds4x_info: self.allocator.surface_info(&ds4x)?,
            ds8x_info: self.allocator.surface_info(&ds8x)?,
            ds4x,
            ds8x,
            frame_stats: self
                .recycle
                .get_buffer(RecycleResId::FrameStatStreamOutBuffer, frame_num)?,
            vdenc_stats: self
                .recycle
                .get_buffer(RecycleResId::VdencStatsBuffer, frame_num)?,
            stream_in: self
                .recycle
                .get_buffer(RecycleResId::StreamInBuffer, frame_num)?,
            cu_record: match recycle_idx {
                Some(idx) => Some(
                    self.recycle
                        .get_buffer(RecycleResId::CuRecordStreamOutBuffer, idx as u32)?,
                ),
                None => None,
            },
            pak_info: if self.recycle.is_registered(RecycleResId::PakInfo) {
                Some(self.recycle.get_buffer(RecycleResId::PakInfo, frame_num)?)
            } else {
                None
            },
        })
    }

    /// Lowest CU record position not held by an in-flight frame
    fn take_recycle_idx(&mut self) -> Option<usize> {
        let idx = (0..self.sync_depth).find(|i| !self.recycle_idxes.contains(i))?;
        self.recycle_idxes.push(idx);
        Some(idx)
    }
}

impl Drop for EncodePipeline {
    fn drop(&mut self) {
        if let Err(e) = self.hardware.shutdown() {
            warn!("Hardware shutdown failed: {}", e);
        }
        for (frame_num, frame) in self.in_flight.drain() {
            if let Err(e) = self.tracked.release(&frame.ref_list) {
                warn!("Frame {} release on teardown failed: {}", frame_num, e);
            }
        }
    }
}

impl std::fmt::Debug for EncodePipeline {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EncodePipeline")
            .field("frame_size", &self.feature.frame_size())
            .field("in_flight", &self.in_flight.len())
            .field("ref_window", &self.ref_window)
            .field("tracked", &self.tracked)
            .finish()
    }
}
