//! Basic encode feature
//!
//! Derives allocation parameters for every tracked and recycled buffer from
//! the current frame geometry and registers them with the pools.

use tracing::debug;

use crate::allocator::{
    align_up, align_up_usize, AllocParams, MemoryPool, SurfaceFormat, MAX_SURFACE_DIMENSION,
    PAGE_SIZE, YTILE_H_ALIGNMENT,
};
use crate::buffers::{BufferType, PoolError, PoolResult, RecycleResId, RecycleResource, TrackedBuffer};
use crate::config::{RecycleConfig, SessionConfig};

pub const CACHELINE_SIZE: u32 = 64;
pub const MACROBLOCK_SIZE: u32 = 16;
pub const MIN_LCU_SIZE: u32 = 16;
pub const MIN_TILE_SIZE: u32 = 128;
/// Largest encodable frame width or height
pub const MAX_FRAME_DIMENSION: u32 = MAX_SURFACE_DIMENSION;

/// HCP PAK frame statistics per tile
const HCP_PAK_FRAME_STATS_SIZE: u32 = 9 * CACHELINE_SIZE;
/// VDENC statistics per tile
const VDENC_STATS_SIZE: u32 = 1216;
const PAK_INFO_SIZE: u32 = 256;
const BRC_HISTORY_SIZE: u32 = 6080;
const BRC_PAK_MMIO_SIZE: u32 = 64;
const BRC_DEBUG_SIZE: u32 = 0x1000;
const BRC_PAK_STATISTICS_SIZE: u32 = 256;
/// Stream-in record per 32x32 block
const STREAM_IN_RECORD_SIZE: u32 = CACHELINE_SIZE;

fn round_up_divide(value: u32, divisor: u32) -> u32 {
    value.div_ceil(divisor)
}

fn width_in_mb(width: u32) -> u32 {
    round_up_divide(width, MACROBLOCK_SIZE)
}

fn height_in_mb(height: u32) -> u32 {
    round_up_divide(height, MACROBLOCK_SIZE)
}

/// Geometry-dependent buffer sizing for one stream
#[derive(Debug, Clone)]
pub struct BasicFeature {
    width: u32,
    height: u32,
    lcu_size: u32,
    sync_depth: usize,
    pak_info_limit: usize,
    brc: bool,
}

impl BasicFeature {
    pub fn new(session: &SessionConfig, recycle: &RecycleConfig) -> Self {
        Self {
            width: session.width,
            height: session.height,
            lcu_size: session.lcu_size,
            sync_depth: session.sync_depth,
            pak_info_limit: recycle.pak_info_limit,
            brc: session.brc,
        }
    }

    pub fn frame_size(&self) -> (u32, u32) {
        (self.width, self.height)
    }

    /// Reject frame sizes the buffer math cannot represent
    pub fn validate_frame_size(width: u32, height: u32) -> PoolResult<()> {
        let in_range = |value: u32| (1..=MAX_FRAME_DIMENSION).contains(&value);
        if !in_range(width) || !in_range(height) {
            return Err(PoolError::InvalidParameter(format!(
                "frame size {}x{} outside 1..={}",
                width, height, MAX_FRAME_DIMENSION
            )));
        }
        Ok(())
    }

    /// Check the geometry this feature was built with
    pub fn validate(&self) -> PoolResult<()> {
        Self::validate_frame_size(self.width, self.height)?;
        if !matches!(self.lcu_size, 16 | 32 | 64) {
            return Err(PoolError::InvalidParameter(format!(
                "invalid LCU size {}",
                self.lcu_size
            )));
        }
        Ok(())
    }

    /// Update the frame size; returns whether it changed
    pub fn set_frame_size(&mut self, width: u32, height: u32) -> PoolResult<bool> {
        if (width, height) == (self.width, self.height) {
            return Ok(false);
        }
        Self::validate_frame_size(width, height)?;
        debug!(
            "Frame size {}x{} -> {}x{}",
            self.width, self.height, width, height
        );
        self.width = width;
        self.height = height;
        Ok(true)
    }

    fn num_of_lcu(&self) -> u32 {
        round_up_divide(self.width, self.lcu_size) * (round_up_divide(self.height, self.lcu_size) + 1)
    }

    fn max_tile_number(&self) -> u32 {
        round_up_divide(self.width, MIN_TILE_SIZE) * round_up_divide(self.height, MIN_TILE_SIZE)
    }

    /// PAK object/CU record output size
    pub fn mb_code_size(&self) -> usize {
        let lcus = self.num_of_lcu() as usize;
        align_up_usize(2 * 4 * (lcus * 5 + lcus * 64 * 8), PAGE_SIZE)
    }

    /// Collocated MV buffer size, covering both the 64x16 and 32x32 grids
    pub fn mv_temporal_size(&self) -> u32 {
        let mvt = align_up(((self.width + 63) >> 6) * ((self.height + 15) >> 4), 2) * CACHELINE_SIZE;
        let mvtb = align_up(((self.width + 31) >> 5) * ((self.height + 31) >> 5), 2) * CACHELINE_SIZE;
        mvt.max(mvtb)
    }

    /// 4x downscaled surface dimensions
    ///
    /// Height covers both fields and is Y-tile aligned per field.
    pub fn ds4x_size(&self) -> (u32, u32) {
        let width = width_in_mb(self.width / 4) * MACROBLOCK_SIZE;
        let field_height = ((height_in_mb(self.height / 4) + 1) >> 1) * MACROBLOCK_SIZE;
        let height = align_up(field_height, YTILE_H_ALIGNMENT) << 1;
        (width, height)
    }

    /// 8x downscaled surface dimensions
    pub fn ds8x_size(&self) -> (u32, u32) {
        let (width4x, height4x) = self.ds4x_size();
        (width4x >> 1, align_up(height4x >> 1, YTILE_H_ALIGNMENT) << 1)
    }

    /// Allocation parameters of every per-slot buffer at the current frame size
    pub fn tracked_buffer_params(&self) -> [(BufferType, AllocParams); 4] {
        let (ds4x_width, ds4x_height) = self.ds4x_size();
        let (ds8x_width, ds8x_height) = self.ds8x_size();
        [
            (
                BufferType::MbCodedBuffer,
                AllocParams::buffer("mbCodedBuffer", self.mb_code_size()),
            ),
            (
                BufferType::MvTemporalBuffer,
                AllocParams::buffer("mvTemporalBuffer", self.mv_temporal_size() as usize),
            ),
            (
                BufferType::Ds4xSurface,
                AllocParams::surface("4xDSSurface", ds4x_width, ds4x_height, SurfaceFormat::Nv12)
                    .with_compression(true),
            ),
            (
                BufferType::Ds8xSurface,
                AllocParams::surface("8xDSSurface", ds8x_width, ds8x_height, SurfaceFormat::Nv12)
                    .with_compression(true),
            ),
        ]
    }

    /// Register tracked buffer parameters for the current frame size
    pub fn update_tracked_buffer_parameters(&self, tracked: &TrackedBuffer) -> PoolResult<()> {
        for (buffer_type, params) in self.tracked_buffer_params() {
            tracked.register_param(buffer_type, params)?;
        }

        debug!(
            "Tracked buffers for {}x{}: mbCode {} bytes, mvTemporal {} bytes",
            self.width,
            self.height,
            self.mb_code_size(),
            self.mv_temporal_size()
        );
        Ok(())
    }

    /// Register per-frame recycled buffers for the current frame size
    pub fn register_recycle_resources(&self, recycle: &RecycleResource) -> PoolResult<()> {
        let tiles = self.max_tile_number();

        recycle.register_resource(
            RecycleResId::FrameStatStreamOutBuffer,
            AllocParams::buffer(
                "FrameStatStreamOutBuffer",
                align_up(HCP_PAK_FRAME_STATS_SIZE * tiles, PAGE_SIZE as u32) as usize,
            ),
            1,
        )?;
        recycle.register_resource(
            RecycleResId::VdencStatsBuffer,
            AllocParams::buffer("vdencStats", align_up(VDENC_STATS_SIZE * tiles, PAGE_SIZE as u32) as usize),
            1,
        )?;
        recycle.register_resource(
            RecycleResId::CuRecordStreamOutBuffer,
            AllocParams::buffer("CuRecordStreamOutBuffer", self.mb_code_size())
                .with_memory(MemoryPool::System),
            self.sync_depth,
        )?;

        let blocks = round_up_divide(self.width, 32) * round_up_divide(self.height, 32);
        recycle.register_default(
            RecycleResId::StreamInBuffer,
            AllocParams::buffer(
                "StreamInBuffer",
                align_up(blocks * STREAM_IN_RECORD_SIZE, PAGE_SIZE as u32) as usize,
            ),
        )?;

        if self.brc {
            self.register_brc_resources(recycle)?;
        }
        Ok(())
    }

    fn register_brc_resources(&self, recycle: &RecycleResource) -> PoolResult<()> {
        recycle.register_resource(
            RecycleResId::PakInfo,
            AllocParams::buffer("VDENC BRC PakInfo", align_up(PAK_INFO_SIZE, PAGE_SIZE as u32) as usize),
            self.pak_info_limit,
        )?;
        recycle.register_resource(
            RecycleResId::VdencBrcHistoryBuffer,
            AllocParams::buffer(
                "VDENC BRC History Buffer",
                align_up(BRC_HISTORY_SIZE, PAGE_SIZE as u32) as usize,
            ),
            1,
        )?;

        // One cacheline per slice, worst case one slice per minimum LCU
        let max_lcu = round_up_divide(self.width, MIN_LCU_SIZE) * round_up_divide(self.height, MIN_LCU_SIZE);
        recycle.register_resource(
            RecycleResId::LcuBaseAddressBuffer,
            AllocParams::buffer(
                "LcuBaseAddressBuffer",
                align_up(max_lcu * CACHELINE_SIZE, PAGE_SIZE as u32) as usize,
            ),
            1,
        )?;
        recycle.register_resource(
            RecycleResId::VdencBrcPakMmioBuffer,
            AllocParams::buffer("VDENC BRC PAK MMIO Buffer", BRC_PAK_MMIO_SIZE as usize),
            1,
        )?;
        recycle.register_resource(
            RecycleResId::VdencBrcDebugBuffer,
            AllocParams::buffer("VDENC BRC Debug Buffer", align_up(BRC_DEBUG_SIZE, PAGE_SIZE as u32) as usize),
            1,
        )?;
        recycle.register_default(
            RecycleResId::BrcPakStatisticBuffer,
            AllocParams::buffer("BRC PAK Statistics Buffer", BRC_PAK_STATISTICS_SIZE as usize),
        )?;
        Ok(())
    }
}
