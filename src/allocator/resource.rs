//! Resource descriptors: allocation parameters, layouts and handles

use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::buffers::{PoolError, PoolResult};

/// Page size used to align linear buffer allocations
pub const PAGE_SIZE: usize = 4096;

/// Largest surface width or height the pools allocate
pub const MAX_SURFACE_DIMENSION: u32 = 16384;

/// Height alignment of Y-tiled surfaces
pub const YTILE_H_ALIGNMENT: u32 = 32;

/// Pitch alignment of Y-tiled surfaces
const YTILE_W_ALIGNMENT: u32 = 128;

/// Pitch alignment of linear surfaces
const LINEAR_PITCH_ALIGNMENT: u32 = 64;

/// Round `value` up to a multiple of `align` (power of two or not)
pub fn align_up(value: u32, align: u32) -> u32 {
    if align == 0 {
        return value;
    }
    value.div_ceil(align) * align
}

/// Round `value` up to a multiple of `align`
pub fn align_up_usize(value: usize, align: usize) -> usize {
    if align == 0 {
        return value;
    }
    value.div_ceil(align) * align
}

/// Whether a resource is a linear buffer or a 2D surface
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ResourceKind {
    Buffer,
    Surface,
}

impl std::fmt::Display for ResourceKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Buffer => write!(f, "buffer"),
            Self::Surface => write!(f, "surface"),
        }
    }
}

/// Pixel formats the encode pools allocate
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SurfaceFormat {
    /// Raw bytes, linear buffers only
    Buffer,
    /// 8-bit 4:2:0, interleaved UV plane
    Nv12,
    /// 10-bit 4:2:0 in 16-bit containers
    P010,
    /// Single 8-bit plane
    R8,
    /// Packed 8-bit ARGB
    A8r8g8b8,
}

impl SurfaceFormat {
    /// Bytes per luma sample
    pub fn bytes_per_sample(&self) -> u32 {
        match self {
            Self::Buffer | Self::Nv12 | Self::R8 => 1,
            Self::P010 => 2,
            Self::A8r8g8b8 => 4,
        }
    }

    /// Whether the format carries a half-height chroma plane after luma
    pub fn has_chroma_plane(&self) -> bool {
        matches!(self, Self::Nv12 | Self::P010)
    }
}

/// Memory tiling of a surface
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TileType {
    #[default]
    Linear,
    Y,
}

/// Memory pool a resource should be placed in
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MemoryPool {
    #[default]
    Device,
    System,
}

/// Memory compression state of a surface
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MmcMode {
    #[default]
    Disabled,
    Horizontal,
    Vertical,
    MediaCompressed,
    RenderCompressed,
}

impl MmcMode {
    pub fn is_compressed(&self) -> bool {
        !matches!(self, Self::Disabled)
    }
}

/// Allocation parameters registered per buffer type
///
/// Two resources allocated from equal parameters are interchangeable,
/// which is what lets a queue hand them out to any slot.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AllocParams {
    /// Label used in logs
    pub name: String,

    pub kind: ResourceKind,

    /// Size in bytes (linear buffers)
    pub bytes: usize,

    /// Width in pixels (surfaces)
    pub width: u32,

    /// Height in pixels (surfaces)
    pub height: u32,

    pub format: SurfaceFormat,

    pub tile: TileType,

    pub memory: MemoryPool,

    /// Request memory compression when the surface is created
    pub compressible: bool,
}

impl AllocParams {
    /// Linear buffer of `bytes` bytes
    pub fn buffer(name: impl Into<String>, bytes: usize) -> Self {
        Self {
            name: name.into(),
            kind: ResourceKind::Buffer,
            bytes,
            width: 0,
            height: 0,
            format: SurfaceFormat::Buffer,
            tile: TileType::Linear,
            memory: MemoryPool::Device,
            compressible: false,
        }
    }

    /// Y-tiled 2D surface
    pub fn surface(name: impl Into<String>, width: u32, height: u32, format: SurfaceFormat) -> Self {
        Self {
            name: name.into(),
            kind: ResourceKind::Surface,
            bytes: 0,
            width,
            height,
            format,
            tile: TileType::Y,
            memory: MemoryPool::Device,
            compressible: false,
        }
    }

    pub fn with_tile(mut self, tile: TileType) -> Self {
        self.tile = tile;
        self
    }

    pub fn with_memory(mut self, memory: MemoryPool) -> Self {
        self.memory = memory;
        self
    }

    pub fn with_compression(mut self, compressible: bool) -> Self {
        self.compressible = compressible;
        self
    }

    /// Validate and compute the memory layout
    pub fn layout(&self) -> PoolResult<ResourceLayout> {
        match self.kind {
            ResourceKind::Buffer => {
                if self.bytes == 0 {
                    return Err(PoolError::InvalidParameter(format!(
                        "{}: buffer size must be non-zero",
                        self.name
                    )));
                }
                if self.format != SurfaceFormat::Buffer {
                    return Err(PoolError::InvalidParameter(format!(
                        "{}: linear buffer cannot use format {:?}",
                        self.name, self.format
                    )));
                }
                Ok(ResourceLayout {
                    size: self.bytes,
                    pitch: 0,
                    aligned_height: 0,
                    uv_offset: None,
                })
            }
            ResourceKind::Surface => {
                if self.width == 0 || self.height == 0 {
                    return Err(PoolError::InvalidParameter(format!(
                        "{}: invalid surface dimensions {}x{}",
                        self.name, self.width, self.height
                    )));
                }
                if self.width > MAX_SURFACE_DIMENSION || self.height > MAX_SURFACE_DIMENSION {
                    return Err(PoolError::InvalidParameter(format!(
                        "{}: surface {}x{} exceeds the {} pixel limit",
                        self.name, self.width, self.height, MAX_SURFACE_DIMENSION
                    )));
                }
                if self.format == SurfaceFormat::Buffer {
                    return Err(PoolError::InvalidParameter(format!(
                        "{}: surfaces need a pixel format",
                        self.name
                    )));
                }
                if self.format.has_chroma_plane() && (self.width % 2 != 0 || self.height % 2 != 0)
                {
                    return Err(PoolError::InvalidParameter(format!(
                        "{}: 4:2:0 surface dimensions must be even, got {}x{}",
                        self.name, self.width, self.height
                    )));
                }

                let (pitch_align, height_align) = match self.tile {
                    TileType::Linear => (LINEAR_PITCH_ALIGNMENT, 1),
                    TileType::Y => (YTILE_W_ALIGNMENT, YTILE_H_ALIGNMENT),
                };
                let pitch = align_up(self.width * self.format.bytes_per_sample(), pitch_align);
                let aligned_height = align_up(self.height, height_align);
                let luma = pitch as usize * aligned_height as usize;

                let (size, uv_offset) = if self.format.has_chroma_plane() {
                    let chroma_height = align_up(aligned_height / 2, height_align);
                    (luma + pitch as usize * chroma_height as usize, Some(luma))
                } else {
                    (luma, None)
                };

                Ok(ResourceLayout {
                    size,
                    pitch,
                    aligned_height,
                    uv_offset,
                })
            }
        }
    }
}

/// Computed memory layout of an allocation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResourceLayout {
    /// Total size in bytes
    pub size: usize,
    /// Row pitch in bytes (0 for linear buffers)
    pub pitch: u32,
    /// Allocated height in rows (0 for linear buffers)
    pub aligned_height: u32,
    /// Byte offset of the chroma plane
    pub uv_offset: Option<usize>,
}

/// Backend handle identifying one allocation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ResourceId(pub u64);

impl std::fmt::Display for ResourceId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "res#{}", self.0)
    }
}

/// An allocated GPU resource
///
/// Handed around as [`ResourceHandle`]. Identity is the backend id, so two
/// handles compare equal only if they name the same allocation.
#[derive(Debug)]
pub struct GpuResource {
    id: ResourceId,
    params: AllocParams,
    layout: ResourceLayout,
}

impl GpuResource {
    pub(crate) fn new(id: ResourceId, params: AllocParams, layout: ResourceLayout) -> Self {
        Self { id, params, layout }
    }

    pub fn id(&self) -> ResourceId {
        self.id
    }

    pub fn kind(&self) -> ResourceKind {
        self.params.kind
    }

    pub fn name(&self) -> &str {
        &self.params.name
    }

    pub fn params(&self) -> &AllocParams {
        &self.params
    }

    pub fn layout(&self) -> &ResourceLayout {
        &self.layout
    }

    pub fn size(&self) -> usize {
        self.layout.size
    }
}

impl PartialEq for GpuResource {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl Eq for GpuResource {}

/// Shared handle to an allocated resource
pub type ResourceHandle = Arc<GpuResource>;

/// Surface description returned by `EncodeAllocator::surface_info`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SurfaceInfo {
    pub width: u32,
    pub height: u32,
    pub pitch: u32,
    pub format: SurfaceFormat,
    pub tile: TileType,
    pub uv_offset: Option<usize>,
    pub mmc_mode: MmcMode,
}
