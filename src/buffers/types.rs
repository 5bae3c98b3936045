//! Buffer identifiers shared by the tracked and recycled pools

use serde::{Deserialize, Serialize};

/// Per-reference-frame resource kinds held by a tracked buffer slot
///
/// Each type owns one [`BufferQueue`](super::BufferQueue) inside the
/// [`TrackedBuffer`](super::TrackedBuffer) once allocation parameters are
/// registered for it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum BufferType {
    /// PAK macroblock/CU record output
    MbCodedBuffer,
    /// Collocated motion vectors for temporal MV prediction
    MvTemporalBuffer,
    /// 4x downscaled reconstructed picture (HME)
    Ds4xSurface,
    /// 8x downscaled reconstructed picture (HME)
    Ds8xSurface,
    /// 16x downscaled reconstructed picture (HME)
    Ds16xSurface,
    /// AV1 reconstructed picture after CDEF
    PostCdefReconSurface,
    /// Pre-encode reference picture
    PreRefSurface,
    /// Pre-encode 4x downscaled reference
    PreDs4xSurface,
    /// Pre-encode 8x downscaled reference
    PreDs8xSurface,
    /// VP9/AV1 segment map stream-out
    SegmentIdStreamOutBuffer,
    /// AV1 backward-adapted CDF tables
    BwdAdaptCdfBuffer,
}

impl BufferType {
    /// Name used in logs and allocation labels
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::MbCodedBuffer => "mbCodedBuffer",
            Self::MvTemporalBuffer => "mvTemporalBuffer",
            Self::Ds4xSurface => "ds4xSurface",
            Self::Ds8xSurface => "ds8xSurface",
            Self::Ds16xSurface => "ds16xSurface",
            Self::PostCdefReconSurface => "postCdefReconSurface",
            Self::PreRefSurface => "preRefSurface",
            Self::PreDs4xSurface => "preDs4xSurface",
            Self::PreDs8xSurface => "preDs8xSurface",
            Self::SegmentIdStreamOutBuffer => "segmentIdStreamOutBuffer",
            Self::BwdAdaptCdfBuffer => "bwdAdaptCdfBuffer",
        }
    }
}

impl std::fmt::Display for BufferType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Identifiers for round-robin recycled resources
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum RecycleResId {
    StreamInBuffer,
    PakInfo,
    FrameStatStreamOutBuffer,
    VdencStatsBuffer,
    CuRecordStreamOutBuffer,
    VdencBrcHistoryBuffer,
    LcuBaseAddressBuffer,
    VdencBrcPakMmioBuffer,
    VdencBrcDebugBuffer,
    BrcPakStatisticBuffer,
    PreEncRef0,
    PreEncRef1,
    PreEncRawSurface,
}

impl RecycleResId {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::StreamInBuffer => "streamInBuffer",
            Self::PakInfo => "pakInfo",
            Self::FrameStatStreamOutBuffer => "frameStatStreamOutBuffer",
            Self::VdencStatsBuffer => "vdencStatsBuffer",
            Self::CuRecordStreamOutBuffer => "cuRecordStreamOutBuffer",
            Self::VdencBrcHistoryBuffer => "vdencBrcHistoryBuffer",
            Self::LcuBaseAddressBuffer => "lcuBaseAddressBuffer",
            Self::VdencBrcPakMmioBuffer => "vdencBrcPakMmioBuffer",
            Self::VdencBrcDebugBuffer => "vdencBrcDebugBuffer",
            Self::BrcPakStatisticBuffer => "brcPakStatisticBuffer",
            Self::PreEncRef0 => "preEncRef0",
            Self::PreEncRef1 => "preEncRef1",
            Self::PreEncRawSurface => "preEncRawSurface",
        }
    }
}

impl std::fmt::Display for RecycleResId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_buffer_type_display_matches_serde_name() {
        let json = serde_json::to_string(&BufferType::MvTemporalBuffer).unwrap();
        assert_eq!(json, "\"mvTemporalBuffer\"");
        assert_eq!(BufferType::MvTemporalBuffer.to_string(), "mvTemporalBuffer");
    }

    #[test]
    fn test_recycle_id_display_matches_serde_name() {
        let json = serde_json::to_string(&RecycleResId::VdencBrcHistoryBuffer).unwrap();
        assert_eq!(json, "\"vdencBrcHistoryBuffer\"");
        assert_eq!(
            RecycleResId::VdencBrcHistoryBuffer.to_string(),
            "vdencBrcHistoryBuffer"
        );
    }
}
