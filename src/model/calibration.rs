//! Calibration artifact data model (spec §3, §6 binary format).

use serde::{Deserialize, Serialize};

pub const MAGIC: [u8; 4] = [b'H', b'N', b'C', 0x01];
pub const FORMAT_VERSION: u16 = 1;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum CalibrationType {
    DarkFrame = 1,
    GainMap = 2,
    DefectMap = 3,
    ScatterParams = 4,
}

impl CalibrationType {
    pub fn from_code(code: u32) -> Option<Self> {
        match code {
            1 => Some(Self::DarkFrame),
            2 => Some(Self::GainMap),
            3 => Some(Self::DefectMap),
            4 => Some(Self::ScatterParams),
            _ => None,
        }
    }

    pub fn code(self) -> u32 {
        self as u32
    }
}

/// One entry of a defect pixel map (spec §4.8 stage 3).
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct DefectEntry {
    pub x: u32,
    pub y: u32,
    pub method: DefectCorrectionMethod,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DefectCorrectionMethod {
    NearestNeighbor,
    Bilinear,
    Median3x3,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ScatterParams {
    pub cutoff_frequency: f32,
    pub suppression_ratio: f32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum CalibrationPayload {
    DarkFrame(Vec<f32>),
    GainMap(Vec<f32>),
    DefectMap(Vec<DefectEntry>),
    ScatterParams(ScatterParams),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CalibrationArtifact {
    pub format_version: u16,
    pub artifact_type: CalibrationType,
    pub width: u32,
    pub height: u32,
    pub acquisition_timestamp_us: u64,
    pub payload_hash: [u8; 32],
    pub payload: CalibrationPayload,
}

impl CalibrationArtifact {
    pub fn dimensions_match(&self, width: u32, height: u32) -> bool {
        self.width == width && self.height == height
    }
}
