//! Calibration artifact loading, validation, caching and hot-reload
//! (spec §4.10, §6 binary format).

use crate::error::{CoreError, CoreResult};
use crate::model::calibration::{
    CalibrationArtifact, CalibrationPayload, CalibrationType, DefectCorrectionMethod, DefectEntry,
    ScatterParams, FORMAT_VERSION, MAGIC,
};
use parking_lot::RwLock;
use sha2::{Digest, Sha256};
use std::collections::HashMap;
use std::time::Duration;

const HEADER_LEN: usize = 58;

/// Read header -> validate magic/version/type/dimensions/age -> read
/// payload -> recompute hash -> compare to header hash (spec §4.10).
pub fn parse_artifact(bytes: &[u8], max_age: Duration, now_us: u64) -> CoreResult<CalibrationArtifact> {
    if bytes.len() < HEADER_LEN {
        return Err(CoreError::Calibration(
            "file shorter than the calibration header".into(),
        ));
    }
    if bytes[0..4] != MAGIC {
        return Err(CoreError::Calibration("bad magic header".into()));
    }
    let format_version = u16::from_le_bytes([bytes[4], bytes[5]]);
    if format_version != FORMAT_VERSION {
        return Err(CoreError::Calibration(format!(
            "unsupported calibration format version {format_version}"
        )));
    }
    let type_code = u32::from_le_bytes(bytes[6..10].try_into().unwrap());
    let artifact_type = CalibrationType::from_code(type_code).ok_or_else(|| {
        CoreError::Calibration(format!("unknown calibration type code {type_code}"))
    })?;
    let width = u32::from_le_bytes(bytes[10..14].try_into().unwrap());
    let height = u32::from_le_bytes(bytes[14..18].try_into().unwrap());
    let acquisition_timestamp_us = u64::from_le_bytes(bytes[18..26].try_into().unwrap());
    let mut payload_hash = [0u8; 32];
    payload_hash.copy_from_slice(&bytes[26..58]);

    let age_us = now_us.saturating_sub(acquisition_timestamp_us);
    if Duration::from_micros(age_us) > max_age {
        return Err(CoreError::Calibration(
            "calibration artifact is stale (acquisition timestamp exceeds configured max age)".into(),
        ));
    }

    let payload_bytes = &bytes[HEADER_LEN..];
    let mut hasher = Sha256::new();
    hasher.update(payload_bytes);
    let computed: [u8; 32] = hasher.finalize().into();
    if computed != payload_hash {
        return Err(CoreError::Calibration("payload hash mismatch".into()));
    }

    let payload = decode_payload(artifact_type, width, height, payload_bytes)?;

    Ok(CalibrationArtifact {
        format_version,
        artifact_type,
        width,
        height,
        acquisition_timestamp_us,
        payload_hash,
        payload,
    })
}

fn decode_payload(
    artifact_type: CalibrationType,
    width: u32,
    height: u32,
    bytes: &[u8],
) -> CoreResult<CalibrationPayload> {
    match artifact_type {
        CalibrationType::DarkFrame | CalibrationType::GainMap => {
            let count = width as usize * height as usize;
            if bytes.len() != count * 4 {
                return Err(CoreError::Calibration(
                    "float matrix payload length does not match width*height".into(),
                ));
            }
            let values: Vec<f32> = bytes
                .chunks_exact(4)
                .map(|c| f32::from_le_bytes(c.try_into().unwrap()))
                .collect();
            Ok(if artifact_type == CalibrationType::DarkFrame {
                CalibrationPayload::DarkFrame(values)
            } else {
                CalibrationPayload::GainMap(values)
            })
        }
        CalibrationType::DefectMap => {
            if bytes.len() < 4 {
                return Err(CoreError::Calibration(
                    "defect map payload missing count prefix".into(),
                ));
            }
            let count = u32::from_le_bytes(bytes[0..4].try_into().unwrap()) as usize;
            let mut entries = Vec::with_capacity(count);
            let mut offset = 4usize;
            for _ in 0..count {
                if offset + 9 > bytes.len() {
                    return Err(CoreError::Calibration("defect map payload truncated".into()));
                }
                let x = u32::from_le_bytes(bytes[offset..offset + 4].try_into().unwrap());
                let y = u32::from_le_bytes(bytes[offset + 4..offset + 8].try_into().unwrap());
                let method = match bytes[offset + 8] {
                    0 => DefectCorrectionMethod::NearestNeighbor,
                    1 => DefectCorrectionMethod::Bilinear,
                    2 => DefectCorrectionMethod::Median3x3,
                    other => {
                        return Err(CoreError::Calibration(format!(
                            "unknown defect correction method code {other}"
                        )))
                    }
                };
                entries.push(DefectEntry { x, y, method });
                offset += 9;
            }
            Ok(CalibrationPayload::DefectMap(entries))
        }
        CalibrationType::ScatterParams => {
            if bytes.len() != 8 {
                return Err(CoreError::Calibration(
                    "scatter params payload must be exactly 8 bytes".into(),
                ));
            }
            let cutoff_frequency = f32::from_le_bytes(bytes[0..4].try_into().unwrap());
            let suppression_ratio = f32::from_le_bytes(bytes[4..8].try_into().unwrap());
            Ok(CalibrationPayload::ScatterParams(ScatterParams {
                cutoff_frequency,
                suppression_ratio,
            }))
        }
    }
}

/// Loads, validates, caches and hot-reloads calibration artifacts. A failed
/// load never evicts the existing cache entry for that type (spec §4.10);
/// a successful one atomically replaces it, visible to the very next frame
/// the pipeline processes.
pub struct CalibrationManager {
    cache: RwLock<HashMap<CalibrationType, CalibrationArtifact>>,
    max_age: Duration,
}

impl CalibrationManager {
    pub fn new(max_age: Duration) -> Self {
        Self {
            cache: RwLock::new(HashMap::new()),
            max_age,
        }
    }

    pub fn load_bytes(&self, bytes: &[u8], now_us: u64) -> CoreResult<()> {
        let artifact = parse_artifact(bytes, self.max_age, now_us).map_err(|e| {
            tracing::error!(error = %e, "calibration artifact load failed, keeping existing cache entry");
            e
        })?;
        tracing::info!(artifact_type = ?artifact.artifact_type, "calibration artifact loaded");
        self.cache.write().insert(artifact.artifact_type, artifact);
        Ok(())
    }

    pub fn get(&self, artifact_type: CalibrationType) -> Option<CalibrationArtifact> {
        self.cache.read().get(&artifact_type).cloned()
    }

    #[cfg(test)]
    pub fn cache_for_test(&self, artifact: CalibrationArtifact) {
        self.cache.write().insert(artifact.artifact_type, artifact);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn build_scatter_params_file(cutoff: f32, suppression: f32, timestamp_us: u64) -> Vec<u8> {
        let mut payload = Vec::new();
        payload.extend_from_slice(&cutoff.to_le_bytes());
        payload.extend_from_slice(&suppression.to_le_bytes());

        let mut hasher = Sha256::new();
        hasher.update(&payload);
        let hash: [u8; 32] = hasher.finalize().into();

        let mut file = Vec::new();
        file.extend_from_slice(&MAGIC);
        file.extend_from_slice(&FORMAT_VERSION.to_le_bytes());
        file.extend_from_slice(&CalibrationType::ScatterParams.code().to_le_bytes());
        file.extend_from_slice(&0u32.to_le_bytes()); // width (unused for scatter params)
        file.extend_from_slice(&0u32.to_le_bytes()); // height
        file.extend_from_slice(&timestamp_us.to_le_bytes());
        file.extend_from_slice(&hash);
        file.extend_from_slice(&payload);
        file
    }

    #[test]
    fn round_trips_scatter_params() {
        let bytes = build_scatter_params_file(0.3, 0.8, 1_000_000);
        let artifact = parse_artifact(&bytes, Duration::from_secs(3600), 1_000_500).unwrap();
        match artifact.payload {
            CalibrationPayload::ScatterParams(p) => {
                assert!((p.cutoff_frequency - 0.3).abs() < 1e-6);
                assert!((p.suppression_ratio - 0.8).abs() < 1e-6);
            }
            other => panic!("expected ScatterParams, got {:?}", other),
        }
    }

    #[test]
    fn corrupted_hash_is_rejected() {
        let mut bytes = build_scatter_params_file(0.3, 0.8, 0);
        let last = bytes.len() - 1;
        bytes[last] ^= 0xFF;
        assert!(parse_artifact(&bytes, Duration::from_secs(3600), 0).is_err());
    }

    #[test]
    fn stale_artifact_is_rejected() {
        let bytes = build_scatter_params_file(0.3, 0.8, 0);
        let err = parse_artifact(&bytes, Duration::from_secs(10), 1_000_000_000).unwrap_err();
        assert!(matches!(err, CoreError::Calibration(_)));
    }

    #[test]
    fn loads_from_a_file_on_disk() {
        use std::io::Write;
        let bytes = build_scatter_params_file(0.3, 0.8, 0);
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(&bytes).unwrap();
        let on_disk = std::fs::read(file.path()).unwrap();

        let manager = CalibrationManager::new(Duration::from_secs(3600));
        manager.load_bytes(&on_disk, 0).unwrap();
        assert!(manager.get(CalibrationType::ScatterParams).is_some());
    }

    #[test]
    fn failed_load_does_not_evict_existing_entry() {
        let manager = CalibrationManager::new(Duration::from_secs(3600));
        let good = build_scatter_params_file(0.3, 0.8, 0);
        manager.load_bytes(&good, 0).unwrap();
        assert!(manager.get(CalibrationType::ScatterParams).is_some());

        let mut corrupted = build_scatter_params_file(0.1, 0.1, 0);
        let last = corrupted.len() - 1;
        corrupted[last] ^= 0xFF;
        assert!(manager.load_bytes(&corrupted, 0).is_err());

        let cached = manager.get(CalibrationType::ScatterParams).unwrap();
        match cached.payload {
            CalibrationPayload::ScatterParams(p) => assert!((p.cutoff_frequency - 0.3).abs() < 1e-6),
            other => panic!("expected ScatterParams, got {:?}", other),
        }
    }
}
