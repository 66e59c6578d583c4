//! Image processing pipeline orchestration (spec §4.8): runs the correction
//! stages in order against live calibration artifacts, timing each one.

use std::fmt;
use std::time::Instant;

use crate::error::{CoreError, CoreResult};
use crate::imaging::calibration_manager::CalibrationManager;
use crate::imaging::stages::{self, NoiseReductionMethod};
use crate::model::calibration::{CalibrationPayload, CalibrationType};
use crate::model::frame::Frame;
use std::sync::Arc;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PipelineMode {
    /// Only offset correction, gain correction and window/level.
    Preview,
    /// Every stage enabled by `PipelineConfig`.
    FullPipeline,
}

/// Elapsed time of one stage, in microseconds.
#[derive(Debug, Clone, Copy)]
pub struct StageTiming {
    pub stage: &'static str,
    pub elapsed_us: u64,
}

/// Stage failure: which named stage aborted the pipeline, and why.
#[derive(Debug)]
pub struct PipelineError {
    pub stage: &'static str,
    pub source: CoreError,
}

impl fmt::Display for PipelineError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "pipeline stage '{}' failed: {}", self.stage, self.source)
    }
}

impl std::error::Error for PipelineError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        Some(&self.source)
    }
}

#[derive(Debug, Clone)]
pub struct PipelineConfig {
    pub run_scatter_correction: bool,
    pub noise_reduction: Option<(NoiseReductionMethod, u32, f64)>,
    pub run_flatten: bool,
    pub flatten_structuring_element: u32,
    pub window: f64,
    pub level: f64,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            run_scatter_correction: false,
            noise_reduction: None,
            run_flatten: false,
            flatten_structuring_element: 5,
            window: 65535.0,
            level: 32768.0,
        }
    }
}

pub struct PipelineResult {
    pub frame: Frame,
    pub timings: Vec<StageTiming>,
}

/// Runs stages 1-7 of spec §4.8 against a [`CalibrationManager`], timing
/// each one. `Preview` mode only runs offset, gain and window/level;
/// `FullPipeline` runs every stage `config` enables.
pub struct Pipeline {
    calibration: Arc<CalibrationManager>,
}

fn run_stage<F>(
    stage: &'static str,
    timings: &mut Vec<StageTiming>,
    f: F,
) -> Result<Frame, PipelineError>
where
    F: FnOnce() -> CoreResult<Frame>,
{
    let start = Instant::now();
    let result = f();
    let elapsed_us = start.elapsed().as_micros() as u64;
    timings.push(StageTiming { stage, elapsed_us });
    result.map_err(|source| PipelineError { stage, source })
}

impl Pipeline {
    pub fn new(calibration: Arc<CalibrationManager>) -> Self {
        Self { calibration }
    }

    fn dark_frame(&self, frame: &Frame) -> Result<Vec<f32>, PipelineError> {
        let artifact = self
            .calibration
            .get(CalibrationType::DarkFrame)
            .ok_or_else(|| PipelineError {
                stage: "offset_correction",
                source: CoreError::Calibration("no DarkFrame calibration loaded".into()),
            })?;
        if !artifact.dimensions_match(frame.width, frame.height) {
            return Err(PipelineError {
                stage: "offset_correction",
                source: CoreError::Calibration(format!(
                    "DarkFrame calibration is {}x{}, frame is {}x{}",
                    artifact.width, artifact.height, frame.width, frame.height
                )),
            });
        }
        match artifact.payload {
            CalibrationPayload::DarkFrame(v) => Ok(v),
            _ => Err(PipelineError {
                stage: "offset_correction",
                source: CoreError::Calibration("cached artifact is not a DarkFrame".into()),
            }),
        }
    }

    fn gain_map(&self, frame: &Frame) -> Result<Vec<f32>, PipelineError> {
        let artifact = self
            .calibration
            .get(CalibrationType::GainMap)
            .ok_or_else(|| PipelineError {
                stage: "gain_correction",
                source: CoreError::Calibration("no GainMap calibration loaded".into()),
            })?;
        if !artifact.dimensions_match(frame.width, frame.height) {
            return Err(PipelineError {
                stage: "gain_correction",
                source: CoreError::Calibration(format!(
                    "GainMap calibration is {}x{}, frame is {}x{}",
                    artifact.width, artifact.height, frame.width, frame.height
                )),
            });
        }
        match artifact.payload {
            CalibrationPayload::GainMap(v) => Ok(v),
            _ => Err(PipelineError {
                stage: "gain_correction",
                source: CoreError::Calibration("cached artifact is not a GainMap".into()),
            }),
        }
    }

    fn defect_map(&self, frame: &Frame) -> Result<Vec<crate::model::calibration::DefectEntry>, PipelineError> {
        let artifact = self
            .calibration
            .get(CalibrationType::DefectMap)
            .ok_or_else(|| PipelineError {
                stage: "defect_correction",
                source: CoreError::Calibration("no DefectMap calibration loaded".into()),
            })?;
        if !artifact.dimensions_match(frame.width, frame.height) {
            return Err(PipelineError {
                stage: "defect_correction",
                source: CoreError::Calibration(format!(
                    "DefectMap calibration is {}x{}, frame is {}x{}",
                    artifact.width, artifact.height, frame.width, frame.height
                )),
            });
        }
        match artifact.payload {
            CalibrationPayload::DefectMap(v) => Ok(v),
            _ => Err(PipelineError {
                stage: "defect_correction",
                source: CoreError::Calibration("cached artifact is not a DefectMap".into()),
            }),
        }
    }

    fn scatter_params(&self) -> Result<crate::model::calibration::ScatterParams, PipelineError> {
        let artifact = self
            .calibration
            .get(CalibrationType::ScatterParams)
            .ok_or_else(|| PipelineError {
                stage: "scatter_correction",
                source: CoreError::Calibration("no ScatterParams calibration loaded".into()),
            })?;
        match artifact.payload {
            CalibrationPayload::ScatterParams(p) => Ok(p),
            _ => Err(PipelineError {
                stage: "scatter_correction",
                source: CoreError::Calibration("cached artifact is not ScatterParams".into()),
            }),
        }
    }

    pub fn run(
        &self,
        frame: &Frame,
        mode: PipelineMode,
        config: &PipelineConfig,
    ) -> Result<PipelineResult, PipelineError> {
        let mut timings = Vec::new();

        let dark = self.dark_frame(frame)?;
        let mut current = run_stage("offset_correction", &mut timings, || {
            stages::offset_correction(frame, &dark)
        })?;

        let gain = self.gain_map(frame)?;
        current = run_stage("gain_correction", &mut timings, || {
            stages::gain_correction(&current, &gain)
        })?;

        if matches!(mode, PipelineMode::FullPipeline) {
            let defects = self.defect_map(frame)?;
            current = run_stage("defect_correction", &mut timings, || {
                stages::defect_correction(&current, &defects)
            })?;

            if config.run_scatter_correction {
                let params = self.scatter_params()?;
                current = run_stage("scatter_correction", &mut timings, || {
                    stages::scatter_correction(&current, &params)
                })?;
            }

            if let Some((method, kernel_size, sigma)) = config.noise_reduction {
                current = run_stage("noise_reduction", &mut timings, || {
                    stages::noise_reduction(&current, method, kernel_size, sigma)
                })?;
            }

            if config.run_flatten {
                let structuring_element = config.flatten_structuring_element;
                current = run_stage("flatten", &mut timings, || {
                    stages::flatten(&current, structuring_element)
                })?;
            }
        }

        let window = config.window;
        let level = config.level;
        current = run_stage("window_level", &mut timings, || {
            stages::window_level(&current, window, level)
        })?;

        Ok(PipelineResult {
            frame: current,
            timings,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::calibration::{CalibrationArtifact, FORMAT_VERSION};
    use std::time::Duration;

    fn artifact(artifact_type: CalibrationType, payload: CalibrationPayload) -> CalibrationArtifact {
        CalibrationArtifact {
            format_version: FORMAT_VERSION,
            artifact_type,
            width: 2,
            height: 2,
            acquisition_timestamp_us: 0,
            payload_hash: [0u8; 32],
            payload,
        }
    }

    fn manager_with(dark: Vec<f32>, gain: Vec<f32>) -> CalibrationManager {
        let manager = CalibrationManager::new(Duration::from_secs(3600));
        manager
            .cache_for_test(artifact(CalibrationType::DarkFrame, CalibrationPayload::DarkFrame(dark)));
        manager
            .cache_for_test(artifact(CalibrationType::GainMap, CalibrationPayload::GainMap(gain)));
        manager
    }

    #[test]
    fn preview_mode_skips_defect_and_conditional_stages() {
        let manager = Arc::new(manager_with(vec![0.0; 4], vec![1.0; 4]));
        let pipeline = Pipeline::new(manager);
        let frame = Frame::new(1, 0, 2, 2, 1);
        let config = PipelineConfig::default();
        let result = pipeline.run(&frame, PipelineMode::Preview, &config).unwrap();
        let stage_names: Vec<&str> = result.timings.iter().map(|t| t.stage).collect();
        assert_eq!(stage_names, vec!["offset_correction", "gain_correction", "window_level"]);
    }

    #[test]
    fn missing_dark_frame_aborts_with_stage_name() {
        let manager = Arc::new(CalibrationManager::new(Duration::from_secs(3600)));
        let pipeline = Pipeline::new(manager);
        let frame = Frame::new(1, 0, 2, 2, 1);
        let config = PipelineConfig::default();
        let err = pipeline.run(&frame, PipelineMode::Preview, &config).unwrap_err();
        assert_eq!(err.stage, "offset_correction");
    }

    #[test]
    fn transposed_dimension_calibration_is_rejected() {
        // Same pixel count (4), transposed dimensions: a 4x2 dark frame
        // against a 2x4 frame must not pass just because the lengths match.
        let manager = CalibrationManager::new(Duration::from_secs(3600));
        let mut dark = artifact(CalibrationType::DarkFrame, CalibrationPayload::DarkFrame(vec![0.0; 8]));
        dark.width = 4;
        dark.height = 2;
        manager.cache_for_test(dark);
        manager.cache_for_test(artifact(CalibrationType::GainMap, CalibrationPayload::GainMap(vec![1.0; 8])));
        let pipeline = Pipeline::new(Arc::new(manager));
        let frame = Frame::new(1, 0, 2, 4, 1);
        let config = PipelineConfig::default();
        let err = pipeline.run(&frame, PipelineMode::Preview, &config).unwrap_err();
        assert_eq!(err.stage, "offset_correction");
    }

    #[test]
    fn full_pipeline_runs_defect_stage() {
        let manager = Arc::new(manager_with(vec![0.0; 4], vec![1.0; 4]));
        manager.cache_for_test(artifact(CalibrationType::DefectMap, CalibrationPayload::DefectMap(vec![])));
        let pipeline = Pipeline::new(manager);
        let frame = Frame::new(1, 0, 2, 2, 1);
        let config = PipelineConfig::default();
        let result = pipeline.run(&frame, PipelineMode::FullPipeline, &config).unwrap();
        let stage_names: Vec<&str> = result.timings.iter().map(|t| t.stage).collect();
        assert_eq!(stage_names, vec!["offset_correction", "gain_correction", "defect_correction", "window_level"]);
    }
}
