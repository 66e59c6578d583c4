//! Image processing: correction stages, calibration artifact management,
//! and pipeline orchestration (spec §4.8, §4.10).

pub mod calibration_manager;
pub mod pipeline;
pub mod stages;

pub use calibration_manager::{parse_artifact, CalibrationManager};
pub use pipeline::{Pipeline, PipelineConfig, PipelineError, PipelineMode, PipelineResult, StageTiming};
pub use stages::NoiseReductionMethod;
