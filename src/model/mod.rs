//! Core data model (spec §3).

pub mod calibration;
pub mod exposure;
pub mod frame;
pub mod generator_state;
pub mod interlock;
pub mod protocol;
pub mod state;

pub use calibration::{CalibrationArtifact, CalibrationPayload, CalibrationType, DefectEntry};
pub use exposure::{ExposureParams, ExposureRecord, ExposureResult, ExposureStatus, FocusSize};
pub use frame::Frame;
pub use generator_state::{Alarm, DeviceCapabilities, GeneratorSnapshot, GeneratorState};
pub use interlock::InterlockStatus;
pub use protocol::{AecMode, InMemoryProtocolRepository, Protocol, ProtocolKey, ProtocolRepository};
pub use state::{State, Trigger};
