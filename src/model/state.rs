//! Workflow state and trigger vocabulary (spec §3, §6).

use serde::{Deserialize, Serialize};

/// Clinical workflow state. Exactly one is current per process.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum State {
    Idle,
    WorklistSync,
    PatientSelect,
    ProtocolSelect,
    PositionAndPreview,
    ExposureTrigger,
    QcReview,
    RejectRetake,
    MppsComplete,
    PacsExport,
}

impl State {
    /// Every state the workflow can be in besides `Idle`; used to expand the
    /// `ANY (non-Idle) -> Idle` wildcard edges into concrete table entries.
    pub const NON_IDLE: [State; 9] = [
        State::WorklistSync,
        State::PatientSelect,
        State::ProtocolSelect,
        State::PositionAndPreview,
        State::ExposureTrigger,
        State::QcReview,
        State::RejectRetake,
        State::MppsComplete,
        State::PacsExport,
    ];
}

impl std::fmt::Display for State {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            State::Idle => "Idle",
            State::WorklistSync => "WorklistSync",
            State::PatientSelect => "PatientSelect",
            State::ProtocolSelect => "ProtocolSelect",
            State::PositionAndPreview => "PositionAndPreview",
            State::ExposureTrigger => "ExposureTrigger",
            State::QcReview => "QcReview",
            State::RejectRetake => "RejectRetake",
            State::MppsComplete => "MppsComplete",
            State::PacsExport => "PacsExport",
        };
        f.write_str(s)
    }
}

/// Opaque transition trigger (spec §3, §6 transition table).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Trigger {
    WorklistSyncRequested,
    EmergencyWorkflowRequested,
    WorklistResponseReceived,
    WorklistTimeout,
    WorklistError,
    PatientConfirmed,
    ProtocolConfirmed,
    OperatorReady,
    AcquisitionComplete,
    AcquisitionFailed,
    ImageAccepted,
    ImageRejected,
    RetakeApproved,
    RetakeCancelled,
    ExportInitiated,
    ExportComplete,
    ExportFailed,
    CriticalHardwareError,
    StudyAbortRequested,
}

impl std::fmt::Display for Trigger {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:?}", self)
    }
}
