//! Transition guard matrix (spec §4.2, §6).
//!
//! Built once from a static table and immutable thereafter. Lookup key is
//! `(from, to, trigger)` — `try_transition` always receives an explicit
//! target state, so the caller (not the matrix) disambiguates edges that
//! share a trigger but diverge on the resulting state (e.g. T-10/T-11 both
//! fire on `ImageAccepted`).

use super::guards::{GuardName, GuardSet};
use crate::model::state::{State, Trigger};
use std::collections::HashMap;

#[derive(Debug, Clone)]
pub struct TransitionEntry {
    pub guards: GuardSet,
    pub is_safety_critical: bool,
}

pub struct TransitionTable {
    entries: HashMap<(State, State, Trigger), TransitionEntry>,
}

impl TransitionTable {
    pub fn lookup(&self, from: State, to: State, trigger: Trigger) -> Option<&TransitionEntry> {
        self.entries.get(&(from, to, trigger))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Construct the standard spec §6 table: 19 logical transitions,
    /// expanded to one physical entry per `(from, to, trigger)` triple
    /// (T-04's two triggers, and the `ANY (non-Idle)` wildcards of T-18/
    /// T-19, each multiply out over concrete states).
    pub fn standard() -> Self {
        use GuardName::*;
        use State::*;
        use Trigger::*;

        let mut entries = HashMap::new();
        let mut insert = |from: State, to: State, trigger: Trigger, guards: GuardSet, critical: bool| {
            entries.insert(
                (from, to, trigger),
                TransitionEntry {
                    guards,
                    is_safety_critical: critical,
                },
            );
        };

        // T-01
        insert(
            Idle,
            WorklistSync,
            WorklistSyncRequested,
            vec![vec![NetworkReachable, AutoSyncIntervalElapsed]],
            false,
        );
        // T-02
        insert(
            Idle,
            PatientSelect,
            EmergencyWorkflowRequested,
            vec![vec![HardwareInterlockOk]],
            false,
        );
        // T-03
        insert(WorklistSync, PatientSelect, WorklistResponseReceived, vec![], false);
        // T-04 (two physical entries for one logical transition)
        insert(WorklistSync, PatientSelect, WorklistTimeout, vec![], false);
        insert(WorklistSync, PatientSelect, WorklistError, vec![], false);
        // T-05
        insert(PatientSelect, ProtocolSelect, PatientConfirmed, vec![], false);
        // T-06
        insert(
            ProtocolSelect,
            PositionAndPreview,
            ProtocolConfirmed,
            vec![vec![ProtocolValid], vec![ExposureParamsInSafeRange]],
            false,
        );
        // T-07 (safety-critical)
        insert(
            PositionAndPreview,
            ExposureTrigger,
            OperatorReady,
            vec![vec![HardwareInterlockOk], vec![DetectorReady]],
            true,
        );
        // T-08 / T-09 (safety-critical)
        insert(ExposureTrigger, QcReview, AcquisitionComplete, vec![], true);
        insert(ExposureTrigger, QcReview, AcquisitionFailed, vec![], true);
        // T-10 / T-11
        insert(
            QcReview,
            MppsComplete,
            ImageAccepted,
            vec![vec![NoMoreExposuresInProtocol]],
            false,
        );
        insert(
            QcReview,
            ProtocolSelect,
            ImageAccepted,
            vec![vec![MoreExposuresInProtocol]],
            false,
        );
        // T-12
        insert(QcReview, RejectRetake, ImageRejected, vec![], false);
        // T-13
        insert(
            RejectRetake,
            PositionAndPreview,
            RetakeApproved,
            vec![vec![HardwareInterlockOk]],
            false,
        );
        // T-14
        insert(RejectRetake, MppsComplete, RetakeCancelled, vec![], false);
        // T-15
        insert(MppsComplete, PacsExport, ExportInitiated, vec![], false);
        // T-16 / T-17
        insert(PacsExport, Idle, ExportComplete, vec![], false);
        insert(PacsExport, Idle, ExportFailed, vec![], false);

        // T-18: ANY (non-Idle) -> Idle, unconditional, safety-critical.
        for &state in State::NON_IDLE.iter() {
            insert(state, Idle, CriticalHardwareError, vec![], true);
        }
        // T-19: ANY (non-Idle) -> Idle, guarded by operator confirmation.
        for &state in State::NON_IDLE.iter() {
            insert(
                state,
                Idle,
                StudyAbortRequested,
                vec![vec![OperatorConfirmed]],
                false,
            );
        }

        Self { entries }
    }
}
