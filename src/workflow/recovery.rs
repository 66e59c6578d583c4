//! Crash recovery (spec §5 "Crash recovery").
//!
//! On startup, the recovery service reads the journal tail. If the last
//! entry's `to` is not `Idle`, the workflow is incomplete and a recovery
//! options set is computed.

use crate::journal::JournalSink;
use crate::model::state::State;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecoveryOption {
    AbortToIdle,
    ReviewAndDecide,
    /// Offered when the workflow stopped at `QcReview`: the acquired image
    /// is still available for an accept/reject decision instead of a
    /// blanket abort.
    ResumeImageReview,
    /// Offered when the workflow stopped at `PacsExport`: the export can be
    /// retried rather than re-running the whole study.
    RetryExport,
}

#[derive(Debug, Clone, PartialEq)]
pub struct RecoveryPlan {
    pub incomplete: bool,
    pub last_state: State,
    /// True when the incomplete workflow passed through `ExposureTrigger`;
    /// spec §5 requires operator review before any new exposure in that case.
    pub requires_operator_review: bool,
    pub options: Vec<RecoveryOption>,
}

impl RecoveryPlan {
    fn complete() -> Self {
        Self {
            incomplete: false,
            last_state: State::Idle,
            requires_operator_review: false,
            options: Vec::new(),
        }
    }
}

pub struct RecoveryService;

impl RecoveryService {
    /// Inspect the journal tail and compute the recovery plan. Returns the
    /// "complete" plan (nothing to recover) if the journal is empty or the
    /// last entry already landed on `Idle`.
    pub fn assess(journal: &dyn JournalSink) -> RecoveryPlan {
        let tail = journal.tail(1);
        let last = match tail.last() {
            Some(entry) => entry,
            None => return RecoveryPlan::complete(),
        };

        if last.to == State::Idle {
            return RecoveryPlan::complete();
        }

        let mut options = vec![RecoveryOption::AbortToIdle, RecoveryOption::ReviewAndDecide];
        match last.to {
            State::QcReview => options.push(RecoveryOption::ResumeImageReview),
            State::PacsExport => options.push(RecoveryOption::RetryExport),
            _ => {}
        }

        let requires_operator_review =
            last.to == State::ExposureTrigger || last.from == State::ExposureTrigger;

        RecoveryPlan {
            incomplete: true,
            last_state: last.to,
            requires_operator_review,
            options,
        }
    }
}
