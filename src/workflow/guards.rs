//! Guard predicates and the runtime context they evaluate against
//! (spec §3 "Transition descriptor", §4.1 step 3).
//!
//! Guard evaluation is pure and synchronous: a [`GuardContext`] is a plain
//! snapshot the caller assembles before calling `try_transition`; guards
//! never perform I/O themselves.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum GuardName {
    NetworkReachable,
    AutoSyncIntervalElapsed,
    HardwareInterlockOk,
    ProtocolValid,
    ExposureParamsInSafeRange,
    DetectorReady,
    NoMoreExposuresInProtocol,
    MoreExposuresInProtocol,
    OperatorConfirmed,
}

impl std::fmt::Display for GuardName {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:?}", self)
    }
}

/// Snapshot of everything a guard might need to read. Missing/unknown
/// context is never an error — an unevaluable safety-critical guard is
/// treated as guard-failed (spec §4.1 "Failure semantics").
#[derive(Debug, Clone, Default)]
pub struct GuardContext {
    pub network_reachable: bool,
    pub auto_sync_interval_elapsed: bool,
    pub hardware_interlock_ok: bool,
    pub protocol_valid: bool,
    pub exposure_params_in_safe_range: bool,
    pub detector_ready: bool,
    pub remaining_exposures_in_protocol: u32,
    pub operator_confirmed: bool,
}

impl GuardContext {
    fn evaluate_one(&self, name: GuardName) -> bool {
        match name {
            GuardName::NetworkReachable => self.network_reachable,
            GuardName::AutoSyncIntervalElapsed => self.auto_sync_interval_elapsed,
            GuardName::HardwareInterlockOk => self.hardware_interlock_ok,
            GuardName::ProtocolValid => self.protocol_valid,
            GuardName::ExposureParamsInSafeRange => self.exposure_params_in_safe_range,
            GuardName::DetectorReady => self.detector_ready,
            GuardName::NoMoreExposuresInProtocol => self.remaining_exposures_in_protocol == 0,
            GuardName::MoreExposuresInProtocol => self.remaining_exposures_in_protocol > 0,
            GuardName::OperatorConfirmed => self.operator_confirmed,
        }
    }
}

/// One guard's pass/fail outcome, recorded verbatim into the journal entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct GuardResult {
    pub name: GuardName,
    pub passed: bool,
}

/// A guard set is a conjunction of disjunctions: every clause must have at
/// least one true guard. Most edges have one guard per clause (a plain
/// AND); T-01's `NetworkReachable ∨ AutoSyncIntervalElapsed` is a single
/// clause with two guards (an OR).
pub type GuardSet = Vec<Vec<GuardName>>;

/// Evaluate every individual guard named in `guards` (no short-circuiting,
/// so the journal entry can record every guard's result), then determine
/// whether the whole set passed.
pub fn evaluate_guard_set(guards: &GuardSet, ctx: &GuardContext) -> (bool, Vec<GuardResult>) {
    let mut results = Vec::new();
    let mut all_clauses_passed = true;
    for clause in guards {
        let mut clause_passed = false;
        for &name in clause {
            let passed = ctx.evaluate_one(name);
            results.push(GuardResult { name, passed });
            clause_passed |= passed;
        }
        all_clauses_passed &= clause_passed;
    }
    (all_clauses_passed, results)
}

/// Names of guards that contributed to a failing clause, for the rejected
/// outcome returned to the caller.
pub fn failed_guard_names(results: &[GuardResult]) -> Vec<GuardName> {
    results
        .iter()
        .filter(|r| !r.passed)
        .map(|r| r.name)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn conjunction_requires_all_clauses() {
        let guards: GuardSet = vec![vec![GuardName::HardwareInterlockOk], vec![GuardName::DetectorReady]];
        let mut ctx = GuardContext::default();
        ctx.hardware_interlock_ok = false;
        ctx.detector_ready = true;
        let (passed, results) = evaluate_guard_set(&guards, &ctx);
        assert!(!passed);
        assert_eq!(failed_guard_names(&results), vec![GuardName::HardwareInterlockOk]);
    }

    #[test]
    fn disjunction_passes_if_any_guard_true() {
        let guards: GuardSet = vec![vec![GuardName::NetworkReachable, GuardName::AutoSyncIntervalElapsed]];
        let mut ctx = GuardContext::default();
        ctx.auto_sync_interval_elapsed = true;
        let (passed, _) = evaluate_guard_set(&guards, &ctx);
        assert!(passed);
    }

    #[test]
    fn empty_guard_set_always_passes() {
        let guards: GuardSet = vec![];
        let ctx = GuardContext::default();
        let (passed, results) = evaluate_guard_set(&guards, &ctx);
        assert!(passed);
        assert!(results.is_empty());
    }
}
