//! Safety interlock 9-tuple (spec §3, §4.4).

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct InterlockStatus {
    pub door_closed: bool,
    pub emergency_stop_clear: bool,
    pub thermal_normal: bool,
    pub generator_ready: bool,
    pub detector_ready: bool,
    pub collimator_valid: bool,
    pub table_locked: bool,
    pub dose_within_limits: bool,
    pub aec_configured: bool,
    pub all_passed: bool,
    pub timestamp_us: u64,
}

impl InterlockStatus {
    /// Build a status from the nine bits, computing `all_passed` as their
    /// conjunction (spec §3 invariant).
    pub fn new(
        door_closed: bool,
        emergency_stop_clear: bool,
        thermal_normal: bool,
        generator_ready: bool,
        detector_ready: bool,
        collimator_valid: bool,
        table_locked: bool,
        dose_within_limits: bool,
        aec_configured: bool,
        timestamp_us: u64,
    ) -> Self {
        let all_passed = door_closed
            && emergency_stop_clear
            && thermal_normal
            && generator_ready
            && detector_ready
            && collimator_valid
            && table_locked
            && dose_within_limits
            && aec_configured;
        Self {
            door_closed,
            emergency_stop_clear,
            thermal_normal,
            generator_ready,
            detector_ready,
            collimator_valid,
            table_locked,
            dose_within_limits,
            aec_configured,
            all_passed,
            timestamp_us,
        }
    }

    pub fn all_ok(timestamp_us: u64) -> Self {
        Self::new(
            true, true, true, true, true, true, true, true, true, timestamp_us,
        )
    }

    /// Index-based read of one of the nine bits, for `check_one`.
    pub fn bit(&self, index: usize) -> Option<bool> {
        match index {
            0 => Some(self.door_closed),
            1 => Some(self.emergency_stop_clear),
            2 => Some(self.thermal_normal),
            3 => Some(self.generator_ready),
            4 => Some(self.detector_ready),
            5 => Some(self.collimator_valid),
            6 => Some(self.table_locked),
            7 => Some(self.dose_within_limits),
            8 => Some(self.aec_configured),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn all_passed_is_conjunction() {
        let s = InterlockStatus::new(true, true, true, true, true, true, true, true, false, 0);
        assert!(!s.all_passed);
        let s = InterlockStatus::all_ok(0);
        assert!(s.all_passed);
    }

    #[test]
    fn bit_indexes_match_field_order() {
        let s = InterlockStatus::all_ok(0);
        assert_eq!(s.bit(0), Some(true));
        assert_eq!(s.bit(9), None);
    }
}
