//! Dose accumulation and limit enforcement (spec §4.9).
//!
//! Accumulates dose-area product (DAP) per study and per patient-day.
//! Daily buckets use UTC midnight boundaries (see DESIGN.md open question
//! resolution #3) so the tracker shares the one wall-clock convention the
//! rest of the data model already uses.

use chrono::{DateTime, NaiveDate, Utc};
use parking_lot::Mutex;
use std::collections::HashMap;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DoseSummary {
    pub study_total: f64,
    pub patient_day_total: f64,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DoseLimitCheck {
    pub current: f64,
    pub proposed: f64,
    pub projected: f64,
    pub within_study_limit: bool,
    pub within_daily_limit: bool,
    pub should_warn: bool,
}

#[derive(Default)]
struct Totals {
    by_study: HashMap<String, f64>,
    by_patient_day: HashMap<(String, NaiveDate), f64>,
}

/// Thread-safe dose accumulator. All mutation goes through a single lock,
/// so concurrent `record` calls on the same study serialise without lost
/// updates (spec §4.9).
pub struct DoseTracker {
    totals: Mutex<Totals>,
    study_limit: Option<f64>,
    daily_limit: Option<f64>,
    warning_threshold_pct: f64,
}

impl DoseTracker {
    /// `warning_threshold_pct` is a fraction of the limit (0.8 = 80%), not a
    /// 0-100 percentage — callers converting from a human-facing percentage
    /// setting must divide by 100 first.
    pub fn new(study_limit: Option<f64>, daily_limit: Option<f64>, warning_threshold_pct: f64) -> Self {
        Self {
            totals: Mutex::new(Totals::default()),
            study_limit,
            daily_limit,
            warning_threshold_pct,
        }
    }

    /// Adds `exposure` (a DAP value) to the study's and patient-day's
    /// running totals, keyed by `now`'s UTC date.
    pub fn record(&self, study_id: &str, patient_id: &str, exposure: f64, now: DateTime<Utc>) -> DoseSummary {
        let day = now.date_naive();
        let mut totals = self.totals.lock();
        let study_total = totals
            .by_study
            .entry(study_id.to_string())
            .and_modify(|v| *v += exposure)
            .or_insert(exposure);
        let study_total = *study_total;

        let key = (patient_id.to_string(), day);
        let patient_day_total = totals
            .by_patient_day
            .entry(key)
            .and_modify(|v| *v += exposure)
            .or_insert(exposure);
        let patient_day_total = *patient_day_total;

        DoseSummary {
            study_total,
            patient_day_total,
        }
    }

    pub fn get_cumulative(&self, study_id: &str) -> f64 {
        self.totals
            .lock()
            .by_study
            .get(study_id)
            .copied()
            .unwrap_or(0.0)
    }

    /// `should_warn` is true when `projected > warning_threshold_pct * limit`
    /// and `projected <= limit`; at the exact threshold it is false. An
    /// absent limit is always within limits and never warns.
    pub fn check_limit(&self, study_id: &str, patient_id: &str, now: DateTime<Utc>, proposed_dap: f64) -> DoseLimitCheck {
        let day = now.date_naive();
        let (study_current, daily_current) = {
            let totals = self.totals.lock();
            let study_current = totals.by_study.get(study_id).copied().unwrap_or(0.0);
            let daily_current = totals
                .by_patient_day
                .get(&(patient_id.to_string(), day))
                .copied()
                .unwrap_or(0.0);
            (study_current, daily_current)
        };

        let study_projected = study_current + proposed_dap;
        let daily_projected = daily_current + proposed_dap;

        let within_study_limit = self.study_limit.map_or(true, |limit| study_projected <= limit);
        let within_daily_limit = self.daily_limit.map_or(true, |limit| daily_projected <= limit);

        let study_warns = self.study_limit.map_or(false, |limit| {
            study_projected > self.warning_threshold_pct * limit && study_projected <= limit
        });
        let daily_warns = self.daily_limit.map_or(false, |limit| {
            daily_projected > self.warning_threshold_pct * limit && daily_projected <= limit
        });

        let should_warn = study_warns || daily_warns;
        if should_warn {
            tracing::warn!(study_id, study_projected, daily_projected, "dose approaching configured limit");
        }
        if !within_study_limit || !within_daily_limit {
            tracing::error!(study_id, study_projected, daily_projected, "proposed exposure exceeds configured dose limit");
        }

        DoseLimitCheck {
            current: study_current,
            proposed: proposed_dap,
            projected: study_projected,
            within_study_limit,
            within_daily_limit,
            should_warn,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn at(hour: u32) -> DateTime<Utc> {
        "2026-01-01T00:00:00Z"
            .parse::<DateTime<Utc>>()
            .unwrap()
            + chrono::Duration::hours(hour as i64)
    }

    #[test]
    fn absent_limit_is_always_within_and_never_warns() {
        let tracker = DoseTracker::new(None, None, 0.8);
        let check = tracker.check_limit("study-1", "patient-1", at(0), 1_000_000.0);
        assert!(check.within_study_limit);
        assert!(check.within_daily_limit);
        assert!(!check.should_warn);
    }

    #[test]
    fn warning_threshold_is_strict_at_exact_boundary() {
        let tracker = DoseTracker::new(Some(1000.0), Some(1000.0), 0.8);
        let at_threshold = tracker.check_limit("study-1", "patient-1", at(0), 800.0);
        assert!(!at_threshold.should_warn);

        let just_over = tracker.check_limit("study-1", "patient-1", at(0), 801.0);
        assert!(just_over.should_warn);
        assert!(just_over.within_study_limit);

        let over_limit = tracker.check_limit("study-1", "patient-1", at(0), 1001.0);
        assert!(!over_limit.within_study_limit);
    }

    #[test]
    fn record_accumulates_per_study_and_per_patient_day() {
        let tracker = DoseTracker::new(None, None, 0.8);
        tracker.record("study-1", "patient-1", 100.0, at(0));
        let summary = tracker.record("study-1", "patient-1", 50.0, at(1));
        assert_eq!(summary.study_total, 150.0);
        assert_eq!(summary.patient_day_total, 150.0);
        assert_eq!(tracker.get_cumulative("study-1"), 150.0);
    }

    #[test]
    fn patient_day_bucket_resets_across_utc_midnight() {
        let tracker = DoseTracker::new(None, None, 0.8);
        tracker.record("study-1", "patient-1", 100.0, at(23));
        let next_day = tracker.record("study-1", "patient-1", 40.0, at(25));
        assert_eq!(next_day.patient_day_total, 40.0);
        assert_eq!(next_day.study_total, 140.0);
    }
}
