//! Exposure parameters and records (spec §3).

use super::protocol::AecMode;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum FocusSize {
    Small,
    Large,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ExposureParams {
    pub kvp: f64,
    pub ma: f64,
    pub ms: f64,
    pub aec_mode: AecMode,
    pub focus: FocusSize,
}

impl ExposureParams {
    pub fn mas(&self) -> f64 {
        self.kvp * self.ma * self.ms / 1000.0
    }

    /// Parameters leave the safe range if any bound is violated, or the
    /// derived mAs exceeds the device safety limit.
    pub fn in_safe_range(&self, max_mas: f64) -> bool {
        (40.0..=150.0).contains(&self.kvp)
            && (0.1..=1000.0).contains(&self.ma)
            && (1.0..=10_000.0).contains(&self.ms)
            && self.mas() <= max_mas
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ExposureStatus {
    Accepted,
    Rejected,
    Aborted,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExposureRecord {
    pub index: u32,
    pub protocol_ref: String,
    pub status: ExposureStatus,
    pub administered_dap: f64,
    pub acquired_at: chrono::DateTime<chrono::Utc>,
    pub operator_id: String,
}

/// Outcome of `start_exposure` (spec §4.3).
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct ExposureResult {
    pub success: bool,
    pub actual_kvp: f64,
    pub actual_ma: f64,
    pub actual_ms: f64,
    pub actual_mas: f64,
    pub aborted: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn safe_range_rejects_excessive_mas() {
        let p = ExposureParams {
            kvp: 150.0,
            ma: 1000.0,
            ms: 10_000.0,
            aec_mode: AecMode::Manual,
            focus: FocusSize::Large,
        };
        // mAs = 1,500,000 — far beyond any plausible device limit.
        assert!(!p.in_safe_range(2000.0));
    }

    #[test]
    fn safe_range_accepts_nominal_params() {
        let p = ExposureParams {
            kvp: 80.0,
            ma: 200.0,
            ms: 100.0,
            aec_mode: AecMode::Manual,
            focus: FocusSize::Small,
        };
        assert!(p.in_safe_range(2000.0));
    }
}
