//! Engine-wide configuration (spec §10 ambient stack).
//!
//! `EngineConfig` collects every numeric knob the spec names by literal
//! value or default so they live in one serializable place instead of being
//! scattered as magic numbers. The core only defines and validates this
//! struct; loading it from disk/IPC is an external collaborator's job
//! (spec §1 "configuration interface").

use serde::{Deserialize, Serialize};
use std::time::Duration;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Max queued (non-abort) generator commands before enqueue fails (default 16).
    pub command_queue_depth: usize,
    /// Per-command timeout before retry (default 500 ms).
    pub command_timeout_ms: u64,
    /// Retry attempts for a timed-out command (default 3).
    pub command_retry_count: u32,
    /// Health-stream heartbeat interval (default 1 s).
    pub heartbeat_interval_ms: u64,
    /// Consecutive missed heartbeats before subscriber disconnect is assumed (default 3).
    pub missed_heartbeat_disconnect_threshold: u32,
    /// Deadline for alarm/event delivery to any subscriber (default 50 ms).
    pub alarm_delivery_deadline_ms: u64,
    /// Deadline from AEC termination signal to `abort_exposure` call (default 5 ms).
    pub aec_abort_deadline_ms: u64,
    /// Deadline from abort to generator reporting Idle (default 10 ms).
    pub abort_to_idle_deadline_ms: u64,
    /// Deadline from DMA write completion to frame handler invocation (default 100 ms).
    pub dma_to_callback_deadline_ms: u64,
    /// Dose warning threshold as a percentage of the applicable limit (default 80%).
    pub dose_warning_threshold_pct: f64,
    /// AEC detector-signal termination threshold, as a percentage (default 80%).
    /// Distinct from `dose_warning_threshold_pct`: this tunes when the AEC
    /// fires its own termination signal (spec §4.7), not when the dose
    /// tracker warns against a study/daily limit (spec §4.9).
    pub aec_threshold_pct: f64,
    /// Per-study dose limit in mGy*cm^2 (DAP units); `None` = unlimited.
    pub study_dose_limit: Option<f64>,
    /// Per-patient-day dose limit; `None` = unlimited.
    pub daily_dose_limit: Option<f64>,
    /// Calibration artifacts older than this are rejected as stale.
    pub calibration_max_age: Duration,
    /// DMA ring buffer slot count.
    pub ring_buffer_depth: usize,
    /// DMA ring buffer bytes per slot.
    pub ring_buffer_frame_bytes: usize,
    /// Directories searched for detector plugin shared libraries.
    pub plugin_search_paths: Vec<String>,
    /// Host plugin ABI major version (spec §4.5, §6 `0xMMmmpppp`).
    pub plugin_abi_version: u32,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            command_queue_depth: 16,
            command_timeout_ms: 500,
            command_retry_count: 3,
            heartbeat_interval_ms: 1_000,
            missed_heartbeat_disconnect_threshold: 3,
            alarm_delivery_deadline_ms: 50,
            aec_abort_deadline_ms: 5,
            abort_to_idle_deadline_ms: 10,
            dma_to_callback_deadline_ms: 100,
            dose_warning_threshold_pct: 80.0,
            aec_threshold_pct: 80.0,
            study_dose_limit: Some(1000.0),
            daily_dose_limit: Some(3000.0),
            calibration_max_age: Duration::from_secs(60 * 60 * 24 * 365),
            ring_buffer_depth: 8,
            ring_buffer_frame_bytes: 1024 * 1024,
            plugin_search_paths: Vec::new(),
            plugin_abi_version: 0x0001_0000,
        }
    }
}

impl EngineConfig {
    pub fn command_timeout(&self) -> Duration {
        Duration::from_millis(self.command_timeout_ms)
    }

    pub fn heartbeat_interval(&self) -> Duration {
        Duration::from_millis(self.heartbeat_interval_ms)
    }

    pub fn alarm_delivery_deadline(&self) -> Duration {
        Duration::from_millis(self.alarm_delivery_deadline_ms)
    }

    pub fn aec_abort_deadline(&self) -> Duration {
        Duration::from_millis(self.aec_abort_deadline_ms)
    }

    pub fn abort_to_idle_deadline(&self) -> Duration {
        Duration::from_millis(self.abort_to_idle_deadline_ms)
    }

    pub fn dma_to_callback_deadline(&self) -> Duration {
        Duration::from_millis(self.dma_to_callback_deadline_ms)
    }
}
