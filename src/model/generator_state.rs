//! Generator state machine values (spec §3, §4.3).

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum GeneratorState {
    Idle,
    Ready,
    Armed,
    Exposing,
    Error,
}

impl std::fmt::Display for GeneratorState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:?}", self)
    }
}

/// Point-in-time status snapshot published on the status stream.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct GeneratorSnapshot {
    pub state: GeneratorState,
    pub kvp: f64,
    pub ma: f64,
    pub ms: f64,
    pub timestamp_us: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Alarm {
    pub code: String,
    pub message: String,
    pub timestamp_us: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct DeviceCapabilities {
    pub min_kvp: f64,
    pub max_kvp: f64,
    pub min_ma: f64,
    pub max_ma: f64,
    pub min_ms: f64,
    pub max_ms: f64,
    pub max_mas: f64,
}

impl Default for DeviceCapabilities {
    fn default() -> Self {
        Self {
            min_kvp: 40.0,
            max_kvp: 150.0,
            min_ma: 0.1,
            max_ma: 1000.0,
            min_ms: 1.0,
            max_ms: 10_000.0,
            max_mas: 2_000.0,
        }
    }
}
