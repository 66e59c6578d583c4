//! Standalone wiring binary: constructs an [`Engine`] around an in-memory
//! journal, an in-memory protocol repository and a simulated generator
//! transport, runs one exposure end to end, and exits. It exists to
//! demonstrate that the core wires up and runs outside of any UI shell —
//! it is not the console's UI.

use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use tracing::info;
use xray_console_core::error::{CoreError, CoreResult};
use xray_console_core::hal::GeneratorTransport;
use xray_console_core::journal::InMemoryJournal;
use xray_console_core::model::{
    AecMode, DeviceCapabilities, ExposureParams, ExposureResult, FocusSize, GeneratorSnapshot,
    GeneratorState, InMemoryProtocolRepository, InterlockStatus, Protocol, ProtocolKey,
    ProtocolRepository,
};
use xray_console_core::{Engine, EngineConfig};

/// Simulated HVG transport: applies parameters instantly and reports the
/// requested values back as "actual", standing in for the serial/Ethernet
/// transport a real generator driver would own.
struct SimulatorTransport {
    last_params: Option<ExposureParams>,
}

impl GeneratorTransport for SimulatorTransport {
    fn apply_params(&mut self, params: &ExposureParams) -> CoreResult<()> {
        self.last_params = Some(*params);
        Ok(())
    }

    fn start(&mut self, _abort: &std::sync::atomic::AtomicBool) -> CoreResult<ExposureResult> {
        let params = self
            .last_params
            .ok_or_else(|| CoreError::State("exposure started before params were applied".into()))?;
        Ok(ExposureResult {
            success: true,
            actual_kvp: params.kvp,
            actual_ma: params.ma,
            actual_ms: params.ms,
            actual_mas: params.mas(),
            aborted: false,
        })
    }

    fn abort(&mut self) -> CoreResult<()> {
        Ok(())
    }

    fn poll_status(&mut self) -> CoreResult<GeneratorSnapshot> {
        Ok(GeneratorSnapshot {
            state: GeneratorState::Idle,
            kvp: 0.0,
            ma: 0.0,
            ms: 0.0,
            timestamp_us: 0,
        })
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let config = EngineConfig::default();
    let journal = Arc::new(InMemoryJournal::new());
    let protocols = Arc::new(InMemoryProtocolRepository::new());
    protocols
        .create(Protocol {
            protocol_id: "chest-ap-dr2000".into(),
            body_part: "chest".into(),
            projection: "ap".into(),
            kvp: 80.0,
            ma: 200.0,
            exposure_ms: 100.0,
            aec_mode: AecMode::Manual,
            aec_chambers: vec![1],
            focus_size: "Small".into(),
            grid_used: true,
            procedure_codes: vec!["CHEST-AP".into()],
            device_model: "dr-2000".into(),
            is_active: true,
        })
        .expect("seed protocol insert");
    let transport = Box::new(SimulatorTransport { last_params: None });

    let engine = Engine::new(
        config,
        journal,
        protocols,
        transport,
        DeviceCapabilities::default(),
        InterlockStatus::all_ok(0),
        AecMode::Manual,
    );

    let recovery = engine.assess_recovery();
    info!(incomplete = recovery.incomplete, "startup recovery assessment complete");

    engine.start();

    let key = ProtocolKey::new("chest", "ap", "dr-2000");
    let protocol = engine
        .protocols
        .find_by_key(&key)
        .ok_or_else(|| CoreError::Param(format!("no protocol registered for {key}")))?;
    info!(protocol_id = protocol.protocol_id, "selected exposure protocol");

    engine.generator.set_exposure_params(ExposureParams {
        kvp: protocol.kvp,
        ma: protocol.ma,
        ms: protocol.exposure_ms,
        aec_mode: protocol.aec_mode,
        focus: FocusSize::Small,
    })?;

    let result = engine.generator.start_exposure()?;
    info!(
        actual_kvp = result.actual_kvp,
        actual_ma = result.actual_ma,
        actual_ms = result.actual_ms,
        actual_mas = result.actual_mas,
        "exposure completed"
    );

    let summary = engine.dose.record(
        "study-demo",
        "patient-demo",
        result.actual_mas,
        chrono::Utc::now(),
    );
    info!(
        study_total = summary.study_total,
        patient_day_total = summary.patient_day_total,
        "dose recorded"
    );

    engine.generator.shutdown();
    tokio::time::sleep(Duration::from_millis(50)).await;

    Ok(())
}
