//! Core workflow engine, hardware abstraction layer and imaging pipeline
//! for a diagnostic X-ray imaging console.
//!
//! This crate is the `embeddable` core: it owns the workflow state machine,
//! the generator/detector/AEC hardware abstraction, the imaging pipeline,
//! and the dose tracker. It does not own a UI, a network stack, or a
//! persistence backend for protocols/journal entries beyond the in-memory
//! implementations meant for embedding and tests — those are supplied by
//! the embedder through the traits this crate defines (spec §1, §6).

pub mod config;
pub mod dose;
pub mod error;
pub mod hal;
pub mod imaging;
pub mod journal;
pub mod model;
pub mod workflow;

pub use config::EngineConfig;
pub use error::{CoreError, CoreResult};

use std::sync::Arc;

use dose::DoseTracker;
use hal::{AecController, Generator, GeneratorTransport, SafetyInterlockAggregator};
use imaging::{CalibrationManager, Pipeline};
use journal::JournalSink;
use model::{AecMode, DeviceCapabilities, InterlockStatus, ProtocolRepository};
use workflow::{EventBus, StateMachine};

/// Composition root: wires the workflow engine, HAL and imaging pipeline
/// together from embedder-supplied collaborators (transport, journal sink,
/// protocol repository) and the engine-wide configuration.
///
/// Construction does not start any background threads; call
/// [`Engine::start`] once the caller is ready to receive status updates
/// and dispatch commands.
pub struct Engine {
    pub config: EngineConfig,
    pub journal: Arc<dyn JournalSink>,
    pub protocols: Arc<dyn ProtocolRepository>,
    pub events: Arc<EventBus>,
    pub state_machine: Arc<StateMachine>,
    pub interlock: Arc<SafetyInterlockAggregator>,
    pub generator: Arc<Generator>,
    pub aec: Arc<AecController>,
    pub calibration: Arc<CalibrationManager>,
    pub pipeline: Arc<Pipeline>,
    pub dose: Arc<DoseTracker>,
    generator_threads_started: std::sync::atomic::AtomicBool,
}

impl Engine {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        config: EngineConfig,
        journal: Arc<dyn JournalSink>,
        protocols: Arc<dyn ProtocolRepository>,
        transport: Box<dyn GeneratorTransport>,
        device_capabilities: DeviceCapabilities,
        initial_interlock: InterlockStatus,
        initial_aec_mode: AecMode,
    ) -> Arc<Self> {
        let events = Arc::new(EventBus::new());
        let state_machine = Arc::new(StateMachine::new(journal.clone(), events.clone()));
        let interlock = Arc::new(SafetyInterlockAggregator::new(initial_interlock));
        let generator = Generator::new(
            transport,
            interlock.clone(),
            device_capabilities,
            config.command_queue_depth,
            config.command_retry_count,
        );
        let aec = Arc::new(AecController::new(
            generator.clone(),
            initial_aec_mode,
            config.aec_threshold_pct,
        ));

        // Spec §7: CriticalHardwareError unconditionally transitions to Idle
        // and must invoke emergency-standby synchronously on acceptance.
        {
            let interlock = interlock.clone();
            let journal = journal.clone();
            let generator = generator.clone();
            state_machine.register_critical_hardware_error_handler(Arc::new(move |from, operator_id| {
                let generator = generator.clone();
                let result = interlock.emergency_standby(
                    from,
                    operator_id,
                    journal.as_ref(),
                    move || {
                        generator.abort_exposure();
                        Ok(())
                    },
                    || Ok(()),
                );
                if let Err(e) = result {
                    tracing::error!(error = %e, "emergency standby failed");
                }
            }));
        }
        let calibration = Arc::new(CalibrationManager::new(config.calibration_max_age));
        let pipeline = Arc::new(Pipeline::new(calibration.clone()));
        let dose = Arc::new(DoseTracker::new(
            config.study_dose_limit,
            config.daily_dose_limit,
            config.dose_warning_threshold_pct / 100.0,
        ));

        Arc::new(Self {
            config,
            journal,
            protocols,
            events,
            state_machine,
            interlock,
            generator,
            aec,
            calibration,
            pipeline,
            dose,
            generator_threads_started: std::sync::atomic::AtomicBool::new(false),
        })
    }

    /// Spawns the generator's dedicated dispatcher and reader threads
    /// (spec §5). Idempotent: a second call is a no-op.
    pub fn start(self: &Arc<Self>) {
        use std::sync::atomic::Ordering;
        if self.generator_threads_started.swap(true, Ordering::SeqCst) {
            return;
        }
        self.generator.spawn_dispatcher();
        self.generator
            .spawn_reader(std::time::Duration::from_millis(self.config.heartbeat_interval_ms / 10));
    }

    /// Runs the crash-recovery assessment against the journal tail
    /// (spec §5 "Crash recovery"). Call once at startup, before `start`.
    pub fn assess_recovery(&self) -> workflow::RecoveryPlan {
        workflow::RecoveryService::assess(self.journal.as_ref())
    }
}
