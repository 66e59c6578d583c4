//! Automatic exposure control (spec §4.7).

use crate::error::{CoreError, CoreResult};
use crate::hal::generator::Generator;
use crate::model::generator_state::GeneratorState;
use crate::model::protocol::AecMode;
use parking_lot::{Mutex, RwLock};
use std::sync::Arc;

type TerminationHandler = dyn Fn() + Send + Sync;

pub struct AecController {
    mode: RwLock<AecMode>,
    threshold_pct: RwLock<f64>,
    generator: Arc<Generator>,
    termination_handlers: Mutex<Vec<Arc<TerminationHandler>>>,
}

impl AecController {
    pub fn new(generator: Arc<Generator>, initial_mode: AecMode, threshold_pct: f64) -> Self {
        Self {
            mode: RwLock::new(initial_mode),
            threshold_pct: RwLock::new(threshold_pct),
            generator,
            termination_handlers: Mutex::new(Vec::new()),
        }
    }

    /// Rejected while the generator is exposing (spec §4.7).
    pub fn set_mode(&self, mode: AecMode) -> CoreResult<()> {
        if self.generator.get_status() == GeneratorState::Exposing {
            return Err(CoreError::State(
                "AEC mode change rejected while exposure in progress".into(),
            ));
        }
        *self.mode.write() = mode;
        Ok(())
    }

    pub fn get_mode(&self) -> AecMode {
        *self.mode.read()
    }

    pub fn set_threshold(&self, pct: f64) -> CoreResult<()> {
        if !(0.0..=100.0).contains(&pct) {
            return Err(CoreError::Param(format!(
                "AEC threshold {pct} out of range [0,100]"
            )));
        }
        *self.threshold_pct.write() = pct;
        Ok(())
    }

    pub fn get_threshold(&self) -> f64 {
        *self.threshold_pct.read()
    }

    pub fn register_termination_handler(&self, handler: Arc<TerminationHandler>) {
        self.termination_handlers.lock().push(handler);
    }

    /// Called by the detector/AEC signal path when the configured dose
    /// threshold is reached. The <=5ms budget in spec §4.7 is met because
    /// `abort_exposure` only enqueues to the generator's priority abort
    /// lane and returns immediately; the generator itself guarantees Idle
    /// within a further 10ms.
    pub fn on_termination_signal(&self) {
        tracing::warn!("AEC dose threshold reached, terminating exposure");
        self.generator.abort_exposure();
        for handler in self.termination_handlers.lock().iter() {
            handler();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hal::interlock::SafetyInterlockAggregator;
    use crate::model::exposure::ExposureResult;
    use crate::model::generator_state::{DeviceCapabilities, GeneratorSnapshot};
    use crate::model::interlock::InterlockStatus;

    struct StubTransport;
    impl crate::hal::generator::GeneratorTransport for StubTransport {
        fn apply_params(&mut self, _: &crate::model::exposure::ExposureParams) -> CoreResult<()> {
            Ok(())
        }
        fn start(&mut self, _abort: &std::sync::atomic::AtomicBool) -> CoreResult<ExposureResult> {
            Ok(ExposureResult {
                success: true,
                actual_kvp: 80.0,
                actual_ma: 200.0,
                actual_ms: 100.0,
                actual_mas: 16.0,
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

    fn generator() -> Arc<Generator> {
        let interlock = Arc::new(SafetyInterlockAggregator::new(InterlockStatus::all_ok(0)));
        Generator::new(Box::new(StubTransport), interlock, DeviceCapabilities::default(), 4, 0)
    }

    #[test]
    fn threshold_out_of_range_rejected() {
        let aec = AecController::new(generator(), AecMode::Auto, 80.0);
        assert!(aec.set_threshold(150.0).is_err());
        assert_eq!(aec.get_threshold(), 80.0);
    }

    #[test]
    fn mode_change_allowed_while_idle() {
        let aec = AecController::new(generator(), AecMode::Manual, 80.0);
        assert!(aec.set_mode(AecMode::Auto).is_ok());
        assert_eq!(aec.get_mode(), AecMode::Auto);
    }

    #[test]
    fn termination_signal_invokes_handlers_and_aborts() {
        let aec = AecController::new(generator(), AecMode::Auto, 80.0);
        let fired = Arc::new(std::sync::atomic::AtomicBool::new(false));
        let fired_clone = fired.clone();
        aec.register_termination_handler(Arc::new(move || {
            fired_clone.store(true, std::sync::atomic::Ordering::SeqCst);
        }));
        aec.on_termination_signal();
        assert!(fired.load(std::sync::atomic::Ordering::SeqCst));
    }
}
