//! High-voltage generator (spec §4.3).
//!
//! Owns the transport, serialises commands through a [`CommandQueue`], and
//! runs a reader loop delivering status (>=10 Hz) and alarms. The transport
//! itself — serial, Ethernet, or simulator — is supplied by the embedder as
//! a [`GeneratorTransport`] implementation; this module only contracts the
//! sequencing, timing, and safety checks around it.

use crate::error::{CoreError, CoreResult};
use crate::hal::command_queue::CommandQueue;
use crate::hal::interlock::SafetyInterlockAggregator;
use crate::model::exposure::{ExposureParams, ExposureResult, ExposureStatus};
use crate::model::generator_state::{Alarm, DeviceCapabilities, GeneratorSnapshot, GeneratorState};
use parking_lot::{Mutex, RwLock};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

/// Embedder-supplied transport driving the physical or simulated generator.
/// Each method is expected to block until it can report a definitive
/// outcome or fail with [`CoreError::Timeout`], which the command queue
/// retries per its configured budget.
///
/// `start` owns the transport for the full length of the exposure (spec §5
/// "every blocking operation takes a cancellation signal or a deadline"):
/// it must poll `abort` at a fine enough grain to return within the
/// generator's abort-to-idle budget once signalled, reporting
/// `ExposureResult { aborted: true, .. }` rather than blocking to natural
/// completion. The command queue's single dispatcher thread is inside this
/// call for as long as it runs, so `abort_exposure` cannot reach the
/// transport itself until `start` returns — it can only set this signal.
pub trait GeneratorTransport: Send {
    fn apply_params(&mut self, params: &ExposureParams) -> CoreResult<()>;
    fn start(&mut self, abort: &AtomicBool) -> CoreResult<ExposureResult>;
    fn abort(&mut self) -> CoreResult<()>;
    fn poll_status(&mut self) -> CoreResult<GeneratorSnapshot>;
}

type AlarmHandler = dyn Fn(&Alarm) + Send + Sync;
type StatusHandler = dyn Fn(&GeneratorSnapshot) + Send + Sync;

pub struct Generator {
    transport: Arc<Mutex<Box<dyn GeneratorTransport>>>,
    queue: Arc<CommandQueue>,
    interlock: Arc<SafetyInterlockAggregator>,
    capabilities: DeviceCapabilities,
    state: Arc<RwLock<GeneratorState>>,
    params: Mutex<Option<ExposureParams>>,
    alarm_handlers: Mutex<Vec<Arc<AlarmHandler>>>,
    status_handlers: Mutex<Vec<Arc<StatusHandler>>>,
    dispatcher_stop: Arc<AtomicBool>,
    reader_stop: Arc<AtomicBool>,
    /// Set directly by `abort_exposure`, outside the command queue, so an
    /// in-flight `start` can notice and return early without waiting for the
    /// dispatcher to reach the abort lane.
    abort_signal: Arc<AtomicBool>,
}

impl Generator {
    pub fn new(
        transport: Box<dyn GeneratorTransport>,
        interlock: Arc<SafetyInterlockAggregator>,
        capabilities: DeviceCapabilities,
        queue_depth: usize,
        retry_count: u32,
    ) -> Arc<Self> {
        Arc::new(Self {
            transport: Arc::new(Mutex::new(transport)),
            queue: Arc::new(CommandQueue::new(queue_depth, retry_count)),
            interlock,
            capabilities,
            state: Arc::new(RwLock::new(GeneratorState::Idle)),
            params: Mutex::new(None),
            alarm_handlers: Mutex::new(Vec::new()),
            status_handlers: Mutex::new(Vec::new()),
            dispatcher_stop: Arc::new(AtomicBool::new(false)),
            reader_stop: Arc::new(AtomicBool::new(false)),
            abort_signal: Arc::new(AtomicBool::new(false)),
        })
    }

    /// Spawns the dedicated command-dispatcher thread (spec §5). Must be
    /// called once; the thread runs until [`Generator::shutdown`].
    pub fn spawn_dispatcher(self: &Arc<Self>) -> std::thread::JoinHandle<()> {
        let queue = self.queue.clone();
        let stop = self.dispatcher_stop.clone();
        std::thread::Builder::new()
            .name("generator-dispatcher".into())
            .spawn(move || queue.run_dispatcher(&stop))
            .expect("failed to spawn generator dispatcher thread")
    }

    /// Spawns the reader thread polling status at the configured interval
    /// and fanning alarms out to every registered handler, one at a time
    /// (spec §4.3 "no two handlers run concurrently on the same alarm").
    pub fn spawn_reader(self: &Arc<Self>, poll_interval: Duration) -> std::thread::JoinHandle<()> {
        let generator = self.clone();
        let stop = self.reader_stop.clone();
        std::thread::Builder::new()
            .name("generator-reader".into())
            .spawn(move || {
                while !stop.load(Ordering::SeqCst) {
                    let snapshot = generator.transport.lock().poll_status();
                    match snapshot {
                        Ok(snapshot) => {
                            *generator.state.write() = snapshot.state;
                            for handler in generator.status_handlers.lock().iter() {
                                handler(&snapshot);
                            }
                        }
                        Err(e) => {
                            tracing::error!(error = %e, "generator status poll failed");
                        }
                    }
                    std::thread::sleep(poll_interval);
                }
            })
            .expect("failed to spawn generator reader thread")
    }

    pub fn shutdown(&self) {
        self.dispatcher_stop.store(true, Ordering::SeqCst);
        self.reader_stop.store(true, Ordering::SeqCst);
    }

    pub fn get_capabilities(&self) -> DeviceCapabilities {
        self.capabilities
    }

    pub fn get_status(&self) -> GeneratorState {
        *self.state.read()
    }

    pub fn register_alarm_handler(&self, handler: Arc<AlarmHandler>) {
        self.alarm_handlers.lock().push(handler);
    }

    pub fn register_status_handler(&self, handler: Arc<StatusHandler>) {
        self.status_handlers.lock().push(handler);
    }

    /// Fans an alarm out to every registered handler; one raising must not
    /// stop delivery to the rest (spec §4.3, §7 "alarms... never swallowed").
    pub fn raise_alarm(&self, alarm: Alarm) {
        for handler in self.alarm_handlers.lock().iter() {
            let handler = handler.clone();
            let alarm = alarm.clone();
            let _ = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| handler(&alarm)));
        }
    }

    /// Validates against device capabilities (spec §4.3 step 1) and records
    /// the requested params, ready for a subsequent `start_exposure`.
    pub fn set_exposure_params(&self, params: ExposureParams) -> CoreResult<()> {
        if !params.in_safe_range(self.capabilities.max_mas) {
            return Err(CoreError::Param(format!(
                "exposure params out of safe range: {:?}",
                params
            )));
        }
        *self.params.lock() = Some(params);
        *self.state.write() = GeneratorState::Ready;
        Ok(())
    }

    /// Consults the interlock aggregate (spec §4.3 step 3, §4.4): a failed
    /// interlock fails the call with `State` before anything reaches the
    /// transport. Enqueues the armed-exposure command and blocks the caller
    /// on its completion — callers needing non-blocking behaviour should
    /// drive this from their own worker thread.
    pub fn start_exposure(self: &Arc<Self>) -> CoreResult<ExposureResult> {
        let params = self
            .params
            .lock()
            .clone()
            .ok_or_else(|| CoreError::State("no exposure params set".into()))?;

        let interlock_status = self.interlock.check_all();
        if !interlock_status.all_passed {
            return Err(CoreError::State(
                "start_exposure rejected: interlock chain not all-passed".into(),
            ));
        }

        *self.state.write() = GeneratorState::Armed;
        self.abort_signal.store(false, Ordering::SeqCst);

        // `tx` reports the command's *terminal* outcome. A `Timeout` error
        // from the transport is left to propagate via `?` so the command
        // queue's retry loop re-runs the whole attempt; only a definitive
        // success, a non-timeout failure, or final retry exhaustion (via
        // the completion handler below) ever sends on the channel.
        let (tx, rx) = std::sync::mpsc::channel();
        let tx_exhausted = tx.clone();
        let transport = self.transport.clone();
        let state = self.state.clone();
        let abort_signal = self.abort_signal.clone();
        self.queue.enqueue(
            "start_exposure",
            move || {
                *state.write() = GeneratorState::Exposing;
                let outcome = (|| -> CoreResult<ExposureResult> {
                    transport.lock().apply_params(&params)?;
                    transport.lock().start(&abort_signal)
                })();
                match outcome {
                    Err(e @ CoreError::Timeout(_)) => Err(e),
                    other => {
                        *state.write() = GeneratorState::Ready;
                        let _ = tx.send(other);
                        Ok(())
                    }
                }
            },
            move |result| {
                if let Err(e) = result {
                    tracing::error!(error = %e, "start_exposure command failed");
                    let _ = tx_exhausted.send(Err(e));
                }
            },
        )?;

        rx.recv()
            .map_err(|_| CoreError::Comm("exposure command channel closed".into()))?
    }

    /// Must return in <=10ms per spec §4.3: it only enqueues to the
    /// priority abort lane, never waits for the abort to actually complete.
    ///
    /// Setting `abort_signal` happens here, synchronously, before anything
    /// touches the queue. That's what gives a concurrently in-flight
    /// `start` a chance to notice and return early — the dispatcher thread
    /// may be blocked inside that call for the full exposure duration, so
    /// the abort lane itself cannot be serviced until `start` returns.
    /// Without this signal the queued `transport.abort()` below would sit
    /// behind the running exposure for as long as it takes to complete.
    pub fn abort_exposure(self: &Arc<Self>) {
        self.abort_signal.store(true, Ordering::SeqCst);
        let transport = self.transport.clone();
        let state = self.state.clone();
        self.queue.enqueue_abort(
            move || {
                transport.lock().abort()?;
                *state.write() = GeneratorState::Idle;
                Ok(())
            },
            |result| {
                if let Err(e) = result {
                    tracing::error!(error = %e, "abort_exposure command failed");
                }
            },
        );
    }
}
