//! The journalled workflow state machine (spec §4.1).
//!
//! `try_transition` is the sole mutator. The whole protocol in spec §4.1
//! step 1-8 runs under one exclusive lock held for the duration of the
//! attempt, which is what gives the totally-ordered `StateChanged`
//! publication guarantee of spec §5 "Within the state machine: transitions
//! are totally ordered" — only one transition attempt can be mid-flight at
//! a time, so event sequence numbers are assigned and published in commit
//! order.

use super::events::{Event, EventBus, Subscription};
use super::guards::{evaluate_guard_set, failed_guard_names, GuardContext, GuardName};
use super::table::TransitionTable;
use crate::journal::{JournalCategory, JournalEntry, JournalSink};
use crate::model::state::{State, Trigger};
use chrono::Utc;
use parking_lot::Mutex;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

#[derive(Debug, Clone, PartialEq)]
pub enum RejectReason {
    UndefinedTransition,
    GuardFailed(Vec<GuardName>),
    JournalError(String),
}

#[derive(Debug, Clone, PartialEq)]
pub enum TransitionOutcome {
    Accepted {
        transition_id: u64,
        from: State,
        to: State,
    },
    Rejected(RejectReason),
}

impl TransitionOutcome {
    pub fn is_accepted(&self) -> bool {
        matches!(self, TransitionOutcome::Accepted { .. })
    }
}

/// Everything needed to journal and arbitrate one `try_transition` call.
pub struct TransitionRequest<'a> {
    pub operator_id: &'a str,
    pub study_uid: Option<String>,
    pub metadata: serde_json::Value,
    pub context: &'a GuardContext,
    pub now_us: u64,
}

/// Invoked synchronously, inside `try_transition`, whenever a
/// `CriticalHardwareError`-triggered transition is accepted (spec §7: "on
/// CriticalHardwareError the state machine unconditionally transitions to
/// Idle and emergency-standby is invoked"). Receives the state the machine
/// transitioned out of and the operator id from the request.
type CriticalHardwareErrorHandler = dyn Fn(State, &str) + Send + Sync;

pub struct StateMachine {
    current: Mutex<State>,
    table: TransitionTable,
    journal: Arc<dyn JournalSink>,
    events: Arc<EventBus>,
    next_transition_id: AtomicU64,
    critical_hardware_error_handlers: Mutex<Vec<Arc<CriticalHardwareErrorHandler>>>,
}

impl StateMachine {
    pub fn new(journal: Arc<dyn JournalSink>, events: Arc<EventBus>) -> Self {
        Self {
            current: Mutex::new(State::Idle),
            table: TransitionTable::standard(),
            journal,
            events,
            next_transition_id: AtomicU64::new(1),
            critical_hardware_error_handlers: Mutex::new(Vec::new()),
        }
    }

    /// Registers a handler run synchronously, on acceptance, for every
    /// `CriticalHardwareError`-triggered transition (spec §7). One handler
    /// panicking must not prevent the others from running.
    pub fn register_critical_hardware_error_handler(&self, handler: Arc<CriticalHardwareErrorHandler>) {
        self.critical_hardware_error_handlers.lock().push(handler);
    }

    /// Construct a machine whose current state has been repositioned by
    /// crash recovery (spec §5 "recovery may reposition it to a safe reset
    /// state").
    pub fn with_initial_state(
        journal: Arc<dyn JournalSink>,
        events: Arc<EventBus>,
        initial: State,
    ) -> Self {
        let machine = Self::new(journal, events);
        *machine.current.lock() = initial;
        machine
    }

    pub fn current_state(&self) -> State {
        *self.current.lock()
    }

    pub fn subscribe(&self) -> Subscription {
        self.events.subscribe()
    }

    pub fn table(&self) -> &TransitionTable {
        &self.table
    }

    pub fn try_transition(
        &self,
        target: State,
        trigger: Trigger,
        request: TransitionRequest<'_>,
    ) -> TransitionOutcome {
        // Step 1: exclusive lock held for the whole attempt.
        let mut current = self.current.lock();
        let from = *current;

        // Step 2: matrix lookup.
        let entry = match self.table.lookup(from, target, trigger) {
            Some(entry) => entry.clone(),
            None => return TransitionOutcome::Rejected(RejectReason::UndefinedTransition),
        };

        // Step 3-4: evaluate every guard, no short-circuit.
        let (passed, guard_results) = evaluate_guard_set(&entry.guards, request.context);
        if !passed {
            tracing::warn!(?from, ?target, ?trigger, "transition rejected: guard failed");
            return TransitionOutcome::Rejected(RejectReason::GuardFailed(failed_guard_names(
                &guard_results,
            )));
        }

        // Step 5: compose the journal entry.
        let transition_id = self.next_transition_id.fetch_add(1, Ordering::SeqCst);
        let category = if entry.is_safety_critical {
            JournalCategory::Safety
        } else {
            JournalCategory::Workflow
        };
        let journal_entry = JournalEntry {
            transition_id,
            utc_timestamp: Utc::now(),
            from,
            to: target,
            trigger,
            guard_results,
            operator_id: request.operator_id.to_string(),
            study_uid: request.study_uid,
            metadata: request.metadata,
            category,
        };

        // Step 6: durable write, awaited, before any state change is visible.
        if let Err(e) = self.journal.append(journal_entry) {
            tracing::error!(?from, ?target, ?trigger, error = %e, "journal write failed, transition rejected");
            return TransitionOutcome::Rejected(RejectReason::JournalError(e.to_string()));
        }

        // Step 7: commit.
        *current = target;
        drop(current);

        // Step 8: publish, still inside the attempt's total order because
        // no other transition could have started while `current` was locked.
        let sequence = self.events.next_sequence();
        self.events.publish(Event::StateChanged {
            sequence,
            from,
            to: target,
            trigger,
            timestamp_us: request.now_us,
        });
        tracing::info!(?from, ?target, ?trigger, transition_id, "transition accepted");

        if trigger == Trigger::CriticalHardwareError {
            for handler in self.critical_hardware_error_handlers.lock().iter() {
                let handler = handler.clone();
                let operator_id = request.operator_id;
                let _ = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
                    handler(from, operator_id)
                }));
            }
        }

        TransitionOutcome::Accepted {
            transition_id,
            from,
            to: target,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::journal::{FaultInjectingJournal, InMemoryJournal};

    fn request<'a>(ctx: &'a GuardContext) -> TransitionRequest<'a> {
        TransitionRequest {
            operator_id: "op1",
            study_uid: None,
            metadata: serde_json::json!({}),
            context: ctx,
            now_us: 0,
        }
    }

    #[test]
    fn interlock_blocks_exposure_scenario() {
        // spec §8 scenario 1: start in PositionAndPreview directly, as the
        // scenario's literal setup does, rather than replaying the happy path.
        let machine = StateMachine::with_initial_state(
            Arc::new(InMemoryJournal::new()),
            Arc::new(EventBus::new()),
            State::PositionAndPreview,
        );
        let mut ctx = GuardContext::default();
        ctx.hardware_interlock_ok = false;
        ctx.detector_ready = true;
        let outcome = machine.try_transition(
            State::ExposureTrigger,
            Trigger::OperatorReady,
            request(&ctx),
        );
        assert_eq!(
            outcome,
            TransitionOutcome::Rejected(RejectReason::GuardFailed(vec![
                GuardName::HardwareInterlockOk
            ]))
        );
        assert_eq!(machine.current_state(), State::PositionAndPreview);
    }

    #[test]
    fn undefined_transition_is_rejected_without_journal_write() {
        let journal = Arc::new(InMemoryJournal::new());
        let machine = StateMachine::new(journal.clone(), Arc::new(EventBus::new()));
        let ctx = GuardContext::default();
        let outcome = machine.try_transition(State::QcReview, Trigger::PatientConfirmed, request(&ctx));
        assert_eq!(outcome, TransitionOutcome::Rejected(RejectReason::UndefinedTransition));
        assert_eq!(journal.len(), 0);
    }

    #[test]
    fn journal_gated_transition_scenario() {
        let journal = Arc::new(FaultInjectingJournal::new(InMemoryJournal::new(), 1));
        let events = Arc::new(EventBus::new());
        let machine = StateMachine::new(journal, events.clone());
        let sub = machine.subscribe();
        let mut ctx = GuardContext::default();
        ctx.network_reachable = true;

        let first = machine.try_transition(
            State::WorklistSync,
            Trigger::WorklistSyncRequested,
            request(&ctx),
        );
        assert!(matches!(
            first,
            TransitionOutcome::Rejected(RejectReason::JournalError(_))
        ));
        assert_eq!(machine.current_state(), State::Idle);
        assert!(sub.try_recv().is_none());

        let second = machine.try_transition(
            State::WorklistSync,
            Trigger::WorklistSyncRequested,
            request(&ctx),
        );
        assert!(second.is_accepted());
        assert_eq!(machine.current_state(), State::WorklistSync);
        match sub.try_recv() {
            Some(Event::StateChanged { from, to, .. }) => {
                assert_eq!(from, State::Idle);
                assert_eq!(to, State::WorklistSync);
            }
            other => panic!("expected StateChanged, got {:?}", other),
        }
        assert!(sub.try_recv().is_none());
    }

    #[test]
    fn critical_hardware_error_is_unconditional_from_any_non_idle_state() {
        let machine = StateMachine::with_initial_state(
            Arc::new(InMemoryJournal::new()),
            Arc::new(EventBus::new()),
            State::ExposureTrigger,
        );
        let ctx = GuardContext::default();
        let outcome = machine.try_transition(
            State::Idle,
            Trigger::CriticalHardwareError,
            request(&ctx),
        );
        assert!(outcome.is_accepted());
        assert_eq!(machine.current_state(), State::Idle);
    }

    #[test]
    fn critical_hardware_error_invokes_registered_handler_with_prior_state() {
        use std::sync::atomic::AtomicBool;

        let machine = StateMachine::with_initial_state(
            Arc::new(InMemoryJournal::new()),
            Arc::new(EventBus::new()),
            State::ExposureTrigger,
        );
        let invoked = Arc::new(AtomicBool::new(false));
        let invoked_clone = invoked.clone();
        machine.register_critical_hardware_error_handler(Arc::new(move |from, operator_id| {
            assert_eq!(from, State::ExposureTrigger);
            assert_eq!(operator_id, "op1");
            invoked_clone.store(true, Ordering::SeqCst);
        }));

        let ctx = GuardContext::default();
        let outcome = machine.try_transition(State::Idle, Trigger::CriticalHardwareError, request(&ctx));

        assert!(outcome.is_accepted());
        assert!(invoked.load(Ordering::SeqCst));
    }

    #[test]
    fn non_critical_transition_does_not_invoke_handler() {
        use std::sync::atomic::AtomicBool;

        let journal = Arc::new(InMemoryJournal::new());
        let machine = StateMachine::new(journal, Arc::new(EventBus::new()));
        let invoked = Arc::new(AtomicBool::new(false));
        let invoked_clone = invoked.clone();
        machine.register_critical_hardware_error_handler(Arc::new(move |_, _| {
            invoked_clone.store(true, Ordering::SeqCst);
        }));

        let mut ctx = GuardContext::default();
        ctx.network_reachable = true;
        let outcome = machine.try_transition(State::WorklistSync, Trigger::WorklistSyncRequested, request(&ctx));

        assert!(outcome.is_accepted());
        assert!(!invoked.load(Ordering::SeqCst));
    }
}
