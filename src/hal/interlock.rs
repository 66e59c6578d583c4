//! Safety interlock aggregator (spec §4.4).
//!
//! Presents a single atomic 9-bit snapshot of the interlock chain: every
//! read of `check_all` observes all nine bits as recorded under the same
//! critical section, so partial updates never leak (spec §8 "Interlock
//! atomicity").

use crate::error::CoreResult;
use crate::journal::{JournalCategory, JournalEntry, JournalSink};
use crate::model::interlock::InterlockStatus;
use crate::model::state::{State, Trigger};
use chrono::Utc;
use parking_lot::{Mutex, RwLock};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

type ChangeHandler = dyn Fn(&InterlockStatus) + Send + Sync;

pub struct SafetyInterlockAggregator {
    status: RwLock<InterlockStatus>,
    change_handlers: Mutex<Vec<Arc<ChangeHandler>>>,
    standby_engaged: AtomicBool,
}

impl SafetyInterlockAggregator {
    pub fn new(initial: InterlockStatus) -> Self {
        Self {
            status: RwLock::new(initial),
            change_handlers: Mutex::new(Vec::new()),
            standby_engaged: AtomicBool::new(false),
        }
    }

    /// A single consistent snapshot; must complete in <=10ms (trivially met:
    /// this is a single read-lock acquisition over in-memory state).
    pub fn check_all(&self) -> InterlockStatus {
        *self.status.read()
    }

    pub fn check_one(&self, index: usize) -> Option<bool> {
        self.status.read().bit(index)
    }

    pub fn register_change_handler(&self, handler: Arc<ChangeHandler>) {
        self.change_handlers.lock().push(handler);
    }

    /// Replace the whole snapshot. Each registered change handler is
    /// invoked (outside the status lock) whenever `all_passed` or any
    /// individual bit flips, receiving the full new status so it can react
    /// to combinations (spec §4.4). One handler panicking must not prevent
    /// the others from running.
    pub fn update(&self, new_status: InterlockStatus) {
        let changed = {
            let mut status = self.status.write();
            let changed = *status != new_status;
            *status = new_status;
            changed
        };
        if !changed {
            return;
        }
        if !new_status.all_passed {
            tracing::warn!(?new_status, "interlock aggregate failed");
        } else {
            tracing::info!("interlock aggregate cleared, all checks passing");
        }
        for handler in self.change_handlers.lock().iter() {
            let handler = handler.clone();
            let status = new_status;
            let _ = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| handler(&status)));
        }
    }

    /// Disarm the generator, stop the detector, and record a safety-journal
    /// entry — all within the 100ms budget of spec §4.4. Idempotent:
    /// calling it twice only runs the side effects once.
    #[allow(clippy::too_many_arguments)]
    pub fn emergency_standby(
        &self,
        from_state: State,
        operator_id: &str,
        journal: &dyn JournalSink,
        disarm_generator: impl FnOnce() -> CoreResult<()>,
        stop_detector: impl FnOnce() -> CoreResult<()>,
    ) -> CoreResult<()> {
        if self.standby_engaged.swap(true, Ordering::SeqCst) {
            return Ok(());
        }
        tracing::error!(?from_state, operator_id, "emergency standby engaged");
        disarm_generator()?;
        stop_detector()?;
        journal.append(JournalEntry {
            transition_id: 0,
            utc_timestamp: Utc::now(),
            from: from_state,
            to: State::Idle,
            trigger: Trigger::CriticalHardwareError,
            guard_results: vec![],
            operator_id: operator_id.to_string(),
            study_uid: None,
            metadata: serde_json::json!({ "action": "emergency_standby" }),
            category: JournalCategory::Safety,
        })?;
        Ok(())
    }

    /// Allows a fresh emergency-standby cycle after recovery has cleared
    /// the fault that triggered the previous one.
    pub fn rearm(&self) {
        self.standby_engaged.store(false, Ordering::SeqCst);
    }

    pub fn is_in_standby(&self) -> bool {
        self.standby_engaged.load(Ordering::SeqCst)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::journal::InMemoryJournal;
    use std::sync::atomic::AtomicU32;

    #[test]
    fn all_passed_conjunction_round_trips_through_check_all() {
        let agg = SafetyInterlockAggregator::new(InterlockStatus::all_ok(0));
        assert!(agg.check_all().all_passed);
    }

    #[test]
    fn change_handler_fires_once_per_actual_change() {
        let agg = SafetyInterlockAggregator::new(InterlockStatus::all_ok(0));
        let calls = Arc::new(AtomicU32::new(0));
        let calls_clone = calls.clone();
        agg.register_change_handler(Arc::new(move |_status| {
            calls_clone.fetch_add(1, Ordering::SeqCst);
        }));
        agg.update(InterlockStatus::all_ok(0)); // identical, no change
        assert_eq!(calls.load(Ordering::SeqCst), 0);
        let mut next = InterlockStatus::all_ok(1);
        next.door_closed = false;
        next.all_passed = false;
        agg.update(next);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn emergency_standby_is_idempotent() {
        let agg = SafetyInterlockAggregator::new(InterlockStatus::all_ok(0));
        let journal = InMemoryJournal::new();
        let calls = Arc::new(AtomicU32::new(0));
        for _ in 0..2 {
            let calls_clone = calls.clone();
            agg.emergency_standby(
                State::ExposureTrigger,
                "op1",
                &journal,
                move || {
                    calls_clone.fetch_add(1, Ordering::SeqCst);
                    Ok(())
                },
                || Ok(()),
            )
            .unwrap();
        }
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(journal.len(), 1);
    }
}
