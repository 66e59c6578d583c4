//! Durable, append-only workflow journal (spec §4.1, §6).
//!
//! The journal is the safety backbone of the workflow engine: an accepted
//! transition is never observable to event subscribers until its entry is
//! durable (spec §8 "Journal-before-event"). The durability backend itself
//! (fsync-equivalent persistence) is an external collaborator (spec §6
//! "a persistence backend for the journal exposing `append(entry) -> ack`");
//! this module defines the entry shape, the `JournalSink` contract, and an
//! in-memory sink for embedding/tests.

use crate::error::{CoreError, CoreResult};
use crate::model::state::{State, Trigger};
use crate::workflow::guards::GuardResult;
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum JournalCategory {
    Workflow,
    Safety,
    Audit,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JournalEntry {
    pub transition_id: u64,
    pub utc_timestamp: DateTime<Utc>,
    pub from: State,
    pub to: State,
    pub trigger: Trigger,
    pub guard_results: Vec<GuardResult>,
    pub operator_id: String,
    pub study_uid: Option<String>,
    pub metadata: serde_json::Value,
    pub category: JournalCategory,
}

/// Durable append-only log. `append` must not return `Ok` until the entry
/// is acknowledged durable (spec §6 "durability equivalent to fsync").
pub trait JournalSink: Send + Sync {
    fn append(&self, entry: JournalEntry) -> CoreResult<()>;
    /// Most-recent-last tail of up to `n` entries, for crash recovery.
    fn tail(&self, n: usize) -> Vec<JournalEntry>;
    fn len(&self) -> usize;
}

/// In-memory journal for embedding and tests. Entries are never mutated
/// after being pushed (spec §3 invariant "Journal is append-only").
#[derive(Default)]
pub struct InMemoryJournal {
    entries: Mutex<Vec<JournalEntry>>,
}

impl InMemoryJournal {
    pub fn new() -> Self {
        Self::default()
    }
}

impl JournalSink for InMemoryJournal {
    fn append(&self, entry: JournalEntry) -> CoreResult<()> {
        self.entries.lock().push(entry);
        Ok(())
    }

    fn tail(&self, n: usize) -> Vec<JournalEntry> {
        let entries = self.entries.lock();
        let start = entries.len().saturating_sub(n);
        entries[start..].to_vec()
    }

    fn len(&self) -> usize {
        self.entries.lock().len()
    }
}

/// Test/ops double that fails the first `fail_count` appends, then
/// delegates to `inner`. Used to exercise spec §8 scenario 5
/// ("Journal-gated transition").
pub struct FaultInjectingJournal<J: JournalSink> {
    inner: J,
    remaining_failures: Mutex<u32>,
}

impl<J: JournalSink> FaultInjectingJournal<J> {
    pub fn new(inner: J, fail_count: u32) -> Self {
        Self {
            inner,
            remaining_failures: Mutex::new(fail_count),
        }
    }
}

impl<J: JournalSink> JournalSink for FaultInjectingJournal<J> {
    fn append(&self, entry: JournalEntry) -> CoreResult<()> {
        let mut remaining = self.remaining_failures.lock();
        if *remaining > 0 {
            *remaining -= 1;
            return Err(CoreError::Journal("simulated durable-write failure".into()));
        }
        drop(remaining);
        self.inner.append(entry)
    }

    fn tail(&self, n: usize) -> Vec<JournalEntry> {
        self.inner.tail(n)
    }

    fn len(&self) -> usize {
        self.inner.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::state::{State, Trigger};

    fn entry(transition_id: u64) -> JournalEntry {
        JournalEntry {
            transition_id,
            utc_timestamp: Utc::now(),
            from: State::Idle,
            to: State::WorklistSync,
            trigger: Trigger::WorklistSyncRequested,
            guard_results: vec![],
            operator_id: "op1".into(),
            study_uid: None,
            metadata: serde_json::json!({}),
            category: JournalCategory::Workflow,
        }
    }

    #[test]
    fn append_only_and_monotonic() {
        let journal = InMemoryJournal::new();
        journal.append(entry(1)).unwrap();
        journal.append(entry(2)).unwrap();
        assert_eq!(journal.len(), 2);
        let tail = journal.tail(1);
        assert_eq!(tail[0].transition_id, 2);
    }

    #[test]
    fn fault_injection_fails_then_recovers() {
        let journal = FaultInjectingJournal::new(InMemoryJournal::new(), 1);
        assert!(journal.append(entry(1)).is_err());
        assert!(journal.append(entry(1)).is_ok());
        assert_eq!(journal.len(), 1);
    }
}
