//! Generator command queue (spec §4.3).
//!
//! FIFO for ordinary commands, bounded depth; a separate abort lane that
//! always drains first and is never coalesced or dropped. A single
//! dispatcher thread owns execution so callers enqueueing never block.

use crate::error::{CoreError, CoreResult};
use parking_lot::{Condvar, Mutex};
use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

type Action = Box<dyn FnMut() -> CoreResult<()> + Send>;
type Completion = Box<dyn FnOnce(CoreResult<()>) + Send>;

pub struct QueuedCommand {
    pub id: u64,
    pub label: &'static str,
    pub is_abort: bool,
    action: Action,
    completion: Completion,
}

struct Queues {
    abort: VecDeque<QueuedCommand>,
    normal: VecDeque<QueuedCommand>,
}

pub struct CommandQueue {
    queues: Mutex<Queues>,
    not_empty: Condvar,
    depth: usize,
    retry_count: u32,
    next_id: AtomicU64,
}

impl CommandQueue {
    pub fn new(depth: usize, retry_count: u32) -> Self {
        Self {
            queues: Mutex::new(Queues {
                abort: VecDeque::new(),
                normal: VecDeque::new(),
            }),
            not_empty: Condvar::new(),
            depth,
            retry_count,
            next_id: AtomicU64::new(1),
        }
    }

    /// Non-blocking enqueue of an ordinary command. Fails immediately with
    /// `State` if the queue is already at its configured depth.
    pub fn enqueue(
        &self,
        label: &'static str,
        action: impl FnMut() -> CoreResult<()> + Send + 'static,
        completion: impl FnOnce(CoreResult<()>) + Send + 'static,
    ) -> CoreResult<u64> {
        let mut queues = self.queues.lock();
        if queues.normal.len() >= self.depth {
            return Err(CoreError::State(format!(
                "command queue full at depth {}",
                self.depth
            )));
        }
        let id = self.next_id.fetch_add(1, Ordering::SeqCst);
        queues.normal.push_back(QueuedCommand {
            id,
            label,
            is_abort: false,
            action: Box::new(action),
            completion: Box::new(completion),
        });
        self.not_empty.notify_one();
        Ok(id)
    }

    /// Jumps the abort lane. Runs after the in-flight command completes,
    /// never dropped regardless of queue depth.
    pub fn enqueue_abort(
        &self,
        action: impl FnMut() -> CoreResult<()> + Send + 'static,
        completion: impl FnOnce(CoreResult<()>) + Send + 'static,
    ) -> u64 {
        let mut queues = self.queues.lock();
        let id = self.next_id.fetch_add(1, Ordering::SeqCst);
        queues.abort.push_back(QueuedCommand {
            id,
            label: "abort_exposure",
            is_abort: true,
            action: Box::new(action),
            completion: Box::new(completion),
        });
        self.not_empty.notify_one();
        id
    }

    fn wait_next(&self, stop: &AtomicBool) -> Option<QueuedCommand> {
        let mut queues = self.queues.lock();
        loop {
            if let Some(cmd) = queues.abort.pop_front() {
                return Some(cmd);
            }
            if let Some(cmd) = queues.normal.pop_front() {
                return Some(cmd);
            }
            if stop.load(Ordering::SeqCst) {
                return None;
            }
            self.not_empty
                .wait_for(&mut queues, Duration::from_millis(100));
        }
    }

    /// Drains the queue on the calling thread until `stop` is set. Each
    /// command is retried up to `retry_count` times on a `Timeout` error
    /// before its completion handler is invoked with the final outcome.
    /// Intended to be the body of the dedicated command-dispatcher thread
    /// (spec §5 "a single command dispatcher thread per generator instance").
    pub fn run_dispatcher(self: &Arc<Self>, stop: &AtomicBool) {
        while let Some(mut cmd) = self.wait_next(stop) {
            let mut attempt = 0u32;
            let result = loop {
                match (cmd.action)() {
                    Ok(()) => break Ok(()),
                    Err(CoreError::Timeout(d)) if attempt < self.retry_count => {
                        attempt += 1;
                        tracing::warn!(
                            label = cmd.label,
                            attempt,
                            timeout = ?d,
                            "generator command timed out, retrying"
                        );
                    }
                    Err(e) => break Err(e),
                }
            };
            (cmd.completion)(result);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicU32;

    #[test]
    fn queue_full_is_rejected_immediately() {
        let queue = CommandQueue::new(1, 0);
        queue.enqueue("first", || Ok(()), |_| {}).unwrap();
        let err = queue.enqueue("second", || Ok(()), |_| {}).unwrap_err();
        assert!(matches!(err, CoreError::State(_)));
    }

    #[test]
    fn abort_jumps_ahead_of_queued_normal_commands() {
        let queue = CommandQueue::new(4, 0);
        queue.enqueue("normal", || Ok(()), |_| {}).unwrap();
        queue.enqueue_abort(|| Ok(()), |_| {});

        let stop = AtomicBool::new(false);
        let first = queue.wait_next(&stop).unwrap();
        assert!(first.is_abort);
        let second = queue.wait_next(&stop).unwrap();
        assert!(!second.is_abort);
        assert_eq!(second.label, "normal");
    }

    #[test]
    fn timeout_retries_then_succeeds() {
        let queue = Arc::new(CommandQueue::new(4, 2));
        let attempts = Arc::new(AtomicU32::new(0));
        let attempts_clone = attempts.clone();
        let succeeded = Arc::new(AtomicBool::new(false));
        let succeeded_clone = succeeded.clone();
        queue
            .enqueue(
                "flaky",
                move || {
                    let n = attempts_clone.fetch_add(1, Ordering::SeqCst);
                    if n < 2 {
                        Err(CoreError::Timeout(Duration::from_millis(500)))
                    } else {
                        Ok(())
                    }
                },
                move |result| succeeded_clone.store(result.is_ok(), Ordering::SeqCst),
            )
            .unwrap();
        // The queue empties after this one command, so `stop=true` is
        // already set before the dispatcher's next poll and it returns.
        let stop = AtomicBool::new(true);
        queue.run_dispatcher(&stop);
        assert_eq!(attempts.load(Ordering::SeqCst), 3);
        assert!(succeeded.load(Ordering::SeqCst));
    }
}
