//! Multi-producer/multi-subscriber event bus (spec §4.1 step 8, §4.2).
//!
//! Slow subscribers must never block publishers: each subscriber owns a
//! bounded queue with a drop-oldest policy, and a counter of dropped events
//! it can inspect. Delivery to any one subscriber's queue must be
//! near-instant (the 50 ms bound in spec §4.2 is a delivery deadline, which
//! this in-process design trivially meets since `publish` only enqueues).

use crate::model::state::{State, Trigger};
use parking_lot::{Condvar, Mutex};
use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

#[derive(Debug, Clone, PartialEq)]
#[allow(clippy::large_enum_variant)]
pub enum Event {
    StateChanged {
        sequence: u64,
        from: State,
        to: State,
        trigger: Trigger,
        timestamp_us: u64,
    },
    ExposureTriggered {
        timestamp_us: u64,
    },
    ExposureCompleted {
        success: bool,
        timestamp_us: u64,
    },
    ImageAccepted {
        timestamp_us: u64,
    },
    ImageRejected {
        timestamp_us: u64,
    },
    InterlockViolation {
        failed_bits: Vec<&'static str>,
        timestamp_us: u64,
    },
    DoseThresholdWarning {
        study_id: String,
        projected: f64,
        timestamp_us: u64,
    },
    DoseThresholdExceeded {
        study_id: String,
        projected: f64,
        timestamp_us: u64,
    },
}

const DEFAULT_SUBSCRIBER_CAPACITY: usize = 256;

struct SubscriberQueue {
    state: Mutex<VecDeque<Event>>,
    not_empty: Condvar,
    capacity: usize,
    dropped: AtomicU64,
}

impl SubscriberQueue {
    fn new(capacity: usize) -> Self {
        Self {
            state: Mutex::new(VecDeque::with_capacity(capacity)),
            not_empty: Condvar::new(),
            capacity,
            dropped: AtomicU64::new(0),
        }
    }

    fn push(&self, event: Event) {
        let mut queue = self.state.lock();
        if queue.len() >= self.capacity {
            queue.pop_front();
            self.dropped.fetch_add(1, Ordering::Relaxed);
        }
        queue.push_back(event);
        self.not_empty.notify_one();
    }
}

/// A subscriber's handle to its own bounded queue.
pub struct Subscription {
    queue: Arc<SubscriberQueue>,
}

impl Subscription {
    /// Non-blocking receive; `None` if the queue is currently empty.
    pub fn try_recv(&self) -> Option<Event> {
        self.queue.state.lock().pop_front()
    }

    /// Block until an event arrives or the timeout elapses.
    pub fn recv_timeout(&self, timeout: Duration) -> Option<Event> {
        let mut queue = self.queue.state.lock();
        if queue.is_empty() {
            let result = self.queue.not_empty.wait_for(&mut queue, timeout);
            if result.timed_out() && queue.is_empty() {
                return None;
            }
        }
        queue.pop_front()
    }

    /// Count of events dropped from this subscriber's queue due to
    /// overflow (drop-oldest policy).
    pub fn dropped_count(&self) -> u64 {
        self.queue.dropped.load(Ordering::Relaxed)
    }
}

#[derive(Default)]
pub struct EventBus {
    subscribers: Mutex<Vec<Arc<SubscriberQueue>>>,
    sequence: AtomicU64,
}

impl EventBus {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn subscribe(&self) -> Subscription {
        self.subscribe_with_capacity(DEFAULT_SUBSCRIBER_CAPACITY)
    }

    pub fn subscribe_with_capacity(&self, capacity: usize) -> Subscription {
        let queue = Arc::new(SubscriberQueue::new(capacity));
        self.subscribers.lock().push(queue.clone());
        Subscription { queue }
    }

    /// Publish to every current subscriber. A panic while formatting or
    /// cloning one subscriber's event must not stop delivery to the rest;
    /// since publication here is pure enqueue (no user callback runs on
    /// the publisher thread), there is nothing that can raise mid-fanout.
    pub fn publish(&self, event: Event) {
        for subscriber in self.subscribers.lock().iter() {
            subscriber.push(event.clone());
        }
    }

    pub fn next_sequence(&self) -> u64 {
        self.sequence.fetch_add(1, Ordering::SeqCst)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn subscriber_receives_published_event() {
        let bus = EventBus::new();
        let sub = bus.subscribe();
        bus.publish(Event::ImageAccepted { timestamp_us: 1 });
        assert_eq!(sub.try_recv(), Some(Event::ImageAccepted { timestamp_us: 1 }));
    }

    #[test]
    fn slow_subscriber_drops_oldest_under_overflow() {
        let bus = EventBus::new();
        let sub = bus.subscribe_with_capacity(2);
        for i in 0..5u64 {
            bus.publish(Event::ImageAccepted { timestamp_us: i });
        }
        assert_eq!(sub.dropped_count(), 3);
        assert_eq!(sub.try_recv(), Some(Event::ImageAccepted { timestamp_us: 3 }));
        assert_eq!(sub.try_recv(), Some(Event::ImageAccepted { timestamp_us: 4 }));
        assert_eq!(sub.try_recv(), None);
    }

    #[test]
    fn multiple_subscribers_each_get_every_event() {
        let bus = EventBus::new();
        let a = bus.subscribe();
        let b = bus.subscribe();
        bus.publish(Event::ImageRejected { timestamp_us: 7 });
        assert!(a.try_recv().is_some());
        assert!(b.try_recv().is_some());
    }
}
