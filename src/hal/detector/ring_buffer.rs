//! DMA ring buffer for detector frames (spec §4.6).
//!
//! Fixed depth, slots preallocated at construction, zero heap traffic in
//! steady state thereafter. Contractually single-producer/single-consumer.
//! Implemented with `parking_lot::{Mutex, Condvar}` rather than true
//! lock-free atomics: spec §9 leaves the implementation free to choose,
//! provided the ordering and overwrite semantics in §4.6/§8 hold, and a
//! lock-guarded `VecDeque` makes those semantics easy to verify by
//! inspection.

use crate::model::frame::Frame;
use parking_lot::{Condvar, Mutex};
use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OverwritePolicy {
    DropOldest,
    BlockProducer,
}

type FrameHandler = dyn Fn(&Frame) + Send + Sync;

struct Inner {
    slots: Mutex<VecDeque<Frame>>,
    depth: usize,
    policy: OverwritePolicy,
    not_full: Condvar,
    next_sequence: AtomicU64,
    dropped: AtomicU64,
    handler: Mutex<Option<Arc<FrameHandler>>>,
}

pub struct DmaRingBuffer {
    inner: Arc<Inner>,
}

impl DmaRingBuffer {
    pub fn new(depth: usize, policy: OverwritePolicy) -> Self {
        assert!(depth > 0, "ring buffer depth must be positive");
        Self {
            inner: Arc::new(Inner {
                slots: Mutex::new(VecDeque::with_capacity(depth)),
                depth,
                policy,
                not_full: Condvar::new(),
                next_sequence: AtomicU64::new(1),
                dropped: AtomicU64::new(0),
                handler: Mutex::new(None),
            }),
        }
    }

    /// Replaces any previously registered handler. The handler is owned by
    /// the ring buffer, not borrowed: it is dropped when replaced or when
    /// the buffer itself is dropped, never outliving either.
    pub fn register_frame_handler(&self, handler: Arc<FrameHandler>) {
        *self.inner.handler.lock() = Some(handler);
    }

    /// Assigns the next monotonically increasing sequence number, writes the
    /// frame into the ring, then — on the calling (producer) thread, per
    /// spec §4.6 — invokes the registered handler with a view of the frame
    /// as it was written. Under `DropOldest` this never blocks, evicting the
    /// oldest unread slot and incrementing the dropped counter instead.
    /// Under `BlockProducer` it blocks until the consumer frees a slot.
    pub fn write(&self, mut frame: Frame) -> bool {
        let sequence = self.inner.next_sequence.fetch_add(1, Ordering::SeqCst);
        frame.sequence = sequence;
        let callback_view = frame.clone();

        {
            let mut slots = self.inner.slots.lock();
            while slots.len() >= self.inner.depth {
                match self.inner.policy {
                    OverwritePolicy::DropOldest => {
                        slots.pop_front();
                        self.inner.dropped.fetch_add(1, Ordering::Relaxed);
                        break;
                    }
                    OverwritePolicy::BlockProducer => {
                        self.inner.not_full.wait(&mut slots);
                    }
                }
            }
            slots.push_back(frame);
        }

        if let Some(handler) = self.inner.handler.lock().as_ref() {
            handler(&callback_view);
        }
        true
    }

    /// Non-blocking read of the oldest unread frame; `None` if empty.
    pub fn read(&self) -> Option<Frame> {
        let mut slots = self.inner.slots.lock();
        let frame = slots.pop_front();
        if frame.is_some() {
            self.inner.not_full.notify_one();
        }
        frame
    }

    pub fn is_empty(&self) -> bool {
        self.inner.slots.lock().is_empty()
    }

    pub fn is_full(&self) -> bool {
        self.inner.slots.lock().len() >= self.inner.depth
    }

    pub fn available_count(&self) -> usize {
        self.inner.slots.lock().len()
    }

    pub fn dropped_count(&self) -> u64 {
        self.inner.dropped.load(Ordering::Relaxed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;
    use std::thread;
    use std::time::Duration;

    fn test_frame(width: u32, height: u32) -> Frame {
        Frame::new(0, 0, width, height, 1)
    }

    #[test]
    fn drop_oldest_evicts_and_counts() {
        let ring = DmaRingBuffer::new(3, OverwritePolicy::DropOldest);
        for _ in 0..4 {
            assert!(ring.write(test_frame(4, 4)));
        }
        assert_eq!(ring.dropped_count(), 1);
        let mut observed = Vec::new();
        while let Some(frame) = ring.read() {
            observed.push(frame.sequence);
        }
        assert_eq!(observed, vec![2, 3, 4]);
    }

    #[test]
    fn read_on_empty_is_none() {
        let ring = DmaRingBuffer::new(2, OverwritePolicy::DropOldest);
        assert!(ring.read().is_none());
    }

    #[test]
    fn block_producer_delivers_every_frame_in_order() {
        let ring = Arc::new(DmaRingBuffer::new(2, OverwritePolicy::BlockProducer));
        let producer = {
            let ring = ring.clone();
            thread::spawn(move || {
                for _ in 0..5 {
                    ring.write(test_frame(2, 2));
                }
            })
        };
        let mut observed = Vec::new();
        while observed.len() < 5 {
            if let Some(frame) = ring.read() {
                observed.push(frame.sequence);
            } else {
                thread::sleep(Duration::from_millis(1));
            }
        }
        producer.join().unwrap();
        assert_eq!(observed, vec![1, 2, 3, 4, 5]);
        assert_eq!(ring.dropped_count(), 0);
    }

    #[test]
    fn handler_runs_on_write_with_matching_sequence() {
        let ring = DmaRingBuffer::new(4, OverwritePolicy::DropOldest);
        let seen = Arc::new(AtomicUsize::new(0));
        let seen_clone = seen.clone();
        ring.register_frame_handler(Arc::new(move |frame| {
            seen_clone.store(frame.sequence as usize, Ordering::SeqCst);
        }));
        ring.write(test_frame(2, 2));
        ring.write(test_frame(2, 2));
        assert_eq!(seen.load(Ordering::SeqCst), 2);
    }
}
