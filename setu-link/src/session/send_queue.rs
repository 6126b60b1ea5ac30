//! Dual-priority send queue.
//!
//! Two lanes under one mutex with one condition variable:
//!
//! - **Strict lane**: unbounded FIFO. An enqueued message is attempted for as
//!   long as the session lives (commands, settings, arm targets).
//! - **Droppable lane**: bounded FIFO. At capacity the oldest entries are
//!   evicted to make room, so the newest frames win - used where staleness is
//!   worse than loss (video).
//!
//! The single lock is load-bearing: the drain policy pops one strict then one
//! droppable message per wake-up, and two independent locks could reorder that
//! interleaving. Strict traffic can therefore never be starved by a flood of
//! droppable enqueues, while droppable traffic still progresses every cycle
//! that it has data.

use crate::protocol::messages::Message;
use std::collections::VecDeque;
use std::sync::{Condvar, Mutex};

/// Dual-lane outgoing message queue shared by producers and the outbound loop
pub struct SendQueue {
    lanes: Mutex<Lanes>,
    ready: Condvar,
}

struct Lanes {
    strict: VecDeque<Message>,
    droppable: VecDeque<Message>,
    droppable_limit: usize,
    closed: bool,
}

impl SendQueue {
    /// Create a queue with the given droppable-lane capacity
    pub fn new(droppable_limit: usize) -> Self {
        Self {
            lanes: Mutex::new(Lanes {
                strict: VecDeque::new(),
                droppable: VecDeque::new(),
                droppable_limit,
                closed: false,
            }),
            ready: Condvar::new(),
        }
    }

    /// Enqueue a message that must eventually be sent while the session lives.
    ///
    /// Always succeeds; messages enqueued after `close` are discarded since no
    /// drainer will ever run again.
    pub fn enqueue_strict(&self, message: Message) {
        let mut lanes = self.lock();
        if lanes.closed {
            log::debug!("Dropping strict message for closed queue");
            return;
        }
        lanes.strict.push_back(message);
        self.ready.notify_one();
    }

    /// Enqueue a message that may be evicted by newer droppable messages.
    pub fn enqueue_droppable(&self, message: Message) {
        let mut lanes = self.lock();
        if lanes.closed {
            log::debug!("Dropping droppable message for closed queue");
            return;
        }

        let mut dropped = 0;
        while lanes.droppable.len() >= lanes.droppable_limit {
            lanes.droppable.pop_front();
            dropped += 1;
        }
        if dropped > 0 {
            log::warn!("Dropped {} stale messages from droppable lane", dropped);
        }

        lanes.droppable.push_back(message);
        self.ready.notify_one();
    }

    /// Block until at least one lane has data, then take one message from each
    /// non-empty lane (strict first).
    ///
    /// Returns `None` once the queue is closed; any messages still queued at
    /// close are abandoned with the connection.
    pub fn next_batch(&self) -> Option<(Option<Message>, Option<Message>)> {
        let mut lanes = self.lock();
        while lanes.strict.is_empty() && lanes.droppable.is_empty() {
            if lanes.closed {
                return None;
            }
            lanes = self
                .ready
                .wait(lanes)
                .unwrap_or_else(|e| e.into_inner());
        }
        if lanes.closed {
            return None;
        }

        let strict = lanes.strict.pop_front();
        let droppable = lanes.droppable.pop_front();
        Some((strict, droppable))
    }

    /// Close the queue and wake every waiter. Idempotent.
    pub fn close(&self) {
        let mut lanes = self.lock();
        lanes.closed = true;
        self.ready.notify_all();
    }

    /// Current (strict, droppable) lane depths
    pub fn lane_depths(&self) -> (usize, usize) {
        let lanes = self.lock();
        (lanes.strict.len(), lanes.droppable.len())
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Lanes> {
        self.lanes.lock().unwrap_or_else(|e| e.into_inner())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::messages::{MotorState, VideoFrame};
    use std::sync::Arc;
    use std::thread;
    use std::time::Duration;

    fn strict_message(value: i32) -> Message {
        Message::Motor(MotorState {
            timestamp_ms: i64::from(value),
            left_forward: value,
            left_backward: 0,
            right_forward: 0,
            right_backward: 0,
        })
    }

    fn droppable_message(value: u8) -> Message {
        Message::Video(VideoFrame {
            timestamp_ms: i64::from(value),
            jpeg: vec![value],
        })
    }

    #[test]
    fn test_strict_lane_never_drops() {
        let queue = SendQueue::new(2);
        for i in 0..50 {
            queue.enqueue_strict(strict_message(i));
        }
        assert_eq!(queue.lane_depths().0, 50);

        // All 50 drain in FIFO order
        for i in 0..50 {
            let (strict, droppable) = queue.next_batch().unwrap();
            assert_eq!(strict, Some(strict_message(i)));
            assert_eq!(droppable, None);
        }
    }

    #[test]
    fn test_droppable_lane_keeps_newest() {
        let limit = 10;
        let queue = SendQueue::new(limit);
        for i in 0..15u8 {
            queue.enqueue_droppable(droppable_message(i));
        }
        assert_eq!(queue.lane_depths().1, limit);

        // Exactly the last `limit` messages remain, still in FIFO order
        for i in 5..15u8 {
            let (strict, droppable) = queue.next_batch().unwrap();
            assert_eq!(strict, None);
            assert_eq!(droppable, Some(droppable_message(i)));
        }
    }

    #[test]
    fn test_drain_takes_one_from_each_lane() {
        let queue = SendQueue::new(10);
        queue.enqueue_droppable(droppable_message(1));
        queue.enqueue_droppable(droppable_message(2));
        queue.enqueue_strict(strict_message(1));
        queue.enqueue_strict(strict_message(2));

        // One wake-up yields one strict and one droppable, strict first
        let (strict, droppable) = queue.next_batch().unwrap();
        assert_eq!(strict, Some(strict_message(1)));
        assert_eq!(droppable, Some(droppable_message(1)));

        let (strict, droppable) = queue.next_batch().unwrap();
        assert_eq!(strict, Some(strict_message(2)));
        assert_eq!(droppable, Some(droppable_message(2)));
    }

    #[test]
    fn test_next_batch_blocks_until_enqueue() {
        let queue = Arc::new(SendQueue::new(10));
        let producer_queue = Arc::clone(&queue);

        let producer = thread::spawn(move || {
            thread::sleep(Duration::from_millis(50));
            producer_queue.enqueue_strict(strict_message(9));
        });

        let (strict, droppable) = queue.next_batch().unwrap();
        assert_eq!(strict, Some(strict_message(9)));
        assert_eq!(droppable, None);
        producer.join().unwrap();
    }

    #[test]
    fn test_close_wakes_blocked_drainer() {
        let queue = Arc::new(SendQueue::new(10));
        let drainer_queue = Arc::clone(&queue);

        let drainer = thread::spawn(move || drainer_queue.next_batch());
        thread::sleep(Duration::from_millis(50));
        queue.close();

        assert_eq!(drainer.join().unwrap(), None);
    }

    #[test]
    fn test_enqueue_after_close_is_discarded() {
        let queue = SendQueue::new(10);
        queue.close();
        queue.enqueue_strict(strict_message(1));
        queue.enqueue_droppable(droppable_message(1));
        assert_eq!(queue.lane_depths(), (0, 0));
        assert_eq!(queue.next_batch(), None);
    }
}
