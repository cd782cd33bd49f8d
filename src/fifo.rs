//! Bounded FIFO queue shared between the producer and consumer threads.
//!
//! A direct translation of the original `queue`/`queueAdd`/`queueDel`
//! pthread design (spec.md §4.1) into `std::sync::{Mutex, Condvar}`.
//! Back-pressure only: the queue never drops a trade, and a full queue
//! blocks the producer until the consumer makes room.

use std::collections::VecDeque;
use std::sync::{Condvar, Mutex};
use std::time::Duration;

use crate::model::Trade;

/// Default capacity (spec.md §6 "Configuration constants": FIFO capacity 500).
pub const CAPACITY: usize = 500;

/// Result of a blocking queue operation that may be interrupted by
/// shutdown.
#[derive(Debug, PartialEq, Eq)]
pub enum Outcome {
    Done,
    Stopped,
}

struct Inner {
    buf: VecDeque<Trade>,
    capacity: usize,
}

/// Fixed-capacity FIFO with blocking put/take.
///
/// Invariant: `0 <= buf.len() <= capacity` at all times; enforced solely
/// by `enqueue` blocking while full and `dequeue` blocking while empty.
pub struct Fifo {
    inner: Mutex<Inner>,
    not_full: Condvar,
    not_empty: Condvar,
}

impl Fifo {
    pub fn new(capacity: usize) -> Self {
        Self {
            inner: Mutex::new(Inner {
                buf: VecDeque::with_capacity(capacity),
                capacity,
            }),
            not_full: Condvar::new(),
            not_empty: Condvar::new(),
        }
    }

    /// Blocks while the queue is full. On wake, if `shutdown` is set,
    /// returns `Stopped` without enqueuing (spec.md §4.1). Otherwise
    /// appends `t` and wakes one consumer.
    pub fn enqueue(&self, t: Trade, shutdown: &crate::state::ShutdownFlag) -> Outcome {
        let mut guard = self.inner.lock().unwrap();
        loop {
            if shutdown.is_set() {
                return Outcome::Stopped;
            }
            if guard.buf.len() < guard.capacity {
                break;
            }
            guard = self.not_full.wait(guard).unwrap();
        }
        if shutdown.is_set() {
            return Outcome::Stopped;
        }
        guard.buf.push_back(t);
        drop(guard);
        self.not_empty.notify_one();
        Outcome::Done
    }

    /// Blocks while the queue is empty. On wake, if `shutdown` is set and
    /// the queue is still empty, returns `Stopped`. Otherwise removes and
    /// returns the head, waking one producer.
    pub fn dequeue(&self, shutdown: &crate::state::ShutdownFlag) -> Option<Trade> {
        let mut guard = self.inner.lock().unwrap();
        loop {
            if let Some(t) = guard.buf.pop_front() {
                drop(guard);
                self.not_full.notify_one();
                return Some(t);
            }
            if shutdown.is_set() {
                return None;
            }
            guard = self.not_empty.wait(guard).unwrap();
        }
    }

    /// Wakes every waiter on both condvars; used by shutdown so blocked
    /// producer/consumer calls observe the flag and exit (spec.md §4.6).
    pub fn notify_shutdown(&self) {
        self.not_full.notify_all();
        self.not_empty.notify_all();
    }

    #[cfg(test)]
    pub fn len(&self) -> usize {
        self.inner.lock().unwrap().buf.len()
    }

    /// Non-blocking dequeue used only by tests that want to drain without
    /// waiting on the empty condition.
    #[cfg(test)]
    pub fn try_dequeue(&self) -> Option<Trade> {
        let mut guard = self.inner.lock().unwrap();
        let t = guard.buf.pop_front();
        drop(guard);
        if t.is_some() {
            self.not_full.notify_one();
        }
        t
    }

    #[cfg(test)]
    pub fn dequeue_timeout(&self, timeout: Duration) -> Option<Trade> {
        let guard = self.inner.lock().unwrap();
        let (mut guard, result) = self
            .not_empty
            .wait_timeout_while(guard, timeout, |inner| inner.buf.is_empty())
            .unwrap();
        if result.timed_out() {
            return None;
        }
        let t = guard.buf.pop_front();
        drop(guard);
        if t.is_some() {
            self.not_full.notify_one();
        }
        t
    }
}
