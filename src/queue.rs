//! Mutex-guarded FIFO used to hand decoded reads from workers to the writer.
//!
//! Every operation takes the same lock, so a size or emptiness check is never
//! interleaved with a concurrent mutation. There is no capacity limit; pushes
//! never block.
//!
//! # Waking the consumer
//!
//! [`HandoffQueue::push_and_notify`] wakes parked consumers only on the
//! empty to non-empty transition. [`HandoffQueue::peek_or_wait`] parks at most
//! once per call and returns `false` after waking, whether or not anything
//! arrived. Callers must loop and re-check:
//!
//! ```
//! use std::sync::Arc;
//! use std::thread;
//! use threen_table::queue::HandoffQueue;
//!
//! let queue = Arc::new(HandoffQueue::new());
//! let producer = {
//!     let queue = Arc::clone(&queue);
//!     thread::spawn(move || queue.push_and_notify(7u32))
//! };
//!
//! let mut front = None;
//! while !queue.peek_or_wait(&mut front) {}
//! assert_eq!(front, Some(7));
//! assert_eq!(queue.pop(), Some(7));
//! producer.join().unwrap();
//! ```
//!
//! A wake-up only reaches threads already parked when it fires, and plain
//! [`HandoffQueue::push`] never wakes anyone. A consumer relying on a single
//! wake-up instead of re-checking the queue can sleep forever.

use log::trace;
use parking_lot::{Condvar, Mutex};
use std::collections::VecDeque;

struct QueueInner<T> {
    items: VecDeque<T>,
    /// Threads currently parked in `peek_or_wait`.
    waiting: usize,
}

/// Unbounded multi-producer FIFO with a single-shot wait for idle consumers.
pub struct HandoffQueue<T> {
    inner: Mutex<QueueInner<T>>,
    not_empty: Condvar,
}

impl<T> HandoffQueue<T> {
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(QueueInner {
                items: VecDeque::new(),
                waiting: 0,
            }),
            not_empty: Condvar::new(),
        }
    }

    /// Append to the tail without waking anyone.
    pub fn push(&self, value: T) {
        self.inner.lock().items.push_back(value);
    }

    /// Append to the tail; if the queue was empty, wake every parked consumer.
    pub fn push_and_notify(&self, value: T) {
        let mut inner = self.inner.lock();
        let was_empty = inner.items.is_empty();
        inner.items.push_back(value);
        if was_empty {
            trace!("handoff queue became non-empty, waking {} consumer(s)", inner.waiting);
            self.not_empty.notify_all();
        }
    }

    /// Remove and return the front, or None if empty. Never blocks.
    pub fn try_pop(&self) -> Option<T> {
        self.inner.lock().items.pop_front()
    }

    /// Remove the front after a successful [`peek_or_wait`](Self::peek_or_wait).
    ///
    /// Identical to [`try_pop`](Self::try_pop); named for the peek-then-remove flow.
    pub fn pop(&self) -> Option<T> {
        self.try_pop()
    }

    pub fn len(&self) -> usize {
        self.inner.lock().items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.lock().items.is_empty()
    }

    /// Number of threads currently parked in `peek_or_wait`.
    pub fn waiting_consumers(&self) -> usize {
        self.inner.lock().waiting
    }
}

impl<T: Clone> HandoffQueue<T> {
    /// Copy of the front element, if any.
    pub fn front(&self) -> Option<T> {
        self.inner.lock().items.front().cloned()
    }

    /// Copy the front into `out` and return true, leaving it queued.
    ///
    /// If the queue is empty, park until the next notification and return
    /// false without touching `out`. The wait does not loop on a predicate:
    /// a spurious wake-up, or an item already taken by another consumer,
    /// also returns false. There is no timeout.
    pub fn peek_or_wait(&self, out: &mut Option<T>) -> bool {
        let mut inner = self.inner.lock();
        if let Some(front) = inner.items.front() {
            *out = Some(front.clone());
            return true;
        }

        inner.waiting += 1;
        trace!("handoff queue empty, consumer waiting");
        self.not_empty.wait(&mut inner);
        inner.waiting -= 1;
        trace!("handoff queue consumer woke");
        false
    }
}

impl<T> Default for HandoffQueue<T> {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::thread;
    use std::time::Duration;

    fn wait_for_parked<T>(queue: &HandoffQueue<T>, n: usize) {
        while queue.waiting_consumers() < n {
            thread::sleep(Duration::from_millis(1));
        }
    }

    #[test]
    fn test_fifo_order() {
        let queue = HandoffQueue::new();
        queue.push("a");
        queue.push("b");
        assert_eq!(queue.len(), 2);
        assert_eq!(queue.try_pop(), Some("a"));
        assert_eq!(queue.try_pop(), Some("b"));
        assert_eq!(queue.try_pop(), None);
        assert!(queue.is_empty());
    }

    #[test]
    fn test_peek_does_not_remove() {
        let queue = HandoffQueue::new();
        queue.push(1);
        queue.push(2);
        let mut out = None;
        assert!(queue.peek_or_wait(&mut out));
        assert_eq!(out, Some(1));
        assert_eq!(queue.front(), Some(1));
        assert_eq!(queue.len(), 2);
        assert_eq!(queue.pop(), Some(1));
        assert_eq!(queue.front(), Some(2));
    }

    #[test]
    fn test_notify_wakes_parked_consumer() {
        let queue = Arc::new(HandoffQueue::new());
        let consumer = {
            let queue = Arc::clone(&queue);
            thread::spawn(move || {
                let mut out = None;
                let first = queue.peek_or_wait(&mut out);
                let second = queue.peek_or_wait(&mut out);
                (first, second, out)
            })
        };

        wait_for_parked(&queue, 1);
        queue.push_and_notify(42);

        let (first, second, out) = consumer.join().unwrap();
        assert!(!first, "wait path always reports false after waking");
        assert!(second);
        assert_eq!(out, Some(42));
        assert_eq!(queue.waiting_consumers(), 0);
    }

    #[test]
    fn test_notify_only_on_empty_transition() {
        let queue = Arc::new(HandoffQueue::new());
        let consumer = {
            let queue = Arc::clone(&queue);
            thread::spawn(move || {
                let mut out = None;
                queue.peek_or_wait(&mut out)
            })
        };

        wait_for_parked(&queue, 1);
        // A plain push does not wake the parked consumer.
        queue.push(1);
        thread::sleep(Duration::from_millis(20));
        assert_eq!(queue.waiting_consumers(), 1);

        // Non-empty queue: no transition, still no wake-up.
        queue.push_and_notify(2);
        thread::sleep(Duration::from_millis(20));
        assert_eq!(queue.waiting_consumers(), 1);

        // Drain, then the empty to non-empty push wakes it.
        assert_eq!(queue.try_pop(), Some(1));
        assert_eq!(queue.try_pop(), Some(2));
        queue.push_and_notify(3);
        assert!(!consumer.join().unwrap());
        assert_eq!(queue.try_pop(), Some(3));
    }

    #[test]
    fn test_notify_wakes_all_parked() {
        let queue = Arc::new(HandoffQueue::new());
        let consumers: Vec<_> = (0..3)
            .map(|_| {
                let queue = Arc::clone(&queue);
                thread::spawn(move || {
                    let mut out = None;
                    queue.peek_or_wait(&mut out)
                })
            })
            .collect();

        wait_for_parked(&queue, 3);
        queue.push_and_notify(());
        for consumer in consumers {
            assert!(!consumer.join().unwrap());
        }
    }

    #[test]
    fn test_many_producers_single_consumer() {
        let queue = Arc::new(HandoffQueue::new());
        let producers: Vec<_> = (0..4u64)
            .map(|p| {
                let queue = Arc::clone(&queue);
                thread::spawn(move || {
                    for i in 0..250u64 {
                        queue.push_and_notify(Some(p * 1000 + i));
                    }
                })
            })
            .collect();

        let consumer = {
            let queue = Arc::clone(&queue);
            thread::spawn(move || {
                let mut seen = Vec::new();
                let mut front = None;
                while seen.len() < 1000 {
                    if !queue.peek_or_wait(&mut front) {
                        continue;
                    }
                    if let Some(Some(value)) = queue.pop() {
                        seen.push(value);
                    }
                }
                seen
            })
        };

        for producer in producers {
            producer.join().unwrap();
        }
        let seen = consumer.join().unwrap();
        assert_eq!(seen.len(), 1000);
        // FIFO within each producer.
        for p in 0..4u64 {
            let mine: Vec<u64> = seen.iter().copied().filter(|v| v / 1000 == p).collect();
            assert!(mine.windows(2).all(|w| w[0] < w[1]));
        }
        assert!(queue.is_empty());
    }
}
