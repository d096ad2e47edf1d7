//! Bounded, non-blocking handoff from the serving loop to the trainer.
//!
//! The serving loop offers each new transition here in O(1) and never waits
//! on the trainer. When the trainer falls behind and the queue fills up, new
//! transitions are dropped and counted.
//!
//! ```text
//! Serving loop ──offer()──> ArrayQueue (lock-free, bounded) ──drain()──> Trainer
//!                               │
//!                               └── full: drop + count
//! ```

use crossbeam_queue::ArrayQueue;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use crate::core::transition::Transition;

/// Lock-free bounded transition queue with drop-on-full.
pub struct IngestionQueue {
    queue: ArrayQueue<Transition>,
    /// Transitions accepted since start
    accepted: AtomicUsize,
    /// Transitions rejected because the queue was full
    dropped: AtomicUsize,
}

impl IngestionQueue {
    /// Create a queue holding at most `capacity` transitions.
    ///
    /// # Panics
    ///
    /// Panics if `capacity` is 0.
    pub fn new(capacity: usize) -> Self {
        Self {
            queue: ArrayQueue::new(capacity),
            accepted: AtomicUsize::new(0),
            dropped: AtomicUsize::new(0),
        }
    }

    /// Offer a transition without blocking.
    ///
    /// Returns `false` (and discards the transition) if the queue is full.
    pub fn offer(&self, transition: Transition) -> bool {
        match self.queue.push(transition) {
            Ok(()) => {
                self.accepted.fetch_add(1, Ordering::Relaxed);
                true
            }
            Err(_rejected) => {
                self.dropped.fetch_add(1, Ordering::Relaxed);
                false
            }
        }
    }

    /// Pop every queued transition, oldest first, without blocking.
    pub fn drain(&self) -> Vec<Transition> {
        let mut drained = Vec::with_capacity(self.queue.len());
        while let Some(transition) = self.queue.pop() {
            drained.push(transition);
        }
        drained
    }

    /// Pop a single transition.
    pub fn pop(&self) -> Option<Transition> {
        self.queue.pop()
    }

    /// Approximate number of queued transitions.
    pub fn len(&self) -> usize {
        self.queue.len()
    }

    pub fn is_empty(&self) -> bool {
        self.queue.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.queue.capacity()
    }

    /// Total transitions accepted since start.
    pub fn accepted_count(&self) -> usize {
        self.accepted.load(Ordering::Relaxed)
    }

    /// Total transitions dropped because the queue was full.
    pub fn dropped_count(&self) -> usize {
        self.dropped.load(Ordering::Relaxed)
    }
}

/// Thread-safe shared ingestion queue.
pub type SharedIngestionQueue = Arc<IngestionQueue>;

/// Create a new shared ingestion queue.
pub fn ingestion_queue(capacity: usize) -> SharedIngestionQueue {
    Arc::new(IngestionQueue::new(capacity))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;
    use std::time::{Duration, Instant};

    fn tagged(tag: f32) -> Transition {
        Transition::new(vec![tag], vec![0], tag, vec![tag + 1.0])
    }

    #[test]
    fn test_offer_and_drain_in_order() {
        let queue = IngestionQueue::new(10);
        for i in 0..5 {
            assert!(queue.offer(tagged(i as f32)));
        }
        assert_eq!(queue.len(), 5);

        let drained = queue.drain();
        let tags: Vec<f32> = drained.iter().map(|t| t.reward).collect();
        assert_eq!(tags, vec![0.0, 1.0, 2.0, 3.0, 4.0]);
        assert!(queue.is_empty());
    }

    #[test]
    fn test_full_queue_drops_without_blocking() {
        let queue = IngestionQueue::new(3);
        for i in 0..3 {
            assert!(queue.offer(tagged(i as f32)));
        }

        let start = Instant::now();
        assert!(!queue.offer(tagged(99.0)));
        assert!(start.elapsed() < Duration::from_millis(50));

        assert_eq!(queue.len(), 3);
        assert_eq!(queue.dropped_count(), 1);
        assert_eq!(queue.accepted_count(), 3);

        // The rejected item was never enqueued
        assert!(queue.drain().iter().all(|t| t.reward != 99.0));
    }

    #[test]
    fn test_drain_empty_queue() {
        let queue = IngestionQueue::new(4);
        assert!(queue.drain().is_empty());
        assert!(queue.pop().is_none());
    }

    #[test]
    fn test_concurrent_producer_consumer() {
        let queue = ingestion_queue(64);
        let producer = {
            let queue = Arc::clone(&queue);
            thread::spawn(move || {
                for i in 0..1_000 {
                    queue.offer(tagged(i as f32));
                }
            })
        };

        let mut received = 0usize;
        let deadline = Instant::now() + Duration::from_secs(5);
        while Instant::now() < deadline {
            received += queue.drain().len();
            if producer.is_finished() && queue.is_empty() {
                break;
            }
        }
        producer.join().unwrap();
        received += queue.drain().len();

        assert_eq!(received + queue.dropped_count(), 1_000);
        assert_eq!(received, queue.accepted_count());
    }
}
