//! Uniform replay buffer with FIFO eviction.
//!
//! - **Ring buffer** storage: O(1) append, oldest transition overwritten when full
//! - **Uniform sampling** without replacement within a batch
//! - **Read/write lock**: the trainer appends and samples, autosave takes
//!   read-only copies for persistence

use parking_lot::RwLock;
use std::sync::Arc;

use crate::core::transition::Transition;

// ============================================================================
// Ring Buffer (Internal)
// ============================================================================

/// Ring buffer with O(1) insert and random access.
///
/// Overwrites oldest elements when capacity is reached.
struct RingBuffer<T> {
    /// Storage vector.
    buffer: Vec<T>,
    /// Capacity of the buffer.
    capacity: usize,
    /// Next position to write (circular). When full this is also the oldest item.
    write_pos: usize,
}

impl<T: Clone> RingBuffer<T> {
    fn new(capacity: usize) -> Self {
        Self {
            buffer: Vec::with_capacity(capacity.min(4096)),
            capacity,
            write_pos: 0,
        }
    }

    /// Push an item, overwriting the oldest if full.
    fn push(&mut self, item: T) {
        if self.buffer.len() < self.capacity {
            self.buffer.push(item);
        } else {
            self.buffer[self.write_pos] = item;
        }
        self.write_pos = (self.write_pos + 1) % self.capacity;
    }

    #[inline]
    fn get(&self, idx: usize) -> &T {
        debug_assert!(idx < self.buffer.len(), "Index out of bounds: {} >= {}", idx, self.buffer.len());
        &self.buffer[idx]
    }

    #[inline]
    fn len(&self) -> usize {
        self.buffer.len()
    }

    /// Items from oldest to newest.
    fn iter_oldest_first(&self) -> impl Iterator<Item = &T> {
        let split = if self.buffer.len() < self.capacity {
            0
        } else {
            self.write_pos
        };
        self.buffer[split..].iter().chain(self.buffer[..split].iter())
    }

    fn clear(&mut self) {
        self.buffer.clear();
        self.write_pos = 0;
    }
}

// ============================================================================
// Experience Buffer
// ============================================================================

/// Bounded store of past transitions.
///
/// # Key Properties
/// - Never holds more than `capacity` transitions
/// - Appending to a full buffer evicts exactly the oldest transition
/// - `sample(k)` returns `None` instead of a short batch
pub struct ExperienceBuffer {
    storage: RwLock<RingBuffer<Transition>>,
    capacity: usize,
}

impl ExperienceBuffer {
    /// Create an empty buffer.
    ///
    /// # Panics
    ///
    /// Panics if `capacity` is 0.
    pub fn new(capacity: usize) -> Self {
        assert!(capacity > 0, "buffer capacity must be > 0");
        Self {
            storage: RwLock::new(RingBuffer::new(capacity)),
            capacity,
        }
    }

    /// Create a buffer pre-filled with `transitions` (oldest first).
    ///
    /// Only the newest `capacity` transitions are kept.
    pub fn with_transitions(capacity: usize, transitions: Vec<Transition>) -> Self {
        let buffer = Self::new(capacity);
        buffer.extend(transitions);
        buffer
    }

    /// Append one transition.
    pub fn append(&self, transition: Transition) {
        self.storage.write().push(transition);
    }

    /// Append transitions in order under a single write lock.
    pub fn extend(&self, transitions: Vec<Transition>) {
        if transitions.is_empty() {
            return;
        }
        let mut storage = self.storage.write();
        for transition in transitions {
            storage.push(transition);
        }
    }

    /// Sample `batch_size` distinct transitions uniformly at random.
    ///
    /// Returns `None` if the buffer has fewer than `batch_size` items.
    pub fn sample(&self, batch_size: usize) -> Option<Vec<Transition>> {
        let storage = self.storage.read();
        let len = storage.len();
        if batch_size == 0 || len < batch_size {
            return None;
        }

        // Partial Fisher-Yates shuffle on indices
        let mut rng = fastrand::Rng::new();
        let mut indices: Vec<usize> = (0..len).collect();
        for i in 0..batch_size {
            let j = rng.usize(i..len);
            indices.swap(i, j);
        }

        Some(
            indices[..batch_size]
                .iter()
                .map(|&idx| storage.get(idx).clone())
                .collect(),
        )
    }

    /// Copy of every transition, oldest first.
    pub fn to_vec(&self) -> Vec<Transition> {
        self.storage.read().iter_oldest_first().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.storage.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Get buffer utilization as fraction (0.0 to 1.0).
    pub fn utilization(&self) -> f32 {
        self.len() as f32 / self.capacity as f32
    }

    pub fn clear(&self) {
        self.storage.write().clear();
    }
}

/// Thread-safe shared experience buffer.
pub type SharedExperienceBuffer = Arc<ExperienceBuffer>;

/// Create a new shared experience buffer.
pub fn experience_buffer(capacity: usize) -> SharedExperienceBuffer {
    Arc::new(ExperienceBuffer::new(capacity))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    fn tagged(tag: usize) -> Transition {
        Transition::new(vec![tag as f32], vec![1], tag as f32, vec![tag as f32 + 1.0])
    }

    fn tags(transitions: &[Transition]) -> Vec<usize> {
        transitions.iter().map(|t| t.reward as usize).collect()
    }

    #[test]
    fn test_ring_buffer_overflow_keeps_order() {
        let mut rb: RingBuffer<i32> = RingBuffer::new(3);
        rb.push(1);
        rb.push(2);
        rb.push(3);
        rb.push(4); // Overwrites 1

        assert_eq!(rb.len(), 3);
        assert_eq!(*rb.get(0), 4);
        let ordered: Vec<i32> = rb.iter_oldest_first().copied().collect();
        assert_eq!(ordered, vec![2, 3, 4]);
    }

    #[test]
    fn test_append_below_capacity() {
        let buffer = ExperienceBuffer::new(10);
        for i in 0..4 {
            buffer.append(tagged(i));
        }
        assert_eq!(buffer.len(), 4);
        assert_eq!(tags(&buffer.to_vec()), vec![0, 1, 2, 3]);
        assert!((buffer.utilization() - 0.4).abs() < 1e-6);
    }

    #[test]
    fn test_fifo_eviction_drops_exactly_the_oldest() {
        let capacity = 100;
        let buffer = ExperienceBuffer::new(capacity);
        for i in 0..=capacity {
            buffer.append(tagged(i));
        }

        assert_eq!(buffer.len(), capacity);
        let contents = tags(&buffer.to_vec());
        assert!(!contents.contains(&0));
        assert_eq!(contents, (1..=capacity).collect::<Vec<_>>());
    }

    #[test]
    fn test_never_exceeds_capacity() {
        let buffer = ExperienceBuffer::new(7);
        for i in 0..50 {
            buffer.append(tagged(i));
            assert!(buffer.len() <= 7);
        }
        assert_eq!(tags(&buffer.to_vec()), (43..50).collect::<Vec<_>>());
    }

    #[test]
    fn test_sample_requires_full_batch() {
        let buffer = ExperienceBuffer::new(100);
        for i in 0..31 {
            buffer.append(tagged(i));
        }
        assert!(buffer.sample(32).is_none());

        buffer.append(tagged(31));
        assert_eq!(buffer.sample(32).map(|b| b.len()), Some(32));
    }

    #[test]
    fn test_sample_without_replacement() {
        let buffer = ExperienceBuffer::new(64);
        for i in 0..40 {
            buffer.append(tagged(i));
        }

        for _ in 0..20 {
            let batch = buffer.sample(40).unwrap();
            let unique: HashSet<usize> = tags(&batch).into_iter().collect();
            assert_eq!(unique.len(), 40);
        }
    }

    #[test]
    fn test_sample_zero_is_none() {
        let buffer = ExperienceBuffer::new(4);
        buffer.append(tagged(0));
        assert!(buffer.sample(0).is_none());
    }

    #[test]
    fn test_with_transitions_keeps_newest() {
        let buffer = ExperienceBuffer::with_transitions(3, (0..5).map(tagged).collect());
        assert_eq!(tags(&buffer.to_vec()), vec![2, 3, 4]);
    }

    #[test]
    fn test_clear() {
        let buffer = experience_buffer(8);
        buffer.extend((0..5).map(tagged).collect());
        buffer.clear();
        assert!(buffer.is_empty());
        buffer.append(tagged(9));
        assert_eq!(tags(&buffer.to_vec()), vec![9]);
    }
}
