//! Process-wide exploration rate for epsilon-greedy selection.
//!
//! The trainer is the only writer (one decay per completed training step);
//! the serving path reads the current value once per decision. The value is
//! stored as `f64` bits in an `AtomicU64` so neither side takes a lock.

use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;

/// Exponentially decaying epsilon with a floor.
///
/// Invariant: `min <= current() <= start`, and `current()` never increases.
#[derive(Debug)]
pub struct ExplorationRate {
    bits: AtomicU64,
    min: f64,
    decay: f64,
    decays: AtomicUsize,
}

impl ExplorationRate {
    /// Create a schedule starting at `start`.
    ///
    /// `min` is clamped to `[0.0, 1.0]` and `start` to `[min, 1.0]`. A NaN
    /// `min` becomes 0.0 and a NaN `start` becomes 1.0.
    pub fn new(start: f64, min: f64, decay: f64) -> Self {
        let min = if min.is_nan() { 0.0 } else { min.clamp(0.0, 1.0) };
        let start = if start.is_nan() { 1.0 } else { start.clamp(min, 1.0) };
        Self {
            bits: AtomicU64::new(start.to_bits()),
            min,
            decay,
            decays: AtomicUsize::new(0),
        }
    }

    /// Current epsilon.
    pub fn current(&self) -> f64 {
        f64::from_bits(self.bits.load(Ordering::Acquire))
    }

    /// Floor value.
    pub fn min(&self) -> f64 {
        self.min
    }

    /// Number of decay steps applied since start.
    pub fn decay_count(&self) -> usize {
        self.decays.load(Ordering::Relaxed)
    }

    /// Apply one decay step: `epsilon = max(min, epsilon * decay)`.
    ///
    /// Returns the new value.
    pub fn decay(&self) -> f64 {
        let min = self.min;
        let decay = self.decay;
        let previous = self
            .bits
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |bits| {
                let next = (f64::from_bits(bits) * decay).max(min);
                Some(next.to_bits())
            })
            .unwrap_or_else(|bits| bits);
        self.decays.fetch_add(1, Ordering::Relaxed);
        (f64::from_bits(previous) * decay).max(min)
    }
}

/// Thread-safe shared exploration rate.
pub type SharedExplorationRate = Arc<ExplorationRate>;

/// Create a new shared exploration rate.
pub fn exploration_rate(start: f64, min: f64, decay: f64) -> SharedExplorationRate {
    Arc::new(ExplorationRate::new(start, min, decay))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_starts_at_start_value() {
        let eps = ExplorationRate::new(1.0, 0.05, 0.9999);
        assert_eq!(eps.current(), 1.0);
        assert_eq!(eps.decay_count(), 0);
    }

    #[test]
    fn test_decay_is_monotonic_and_floored() {
        let eps = ExplorationRate::new(1.0, 0.05, 0.5);
        let mut last = eps.current();
        for _ in 0..20 {
            let next = eps.decay();
            assert!(next <= last);
            assert!(next >= 0.05);
            assert_eq!(next, eps.current());
            last = next;
        }
        assert_eq!(eps.current(), 0.05);

        // Further decay stays at the floor
        assert_eq!(eps.decay(), 0.05);
        assert_eq!(eps.decay_count(), 21);
    }

    #[test]
    fn test_single_decay_step() {
        let eps = ExplorationRate::new(1.0, 0.05, 0.9999);
        let next = eps.decay();
        assert!((next - 0.9999).abs() < 1e-12);
    }

    #[test]
    fn test_start_clamped_into_range() {
        assert_eq!(ExplorationRate::new(2.0, 0.05, 0.9).current(), 1.0);
        assert_eq!(ExplorationRate::new(0.01, 0.05, 0.9).current(), 0.05);
    }

    #[test]
    fn test_out_of_range_floor_is_clamped() {
        let high = ExplorationRate::new(0.5, 1.5, 0.9);
        assert_eq!(high.min(), 1.0);
        assert_eq!(high.current(), 1.0);

        let nan = ExplorationRate::new(0.5, f64::NAN, 0.5);
        assert_eq!(nan.min(), 0.0);
        assert_eq!(nan.decay(), 0.25);

        assert_eq!(ExplorationRate::new(f64::NAN, 0.1, 0.9).current(), 1.0);
    }

    #[test]
    fn test_shared_reads_see_decay() {
        let eps = exploration_rate(1.0, 0.1, 0.5);
        let reader = Arc::clone(&eps);
        eps.decay();
        assert_eq!(reader.current(), 0.5);
    }
}
