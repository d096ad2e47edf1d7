//! Serving-side policy cache with single-slot hot-swap.
//!
//! The trainer owns the live parameters and publishes immutable snapshots;
//! the serving path evaluates the current snapshot and swaps in the pending
//! one at points it chooses.
//!
//! # Design
//!
//! One `Mutex` guards both the serving snapshot and the pending slot, so
//! "evaluate", "publish" and "swap" are each a single critical section:
//!
//! ```text
//! Trainer                      PolicyStore                    Serving loop
//! ┌───────────┐   publish()    ┌────────────────────┐  read()  ┌──────────┐
//! │ live net  │ ─────────────> │ pending: Option<S> │ <─────── │ select   │
//! │ (train)   │                │ current: S         │          │ action   │
//! └───────────┘                └────────────────────┘ ───────> └──────────┘
//!                                         maybe_update(): pending -> current
//! ```
//!
//! Publications overwrite an unconsumed pending snapshot:
//!
//! ```text
//! Memory invariant: at most 2 snapshots held (current + 1 pending)
//! ```

use parking_lot::Mutex;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;

struct Slots<S> {
    current: S,
    pending: Option<S>,
}

/// Policy cache shared between the trainer, the serving loop and autosave.
///
/// # Thread Safety
///
/// Uses `Mutex<..>` which requires `S: Send` (NOT `S: Sync`), matching burn
/// modules which are `Send` but not `Sync`.
pub struct PolicyStore<S> {
    slots: Mutex<Slots<S>>,
    /// Version of the most recent publication
    version: AtomicU64,
    /// Version currently used for serving
    serving_version: AtomicU64,
    /// Counter for total snapshots published
    published_count: AtomicUsize,
    /// Counter for snapshots overwritten before being swapped in
    dropped_count: AtomicUsize,
    /// Counter for completed hot-swaps
    swapped_count: AtomicUsize,
}

impl<S> PolicyStore<S> {
    /// Create a store serving `initial` with nothing pending.
    pub fn new(initial: S) -> Self {
        Self {
            slots: Mutex::new(Slots {
                current: initial,
                pending: None,
            }),
            version: AtomicU64::new(0),
            serving_version: AtomicU64::new(0),
            published_count: AtomicUsize::new(0),
            dropped_count: AtomicUsize::new(0),
            swapped_count: AtomicUsize::new(0),
        }
    }

    /// Version of the most recently published snapshot.
    pub fn version(&self) -> u64 {
        self.version.load(Ordering::Acquire)
    }

    /// Version of the snapshot currently being served.
    pub fn serving_version(&self) -> u64 {
        self.serving_version.load(Ordering::Acquire)
    }

    /// Get debug statistics: (published, dropped, swapped)
    pub fn stats(&self) -> (usize, usize, usize) {
        (
            self.published_count.load(Ordering::Relaxed),
            self.dropped_count.load(Ordering::Relaxed),
            self.swapped_count.load(Ordering::Relaxed),
        )
    }

    /// Check if a published snapshot is waiting to be swapped in.
    pub fn has_pending(&self) -> bool {
        self.slots.lock().pending.is_some()
    }

    /// Publish a new snapshot, overwriting any pending one.
    ///
    /// Called by the trainer after a training step.
    /// Returns true if a pending snapshot was overwritten (dropped).
    pub fn publish(&self, snapshot: S) -> bool {
        let mut slots = self.slots.lock();
        let was_pending = slots.pending.is_some();
        if was_pending {
            self.dropped_count.fetch_add(1, Ordering::Relaxed);
        }
        slots.pending = Some(snapshot);
        self.version.fetch_add(1, Ordering::Release);
        self.published_count.fetch_add(1, Ordering::Relaxed);
        was_pending
    }

    /// Swap the pending snapshot in, if there is one.
    ///
    /// Called by the serving path between evaluations.
    /// Returns true if a swap happened.
    pub fn maybe_update(&self) -> bool {
        let mut slots = self.slots.lock();
        match slots.pending.take() {
            Some(snapshot) => {
                slots.current = snapshot;
                self.serving_version
                    .store(self.version.load(Ordering::Acquire), Ordering::Release);
                self.swapped_count.fetch_add(1, Ordering::Relaxed);
                true
            }
            None => false,
        }
    }

    /// Run `f` against the serving snapshot while holding the lock.
    ///
    /// Keep `f` to a single evaluation; the trainer's publish waits on it.
    pub fn read<R>(&self, f: impl FnOnce(&S) -> R) -> R {
        let slots = self.slots.lock();
        f(&slots.current)
    }
}

impl<S: Clone> PolicyStore<S> {
    /// Clone the serving snapshot.
    pub fn snapshot(&self) -> S {
        self.slots.lock().current.clone()
    }
}

/// Thread-safe shared policy store.
pub type SharedPolicyStore<S> = Arc<PolicyStore<S>>;

/// Create a new shared policy store.
pub fn policy_store<S>(initial: S) -> SharedPolicyStore<S> {
    Arc::new(PolicyStore::new(initial))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicBool;
    use std::thread;

    #[derive(Clone, Debug, PartialEq)]
    struct MockSnapshot {
        params: Vec<u64>,
    }

    impl MockSnapshot {
        fn uniform(value: u64, len: usize) -> Self {
            Self {
                params: vec![value; len],
            }
        }
    }

    #[test]
    fn test_publish_then_swap() {
        let store = PolicyStore::new(MockSnapshot::uniform(0, 4));

        // Nothing pending initially
        assert!(!store.has_pending());
        assert!(!store.maybe_update());
        assert_eq!(store.version(), 0);

        // Publish does not change what is served
        store.publish(MockSnapshot::uniform(1, 4));
        assert!(store.has_pending());
        assert_eq!(store.read(|s| s.params[0]), 0);
        assert_eq!(store.version(), 1);
        assert_eq!(store.serving_version(), 0);

        // Swap at a safe point
        assert!(store.maybe_update());
        assert!(!store.has_pending());
        assert_eq!(store.read(|s| s.params[0]), 1);
        assert_eq!(store.serving_version(), 1);

        // Second check is a no-op
        assert!(!store.maybe_update());
    }

    #[test]
    fn test_overwrite_pending() {
        let store = PolicyStore::new(MockSnapshot::uniform(0, 2));

        assert!(!store.publish(MockSnapshot::uniform(1, 2)));
        assert!(store.publish(MockSnapshot::uniform(2, 2)));
        assert!(store.publish(MockSnapshot::uniform(3, 2)));

        assert!(store.maybe_update());
        assert_eq!(store.snapshot(), MockSnapshot::uniform(3, 2));

        let (published, dropped, swapped) = store.stats();
        assert_eq!(published, 3);
        assert_eq!(dropped, 2);
        assert_eq!(swapped, 1);
    }

    #[test]
    fn test_snapshot_is_independent_copy() {
        let store = PolicyStore::new(MockSnapshot::uniform(7, 3));
        let copy = store.snapshot();

        store.publish(MockSnapshot::uniform(8, 3));
        store.maybe_update();

        assert_eq!(copy, MockSnapshot::uniform(7, 3));
        assert_eq!(store.snapshot(), MockSnapshot::uniform(8, 3));
    }

    #[test]
    fn test_hot_swap_never_exposes_mixed_parameters() {
        const LEN: usize = 256;
        let store = policy_store(MockSnapshot::uniform(0, LEN));
        let done = Arc::new(AtomicBool::new(false));

        let publisher = {
            let store = Arc::clone(&store);
            let done = Arc::clone(&done);
            thread::spawn(move || {
                for v in 1..=2_000u64 {
                    store.publish(MockSnapshot::uniform(v, LEN));
                }
                done.store(true, Ordering::Release);
            })
        };

        let mut observed_max = 0;
        let mut evaluations = 0usize;
        while !done.load(Ordering::Acquire) || store.has_pending() {
            store.maybe_update();
            let (first, consistent) = store.read(|s| {
                let first = s.params[0];
                (first, s.params.iter().all(|&p| p == first))
            });
            assert!(consistent, "observed mixed parameter set at value {}", first);
            assert!(first >= observed_max, "served version went backwards");
            observed_max = first;
            evaluations += 1;
        }

        publisher.join().unwrap();
        assert!(evaluations > 0);
        assert_eq!(store.snapshot(), MockSnapshot::uniform(2_000, LEN));
    }
}
