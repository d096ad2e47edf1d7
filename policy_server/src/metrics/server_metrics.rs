//! Shared counters for the serving loop, trainer and autosave.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

/// Thread-safe server metrics.
#[derive(Debug, Default)]
pub struct ServerMetrics {
    /// Datagrams received
    requests: AtomicUsize,
    /// Responses sent
    responses: AtomicUsize,
    /// Datagrams discarded as malformed
    malformed: AtomicUsize,
    /// Transitions accepted by the ingestion queue
    offered: AtomicUsize,
    /// Transitions dropped because the ingestion queue was full
    dropped: AtomicUsize,
    /// Completed training steps
    train_steps: AtomicUsize,
    /// Training cycles that failed or panicked
    train_faults: AtomicUsize,
    /// Hot-swaps performed by the serving loop
    swaps: AtomicUsize,
    /// Successful autosaves
    saves: AtomicUsize,
}

/// Point-in-time copy of [`ServerMetrics`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MetricsSnapshot {
    pub requests: usize,
    pub responses: usize,
    pub malformed: usize,
    pub offered: usize,
    pub dropped: usize,
    pub train_steps: usize,
    pub train_faults: usize,
    pub swaps: usize,
    pub saves: usize,
}

impl ServerMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_request(&self) {
        self.requests.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_response(&self) {
        self.responses.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_malformed(&self) {
        self.malformed.fetch_add(1, Ordering::Relaxed);
    }

    /// Record the outcome of an ingestion-queue offer.
    pub fn record_offer(&self, accepted: bool) {
        if accepted {
            self.offered.fetch_add(1, Ordering::Relaxed);
        } else {
            self.dropped.fetch_add(1, Ordering::Relaxed);
        }
    }

    pub fn increment_train_steps(&self) {
        self.train_steps.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_train_fault(&self) {
        self.train_faults.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_swap(&self) {
        self.swaps.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_save(&self) {
        self.saves.fetch_add(1, Ordering::Relaxed);
    }

    pub fn train_steps(&self) -> usize {
        self.train_steps.load(Ordering::Relaxed)
    }

    pub fn dropped(&self) -> usize {
        self.dropped.load(Ordering::Relaxed)
    }

    /// Read every counter.
    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            requests: self.requests.load(Ordering::Relaxed),
            responses: self.responses.load(Ordering::Relaxed),
            malformed: self.malformed.load(Ordering::Relaxed),
            offered: self.offered.load(Ordering::Relaxed),
            dropped: self.dropped.load(Ordering::Relaxed),
            train_steps: self.train_steps.load(Ordering::Relaxed),
            train_faults: self.train_faults.load(Ordering::Relaxed),
            swaps: self.swaps.load(Ordering::Relaxed),
            saves: self.saves.load(Ordering::Relaxed),
        }
    }
}

/// Thread-safe shared server metrics.
pub type SharedServerMetrics = Arc<ServerMetrics>;

/// Create new shared server metrics.
pub fn server_metrics() -> SharedServerMetrics {
    Arc::new(ServerMetrics::new())
}
