//! Periodic progress reporting helpers.

use std::time::{Duration, Instant};

/// Fires once per `interval`.
#[derive(Debug)]
pub struct ProgressReporter {
    interval: Duration,
    last: Instant,
}

impl ProgressReporter {
    pub fn new(interval: Duration) -> Self {
        Self {
            interval,
            last: Instant::now(),
        }
    }

    /// True when at least `interval` has passed since the last report.
    ///
    /// Resets the window when it returns true.
    pub fn due(&mut self) -> bool {
        if self.last.elapsed() >= self.interval {
            self.last = Instant::now();
            true
        } else {
            false
        }
    }
}

/// Average loop latency over a reporting window.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LoopStats {
    pub loops: usize,
    pub avg_ms: f64,
}

/// Accumulates per-iteration durations of the serving loop.
#[derive(Debug, Default)]
pub struct LoopTimer {
    total: Duration,
    loops: usize,
}

impl LoopTimer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&mut self, elapsed: Duration) {
        self.total += elapsed;
        self.loops += 1;
    }

    /// Stats for the window so far, then reset. `None` if nothing was recorded.
    pub fn take(&mut self) -> Option<LoopStats> {
        if self.loops == 0 {
            return None;
        }
        let stats = LoopStats {
            loops: self.loops,
            avg_ms: self.total.as_secs_f64() * 1000.0 / self.loops as f64,
        };
        *self = Self::default();
        Some(stats)
    }
}
