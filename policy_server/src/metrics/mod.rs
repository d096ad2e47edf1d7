//! Server metrics and progress reporting.
//!
//! - [`ServerMetrics`]: thread-safe counters shared by every loop
//! - [`ProgressReporter`]: fires once per reporting window
//! - [`LoopTimer`]: average serving-loop latency per window

pub mod reporting;
pub mod server_metrics;

pub use reporting::{LoopStats, LoopTimer, ProgressReporter};
pub use server_metrics::{MetricsSnapshot, ServerMetrics, SharedServerMetrics, server_metrics};
