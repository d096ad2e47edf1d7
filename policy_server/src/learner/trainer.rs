//! Background trainer.
//!
//! Runs on its own thread, never synchronized to request arrival:
//!
//! ```text
//! loop {
//!     drain IngestionQueue ──> ExperienceBuffer
//!     buffer < batch_size?  ──> idle wait, restart
//!     sample batch ──> train_batch (one gradient step on live params)
//!     publish snapshot ──> PolicyStore (pending slot)
//!     decay epsilon (once per completed step)
//!     sleep train_interval
//! }
//! ```
//!
//! # Fault Handling
//!
//! Each cycle runs under `catch_unwind`. Errors and panics are logged and
//! counted and the loop carries on with the next cycle. A failed cycle
//! publishes nothing and does not decay epsilon.

use std::io;
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::Duration;

use tracing::{debug, error, info, warn};

use crate::buffers::{SharedExperienceBuffer, SharedIngestionQueue};
use crate::core::exploration::SharedExplorationRate;
use crate::core::policy_store::SharedPolicyStore;
use crate::error::panic_message;
use crate::metrics::{ProgressReporter, SharedServerMetrics};
use crate::policy::{PolicyError, TrainablePolicy};

/// Trainer scheduling configuration.
#[derive(Debug, Clone)]
pub struct TrainerConfig {
    /// Transitions per gradient step
    pub batch_size: usize,
    /// Sleep after every non-idle cycle
    pub train_interval: Duration,
    /// Sleep when the buffer holds fewer than `batch_size` transitions
    pub idle_wait: Duration,
    /// Progress report period
    pub report_interval: Duration,
}

impl Default for TrainerConfig {
    fn default() -> Self {
        Self {
            batch_size: 32,
            train_interval: Duration::from_millis(100),
            idle_wait: Duration::from_secs(1),
            report_interval: Duration::from_secs(10),
        }
    }
}

impl TrainerConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set batch size.
    ///
    /// # Panics
    ///
    /// Panics if `batch_size` is 0.
    pub fn with_batch_size(mut self, batch_size: usize) -> Self {
        assert!(batch_size > 0, "batch_size must be > 0");
        self.batch_size = batch_size;
        self
    }

    pub fn with_train_interval(mut self, interval: Duration) -> Self {
        self.train_interval = interval;
        self
    }

    pub fn with_idle_wait(mut self, wait: Duration) -> Self {
        self.idle_wait = wait;
        self
    }

    pub fn with_report_interval(mut self, interval: Duration) -> Self {
        self.report_interval = interval;
        self
    }

    pub fn validate(&self) -> Result<(), &'static str> {
        if self.batch_size == 0 {
            return Err("batch_size must be > 0");
        }
        Ok(())
    }
}

/// Result of one trainer cycle.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum CycleOutcome {
    /// Not enough experience; nothing trained.
    Idle { buffered: usize },
    /// One gradient step completed and a snapshot was published.
    Trained { step: usize, loss: f32, epsilon: f64 },
}

/// Trainer owning the live policy parameters.
pub struct BackgroundTrainer<P: TrainablePolicy> {
    config: TrainerConfig,
    policy: P,
    queue: SharedIngestionQueue,
    buffer: SharedExperienceBuffer,
    store: SharedPolicyStore<P::Snapshot>,
    exploration: SharedExplorationRate,
    metrics: SharedServerMetrics,
    steps: usize,
    last_loss: Option<f32>,
}

impl<P: TrainablePolicy> BackgroundTrainer<P> {
    pub fn new(
        config: TrainerConfig,
        policy: P,
        queue: SharedIngestionQueue,
        buffer: SharedExperienceBuffer,
        store: SharedPolicyStore<P::Snapshot>,
        exploration: SharedExplorationRate,
        metrics: SharedServerMetrics,
    ) -> Self {
        Self {
            config,
            policy,
            queue,
            buffer,
            store,
            exploration,
            metrics,
            steps: 0,
            last_loss: None,
        }
    }

    /// Completed training steps.
    pub fn steps(&self) -> usize {
        self.steps
    }

    pub fn last_loss(&self) -> Option<f32> {
        self.last_loss
    }

    pub fn policy(&self) -> &P {
        &self.policy
    }

    /// Run a single cycle without sleeping.
    pub fn run_cycle(&mut self) -> Result<CycleOutcome, PolicyError> {
        // Drain fully before anything else
        let drained = self.queue.drain();
        if !drained.is_empty() {
            debug!(count = drained.len(), "drained ingestion queue");
            self.buffer.extend(drained);
        }

        let batch = match self.buffer.sample(self.config.batch_size) {
            Some(batch) => batch,
            None => {
                return Ok(CycleOutcome::Idle {
                    buffered: self.buffer.len(),
                });
            }
        };

        let loss = self.policy.train_batch(&batch)?;

        self.store.publish(self.policy.snapshot());
        let epsilon = self.exploration.decay();

        self.steps += 1;
        self.last_loss = Some(loss);
        self.metrics.increment_train_steps();

        Ok(CycleOutcome::Trained {
            step: self.steps,
            loss,
            epsilon,
        })
    }

    /// Emit a progress line.
    pub fn report(&self) {
        info!(
            steps = self.steps,
            loss = self.last_loss.unwrap_or(f32::NAN),
            epsilon = self.exploration.current(),
            buffered = self.buffer.len(),
            dropped = self.queue.dropped_count(),
            "model update"
        );
    }

    /// Spawn the trainer loop on a named thread.
    ///
    /// The loop exits once `shutdown` is set.
    pub fn spawn(mut self, shutdown: Arc<AtomicBool>) -> io::Result<TrainerHandle> {
        if let Err(e) = self.config.validate() {
            return Err(io::Error::new(io::ErrorKind::InvalidInput, e));
        }

        let thread_shutdown = Arc::clone(&shutdown);
        let thread = std::thread::Builder::new()
            .name("policy-trainer".to_string())
            .spawn(move || {
                let shutdown = thread_shutdown;
                let mut reporter = ProgressReporter::new(self.config.report_interval);
                info!(batch_size = self.config.batch_size, "trainer started");

                while !shutdown.load(Ordering::Relaxed) {
                    let pause = match panic::catch_unwind(AssertUnwindSafe(|| self.run_cycle())) {
                        Ok(Ok(CycleOutcome::Idle { .. })) => self.config.idle_wait,
                        Ok(Ok(CycleOutcome::Trained { .. })) => self.config.train_interval,
                        Ok(Err(e)) => {
                            warn!(error = %e, "training cycle failed");
                            self.metrics.record_train_fault();
                            self.config.train_interval
                        }
                        Err(payload) => {
                            error!(panic = %panic_message(payload.as_ref()), "training cycle panicked");
                            self.metrics.record_train_fault();
                            self.config.train_interval
                        }
                    };

                    if reporter.due() {
                        self.report();
                    }

                    sleep_unless_shutdown(pause, &shutdown);
                }

                info!(steps = self.steps, "trainer stopped");
            })?;

        Ok(TrainerHandle { thread, shutdown })
    }
}

/// Sleep for `duration`, waking early once `shutdown` is set.
pub(crate) fn sleep_unless_shutdown(duration: Duration, shutdown: &AtomicBool) {
    const SLICE: Duration = Duration::from_millis(20);

    let deadline = std::time::Instant::now() + duration;
    loop {
        if shutdown.load(Ordering::Relaxed) {
            return;
        }
        let now = std::time::Instant::now();
        if now >= deadline {
            return;
        }
        std::thread::sleep(SLICE.min(deadline - now));
    }
}

/// Handle to a spawned trainer thread.
pub struct TrainerHandle {
    thread: JoinHandle<()>,
    shutdown: Arc<AtomicBool>,
}

impl TrainerHandle {
    /// Set the shutdown flag the loop was spawned with.
    pub fn stop(&self) {
        self.shutdown.store(true, Ordering::Relaxed);
    }

    pub fn is_running(&self) -> bool {
        !self.thread.is_finished()
    }

    /// Wait for the trainer thread to finish.
    pub fn join(self) -> std::thread::Result<()> {
        self.thread.join()
    }

    /// Signal stop and wait for the thread.
    pub fn stop_and_wait(self) -> std::thread::Result<()> {
        self.stop();
        self.thread.join()
    }
}
