//! Periodic persistence of the serving policy and the experience buffer.
//!
//! Saves once immediately, then once per interval. The policy snapshot is
//! cloned under the store lock and written after the lock is released.

use std::io;
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::Duration;

use tracing::{debug, error, info, warn};

use crate::buffers::SharedExperienceBuffer;
use crate::checkpoint::{CheckpointError, Checkpointer};
use crate::core::policy_store::SharedPolicyStore;
use crate::error::panic_message;
use crate::learner::sleep_unless_shutdown;
use crate::metrics::SharedServerMetrics;
use crate::policy::PolicyFunction;

pub struct Autosaver<S> {
    store: SharedPolicyStore<S>,
    buffer: SharedExperienceBuffer,
    checkpointer: Checkpointer,
    interval: Duration,
    metrics: SharedServerMetrics,
}

impl<S: PolicyFunction> Autosaver<S> {
    pub fn new(
        store: SharedPolicyStore<S>,
        buffer: SharedExperienceBuffer,
        checkpointer: Checkpointer,
        interval: Duration,
        metrics: SharedServerMetrics,
    ) -> Self {
        Self {
            store,
            buffer,
            checkpointer,
            interval,
            metrics,
        }
    }

    /// Persist the serving snapshot.
    pub fn save_policy(&self) -> Result<(), CheckpointError> {
        let snapshot = self.store.snapshot();
        self.checkpointer.save_policy(&snapshot)
    }

    /// Persist the experience buffer.
    pub fn save_buffer(&self) -> Result<(), CheckpointError> {
        self.checkpointer.save_buffer(&self.buffer.to_vec())
    }

    /// Save both files, logging failures. Returns true if both succeeded.
    pub fn save_all(&self) -> bool {
        let policy = self.save_policy();
        if let Err(e) = &policy {
            warn!(error = %e, path = %self.checkpointer.policy_path().display(), "policy save failed");
        }
        let buffer = self.save_buffer();
        if let Err(e) = &buffer {
            warn!(error = %e, path = %self.checkpointer.buffer_path().display(), "buffer save failed");
        }

        let ok = policy.is_ok() && buffer.is_ok();
        if ok {
            self.metrics.record_save();
            debug!(
                version = self.store.serving_version(),
                transitions = self.buffer.len(),
                "autosave complete"
            );
        }
        ok
    }

    /// Spawn the autosave loop on a named thread.
    pub fn spawn(self, shutdown: Arc<AtomicBool>) -> io::Result<AutosaveHandle> {
        let thread_shutdown = Arc::clone(&shutdown);
        let thread = std::thread::Builder::new()
            .name("policy-autosave".to_string())
            .spawn(move || {
                let shutdown = thread_shutdown;
                info!(interval_secs = self.interval.as_secs(), "autosave started");

                while !shutdown.load(Ordering::Relaxed) {
                    if let Err(payload) = panic::catch_unwind(AssertUnwindSafe(|| self.save_all())) {
                        error!(panic = %panic_message(payload.as_ref()), "autosave panicked");
                    }
                    sleep_unless_shutdown(self.interval, &shutdown);
                }

                info!("autosave stopped");
            })?;

        Ok(AutosaveHandle { thread, shutdown })
    }
}

/// Handle to a spawned autosave thread.
pub struct AutosaveHandle {
    thread: JoinHandle<()>,
    shutdown: Arc<AtomicBool>,
}

impl AutosaveHandle {
    /// Set the shutdown flag the loop was spawned with.
    pub fn stop(&self) {
        self.shutdown.store(true, Ordering::Relaxed);
    }

    pub fn is_running(&self) -> bool {
        !self.thread.is_finished()
    }

    pub fn join(self) -> std::thread::Result<()> {
        self.thread.join()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::buffers::experience_buffer;
    use crate::checkpoint::CheckpointerConfig;
    use crate::core::policy_store::policy_store;
    use crate::core::transition::Transition;
    use crate::metrics::server_metrics;
    use crate::policy::PolicyError;
    use std::path::Path;
    use std::time::Instant;
    use tempfile::tempdir;

    /// Writes its marker byte as the whole policy file.
    #[derive(Clone, Debug)]
    struct MarkerPolicy(u8);

    impl PolicyFunction for MarkerPolicy {
        fn evaluate(&self, state: &[f32]) -> Result<Vec<f32>, PolicyError> {
            Ok(vec![0.0; state.len()])
        }

        fn persist(&self, path: &Path) -> Result<(), PolicyError> {
            std::fs::write(path, [self.0]).map_err(|e| PolicyError::Recorder(e.to_string()))
        }
    }

    fn autosaver(dir: &Path, interval: Duration) -> Autosaver<MarkerPolicy> {
        let buffer = experience_buffer(16);
        buffer.append(Transition::new(vec![1.0], vec![1], 2.0, vec![3.0]));
        Autosaver::new(
            policy_store(MarkerPolicy(7)),
            buffer,
            Checkpointer::new(CheckpointerConfig::new(
                dir.join("policy"),
                dir.join("experience.bincode"),
            )),
            interval,
            server_metrics(),
        )
    }

    #[test]
    fn test_save_all_writes_both_files() {
        let dir = tempdir().unwrap();
        let saver = autosaver(dir.path(), Duration::from_secs(60));

        assert!(saver.save_all());
        assert_eq!(std::fs::read(dir.path().join("policy.bin")).unwrap(), vec![7]);

        let restored = saver.checkpointer.load_buffer().unwrap().unwrap();
        assert_eq!(restored.len(), 1);
        assert_eq!(restored[0].reward, 2.0);
        assert_eq!(saver.metrics.snapshot().saves, 1);
    }

    #[test]
    fn test_saves_swapped_policy_not_pending() {
        let dir = tempdir().unwrap();
        let saver = autosaver(dir.path(), Duration::from_secs(60));

        saver.store.publish(MarkerPolicy(9));
        saver.save_policy().unwrap();
        assert_eq!(std::fs::read(dir.path().join("policy.bin")).unwrap(), vec![7]);

        saver.store.maybe_update();
        saver.save_policy().unwrap();
        assert_eq!(std::fs::read(dir.path().join("policy.bin")).unwrap(), vec![9]);
    }

    #[test]
    fn test_failed_save_is_not_fatal() {
        let dir = tempdir().unwrap();
        // A regular file where the parent directory should be
        let blocker = dir.path().join("blocker");
        std::fs::write(&blocker, b"x").unwrap();
        let saver = autosaver(&blocker, Duration::from_secs(60));

        assert!(!saver.save_all());
        assert_eq!(saver.metrics.snapshot().saves, 0);
    }

    #[test]
    fn test_spawned_loop_saves_immediately_and_stops() {
        let dir = tempdir().unwrap();
        let saver = autosaver(dir.path(), Duration::from_secs(3600));
        let metrics = Arc::clone(&saver.metrics);
        let shutdown = Arc::new(AtomicBool::new(false));

        let handle = saver.spawn(Arc::clone(&shutdown)).unwrap();
        let deadline = Instant::now() + Duration::from_secs(5);
        while metrics.snapshot().saves == 0 && Instant::now() < deadline {
            std::thread::sleep(Duration::from_millis(10));
        }
        assert_eq!(metrics.snapshot().saves, 1);
        assert!(dir.path().join("policy.bin").exists());

        handle.stop();
        handle.join().unwrap();
        assert!(shutdown.load(Ordering::Relaxed));
    }
}
