//! Persistence of the serving policy and the experience buffer.
//!
//! Both files are written to a temporary sibling first and renamed over the
//! previous file, so a crash mid-save leaves the last good file in place.
//!
//! - policy: burn `BinFileRecorder` (full precision)
//! - buffer: bincode-encoded `Vec<Transition>`, oldest first

use burn::tensor::backend::Backend;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use thiserror::Error;

use crate::core::transition::Transition;
use crate::policy::{PolicyError, PolicyFunction, PolicyNet, PolicyNetConfig, PolicySnapshot};

/// Configuration for the checkpointer.
#[derive(Debug, Clone)]
pub struct CheckpointerConfig {
    /// Policy file. The extension is always `.bin`.
    pub policy_path: PathBuf,
    /// Experience buffer file.
    pub buffer_path: PathBuf,
}

impl Default for CheckpointerConfig {
    fn default() -> Self {
        Self {
            policy_path: PathBuf::from("policy.bin"),
            buffer_path: PathBuf::from("replay_buffer.bin"),
        }
    }
}

impl CheckpointerConfig {
    pub fn new(policy_path: impl Into<PathBuf>, buffer_path: impl Into<PathBuf>) -> Self {
        Self {
            policy_path: policy_path.into().with_extension("bin"),
            buffer_path: buffer_path.into(),
        }
    }
}

/// Error type for checkpointing operations.
#[derive(Debug, Error)]
pub enum CheckpointError {
    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    #[error("buffer encoding error: {0}")]
    Encoding(#[from] bincode::Error),

    #[error("policy error: {0}")]
    Policy(#[from] PolicyError),
}

/// Saves and restores the policy and the experience buffer.
#[derive(Debug, Clone)]
pub struct Checkpointer {
    config: CheckpointerConfig,
}

impl Checkpointer {
    pub fn new(config: CheckpointerConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &CheckpointerConfig {
        &self.config
    }

    pub fn policy_path(&self) -> &Path {
        &self.config.policy_path
    }

    pub fn buffer_path(&self) -> &Path {
        &self.config.buffer_path
    }

    /// Write `snapshot`, replacing the previous policy file.
    pub fn save_policy<S: PolicyFunction>(&self, snapshot: &S) -> Result<(), CheckpointError> {
        let path = &self.config.policy_path;
        ensure_parent_dir(path)?;

        // The recorder forces a `.bin` extension, so the temp name keeps it.
        let tmp = path.with_extension("tmp.bin");
        snapshot.persist(&tmp)?;
        fs::rename(&tmp, path)?;
        Ok(())
    }

    /// Load policy parameters for backend `B`.
    ///
    /// Returns `Ok(None)` if no policy file exists.
    pub fn load_policy<B: Backend>(
        &self,
        net_config: &PolicyNetConfig,
        device: &B::Device,
    ) -> Result<Option<PolicyNet<B>>, CheckpointError> {
        let path = &self.config.policy_path;
        if !path.exists() {
            return Ok(None);
        }
        let snapshot = PolicySnapshot::<B>::restore(path, net_config, device)?;
        Ok(Some(snapshot.into_net()))
    }

    /// Write every transition, replacing the previous buffer file.
    pub fn save_buffer(&self, transitions: &[Transition]) -> Result<(), CheckpointError> {
        let path = &self.config.buffer_path;
        ensure_parent_dir(path)?;

        let bytes = bincode::serialize(transitions)?;
        let tmp = temp_sibling(path);
        fs::write(&tmp, bytes)?;
        fs::rename(&tmp, path)?;
        Ok(())
    }

    /// Read the persisted buffer.
    ///
    /// Returns `Ok(None)` if no buffer file exists.
    pub fn load_buffer(&self) -> Result<Option<Vec<Transition>>, CheckpointError> {
        let bytes = match fs::read(&self.config.buffer_path) {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };
        Ok(Some(bincode::deserialize(&bytes)?))
    }
}

fn ensure_parent_dir(path: &Path) -> io::Result<()> {
    match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => fs::create_dir_all(parent),
        _ => Ok(()),
    }
}

fn temp_sibling(path: &Path) -> PathBuf {
    let mut name = path.file_name().unwrap_or_default().to_os_string();
    name.push(".tmp");
    path.with_file_name(name)
}
