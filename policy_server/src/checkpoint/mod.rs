//! Policy and experience persistence.
//!
//! ## Example
//!
//! ```rust,ignore
//! use policy_server::checkpoint::{Checkpointer, CheckpointerConfig};
//!
//! let checkpointer = Checkpointer::new(CheckpointerConfig::new("policy.bin", "replay_buffer.bin"));
//!
//! // Autosave tick:
//! checkpointer.save_policy(&store.snapshot())?;
//! checkpointer.save_buffer(&buffer.to_vec())?;
//!
//! // Startup:
//! let net = checkpointer.load_policy::<TrainingBackend>(&net_config, &device)?;
//! let transitions = checkpointer.load_buffer()?.unwrap_or_default();
//! ```

pub mod checkpointer;

pub use checkpointer::{CheckpointError, Checkpointer, CheckpointerConfig};
