//! # Policy Server: online decisions with background learning
//!
//! A UDP decision server that answers every observation with an action right
//! away and keeps improving its policy from the experience it collects,
//! without training ever stalling the response path.
//!
//! ## Architecture Overview
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────┐
//! │  Serving thread (sequential, one datagram at a time)                │
//! │  ┌──────────────┐   ┌────────────────┐   ┌──────────────────┐       │
//! │  │ UDP recv     │──>│ SessionTracker │──>│ ActionSelector   │──> reply
//! │  └──────────────┘   └───────┬────────┘   │ (epsilon-greedy) │       │
//! │                             │ transition └────────┬─────────┘       │
//! │                             ▼                     │ read()          │
//! │                    ┌────────────────┐    ┌────────┴─────────┐       │
//! │                    │ IngestionQueue │    │   PolicyStore    │       │
//! │                    │ (lock-free,    │    │ current + pending│       │
//! │                    │  drop on full) │    └────────▲─────────┘       │
//! │                    └───────┬────────┘             │ publish()       │
//! ├────────────────────────────┼──────────────────────┼─────────────────┤
//! │  Trainer thread            ▼                      │                 │
//! │                    ┌────────────────┐    ┌────────┴─────────┐       │
//! │                    │ExperienceBuffer│──> │ QLearner (burn)  │       │
//! │                    │ (FIFO ring)    │    │ Adam + MSE       │       │
//! │                    └────────────────┘    └──────────────────┘       │
//! ├─────────────────────────────────────────────────────────────────────┤
//! │  Autosave thread: PolicyStore snapshot + buffer ──> disk            │
//! └─────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Usage
//!
//! ```rust,ignore
//! use policy_server::{ServerConfig, server};
//! use std::sync::{Arc, atomic::AtomicBool};
//!
//! let config = ServerConfig::from_toml_file("server.toml")?.with_port(18233);
//! server::run(config, Arc::new(AtomicBool::new(false)))?;
//! ```

pub mod buffers;
pub mod checkpoint;
pub mod config;
pub mod core;
pub mod error;
pub mod learner;
pub mod metrics;
pub mod policy;
pub mod server;

// Re-export commonly used types
pub use buffers::{ExperienceBuffer, IngestionQueue};
pub use checkpoint::{CheckpointError, Checkpointer, CheckpointerConfig};
pub use config::{ConfigError, ServerConfig};
pub use crate::core::{ExplorationRate, PolicyStore, SessionTracker, Transition};
pub use error::ServerError;
pub use learner::{BackgroundTrainer, CycleOutcome, TrainerConfig, TrainerHandle};
pub use metrics::ServerMetrics;
pub use policy::{
    ActionSelector, Decision, PolicyError, PolicyFunction, PolicySnapshot, QLearner,
    TrainablePolicy,
};
pub use server::{DecisionServer, DecisionServerConfig};
