//! Background training loop.
//!
//! - `BackgroundTrainer`: drains experience, trains, publishes snapshots
//! - `TrainerHandle`: stop/join control for the spawned thread

pub mod trainer;


pub use trainer::{BackgroundTrainer, CycleOutcome, TrainerConfig, TrainerHandle};
pub(crate) use trainer::sleep_unless_shutdown;
