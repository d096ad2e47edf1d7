//! Experience storage between the serving loop and the trainer.
//!
//! - `IngestionQueue`: bounded lock-free handoff, drops when full
//! - `ExperienceBuffer`: bounded replay memory, FIFO eviction, uniform sampling

pub mod ingestion_queue;
pub mod replay_buffer;

pub use ingestion_queue::{IngestionQueue, SharedIngestionQueue, ingestion_queue};
pub use replay_buffer::{ExperienceBuffer, SharedExperienceBuffer, experience_buffer};
