//! Policy function, its burn implementation, and action selection.
//!
//! Two seams separate the serving path from the learning path:
//!
//! - [`PolicyFunction`]: an immutable snapshot the serving loop evaluates
//! - [`TrainablePolicy`]: the trainer's live parameters, updated by gradient steps
//!
//! The trainer turns its live parameters into a snapshot and publishes it
//! through the [`PolicyStore`](crate::core::PolicyStore).

pub mod network;
pub mod selector;

use std::path::Path;

use thiserror::Error;

use crate::core::transition::Transition;

pub use network::{
    PolicyNet, PolicyNetConfig, PolicySnapshot, QLearner, QLearnerSettings, ServingBackend,
    TrainingBackend, adam_optimizer,
};
pub use selector::{ActionSelector, DISCRETIZE_THRESHOLD, Decision, discretize};

/// Errors raised while evaluating or training a policy.
#[derive(Debug, Error)]
pub enum PolicyError {
    /// Input or output vector has the wrong length.
    #[error("shape mismatch: expected {expected} values, got {actual}")]
    ShapeMismatch { expected: usize, actual: usize },
    /// Training batch was empty.
    #[error("cannot train on an empty batch")]
    EmptyBatch,
    /// Loss evaluated to NaN or infinity; the gradient step was skipped.
    #[error("non-finite loss: {0}")]
    NonFiniteLoss(f32),
    /// Tensor data could not be converted.
    #[error("tensor data error: {0}")]
    Tensor(String),
    /// Burn recorder failed to save or load parameters.
    #[error("recorder error: {0}")]
    Recorder(String),
    /// Loaded parameters were saved for different layer sizes.
    #[error("layer size mismatch: expected {expected:?}, loaded {loaded:?}")]
    LayerMismatch {
        expected: PolicyNetConfig,
        loaded: PolicyNetConfig,
    },
}

/// Serving-side view of a policy: a fixed snapshot of parameters.
///
/// Output values are expected in `(-1, 1)`.
pub trait PolicyFunction: Clone + Send + 'static {
    /// Evaluate the policy on one state vector.
    fn evaluate(&self, state: &[f32]) -> Result<Vec<f32>, PolicyError>;

    /// Write the parameters to `path`, overwriting any existing file.
    fn persist(&self, path: &Path) -> Result<(), PolicyError>;
}

/// Trainer-side policy owning mutable parameters.
pub trait TrainablePolicy: Send + 'static {
    /// Snapshot type handed to the serving path.
    type Snapshot: PolicyFunction;

    /// Perform one gradient step on `batch`. Returns the loss before the step.
    fn train_batch(&mut self, batch: &[Transition]) -> Result<f32, PolicyError>;

    /// Immutable copy of the current parameters.
    fn snapshot(&self) -> Self::Snapshot;
}
