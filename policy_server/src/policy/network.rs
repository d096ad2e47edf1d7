//! Burn implementation of the policy function.
//!
//! Architecture:
//! ```text
//! state [batch, state_dim]
//!   └── fc1: Linear → ReLU      [batch, hidden_dim]
//!       └── fc2: Linear → tanh  [batch, action_dim]   values in (-1, 1)
//! ```
//!
//! Training runs on `Autodiff<NdArray>`; serving snapshots are taken with
//! `AutodiffModule::valid()` and run on plain `NdArray`.

use std::path::Path;

use burn::backend::{Autodiff, NdArray};
use burn::module::AutodiffModule;
use burn::nn::loss::{MseLoss, Reduction};
use burn::nn::{Linear, LinearConfig};
use burn::optim::{AdamConfig, GradientsParams, Optimizer};
use burn::prelude::*;
use burn::record::{BinFileRecorder, FullPrecisionSettings};
use burn::tensor::activation::{relu, tanh};
use burn::tensor::backend::AutodiffBackend;
use burn::tensor::ElementConversion;

use super::{PolicyError, PolicyFunction, TrainablePolicy};
use crate::core::transition::Transition;

// ============================================================================
// Backend Types
// ============================================================================

/// Backend used by the serving loop.
pub type ServingBackend = NdArray<f32>;

/// Backend used by the trainer.
pub type TrainingBackend = Autodiff<ServingBackend>;

// ============================================================================
// Network
// ============================================================================

/// Layer sizes of [`PolicyNet`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PolicyNetConfig {
    pub state_dim: usize,
    pub hidden_dim: usize,
    pub action_dim: usize,
}

impl PolicyNetConfig {
    pub fn new(state_dim: usize, hidden_dim: usize, action_dim: usize) -> Self {
        Self {
            state_dim,
            hidden_dim,
            action_dim,
        }
    }

    /// Initialize a network with fresh parameters.
    pub fn init<B: Backend>(&self, device: &B::Device) -> PolicyNet<B> {
        PolicyNet {
            fc1: LinearConfig::new(self.state_dim, self.hidden_dim).init(device),
            fc2: LinearConfig::new(self.hidden_dim, self.action_dim).init(device),
        }
    }
}

impl Default for PolicyNetConfig {
    fn default() -> Self {
        Self::new(8, 64, 8)
    }
}

/// Two-layer perceptron with a tanh-bounded output.
#[derive(Module, Debug)]
pub struct PolicyNet<B: Backend> {
    fc1: Linear<B>,
    fc2: Linear<B>,
}

impl<B: Backend> PolicyNet<B> {
    /// Forward pass: `[batch, state_dim] -> [batch, action_dim]`.
    pub fn forward(&self, states: Tensor<B, 2>) -> Tensor<B, 2> {
        let x = relu(self.fc1.forward(states));
        tanh(self.fc2.forward(x))
    }

    /// Layer sizes read back from the parameter shapes.
    pub fn layer_sizes(&self) -> PolicyNetConfig {
        let [state_dim, hidden_dim] = self.fc1.weight.val().dims();
        let [_, action_dim] = self.fc2.weight.val().dims();
        PolicyNetConfig::new(state_dim, hidden_dim, action_dim)
    }

    fn device(&self) -> B::Device {
        self.fc1.weight.val().device()
    }
}

// ============================================================================
// Serving Snapshot
// ============================================================================

/// Immutable copy of the network used for action selection.
#[derive(Module, Debug)]
pub struct PolicySnapshot<B: Backend> {
    net: PolicyNet<B>,
    state_dim: usize,
}

impl<B: Backend> PolicySnapshot<B> {
    pub fn new(net: PolicyNet<B>, config: &PolicyNetConfig) -> Self {
        Self {
            net,
            state_dim: config.state_dim,
        }
    }

    /// Load a snapshot previously written by [`PolicyFunction::persist`].
    ///
    /// The recorder does not check tensor shapes, so a file saved with other
    /// layer sizes is rejected here with [`PolicyError::LayerMismatch`].
    pub fn restore(
        path: &Path,
        config: &PolicyNetConfig,
        device: &B::Device,
    ) -> Result<Self, PolicyError> {
        let recorder = BinFileRecorder::<FullPrecisionSettings>::new();
        let net = config
            .init::<B>(device)
            .load_file(path.to_path_buf(), &recorder, device)
            .map_err(|e| PolicyError::Recorder(e.to_string()))?;

        let loaded = net.layer_sizes();
        if loaded != *config {
            return Err(PolicyError::LayerMismatch {
                expected: *config,
                loaded,
            });
        }
        Ok(Self::new(net, config))
    }

    pub fn net(&self) -> &PolicyNet<B> {
        &self.net
    }

    pub fn into_net(self) -> PolicyNet<B> {
        self.net
    }
}

impl<B: Backend> PolicyFunction for PolicySnapshot<B> {
    fn evaluate(&self, state: &[f32]) -> Result<Vec<f32>, PolicyError> {
        if state.len() != self.state_dim {
            return Err(PolicyError::ShapeMismatch {
                expected: self.state_dim,
                actual: state.len(),
            });
        }

        let device = self.net.device();
        let input = Tensor::<B, 1>::from_floats(state, &device).reshape([1, self.state_dim]);
        self.net
            .forward(input)
            .into_data()
            .convert::<f32>()
            .to_vec::<f32>()
            .map_err(|e| PolicyError::Tensor(format!("{:?}", e)))
    }

    fn persist(&self, path: &Path) -> Result<(), PolicyError> {
        let recorder = BinFileRecorder::<FullPrecisionSettings>::new();
        self.net
            .clone()
            .save_file(path.to_path_buf(), &recorder)
            .map_err(|e| PolicyError::Recorder(e.to_string()))
    }
}

// ============================================================================
// Trainer-side Learner
// ============================================================================

/// Hyperparameters of the value update.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct QLearnerSettings {
    /// Discount applied to the bootstrapped next-state value
    pub gamma: f32,
    /// Optimizer step size
    pub learning_rate: f64,
}

impl Default for QLearnerSettings {
    fn default() -> Self {
        Self {
            gamma: 0.99,
            learning_rate: 1e-3,
        }
    }
}

/// Create the Adam optimizer used by [`QLearner`].
pub fn adam_optimizer<B: AutodiffBackend>() -> impl Optimizer<PolicyNet<B>, B> {
    AdamConfig::new().init()
}

/// Live network plus optimizer, owned by the trainer thread.
///
/// Target for a batch:
/// ```text
/// target = action ⊙ reward + gamma * max_a Q(next_state, a)
/// ```
/// The taken action acts as a mask on the broadcast reward rather than
/// indexing a single Q-value.
pub struct QLearner<B: AutodiffBackend, O> {
    model: PolicyNet<B>,
    optimizer: O,
    config: PolicyNetConfig,
    settings: QLearnerSettings,
    loss: MseLoss,
    device: B::Device,
}

impl<B, O> QLearner<B, O>
where
    B: AutodiffBackend,
    O: Optimizer<PolicyNet<B>, B>,
{
    pub fn new(
        model: PolicyNet<B>,
        optimizer: O,
        config: PolicyNetConfig,
        settings: QLearnerSettings,
        device: B::Device,
    ) -> Self {
        Self {
            model,
            optimizer,
            config,
            settings,
            loss: MseLoss::new(),
            device,
        }
    }

    pub fn model(&self) -> &PolicyNet<B> {
        &self.model
    }

    pub fn config(&self) -> &PolicyNetConfig {
        &self.config
    }

    fn batch_tensor(&self, values: Vec<f32>, rows: usize, cols: usize) -> Tensor<B, 2> {
        Tensor::<B, 1>::from_floats(values.as_slice(), &self.device).reshape([rows, cols])
    }
}

impl<B, O> TrainablePolicy for QLearner<B, O>
where
    B: AutodiffBackend,
    O: Optimizer<PolicyNet<B>, B> + Send + 'static,
{
    type Snapshot = PolicySnapshot<B::InnerBackend>;

    fn train_batch(&mut self, batch: &[Transition]) -> Result<f32, PolicyError> {
        let batch_size = batch.len();
        if batch_size == 0 {
            return Err(PolicyError::EmptyBatch);
        }

        let state_dim = self.config.state_dim;
        let action_dim = self.config.action_dim;
        if let Some(bad) = batch.iter().find(|t| !t.has_dims(state_dim, action_dim)) {
            let (expected, actual) = if bad.action.len() != action_dim {
                (action_dim, bad.action.len())
            } else if bad.state.len() != state_dim {
                (state_dim, bad.state.len())
            } else {
                (state_dim, bad.next_state.len())
            };
            return Err(PolicyError::ShapeMismatch { expected, actual });
        }

        // Prepare batch tensors
        let states: Vec<f32> = batch.iter().flat_map(|t| t.state.iter().copied()).collect();
        let next_states: Vec<f32> = batch
            .iter()
            .flat_map(|t| t.next_state.iter().copied())
            .collect();
        let actions: Vec<f32> = batch.iter().flat_map(|t| t.action_mask()).collect();
        let rewards: Vec<f32> = batch.iter().map(|t| t.reward).collect();

        let states = self.batch_tensor(states, batch_size, state_dim);
        let next_states = self.batch_tensor(next_states, batch_size, state_dim);
        let actions = self.batch_tensor(actions, batch_size, action_dim);
        let rewards = self.batch_tensor(rewards, batch_size, 1);

        let q_values = self.model.forward(states);
        let next_q = self.model.forward(next_states).max_dim(1);
        let target = actions * rewards + next_q.mul_scalar(self.settings.gamma);

        let loss = self.loss.forward(q_values, target, Reduction::Mean);
        let loss_value: f32 = loss.clone().into_scalar().elem();
        if !loss_value.is_finite() {
            return Err(PolicyError::NonFiniteLoss(loss_value));
        }

        let grads = GradientsParams::from_grads(loss.backward(), &self.model);
        self.model = self
            .optimizer
            .step(self.settings.learning_rate, self.model.clone(), grads);

        Ok(loss_value)
    }

    fn snapshot(&self) -> Self::Snapshot {
        PolicySnapshot::new(self.model.valid(), &self.config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    type TestBackend = ServingBackend;

    fn probe() -> Vec<f32> {
        vec![0.5, -1.0, 2.0, 0.0, 3.5, -0.25, 1.0, 0.75]
    }

    fn make_learner() -> QLearner<TrainingBackend, impl Optimizer<PolicyNet<TrainingBackend>, TrainingBackend>> {
        let device = Default::default();
        let config = PolicyNetConfig::default();
        QLearner::new(
            config.init::<TrainingBackend>(&device),
            adam_optimizer::<TrainingBackend>(),
            config,
            QLearnerSettings::default(),
            device,
        )
    }

    fn make_batch(n: usize) -> Vec<Transition> {
        (0..n)
            .map(|i| {
                let base = i as f32 * 0.1;
                Transition::new(
                    (0..8).map(|j| base + j as f32).collect(),
                    vec![1, -1, 0, 1, 0, -1, 1, 0],
                    1.0 + base,
                    (0..8).map(|j| base - j as f32).collect(),
                )
            })
            .collect()
    }

    #[test]
    fn test_forward_output_shape_and_range() {
        let device = Default::default();
        let net = PolicyNetConfig::default().init::<TestBackend>(&device);
        let input = Tensor::<TestBackend, 2>::random(
            [5, 8],
            burn::tensor::Distribution::Normal(0.0, 10.0),
            &device,
        );

        let output = net.forward(input);
        assert_eq!(output.dims(), [5, 8]);

        let values = output.into_data().convert::<f32>().to_vec::<f32>().unwrap();
        assert!(values.iter().all(|v| (-1.0..=1.0).contains(v)));
    }

    #[test]
    fn test_snapshot_evaluate() {
        let snapshot = make_learner().snapshot();
        let output = snapshot.evaluate(&probe()).unwrap();
        assert_eq!(output.len(), 8);
        assert!(output.iter().all(|v| v.abs() <= 1.0));
    }

    #[test]
    fn test_evaluate_rejects_wrong_length() {
        let snapshot = make_learner().snapshot();
        let err = snapshot.evaluate(&[1.0, 2.0]).unwrap_err();
        assert!(matches!(
            err,
            PolicyError::ShapeMismatch { expected: 8, actual: 2 }
        ));
    }

    #[test]
    fn test_train_batch_updates_parameters() {
        let mut learner = make_learner();
        let before = learner.snapshot().evaluate(&probe()).unwrap();

        let batch = make_batch(32);
        let loss = learner.train_batch(&batch).unwrap();
        assert!(loss.is_finite());
        assert!(loss >= 0.0);

        let after = learner.snapshot().evaluate(&probe()).unwrap();
        assert_ne!(before, after);
    }

    #[test]
    fn test_snapshot_unaffected_by_later_training() {
        let mut learner = make_learner();
        let snapshot = learner.snapshot();
        let before = snapshot.evaluate(&probe()).unwrap();

        learner.train_batch(&make_batch(32)).unwrap();

        assert_eq!(snapshot.evaluate(&probe()).unwrap(), before);
    }

    #[test]
    fn test_train_batch_rejects_bad_shapes() {
        let mut learner = make_learner();
        assert!(matches!(
            learner.train_batch(&[]),
            Err(PolicyError::EmptyBatch)
        ));

        let mut batch = make_batch(4);
        batch[2].action = vec![1, 0];
        assert!(matches!(
            learner.train_batch(&batch),
            Err(PolicyError::ShapeMismatch { expected: 8, actual: 2 })
        ));
    }

    #[test]
    fn test_non_finite_loss_skips_step() {
        let mut learner = make_learner();
        let before = learner.snapshot().evaluate(&probe()).unwrap();

        let mut batch = make_batch(8);
        batch[0].reward = f32::NAN;
        assert!(matches!(
            learner.train_batch(&batch),
            Err(PolicyError::NonFiniteLoss(_))
        ));

        assert_eq!(learner.snapshot().evaluate(&probe()).unwrap(), before);
    }

    #[test]
    fn test_persist_and_restore_bit_identical() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("policy.bin");

        let mut learner = make_learner();
        learner.train_batch(&make_batch(16)).unwrap();
        let snapshot = learner.snapshot();
        snapshot.persist(&path).unwrap();
        assert!(path.exists());

        let device = Default::default();
        let restored =
            PolicySnapshot::<TestBackend>::restore(&path, &PolicyNetConfig::default(), &device)
                .unwrap();

        let original = snapshot.evaluate(&probe()).unwrap();
        let reloaded = restored.evaluate(&probe()).unwrap();
        assert_eq!(
            original.iter().map(|v| v.to_bits()).collect::<Vec<_>>(),
            reloaded.iter().map(|v| v.to_bits()).collect::<Vec<_>>()
        );
    }

    #[test]
    fn test_restore_missing_file_fails() {
        let dir = tempdir().unwrap();
        let device = Default::default();
        let result = PolicySnapshot::<TestBackend>::restore(
            &dir.path().join("absent.bin"),
            &PolicyNetConfig::default(),
            &device,
        );
        assert!(matches!(result, Err(PolicyError::Recorder(_))));
    }

    #[test]
    fn test_layer_sizes_match_config() {
        let device = Default::default();
        let config = PolicyNetConfig::new(4, 16, 3);
        assert_eq!(config.init::<TestBackend>(&device).layer_sizes(), config);
    }

    #[test]
    fn test_restore_rejects_other_layer_sizes() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("policy.bin");
        let device = Default::default();

        let saved = PolicyNetConfig::new(8, 64, 8);
        PolicySnapshot::new(saved.init::<TestBackend>(&device), &saved)
            .persist(&path)
            .unwrap();

        let result =
            PolicySnapshot::<TestBackend>::restore(&path, &PolicyNetConfig::new(4, 64, 8), &device);
        match result {
            Err(PolicyError::LayerMismatch { expected, loaded }) => {
                assert_eq!(expected, PolicyNetConfig::new(4, 64, 8));
                assert_eq!(loaded, saved);
            }
            other => panic!("expected LayerMismatch, got {:?}", other.map(|_| ())),
        }
    }
}
