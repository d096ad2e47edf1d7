//! Epsilon-greedy action selection over the serving policy.
//!
//! One weighted coin flip per decision picks a [`Decision`]:
//! - `Explore`: every coordinate drawn independently from `{-1, 0, 1}`
//! - `Exploit`: evaluate the serving snapshot and threshold each coordinate

use crate::core::exploration::SharedExplorationRate;
use crate::core::policy_store::SharedPolicyStore;
use crate::core::transition::{ACTION_SYMBOLS, ActionVector};

use super::{PolicyError, PolicyFunction};

/// Policy outputs strictly beyond this magnitude map to ±1.
pub const DISCRETIZE_THRESHOLD: f32 = 0.33;

/// Map one continuous output to a ternary symbol.
///
/// `v < -0.33 → -1`, `v > 0.33 → 1`, anything else (including exactly ±0.33
/// and NaN) → 0.
#[inline]
pub fn discretize(value: f32) -> i8 {
    if value < -DISCRETIZE_THRESHOLD {
        -1
    } else if value > DISCRETIZE_THRESHOLD {
        1
    } else {
        0
    }
}

/// Which branch of epsilon-greedy a decision took.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Decision {
    Explore,
    Exploit,
}

/// Epsilon-greedy selector bound to a policy store and exploration rate.
pub struct ActionSelector<S> {
    store: SharedPolicyStore<S>,
    exploration: SharedExplorationRate,
    action_dim: usize,
    rng: fastrand::Rng,
}

impl<S: PolicyFunction> ActionSelector<S> {
    pub fn new(
        store: SharedPolicyStore<S>,
        exploration: SharedExplorationRate,
        action_dim: usize,
    ) -> Self {
        Self {
            store,
            exploration,
            action_dim,
            rng: fastrand::Rng::new(),
        }
    }

    /// Use a seeded generator (deterministic coin flips and exploration).
    pub fn with_seed(mut self, seed: u64) -> Self {
        self.rng = fastrand::Rng::with_seed(seed);
        self
    }

    pub fn store(&self) -> &SharedPolicyStore<S> {
        &self.store
    }

    /// Flip the weighted coin for one decision.
    pub fn decide(&mut self) -> Decision {
        let epsilon = self.exploration.current();
        if self.rng.f64() < epsilon {
            Decision::Explore
        } else {
            Decision::Exploit
        }
    }

    /// Produce an action for `state`.
    pub fn select(&mut self, state: &[f32]) -> Result<ActionVector, PolicyError> {
        match self.decide() {
            Decision::Explore => Ok(self.explore()),
            Decision::Exploit => self.exploit(state),
        }
    }

    /// Uniform random action.
    pub fn explore(&mut self) -> ActionVector {
        (0..self.action_dim)
            .map(|_| ACTION_SYMBOLS[self.rng.usize(..ACTION_SYMBOLS.len())])
            .collect()
    }

    /// Thresholded policy output, evaluated under the store lock.
    pub fn exploit(&self, state: &[f32]) -> Result<ActionVector, PolicyError> {
        let output = self.store.read(|policy| policy.evaluate(state))?;
        if output.len() != self.action_dim {
            return Err(PolicyError::ShapeMismatch {
                expected: self.action_dim,
                actual: output.len(),
            });
        }
        Ok(output.into_iter().map(discretize).collect())
    }
}
