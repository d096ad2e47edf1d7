//! Transition types shared by the serving path and the trainer.
//!
//! A `Transition` pairs one decision with the outcome reported by the next
//! message from the same peer:
//!
//! ```text
//! msg_k   (state_k)            -> action_k
//! msg_k+1 (state_k+1, reward)  -> Transition(state_k, action_k, reward, state_k+1)
//! ```

use serde::{Deserialize, Serialize};

/// Observation vector of one agent at one instant.
pub type StateVector = Vec<f32>;

/// Discretized control command; every entry is one of `-1`, `0`, `1`.
pub type ActionVector = Vec<i8>;

/// The three symbols an action entry may take.
pub const ACTION_SYMBOLS: [i8; 3] = [-1, 0, 1];

/// One observed `(state, action, reward, next_state)` training example.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Transition {
    /// State the action was selected for
    pub state: StateVector,
    /// Action taken
    pub action: ActionVector,
    /// Reward reported with the following message
    pub reward: f32,
    /// State reported with the following message
    pub next_state: StateVector,
}

impl Transition {
    /// Create a new transition.
    pub fn new(
        state: StateVector,
        action: ActionVector,
        reward: f32,
        next_state: StateVector,
    ) -> Self {
        Self {
            state,
            action,
            reward,
            next_state,
        }
    }

    /// Check that every vector has the expected length.
    pub fn has_dims(&self, state_dim: usize, action_dim: usize) -> bool {
        self.state.len() == state_dim
            && self.next_state.len() == state_dim
            && self.action.len() == action_dim
    }

    /// Action entries widened to `f32` for use as a reward mask.
    pub fn action_mask(&self) -> impl Iterator<Item = f32> + '_ {
        self.action.iter().map(|&a| f32::from(a))
    }
}
