//! JSON wire format, one message per datagram.
//!
//! Request:
//! ```json
//! {"player_id": "A", "state": ["A", 1.0, 2.0, 3.0, 4.0, 5.0, 6.0, 7.0, 8.0], "reward": 0.0}
//! ```
//! `state[0]` repeats the identifier in-band and is stripped; the rest is the
//! observation. `reward` defaults to 0.0 when absent or null.
//!
//! Response:
//! ```json
//! {"player_id": "A", "output": [1, 0, -1, 0, 0, 1, -1, 1], "reward": 0.0}
//! ```

use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

use crate::core::transition::{ActionVector, StateVector};

/// Why a datagram was discarded.
#[derive(Debug, Error)]
pub enum DecodeError {
    #[error("invalid JSON: {0}")]
    Json(#[from] serde_json::Error),

    #[error("state is missing the in-band identifier")]
    EmptyState,

    #[error("state element {index} is not a number")]
    NonNumericState { index: usize },

    #[error("state has {actual} values after the identifier, expected {expected}")]
    StateLength { expected: usize, actual: usize },

    #[error("state element {index} is outside the f32 range")]
    StateOutOfRange { index: usize },

    #[error("reward {0} is outside the f32 range")]
    RewardOutOfRange(f64),
}

#[derive(Debug, Deserialize)]
struct RawRequest {
    #[serde(default)]
    player_id: Value,
    state: Vec<Value>,
    #[serde(default)]
    reward: Option<f64>,
}

/// A validated request.
#[derive(Debug, Clone, PartialEq)]
pub struct DecisionRequest {
    /// Opaque peer identifier, echoed verbatim
    pub player_id: Value,
    /// Observation with the in-band identifier removed
    pub state: StateVector,
    pub reward: f32,
}

impl DecisionRequest {
    /// Session key: the identifier's canonical JSON text.
    ///
    /// `"7"` and `7` are different peers.
    pub fn peer_key(&self) -> String {
        self.player_id.to_string()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DecisionResponse {
    pub player_id: Value,
    pub output: ActionVector,
    pub reward: f32,
}

/// Parse and validate one datagram.
pub fn decode_request(bytes: &[u8], state_dim: usize) -> Result<DecisionRequest, DecodeError> {
    let raw: RawRequest = serde_json::from_slice(bytes)?;

    let (_, observation) = raw.state.split_first().ok_or(DecodeError::EmptyState)?;
    if observation.len() != state_dim {
        return Err(DecodeError::StateLength {
            expected: state_dim,
            actual: observation.len(),
        });
    }

    let state = observation
        .iter()
        .enumerate()
        .map(|(i, v)| {
            let x = v
                .as_f64()
                .ok_or(DecodeError::NonNumericState { index: i + 1 })?;
            narrow(x).ok_or(DecodeError::StateOutOfRange { index: i + 1 })
        })
        .collect::<Result<StateVector, _>>()?;

    let reward = match raw.reward {
        Some(x) => narrow(x).ok_or(DecodeError::RewardOutOfRange(x))?,
        None => 0.0,
    };

    Ok(DecisionRequest {
        player_id: raw.player_id,
        state,
        reward,
    })
}

/// Narrow a JSON number, rejecting values that overflow `f32`.
fn narrow(x: f64) -> Option<f32> {
    let narrowed = x as f32;
    narrowed.is_finite().then_some(narrowed)
}

pub fn encode_response(response: &DecisionResponse) -> Result<Vec<u8>, serde_json::Error> {
    serde_json::to_vec(response)
}
