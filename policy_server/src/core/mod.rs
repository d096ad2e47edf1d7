//! Core types and shared state for the decision server.

pub mod exploration;
pub mod policy_store;
pub mod session;
pub mod transition;

pub use exploration::{ExplorationRate, SharedExplorationRate, exploration_rate};
pub use policy_store::{PolicyStore, SharedPolicyStore, policy_store};
pub use session::{SessionEntry, SessionTracker};
pub use transition::{ACTION_SYMBOLS, ActionVector, StateVector, Transition};
