//! Per-peer memory of the last decision.
//!
//! Closes the loop between one decision and the transition it produced: the
//! serving loop consumes the prior `(state, action)` for a peer when its next
//! message arrives, then records the new pair.
//!
//! Entries live for the lifetime of the process unless an idle TTL is
//! configured; peers that stop sending are never forgotten otherwise.

use std::collections::HashMap;
use std::time::{Duration, Instant};

use super::transition::{ActionVector, StateVector};

/// Last decision made for one peer.
#[derive(Debug, Clone, PartialEq)]
pub struct SessionEntry {
    pub state: StateVector,
    pub action: ActionVector,
    last_seen: Instant,
}

/// Peer id → last `(state, action)`. Last write wins.
#[derive(Debug, Default)]
pub struct SessionTracker {
    sessions: HashMap<String, SessionEntry>,
}

impl SessionTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record the decision just made for `peer_id`, replacing any previous one.
    pub fn record(&mut self, peer_id: &str, state: StateVector, action: ActionVector) {
        self.sessions.insert(
            peer_id.to_owned(),
            SessionEntry {
                state,
                action,
                last_seen: Instant::now(),
            },
        );
    }

    /// Take the previous decision for `peer_id`, if any.
    pub fn consume_prior(&mut self, peer_id: &str) -> Option<(StateVector, ActionVector)> {
        self.sessions
            .remove(peer_id)
            .map(|entry| (entry.state, entry.action))
    }

    /// Look at the previous decision without consuming it.
    pub fn peek(&self, peer_id: &str) -> Option<&SessionEntry> {
        self.sessions.get(peer_id)
    }

    /// Number of tracked peers.
    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }

    /// Forget peers not heard from within `ttl`. Returns how many were removed.
    pub fn prune_idle(&mut self, ttl: Duration) -> usize {
        let before = self.sessions.len();
        self.sessions
            .retain(|_, entry| entry.last_seen.elapsed() <= ttl);
        before - self.sessions.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_first_message_has_no_prior() {
        let mut sessions = SessionTracker::new();
        assert!(sessions.consume_prior("A").is_none());
        assert!(sessions.is_empty());
    }

    #[test]
    fn test_record_then_consume() {
        let mut sessions = SessionTracker::new();
        sessions.record("A", vec![1.0, 2.0], vec![1, -1]);

        assert_eq!(sessions.len(), 1);
        assert_eq!(
            sessions.consume_prior("A"),
            Some((vec![1.0, 2.0], vec![1, -1]))
        );
        assert!(sessions.consume_prior("A").is_none());
    }

    #[test]
    fn test_last_write_wins() {
        let mut sessions = SessionTracker::new();
        sessions.record("A", vec![1.0], vec![0]);
        sessions.record("A", vec![2.0], vec![1]);

        assert_eq!(sessions.len(), 1);
        assert_eq!(sessions.peek("A").map(|e| e.state.clone()), Some(vec![2.0]));
    }

    #[test]
    fn test_peers_are_independent() {
        let mut sessions = SessionTracker::new();
        sessions.record("A", vec![1.0], vec![1]);
        sessions.record("B", vec![2.0], vec![-1]);

        assert_eq!(sessions.consume_prior("B"), Some((vec![2.0], vec![-1])));
        assert_eq!(sessions.consume_prior("A"), Some((vec![1.0], vec![1])));
    }

    #[test]
    fn test_prune_idle() {
        let mut sessions = SessionTracker::new();
        sessions.record("A", vec![1.0], vec![1]);

        assert_eq!(sessions.prune_idle(Duration::from_secs(60)), 0);
        assert_eq!(sessions.len(), 1);

        std::thread::sleep(Duration::from_millis(5));
        assert_eq!(sessions.prune_idle(Duration::ZERO), 1);
        assert!(sessions.is_empty());
    }
}
