//! Single-threaded request/response loop.
//!
//! Per datagram, processed to completion before the next one:
//!
//! ```text
//! recv ──> decode ──> SessionTracker::consume_prior(peer)
//!                        └── prior found: offer (s, a, reward, s') to IngestionQueue
//!          ActionSelector::select(state) ──> SessionTracker::record(peer, state, action)
//!          send response ──> PolicyStore::maybe_update()
//! ```
//!
//! The socket has a read timeout, so a published snapshot is also swapped in
//! when no traffic arrives. Malformed datagrams get no response.

use std::io;
use std::net::UdpSocket;
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};

use tracing::{debug, error, info, warn};

use crate::buffers::SharedIngestionQueue;
use crate::core::session::SessionTracker;
use crate::core::transition::Transition;
use crate::error::panic_message;
use crate::metrics::{LoopTimer, ProgressReporter, SharedServerMetrics};
use crate::policy::{ActionSelector, PolicyError, PolicyFunction};

use super::protocol::{DecisionRequest, DecisionResponse, decode_request, encode_response};

/// Serving loop settings.
#[derive(Debug, Clone)]
pub struct DecisionServerConfig {
    pub state_dim: usize,
    pub max_datagram_size: usize,
    /// Socket read timeout
    pub recv_poll: Duration,
    /// Loop latency report period
    pub report_interval: Duration,
    /// Forget peers idle for longer than this
    pub session_idle_ttl: Option<Duration>,
}

impl Default for DecisionServerConfig {
    fn default() -> Self {
        Self {
            state_dim: 8,
            max_datagram_size: 4096,
            recv_poll: Duration::from_millis(100),
            report_interval: Duration::from_secs(10),
            session_idle_ttl: None,
        }
    }
}

/// Serving loop state: selector, sessions and the producer end of the queue.
pub struct DecisionServer<S: PolicyFunction> {
    config: DecisionServerConfig,
    selector: ActionSelector<S>,
    sessions: SessionTracker,
    queue: SharedIngestionQueue,
    metrics: SharedServerMetrics,
}

impl<S: PolicyFunction> DecisionServer<S> {
    pub fn new(
        config: DecisionServerConfig,
        selector: ActionSelector<S>,
        queue: SharedIngestionQueue,
        metrics: SharedServerMetrics,
    ) -> Self {
        Self {
            config,
            selector,
            sessions: SessionTracker::new(),
            queue,
            metrics,
        }
    }

    pub fn sessions(&self) -> &SessionTracker {
        &self.sessions
    }

    /// Close the loop for the peer's previous decision and pick a new action.
    pub fn handle_request(
        &mut self,
        request: DecisionRequest,
    ) -> Result<DecisionResponse, PolicyError> {
        let peer = request.peer_key();

        // Select before consuming, so a failed selection keeps the peer's entry
        let action = self.selector.select(&request.state)?;

        if let Some((prior_state, prior_action)) = self.sessions.consume_prior(&peer) {
            let transition = Transition::new(
                prior_state,
                prior_action,
                request.reward,
                request.state.clone(),
            );
            let accepted = self.queue.offer(transition);
            self.metrics.record_offer(accepted);
            if !accepted {
                debug!(peer = %peer, "ingestion queue full, transition dropped");
            }
        }

        self.sessions.record(&peer, request.state, action.clone());

        Ok(DecisionResponse {
            player_id: request.player_id,
            output: action,
            reward: request.reward,
        })
    }

    /// Decode, handle and encode one datagram.
    ///
    /// Returns `None` when no response should be sent.
    pub fn handle_datagram(&mut self, bytes: &[u8]) -> Option<Vec<u8>> {
        self.metrics.record_request();

        let request = match decode_request(bytes, self.config.state_dim) {
            Ok(request) => request,
            Err(e) => {
                debug!(error = %e, len = bytes.len(), "discarding malformed datagram");
                self.metrics.record_malformed();
                return None;
            }
        };

        let response = match self.handle_request(request) {
            Ok(response) => response,
            Err(e) => {
                warn!(error = %e, "action selection failed");
                return None;
            }
        };

        match encode_response(&response) {
            Ok(bytes) => Some(bytes),
            Err(e) => {
                warn!(error = %e, "failed to encode response");
                None
            }
        }
    }

    /// Swap in a pending snapshot, if any.
    pub fn hot_swap(&self) -> bool {
        let swapped = self.selector.store().maybe_update();
        if swapped {
            self.metrics.record_swap();
        }
        swapped
    }

    /// Serve on `socket` until `shutdown` is set.
    pub fn serve(&mut self, socket: &UdpSocket, shutdown: &AtomicBool) -> io::Result<()> {
        socket.set_read_timeout(Some(self.config.recv_poll))?;

        let mut buf = vec![0u8; self.config.max_datagram_size];
        let mut reporter = ProgressReporter::new(self.config.report_interval);
        let mut timer = LoopTimer::new();

        while !shutdown.load(Ordering::Relaxed) {
            match socket.recv_from(&mut buf) {
                Ok((len, peer)) => {
                    let start = Instant::now();
                    let datagram = &buf[..len];
                    let reply = panic::catch_unwind(AssertUnwindSafe(|| {
                        self.handle_datagram(datagram)
                    }));

                    match reply {
                        Ok(Some(bytes)) => match socket.send_to(&bytes, peer) {
                            Ok(_) => self.metrics.record_response(),
                            Err(e) => warn!(error = %e, %peer, "failed to send response"),
                        },
                        Ok(None) => {}
                        Err(payload) => {
                            error!(panic = %panic_message(payload.as_ref()), %peer, "request handling panicked");
                        }
                    }

                    self.hot_swap();
                    timer.record(start.elapsed());
                }
                Err(e) if matches!(e.kind(), io::ErrorKind::WouldBlock | io::ErrorKind::TimedOut) => {
                    self.hot_swap();
                }
                Err(e) => {
                    warn!(error = %e, "receive failed");
                }
            }

            if reporter.due() {
                if let Some(stats) = timer.take() {
                    info!(loops = stats.loops, avg_ms = stats.avg_ms, "loop perf");
                }
                if let Some(ttl) = self.config.session_idle_ttl {
                    let pruned = self.sessions.prune_idle(ttl);
                    if pruned > 0 {
                        debug!(pruned, "forgot idle peers");
                    }
                }
            }
        }

        Ok(())
    }
}
