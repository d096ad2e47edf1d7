//! Process wiring: restore state, start the trainer and autosave threads,
//! run the serving loop on the calling thread.
//!
//! ```text
//!                  ┌──────────────── PolicyStore ────────────────┐
//!                  │                                             │
//! UDP ──> DecisionServer ──offer──> IngestionQueue ──drain──> BackgroundTrainer
//!  ^         │ (this thread)                                     (policy-trainer)
//!  └─reply───┘                                                   │
//!                               Autosaver (policy-autosave) <────┘ ExperienceBuffer
//! ```

use std::net::UdpSocket;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use burn::tensor::backend::Backend;
use tracing::{info, warn};

use crate::buffers::{ExperienceBuffer, SharedExperienceBuffer, ingestion_queue};
use crate::checkpoint::{Checkpointer, CheckpointerConfig};
use crate::config::ServerConfig;
use crate::core::exploration::exploration_rate;
use crate::core::policy_store::policy_store;
use crate::error::ServerError;
use crate::learner::BackgroundTrainer;
use crate::metrics::server_metrics;
use crate::policy::{
    ActionSelector, PolicyNet, QLearner, TrainablePolicy, TrainingBackend, adam_optimizer,
};

use super::autosave::Autosaver;
use super::decision_server::{DecisionServer, DecisionServerConfig};

/// Bind the configured address and serve until `shutdown` is set.
pub fn run(config: ServerConfig, shutdown: Arc<AtomicBool>) -> Result<(), ServerError> {
    config.validate()?;
    let addr = config.bind_addr()?;
    let socket = UdpSocket::bind(addr).map_err(|source| ServerError::Bind {
        addr: addr.to_string(),
        source,
    })?;
    run_on_socket(config, socket, shutdown)
}

/// Serve on an already-bound socket until `shutdown` is set.
pub fn run_on_socket(
    config: ServerConfig,
    socket: UdpSocket,
    shutdown: Arc<AtomicBool>,
) -> Result<(), ServerError> {
    config.validate()?;
    let local_addr = socket.local_addr()?;

    let checkpointer = Checkpointer::new(CheckpointerConfig::new(
        config.policy_file(),
        config.buffer_path.clone(),
    ));
    let metrics = server_metrics();
    let queue = ingestion_queue(config.queue_capacity);
    let buffer = restore_buffer(&checkpointer, &config);

    let net_config = config.network_config();
    let device = Default::default();
    let net = restore_policy(&checkpointer, &config, &device);
    let learner = QLearner::new(
        net,
        adam_optimizer::<TrainingBackend>(),
        net_config,
        config.learner_settings(),
        device,
    );

    let store = policy_store(learner.snapshot());
    let exploration = exploration_rate(
        config.epsilon_start,
        config.epsilon_min,
        config.epsilon_decay,
    );

    let trainer = BackgroundTrainer::new(
        config.trainer_config(),
        learner,
        Arc::clone(&queue),
        Arc::clone(&buffer),
        Arc::clone(&store),
        Arc::clone(&exploration),
        Arc::clone(&metrics),
    )
    .spawn(Arc::clone(&shutdown))
    .map_err(|source| ServerError::Spawn {
        name: "trainer",
        source,
    })?;

    let autosaver = Autosaver::new(
        Arc::clone(&store),
        Arc::clone(&buffer),
        checkpointer.clone(),
        config.autosave_interval(),
        Arc::clone(&metrics),
    );
    let autosave = match autosaver.spawn(Arc::clone(&shutdown)) {
        Ok(handle) => handle,
        Err(source) => {
            shutdown.store(true, Ordering::Relaxed);
            let _ = trainer.join();
            return Err(ServerError::Spawn {
                name: "autosave",
                source,
            });
        }
    };

    let selector = ActionSelector::new(Arc::clone(&store), exploration, config.action_dim);
    let mut server = DecisionServer::new(
        DecisionServerConfig {
            state_dim: config.state_dim,
            max_datagram_size: config.max_datagram_size,
            recv_poll: config.recv_poll(),
            report_interval: config.report_interval(),
            session_idle_ttl: config.session_idle_ttl(),
        },
        selector,
        Arc::clone(&queue),
        Arc::clone(&metrics),
    );

    info!(addr = %local_addr, "decision server listening");
    let served = server.serve(&socket, &shutdown);

    shutdown.store(true, Ordering::Relaxed);
    let trainer_result = trainer.join();
    let autosave_result = autosave.join();

    // Final save after both background threads have stopped
    let final_save = Autosaver::new(
        store,
        buffer,
        checkpointer,
        config.autosave_interval(),
        Arc::clone(&metrics),
    );
    final_save.save_all();

    let snapshot = metrics.snapshot();
    info!(
        requests = snapshot.requests,
        train_steps = snapshot.train_steps,
        dropped = snapshot.dropped,
        "decision server stopped"
    );

    served?;
    trainer_result.map_err(|_| ServerError::ThreadPanicked("trainer"))?;
    autosave_result.map_err(|_| ServerError::ThreadPanicked("autosave"))?;
    Ok(())
}

/// Load the persisted buffer. Absent, corrupt or mismatched data gives an empty buffer.
fn restore_buffer(checkpointer: &Checkpointer, config: &ServerConfig) -> SharedExperienceBuffer {
    let transitions = match checkpointer.load_buffer() {
        Ok(Some(transitions)) => transitions,
        Ok(None) => {
            info!(path = %checkpointer.buffer_path().display(), "no saved experience, starting empty");
            Vec::new()
        }
        Err(e) => {
            warn!(error = %e, path = %checkpointer.buffer_path().display(), "ignoring unreadable experience file");
            Vec::new()
        }
    };

    let total = transitions.len();
    let usable: Vec<_> = transitions
        .into_iter()
        .filter(|t| t.has_dims(config.state_dim, config.action_dim))
        .collect();
    if usable.len() < total {
        warn!(
            discarded = total - usable.len(),
            "saved transitions do not match configured dimensions"
        );
    }
    if !usable.is_empty() {
        info!(transitions = usable.len(), "restored experience buffer");
    }

    Arc::new(ExperienceBuffer::with_transitions(config.buffer_capacity, usable))
}

/// Load the persisted policy, falling back to fresh parameters.
fn restore_policy(
    checkpointer: &Checkpointer,
    config: &ServerConfig,
    device: &<TrainingBackend as Backend>::Device,
) -> PolicyNet<TrainingBackend> {
    let net_config = config.network_config();
    match checkpointer.load_policy::<TrainingBackend>(&net_config, device) {
        Ok(Some(net)) => {
            info!(path = %checkpointer.policy_path().display(), "restored policy");
            net
        }
        Ok(None) => {
            info!("no saved policy, starting from fresh parameters");
            net_config.init(device)
        }
        Err(e) => {
            warn!(error = %e, path = %checkpointer.policy_path().display(), "ignoring unreadable policy file");
            net_config.init(device)
        }
    }
}
