//! Server configuration.
//!
//! Layered, lowest precedence first:
//! 1. [`ServerConfig::default`]
//! 2. a TOML file ([`ServerConfig::from_toml_file`]); missing keys keep their defaults
//! 3. command-line overrides applied by the binary through the `with_*` builders
//!
//! ```toml
//! host = "0.0.0.0"
//! port = 18233
//! batch_size = 64
//! epsilon_decay = 0.999
//! policy_path = "/var/lib/policy-server/policy.bin"
//! ```

use std::net::{IpAddr, SocketAddr};
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::learner::TrainerConfig;
use crate::policy::{PolicyNetConfig, QLearnerSettings};

/// Extension the burn file recorder writes.
const POLICY_EXTENSION: &str = "bin";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse config file {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },

    #[error("invalid host {0:?}")]
    InvalidHost(String),

    #[error("invalid configuration: {0}")]
    Invalid(&'static str),
}

/// Every tunable of the decision server.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ServerConfig {
    /// Address the UDP socket binds to
    pub host: String,
    pub port: u16,
    /// Receive buffer size; longer datagrams are truncated
    pub max_datagram_size: usize,

    /// Observation length after stripping the in-band identifier
    pub state_dim: usize,
    pub action_dim: usize,
    pub hidden_dim: usize,

    pub buffer_capacity: usize,
    pub queue_capacity: usize,
    pub batch_size: usize,

    pub gamma: f32,
    pub learning_rate: f64,
    pub epsilon_start: f64,
    pub epsilon_min: f64,
    pub epsilon_decay: f64,

    pub train_interval_ms: u64,
    pub idle_wait_ms: u64,
    pub report_interval_secs: u64,
    pub autosave_interval_secs: u64,
    /// Socket read timeout; bounds how long a pending snapshot waits without traffic
    pub recv_poll_ms: u64,
    /// Forget peers idle for longer than this. `None` keeps them forever.
    pub session_idle_ttl_secs: Option<u64>,

    pub policy_path: PathBuf,
    pub buffer_path: PathBuf,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 18233,
            max_datagram_size: 4096,
            state_dim: 8,
            action_dim: 8,
            hidden_dim: 64,
            buffer_capacity: 10_000,
            queue_capacity: 10_000,
            batch_size: 32,
            gamma: 0.99,
            learning_rate: 1e-3,
            epsilon_start: 1.0,
            epsilon_min: 0.05,
            epsilon_decay: 0.9999,
            train_interval_ms: 100,
            idle_wait_ms: 1_000,
            report_interval_secs: 10,
            autosave_interval_secs: 60,
            recv_poll_ms: 100,
            session_idle_ttl_secs: None,
            policy_path: PathBuf::from("policy.bin"),
            buffer_path: PathBuf::from("replay_buffer.bin"),
        }
    }
}

impl ServerConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// Load a TOML file on top of the defaults.
    pub fn from_toml_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        toml::from_str(&content).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }

    pub fn with_host(mut self, host: impl Into<String>) -> Self {
        self.host = host.into();
        self
    }

    pub fn with_port(mut self, port: u16) -> Self {
        self.port = port;
        self
    }

    pub fn with_policy_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.policy_path = path.into();
        self
    }

    pub fn with_buffer_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.buffer_path = path.into();
        self
    }

    pub fn with_batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = batch_size;
        self
    }

    pub fn with_epsilon(mut self, start: f64, min: f64, decay: f64) -> Self {
        self.epsilon_start = start;
        self.epsilon_min = min;
        self.epsilon_decay = decay;
        self
    }

    pub fn with_train_interval_ms(mut self, ms: u64) -> Self {
        self.train_interval_ms = ms;
        self
    }

    pub fn with_idle_wait_ms(mut self, ms: u64) -> Self {
        self.idle_wait_ms = ms;
        self
    }

    pub fn with_autosave_interval_secs(mut self, secs: u64) -> Self {
        self.autosave_interval_secs = secs;
        self
    }

    pub fn with_recv_poll_ms(mut self, ms: u64) -> Self {
        self.recv_poll_ms = ms;
        self
    }

    pub fn with_session_idle_ttl_secs(mut self, secs: Option<u64>) -> Self {
        self.session_idle_ttl_secs = secs;
        self
    }

    /// Check every field. Any error here is fatal at startup.
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.host
            .parse::<IpAddr>()
            .map_err(|_| ConfigError::InvalidHost(self.host.clone()))?;

        if self.max_datagram_size == 0 {
            return Err(ConfigError::Invalid("max_datagram_size must be > 0"));
        }
        if self.state_dim == 0 || self.action_dim == 0 || self.hidden_dim == 0 {
            return Err(ConfigError::Invalid("network dimensions must be > 0"));
        }
        if self.buffer_capacity == 0 || self.queue_capacity == 0 {
            return Err(ConfigError::Invalid("buffer and queue capacity must be > 0"));
        }
        if self.batch_size == 0 {
            return Err(ConfigError::Invalid("batch_size must be > 0"));
        }
        if self.batch_size > self.buffer_capacity {
            return Err(ConfigError::Invalid("batch_size must not exceed buffer_capacity"));
        }
        if !(self.gamma.is_finite() && (0.0..=1.0).contains(&self.gamma)) {
            return Err(ConfigError::Invalid("gamma must be in [0, 1]"));
        }
        if !(self.learning_rate.is_finite() && self.learning_rate > 0.0) {
            return Err(ConfigError::Invalid("learning_rate must be > 0"));
        }
        if !(0.0..=1.0).contains(&self.epsilon_min) {
            return Err(ConfigError::Invalid("epsilon_min must be in [0, 1]"));
        }
        if !(self.epsilon_min..=1.0).contains(&self.epsilon_start) {
            return Err(ConfigError::Invalid("epsilon_start must be in [epsilon_min, 1]"));
        }
        if !(self.epsilon_decay > 0.0 && self.epsilon_decay <= 1.0) {
            return Err(ConfigError::Invalid("epsilon_decay must be in (0, 1]"));
        }
        if self.recv_poll_ms == 0 {
            return Err(ConfigError::Invalid("recv_poll_ms must be > 0"));
        }
        if self.autosave_interval_secs == 0 {
            return Err(ConfigError::Invalid("autosave_interval_secs must be > 0"));
        }
        Ok(())
    }

    /// Socket address to bind.
    pub fn bind_addr(&self) -> Result<SocketAddr, ConfigError> {
        let ip = self
            .host
            .parse::<IpAddr>()
            .map_err(|_| ConfigError::InvalidHost(self.host.clone()))?;
        Ok(SocketAddr::new(ip, self.port))
    }

    /// Policy file path with the extension the recorder writes.
    pub fn policy_file(&self) -> PathBuf {
        self.policy_path.with_extension(POLICY_EXTENSION)
    }

    pub fn network_config(&self) -> PolicyNetConfig {
        PolicyNetConfig::new(self.state_dim, self.hidden_dim, self.action_dim)
    }

    pub fn learner_settings(&self) -> QLearnerSettings {
        QLearnerSettings {
            gamma: self.gamma,
            learning_rate: self.learning_rate,
        }
    }

    pub fn trainer_config(&self) -> TrainerConfig {
        TrainerConfig {
            batch_size: self.batch_size,
            train_interval: Duration::from_millis(self.train_interval_ms),
            idle_wait: Duration::from_millis(self.idle_wait_ms),
            report_interval: self.report_interval(),
        }
    }

    pub fn report_interval(&self) -> Duration {
        Duration::from_secs(self.report_interval_secs)
    }

    pub fn autosave_interval(&self) -> Duration {
        Duration::from_secs(self.autosave_interval_secs)
    }

    pub fn recv_poll(&self) -> Duration {
        Duration::from_millis(self.recv_poll_ms)
    }

    pub fn session_idle_ttl(&self) -> Option<Duration> {
        self.session_idle_ttl_secs.map(Duration::from_secs)
    }
}
