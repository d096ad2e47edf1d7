use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::atomic::AtomicBool;
use std::sync::Arc;

use clap::Parser;
use tracing::{error, info};

use policy_server::{ServerConfig, ServerError, server};

#[derive(Parser, Debug)]
#[command(name = "policy-server")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// TOML configuration file
    #[arg(short = 'c', long = "config", value_name = "FILE")]
    config: Option<PathBuf>,

    /// Address to bind
    #[arg(long)]
    host: Option<String>,

    /// UDP port
    #[arg(short = 'p', long)]
    port: Option<u16>,

    /// Policy parameter file
    #[arg(long, value_name = "FILE")]
    policy_path: Option<PathBuf>,

    /// Experience buffer file
    #[arg(long, value_name = "FILE")]
    buffer_path: Option<PathBuf>,

    /// Log filter used when RUST_LOG is unset
    #[arg(long, default_value = "info")]
    log_level: String,
}

impl Cli {
    fn load_config(&self) -> Result<ServerConfig, ServerError> {
        let mut config = match &self.config {
            Some(path) => ServerConfig::from_toml_file(path)?,
            None => ServerConfig::default(),
        };

        if let Some(host) = &self.host {
            config = config.with_host(host.clone());
        }
        if let Some(port) = self.port {
            config = config.with_port(port);
        }
        if let Some(path) = &self.policy_path {
            config = config.with_policy_path(path.clone());
        }
        if let Some(path) = &self.buffer_path {
            config = config.with_buffer_path(path.clone());
        }

        config.validate()?;
        Ok(config)
    }
}

fn init_logging(level: &str) {
    use tracing_subscriber::{EnvFilter, fmt, prelude::*};

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_thread_names(true))
        .init();
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    init_logging(&cli.log_level);

    let config = match cli.load_config() {
        Ok(config) => config,
        Err(e) => {
            error!(error = %e, "invalid configuration");
            return ExitCode::FAILURE;
        }
    };

    info!(
        host = %config.host,
        port = config.port,
        policy = %config.policy_file().display(),
        buffer = %config.buffer_path.display(),
        "starting policy server"
    );

    // No signal handling: the process runs until it is killed.
    let shutdown = Arc::new(AtomicBool::new(false));
    match server::run(config, shutdown) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!(error = %e, "policy server failed");
            ExitCode::FAILURE
        }
    }
}
