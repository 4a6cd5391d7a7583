//! converged - staged convergence controller daemon
//!
//! Loads declared topologies, watches the store and reconciles every
//! topology until its children match the declaration.

use clap::Parser;
use std::path::PathBuf;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use converge_daemon::{shutdown_signal, Daemon, DaemonConfig, DaemonResult};

/// Converge daemon CLI
#[derive(Parser)]
#[command(name = "converged")]
#[command(about = "Converge - staged convergence controller", long_about = None)]
#[command(version)]
struct Cli {
    /// Configuration file path
    #[arg(short, long, env = "CONVERGE_CONFIG")]
    config: Option<String>,

    /// Manifest of topologies and secrets to load at startup
    #[arg(short, long, env = "CONVERGE_MANIFEST")]
    manifest: Option<PathBuf>,

    /// Concurrent reconciliation workers
    #[arg(short, long, env = "CONVERGE_WORKERS")]
    workers: Option<usize>,

    /// Log level
    #[arg(long, env = "CONVERGE_LOG_LEVEL")]
    log_level: Option<String>,

    /// Enable JSON logging
    #[arg(long, env = "CONVERGE_LOG_JSON")]
    json: bool,

    /// Simulate the database, transport and workload operators
    #[arg(long, env = "CONVERGE_SIMULATE")]
    simulate: bool,
}

#[tokio::main]
async fn main() -> DaemonResult<()> {
    let cli = Cli::parse();

    // Load configuration
    let mut config = DaemonConfig::load(cli.config.as_deref())?;

    // Override with CLI args
    if let Some(workers) = cli.workers {
        config.controller.workers = workers;
    }
    if let Some(level) = cli.log_level {
        config.logging.level = level;
    }
    config.logging.json |= cli.json;
    config.simulation.enabled |= cli.simulate;

    // Initialize tracing
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| config.logging.level.clone().into());

    if config.logging.json {
        tracing_subscriber::registry()
            .with(env_filter)
            .with(tracing_subscriber::fmt::layer().json())
            .init();
    } else {
        tracing_subscriber::registry()
            .with(env_filter)
            .with(tracing_subscriber::fmt::layer())
            .init();
    }

    tracing::info!(
        version = env!("CARGO_PKG_VERSION"),
        workers = config.controller.workers,
        simulation = config.simulation.enabled,
        finalizer = %config.controller.finalizer,
        "Starting converged"
    );

    let daemon = Daemon::new(config, cli.manifest)?;
    daemon.run(shutdown_signal()).await
}
