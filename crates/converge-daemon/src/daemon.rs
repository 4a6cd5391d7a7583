//! Daemon lifecycle

use converge_controller::{
    HttpManifestFetcher, InMemoryCollaborators, InMemoryStore, InfrastructureSimulator, Reconciler,
    ReconcilerBuilder, ResourceStore,
};
use std::future::Future;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;

use crate::config::DaemonConfig;
use crate::error::DaemonResult;
use crate::manifest::Manifest;
use crate::scheduler::Scheduler;

/// Controller, scheduler and the in-memory store they share
pub struct Daemon {
    config: DaemonConfig,
    store: Arc<InMemoryStore>,
    reconciler: Arc<Reconciler>,
    simulator: Option<InfrastructureSimulator>,
    manifest: Option<PathBuf>,
}

impl Daemon {
    pub fn new(config: DaemonConfig, manifest: Option<PathBuf>) -> DaemonResult<Self> {
        let store = Arc::new(InMemoryStore::with_capacity(config.controller.queue_capacity));
        let shared: Arc<dyn ResourceStore> = store.clone();
        let collaborators = InMemoryCollaborators::new(shared.clone());

        let mut builder = ReconcilerBuilder::new()
            .with_store(shared.clone())
            .with_collaborators(collaborators.collaborators())
            .with_settings(config.controller_settings());

        // Simulated uploaders are unreachable over HTTP
        if !config.simulation.enabled {
            let timeout = Duration::from_secs(config.assets.fetch_timeout_secs);
            builder = builder.with_manifest_fetcher(Arc::new(HttpManifestFetcher::new(timeout)?));
        }

        let simulator = config
            .simulation
            .enabled
            .then(|| InfrastructureSimulator::new(shared));

        Ok(Self {
            reconciler: Arc::new(builder.build()?),
            config,
            store,
            simulator,
            manifest,
        })
    }

    pub fn store(&self) -> &Arc<InMemoryStore> {
        &self.store
    }

    /// Applies the manifest, then schedules passes until `shutdown` resolves
    pub async fn run<F>(self, shutdown: F) -> DaemonResult<()>
    where
        F: Future<Output = ()>,
    {
        if let Some(path) = &self.manifest {
            tracing::info!(path = %path.display(), "Loading manifest");
            Manifest::load(path).await?.apply(self.store.clone()).await?;
        }

        let (stop_tx, stop_rx) = watch::channel(false);
        let simulation = self.simulator.map(|simulator| {
            let tick = Duration::from_millis(self.config.simulation.tick_interval_ms);
            tokio::spawn(simulate(simulator, tick, stop_rx.clone()))
        });

        let (scheduler, rx) = Scheduler::new(self.config.controller.clone(), self.reconciler);
        scheduler.run(rx, shutdown).await;

        let _ = stop_tx.send(true);
        if let Some(handle) = simulation {
            if let Err(e) = handle.await {
                tracing::warn!(error = %e, "Simulation task ended abnormally");
            }
        }

        tracing::info!("Daemon stopped");
        Ok(())
    }
}

async fn simulate(
    simulator: InfrastructureSimulator,
    tick: Duration,
    mut stop: watch::Receiver<bool>,
) {
    tracing::info!(tick_ms = tick.as_millis() as u64, "Infrastructure simulation started");
    let mut interval = tokio::time::interval(tick);

    loop {
        tokio::select! {
            _ = interval.tick() => {
                if let Err(e) = simulator.tick().await {
                    tracing::error!(error = %e, "Simulation tick failed");
                }
            }
            _ = stop.changed() => break,
        }
    }
}

/// Resolves on Ctrl+C or SIGTERM
pub async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "Failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "Failed to install signal handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            tracing::info!("Received Ctrl+C, initiating graceful shutdown");
        }
        _ = terminate => {
            tracing::info!("Received terminate signal, initiating graceful shutdown");
        }
    }
}
