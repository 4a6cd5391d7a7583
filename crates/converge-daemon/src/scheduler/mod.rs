//! Watch-driven scheduling of reconciliation passes
//!
//! Store changes are mapped to the topology they concern and fed through a
//! deduplicating [`WorkQueue`]. A bounded pool of workers drains it; each
//! pass outcome decides when the topology is looked at again.

mod backoff;
mod queue;

pub use backoff::Backoff;
pub use queue::WorkQueue;

use converge_controller::{Action, Reconciler, WatchEvent};
use converge_types::{ObjectKey, Resource, Topology};
use std::future::Future;
use std::sync::Arc;
use tokio::sync::broadcast::error::RecvError;
use tokio::sync::{mpsc, OwnedSemaphorePermit, Semaphore};
use tokio::time::{interval, sleep, Duration, MissedTickBehavior};

use crate::config::ControllerConfig;

/// Scheduler state
pub struct Scheduler {
    config: ControllerConfig,
    reconciler: Arc<Reconciler>,
    queue: Arc<WorkQueue>,
    backoff: Backoff,
}

impl Scheduler {
    /// Create a new scheduler
    pub fn new(
        config: ControllerConfig,
        reconciler: Arc<Reconciler>,
    ) -> (Arc<Self>, mpsc::UnboundedReceiver<ObjectKey>) {
        let (queue, rx) = WorkQueue::new();
        let backoff = Backoff::new(config.backoff_base(), config.backoff_max());

        let scheduler = Arc::new(Self {
            config,
            reconciler,
            queue,
            backoff,
        });

        (scheduler, rx)
    }

    pub fn queue(&self) -> &Arc<WorkQueue> {
        &self.queue
    }

    /// Runs until `shutdown` resolves, then waits for in-flight passes
    pub async fn run<F>(self: Arc<Self>, mut rx: mpsc::UnboundedReceiver<ObjectKey>, shutdown: F)
    where
        F: Future<Output = ()>,
    {
        let workers = self.config.workers.max(1);
        let permits = Arc::new(Semaphore::new(workers));
        let mut events = self.reconciler.context().store.subscribe();

        let mut resync = interval(self.config.resync_interval());
        resync.set_missed_tick_behavior(MissedTickBehavior::Delay);

        // a free worker slot is claimed before a key is taken off the queue
        let mut slot: Option<OwnedSemaphorePermit> = None;

        tokio::pin!(shutdown);
        tracing::info!(workers, "Scheduler started");

        loop {
            tokio::select! {
                _ = &mut shutdown => break,
                _ = resync.tick() => self.resync().await,
                event = events.recv() => match event {
                    Ok(event) => self.on_event(event).await,
                    Err(RecvError::Lagged(skipped)) => {
                        tracing::warn!(skipped, "Watch lagged, resyncing");
                        self.resync().await;
                    }
                    Err(RecvError::Closed) => {
                        tracing::warn!("Watch closed");
                        break;
                    }
                },
                permit = permits.clone().acquire_owned(), if slot.is_none() => match permit {
                    Ok(permit) => slot = Some(permit),
                    Err(_) => break,
                },
                Some(key) = rx.recv(), if slot.is_some() => {
                    let permit = slot.take();
                    let scheduler = self.clone();
                    tokio::spawn(async move {
                        scheduler.process(key).await;
                        drop(permit);
                    });
                }
            }
        }

        drop(slot);
        self.queue.close().await;
        tracing::info!("Draining in-flight passes");
        if permits.acquire_many(workers as u32).await.is_err() {
            tracing::warn!("Worker pool closed before draining");
        }
        tracing::info!("Scheduler stopped");
    }

    /// Enqueues every topology in the store
    pub async fn resync(&self) {
        match self.reconciler.topologies().list().await {
            Ok(topologies) => {
                tracing::debug!(count = topologies.len(), "Resync");
                for topology in topologies {
                    self.queue.add(topology.key()).await;
                }
            }
            Err(e) => tracing::error!(error = %e, "Failed to list topologies"),
        }
    }

    async fn on_event(&self, event: WatchEvent) {
        if event.kind == Topology::KIND {
            self.queue.add(event.key).await;
            return;
        }
        for key in event.owner_keys(Topology::KIND) {
            tracing::trace!(kind = %event.kind, child = %event.key, topology = %key, "Child changed");
            self.queue.add(key).await;
        }
    }

    async fn process(self: &Arc<Self>, key: ObjectKey) {
        self.queue.start(&key).await;

        match self.reconciler.reconcile(&key).await {
            Ok(Action::Requeue(after)) => {
                self.backoff.reset(&key);
                self.requeue(key.clone(), after);
            }
            Ok(Action::AwaitChange) => self.backoff.reset(&key),
            Err(e) => {
                let delay = self.backoff.next_delay(&key);
                tracing::error!(
                    topology = %key,
                    error = %e,
                    failures = self.backoff.failures(&key),
                    retry_in_ms = delay.as_millis() as u64,
                    "Reconciliation failed"
                );
                self.requeue(key.clone(), delay);
            }
        }

        self.queue.done(&key).await;
    }

    fn requeue(self: &Arc<Self>, key: ObjectKey, after: Duration) {
        let queue = self.queue.clone();
        tokio::spawn(async move {
            if !after.is_zero() {
                sleep(after).await;
            }
            queue.add(key).await;
        });
    }
}
