//! Deduplicating work queue keyed by topology

use converge_types::ObjectKey;
use std::collections::HashSet;
use std::sync::Arc;
use tokio::sync::{mpsc, Mutex};

#[derive(Default)]
struct QueueState {
    /// Keys sent to the channel and not yet picked up
    queued: HashSet<ObjectKey>,

    /// Keys a worker is reconciling right now
    in_flight: HashSet<ObjectKey>,

    /// In-flight keys that changed again while being processed
    dirty: HashSet<ObjectKey>,

    closed: bool,
}

/// A key is queued at most once and never processed by two workers at the
/// same time. Adding a key that is in flight defers it until the running
/// pass finishes.
pub struct WorkQueue {
    state: Mutex<QueueState>,
    tx: mpsc::UnboundedSender<ObjectKey>,
}

impl WorkQueue {
    pub fn new() -> (Arc<Self>, mpsc::UnboundedReceiver<ObjectKey>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let queue = Arc::new(Self {
            state: Mutex::new(QueueState::default()),
            tx,
        });
        (queue, rx)
    }

    /// Enqueues the key; returns `false` when it was already pending
    pub async fn add(&self, key: ObjectKey) -> bool {
        let mut state = self.state.lock().await;
        if state.closed {
            return false;
        }
        if state.in_flight.contains(&key) {
            return state.dirty.insert(key);
        }
        if !state.queued.insert(key.clone()) {
            return false;
        }
        self.tx.send(key).is_ok()
    }

    /// Marks a key received from the channel as being processed
    pub async fn start(&self, key: &ObjectKey) {
        let mut state = self.state.lock().await;
        state.queued.remove(key);
        state.in_flight.insert(key.clone());
    }

    /// Finishes processing; a key that changed meanwhile is queued again
    pub async fn done(&self, key: &ObjectKey) {
        let mut state = self.state.lock().await;
        state.in_flight.remove(key);
        if state.dirty.remove(key) && !state.closed && state.queued.insert(key.clone()) {
            let _ = self.tx.send(key.clone());
        }
    }

    /// Stops accepting keys
    pub async fn close(&self) {
        self.state.lock().await.closed = true;
    }

    /// Keys waiting for a worker
    pub async fn pending(&self) -> usize {
        let state = self.state.lock().await;
        state.queued.len() + state.dirty.len()
    }
}
