//! Resource store contract

use async_trait::async_trait;
use converge_types::{ObjectKey, ObjectMeta, OwnerReference};
use serde_json::{Map, Value};
use tokio::sync::broadcast;

use crate::error::StoreResult;

/// Untyped stored object: metadata plus every other top-level field
#[derive(Debug, Clone, PartialEq)]
pub struct StoredObject {
    pub kind: String,
    pub metadata: ObjectMeta,
    pub body: Map<String, Value>,
}

impl StoredObject {
    pub fn key(&self) -> ObjectKey {
        self.metadata.key()
    }

    pub fn status(&self) -> Option<&Value> {
        self.body.get("status")
    }

    /// Body without the status subresource
    pub fn desired(&self) -> Map<String, Value> {
        let mut desired = self.body.clone();
        desired.remove("status");
        desired
    }
}

/// Kind of change carried by a watch event
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChangeKind {
    Applied,
    Deleted,
}

/// Notification that a stored object changed
#[derive(Debug, Clone)]
pub struct WatchEvent {
    pub kind: String,
    pub key: ObjectKey,
    pub owners: Vec<OwnerReference>,
    pub change: ChangeKind,
}

impl WatchEvent {
    /// Keys of the owners of the changed object
    pub fn owner_keys(&self, owner_kind: &str) -> Vec<ObjectKey> {
        self.owners
            .iter()
            .filter(|o| o.kind == owner_kind)
            .map(|o| self.key.sibling(o.name.clone()))
            .collect()
    }
}

/// Store with optimistic-concurrency writes, watch notifications and
/// owner-based garbage collection.
#[async_trait]
pub trait ResourceStore: Send + Sync {
    async fn get(&self, kind: &str, key: &ObjectKey) -> StoreResult<StoredObject>;

    async fn list(&self, kind: &str) -> StoreResult<Vec<StoredObject>>;

    /// Creates a new object; identity, version and generation are assigned
    async fn create(&self, object: StoredObject) -> StoreResult<StoredObject>;

    /// Replaces metadata and desired content, leaving status untouched.
    /// Fails with `Conflict` when the object's resource version is stale.
    async fn update(&self, object: StoredObject) -> StoreResult<StoredObject>;

    /// Replaces only the status subresource
    async fn update_status(&self, object: StoredObject) -> StoreResult<StoredObject>;

    /// Deletes the object, or marks it for deletion while finalizers remain
    async fn delete(&self, kind: &str, key: &ObjectKey) -> StoreResult<()>;

    fn subscribe(&self) -> broadcast::Receiver<WatchEvent>;
}
