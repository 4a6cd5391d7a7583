//! In-memory resource store for development, simulation and testing.
//!
//! Implements the store semantics the controller relies on: optimistic
//! concurrency on `resource_version`, generation tracking on desired-content
//! changes, finalizer-blocked deletion and owner-based garbage collection.
//! Not suitable for production use.

use async_trait::async_trait;
use chrono::Utc;
use converge_types::ObjectKey;
use dashmap::{DashMap, DashSet};
use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, Ordering};
use tokio::sync::broadcast;
use uuid::Uuid;

use super::traits::{ChangeKind, ResourceStore, StoredObject, WatchEvent};
use crate::error::{StoreError, StoreResult};

/// Watch events buffered per subscriber before it lags
pub const DEFAULT_EVENT_CAPACITY: usize = 1024;

type Slot = (String, ObjectKey);

enum Deletion {
    Remove,
    Marked(StoredObject),
    AlreadyMarked,
}

/// In-memory store implementation.
pub struct InMemoryStore {
    /// All objects indexed by kind and key.
    objects: DashMap<Slot, StoredObject>,

    /// Last assigned resource version, shared across kinds.
    version: AtomicU64,

    /// Number of persisted changes.
    mutations: AtomicU64,

    events: broadcast::Sender<WatchEvent>,

    /// Kinds whose writes are rejected
    failing_kinds: DashSet<String>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_EVENT_CAPACITY)
    }

    /// Store whose watch subscribers buffer up to `capacity` events
    pub fn with_capacity(capacity: usize) -> Self {
        let (events, _) = broadcast::channel(capacity.max(1));
        Self {
            objects: DashMap::new(),
            version: AtomicU64::new(0),
            mutations: AtomicU64::new(0),
            events,
            failing_kinds: DashSet::new(),
        }
    }

    /// Makes every write to `kind` fail with a backend error until cleared
    pub fn set_fail_writes(&self, kind: &str, fail: bool) {
        if fail {
            self.failing_kinds.insert(kind.to_string());
        } else {
            self.failing_kinds.remove(kind);
        }
    }

    fn check_writable(&self, kind: &str) -> StoreResult<()> {
        if self.failing_kinds.contains(kind) {
            return Err(StoreError::Backend(format!("writes to {} are failing", kind)));
        }
        Ok(())
    }

    /// Number of writes that actually changed stored content
    pub fn mutation_count(&self) -> u64 {
        self.mutations.load(Ordering::SeqCst)
    }

    pub fn len(&self) -> usize {
        self.objects.len()
    }

    pub fn is_empty(&self) -> bool {
        self.objects.is_empty()
    }

    pub fn contains(&self, kind: &str, key: &ObjectKey) -> bool {
        self.objects.contains_key(&(kind.to_string(), key.clone()))
    }

    fn next_version(&self) -> u64 {
        self.version.fetch_add(1, Ordering::SeqCst) + 1
    }

    fn record(&self, object: &StoredObject, change: ChangeKind) {
        self.mutations.fetch_add(1, Ordering::SeqCst);
        // no subscribers is fine
        let _ = self.events.send(WatchEvent {
            kind: object.kind.clone(),
            key: object.key(),
            owners: object.metadata.owner_references.clone(),
            change,
        });
    }

    fn not_found(slot: &Slot) -> StoreError {
        StoreError::NotFound {
            kind: slot.0.clone(),
            key: slot.1.clone(),
        }
    }

    fn apply_update(&self, object: StoredObject, status_only: bool) -> StoreResult<StoredObject> {
        self.check_writable(&object.kind)?;
        let slot = (object.kind.clone(), object.key());

        let stored = {
            let mut entry = self
                .objects
                .get_mut(&slot)
                .ok_or_else(|| Self::not_found(&slot))?;
            let current = entry.value().clone();

            if object.metadata.resource_version != current.metadata.resource_version {
                return Err(StoreError::Conflict {
                    kind: slot.0.clone(),
                    key: slot.1.clone(),
                    expected: object.metadata.resource_version,
                });
            }

            let mut next = current.clone();
            if status_only {
                match object.status() {
                    Some(status) => {
                        next.body.insert("status".to_string(), status.clone());
                    }
                    None => {
                        next.body.remove("status");
                    }
                }
            } else {
                let mut metadata = object.metadata.clone();
                metadata.uid = current.metadata.uid.clone();
                metadata.generation = current.metadata.generation;
                metadata.creation_timestamp = current.metadata.creation_timestamp;
                // the deletion marker is owned by the store
                metadata.deletion_timestamp = current.metadata.deletion_timestamp;

                if object.desired() != current.desired() {
                    metadata.generation += 1;
                }

                next.metadata = metadata;
                next.body = object.desired();
                if let Some(status) = current.status() {
                    next.body.insert("status".to_string(), status.clone());
                }
            }

            if next == current {
                return Ok(current);
            }

            next.metadata.resource_version = self.next_version();
            *entry = next.clone();
            next
        };

        self.record(&stored, ChangeKind::Applied);

        if stored.metadata.is_deleting() && stored.metadata.finalizers.is_empty() {
            let children = self.remove_slot(&slot);
            self.cascade(children);
        }

        Ok(stored)
    }

    /// Removes an object outright and returns the slots of the objects it owned
    fn remove_slot(&self, slot: &Slot) -> Vec<Slot> {
        let Some((_, removed)) = self.objects.remove(slot) else {
            return Vec::new();
        };
        self.record(&removed, ChangeKind::Deleted);

        let uid = removed.metadata.uid;
        self.objects
            .iter()
            .filter(|entry| entry.value().metadata.is_owned_by(&uid))
            .map(|entry| entry.key().clone())
            .collect()
    }

    fn delete_one(&self, slot: &Slot) -> Option<Deletion> {
        let mut entry = self.objects.get_mut(slot)?;
        if entry.metadata.finalizers.is_empty() {
            return Some(Deletion::Remove);
        }
        if entry.metadata.deletion_timestamp.is_some() {
            return Some(Deletion::AlreadyMarked);
        }
        entry.metadata.deletion_timestamp = Some(Utc::now());
        entry.metadata.resource_version = self.next_version();
        Some(Deletion::Marked(entry.clone()))
    }

    /// Deletes every pending slot, following owner links breadth first
    fn cascade(&self, pending: Vec<Slot>) {
        let mut pending: VecDeque<Slot> = pending.into();
        while let Some(slot) = pending.pop_front() {
            match self.delete_one(&slot) {
                Some(Deletion::Remove) => pending.extend(self.remove_slot(&slot)),
                Some(Deletion::Marked(object)) => self.record(&object, ChangeKind::Applied),
                Some(Deletion::AlreadyMarked) | None => {}
            }
        }
    }
}

impl Default for InMemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ResourceStore for InMemoryStore {
    async fn get(&self, kind: &str, key: &ObjectKey) -> StoreResult<StoredObject> {
        let slot = (kind.to_string(), key.clone());
        self.objects
            .get(&slot)
            .map(|entry| entry.value().clone())
            .ok_or_else(|| Self::not_found(&slot))
    }

    async fn list(&self, kind: &str) -> StoreResult<Vec<StoredObject>> {
        let mut objects: Vec<StoredObject> = self
            .objects
            .iter()
            .filter(|entry| entry.key().0 == kind)
            .map(|entry| entry.value().clone())
            .collect();
        objects.sort_by_key(|o| o.key());
        Ok(objects)
    }

    async fn create(&self, mut object: StoredObject) -> StoreResult<StoredObject> {
        self.check_writable(&object.kind)?;
        let slot = (object.kind.clone(), object.key());

        object.metadata.uid = Uuid::new_v4().to_string();
        object.metadata.generation = 1;
        object.metadata.creation_timestamp = Some(Utc::now());
        object.metadata.deletion_timestamp = None;

        match self.objects.entry(slot.clone()) {
            dashmap::mapref::entry::Entry::Occupied(_) => {
                return Err(StoreError::AlreadyExists {
                    kind: slot.0,
                    key: slot.1,
                })
            }
            dashmap::mapref::entry::Entry::Vacant(vacant) => {
                object.metadata.resource_version = self.next_version();
                vacant.insert(object.clone());
            }
        }

        self.record(&object, ChangeKind::Applied);
        Ok(object)
    }

    async fn update(&self, object: StoredObject) -> StoreResult<StoredObject> {
        self.apply_update(object, false)
    }

    async fn update_status(&self, object: StoredObject) -> StoreResult<StoredObject> {
        self.apply_update(object, true)
    }

    async fn delete(&self, kind: &str, key: &ObjectKey) -> StoreResult<()> {
        self.check_writable(kind)?;
        let slot = (kind.to_string(), key.clone());
        if !self.objects.contains_key(&slot) {
            return Err(Self::not_found(&slot));
        }
        self.cascade(vec![slot]);
        Ok(())
    }

    fn subscribe(&self) -> broadcast::Receiver<WatchEvent> {
        self.events.subscribe()
    }
}
