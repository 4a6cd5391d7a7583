//! Typed access to a resource store

use converge_types::{ObjectKey, ObjectMeta, Resource};
use serde_json::{Map, Value};
use std::marker::PhantomData;
use std::sync::Arc;

use super::traits::{ResourceStore, StoredObject};
use crate::error::{StoreError, StoreResult};

/// Typed view of one kind in a [`ResourceStore`]
pub struct Api<K> {
    store: Arc<dyn ResourceStore>,
    _kind: PhantomData<fn() -> K>,
}

impl<K> Clone for Api<K> {
    fn clone(&self) -> Self {
        Self {
            store: Arc::clone(&self.store),
            _kind: PhantomData,
        }
    }
}

impl<K: Resource> Api<K> {
    pub fn new(store: Arc<dyn ResourceStore>) -> Self {
        Self {
            store,
            _kind: PhantomData,
        }
    }

    pub async fn get(&self, key: &ObjectKey) -> StoreResult<K> {
        let object = self.store.get(K::KIND, key).await?;
        from_stored(object)
    }

    /// Like [`Api::get`], with `NotFound` mapped to `None`
    pub async fn get_opt(&self, key: &ObjectKey) -> StoreResult<Option<K>> {
        match self.get(key).await {
            Ok(resource) => Ok(Some(resource)),
            Err(e) if e.is_not_found() => Ok(None),
            Err(e) => Err(e),
        }
    }

    pub async fn list(&self) -> StoreResult<Vec<K>> {
        self.store
            .list(K::KIND)
            .await?
            .into_iter()
            .map(from_stored)
            .collect()
    }

    /// Every object of this kind owned by `uid`
    pub async fn list_owned_by(&self, uid: &str) -> StoreResult<Vec<K>> {
        Ok(self
            .list()
            .await?
            .into_iter()
            .filter(|r| r.metadata().is_owned_by(uid))
            .collect())
    }

    pub async fn create(&self, resource: &K) -> StoreResult<K> {
        let created = self.store.create(to_stored(resource)?).await?;
        from_stored(created)
    }

    /// Persists metadata and desired content; status is ignored
    pub async fn replace(&self, resource: &K) -> StoreResult<K> {
        let updated = self.store.update(to_stored(resource)?).await?;
        from_stored(updated)
    }

    /// Persists only the status subresource
    pub async fn replace_status(&self, resource: &K) -> StoreResult<K> {
        let updated = self.store.update_status(to_stored(resource)?).await?;
        from_stored(updated)
    }

    pub async fn delete(&self, key: &ObjectKey) -> StoreResult<()> {
        self.store.delete(K::KIND, key).await
    }

    /// Removes `finalizer` from the stored object.
    ///
    /// Returns `false` when the finalizer was already absent.
    pub async fn remove_finalizer(&self, key: &ObjectKey, finalizer: &str) -> StoreResult<bool> {
        let mut resource = self.get(key).await?;
        if !resource.metadata_mut().remove_finalizer(finalizer) {
            return Ok(false);
        }
        self.replace(&resource).await?;
        Ok(true)
    }
}

fn to_stored<K: Resource>(resource: &K) -> StoreResult<StoredObject> {
    let mut body = match serde_json::to_value(resource)? {
        Value::Object(map) => map,
        other => {
            return Err(StoreError::Backend(format!(
                "{} did not serialize to an object: {}",
                K::KIND,
                other
            )))
        }
    };

    let metadata: ObjectMeta = match body.remove("metadata") {
        Some(value) => serde_json::from_value(value)?,
        None => resource.metadata().clone(),
    };

    Ok(StoredObject {
        kind: K::KIND.to_string(),
        metadata,
        body,
    })
}

fn from_stored<K: Resource>(object: StoredObject) -> StoreResult<K> {
    let mut map: Map<String, Value> = object.body;
    map.insert("metadata".to_string(), serde_json::to_value(&object.metadata)?);
    Ok(serde_json::from_value(Value::Object(map))?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::InMemoryStore;
    use converge_types::{Database, DatabaseSpec, DatabaseStatus};

    fn database(name: &str) -> Database {
        Database {
            metadata: ObjectMeta::new("ns", name),
            spec: DatabaseSpec {
                instance: "openstack".into(),
                database_name: name.into(),
                account: name.into(),
            },
            status: DatabaseStatus::default(),
        }
    }

    #[tokio::test]
    async fn test_typed_round_trip_through_store() {
        let api: Api<Database> = Api::new(Arc::new(InMemoryStore::new()));
        let created = api.create(&database("octavia")).await.unwrap();

        let fetched = api.get(&created.key()).await.unwrap();
        assert_eq!(fetched, created);
        assert_eq!(fetched.spec.instance, "openstack");
    }

    #[tokio::test]
    async fn test_replace_ignores_status_and_status_ignores_spec() {
        let api: Api<Database> = Api::new(Arc::new(InMemoryStore::new()));
        let created = api.create(&database("octavia")).await.unwrap();

        let mut desired = created.clone();
        desired.status.created = true;
        let replaced = api.replace(&desired).await.unwrap();
        assert!(!replaced.status.created);

        let mut reported = replaced.clone();
        reported.status.created = true;
        reported.spec.instance = "other".into();
        let after = api.replace_status(&reported).await.unwrap();
        assert!(after.status.created);
        assert_eq!(after.spec.instance, "openstack");
    }

    #[tokio::test]
    async fn test_get_opt_maps_not_found() {
        let api: Api<Database> = Api::new(Arc::new(InMemoryStore::new()));
        assert!(api
            .get_opt(&ObjectKey::new("ns", "missing"))
            .await
            .unwrap()
            .is_none());
    }

    #[tokio::test]
    async fn test_remove_finalizer() {
        let api: Api<Database> = Api::new(Arc::new(InMemoryStore::new()));
        let mut db = database("octavia");
        db.metadata.finalizers.push("converge.io/topology".into());
        let created = api.create(&db).await.unwrap();

        assert!(api
            .remove_finalizer(&created.key(), "converge.io/topology")
            .await
            .unwrap());
        assert!(!api
            .remove_finalizer(&created.key(), "converge.io/topology")
            .await
            .unwrap());
        assert!(api.get(&created.key()).await.unwrap().metadata.finalizers.is_empty());
    }
}
