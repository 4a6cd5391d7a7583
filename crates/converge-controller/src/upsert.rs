//! Idempotent upsert of child resources

use converge_types::{ObjectKey, OwnerReference, Resource};
use std::fmt;

use crate::error::StoreResult;
use crate::store::Api;

/// What an upsert did to the stored object
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operation {
    Created,
    Updated,
    Unchanged,
}

impl Operation {
    pub fn is_mutation(&self) -> bool {
        !matches!(self, Operation::Unchanged)
    }
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Operation::Created => write!(f, "created"),
            Operation::Updated => write!(f, "updated"),
            Operation::Unchanged => write!(f, "unchanged"),
        }
    }
}

/// Fetches or initialises the object at `key`, links it to `owner`, applies
/// `mutate` and persists the result only if it differs from what is stored.
///
/// `mutate` sets desired metadata and spec; status changes made by it are not
/// persisted. Persistence errors are returned unmodified. This never waits for
/// the object to become ready.
pub async fn create_or_update<K, F>(
    api: &Api<K>,
    key: &ObjectKey,
    owner: Option<&OwnerReference>,
    mutate: F,
) -> StoreResult<(K, Operation)>
where
    K: Resource,
    F: FnOnce(&mut K),
{
    let current = api.get_opt(key).await?;

    let Some(current) = current else {
        let mut resource = K::default();
        {
            let meta = resource.metadata_mut();
            meta.name = key.name.clone();
            meta.namespace = key.namespace.clone();
            if let Some(owner) = owner {
                meta.set_controller(owner.clone());
            }
        }
        mutate(&mut resource);
        let created = api.create(&resource).await?;
        tracing::info!(kind = K::KIND, object = %key, "Created");
        return Ok((created, Operation::Created));
    };

    let mut desired = current.clone();
    if let Some(owner) = owner {
        desired.metadata_mut().set_controller(owner.clone());
    }
    mutate(&mut desired);

    if desired == current {
        return Ok((current, Operation::Unchanged));
    }

    let updated = api.replace(&desired).await?;
    if updated == current {
        // only status differed, which replace does not persist
        return Ok((current, Operation::Unchanged));
    }
    tracing::info!(kind = K::KIND, object = %key, "Updated");
    Ok((updated, Operation::Updated))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::InMemoryStore;
    use converge_types::{Database, ObjectMeta};
    use std::sync::Arc;

    fn owner() -> OwnerReference {
        OwnerReference {
            kind: "Topology".into(),
            name: "lb".into(),
            uid: "uid-lb".into(),
            controller: true,
        }
    }

    #[tokio::test]
    async fn test_create_then_unchanged_then_updated() {
        let store = Arc::new(InMemoryStore::new());
        let api: Api<Database> = Api::new(store.clone());
        let key = ObjectKey::new("ns", "octavia");

        let (created, op) = create_or_update(&api, &key, Some(&owner()), |db| {
            db.spec.instance = "openstack".into();
        })
        .await
        .unwrap();
        assert_eq!(op, Operation::Created);
        assert!(created.metadata.is_owned_by("uid-lb"));

        let writes = store.mutation_count();
        let (_, op) = create_or_update(&api, &key, Some(&owner()), |db| {
            db.spec.instance = "openstack".into();
        })
        .await
        .unwrap();
        assert_eq!(op, Operation::Unchanged);
        assert_eq!(store.mutation_count(), writes);

        let (updated, op) = create_or_update(&api, &key, Some(&owner()), |db| {
            db.spec.instance = "other".into();
        })
        .await
        .unwrap();
        assert_eq!(op, Operation::Updated);
        assert_eq!(updated.spec.instance, "other");
        assert_eq!(updated.metadata.generation, 2);
    }

    #[tokio::test]
    async fn test_status_only_mutation_is_unchanged() {
        let store = Arc::new(InMemoryStore::new());
        let api: Api<Database> = Api::new(store);
        let key = ObjectKey::new("ns", "octavia");
        api.create(&Database {
            metadata: ObjectMeta::new("ns", "octavia"),
            ..Default::default()
        })
        .await
        .unwrap();

        let (_, op) = create_or_update(&api, &key, None, |db| db.status.created = true)
            .await
            .unwrap();
        assert_eq!(op, Operation::Unchanged);
    }
}
