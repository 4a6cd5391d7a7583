//! Deletion cascade
//!
//! A topology marked for deletion first releases the finalizer it holds on
//! each dependent database and database account. Only once every release
//! succeeded does it drop its own finalizer, which lets the store remove the
//! topology and garbage collect everything it owns.

use converge_types::{Database, DatabaseAccount, ObjectKey, Resource, Topology};
use futures::future::try_join_all;

use crate::context::ControllerContext;
use crate::error::Result;
use crate::naming;
use crate::store::Api;

/// Releases `finalizer` on one dependent; an absent object counts as released
async fn release<K: Resource>(api: &Api<K>, key: &ObjectKey, finalizer: &str) -> Result<bool> {
    match api.remove_finalizer(key, finalizer).await {
        Ok(removed) => {
            if removed {
                tracing::info!(kind = K::KIND, key = %key, "Released finalizer");
            }
            Ok(removed)
        }
        Err(e) if e.is_not_found() => {
            tracing::debug!(kind = K::KIND, key = %key, "Dependent already gone");
            Ok(false)
        }
        Err(e) => Err(e.into()),
    }
}

/// Runs the cascade for `topology`.
///
/// Any failing release aborts the cascade with the topology finalizer still
/// in place, so the next attempt starts over.
pub async fn cascade(ctx: &ControllerContext, topology: &Topology) -> Result<()> {
    let namespace = topology.metadata.namespace.as_str();
    let finalizer = ctx.settings.finalizer.as_str();
    let databases = ctx.api::<Database>();
    let accounts = ctx.api::<DatabaseAccount>();

    let releases = naming::databases(&topology.spec).into_iter().map(|binding| {
        let databases = databases.clone();
        let accounts = accounts.clone();
        async move {
            release(&databases, &binding.key(namespace), finalizer).await?;
            release(&accounts, &binding.account_key(namespace), finalizer).await
        }
    });
    try_join_all(releases).await?;

    let released = release(&ctx.api::<Topology>(), &topology.key(), finalizer).await?;
    tracing::info!(
        topology = %topology.key(),
        released,
        "Deletion cascade complete"
    );
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::collaborators::InMemoryCollaborators;
    use crate::context::ControllerSettings;
    use crate::store::InMemoryStore;
    use converge_types::TopologySpec;
    use std::sync::Arc;

    fn spec() -> TopologySpec {
        TopologySpec {
            database_account: "octavia".into(),
            persistence_database_account: "octavia-persistence".into(),
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn test_cascade_tolerates_missing_dependents() {
        let store = Arc::new(InMemoryStore::new());
        let collaborators = InMemoryCollaborators::new(store.clone()).collaborators();
        let ctx = ControllerContext::new(store.clone(), collaborators, ControllerSettings::default());
        let finalizer = ctx.settings.finalizer.clone();

        let mut topology = Topology::new("ns", "lb", spec());
        topology.metadata.add_finalizer(&finalizer);
        let topology = ctx.api::<Topology>().create(&topology).await.unwrap();

        // only the primary database exists
        let mut database = Database::default();
        database.metadata = converge_types::ObjectMeta::new("ns", "octavia");
        database.metadata.add_finalizer(&finalizer);
        ctx.api::<Database>().create(&database).await.unwrap();

        cascade(&ctx, &topology).await.unwrap();

        let database = ctx
            .api::<Database>()
            .get(&ObjectKey::new("ns", "octavia"))
            .await
            .unwrap();
        assert!(!database.metadata.has_finalizer(&finalizer));
        let topology = ctx.api::<Topology>().get(&topology.key()).await.unwrap();
        assert!(topology.metadata.finalizers.is_empty());
    }
}
