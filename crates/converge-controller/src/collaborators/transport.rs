//! Store-backed transport provisioner

use async_trait::async_trait;
use converge_types::{ObjectKey, OwnerReference, TransportUrl};

use super::{TransportBinding, TransportProvisioner};
use crate::error::CollaboratorResult;
use crate::store::Api;
use crate::upsert::create_or_update;

/// Declares a `TransportUrl` child and reports the secret name its operator
/// publishes in status.
pub struct StoreTransportProvisioner {
    api: Api<TransportUrl>,
}

impl StoreTransportProvisioner {
    pub fn new(api: Api<TransportUrl>) -> Self {
        Self { api }
    }
}

#[async_trait]
impl TransportProvisioner for StoreTransportProvisioner {
    async fn create_or_update(
        &self,
        owner: &OwnerReference,
        key: &ObjectKey,
        cluster: &str,
    ) -> CollaboratorResult<TransportBinding> {
        let (transport, operation) = create_or_update(&self.api, key, Some(owner), |t| {
            t.spec.cluster = cluster.to_string();
        })
        .await?;

        Ok(TransportBinding {
            secret_name: transport.status.secret_name,
            operation,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::InMemoryStore;
    use crate::upsert::Operation;
    use std::sync::Arc;

    #[tokio::test]
    async fn test_binding_reports_secret_once_published() {
        let api: Api<TransportUrl> = Api::new(Arc::new(InMemoryStore::new()));
        let provisioner = StoreTransportProvisioner::new(api.clone());
        let owner = OwnerReference {
            kind: "Topology".into(),
            name: "lb".into(),
            uid: "uid-lb".into(),
            controller: true,
        };
        let key = ObjectKey::new("ns", "lb-transport");

        let binding = provisioner
            .create_or_update(&owner, &key, "rabbitmq")
            .await
            .unwrap();
        assert_eq!(binding.operation, Operation::Created);
        assert!(binding.secret_name.is_empty());

        let mut published = api.get(&key).await.unwrap();
        published.status.secret_name = "rabbitmq-transport-secret".into();
        api.replace_status(&published).await.unwrap();

        let binding = provisioner
            .create_or_update(&owner, &key, "rabbitmq")
            .await
            .unwrap();
        assert_eq!(binding.operation, Operation::Unchanged);
        assert_eq!(binding.secret_name, "rabbitmq-transport-secret");
    }
}
