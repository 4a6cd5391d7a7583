//! Declared objects loaded at startup
//!
//! A manifest is a YAML (or JSON) document listing the topologies to manage
//! and the secrets they reference.

use converge_controller::{Api, ResourceStore};
use converge_types::{Resource, Secret, Topology};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::sync::Arc;

use crate::error::{DaemonError, DaemonResult};

/// Objects declared up front
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Manifest {
    #[serde(default)]
    pub secrets: Vec<Secret>,

    #[serde(default)]
    pub topologies: Vec<Topology>,
}

impl Manifest {
    pub fn parse(content: &str) -> DaemonResult<Self> {
        let manifest: Manifest =
            serde_yaml::from_str(content).map_err(|e| DaemonError::Manifest(e.to_string()))?;
        manifest.validate()?;
        Ok(manifest)
    }

    pub async fn load(path: impl AsRef<Path>) -> DaemonResult<Self> {
        let content = tokio::fs::read_to_string(path.as_ref()).await?;
        Self::parse(&content)
    }

    fn validate(&self) -> DaemonResult<()> {
        let keys = self
            .secrets
            .iter()
            .map(|s| (Secret::KIND, s.key()))
            .chain(self.topologies.iter().map(|t| (Topology::KIND, t.key())));

        for (kind, key) in keys {
            if key.name.is_empty() || key.namespace.is_empty() {
                return Err(DaemonError::Manifest(format!(
                    "{} without name or namespace",
                    kind
                )));
            }
        }
        Ok(())
    }

    /// Creates every declared object; objects already present are left alone
    pub async fn apply(&self, store: Arc<dyn ResourceStore>) -> DaemonResult<usize> {
        let mut created = 0;
        created += create_missing(&Api::<Secret>::new(store.clone()), &self.secrets).await?;
        created += create_missing(&Api::<Topology>::new(store), &self.topologies).await?;
        tracing::info!(
            secrets = self.secrets.len(),
            topologies = self.topologies.len(),
            created,
            "Manifest applied"
        );
        Ok(created)
    }
}

async fn create_missing<K: Resource>(api: &Api<K>, objects: &[K]) -> DaemonResult<usize> {
    let mut created = 0;
    for object in objects {
        if api.get_opt(&object.key()).await?.is_some() {
            tracing::debug!(kind = K::KIND, key = %object.key(), "Already present");
            continue;
        }
        api.create(object).await?;
        created += 1;
    }
    Ok(created)
}

#[cfg(test)]
mod tests {
    use super::*;
    use converge_controller::InMemoryStore;

    const MANIFEST: &str = r#"
secrets:
  - metadata:
      name: osp-secret
      namespace: openstack
    data:
      OctaviaPassword: "12345678"
topologies:
  - metadata:
      name: octavia
      namespace: openstack
    spec:
      databaseInstance: openstack
      databaseAccount: octavia
      persistenceDatabaseAccount: octavia-persistence
      secret: osp-secret
      transportCluster: rabbitmq
"#;

    #[test]
    fn test_parse_manifest() {
        let manifest = Manifest::parse(MANIFEST).unwrap();
        assert_eq!(manifest.secrets.len(), 1);
        assert_eq!(manifest.topologies[0].spec.service_user, "octavia");
        assert_eq!(manifest.topologies[0].spec.api.replicas, 1);
    }

    #[test]
    fn test_reject_unnamed_objects() {
        let result = Manifest::parse(
            "topologies:\n  - metadata:\n      name: \"\"\n      namespace: openstack\n    spec:\n      databaseInstance: a\n      databaseAccount: b\n      persistenceDatabaseAccount: c\n      secret: d\n      transportCluster: e\n",
        );
        assert!(matches!(result, Err(DaemonError::Manifest(_))));
    }

    #[tokio::test]
    async fn test_apply_is_repeatable() {
        let store = Arc::new(InMemoryStore::new());
        let manifest = Manifest::parse(MANIFEST).unwrap();

        assert_eq!(manifest.apply(store.clone()).await.unwrap(), 2);
        assert_eq!(manifest.apply(store.clone()).await.unwrap(), 0);
        assert_eq!(store.len(), 2);
    }

    #[tokio::test]
    async fn test_load_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("topologies.yaml");
        tokio::fs::write(&path, MANIFEST).await.unwrap();

        let manifest = Manifest::load(&path).await.unwrap();
        assert_eq!(manifest.topologies.len(), 1);
    }
}
