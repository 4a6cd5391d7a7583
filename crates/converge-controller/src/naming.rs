//! Names and labels of the objects a topology owns

use converge_types::{ObjectKey, TopologySpec};
use std::collections::BTreeMap;

pub const SERVICE_LABEL: &str = "service";
pub const COMPONENT_LABEL: &str = "component";

/// Annotation carrying the network attachments of a workload
pub const NETWORKS_ANNOTATION: &str = "k8s.v1.cni.cncf.io/networks";

/// A database and the account it is accessed with
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DatabaseBinding {
    /// Store name of the database object
    pub resource: String,
    /// Name of the database on the instance
    pub database_name: String,
    pub account: String,
}

impl DatabaseBinding {
    pub fn key(&self, namespace: &str) -> ObjectKey {
        ObjectKey::new(namespace, self.resource.clone())
    }

    pub fn account_key(&self, namespace: &str) -> ObjectKey {
        ObjectKey::new(namespace, self.account.clone())
    }
}

/// The primary and persistence databases, primary first
pub fn databases(spec: &TopologySpec) -> [DatabaseBinding; 2] {
    [
        DatabaseBinding {
            resource: "octavia".to_string(),
            database_name: "octavia".to_string(),
            account: spec.database_account.clone(),
        },
        DatabaseBinding {
            resource: "octavia-persistence".to_string(),
            database_name: "octavia_persistence".to_string(),
            account: spec.persistence_database_account.clone(),
        },
    ]
}

pub fn account_secret(account: &str) -> String {
    format!("{}-db-secret", account)
}

pub fn scripts(topology: &str) -> String {
    format!("{}-scripts", topology)
}

pub fn config_data(topology: &str) -> String {
    format!("{}-config-data", topology)
}

pub fn migration_job(topology: &str) -> String {
    format!("{}-db-sync", topology)
}

pub fn service_account(topology: &str) -> String {
    format!("octavia-{}", topology)
}

pub fn transport(topology: &str) -> String {
    format!("{}-transport", topology)
}

pub fn api(topology: &str) -> String {
    format!("{}-api", topology)
}

pub fn asset_uploader(topology: &str) -> String {
    format!("{}-asset-uploader", topology)
}

pub fn asset_uploader_service(topology: &str) -> String {
    format!("{}-asset-uploader-internal", topology)
}

/// Labels shared by every object of a topology component
pub fn labels(topology: &str, component: &str) -> BTreeMap<String, String> {
    [
        (SERVICE_LABEL.to_string(), topology.to_string()),
        (COMPONENT_LABEL.to_string(), component.to_string()),
    ]
    .into_iter()
    .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_database_bindings_follow_spec_accounts() {
        let spec = TopologySpec {
            database_account: "octavia".into(),
            persistence_database_account: "octavia-persistence".into(),
            ..Default::default()
        };

        let [primary, persistence] = databases(&spec);
        assert_eq!(primary.account, "octavia");
        assert_eq!(persistence.database_name, "octavia_persistence");
        assert_eq!(
            persistence.key("ns"),
            ObjectKey::new("ns", "octavia-persistence")
        );
    }

    #[test]
    fn test_uploader_names() {
        assert_eq!(asset_uploader("lb"), "lb-asset-uploader");
        assert_eq!(asset_uploader_service("lb"), "lb-asset-uploader-internal");
    }
}
