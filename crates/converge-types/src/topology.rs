//! Declared topology and its status record

use crate::condition::Conditions;
use crate::impl_resource;
use crate::meta::ObjectMeta;
use crate::role::Role;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// The root object: desired configuration plus the controller-owned status
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Topology {
    pub metadata: ObjectMeta,
    pub spec: TopologySpec,
    #[serde(default)]
    pub status: TopologyStatus,
}

impl_resource!(Topology, "Topology");

impl Topology {
    pub fn new(namespace: impl Into<String>, name: impl Into<String>, spec: TopologySpec) -> Self {
        Self {
            metadata: ObjectMeta::new(namespace, name),
            spec,
            status: TopologyStatus::default(),
        }
    }
}

/// Desired configuration of a topology
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TopologySpec {
    /// Database instance hosting both databases
    pub database_instance: String,

    /// Account used by the service database
    pub database_account: String,

    /// Account used by the persistence database
    pub persistence_database_account: String,

    /// Secret holding service credentials
    pub secret: String,

    #[serde(default = "default_service_user")]
    pub service_user: String,

    /// Transport cluster the topology binds to
    pub transport_cluster: String,

    /// Image used by the migration job
    #[serde(default)]
    pub container_image: String,

    #[serde(default)]
    pub tenant_name: String,

    /// Keep completed migration jobs around
    #[serde(default)]
    pub preserve_jobs: bool,

    #[serde(default)]
    pub custom_service_config: String,

    #[serde(default)]
    pub default_config_overwrite: BTreeMap<String, String>,

    #[serde(default)]
    pub node_selector: BTreeMap<String, String>,

    #[serde(default)]
    pub api: ApiSpec,

    #[serde(default)]
    pub health_manager: RoleSpec,

    #[serde(default)]
    pub housekeeping: RoleSpec,

    #[serde(default)]
    pub worker: RoleSpec,

    #[serde(default)]
    pub management_network: ManagementNetworkSpec,

    /// Image reference of the asset uploader; empty disables the asset pipeline
    #[serde(default)]
    pub asset_image: String,
}

fn default_service_user() -> String {
    "octavia".to_string()
}

impl TopologySpec {
    pub fn role(&self, role: Role) -> &RoleSpec {
        match role {
            Role::HealthManager => &self.health_manager,
            Role::Housekeeping => &self.housekeeping,
            Role::Worker => &self.worker,
        }
    }

    /// Database accounts referenced by this spec
    pub fn database_accounts(&self) -> [&str; 2] {
        [&self.database_account, &self.persistence_database_account]
    }
}

/// API workload configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ApiSpec {
    #[serde(default = "default_replicas")]
    pub replicas: u32,

    #[serde(default)]
    pub container_image: String,

    #[serde(default)]
    pub network_attachments: Vec<String>,

    #[serde(default)]
    pub node_selector: BTreeMap<String, String>,

    #[serde(default)]
    pub custom_service_config: String,
}

impl Default for ApiSpec {
    fn default() -> Self {
        Self {
            replicas: default_replicas(),
            container_image: String::new(),
            network_attachments: Vec::new(),
            node_selector: BTreeMap::new(),
            custom_service_config: String::new(),
        }
    }
}

fn default_replicas() -> u32 {
    1
}

/// Worker role configuration
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RoleSpec {
    #[serde(default)]
    pub container_image: String,

    #[serde(default)]
    pub network_attachments: Vec<String>,

    #[serde(default)]
    pub node_selector: BTreeMap<String, String>,

    #[serde(default)]
    pub custom_service_config: String,
}

/// Management network request handed to the network provisioner
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ManagementNetworkSpec {
    #[serde(default)]
    pub cidr: String,

    #[serde(default)]
    pub availability_zones: Vec<String>,
}

/// Controller-owned status record
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TopologyStatus {
    #[serde(default)]
    pub conditions: Conditions,

    /// Last observed content hash per hash key
    #[serde(default)]
    pub hash: BTreeMap<String, String>,

    #[serde(default)]
    pub database_hostname: String,

    #[serde(default)]
    pub transport_secret: String,

    #[serde(default)]
    pub api_ready_count: u32,

    #[serde(default)]
    pub role_ready_counts: BTreeMap<Role, u32>,

    #[serde(default)]
    pub observed_generation: i64,

    /// The asset uploader still has to be removed
    #[serde(default)]
    pub asset_teardown_pending: bool,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::condition::ConditionType;

    const MANIFEST: &str = r#"
metadata:
  name: lb
  namespace: openstack
spec:
  databaseInstance: openstack
  databaseAccount: octavia
  persistenceDatabaseAccount: octavia-persistence
  secret: osp-secret
  transportCluster: rabbitmq
  api:
    replicas: 2
    networkAttachments: [internalapi]
  healthManager:
    networkAttachments: [octavia]
  assetImage: quay.io/example/amphora-image:latest
"#;

    #[test]
    fn test_parse_manifest_with_defaults() {
        let topology: Topology = serde_yaml::from_str(MANIFEST).unwrap();

        assert_eq!(topology.metadata.name, "lb");
        assert_eq!(topology.spec.service_user, "octavia");
        assert_eq!(topology.spec.api.replicas, 2);
        assert_eq!(topology.spec.role(Role::HealthManager).network_attachments, ["octavia"]);
        assert!(topology.spec.worker.network_attachments.is_empty());
        assert!(topology.status.conditions.is_empty());
    }

    #[test]
    fn test_status_round_trips_through_json() {
        let mut status = TopologyStatus::default();
        status.conditions.mark_true(ConditionType::ApiReady, "up");
        status.role_ready_counts.insert(Role::Worker, 3);
        status.hash.insert("input".into(), "abc".into());

        let value = serde_json::to_value(&status).unwrap();
        assert_eq!(value["roleReadyCounts"]["worker"], 3);

        let back: TopologyStatus = serde_json::from_value(value).unwrap();
        assert_eq!(back, status);
    }
}
