//! Child resource kinds owned by a topology
//!
//! Each kind is provisioned by the controller through the idempotent upsert
//! and reconciled further by an external operator that reports back through
//! the kind's status.

use crate::condition::Conditions;
use crate::impl_resource;
use crate::meta::ObjectMeta;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Opaque key/value secret
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Secret {
    pub metadata: ObjectMeta,
    #[serde(default)]
    pub data: BTreeMap<String, String>,
}

impl_resource!(Secret, "Secret");

/// Database login managed by the database operator
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DatabaseAccount {
    pub metadata: ObjectMeta,
    pub spec: DatabaseAccountSpec,
    #[serde(default)]
    pub status: DatabaseAccountStatus,
}

impl_resource!(DatabaseAccount, "DatabaseAccount");

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DatabaseAccountSpec {
    pub user_name: String,
    /// Secret holding the account password
    pub secret: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DatabaseAccountStatus {
    #[serde(default)]
    pub conditions: Conditions,
}

/// Logical database on a database instance
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Database {
    pub metadata: ObjectMeta,
    pub spec: DatabaseSpec,
    #[serde(default)]
    pub status: DatabaseStatus,
}

impl_resource!(Database, "Database");

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DatabaseSpec {
    pub instance: String,
    pub database_name: String,
    pub account: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DatabaseStatus {
    #[serde(default)]
    pub created: bool,
    #[serde(default)]
    pub hostname: String,
}

/// Transport (message queue) binding
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TransportUrl {
    pub metadata: ObjectMeta,
    pub spec: TransportUrlSpec,
    #[serde(default)]
    pub status: TransportUrlStatus,
}

impl_resource!(TransportUrl, "TransportUrl");

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TransportUrlSpec {
    pub cluster: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TransportUrlStatus {
    /// Secret holding the resolved transport URL; empty until provisioned
    #[serde(default)]
    pub secret_name: String,
}

/// Readiness reported by a workload-style child
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WorkloadStatus {
    #[serde(default)]
    pub ready_count: u32,
    #[serde(default)]
    pub desired_count: u32,
    #[serde(default)]
    pub conditions: Conditions,
}

impl WorkloadStatus {
    /// Ready count matches the desired count as observed
    pub fn is_rolled_out(&self) -> bool {
        self.ready_count == self.desired_count
    }
}

/// Shared workload fields of the API and role resources
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WorkloadTemplate {
    pub container_image: String,
    pub service_user: String,
    pub database_hostname: String,
    pub transport_secret: String,
    pub secret: String,
    #[serde(default)]
    pub custom_service_config: String,
    #[serde(default)]
    pub node_selector: BTreeMap<String, String>,
    #[serde(default)]
    pub network_attachments: Vec<String>,
    /// Aggregate input hash; a change restarts the workload
    #[serde(default)]
    pub config_hash: String,
}

/// API workload
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ApiDeployment {
    pub metadata: ObjectMeta,
    pub spec: ApiDeploymentSpec,
    #[serde(default)]
    pub status: WorkloadStatus,
}

impl_resource!(ApiDeployment, "ApiDeployment");

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ApiDeploymentSpec {
    pub replicas: u32,
    #[serde(flatten)]
    pub template: WorkloadTemplate,
}

/// Role controller, one per worker role
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RoleController {
    pub metadata: ObjectMeta,
    pub spec: RoleControllerSpec,
    #[serde(default)]
    pub status: WorkloadStatus,
}

impl_resource!(RoleController, "RoleController");

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RoleControllerSpec {
    pub role: String,
    #[serde(flatten)]
    pub template: WorkloadTemplate,
    /// Management network details handed to the role
    #[serde(default)]
    pub management_network_id: String,
    #[serde(default)]
    pub security_group_id: String,
}

/// Network service exposing a workload
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Service {
    pub metadata: ObjectMeta,
    pub spec: ServiceSpec,
}

impl_resource!(Service, "Service");

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ServiceSpec {
    #[serde(default)]
    pub selector: BTreeMap<String, String>,
    #[serde(default)]
    pub ports: Vec<ServicePort>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ServicePort {
    pub name: String,
    pub port: u16,
    pub target_port: u16,
}
