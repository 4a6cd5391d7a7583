//! External collaborator contracts
//!
//! The controller never provisions these concerns itself. It calls the
//! narrow contracts below and interprets their results.

mod http;
mod memory;
mod transport;

pub use http::HttpManifestFetcher;
pub use memory::{
    InMemoryAssetImporter, InMemoryCertificateIssuer, InMemoryCollaborators, InMemoryJobRunner,
    InMemoryMaterializer, InMemoryQuotaManager, InMemoryRbacProvisioner,
    InMemorySshKeyProvisioner, InMemoryWorkloadManager, StaticAttachmentValidator,
    StaticManifestFetcher, StaticNetworkProvisioner,
};
pub use transport::StoreTransportProvisioner;

use async_trait::async_trait;
use converge_types::{ManagementNetworkSpec, ObjectKey, OwnerReference};
use serde::Serialize;
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use crate::assets::AssetManifestEntry;
use crate::error::CollaboratorResult;
use crate::upsert::Operation;

/// What a rendered template is used for
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum TemplateKind {
    Scripts,
    Config,
}

/// One secret or config map to render
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ConfigTemplate {
    pub name: String,
    pub namespace: String,
    pub kind: TemplateKind,
    /// Verbatim files added next to the rendered ones
    pub custom_data: BTreeMap<String, String>,
    /// Values substituted into the templates
    pub parameters: BTreeMap<String, String>,
    pub labels: BTreeMap<String, String>,
}

/// Renders secrets and config maps from templates
#[async_trait]
pub trait SecretMaterializer: Send + Sync {
    /// Ensures every template is rendered and stored; returns a hash over the
    /// rendered content.
    async fn ensure(
        &self,
        owner: &OwnerReference,
        templates: &[ConfigTemplate],
    ) -> CollaboratorResult<String>;
}

/// A one-shot batch job
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct JobSpec {
    pub name: String,
    pub namespace: String,
    pub image: String,
    pub command: Vec<String>,
    pub env: BTreeMap<String, String>,
    pub labels: BTreeMap<String, String>,
    pub service_account: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct JobRequest {
    pub spec: JobSpec,
    pub hash_key: String,
    /// Hash of the inputs this run stands for
    pub hash: String,
    /// Hash of the last completed run, if any
    pub last_hash: Option<String>,
    pub preserve_completed: bool,
    pub poll_interval: Duration,
}

#[derive(Debug, Clone, PartialEq)]
pub struct JobOutcome {
    /// Set while the job is still running
    pub requeue_after: Option<Duration>,
    /// The job ran to completion for a new hash
    pub changed: bool,
    pub hash: String,
}

/// Runs one-shot jobs and tracks their completion
#[async_trait]
pub trait JobRunner: Send + Sync {
    async fn run(&self, owner: &OwnerReference, request: &JobRequest)
        -> CollaboratorResult<JobOutcome>;
}

/// Desired state of a long-running workload
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct WorkloadSpec {
    pub name: String,
    pub namespace: String,
    pub image: String,
    pub replicas: u32,
    pub container_port: u16,
    pub labels: BTreeMap<String, String>,
}

impl WorkloadSpec {
    pub fn key(&self) -> ObjectKey {
        ObjectKey::new(self.namespace.clone(), self.name.clone())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct WorkloadState {
    pub requeue_after: Option<Duration>,
    pub ready_count: u32,
    pub desired_count: u32,
}

/// Deployment lifecycle management
#[async_trait]
pub trait WorkloadManager: Send + Sync {
    async fn create_or_patch(
        &self,
        owner: &OwnerReference,
        spec: &WorkloadSpec,
    ) -> CollaboratorResult<WorkloadState>;

    /// Deletes the workload; `false` when it did not exist
    async fn delete(&self, key: &ObjectKey) -> CollaboratorResult<bool>;
}

/// Checks that a network attachment definition exists
#[async_trait]
pub trait NetworkAttachmentValidator: Send + Sync {
    async fn exists(&self, namespace: &str, name: &str) -> CollaboratorResult<bool>;
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PolicyRule {
    pub api_groups: Vec<String>,
    pub resources: Vec<String>,
    pub resource_names: Vec<String>,
    pub verbs: Vec<String>,
}

/// Provisions the service account, role and role binding of a topology
#[async_trait]
pub trait RbacProvisioner: Send + Sync {
    /// Returns a requeue delay while provisioning is still in progress
    async fn reconcile(
        &self,
        owner: &OwnerReference,
        service_account: &str,
        rules: &[PolicyRule],
    ) -> CollaboratorResult<Option<Duration>>;
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransportBinding {
    /// Secret holding the transport URL; empty until provisioned
    pub secret_name: String,
    pub operation: Operation,
}

/// Transport (message queue) provisioning
#[async_trait]
pub trait TransportProvisioner: Send + Sync {
    async fn create_or_update(
        &self,
        owner: &OwnerReference,
        key: &ObjectKey,
        cluster: &str,
    ) -> CollaboratorResult<TransportBinding>;
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ManagementNetwork {
    pub network_id: String,
    pub security_group_id: String,
}

/// Provisions the management network the roles attach to
#[async_trait]
pub trait NetworkProvisioner: Send + Sync {
    async fn ensure_management_network(
        &self,
        topology: &ObjectKey,
        tenant: &str,
        spec: &ManagementNetworkSpec,
    ) -> CollaboratorResult<ManagementNetwork>;
}

/// Issues the CA and client certificates the worker roles present to the
/// instances they manage
#[async_trait]
pub trait CertificateIssuer: Send + Sync {
    async fn ensure_certificates(
        &self,
        owner: &OwnerReference,
        topology: &ObjectKey,
    ) -> CollaboratorResult<()>;
}

/// Raises the service tenant's compute and network quotas
#[async_trait]
pub trait QuotaManager: Send + Sync {
    async fn ensure_quotas(&self, topology: &ObjectKey, tenant: &str) -> CollaboratorResult<()>;
}

/// Publishes the SSH key pair used to log into managed instances for
/// debugging
#[async_trait]
pub trait SshKeyProvisioner: Send + Sync {
    async fn ensure_ssh_config(
        &self,
        owner: &OwnerReference,
        topology: &ObjectKey,
    ) -> CollaboratorResult<()>;
}

/// Imports fetched assets into the image service
#[async_trait]
pub trait AssetImporter: Send + Sync {
    /// `true` once every entry is imported
    async fn ensure_imported(&self, entries: &[AssetManifestEntry]) -> CollaboratorResult<bool>;
}

/// One GET returning a text body
#[async_trait]
pub trait ManifestFetcher: Send + Sync {
    async fn fetch(&self, url: &str) -> CollaboratorResult<String>;
}

/// Every collaborator the pipeline calls
#[derive(Clone)]
pub struct Collaborators {
    pub materializer: Arc<dyn SecretMaterializer>,
    pub jobs: Arc<dyn JobRunner>,
    pub workloads: Arc<dyn WorkloadManager>,
    pub attachments: Arc<dyn NetworkAttachmentValidator>,
    pub rbac: Arc<dyn RbacProvisioner>,
    pub transport: Arc<dyn TransportProvisioner>,
    pub network: Arc<dyn NetworkProvisioner>,
    pub certificates: Arc<dyn CertificateIssuer>,
    pub quotas: Arc<dyn QuotaManager>,
    pub ssh: Arc<dyn SshKeyProvisioner>,
    pub assets: Arc<dyn AssetImporter>,
    pub fetcher: Arc<dyn ManifestFetcher>,
}
