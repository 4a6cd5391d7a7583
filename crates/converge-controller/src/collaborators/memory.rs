//! In-memory collaborators for simulation and testing.
//!
//! Each implementation records how often it was called so tests can assert
//! that a stage did or did not reach its collaborator.

use async_trait::async_trait;
use converge_types::{ManagementNetworkSpec, ObjectKey, OwnerReference, TransportUrl};
use dashmap::{DashMap, DashSet};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;

use super::{
    AssetImporter, CertificateIssuer, Collaborators, ConfigTemplate, JobOutcome, JobRequest,
    JobRunner, ManagementNetwork, ManifestFetcher, NetworkAttachmentValidator,
    NetworkProvisioner, PolicyRule, QuotaManager, RbacProvisioner, SecretMaterializer,
    SshKeyProvisioner, StoreTransportProvisioner, WorkloadManager, WorkloadSpec, WorkloadState,
};
use crate::assets::AssetManifestEntry;
use crate::error::{CollaboratorError, CollaboratorResult};
use crate::hash::hash_of;
use crate::store::{Api, ResourceStore};

/// Materializer that hashes the templates it is handed
#[derive(Default)]
pub struct InMemoryMaterializer {
    rendered: DashMap<String, String>,
    calls: AtomicUsize,
}

impl InMemoryMaterializer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    /// Hash of the last rendering of the named template
    pub fn rendered(&self, name: &str) -> Option<String> {
        self.rendered.get(name).map(|h| h.clone())
    }
}

#[async_trait]
impl SecretMaterializer for InMemoryMaterializer {
    async fn ensure(
        &self,
        _owner: &OwnerReference,
        templates: &[ConfigTemplate],
    ) -> CollaboratorResult<String> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        for template in templates {
            let hash = hash_of(template).map_err(|e| CollaboratorError::Rejected(e.to_string()))?;
            self.rendered.insert(template.name.clone(), hash);
        }
        hash_of(templates).map_err(|e| CollaboratorError::Rejected(e.to_string()))
    }
}

/// Job runner whose jobs complete after a configurable number of polls
#[derive(Default)]
pub struct InMemoryJobRunner {
    polls_to_complete: AtomicUsize,
    failing: AtomicBool,
    /// Job name to (hash, polls remaining)
    jobs: DashMap<String, (String, usize)>,
    calls: AtomicUsize,
}

impl InMemoryJobRunner {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of polls a job reports running before it completes
    pub fn with_polls_to_complete(self, polls: usize) -> Self {
        self.polls_to_complete.store(polls, Ordering::SeqCst);
        self
    }

    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl JobRunner for InMemoryJobRunner {
    async fn run(
        &self,
        _owner: &OwnerReference,
        request: &JobRequest,
    ) -> CollaboratorResult<JobOutcome> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if self.failing.load(Ordering::SeqCst) {
            return Err(CollaboratorError::Unavailable(format!(
                "job {} failed",
                request.spec.name
            )));
        }

        if request.last_hash.as_deref() == Some(request.hash.as_str()) {
            return Ok(JobOutcome {
                requeue_after: None,
                changed: false,
                hash: request.hash.clone(),
            });
        }

        let polls = self.polls_to_complete.load(Ordering::SeqCst);
        let mut job = self
            .jobs
            .entry(request.spec.name.clone())
            .or_insert_with(|| (request.hash.clone(), polls));
        if job.0 != request.hash {
            *job = (request.hash.clone(), polls);
        }

        if job.1 > 0 {
            job.1 -= 1;
            return Ok(JobOutcome {
                requeue_after: Some(request.poll_interval),
                changed: false,
                hash: request.hash.clone(),
            });
        }

        Ok(JobOutcome {
            requeue_after: None,
            changed: true,
            hash: request.hash.clone(),
        })
    }
}

/// Workload manager tracking workloads in memory
pub struct InMemoryWorkloadManager {
    workloads: DashMap<ObjectKey, WorkloadState>,
    auto_ready: AtomicBool,
    fail_deletes: AtomicBool,
    applies: AtomicUsize,
    deletes: AtomicUsize,
}

impl InMemoryWorkloadManager {
    pub fn new() -> Self {
        Self {
            workloads: DashMap::new(),
            auto_ready: AtomicBool::new(true),
            fail_deletes: AtomicBool::new(false),
            applies: AtomicUsize::new(0),
            deletes: AtomicUsize::new(0),
        }
    }

    /// When set, workloads report every replica ready as soon as they exist
    pub fn set_auto_ready(&self, auto_ready: bool) {
        self.auto_ready.store(auto_ready, Ordering::SeqCst);
    }

    pub fn set_ready(&self, key: &ObjectKey, ready: u32) {
        if let Some(mut state) = self.workloads.get_mut(key) {
            state.ready_count = ready;
        }
    }

    pub fn set_fail_deletes(&self, fail: bool) {
        self.fail_deletes.store(fail, Ordering::SeqCst);
    }

    pub fn contains(&self, key: &ObjectKey) -> bool {
        self.workloads.contains_key(key)
    }

    pub fn calls(&self) -> usize {
        self.applies.load(Ordering::SeqCst) + self.deletes.load(Ordering::SeqCst)
    }
}

impl Default for InMemoryWorkloadManager {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl WorkloadManager for InMemoryWorkloadManager {
    async fn create_or_patch(
        &self,
        _owner: &OwnerReference,
        spec: &WorkloadSpec,
    ) -> CollaboratorResult<WorkloadState> {
        self.applies.fetch_add(1, Ordering::SeqCst);
        let auto_ready = self.auto_ready.load(Ordering::SeqCst);

        let mut state = self.workloads.entry(spec.key()).or_default();
        state.desired_count = spec.replicas;
        if auto_ready {
            state.ready_count = spec.replicas;
        }
        Ok(*state)
    }

    async fn delete(&self, key: &ObjectKey) -> CollaboratorResult<bool> {
        self.deletes.fetch_add(1, Ordering::SeqCst);
        if self.fail_deletes.load(Ordering::SeqCst) {
            return Err(CollaboratorError::Unavailable(format!(
                "cannot delete workload {}",
                key
            )));
        }
        Ok(self.workloads.remove(key).is_some())
    }
}

/// Validator answering from a fixed set of attachment names
#[derive(Default)]
pub struct StaticAttachmentValidator {
    attachments: DashSet<String>,
    calls: AtomicUsize,
}

impl StaticAttachmentValidator {
    pub fn new<I, S>(attachments: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            attachments: attachments.into_iter().map(Into::into).collect(),
            calls: AtomicUsize::new(0),
        }
    }

    pub fn add(&self, name: impl Into<String>) {
        self.attachments.insert(name.into());
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl NetworkAttachmentValidator for StaticAttachmentValidator {
    async fn exists(&self, _namespace: &str, name: &str) -> CollaboratorResult<bool> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(self.attachments.contains(name))
    }
}

/// RBAC provisioner recording the service accounts it was asked for
#[derive(Default)]
pub struct InMemoryRbacProvisioner {
    service_accounts: DashSet<String>,
    calls: AtomicUsize,
}

impl InMemoryRbacProvisioner {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn has_service_account(&self, name: &str) -> bool {
        self.service_accounts.contains(name)
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl RbacProvisioner for InMemoryRbacProvisioner {
    async fn reconcile(
        &self,
        _owner: &OwnerReference,
        service_account: &str,
        rules: &[PolicyRule],
    ) -> CollaboratorResult<Option<std::time::Duration>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if rules.is_empty() {
            return Err(CollaboratorError::Rejected(format!(
                "no rules for service account {}",
                service_account
            )));
        }
        self.service_accounts.insert(service_account.to_string());
        Ok(None)
    }
}

/// Network provisioner deriving ids from the topology name
#[derive(Default)]
pub struct StaticNetworkProvisioner {
    calls: AtomicUsize,
}

impl StaticNetworkProvisioner {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl NetworkProvisioner for StaticNetworkProvisioner {
    async fn ensure_management_network(
        &self,
        topology: &ObjectKey,
        tenant: &str,
        _spec: &ManagementNetworkSpec,
    ) -> CollaboratorResult<ManagementNetwork> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let prefix = if tenant.is_empty() {
            topology.name.as_str()
        } else {
            tenant
        };
        Ok(ManagementNetwork {
            network_id: format!("{}-mgmt-net", prefix),
            security_group_id: format!("{}-mgmt-sg", prefix),
        })
    }
}

/// Records the topologies an in-memory provisioner was asked to serve and
/// fails on demand
#[derive(Default)]
struct Ledger {
    served: DashSet<ObjectKey>,
    failing: AtomicBool,
    calls: AtomicUsize,
}

impl Ledger {
    fn serve(&self, topology: &ObjectKey, what: &str) -> CollaboratorResult<()> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if self.failing.load(Ordering::SeqCst) {
            return Err(CollaboratorError::Unavailable(format!(
                "{} for {} unavailable",
                what, topology
            )));
        }
        self.served.insert(topology.clone());
        Ok(())
    }
}

/// Certificate issuer recording the topologies it issued for
#[derive(Default)]
pub struct InMemoryCertificateIssuer {
    ledger: Ledger,
}

impl InMemoryCertificateIssuer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_failing(&self, failing: bool) {
        self.ledger.failing.store(failing, Ordering::SeqCst);
    }

    pub fn issued_for(&self, topology: &ObjectKey) -> bool {
        self.ledger.served.contains(topology)
    }

    pub fn calls(&self) -> usize {
        self.ledger.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl CertificateIssuer for InMemoryCertificateIssuer {
    async fn ensure_certificates(
        &self,
        _owner: &OwnerReference,
        topology: &ObjectKey,
    ) -> CollaboratorResult<()> {
        self.ledger.serve(topology, "certificate authority")
    }
}

/// Quota manager recording the tenants whose quotas it raised
#[derive(Default)]
pub struct InMemoryQuotaManager {
    ledger: Ledger,
    tenants: DashSet<String>,
}

impl InMemoryQuotaManager {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_failing(&self, failing: bool) {
        self.ledger.failing.store(failing, Ordering::SeqCst);
    }

    pub fn has_tenant(&self, tenant: &str) -> bool {
        self.tenants.contains(tenant)
    }

    pub fn calls(&self) -> usize {
        self.ledger.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl QuotaManager for InMemoryQuotaManager {
    async fn ensure_quotas(&self, topology: &ObjectKey, tenant: &str) -> CollaboratorResult<()> {
        self.ledger.serve(topology, "quota service")?;
        self.tenants.insert(tenant.to_string());
        Ok(())
    }
}

/// SSH key provisioner recording the topologies it configured
#[derive(Default)]
pub struct InMemorySshKeyProvisioner {
    ledger: Ledger,
}

impl InMemorySshKeyProvisioner {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_failing(&self, failing: bool) {
        self.ledger.failing.store(failing, Ordering::SeqCst);
    }

    pub fn configured(&self, topology: &ObjectKey) -> bool {
        self.ledger.served.contains(topology)
    }

    pub fn calls(&self) -> usize {
        self.ledger.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl SshKeyProvisioner for InMemorySshKeyProvisioner {
    async fn ensure_ssh_config(
        &self,
        _owner: &OwnerReference,
        topology: &ObjectKey,
    ) -> CollaboratorResult<()> {
        self.ledger.serve(topology, "key pair service")
    }
}

/// Asset importer that records what it imported
pub struct InMemoryAssetImporter {
    imported: DashMap<String, AssetManifestEntry>,
    complete: AtomicBool,
    calls: AtomicUsize,
}

impl InMemoryAssetImporter {
    pub fn new() -> Self {
        Self {
            imported: DashMap::new(),
            complete: AtomicBool::new(true),
            calls: AtomicUsize::new(0),
        }
    }

    /// Whether the next import reports completion
    pub fn set_complete(&self, complete: bool) {
        self.complete.store(complete, Ordering::SeqCst);
    }

    pub fn imported(&self, name: &str) -> Option<AssetManifestEntry> {
        self.imported.get(name).map(|e| e.clone())
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

impl Default for InMemoryAssetImporter {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl AssetImporter for InMemoryAssetImporter {
    async fn ensure_imported(&self, entries: &[AssetManifestEntry]) -> CollaboratorResult<bool> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        for entry in entries {
            self.imported.insert(entry.name.clone(), entry.clone());
        }
        Ok(self.complete.load(Ordering::SeqCst))
    }
}

/// Fetcher serving fixed bodies by URL
#[derive(Default)]
pub struct StaticManifestFetcher {
    bodies: DashMap<String, String>,
    calls: AtomicUsize,
}

impl StaticManifestFetcher {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn serve(&self, url: impl Into<String>, body: impl Into<String>) {
        self.bodies.insert(url.into(), body.into());
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ManifestFetcher for StaticManifestFetcher {
    async fn fetch(&self, url: &str) -> CollaboratorResult<String> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.bodies
            .get(url)
            .map(|body| body.clone())
            .ok_or_else(|| CollaboratorError::Unavailable(format!("nothing served at {}", url)))
    }
}

/// Concrete in-memory collaborators, kept addressable for inspection
#[derive(Clone)]
pub struct InMemoryCollaborators {
    pub materializer: Arc<InMemoryMaterializer>,
    pub jobs: Arc<InMemoryJobRunner>,
    pub workloads: Arc<InMemoryWorkloadManager>,
    pub attachments: Arc<StaticAttachmentValidator>,
    pub rbac: Arc<InMemoryRbacProvisioner>,
    pub transport: Arc<StoreTransportProvisioner>,
    pub network: Arc<StaticNetworkProvisioner>,
    pub certificates: Arc<InMemoryCertificateIssuer>,
    pub quotas: Arc<InMemoryQuotaManager>,
    pub ssh: Arc<InMemorySshKeyProvisioner>,
    pub assets: Arc<InMemoryAssetImporter>,
    pub fetcher: Arc<StaticManifestFetcher>,
}

impl InMemoryCollaborators {
    /// Transport bindings are declared in `store`
    pub fn new(store: Arc<dyn ResourceStore>) -> Self {
        Self {
            materializer: Arc::new(InMemoryMaterializer::new()),
            jobs: Arc::new(InMemoryJobRunner::new()),
            workloads: Arc::new(InMemoryWorkloadManager::new()),
            attachments: Arc::new(StaticAttachmentValidator::default()),
            rbac: Arc::new(InMemoryRbacProvisioner::new()),
            transport: Arc::new(StoreTransportProvisioner::new(Api::<TransportUrl>::new(store))),
            network: Arc::new(StaticNetworkProvisioner::new()),
            certificates: Arc::new(InMemoryCertificateIssuer::new()),
            quotas: Arc::new(InMemoryQuotaManager::new()),
            ssh: Arc::new(InMemorySshKeyProvisioner::new()),
            assets: Arc::new(InMemoryAssetImporter::new()),
            fetcher: Arc::new(StaticManifestFetcher::new()),
        }
    }

    pub fn collaborators(&self) -> Collaborators {
        Collaborators {
            materializer: self.materializer.clone(),
            jobs: self.jobs.clone(),
            workloads: self.workloads.clone(),
            attachments: self.attachments.clone(),
            rbac: self.rbac.clone(),
            transport: self.transport.clone(),
            network: self.network.clone(),
            certificates: self.certificates.clone(),
            quotas: self.quotas.clone(),
            ssh: self.ssh.clone(),
            assets: self.assets.clone(),
            fetcher: self.fetcher.clone(),
        }
    }

    /// Calls made to the asset pipeline's collaborators
    pub fn asset_calls(&self) -> usize {
        self.workloads.calls() + self.fetcher.calls() + self.assets.calls()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use super::super::JobSpec;
    use std::collections::BTreeMap;
    use std::time::Duration;

    fn owner() -> OwnerReference {
        OwnerReference {
            kind: "Topology".into(),
            name: "lb".into(),
            uid: "uid".into(),
            controller: true,
        }
    }

    fn request(hash: &str, last: Option<&str>) -> JobRequest {
        JobRequest {
            spec: JobSpec {
                name: "lb-db-sync".into(),
                namespace: "ns".into(),
                image: "img".into(),
                command: vec!["sync".into()],
                env: BTreeMap::new(),
                labels: BTreeMap::new(),
                service_account: "lb".into(),
            },
            hash_key: "migration".into(),
            hash: hash.into(),
            last_hash: last.map(str::to_string),
            preserve_completed: false,
            poll_interval: Duration::from_secs(5),
        }
    }

    #[tokio::test]
    async fn test_job_runs_until_complete() {
        let runner = InMemoryJobRunner::new().with_polls_to_complete(1);

        let first = runner.run(&owner(), &request("h1", None)).await.unwrap();
        assert_eq!(first.requeue_after, Some(Duration::from_secs(5)));
        assert!(!first.changed);

        let second = runner.run(&owner(), &request("h1", None)).await.unwrap();
        assert_eq!(second.requeue_after, None);
        assert!(second.changed);

        let settled = runner.run(&owner(), &request("h1", Some("h1"))).await.unwrap();
        assert!(!settled.changed);
    }

    #[tokio::test]
    async fn test_workload_readiness_follows_auto_ready() {
        let manager = InMemoryWorkloadManager::new();
        manager.set_auto_ready(false);
        let spec = WorkloadSpec {
            name: "uploader".into(),
            namespace: "ns".into(),
            image: "img".into(),
            replicas: 1,
            container_port: 8080,
            labels: BTreeMap::new(),
        };

        let state = manager.create_or_patch(&owner(), &spec).await.unwrap();
        assert_eq!(state.ready_count, 0);
        assert_eq!(state.desired_count, 1);

        manager.set_ready(&spec.key(), 1);
        let state = manager.create_or_patch(&owner(), &spec).await.unwrap();
        assert_eq!(state.ready_count, 1);

        assert!(manager.delete(&spec.key()).await.unwrap());
        assert!(!manager.delete(&spec.key()).await.unwrap());
    }

    #[tokio::test]
    async fn test_materializer_hash_tracks_content() {
        let materializer = InMemoryMaterializer::new();
        let mut template = ConfigTemplate {
            name: "lb-config-data".into(),
            namespace: "ns".into(),
            kind: super::super::TemplateKind::Config,
            custom_data: BTreeMap::new(),
            parameters: BTreeMap::new(),
            labels: BTreeMap::new(),
        };

        let first = materializer.ensure(&owner(), &[template.clone()]).await.unwrap();
        let again = materializer.ensure(&owner(), &[template.clone()]).await.unwrap();
        template.custom_data.insert("custom.conf".into(), "[DEFAULT]".into());
        let changed = materializer.ensure(&owner(), &[template]).await.unwrap();

        assert_eq!(first, again);
        assert_ne!(first, changed);
        assert_eq!(materializer.calls(), 3);
    }

    #[tokio::test]
    async fn test_quota_manager_fails_on_demand() {
        let quotas = InMemoryQuotaManager::new();
        let topology = ObjectKey::new("ns", "lb");

        quotas.set_failing(true);
        let err = quotas.ensure_quotas(&topology, "service").await.unwrap_err();
        assert!(!err.is_not_found());
        assert!(!quotas.has_tenant("service"));

        quotas.set_failing(false);
        quotas.ensure_quotas(&topology, "service").await.unwrap();
        assert!(quotas.has_tenant("service"));
        assert_eq!(quotas.calls(), 2);
    }
}
