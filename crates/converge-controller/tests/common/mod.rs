#![allow(dead_code)]

use converge_controller::{
    Action, Api, InMemoryCollaborators, InMemoryStore, InfrastructureSimulator, Reconciler,
    ReconcilerBuilder, Result,
};
use converge_types::{ObjectKey, ObjectMeta, Resource, Secret, Topology, TopologySpec};
use std::collections::BTreeMap;
use std::sync::Arc;

pub const NAMESPACE: &str = "openstack";
pub const NAME: &str = "octavia";
pub const ASSET_IMAGE: &str = "quay.io/podified/octavia-amphora-image:current";

pub fn spec() -> TopologySpec {
    let mut spec: TopologySpec = serde_yaml::from_str(
        r#"
databaseInstance: openstack
databaseAccount: octavia
persistenceDatabaseAccount: octavia-persistence
secret: osp-secret
transportCluster: rabbitmq
containerImage: quay.io/podified/octavia-api:current
api:
  replicas: 1
healthManager:
  containerImage: quay.io/podified/octavia-health-manager:current
housekeeping:
  containerImage: quay.io/podified/octavia-housekeeping:current
worker:
  containerImage: quay.io/podified/octavia-worker:current
"#,
    )
    .unwrap();
    spec.tenant_name = "service".into();
    spec
}

/// A controller, its collaborators and the simulated operators around one
/// in-memory store
pub struct Harness {
    pub store: Arc<InMemoryStore>,
    pub collaborators: InMemoryCollaborators,
    pub simulator: InfrastructureSimulator,
    pub reconciler: Reconciler,
    pub key: ObjectKey,
}

impl Harness {
    pub fn new() -> Self {
        Self::with_collaborators(|_| {})
    }

    /// Lets a test swap in-memory collaborators before they are wired
    pub fn with_collaborators(configure: impl FnOnce(&mut InMemoryCollaborators)) -> Self {
        let store = Arc::new(InMemoryStore::new());
        let mut collaborators = InMemoryCollaborators::new(store.clone());
        configure(&mut collaborators);

        let reconciler = ReconcilerBuilder::new()
            .with_store(store.clone())
            .with_collaborators(collaborators.collaborators())
            .build()
            .unwrap();

        Self {
            simulator: InfrastructureSimulator::new(store.clone()),
            store,
            collaborators,
            reconciler,
            key: ObjectKey::new(NAMESPACE, NAME),
        }
    }

    pub fn topologies(&self) -> Api<Topology> {
        Api::new(self.store.clone())
    }

    pub fn api<K: Resource>(&self) -> Api<K> {
        Api::new(self.store.clone())
    }

    pub async fn create_credentials(&self) {
        let secret = Secret {
            metadata: ObjectMeta::new(NAMESPACE, "osp-secret"),
            data: BTreeMap::from([
                ("OctaviaPassword".to_string(), "12345678".to_string()),
                ("ServiceUser".to_string(), "octavia".to_string()),
            ]),
        };
        self.api::<Secret>().create(&secret).await.unwrap();
    }

    pub async fn create_topology(&self, spec: TopologySpec) -> Topology {
        let topology = Topology::new(NAMESPACE, NAME, spec);
        self.topologies().create(&topology).await.unwrap()
    }

    pub async fn topology(&self) -> Topology {
        self.topologies().get(&self.key).await.unwrap()
    }

    pub async fn reconcile(&self) -> Result<Action> {
        self.reconciler.reconcile(&self.key).await
    }

    /// Alternates passes and simulator ticks until a pass waits for a change
    /// and the simulator has nothing left to report. Requeue delays are
    /// skipped and failed passes are retried, as the work queue would.
    pub async fn converge(&self) -> Result<Action> {
        let mut last = Ok(Action::AwaitChange);
        for _ in 0..50 {
            let result = self.reconcile().await;
            let report = self.simulator.tick().await.unwrap();
            if matches!(result, Ok(Action::AwaitChange)) && report.total() == 0 {
                return result;
            }
            last = result;
        }
        last
    }

    /// Like [`Harness::converge`] for passes expected to fail: stops at the
    /// first error.
    pub async fn converge_until_error(&self) -> converge_controller::ReconcileError {
        for _ in 0..50 {
            if let Err(err) = self.reconcile().await {
                return err;
            }
            self.simulator.tick().await.unwrap();
        }
        panic!("topology converged without an error");
    }
}
