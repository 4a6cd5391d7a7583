//! Simulated infrastructure
//!
//! Plays the part of the external operators that act on the child objects a
//! topology declares, so a controller can converge against the in-memory
//! store. Each tick walks the store once and publishes whatever status an
//! operator would have reported by now.

use converge_types::{
    ApiDeployment, ConditionType, Database, DatabaseAccount, ObjectKey, ObjectMeta, Reason,
    Resource, Role, RoleController, Secret, Severity, TransportUrl, WorkloadStatus,
};
use dashmap::DashMap;
use std::collections::BTreeMap;
use std::sync::Arc;

use crate::error::StoreResult;
use crate::stages::PASSWORD_FIELD;
use crate::store::{Api, ResourceStore};

/// Counts of status records written by one tick
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TickReport {
    pub databases: usize,
    pub secrets: usize,
    pub transports: usize,
    pub workloads: usize,
}

impl TickReport {
    pub fn total(&self) -> usize {
        self.databases + self.secrets + self.transports + self.workloads
    }
}

/// Stand-in for database, messaging and workload operators
pub struct InfrastructureSimulator {
    store: Arc<dyn ResourceStore>,
    /// (ready, desired) overrides per role
    role_readiness: DashMap<Role, (u32, u32)>,
}

impl InfrastructureSimulator {
    pub fn new(store: Arc<dyn ResourceStore>) -> Self {
        Self {
            store,
            role_readiness: DashMap::new(),
        }
    }

    /// Holds every role controller of `role` at the given counts
    pub fn set_role_readiness(&self, role: Role, ready: u32, desired: u32) {
        self.role_readiness.insert(role, (ready, desired));
    }

    pub fn clear_role_readiness(&self, role: Role) {
        self.role_readiness.remove(&role);
    }

    fn api<K: Resource>(&self) -> Api<K> {
        Api::new(Arc::clone(&self.store))
    }

    /// Publishes one round of operator progress
    pub async fn tick(&self) -> StoreResult<TickReport> {
        let mut report = TickReport {
            databases: self.provision_databases().await?,
            secrets: self.provision_account_secrets().await?,
            transports: self.provision_transports().await?,
            workloads: 0,
        };
        report.workloads = self.roll_out_api().await? + self.roll_out_roles().await?;

        if report.total() > 0 {
            tracing::debug!(?report, "Simulated infrastructure progressed");
        }
        Ok(report)
    }

    async fn provision_databases(&self) -> StoreResult<usize> {
        let api = self.api::<Database>();
        let mut written = 0;
        for mut database in api.list().await? {
            if database.status.created || database.metadata.is_deleting() {
                continue;
            }
            database.status.created = true;
            database.status.hostname = format!(
                "{}.{}.svc",
                database.spec.instance, database.metadata.namespace
            );
            api.replace_status(&database).await?;
            written += 1;
        }
        Ok(written)
    }

    async fn provision_account_secrets(&self) -> StoreResult<usize> {
        let mut written = 0;
        for account in self.api::<DatabaseAccount>().list().await? {
            if account.spec.secret.is_empty() {
                continue;
            }
            let key = account.metadata.key().sibling(account.spec.secret.clone());
            let password = format!("{}-password", account.spec.user_name);
            if self.ensure_secret(&key, PASSWORD_FIELD, password).await? {
                written += 1;
            }
        }
        Ok(written)
    }

    async fn provision_transports(&self) -> StoreResult<usize> {
        let api = self.api::<TransportUrl>();
        let mut written = 0;
        for mut transport in api.list().await? {
            if !transport.status.secret_name.is_empty() {
                continue;
            }
            let secret_name = format!("rabbitmq-transport-url-{}", transport.metadata.name);
            let key = transport.metadata.key().sibling(secret_name.clone());
            let url = format!("rabbit://{}.svc:5672", transport.spec.cluster);
            self.ensure_secret(&key, "transport_url", url).await?;

            transport.status.secret_name = secret_name;
            api.replace_status(&transport).await?;
            written += 1;
        }
        Ok(written)
    }

    async fn ensure_secret(&self, key: &ObjectKey, field: &str, value: String) -> StoreResult<bool> {
        let api = self.api::<Secret>();
        if api.get_opt(key).await?.is_some() {
            return Ok(false);
        }
        let secret = Secret {
            metadata: ObjectMeta::new(key.namespace.clone(), key.name.clone()),
            data: BTreeMap::from([(field.to_string(), value)]),
        };
        api.create(&secret).await?;
        Ok(true)
    }

    async fn roll_out_api(&self) -> StoreResult<usize> {
        let api = self.api::<ApiDeployment>();
        let mut written = 0;
        for mut deployment in api.list().await? {
            let replicas = deployment.spec.replicas;
            if report_ready(&mut deployment.status, replicas, replicas) {
                api.replace_status(&deployment).await?;
                written += 1;
            }
        }
        Ok(written)
    }

    async fn roll_out_roles(&self) -> StoreResult<usize> {
        let api = self.api::<RoleController>();
        let mut written = 0;
        for mut controller in api.list().await? {
            let (ready, desired) = Role::ALL
                .into_iter()
                .find(|role| role.as_str() == controller.spec.role)
                .and_then(|role| self.role_readiness.get(&role).map(|counts| *counts))
                .unwrap_or((1, 1));
            if report_ready(&mut controller.status, ready, desired) {
                api.replace_status(&controller).await?;
                written += 1;
            }
        }
        Ok(written)
    }
}

/// Updates a workload status in place; returns whether anything changed
fn report_ready(status: &mut WorkloadStatus, ready: u32, desired: u32) -> bool {
    let before = status.clone();
    status.ready_count = ready;
    status.desired_count = desired;
    if ready == desired {
        status
            .conditions
            .mark_true(ConditionType::Ready, "Setup complete");
    } else {
        status.conditions.mark_false(
            ConditionType::Ready,
            Reason::Requested,
            Severity::Info,
            format!("{} of {} replicas ready", ready, desired),
        );
    }
    *status != before
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::InMemoryStore;
    use converge_types::DatabaseSpec;

    #[tokio::test]
    async fn test_tick_creates_databases_once() {
        let store = Arc::new(InMemoryStore::new());
        let simulator = InfrastructureSimulator::new(store.clone());
        let api = Api::<Database>::new(store.clone());
        api.create(&Database {
            metadata: ObjectMeta::new("ns", "octavia"),
            spec: DatabaseSpec {
                instance: "openstack".into(),
                database_name: "octavia".into(),
                account: "octavia".into(),
            },
            ..Default::default()
        })
        .await
        .unwrap();

        let first = simulator.tick().await.unwrap();
        assert_eq!(first.databases, 1);
        let database = api.get(&ObjectKey::new("ns", "octavia")).await.unwrap();
        assert!(database.status.created);
        assert_eq!(database.status.hostname, "openstack.ns.svc");

        let second = simulator.tick().await.unwrap();
        assert_eq!(second.total(), 0);
    }

    #[test]
    fn test_report_ready_is_stable() {
        let mut status = WorkloadStatus::default();
        assert!(report_ready(&mut status, 2, 3));
        assert!(!status.conditions.is_true(ConditionType::Ready));
        assert!(!report_ready(&mut status, 2, 3));
        assert!(report_ready(&mut status, 3, 3));
        assert!(status.conditions.is_true(ConditionType::Ready));
    }
}
