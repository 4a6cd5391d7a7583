//! Stage pipeline
//!
//! A reconciliation pass walks an ordered list of stages. Every stage returns
//! a uniform result: continue to the next stage, stop and requeue after a
//! delay, or fail. A failure marks the owning condition False and surfaces the
//! error. Passes always restart from the first stage; idempotent upserts and
//! hash comparisons keep the restart cheap.

use async_trait::async_trait;
use converge_types::{
    ConditionType, Conditions, ObjectKey, OwnerReference, Resource, Topology, TopologyStatus,
    WorkloadStatus,
};
use std::collections::BTreeMap;
use std::fmt;
use std::time::Duration;

use crate::collaborators::ManagementNetwork;
use crate::context::ControllerContext;
use crate::error::Result;
use crate::stages;

/// Named pipeline states, in required order
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum StageName {
    Init,
    CredentialsResolved,
    DatabaseReady,
    ConfigRendered,
    InputHashStable,
    MigrationComplete,
    RbacReady,
    TransportReady,
    NetworkAttachmentsVerified,
    NetworkProvisioned,
    ApiDeployed,
    PrimaryRoleReady,
    DependentRolesDeployed,
    AssetPipelineSettled,
    Converged,
}

impl fmt::Display for StageName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

/// Outcome of a successful stage
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StageResult {
    Continue,
    /// Stop this pass; re-enter no sooner than the given delay
    RequeueAfter(Duration),
}

/// Outcome of a whole pipeline run
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PipelineOutcome {
    /// Every stage continued
    Converged,
    Requeue { stage: StageName, after: Duration },
}

/// State threaded through one pass
///
/// The topology (and so its status record) is the only state a stage may
/// write; everything else here is scratch space that dies with the pass.
#[derive(Debug, Clone)]
pub struct PassState {
    pub topology: Topology,

    /// Content hashes feeding the aggregate input hash
    pub inputs: BTreeMap<String, String>,

    /// Value of the networks annotation for the API workload
    pub networks_annotation: String,

    pub management_network: Option<ManagementNetwork>,

    /// Observed status of the primary role resource
    pub primary_rollout: Option<WorkloadStatus>,
}

impl PassState {
    pub fn new(topology: Topology) -> Self {
        Self {
            topology,
            inputs: BTreeMap::new(),
            networks_annotation: String::new(),
            management_network: None,
            primary_rollout: None,
        }
    }

    pub fn key(&self) -> ObjectKey {
        self.topology.key()
    }

    pub fn name(&self) -> &str {
        &self.topology.metadata.name
    }

    pub fn namespace(&self) -> &str {
        &self.topology.metadata.namespace
    }

    pub fn owner(&self) -> OwnerReference {
        self.topology.owner_reference()
    }

    pub fn status(&self) -> &TopologyStatus {
        &self.topology.status
    }

    pub fn status_mut(&mut self) -> &mut TopologyStatus {
        &mut self.topology.status
    }

    pub fn conditions(&self) -> &Conditions {
        &self.topology.status.conditions
    }

    pub fn conditions_mut(&mut self) -> &mut Conditions {
        &mut self.topology.status.conditions
    }
}

/// One named step of the pipeline
#[async_trait]
pub trait Stage: Send + Sync {
    fn name(&self) -> StageName;

    /// Condition a failure of this stage is reported against
    fn condition(&self) -> ConditionType;

    async fn run(&self, ctx: &ControllerContext, pass: &mut PassState) -> Result<StageResult>;
}

/// Ordered list of stages
pub struct Pipeline {
    stages: Vec<Box<dyn Stage>>,
}

impl Pipeline {
    pub fn new(stages: Vec<Box<dyn Stage>>) -> Self {
        Self { stages }
    }

    /// The full convergence pipeline
    pub fn standard() -> Self {
        Self::new(stages::standard())
    }

    pub fn names(&self) -> Vec<StageName> {
        self.stages.iter().map(|s| s.name()).collect()
    }

    /// Runs the stages in order until one requeues or fails
    pub async fn run(&self, ctx: &ControllerContext, pass: &mut PassState) -> Result<PipelineOutcome> {
        let topology = pass.key();

        for stage in &self.stages {
            let name = stage.name();
            tracing::debug!(topology = %topology, stage = %name, "Entering stage");

            match stage.run(ctx, pass).await {
                Ok(StageResult::Continue) => {
                    tracing::debug!(topology = %topology, stage = %name, "Stage complete");
                }
                Ok(StageResult::RequeueAfter(after)) => {
                    tracing::debug!(
                        topology = %topology,
                        stage = %name,
                        after_ms = after.as_millis() as u64,
                        "Stage requested requeue"
                    );
                    return Ok(PipelineOutcome::Requeue { stage: name, after });
                }
                Err(err) => {
                    let condition = err.condition().unwrap_or_else(|| stage.condition());
                    let message = condition.error_message(&err);
                    pass.conditions_mut()
                        .mark_false(condition, err.reason(), err.severity(), message);
                    tracing::debug!(
                        topology = %topology,
                        stage = %name,
                        condition = %condition,
                        error = %err,
                        "Stage failed"
                    );
                    return Err(err);
                }
            }
        }

        Ok(PipelineOutcome::Converged)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::collaborators::InMemoryCollaborators;
    use crate::context::ControllerSettings;
    use crate::error::ReconcileError;
    use crate::store::InMemoryStore;
    use converge_types::{ConditionStatus, Reason, TopologySpec};
    use std::sync::{Arc, Mutex};

    #[derive(Clone, Copy)]
    enum Scripted {
        Continue,
        Requeue(Duration),
        Fail,
        FailScoped(ConditionType),
    }

    struct Recording {
        name: StageName,
        script: Scripted,
        seen: Arc<Mutex<Vec<StageName>>>,
    }

    #[async_trait]
    impl Stage for Recording {
        fn name(&self) -> StageName {
            self.name
        }

        fn condition(&self) -> ConditionType {
            ConditionType::DbReady
        }

        async fn run(&self, _ctx: &ControllerContext, _pass: &mut PassState) -> Result<StageResult> {
            self.seen.lock().unwrap().push(self.name);
            match self.script {
                Scripted::Continue => Ok(StageResult::Continue),
                Scripted::Requeue(after) => Ok(StageResult::RequeueAfter(after)),
                Scripted::Fail => Err(ReconcileError::InvalidSpec("bad reference".into())),
                Scripted::FailScoped(condition) => {
                    Err(ReconcileError::InvalidSpec("no account".into()).scoped(condition))
                }
            }
        }
    }

    fn context() -> ControllerContext {
        let store = Arc::new(InMemoryStore::new());
        let collaborators = InMemoryCollaborators::new(store.clone()).collaborators();
        ControllerContext::new(store, collaborators, ControllerSettings::default())
    }

    fn pass() -> PassState {
        PassState::new(Topology::new("ns", "lb", TopologySpec::default()))
    }

    fn pipeline(script: &[(StageName, Scripted)]) -> (Pipeline, Arc<Mutex<Vec<StageName>>>) {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let stages = script
            .iter()
            .map(|(name, script)| {
                Box::new(Recording {
                    name: *name,
                    script: *script,
                    seen: seen.clone(),
                }) as Box<dyn Stage>
            })
            .collect();
        (Pipeline::new(stages), seen)
    }

    #[tokio::test]
    async fn test_runs_every_stage_in_order() {
        let (pipeline, seen) = pipeline(&[
            (StageName::Init, Scripted::Continue),
            (StageName::CredentialsResolved, Scripted::Continue),
            (StageName::Converged, Scripted::Continue),
        ]);

        let outcome = pipeline.run(&context(), &mut pass()).await.unwrap();

        assert_eq!(outcome, PipelineOutcome::Converged);
        assert_eq!(
            *seen.lock().unwrap(),
            vec![StageName::Init, StageName::CredentialsResolved, StageName::Converged]
        );
    }

    #[tokio::test]
    async fn test_requeue_short_circuits() {
        let (pipeline, seen) = pipeline(&[
            (StageName::Init, Scripted::Continue),
            (StageName::DatabaseReady, Scripted::Requeue(Duration::from_secs(5))),
            (StageName::Converged, Scripted::Continue),
        ]);

        let outcome = pipeline.run(&context(), &mut pass()).await.unwrap();

        assert_eq!(
            outcome,
            PipelineOutcome::Requeue {
                stage: StageName::DatabaseReady,
                after: Duration::from_secs(5)
            }
        );
        assert_eq!(seen.lock().unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_failure_marks_owning_condition() {
        let (pipeline, seen) = pipeline(&[
            (StageName::DatabaseReady, Scripted::Fail),
            (StageName::Converged, Scripted::Continue),
        ]);
        let mut pass = pass();

        let result = pipeline.run(&context(), &mut pass).await;

        assert!(result.is_err());
        assert_eq!(seen.lock().unwrap().len(), 1);
        let condition = pass.conditions().get(ConditionType::DbReady).unwrap();
        assert_eq!(condition.status, ConditionStatus::False);
        assert_eq!(condition.reason, Reason::Error);
        assert!(condition.message.contains("bad reference"));
    }

    #[tokio::test]
    async fn test_scoped_failure_marks_scoped_condition() {
        let (pipeline, _) = pipeline(&[(
            StageName::DatabaseReady,
            Scripted::FailScoped(ConditionType::DatabaseAccountReady),
        )]);
        let mut pass = pass();

        let _ = pipeline.run(&context(), &mut pass).await;

        assert!(pass.conditions().get(ConditionType::DbReady).is_none());
        assert_eq!(
            pass.conditions().status(ConditionType::DatabaseAccountReady),
            ConditionStatus::False
        );
    }

    #[test]
    fn test_standard_pipeline_order() {
        assert_eq!(
            Pipeline::standard().names(),
            vec![
                StageName::Init,
                StageName::CredentialsResolved,
                StageName::DatabaseReady,
                StageName::ConfigRendered,
                StageName::InputHashStable,
                StageName::MigrationComplete,
                StageName::RbacReady,
                StageName::TransportReady,
                StageName::NetworkAttachmentsVerified,
                StageName::NetworkProvisioned,
                StageName::ApiDeployed,
                StageName::PrimaryRoleReady,
                StageName::DependentRolesDeployed,
                StageName::AssetPipelineSettled,
                StageName::Converged,
            ]
        );
    }
}
