//! Topology dispatcher
//!
//! Entry point of one reconciliation pass: fetches the declared topology,
//! initialises its condition ledger, handles the finalizer and the deletion
//! path, runs the stage pipeline and persists the status record.

use converge_types::{ConditionType, Conditions, ObjectKey, Topology};
use std::time::Duration;
use tracing::{debug, error, info, instrument};

use crate::context::ControllerContext;
use crate::deletion;
use crate::error::Result;
use crate::pipeline::{PassState, Pipeline, PipelineOutcome};
use crate::store::Api;

/// What the caller should do after a pass
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Action {
    /// Run another pass after the delay
    Requeue(Duration),
    /// Nothing to do until the topology or one of its children changes
    AwaitChange,
}

/// Drives reconciliation passes for topologies
pub struct Reconciler {
    ctx: ControllerContext,
    pipeline: Pipeline,
    topologies: Api<Topology>,
}

impl Reconciler {
    pub fn new(ctx: ControllerContext, pipeline: Pipeline) -> Self {
        let topologies = ctx.api::<Topology>();
        Self {
            ctx,
            pipeline,
            topologies,
        }
    }

    pub fn context(&self) -> &ControllerContext {
        &self.ctx
    }

    pub fn topologies(&self) -> &Api<Topology> {
        &self.topologies
    }

    /// Runs one pass for the topology at `key`
    #[instrument(skip(self), fields(topology = %key))]
    pub async fn reconcile(&self, key: &ObjectKey) -> Result<Action> {
        let Some(mut topology) = self.topologies.get_opt(key).await? else {
            debug!("Topology not found, nothing to do");
            return Ok(Action::AwaitChange);
        };

        if topology.metadata.is_deleting() {
            return self.finalize(&topology).await;
        }

        let saved = topology.status.conditions.clone();
        topology.status.conditions.init(ConditionType::ALL);

        if saved.is_empty() {
            info!("Initialising status of new topology");
            self.topologies.replace_status(&topology).await?;
            return Ok(Action::Requeue(Duration::ZERO));
        }

        let finalizer = self.ctx.settings.finalizer.as_str();
        if topology.metadata.add_finalizer(finalizer) {
            let updated = self.topologies.replace(&topology).await?;
            topology.metadata = updated.metadata;
            self.topologies.replace_status(&topology).await?;
            info!(finalizer, "Added finalizer");
            return Ok(Action::Requeue(Duration::ZERO));
        }

        let mut pass = PassState::new(topology);
        let outcome = self.pipeline.run(&self.ctx, &mut pass).await;
        let persisted = self.persist(pass.topology, &saved).await;

        let outcome = match (outcome, persisted) {
            (Err(err), persisted) => {
                if let Err(persist_err) = persisted {
                    error!(error = %persist_err, "Failed to persist status after failed pass");
                }
                return Err(err);
            }
            (Ok(outcome), persisted) => {
                persisted?;
                outcome
            }
        };

        match outcome {
            PipelineOutcome::Converged => {
                debug!("Topology converged");
                Ok(Action::AwaitChange)
            }
            PipelineOutcome::Requeue { stage, after } => {
                debug!(stage = %stage, after_ms = after.as_millis() as u64, "Pass requeued");
                Ok(Action::Requeue(after))
            }
        }
    }

    /// Restores unchanged transition times, recomputes Ready and writes the
    /// status record.
    async fn persist(&self, mut topology: Topology, saved: &Conditions) -> Result<()> {
        let conditions = &mut topology.status.conditions;
        conditions.restore_last_transition_times(saved);
        conditions.summarize_ready();
        self.topologies.replace_status(&topology).await?;
        Ok(())
    }

    async fn finalize(&self, topology: &Topology) -> Result<Action> {
        if !topology.metadata.has_finalizer(&self.ctx.settings.finalizer) {
            debug!("Topology deleting without our finalizer");
            return Ok(Action::AwaitChange);
        }
        info!("Running deletion cascade");
        deletion::cascade(&self.ctx, topology).await?;
        Ok(Action::AwaitChange)
    }
}
