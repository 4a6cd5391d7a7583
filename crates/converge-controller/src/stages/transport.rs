//! Transport binding

use async_trait::async_trait;
use converge_types::{ConditionType, Reason, Severity};

use super::TRANSPORT_POLL;
use crate::context::ControllerContext;
use crate::error::{ReconcileError, Result};
use crate::naming;
use crate::pipeline::{PassState, Stage, StageName, StageResult};

/// Declares the transport binding and waits for its secret
pub struct TransportStage;

#[async_trait]
impl Stage for TransportStage {
    fn name(&self) -> StageName {
        StageName::TransportReady
    }

    fn condition(&self) -> ConditionType {
        ConditionType::TransportReady
    }

    async fn run(&self, ctx: &ControllerContext, pass: &mut PassState) -> Result<StageResult> {
        let key = pass.key().sibling(naming::transport(pass.name()));
        let cluster = pass.topology.spec.transport_cluster.clone();

        let binding = ctx
            .collaborators
            .transport
            .create_or_update(&pass.owner(), &key, &cluster)
            .await
            .map_err(|e| ReconcileError::collaborator("transport provisioner", e))?;

        if binding.secret_name.is_empty() {
            pass.conditions_mut().mark_false(
                ConditionType::TransportReady,
                Reason::Requested,
                Severity::Info,
                format!("Waiting for transport secret of {}", key),
            );
            return Ok(StageResult::RequeueAfter(TRANSPORT_POLL));
        }

        if pass.status().transport_secret != binding.secret_name {
            tracing::info!(
                topology = %pass.key(),
                secret = %binding.secret_name,
                "Transport secret resolved"
            );
            pass.status_mut().transport_secret = binding.secret_name;
        }
        pass.conditions_mut().mark_true(
            ConditionType::TransportReady,
            ConditionType::TransportReady.ready_message(),
        );
        Ok(StageResult::Continue)
    }
}
