//! Management network

use async_trait::async_trait;
use converge_types::ConditionType;

use crate::context::ControllerContext;
use crate::error::{ReconcileError, Result};
use crate::pipeline::{PassState, Stage, StageName, StageResult};

pub struct NetworkStage;

#[async_trait]
impl Stage for NetworkStage {
    fn name(&self) -> StageName {
        StageName::NetworkProvisioned
    }

    fn condition(&self) -> ConditionType {
        ConditionType::ManagementNetworkReady
    }

    async fn run(&self, ctx: &ControllerContext, pass: &mut PassState) -> Result<StageResult> {
        let spec = &pass.topology.spec;
        let network = ctx
            .collaborators
            .network
            .ensure_management_network(&pass.key(), &spec.tenant_name, &spec.management_network)
            .await
            .map_err(|e| ReconcileError::collaborator("network provisioner", e))?;

        tracing::debug!(
            topology = %pass.key(),
            network = %network.network_id,
            security_group = %network.security_group_id,
            "Management network ready"
        );
        pass.management_network = Some(network);
        pass.conditions_mut().mark_true(
            ConditionType::ManagementNetworkReady,
            ConditionType::ManagementNetworkReady.ready_message(),
        );
        Ok(StageResult::Continue)
    }
}
