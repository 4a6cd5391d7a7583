//! Network attachment verification

use async_trait::async_trait;
use converge_types::{ConditionType, Reason, Severity};
use serde_json::json;

use super::ATTACHMENT_POLL;
use crate::context::ControllerContext;
use crate::error::{ReconcileError, Result};
use crate::pipeline::{PassState, Stage, StageName, StageResult};

/// Checks every API network attachment exists and renders the networks
/// annotation the API workload carries.
pub struct AttachmentsStage;

fn networks_annotation(namespace: &str, attachments: &[String]) -> Result<String> {
    let networks: Vec<_> = attachments
        .iter()
        .map(|name| json!({ "name": name, "namespace": namespace }))
        .collect();
    Ok(serde_json::to_string(&networks)?)
}

#[async_trait]
impl Stage for AttachmentsStage {
    fn name(&self) -> StageName {
        StageName::NetworkAttachmentsVerified
    }

    fn condition(&self) -> ConditionType {
        ConditionType::NetworkAttachmentsReady
    }

    async fn run(&self, ctx: &ControllerContext, pass: &mut PassState) -> Result<StageResult> {
        let namespace = pass.namespace().to_string();
        let attachments = pass.topology.spec.api.network_attachments.clone();

        for name in &attachments {
            let exists = ctx
                .collaborators
                .attachments
                .exists(&namespace, name)
                .await
                .map_err(|e| ReconcileError::collaborator("network attachment validator", e))?;

            if !exists {
                pass.conditions_mut().mark_false(
                    ConditionType::NetworkAttachmentsReady,
                    Reason::Requested,
                    Severity::Info,
                    format!("Network attachment {} not found", name),
                );
                return Ok(StageResult::RequeueAfter(ATTACHMENT_POLL));
            }
        }

        pass.networks_annotation = networks_annotation(&namespace, &attachments)?;
        pass.conditions_mut().mark_true(
            ConditionType::NetworkAttachmentsReady,
            ConditionType::NetworkAttachmentsReady.ready_message(),
        );
        Ok(StageResult::Continue)
    }
}
