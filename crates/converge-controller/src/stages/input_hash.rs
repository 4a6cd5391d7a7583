//! Aggregate input hash

use async_trait::async_trait;
use converge_types::ConditionType;
use std::time::Duration;

use crate::context::ControllerContext;
use crate::error::{ReconcileError, Result};
use crate::hash::{compare_and_set, hash_of, INPUT_HASH};
use crate::pipeline::{PassState, Stage, StageName, StageResult};

/// Ensures the certificates and quotas the workers depend on, then records
/// the aggregate hash over every input gathered so far.
///
/// A changed hash ends the pass with an immediate requeue so the new hash is
/// persisted before any later stage consumes it.
pub struct InputHashStage;

#[async_trait]
impl Stage for InputHashStage {
    fn name(&self) -> StageName {
        StageName::InputHashStable
    }

    fn condition(&self) -> ConditionType {
        ConditionType::InputReady
    }

    async fn run(&self, ctx: &ControllerContext, pass: &mut PassState) -> Result<StageResult> {
        let key = pass.key();

        ctx.collaborators
            .certificates
            .ensure_certificates(&pass.owner(), &key)
            .await
            .map_err(|e| {
                ReconcileError::collaborator("certificate issuer", e)
                    .scoped(ConditionType::ServiceConfigReady)
            })?;

        let tenant = pass.topology.spec.tenant_name.clone();
        ctx.collaborators
            .quotas
            .ensure_quotas(&key, &tenant)
            .await
            .map_err(|e| {
                ReconcileError::collaborator("quota manager", e).scoped(ConditionType::InputReady)
            })?;

        let aggregate = hash_of(&pass.inputs)?;
        let changed = compare_and_set(&mut pass.status_mut().hash, INPUT_HASH, &aggregate);

        pass.conditions_mut()
            .mark_true(ConditionType::InputReady, ConditionType::InputReady.ready_message());

        if changed {
            tracing::info!(topology = %pass.key(), hash = %aggregate, "Input hash changed");
            return Ok(StageResult::RequeueAfter(Duration::ZERO));
        }
        Ok(StageResult::Continue)
    }
}
