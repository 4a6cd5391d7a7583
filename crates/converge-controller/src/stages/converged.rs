//! Final bookkeeping of a pass

use async_trait::async_trait;
use converge_types::{ConditionType, DatabaseAccount};

use crate::context::ControllerContext;
use crate::error::Result;
use crate::pipeline::{PassState, Stage, StageName, StageResult};

/// Releases database accounts the spec no longer references, records the
/// observed generation and marks the topology Ready once every sub-condition
/// holds.
pub struct ConvergedStage;

#[async_trait]
impl Stage for ConvergedStage {
    fn name(&self) -> StageName {
        StageName::Converged
    }

    fn condition(&self) -> ConditionType {
        ConditionType::Ready
    }

    async fn run(&self, ctx: &ControllerContext, pass: &mut PassState) -> Result<StageResult> {
        let accounts = ctx.api::<DatabaseAccount>();
        let finalizer = ctx.settings.finalizer.as_str();
        let referenced = pass.topology.spec.database_accounts().map(str::to_string);

        for account in accounts.list_owned_by(&pass.topology.metadata.uid).await? {
            let name = &account.metadata.name;
            if referenced.contains(name) || !account.metadata.has_finalizer(finalizer) {
                continue;
            }
            if accounts.remove_finalizer(&account.metadata.key(), finalizer).await? {
                tracing::info!(
                    topology = %pass.key(),
                    account = %name,
                    "Released unused database account"
                );
            }
        }

        let generation = pass.topology.metadata.generation;
        pass.status_mut().observed_generation = generation;

        if pass.conditions().all_sub_conditions_true() {
            pass.conditions_mut()
                .mark_true(ConditionType::Ready, ConditionType::Ready.ready_message());
        }
        Ok(StageResult::Continue)
    }
}
