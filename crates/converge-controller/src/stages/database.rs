//! Database accounts and databases

use async_trait::async_trait;
use converge_types::{ConditionType, Database, DatabaseAccount, Reason, Severity};

use super::DATABASE_POLL;
use crate::context::ControllerContext;
use crate::error::{ReconcileError, Result};
use crate::naming;
use crate::pipeline::{PassState, Stage, StageName, StageResult};
use crate::upsert::create_or_update;

/// Declares both database accounts, then both databases, and waits for the
/// databases to be created.
pub struct DatabaseStage;

#[async_trait]
impl Stage for DatabaseStage {
    fn name(&self) -> StageName {
        StageName::DatabaseReady
    }

    fn condition(&self) -> ConditionType {
        ConditionType::DbReady
    }

    async fn run(&self, ctx: &ControllerContext, pass: &mut PassState) -> Result<StageResult> {
        let accounts = ctx.api::<DatabaseAccount>();
        let databases = ctx.api::<Database>();
        let owner = pass.owner();
        let namespace = pass.namespace().to_string();
        let finalizer = ctx.settings.finalizer.as_str();
        let bindings = naming::databases(&pass.topology.spec);

        for binding in &bindings {
            let (_, op) = create_or_update(
                &accounts,
                &binding.account_key(&namespace),
                Some(&owner),
                |account| {
                    account.metadata.add_finalizer(finalizer);
                    account.spec.user_name = binding.account.replace('-', "_");
                    account.spec.secret = naming::account_secret(&binding.account);
                },
            )
            .await
            .map_err(|e| ReconcileError::from(e).scoped(ConditionType::DatabaseAccountReady))?;
            tracing::debug!(
                topology = %pass.key(),
                account = %binding.account,
                operation = %op,
                "Database account reconciled"
            );
        }
        pass.conditions_mut().mark_true(
            ConditionType::DatabaseAccountReady,
            ConditionType::DatabaseAccountReady.ready_message(),
        );

        let instance = pass.topology.spec.database_instance.clone();
        let mut hostname = None;
        for binding in &bindings {
            let (database, _) = create_or_update(
                &databases,
                &binding.key(&namespace),
                Some(&owner),
                |db| {
                    db.metadata.add_finalizer(finalizer);
                    db.spec.instance = instance.clone();
                    db.spec.database_name = binding.database_name.clone();
                    db.spec.account = binding.account.clone();
                },
            )
            .await?;

            if !database.status.created {
                pass.conditions_mut().mark_false(
                    ConditionType::DbReady,
                    Reason::Requested,
                    Severity::Info,
                    format!("Waiting for database {} to be created", binding.database_name),
                );
                return Ok(StageResult::RequeueAfter(DATABASE_POLL));
            }
            hostname.get_or_insert(database.status.hostname);
        }

        pass.status_mut().database_hostname = hostname.unwrap_or_default();
        pass.conditions_mut()
            .mark_true(ConditionType::DbReady, ConditionType::DbReady.ready_message());
        Ok(StageResult::Continue)
    }
}
