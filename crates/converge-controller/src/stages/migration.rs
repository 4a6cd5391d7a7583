//! Database migration job

use async_trait::async_trait;
use converge_types::{ConditionType, Reason, Severity};
use std::collections::BTreeMap;

use super::JOB_POLL;
use crate::collaborators::{JobRequest, JobSpec};
use crate::context::ControllerContext;
use crate::error::{ReconcileError, Result};
use crate::hash::{compare_and_set, hash_of, INPUT_HASH, MIGRATION_HASH};
use crate::naming;
use crate::pipeline::{PassState, Stage, StageName, StageResult};

/// Runs the migration job whenever its inputs hash differently from the last
/// completed run.
pub struct MigrationStage;

fn job_spec(pass: &PassState) -> JobSpec {
    let spec = &pass.topology.spec;
    let image = if spec.container_image.is_empty() {
        spec.api.container_image.clone()
    } else {
        spec.container_image.clone()
    };

    let env: BTreeMap<String, String> = [
        ("KOLLA_CONFIG_STRATEGY", "COPY_ALWAYS".to_string()),
        ("KOLLA_BOOTSTRAP", "true".to_string()),
        ("DATABASE_HOST", pass.status().database_hostname.clone()),
        (
            "CONFIG_HASH",
            pass.status().hash.get(INPUT_HASH).cloned().unwrap_or_default(),
        ),
    ]
    .into_iter()
    .map(|(k, v)| (k.to_string(), v))
    .collect();

    JobSpec {
        name: naming::migration_job(pass.name()),
        namespace: pass.namespace().to_string(),
        image,
        command: vec!["/usr/local/bin/kolla_start".to_string()],
        env,
        labels: naming::labels(pass.name(), "db-sync"),
        service_account: naming::service_account(pass.name()),
    }
}

#[async_trait]
impl Stage for MigrationStage {
    fn name(&self) -> StageName {
        StageName::MigrationComplete
    }

    fn condition(&self) -> ConditionType {
        ConditionType::DbSyncReady
    }

    async fn run(&self, ctx: &ControllerContext, pass: &mut PassState) -> Result<StageResult> {
        let job = job_spec(pass);
        let hash = hash_of(&job)?;
        let last_hash = pass.status().hash.get(MIGRATION_HASH).cloned();

        if last_hash.as_deref() == Some(hash.as_str()) {
            pass.conditions_mut()
                .mark_true(ConditionType::DbSyncReady, ConditionType::DbSyncReady.ready_message());
            return Ok(StageResult::Continue);
        }

        let request = JobRequest {
            spec: job,
            hash_key: MIGRATION_HASH.to_string(),
            hash,
            last_hash,
            preserve_completed: pass.topology.spec.preserve_jobs,
            poll_interval: JOB_POLL,
        };
        let outcome = ctx
            .collaborators
            .jobs
            .run(&pass.owner(), &request)
            .await
            .map_err(|e| ReconcileError::collaborator("job runner", e))?;

        if let Some(after) = outcome.requeue_after {
            pass.conditions_mut().mark_false(
                ConditionType::DbSyncReady,
                Reason::Requested,
                Severity::Info,
                ConditionType::DbSyncReady.waiting_message(),
            );
            return Ok(StageResult::RequeueAfter(after));
        }

        if compare_and_set(&mut pass.status_mut().hash, MIGRATION_HASH, &outcome.hash) {
            tracing::info!(
                topology = %pass.key(),
                job = %request.spec.name,
                changed = outcome.changed,
                "Migration job completed"
            );
        }
        pass.conditions_mut()
            .mark_true(ConditionType::DbSyncReady, ConditionType::DbSyncReady.ready_message());
        Ok(StageResult::Continue)
    }
}
