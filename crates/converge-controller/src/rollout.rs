//! Staged rollout barrier
//!
//! Every worker role is declared as a role controller resource. The primary
//! role goes first; dependent roles are not declared at all until the primary
//! resource reports as many ready replicas as it desires. The barrier is hard:
//! while it is closed no dependent resource is created or touched.

use async_trait::async_trait;
use converge_types::{ConditionType, Reason, Role, RoleController, Severity, WorkloadStatus};

use crate::context::ControllerContext;
use crate::error::{ReconcileError, Result};
use crate::naming;
use crate::pipeline::{PassState, Stage, StageName, StageResult};
use crate::stages::workload_template;
use crate::upsert::{create_or_update, Operation};

/// Readiness observed after declaring a role
#[derive(Debug, Clone, PartialEq)]
pub struct RolloutReport {
    pub role: Role,
    pub operation: Operation,
    pub status: WorkloadStatus,
}

impl RolloutReport {
    pub fn ready_count(&self) -> u32 {
        self.status.ready_count
    }

    pub fn desired_count(&self) -> u32 {
        self.status.desired_count
    }
}

/// Whether the observed primary status lets dependent roles roll out.
///
/// The counts only mean something once the operator has reported a Ready
/// condition; until then the barrier stays closed. A primary scheduled on no
/// node at all (0 of 0) is rolled out.
pub fn barrier_open(primary: &WorkloadStatus) -> bool {
    primary.conditions.get(ConditionType::Ready).is_some() && primary.is_rolled_out()
}

/// Declares the role controller resource of `role` and mirrors its readiness
/// into the topology status.
pub async fn rollout(
    ctx: &ControllerContext,
    pass: &mut PassState,
    role: Role,
) -> Result<RolloutReport> {
    let role_spec = pass.topology.spec.role(role).clone();
    let template = workload_template(
        pass,
        &role_spec.container_image,
        &role_spec.custom_service_config,
        &role_spec.node_selector,
        &role_spec.network_attachments,
    );
    let network = pass.management_network.clone().unwrap_or_default();
    let labels = naming::labels(pass.name(), role.as_str());
    let key = pass.key().sibling(role.resource_name(pass.name()));
    let owner = pass.owner();

    let (resource, operation) =
        create_or_update(&ctx.api::<RoleController>(), &key, Some(&owner), |rc| {
            rc.metadata.labels = labels;
            rc.spec.role = role.as_str().to_string();
            rc.spec.template = template;
            rc.spec.management_network_id = network.network_id;
            rc.spec.security_group_id = network.security_group_id;
        })
        .await
        .map_err(|e| ReconcileError::from(e).scoped(role.condition()))?;

    if operation.is_mutation() {
        tracing::info!(
            topology = %pass.key(),
            role = %role,
            operation = %operation,
            "Role rolled out"
        );
    }

    pass.status_mut()
        .role_ready_counts
        .insert(role, resource.status.ready_count);
    if pass
        .conditions_mut()
        .mirror(role.condition(), &resource.status.conditions)
        .is_none()
    {
        pass.conditions_mut()
            .mark_true(role.condition(), role.condition().ready_message());
    }

    Ok(RolloutReport {
        role,
        operation,
        status: resource.status,
    })
}

/// Declares the primary role
pub struct PrimaryRoleStage;

#[async_trait]
impl Stage for PrimaryRoleStage {
    fn name(&self) -> StageName {
        StageName::PrimaryRoleReady
    }

    fn condition(&self) -> ConditionType {
        Role::primary().condition()
    }

    async fn run(&self, ctx: &ControllerContext, pass: &mut PassState) -> Result<StageResult> {
        let report = rollout(ctx, pass, Role::primary()).await?;
        tracing::debug!(
            topology = %pass.key(),
            role = %report.role,
            ready = report.ready_count(),
            desired = report.desired_count(),
            "Primary role observed"
        );
        pass.primary_rollout = Some(report.status);
        Ok(StageResult::Continue)
    }
}

/// Declares the dependent roles once the barrier opens
pub struct DependentRolesStage;

#[async_trait]
impl Stage for DependentRolesStage {
    fn name(&self) -> StageName {
        StageName::DependentRolesDeployed
    }

    fn condition(&self) -> ConditionType {
        Role::first_dependent().condition()
    }

    async fn run(&self, ctx: &ControllerContext, pass: &mut PassState) -> Result<StageResult> {
        let open = pass.primary_rollout.as_ref().is_some_and(barrier_open);

        if !open {
            tracing::debug!(topology = %pass.key(), "Rollout barrier closed");
            let message = format!("Waiting for {} rollout", Role::primary());
            for role in Role::dependents() {
                pass.conditions_mut().mark_false(
                    role.condition(),
                    Reason::Requested,
                    Severity::Info,
                    message.clone(),
                );
            }
            // a status change of the primary resource re-triggers the pass
            return Ok(StageResult::Continue);
        }

        for role in Role::dependents() {
            rollout(ctx, pass, role).await?;
        }

        // debug access to the instances the workers launch
        ctx.collaborators
            .ssh
            .ensure_ssh_config(&pass.owner(), &pass.key())
            .await
            .map_err(|e| {
                ReconcileError::collaborator("ssh key provisioner", e)
                    .scoped(ConditionType::WorkerReady)
            })?;
        Ok(StageResult::Continue)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn observed(ready: u32, desired: u32) -> WorkloadStatus {
        let mut status = WorkloadStatus {
            ready_count: ready,
            desired_count: desired,
            ..Default::default()
        };
        status.conditions.mark_true(ConditionType::Ready, "Setup complete");
        status
    }

    #[test]
    fn test_barrier_requires_full_rollout() {
        assert!(!barrier_open(&observed(2, 3)));
        assert!(barrier_open(&observed(3, 3)));
    }

    #[test]
    fn test_barrier_opens_on_empty_rollout() {
        assert!(barrier_open(&observed(0, 0)));
    }

    #[test]
    fn test_barrier_waits_for_reported_status() {
        assert!(!barrier_open(&WorkloadStatus::default()));
        let unreported = WorkloadStatus {
            ready_count: 1,
            desired_count: 1,
            ..Default::default()
        };
        assert!(!barrier_open(&unreported));
    }

    #[test]
    fn test_dependent_stage_reports_first_dependent() {
        assert_eq!(
            DependentRolesStage.condition(),
            ConditionType::HousekeepingReady
        );
    }
}
