//! Service account, role and role binding

use async_trait::async_trait;
use converge_types::{ConditionType, Reason, Severity};

use crate::collaborators::PolicyRule;
use crate::context::ControllerContext;
use crate::error::{ReconcileError, Result};
use crate::naming;
use crate::pipeline::{PassState, Stage, StageName, StageResult};

pub struct RbacStage;

fn strings(values: &[&str]) -> Vec<String> {
    values.iter().map(|v| v.to_string()).collect()
}

/// Privileged security contexts plus pod management
pub fn policy_rules() -> Vec<PolicyRule> {
    vec![
        PolicyRule {
            api_groups: strings(&["security.openshift.io"]),
            resources: strings(&["securitycontextconstraints"]),
            resource_names: strings(&["anyuid", "privileged"]),
            verbs: strings(&["use"]),
        },
        PolicyRule {
            api_groups: strings(&[""]),
            resources: strings(&["pods"]),
            resource_names: Vec::new(),
            verbs: strings(&["create", "delete", "get", "list", "patch", "update", "watch"]),
        },
    ]
}

const RBAC_CONDITIONS: [ConditionType; 3] = [
    ConditionType::ServiceAccountReady,
    ConditionType::RoleReady,
    ConditionType::RoleBindingReady,
];

#[async_trait]
impl Stage for RbacStage {
    fn name(&self) -> StageName {
        StageName::RbacReady
    }

    fn condition(&self) -> ConditionType {
        ConditionType::ServiceAccountReady
    }

    async fn run(&self, ctx: &ControllerContext, pass: &mut PassState) -> Result<StageResult> {
        let service_account = naming::service_account(pass.name());
        let requeue = ctx
            .collaborators
            .rbac
            .reconcile(&pass.owner(), &service_account, &policy_rules())
            .await
            .map_err(|e| ReconcileError::collaborator("rbac provisioner", e))?;

        if let Some(after) = requeue {
            for condition in RBAC_CONDITIONS {
                pass.conditions_mut().mark_false(
                    condition,
                    Reason::Requested,
                    Severity::Info,
                    condition.waiting_message(),
                );
            }
            return Ok(StageResult::RequeueAfter(after));
        }

        for condition in RBAC_CONDITIONS {
            pass.conditions_mut()
                .mark_true(condition, condition.ready_message());
        }
        Ok(StageResult::Continue)
    }
}
