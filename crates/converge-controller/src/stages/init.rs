//! Spec validation

use async_trait::async_trait;
use converge_types::{ConditionType, TopologySpec};

use crate::context::ControllerContext;
use crate::error::{ReconcileError, Result};
use crate::pipeline::{PassState, Stage, StageName, StageResult};

/// Rejects specs whose references cannot be resolved by any amount of retrying
pub struct InitStage;

fn validate(spec: &TopologySpec) -> Result<()> {
    let required = [
        ("databaseInstance", &spec.database_instance),
        ("databaseAccount", &spec.database_account),
        ("persistenceDatabaseAccount", &spec.persistence_database_account),
        ("secret", &spec.secret),
        ("transportCluster", &spec.transport_cluster),
    ];
    if let Some((field, _)) = required.iter().find(|(_, value)| value.trim().is_empty()) {
        return Err(ReconcileError::InvalidSpec(format!("{} must not be empty", field)));
    }

    if spec.database_account == spec.persistence_database_account {
        return Err(ReconcileError::InvalidSpec(
            "databaseAccount and persistenceDatabaseAccount must differ".to_string(),
        ));
    }

    if spec.api.network_attachments.iter().any(|n| n.trim().is_empty()) {
        return Err(ReconcileError::InvalidSpec(
            "api.networkAttachments contains an empty name".to_string(),
        ));
    }

    Ok(())
}

#[async_trait]
impl Stage for InitStage {
    fn name(&self) -> StageName {
        StageName::Init
    }

    fn condition(&self) -> ConditionType {
        ConditionType::InputReady
    }

    async fn run(&self, _ctx: &ControllerContext, pass: &mut PassState) -> Result<StageResult> {
        validate(&pass.topology.spec)?;
        Ok(StageResult::Continue)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn spec() -> TopologySpec {
        TopologySpec {
            database_instance: "openstack".into(),
            database_account: "octavia".into(),
            persistence_database_account: "octavia-persistence".into(),
            secret: "osp-secret".into(),
            transport_cluster: "rabbitmq".into(),
            ..Default::default()
        }
    }

    #[test]
    fn test_valid_spec() {
        assert!(validate(&spec()).is_ok());
    }

    #[test]
    fn test_missing_reference_is_invalid() {
        let spec = TopologySpec {
            secret: String::new(),
            ..spec()
        };
        let err = validate(&spec).unwrap_err();
        assert!(err.to_string().contains("secret"));
        assert!(!err.is_not_found());
    }

    #[test]
    fn test_shared_account_is_invalid() {
        let spec = TopologySpec {
            persistence_database_account: "octavia".into(),
            ..spec()
        };
        assert!(matches!(validate(&spec), Err(ReconcileError::InvalidSpec(_))));
    }
}
