//! Credentials resolution

use async_trait::async_trait;
use converge_types::{ConditionType, ObjectKey, Secret};

use crate::context::ControllerContext;
use crate::error::Result;
use crate::hash::hash_of;
use crate::pipeline::{PassState, Stage, StageName, StageResult};

/// Resolves the credentials secret, and the transport secret once known, into
/// the input hash set.
pub struct CredentialsStage;

#[async_trait]
impl Stage for CredentialsStage {
    fn name(&self) -> StageName {
        StageName::CredentialsResolved
    }

    fn condition(&self) -> ConditionType {
        ConditionType::InputReady
    }

    async fn run(&self, ctx: &ControllerContext, pass: &mut PassState) -> Result<StageResult> {
        let secrets = ctx.api::<Secret>();
        let mut names = vec![pass.topology.spec.secret.clone()];
        if !pass.status().transport_secret.is_empty() {
            names.push(pass.status().transport_secret.clone());
        }

        for name in names {
            // a missing secret surfaces as NotFound: Requested/Info, retried with backoff
            let secret = secrets
                .get(&ObjectKey::new(pass.namespace(), name.clone()))
                .await?;
            pass.inputs.insert(name, hash_of(&secret.data)?);
        }

        Ok(StageResult::Continue)
    }
}
