//! Script and config rendering

use async_trait::async_trait;
use converge_types::{ConditionType, DatabaseAccount, ObjectKey, Secret};
use std::collections::BTreeMap;

use crate::collaborators::{ConfigTemplate, TemplateKind};
use crate::context::ControllerContext;
use crate::error::{ReconcileError, Result};
use crate::naming;
use crate::pipeline::{PassState, Stage, StageName, StageResult};

/// Field of an account secret holding the database password
pub const PASSWORD_FIELD: &str = "DatabasePassword";

const CUSTOM_CONFIG_FILE: &str = "custom.conf";

/// Renders scripts and service config through the materializer
pub struct ConfigStage;

fn connection_string(user: &str, password: &str, host: &str, database: &str) -> String {
    format!(
        "mysql+pymysql://{}:{}@{}/{}?read_default_file=/etc/my.cnf",
        user, password, host, database
    )
}

async fn database_connection(
    ctx: &ControllerContext,
    pass: &PassState,
    binding: &naming::DatabaseBinding,
) -> Result<String> {
    let account = ctx
        .api::<DatabaseAccount>()
        .get(&binding.account_key(pass.namespace()))
        .await?;
    let secret_key = ObjectKey::new(pass.namespace(), account.spec.secret.clone());
    let secret = ctx.api::<Secret>().get(&secret_key).await?;
    let password = secret
        .data
        .get(PASSWORD_FIELD)
        .ok_or_else(|| ReconcileError::NotFound {
            kind: format!("{} field of Secret", PASSWORD_FIELD),
            key: secret_key.clone(),
        })?;

    Ok(connection_string(
        &account.spec.user_name,
        password,
        &pass.status().database_hostname,
        &binding.database_name,
    ))
}

#[async_trait]
impl Stage for ConfigStage {
    fn name(&self) -> StageName {
        StageName::ConfigRendered
    }

    fn condition(&self) -> ConditionType {
        ConditionType::ServiceConfigReady
    }

    async fn run(&self, ctx: &ControllerContext, pass: &mut PassState) -> Result<StageResult> {
        let spec = &pass.topology.spec;
        let [primary, persistence] = naming::databases(spec);
        let labels = naming::labels(pass.name(), "config");

        let mut custom_data: BTreeMap<String, String> = spec.default_config_overwrite.clone();
        custom_data.insert(
            CUSTOM_CONFIG_FILE.to_string(),
            spec.custom_service_config.clone(),
        );

        let mut parameters = BTreeMap::new();
        parameters.insert("ServiceUser".to_string(), spec.service_user.clone());
        parameters.insert("TenantName".to_string(), spec.tenant_name.clone());
        parameters.insert(
            "DatabaseConnection".to_string(),
            database_connection(ctx, pass, &primary).await?,
        );
        parameters.insert(
            "PersistenceDatabaseConnection".to_string(),
            database_connection(ctx, pass, &persistence).await?,
        );

        let templates = [
            ConfigTemplate {
                name: naming::scripts(pass.name()),
                namespace: pass.namespace().to_string(),
                kind: TemplateKind::Scripts,
                custom_data: BTreeMap::new(),
                parameters: BTreeMap::new(),
                labels: labels.clone(),
            },
            ConfigTemplate {
                name: naming::config_data(pass.name()),
                namespace: pass.namespace().to_string(),
                kind: TemplateKind::Config,
                custom_data,
                parameters,
                labels,
            },
        ];

        let hash = ctx
            .collaborators
            .materializer
            .ensure(&pass.owner(), &templates)
            .await
            .map_err(|e| ReconcileError::collaborator("secret materializer", e))?;
        let config_name = naming::config_data(pass.name());
        pass.inputs.insert(config_name, hash);

        pass.conditions_mut().mark_true(
            ConditionType::ServiceConfigReady,
            ConditionType::ServiceConfigReady.ready_message(),
        );
        Ok(StageResult::Continue)
    }
}
