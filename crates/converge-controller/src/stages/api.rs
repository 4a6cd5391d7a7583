//! API workload

use async_trait::async_trait;
use converge_types::{ApiDeployment, ConditionType, WorkloadTemplate};
use std::collections::BTreeMap;

use crate::context::ControllerContext;
use crate::error::Result;
use crate::hash::INPUT_HASH;
use crate::naming;
use crate::pipeline::{PassState, Stage, StageName, StageResult};
use crate::upsert::create_or_update;

/// Declares the API resource and mirrors its readiness
pub struct ApiStage;

/// Workload fields shared by the API and the role resources
pub(crate) fn workload_template(
    pass: &PassState,
    container_image: &str,
    custom_service_config: &str,
    node_selector: &BTreeMap<String, String>,
    network_attachments: &[String],
) -> WorkloadTemplate {
    let spec = &pass.topology.spec;
    let status = pass.status();
    WorkloadTemplate {
        container_image: container_image.to_string(),
        service_user: spec.service_user.clone(),
        database_hostname: status.database_hostname.clone(),
        transport_secret: status.transport_secret.clone(),
        secret: spec.secret.clone(),
        custom_service_config: custom_service_config.to_string(),
        node_selector: if node_selector.is_empty() {
            spec.node_selector.clone()
        } else {
            node_selector.clone()
        },
        network_attachments: network_attachments.to_vec(),
        config_hash: status.hash.get(INPUT_HASH).cloned().unwrap_or_default(),
    }
}

#[async_trait]
impl Stage for ApiStage {
    fn name(&self) -> StageName {
        StageName::ApiDeployed
    }

    fn condition(&self) -> ConditionType {
        ConditionType::ApiReady
    }

    async fn run(&self, ctx: &ControllerContext, pass: &mut PassState) -> Result<StageResult> {
        let api_spec = &pass.topology.spec.api;
        let replicas = api_spec.replicas;
        let template = workload_template(
            pass,
            &api_spec.container_image,
            &api_spec.custom_service_config,
            &api_spec.node_selector,
            &api_spec.network_attachments,
        );
        let annotation = pass.networks_annotation.clone();
        let labels = naming::labels(pass.name(), "api");
        let key = pass.key().sibling(naming::api(pass.name()));
        let owner = pass.owner();

        let (api, op) = create_or_update(&ctx.api::<ApiDeployment>(), &key, Some(&owner), |api| {
            api.metadata.labels = labels;
            api.metadata
                .annotations
                .insert(naming::NETWORKS_ANNOTATION.to_string(), annotation);
            api.spec.replicas = replicas;
            api.spec.template = template;
        })
        .await?;
        tracing::debug!(topology = %pass.key(), operation = %op, "API reconciled");

        pass.status_mut().api_ready_count = api.status.ready_count;
        if pass
            .conditions_mut()
            .mirror(ConditionType::ApiReady, &api.status.conditions)
            .is_none()
        {
            pass.conditions_mut()
                .mark_true(ConditionType::ApiReady, ConditionType::ApiReady.ready_message());
        }
        Ok(StageResult::Continue)
    }
}
