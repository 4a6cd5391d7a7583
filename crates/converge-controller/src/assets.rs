//! Transient asset pipeline
//!
//! Imports external assets through a short-lived uploader workload:
//! deploy the uploader, wait for it, expose it, fetch its manifest, hand the
//! manifest to the importer, then tear the uploader down. The whole workflow
//! sits behind the asset hash, so it only runs when the declared asset image
//! reference changes.
//!
//! Teardown is tracked by its own status flag. A failed teardown is retried on
//! later passes even though the hash gate short-circuits the workflow.

use async_trait::async_trait;
use converge_types::{ConditionType, ObjectKey, Reason, Service, ServicePort, Severity};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::time::Duration;

use crate::collaborators::WorkloadSpec;
use crate::context::ControllerContext;
use crate::error::{ReconcileError, Result};
use crate::hash::{hash_of, ASSET_HASH};
use crate::naming;
use crate::pipeline::{PassState, Stage, StageName, StageResult};
use crate::upsert::create_or_update;

/// Poll interval while the uploader has no ready replica
pub const UPLOADER_POLL: Duration = Duration::from_secs(1);

/// Poll interval while the importer is still working
pub const IMPORT_POLL: Duration = Duration::from_secs(5);

/// One asset listed by the uploader
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AssetManifestEntry {
    /// Logical asset name (file name without the asset suffix)
    pub name: String,
    pub url: String,
    pub checksum: String,
}

/// Parses a `<checksum> <filename>` listing.
///
/// Lines without exactly two whitespace separated fields are skipped.
pub fn parse_manifest(body: &str, base_url: &str, suffix: &str) -> Vec<AssetManifestEntry> {
    let base_url = base_url.trim_end_matches('/');
    body.lines()
        .filter_map(|line| {
            let fields: Vec<&str> = line.split_whitespace().collect();
            let [checksum, filename] = fields.as_slice() else {
                return None;
            };
            let name = filename.strip_suffix(suffix).unwrap_or(filename);
            Some(AssetManifestEntry {
                name: name.to_string(),
                url: format!("{}/{}", base_url, filename),
                checksum: checksum.to_string(),
            })
        })
        .collect()
}

/// Deploys, polls and tears down the uploader as the asset hash demands
pub struct AssetPipelineStage;

impl AssetPipelineStage {
    fn uploader_key(pass: &PassState) -> ObjectKey {
        pass.key().sibling(naming::asset_uploader(pass.name()))
    }

    fn service_key(pass: &PassState) -> ObjectKey {
        pass.key().sibling(naming::asset_uploader_service(pass.name()))
    }

    fn settle(pass: &mut PassState, message: &str) {
        for condition in [ConditionType::DeploymentReady, ConditionType::ExposeServiceReady] {
            pass.conditions_mut().mark_true(condition, message);
        }
    }

    /// Best effort removal of the uploader and its service
    async fn teardown(ctx: &ControllerContext, pass: &mut PassState) {
        let uploader = Self::uploader_key(pass);
        let removed = match ctx.collaborators.workloads.delete(&uploader).await {
            Ok(_) => match ctx.api::<Service>().delete(&Self::service_key(pass)).await {
                Ok(()) => Ok(()),
                Err(e) if e.is_not_found() => Ok(()),
                Err(e) => Err(e.to_string()),
            },
            Err(e) => Err(e.to_string()),
        };

        match removed {
            Ok(()) => {
                tracing::info!(topology = %pass.key(), uploader = %uploader, "Asset uploader removed");
                pass.status_mut().asset_teardown_pending = false;
            }
            Err(error) => {
                tracing::warn!(
                    topology = %pass.key(),
                    uploader = %uploader,
                    error = %error,
                    "Asset uploader teardown failed, will retry"
                );
            }
        }
    }

    async fn expose(
        ctx: &ControllerContext,
        pass: &PassState,
        labels: &BTreeMap<String, String>,
    ) -> Result<String> {
        let key = Self::service_key(pass);
        let port = ctx.settings.uploader_port;
        let target_port = ctx.settings.uploader_target_port;
        let selector = labels.clone();

        create_or_update(&ctx.api::<Service>(), &key, Some(&pass.owner()), |svc| {
            svc.metadata.labels = selector.clone();
            svc.spec.selector = selector;
            svc.spec.ports = vec![ServicePort {
                name: "uploader".to_string(),
                port,
                target_port,
            }];
        })
        .await
        .map_err(|e| ReconcileError::from(e).scoped(ConditionType::ExposeServiceReady))?;

        Ok(format!("http://{}.{}.svc:{}", key.name, key.namespace, port))
    }
}

#[async_trait]
impl Stage for AssetPipelineStage {
    fn name(&self) -> StageName {
        StageName::AssetPipelineSettled
    }

    fn condition(&self) -> ConditionType {
        ConditionType::DeploymentReady
    }

    async fn run(&self, ctx: &ControllerContext, pass: &mut PassState) -> Result<StageResult> {
        let image = pass.topology.spec.asset_image.clone();

        if image.is_empty() {
            if pass.status_mut().hash.remove(ASSET_HASH).is_some() {
                tracing::info!(topology = %pass.key(), "Asset image unset, cleared asset hash");
            }
            if pass.status().asset_teardown_pending {
                Self::teardown(ctx, pass).await;
            }
            Self::settle(pass, "Asset pipeline disabled");
            return Ok(StageResult::Continue);
        }

        let image_hash = hash_of(&image)?;
        if pass.status().hash.get(ASSET_HASH) == Some(&image_hash) {
            if pass.status().asset_teardown_pending {
                Self::teardown(ctx, pass).await;
            }
            Self::settle(pass, "Assets imported");
            return Ok(StageResult::Continue);
        }

        // deploy uploader
        let labels = naming::labels(pass.name(), "asset-uploader");
        let uploader = Self::uploader_key(pass);
        let spec = WorkloadSpec {
            name: uploader.name.clone(),
            namespace: uploader.namespace.clone(),
            image: image.clone(),
            replicas: 1,
            container_port: ctx.settings.uploader_target_port,
            labels: labels.clone(),
        };
        let state = ctx
            .collaborators
            .workloads
            .create_or_patch(&pass.owner(), &spec)
            .await
            .map_err(|e| ReconcileError::collaborator("workload manager", e))?;
        pass.status_mut().asset_teardown_pending = true;

        if let Some(after) = state.requeue_after {
            return Ok(StageResult::RequeueAfter(after));
        }

        // wait for a ready replica
        if state.ready_count == 0 {
            pass.conditions_mut().mark_false(
                ConditionType::DeploymentReady,
                Reason::Requested,
                Severity::Info,
                ConditionType::DeploymentReady.waiting_message(),
            );
            return Ok(StageResult::RequeueAfter(UPLOADER_POLL));
        }
        pass.conditions_mut().mark_true(
            ConditionType::DeploymentReady,
            ConditionType::DeploymentReady.ready_message(),
        );

        // expose
        let endpoint = Self::expose(ctx, pass, &labels).await?;
        pass.conditions_mut().mark_true(
            ConditionType::ExposeServiceReady,
            ConditionType::ExposeServiceReady.ready_message(),
        );

        // fetch manifest
        let url = format!("{}/{}", endpoint, ctx.settings.manifest_file);
        let body = ctx
            .collaborators
            .fetcher
            .fetch(&url)
            .await
            .map_err(|e| ReconcileError::Fetch {
                url: url.clone(),
                message: e.to_string(),
            })?;
        let entries = parse_manifest(&body, &endpoint, &ctx.settings.asset_suffix);
        tracing::debug!(topology = %pass.key(), entries = entries.len(), "Asset manifest fetched");

        // import
        let complete = ctx
            .collaborators
            .assets
            .ensure_imported(&entries)
            .await
            .map_err(|e| ReconcileError::collaborator("asset importer", e))?;
        if !complete {
            return Ok(StageResult::RequeueAfter(IMPORT_POLL));
        }

        pass.status_mut()
            .hash
            .insert(ASSET_HASH.to_string(), image_hash);
        tracing::info!(
            topology = %pass.key(),
            image = %image,
            assets = entries.len(),
            "Assets imported"
        );

        Self::teardown(ctx, pass).await;
        Self::settle(pass, "Assets imported");
        Ok(StageResult::Continue)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const BASE: &str = "http://lb-asset-uploader-internal.ns.svc:9876";

    #[test]
    fn test_manifest_skips_malformed_lines() {
        let body = "abc123 cirros.qcow2\nbadline\nd4 e5 f6\n";
        let entries = parse_manifest(body, BASE, ".qcow2");

        assert_eq!(
            entries,
            vec![AssetManifestEntry {
                name: "cirros".into(),
                url: format!("{}/cirros.qcow2", BASE),
                checksum: "abc123".into(),
            }]
        );
    }

    #[test]
    fn test_manifest_keeps_names_without_suffix() {
        let entries = parse_manifest("ff00  amphora-x64.raw\n\n", &format!("{}/", BASE), ".qcow2");

        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].name, "amphora-x64.raw");
        assert_eq!(entries[0].url, format!("{}/amphora-x64.raw", BASE));
    }

    #[test]
    fn test_empty_manifest() {
        assert!(parse_manifest("", BASE, ".qcow2").is_empty());
    }
}
