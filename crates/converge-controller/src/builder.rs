//! Builder for [`Reconciler`]
//!
//! Collects the store, the collaborator set and the settings a reconciler
//! needs. Individual collaborators can be swapped after a full set has been
//! provided.

use std::sync::Arc;

use crate::collaborators::{AssetImporter, Collaborators, ManifestFetcher, WorkloadManager};
use crate::context::{ControllerContext, ControllerSettings};
use crate::error::{ReconcileError, Result};
use crate::pipeline::Pipeline;
use crate::reconciler::Reconciler;
use crate::store::ResourceStore;

/// Builder for constructing a [`Reconciler`] with all dependencies
#[derive(Default)]
pub struct ReconcilerBuilder {
    store: Option<Arc<dyn ResourceStore>>,
    collaborators: Option<Collaborators>,
    workloads: Option<Arc<dyn WorkloadManager>>,
    fetcher: Option<Arc<dyn ManifestFetcher>>,
    assets: Option<Arc<dyn AssetImporter>>,
    settings: ControllerSettings,
    pipeline: Option<Pipeline>,
}

impl ReconcilerBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the resource store
    pub fn with_store(mut self, store: Arc<dyn ResourceStore>) -> Self {
        self.store = Some(store);
        self
    }

    /// Set the full collaborator set
    pub fn with_collaborators(mut self, collaborators: Collaborators) -> Self {
        self.collaborators = Some(collaborators);
        self
    }

    /// Replace the workload manager of the collaborator set
    pub fn with_workload_manager(mut self, workloads: Arc<dyn WorkloadManager>) -> Self {
        self.workloads = Some(workloads);
        self
    }

    /// Replace the manifest fetcher of the collaborator set
    pub fn with_manifest_fetcher(mut self, fetcher: Arc<dyn ManifestFetcher>) -> Self {
        self.fetcher = Some(fetcher);
        self
    }

    /// Replace the asset importer of the collaborator set
    pub fn with_asset_importer(mut self, assets: Arc<dyn AssetImporter>) -> Self {
        self.assets = Some(assets);
        self
    }

    pub fn with_settings(mut self, settings: ControllerSettings) -> Self {
        self.settings = settings;
        self
    }

    /// Override the finalizer token
    pub fn with_finalizer(mut self, finalizer: impl Into<String>) -> Self {
        self.settings.finalizer = finalizer.into();
        self
    }

    /// Run a custom stage list instead of the standard pipeline
    pub fn with_pipeline(mut self, pipeline: Pipeline) -> Self {
        self.pipeline = Some(pipeline);
        self
    }

    pub fn build(self) -> Result<Reconciler> {
        let store = self
            .store
            .ok_or_else(|| ReconcileError::Configuration("store required".into()))?;
        let mut collaborators = self
            .collaborators
            .ok_or_else(|| ReconcileError::Configuration("collaborators required".into()))?;

        if let Some(workloads) = self.workloads {
            collaborators.workloads = workloads;
        }
        if let Some(fetcher) = self.fetcher {
            collaborators.fetcher = fetcher;
        }
        if let Some(assets) = self.assets {
            collaborators.assets = assets;
        }
        if self.settings.finalizer.is_empty() {
            return Err(ReconcileError::Configuration("finalizer must not be empty".into()));
        }

        let ctx = ControllerContext::new(store, collaborators, self.settings);
        let pipeline = self.pipeline.unwrap_or_else(Pipeline::standard);
        Ok(Reconciler::new(ctx, pipeline))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::collaborators::{HttpManifestFetcher, InMemoryCollaborators};
    use crate::store::InMemoryStore;
    use std::time::Duration;

    #[test]
    fn test_build_requires_store() {
        let err = ReconcilerBuilder::new().build().err().unwrap();
        assert!(err.to_string().contains("store required"));
    }

    #[test]
    fn test_build_requires_collaborators() {
        let err = ReconcilerBuilder::new()
            .with_store(Arc::new(InMemoryStore::new()))
            .build()
            .err()
            .unwrap();
        assert!(err.to_string().contains("collaborators required"));
    }

    #[test]
    fn test_build_with_overrides() {
        let store = Arc::new(InMemoryStore::new());
        let collaborators = InMemoryCollaborators::new(store.clone()).collaborators();
        let fetcher = HttpManifestFetcher::new(Duration::from_secs(5)).unwrap();

        let reconciler = ReconcilerBuilder::new()
            .with_store(store)
            .with_collaborators(collaborators)
            .with_manifest_fetcher(Arc::new(fetcher))
            .with_finalizer("example.io/cleanup")
            .build()
            .unwrap();

        assert_eq!(reconciler.context().settings.finalizer, "example.io/cleanup");
    }

    #[test]
    fn test_empty_finalizer_rejected() {
        let store = Arc::new(InMemoryStore::new());
        let collaborators = InMemoryCollaborators::new(store.clone()).collaborators();

        let result = ReconcilerBuilder::new()
            .with_store(store)
            .with_collaborators(collaborators)
            .with_finalizer("")
            .build();
        assert!(result.is_err());
    }
}
