//! Shared context handed to every stage

use converge_types::Resource;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use crate::collaborators::Collaborators;
use crate::store::{Api, ResourceStore};

/// Tunables of the controller
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ControllerSettings {
    /// Finalizer token marking this controller's cleanup obligation
    #[serde(default = "default_finalizer")]
    pub finalizer: String,

    /// Manifest listing served by the asset uploader
    #[serde(default = "default_manifest_file")]
    pub manifest_file: String,

    /// Suffix stripped from asset file names
    #[serde(default = "default_asset_suffix")]
    pub asset_suffix: String,

    /// Port the asset uploader service listens on
    #[serde(default = "default_uploader_port")]
    pub uploader_port: u16,

    /// Container port of the asset uploader
    #[serde(default = "default_uploader_target_port")]
    pub uploader_target_port: u16,
}

fn default_finalizer() -> String {
    "converge.io/topology".to_string()
}

fn default_manifest_file() -> String {
    "assets.sha256sum".to_string()
}

fn default_asset_suffix() -> String {
    ".qcow2".to_string()
}

fn default_uploader_port() -> u16 {
    9876
}

fn default_uploader_target_port() -> u16 {
    8080
}

impl Default for ControllerSettings {
    fn default() -> Self {
        Self {
            finalizer: default_finalizer(),
            manifest_file: default_manifest_file(),
            asset_suffix: default_asset_suffix(),
            uploader_port: default_uploader_port(),
            uploader_target_port: default_uploader_target_port(),
        }
    }
}

/// Store, collaborators and settings of one controller
#[derive(Clone)]
pub struct ControllerContext {
    pub store: Arc<dyn ResourceStore>,
    pub collaborators: Collaborators,
    pub settings: ControllerSettings,
}

impl ControllerContext {
    pub fn new(
        store: Arc<dyn ResourceStore>,
        collaborators: Collaborators,
        settings: ControllerSettings,
    ) -> Self {
        Self {
            store,
            collaborators,
            settings,
        }
    }

    /// Typed store access for one kind
    pub fn api<K: Resource>(&self) -> Api<K> {
        Api::new(Arc::clone(&self.store))
    }
}
