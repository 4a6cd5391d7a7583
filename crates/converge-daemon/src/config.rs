//! Configuration for converged

use converge_controller::ControllerSettings;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Main daemon configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DaemonConfig {
    /// Controller and work queue configuration
    #[serde(default)]
    pub controller: ControllerConfig,

    /// Asset pipeline configuration
    #[serde(default)]
    pub assets: AssetsConfig,

    /// Simulated infrastructure
    #[serde(default)]
    pub simulation: SimulationConfig,

    /// Logging configuration
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Controller and work queue configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ControllerConfig {
    /// Finalizer token the controller places on topologies
    #[serde(default = "default_finalizer")]
    pub finalizer: String,

    /// Maximum concurrent reconciliation passes
    #[serde(default = "default_workers")]
    pub workers: usize,

    /// Interval at which every topology is re-enqueued
    #[serde(default = "default_resync_interval")]
    pub resync_interval_secs: u64,

    /// First retry delay after a failed pass
    #[serde(default = "default_backoff_base")]
    pub backoff_base_ms: u64,

    /// Upper bound of the retry delay
    #[serde(default = "default_backoff_max")]
    pub backoff_max_secs: u64,

    /// Capacity of the watch event buffer
    #[serde(default = "default_queue_capacity")]
    pub queue_capacity: usize,
}

impl Default for ControllerConfig {
    fn default() -> Self {
        Self {
            finalizer: default_finalizer(),
            workers: default_workers(),
            resync_interval_secs: default_resync_interval(),
            backoff_base_ms: default_backoff_base(),
            backoff_max_secs: default_backoff_max(),
            queue_capacity: default_queue_capacity(),
        }
    }
}

impl ControllerConfig {
    pub fn resync_interval(&self) -> Duration {
        Duration::from_secs(self.resync_interval_secs)
    }

    pub fn backoff_base(&self) -> Duration {
        Duration::from_millis(self.backoff_base_ms)
    }

    pub fn backoff_max(&self) -> Duration {
        Duration::from_secs(self.backoff_max_secs)
    }
}

/// Asset pipeline configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AssetsConfig {
    /// Manifest listing served by the uploader
    #[serde(default = "default_manifest_file")]
    pub manifest_file: String,

    /// Timeout of a manifest fetch
    #[serde(default = "default_fetch_timeout")]
    pub fetch_timeout_secs: u64,

    /// Suffix stripped from asset file names
    #[serde(default = "default_asset_suffix")]
    pub asset_suffix: String,
}

impl Default for AssetsConfig {
    fn default() -> Self {
        Self {
            manifest_file: default_manifest_file(),
            fetch_timeout_secs: default_fetch_timeout(),
            asset_suffix: default_asset_suffix(),
        }
    }
}

/// Simulated infrastructure configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SimulationConfig {
    #[serde(default)]
    pub enabled: bool,

    /// Interval between simulated operator rounds
    #[serde(default = "default_tick_interval")]
    pub tick_interval_ms: u64,
}

impl Default for SimulationConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            tick_interval_ms: default_tick_interval(),
        }
    }
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Log level
    #[serde(default = "default_log_level")]
    pub level: String,

    /// JSON format
    #[serde(default)]
    pub json: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            json: false,
        }
    }
}

// Default value helpers
fn default_finalizer() -> String {
    ControllerSettings::default().finalizer
}

fn default_workers() -> usize {
    4
}

fn default_resync_interval() -> u64 {
    300
}

fn default_backoff_base() -> u64 {
    500
}

fn default_backoff_max() -> u64 {
    300
}

fn default_queue_capacity() -> usize {
    1024
}

fn default_manifest_file() -> String {
    ControllerSettings::default().manifest_file
}

fn default_fetch_timeout() -> u64 {
    30
}

fn default_asset_suffix() -> String {
    ControllerSettings::default().asset_suffix
}

fn default_tick_interval() -> u64 {
    500
}

fn default_log_level() -> String {
    "info".to_string()
}

impl DaemonConfig {
    /// Load configuration: defaults, then the optional file, then
    /// `CONVERGE_`-prefixed environment variables (`__` separates sections)
    pub fn load(path: Option<&str>) -> Result<Self, config::ConfigError> {
        let mut builder = config::Config::builder();

        // Add default configuration
        builder = builder.add_source(config::Config::try_from(&DaemonConfig::default())?);

        // Add file configuration if provided
        if let Some(path) = path {
            builder = builder.add_source(config::File::with_name(path).required(false));
        }

        builder = builder.add_source(
            config::Environment::with_prefix("CONVERGE")
                .prefix_separator("_")
                .separator("__")
                .try_parsing(true),
        );

        builder.build()?.try_deserialize()
    }

    /// Settings handed to the controller
    pub fn controller_settings(&self) -> ControllerSettings {
        ControllerSettings {
            finalizer: self.controller.finalizer.clone(),
            manifest_file: self.assets.manifest_file.clone(),
            asset_suffix: self.assets.asset_suffix.clone(),
            ..ControllerSettings::default()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_default_config() {
        let config = DaemonConfig::default();
        assert_eq!(config.controller.workers, 4);
        assert_eq!(config.assets.manifest_file, "assets.sha256sum");
        assert_eq!(config.assets.asset_suffix, ".qcow2");
        assert!(!config.simulation.enabled);
    }

    #[test]
    fn test_controller_settings_follow_config() {
        let mut config = DaemonConfig::default();
        config.controller.finalizer = "example.io/cleanup".into();
        config.assets.manifest_file = "images.sha256".into();

        let settings = config.controller_settings();
        assert_eq!(settings.finalizer, "example.io/cleanup");
        assert_eq!(settings.manifest_file, "images.sha256");
        assert_eq!(settings.uploader_port, 9876);
    }

    #[test]
    fn test_load_from_file() {
        let mut file = tempfile::Builder::new().suffix(".yaml").tempfile().unwrap();
        writeln!(
            file,
            "controller:\n  workers: 8\nsimulation:\n  enabled: true"
        )
        .unwrap();

        let config = DaemonConfig::load(file.path().to_str()).unwrap();
        assert_eq!(config.controller.workers, 8);
        assert!(config.simulation.enabled);
        assert_eq!(config.controller.backoff_base_ms, 500);
    }

    #[test]
    fn test_missing_file_falls_back_to_defaults() {
        let config = DaemonConfig::load(Some("/nonexistent/converged")).unwrap();
        assert_eq!(config.controller.resync_interval(), Duration::from_secs(300));
    }
}
