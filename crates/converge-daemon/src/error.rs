//! Daemon error types

use converge_controller::{CollaboratorError, ReconcileError, StoreError};
use thiserror::Error;

/// Errors surfaced while starting or running the daemon
#[derive(Debug, Error)]
pub enum DaemonError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Manifest error: {0}")]
    Manifest(String),

    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Collaborator error: {0}")]
    Collaborator(#[from] CollaboratorError),

    #[error("Reconcile error: {0}")]
    Reconcile(#[from] ReconcileError),
}

impl From<config::ConfigError> for DaemonError {
    fn from(err: config::ConfigError) -> Self {
        DaemonError::Config(err.to_string())
    }
}

/// Result type for daemon operations
pub type DaemonResult<T> = Result<T, DaemonError>;
