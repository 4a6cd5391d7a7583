//! Controller error types

use converge_types::{ConditionType, ObjectKey, Reason, Severity};
use thiserror::Error;

/// Errors surfaced by a resource store
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("{kind} {key} not found")]
    NotFound { kind: String, key: ObjectKey },

    #[error("{kind} {key} already exists")]
    AlreadyExists { kind: String, key: ObjectKey },

    #[error("Conflict writing {kind} {key}: resource version {expected} is stale")]
    Conflict {
        kind: String,
        key: ObjectKey,
        expected: u64,
    },

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Store backend error: {0}")]
    Backend(String),
}

impl StoreError {
    pub fn is_not_found(&self) -> bool {
        matches!(self, StoreError::NotFound { .. })
    }
}

/// Result type for store operations
pub type StoreResult<T> = std::result::Result<T, StoreError>;

/// Errors surfaced by external collaborators
#[derive(Debug, Error)]
pub enum CollaboratorError {
    #[error("{0} not found")]
    NotFound(String),

    #[error("Unavailable: {0}")]
    Unavailable(String),

    #[error("Rejected: {0}")]
    Rejected(String),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error(transparent)]
    Store(#[from] StoreError),
}

impl CollaboratorError {
    pub fn is_not_found(&self) -> bool {
        match self {
            CollaboratorError::NotFound(_) => true,
            CollaboratorError::Store(e) => e.is_not_found(),
            _ => false,
        }
    }
}

/// Result type for collaborator calls
pub type CollaboratorResult<T> = std::result::Result<T, CollaboratorError>;

/// Reconciliation errors
#[derive(Debug, Error)]
pub enum ReconcileError {
    #[error("{kind} {key} not found")]
    NotFound { kind: String, key: ObjectKey },

    #[error("Conflict writing {kind} {key}")]
    Conflict { kind: String, key: ObjectKey },

    #[error("Store error: {0}")]
    Store(StoreError),

    #[error("{collaborator} failed: {source}")]
    Collaborator {
        collaborator: &'static str,
        #[source]
        source: CollaboratorError,
    },

    #[error("Fetching {url} failed: {message}")]
    Fetch { url: String, message: String },

    #[error("Invalid spec: {0}")]
    InvalidSpec(String),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Controller configuration error: {0}")]
    Configuration(String),

    /// Failure pinned to the condition it must be reported against
    #[error("{source}")]
    Scoped {
        condition: ConditionType,
        #[source]
        source: Box<ReconcileError>,
    },
}

impl From<StoreError> for ReconcileError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::NotFound { kind, key } => ReconcileError::NotFound { kind, key },
            StoreError::Conflict { kind, key, .. } => ReconcileError::Conflict { kind, key },
            other => ReconcileError::Store(other),
        }
    }
}

impl ReconcileError {
    pub fn collaborator(collaborator: &'static str, source: CollaboratorError) -> Self {
        ReconcileError::Collaborator {
            collaborator,
            source,
        }
    }

    /// Pins the error to a condition other than the failing stage's own
    pub fn scoped(self, condition: ConditionType) -> Self {
        match self {
            // innermost scope wins
            scoped @ ReconcileError::Scoped { .. } => scoped,
            other => ReconcileError::Scoped {
                condition,
                source: Box::new(other),
            },
        }
    }

    pub fn condition(&self) -> Option<ConditionType> {
        match self {
            ReconcileError::Scoped { condition, .. } => Some(*condition),
            _ => None,
        }
    }

    /// The error with any condition scoping stripped
    pub fn root(&self) -> &ReconcileError {
        match self {
            ReconcileError::Scoped { source, .. } => source.root(),
            other => other,
        }
    }

    pub fn is_not_found(&self) -> bool {
        match self.root() {
            ReconcileError::NotFound { .. } => true,
            ReconcileError::Collaborator { source, .. } => source.is_not_found(),
            _ => false,
        }
    }

    /// Condition reason a failure is reported with
    pub fn reason(&self) -> Reason {
        if self.is_not_found() {
            Reason::Requested
        } else {
            Reason::Error
        }
    }

    /// Condition severity a failure is reported with
    pub fn severity(&self) -> Severity {
        if self.is_not_found() {
            Severity::Info
        } else {
            Severity::Warning
        }
    }
}

/// Result type for reconciliation
pub type Result<T> = std::result::Result<T, ReconcileError>;

#[cfg(test)]
mod tests {
    use super::*;

    fn not_found() -> ReconcileError {
        StoreError::NotFound {
            kind: "Secret".into(),
            key: ObjectKey::new("ns", "osp-secret"),
        }
        .into()
    }

    #[test]
    fn test_not_found_is_requested_info() {
        let err = not_found();
        assert!(err.is_not_found());
        assert_eq!(err.reason(), Reason::Requested);
        assert_eq!(err.severity(), Severity::Info);
    }

    #[test]
    fn test_scoping_keeps_classification_and_message() {
        let err = not_found().scoped(ConditionType::InputReady);
        assert_eq!(err.condition(), Some(ConditionType::InputReady));
        assert!(err.is_not_found());
        assert_eq!(err.to_string(), "Secret ns/osp-secret not found");

        let rescoped = err.scoped(ConditionType::DbReady);
        assert_eq!(rescoped.condition(), Some(ConditionType::InputReady));
    }

    #[test]
    fn test_collaborator_failure_is_warning() {
        let err = ReconcileError::collaborator(
            "job runner",
            CollaboratorError::Unavailable("scheduler down".into()),
        );
        assert!(!err.is_not_found());
        assert_eq!(err.reason(), Reason::Error);
        assert_eq!(err.severity(), Severity::Warning);
    }

    #[test]
    fn test_store_conflict_maps_to_conflict() {
        let err: ReconcileError = StoreError::Conflict {
            kind: "Topology".into(),
            key: ObjectKey::new("ns", "lb"),
            expected: 3,
        }
        .into();
        assert!(matches!(err, ReconcileError::Conflict { .. }));
    }
}
