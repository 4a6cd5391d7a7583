//! Object metadata shared by every stored resource
//!
//! Mirrors the identity and lifecycle fields an orchestrating store keeps for
//! each object: identity, optimistic-concurrency version, generation,
//! finalizers, the deletion marker and owner linkage.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// Namespaced identity of a stored object
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ObjectKey {
    pub namespace: String,
    pub name: String,
}

impl ObjectKey {
    pub fn new(namespace: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            namespace: namespace.into(),
            name: name.into(),
        }
    }

    /// Key of a sibling object in the same namespace
    pub fn sibling(&self, name: impl Into<String>) -> Self {
        Self::new(self.namespace.clone(), name)
    }
}

impl fmt::Display for ObjectKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.namespace, self.name)
    }
}

/// Link from an owned object back to its owner
///
/// Owners always live in the same namespace as the objects they own.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OwnerReference {
    pub kind: String,
    pub name: String,
    pub uid: String,

    /// Whether the owner is the managing controller of the object
    #[serde(default)]
    pub controller: bool,
}

/// Metadata carried by every stored object
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ObjectMeta {
    pub name: String,

    pub namespace: String,

    /// Assigned by the store on create
    #[serde(default)]
    pub uid: String,

    /// Optimistic-concurrency token, bumped on every persisted change
    #[serde(default)]
    pub resource_version: u64,

    /// Bumped by the store whenever the desired content changes
    #[serde(default)]
    pub generation: i64,

    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub labels: BTreeMap<String, String>,

    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub annotations: BTreeMap<String, String>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub finalizers: Vec<String>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub owner_references: Vec<OwnerReference>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub creation_timestamp: Option<DateTime<Utc>>,

    /// Deletion marker; set by the store when a delete is blocked by finalizers
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub deletion_timestamp: Option<DateTime<Utc>>,
}

impl ObjectMeta {
    pub fn new(namespace: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            namespace: namespace.into(),
            ..Default::default()
        }
    }

    pub fn key(&self) -> ObjectKey {
        ObjectKey::new(self.namespace.clone(), self.name.clone())
    }

    pub fn is_deleting(&self) -> bool {
        self.deletion_timestamp.is_some()
    }

    pub fn has_finalizer(&self, finalizer: &str) -> bool {
        self.finalizers.iter().any(|f| f == finalizer)
    }

    /// Adds the finalizer, returning `true` if it was not already present
    pub fn add_finalizer(&mut self, finalizer: &str) -> bool {
        if self.has_finalizer(finalizer) {
            return false;
        }
        self.finalizers.push(finalizer.to_string());
        true
    }

    /// Removes the finalizer, returning `true` if it was present
    pub fn remove_finalizer(&mut self, finalizer: &str) -> bool {
        let before = self.finalizers.len();
        self.finalizers.retain(|f| f != finalizer);
        before != self.finalizers.len()
    }

    pub fn is_owned_by(&self, uid: &str) -> bool {
        self.owner_references.iter().any(|r| r.uid == uid)
    }

    /// Sets or replaces the controlling owner reference
    pub fn set_controller(&mut self, owner: OwnerReference) {
        self.owner_references.retain(|r| !r.controller && r.uid != owner.uid);
        self.owner_references.push(OwnerReference {
            controller: true,
            ..owner
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_finalizer_add_remove() {
        let mut meta = ObjectMeta::new("ns", "demo");

        assert!(meta.add_finalizer("converge.io/topology"));
        assert!(!meta.add_finalizer("converge.io/topology"));
        assert_eq!(meta.finalizers.len(), 1);

        assert!(meta.remove_finalizer("converge.io/topology"));
        assert!(!meta.remove_finalizer("converge.io/topology"));
        assert!(meta.finalizers.is_empty());
    }

    #[test]
    fn test_set_controller_replaces_previous_owner() {
        let mut meta = ObjectMeta::new("ns", "child");
        meta.set_controller(OwnerReference {
            kind: "Topology".into(),
            name: "a".into(),
            uid: "uid-a".into(),
            controller: true,
        });
        meta.set_controller(OwnerReference {
            kind: "Topology".into(),
            name: "b".into(),
            uid: "uid-b".into(),
            controller: false,
        });

        assert_eq!(meta.owner_references.len(), 1);
        assert!(meta.is_owned_by("uid-b"));
        assert!(meta.owner_references[0].controller);
    }

    #[test]
    fn test_key_display() {
        let key = ObjectKey::new("openstack", "lb");
        assert_eq!(key.to_string(), "openstack/lb");
        assert_eq!(key.sibling("lb-api"), ObjectKey::new("openstack", "lb-api"));
    }
}
