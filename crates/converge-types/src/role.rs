//! Worker roles
//!
//! The role set is fixed: one primary role whose readiness gates every
//! dependent role. Lookups from a role to its condition and naming are total
//! functions, so adding a role cannot leave a gap in any table.

use crate::condition::ConditionType;
use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    /// Primary role; owns the health-monitoring network every other role joins
    HealthManager,
    Housekeeping,
    Worker,
}

impl Role {
    pub const ALL: [Role; 3] = [Role::HealthManager, Role::Housekeeping, Role::Worker];

    pub const fn primary() -> Role {
        Role::HealthManager
    }

    pub fn is_primary(&self) -> bool {
        *self == Self::primary()
    }

    /// Dependent role rolled out first
    pub const fn first_dependent() -> Role {
        Role::Housekeeping
    }

    /// Roles gated on the primary role, in rollout order
    pub fn dependents() -> impl Iterator<Item = Role> {
        Self::ALL.into_iter().filter(|r| !r.is_primary())
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Role::HealthManager => "healthmanager",
            Role::Housekeeping => "housekeeping",
            Role::Worker => "worker",
        }
    }

    pub fn condition(&self) -> ConditionType {
        match self {
            Role::HealthManager => ConditionType::HealthManagerReady,
            Role::Housekeeping => ConditionType::HousekeepingReady,
            Role::Worker => ConditionType::WorkerReady,
        }
    }

    /// Name of the role controller resource for a topology
    pub fn resource_name(&self, topology: &str) -> String {
        format!("{}-{}", topology, self.as_str())
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn test_exactly_one_primary() {
        assert_eq!(Role::ALL.iter().filter(|r| r.is_primary()).count(), 1);
        assert!(Role::dependents().all(|r| !r.is_primary()));
        assert_eq!(Role::dependents().count(), Role::ALL.len() - 1);
        assert_eq!(Role::dependents().next(), Some(Role::first_dependent()));
    }

    #[test]
    fn test_role_conditions_are_distinct() {
        let conditions: HashSet<_> = Role::ALL.iter().map(Role::condition).collect();
        assert_eq!(conditions.len(), Role::ALL.len());
        assert!(!conditions.contains(&ConditionType::Ready));
    }

    #[test]
    fn test_resource_name() {
        assert_eq!(Role::Worker.resource_name("lb"), "lb-worker");
        assert_eq!(Role::primary().resource_name("lb"), "lb-healthmanager");
    }
}
