//! Converge Types - declared topology, status record and readiness ledger
//!
//! The data model shared by the convergence controller and the daemon that
//! drives it.
//!
//! ## Key Concepts
//!
//! - **Topology**: the declared, multi-component service topology (root object)
//! - **TopologyStatus**: controller-owned status record attached to a topology
//! - **Conditions**: ordered readiness ledger with a summarising `Ready` entry
//! - **Role**: fixed set of worker roles, one primary gating the rest
//! - **Child kinds**: databases, accounts, transport, API and role resources
//!   owned by a topology

#![deny(unsafe_code)]
#![cfg_attr(feature = "strict-docs", warn(missing_docs))]
#![cfg_attr(not(feature = "strict-docs"), allow(missing_docs))]

pub mod condition;
pub mod meta;
pub mod resource;
pub mod resources;
pub mod role;
pub mod topology;

pub use condition::{Condition, ConditionStatus, ConditionType, Conditions, Reason, Severity};
pub use meta::{ObjectKey, ObjectMeta, OwnerReference};
pub use resource::Resource;
pub use resources::{
    ApiDeployment, ApiDeploymentSpec, Database, DatabaseAccount, DatabaseAccountSpec,
    DatabaseAccountStatus, DatabaseSpec, DatabaseStatus, RoleController, RoleControllerSpec,
    Secret, Service, ServicePort, ServiceSpec, TransportUrl, TransportUrlSpec, TransportUrlStatus,
    WorkloadStatus, WorkloadTemplate,
};
pub use role::Role;
pub use topology::{ApiSpec, ManagementNetworkSpec, RoleSpec, Topology, TopologySpec, TopologyStatus};
