//! Convergence stages in pipeline order

mod api;
mod attachments;
mod config;
mod converged;
mod credentials;
mod database;
mod init;
mod input_hash;
mod migration;
mod network;
mod rbac;
mod transport;

pub use api::ApiStage;
pub(crate) use api::workload_template;
pub use attachments::AttachmentsStage;
pub use config::{ConfigStage, PASSWORD_FIELD};
pub use converged::ConvergedStage;
pub use credentials::CredentialsStage;
pub use database::DatabaseStage;
pub use init::InitStage;
pub use input_hash::InputHashStage;
pub use migration::MigrationStage;
pub use network::NetworkStage;
pub use rbac::RbacStage;
pub use transport::TransportStage;

use std::time::Duration;

use crate::assets::AssetPipelineStage;
use crate::pipeline::Stage;
use crate::rollout::{DependentRolesStage, PrimaryRoleStage};

/// Poll interval while databases are being created
pub const DATABASE_POLL: Duration = Duration::from_secs(5);

/// Poll interval of the migration job
pub const JOB_POLL: Duration = Duration::from_secs(5);

/// Poll interval while waiting on the transport secret
pub const TRANSPORT_POLL: Duration = Duration::from_secs(10);

/// Poll interval while network attachments are missing
pub const ATTACHMENT_POLL: Duration = Duration::from_secs(10);

/// Every stage of a full convergence pass, in order
pub fn standard() -> Vec<Box<dyn Stage>> {
    vec![
        Box::new(InitStage),
        Box::new(CredentialsStage),
        Box::new(DatabaseStage),
        Box::new(ConfigStage),
        Box::new(InputHashStage),
        Box::new(MigrationStage),
        Box::new(RbacStage),
        Box::new(TransportStage),
        Box::new(AttachmentsStage),
        Box::new(NetworkStage),
        Box::new(ApiStage),
        Box::new(PrimaryRoleStage),
        Box::new(DependentRolesStage),
        Box::new(AssetPipelineStage),
        Box::new(ConvergedStage),
    ]
}
