//! # Converge Controller
//!
//! Staged convergence of declared service topologies.
//!
//! ## Overview
//!
//! A [`Reconciler`] drives one topology at a time through an ordered
//! [`Pipeline`] of stages. Every pass re-derives the desired state of the
//! children the topology owns, upserts them idempotently, consults content
//! hashes before repeating expensive work and folds what it observed into the
//! topology's condition ledger.
//!
//! ## Key Components
//!
//! - [`Reconciler`]: dispatcher of a single pass (finalizer, deletion, status)
//! - [`ReconcilerBuilder`]: wires store, collaborators and settings
//! - [`Pipeline`] / [`Stage`]: ordered stages with a uniform result
//! - [`hash`]: change-hash gate over serialized inputs
//! - [`upsert::create_or_update`]: idempotent child upsert
//! - [`rollout`]: primary-first rollout barrier for worker roles
//! - [`assets`]: transient uploader driven asset import
//! - [`deletion`]: finalizer release cascade
//! - [`store`]: resource store contract, typed [`Api`] and in-memory backend
//! - [`collaborators`]: contracts of the external provisioners
//!
//! ## Example
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use converge_controller::{InMemoryCollaborators, InMemoryStore, ReconcilerBuilder};
//! use converge_types::ObjectKey;
//!
//! # async fn example() -> converge_controller::Result<()> {
//! let store = Arc::new(InMemoryStore::new());
//! let collaborators = InMemoryCollaborators::new(store.clone());
//!
//! let reconciler = ReconcilerBuilder::new()
//!     .with_store(store)
//!     .with_collaborators(collaborators.collaborators())
//!     .build()?;
//!
//! let action = reconciler.reconcile(&ObjectKey::new("openstack", "octavia")).await?;
//! println!("next: {:?}", action);
//! # Ok(())
//! # }
//! ```

#![deny(unsafe_code)]
#![cfg_attr(feature = "strict-docs", warn(missing_docs))]
#![cfg_attr(not(feature = "strict-docs"), allow(missing_docs))]

pub mod assets;
pub mod builder;
pub mod collaborators;
pub mod context;
pub mod deletion;
pub mod error;
pub mod hash;
pub mod naming;
pub mod pipeline;
pub mod reconciler;
pub mod rollout;
pub mod simulation;
pub mod stages;
pub mod store;
pub mod upsert;

pub use assets::{parse_manifest, AssetManifestEntry, AssetPipelineStage};
pub use builder::ReconcilerBuilder;
pub use collaborators::{Collaborators, HttpManifestFetcher, InMemoryCollaborators};
pub use context::{ControllerContext, ControllerSettings};
pub use error::{
    CollaboratorError, CollaboratorResult, ReconcileError, Result, StoreError, StoreResult,
};
pub use pipeline::{PassState, Pipeline, PipelineOutcome, Stage, StageName, StageResult};
pub use reconciler::{Action, Reconciler};
pub use simulation::{InfrastructureSimulator, TickReport};
pub use store::{Api, ChangeKind, InMemoryStore, ResourceStore, StoredObject, WatchEvent};
pub use upsert::{create_or_update, Operation};
