//! Converge daemon library
//!
//! This module provides the pieces of the `converged` process:
//! - Layered configuration
//! - Manifest loading into the store
//! - Watch-driven scheduler with per-topology backoff
//! - Daemon lifecycle and signal handling

#![deny(unsafe_code)]

pub mod config;
pub mod daemon;
pub mod error;
pub mod manifest;
pub mod scheduler;

pub use config::DaemonConfig;
pub use daemon::{shutdown_signal, Daemon};
pub use error::{DaemonError, DaemonResult};
pub use manifest::Manifest;
pub use scheduler::{Backoff, Scheduler, WorkQueue};
