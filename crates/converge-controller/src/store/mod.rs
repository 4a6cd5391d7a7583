//! Resource store access
//!
//! The store itself is external; the controller talks to it through the
//! object-safe [`ResourceStore`] trait and the typed [`Api`] wrapper.

mod api;
mod memory;
mod traits;

pub use api::Api;
pub use memory::{InMemoryStore, DEFAULT_EVENT_CAPACITY};
pub use traits::{ChangeKind, ResourceStore, StoredObject, WatchEvent};
