//! Registry of resources created by a test session
//!
//! Resources are registered the moment the remote create call returns, so a
//! failure anywhere later in the test still leaves them reachable for
//! teardown. The plain [`ResourceRegistry`] is single-owner; use
//! [`SharedRegistry`] when several tasks register concurrently, or give each
//! task its own registry and [`ResourceRegistry::merge`] them at teardown.

mod shared;
mod store;
pub mod types;

pub use shared::SharedRegistry;
pub use store::{RegistrySnapshot, ResourceRegistry};
pub use types::{ResourceHandle, ResourceMeta, TrackedResource};
