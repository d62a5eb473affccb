//! harness-core - Resource lifecycle synchronization for cloud integration tests
//!
//! A test creates remote resources, registers each one the moment it exists,
//! waits for it to become usable and, whatever happens, tears everything down
//! at the end of the session.
//!
//! ## Modules
//!
//! - [`policy`]: How long and how often to poll
//! - [`wait`]: State and progress-aware waiters
//! - [`registry`]: Per-session catalog of created resources
//! - [`cleanup`]: Destroy strategies and the teardown sweep
//! - [`task`]: Concurrent test bodies with result channels
//! - [`session`]: Registry plus teardown, finished exactly once
//! - [`remote_error`]: Provider error code classification
//! - [`config`]: JSON configuration

pub mod cleanup;
pub mod config;
pub mod error;
pub mod policy;
pub mod registry;
pub mod remote_error;
pub mod session;
pub mod task;
pub mod wait;

pub use cleanup::{CleanupDispatcher, CleanupResult, DestroyTable, SweepReport};
pub use error::{ErrorKind, PolicyError, TaskError, WaitError};
pub use policy::PollPolicy;
pub use registry::{ResourceHandle, ResourceRegistry, SharedRegistry};
pub use session::TestSession;
pub use task::{TaskArgs, TaskOutcome, TaskRunner, TaskSignature};
pub use wait::{ObservedState, wait_for_progress, wait_for_state};
