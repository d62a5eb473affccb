//! Shared test utilities for the cloud test harness
//!
//! Fakes for the two seams the core talks through (probes and the cloud
//! control plane) plus small helpers for naming and logging in tests.
//!
//! ## Modules
//!
//! - [`probe`]: Scripted probes that replay a sequence of states
//! - [`cloud`]: Recording fake of the destructive cloud calls
//! - [`session`]: Unique session ids and test log setup

pub mod cloud;
pub mod probe;
pub mod session;

// Re-export commonly used items
pub use cloud::RecordingCloud;
pub use probe::ScriptedProbe;
pub use session::{init_test_logging, test_session_id};
