//! harness-common - Shared types for the cloud test harness
//!
//! SDK-free types used by the core library, the test utilities and the CLI.
//!
//! ## Modules
//!
//! - [`defaults`]: Default poll and cleanup values
//! - [`resource_kind`]: Resource kind tags and teardown ordering

pub mod defaults;
pub mod resource_kind;

pub use resource_kind::{CustomTag, ParseKindError, ResourceKind};

/// Get the current timestamp in milliseconds since UNIX epoch.
///
/// Returns 0 if system time is before the epoch (should never happen in practice).
#[inline]
pub fn timestamp_millis() -> i64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_millis() as i64)
        .unwrap_or(0)
}
