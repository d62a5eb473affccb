//! Default configuration values shared by the harness crates
//!
//! Poll timings mirror what the remote control plane needs in practice:
//! instances settle within minutes, snapshots can take much longer but
//! report progress while they do.

/// Default interval between state observations (seconds)
pub const DEFAULT_POLL_INTERVAL_SECS: u64 = 5;

/// Default number of observations before giving up
pub const DEFAULT_MAX_ATTEMPTS: u32 = 60;

/// Default overall wait timeout (seconds)
pub const DEFAULT_WAIT_TIMEOUT_SECS: u64 = 300;

/// Instance start/stop wait timeout (10 minutes)
pub const DEFAULT_INSTANCE_WAIT_TIMEOUT_SECS: u64 = 600;

/// Volume create/attach/detach wait timeout (5 minutes)
pub const DEFAULT_VOLUME_WAIT_TIMEOUT_SECS: u64 = 300;

/// Observations without new progress before a snapshot wait is abandoned
pub const DEFAULT_SNAPSHOT_GRACE_ATTEMPTS: u32 = 20;

/// Hard cap on a snapshot wait regardless of progress (1 hour)
pub const DEFAULT_SNAPSHOT_WAIT_TIMEOUT_SECS: u64 = 3600;

/// Upper bound on a single probe call (seconds)
pub const DEFAULT_PROBE_TIMEOUT_SECS: u64 = 60;

/// Attempts for a retryable destroy call (throttling, dependency violation)
pub const DEFAULT_CLEANUP_RETRY_ATTEMPTS: usize = 4;

/// Prefix for generated session identifiers
pub const DEFAULT_SESSION_PREFIX: &str = "harness";

// Serde default functions for struct field defaults

/// Returns the default poll interval
pub fn default_poll_interval_secs() -> u64 {
    DEFAULT_POLL_INTERVAL_SECS
}

/// Returns the default attempt budget
pub fn default_max_attempts() -> Option<u32> {
    Some(DEFAULT_MAX_ATTEMPTS)
}

/// Returns the default wait timeout
pub fn default_wait_timeout_secs() -> Option<u64> {
    Some(DEFAULT_WAIT_TIMEOUT_SECS)
}

/// Returns the default per-probe timeout
pub fn default_probe_timeout_secs() -> Option<u64> {
    Some(DEFAULT_PROBE_TIMEOUT_SECS)
}

/// Returns the default cleanup retry attempts
pub fn default_cleanup_retry_attempts() -> usize {
    DEFAULT_CLEANUP_RETRY_ATTEMPTS
}

/// Returns the default session prefix
pub fn default_session_prefix() -> String {
    DEFAULT_SESSION_PREFIX.to_string()
}
