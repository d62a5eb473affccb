//! Error taxonomy for waiting, task running and cleanup
//!
//! Every failure the core can surface maps to exactly one [`ErrorKind`], so
//! callers can branch on the category without matching on message text.

use crate::task::ArgumentError;
use crate::wait::ObservedState;
use std::any::Any;
use std::time::Duration;
use thiserror::Error;

/// Category of a core failure
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// Deadline or attempt budget exhausted without reaching a terminal state
    Timeout,
    /// Progress-aware grace budget exhausted
    NoProgress,
    /// The probe reported a definitive remote failure
    RemoteFailure,
    /// The probe call itself failed
    ProbeFailure,
    /// wait/kill on an id with no live task
    UnknownTask,
    /// A single resource could not be destroyed (collected, never raised)
    CleanupFailure,
    /// A poll policy or terminal set was rejected before probing
    InvalidPolicy,
    /// Task arguments could not be resolved against the signature
    InvalidArguments,
}

/// Poll policy validation errors
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PolicyError {
    /// Neither an attempt budget nor a timeout was set
    #[error("poll policy needs max_attempts or timeout")]
    Unbounded,

    /// Non-zero budget with a zero interval would busy-loop
    #[error("poll interval must be greater than 0 when the budget is non-zero")]
    ZeroInterval,

    /// Backoff cap lower than the base interval
    #[error("backoff cap {cap:?} is below the poll interval {interval:?}")]
    BackoffBelowInterval { interval: Duration, cap: Duration },

    /// Probe timeout of zero would fail every probe
    #[error("probe timeout must be greater than 0")]
    ZeroProbeTimeout,

    /// Progress waiter used with a policy not marked progress-aware
    #[error("progress waiter requires a progress-aware policy")]
    NotProgressAware,

    /// Progress waiter needs an attempt count for its grace budget
    #[error("progress waiter requires max_attempts as its grace budget")]
    MissingGraceBudget,

    /// Empty terminal state set
    #[error("terminal state set cannot be empty")]
    NoTerminalStates,
}

/// Failure of a state or progress wait
#[derive(Debug, Error)]
pub enum WaitError {
    #[error(
        "Timeout waiting for {resource} after {elapsed:?} ({attempts} attempts, last state: {})",
        describe_last(.last)
    )]
    Timeout {
        resource: String,
        attempts: u32,
        elapsed: Duration,
        last: Option<ObservedState>,
    },

    #[error(
        "No progress on {resource} after {grace} consecutive observations (last progress: {last_progress:?}, last state: {})",
        describe_last(.last)
    )]
    NoProgress {
        resource: String,
        grace: u32,
        attempts: u32,
        last_progress: Option<f64>,
        last: Option<ObservedState>,
    },

    #[error("{resource} entered failed state '{}'", .state.value)]
    RemoteFailure {
        resource: String,
        attempts: u32,
        state: ObservedState,
    },

    #[error("Probe for {resource} failed on attempt {attempts}: {source:#}")]
    ProbeFailure {
        resource: String,
        attempts: u32,
        #[source]
        source: anyhow::Error,
    },

    #[error(transparent)]
    InvalidPolicy(#[from] PolicyError),
}

impl WaitError {
    /// Category of this failure
    pub fn kind(&self) -> ErrorKind {
        match self {
            WaitError::Timeout { .. } => ErrorKind::Timeout,
            WaitError::NoProgress { .. } => ErrorKind::NoProgress,
            WaitError::RemoteFailure { .. } => ErrorKind::RemoteFailure,
            WaitError::ProbeFailure { .. } => ErrorKind::ProbeFailure,
            WaitError::InvalidPolicy(_) => ErrorKind::InvalidPolicy,
        }
    }

    /// Last state observed before giving up, if any
    pub fn last_state(&self) -> Option<&ObservedState> {
        match self {
            WaitError::Timeout { last, .. } | WaitError::NoProgress { last, .. } => last.as_ref(),
            WaitError::RemoteFailure { state, .. } => Some(state),
            WaitError::ProbeFailure { .. } | WaitError::InvalidPolicy(_) => None,
        }
    }
}

fn describe_last(last: &Option<ObservedState>) -> String {
    match last {
        Some(state) => state.to_string(),
        None => "none observed".to_string(),
    }
}

/// Task runner errors
#[derive(Debug, Error)]
pub enum TaskError {
    /// No live task with this id (never launched, already waited on, or killed)
    #[error("unknown task id '{0}'")]
    UnknownTask(String),

    /// Arguments rejected at launch; no worker was started
    #[error("invalid arguments for task '{task}': {source}")]
    InvalidArguments {
        task: String,
        #[source]
        source: ArgumentError,
    },
}

impl TaskError {
    /// Category of this failure
    pub fn kind(&self) -> ErrorKind {
        match self {
            TaskError::UnknownTask(_) => ErrorKind::UnknownTask,
            TaskError::InvalidArguments { .. } => ErrorKind::InvalidArguments,
        }
    }
}

/// Message carried by a caught panic payload
pub(crate) fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "panicked".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_timeout_display_includes_last_state() {
        let err = WaitError::Timeout {
            resource: "volume vol-1".into(),
            attempts: 3,
            elapsed: Duration::from_secs(10),
            last: Some(ObservedState::new("creating")),
        };
        let msg = err.to_string();
        assert!(msg.contains("volume vol-1"));
        assert!(msg.contains("creating"));
        assert_eq!(err.kind(), ErrorKind::Timeout);
        assert_eq!(err.last_state().map(|s| s.value.as_str()), Some("creating"));
    }

    #[test]
    fn test_timeout_without_observation() {
        let err = WaitError::Timeout {
            resource: "instance i-1".into(),
            attempts: 0,
            elapsed: Duration::ZERO,
            last: None,
        };
        assert!(err.to_string().contains("none observed"));
        assert!(err.last_state().is_none());
    }

    #[test]
    fn test_probe_failure_keeps_source_chain() {
        let source = anyhow::anyhow!("connection reset").context("DescribeVolumes failed");
        let err = WaitError::ProbeFailure {
            resource: "volume vol-1".into(),
            attempts: 1,
            source,
        };
        let msg = err.to_string();
        assert!(msg.contains("DescribeVolumes failed"));
        assert!(msg.contains("connection reset"));
        assert_eq!(err.kind(), ErrorKind::ProbeFailure);
    }

    #[test]
    fn test_policy_error_is_invalid_policy() {
        let err: WaitError = PolicyError::Unbounded.into();
        assert_eq!(err.kind(), ErrorKind::InvalidPolicy);
        assert_eq!(err.to_string(), "poll policy needs max_attempts or timeout");
    }

    #[test]
    fn test_task_error_kinds() {
        assert_eq!(TaskError::UnknownTask("t".into()).kind(), ErrorKind::UnknownTask);
        let err = TaskError::InvalidArguments {
            task: "t".into(),
            source: ArgumentError::Missing("volume_id".into()),
        };
        assert_eq!(err.kind(), ErrorKind::InvalidArguments);
        assert!(err.to_string().contains("volume_id"));
    }
}

