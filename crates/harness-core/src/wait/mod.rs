//! Waiting for remote resources to reach an expected state.
//!
//! Both waiters observe a resource through a caller-supplied probe and
//! suspend only the calling task between observations; they never spawn.
//!
//! - [`wait_for_state`]: fixed budget of attempts and/or a deadline
//! - [`wait_for_progress`]: budget renewed whenever reported progress grows
//!
//! A probe error is never retried: it ends the wait with
//! [`WaitError::ProbeFailure`]. Probes that want to ride out transient
//! transport errors must do so themselves.

mod progress;

pub use progress::wait_for_progress;

use crate::error::{PolicyError, WaitError};
use crate::policy::{PollDelays, PollPolicy};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::future::Future;
use tokio::time::Instant;
use tracing::{debug, warn};

/// One observation of a remote resource
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ObservedState {
    /// State token as reported by the control plane ("pending", "available", ...)
    pub value: String,
    /// Fractional progress in [0, 1], for progress-aware probes
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub progress: Option<f64>,
    /// The control plane says this operation will never succeed
    #[serde(default)]
    pub failed: bool,
}

impl ObservedState {
    pub fn new(value: impl Into<String>) -> Self {
        Self {
            value: value.into(),
            progress: None,
            failed: false,
        }
    }

    /// State reporting a definitive remote failure
    pub fn failed(value: impl Into<String>) -> Self {
        Self {
            failed: true,
            ..Self::new(value)
        }
    }

    pub fn with_progress(mut self, progress: f64) -> Self {
        self.progress = Some(progress);
        self
    }

    /// Whether this state is one of the accepted end states
    pub fn is_terminal(&self, terminal: &[&str]) -> bool {
        terminal.contains(&self.value.as_str())
    }
}

impl fmt::Display for ObservedState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.value)?;
        if let Some(progress) = self.progress {
            write!(f, " ({:.0}%)", progress * 100.0)?;
        }
        if self.failed {
            f.write_str(" [failed]")?;
        }
        Ok(())
    }
}

/// Wait until `probe` reports one of `terminal` states.
///
/// The probe is called at most `policy.max_attempts` times and, when a
/// timeout is set, never after the deadline has passed. The sleep before the
/// deadline is shortened so the wait ends at most one interval late.
///
/// # Returns
/// * `Ok(state)` - the terminal state, exactly as observed
/// * `Err(WaitError::RemoteFailure)` - probe set `failed`; no further probes
/// * `Err(WaitError::ProbeFailure)` - probe returned an error or timed out
/// * `Err(WaitError::Timeout)` - budget exhausted, carries the last state
///
/// # Example
/// ```ignore
/// let state = wait_for_state(
///     &format!("volume {}", volume_id),
///     &PollPolicy::volume(),
///     &["available"],
///     || async { cloud.describe_volume_state(&volume_id).await },
/// )
/// .await?;
/// ```
pub async fn wait_for_state<F, Fut>(
    resource: &str,
    policy: &PollPolicy,
    terminal: &[&str],
    mut probe: F,
) -> Result<ObservedState, WaitError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = anyhow::Result<ObservedState>>,
{
    check_inputs(policy, terminal)?;

    let start = Instant::now();
    let mut attempts = 0u32;
    let mut last: Option<ObservedState> = None;

    if !policy.has_budget() {
        warn!(resource = %resource, "Poll policy has no budget, failing without probing");
        return Err(WaitError::Timeout {
            resource: resource.to_string(),
            attempts,
            elapsed: start.elapsed(),
            last,
        });
    }

    let deadline = policy.timeout.map(|timeout| start + timeout);
    let mut delays = policy.delays();

    loop {
        attempts += 1;
        let state = observe(resource, policy, attempts, &mut probe).await?;

        if state.failed {
            warn!(resource = %resource, state = %state, attempts, "Resource entered failed state");
            return Err(WaitError::RemoteFailure {
                resource: resource.to_string(),
                attempts,
                state,
            });
        }

        if state.is_terminal(terminal) {
            debug!(resource = %resource, state = %state, attempts, "Resource reached terminal state");
            return Ok(state);
        }

        last = Some(state);

        if policy.max_attempts.is_some_and(|max| attempts >= max) {
            break;
        }
        let Some(delay) = next_sleep(&mut delays, deadline) else {
            break;
        };

        debug!(
            resource = %resource,
            attempt = attempts,
            state = ?last.as_ref().map(|s| s.value.as_str()),
            delay_ms = delay.as_millis(),
            "Resource not ready, retrying"
        );
        tokio::time::sleep(delay).await;
    }

    let elapsed = start.elapsed();
    warn!(
        resource = %resource,
        attempts,
        elapsed_ms = elapsed.as_millis(),
        "Timed out waiting for resource"
    );
    Err(WaitError::Timeout {
        resource: resource.to_string(),
        attempts,
        elapsed,
        last,
    })
}

fn check_inputs(policy: &PollPolicy, terminal: &[&str]) -> Result<(), PolicyError> {
    policy.validate()?;
    if terminal.is_empty() {
        return Err(PolicyError::NoTerminalStates);
    }
    Ok(())
}

/// Run one probe call, bounded by the policy's probe timeout
async fn observe<F, Fut>(
    resource: &str,
    policy: &PollPolicy,
    attempts: u32,
    probe: &mut F,
) -> Result<ObservedState, WaitError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = anyhow::Result<ObservedState>>,
{
    let result = match policy.probe_timeout {
        Some(limit) => match tokio::time::timeout(limit, probe()).await {
            Ok(result) => result,
            Err(_) => Err(anyhow::anyhow!("probe timed out after {:?}", limit)),
        },
        None => probe().await,
    };

    result.map_err(|source| {
        warn!(resource = %resource, attempts, error = ?source, "Resource probe failed");
        WaitError::ProbeFailure {
            resource: resource.to_string(),
            attempts,
            source,
        }
    })
}

/// Next sleep, shortened to land on the deadline; `None` once the deadline has passed
fn next_sleep(delays: &mut PollDelays, deadline: Option<Instant>) -> Option<std::time::Duration> {
    let delay = delays.next_delay();
    match deadline {
        Some(deadline) => {
            let now = Instant::now();
            if now >= deadline {
                None
            } else {
                Some(delay.min(deadline - now))
            }
        }
        None => Some(delay),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;
    use std::cell::RefCell;
    use std::collections::VecDeque;
    use std::time::Duration;

    fn scripted(states: &[&str]) -> RefCell<VecDeque<ObservedState>> {
        RefCell::new(states.iter().map(|s| ObservedState::new(*s)).collect())
    }

    #[tokio::test(start_paused = true)]
    async fn test_returns_first_terminal_state() {
        let script = scripted(&["pending", "pending", "running", "stopped"]);
        let calls = RefCell::new(0);

        let state = wait_for_state(
            "instance i-1",
            &PollPolicy::attempts(10, Duration::from_secs(1)),
            &["running"],
            || {
                *calls.borrow_mut() += 1;
                let next = script.borrow_mut().pop_front();
                async move { Ok(next.unwrap()) }
            },
        )
        .await
        .unwrap();

        assert_eq!(state.value, "running");
        assert_eq!(*calls.borrow(), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_attempt_budget_exhausted() {
        let calls = RefCell::new(0);
        let err = wait_for_state(
            "volume vol-1",
            &PollPolicy::attempts(4, Duration::from_secs(2)),
            &["available"],
            || {
                *calls.borrow_mut() += 1;
                async { Ok(ObservedState::new("creating")) }
            },
        )
        .await
        .unwrap_err();

        assert_eq!(err.kind(), ErrorKind::Timeout);
        assert_eq!(*calls.borrow(), 4);
        assert_eq!(err.last_state().unwrap().value, "creating");
    }

    #[tokio::test(start_paused = true)]
    async fn test_zero_budget_never_probes() {
        let calls = RefCell::new(0);
        let err = wait_for_state(
            "volume vol-1",
            &PollPolicy::attempts(0, Duration::ZERO),
            &["available"],
            || {
                *calls.borrow_mut() += 1;
                async { Ok(ObservedState::new("available")) }
            },
        )
        .await
        .unwrap_err();

        assert_eq!(err.kind(), ErrorKind::Timeout);
        assert_eq!(*calls.borrow(), 0);
        assert!(err.last_state().is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn test_probe_error_is_not_retried() {
        let calls = RefCell::new(0);
        let err = wait_for_state(
            "snapshot snap-1",
            &PollPolicy::attempts(5, Duration::from_secs(1)),
            &["completed"],
            || {
                *calls.borrow_mut() += 1;
                async { Err(anyhow::anyhow!("connection refused")) }
            },
        )
        .await
        .unwrap_err();

        assert_eq!(err.kind(), ErrorKind::ProbeFailure);
        assert_eq!(*calls.borrow(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_hung_probe_bounded_by_probe_timeout() {
        let policy = PollPolicy::attempts(5, Duration::from_secs(1))
            .with_probe_timeout(Duration::from_secs(3));
        let start = Instant::now();

        let err = wait_for_state("instance i-1", &policy, &["running"], || {
            std::future::pending::<anyhow::Result<ObservedState>>()
        })
        .await
        .unwrap_err();

        assert_eq!(err.kind(), ErrorKind::ProbeFailure);
        assert!(err.to_string().contains("timed out"));
        let elapsed = start.elapsed();
        assert!(elapsed >= Duration::from_secs(3) && elapsed < Duration::from_secs(4));
    }

    #[tokio::test]
    async fn test_empty_terminal_set_rejected() {
        let err = wait_for_state(
            "instance i-1",
            &PollPolicy::attempts(1, Duration::from_secs(1)),
            &[],
            || async { Ok(ObservedState::new("running")) },
        )
        .await
        .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidPolicy);
    }

    #[test]
    fn test_observed_state_display() {
        assert_eq!(ObservedState::new("pending").to_string(), "pending");
        assert_eq!(
            ObservedState::new("pending").with_progress(0.42).to_string(),
            "pending (42%)"
        );
        assert_eq!(ObservedState::failed("error").to_string(), "error [failed]");
    }
}
