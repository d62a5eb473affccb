//! Progress-aware waiting for long operations of unknown duration
//!
//! Snapshot creation and similar operations can run for a long time while
//! still healthy. Instead of a fixed attempt count, the grace budget
//! (`max_attempts`) restarts every time the probe reports more progress than
//! before, so the wait is abandoned only after that many consecutive
//! observations without progress. An optional `timeout` caps the whole wait
//! regardless of progress and takes priority over the grace budget.

use super::{ObservedState, check_inputs, next_sleep, observe};
use crate::error::{PolicyError, WaitError};
use crate::policy::PollPolicy;
use std::future::Future;
use tokio::time::Instant;
use tracing::{debug, warn};

/// Wait until `probe` reports one of `terminal` states, renewing the budget on progress.
///
/// The policy must be progress-aware and carry `max_attempts`. Each
/// observation is handled in this order:
/// 1. `failed` set: [`WaitError::RemoteFailure`]
/// 2. terminal state: success
/// 3. deadline passed: [`WaitError::Timeout`]
/// 4. progress above the best seen so far: budget reset
/// 5. otherwise one unit of budget is spent; at zero, [`WaitError::NoProgress`]
///
/// An observation without a progress value counts as no progress.
pub async fn wait_for_progress<F, Fut>(
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
    if !policy.progress_aware {
        return Err(PolicyError::NotProgressAware.into());
    }
    let grace = policy.max_attempts.ok_or(PolicyError::MissingGraceBudget)?;

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
    let mut best: Option<f64> = None;
    let mut remaining = grace;

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

        if deadline.is_some_and(|deadline| Instant::now() >= deadline) {
            last = Some(state);
            break;
        }

        match state.progress {
            Some(progress) if best.is_none_or(|best| progress > best) => {
                debug!(
                    resource = %resource,
                    progress,
                    previous = ?best,
                    "Progress advanced, grace budget renewed"
                );
                best = Some(progress);
                remaining = grace;
            }
            _ => {
                remaining = remaining.saturating_sub(1);
                if remaining == 0 {
                    warn!(
                        resource = %resource,
                        attempts,
                        grace,
                        progress = ?best,
                        "No progress within grace budget, giving up"
                    );
                    return Err(WaitError::NoProgress {
                        resource: resource.to_string(),
                        grace,
                        attempts,
                        last_progress: best,
                        last: Some(state),
                    });
                }
            }
        }

        last = Some(state);

        let Some(delay) = next_sleep(&mut delays, deadline) else {
            break;
        };
        debug!(
            resource = %resource,
            attempt = attempts,
            remaining,
            delay_ms = delay.as_millis(),
            "Operation still converging, retrying"
        );
        tokio::time::sleep(delay).await;
    }

    let elapsed = start.elapsed();
    warn!(
        resource = %resource,
        attempts,
        elapsed_ms = elapsed.as_millis(),
        progress = ?best,
        "Timed out waiting for resource despite progress"
    );
    Err(WaitError::Timeout {
        resource: resource.to_string(),
        attempts,
        elapsed,
        last,
    })
}
