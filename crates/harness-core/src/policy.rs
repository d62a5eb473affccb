//! Poll policies: how long and how often to observe a resource.

use crate::error::PolicyError;
use backon::{BackoffBuilder, ExponentialBackoff, ExponentialBuilder};
use harness_common::defaults::{
    DEFAULT_INSTANCE_WAIT_TIMEOUT_SECS, DEFAULT_POLL_INTERVAL_SECS, DEFAULT_SNAPSHOT_GRACE_ATTEMPTS,
    DEFAULT_SNAPSHOT_WAIT_TIMEOUT_SECS, DEFAULT_VOLUME_WAIT_TIMEOUT_SECS,
};
use std::time::Duration;

/// Retry policy applied by the state and progress waiters.
///
/// At least one of `max_attempts` and `timeout` must be set. When both are
/// set, whichever runs out first ends the wait. A policy whose budget is zero
/// fails immediately without probing.
#[derive(Debug, Clone, PartialEq)]
pub struct PollPolicy {
    /// Delay between observations (base delay when backoff is enabled)
    pub interval: Duration,
    /// Number of observations allowed (the grace budget for progress waits)
    pub max_attempts: Option<u32>,
    /// Wall-clock bound on the whole wait
    pub timeout: Option<Duration>,
    /// Probe reports progress; budget resets whenever it increases
    pub progress_aware: bool,
    /// Cap for exponential backoff; `None` keeps the interval fixed
    pub max_interval: Option<Duration>,
    /// Upper bound on a single probe call
    pub probe_timeout: Option<Duration>,
}

impl PollPolicy {
    /// Bounded by a number of observations
    pub fn attempts(max_attempts: u32, interval: Duration) -> Self {
        Self {
            interval,
            max_attempts: Some(max_attempts),
            timeout: None,
            progress_aware: false,
            max_interval: None,
            probe_timeout: None,
        }
    }

    /// Bounded by a wall-clock deadline
    pub fn deadline(timeout: Duration, interval: Duration) -> Self {
        Self {
            interval,
            max_attempts: None,
            timeout: Some(timeout),
            progress_aware: false,
            max_interval: None,
            probe_timeout: None,
        }
    }

    pub fn with_max_attempts(mut self, max_attempts: u32) -> Self {
        self.max_attempts = Some(max_attempts);
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// Mark the policy as progress-aware; `max_attempts` becomes the grace budget.
    pub fn progress_aware(mut self) -> Self {
        self.progress_aware = true;
        self
    }

    /// Grow the delay exponentially (with jitter) from `interval` up to `max_interval`.
    pub fn with_backoff(mut self, max_interval: Duration) -> Self {
        self.max_interval = Some(max_interval);
        self
    }

    pub fn with_probe_timeout(mut self, probe_timeout: Duration) -> Self {
        self.probe_timeout = Some(probe_timeout);
        self
    }

    /// Instance start/stop: 10 minute deadline
    pub fn instance() -> Self {
        Self::deadline(
            Duration::from_secs(DEFAULT_INSTANCE_WAIT_TIMEOUT_SECS),
            Duration::from_secs(DEFAULT_POLL_INTERVAL_SECS),
        )
    }

    /// Volume create/attach/detach: 5 minute deadline
    pub fn volume() -> Self {
        Self::deadline(
            Duration::from_secs(DEFAULT_VOLUME_WAIT_TIMEOUT_SECS),
            Duration::from_secs(DEFAULT_POLL_INTERVAL_SECS),
        )
    }

    /// Snapshot creation: progress-aware grace budget under a one hour cap
    pub fn snapshot() -> Self {
        Self::attempts(
            DEFAULT_SNAPSHOT_GRACE_ATTEMPTS,
            Duration::from_secs(DEFAULT_POLL_INTERVAL_SECS),
        )
        .with_timeout(Duration::from_secs(DEFAULT_SNAPSHOT_WAIT_TIMEOUT_SECS))
        .progress_aware()
    }

    /// Whether any observation is allowed at all
    pub fn has_budget(&self) -> bool {
        self.max_attempts != Some(0) && self.timeout != Some(Duration::ZERO)
    }

    /// Check the policy invariants
    pub fn validate(&self) -> Result<(), PolicyError> {
        if self.max_attempts.is_none() && self.timeout.is_none() {
            return Err(PolicyError::Unbounded);
        }
        if self.has_budget() && self.interval.is_zero() {
            return Err(PolicyError::ZeroInterval);
        }
        if let Some(cap) = self.max_interval {
            if cap < self.interval {
                return Err(PolicyError::BackoffBelowInterval {
                    interval: self.interval,
                    cap,
                });
            }
        }
        if self.probe_timeout == Some(Duration::ZERO) {
            return Err(PolicyError::ZeroProbeTimeout);
        }
        Ok(())
    }

    /// Delays to sleep between observations
    pub(crate) fn delays(&self) -> PollDelays {
        let backoff = self.max_interval.map(|cap| {
            ExponentialBuilder::default()
                .with_min_delay(self.interval)
                .with_max_delay(cap)
                .with_factor(2.0)
                .with_jitter()
                .build()
        });
        PollDelays {
            interval: self.interval,
            cap: self.max_interval.unwrap_or(self.interval),
            backoff,
        }
    }
}

impl Default for PollPolicy {
    fn default() -> Self {
        Self::deadline(
            Duration::from_secs(harness_common::defaults::DEFAULT_WAIT_TIMEOUT_SECS),
            Duration::from_secs(DEFAULT_POLL_INTERVAL_SECS),
        )
        .with_max_attempts(harness_common::defaults::DEFAULT_MAX_ATTEMPTS)
    }
}

/// Sequence of sleep durations for one wait
pub(crate) struct PollDelays {
    interval: Duration,
    cap: Duration,
    backoff: Option<ExponentialBackoff>,
}

impl PollDelays {
    pub(crate) fn next_delay(&mut self) -> Duration {
        match self.backoff.as_mut() {
            // The backoff iterator stops after its retry limit; stay at the cap afterwards
            Some(backoff) => backoff.next().unwrap_or(self.cap).min(self.cap),
            None => self.interval,
        }
    }
}
