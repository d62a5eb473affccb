//! Scripted probes for waiter tests

use harness_core::ObservedState;
use std::collections::VecDeque;
use std::future::{Ready, ready};
use std::sync::Mutex;

#[derive(Debug, Clone)]
enum Step {
    State(ObservedState),
    Error(String),
}

#[derive(Debug, Default)]
struct Inner {
    script: VecDeque<Step>,
    last: Option<Step>,
    calls: usize,
}

/// A probe that replays a fixed sequence of observations.
///
/// Once the script runs out, the last step repeats forever, so a probe
/// scripted with `["pending"]` never converges.
///
/// # Example
///
/// ```
/// use harness_test_utils::ScriptedProbe;
///
/// let probe = ScriptedProbe::states(&["pending", "running"]);
/// let _first = probe.next();
/// assert_eq!(probe.calls(), 1);
/// ```
#[derive(Debug, Default)]
pub struct ScriptedProbe {
    inner: Mutex<Inner>,
}

impl ScriptedProbe {
    pub fn new(states: impl IntoIterator<Item = ObservedState>) -> Self {
        let script = states.into_iter().map(Step::State).collect();
        Self {
            inner: Mutex::new(Inner {
                script,
                ..Default::default()
            }),
        }
    }

    /// One observation per state token
    pub fn states(values: &[&str]) -> Self {
        Self::new(values.iter().map(|v| ObservedState::new(*v)))
    }

    /// Observations of `value` reporting each progress figure in turn
    pub fn progress(value: &str, progress: &[f64]) -> Self {
        Self::new(
            progress
                .iter()
                .map(|p| ObservedState::new(value).with_progress(*p)),
        )
    }

    /// Append an observation
    pub fn then(self, state: ObservedState) -> Self {
        self.push(Step::State(state))
    }

    /// Append a failing probe call
    pub fn then_error(self, message: impl Into<String>) -> Self {
        self.push(Step::Error(message.into()))
    }

    fn push(self, step: Step) -> Self {
        self.inner
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .script
            .push_back(step);
        self
    }

    /// Produce the next observation; use as `|| probe.next()`
    pub fn next(&self) -> Ready<anyhow::Result<ObservedState>> {
        let mut inner = self.inner.lock().unwrap_or_else(|e| e.into_inner());
        inner.calls += 1;
        let step = match inner.script.pop_front() {
            Some(step) => {
                inner.last = Some(step.clone());
                Some(step)
            }
            None => inner.last.clone(),
        };
        ready(match step {
            Some(Step::State(state)) => Ok(state),
            Some(Step::Error(message)) => Err(anyhow::anyhow!(message)),
            None => Err(anyhow::anyhow!("scripted probe has no states")),
        })
    }

    /// Number of probe calls so far
    pub fn calls(&self) -> usize {
        self.inner.lock().unwrap_or_else(|e| e.into_inner()).calls
    }
}
