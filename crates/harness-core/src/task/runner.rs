//! Concurrent task runner with per-task result channels

use super::args::{ResolvedArgs, TaskArgs, TaskSignature};
use crate::error::{TaskError, panic_message};
use futures::FutureExt;
use std::any::Any;
use std::collections::HashMap;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use thiserror::Error;
use tokio::sync::{oneshot, watch};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

/// Identifier of a launched task, unique within one runner
pub type TaskId = String;

/// Lifecycle of a live task
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TaskState {
    Launched,
    Running,
    Completed,
    Failed,
}

/// Error raised by a task body, as delivered to the caller
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{message}")]
pub struct TaskFailure {
    /// Top-level error message
    pub message: String,
    /// Messages of the underlying causes, outermost first
    pub causes: Vec<String>,
    /// The body panicked instead of returning an error
    pub panicked: bool,
}

impl TaskFailure {
    pub fn from_error(error: &anyhow::Error) -> Self {
        Self {
            message: error.to_string(),
            causes: error.chain().skip(1).map(ToString::to_string).collect(),
            panicked: false,
        }
    }

    fn from_panic(payload: Box<dyn Any + Send>) -> Self {
        Self {
            message: panic_message(payload.as_ref()),
            causes: Vec::new(),
            panicked: true,
        }
    }

    fn lost() -> Self {
        Self {
            message: "worker exited without reporting a result".to_string(),
            causes: Vec::new(),
            panicked: false,
        }
    }

    /// Message followed by every cause, `: `-separated
    pub fn full_message(&self) -> String {
        std::iter::once(self.message.as_str())
            .chain(self.causes.iter().map(String::as_str))
            .collect::<Vec<_>>()
            .join(": ")
    }
}

/// What a task reported through its result channel
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TaskOutcome {
    Completed,
    Failed(TaskFailure),
}

impl TaskOutcome {
    pub fn is_completed(&self) -> bool {
        matches!(self, TaskOutcome::Completed)
    }

    pub fn failure(&self) -> Option<&TaskFailure> {
        match self {
            TaskOutcome::Completed => None,
            TaskOutcome::Failed(failure) => Some(failure),
        }
    }

    pub fn into_result(self) -> Result<(), TaskFailure> {
        match self {
            TaskOutcome::Completed => Ok(()),
            TaskOutcome::Failed(failure) => Err(failure),
        }
    }
}

struct TaskHandle {
    worker: JoinHandle<Result<(), TaskFailure>>,
    channel: oneshot::Receiver<TaskOutcome>,
    state: watch::Receiver<TaskState>,
    seq: u64,
}

/// Runs task bodies concurrently as tokio tasks.
///
/// Each launched task gets a one-shot result channel. [`wait`](Self::wait)
/// consumes it exactly once; [`kill`](Self::kill) aborts the worker and
/// discards it. Launching under an id that is still live replaces the old
/// task after a warning. Dropping the runner aborts every live worker.
///
/// Cancellation of a [`launch`](Self::launch) body takes effect at its next
/// `.await`: a body stuck in blocking code keeps running until it yields.
/// Work that must stop immediately belongs in a child process started
/// with [`launch_command`](Self::launch_command), whose process is killed
/// together with the worker.
#[derive(Default)]
pub struct TaskRunner {
    tasks: HashMap<TaskId, TaskHandle>,
    next_seq: u64,
}

impl TaskRunner {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start `body` with `args` resolved against `signature`.
    ///
    /// Generates a UUIDv7 id when `id` is `None`. Argument errors are
    /// returned before anything is spawned. Must be called from within a
    /// tokio runtime.
    pub fn launch<F, Fut>(
        &mut self,
        id: Option<&str>,
        signature: &TaskSignature,
        args: TaskArgs,
        body: F,
    ) -> Result<TaskId, TaskError>
    where
        F: FnOnce(ResolvedArgs) -> Fut + Send + 'static,
        Fut: Future<Output = anyhow::Result<()>> + Send + 'static,
    {
        let id = id
            .map(str::to_string)
            .unwrap_or_else(|| Uuid::now_v7().to_string());
        let resolved = signature
            .resolve(args)
            .map_err(|source| TaskError::InvalidArguments {
                task: id.clone(),
                source,
            })?;

        if let Some(previous) = self.tasks.remove(&id) {
            warn!(task_id = %id, "Task id already live, replacing previous task");
            previous.worker.abort();
        }

        let (result_tx, result_rx) = oneshot::channel();
        let (state_tx, state_rx) = watch::channel(TaskState::Launched);
        let task_id = id.clone();

        let worker = tokio::spawn(async move {
            state_tx.send_replace(TaskState::Running);
            debug!(task_id = %task_id, "Task running");

            let outcome = match AssertUnwindSafe(async move { body(resolved).await })
                .catch_unwind()
                .await
            {
                Ok(Ok(())) => {
                    info!(task_id = %task_id, "Task completed");
                    TaskOutcome::Completed
                }
                Ok(Err(e)) => {
                    error!(task_id = %task_id, error = ?e, "Task failed");
                    TaskOutcome::Failed(TaskFailure::from_error(&e))
                }
                Err(panic) => {
                    let failure = TaskFailure::from_panic(panic);
                    error!(task_id = %task_id, panic = %failure.message, "Task panicked");
                    TaskOutcome::Failed(failure)
                }
            };

            state_tx.send_replace(if outcome.is_completed() {
                TaskState::Completed
            } else {
                TaskState::Failed
            });
            // The receiver is gone only if the task was killed or replaced
            let _ = result_tx.send(outcome.clone());
            outcome.into_result()
        });

        info!(task_id = %id, "Task launched");
        self.tasks.insert(
            id.clone(),
            TaskHandle {
                worker,
                channel: result_rx,
                state: state_rx,
                seq: self.next_seq,
            },
        );
        self.next_seq += 1;
        Ok(id)
    }

    /// Block until the task reports, reap its worker and forget it.
    ///
    /// A second call for the same id returns [`TaskError::UnknownTask`].
    pub async fn wait(&mut self, id: &str) -> Result<TaskOutcome, TaskError> {
        let handle = self
            .tasks
            .remove(id)
            .ok_or_else(|| TaskError::UnknownTask(id.to_string()))?;

        let outcome = handle
            .channel
            .await
            .unwrap_or_else(|_| TaskOutcome::Failed(TaskFailure::lost()));

        match handle.worker.await {
            Ok(_) => debug!(task_id = %id, "Task reaped"),
            Err(e) => warn!(task_id = %id, error = %e, "Task worker did not exit cleanly"),
        }
        Ok(outcome)
    }

    /// Abort a task without collecting its result.
    ///
    /// Command workers lose their child process at once. Other bodies are
    /// dropped at their next suspension point; blocking code in them is not
    /// interrupted.
    pub fn kill(&mut self, id: &str) -> Result<(), TaskError> {
        let handle = self
            .tasks
            .remove(id)
            .ok_or_else(|| TaskError::UnknownTask(id.to_string()))?;
        handle.worker.abort();
        info!(task_id = %id, "Task killed");
        Ok(())
    }

    /// Current state of a live task; `None` once waited on or killed
    pub fn status(&self, id: &str) -> Option<TaskState> {
        self.tasks.get(id).map(|handle| *handle.state.borrow())
    }

    /// Live task ids in launch order
    pub fn ids(&self) -> Vec<TaskId> {
        let mut live: Vec<_> = self.tasks.iter().collect();
        live.sort_by_key(|(_, handle)| handle.seq);
        live.into_iter().map(|(id, _)| id.clone()).collect()
    }

    /// Wait for every live task, in launch order
    pub async fn wait_all(&mut self) -> Vec<(TaskId, TaskOutcome)> {
        let mut outcomes = Vec::with_capacity(self.tasks.len());
        for id in self.ids() {
            if let Ok(outcome) = self.wait(&id).await {
                outcomes.push((id, outcome));
            }
        }
        outcomes
    }

    pub fn len(&self) -> usize {
        self.tasks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tasks.is_empty()
    }
}

impl Drop for TaskRunner {
    fn drop(&mut self) {
        if !self.tasks.is_empty() {
            warn!(count = self.tasks.len(), "Task runner dropped with live tasks, aborting them");
        }
        for handle in self.tasks.values() {
            handle.worker.abort();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;
    use anyhow::Context;
    use std::time::Duration;

    fn no_params() -> TaskSignature {
        TaskSignature::new()
    }

    async fn explode() -> anyhow::Result<()> {
        panic!("snapshot never appeared")
    }

    #[tokio::test]
    async fn test_completed_task() {
        let mut runner = TaskRunner::new();
        let id = runner
            .launch(Some("ok"), &no_params(), TaskArgs::new(), |_| async { Ok(()) })
            .unwrap();
        assert_eq!(id, "ok");
        assert_eq!(runner.wait("ok").await.unwrap(), TaskOutcome::Completed);
    }

    #[tokio::test]
    async fn test_error_crosses_channel() {
        let mut runner = TaskRunner::new();
        runner
            .launch(Some("bad"), &no_params(), TaskArgs::new(), |_| async {
                Err::<(), _>(anyhow::anyhow!("bad volume size"))
                    .context("attach test failed")
            })
            .unwrap();

        let outcome = runner.wait("bad").await.unwrap();
        let failure = outcome.failure().unwrap();
        assert_eq!(failure.message, "attach test failed");
        assert_eq!(failure.causes, vec!["bad volume size"]);
        assert!(!failure.panicked);
        assert_eq!(failure.full_message(), "attach test failed: bad volume size");
    }

    #[tokio::test]
    async fn test_panic_is_reported() {
        let mut runner = TaskRunner::new();
        runner
            .launch(Some("boom"), &no_params(), TaskArgs::new(), |_| explode())
            .unwrap();

        let failure = runner.wait("boom").await.unwrap().into_result().unwrap_err();
        assert!(failure.panicked);
        assert!(failure.message.contains("snapshot never appeared"));
    }

    #[tokio::test]
    async fn test_double_wait_is_unknown_task() {
        let mut runner = TaskRunner::new();
        runner
            .launch(Some("once"), &no_params(), TaskArgs::new(), |_| async { Ok(()) })
            .unwrap();
        runner.wait("once").await.unwrap();
        let err = runner.wait("once").await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::UnknownTask);
        assert_eq!(runner.kill("once").unwrap_err().kind(), ErrorKind::UnknownTask);
    }

    #[tokio::test]
    async fn test_resolved_args_reach_body() {
        let mut runner = TaskRunner::new();
        let signature = TaskSignature::new().required("size_gb").optional("zone", "a");
        runner
            .launch(
                Some("args"),
                &signature,
                TaskArgs::new().arg(8).kwarg("zone", "b"),
                |args| async move {
                    anyhow::ensure!(args.get::<u32>("size_gb")? == 8, "wrong size");
                    anyhow::ensure!(args.get::<String>("zone")? == "b", "wrong zone");
                    Ok(())
                },
            )
            .unwrap();
        assert!(runner.wait("args").await.unwrap().is_completed());
    }

    #[tokio::test]
    async fn test_invalid_arguments_rejected_at_launch() {
        let mut runner = TaskRunner::new();
        let err = runner
            .launch(
                Some("args"),
                &TaskSignature::new().required("size_gb"),
                TaskArgs::new(),
                |_| async { Ok(()) },
            )
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidArguments);
        assert!(runner.is_empty());
    }

    #[tokio::test]
    async fn test_kill_aborts_worker() {
        let mut runner = TaskRunner::new();
        let (guard_tx, guard_rx) = oneshot::channel::<()>();
        runner
            .launch(Some("slow"), &no_params(), TaskArgs::new(), |_| async move {
                let _guard = guard_tx;
                std::future::pending::<()>().await;
                Ok(())
            })
            .unwrap();

        runner.kill("slow").unwrap();
        // Sender dropped by the aborted worker
        assert!(guard_rx.await.is_err());
        assert_eq!(runner.wait("slow").await.unwrap_err().kind(), ErrorKind::UnknownTask);
    }

    #[tokio::test]
    async fn test_killed_body_stops_at_next_await() {
        use std::sync::Arc;
        use std::sync::atomic::{AtomicUsize, Ordering};

        let mut runner = TaskRunner::new();
        let ticks = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&ticks);
        runner
            .launch(Some("ticker"), &no_params(), TaskArgs::new(), |_| async move {
                for _ in 0..10_000 {
                    counter.fetch_add(1, Ordering::SeqCst);
                    tokio::time::sleep(Duration::from_millis(10)).await;
                }
                Ok(())
            })
            .unwrap();

        while ticks.load(Ordering::SeqCst) < 3 {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        runner.kill("ticker").unwrap();
        let at_kill = ticks.load(Ordering::SeqCst);

        tokio::time::sleep(Duration::from_millis(100)).await;
        assert_eq!(ticks.load(Ordering::SeqCst), at_kill);
    }

    #[tokio::test]
    async fn test_collision_replaces_live_task() {
        let mut runner = TaskRunner::new();
        let (guard_tx, guard_rx) = oneshot::channel::<()>();
        runner
            .launch(Some("dup"), &no_params(), TaskArgs::new(), |_| async move {
                let _guard = guard_tx;
                std::future::pending::<()>().await;
                Ok(())
            })
            .unwrap();
        runner
            .launch(Some("dup"), &no_params(), TaskArgs::new(), |_| async { Ok(()) })
            .unwrap();

        assert!(guard_rx.await.is_err());
        assert_eq!(runner.len(), 1);
        assert!(runner.wait("dup").await.unwrap().is_completed());
    }

    #[tokio::test]
    async fn test_generated_ids_are_unique() {
        let mut runner = TaskRunner::new();
        let a = runner
            .launch(None, &no_params(), TaskArgs::new(), |_| async { Ok(()) })
            .unwrap();
        let b = runner
            .launch(None, &no_params(), TaskArgs::new(), |_| async { Ok(()) })
            .unwrap();
        assert_ne!(a, b);
        assert!(Uuid::parse_str(&a).is_ok());
    }

    #[tokio::test]
    async fn test_status_transitions() {
        let mut runner = TaskRunner::new();
        let (release_tx, release_rx) = oneshot::channel::<()>();
        runner
            .launch(Some("t"), &no_params(), TaskArgs::new(), |_| async move {
                release_rx.await.context("released")?;
                Ok(())
            })
            .unwrap();

        while runner.status("t") == Some(TaskState::Launched) {
            tokio::task::yield_now().await;
        }
        assert_eq!(runner.status("t"), Some(TaskState::Running));

        release_tx.send(()).unwrap();
        while runner.status("t") == Some(TaskState::Running) {
            tokio::time::sleep(Duration::from_millis(1)).await;
        }
        assert_eq!(runner.status("t"), Some(TaskState::Completed));

        runner.wait("t").await.unwrap();
        assert_eq!(runner.status("t"), None);
    }

    #[tokio::test]
    async fn test_wait_all_in_launch_order() {
        let mut runner = TaskRunner::new();
        for (id, fail) in [("c", false), ("a", true), ("b", false)] {
            runner
                .launch(Some(id), &no_params(), TaskArgs::new(), move |_| async move {
                    if fail {
                        anyhow::bail!("{id} failed");
                    }
                    Ok(())
                })
                .unwrap();
        }

        let outcomes = runner.wait_all().await;
        let ids: Vec<_> = outcomes.iter().map(|(id, _)| id.as_str()).collect();
        assert_eq!(ids, vec!["c", "a", "b"]);
        assert_eq!(outcomes.iter().filter(|(_, o)| !o.is_completed()).count(), 1);
        assert!(runner.is_empty());
    }
}
