//! Best-effort teardown of a resource registry

use super::strategy::{DestroyAction, DestroyStrategy, DestroyTable};
use crate::error::{ErrorKind, panic_message};
use crate::registry::{ResourceHandle, ResourceRegistry};
use crate::remote_error::classify_anyhow_error;
use backon::{ExponentialBuilder, Retryable};
use futures::FutureExt;
use harness_common::ResourceKind;
use harness_common::defaults::DEFAULT_CLEANUP_RETRY_ATTEMPTS;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, info, warn};

/// Sweep behaviour
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SweepOptions {
    /// Report what would be destroyed without calling anything
    pub dry_run: bool,
    /// Retries for throttled or still-in-use destroy calls
    pub retry_attempts: usize,
}

impl Default for SweepOptions {
    fn default() -> Self {
        Self {
            dry_run: false,
            retry_attempts: DEFAULT_CLEANUP_RETRY_ATTEMPTS,
        }
    }
}

/// A resource that could not be destroyed
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("Failed to clean up {kind} {id}: {message}")]
pub struct CleanupFailure {
    pub kind: ResourceKind,
    pub id: String,
    /// `None` when no strategy was registered for the kind
    pub action: Option<DestroyAction>,
    /// Rendered error chain
    pub message: String,
}

impl CleanupFailure {
    pub fn kind(&self) -> ErrorKind {
        ErrorKind::CleanupFailure
    }
}

/// Result of a single resource cleanup operation
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CleanupResult {
    /// Resource was successfully deleted
    Deleted,
    /// Resource was already deleted (not found)
    AlreadyDeleted,
    /// Resource was skipped (dry run)
    Skipped,
    /// Cleanup failed with error
    Failed(CleanupFailure),
}

impl CleanupResult {
    pub fn is_failed(&self) -> bool {
        matches!(self, CleanupResult::Failed(_))
    }

    /// The resource no longer exists remotely
    pub fn is_gone(&self) -> bool {
        matches!(self, CleanupResult::Deleted | CleanupResult::AlreadyDeleted)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            CleanupResult::Deleted => "deleted",
            CleanupResult::AlreadyDeleted => "already-deleted",
            CleanupResult::Skipped => "skipped",
            CleanupResult::Failed(_) => "failed",
        }
    }
}

/// One swept resource
#[derive(Debug, Clone)]
pub struct SweepEntry {
    pub kind: ResourceKind,
    pub handle: ResourceHandle,
    pub action: Option<DestroyAction>,
    pub result: CleanupResult,
}

impl SweepEntry {
    /// The failure for this entry, if any
    pub fn error(&self) -> Option<&CleanupFailure> {
        match &self.result {
            CleanupResult::Failed(failure) => Some(failure),
            _ => None,
        }
    }
}

/// Outcome of one sweep, one entry per registered resource in teardown order
#[derive(Debug, Clone, Default)]
pub struct SweepReport {
    pub session_id: String,
    pub entries: Vec<SweepEntry>,
}

impl SweepReport {
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn deleted(&self) -> usize {
        self.count(|r| matches!(r, CleanupResult::Deleted))
    }

    pub fn already_deleted(&self) -> usize {
        self.count(|r| matches!(r, CleanupResult::AlreadyDeleted))
    }

    pub fn skipped(&self) -> usize {
        self.count(|r| matches!(r, CleanupResult::Skipped))
    }

    pub fn failed(&self) -> usize {
        self.count(CleanupResult::is_failed)
    }

    fn count(&self, pred: impl Fn(&CleanupResult) -> bool) -> usize {
        self.entries.iter().filter(|e| pred(&e.result)).count()
    }

    /// Every per-resource failure, for manual reconciliation
    pub fn failures(&self) -> Vec<&CleanupFailure> {
        self.entries.iter().filter_map(SweepEntry::error).collect()
    }

    /// No resource was left behind because of an error
    pub fn is_clean(&self) -> bool {
        self.failed() == 0
    }
}

/// A planned destroy call
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlannedAction {
    pub kind: ResourceKind,
    pub handle: ResourceHandle,
    pub action: Option<DestroyAction>,
}

/// Resources of a registry in teardown order.
///
/// Kinds are ordered by cleanup priority (dependents first); ties keep
/// first-registration order. Within a kind, insertion order is kept.
pub fn teardown_order(registry: &ResourceRegistry) -> Vec<(ResourceKind, ResourceHandle)> {
    let mut kinds = registry.kinds();
    kinds.sort_by_key(ResourceKind::cleanup_priority);
    kinds
        .into_iter()
        .flat_map(|kind| {
            registry
                .entries_of(&kind)
                .into_iter()
                .map(move |handle| (kind.clone(), handle))
        })
        .collect()
}

/// Walks a registry once and destroys every entry through a [`DestroyTable`].
///
/// A failure on one resource is recorded and the sweep moves on. The
/// registry is only read, so a sweep can be re-run from the same registry.
#[derive(Debug, Clone)]
pub struct CleanupDispatcher {
    table: DestroyTable,
    options: SweepOptions,
}

impl CleanupDispatcher {
    pub fn new(table: DestroyTable) -> Self {
        Self::with_options(table, SweepOptions::default())
    }

    pub fn with_options(table: DestroyTable, options: SweepOptions) -> Self {
        Self { table, options }
    }

    pub fn options(&self) -> SweepOptions {
        self.options
    }

    /// What a sweep would do, without calling anything
    pub fn plan(&self, registry: &ResourceRegistry) -> Vec<PlannedAction> {
        teardown_order(registry)
            .into_iter()
            .map(|(kind, handle)| PlannedAction {
                action: self.table.get(&kind).map(DestroyStrategy::action),
                kind,
                handle,
            })
            .collect()
    }

    /// Destroy every resource in the registry
    pub async fn sweep(&self, registry: &ResourceRegistry) -> SweepReport {
        let order = teardown_order(registry);
        info!(
            session_id = %registry.session_id(),
            count = order.len(),
            dry_run = self.options.dry_run,
            "Starting cleanup sweep"
        );

        let mut entries = Vec::with_capacity(order.len());
        for (kind, handle) in order {
            let action = self.table.get(&kind).map(DestroyStrategy::action);
            let result = self.destroy(&kind, &handle).await;
            entries.push(SweepEntry {
                kind,
                handle,
                action,
                result,
            });
        }

        let report = SweepReport {
            session_id: registry.session_id().to_string(),
            entries,
        };
        if report.is_clean() {
            info!(
                session_id = %report.session_id,
                deleted = report.deleted(),
                already_deleted = report.already_deleted(),
                skipped = report.skipped(),
                "Cleanup sweep complete"
            );
        } else {
            warn!(
                session_id = %report.session_id,
                deleted = report.deleted(),
                failed = report.failed(),
                "Cleanup sweep left resources behind"
            );
        }
        report
    }

    /// Destroy a single resource through its kind's strategy
    pub async fn destroy(&self, kind: &ResourceKind, handle: &ResourceHandle) -> CleanupResult {
        let Some(strategy) = self.table.get(kind) else {
            warn!(kind = %kind, id = %handle.id, "No destroy strategy for resource kind");
            return CleanupResult::Failed(CleanupFailure {
                kind: kind.clone(),
                id: handle.id.clone(),
                action: None,
                message: format!("no destroy strategy registered for kind '{kind}'"),
            });
        };

        if self.options.dry_run {
            info!(kind = %kind, handle = %handle, action = %strategy.action(), "[DRY RUN] Would destroy");
            return CleanupResult::Skipped;
        }

        if let Some(detach) = strategy.detach_fn() {
            match guarded(async { detach(handle.clone()).await }).await {
                Ok(()) => debug!(kind = %kind, handle = %handle, "Detached"),
                Err(e) => {
                    debug!(kind = %kind, handle = %handle, error = ?e, "Detach failed, deleting anyway")
                }
            }
        }

        let destroy = strategy.destroy_fn();
        let result = (|| {
            let handle = handle.clone();
            guarded(async move { destroy(handle).await })
        })
            .retry(
                ExponentialBuilder::default()
                    .with_min_delay(Duration::from_secs(2))
                    .with_max_delay(Duration::from_secs(30))
                    .with_max_times(self.options.retry_attempts),
            )
            .when(|e| classify_anyhow_error(e).is_retryable())
            .notify(|e, dur| {
                warn!(
                    kind = %kind,
                    id = %handle.id,
                    delay = ?dur,
                    error = %e,
                    "Destroy call failed, retrying..."
                );
            })
            .await;

        match result {
            Ok(()) => {
                info!(kind = %kind, id = %handle.id, action = %strategy.action(), "Deleted");
                CleanupResult::Deleted
            }
            Err(e) if classify_anyhow_error(&e).is_not_found() => {
                debug!(kind = %kind, id = %handle.id, "Resource already deleted");
                CleanupResult::AlreadyDeleted
            }
            Err(e) => {
                warn!(kind = %kind, id = %handle.id, error = ?e, "Cleanup failed");
                CleanupResult::Failed(CleanupFailure {
                    kind: kind.clone(),
                    id: handle.id.clone(),
                    action: Some(strategy.action()),
                    message: format!("{e:#}"),
                })
            }
        }
    }
}

/// Run a strategy call, turning a panic into an error
async fn guarded<F>(call: F) -> anyhow::Result<()>
where
    F: Future<Output = anyhow::Result<()>>,
{
    match AssertUnwindSafe(call).catch_unwind().await {
        Ok(result) => result,
        Err(panic) => Err(anyhow::anyhow!(
            "destroy strategy panicked: {}",
            panic_message(panic.as_ref())
        )),
    }
}
