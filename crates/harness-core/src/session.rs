//! Test session: one registry, one teardown

use crate::cleanup::{CleanupDispatcher, CleanupResult, DestroyTable, SweepOptions, SweepReport};
use crate::registry::{ResourceHandle, ResourceRegistry};
use harness_common::ResourceKind;
use tracing::{info, warn};
use uuid::Uuid;

/// Generate a session id: `<prefix>-<uuidv7>`
pub fn new_session_id(prefix: &str) -> String {
    format!("{}-{}", prefix, Uuid::now_v7())
}

/// Owns the resources a test creates and tears them down exactly once.
///
/// [`finish`](Self::finish) consumes the session, so a second sweep cannot
/// happen. A session dropped with live resources logs a warning and leaves
/// them behind.
#[derive(Debug)]
pub struct TestSession {
    registry: ResourceRegistry,
    dispatcher: CleanupDispatcher,
    finished: bool,
}

impl TestSession {
    pub fn new(session_id: impl Into<String>, table: DestroyTable) -> Self {
        Self::with_options(session_id, table, SweepOptions::default())
    }

    pub fn with_options(
        session_id: impl Into<String>,
        table: DestroyTable,
        options: SweepOptions,
    ) -> Self {
        let registry = ResourceRegistry::new(session_id);
        info!(session_id = %registry.session_id(), "Test session started");
        Self {
            registry,
            dispatcher: CleanupDispatcher::with_options(table, options),
            finished: false,
        }
    }

    pub fn id(&self) -> &str {
        self.registry.session_id()
    }

    pub fn registry(&self) -> &ResourceRegistry {
        &self.registry
    }

    /// Direct access, e.g. to merge per-task registries before teardown
    pub fn registry_mut(&mut self) -> &mut ResourceRegistry {
        &mut self.registry
    }

    /// Register a freshly created resource for teardown
    pub fn register(&mut self, kind: ResourceKind, handle: impl Into<ResourceHandle>) -> bool {
        self.registry.register(kind, handle)
    }

    /// Destroy one resource ahead of teardown.
    ///
    /// The entry is forgotten only once the resource is gone; a failed or
    /// dry-run delete leaves it for the final sweep. Returns `None` if the
    /// resource is not registered.
    pub async fn delete(&mut self, kind: &ResourceKind, id: &str) -> Option<CleanupResult> {
        let handle = self
            .registry
            .entries_of(kind)
            .into_iter()
            .find(|h| h.id == id)?;
        let result = self.dispatcher.destroy(kind, &handle).await;
        if result.is_gone() {
            self.registry.remove(kind, id);
        }
        Some(result)
    }

    /// Sweep every registered resource and end the session
    pub async fn finish(mut self) -> SweepReport {
        self.finished = true;
        self.dispatcher.sweep(&self.registry).await
    }
}

impl Drop for TestSession {
    fn drop(&mut self) {
        if !self.finished && !self.registry.is_empty() {
            warn!(
                session_id = %self.registry.session_id(),
                count = self.registry.len(),
                "Test session dropped without teardown, resources may leak"
            );
            for resource in self.registry.resources() {
                warn!(resource = %resource.description(), "Leaked resource");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cleanup::{DestroyStrategy, destroy_fn};
    use std::sync::{Arc, Mutex};

    fn table(deleted: Arc<Mutex<Vec<String>>>) -> DestroyTable {
        DestroyTable::new().with(
            ResourceKind::Volume,
            DestroyStrategy::delete(destroy_fn(move |h: ResourceHandle| {
                deleted.lock().unwrap().push(h.id);
                async { Ok(()) }
            })),
        )
    }

    #[test]
    fn test_session_id_prefix() {
        let a = new_session_id("nightly");
        let b = new_session_id("nightly");
        assert!(a.starts_with("nightly-"));
        assert_ne!(a, b);
    }

    #[tokio::test]
    async fn test_explicit_delete_removes_entry() {
        let deleted = Arc::new(Mutex::new(Vec::new()));
        let mut session = TestSession::new("session-1", table(Arc::clone(&deleted)));
        session.register(ResourceKind::Volume, "vol-1");
        session.register(ResourceKind::Volume, "vol-2");

        let result = session.delete(&ResourceKind::Volume, "vol-1").await;
        assert_eq!(result, Some(CleanupResult::Deleted));
        assert!(session.delete(&ResourceKind::Volume, "vol-1").await.is_none());

        let report = session.finish().await;
        assert_eq!(report.len(), 1);
        assert_eq!(*deleted.lock().unwrap(), vec!["vol-1", "vol-2"]);
    }

    #[tokio::test]
    async fn test_failed_delete_stays_registered() {
        let table = DestroyTable::new().with(
            ResourceKind::Bucket,
            DestroyStrategy::delete(destroy_fn(|_| async { anyhow::bail!("BucketNotEmpty") })),
        );
        let mut session = TestSession::new("session-1", table);
        session.register(ResourceKind::Bucket, "b-1");

        let result = session.delete(&ResourceKind::Bucket, "b-1").await.unwrap();
        assert!(result.is_failed());
        assert!(session.registry().contains(&ResourceKind::Bucket, "b-1"));
    }

    #[tokio::test]
    async fn test_dry_run_delete_stays_registered() {
        let deleted = Arc::new(Mutex::new(Vec::new()));
        let mut session = TestSession::with_options(
            "session-1",
            table(Arc::clone(&deleted)),
            SweepOptions {
                dry_run: true,
                ..Default::default()
            },
        );
        session.register(ResourceKind::Volume, "vol-1");

        let result = session.delete(&ResourceKind::Volume, "vol-1").await;
        assert_eq!(result, Some(CleanupResult::Skipped));
        assert!(session.registry().contains(&ResourceKind::Volume, "vol-1"));

        let report = session.finish().await;
        assert_eq!(report.skipped(), 1);
        assert!(deleted.lock().unwrap().is_empty());
    }
}
