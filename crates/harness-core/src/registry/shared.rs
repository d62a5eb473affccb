//! Thread-safe registry for sessions that register from several tasks

use super::store::{RegistrySnapshot, ResourceRegistry};
use super::types::ResourceHandle;
use harness_common::ResourceKind;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

/// Mutex-guarded [`ResourceRegistry`] that can be cloned into worker tasks.
///
/// All clones share one registry. Registration never fails, even if a task
/// panicked while holding the lock.
#[derive(Clone, Debug)]
pub struct SharedRegistry {
    inner: Arc<Mutex<ResourceRegistry>>,
}

impl SharedRegistry {
    pub fn new(session_id: impl Into<String>) -> Self {
        Self::from_registry(ResourceRegistry::new(session_id))
    }

    pub fn from_registry(registry: ResourceRegistry) -> Self {
        Self {
            inner: Arc::new(Mutex::new(registry)),
        }
    }

    fn lock(&self) -> MutexGuard<'_, ResourceRegistry> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn register(&self, kind: ResourceKind, handle: impl Into<ResourceHandle>) -> bool {
        self.lock().register(kind, handle)
    }

    pub fn remove(&self, kind: &ResourceKind, id: &str) -> Option<ResourceHandle> {
        self.lock().remove(kind, id)
    }

    pub fn set_attachment(&self, kind: &ResourceKind, id: &str, instance_id: Option<String>) -> bool {
        self.lock().set_attachment(kind, id, instance_id)
    }

    pub fn entries_of(&self, kind: &ResourceKind) -> Vec<ResourceHandle> {
        self.lock().entries_of(kind)
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    pub fn snapshot(&self) -> RegistrySnapshot {
        self.lock().snapshot()
    }

    /// Copy of the current contents, for a single-threaded teardown
    pub fn to_registry(&self) -> ResourceRegistry {
        self.lock().clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_registration() {
        let shared = SharedRegistry::new("session-1");

        let handles: Vec<_> = (0..8)
            .map(|worker| {
                let shared = shared.clone();
                tokio::spawn(async move {
                    for n in 0..25 {
                        shared.register(ResourceKind::Volume, format!("vol-{worker}-{n}"));
                    }
                })
            })
            .collect();
        for handle in handles {
            handle.await.unwrap();
        }

        assert_eq!(shared.len(), 200);

        // Per-worker order survives interleaving
        let ids: Vec<String> = shared
            .entries_of(&ResourceKind::Volume)
            .into_iter()
            .map(|h| h.id)
            .filter(|id| id.starts_with("vol-3-"))
            .collect();
        let expected: Vec<String> = (0..25).map(|n| format!("vol-3-{n}")).collect();
        assert_eq!(ids, expected);
    }

    #[test]
    fn test_clones_share_state() {
        let shared = SharedRegistry::new("session-1");
        let other = shared.clone();
        other.register(ResourceKind::Bucket, "bucket-1");
        assert!(shared.to_registry().contains(&ResourceKind::Bucket, "bucket-1"));
        assert!(shared.remove(&ResourceKind::Bucket, "bucket-1").is_some());
        assert!(other.is_empty());
    }
}
