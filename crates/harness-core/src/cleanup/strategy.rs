//! Destroy strategies: how each resource kind is torn down

use crate::registry::ResourceHandle;
use anyhow::Result;
use async_trait::async_trait;
use futures::future::BoxFuture;
use harness_common::ResourceKind;
use std::collections::HashMap;
use std::fmt;
use std::future::Future;
use std::sync::Arc;

/// A single-argument destructive call
pub type DestroyFn = Arc<dyn Fn(ResourceHandle) -> BoxFuture<'static, Result<()>> + Send + Sync>;

/// Wrap an async closure as a [`DestroyFn`]
pub fn destroy_fn<F, Fut>(f: F) -> DestroyFn
where
    F: Fn(ResourceHandle) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<()>> + Send + 'static,
{
    Arc::new(move |handle| -> BoxFuture<'static, Result<()>> { Box::pin(f(handle)) })
}

/// The kind of destructive operation a strategy performs
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DestroyAction {
    Terminate,
    Delete,
    Deregister,
    Release,
    /// Best-effort detach, then delete
    DetachThenDelete,
}

impl DestroyAction {
    /// Action the default cloud table uses for a kind
    pub fn for_kind(kind: &ResourceKind) -> Option<DestroyAction> {
        match kind {
            ResourceKind::Instance => Some(DestroyAction::Terminate),
            ResourceKind::Volume => Some(DestroyAction::DetachThenDelete),
            ResourceKind::Image => Some(DestroyAction::Deregister),
            ResourceKind::Address => Some(DestroyAction::Release),
            ResourceKind::LoadBalancer
            | ResourceKind::Snapshot
            | ResourceKind::Bucket
            | ResourceKind::KeyPair
            | ResourceKind::SecurityGroup => Some(DestroyAction::Delete),
            ResourceKind::Other(_) => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            DestroyAction::Terminate => "terminate",
            DestroyAction::Delete => "delete",
            DestroyAction::Deregister => "deregister",
            DestroyAction::Release => "release",
            DestroyAction::DetachThenDelete => "detach-then-delete",
        }
    }
}

impl fmt::Display for DestroyAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// How to destroy one kind of resource
#[derive(Clone)]
pub struct DestroyStrategy {
    action: DestroyAction,
    detach: Option<DestroyFn>,
    destroy: DestroyFn,
}

impl DestroyStrategy {
    pub fn new(action: DestroyAction, destroy: DestroyFn) -> Self {
        Self {
            action,
            detach: None,
            destroy,
        }
    }

    pub fn terminate(destroy: DestroyFn) -> Self {
        Self::new(DestroyAction::Terminate, destroy)
    }

    pub fn delete(destroy: DestroyFn) -> Self {
        Self::new(DestroyAction::Delete, destroy)
    }

    pub fn deregister(destroy: DestroyFn) -> Self {
        Self::new(DestroyAction::Deregister, destroy)
    }

    pub fn release(destroy: DestroyFn) -> Self {
        Self::new(DestroyAction::Release, destroy)
    }

    /// Detach first (failures ignored), then delete
    pub fn detach_then_delete(detach: DestroyFn, delete: DestroyFn) -> Self {
        Self {
            action: DestroyAction::DetachThenDelete,
            detach: Some(detach),
            destroy: delete,
        }
    }

    pub fn action(&self) -> DestroyAction {
        self.action
    }

    pub(crate) fn detach_fn(&self) -> Option<&DestroyFn> {
        self.detach.as_ref()
    }

    pub(crate) fn destroy_fn(&self) -> &DestroyFn {
        &self.destroy
    }
}

impl fmt::Debug for DestroyStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DestroyStrategy")
            .field("action", &self.action)
            .field("detach", &self.detach.is_some())
            .finish()
    }
}

/// Destructive calls of the remote control plane used by teardown.
///
/// Implemented by the SDK wrapper of the harness; the core never talks to
/// the provider directly. Errors should carry a
/// [`RemoteError`](crate::remote_error::RemoteError) so "not found" and
/// throttling are recognised.
#[async_trait]
pub trait CloudControl: Send + Sync {
    async fn terminate_instance(&self, instance_id: &str) -> Result<()>;
    async fn detach_volume(&self, volume_id: &str, instance_id: &str) -> Result<()>;
    async fn delete_volume(&self, volume_id: &str) -> Result<()>;
    async fn delete_snapshot(&self, snapshot_id: &str) -> Result<()>;
    async fn deregister_image(&self, image_id: &str) -> Result<()>;
    async fn delete_key_pair(&self, key_name: &str) -> Result<()>;
    async fn delete_security_group(&self, group_id: &str) -> Result<()>;
    async fn delete_bucket(&self, bucket: &str) -> Result<()>;
    async fn delete_load_balancer(&self, name: &str) -> Result<()>;
    async fn release_address(&self, allocation_id: &str) -> Result<()>;
}

/// Mapping from resource kind to destroy strategy
#[derive(Clone, Default, Debug)]
pub struct DestroyTable {
    strategies: HashMap<ResourceKind, DestroyStrategy>,
}

impl DestroyTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add or replace the strategy for a kind
    pub fn with(mut self, kind: ResourceKind, strategy: DestroyStrategy) -> Self {
        self.insert(kind, strategy);
        self
    }

    pub fn insert(&mut self, kind: ResourceKind, strategy: DestroyStrategy) {
        self.strategies.insert(kind, strategy);
    }

    pub fn get(&self, kind: &ResourceKind) -> Option<&DestroyStrategy> {
        self.strategies.get(kind)
    }

    /// Default table covering every built-in kind through a cloud client
    pub fn for_cloud(cloud: Arc<dyn CloudControl>) -> Self {
        Self::new()
            .with(
                ResourceKind::LoadBalancer,
                DestroyStrategy::delete(with_cloud(&cloud, |c, h| async move {
                    c.delete_load_balancer(&h.id).await
                })),
            )
            .with(
                ResourceKind::Instance,
                DestroyStrategy::terminate(with_cloud(&cloud, |c, h| async move {
                    c.terminate_instance(&h.id).await
                })),
            )
            .with(
                ResourceKind::Address,
                DestroyStrategy::release(with_cloud(&cloud, |c, h| async move {
                    c.release_address(&h.id).await
                })),
            )
            .with(
                ResourceKind::Volume,
                DestroyStrategy::detach_then_delete(
                    with_cloud(&cloud, |c, h| async move {
                        match &h.attached_to {
                            Some(instance_id) => c.detach_volume(&h.id, instance_id).await,
                            None => Ok(()),
                        }
                    }),
                    with_cloud(&cloud, |c, h| async move { c.delete_volume(&h.id).await }),
                ),
            )
            .with(
                ResourceKind::Snapshot,
                DestroyStrategy::delete(with_cloud(&cloud, |c, h| async move {
                    c.delete_snapshot(&h.id).await
                })),
            )
            .with(
                ResourceKind::Image,
                DestroyStrategy::deregister(with_cloud(&cloud, |c, h| async move {
                    c.deregister_image(&h.id).await
                })),
            )
            .with(
                ResourceKind::Bucket,
                DestroyStrategy::delete(with_cloud(&cloud, |c, h| async move {
                    c.delete_bucket(&h.id).await
                })),
            )
            .with(
                ResourceKind::KeyPair,
                DestroyStrategy::delete(with_cloud(&cloud, |c, h| async move {
                    c.delete_key_pair(&h.id).await
                })),
            )
            .with(
                ResourceKind::SecurityGroup,
                DestroyStrategy::delete(with_cloud(&cloud, |c, h| async move {
                    c.delete_security_group(&h.id).await
                })),
            )
    }
}

fn with_cloud<F, Fut>(cloud: &Arc<dyn CloudControl>, call: F) -> DestroyFn
where
    F: Fn(Arc<dyn CloudControl>, ResourceHandle) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<()>> + Send + 'static,
{
    let cloud = Arc::clone(cloud);
    destroy_fn(move |handle| call(Arc::clone(&cloud), handle))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_actions() {
        assert_eq!(
            DestroyAction::for_kind(&ResourceKind::Instance),
            Some(DestroyAction::Terminate)
        );
        assert_eq!(
            DestroyAction::for_kind(&ResourceKind::Volume),
            Some(DestroyAction::DetachThenDelete)
        );
        assert_eq!(
            DestroyAction::for_kind(&ResourceKind::Image),
            Some(DestroyAction::Deregister)
        );
        assert_eq!(DestroyAction::for_kind(&ResourceKind::custom("x").unwrap()), None);
    }

    #[tokio::test]
    async fn test_table_lookup_and_replace() {
        let table = DestroyTable::new()
            .with(
                ResourceKind::Bucket,
                DestroyStrategy::delete(destroy_fn(|_| async { Ok(()) })),
            )
            .with(
                ResourceKind::Bucket,
                DestroyStrategy::delete(destroy_fn(|h| async move {
                    anyhow::bail!("refusing to delete {}", h.id)
                })),
            );

        let strategy = table.get(&ResourceKind::Bucket).unwrap();
        assert_eq!(strategy.action(), DestroyAction::Delete);
        let err = (strategy.destroy_fn())(ResourceHandle::new("b-1"))
            .await
            .unwrap_err();
        assert!(err.to_string().contains("b-1"));
        assert!(table.get(&ResourceKind::Instance).is_none());
    }
}
