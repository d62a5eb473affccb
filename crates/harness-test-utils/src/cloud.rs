//! Recording fake of the cloud control plane

use anyhow::Result;
use async_trait::async_trait;
use harness_core::cleanup::CloudControl;
use harness_core::remote_error::RemoteError;
use std::collections::{HashMap, HashSet};
use std::sync::{Mutex, MutexGuard};

#[derive(Debug, Clone)]
enum Failure {
    Always(String),
    Throttle(usize),
}

#[derive(Debug, Default)]
struct Inner {
    calls: Vec<String>,
    deleted: HashSet<String>,
    failures: HashMap<String, Failure>,
}

/// In-memory [`CloudControl`] that records every call as `"<operation>:<id>"`.
///
/// Deleting the same id twice fails with [`RemoteError::NotFound`], like the
/// real control plane. Failures can be injected per id.
#[derive(Debug, Default)]
pub struct RecordingCloud {
    inner: Mutex<Inner>,
}

impl RecordingCloud {
    pub fn new() -> Self {
        Self::default()
    }

    /// Every destructive call on `id` fails with `message`
    pub fn fail_on(&self, id: impl Into<String>, message: impl Into<String>) {
        self.lock()
            .failures
            .insert(id.into(), Failure::Always(message.into()));
    }

    /// The next `times` destructive calls on `id` are throttled
    pub fn throttle(&self, id: impl Into<String>, times: usize) {
        self.lock().failures.insert(id.into(), Failure::Throttle(times));
    }

    /// Calls made so far, in order
    pub fn calls(&self) -> Vec<String> {
        self.lock().calls.clone()
    }

    pub fn was_deleted(&self, id: &str) -> bool {
        self.lock().deleted.contains(id)
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn injected(inner: &mut Inner, id: &str) -> Result<()> {
        match inner.failures.get_mut(id) {
            Some(Failure::Always(message)) => Err(anyhow::anyhow!("{message}")),
            Some(Failure::Throttle(remaining)) if *remaining > 0 => {
                *remaining -= 1;
                Err(RemoteError::Throttled.into())
            }
            _ => Ok(()),
        }
    }

    fn destroy(&self, operation: &str, id: &str) -> Result<()> {
        let mut inner = self.lock();
        inner.calls.push(format!("{operation}:{id}"));
        Self::injected(&mut inner, id)?;
        if !inner.deleted.insert(id.to_string()) {
            return Err(RemoteError::NotFound {
                message: format!("{id} does not exist"),
            }
            .into());
        }
        Ok(())
    }
}

#[async_trait]
impl CloudControl for RecordingCloud {
    async fn terminate_instance(&self, instance_id: &str) -> Result<()> {
        self.destroy("terminate_instance", instance_id)
    }

    async fn detach_volume(&self, volume_id: &str, instance_id: &str) -> Result<()> {
        let mut inner = self.lock();
        inner
            .calls
            .push(format!("detach_volume:{volume_id}:{instance_id}"));
        Self::injected(&mut inner, volume_id)
    }

    async fn delete_volume(&self, volume_id: &str) -> Result<()> {
        self.destroy("delete_volume", volume_id)
    }

    async fn delete_snapshot(&self, snapshot_id: &str) -> Result<()> {
        self.destroy("delete_snapshot", snapshot_id)
    }

    async fn deregister_image(&self, image_id: &str) -> Result<()> {
        self.destroy("deregister_image", image_id)
    }

    async fn delete_key_pair(&self, key_name: &str) -> Result<()> {
        self.destroy("delete_key_pair", key_name)
    }

    async fn delete_security_group(&self, group_id: &str) -> Result<()> {
        self.destroy("delete_security_group", group_id)
    }

    async fn delete_bucket(&self, bucket: &str) -> Result<()> {
        self.destroy("delete_bucket", bucket)
    }

    async fn delete_load_balancer(&self, name: &str) -> Result<()> {
        self.destroy("delete_load_balancer", name)
    }

    async fn release_address(&self, allocation_id: &str) -> Result<()> {
        self.destroy("release_address", allocation_id)
    }
}
