//! Single-owner resource registry

use super::types::{ResourceHandle, ResourceMeta, TrackedResource};
use harness_common::ResourceKind;
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use tracing::{debug, warn};

/// In-memory catalog of every resource a test session created.
///
/// Entries are grouped by kind; insertion order within a kind is preserved
/// because teardown of some kinds is order-sensitive. A handle id is held at
/// most once per kind: registering it again is ignored with a warning, so a
/// caller bug can never lead to a double delete during teardown.
#[derive(Debug, Clone, Default)]
pub struct ResourceRegistry {
    session_id: String,
    by_kind: HashMap<ResourceKind, Vec<Entry>>,
    /// Kinds in order of first registration
    kinds: Vec<ResourceKind>,
    /// Every registered (kind, id) pair
    index: HashSet<(ResourceKind, String)>,
}

#[derive(Debug, Clone)]
struct Entry {
    handle: ResourceHandle,
    meta: ResourceMeta,
}

impl ResourceRegistry {
    pub fn new(session_id: impl Into<String>) -> Self {
        Self {
            session_id: session_id.into(),
            ..Default::default()
        }
    }

    pub fn session_id(&self) -> &str {
        &self.session_id
    }

    /// Register a resource for teardown.
    ///
    /// Call this immediately after the remote create call returns, before any
    /// fallible operation that could leave the resource orphaned. Returns
    /// `false` if the handle was already registered under this kind.
    pub fn register(&mut self, kind: ResourceKind, handle: impl Into<ResourceHandle>) -> bool {
        let meta = ResourceMeta::new(self.session_id.clone());
        self.insert(kind, handle.into(), meta)
    }

    fn insert(&mut self, kind: ResourceKind, handle: ResourceHandle, meta: ResourceMeta) -> bool {
        if !self.index.insert((kind.clone(), handle.id.clone())) {
            warn!(kind = %kind, id = %handle.id, "Resource already registered, ignoring duplicate");
            return false;
        }
        if !self.by_kind.contains_key(&kind) {
            self.kinds.push(kind.clone());
        }

        debug!(kind = %kind, handle = %handle, "Registered resource");
        self.by_kind
            .entry(kind)
            .or_default()
            .push(Entry { handle, meta });
        true
    }

    /// Handles registered under `kind`, in insertion order
    pub fn entries_of(&self, kind: &ResourceKind) -> Vec<ResourceHandle> {
        self.by_kind
            .get(kind)
            .map(|entries| entries.iter().map(|e| e.handle.clone()).collect())
            .unwrap_or_default()
    }

    /// Forget a resource the test deleted itself. No-op if absent.
    pub fn remove(&mut self, kind: &ResourceKind, id: &str) -> Option<ResourceHandle> {
        if !self.index.remove(&(kind.clone(), id.to_string())) {
            return None;
        }
        let entries = self.by_kind.get_mut(kind)?;
        let pos = entries.iter().position(|e| e.handle.id == id)?;
        let entry = entries.remove(pos);
        debug!(kind = %kind, id = %id, "Removed resource from registry");
        Some(entry.handle)
    }

    /// Record that a resource was attached to (or detached from) an instance.
    ///
    /// Returns `false` if the resource is not registered.
    pub fn set_attachment(
        &mut self,
        kind: &ResourceKind,
        id: &str,
        instance_id: Option<String>,
    ) -> bool {
        match self
            .by_kind
            .get_mut(kind)
            .and_then(|entries| entries.iter_mut().find(|e| e.handle.id == id))
        {
            Some(entry) => {
                entry.handle.attached_to = instance_id;
                true
            }
            None => false,
        }
    }

    pub fn contains(&self, kind: &ResourceKind, id: &str) -> bool {
        self.index.contains(&(kind.clone(), id.to_string()))
    }

    /// Kinds with at least one registration ever, in first-registration order
    pub fn kinds(&self) -> Vec<ResourceKind> {
        self.kinds
            .iter()
            .filter(|k| self.by_kind.get(*k).is_some_and(|e| !e.is_empty()))
            .cloned()
            .collect()
    }

    /// Every tracked resource, grouped by kind in first-registration order
    pub fn resources(&self) -> Vec<TrackedResource> {
        self.kinds
            .iter()
            .flat_map(|kind| {
                self.by_kind
                    .get(kind)
                    .into_iter()
                    .flatten()
                    .map(move |e| TrackedResource {
                        kind: kind.clone(),
                        handle: e.handle.clone(),
                        meta: e.meta.clone(),
                    })
            })
            .collect()
    }

    pub fn len(&self) -> usize {
        self.by_kind.values().map(Vec::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Absorb the entries of another registry (e.g. one kept by a worker task).
    ///
    /// Entries keep their original metadata; duplicates are dropped.
    pub fn merge(&mut self, other: ResourceRegistry) {
        for resource in other.resources() {
            self.insert(resource.kind, resource.handle, resource.meta);
        }
    }

    /// Serializable copy of the registry
    pub fn snapshot(&self) -> RegistrySnapshot {
        RegistrySnapshot {
            session_id: self.session_id.clone(),
            resources: self.resources(),
        }
    }

    /// Rebuild a registry from a snapshot
    pub fn from_snapshot(snapshot: RegistrySnapshot) -> Self {
        let mut registry = Self::new(snapshot.session_id);
        for resource in snapshot.resources {
            registry.insert(resource.kind, resource.handle, resource.meta);
        }
        registry
    }
}

/// Serializable registry contents, for reconciling leaked resources by hand
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RegistrySnapshot {
    pub session_id: String,
    pub resources: Vec<TrackedResource>,
}
