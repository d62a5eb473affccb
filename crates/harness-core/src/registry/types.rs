//! Core types for resource tracking

use chrono::{DateTime, Utc};
use harness_common::ResourceKind;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Reference to a created remote object, enough to destroy it
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ResourceHandle {
    /// Provider identifier (instance id, volume id, bucket name, ...)
    pub id: String,
    /// Instance this resource is attached to (volumes, addresses)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub attached_to: Option<String>,
}

impl ResourceHandle {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            attached_to: None,
        }
    }

    /// Handle for a resource attached to an instance
    pub fn attached(id: impl Into<String>, instance_id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            attached_to: Some(instance_id.into()),
        }
    }
}

impl fmt::Display for ResourceHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.attached_to {
            Some(instance) => write!(f, "{} (attached to {})", self.id, instance),
            None => f.write_str(&self.id),
        }
    }
}

impl From<&str> for ResourceHandle {
    fn from(id: &str) -> Self {
        Self::new(id)
    }
}

impl From<String> for ResourceHandle {
    fn from(id: String) -> Self {
        Self::new(id)
    }
}

/// Metadata about a tracked resource
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResourceMeta {
    /// Session this resource belongs to
    pub session_id: String,
    /// When the resource was registered
    pub created_at: DateTime<Utc>,
}

impl ResourceMeta {
    /// Create new metadata for a resource being registered now
    pub fn new(session_id: impl Into<String>) -> Self {
        Self {
            session_id: session_id.into(),
            created_at: Utc::now(),
        }
    }
}

/// A registry entry: kind, handle and metadata
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TrackedResource {
    pub kind: ResourceKind,
    pub handle: ResourceHandle,
    pub meta: ResourceMeta,
}

impl TrackedResource {
    /// Human-readable description for logging
    pub fn description(&self) -> String {
        format!("{} {}", self.kind, self.handle)
    }
}
