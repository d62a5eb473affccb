//! Cloud resource kinds and teardown ordering
//!
//! Every resource a test session creates is filed under one of these kinds.
//! The string tags are the ones test code has always used ("instances",
//! "volumes", ...); a few historical aliases are accepted when parsing.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// Error returned when a kind tag cannot be parsed
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ParseKindError {
    #[error("resource kind tag cannot be empty")]
    Empty,
    #[error("'{0}' names a built-in resource kind")]
    Builtin(String),
}

/// Tag of a kind outside the built-in set.
///
/// Always trimmed, lowercase and distinct from every built-in tag or alias,
/// so it survives a serialize/parse round trip unchanged.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CustomTag(String);

impl CustomTag {
    pub fn new(tag: &str) -> Result<Self, ParseKindError> {
        let tag = tag.trim().to_ascii_lowercase();
        if tag.is_empty() {
            return Err(ParseKindError::Empty);
        }
        if builtin_kind(&tag).is_some() {
            return Err(ParseKindError::Builtin(tag));
        }
        Ok(Self(tag))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

/// Built-in kind for a lowercase tag or alias
fn builtin_kind(tag: &str) -> Option<ResourceKind> {
    Some(match tag {
        "load-balancers" | "loadbalancers" | "elbs" => ResourceKind::LoadBalancer,
        "instances" => ResourceKind::Instance,
        "addresses" => ResourceKind::Address,
        "volumes" => ResourceKind::Volume,
        "snapshots" => ResourceKind::Snapshot,
        "images" => ResourceKind::Image,
        "buckets" => ResourceKind::Bucket,
        "keys" | "keypairs" => ResourceKind::KeyPair,
        "groups" | "security-groups" => ResourceKind::SecurityGroup,
        _ => return None,
    })
}

/// Kinds of remote resources tracked by a test session
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum ResourceKind {
    /// Load balancer (holds instance registrations)
    LoadBalancer,
    /// Virtual machine instance
    Instance,
    /// Elastic/public address allocation
    Address,
    /// Block storage volume, possibly attached to an instance
    Volume,
    /// Volume snapshot
    Snapshot,
    /// Registered machine image
    Image,
    /// Object storage bucket
    Bucket,
    /// SSH key pair
    KeyPair,
    /// Security group (in use until its instances are gone)
    SecurityGroup,
    /// Any tag not covered above
    Other(CustomTag),
}

impl ResourceKind {
    /// Every built-in kind, in teardown order
    pub const BUILTIN: [ResourceKind; 9] = [
        ResourceKind::LoadBalancer,
        ResourceKind::Instance,
        ResourceKind::Address,
        ResourceKind::Volume,
        ResourceKind::Snapshot,
        ResourceKind::Image,
        ResourceKind::Bucket,
        ResourceKind::KeyPair,
        ResourceKind::SecurityGroup,
    ];

    /// Kind outside the built-in set; built-in tags and aliases are rejected
    pub fn custom(tag: &str) -> Result<Self, ParseKindError> {
        CustomTag::new(tag).map(ResourceKind::Other)
    }

    /// Canonical string tag
    pub fn as_str(&self) -> &str {
        match self {
            ResourceKind::LoadBalancer => "load-balancers",
            ResourceKind::Instance => "instances",
            ResourceKind::Address => "addresses",
            ResourceKind::Volume => "volumes",
            ResourceKind::Snapshot => "snapshots",
            ResourceKind::Image => "images",
            ResourceKind::Bucket => "buckets",
            ResourceKind::KeyPair => "keypairs",
            ResourceKind::SecurityGroup => "security-groups",
            ResourceKind::Other(tag) => tag.as_str(),
        }
    }

    /// Get cleanup priority (lower number = cleanup first)
    ///
    /// - 0: Load balancers (deregister before their instances go away)
    /// - 1: Instances
    /// - 2: Addresses (released once disassociated by termination)
    /// - 3: Volumes (detached by termination, or detached explicitly)
    /// - 4: Snapshots, then 5: images built from them
    /// - 6: Buckets, 7: key pairs
    /// - 8: Security groups (cannot be deleted while instances use them)
    /// - 9: Unknown kinds last
    pub fn cleanup_priority(&self) -> u8 {
        match self {
            ResourceKind::LoadBalancer => 0,
            ResourceKind::Instance => 1,
            ResourceKind::Address => 2,
            ResourceKind::Volume => 3,
            ResourceKind::Snapshot => 4,
            ResourceKind::Image => 5,
            ResourceKind::Bucket => 6,
            ResourceKind::KeyPair => 7,
            ResourceKind::SecurityGroup => 8,
            ResourceKind::Other(_) => 9,
        }
    }
}

impl fmt::Display for ResourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ResourceKind {
    type Err = ParseKindError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let tag = s.trim().to_ascii_lowercase();
        match builtin_kind(&tag) {
            Some(kind) => Ok(kind),
            None => ResourceKind::custom(&tag),
        }
    }
}

impl TryFrom<String> for ResourceKind {
    type Error = ParseKindError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<ResourceKind> for String {
    fn from(kind: ResourceKind) -> Self {
        kind.as_str().to_string()
    }
}
