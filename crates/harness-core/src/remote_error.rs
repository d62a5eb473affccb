//! Remote control plane error classification
//!
//! Cloud clients report failures as provider error codes. Cleanup needs to
//! know two things about them: whether the resource is already gone (a
//! second delete is then a no-op) and whether the call is worth retrying.
//! Clients should put a [`RemoteError`] in their error chain; codes embedded
//! in the message text are recognised as a fallback.

use thiserror::Error;

/// Remote error categories for retry and cleanup logic
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RemoteError {
    /// Resource was not found (safe to skip in cleanup)
    #[error("Resource not found: {message}")]
    NotFound { message: String },

    /// Resource already exists
    #[error("Resource already exists: {message}")]
    AlreadyExists { message: String },

    /// Rate limit exceeded (retryable with backoff)
    #[error("Rate limit exceeded")]
    Throttled,

    /// Resource still has dependents, e.g. a group used by a terminating instance
    #[error("Resource has dependent objects: {message}")]
    DependencyViolation { message: String },

    /// Any other provider error
    #[error("Remote error{}: {message}", .code.as_deref().map(|c| format!(" {c}")).unwrap_or_default())]
    Other {
        code: Option<String>,
        message: String,
    },
}

impl RemoteError {
    pub fn is_not_found(&self) -> bool {
        matches!(self, RemoteError::NotFound { .. })
    }

    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            RemoteError::Throttled | RemoteError::DependencyViolation { .. }
        )
    }

    pub fn is_already_exists(&self) -> bool {
        matches!(self, RemoteError::AlreadyExists { .. })
    }
}

/// Known error codes for "not found" conditions
const NOT_FOUND_CODES: &[&str] = &[
    "InvalidInstanceID.NotFound",
    "InvalidVolume.NotFound",
    "InvalidSnapshot.NotFound",
    "InvalidAMIID.NotFound",
    "InvalidAMIID.Unavailable",
    "InvalidGroup.NotFound",
    "InvalidKeyPair.NotFound",
    "InvalidAllocationID.NotFound",
    "InvalidAddress.NotFound",
    "LoadBalancerNotFound",
    "NoSuchBucket",
    "NoSuchKey",
];

/// Known error codes for "already exists" conditions
const ALREADY_EXISTS_CODES: &[&str] = &[
    "InvalidGroup.Duplicate",
    "InvalidKeyPair.Duplicate",
    "DuplicateLoadBalancerName",
    "BucketAlreadyOwnedByYou",
    "BucketAlreadyExists",
];

/// Known error codes for throttling/rate limiting
const THROTTLING_CODES: &[&str] = &["Throttling", "ThrottlingException", "RequestLimitExceeded"];

/// Known error codes for resources still in use
const DEPENDENCY_CODES: &[&str] = &["DependencyViolation", "VolumeInUse", "InvalidGroup.InUse"];

/// Classify a remote error from its code and message.
pub fn classify_error_code(code: Option<&str>, message: Option<&str>) -> RemoteError {
    let message = message.unwrap_or("Unknown error").to_string();

    match code {
        Some(c) if NOT_FOUND_CODES.contains(&c) || c.ends_with(".NotFound") => {
            RemoteError::NotFound { message }
        }
        Some(c) if ALREADY_EXISTS_CODES.contains(&c) || c.ends_with(".Duplicate") => {
            RemoteError::AlreadyExists { message }
        }
        Some(c) if THROTTLING_CODES.contains(&c) => RemoteError::Throttled,
        Some(c) if DEPENDENCY_CODES.contains(&c) => RemoteError::DependencyViolation { message },
        _ => RemoteError::Other {
            code: code.map(|s| s.to_string()),
            message,
        },
    }
}

/// Classify an `anyhow::Error` returned by a cloud client.
///
/// Walks the error chain for a [`RemoteError`]; falls back to looking for a
/// known code in the rendered error.
pub fn classify_anyhow_error(error: &anyhow::Error) -> RemoteError {
    for cause in error.chain() {
        if let Some(remote) = cause.downcast_ref::<RemoteError>() {
            return remote.clone();
        }
    }

    let rendered = format!("{:?}", error);
    if let Some(code) = extract_error_code(&rendered) {
        return classify_error_code(Some(&code), Some(&error.to_string()));
    }

    RemoteError::Other {
        code: None,
        message: error.to_string(),
    }
}

/// Whether an error means the resource is already gone
pub fn is_not_found(error: &anyhow::Error) -> bool {
    classify_anyhow_error(error).is_not_found()
}

/// Treat "not found" as success, for idempotent deletes
pub fn ignore_not_found(result: anyhow::Result<()>) -> anyhow::Result<()> {
    match result {
        Err(e) if is_not_found(&e) => Ok(()),
        other => other,
    }
}

/// Extract a known error code from a rendered error
fn extract_error_code(rendered: &str) -> Option<String> {
    let known = NOT_FOUND_CODES
        .iter()
        .chain(ALREADY_EXISTS_CODES)
        .chain(THROTTLING_CODES)
        .chain(DEPENDENCY_CODES);
    for code in known {
        if rendered.contains(code) {
            return Some((*code).to_string());
        }
    }

    // Try to extract any code from `code: Some("...")` pattern
    if let Some(start) = rendered.find("code: Some(\"") {
        let rest = &rendered[start + 12..];
        if let Some(end) = rest.find('"') {
            return Some(rest[..end].to_string());
        }
    }

    None
}
