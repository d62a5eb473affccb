//! Harness configuration loaded from JSON

use crate::cleanup::SweepOptions;
use crate::error::PolicyError;
use crate::policy::PollPolicy;
use harness_common::defaults::{
    default_cleanup_retry_attempts, default_max_attempts, default_poll_interval_secs,
    default_probe_timeout_secs, default_session_prefix, default_wait_timeout_secs,
};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use std::time::Duration;
use thiserror::Error;

/// Configuration validation errors
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Poll section does not form a valid policy
    #[error("invalid poll settings: {0}")]
    InvalidPoll(#[from] PolicyError),

    /// Session prefix is empty
    #[error("session.prefix cannot be empty")]
    EmptySessionPrefix,

    /// Failed to parse JSON configuration
    #[error("Failed to parse config: {0}")]
    Parse(#[from] serde_json::Error),

    /// Failed to read configuration file
    #[error("Failed to read config file '{path}': {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },
}

impl ConfigError {
    /// Create an IO error with path context
    pub fn io(path: impl Into<String>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }
}

/// Harness configuration. Every field has a default, so `{}` is valid.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct HarnessConfig {
    pub session: SessionSettings,
    pub poll: PollSettings,
    pub cleanup: CleanupSettings,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionSettings {
    /// Prefix of generated session ids
    #[serde(default = "default_session_prefix")]
    pub prefix: String,
}

impl Default for SessionSettings {
    fn default() -> Self {
        Self {
            prefix: default_session_prefix(),
        }
    }
}

/// Default poll policy for waits that do not use a preset
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PollSettings {
    #[serde(default = "default_poll_interval_secs")]
    pub interval_secs: u64,
    #[serde(default = "default_max_attempts")]
    pub max_attempts: Option<u32>,
    #[serde(default = "default_wait_timeout_secs")]
    pub timeout_secs: Option<u64>,
    /// Enables exponential backoff capped at this many seconds
    #[serde(default)]
    pub backoff_max_secs: Option<u64>,
    #[serde(default = "default_probe_timeout_secs")]
    pub probe_timeout_secs: Option<u64>,
}

impl Default for PollSettings {
    fn default() -> Self {
        Self {
            interval_secs: default_poll_interval_secs(),
            max_attempts: default_max_attempts(),
            timeout_secs: default_wait_timeout_secs(),
            backoff_max_secs: None,
            probe_timeout_secs: default_probe_timeout_secs(),
        }
    }
}

impl PollSettings {
    /// Build and validate the policy these settings describe
    pub fn to_policy(&self) -> Result<PollPolicy, PolicyError> {
        let policy = PollPolicy {
            interval: Duration::from_secs(self.interval_secs),
            max_attempts: self.max_attempts,
            timeout: self.timeout_secs.map(Duration::from_secs),
            progress_aware: false,
            max_interval: self.backoff_max_secs.map(Duration::from_secs),
            probe_timeout: self.probe_timeout_secs.map(Duration::from_secs),
        };
        policy.validate()?;
        Ok(policy)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CleanupSettings {
    /// Log what would be destroyed without destroying it
    #[serde(default)]
    pub dry_run: bool,
    #[serde(default = "default_cleanup_retry_attempts")]
    pub retry_attempts: usize,
}

impl Default for CleanupSettings {
    fn default() -> Self {
        Self {
            dry_run: false,
            retry_attempts: default_cleanup_retry_attempts(),
        }
    }
}

impl From<&CleanupSettings> for SweepOptions {
    fn from(settings: &CleanupSettings) -> Self {
        SweepOptions {
            dry_run: settings.dry_run,
            retry_attempts: settings.retry_attempts,
        }
    }
}

impl HarnessConfig {
    /// Load and validate configuration from a JSON file
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let content = fs::read_to_string(path)
            .map_err(|e| ConfigError::io(path.display().to_string(), e))?;
        let config: Self = serde_json::from_str(&content)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.session.prefix.trim().is_empty() {
            return Err(ConfigError::EmptySessionPrefix);
        }
        self.poll.to_policy()?;
        Ok(())
    }

    pub fn sweep_options(&self) -> SweepOptions {
        SweepOptions::from(&self.cleanup)
    }
}
