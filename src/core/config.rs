/*!
 * Cleaner Configuration
 *
 * Loaded from HANDLE_CLEANER_* environment variables or JSON, with
 * defaults from `core::limits`.
 */

use super::errors::{HandleError, HandleResult};
use super::limits::{CLEANER_THREAD_NAME, DEFAULT_SHUTDOWN_TIMEOUT, SLOW_CLOSE_THRESHOLD};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// What to do when a last-chance close fails
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailurePolicy {
    /// Log the failure and keep running
    #[default]
    Log,
    /// Log the failure, then abort the process
    Abort,
}

impl FailurePolicy {
    /// Whether a failed last-chance close takes the process down
    #[inline]
    pub fn aborts(self) -> bool {
        cfg!(feature = "strict_finalization") || self == FailurePolicy::Abort
    }
}

impl std::str::FromStr for FailurePolicy {
    type Err = HandleError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "log" => Ok(FailurePolicy::Log),
            "abort" => Ok(FailurePolicy::Abort),
            other => Err(HandleError::InvalidConfig(format!(
                "unknown failure policy '{}' (expected 'log' or 'abort')",
                other
            ))),
        }
    }
}

/// Cleaner thread configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "snake_case")]
pub struct CleanerConfig {
    pub thread_name: String,
    pub failure_policy: FailurePolicy,
    pub shutdown_timeout_ms: u64,
    pub slow_close_threshold_ms: u64,
}

impl Default for CleanerConfig {
    fn default() -> Self {
        Self {
            thread_name: CLEANER_THREAD_NAME.to_string(),
            failure_policy: FailurePolicy::Log,
            shutdown_timeout_ms: DEFAULT_SHUTDOWN_TIMEOUT.as_millis() as u64,
            slow_close_threshold_ms: SLOW_CLOSE_THRESHOLD.as_millis() as u64,
        }
    }
}

impl CleanerConfig {
    /// Build from environment variables, falling back to defaults
    ///
    /// - HANDLE_CLEANER_THREAD: cleaner thread name
    /// - HANDLE_CLEANER_FAILURE_POLICY: `log` or `abort`
    /// - HANDLE_CLEANER_SHUTDOWN_MS: shutdown join timeout
    /// - HANDLE_CLEANER_SLOW_CLOSE_MS: slow close warning threshold
    pub fn from_env() -> HandleResult<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Parse a JSON document; missing fields take their defaults
    pub fn from_json(json: &str) -> HandleResult<Self> {
        let config: Self = serde_json::from_str(json)
            .map_err(|e| HandleError::InvalidConfig(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    fn from_lookup<F>(lookup: F) -> HandleResult<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = Self::default();

        if let Some(name) = lookup("HANDLE_CLEANER_THREAD") {
            config.thread_name = name;
        }
        if let Some(policy) = lookup("HANDLE_CLEANER_FAILURE_POLICY") {
            config.failure_policy = policy.parse()?;
        }
        if let Some(ms) = lookup("HANDLE_CLEANER_SHUTDOWN_MS") {
            config.shutdown_timeout_ms = parse_millis("HANDLE_CLEANER_SHUTDOWN_MS", &ms)?;
        }
        if let Some(ms) = lookup("HANDLE_CLEANER_SLOW_CLOSE_MS") {
            config.slow_close_threshold_ms = parse_millis("HANDLE_CLEANER_SLOW_CLOSE_MS", &ms)?;
        }

        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> HandleResult<()> {
        if self.thread_name.trim().is_empty() {
            return Err(HandleError::InvalidConfig(
                "cleaner thread name must not be empty".into(),
            ));
        }
        if self.shutdown_timeout_ms == 0 {
            return Err(HandleError::InvalidConfig(
                "shutdown timeout must be positive".into(),
            ));
        }
        Ok(())
    }

    #[inline]
    pub fn with_thread_name(mut self, name: impl Into<String>) -> Self {
        self.thread_name = name.into();
        self
    }

    #[inline]
    pub fn with_failure_policy(mut self, policy: FailurePolicy) -> Self {
        self.failure_policy = policy;
        self
    }

    #[inline]
    pub fn shutdown_timeout(&self) -> Duration {
        Duration::from_millis(self.shutdown_timeout_ms)
    }

    #[inline]
    pub fn slow_close_threshold(&self) -> Duration {
        Duration::from_millis(self.slow_close_threshold_ms)
    }
}

fn parse_millis(key: &str, value: &str) -> HandleResult<u64> {
    value
        .trim()
        .parse()
        .map_err(|_| HandleError::InvalidConfig(format!("{} must be an integer, got '{}'", key, value)))
}
