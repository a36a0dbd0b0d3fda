//! Coordinator configuration
//!
//! Loaded from a JSON file or built in code. Every field has a default, so
//! a config file only needs the values it changes. Validated once at
//! startup and immutable afterwards.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

/// Configuration loading and validation errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse config: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("invalid config: {0}")]
    Invalid(String),
}

/// Whether membership changes are driven inside the request or in a
/// spawned task.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExecutionMode {
    /// `add_member` / `remove_member` return once the member settles.
    #[default]
    Synchronous,

    /// Requests return the in-progress snapshot; a task drives the member.
    Asynchronous,
}

/// Exponential backoff policy.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryConfig {
    /// Maximum number of attempts before giving up.
    pub max_attempts: u32,

    /// Delay, in milliseconds, before the first retry.
    pub initial_delay_ms: u64,

    /// Upper bound on any single delay.
    pub max_delay_ms: u64,

    /// Multiplier applied to the delay after each attempt.
    pub backoff_factor: f32,

    /// Randomize each delay to between half and all of its nominal value.
    pub jitter: bool,
}

impl RetryConfig {
    /// A policy with 1ms delays, for tests and local runs.
    pub fn immediate(max_attempts: u32) -> Self {
        Self {
            max_attempts,
            initial_delay_ms: 1,
            max_delay_ms: 1,
            backoff_factor: 1.0,
            jitter: false,
        }
    }

    pub fn initial_delay(&self) -> Duration {
        Duration::from_millis(self.initial_delay_ms)
    }

    pub fn max_delay(&self) -> Duration {
        Duration::from_millis(self.max_delay_ms)
    }

    fn validate(&self, name: &str) -> Result<(), ConfigError> {
        if self.max_attempts == 0 {
            return Err(ConfigError::Invalid(format!(
                "{name}.max_attempts must be at least 1"
            )));
        }
        if self.initial_delay_ms > self.max_delay_ms {
            return Err(ConfigError::Invalid(format!(
                "{name}.initial_delay_ms ({}) exceeds max_delay_ms ({})",
                self.initial_delay_ms, self.max_delay_ms
            )));
        }
        if !self.backoff_factor.is_finite() || self.backoff_factor < 1.0 {
            return Err(ConfigError::Invalid(format!(
                "{name}.backoff_factor must be a finite number >= 1.0"
            )));
        }
        Ok(())
    }
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            initial_delay_ms: 500,
            max_delay_ms: 10_000,
            backoff_factor: 2.0,
            jitter: true,
        }
    }
}

/// Reconciliation sweep settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ReconciliationConfig {
    /// Pause between sweeps.
    pub sweep_interval_ms: u64,

    /// A member must have been in its state this long before a sweep
    /// resumes it.
    pub staleness_threshold_ms: u64,

    /// Consecutive sweeps without progress before a member is reported
    /// as stalled.
    pub max_stalled_sweeps: u32,
}

impl Default for ReconciliationConfig {
    fn default() -> Self {
        Self {
            sweep_interval_ms: 60_000,
            staleness_threshold_ms: 300_000,
            max_stalled_sweeps: 5,
        }
    }
}

impl ReconciliationConfig {
    pub fn sweep_interval(&self) -> Duration {
        Duration::from_millis(self.sweep_interval_ms)
    }

    pub fn staleness_threshold(&self) -> Duration {
        Duration::from_millis(self.staleness_threshold_ms)
    }
}

/// Top-level coordinator configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CoordinatorConfig {
    pub mode: ExecutionMode,

    /// Backoff for transient region errors.
    pub retry: RetryConfig,

    /// Pacing of bootstrap and deletion polls. `max_attempts` bounds the
    /// polls of one drive; the member is resumed later if it runs out.
    pub poll: RetryConfig,

    /// Longest a member may stay BOOTSTRAPPING before it is failed.
    pub bootstrap_timeout_ms: u64,

    /// Longest a member may stay DELETING before it is failed.
    pub deletion_timeout_ms: u64,

    /// Compare-and-swap attempts per transition before giving up.
    pub max_cas_retries: u32,

    pub reconciliation: ReconciliationConfig,

    /// Directory for the file-backed group store.
    pub state_dir: Option<PathBuf>,

    /// Path of the JSON-lines audit log.
    pub audit_log_path: Option<PathBuf>,

    /// Buffered group events per subscriber.
    pub event_channel_capacity: usize,
}

impl Default for CoordinatorConfig {
    fn default() -> Self {
        Self {
            mode: ExecutionMode::Synchronous,
            retry: RetryConfig::default(),
            poll: RetryConfig {
                max_attempts: 120,
                initial_delay_ms: 200,
                max_delay_ms: 5_000,
                backoff_factor: 1.5,
                jitter: true,
            },
            bootstrap_timeout_ms: 30 * 60 * 1000,
            deletion_timeout_ms: 10 * 60 * 1000,
            max_cas_retries: 16,
            reconciliation: ReconciliationConfig::default(),
            state_dir: None,
            audit_log_path: None,
            event_channel_capacity: 256,
        }
    }
}

impl CoordinatorConfig {
    /// Read, parse and validate a JSON config file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_json(&content)
    }

    /// Parse and validate a JSON config document.
    pub fn from_json(content: &str) -> Result<Self, ConfigError> {
        let config: Self = serde_json::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    /// Tight delays and timeouts, for tests and local runs.
    pub fn immediate() -> Self {
        Self {
            retry: RetryConfig::immediate(5),
            poll: RetryConfig::immediate(50),
            ..Self::default()
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        self.retry.validate("retry")?;
        self.poll.validate("poll")?;

        if self.bootstrap_timeout_ms == 0 {
            return Err(ConfigError::Invalid(
                "bootstrap_timeout_ms must be positive".into(),
            ));
        }
        if self.deletion_timeout_ms == 0 {
            return Err(ConfigError::Invalid(
                "deletion_timeout_ms must be positive".into(),
            ));
        }
        if self.max_cas_retries == 0 {
            return Err(ConfigError::Invalid(
                "max_cas_retries must be at least 1".into(),
            ));
        }
        if self.reconciliation.sweep_interval_ms == 0 {
            return Err(ConfigError::Invalid(
                "reconciliation.sweep_interval_ms must be positive".into(),
            ));
        }
        if self.reconciliation.max_stalled_sweeps == 0 {
            return Err(ConfigError::Invalid(
                "reconciliation.max_stalled_sweeps must be at least 1".into(),
            ));
        }
        if self.event_channel_capacity == 0 {
            return Err(ConfigError::Invalid(
                "event_channel_capacity must be positive".into(),
            ));
        }
        Ok(())
    }

    pub fn bootstrap_timeout(&self) -> Duration {
        Duration::from_millis(self.bootstrap_timeout_ms)
    }

    pub fn deletion_timeout(&self) -> Duration {
        Duration::from_millis(self.deletion_timeout_ms)
    }

    pub fn is_async(&self) -> bool {
        self.mode == ExecutionMode::Asynchronous
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_default_is_valid_and_synchronous() {
        let config = CoordinatorConfig::default();
        assert!(config.validate().is_ok());
        assert!(!config.is_async());
        assert_eq!(config.bootstrap_timeout(), Duration::from_secs(1800));
        assert_eq!(config.reconciliation.sweep_interval(), Duration::from_secs(60));
    }

    #[test]
    fn test_partial_json_uses_defaults() {
        let config = CoordinatorConfig::from_json(
            r#"{ "mode": "asynchronous", "retry": { "max_attempts": 3 } }"#,
        )
        .unwrap();

        assert!(config.is_async());
        assert_eq!(config.retry.max_attempts, 3);
        assert_eq!(config.retry.initial_delay_ms, 500);
        assert_eq!(config.max_cas_retries, 16);
    }

    #[test]
    fn test_invalid_values_are_rejected() {
        let err = CoordinatorConfig::from_json(r#"{ "max_cas_retries": 0 }"#).unwrap_err();
        assert!(matches!(err, ConfigError::Invalid(_)));

        let err = CoordinatorConfig::from_json(
            r#"{ "retry": { "initial_delay_ms": 20000, "max_delay_ms": 10 } }"#,
        )
        .unwrap_err();
        assert!(err.to_string().contains("retry.initial_delay_ms"));

        let err =
            CoordinatorConfig::from_json(r#"{ "poll": { "backoff_factor": 0.5 } }"#).unwrap_err();
        assert!(err.to_string().contains("poll.backoff_factor"));
    }

    #[test]
    fn test_load_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(
            file,
            r#"{{ "state_dir": "/var/lib/replgroup", "reconciliation": {{ "max_stalled_sweeps": 2 }} }}"#
        )
        .unwrap();

        let config = CoordinatorConfig::load(file.path()).unwrap();
        assert_eq!(config.state_dir, Some(PathBuf::from("/var/lib/replgroup")));
        assert_eq!(config.reconciliation.max_stalled_sweeps, 2);
    }

    #[test]
    fn test_missing_file_reports_path() {
        let err = CoordinatorConfig::load("/nonexistent/replgroup.json").unwrap_err();
        assert!(err.to_string().contains("/nonexistent/replgroup.json"));
    }

    #[test]
    fn test_malformed_json() {
        let err = CoordinatorConfig::from_json("{ not json").unwrap_err();
        assert!(matches!(err, ConfigError::Parse(_)));
    }
}
