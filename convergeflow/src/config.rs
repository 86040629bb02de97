//! Harness configuration.
//!
//! Loaded from JSON and then overridden from `CONVERGEFLOW_*` environment
//! variables, so CI can stretch timeouts without editing suite files.

use crate::environment::EnvironmentKind;
use crate::errors::HarnessError;
use crate::poller::RetryPolicy;
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Overrides the policy deadline, in milliseconds. `0` removes the deadline.
pub const ENV_TIMEOUT_MS: &str = "CONVERGEFLOW_TIMEOUT_MS";
/// Overrides the fixed delay between attempts, in milliseconds.
pub const ENV_DELAY_MS: &str = "CONVERGEFLOW_DELAY_MS";
/// Overrides the attempt budget. `0` removes the budget.
pub const ENV_MAX_ATTEMPTS: &str = "CONVERGEFLOW_MAX_ATTEMPTS";
/// Overrides the active environment kind.
pub const ENV_KIND: &str = "CONVERGEFLOW_ENV";

/// Top-level configuration for a suite run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HarnessConfig {
    /// Default retry policy for convergence checks.
    #[serde(default)]
    pub policy: RetryPolicy,
    /// Active environment kind.
    #[serde(default)]
    pub environment: EnvironmentKind,
    /// Emit JSON log lines.
    #[serde(default)]
    pub log_json: bool,
    /// Filter directive used when `CONVERGEFLOW_LOG` is unset.
    #[serde(default = "default_log_filter")]
    pub log_filter: String,
}

fn default_log_filter() -> String {
    "info,convergeflow=debug".to_string()
}

impl Default for HarnessConfig {
    fn default() -> Self {
        Self {
            policy: RetryPolicy::default(),
            environment: EnvironmentKind::default(),
            log_json: false,
            log_filter: default_log_filter(),
        }
    }
}

impl HarnessConfig {
    /// Creates a configuration with defaults.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Parses a JSON document. Missing fields take their defaults.
    pub fn from_json_str(json: &str) -> Result<Self, HarnessError> {
        let config: Self = serde_json::from_str(json)
            .map_err(|e| HarnessError::Config(format!("invalid harness config: {e}")))?;
        config.validate()?;
        Ok(config)
    }

    /// Reads and parses a JSON file.
    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self, HarnessError> {
        let contents = std::fs::read_to_string(path.as_ref())?;
        Self::from_json_str(&contents)
    }

    /// Defaults overridden from the process environment.
    pub fn from_env() -> Result<Self, HarnessError> {
        Self::default().with_overrides_from(|key| std::env::var(key).ok())
    }

    /// Applies overrides from a variable lookup.
    pub fn with_overrides_from<F>(mut self, lookup: F) -> Result<Self, HarnessError>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(ms) = parse_var::<u64>(&lookup, ENV_TIMEOUT_MS)? {
            self.policy.deadline_ms = (ms > 0).then_some(ms);
        }
        if let Some(ms) = parse_var::<u64>(&lookup, ENV_DELAY_MS)? {
            self.policy = self
                .policy
                .with_fixed_delay(std::time::Duration::from_millis(ms));
        }
        if let Some(n) = parse_var::<u32>(&lookup, ENV_MAX_ATTEMPTS)? {
            self.policy.max_attempts = (n > 0).then_some(n);
        }
        if let Some(kind) = parse_var::<EnvironmentKind>(&lookup, ENV_KIND)? {
            self.environment = kind;
        }
        self.validate()?;
        Ok(self)
    }

    fn validate(&self) -> Result<(), HarnessError> {
        self.policy.validate()?;
        Ok(())
    }
}

fn parse_var<T>(lookup: &impl Fn(&str) -> Option<String>, key: &str) -> Result<Option<T>, HarnessError>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    match lookup(key) {
        None => Ok(None),
        Some(raw) if raw.trim().is_empty() => Ok(None),
        Some(raw) => raw
            .trim()
            .parse()
            .map(Some)
            .map_err(|e| HarnessError::Config(format!("{key}={raw}: {e}"))),
    }
}
