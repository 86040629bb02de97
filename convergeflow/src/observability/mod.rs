//! Tracing subscriber setup.
//!
//! Library code only emits `tracing` events; suites call [`init_tracing`]
//! once to decide where they go.

use crate::config::HarnessConfig;
use crate::errors::HarnessError;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::EnvFilter;

/// Environment variable holding a filter directive.
pub const LOG_ENV: &str = "CONVERGEFLOW_LOG";

/// Builds the filter: `CONVERGEFLOW_LOG`, then `RUST_LOG`, then `fallback`.
pub fn build_filter(fallback: &str) -> Result<EnvFilter, HarnessError> {
    if let Ok(filter) = EnvFilter::try_from_env(LOG_ENV) {
        return Ok(filter);
    }
    if let Ok(filter) = EnvFilter::try_from_default_env() {
        return Ok(filter);
    }
    EnvFilter::try_new(fallback)
        .map_err(|e| HarnessError::Config(format!("invalid log filter '{fallback}': {e}")))
}

/// Installs the global subscriber.
///
/// Fails if a global subscriber is already set.
pub fn init_tracing(config: &HarnessConfig) -> Result<(), HarnessError> {
    let filter = build_filter(&config.log_filter)?;
    let registry = tracing_subscriber::registry().with(filter);

    let result = if config.log_json {
        registry
            .with(
                tracing_subscriber::fmt::layer()
                    .json()
                    .with_current_span(true)
                    .with_span_list(false)
                    .with_target(true),
            )
            .try_init()
    } else {
        registry
            .with(tracing_subscriber::fmt::layer().with_target(true))
            .try_init()
    };

    result.map_err(|e| HarnessError::Config(format!("failed to install tracing subscriber: {e}")))
}

/// Installs a test-writer subscriber, ignoring repeat calls.
pub fn init_test_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_env(LOG_ENV).unwrap_or_else(|_| EnvFilter::new("debug")))
        .with_test_writer()
        .try_init();
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fallback_filter_parses() {
        assert!(build_filter("info,convergeflow=debug").is_ok());
    }

    #[test]
    fn test_init_test_tracing_is_idempotent() {
        init_test_tracing();
        init_test_tracing();
        tracing::info!("still logging");
    }
}
