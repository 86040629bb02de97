//! Apply-then-converge composition.
//!
//! [`EndpointProbe`] turns one data-plane call into a probe observation, and
//! [`ConvergenceCheck`] applies a document and polls until the probe passes.

use crate::collaborators::{CallOptions, ConfigStore, Endpoint, Scope};
use crate::errors::{HarnessError, ProbeFailure};
use crate::poller::{ConvergencePoller, Outcome, Probe};
use async_trait::async_trait;
use regex::Regex;
use std::sync::Arc;
use tracing::info;

/// What a data-plane response must look like.
#[derive(Debug, Clone)]
pub struct Expectation {
    /// Required status code.
    pub status: u16,
    /// Optional pattern the body must match.
    pub body: Option<Regex>,
}

impl Default for Expectation {
    fn default() -> Self {
        Self {
            status: 200,
            body: None,
        }
    }
}

impl Expectation {
    /// Checks a response.
    pub fn check(&self, status: u16, body: &str) -> Result<(), ProbeFailure> {
        if status != self.status {
            return Err(ProbeFailure::transient(format!(
                "got invalid response code {status}: {body}"
            )));
        }
        if let Some(pattern) = &self.body {
            if !pattern.is_match(body) {
                return Err(ProbeFailure::transient(format!(
                    "response body did not match /{pattern}/: {body}"
                )));
            }
        }
        Ok(())
    }
}

/// Probes a data-plane endpoint with a single call per observation.
///
/// Transport errors and unexpected responses are reported as transient.
#[derive(Clone)]
pub struct EndpointProbe {
    endpoint: Arc<dyn Endpoint>,
    options: CallOptions,
    expectation: Expectation,
}

impl EndpointProbe {
    /// Creates a probe expecting status 200.
    #[must_use]
    pub fn new(endpoint: Arc<dyn Endpoint>, options: CallOptions) -> Self {
        Self {
            endpoint,
            options,
            expectation: Expectation::default(),
        }
    }

    /// Expects a specific status code.
    #[must_use]
    pub fn expect_status(mut self, status: u16) -> Self {
        self.expectation.status = status;
        self
    }

    /// Expects the body to match a regular expression.
    pub fn expect_body(mut self, pattern: &str) -> Result<Self, regex::Error> {
        self.expectation.body = Some(Regex::new(pattern)?);
        Ok(self)
    }

    /// Returns the call options.
    #[must_use]
    pub fn options(&self) -> &CallOptions {
        &self.options
    }
}

impl std::fmt::Debug for EndpointProbe {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EndpointProbe")
            .field("options", &self.options)
            .field("expectation", &self.expectation)
            .finish()
    }
}

#[async_trait]
impl Probe for EndpointProbe {
    async fn observe(&self) -> Result<(), ProbeFailure> {
        let response = self
            .endpoint
            .call(&self.options)
            .await
            .map_err(ProbeFailure::from)?;
        self.expectation.check(response.status, &response.body)
    }

    fn describe(&self) -> String {
        format!("{}{}", self.options.host, self.options.path)
    }
}

/// Applies configuration and waits for it to become observable.
#[derive(Clone)]
pub struct ConvergenceCheck {
    store: Arc<dyn ConfigStore>,
    poller: ConvergencePoller,
}

impl ConvergenceCheck {
    /// Creates a check against a store.
    #[must_use]
    pub fn new(store: Arc<dyn ConfigStore>, poller: ConvergencePoller) -> Self {
        Self { store, poller }
    }

    /// Applies `document` to `scope`, then polls `probe`.
    ///
    /// A store rejection is returned as `HarnessError::Apply` before polling
    /// starts; a polling failure is returned inside the `Outcome`.
    pub async fn apply_and_poll<P: Probe + ?Sized>(
        &self,
        scope: &Scope,
        document: &str,
        probe: &P,
    ) -> Result<Outcome, HarnessError> {
        self.store
            .apply(scope, document)
            .await
            .map_err(|source| HarnessError::Apply {
                scope: scope.name().to_string(),
                source,
            })?;
        info!(scope = %scope, probe = %probe.describe(), "Configuration applied, polling for convergence");
        Ok(self.poller.poll(probe).await)
    }

    /// Like [`apply_and_poll`](Self::apply_and_poll), but a failed outcome
    /// becomes an error. Returns the attempt count.
    pub async fn apply_and_ensure<P: Probe + ?Sized>(
        &self,
        scope: &Scope,
        document: &str,
        probe: &P,
    ) -> Result<u32, HarnessError> {
        let outcome = self.apply_and_poll(scope, document, probe).await?;
        Ok(outcome.into_result(&probe.describe())?)
    }
}

impl std::fmt::Debug for ConvergenceCheck {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConvergenceCheck")
            .field("poller", &self.poller)
            .finish()
    }
}
