//! The convergence polling loop.

use super::{FailureCause, FatalMode, Outcome, Probe, RetryPolicy};
use crate::config::HarnessConfig;
use crate::errors::{ConvergenceError, ProbeFailure};
use crate::events::{self, EventSink};
use futures::future::join_all;
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;
use tracing::{debug, info, warn};

/// Hook that may promote a probe failure to fatal.
pub type FatalClassifier = Arc<dyn Fn(&ProbeFailure) -> bool + Send + Sync>;

/// Repeatedly invokes a probe until it converges or the policy is exhausted.
///
/// Attempts run strictly one after another. An in-flight probe always runs
/// to completion before the policy is re-evaluated.
#[derive(Clone)]
pub struct ConvergencePoller {
    policy: RetryPolicy,
    sink: Arc<dyn EventSink>,
    classifier: Option<FatalClassifier>,
}

impl ConvergencePoller {
    /// Creates a poller for a policy.
    #[must_use]
    pub fn new(policy: RetryPolicy) -> Self {
        Self {
            policy,
            sink: events::default_sink(),
            classifier: None,
        }
    }

    /// Creates a poller for the policy of a loaded configuration.
    #[must_use]
    pub fn from_config(config: &HarnessConfig) -> Self {
        Self::new(config.policy.clone())
    }

    /// Sets the event sink.
    #[must_use]
    pub fn with_event_sink(mut self, sink: Arc<dyn EventSink>) -> Self {
        self.sink = sink;
        self
    }

    /// Installs a classifier. Failures it returns true for are treated as
    /// fatal, in addition to failures the probe itself marks fatal.
    ///
    /// Fatal failures only stop polling under [`FatalMode::AbortOnFatal`].
    #[must_use]
    pub fn with_fatal_classifier<F>(mut self, classifier: F) -> Self
    where
        F: Fn(&ProbeFailure) -> bool + Send + Sync + 'static,
    {
        self.classifier = Some(Arc::new(classifier));
        self
    }

    /// Returns the policy.
    #[must_use]
    pub fn policy(&self) -> &RetryPolicy {
        &self.policy
    }

    fn classify(&self, failure: ProbeFailure) -> ProbeFailure {
        match &self.classifier {
            Some(classifier) if !failure.is_fatal() && classifier(&failure) => {
                ProbeFailure::fatal(failure.message)
            }
            _ => failure,
        }
    }

    /// Polls `probe` until it converges or the policy bound is reached.
    pub async fn poll<P: Probe + ?Sized>(&self, probe: &P) -> Outcome {
        let name = probe.describe();

        if let Err(err) = self.policy.validate() {
            warn!(probe = %name, error = %err, "Refusing to poll with invalid retry policy");
            return self
                .fail(&name, err.to_string(), 0, Duration::ZERO, FailureCause::InvalidPolicy)
                .await;
        }

        let deadline = self.policy.deadline();
        let start = Instant::now();
        let mut attempts: u32 = 0;
        let mut streak: u32 = 0;
        let mut last_failure: Option<ProbeFailure> = None;

        loop {
            attempts += 1;

            match probe.observe().await {
                Ok(()) => {
                    streak += 1;
                    if streak >= self.policy.converge_after {
                        let elapsed = start.elapsed();
                        info!(
                            probe = %name,
                            attempts,
                            elapsed_ms = elapsed.as_millis() as u64,
                            "Probe converged"
                        );
                        self.sink
                            .emit(
                                events::PROBE_CONVERGED,
                                json!({
                                    "probe": name,
                                    "attempts": attempts,
                                    "elapsed_ms": elapsed.as_millis() as u64,
                                }),
                            )
                            .await;
                        return Outcome::Converged { attempts, elapsed };
                    }
                    debug!(
                        probe = %name,
                        streak,
                        required = self.policy.converge_after,
                        "Probe succeeded, waiting for consecutive successes"
                    );
                }
                Err(failure) => {
                    streak = 0;
                    let failure = self.classify(failure);
                    if failure.is_fatal() {
                        if self.policy.fatal_mode == FatalMode::AbortOnFatal {
                            return self
                                .fail(&name, failure.message, attempts, start.elapsed(), FailureCause::Fatal)
                                .await;
                        }
                        warn!(probe = %name, attempt = attempts, error = %failure, "Fatal probe failure, retrying anyway");
                    }
                    last_failure = Some(failure);
                }
            }

            let elapsed = start.elapsed();
            let reason = || match &last_failure {
                Some(failure) => failure.message.clone(),
                None => format!(
                    "observed {streak} consecutive success(es), {} required",
                    self.policy.converge_after
                ),
            };

            if let Some(max) = self.policy.max_attempts {
                if attempts >= max {
                    return self
                        .fail(&name, reason(), attempts, elapsed, FailureCause::BudgetExhausted)
                        .await;
                }
            }

            let mut delay = self.policy.delay_after(attempts);
            if let Some(deadline) = deadline {
                if elapsed >= deadline {
                    return self
                        .fail(&name, reason(), attempts, elapsed, FailureCause::DeadlineExceeded)
                        .await;
                }
                delay = delay.min(deadline - elapsed);
            }

            debug!(
                probe = %name,
                attempt = attempts,
                delay_ms = delay.as_millis() as u64,
                error = %reason(),
                "Probe not converged, retrying"
            );
            self.sink
                .emit(
                    events::PROBE_RETRY,
                    json!({
                        "probe": name,
                        "attempt": attempts,
                        "delay_ms": delay.as_millis() as u64,
                        "reason": reason(),
                    }),
                )
                .await;

            tokio::time::sleep(delay).await;
        }
    }

    /// Polls several independent probes concurrently.
    ///
    /// Each probe gets its own loop under the same policy. Outcomes are
    /// returned in the order of `probes`.
    pub async fn poll_all(&self, probes: &[&dyn Probe]) -> Vec<Outcome> {
        join_all(probes.iter().map(|probe| self.poll(*probe))).await
    }

    async fn fail(
        &self,
        name: &str,
        reason: String,
        attempts: u32,
        elapsed: Duration,
        cause: FailureCause,
    ) -> Outcome {
        warn!(
            probe = %name,
            attempts,
            elapsed_ms = elapsed.as_millis() as u64,
            cause = %cause,
            reason = %reason,
            "Probe did not converge"
        );
        self.sink
            .emit(
                events::PROBE_FAILED,
                json!({
                    "probe": name,
                    "attempts": attempts,
                    "elapsed_ms": elapsed.as_millis() as u64,
                    "cause": cause,
                    "reason": reason,
                }),
            )
            .await;
        Outcome::Failed {
            reason,
            attempts,
            elapsed,
            cause,
        }
    }
}

impl std::fmt::Debug for ConvergencePoller {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConvergencePoller")
            .field("policy", &self.policy)
            .field("has_classifier", &self.classifier.is_some())
            .finish()
    }
}

/// Polls `probe` under `policy` with default settings.
pub async fn poll_until_converged<P: Probe + ?Sized>(probe: &P, policy: &RetryPolicy) -> Outcome {
    ConvergencePoller::new(policy.clone()).poll(probe).await
}

/// Like [`poll_until_converged`], failing with the last probe error.
pub async fn ensure_converged<P: Probe + ?Sized>(
    probe: &P,
    policy: &RetryPolicy,
) -> Result<u32, ConvergenceError> {
    poll_until_converged(probe, policy)
        .await
        .into_result(&probe.describe())
}
