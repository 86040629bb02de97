//! Aggregate result of a polling loop.

use crate::errors::ConvergenceError;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Why a polling loop ended without converging.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureCause {
    /// The attempt budget ran out.
    BudgetExhausted,
    /// The deadline passed.
    DeadlineExceeded,
    /// A fatal probe failure aborted polling.
    Fatal,
    /// The policy could not bound the loop; the probe was never invoked.
    InvalidPolicy,
}

impl std::fmt::Display for FailureCause {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::BudgetExhausted => write!(f, "budget_exhausted"),
            Self::DeadlineExceeded => write!(f, "deadline_exceeded"),
            Self::Fatal => write!(f, "fatal"),
            Self::InvalidPolicy => write!(f, "invalid_policy"),
        }
    }
}

/// Result of [`poll_until_converged`](super::poll_until_converged).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum Outcome {
    /// The last probe attempt succeeded.
    Converged {
        /// Probe invocations made.
        attempts: u32,
        /// Time spent polling.
        elapsed: Duration,
    },
    /// Polling stopped without convergence.
    Failed {
        /// Most recent probe failure, or the policy error.
        reason: String,
        /// Probe invocations made.
        attempts: u32,
        /// Time spent polling.
        elapsed: Duration,
        /// Why polling stopped.
        cause: FailureCause,
    },
}

impl Outcome {
    /// Returns true if converged.
    #[must_use]
    pub fn is_converged(&self) -> bool {
        matches!(self, Self::Converged { .. })
    }

    /// Returns true if failed.
    #[must_use]
    pub fn is_failed(&self) -> bool {
        matches!(self, Self::Failed { .. })
    }

    /// Returns the number of probe invocations.
    #[must_use]
    pub fn attempts(&self) -> u32 {
        match self {
            Self::Converged { attempts, .. } | Self::Failed { attempts, .. } => *attempts,
        }
    }

    /// Returns the time spent polling.
    #[must_use]
    pub fn elapsed(&self) -> Duration {
        match self {
            Self::Converged { elapsed, .. } | Self::Failed { elapsed, .. } => *elapsed,
        }
    }

    /// Returns the failure reason, if failed.
    #[must_use]
    pub fn reason(&self) -> Option<&str> {
        match self {
            Self::Converged { .. } => None,
            Self::Failed { reason, .. } => Some(reason),
        }
    }

    /// Returns the failure cause, if failed.
    #[must_use]
    pub fn cause(&self) -> Option<FailureCause> {
        match self {
            Self::Converged { .. } => None,
            Self::Failed { cause, .. } => Some(*cause),
        }
    }

    /// Converts into a result, returning the attempt count on convergence.
    ///
    /// `description` names what was being waited for in the error message.
    pub fn into_result(self, description: &str) -> Result<u32, ConvergenceError> {
        match self {
            Self::Converged { attempts, .. } => Ok(attempts),
            Self::Failed {
                reason,
                attempts,
                elapsed,
                cause,
            } => Err(ConvergenceError {
                description: description.to_string(),
                cause,
                attempts,
                elapsed,
                reason,
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_converged_accessors() {
        let outcome = Outcome::Converged {
            attempts: 3,
            elapsed: Duration::from_millis(5),
        };

        assert!(outcome.is_converged());
        assert_eq!(outcome.attempts(), 3);
        assert!(outcome.reason().is_none());
        assert_eq!(outcome.into_result("route"), Ok(3));
    }

    #[test]
    fn test_failed_into_result() {
        let outcome = Outcome::Failed {
            reason: "got invalid response code 404: no route".to_string(),
            attempts: 2,
            elapsed: Duration::from_millis(20),
            cause: FailureCause::BudgetExhausted,
        };

        assert!(outcome.is_failed());
        assert_eq!(outcome.cause(), Some(FailureCause::BudgetExhausted));
        let err = outcome.into_result("ingress route").unwrap_err();
        assert_eq!(err.attempts, 2);
        assert!(err.to_string().contains("404"));
    }

    #[test]
    fn test_outcome_serialization_tag() {
        let outcome = Outcome::Failed {
            reason: "timeout".to_string(),
            attempts: 1,
            elapsed: Duration::ZERO,
            cause: FailureCause::DeadlineExceeded,
        };
        let json = serde_json::to_value(&outcome).unwrap();

        assert_eq!(json["status"], serde_json::json!("failed"));
        assert_eq!(json["cause"], serde_json::json!("deadline_exceeded"));
    }
}
