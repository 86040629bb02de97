//! Test assertions for polling outcomes and setup failures.

use crate::errors::SetupFailure;
use crate::poller::{FailureCause, Outcome};

/// Asserts that the outcome converged after exactly `attempts` attempts.
pub fn assert_converged(outcome: &Outcome, attempts: u32) {
    match outcome {
        Outcome::Converged { attempts: actual, .. } => assert_eq!(
            *actual, attempts,
            "Expected convergence after {attempts} attempt(s), took {actual}"
        ),
        Outcome::Failed { reason, cause, .. } => {
            panic!("Expected convergence, got failure ({cause}): {reason}")
        }
    }
}

/// Asserts that the outcome failed with `cause` and a reason containing `needle`.
pub fn assert_failed(outcome: &Outcome, cause: FailureCause, needle: &str) {
    match outcome {
        Outcome::Failed {
            reason,
            cause: actual,
            ..
        } => {
            assert_eq!(*actual, cause, "Expected failure cause {cause}, got {actual}");
            assert!(
                reason.contains(needle),
                "Expected failure reason to contain '{needle}', got '{reason}'"
            );
        }
        Outcome::Converged { attempts, .. } => {
            panic!("Expected failure ({cause}), converged after {attempts} attempt(s)")
        }
    }
}

/// Asserts that setup failed at the stage with the given 1-based index.
pub fn assert_setup_failed_at(failure: &SetupFailure, stage: &str, index: usize) {
    assert_eq!(
        failure.stage_name(),
        Some(stage),
        "Expected setup to fail at '{stage}': {failure}"
    );
    assert_eq!(
        failure.stage_index(),
        Some(index),
        "Expected setup to fail at #{index}: {failure}"
    );
}
