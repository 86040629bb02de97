//! Convergence polling.
//!
//! This module provides:
//! - Retry policies (deadline, attempt budget, delay and jitter)
//! - The [`Probe`] trait and a closure adapter
//! - The polling loop and its aggregate [`Outcome`]

mod engine;
mod outcome;
mod policy;
mod probe;

pub use engine::{ensure_converged, poll_until_converged, ConvergencePoller, FatalClassifier};
pub use outcome::{FailureCause, Outcome};
pub use policy::{DelayStrategy, FatalMode, JitterStrategy, RetryPolicy};
pub use probe::{FnProbe, Probe};
