//! Test utilities.
//!
//! This module provides:
//! - Counting and failing stages
//! - A scripted probe with a fixed success/failure sequence
//! - Outcome and setup-failure assertions
//! - Fast policies and a prebuilt control-plane suite

mod assertions;
mod fixtures;
mod mocks;

pub use assertions::{assert_converged, assert_failed, assert_setup_failed_at};
pub use fixtures::{fast_policy, pilot_suite};
pub use mocks::{CountingStage, FailingStage, ScriptedProbe};
