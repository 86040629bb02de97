//! Ordered suite setup.
//!
//! This module provides:
//! - The [`SetupOrchestrator`] builder and runner
//! - Environment gating for stages that only apply to one environment kind

mod runner;

mod integration_tests;

pub use runner::SetupOrchestrator;
