//! # Convergeflow
//!
//! Harness primitives for integration suites that drive a control plane and
//! wait for configuration to become observable on the data plane.
//!
//! Convergeflow provides:
//!
//! - **Ordered setup**: run a fixed sequence of setup stages once per suite,
//!   short-circuiting on the first failure
//! - **Immutable environments**: handles produced during setup are frozen
//!   into an [`Environment`](environment::Environment) shared by every test
//! - **Convergence polling**: retry a probe under a bounded policy until the
//!   change is live, then report a single [`Outcome`](poller::Outcome)
//! - **Collaborator seams**: traits for config stores, data-plane endpoints,
//!   component factories and namespace provisioning, with in-memory
//!   simulations for tests
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use convergeflow::prelude::*;
//!
//! let env = SetupOrchestrator::new("pilot_test")
//!     .stage(ComponentStage::new("galley", factory.clone(), ComponentConfig::new("galley", "galley")))
//!     .stage(ComponentStage::new("pilot", factory, ComponentConfig::new("pilot", "pilot")).depends_on("galley"))
//!     .run()
//!     .await?;
//!
//! store.apply(&scope, document).await?;
//! let probe = EndpointProbe::new(endpoint, CallOptions::plain_text("my.domain.example", "/get", address));
//! poll_until_converged(&probe, &RetryPolicy::default()).await.into_result("gateway route")?;
//! ```

#![forbid(unsafe_code)]
#![warn(
    clippy::all,
    clippy::pedantic,
    missing_docs,
    rust_2018_idioms
)]
#![allow(
    clippy::module_name_repetitions,
    clippy::must_use_candidate,
    clippy::missing_errors_doc,
    clippy::missing_panics_doc
)]

pub mod check;
pub mod collaborators;
pub mod config;
pub mod environment;
pub mod errors;
pub mod events;
pub mod observability;
pub mod orchestrator;
pub mod poller;
pub mod simulation;
pub mod stages;
pub mod testing;

#[cfg(test)]
mod scenarios;

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::check::{ConvergenceCheck, EndpointProbe, Expectation};
    pub use crate::collaborators::{
        CallOptions, CallType, ComponentConfig, ComponentFactory, ConfigStore, Endpoint,
        Handle, NamespaceConfig, NamespaceProvisioner, Response, Scope,
    };
    pub use crate::config::HarnessConfig;
    pub use crate::environment::{Environment, EnvironmentBuilder, EnvironmentKind};
    pub use crate::errors::{
        CollaboratorError, ConvergenceError, FailureKind, HandleError, HarnessError,
        PolicyError, ProbeFailure, SetupFailure, Skipped, StageError,
    };
    pub use crate::events::{CollectingEventSink, EventSink, LoggingEventSink, NoOpEventSink};
    pub use crate::orchestrator::SetupOrchestrator;
    pub use crate::poller::{
        ensure_converged, poll_until_converged, ConvergencePoller, DelayStrategy, FailureCause, FatalMode,
        FnProbe, JitterStrategy, Outcome, Probe, RetryPolicy,
    };
    pub use crate::stages::{
        AppliedConfig, ApplyStage, ComponentStage, FnStage, Stage, StageRecord, StageStatus,
    };
}
