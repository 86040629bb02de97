//! Error types for the convergeflow harness.
//!
//! Setup failures abort a whole suite, probe failures feed the convergence
//! poller, and convergence errors fail a single test.

use crate::environment::EnvironmentKind;
use crate::poller::FailureCause;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::time::Duration;
use thiserror::Error;

/// The main error type for harness operations.
#[derive(Debug, Error)]
pub enum HarnessError {
    /// Orchestrated setup failed.
    #[error("{0}")]
    Setup(#[from] SetupFailure),

    /// A configuration change never became observable.
    #[error("{0}")]
    Convergence(#[from] ConvergenceError),

    /// A retry policy was rejected.
    #[error("{0}")]
    Policy(#[from] PolicyError),

    /// An external collaborator returned an error.
    #[error("{0}")]
    Collaborator(#[from] CollaboratorError),

    /// The config store refused a document before any polling started.
    #[error("Configuration rejected for scope '{scope}': {source}")]
    Apply {
        /// Scope the document was submitted to.
        scope: String,
        /// Store error.
        #[source]
        source: CollaboratorError,
    },

    /// An environment handle lookup failed.
    #[error("{0}")]
    Handle(#[from] HandleError),

    /// Harness configuration could not be loaded.
    #[error("Configuration error: {0}")]
    Config(String),

    /// IO error.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Error raised when orchestrated setup cannot complete.
///
/// Any partially built environment is discarded along with this error.
#[derive(Debug, Error)]
pub enum SetupFailure {
    /// A stage returned an error.
    #[error("Setup stage '{stage}' (#{index}) failed: {source}")]
    Stage {
        /// Name of the failing stage.
        stage: String,
        /// 1-based position of the stage in declaration order.
        index: usize,
        /// Underlying cause.
        #[source]
        source: StageError,
    },

    /// The suite requires an environment other than the active one.
    #[error("Suite '{suite}' requires environment '{required}' but '{active}' is active")]
    EnvironmentMismatch {
        /// Suite name.
        suite: String,
        /// Required environment kind.
        required: EnvironmentKind,
        /// Active environment kind.
        active: EnvironmentKind,
    },
}

impl SetupFailure {
    /// Returns the name of the failing stage, if a stage failed.
    #[must_use]
    pub fn stage_name(&self) -> Option<&str> {
        match self {
            Self::Stage { stage, .. } => Some(stage),
            Self::EnvironmentMismatch { .. } => None,
        }
    }

    /// Returns the 1-based index of the failing stage, if a stage failed.
    #[must_use]
    pub fn stage_index(&self) -> Option<usize> {
        match self {
            Self::Stage { index, .. } => Some(*index),
            Self::EnvironmentMismatch { .. } => None,
        }
    }

    /// Converts to a dictionary representation.
    #[must_use]
    pub fn to_dict(&self) -> HashMap<String, serde_json::Value> {
        let mut map = HashMap::new();
        map.insert("message".to_string(), serde_json::Value::String(self.to_string()));
        match self {
            Self::Stage { stage, index, .. } => {
                map.insert("stage".to_string(), serde_json::Value::String(stage.clone()));
                map.insert("index".to_string(), serde_json::Value::from(*index));
            }
            Self::EnvironmentMismatch { required, active, .. } => {
                map.insert("required".to_string(), serde_json::Value::String(required.to_string()));
                map.insert("active".to_string(), serde_json::Value::String(active.to_string()));
            }
        }
        map
    }
}

/// A single test declined to run in the active environment.
///
/// Unlike [`SetupFailure::EnvironmentMismatch`], which fails the whole suite,
/// this is a skip: the test returns early and is not counted as failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("Test requires the '{required}' environment, active is '{active}'; skipping")]
pub struct Skipped {
    /// Required environment kind.
    pub required: EnvironmentKind,
    /// Active environment kind.
    pub active: EnvironmentKind,
}

/// Error returned from a stage body.
#[derive(Debug, Error)]
pub enum StageError {
    /// A collaborator call inside the stage failed.
    #[error(transparent)]
    Collaborator(#[from] CollaboratorError),

    /// The stage could not read or publish a handle.
    #[error(transparent)]
    Handle(#[from] HandleError),

    /// Any other stage error.
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl StageError {
    /// Creates a stage error from a message.
    pub fn msg(message: impl std::fmt::Display) -> Self {
        Self::Other(anyhow::Error::msg(message.to_string()))
    }
}

/// Errors accessing environment handles.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum HandleError {
    /// A handle with this key was already published.
    #[error("Handle conflict: key '{key}' already exists")]
    Conflict {
        /// The conflicting key.
        key: String,
    },

    /// No handle was published under this key.
    #[error("Handle not found: '{key}'")]
    Missing {
        /// The missing key.
        key: String,
    },

    /// The handle exists but has a different type.
    #[error("Handle '{key}' is not a {expected}")]
    TypeMismatch {
        /// The key that was looked up.
        key: String,
        /// Requested type name.
        expected: &'static str,
    },
}

/// Classification of a failed probe attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FailureKind {
    /// Not converged yet; retry.
    #[default]
    Transient,
    /// Unrecoverable; retrying cannot help.
    Fatal,
}

impl std::fmt::Display for FailureKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Transient => write!(f, "transient"),
            Self::Fatal => write!(f, "fatal"),
        }
    }
}

/// Failure reported by a single probe attempt.
#[derive(Debug, Clone, PartialEq, Eq, Error, Serialize, Deserialize)]
#[error("{message}")]
pub struct ProbeFailure {
    /// Failure classification.
    pub kind: FailureKind,
    /// Human readable detail, kept for the final outcome.
    pub message: String,
}

impl ProbeFailure {
    /// Creates a transient failure.
    #[must_use]
    pub fn transient(message: impl Into<String>) -> Self {
        Self {
            kind: FailureKind::Transient,
            message: message.into(),
        }
    }

    /// Creates a fatal failure.
    #[must_use]
    pub fn fatal(message: impl Into<String>) -> Self {
        Self {
            kind: FailureKind::Fatal,
            message: message.into(),
        }
    }

    /// Returns true if the failure is fatal.
    #[must_use]
    pub fn is_fatal(&self) -> bool {
        self.kind == FailureKind::Fatal
    }
}

impl From<CollaboratorError> for ProbeFailure {
    fn from(err: CollaboratorError) -> Self {
        match err {
            CollaboratorError::Rejected(_) => Self::fatal(err.to_string()),
            _ => Self::transient(err.to_string()),
        }
    }
}

/// Error raised when a retry policy cannot bound a polling loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum PolicyError {
    /// Neither a deadline nor an attempt budget was set.
    #[error("Retry policy has neither a deadline nor an attempt budget")]
    Unbounded,

    /// The attempt budget is zero.
    #[error("Retry policy attempt budget must be at least 1")]
    ZeroAttempts,

    /// The deadline is zero.
    #[error("Retry policy deadline must be greater than zero")]
    ZeroDeadline,

    /// Zero consecutive successes were requested.
    #[error("Retry policy must require at least one successful observation")]
    ZeroConvergeThreshold,
}

/// A failed polling outcome converted into an error.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{description} did not converge ({cause}) after {attempts} attempt(s) in {elapsed:?}: {reason}")]
pub struct ConvergenceError {
    /// What was being waited for.
    pub description: String,
    /// Why polling stopped.
    pub cause: FailureCause,
    /// Probe invocations made.
    pub attempts: u32,
    /// Wall-clock time spent polling.
    pub elapsed: Duration,
    /// Last observed probe failure.
    pub reason: String,
}

/// Errors returned by external collaborators.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CollaboratorError {
    /// A data-plane call did not produce a response.
    #[error("Transport error calling {address}: {message}")]
    Transport {
        /// Address that was called.
        address: String,
        /// Transport detail.
        message: String,
    },

    /// A configuration document was rejected outright.
    #[error("Configuration rejected: {0}")]
    Rejected(String),

    /// A component could not be created.
    #[error("Component '{component}' failed: {message}")]
    Component {
        /// Component name.
        component: String,
        /// Failure detail.
        message: String,
    },

    /// A namespace could not be provisioned.
    #[error("Namespace error: {0}")]
    Namespace(String),
}
