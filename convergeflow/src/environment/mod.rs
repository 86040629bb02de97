//! Suite environments.
//!
//! An [`EnvironmentBuilder`] is owned by the orchestrator while stages run.
//! Once every stage has committed it is frozen into an [`Environment`], which
//! tests share by reference and which is never mutated again.

mod handles;

pub use handles::HandleBag;

use crate::collaborators::Handle;
use crate::errors::{HandleError, Skipped};
use crate::stages::StageRecord;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::any::Any;
use std::str::FromStr;
use std::sync::Arc;
use tracing::info;
use uuid::Uuid;

/// The kind of environment a suite runs against.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EnvironmentKind {
    /// Components run as local processes.
    #[default]
    Native,
    /// Components run on a Kubernetes cluster.
    Kube,
}

impl std::fmt::Display for EnvironmentKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Native => write!(f, "native"),
            Self::Kube => write!(f, "kube"),
        }
    }
}

impl FromStr for EnvironmentKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "native" => Ok(Self::Native),
            "kube" | "kubernetes" => Ok(Self::Kube),
            other => Err(format!("unknown environment kind '{other}'")),
        }
    }
}

/// Mutable environment state, visible only to stages during setup.
#[derive(Debug)]
pub struct EnvironmentBuilder {
    run_id: Uuid,
    suite: String,
    kind: EnvironmentKind,
    labels: Vec<String>,
    created_at: DateTime<Utc>,
    handles: HandleBag,
    records: Vec<StageRecord>,
}

impl EnvironmentBuilder {
    /// Creates a builder for a suite.
    #[must_use]
    pub fn new(suite: impl Into<String>, kind: EnvironmentKind) -> Self {
        Self {
            run_id: Uuid::new_v4(),
            suite: suite.into(),
            kind,
            labels: Vec::new(),
            created_at: Utc::now(),
            handles: HandleBag::new(),
            records: Vec::new(),
        }
    }

    /// Sets the suite labels.
    #[must_use]
    pub fn with_labels(mut self, labels: Vec<String>) -> Self {
        self.labels = labels;
        self
    }

    /// Returns the run id.
    #[must_use]
    pub fn run_id(&self) -> Uuid {
        self.run_id
    }

    /// Returns the suite name.
    #[must_use]
    pub fn suite(&self) -> &str {
        &self.suite
    }

    /// Returns the active environment kind.
    #[must_use]
    pub fn kind(&self) -> EnvironmentKind {
        self.kind
    }

    /// Publishes a value for later stages and tests.
    pub fn publish<T: Any + Send + Sync>(
        &mut self,
        key: impl Into<String>,
        value: T,
    ) -> Result<(), HandleError> {
        self.handles.insert(key, Arc::new(value))
    }

    /// Publishes an already type-erased handle.
    pub fn publish_handle(&mut self, key: impl Into<String>, handle: Handle) -> Result<(), HandleError> {
        self.handles.insert(key, handle)
    }

    /// Reads a handle published by an earlier stage.
    pub fn get<T: Any + Send + Sync>(&self, key: &str) -> Result<Arc<T>, HandleError> {
        self.handles.get(key)
    }

    /// Reads a raw handle published by an earlier stage.
    pub fn get_handle(&self, key: &str) -> Result<Handle, HandleError> {
        self.handles.get_raw(key).ok_or_else(|| HandleError::Missing {
            key: key.to_string(),
        })
    }

    /// Checks if a handle was published.
    #[must_use]
    pub fn contains(&self, key: &str) -> bool {
        self.handles.contains_key(key)
    }

    pub(crate) fn record(&mut self, record: StageRecord) {
        self.records.push(record);
    }

    /// Freezes the builder into an immutable environment.
    #[must_use]
    pub fn freeze(self) -> Environment {
        Environment {
            inner: Arc::new(EnvironmentInner {
                run_id: self.run_id,
                suite: self.suite,
                kind: self.kind,
                labels: self.labels,
                created_at: self.created_at,
                handles: self.handles,
                records: self.records,
            }),
        }
    }
}

#[derive(Debug)]
struct EnvironmentInner {
    run_id: Uuid,
    suite: String,
    kind: EnvironmentKind,
    labels: Vec<String>,
    created_at: DateTime<Utc>,
    handles: HandleBag,
    records: Vec<StageRecord>,
}

/// The immutable result of a successful setup run.
///
/// Cloning is cheap; every clone sees the same handles.
#[derive(Debug, Clone)]
pub struct Environment {
    inner: Arc<EnvironmentInner>,
}

impl Environment {
    /// Returns the run id.
    #[must_use]
    pub fn run_id(&self) -> Uuid {
        self.inner.run_id
    }

    /// Returns the suite name.
    #[must_use]
    pub fn suite(&self) -> &str {
        &self.inner.suite
    }

    /// Returns the environment kind setup ran against.
    #[must_use]
    pub fn kind(&self) -> EnvironmentKind {
        self.inner.kind
    }

    /// Returns the suite labels.
    #[must_use]
    pub fn labels(&self) -> &[String] {
        &self.inner.labels
    }

    /// Returns true if the suite carries the label.
    #[must_use]
    pub fn has_label(&self, label: &str) -> bool {
        self.inner.labels.iter().any(|l| l == label)
    }

    /// Returns when setup started.
    #[must_use]
    pub fn created_at(&self) -> DateTime<Utc> {
        self.inner.created_at
    }

    /// Test-level environment gate.
    ///
    /// Returns `Err(Skipped)` when the environment is not `kind`; the caller
    /// should return without failing. Suite-level requirements belong on
    /// [`SetupOrchestrator::require_environment`](crate::orchestrator::SetupOrchestrator::require_environment),
    /// which fails setup instead.
    pub fn require(&self, kind: EnvironmentKind) -> Result<(), Skipped> {
        if self.inner.kind == kind {
            return Ok(());
        }
        let skipped = Skipped {
            required: kind,
            active: self.inner.kind,
        };
        info!(suite = %self.inner.suite, reason = %skipped, "Skipping test");
        Err(skipped)
    }

    /// Reads a handle.
    pub fn get<T: Any + Send + Sync>(&self, key: &str) -> Result<Arc<T>, HandleError> {
        self.inner.handles.get(key)
    }

    /// Checks if a handle exists.
    #[must_use]
    pub fn contains(&self, key: &str) -> bool {
        self.inner.handles.contains_key(key)
    }

    /// Returns handle keys in publication order.
    #[must_use]
    pub fn handle_keys(&self) -> &[String] {
        self.inner.handles.keys()
    }

    /// Returns the per-stage records of the setup run.
    #[must_use]
    pub fn stage_records(&self) -> &[StageRecord] {
        &self.inner.records
    }
}
