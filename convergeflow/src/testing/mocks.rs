//! Mock stages and probes for testing.

use async_trait::async_trait;
use parking_lot::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use crate::environment::EnvironmentBuilder;
use crate::errors::{FailureKind, ProbeFailure, StageError};
use crate::poller::Probe;
use crate::stages::Stage;

/// A stage that counts invocations and optionally publishes a value.
#[derive(Debug)]
pub struct CountingStage {
    name: String,
    calls: Arc<AtomicUsize>,
    publish: Option<String>,
}

impl CountingStage {
    /// Creates a counting stage.
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            calls: Arc::new(AtomicUsize::new(0)),
            publish: None,
        }
    }

    /// Publishes the stage name as a `String` handle under `key` when run.
    #[must_use]
    pub fn publishing(mut self, key: impl Into<String>) -> Self {
        self.publish = Some(key.into());
        self
    }

    /// Returns a shared counter that outlives the stage.
    #[must_use]
    pub fn counter(&self) -> Arc<AtomicUsize> {
        self.calls.clone()
    }

    /// Returns the number of invocations.
    #[must_use]
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Stage for CountingStage {
    fn name(&self) -> &str {
        &self.name
    }

    async fn run(&self, env: &mut EnvironmentBuilder) -> Result<(), StageError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if let Some(key) = &self.publish {
            env.publish(key.clone(), self.name.clone())?;
        }
        Ok(())
    }
}

/// A stage that always fails.
#[derive(Debug)]
pub struct FailingStage {
    name: String,
    error: String,
    calls: Arc<AtomicUsize>,
}

impl FailingStage {
    /// Creates a failing stage.
    #[must_use]
    pub fn new(name: impl Into<String>, error: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            error: error.into(),
            calls: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// Returns a shared counter that outlives the stage.
    #[must_use]
    pub fn counter(&self) -> Arc<AtomicUsize> {
        self.calls.clone()
    }
}

#[async_trait]
impl Stage for FailingStage {
    fn name(&self) -> &str {
        &self.name
    }

    async fn run(&self, _env: &mut EnvironmentBuilder) -> Result<(), StageError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Err(StageError::msg(&self.error))
    }
}

/// A probe that replays a script of successes and failures.
///
/// Once the script is exhausted the last entry repeats.
#[derive(Debug)]
pub struct ScriptedProbe {
    script: Vec<bool>,
    message: String,
    kind: FailureKind,
    calls: Mutex<usize>,
}

impl ScriptedProbe {
    /// Fails `n` times, then succeeds forever.
    #[must_use]
    pub fn failing_times(n: u32, message: impl Into<String>) -> Self {
        let mut script = vec![false; n as usize];
        script.push(true);
        Self::with_script(script, message)
    }

    /// Never succeeds.
    #[must_use]
    pub fn always_failing(message: impl Into<String>) -> Self {
        Self::with_script(vec![false], message)
    }

    /// Replays `script` (true = success).
    #[must_use]
    pub fn from_script(script: Vec<bool>) -> Self {
        Self::with_script(script, "scripted failure")
    }

    fn with_script(script: Vec<bool>, message: impl Into<String>) -> Self {
        Self {
            script,
            message: message.into(),
            kind: FailureKind::Transient,
            calls: Mutex::new(0),
        }
    }

    /// Marks failures as fatal.
    #[must_use]
    pub fn fatal(mut self) -> Self {
        self.kind = FailureKind::Fatal;
        self
    }

    /// Returns the number of observations made.
    #[must_use]
    pub fn calls(&self) -> usize {
        *self.calls.lock()
    }
}

#[async_trait]
impl Probe for ScriptedProbe {
    async fn observe(&self) -> Result<(), ProbeFailure> {
        let call = {
            let mut calls = self.calls.lock();
            *calls += 1;
            *calls
        };
        let step = self
            .script
            .get(call - 1)
            .or_else(|| self.script.last())
            .copied()
            .unwrap_or(false);

        if step {
            Ok(())
        } else {
            Err(ProbeFailure {
                kind: self.kind,
                message: format!("{} (attempt {call})", self.message),
            })
        }
    }

    fn describe(&self) -> String {
        "scripted".to_string()
    }
}
