//! Sequential setup runner.

use crate::config::HarnessConfig;
use crate::environment::{Environment, EnvironmentBuilder, EnvironmentKind};
use crate::errors::SetupFailure;
use crate::events::{self, EventSink};
use crate::stages::{Stage, StageRecord};
use chrono::Utc;
use serde_json::json;
use std::sync::Arc;
use std::time::Instant;
use tracing::{error, info, info_span, Instrument};

#[derive(Debug)]
struct RegisteredStage {
    stage: Arc<dyn Stage>,
    only_on: Option<EnvironmentKind>,
}

/// Runs setup stages strictly in declaration order.
///
/// The first failing stage aborts the run; no later stage is invoked and the
/// partially built environment is dropped.
pub struct SetupOrchestrator {
    suite: String,
    active: EnvironmentKind,
    required: Option<EnvironmentKind>,
    labels: Vec<String>,
    stages: Vec<RegisteredStage>,
    sink: Arc<dyn EventSink>,
}

impl SetupOrchestrator {
    /// Creates an orchestrator for a suite.
    #[must_use]
    pub fn new(suite: impl Into<String>) -> Self {
        Self {
            suite: suite.into(),
            active: EnvironmentKind::default(),
            required: None,
            labels: Vec::new(),
            stages: Vec::new(),
            sink: events::default_sink(),
        }
    }

    /// Creates an orchestrator from an ordered list of stages.
    #[must_use]
    pub fn from_stages(suite: impl Into<String>, stages: Vec<Arc<dyn Stage>>) -> Self {
        let mut orchestrator = Self::new(suite);
        orchestrator.stages = stages
            .into_iter()
            .map(|stage| RegisteredStage { stage, only_on: None })
            .collect();
        orchestrator
    }

    /// Sets the active environment kind.
    #[must_use]
    pub fn with_environment(mut self, kind: EnvironmentKind) -> Self {
        self.active = kind;
        self
    }

    /// Takes the active environment kind from a loaded configuration.
    #[must_use]
    pub fn with_config(self, config: &HarnessConfig) -> Self {
        self.with_environment(config.environment)
    }

    /// Requires the suite to run in the given environment kind.
    #[must_use]
    pub fn require_environment(mut self, kind: EnvironmentKind) -> Self {
        self.required = Some(kind);
        self
    }

    /// Adds a suite label.
    #[must_use]
    pub fn label(mut self, label: impl Into<String>) -> Self {
        self.labels.push(label.into());
        self
    }

    /// Sets the event sink.
    #[must_use]
    pub fn with_event_sink(mut self, sink: Arc<dyn EventSink>) -> Self {
        self.sink = sink;
        self
    }

    /// Appends a stage.
    #[must_use]
    pub fn stage(self, stage: impl Stage + 'static) -> Self {
        self.stage_arc(Arc::new(stage), None)
    }

    /// Appends a stage that only runs when `kind` is the active environment.
    #[must_use]
    pub fn stage_on(self, kind: EnvironmentKind, stage: impl Stage + 'static) -> Self {
        self.stage_arc(Arc::new(stage), Some(kind))
    }

    /// Appends a shared stage.
    #[must_use]
    pub fn stage_arc(mut self, stage: Arc<dyn Stage>, only_on: Option<EnvironmentKind>) -> Self {
        self.stages.push(RegisteredStage { stage, only_on });
        self
    }

    /// Returns the suite name.
    #[must_use]
    pub fn suite(&self) -> &str {
        &self.suite
    }

    /// Returns the number of registered stages.
    #[must_use]
    pub fn stage_count(&self) -> usize {
        self.stages.len()
    }

    /// Runs every stage in order and freezes the resulting environment.
    pub async fn run(self) -> Result<Environment, SetupFailure> {
        if let Some(required) = self.required {
            if required != self.active {
                let failure = SetupFailure::EnvironmentMismatch {
                    suite: self.suite.clone(),
                    required,
                    active: self.active,
                };
                error!(suite = %self.suite, error = %failure, "Suite cannot run in this environment");
                return Err(failure);
            }
        }

        let span = info_span!("setup", suite = %self.suite, environment = %self.active);
        self.run_stages().instrument(span).await
    }

    async fn run_stages(self) -> Result<Environment, SetupFailure> {
        let start = Instant::now();
        let mut env = EnvironmentBuilder::new(self.suite.clone(), self.active).with_labels(self.labels.clone());
        info!(run_id = %env.run_id(), stages = self.stages.len(), "Starting suite setup");

        for (position, registered) in self.stages.iter().enumerate() {
            let index = position + 1;
            let name = registered.stage.name().to_string();

            if let Some(kind) = registered.only_on {
                if kind != self.active {
                    info!(stage = %name, index, only_on = %kind, "Skipping stage");
                    self.sink
                        .emit(events::STAGE_SKIPPED, json!({"stage": name, "index": index}))
                        .await;
                    env.record(StageRecord::skipped(&name, index));
                    continue;
                }
            }

            self.sink
                .emit(events::STAGE_STARTED, json!({"stage": name, "index": index}))
                .await;
            let started_at = Utc::now();

            match registered.stage.run(&mut env).await {
                Ok(()) => {
                    let record = StageRecord::completed(&name, index, started_at);
                    info!(stage = %name, index, duration_ms = record.duration_ms(), "Stage completed");
                    self.sink
                        .emit(
                            events::STAGE_COMPLETED,
                            json!({"stage": name, "index": index, "duration_ms": record.duration_ms()}),
                        )
                        .await;
                    env.record(record);
                }
                Err(source) => {
                    let record = StageRecord::failed(&name, index, started_at, source.to_string());
                    error!(stage = %name, index, error = %source, "Stage failed, aborting setup");
                    self.sink
                        .emit(
                            events::STAGE_FAILED,
                            json!({"stage": name, "index": index, "error": record.error}),
                        )
                        .await;
                    return Err(SetupFailure::Stage {
                        stage: name,
                        index,
                        source,
                    });
                }
            }
        }

        info!(
            duration_ms = start.elapsed().as_millis() as u64,
            "Suite setup complete"
        );
        Ok(env.freeze())
    }
}

impl std::fmt::Debug for SetupOrchestrator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SetupOrchestrator")
            .field("suite", &self.suite)
            .field("active", &self.active)
            .field("required", &self.required)
            .field("stages", &self.stages)
            .finish()
    }
}
