//! Setup stages.
//!
//! A stage is one ordered unit of environment setup. It reads handles
//! published by earlier stages and publishes its own.

mod record;

pub use record::{StageRecord, StageStatus};

use crate::collaborators::{ComponentConfig, ComponentFactory, ConfigStore, Scope};
use crate::environment::EnvironmentBuilder;
use crate::errors::StageError;
use async_trait::async_trait;
use std::fmt::Debug;
use std::sync::Arc;
use tracing::debug;

/// Trait for setup stages.
#[async_trait]
pub trait Stage: Send + Sync + Debug {
    /// Returns the name of the stage.
    fn name(&self) -> &str;

    /// Runs the stage against the environment under construction.
    ///
    /// Retries, if any, are the stage's own responsibility.
    async fn run(&self, env: &mut EnvironmentBuilder) -> Result<(), StageError>;
}

/// A synchronous function-based stage.
pub struct FnStage<F>
where
    F: Fn(&mut EnvironmentBuilder) -> Result<(), StageError> + Send + Sync,
{
    name: String,
    func: F,
}

impl<F> FnStage<F>
where
    F: Fn(&mut EnvironmentBuilder) -> Result<(), StageError> + Send + Sync,
{
    /// Creates a new function-based stage.
    pub fn new(name: impl Into<String>, func: F) -> Self {
        Self {
            name: name.into(),
            func,
        }
    }
}

impl<F> Debug for FnStage<F>
where
    F: Fn(&mut EnvironmentBuilder) -> Result<(), StageError> + Send + Sync,
{
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FnStage").field("name", &self.name).finish()
    }
}

#[async_trait]
impl<F> Stage for FnStage<F>
where
    F: Fn(&mut EnvironmentBuilder) -> Result<(), StageError> + Send + Sync,
{
    fn name(&self) -> &str {
        &self.name
    }

    async fn run(&self, env: &mut EnvironmentBuilder) -> Result<(), StageError> {
        (self.func)(env)
    }
}

/// Provisions one component through a [`ComponentFactory`] and publishes
/// its handle under the stage name.
///
/// Handles named with [`depends_on`](Self::depends_on) must have been
/// published by earlier stages; they are passed to the factory in the
/// component config.
pub struct ComponentStage {
    name: String,
    factory: Arc<dyn ComponentFactory>,
    config: ComponentConfig,
    depends_on: Vec<String>,
}

impl ComponentStage {
    /// Creates a component stage.
    pub fn new(name: impl Into<String>, factory: Arc<dyn ComponentFactory>, config: ComponentConfig) -> Self {
        Self {
            name: name.into(),
            factory,
            config,
            depends_on: Vec::new(),
        }
    }

    /// Declares a dependency on a handle published by an earlier stage.
    #[must_use]
    pub fn depends_on(mut self, key: impl Into<String>) -> Self {
        self.depends_on.push(key.into());
        self
    }
}

impl Debug for ComponentStage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ComponentStage")
            .field("name", &self.name)
            .field("kind", &self.config.kind)
            .field("depends_on", &self.depends_on)
            .finish()
    }
}

#[async_trait]
impl Stage for ComponentStage {
    fn name(&self) -> &str {
        &self.name
    }

    async fn run(&self, env: &mut EnvironmentBuilder) -> Result<(), StageError> {
        let mut config = self.config.clone();
        for key in &self.depends_on {
            config.dependencies.push((key.clone(), env.get_handle(key)?));
        }

        debug!(stage = %self.name, kind = %config.kind, deps = ?self.depends_on, "Creating component");
        let handle = self.factory.create(&config).await?;
        env.publish_handle(self.name.clone(), handle)?;
        Ok(())
    }
}

/// Configuration applied during setup, published by [`ApplyStage`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AppliedConfig {
    /// Scope the documents were applied to.
    pub scope: Scope,
    /// Number of documents applied.
    pub documents: usize,
}

/// Applies baseline configuration documents through a [`ConfigStore`] and
/// publishes an [`AppliedConfig`] under the stage name.
///
/// Documents are applied in order; the first rejection fails the stage.
pub struct ApplyStage {
    name: String,
    store: Arc<dyn ConfigStore>,
    scope: Scope,
    documents: Vec<String>,
}

impl ApplyStage {
    /// Creates a stage applying `documents` to the cluster-wide scope.
    pub fn new(name: impl Into<String>, store: Arc<dyn ConfigStore>, documents: Vec<String>) -> Self {
        Self {
            name: name.into(),
            store,
            scope: Scope::cluster(),
            documents,
        }
    }

    /// Applies to `scope` instead of the cluster-wide scope.
    #[must_use]
    pub fn in_scope(mut self, scope: Scope) -> Self {
        self.scope = scope;
        self
    }
}

impl Debug for ApplyStage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ApplyStage")
            .field("name", &self.name)
            .field("scope", &self.scope)
            .field("documents", &self.documents.len())
            .finish()
    }
}

#[async_trait]
impl Stage for ApplyStage {
    fn name(&self) -> &str {
        &self.name
    }

    async fn run(&self, env: &mut EnvironmentBuilder) -> Result<(), StageError> {
        for document in &self.documents {
            self.store.apply(&self.scope, document).await?;
        }
        debug!(stage = %self.name, scope = %self.scope, documents = self.documents.len(), "Applied baseline configuration");
        env.publish(
            self.name.clone(),
            AppliedConfig {
                scope: self.scope.clone(),
                documents: self.documents.len(),
            },
        )?;
        Ok(())
    }
}
