//! Interfaces to the systems a suite drives.
//!
//! The harness never provisions anything itself; stages and probes reach the
//! outside world only through these traits.

#[cfg(feature = "http")]
mod http;

#[cfg(feature = "http")]
pub use http::HttpEndpoint;

use crate::errors::CollaboratorError;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::any::Any;
use std::collections::HashMap;
use std::sync::Arc;

/// An opaque, shareable handle to a provisioned component.
pub type Handle = Arc<dyn Any + Send + Sync>;

/// An isolation unit configuration is applied to (e.g. a namespace).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Scope {
    name: String,
}

impl Scope {
    /// Creates a scope.
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self { name: name.into() }
    }

    /// The cluster-wide scope, used for configuration that belongs to no
    /// namespace.
    #[must_use]
    pub fn cluster() -> Self {
        Self::new(CLUSTER_SCOPE)
    }

    /// Returns the scope name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Returns true for the cluster-wide scope.
    #[must_use]
    pub fn is_cluster(&self) -> bool {
        self.name == CLUSTER_SCOPE
    }
}

/// Name of the cluster-wide scope.
pub const CLUSTER_SCOPE: &str = "cluster";

impl std::fmt::Display for Scope {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.name)
    }
}

/// Transport used for a data-plane call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CallType {
    /// Plain HTTP.
    #[default]
    PlainText,
    /// HTTPS.
    Tls,
}

/// A single data-plane request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CallOptions {
    /// Host the request is addressed to (sent as the `Host` header).
    pub host: String,
    /// Request path.
    pub path: String,
    /// Transport.
    #[serde(default)]
    pub call_type: CallType,
    /// Address of the data-plane listener (`ip:port`).
    pub address: String,
}

impl CallOptions {
    /// Creates plain-text call options.
    #[must_use]
    pub fn plain_text(host: impl Into<String>, path: impl Into<String>, address: impl Into<String>) -> Self {
        Self {
            host: host.into(),
            path: path.into(),
            call_type: CallType::PlainText,
            address: address.into(),
        }
    }

    /// Sets the transport.
    #[must_use]
    pub fn with_call_type(mut self, call_type: CallType) -> Self {
        self.call_type = call_type;
        self
    }
}

/// A data-plane response.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Response {
    /// HTTP status code.
    pub status: u16,
    /// Response body.
    pub body: String,
}

impl Response {
    /// Creates a response.
    #[must_use]
    pub fn new(status: u16, body: impl Into<String>) -> Self {
        Self {
            status,
            body: body.into(),
        }
    }
}

/// Configuration for a component created by a [`ComponentFactory`].
#[derive(Debug, Clone)]
pub struct ComponentConfig {
    /// Component name.
    pub name: String,
    /// Component kind (e.g. "galley", "pilot", "ingress").
    pub kind: String,
    /// Free-form settings.
    pub settings: HashMap<String, serde_json::Value>,
    /// Handles of components this one depends on, keyed by name.
    pub dependencies: Vec<(String, Handle)>,
}

impl ComponentConfig {
    /// Creates a component config.
    #[must_use]
    pub fn new(name: impl Into<String>, kind: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            kind: kind.into(),
            settings: HashMap::new(),
            dependencies: Vec::new(),
        }
    }

    /// Adds a setting.
    #[must_use]
    pub fn with_setting(mut self, key: impl Into<String>, value: serde_json::Value) -> Self {
        self.settings.insert(key.into(), value);
        self
    }

    /// Returns the names of resolved dependencies.
    #[must_use]
    pub fn dependency_names(&self) -> Vec<&str> {
        self.dependencies.iter().map(|(name, _)| name.as_str()).collect()
    }
}

/// Configuration for a namespace.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NamespaceConfig {
    /// Name prefix; a unique suffix is appended.
    pub prefix: String,
    /// Whether sidecar injection is enabled.
    #[serde(default)]
    pub inject: bool,
}

impl NamespaceConfig {
    /// Creates a namespace config.
    #[must_use]
    pub fn new(prefix: impl Into<String>) -> Self {
        Self {
            prefix: prefix.into(),
            inject: false,
        }
    }

    /// Enables injection.
    #[must_use]
    pub fn injected(mut self) -> Self {
        self.inject = true;
        self
    }
}

/// Accepts declarative configuration documents.
///
/// Propagation to the data plane is asynchronous and is not complete when
/// `apply` returns.
#[async_trait]
pub trait ConfigStore: Send + Sync {
    /// Submits a document to a scope.
    async fn apply(&self, scope: &Scope, document: &str) -> Result<(), CollaboratorError>;
}

/// A live data-plane listener.
#[async_trait]
pub trait Endpoint: Send + Sync {
    /// Performs one synchronous call.
    async fn call(&self, options: &CallOptions) -> Result<Response, CollaboratorError>;
}

/// Creates named components for setup stages.
#[async_trait]
pub trait ComponentFactory: Send + Sync {
    /// Provisions a component and returns its handle.
    async fn create(&self, config: &ComponentConfig) -> Result<Handle, CollaboratorError>;
}

/// Creates isolation scopes for tests.
#[async_trait]
pub trait NamespaceProvisioner: Send + Sync {
    /// Creates a fresh scope.
    async fn create(&self, config: &NamespaceConfig) -> Result<Scope, CollaboratorError>;
}
