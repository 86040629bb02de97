//! In-memory collaborators.
//!
//! [`SimulatedControlPlane`] accepts route documents and exposes them on a
//! fake data-plane listener only after a configurable number of calls, which
//! makes propagation delay deterministic in tests.

use crate::collaborators::{
    CallOptions, ComponentConfig, ComponentFactory, ConfigStore, Endpoint, Handle,
    NamespaceConfig, NamespaceProvisioner, Response, Scope,
};
use crate::errors::CollaboratorError;
use async_trait::async_trait;
use dashmap::DashMap;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use tracing::debug;
use uuid::Uuid;

fn default_status() -> u16 {
    200
}

/// A routing rule understood by the simulated control plane.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Route {
    /// Host to match exactly.
    pub host: String,
    /// Path prefix to match.
    pub path_prefix: String,
    /// Backend service name, echoed in the response body.
    pub backend: String,
    /// Status code served once the route is live.
    #[serde(default = "default_status")]
    pub status: u16,
}

impl Route {
    /// Creates a route serving 200.
    #[must_use]
    pub fn new(host: impl Into<String>, path_prefix: impl Into<String>, backend: impl Into<String>) -> Self {
        Self {
            host: host.into(),
            path_prefix: path_prefix.into(),
            backend: backend.into(),
            status: default_status(),
        }
    }
}

/// Renders routes as a document accepted by [`SimulatedControlPlane`].
#[must_use]
pub fn route_document(routes: &[Route]) -> String {
    serde_json::to_string(routes).unwrap_or_else(|_| "[]".to_string())
}

#[derive(Debug, Clone)]
struct RouteEntry {
    route: Route,
    visible_after: u64,
}

/// A fake control plane plus the data-plane listener it programs.
#[derive(Debug)]
pub struct SimulatedControlPlane {
    address: String,
    propagation_lag: u64,
    ticks: AtomicU64,
    routes: DashMap<(String, String, String), RouteEntry>,
    revisions: DashMap<String, String>,
    namespaces: DashMap<String, bool>,
    unavailable: AtomicBool,
}

impl Default for SimulatedControlPlane {
    fn default() -> Self {
        Self::new()
    }
}

impl SimulatedControlPlane {
    /// Creates a control plane listening on `127.0.0.1:80` with no lag.
    #[must_use]
    pub fn new() -> Self {
        Self {
            address: "127.0.0.1:80".to_string(),
            propagation_lag: 0,
            ticks: AtomicU64::new(0),
            routes: DashMap::new(),
            revisions: DashMap::new(),
            namespaces: DashMap::new(),
            unavailable: AtomicBool::new(false),
        }
    }

    /// Sets the listener address.
    #[must_use]
    pub fn with_address(mut self, address: impl Into<String>) -> Self {
        self.address = address.into();
        self
    }

    /// Number of data-plane calls that miss a newly applied route.
    #[must_use]
    pub fn with_propagation_lag(mut self, calls: u64) -> Self {
        self.propagation_lag = calls;
        self
    }

    /// Returns the data-plane listener address.
    #[must_use]
    pub fn address(&self) -> &str {
        &self.address
    }

    /// Makes every call return 503 while set.
    pub fn set_unavailable(&self, unavailable: bool) {
        self.unavailable.store(unavailable, Ordering::SeqCst);
    }

    /// Returns the revision of the last document applied to `scope`.
    #[must_use]
    pub fn revision(&self, scope: &Scope) -> Option<String> {
        self.revisions.get(scope.name()).map(|r| r.value().clone())
    }

    /// Returns true if the namespace was provisioned with injection.
    #[must_use]
    pub fn is_injected(&self, scope: &Scope) -> Option<bool> {
        self.namespaces.get(scope.name()).map(|n| *n.value())
    }

    /// Returns the number of data-plane calls served.
    #[must_use]
    pub fn calls(&self) -> u64 {
        self.ticks.load(Ordering::SeqCst)
    }

    fn lookup(&self, tick: u64, host: &str, path: &str) -> Option<Route> {
        self.routes
            .iter()
            .filter(|entry| entry.visible_after < tick)
            .filter(|entry| entry.route.host == host && path.starts_with(&entry.route.path_prefix))
            .max_by_key(|entry| entry.route.path_prefix.len())
            .map(|entry| entry.route.clone())
    }
}

#[async_trait]
impl ConfigStore for SimulatedControlPlane {
    async fn apply(&self, scope: &Scope, document: &str) -> Result<(), CollaboratorError> {
        if !scope.is_cluster() && !self.namespaces.contains_key(scope.name()) {
            return Err(CollaboratorError::Namespace(format!(
                "scope '{scope}' does not exist"
            )));
        }
        let routes: Vec<Route> = serde_json::from_str(document)
            .map_err(|e| CollaboratorError::Rejected(format!("invalid route document: {e}")))?;

        let visible_after = self.ticks.load(Ordering::SeqCst) + self.propagation_lag;
        for route in routes {
            let key = (
                scope.name().to_string(),
                route.host.clone(),
                route.path_prefix.clone(),
            );
            self.routes.insert(key, RouteEntry { route, visible_after });
        }

        let revision = hex::encode(Sha256::digest(document.as_bytes()));
        debug!(scope = %scope, revision = %revision, "Applied route document");
        self.revisions.insert(scope.name().to_string(), revision);
        Ok(())
    }
}

#[async_trait]
impl Endpoint for SimulatedControlPlane {
    async fn call(&self, options: &CallOptions) -> Result<Response, CollaboratorError> {
        if options.address != self.address {
            return Err(CollaboratorError::Transport {
                address: options.address.clone(),
                message: "connection refused".to_string(),
            });
        }

        let tick = self.ticks.fetch_add(1, Ordering::SeqCst) + 1;
        if self.unavailable.load(Ordering::SeqCst) {
            return Ok(Response::new(503, "upstream unavailable"));
        }

        Ok(match self.lookup(tick, &options.host, &options.path) {
            Some(route) => Response::new(route.status, format!("backend={}", route.backend)),
            None => Response::new(404, format!("no route for {}{}", options.host, options.path)),
        })
    }
}

#[async_trait]
impl NamespaceProvisioner for SimulatedControlPlane {
    async fn create(&self, config: &NamespaceConfig) -> Result<Scope, CollaboratorError> {
        if config.prefix.is_empty() {
            return Err(CollaboratorError::Namespace(
                "namespace prefix must not be empty".to_string(),
            ));
        }
        let suffix = Uuid::new_v4().simple().to_string();
        let name = format!("{}-{}", config.prefix, &suffix[..8]);
        self.namespaces.insert(name.clone(), config.inject);
        Ok(Scope::new(name))
    }
}

/// A component created by [`SimulatedComponentFactory`].
#[derive(Debug, Clone, PartialEq)]
pub struct SimulatedComponent {
    /// Component name.
    pub name: String,
    /// Component kind.
    pub kind: String,
    /// Settings it was created with.
    pub settings: HashMap<String, serde_json::Value>,
    /// Names of the handles it was given.
    pub dependencies: Vec<String>,
}

/// Records component creation and fails on request.
#[derive(Debug, Default)]
pub struct SimulatedComponentFactory {
    created: Mutex<Vec<String>>,
    fail_on: HashSet<String>,
}

impl SimulatedComponentFactory {
    /// Creates a factory.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Makes creation of `name` fail.
    #[must_use]
    pub fn fail_on(mut self, name: impl Into<String>) -> Self {
        self.fail_on.insert(name.into());
        self
    }

    /// Returns created component names in order.
    #[must_use]
    pub fn created(&self) -> Vec<String> {
        self.created.lock().clone()
    }
}

#[async_trait]
impl ComponentFactory for SimulatedComponentFactory {
    async fn create(&self, config: &ComponentConfig) -> Result<Handle, CollaboratorError> {
        if self.fail_on.contains(&config.name) {
            return Err(CollaboratorError::Component {
                component: config.name.clone(),
                message: "simulated creation failure".to_string(),
            });
        }
        self.created.lock().push(config.name.clone());
        Ok(Arc::new(SimulatedComponent {
            name: config.name.clone(),
            kind: config.kind.clone(),
            settings: config.settings.clone(),
            dependencies: config.dependency_names().into_iter().map(str::to_string).collect(),
        }))
    }
}
