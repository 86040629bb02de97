//! Probe trait and closure adapter.

use crate::errors::ProbeFailure;
use async_trait::async_trait;
use std::fmt::Debug;
use std::future::Future;
use std::marker::PhantomData;

/// One externally observable check.
///
/// Probes hold no state between invocations beyond what they observe.
#[async_trait]
pub trait Probe: Send + Sync {
    /// Performs one observation.
    async fn observe(&self) -> Result<(), ProbeFailure>;

    /// Short description used in logs and events.
    fn describe(&self) -> String {
        "probe".to_string()
    }
}

/// A probe backed by an async closure.
pub struct FnProbe<F, Fut>
where
    F: Fn() -> Fut + Send + Sync,
    Fut: Future<Output = Result<(), ProbeFailure>> + Send,
{
    name: String,
    func: F,
    _phantom: PhantomData<fn() -> Fut>,
}

impl<F, Fut> FnProbe<F, Fut>
where
    F: Fn() -> Fut + Send + Sync,
    Fut: Future<Output = Result<(), ProbeFailure>> + Send,
{
    /// Creates a closure probe.
    pub fn new(name: impl Into<String>, func: F) -> Self {
        Self {
            name: name.into(),
            func,
            _phantom: PhantomData,
        }
    }
}

impl<F, Fut> Debug for FnProbe<F, Fut>
where
    F: Fn() -> Fut + Send + Sync,
    Fut: Future<Output = Result<(), ProbeFailure>> + Send,
{
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FnProbe").field("name", &self.name).finish()
    }
}

#[async_trait]
impl<F, Fut> Probe for FnProbe<F, Fut>
where
    F: Fn() -> Fut + Send + Sync,
    Fut: Future<Output = Result<(), ProbeFailure>> + Send,
{
    async fn observe(&self) -> Result<(), ProbeFailure> {
        (self.func)().await
    }

    fn describe(&self) -> String {
        self.name.clone()
    }
}
