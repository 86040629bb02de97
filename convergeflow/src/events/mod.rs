//! Event emission for setup and polling.
//!
//! The orchestrator emits `stage.*` events and the poller emits `probe.*`
//! events. Sinks are passed explicitly; there is no global sink.

mod sink;

pub use sink::{CollectingEventSink, EventSink, HarnessEvent, LoggingEventSink, NoOpEventSink};

use std::sync::Arc;

/// A stage started running.
pub const STAGE_STARTED: &str = "stage.started";
/// A stage finished successfully.
pub const STAGE_COMPLETED: &str = "stage.completed";
/// A stage was skipped because its environment is not active.
pub const STAGE_SKIPPED: &str = "stage.skipped";
/// A stage failed and setup was aborted.
pub const STAGE_FAILED: &str = "stage.failed";

/// A probe attempt failed and another attempt is scheduled.
pub const PROBE_RETRY: &str = "probe.retry";
/// The probe converged.
pub const PROBE_CONVERGED: &str = "probe.converged";
/// Polling ended without convergence.
pub const PROBE_FAILED: &str = "probe.failed";

/// Returns the default sink.
#[must_use]
pub fn default_sink() -> Arc<dyn EventSink> {
    Arc::new(NoOpEventSink)
}
