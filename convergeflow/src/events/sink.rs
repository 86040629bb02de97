//! Event sink trait and implementations.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use serde::Serialize;
use tracing::{debug, info, Level};

/// A harness event as recorded by a sink.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct HarnessEvent {
    /// Event type, e.g. `probe.retry`.
    pub event_type: String,
    /// Structured payload.
    pub data: serde_json::Value,
    /// When the event was emitted.
    pub emitted_at: DateTime<Utc>,
}

/// Receives setup and polling events.
#[async_trait]
pub trait EventSink: Send + Sync {
    /// Emits an event. Must never panic.
    async fn emit(&self, event_type: &str, data: serde_json::Value);
}

/// Discards all events.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoOpEventSink;

#[async_trait]
impl EventSink for NoOpEventSink {
    async fn emit(&self, _event_type: &str, _data: serde_json::Value) {}
}

/// Forwards events to `tracing`.
#[derive(Debug, Clone)]
pub struct LoggingEventSink {
    level: Level,
}

impl Default for LoggingEventSink {
    fn default() -> Self {
        Self { level: Level::INFO }
    }
}

impl LoggingEventSink {
    /// Creates a logging sink at the given level.
    #[must_use]
    pub fn new(level: Level) -> Self {
        Self { level }
    }

    /// Creates a debug-level logging sink.
    #[must_use]
    pub fn debug() -> Self {
        Self::new(Level::DEBUG)
    }

    fn log_event(&self, event_type: &str, data: &serde_json::Value) {
        if self.level == Level::DEBUG {
            debug!(event_type = %event_type, event_data = %data, "Event: {}", event_type);
        } else {
            info!(event_type = %event_type, event_data = %data, "Event: {}", event_type);
        }
    }
}

#[async_trait]
impl EventSink for LoggingEventSink {
    async fn emit(&self, event_type: &str, data: serde_json::Value) {
        self.log_event(event_type, &data);
    }
}

/// Keeps every event in memory, for assertions in tests.
#[derive(Debug, Default)]
pub struct CollectingEventSink {
    events: RwLock<Vec<HarnessEvent>>,
}

impl CollectingEventSink {
    /// Creates a new collecting sink.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns all collected events.
    #[must_use]
    pub fn events(&self) -> Vec<HarnessEvent> {
        self.events.read().clone()
    }

    /// Returns collected event types in emission order.
    #[must_use]
    pub fn event_types(&self) -> Vec<String> {
        self.events.read().iter().map(|e| e.event_type.clone()).collect()
    }

    /// Returns the number of collected events.
    #[must_use]
    pub fn len(&self) -> usize {
        self.events.read().len()
    }

    /// Returns true if no events have been collected.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.events.read().is_empty()
    }

    /// Clears all collected events.
    pub fn clear(&self) {
        self.events.write().clear();
    }

    /// Returns events matching a type prefix.
    #[must_use]
    pub fn events_of_type(&self, type_prefix: &str) -> Vec<HarnessEvent> {
        self.events
            .read()
            .iter()
            .filter(|e| e.event_type.starts_with(type_prefix))
            .cloned()
            .collect()
    }

    fn push(&self, event_type: &str, data: serde_json::Value) {
        self.events.write().push(HarnessEvent {
            event_type: event_type.to_string(),
            data,
            emitted_at: Utc::now(),
        });
    }
}

#[async_trait]
impl EventSink for CollectingEventSink {
    async fn emit(&self, event_type: &str, data: serde_json::Value) {
        self.push(event_type, data);
    }
}
