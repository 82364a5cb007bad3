//! Invocation events
//!
//! Every `invoke` through the manager emits exactly one [`InvocationEvent`].
//! Where the events go is up to the [`EventSink`].

use crate::error::ErrorKind;
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast;
use tracing::info;
use uuid::Uuid;

/// Outcome of one invocation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum InvocationOutcome {
    Success,
    Failure,
}

/// Structured record of one invocation
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct InvocationEvent {
    pub id: Uuid,
    pub timestamp: DateTime<Utc>,
    pub service: String,
    pub operation: String,
    pub outcome: InvocationOutcome,
    pub latency_ms: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_kind: Option<ErrorKind>,
}

impl InvocationEvent {
    pub fn new(
        service: impl Into<String>,
        operation: impl Into<String>,
        latency: Duration,
        error_kind: Option<ErrorKind>,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            timestamp: Utc::now(),
            service: service.into(),
            operation: operation.into(),
            outcome: if error_kind.is_some() {
                InvocationOutcome::Failure
            } else {
                InvocationOutcome::Success
            },
            latency_ms: latency.as_millis() as u64,
            error_kind,
        }
    }
}

/// Receiver of invocation events
pub trait EventSink: Send + Sync {
    fn emit(&self, event: &InvocationEvent);
}

/// Logs each event as one `info` record on target `switchboard::invocation`
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingEventSink;

impl EventSink for TracingEventSink {
    fn emit(&self, event: &InvocationEvent) {
        info!(
            target: "switchboard::invocation",
            id = %event.id,
            service = %event.service,
            operation = %event.operation,
            outcome = ?event.outcome,
            latency_ms = event.latency_ms,
            error_kind = event.error_kind.map(|k| k.as_str()),
            "invocation"
        );
    }
}

/// Publishes events to any number of subscribers; slow ones lag and lose
/// the oldest events
#[derive(Debug, Clone)]
pub struct BroadcastEventSink {
    sender: broadcast::Sender<InvocationEvent>,
}

impl BroadcastEventSink {
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity.max(1));
        Self { sender }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<InvocationEvent> {
        self.sender.subscribe()
    }
}

impl Default for BroadcastEventSink {
    fn default() -> Self {
        Self::new(1024)
    }
}

impl EventSink for BroadcastEventSink {
    fn emit(&self, event: &InvocationEvent) {
        // No subscribers is not an error
        let _ = self.sender.send(event.clone());
    }
}

/// Forwards each event to several sinks in order
#[derive(Clone, Default)]
pub struct FanoutEventSink {
    sinks: Vec<Arc<dyn EventSink>>,
}

impl FanoutEventSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_sink(mut self, sink: Arc<dyn EventSink>) -> Self {
        self.sinks.push(sink);
        self
    }
}

impl EventSink for FanoutEventSink {
    fn emit(&self, event: &InvocationEvent) {
        for sink in &self.sinks {
            sink.emit(event);
        }
    }
}
