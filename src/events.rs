use std::sync::{Mutex, PoisonError};

use serde::Serialize;
use serde_json::{json, Value};
use tokio::sync::mpsc::UnboundedSender;

pub const EVENT_RENDER: &str = "browser:render";
pub const EVENT_NOTIFY: &str = "notify";
pub const EVENT_AUTH_REQUIRED: &str = "auth:required";
pub const EVENT_AUTH_STATUS: &str = "auth:status";
pub const EVENT_RENAME_COMPLETE: &str = "rename:complete";

/// Push channel from the core to the host shell.
pub trait EventSink: Send + Sync {
    fn emit(&self, event: &str, payload: Value);
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum NotifyLevel {
    Info,
    Success,
    Error,
}

pub fn notify(sink: &dyn EventSink, level: NotifyLevel, message: impl Into<String>) {
    sink.emit(
        EVENT_NOTIFY,
        json!({ "level": level, "message": message.into() }),
    );
}

pub fn emit_serialized<T: Serialize>(sink: &dyn EventSink, event: &str, payload: &T) {
    match serde_json::to_value(payload) {
        Ok(value) => sink.emit(event, value),
        Err(err) => tracing::warn!(event, "failed to serialize event payload: {err}"),
    }
}

/// Forwards events as `{"event": ..., "payload": ...}` lines to the host writer.
pub struct ChannelSink {
    tx: UnboundedSender<Value>,
}

impl ChannelSink {
    pub fn new(tx: UnboundedSender<Value>) -> Self {
        Self { tx }
    }
}

impl EventSink for ChannelSink {
    fn emit(&self, event: &str, payload: Value) {
        let _ = self.tx.send(json!({ "event": event, "payload": payload }));
    }
}

/// Keeps every emitted event in memory.
#[derive(Default)]
pub struct RecordingSink {
    events: Mutex<Vec<(String, Value)>>,
}

impl RecordingSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn events(&self) -> Vec<(String, Value)> {
        self.events
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn named(&self, event: &str) -> Vec<Value> {
        self.events()
            .into_iter()
            .filter(|(name, _)| name == event)
            .map(|(_, payload)| payload)
            .collect()
    }

    pub fn last(&self, event: &str) -> Option<Value> {
        self.named(event).pop()
    }

    pub fn notifications(&self, level: NotifyLevel) -> Vec<String> {
        let level = json!(level);
        self.named(EVENT_NOTIFY)
            .into_iter()
            .filter(|payload| payload["level"] == level)
            .filter_map(|payload| payload["message"].as_str().map(str::to_string))
            .collect()
    }

    pub fn clear(&self) {
        self.events
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clear();
    }
}

impl EventSink for RecordingSink {
    fn emit(&self, event: &str, payload: Value) {
        self.events
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push((event.to_string(), payload));
    }
}
