//! Lifecycle event log
//!
//! Embedding applications hand drover a callback that receives a message plus
//! optional structured metadata for each lifecycle event (worker and master
//! start, worker exit, respawn scheduling, shutdown begin, forced shutdown).
//! Every event is also recorded through `tracing` at debug level.

use serde_json::Value;
use std::fmt;
use std::sync::Arc;
use tracing::{debug, info};

/// Signature of a lifecycle logging callback
pub type LogCallback = dyn Fn(&str, Option<&Value>) + Send + Sync;

/// Optional lifecycle logging sink, cheap to clone
#[derive(Clone, Default)]
pub struct EventLog {
    sink: Option<Arc<LogCallback>>,
}

impl EventLog {
    /// Log through a caller-supplied callback
    pub fn new<F>(callback: F) -> Self
    where
        F: Fn(&str, Option<&Value>) + Send + Sync + 'static,
    {
        Self {
            sink: Some(Arc::new(callback)),
        }
    }

    /// Discard lifecycle events
    pub fn none() -> Self {
        Self { sink: None }
    }

    /// Log lifecycle events as `tracing` info records
    pub fn tracing() -> Self {
        Self::new(|message, meta| match meta {
            Some(meta) => info!(target: "drover::lifecycle", meta = %meta, "{}", message),
            None => info!(target: "drover::lifecycle", "{}", message),
        })
    }

    pub fn is_configured(&self) -> bool {
        self.sink.is_some()
    }

    /// Record a lifecycle event
    pub fn emit(&self, message: &str, meta: Option<Value>) {
        debug!(event = message, meta = ?meta, "Lifecycle event");

        if let Some(sink) = &self.sink {
            sink(message, meta.as_ref());
        }
    }
}

impl fmt::Debug for EventLog {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EventLog")
            .field("configured", &self.is_configured())
            .finish()
    }
}

/// Collects events in memory; for tests and diagnostics
#[derive(Clone, Default)]
pub struct MemoryLog {
    events: Arc<std::sync::Mutex<Vec<(String, Option<Value>)>>>,
}

impl MemoryLog {
    pub fn new() -> Self {
        Self::default()
    }

    /// An [`EventLog`] that appends into this buffer
    pub fn event_log(&self) -> EventLog {
        let events = self.events.clone();
        EventLog::new(move |message, meta| {
            if let Ok(mut events) = events.lock() {
                events.push((message.to_string(), meta.cloned()));
            }
        })
    }

    pub fn events(&self) -> Vec<(String, Option<Value>)> {
        self.events.lock().map(|e| e.clone()).unwrap_or_default()
    }

    pub fn count(&self, message: &str) -> usize {
        self.events().iter().filter(|(m, _)| m == message).count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn none_is_silent() {
        let log = EventLog::none();
        assert!(!log.is_configured());
        log.emit("Master started", Some(json!({ "pid": 1 })));
    }

    #[test]
    fn callback_receives_message_and_meta() {
        let memory = MemoryLog::new();
        let log = memory.event_log();
        assert!(log.is_configured());

        log.emit("Worker started", Some(json!({ "pid": 42 })));
        log.emit("All cluster workers have shutdown; Exiting", None);

        let events = memory.events();
        assert_eq!(events.len(), 2);
        assert_eq!(events[0].0, "Worker started");
        assert_eq!(events[0].1, Some(json!({ "pid": 42 })));
        assert_eq!(events[1].1, None);
    }
}
