//! Counter and event sinks.
//!
//! Every leaf action mirrors its success or failure into a named counter and
//! a structured event so hosts can alert without scraping log text. The sink
//! is a seam: production hosts forward to their metrics pipeline, tests use
//! the in-memory implementation.

use std::collections::BTreeMap;
use std::sync::Mutex;

/// A structured action event reported by a leaf action.
#[derive(Debug, Clone)]
pub struct ActionEvent {
    /// Event type, e.g. "success" or "error".
    pub event_type: String,
    pub action_type: String,
    pub action_name: String,
    /// Context tag at the point of the report.
    pub context_tag: String,
    /// Error text for failure events.
    pub message: Option<String>,
    pub data: BTreeMap<String, String>,
}

/// Sink for counters and action events.
pub trait TelemetrySink: Send + Sync {
    /// Increment a named counter. `instance` scopes the counter to a specific
    /// action instance (already combined with any per-call suffix).
    fn increment_counter(&self, name: &str, instance: Option<&str>, value: u64);

    fn action_event(&self, event: ActionEvent);

    fn action_error(&self, event: ActionEvent);
}

/// Sink that drops everything.
#[derive(Debug, Clone, Copy, Default)]
pub struct NullTelemetry;

impl TelemetrySink for NullTelemetry {
    fn increment_counter(&self, _name: &str, _instance: Option<&str>, _value: u64) {}

    fn action_event(&self, _event: ActionEvent) {}

    fn action_error(&self, _event: ActionEvent) {}
}

/// In-memory sink recording everything it receives.
#[derive(Debug, Default)]
pub struct InMemoryTelemetry {
    counters: Mutex<BTreeMap<String, u64>>,
    events: Mutex<Vec<ActionEvent>>,
    errors: Mutex<Vec<ActionEvent>>,
}

impl InMemoryTelemetry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Current value of a counter; keys are `name` for the aggregate counter
    /// and `name/instance` for instance counters.
    pub fn counter(&self, key: &str) -> u64 {
        self.counters
            .lock()
            .expect("telemetry lock poisoned")
            .get(key)
            .copied()
            .unwrap_or(0)
    }

    pub fn events(&self) -> Vec<ActionEvent> {
        self.events.lock().expect("telemetry lock poisoned").clone()
    }

    pub fn errors(&self) -> Vec<ActionEvent> {
        self.errors.lock().expect("telemetry lock poisoned").clone()
    }
}

impl TelemetrySink for InMemoryTelemetry {
    fn increment_counter(&self, name: &str, instance: Option<&str>, value: u64) {
        let mut counters = self.counters.lock().expect("telemetry lock poisoned");
        *counters.entry(name.to_string()).or_insert(0) += value;
        if let Some(instance) = instance {
            *counters.entry(format!("{name}/{instance}")).or_insert(0) += value;
        }
    }

    fn action_event(&self, event: ActionEvent) {
        self.events.lock().expect("telemetry lock poisoned").push(event);
    }

    fn action_error(&self, event: ActionEvent) {
        self.errors.lock().expect("telemetry lock poisoned").push(event);
    }
}
