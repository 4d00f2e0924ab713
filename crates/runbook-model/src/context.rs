//! Parse and execute contexts.
//!
//! A context is request-scoped: it carries a nested action-tag stack used to
//! scope every diagnostic entry, an error latch, and (for execution) the
//! cancellation token, simulation flag, clock, and telemetry sinks. Entries
//! are recorded in memory so hosts and tests can inspect exactly what an
//! invocation logged, and mirrored to `tracing`.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::{Arc, Mutex};

use chrono::{DateTime, Duration, Utc};
use tokio_util::sync::CancellationToken;

use crate::clock::{Clock, SystemClock};
use crate::telemetry::{ActionEvent, NullTelemetry, TelemetrySink};

/// Which lifecycle activity the context is currently bracketing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContextActivity {
    Parse,
    Expand,
    Validate,
    Execute,
}

impl fmt::Display for ContextActivity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ContextActivity::Parse => write!(f, "parse"),
            ContextActivity::Expand => write!(f, "expand"),
            ContextActivity::Validate => write!(f, "validate"),
            ContextActivity::Execute => write!(f, "execute"),
        }
    }
}

/// Severity class of a diagnostic entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntryKind {
    Normal,
    Verbose,
    Error,
}

/// One recorded diagnostic entry.
#[derive(Debug, Clone)]
pub struct LogEntry {
    pub time: DateTime<Utc>,
    pub activity: ContextActivity,
    pub kind: EntryKind,
    pub tag: String,
    pub message: String,
}

impl fmt::Display for LogEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "[{} {} {:?}] [{}] {}",
            self.time.format("%Y-%m-%dT%H:%M:%S%.3fZ"),
            self.activity,
            self.kind,
            self.tag,
            self.message
        )
    }
}

const EMPTY_TAG: &str = "<root>";

/// Shared diagnostic state behind both context types.
#[derive(Debug, Default)]
struct DiagState {
    tag_stack: Vec<(ContextActivity, String)>,
    error_intros: Vec<String>,
    entries: Vec<LogEntry>,
    has_errors: bool,
}

impl DiagState {
    fn current(&self, fallback: ContextActivity) -> (ContextActivity, String) {
        self.tag_stack
            .last()
            .cloned()
            .unwrap_or((fallback, EMPTY_TAG.to_string()))
    }

    fn push(&mut self, activity: ContextActivity, tag: &str) {
        let full_tag = match self.tag_stack.last() {
            Some((_, parent)) => format!("{parent}.{tag}"),
            None => tag.to_string(),
        };
        self.tag_stack.push((activity, full_tag));
    }

    fn add(&mut self, now: DateTime<Utc>, fallback: ContextActivity, kind: EntryKind, message: &str) {
        let (activity, tag) = self.current(fallback);
        match kind {
            EntryKind::Error => tracing::warn!(tag = %tag, "{message}"),
            EntryKind::Normal => tracing::debug!(tag = %tag, "{message}"),
            EntryKind::Verbose => tracing::trace!(tag = %tag, "{message}"),
        }
        self.entries.push(LogEntry {
            time: now,
            activity,
            kind,
            tag,
            message: message.to_string(),
        });
    }

    fn add_error(&mut self, now: DateTime<Utc>, fallback: ContextActivity, message: &str) {
        self.has_errors = true;
        let intros: Vec<String> = self.error_intros.drain(..).collect();
        for intro in intros {
            self.add(now, fallback, EntryKind::Error, &intro);
        }
        self.add(now, fallback, EntryKind::Error, message);
    }
}

/// Cross-cutting logging surface shared by parse and execute contexts.
pub trait Context: Send + Sync {
    /// The current nested action tag.
    fn tag(&self) -> String;

    fn log(&self, message: &str);

    fn log_verbose(&self, message: &str);

    fn log_error(&self, message: &str);

    fn has_errors(&self) -> bool;
}

/// Context for the parse / expand / validate phases.
pub struct ParseContext {
    host: String,
    clock: Arc<dyn Clock>,
    state: Mutex<DiagState>,
}

impl ParseContext {
    pub fn new(host: impl Into<String>, clock: Arc<dyn Clock>) -> Self {
        Self {
            host: host.into(),
            clock,
            state: Mutex::new(DiagState::default()),
        }
    }

    /// Context with the system clock; the common host entry point.
    pub fn for_host(host: impl Into<String>) -> Self {
        Self::new(host, Arc::new(SystemClock))
    }

    pub fn host(&self) -> &str {
        &self.host
    }

    /// Push a nested action tag for the given activity.
    pub fn on_action_start(&self, activity: ContextActivity, tag: &str) {
        self.state
            .lock()
            .expect("context lock poisoned")
            .push(activity, tag);
    }

    /// Pop the most recent tag.
    pub fn on_action_end(&self) {
        self.state
            .lock()
            .expect("context lock poisoned")
            .tag_stack
            .pop();
    }

    /// Register a message emitted ahead of the next error, if one occurs.
    /// Parent actions use this to prefix child parse errors with their own
    /// framing; the intro is dropped unseen when no error follows.
    pub fn push_error_intro(&self, message: impl Into<String>) {
        self.state
            .lock()
            .expect("context lock poisoned")
            .error_intros
            .push(message.into());
    }

    pub fn pop_error_intro(&self) {
        self.state
            .lock()
            .expect("context lock poisoned")
            .error_intros
            .pop();
    }

    pub fn entries(&self) -> Vec<LogEntry> {
        self.state
            .lock()
            .expect("context lock poisoned")
            .entries
            .clone()
    }

    /// Rendered log text, optionally filtered to one entry kind.
    pub fn logs(&self, filter: Option<EntryKind>) -> String {
        render_logs(&self.entries(), filter)
    }
}

impl Context for ParseContext {
    fn tag(&self) -> String {
        self.state
            .lock()
            .expect("context lock poisoned")
            .current(ContextActivity::Parse)
            .1
    }

    fn log(&self, message: &str) {
        let now = self.clock.now_utc();
        self.state
            .lock()
            .expect("context lock poisoned")
            .add(now, ContextActivity::Parse, EntryKind::Normal, message);
    }

    fn log_verbose(&self, message: &str) {
        let now = self.clock.now_utc();
        self.state
            .lock()
            .expect("context lock poisoned")
            .add(now, ContextActivity::Parse, EntryKind::Verbose, message);
    }

    fn log_error(&self, message: &str) {
        let now = self.clock.now_utc();
        self.state
            .lock()
            .expect("context lock poisoned")
            .add_error(now, ContextActivity::Parse, message);
    }

    fn has_errors(&self) -> bool {
        self.state.lock().expect("context lock poisoned").has_errors
    }
}

/// Context for the execute phase.
///
/// Simulation runs perform read-only work (queries, gating) but suppress
/// externally visible effects such as mail or incident filing.
pub struct ExecuteContext {
    host: String,
    clock: Arc<dyn Clock>,
    cancel: CancellationToken,
    is_simulation: bool,
    operation_start: DateTime<Utc>,
    telemetry: Arc<dyn TelemetrySink>,
    state: Mutex<DiagState>,
}

impl ExecuteContext {
    pub fn new(
        host: impl Into<String>,
        clock: Arc<dyn Clock>,
        cancel: CancellationToken,
        is_simulation: bool,
        telemetry: Arc<dyn TelemetrySink>,
    ) -> Self {
        let operation_start = clock.now_utc();
        Self {
            host: host.into(),
            clock,
            cancel,
            is_simulation,
            operation_start,
            telemetry,
            state: Mutex::new(DiagState::default()),
        }
    }

    /// Context with the system clock, a fresh token, and no telemetry.
    pub fn for_host(host: impl Into<String>) -> Self {
        Self::new(
            host,
            Arc::new(SystemClock),
            CancellationToken::new(),
            false,
            Arc::new(NullTelemetry),
        )
    }

    pub fn host(&self) -> &str {
        &self.host
    }

    pub fn now_utc(&self) -> DateTime<Utc> {
        self.clock.now_utc()
    }

    pub fn operation_start_time(&self) -> DateTime<Utc> {
        self.operation_start
    }

    /// Elapsed time since the operation started.
    pub fn duration(&self) -> Duration {
        self.clock.now_utc() - self.operation_start
    }

    pub fn cancellation_token(&self) -> &CancellationToken {
        &self.cancel
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }

    pub fn is_simulation(&self) -> bool {
        self.is_simulation
    }

    pub fn on_action_start(&self, tag: &str) {
        self.state
            .lock()
            .expect("context lock poisoned")
            .push(ContextActivity::Execute, tag);
    }

    /// Replace the most recent tag, keeping its depth. Loops use this to
    /// scope entries to the current iteration.
    pub fn on_action_update(&self, tag: &str) {
        let mut state = self.state.lock().expect("context lock poisoned");
        if state.tag_stack.pop().is_some() {
            state.push(ContextActivity::Execute, tag);
        }
    }

    pub fn on_action_end(&self) {
        self.state
            .lock()
            .expect("context lock poisoned")
            .tag_stack
            .pop();
    }

    /// Increment a named counter, plus its instance counter when an instance
    /// name is given; a per-call suffix extends the instance name.
    pub fn increment_counter(
        &self,
        name: &str,
        instance: Option<&str>,
        suffix: Option<&str>,
        value: u64,
    ) {
        let instance = match (instance, suffix) {
            (Some(instance), Some(suffix)) if !suffix.trim().is_empty() => {
                Some(format!("{instance}/{suffix}"))
            }
            (Some(instance), _) => Some(instance.to_string()),
            (None, _) => None,
        };
        self.telemetry
            .increment_counter(name, instance.as_deref(), value);
    }

    pub fn report_action_event(
        &self,
        event_type: &str,
        action_type: &str,
        action_name: &str,
        data: BTreeMap<String, String>,
    ) {
        self.telemetry.action_event(ActionEvent {
            event_type: event_type.to_string(),
            action_type: action_type.to_string(),
            action_name: action_name.to_string(),
            context_tag: self.tag(),
            message: None,
            data,
        });
    }

    pub fn report_action_error(
        &self,
        event_type: &str,
        action_type: &str,
        action_name: &str,
        message: &str,
        data: BTreeMap<String, String>,
    ) {
        self.telemetry.action_error(ActionEvent {
            event_type: event_type.to_string(),
            action_type: action_type.to_string(),
            action_name: action_name.to_string(),
            context_tag: self.tag(),
            message: Some(message.to_string()),
            data,
        });
    }

    pub fn entries(&self) -> Vec<LogEntry> {
        self.state
            .lock()
            .expect("context lock poisoned")
            .entries
            .clone()
    }

    pub fn logs(&self, filter: Option<EntryKind>) -> String {
        render_logs(&self.entries(), filter)
    }
}

impl Context for ExecuteContext {
    fn tag(&self) -> String {
        self.state
            .lock()
            .expect("context lock poisoned")
            .current(ContextActivity::Execute)
            .1
    }

    fn log(&self, message: &str) {
        let now = self.clock.now_utc();
        self.state
            .lock()
            .expect("context lock poisoned")
            .add(now, ContextActivity::Execute, EntryKind::Normal, message);
    }

    fn log_verbose(&self, message: &str) {
        let now = self.clock.now_utc();
        self.state
            .lock()
            .expect("context lock poisoned")
            .add(now, ContextActivity::Execute, EntryKind::Verbose, message);
    }

    fn log_error(&self, message: &str) {
        let now = self.clock.now_utc();
        self.state
            .lock()
            .expect("context lock poisoned")
            .add_error(now, ContextActivity::Execute, message);
    }

    fn has_errors(&self) -> bool {
        self.state.lock().expect("context lock poisoned").has_errors
    }
}

fn render_logs(entries: &[LogEntry], filter: Option<EntryKind>) -> String {
    let mut out = String::new();
    for entry in entries {
        if filter.map_or(true, |kind| entry.kind == kind) {
            out.push_str(&entry.to_string());
            out.push('\n');
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::FixedClock;
    use crate::telemetry::InMemoryTelemetry;

    fn fixed_execute_ctx(telemetry: Arc<InMemoryTelemetry>) -> ExecuteContext {
        let instant = "2018-07-02T00:00:00Z".parse().unwrap();
        ExecuteContext::new(
            "TestHost",
            Arc::new(FixedClock(instant)),
            CancellationToken::new(),
            false,
            telemetry,
        )
    }

    // =========================================================================
    // Tag stack
    // =========================================================================

    #[test]
    fn test_tag_is_root_when_stack_empty() {
        let ctx = ParseContext::for_host("test");
        assert_eq!(ctx.tag(), "<root>");
    }

    #[test]
    fn test_nested_tags_compose_with_dots() {
        let ctx = ParseContext::for_host("test");
        ctx.on_action_start(ContextActivity::Parse, "outer");
        ctx.on_action_start(ContextActivity::Parse, "inner");
        assert_eq!(ctx.tag(), "outer.inner");
        ctx.on_action_end();
        assert_eq!(ctx.tag(), "outer");
        ctx.on_action_end();
        assert_eq!(ctx.tag(), "<root>");
    }

    #[test]
    fn test_execute_action_update_replaces_top_tag() {
        let ctx = ExecuteContext::for_host("test");
        ctx.on_action_start("set");
        ctx.on_action_start("loop");
        ctx.on_action_update("loop['row1']");
        assert_eq!(ctx.tag(), "set.loop['row1']");
        ctx.on_action_update("loop['row2']");
        assert_eq!(ctx.tag(), "set.loop['row2']");
    }

    // =========================================================================
    // Entries and error latch
    // =========================================================================

    #[test]
    fn test_entries_capture_tag_and_kind() {
        let ctx = ParseContext::for_host("test");
        ctx.on_action_start(ContextActivity::Parse, "action1");
        ctx.log("working");
        ctx.log_verbose("detail");
        ctx.log_error("broke");

        let entries = ctx.entries();
        assert_eq!(entries.len(), 3);
        assert!(entries.iter().all(|e| e.tag == "action1"));
        assert_eq!(entries[0].kind, EntryKind::Normal);
        assert_eq!(entries[1].kind, EntryKind::Verbose);
        assert_eq!(entries[2].kind, EntryKind::Error);
    }

    #[test]
    fn test_has_errors_latches() {
        let ctx = ParseContext::for_host("test");
        assert!(!ctx.has_errors());
        ctx.log("fine");
        assert!(!ctx.has_errors());
        ctx.log_error("broke");
        assert!(ctx.has_errors());
        ctx.log("fine again");
        assert!(ctx.has_errors());
    }

    #[test]
    fn test_logs_filter_by_kind() {
        let ctx = ParseContext::for_host("test");
        ctx.log("normal line");
        ctx.log_error("error line");

        let errors = ctx.logs(Some(EntryKind::Error));
        assert!(errors.contains("error line"));
        assert!(!errors.contains("normal line"));
        let all = ctx.logs(None);
        assert!(all.contains("normal line") && all.contains("error line"));
    }

    #[test]
    fn test_error_intro_emitted_before_first_error_only() {
        let ctx = ParseContext::for_host("test");
        ctx.push_error_intro("while parsing the outer action:");
        ctx.log("no error yet");
        ctx.log_error("inner failure");
        ctx.log_error("second failure");

        let errors: Vec<_> = ctx
            .entries()
            .into_iter()
            .filter(|e| e.kind == EntryKind::Error)
            .collect();
        assert_eq!(errors.len(), 3);
        assert_eq!(errors[0].message, "while parsing the outer action:");
        assert_eq!(errors[1].message, "inner failure");
        assert_eq!(errors[2].message, "second failure");
    }

    #[test]
    fn test_popped_error_intro_is_never_emitted() {
        let ctx = ParseContext::for_host("test");
        ctx.push_error_intro("intro");
        ctx.pop_error_intro();
        ctx.log_error("failure");

        let errors = ctx.logs(Some(EntryKind::Error));
        assert!(!errors.contains("intro"));
    }

    // =========================================================================
    // Execute-context specifics
    // =========================================================================

    #[test]
    fn test_duration_uses_clock() {
        let telemetry = Arc::new(InMemoryTelemetry::new());
        let ctx = fixed_execute_ctx(telemetry);
        assert_eq!(ctx.duration(), Duration::zero());
        assert_eq!(ctx.now_utc(), ctx.operation_start_time());
    }

    #[test]
    fn test_cancellation_is_observable() {
        let ctx = ExecuteContext::for_host("test");
        assert!(!ctx.is_cancelled());
        ctx.cancellation_token().cancel();
        assert!(ctx.is_cancelled());
    }

    #[test]
    fn test_counter_suffix_composition() {
        let telemetry = Arc::new(InMemoryTelemetry::new());
        let ctx = fixed_execute_ctx(telemetry.clone());

        ctx.increment_counter("Emails Sent", Some("tag"), Some("suffix"), 1);
        ctx.increment_counter("Emails Sent", Some("tag"), None, 1);
        ctx.increment_counter("Emails Sent", None, Some("ignored"), 1);

        assert_eq!(telemetry.counter("Emails Sent"), 3);
        assert_eq!(telemetry.counter("Emails Sent/tag/suffix"), 1);
        assert_eq!(telemetry.counter("Emails Sent/tag"), 1);
    }

    #[test]
    fn test_action_events_carry_context_tag() {
        let telemetry = Arc::new(InMemoryTelemetry::new());
        let ctx = fixed_execute_ctx(telemetry.clone());
        ctx.on_action_start("set");
        ctx.on_action_start("leaf");

        ctx.report_action_event("success", "TRANSMIT-EMAIL", "leaf", BTreeMap::new());
        ctx.report_action_error("error", "TRANSMIT-EMAIL", "leaf", "boom", BTreeMap::new());

        assert_eq!(telemetry.events()[0].context_tag, "set.leaf");
        assert_eq!(telemetry.errors()[0].message.as_deref(), Some("boom"));
    }

    #[test]
    fn test_simulation_flag() {
        let ctx = ExecuteContext::new(
            "test",
            Arc::new(SystemClock),
            CancellationToken::new(),
            true,
            Arc::new(NullTelemetry),
        );
        assert!(ctx.is_simulation());
        assert!(!ExecuteContext::for_host("test").is_simulation());
    }
}
