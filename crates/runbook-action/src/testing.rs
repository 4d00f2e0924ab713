//! In-memory fakes shared by the unit tests.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicI64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use serde_json::Value;
use tokio_util::sync::CancellationToken;

use runbook_model::{Context, ExecuteContext, ParseContext, TransformMap};

use crate::defs::{ActionRef, ExecuteResult};
use crate::error::{ActionError, BoxError, FactoryError, LifecycleError};
use crate::external::{
    AgentIncident, EmailMessage, IncidentCreateResult, IncidentCreator, IncidentFileStatus,
    KustoClient, KustoClientFactory, KustoQueryOptions, LockLease, LockManager, MailSender,
    QueryDataSet, TemplateRef, TemplateStore,
};
use crate::factory::ActionFactory;
use crate::op::Action;
use crate::store::ActionFetcher;

// =============================================================================
// Recording action
// =============================================================================

#[derive(Default)]
struct RecordingState {
    tag: String,
    continue_result: bool,
    validation_ok: bool,
    write_on_execute: Option<(String, Value)>,
    failure: Option<(String, bool)>,
    executions: Vec<Value>,
    validations: Vec<Option<TransformMap>>,
    order_log: Option<Arc<Mutex<Vec<String>>>>,
}

/// A scriptable action whose phases all succeed and whose executions are
/// recorded. Cloning shares the underlying state, so a handle kept by the
/// test observes what the engine did with its copy.
#[derive(Clone)]
pub(crate) struct RecordingAction {
    state: Arc<Mutex<RecordingState>>,
}

impl RecordingAction {
    fn new(tag: &str, continue_result: bool) -> Self {
        Self {
            state: Arc::new(Mutex::new(RecordingState {
                tag: tag.to_string(),
                continue_result,
                validation_ok: true,
                ..RecordingState::default()
            })),
        }
    }

    pub fn continuing(tag: &str) -> Self {
        Self::new(tag, true)
    }

    pub fn stopping(tag: &str) -> Self {
        Self::new(tag, false)
    }

    pub fn fail_validation(&self) {
        self.state.lock().unwrap().validation_ok = false;
    }

    /// Insert `key = value` into every model this action executes against.
    pub fn write_on_execute(&self, key: &str, value: Value) {
        self.state.lock().unwrap().write_on_execute = Some((key.to_string(), value));
    }

    /// Make every execution fail with a domain error.
    pub fn fail_execution(&self, message: &str, fatal: bool) {
        self.state.lock().unwrap().failure = Some((message.to_string(), fatal));
    }

    pub fn execution_count(&self) -> usize {
        self.state.lock().unwrap().executions.len()
    }

    pub fn last_model(&self) -> Option<Value> {
        self.state.lock().unwrap().executions.last().cloned()
    }

    pub fn models(&self) -> Vec<Value> {
        self.state.lock().unwrap().executions.clone()
    }

    pub fn validations(&self) -> Vec<Option<TransformMap>> {
        self.state.lock().unwrap().validations.clone()
    }

    fn set_order_log(&self, log: Arc<Mutex<Vec<String>>>) {
        self.state.lock().unwrap().order_log = Some(log);
    }
}

#[async_trait]
impl Action for RecordingAction {
    fn action_type(&self) -> &str {
        "RECORDING"
    }

    fn tag(&self) -> Option<String> {
        Some(self.state.lock().unwrap().tag.clone())
    }

    fn is_valid(&self) -> bool {
        true
    }

    fn parse_and_process_definition(
        &self,
        _ctx: &ParseContext,
        _factory: &dyn ActionFactory,
        tag: &str,
        _definition: Option<&Value>,
    ) -> Result<bool, LifecycleError> {
        self.state.lock().unwrap().tag = tag.to_string();
        Ok(true)
    }

    fn expand_definition(
        &self,
        _ctx: &ParseContext,
        _store: &dyn ActionFetcher,
    ) -> Result<bool, LifecycleError> {
        Ok(true)
    }

    fn validate(
        &self,
        _ctx: &ParseContext,
        params: Option<&TransformMap>,
    ) -> Result<bool, LifecycleError> {
        let mut state = self.state.lock().unwrap();
        state.validations.push(params.cloned());
        Ok(state.validation_ok)
    }

    async fn execute(
        &self,
        _ctx: &ExecuteContext,
        _action_ref: &ActionRef,
        model: &mut Value,
    ) -> Result<ExecuteResult, ActionError> {
        let (continue_result, write, failure, order_log, tag) = {
            let mut state = self.state.lock().unwrap();
            state.executions.push(model.clone());
            (
                state.continue_result,
                state.write_on_execute.clone(),
                state.failure.clone(),
                state.order_log.clone(),
                state.tag.clone(),
            )
        };

        if let Some(log) = order_log {
            log.lock().unwrap().push(tag);
        }

        if let Some((message, fatal)) = failure {
            return Err(ActionError::execution(message, fatal));
        }

        if let Some((key, value)) = write {
            if let Some(map) = model.as_object_mut() {
                map.insert(key, value);
            }
        }

        Ok(ExecuteResult::new(continue_result))
    }
}

// =============================================================================
// Factory and fetcher
// =============================================================================

/// Factory serving recording actions by type name. Created instances share
/// state with the registered prototype so tests can observe them.
#[derive(Default)]
pub(crate) struct TestFactory {
    prototypes: Mutex<HashMap<String, RecordingAction>>,
}

impl TestFactory {
    pub fn add_continuing(&self, action_type: &str) -> RecordingAction {
        let action = RecordingAction::continuing(action_type);
        self.prototypes
            .lock()
            .unwrap()
            .insert(action_type.to_string(), action.clone());
        action
    }
}

impl ActionFactory for TestFactory {
    fn create(&self, action_type: &str) -> Result<Box<dyn Action>, FactoryError> {
        self.prototypes
            .lock()
            .unwrap()
            .get(action_type)
            .map(|prototype| Box::new(prototype.clone()) as Box<dyn Action>)
            .ok_or_else(|| FactoryError::UnknownType(action_type.to_string()))
    }
}

/// Fetcher serving actions by tag, with a shared cross-action
/// execution-order log for the recording actions it holds.
#[derive(Default)]
pub(crate) struct TestFetcher {
    actions: Mutex<HashMap<String, Arc<dyn Action>>>,
    order: Arc<Mutex<Vec<String>>>,
}

impl TestFetcher {
    pub fn add(&self, action: RecordingAction) {
        action.set_order_log(self.order.clone());
        let tag = action.tag().unwrap_or_default();
        self.actions.lock().unwrap().insert(tag, Arc::new(action));
    }

    pub fn add_raw(&self, tag: &str, action: Arc<dyn Action>) {
        self.actions.lock().unwrap().insert(tag.to_string(), action);
    }

    pub fn execution_log(&self) -> Vec<String> {
        self.order.lock().unwrap().clone()
    }
}

impl ActionFetcher for TestFetcher {
    fn get_action(&self, tag: &str) -> Option<Arc<dyn Action>> {
        self.actions.lock().unwrap().get(tag).cloned()
    }
}

/// Drive an action through parse, expand, and validate, asserting success.
/// `params` stands in for the reference's argument transform so kinds with
/// required parameters validate cleanly.
pub(crate) fn parse_expand_validate(
    action: &dyn Action,
    factory: &dyn ActionFactory,
    fetcher: &dyn ActionFetcher,
    tag: &str,
    def: &Value,
    params: Option<&TransformMap>,
) {
    let ctx = ParseContext::for_host("test");
    assert!(
        action
            .parse_and_process_definition(&ctx, factory, tag, Some(def))
            .unwrap(),
        "parse failed: {}",
        ctx.logs(None)
    );
    assert!(
        action.expand_definition(&ctx, fetcher).unwrap(),
        "expand failed: {}",
        ctx.logs(None)
    );
    assert!(
        action.validate(&ctx, params).unwrap(),
        "validate failed: {}",
        ctx.logs(None)
    );
}

// =============================================================================
// Template store
// =============================================================================

/// Template store rendering inline text directly and tags through a map.
#[derive(Default)]
pub(crate) struct StaticTemplates {
    by_tag: Mutex<HashMap<String, String>>,
    reject_references: AtomicBool,
}

impl StaticTemplates {
    pub fn with_template(self, tag: &str, text: &str) -> Self {
        self.by_tag
            .lock()
            .unwrap()
            .insert(tag.to_string(), text.to_string());
        self
    }

    pub fn reject_references(&self) {
        self.reject_references.store(true, Ordering::SeqCst);
    }
}

impl TemplateStore for StaticTemplates {
    fn render(&self, _ctx: &dyn Context, template: &TemplateRef, _model: &Value) -> Option<String> {
        if let Some(inline) = &template.inline {
            return Some(inline.clone());
        }
        template
            .template_tag
            .as_ref()
            .and_then(|tag| self.by_tag.lock().unwrap().get(tag).cloned())
    }

    fn validate_reference(&self, _ctx: &dyn Context, _template: &TemplateRef) -> bool {
        !self.reject_references.load(Ordering::SeqCst)
    }
}

// =============================================================================
// Mail sender
// =============================================================================

#[derive(Default)]
pub(crate) struct RecordingMail {
    sent: Mutex<Vec<EmailMessage>>,
    fail_message: Mutex<Option<String>>,
}

impl RecordingMail {
    pub fn fail_with(&self, message: &str) {
        *self.fail_message.lock().unwrap() = Some(message.to_string());
    }

    pub fn sent(&self) -> Vec<EmailMessage> {
        self.sent.lock().unwrap().clone()
    }
}

#[async_trait]
impl MailSender for RecordingMail {
    async fn send_email(
        &self,
        _cancel: &CancellationToken,
        message: &EmailMessage,
        _override_recipient: Option<&str>,
    ) -> Result<bool, BoxError> {
        if let Some(failure) = self.fail_message.lock().unwrap().clone() {
            return Err(failure.into());
        }
        self.sent.lock().unwrap().push(message.clone());
        Ok(true)
    }
}

// =============================================================================
// Incident creator
// =============================================================================

#[derive(Default)]
pub(crate) struct RecordingIncidents {
    filed: Mutex<Vec<AgentIncident>>,
    next_id: AtomicI64,
    fail_message: Mutex<Option<String>>,
}

impl RecordingIncidents {
    pub fn fail_with(&self, message: &str) {
        *self.fail_message.lock().unwrap() = Some(message.to_string());
    }

    pub fn filed(&self) -> Vec<AgentIncident> {
        self.filed.lock().unwrap().clone()
    }
}

#[async_trait]
impl IncidentCreator for RecordingIncidents {
    async fn create_incident(
        &self,
        _cancel: &CancellationToken,
        incident: &AgentIncident,
    ) -> Result<IncidentCreateResult, BoxError> {
        if let Some(failure) = self.fail_message.lock().unwrap().clone() {
            return Err(failure.into());
        }
        self.filed.lock().unwrap().push(incident.clone());
        let id = self.next_id.fetch_add(1, Ordering::SeqCst) + 1;
        Ok(IncidentCreateResult::new(IncidentFileStatus::Created, Some(id)))
    }
}

// =============================================================================
// Kusto client
// =============================================================================

#[derive(Default)]
struct FakeKustoState {
    clients: Vec<(String, String, String)>,
    queries: Vec<(String, KustoQueryOptions)>,
    tables: Vec<Value>,
    fail_message: Option<String>,
}

#[derive(Clone, Default)]
pub(crate) struct FakeKusto {
    state: Arc<Mutex<FakeKustoState>>,
}

impl FakeKusto {
    pub fn with_table(self, table: Value) -> Self {
        self.state.lock().unwrap().tables.push(table);
        self
    }

    pub fn fail_with(&self, message: &str) {
        self.state.lock().unwrap().fail_message = Some(message.to_string());
    }

    pub fn clients(&self) -> Vec<(String, String, String)> {
        self.state.lock().unwrap().clients.clone()
    }

    pub fn queries(&self) -> Vec<(String, KustoQueryOptions)> {
        self.state.lock().unwrap().queries.clone()
    }
}

impl KustoClientFactory for FakeKusto {
    fn create_client(
        &self,
        cluster_url: &str,
        database: &str,
        telemetry_tag: &str,
    ) -> Arc<dyn KustoClient> {
        self.state.lock().unwrap().clients.push((
            cluster_url.to_string(),
            database.to_string(),
            telemetry_tag.to_string(),
        ));
        Arc::new(FakeKustoClient {
            state: self.state.clone(),
        })
    }
}

struct FakeKustoClient {
    state: Arc<Mutex<FakeKustoState>>,
}

#[async_trait]
impl KustoClient for FakeKustoClient {
    async fn execute_query(
        &self,
        query: &str,
        options: &KustoQueryOptions,
    ) -> Result<Value, BoxError> {
        let mut state = self.state.lock().unwrap();
        if let Some(failure) = state.fail_message.clone() {
            return Err(failure.into());
        }
        state.queries.push((query.to_string(), options.clone()));
        Ok(Value::Null)
    }

    fn to_data_set(&self, _rows: Value) -> Result<QueryDataSet, BoxError> {
        Ok(QueryDataSet {
            tables: self.state.lock().unwrap().tables.clone(),
        })
    }
}

// =============================================================================
// Clock
// =============================================================================

/// Clock returning its start instant on the first reading and a stepped
/// instant on every later one, so "elapsed operation time" is deterministic.
pub(crate) struct SteppingClock {
    start: chrono::DateTime<chrono::Utc>,
    step_secs: i64,
    calls: AtomicI64,
}

impl SteppingClock {
    pub fn starting_at(start: &str, step_secs: i64) -> Self {
        Self {
            start: start.parse().unwrap(),
            step_secs,
            calls: AtomicI64::new(0),
        }
    }
}

impl runbook_model::Clock for SteppingClock {
    fn now_utc(&self) -> chrono::DateTime<chrono::Utc> {
        if self.calls.fetch_add(1, Ordering::SeqCst) == 0 {
            self.start
        } else {
            self.start + chrono::Duration::seconds(self.step_secs)
        }
    }
}

// =============================================================================
// Lock manager
// =============================================================================

#[derive(Default)]
pub(crate) struct FakeLease {
    renewals: Mutex<Vec<Duration>>,
    releases: Mutex<Vec<bool>>,
}

impl FakeLease {
    pub fn renewals(&self) -> Vec<Duration> {
        self.renewals.lock().unwrap().clone()
    }

    pub fn releases(&self) -> Vec<bool> {
        self.releases.lock().unwrap().clone()
    }
}

#[async_trait]
impl LockLease for FakeLease {
    async fn renew(&self, extension: Duration) -> Result<bool, BoxError> {
        self.renewals.lock().unwrap().push(extension);
        Ok(true)
    }

    async fn release(&self, requeue: bool) -> Result<(), BoxError> {
        self.releases.lock().unwrap().push(requeue);
        Ok(())
    }
}

pub(crate) struct FakeLocks {
    pub lease: Arc<FakeLease>,
    acquisitions: Mutex<Vec<(String, String, String, Duration)>>,
    refuse: AtomicBool,
    cancel_on_acquire: Mutex<Option<CancellationToken>>,
}

impl Default for FakeLocks {
    fn default() -> Self {
        Self {
            lease: Arc::new(FakeLease::default()),
            acquisitions: Mutex::new(Vec::new()),
            refuse: AtomicBool::new(false),
            cancel_on_acquire: Mutex::new(None),
        }
    }
}

impl FakeLocks {
    pub fn refuse(&self) {
        self.refuse.store(true, Ordering::SeqCst);
    }

    /// Trigger the token the moment acquisition succeeds, simulating a
    /// cancellation racing the lease.
    pub fn cancel_on_acquire(&self, token: CancellationToken) {
        *self.cancel_on_acquire.lock().unwrap() = Some(token);
    }

    pub fn acquisitions(&self) -> Vec<(String, String, String, Duration)> {
        self.acquisitions.lock().unwrap().clone()
    }
}

#[async_trait]
impl LockManager for FakeLocks {
    async fn attempt_acquire(
        &self,
        group: &str,
        name: &str,
        holder: &str,
        lease_time: Duration,
        _blocking: bool,
    ) -> Result<Option<Arc<dyn LockLease>>, BoxError> {
        self.acquisitions.lock().unwrap().push((
            group.to_string(),
            name.to_string(),
            holder.to_string(),
            lease_time,
        ));

        if self.refuse.load(Ordering::SeqCst) {
            return Ok(None);
        }

        if let Some(token) = self.cancel_on_acquire.lock().unwrap().as_ref() {
            token.cancel();
        }

        Ok(Some(self.lease.clone() as Arc<dyn LockLease>))
    }
}
