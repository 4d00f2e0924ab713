//! Action contract and the shared base operator.
//!
//! `Action` is the object-safe four-phase contract every action exposes.
//! `ActionOp<K>` implements the machinery common to all of them — lifecycle
//! gating, tag handling, definition coercion, required-parameter validation,
//! execute bracketing, and result-model merging — while the concrete
//! `ActionKind` supplies the typed definition and the actual behavior.

use std::any::type_name;
use std::sync::RwLock;

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde_json::Value;

use runbook_model::{
    Context, ContextActivity, ExecuteContext, ModelManipulator, ParseContext, TransformMap,
};

use crate::defs::{ActionRef, ExecuteResult, Validatable};
use crate::error::{ActionError, LifecycleError};
use crate::factory::ActionFactory;
use crate::lifecycle::{self, Phase};
use crate::store::ActionFetcher;

/// Whether an action kind takes a definition object.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DefinitionMode {
    Required,
    Forbidden,
}

/// Identity of one action instance, handed to kind hooks for diagnostics.
#[derive(Debug, Clone)]
pub struct ActionInfo {
    pub action_type: String,
    pub tag: String,
}

impl ActionInfo {
    pub fn obj_text(&self) -> String {
        format!("action [{}] with tag [{}]", self.action_type, self.tag)
    }
}

/// The four-phase action contract.
///
/// Phases must run in order: parse (exactly once), expand, validate,
/// execute. An out-of-order call is a contract violation reported as a
/// `LifecycleError`; a data problem inside a phase is logged to the context
/// and reported as `Ok(false)` instead.
#[async_trait]
pub trait Action: Send + Sync {
    fn action_type(&self) -> &str;

    fn tag(&self) -> Option<String>;

    /// False once any phase has reported an error.
    fn is_valid(&self) -> bool;

    /// Parse the raw definition (a JSON value, or a string containing JSON)
    /// into the action's typed definition and process it.
    fn parse_and_process_definition(
        &self,
        ctx: &ParseContext,
        factory: &dyn ActionFactory,
        tag: &str,
        definition: Option<&Value>,
    ) -> Result<bool, LifecycleError>;

    /// Resolve tag references against the store once all actions are parsed.
    fn expand_definition(
        &self,
        ctx: &ParseContext,
        store: &dyn ActionFetcher,
    ) -> Result<bool, LifecycleError>;

    /// Check that a reference's parameter set is well formed and covers the
    /// action's required parameters.
    fn validate(
        &self,
        ctx: &ParseContext,
        params: Option<&TransformMap>,
    ) -> Result<bool, LifecycleError>;

    /// Execute against the model, merging any result model back through the
    /// reference's result transform.
    async fn execute(
        &self,
        ctx: &ExecuteContext,
        action_ref: &ActionRef,
        model: &mut Value,
    ) -> Result<ExecuteResult, ActionError>;
}

/// Behavior supplied by a concrete action kind.
#[async_trait]
pub trait ActionKind: Send + Sync + 'static {
    /// Typed definition this kind is configured with.
    type Def: DeserializeOwned + Validatable + Send + Sync + 'static;

    fn type_name(&self) -> &'static str;

    fn definition_mode(&self) -> DefinitionMode {
        DefinitionMode::Required
    }

    /// Parameter names a reference must bind, in declaration order.
    fn required_params(&self) -> &'static [&'static str] {
        &[]
    }

    /// Store the parsed definition and perform kind-specific parse work.
    fn process_definition(
        &self,
        _ctx: &ParseContext,
        _factory: &dyn ActionFactory,
        _info: &ActionInfo,
        _definition: Option<Self::Def>,
    ) -> bool {
        true
    }

    /// Resolve references against the store.
    fn expand(&self, _ctx: &ParseContext, _store: &dyn ActionFetcher, _info: &ActionInfo) -> bool {
        true
    }

    /// Act on required parameters still missing after the supplied set was
    /// applied. The default reports them together as one error.
    fn process_validation(&self, ctx: &ParseContext, _info: &ActionInfo, missing: &[&str]) -> bool {
        report_missing_params(ctx, missing)
    }

    /// The action's behavior. Returns the continue flag and an optional
    /// result model for the base operator to merge through the reference's
    /// result transform.
    async fn execute_internal(
        &self,
        ctx: &ExecuteContext,
        info: &ActionInfo,
        action_ref: &ActionRef,
        model: &mut Value,
    ) -> Result<(bool, Option<Value>), ActionError>;
}

/// Report required parameters missing from a reference, comma-joined in
/// declaration order.
pub fn report_missing_params(ctx: &dyn Context, missing: &[&str]) -> bool {
    if missing.is_empty() {
        true
    } else {
        ctx.log_error(&format!(
            "the following required parameters are not specified: {}",
            missing.join(", ")
        ));
        false
    }
}

#[derive(Debug, Default)]
struct OpState {
    phase: Phase,
    tag: Option<String>,
}

/// Base operator binding an `ActionKind` into the `Action` contract.
pub struct ActionOp<K: ActionKind> {
    kind: K,
    manipulator: ModelManipulator,
    state: RwLock<OpState>,
}

impl<K: ActionKind> ActionOp<K> {
    pub fn new(kind: K) -> Self {
        Self {
            kind,
            manipulator: ModelManipulator::new(),
            state: RwLock::new(OpState::default()),
        }
    }

    pub fn kind(&self) -> &K {
        &self.kind
    }

    fn info(&self) -> ActionInfo {
        ActionInfo {
            action_type: self.kind.type_name().to_string(),
            tag: self
                .state
                .read()
                .expect("action state lock poisoned")
                .tag
                .clone()
                .unwrap_or_else(|| "UNKNOWN".to_string()),
        }
    }

    fn phase(&self) -> Phase {
        self.state.read().expect("action state lock poisoned").phase
    }

    fn finish_phase(&self, ok: bool, success_phase: Phase) {
        let mut state = self.state.write().expect("action state lock poisoned");
        state.phase = if ok { success_phase } else { Phase::Failed };
    }

    fn parse_body(
        &self,
        ctx: &ParseContext,
        factory: &dyn ActionFactory,
        info: &ActionInfo,
        definition: Option<&Value>,
    ) -> bool {
        let typed: Option<K::Def> = match definition {
            None | Some(Value::Null) => None,
            Some(Value::String(text)) if text.trim().is_empty() => None,
            Some(Value::String(text)) => match serde_json::from_str::<K::Def>(text) {
                Ok(def) => Some(def),
                Err(err) => {
                    ctx.log_error(&format!(
                        "Parse failure deserializing JSON text into [{}] for {}: {err}",
                        short_type_name::<K::Def>(),
                        info.obj_text()
                    ));
                    return false;
                }
            },
            Some(value) => match serde_json::from_value::<K::Def>(value.clone()) {
                Ok(def) => Some(def),
                Err(err) => {
                    ctx.log_error(&format!(
                        "Parse failure deserializing definition into [{}] for {}: {err}",
                        short_type_name::<K::Def>(),
                        info.obj_text()
                    ));
                    return false;
                }
            },
        };

        match (self.kind.definition_mode(), typed.is_some()) {
            (DefinitionMode::Required, false) => {
                ctx.log_error(&format!(
                    "Actions of type [{}] require a definition object of type [{}]. No definition was supplied for {}",
                    self.kind.type_name(),
                    short_type_name::<K::Def>(),
                    info.obj_text()
                ));
                return false;
            }
            (DefinitionMode::Forbidden, true) => {
                ctx.log_error(&format!(
                    "Actions of type [{}] require no action definition, but a definition of type [{}] was supplied for {}",
                    self.kind.type_name(),
                    short_type_name::<K::Def>(),
                    info.obj_text()
                ));
                return false;
            }
            _ => {}
        }

        let typed = match typed {
            Some(mut def) => {
                if !def.validate_and_normalize(ctx) {
                    return false;
                }
                Some(def)
            }
            None => None,
        };

        ctx.push_error_intro(format!(
            "Actions of type [{}] require a definition object of type [{}]. One was supplied for {}, but it contained the following errors:",
            self.kind.type_name(),
            short_type_name::<K::Def>(),
            info.obj_text()
        ));
        let ok = self.kind.process_definition(ctx, factory, info, typed);
        ctx.pop_error_intro();
        ok
    }
}

#[async_trait]
impl<K: ActionKind> Action for ActionOp<K> {
    fn action_type(&self) -> &str {
        self.kind.type_name()
    }

    fn tag(&self) -> Option<String> {
        self.state
            .read()
            .expect("action state lock poisoned")
            .tag
            .clone()
    }

    fn is_valid(&self) -> bool {
        !matches!(self.phase(), Phase::Unparsed | Phase::Failed)
    }

    fn parse_and_process_definition(
        &self,
        ctx: &ParseContext,
        factory: &dyn ActionFactory,
        tag: &str,
        definition: Option<&Value>,
    ) -> Result<bool, LifecycleError> {
        lifecycle::check_operation(self.phase(), ContextActivity::Parse)?;

        if tag.trim().is_empty() {
            ctx.log_error(&format!(
                "All actions of type [{}] must contain have a non-empty tag",
                self.kind.type_name()
            ));
            return Ok(false);
        }

        ctx.on_action_start(ContextActivity::Parse, tag);
        self.state
            .write()
            .expect("action state lock poisoned")
            .tag = Some(tag.to_string());

        let info = self.info();
        let ok = self.parse_body(ctx, factory, &info, definition);

        self.finish_phase(ok, Phase::Parsed);
        ctx.on_action_end();

        Ok(ok)
    }

    fn expand_definition(
        &self,
        ctx: &ParseContext,
        store: &dyn ActionFetcher,
    ) -> Result<bool, LifecycleError> {
        lifecycle::check_operation(self.phase(), ContextActivity::Expand)?;

        let info = self.info();
        ctx.on_action_start(ContextActivity::Expand, &info.tag);
        let ok = self.kind.expand(ctx, store, &info);
        self.finish_phase(ok, Phase::Expanded);
        ctx.on_action_end();

        Ok(ok)
    }

    fn validate(
        &self,
        ctx: &ParseContext,
        params: Option<&TransformMap>,
    ) -> Result<bool, LifecycleError> {
        lifecycle::check_operation(self.phase(), ContextActivity::Validate)?;

        let info = self.info();
        ctx.on_action_start(ContextActivity::Validate, &info.tag);

        let mut result = true;
        let mut missing: Vec<&str> = self.kind.required_params().to_vec();

        if let Some(params) = params {
            for name in params.keys() {
                if name.trim().is_empty() {
                    ctx.log_error("parameter names must be non-empty");
                    result = false;
                }
                missing.retain(|required| *required != name.as_str());
            }
        }

        result = self.kind.process_validation(ctx, &info, &missing) && result;

        self.finish_phase(result, Phase::Validated);
        ctx.on_action_end();

        Ok(result)
    }

    async fn execute(
        &self,
        ctx: &ExecuteContext,
        action_ref: &ActionRef,
        model: &mut Value,
    ) -> Result<ExecuteResult, ActionError> {
        lifecycle::check_operation(self.phase(), ContextActivity::Execute)?;

        let info = self.info();
        ctx.on_action_start(&info.tag);
        ctx.log_verbose(&match action_ref.description.as_deref() {
            Some(description) if !description.trim().is_empty() => {
                format!("Executing {}: {description}", info.obj_text())
            }
            _ => format!("Executing {}", info.obj_text()),
        });

        let (should_continue, result_model) = self
            .kind
            .execute_internal(ctx, &info, action_ref, model)
            .await?;

        if let Some(result_model) = result_model {
            if let Some(transform) = action_ref.result_transform.as_ref() {
                if !transform.is_empty() {
                    self.manipulator
                        .merge_into(ctx, &result_model, model, transform)?;
                }
            }
        }

        ctx.on_action_end();

        Ok(ExecuteResult::new(should_continue))
    }
}

/// Merge the model through a reference's argument transform and bind it into
/// the kind's typed argument struct, validating it before use.
pub(crate) fn extract_args<T>(
    ctx: &ExecuteContext,
    manipulator: &ModelManipulator,
    info: &ActionInfo,
    action_ref: &ActionRef,
    model: &Value,
) -> Result<T, ActionError>
where
    T: DeserializeOwned + Validatable,
{
    let merged = manipulator.merge_new(ctx, Some(model), action_ref.arg_transform.as_ref())?;

    let mut args: T = match manipulator.transform_to(&merged) {
        Ok(args) => args,
        Err(err) => {
            ctx.log_error(&format!(
                "failed to bind arguments for {}: {err}",
                info.obj_text()
            ));
            return Err(args_error(ctx, info));
        }
    };

    if !args.validate_and_normalize(ctx) {
        return Err(args_error(ctx, info));
    }

    Ok(args)
}

fn args_error(ctx: &ExecuteContext, info: &ActionInfo) -> ActionError {
    ActionError::ExecuteValidation(format!(
        "Errors found validating arguments for {} [tag: {}]",
        info.obj_text(),
        ctx.tag()
    ))
}

/// Cooperative cancellation check used at every suspension point.
pub(crate) fn check_cancelled(ctx: &ExecuteContext) -> Result<(), ActionError> {
    if ctx.is_cancelled() {
        Err(ActionError::Cancelled)
    } else {
        Ok(())
    }
}

fn short_type_name<T>() -> &'static str {
    let full = type_name::<T>();
    full.rsplit("::").next().unwrap_or(full)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::FactoryError;
    use serde::Deserialize;
    use serde_json::json;

    // A definition with one required field, used to probe the base operator.
    #[derive(Debug, Clone, Deserialize)]
    struct ProbeDef {
        label: String,
        #[serde(default)]
        reject: bool,
    }

    impl Validatable for ProbeDef {
        fn validate_and_normalize(&mut self, ctx: &dyn Context) -> bool {
            if self.reject {
                ctx.log_error("probe definition rejected by validation");
                return false;
            }
            true
        }
    }

    #[derive(Default)]
    struct ProbeKind {
        mode_forbidden: bool,
        required: &'static [&'static str],
        stored: RwLock<Option<ProbeDef>>,
        result_model: Option<Value>,
        continue_result: bool,
    }

    impl ProbeKind {
        fn continuing() -> Self {
            Self {
                continue_result: true,
                ..Self::default()
            }
        }
    }

    #[async_trait]
    impl ActionKind for ProbeKind {
        type Def = ProbeDef;

        fn type_name(&self) -> &'static str {
            "PROBE"
        }

        fn definition_mode(&self) -> DefinitionMode {
            if self.mode_forbidden {
                DefinitionMode::Forbidden
            } else {
                DefinitionMode::Required
            }
        }

        fn required_params(&self) -> &'static [&'static str] {
            self.required
        }

        fn process_definition(
            &self,
            _ctx: &ParseContext,
            _factory: &dyn ActionFactory,
            _info: &ActionInfo,
            definition: Option<Self::Def>,
        ) -> bool {
            *self.stored.write().unwrap() = definition;
            true
        }

        async fn execute_internal(
            &self,
            _ctx: &ExecuteContext,
            _info: &ActionInfo,
            _action_ref: &ActionRef,
            _model: &mut Value,
        ) -> Result<(bool, Option<Value>), ActionError> {
            Ok((self.continue_result, self.result_model.clone()))
        }
    }

    struct NoFactory;

    impl ActionFactory for NoFactory {
        fn create(&self, action_type: &str) -> Result<Box<dyn Action>, FactoryError> {
            Err(FactoryError::UnknownType(action_type.to_string()))
        }
    }

    fn parse(
        op: &ActionOp<ProbeKind>,
        ctx: &ParseContext,
        tag: &str,
        definition: Option<&Value>,
    ) -> bool {
        op.parse_and_process_definition(ctx, &NoFactory, tag, definition)
            .unwrap()
    }

    // =========================================================================
    // Parse
    // =========================================================================

    #[test]
    fn test_parse_rejects_empty_tag_without_consuming_the_instance() {
        let op = ActionOp::new(ProbeKind::continuing());
        let ctx = ParseContext::for_host("test");

        for tag in ["", "   "] {
            assert!(!parse(&op, &ctx, tag, Some(&json!({"label": "x"}))));
        }
        assert!(ctx.logs(None).contains("must contain have a non-empty tag"));
        assert!(!op.is_valid());
        assert!(op.tag().is_none());

        // the instance is still unparsed and may be parsed with a good tag
        assert!(parse(&op, &ctx, "good", Some(&json!({"label": "x"}))));
        assert!(op.is_valid());
    }

    #[test]
    fn test_parse_sets_tag_and_phase() {
        let op = ActionOp::new(ProbeKind::continuing());
        let ctx = ParseContext::for_host("test");
        assert!(parse(&op, &ctx, "MyTag", Some(&json!({"label": "x"}))));
        assert_eq!(op.tag().as_deref(), Some("MyTag"));
        assert!(op.is_valid());
        assert_eq!(op.kind().stored.read().unwrap().as_ref().unwrap().label, "x");
    }

    #[test]
    fn test_second_parse_is_a_contract_violation() {
        let op = ActionOp::new(ProbeKind::continuing());
        let ctx = ParseContext::for_host("test");
        assert!(parse(&op, &ctx, "tag", Some(&json!({"label": "x"}))));

        let err = op
            .parse_and_process_definition(&ctx, &NoFactory, "tag2", None)
            .unwrap_err();
        assert_eq!(err.activity, ContextActivity::Parse);
    }

    #[test]
    fn test_parse_requires_definition_when_required() {
        let op = ActionOp::new(ProbeKind::continuing());
        let ctx = ParseContext::for_host("test");
        assert!(!parse(&op, &ctx, "tag", None));
        assert!(ctx
            .logs(None)
            .contains("require a definition object of type [ProbeDef]"));
        assert!(!op.is_valid());
    }

    #[test]
    fn test_parse_forbids_definition_when_forbidden() {
        let op = ActionOp::new(ProbeKind {
            mode_forbidden: true,
            continue_result: true,
            ..ProbeKind::default()
        });
        let ctx = ParseContext::for_host("test");
        assert!(!parse(&op, &ctx, "tag", Some(&json!({"label": "x"}))));
        assert!(ctx
            .logs(None)
            .contains("require no action definition, but a definition of type"));
    }

    #[test]
    fn test_parse_accepts_absent_definition_when_forbidden() {
        let op = ActionOp::new(ProbeKind {
            mode_forbidden: true,
            continue_result: true,
            ..ProbeKind::default()
        });
        let ctx = ParseContext::for_host("test");
        assert!(parse(&op, &ctx, "tag", None));
        assert!(op.is_valid());
    }

    #[test]
    fn test_parse_accepts_json_text_definition() {
        let op = ActionOp::new(ProbeKind::continuing());
        let ctx = ParseContext::for_host("test");
        let def = json!("{\"label\": \"from text\"}");
        assert!(parse(&op, &ctx, "tag", Some(&def)));
        assert_eq!(
            op.kind().stored.read().unwrap().as_ref().unwrap().label,
            "from text"
        );
    }

    #[test]
    fn test_parse_treats_blank_text_definition_as_absent() {
        let op = ActionOp::new(ProbeKind::continuing());
        let ctx = ParseContext::for_host("test");
        let def = json!("   ");
        assert!(!parse(&op, &ctx, "tag", Some(&def)));
        assert!(ctx.logs(None).contains("No definition was supplied"));
    }

    #[test]
    fn test_parse_ignores_unknown_properties() {
        let op = ActionOp::new(ProbeKind::continuing());
        let ctx = ParseContext::for_host("test");
        let def = json!({"label": "x", "unknown_extra": 42});
        assert!(parse(&op, &ctx, "tag", Some(&def)));
    }

    #[test]
    fn test_parse_reports_malformed_value_definition() {
        let op = ActionOp::new(ProbeKind::continuing());
        let ctx = ParseContext::for_host("test");
        let def = json!({"label": 17});
        assert!(!parse(&op, &ctx, "tag", Some(&def)));
        assert!(ctx
            .logs(None)
            .contains("Parse failure deserializing definition into [ProbeDef]"));
    }

    #[test]
    fn test_parse_reports_malformed_text_definition() {
        let op = ActionOp::new(ProbeKind::continuing());
        let ctx = ParseContext::for_host("test");
        let def = json!("{not json");
        assert!(!parse(&op, &ctx, "tag", Some(&def)));
        assert!(ctx
            .logs(None)
            .contains("Parse failure deserializing JSON text into [ProbeDef]"));
    }

    #[test]
    fn test_parse_fails_when_definition_validation_rejects() {
        let op = ActionOp::new(ProbeKind::continuing());
        let ctx = ParseContext::for_host("test");
        let def = json!({"label": "x", "reject": true});
        assert!(!parse(&op, &ctx, "tag", Some(&def)));
        assert!(!op.is_valid());
        assert!(ctx.logs(None).contains("probe definition rejected"));
    }

    // =========================================================================
    // Expand / validate
    // =========================================================================

    struct EmptyFetcher;

    impl ActionFetcher for EmptyFetcher {
        fn get_action(&self, _tag: &str) -> Option<std::sync::Arc<dyn Action>> {
            None
        }
    }

    #[test]
    fn test_expand_before_parse_is_a_contract_violation() {
        let op = ActionOp::new(ProbeKind::continuing());
        let ctx = ParseContext::for_host("test");
        assert!(op.expand_definition(&ctx, &EmptyFetcher).is_err());
    }

    #[test]
    fn test_expand_default_succeeds() {
        let op = ActionOp::new(ProbeKind::continuing());
        let ctx = ParseContext::for_host("test");
        assert!(parse(&op, &ctx, "tag", Some(&json!({"label": "x"}))));
        assert!(op.expand_definition(&ctx, &EmptyFetcher).unwrap());
    }

    #[test]
    fn test_validate_reports_missing_required_params_in_declaration_order() {
        let op = ActionOp::new(ProbeKind {
            required: &["collection", "data_row_property_name"],
            continue_result: true,
            ..ProbeKind::default()
        });
        let ctx = ParseContext::for_host("test");
        assert!(parse(&op, &ctx, "tag", Some(&json!({"label": "x"}))));
        assert!(op.expand_definition(&ctx, &EmptyFetcher).unwrap());

        assert!(!op.validate(&ctx, None).unwrap());
        assert!(ctx.logs(None).contains(
            "the following required parameters are not specified: collection, data_row_property_name"
        ));
        assert!(!op.is_valid());
    }

    #[test]
    fn test_validate_accepts_supplied_required_params() {
        let op = ActionOp::new(ProbeKind {
            required: &["collection"],
            continue_result: true,
            ..ProbeKind::default()
        });
        let ctx = ParseContext::for_host("test");
        assert!(parse(&op, &ctx, "tag", Some(&json!({"label": "x"}))));
        assert!(op.expand_definition(&ctx, &EmptyFetcher).unwrap());

        let params: TransformMap = [(
            "collection".to_string(),
            runbook_model::ModelValue::select("$.rows"),
        )]
        .into();
        assert!(op.validate(&ctx, Some(&params)).unwrap());
        assert!(op.is_valid());
    }

    #[test]
    fn test_validate_rejects_empty_parameter_names() {
        let op = ActionOp::new(ProbeKind::continuing());
        let ctx = ParseContext::for_host("test");
        assert!(parse(&op, &ctx, "tag", Some(&json!({"label": "x"}))));
        assert!(op.expand_definition(&ctx, &EmptyFetcher).unwrap());

        let params: TransformMap = [(
            " ".to_string(),
            runbook_model::ModelValue::constant(json!(1)),
        )]
        .into();
        assert!(!op.validate(&ctx, Some(&params)).unwrap());
        assert!(ctx.logs(None).contains("parameter names must be non-empty"));
    }

    // =========================================================================
    // Execute
    // =========================================================================

    fn ready_op(kind: ProbeKind) -> ActionOp<ProbeKind> {
        let op = ActionOp::new(kind);
        let ctx = ParseContext::for_host("test");
        assert!(parse(&op, &ctx, "tag", Some(&json!({"label": "x"}))));
        assert!(op.expand_definition(&ctx, &EmptyFetcher).unwrap());
        assert!(op.validate(&ctx, None).unwrap());
        op
    }

    #[tokio::test]
    async fn test_execute_before_parse_is_a_contract_violation() {
        let op = ActionOp::new(ProbeKind::continuing());
        let ctx = ExecuteContext::for_host("test");
        let mut model = json!({});
        let err = op
            .execute(&ctx, &ActionRef::default(), &mut model)
            .await
            .unwrap_err();
        assert!(matches!(err, ActionError::Lifecycle(_)));
    }

    #[tokio::test]
    async fn test_execute_returns_continue_flag() {
        let op = ready_op(ProbeKind::continuing());
        let ctx = ExecuteContext::for_host("test");
        let mut model = json!({});
        let result = op
            .execute(&ctx, &ActionRef::default(), &mut model)
            .await
            .unwrap();
        assert!(result.should_continue);
    }

    #[tokio::test]
    async fn test_execute_logs_reference_description_verbose() {
        let op = ready_op(ProbeKind::continuing());
        let ctx = ExecuteContext::for_host("test");
        let mut model = json!({});
        let action_ref = ActionRef {
            description: Some("nightly sweep".to_string()),
            ..ActionRef::default()
        };
        op.execute(&ctx, &action_ref, &mut model).await.unwrap();

        let logs = ctx.logs(Some(runbook_model::EntryKind::Verbose));
        assert!(logs.contains("Executing action [PROBE] with tag [tag]: nightly sweep"));
    }

    #[tokio::test]
    async fn test_execute_merges_result_model_through_result_transform() {
        let op = ready_op(ProbeKind {
            continue_result: true,
            result_model: Some(json!({"produced": 7})),
            ..ProbeKind::default()
        });
        let ctx = ExecuteContext::for_host("test");
        let mut model = json!({"existing": true});
        let action_ref = ActionRef {
            result_transform: Some(
                [(
                    "out".to_string(),
                    runbook_model::ModelValue::select("$.produced"),
                )]
                .into(),
            ),
            ..ActionRef::default()
        };

        op.execute(&ctx, &action_ref, &mut model).await.unwrap();
        assert_eq!(model, json!({"existing": true, "out": 7}));
    }

    #[tokio::test]
    async fn test_execute_skips_merge_without_result_transform() {
        let op = ready_op(ProbeKind {
            continue_result: true,
            result_model: Some(json!({"produced": 7})),
            ..ProbeKind::default()
        });
        let ctx = ExecuteContext::for_host("test");
        let mut model = json!({"existing": true});

        op.execute(&ctx, &ActionRef::default(), &mut model)
            .await
            .unwrap();
        assert_eq!(model, json!({"existing": true}));
    }

    #[test]
    fn test_short_type_name_strips_path() {
        assert_eq!(short_type_name::<ProbeDef>(), "ProbeDef");
    }
}
