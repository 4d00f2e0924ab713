//! Sequential composite action.
//!
//! An action set holds an ordered list of child references. Inline children
//! are parsed through the factory at parse time; tag references resolve
//! against the store at expand time. Children execute strictly by ascending
//! execution order (declaration order breaking ties), and a child reporting
//! not-continue short-circuits the rest.

use std::sync::{Arc, RwLock};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use runbook_model::{
    validate_transform_map, Context, ExecuteContext, ModelManipulator, ParseContext, TransformMap,
};

use crate::defs::{ActionRef, ModelMode, Validatable};
use crate::error::ActionError;
use crate::factory::ActionFactory;
use crate::op::{
    check_cancelled, report_missing_params, Action, ActionInfo, ActionKind,
};
use crate::store::ActionFetcher;

pub const ACTION_TYPE: &str = "ACTION-SET";

/// Definition of a sequential action set.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default, rename_all = "snake_case")]
pub struct ActionSetDef {
    pub actions: Vec<ActionRef>,
    pub local_model_mode: ModelMode,
    pub local_model_transform: Option<TransformMap>,
}

impl Validatable for ActionSetDef {}

/// One child of a composite: the reference as authored plus the resolved
/// action (set at parse time for inline children, at expand time for tag
/// references).
#[derive(Clone)]
pub(crate) struct ChildSlot {
    pub action_ref: Arc<ActionRef>,
    pub action: Option<Arc<dyn Action>>,
}

#[derive(Default)]
struct CoreState {
    children: Vec<ChildSlot>,
    local_model_mode: ModelMode,
    local_model_transform: Option<TransformMap>,
}

/// Shared machinery of the composite actions: child parsing, reference
/// expansion, child validation, scoped-model construction, and ordered
/// execution.
pub(crate) struct SetCore {
    manipulator: ModelManipulator,
    state: RwLock<CoreState>,
}

impl SetCore {
    pub fn new() -> Self {
        Self {
            manipulator: ModelManipulator::new(),
            state: RwLock::new(CoreState::default()),
        }
    }

    pub fn parse_definition(
        &self,
        ctx: &ParseContext,
        factory: &dyn ActionFactory,
        info: &ActionInfo,
        def: &ActionSetDef,
    ) -> bool {
        let mut ok = validate_transform_map(ctx, def.local_model_transform.as_ref());

        // sort by execution order, declaration order breaking ties
        let mut ordered: Vec<(usize, &ActionRef)> = def.actions.iter().enumerate().collect();
        ordered.sort_by_key(|(index, action_ref)| (action_ref.execution_order, *index));

        let mut children = Vec::with_capacity(ordered.len());

        for (_, action_ref) in ordered {
            match (&action_ref.tag, &action_ref.inline) {
                (Some(_), Some(_)) | (None, None) => {
                    ctx.log_error(&format!(
                        "an action reference in {} must specify exactly one of tag or inline",
                        info.obj_text()
                    ));
                    ok = false;
                }
                (Some(_), None) => children.push(ChildSlot {
                    action_ref: Arc::new(action_ref.clone()),
                    action: None,
                }),
                (None, Some(inline)) => match factory.create(&inline.action_type) {
                    Err(err) => {
                        ctx.log_error(&err.to_string());
                        ok = false;
                    }
                    Ok(action) => {
                        let action: Arc<dyn Action> = Arc::from(action);
                        match action.parse_and_process_definition(
                            ctx,
                            factory,
                            &inline.tag,
                            inline.def.as_ref(),
                        ) {
                            Ok(true) => children.push(ChildSlot {
                                action_ref: Arc::new(action_ref.clone()),
                                action: Some(action),
                            }),
                            Ok(false) => ok = false,
                            Err(err) => {
                                ctx.log_error(&err.to_string());
                                ok = false;
                            }
                        }
                    }
                },
            }
        }

        let mut state = self.state.write().expect("set state lock poisoned");
        state.children = children;
        state.local_model_mode = def.local_model_mode;
        state.local_model_transform = def.local_model_transform.clone();

        ok
    }

    /// Resolve tag references (always re-resolved, so a store update is
    /// picked up on re-expansion) and expand every child.
    pub fn expand(&self, ctx: &ParseContext, store: &dyn ActionFetcher, info: &ActionInfo) -> bool {
        let mut ok = true;
        let mut slots = self
            .state
            .read()
            .expect("set state lock poisoned")
            .children
            .clone();

        for slot in &mut slots {
            if let Some(tag) = slot.action_ref.tag.as_deref() {
                match store.get_action(tag) {
                    Some(action) => slot.action = Some(action),
                    None => {
                        ctx.log_error(&format!(
                            "Unable to find referenced action [{tag}] for {}",
                            info.obj_text()
                        ));
                        ok = false;
                        continue;
                    }
                }
            }

            if let Some(action) = &slot.action {
                match action.expand_definition(ctx, store) {
                    Ok(true) => {}
                    Ok(false) => ok = false,
                    Err(err) => {
                        ctx.log_error(&err.to_string());
                        ok = false;
                    }
                }
            }
        }

        self.state.write().expect("set state lock poisoned").children = slots;
        ok
    }

    /// Delegate validation to every child with that child's own argument
    /// transform.
    pub fn validate_children(&self, ctx: &ParseContext) -> bool {
        let slots = self
            .state
            .read()
            .expect("set state lock poisoned")
            .children
            .clone();

        let mut ok = true;
        for slot in slots {
            match &slot.action {
                Some(action) => {
                    match action.validate(ctx, slot.action_ref.arg_transform.as_ref()) {
                        Ok(result) => ok = result && ok,
                        Err(err) => {
                            ctx.log_error(&err.to_string());
                            ok = false;
                        }
                    }
                }
                None => {
                    ctx.log_error(&format!(
                        "action reference [{}] has not been resolved",
                        slot.action_ref.display_name()
                    ));
                    ok = false;
                }
            }
        }
        ok
    }

    /// Build the set-scoped local model, or `None` to run against the model
    /// handed in.
    pub fn local_model(
        &self,
        ctx: &ExecuteContext,
        model: &Value,
    ) -> Result<Option<Value>, ActionError> {
        let (mode, transform) = {
            let state = self.state.read().expect("set state lock poisoned");
            (state.local_model_mode, state.local_model_transform.clone())
        };

        Ok(match mode {
            ModelMode::Local => Some(self.manipulator.merge_new(ctx, Some(model), transform.as_ref())?),
            ModelMode::Input => None,
        })
    }

    /// Execute the children in order against `model`, stopping at the first
    /// child that reports not-continue.
    pub async fn execute_children(
        &self,
        ctx: &ExecuteContext,
        model: &mut Value,
    ) -> Result<bool, ActionError> {
        let slots = self
            .state
            .read()
            .expect("set state lock poisoned")
            .children
            .clone();

        for slot in slots {
            check_cancelled(ctx)?;

            let action = slot.action.as_ref().ok_or_else(|| {
                ActionError::execution(
                    format!(
                        "action reference [{}] was never resolved",
                        slot.action_ref.display_name()
                    ),
                    true,
                )
            })?;

            let result = action.execute(ctx, &slot.action_ref, model).await?;
            if !result.should_continue {
                return Ok(false);
            }
        }

        Ok(true)
    }

    #[cfg(test)]
    pub fn child_count(&self) -> usize {
        self.state
            .read()
            .expect("set state lock poisoned")
            .children
            .len()
    }
}

/// The sequential composite.
pub struct ActionSet {
    core: SetCore,
}

impl ActionSet {
    pub fn new() -> Self {
        Self {
            core: SetCore::new(),
        }
    }
}

impl Default for ActionSet {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ActionKind for ActionSet {
    type Def = ActionSetDef;

    fn type_name(&self) -> &'static str {
        ACTION_TYPE
    }

    fn process_definition(
        &self,
        ctx: &ParseContext,
        factory: &dyn ActionFactory,
        info: &ActionInfo,
        definition: Option<Self::Def>,
    ) -> bool {
        match definition {
            Some(def) => self.core.parse_definition(ctx, factory, info, &def),
            None => false,
        }
    }

    fn expand(&self, ctx: &ParseContext, store: &dyn ActionFetcher, info: &ActionInfo) -> bool {
        self.core.expand(ctx, store, info)
    }

    fn process_validation(&self, ctx: &ParseContext, _info: &ActionInfo, missing: &[&str]) -> bool {
        let missing_ok = report_missing_params(ctx, missing);
        self.core.validate_children(ctx) && missing_ok
    }

    async fn execute_internal(
        &self,
        ctx: &ExecuteContext,
        _info: &ActionInfo,
        action_ref: &ActionRef,
        model: &mut Value,
    ) -> Result<(bool, Option<Value>), ActionError> {
        let mut local = self.core.local_model(ctx, model)?;
        let target = local.as_mut().unwrap_or(model);

        let should_continue = self.core.execute_children(ctx, target).await?;

        let result_model = action_ref
            .has_result_transform()
            .then(|| target.clone());

        Ok((should_continue, result_model))
    }
}
