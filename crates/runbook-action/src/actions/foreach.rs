//! Looping composite action.
//!
//! Iterates a bound collection, binding each element into the model under a
//! configured property name, executing the inner action set once per
//! element, and folding the iterations' continue flags through a
//! configurable condition.

use std::sync::RwLock;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use runbook_model::{
    validate_transform_map, Context, ExecuteContext, MergeMode, ModelManipulator, ParseContext,
    TransformMap,
};

use crate::actions::set::{ActionSetDef, SetCore};
use crate::defs::{ActionRef, LoopResultCondition, ModelMode, Validatable};
use crate::error::ActionError;
use crate::factory::ActionFactory;
use crate::op::{
    check_cancelled, extract_args, report_missing_params, ActionInfo, ActionKind,
};
use crate::store::ActionFetcher;

pub const ACTION_TYPE: &str = "LOOP-DATASET";

/// Definition of a looping action set.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default, rename_all = "snake_case")]
pub struct ForeachActionSetDef {
    #[serde(flatten)]
    pub set: ActionSetDef,
    pub loop_model_mode: ModelMode,
    pub loop_model_transform: Option<TransformMap>,
    pub loop_result_transform: Option<TransformMap>,
    pub loop_result_condition: LoopResultCondition,
    pub return_not_continue_on_empty: bool,
}

impl Validatable for ForeachActionSetDef {}

/// Arguments bound through the reference's argument transform.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default, rename_all = "snake_case")]
struct ForeachArgs {
    collection: Option<Value>,
    data_row_property_name: String,
    collection_item_key_property_name: Option<String>,
}

impl Validatable for ForeachArgs {
    fn validate_and_normalize(&mut self, ctx: &dyn Context) -> bool {
        self.data_row_property_name = self.data_row_property_name.trim().to_string();
        self.collection_item_key_property_name = self
            .collection_item_key_property_name
            .take()
            .map(|name| name.trim().to_string())
            .filter(|name| !name.is_empty());

        if self.data_row_property_name.is_empty() {
            ctx.log_error("must specify a non-empty data_row_property_name");
            return false;
        }

        true
    }
}

#[derive(Debug, Clone, Default)]
struct LoopConfig {
    use_loop_model: bool,
    loop_model_transform: Option<TransformMap>,
    loop_result_transform: Option<TransformMap>,
    loop_result_condition: LoopResultCondition,
    return_not_continue_on_empty: bool,
}

/// The looping composite.
pub struct ForeachActionSet {
    core: SetCore,
    manipulator: ModelManipulator,
    config: RwLock<LoopConfig>,
}

impl ForeachActionSet {
    pub fn new() -> Self {
        Self {
            core: SetCore::new(),
            manipulator: ModelManipulator::new(),
            config: RwLock::new(LoopConfig::default()),
        }
    }

    async fn execute_iteration(
        &self,
        ctx: &ExecuteContext,
        info: &ActionInfo,
        args: &ForeachArgs,
        config: &LoopConfig,
        item: Value,
        set_model: &mut Value,
        index: usize,
    ) -> Result<bool, ActionError> {
        let key = match args.collection_item_key_property_name.as_deref() {
            Some(property) => self
                .manipulator
                .try_extract_value(&item, property)?
                .and_then(key_text),
            None => None,
        };

        let iteration_tag = match key {
            Some(key) => format!("{}['{}']", info.tag, key),
            None => format!("{}[{}]", info.tag, index),
        };
        ctx.on_action_update(&iteration_tag);
        ctx.log(&format!("Processing loop item [{iteration_tag}]"));

        let result_transform = config
            .loop_result_transform
            .as_ref()
            .filter(|transform| !transform.is_empty());

        if config.use_loop_model {
            // fresh per-iteration model scoped to this element; it is
            // discarded afterwards, so the data-row binding dies with it
            let mut loop_model = self.manipulator.merge_new(
                ctx,
                Some(&*set_model),
                config.loop_model_transform.as_ref(),
            )?;
            self.manipulator.add_submodel(
                ctx,
                &mut loop_model,
                &args.data_row_property_name,
                item,
                MergeMode::ReplaceExisting,
            )?;

            let should_continue = self.core.execute_children(ctx, &mut loop_model).await?;

            if let Some(transform) = result_transform {
                self.manipulator
                    .merge_into(ctx, &loop_model, set_model, transform)?;
            }

            Ok(should_continue)
        } else {
            self.manipulator.add_submodel(
                ctx,
                set_model,
                &args.data_row_property_name,
                item,
                MergeMode::ReplaceExisting,
            )?;

            let run = self.core.execute_children(ctx, set_model).await;

            let result = match run {
                Ok(should_continue) => {
                    if let Some(transform) = result_transform {
                        // write-back before the data row is unbound so the
                        // transform can still extract it
                        let snapshot = set_model.clone();
                        self.manipulator
                            .merge_into(ctx, &snapshot, set_model, transform)?;
                    }
                    Ok(should_continue)
                }
                Err(err) => Err(err),
            };

            // unbind the data row on success and failure paths alike
            let _ = self
                .manipulator
                .remove_submodel(set_model, &args.data_row_property_name);

            result
        }
    }
}

impl Default for ForeachActionSet {
    fn default() -> Self {
        Self::new()
    }
}

fn key_text(value: Value) -> Option<String> {
    match value {
        Value::String(text) if !text.trim().is_empty() => Some(text),
        Value::Number(number) => Some(number.to_string()),
        _ => None,
    }
}

#[async_trait]
impl ActionKind for ForeachActionSet {
    type Def = ForeachActionSetDef;

    fn type_name(&self) -> &'static str {
        ACTION_TYPE
    }

    fn required_params(&self) -> &'static [&'static str] {
        &["data_row_property_name", "collection"]
    }

    fn process_definition(
        &self,
        ctx: &ParseContext,
        factory: &dyn ActionFactory,
        info: &ActionInfo,
        definition: Option<Self::Def>,
    ) -> bool {
        let Some(def) = definition else {
            return false;
        };

        let mut ok = self.core.parse_definition(ctx, factory, info, &def.set);
        ok = validate_transform_map(ctx, def.loop_model_transform.as_ref()) && ok;
        ok = validate_transform_map(ctx, def.loop_result_transform.as_ref()) && ok;

        let mut config = self.config.write().expect("loop config lock poisoned");

        match def.loop_model_mode {
            ModelMode::Local => {
                config.use_loop_model = true;
                config.loop_model_transform = def.loop_model_transform.clone();
            }
            ModelMode::Input => {
                if def.loop_model_transform.is_some() {
                    ctx.log_error(
                        "loop model mode is input, but a local loop model transform was found",
                    );
                    ok = false;
                }
                config.use_loop_model = false;
            }
        }

        config.loop_result_transform = def.loop_result_transform.clone();
        config.loop_result_condition = def.loop_result_condition;
        config.return_not_continue_on_empty = def.return_not_continue_on_empty;

        ok
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
        info: &ActionInfo,
        action_ref: &ActionRef,
        model: &mut Value,
    ) -> Result<(bool, Option<Value>), ActionError> {
        let args: ForeachArgs = extract_args(ctx, &self.manipulator, info, action_ref, model)?;
        let config = self.config.read().expect("loop config lock poisoned").clone();

        let mut scoped = self.core.local_model(ctx, model)?;
        let set_model = scoped.as_mut().unwrap_or(model);

        let mut count_continue = 0usize;
        let mut total = 0usize;

        if let Some(collection) = &args.collection {
            ctx.log("Beginning iteration over object collection");

            for item in self.manipulator.to_enumerable(collection) {
                check_cancelled(ctx)?;

                let iteration_continue = self
                    .execute_iteration(ctx, info, &args, &config, item, set_model, total)
                    .await?;

                total += 1;
                if iteration_continue {
                    count_continue += 1;
                }
            }

            ctx.log(&format!(
                "Iteration over object collection completed: {count_continue} of {total} iterations reported continue"
            ));
        }

        let result = if total == 0 {
            !config.return_not_continue_on_empty
        } else {
            match config.loop_result_condition {
                LoopResultCondition::AlwaysTrue => true,
                LoopResultCondition::FalseIfAny => count_continue == total,
                LoopResultCondition::FalseIfAll => count_continue > 0,
            }
        };

        let result_model = action_ref
            .has_result_transform()
            .then(|| set_model.clone());

        Ok((result, result_model))
    }
}
