//! Configuration-facing definition types.
//!
//! An `ActionDef` names an action type and tag and carries that action's raw
//! definition payload. An `ActionRef` is one invocation site inside a
//! composite: either a tag resolved against the store or an inline
//! definition, plus the argument and result transforms binding the action to
//! the model.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use runbook_model::{Context, TransformMap};

/// A raw action definition as authored in configuration. `def` may be a
/// structured JSON value or a string containing JSON text.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct ActionDef {
    pub tag: String,
    #[serde(rename = "type")]
    pub action_type: String,
    #[serde(default)]
    pub def: Option<Value>,
}

/// One invocation site within a composite action.
///
/// Exactly one of `tag` and `inline` must be populated; the composite
/// reports a configuration error otherwise. `execution_order` sorts siblings
/// ascending, with declaration order breaking ties.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default, rename_all = "snake_case")]
pub struct ActionRef {
    pub tag: Option<String>,
    pub inline: Option<ActionDef>,
    pub execution_order: i64,
    pub description: Option<String>,
    pub arg_transform: Option<TransformMap>,
    pub result_transform: Option<TransformMap>,
}

impl ActionRef {
    /// Reference to a stored action by tag.
    pub fn for_tag(tag: impl Into<String>) -> Self {
        Self {
            tag: Some(tag.into()),
            ..Self::default()
        }
    }

    /// The name this reference resolves through, for diagnostics.
    pub fn display_name(&self) -> &str {
        self.tag
            .as_deref()
            .or(self.inline.as_ref().map(|def| def.tag.as_str()))
            .unwrap_or("<unbound>")
    }

    /// True when the reference carries a non-empty result transform.
    pub fn has_result_transform(&self) -> bool {
        self.result_transform
            .as_ref()
            .is_some_and(|transform| !transform.is_empty())
    }
}

/// Result of executing an action: whether the enclosing action set should
/// continue with subsequent actions.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExecuteResult {
    pub should_continue: bool,
}

impl ExecuteResult {
    pub fn new(should_continue: bool) -> Self {
        Self { should_continue }
    }
}

/// Whether a composite builds a scoped local model or works directly on the
/// model handed to it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ModelMode {
    #[default]
    Input,
    Local,
}

/// How a loop folds its iterations' continue flags into one result.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LoopResultCondition {
    #[default]
    AlwaysTrue,
    FalseIfAll,
    FalseIfAny,
}

/// Semantic validation hook for parsed definitions and bound argument
/// structs. Implementations log specifics to the context and return false on
/// failure; the default accepts everything.
pub trait Validatable {
    fn validate_and_normalize(&mut self, _ctx: &dyn Context) -> bool {
        true
    }
}

impl Validatable for Value {}
