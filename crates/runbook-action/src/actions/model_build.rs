//! Model-reshaping leaf action.
//!
//! Forbids a definition and performs no external effect: its result model is
//! the ambient model itself, so the reference's result transform becomes a
//! pure reshaping step.

use async_trait::async_trait;
use serde_json::Value;

use runbook_model::ExecuteContext;

use crate::defs::ActionRef;
use crate::error::ActionError;
use crate::op::{ActionInfo, ActionKind, DefinitionMode};

pub const ACTION_TYPE: &str = "MODELBUILD-TRANSFORM";

/// Leaf that reshapes the ambient model through the result transform.
#[derive(Debug, Clone, Copy, Default)]
pub struct ModelBuildAction;

impl ModelBuildAction {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl ActionKind for ModelBuildAction {
    type Def = Value;

    fn type_name(&self) -> &'static str {
        ACTION_TYPE
    }

    fn definition_mode(&self) -> DefinitionMode {
        DefinitionMode::Forbidden
    }

    async fn execute_internal(
        &self,
        _ctx: &ExecuteContext,
        _info: &ActionInfo,
        _action_ref: &ActionRef,
        model: &mut Value,
    ) -> Result<(bool, Option<Value>), ActionError> {
        Ok((true, Some(model.clone())))
    }
}
