//! Constant-model leaf action.
//!
//! Carries a literal JSON value as its definition and surfaces it as the
//! result model, letting configuration inject constants into the ambient
//! model through the reference's result transform.

use std::sync::RwLock;

use async_trait::async_trait;
use serde_json::Value;

use runbook_model::{ExecuteContext, ParseContext};

use crate::defs::ActionRef;
use crate::error::ActionError;
use crate::factory::ActionFactory;
use crate::op::{ActionInfo, ActionKind};

pub const ACTION_TYPE: &str = "MODELBUILD-CONST";

/// Leaf that produces a configured literal value. No external effect.
pub struct ConstModelAction {
    value: RwLock<Value>,
}

impl ConstModelAction {
    pub fn new() -> Self {
        Self {
            value: RwLock::new(Value::Null),
        }
    }
}

impl Default for ConstModelAction {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ActionKind for ConstModelAction {
    type Def = Value;

    fn type_name(&self) -> &'static str {
        ACTION_TYPE
    }

    fn process_definition(
        &self,
        _ctx: &ParseContext,
        _factory: &dyn ActionFactory,
        _info: &ActionInfo,
        definition: Option<Self::Def>,
    ) -> bool {
        match definition {
            Some(value) => {
                *self.value.write().expect("const value lock poisoned") = value;
                true
            }
            None => false,
        }
    }

    async fn execute_internal(
        &self,
        _ctx: &ExecuteContext,
        _info: &ActionInfo,
        _action_ref: &ActionRef,
        _model: &mut Value,
    ) -> Result<(bool, Option<Value>), ActionError> {
        let value = self.value.read().expect("const value lock poisoned").clone();
        Ok((true, Some(value)))
    }
}
