//! Declarative transform entries.
//!
//! A transform map pairs destination property names with `ModelValue`
//! entries describing where the value comes from (a selector, a collection
//! selector, or a constant) and how it lands in the destination (replace or
//! array merge).

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::context::Context;
use crate::path;

/// How a value is combined with an existing destination property.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MergeMode {
    /// Overwrite whatever is present.
    #[default]
    ReplaceExisting,
    /// Force the destination to an array and append the value as one element.
    ArrayAdd,
    /// Force the destination to an array and append the value's elements.
    ArrayUnion,
}

/// One entry of a transform map.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "snake_case")]
pub struct ModelValue {
    /// Selector evaluated against the source model.
    pub select: Option<String>,
    /// Selector whose result is coerced to a collection.
    pub select_many: Option<String>,
    /// Constant fallback (or sole value when no selector is given).
    #[serde(rename = "const")]
    pub const_value: Option<Value>,
    /// Merge behavior at the destination.
    pub mode: MergeMode,
}

impl ModelValue {
    /// Entry selecting a path from the source model.
    pub fn select(path: impl Into<String>) -> Self {
        Self {
            select: Some(path.into()),
            ..Self::default()
        }
    }

    /// Entry carrying a constant.
    pub fn constant(value: Value) -> Self {
        Self {
            const_value: Some(value),
            ..Self::default()
        }
    }

    pub fn with_mode(mut self, mode: MergeMode) -> Self {
        self.mode = mode;
        self
    }
}

/// Map from destination property name to transform entry.
pub type TransformMap = BTreeMap<String, ModelValue>;

/// Validate a transform map at parse time: destination names must be
/// non-empty, selectors must parse, and `select`/`select_many` are mutually
/// exclusive. Errors are logged to the context; returns false when any entry
/// is bad.
pub fn validate_transform_map(ctx: &dyn Context, map: Option<&TransformMap>) -> bool {
    let Some(map) = map else {
        return true;
    };

    let mut result = true;

    for (name, entry) in map {
        if name.trim().is_empty() {
            ctx.log_error("transform destination names must be non-empty");
            result = false;
        }

        if entry.select.is_some() && entry.select_many.is_some() {
            ctx.log_error(&format!(
                "transform entry [{name}] may specify select or select_many, not both"
            ));
            result = false;
        }

        for selector in [entry.select.as_deref(), entry.select_many.as_deref()]
            .into_iter()
            .flatten()
        {
            if let Err(err) = path::parse(selector) {
                ctx.log_error(&format!("transform entry [{name}]: {err}"));
                result = false;
            }
        }
    }

    result
}
