//! The model manipulator.
//!
//! Every action reads and writes the schema-less model exclusively through
//! this type: struct⇄model transforms, declarative merges driven by a
//! transform map, scoped submodel binding, and single-value extraction.

use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::{Map, Value};

use crate::context::Context;
use crate::error::{value_kind, ModelError};
use crate::path::{self, Segment};
use crate::value::{MergeMode, ModelValue, TransformMap};

/// Stateless manipulator over JSON-backed models.
#[derive(Debug, Clone, Copy, Default)]
pub struct ModelManipulator;

impl ModelManipulator {
    pub fn new() -> Self {
        Self
    }

    /// A new empty model.
    pub fn create_empty(&self) -> Value {
        Value::Object(Map::new())
    }

    /// Transform a typed value into a model.
    pub fn transform_from<T: Serialize>(&self, source: &T) -> Result<Value, ModelError> {
        serde_json::to_value(source).map_err(Into::into)
    }

    /// Transform a model into a typed value.
    pub fn transform_to<T: DeserializeOwned>(&self, source: &Value) -> Result<T, ModelError> {
        serde_json::from_value(source.clone()).map_err(Into::into)
    }

    /// View a model value as a collection: arrays enumerate their elements,
    /// null is empty, anything else is a single-element collection.
    pub fn to_enumerable(&self, source: &Value) -> Vec<Value> {
        match source {
            Value::Array(items) => items.clone(),
            Value::Null => Vec::new(),
            other => vec![other.clone()],
        }
    }

    /// Evaluate a selector against the model. `Ok(None)` when the path does
    /// not resolve; `Err` only for malformed selectors.
    pub fn try_extract_value(
        &self,
        source: &Value,
        selector: &str,
    ) -> Result<Option<Value>, ModelError> {
        let segments = path::parse(selector)?;
        Ok(path::select(source, &segments).cloned())
    }

    /// Extract a typed value, falling back to `default` when the path does
    /// not resolve.
    pub fn extract_or<T: DeserializeOwned>(
        &self,
        source: &Value,
        selector: &str,
        default: T,
    ) -> Result<T, ModelError> {
        match self.try_extract_value(source, selector)? {
            Some(found) => serde_json::from_value(found).map_err(Into::into),
            None => Ok(default),
        }
    }

    /// Bind a submodel under `path_str` in the target model, creating
    /// intermediate objects as needed. Array modes force the destination to an
    /// array: an existing non-array value first becomes a single-element
    /// array, then the submodel is appended whole (`ArrayAdd`, or any
    /// non-array input) or element-by-element (`ArrayUnion`).
    pub fn add_submodel(
        &self,
        ctx: &dyn Context,
        target: &mut Value,
        path_str: &str,
        submodel: Value,
        mode: MergeMode,
    ) -> Result<(), ModelError> {
        let segments = names_only(path_str)?;
        let (container, leaf) = ensure_container(target, &segments, path_str)?;

        if mode == MergeMode::ReplaceExisting {
            if container.contains_key(&leaf) {
                ctx.log_verbose(&format!("overwriting property [{leaf}]"));
            } else {
                ctx.log_verbose(&format!("adding property [{leaf}]"));
            }
            container.insert(leaf, submodel);
            return Ok(());
        }

        let mut items = match container.remove(&leaf) {
            Some(Value::Array(items)) => {
                ctx.log_verbose(&format!("appending to existing array [{leaf}] for {mode:?}"));
                items
            }
            Some(Value::Null) | None => Vec::new(),
            Some(other) => {
                ctx.log_verbose(&format!(
                    "converting existing item to a single element array [{leaf}] for {mode:?}"
                ));
                vec![other]
            }
        };

        match submodel {
            Value::Array(elements) if mode == MergeMode::ArrayUnion => items.extend(elements),
            other => items.push(other),
        }

        container.insert(leaf, Value::Array(items));
        Ok(())
    }

    /// Remove the binding at `path_str`. A missing intermediate means the
    /// removal is already satisfied and is not an error.
    pub fn remove_submodel(&self, target: &mut Value, path_str: &str) -> Result<(), ModelError> {
        let segments = names_only(path_str)?;

        let mut current = match target.as_object_mut() {
            Some(map) => map,
            None => {
                return Err(ModelError::NotAnObject {
                    operation: "remove a submodel from".to_string(),
                    found: value_kind(target).to_string(),
                })
            }
        };

        for name in &segments[..segments.len() - 1] {
            current = match current.get_mut(name) {
                None => return Ok(()),
                Some(Value::Object(map)) => map,
                Some(other) => {
                    return Err(ModelError::NotAnObject {
                        operation: "remove a submodel from".to_string(),
                        found: value_kind(other).to_string(),
                    })
                }
            };
        }

        current.remove(&segments[segments.len() - 1]);
        Ok(())
    }

    /// Merge `source` into `target` through a transform map. Entries whose
    /// selector does not resolve fall back to their constant, or are skipped
    /// when no constant exists.
    pub fn merge_into(
        &self,
        ctx: &dyn Context,
        source: &Value,
        target: &mut Value,
        transform: &TransformMap,
    ) -> Result<(), ModelError> {
        if !target.is_object() {
            return Err(ModelError::NotAnObject {
                operation: "merge into".to_string(),
                found: value_kind(target).to_string(),
            });
        }
        if transform.is_empty() {
            return Ok(());
        }
        if !source.is_object() {
            return Err(ModelError::NotAnObject {
                operation: "merge from".to_string(),
                found: value_kind(source).to_string(),
            });
        }

        for (dest_name, entry) in transform {
            let dest = dest_name.trim();
            if let Some(value) = self.resolve_entry(ctx, source, dest, entry)? {
                self.add_submodel(ctx, target, dest, value, entry.mode)?;
            }
        }

        Ok(())
    }

    /// Merge `source` through a transform into a fresh model. With no source
    /// or no transform the result is an empty model.
    pub fn merge_new(
        &self,
        ctx: &dyn Context,
        source: Option<&Value>,
        transform: Option<&TransformMap>,
    ) -> Result<Value, ModelError> {
        let mut result = self.create_empty();
        if let (Some(source), Some(transform)) = (source, transform) {
            self.merge_into(ctx, source, &mut result, transform)?;
        }
        Ok(result)
    }

    fn resolve_entry(
        &self,
        ctx: &dyn Context,
        source: &Value,
        dest: &str,
        entry: &ModelValue,
    ) -> Result<Option<Value>, ModelError> {
        if let Some(selector) = entry.select_many.as_deref() {
            let collection = match self.try_extract_value(source, selector)? {
                Some(Value::Array(items)) => items,
                Some(Value::Null) | None => Vec::new(),
                Some(other) => vec![other],
            };

            return Ok(Some(if collection.is_empty() {
                if let Some(constant) = &entry.const_value {
                    ctx.log_verbose(&format!(
                        "[{selector}] produced an empty collection, using the constant ==> [{dest}]"
                    ));
                    constant.clone()
                } else {
                    ctx.log_verbose(&format!(
                        "[{selector}] produced an empty collection ==> [{dest}]"
                    ));
                    Value::Array(collection)
                }
            } else {
                ctx.log_verbose(&format!(
                    "[{selector}] produced a {} item collection ==> [{dest}]",
                    collection.len()
                ));
                Value::Array(collection)
            }));
        }

        let selected = match entry.select.as_deref() {
            Some(selector) => self.try_extract_value(source, selector)?,
            None => None,
        };

        if let Some(value) = selected {
            ctx.log_verbose(&format!(
                "[{}] produced a [{}] value ==> [{dest}]",
                entry.select.as_deref().unwrap_or_default(),
                value_kind(&value)
            ));
            return Ok(Some(value));
        }

        if let Some(constant) = &entry.const_value {
            ctx.log_verbose(&format!("constant produced a value ==> [{dest}]"));
            return Ok(Some(constant.clone()));
        }

        ctx.log_verbose(&format!(
            "no selector match and no constant; nothing will be populated for [{dest}]"
        ));
        Ok(None)
    }
}

fn names_only(path_str: &str) -> Result<Vec<String>, ModelError> {
    let segments = path::parse(path_str)?;
    if segments.is_empty() {
        return Err(ModelError::InvalidPath(path_str.to_string()));
    }
    segments
        .into_iter()
        .map(|segment| match segment {
            Segment::Name(name) => Ok(name),
            Segment::Index(_) => Err(ModelError::InvalidPath(path_str.to_string())),
        })
        .collect()
}

fn ensure_container<'a>(
    target: &'a mut Value,
    segments: &[String],
    path_str: &str,
) -> Result<(&'a mut Map<String, Value>, String), ModelError> {
    if !target.is_object() {
        return Err(ModelError::NotAnObject {
            operation: "add a submodel to".to_string(),
            found: value_kind(target).to_string(),
        });
    }
    let mut current = target
        .as_object_mut()
        .expect("target checked to be an object above");

    for name in &segments[..segments.len() - 1] {
        let slot = current
            .entry(name.clone())
            .or_insert_with(|| Value::Object(Map::new()));
        current = match slot.as_object_mut() {
            Some(map) => map,
            None => return Err(ModelError::InvalidPath(path_str.to_string())),
        };
    }

    Ok((current, segments[segments.len() - 1].clone()))
}
