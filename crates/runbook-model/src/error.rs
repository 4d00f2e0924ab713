//! Error types for the model layer.

use thiserror::Error;

/// Errors from model manipulation and selector evaluation.
#[derive(Debug, Error)]
pub enum ModelError {
    #[error("invalid model path [{0}]")]
    InvalidPath(String),

    #[error("cannot {operation} a value of type [{found}]; an object is required")]
    NotAnObject { operation: String, found: String },

    #[error("model transform failed: {0}")]
    Transform(String),
}

impl From<serde_json::Error> for ModelError {
    fn from(err: serde_json::Error) -> Self {
        ModelError::Transform(err.to_string())
    }
}

/// Short type name of a JSON value, used in error messages.
pub(crate) fn value_kind(value: &serde_json::Value) -> &'static str {
    match value {
        serde_json::Value::Null => "null",
        serde_json::Value::Bool(_) => "bool",
        serde_json::Value::Number(_) => "number",
        serde_json::Value::String(_) => "string",
        serde_json::Value::Array(_) => "array",
        serde_json::Value::Object(_) => "object",
    }
}
