//! Template store seam.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use runbook_model::{Context, TransformMap};

/// Reference to a template: either an inline literal or a named tag in the
/// store, with an optional parameter transform evaluated against the model
/// before rendering.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "snake_case")]
pub struct TemplateRef {
    pub template_tag: Option<String>,
    pub inline: Option<String>,
    pub parameters: Option<TransformMap>,
}

impl TemplateRef {
    pub fn inline(text: impl Into<String>) -> Self {
        Self {
            inline: Some(text.into()),
            ..Self::default()
        }
    }

    pub fn tag(tag: impl Into<String>) -> Self {
        Self {
            template_tag: Some(tag.into()),
            ..Self::default()
        }
    }

    /// The same template resolved through a different tag, keeping the
    /// parameter bindings. Used by per-call tag overrides.
    pub fn with_tag_override(&self, tag: impl Into<String>) -> Self {
        Self {
            template_tag: Some(tag.into()),
            inline: None,
            parameters: self.parameters.clone(),
        }
    }
}

/// Renders templates against a model.
pub trait TemplateStore: Send + Sync {
    /// Render the referenced template. `None` when the template resolves to
    /// no content.
    fn render(&self, ctx: &dyn Context, template: &TemplateRef, model: &Value) -> Option<String>;

    /// Check at parse time that the reference points at a known template.
    fn validate_reference(&self, ctx: &dyn Context, template: &TemplateRef) -> bool;
}
