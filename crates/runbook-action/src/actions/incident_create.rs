//! Incident-filing leaf action.
//!
//! Renders keywords, title, and body templates against the ambient model,
//! validates the composed incident, files it through the incident creator,
//! and surfaces a result model recording the assigned id and status.

use std::collections::BTreeMap;
use std::sync::{Arc, RwLock};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use runbook_model::{Context, ExecuteContext, ModelManipulator, ParseContext};

use crate::defs::{ActionRef, Validatable};
use crate::error::ActionError;
use crate::external::{
    AgentIncident, IncidentCreateResult, IncidentCreator, IncidentFileStatus, TemplateRef,
    TemplateStore,
};
use crate::factory::ActionFactory;
use crate::op::{extract_args, ActionInfo, ActionKind};

pub const ACTION_TYPE: &str = "TRANSMIT-INCIDENT";

/// Definition of an incident action.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default, rename_all = "snake_case")]
pub struct AgentIncidentDef {
    pub keywords: Option<TemplateRef>,
    pub title: TemplateRef,
    pub body: TemplateRef,
    pub event_name: Option<String>,
}

impl Validatable for AgentIncidentDef {}

/// Arguments bound through the reference's argument transform.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default, rename_all = "snake_case")]
struct IncidentArgs {
    event_name_override: Option<String>,
    keywords_override: Option<String>,
    body_tag_override: Option<String>,
    counter_suffix: Option<String>,
    asset_group_id: Option<String>,
    agent_id: Option<String>,
    owner_id: Option<String>,
    severity: i64,
}

impl Validatable for IncidentArgs {
    fn validate_and_normalize(&mut self, ctx: &dyn Context) -> bool {
        if let Some(suffix) = &self.counter_suffix {
            if suffix.trim().is_empty() {
                ctx.log_error("a counter suffix, when supplied, must be non-empty");
                return false;
            }
        }
        true
    }
}

/// The incident leaf.
pub struct AgentIncidentCreateAction {
    manipulator: ModelManipulator,
    templates: Arc<dyn TemplateStore>,
    creator: Arc<dyn IncidentCreator>,
    def: RwLock<Option<AgentIncidentDef>>,
}

impl AgentIncidentCreateAction {
    pub fn new(templates: Arc<dyn TemplateStore>, creator: Arc<dyn IncidentCreator>) -> Self {
        Self {
            manipulator: ModelManipulator::new(),
            templates,
            creator,
            def: RwLock::new(None),
        }
    }
}

const ROUTING_PARAMS: [&str; 3] = ["asset_group_id", "agent_id", "owner_id"];

#[async_trait]
impl ActionKind for AgentIncidentCreateAction {
    type Def = AgentIncidentDef;

    fn type_name(&self) -> &'static str {
        ACTION_TYPE
    }

    fn required_params(&self) -> &'static [&'static str] {
        &["asset_group_id", "agent_id", "owner_id", "severity"]
    }

    fn process_definition(
        &self,
        ctx: &ParseContext,
        _factory: &dyn ActionFactory,
        _info: &ActionInfo,
        definition: Option<Self::Def>,
    ) -> bool {
        let Some(def) = definition else {
            return false;
        };

        let mut result = self.templates.validate_reference(ctx, &def.title);
        result = self.templates.validate_reference(ctx, &def.body) && result;

        *self.def.write().expect("incident def lock poisoned") = Some(def);
        result
    }

    /// Unlike the common rule, the routing ids are individually optional: a
    /// reference must bind severity plus at least one of them.
    fn process_validation(&self, ctx: &ParseContext, _info: &ActionInfo, missing: &[&str]) -> bool {
        let mut result = true;

        if missing.contains(&"severity") {
            ctx.log_error("the severity argument must be specified");
            result = false;
        }

        if ROUTING_PARAMS.iter().all(|param| missing.contains(param)) {
            ctx.log_error(
                "at least one of asset_group_id, agent_id, or owner_id must be specified",
            );
            result = false;
        }

        result
    }

    async fn execute_internal(
        &self,
        ctx: &ExecuteContext,
        info: &ActionInfo,
        action_ref: &ActionRef,
        model: &mut Value,
    ) -> Result<(bool, Option<Value>), ActionError> {
        let args: IncidentArgs = extract_args(ctx, &self.manipulator, info, action_ref, model)?;

        let Some(def) = self.def.read().expect("incident def lock poisoned").clone() else {
            return Err(ActionError::execution(
                format!("no incident definition is available for {}", info.obj_text()),
                true,
            ));
        };

        let body_ref = match args.body_tag_override.as_deref() {
            Some(tag) if !tag.trim().is_empty() => def.body.with_tag_override(tag),
            _ => def.body.clone(),
        };

        let event_name = match args.event_name_override.as_deref() {
            Some(name) if !name.trim().is_empty() => Some(name.to_string()),
            _ => def.event_name.clone(),
        };

        let keywords = match args.keywords_override.as_deref() {
            Some(keywords) if !keywords.trim().is_empty() => Some(keywords.to_string()),
            _ => def
                .keywords
                .as_ref()
                .and_then(|template| self.templates.render(ctx, template, model)),
        };

        let mut incident = AgentIncident {
            asset_group_id: args.asset_group_id.clone(),
            agent_id: args.agent_id.clone(),
            owner_id: args.owner_id.clone(),
            keywords,
            title: self
                .templates
                .render(ctx, &def.title, model)
                .unwrap_or_default(),
            body: self
                .templates
                .render(ctx, &body_ref, model)
                .unwrap_or_default(),
            event_name,
            severity: args.severity,
        };

        if !incident.validate_and_normalize(ctx) {
            return Err(ActionError::ExecuteValidation(format!(
                "Errors found validating incident for {} [tag: {}]",
                info.obj_text(),
                ctx.tag()
            )));
        }

        let event_data = BTreeMap::from([
            (
                "agent_id".to_string(),
                incident.agent_id.clone().unwrap_or_default(),
            ),
            ("title".to_string(), incident.title.clone()),
            (
                "event_name".to_string(),
                incident.event_name.clone().unwrap_or_default(),
            ),
            ("severity".to_string(), incident.severity.to_string()),
        ]);

        let create_result = if ctx.is_simulation() {
            ctx.log("Running in simulation mode. Incident will NOT be filed.");
            IncidentCreateResult::new(IncidentFileStatus::Simulated, None)
        } else {
            match self
                .creator
                .create_incident(ctx.cancellation_token(), &incident)
                .await
            {
                Ok(result) => result,
                Err(err) => {
                    ctx.increment_counter(
                        "Incident Filing Errors",
                        Some(&info.tag),
                        args.counter_suffix.as_deref(),
                        1,
                    );
                    ctx.report_action_error(
                        "error",
                        &info.action_type,
                        &info.tag,
                        &err.to_string(),
                        event_data,
                    );
                    return Err(ActionError::external(err));
                }
            }
        };

        ctx.increment_counter(
            "Incidents Filed",
            Some(&info.tag),
            args.counter_suffix.as_deref(),
            1,
        );
        ctx.report_action_event("success", &info.action_type, &info.tag, event_data);

        ctx.log(&format!(
            "{} severity {} incident ({}) [{}] : {}",
            if create_result.id.is_some() {
                "Successfully filed"
            } else {
                "Failed to file"
            },
            incident.severity,
            create_result
                .id
                .map(|id| id.to_string())
                .unwrap_or_else(|| "NONE".to_string()),
            incident.title,
            create_result.status,
        ));

        let result = json!({
            "asset_group_id": incident.asset_group_id,
            "agent_id": incident.agent_id,
            "owner_id": incident.owner_id,
            "title": incident.title,
            "incident_status": create_result.status,
            "incident_id": create_result.id,
        });

        Ok((true, Some(result)))
    }
}
