//! Email-sending leaf action.
//!
//! Renders the subject and body templates against the ambient model,
//! validates the composed message, dispatches it through the mail sender,
//! and surfaces a result model recording the outcome.

use std::collections::BTreeMap;
use std::sync::{Arc, RwLock};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use runbook_model::{Context, ExecuteContext, ModelManipulator, ParseContext};

use crate::defs::{ActionRef, Validatable};
use crate::error::ActionError;
use crate::external::{EmailMessage, MailPriority, MailSender, TemplateRef, TemplateStore};
use crate::factory::ActionFactory;
use crate::op::{extract_args, ActionInfo, ActionKind};

pub const ACTION_TYPE: &str = "TRANSMIT-EMAIL";

/// Definition of an email action.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default, rename_all = "snake_case")]
pub struct EmailSendDef {
    pub subject: TemplateRef,
    pub body: TemplateRef,
    pub from_address: Option<String>,
    pub from_display_name: Option<String>,
    pub reply_to_address: Option<String>,
    pub priority: MailPriority,
}

impl Validatable for EmailSendDef {}

/// Arguments bound through the reference's argument transform.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default, rename_all = "snake_case")]
struct EmailSendArgs {
    to: Option<Vec<String>>,
    cc: Option<Vec<String>>,
    body_tag_override: Option<String>,
    counter_suffix: Option<String>,
}

impl Validatable for EmailSendArgs {}

/// The email leaf.
pub struct EmailSendAction {
    manipulator: ModelManipulator,
    templates: Arc<dyn TemplateStore>,
    sender: Arc<dyn MailSender>,
    def: RwLock<Option<EmailSendDef>>,
}

impl EmailSendAction {
    pub fn new(templates: Arc<dyn TemplateStore>, sender: Arc<dyn MailSender>) -> Self {
        Self {
            manipulator: ModelManipulator::new(),
            templates,
            sender,
            def: RwLock::new(None),
        }
    }
}

#[async_trait]
impl ActionKind for EmailSendAction {
    type Def = EmailSendDef;

    fn type_name(&self) -> &'static str {
        ACTION_TYPE
    }

    fn required_params(&self) -> &'static [&'static str] {
        &["to"]
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

        let mut result = self.templates.validate_reference(ctx, &def.subject);
        result = self.templates.validate_reference(ctx, &def.body) && result;

        *self.def.write().expect("email def lock poisoned") = Some(def);
        result
    }

    async fn execute_internal(
        &self,
        ctx: &ExecuteContext,
        info: &ActionInfo,
        action_ref: &ActionRef,
        model: &mut Value,
    ) -> Result<(bool, Option<Value>), ActionError> {
        let args: EmailSendArgs = extract_args(ctx, &self.manipulator, info, action_ref, model)?;

        let Some(def) = self.def.read().expect("email def lock poisoned").clone() else {
            return Err(ActionError::execution(
                format!("no email definition is available for {}", info.obj_text()),
                true,
            ));
        };

        let body_ref = match args.body_tag_override.as_deref() {
            Some(tag) if !tag.trim().is_empty() => def.body.with_tag_override(tag),
            _ => def.body.clone(),
        };

        let mut message = EmailMessage {
            subject: self
                .templates
                .render(ctx, &def.subject, model)
                .unwrap_or_default(),
            body: self
                .templates
                .render(ctx, &body_ref, model)
                .unwrap_or_default(),
            from_address: def.from_address.clone().unwrap_or_default(),
            from_display_name: def.from_display_name.clone(),
            reply_to_address: def.reply_to_address.clone(),
            priority: def.priority,
            to_addresses: args.to.clone().unwrap_or_default(),
            cc_addresses: args.cc.clone().unwrap_or_default(),
        };

        if !message.validate_and_normalize(ctx) {
            return Err(ActionError::ExecuteValidation(format!(
                "Errors found validating email for {} [tag: {}]",
                info.obj_text(),
                ctx.tag()
            )));
        }

        let event_data =
            BTreeMap::from([("subject".to_string(), message.subject.clone())]);

        let success = if ctx.is_simulation() {
            ctx.log("Running in simulation mode. Email will NOT be sent.");
            true
        } else {
            match self
                .sender
                .send_email(ctx.cancellation_token(), &message, None)
                .await
            {
                Ok(success) => success,
                Err(err) => {
                    ctx.increment_counter(
                        "Email Sending Errors",
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
            "Emails Sent",
            Some(&info.tag),
            args.counter_suffix.as_deref(),
            1,
        );
        ctx.report_action_event("success", &info.action_type, &info.tag, event_data);

        ctx.log(&format!(
            "{} email [{}] to {} recipients",
            if success { "Sent" } else { "Failed to send" },
            message.subject,
            message.to_addresses.len()
        ));

        let result = json!({
            "send_time": ctx.now_utc(),
            "success": success,
            "subject": message.subject,
            "from": message.from_address,
            "to": message.to_addresses,
            "cc": message.cc_addresses,
        });

        Ok((true, Some(result)))
    }
}
