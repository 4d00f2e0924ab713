//! Mail transport seam.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;

use runbook_model::Context;

use crate::error::BoxError;

/// Delivery priority of an outgoing message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MailPriority {
    Low,
    #[default]
    Normal,
    High,
}

/// A fully composed outgoing message.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct EmailMessage {
    pub subject: String,
    pub body: String,
    pub from_address: String,
    pub from_display_name: Option<String>,
    pub reply_to_address: Option<String>,
    pub priority: MailPriority,
    pub to_addresses: Vec<String>,
    pub cc_addresses: Vec<String>,
}

impl EmailMessage {
    /// Validate the composed message before dispatch. Errors are logged to
    /// the context; returns false when the message must not be sent.
    pub fn validate_and_normalize(&mut self, ctx: &dyn Context) -> bool {
        let mut result = true;

        self.subject = self.subject.trim().to_string();
        if self.subject.is_empty() {
            ctx.log_error("the composed email must have a non-empty subject");
            result = false;
        }

        result
    }
}

/// Sends composed messages.
#[async_trait]
pub trait MailSender: Send + Sync {
    /// Dispatch the message, returning the transport's success flag.
    /// `override_recipient` redirects delivery when set (host test rigs).
    async fn send_email(
        &self,
        cancel: &CancellationToken,
        message: &EmailMessage,
        override_recipient: Option<&str>,
    ) -> Result<bool, BoxError>;
}
