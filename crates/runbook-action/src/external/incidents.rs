//! Incident management seam.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;

use runbook_model::Context;

use crate::error::BoxError;

/// Bounds for incident severity.
pub const MIN_SEVERITY: i64 = 1;
pub const MAX_SEVERITY: i64 = 4;

/// A fully composed incident ready to be filed against an agent, asset
/// group, or owner.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct AgentIncident {
    pub asset_group_id: Option<String>,
    pub agent_id: Option<String>,
    pub owner_id: Option<String>,
    pub keywords: Option<String>,
    pub title: String,
    pub body: String,
    pub event_name: Option<String>,
    pub severity: i64,
}

impl AgentIncident {
    /// Validate the composed incident before filing. Errors are logged to
    /// the context; returns false when the incident must not be filed.
    pub fn validate_and_normalize(&mut self, ctx: &dyn Context) -> bool {
        let mut result = true;

        self.title = self.title.trim().to_string();
        if self.title.is_empty() {
            ctx.log_error("the composed incident must have a non-empty title");
            result = false;
        }

        if is_blank(&self.asset_group_id) && is_blank(&self.agent_id) && is_blank(&self.owner_id) {
            ctx.log_error(
                "at least one of asset_group_id, agent_id, or owner_id must be non-empty",
            );
            result = false;
        }

        if self.severity < MIN_SEVERITY || self.severity > MAX_SEVERITY {
            ctx.log_error(&format!(
                "severity must be in the range [{MIN_SEVERITY}..{MAX_SEVERITY}]"
            ));
            result = false;
        }

        result
    }
}

fn is_blank(value: &Option<String>) -> bool {
    value.as_deref().map_or(true, |v| v.trim().is_empty())
}

/// Outcome reported by the incident service.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IncidentFileStatus {
    Created,
    Updated,
    Simulated,
    Rejected,
}

impl std::fmt::Display for IncidentFileStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            IncidentFileStatus::Created => write!(f, "created"),
            IncidentFileStatus::Updated => write!(f, "updated"),
            IncidentFileStatus::Simulated => write!(f, "simulated"),
            IncidentFileStatus::Rejected => write!(f, "rejected"),
        }
    }
}

/// Result of a create-incident call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IncidentCreateResult {
    pub status: IncidentFileStatus,
    pub id: Option<i64>,
}

impl IncidentCreateResult {
    pub fn new(status: IncidentFileStatus, id: Option<i64>) -> Self {
        Self { status, id }
    }
}

/// Files incidents with the incident management service.
#[async_trait]
pub trait IncidentCreator: Send + Sync {
    async fn create_incident(
        &self,
        cancel: &CancellationToken,
        incident: &AgentIncident,
    ) -> Result<IncidentCreateResult, BoxError>;
}
