//! External collaborator seams.
//!
//! The engine's boundary is entirely in-process: templates, locks, mail,
//! incidents, and the analytics client are consumed through the narrow
//! traits defined here and supplied by the host.

pub mod email;
pub mod incidents;
pub mod kusto;
pub mod locks;
pub mod templates;

pub use email::{EmailMessage, MailPriority, MailSender};
pub use incidents::{AgentIncident, IncidentCreateResult, IncidentCreator, IncidentFileStatus};
pub use kusto::{KustoClient, KustoClientFactory, KustoQueryOptions, QueryDataSet};
pub use locks::{LockLease, LockManager};
pub use templates::{TemplateRef, TemplateStore};
