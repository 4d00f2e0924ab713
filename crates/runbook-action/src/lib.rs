//! Declarative action-execution engine.
//!
//! Loads a tree of JSON-shaped action definitions, wires them together
//! through a tag-keyed store, validates their parameter bindings, and
//! executes them against a mutable model — sequencing, looping, lock-gating,
//! and time-gating the side-effecting leaf actions (analytics queries,
//! email, incident filing).
//!
//! Every action follows the four-phase lifecycle parse -> expand ->
//! validate -> execute; phases invoked out of order are rejected with a
//! typed lifecycle error.

pub mod actions;
pub mod defs;
pub mod error;
pub mod external;
pub mod factory;
pub mod lifecycle;
pub mod op;
pub mod store;

#[cfg(test)]
mod testing;

pub use actions::{
    ActionSet, ActionSetDef, AgentIncidentCreateAction, AgentIncidentDef, ConstModelAction,
    EmailSendAction, EmailSendDef, ForeachActionSet, ForeachActionSetDef, KustoQueryAction,
    KustoQueryDef, LockActionSet, ModelBuildAction, TimeApplicabilityAction, TimeApplicabilityDef,
};
pub use defs::{
    ActionDef, ActionRef, ExecuteResult, LoopResultCondition, ModelMode, Validatable,
};
pub use error::{ActionError, BoxError, FactoryError, LifecycleError, StoreError};
pub use external::{
    AgentIncident, EmailMessage, IncidentCreateResult, IncidentCreator, IncidentFileStatus,
    KustoClient, KustoClientFactory, KustoQueryOptions, LockLease, LockManager, MailPriority,
    MailSender, QueryDataSet, TemplateRef, TemplateStore,
};
pub use factory::{ActionFactory, DefaultActionFactory, EngineDependencies};
pub use lifecycle::Phase;
pub use op::{Action, ActionInfo, ActionKind, ActionOp, DefinitionMode};
pub use store::{ActionAccessor, ActionFetcher, ActionStore};
