//! Built-in actions: the composite control-flow operators and the
//! side-effecting leaves.

pub mod const_model;
pub mod email_send;
pub mod foreach;
pub mod incident_create;
pub mod kusto_query;
pub mod lock;
pub mod model_build;
pub mod set;
pub mod time_window;

pub use const_model::ConstModelAction;
pub use email_send::{EmailSendAction, EmailSendDef};
pub use foreach::{ForeachActionSet, ForeachActionSetDef};
pub use incident_create::{AgentIncidentCreateAction, AgentIncidentDef};
pub use kusto_query::{KustoQueryAction, KustoQueryDef};
pub use lock::LockActionSet;
pub use model_build::ModelBuildAction;
pub use set::{ActionSet, ActionSetDef};
pub use time_window::{
    DayOfWeekExt, TimeApplicabilityAction, TimeApplicabilityDef, TimeRange, TimeRangeOverride,
};
