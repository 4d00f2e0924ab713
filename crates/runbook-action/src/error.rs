//! Error types for the action engine.

use runbook_model::{ContextActivity, ModelError};
use thiserror::Error;

use crate::lifecycle::Phase;

/// Boxed error produced by external collaborators (lock manager, mail
/// transport, incident client, analytics client, store accessor).
pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// A lifecycle phase was invoked out of order. This is a programming-contract
/// violation, distinct from configuration errors which are logged to the
/// parse context instead.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("cannot {activity} an action in the [{phase}] lifecycle phase")]
pub struct LifecycleError {
    pub phase: Phase,
    pub activity: ContextActivity,
}

/// Errors from action execution.
#[derive(Debug, Error)]
pub enum ActionError {
    #[error(transparent)]
    Lifecycle(#[from] LifecycleError),

    /// Execution-time validation of bound arguments or composed payloads
    /// failed; the specifics were logged to the execute context.
    #[error("{0}")]
    ExecuteValidation(String),

    /// A domain failure raised while executing. The fatal flag is
    /// informative for the caller's retry and alerting policy; the engine
    /// aborts the current call chain either way.
    #[error("{message}")]
    Execution { message: String, fatal: bool },

    /// An external collaborator failed; the original error is preserved.
    #[error("external call failed: {source}")]
    External { source: BoxError },

    #[error("operation was cancelled")]
    Cancelled,

    #[error(transparent)]
    Model(#[from] ModelError),
}

impl ActionError {
    pub fn execution(message: impl Into<String>, fatal: bool) -> Self {
        ActionError::Execution {
            message: message.into(),
            fatal,
        }
    }

    pub fn external(source: BoxError) -> Self {
        ActionError::External { source }
    }

    pub fn is_fatal(&self) -> bool {
        match self {
            ActionError::Execution { fatal, .. } => *fatal,
            ActionError::Lifecycle(_) => true,
            _ => false,
        }
    }
}

/// Errors from the action store.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("store has not been initialized")]
    NotInitialized,

    #[error("[{0}] is not a tag for a known action in the store")]
    UnknownTag(String),

    #[error("action reference must carry a non-empty tag")]
    EmptyTag,

    #[error(transparent)]
    Action(#[from] ActionError),

    #[error(transparent)]
    Lifecycle(#[from] LifecycleError),

    #[error("action accessor failed: {source}")]
    Accessor { source: BoxError },
}

/// Errors from the action factory.
#[derive(Debug, Error)]
pub enum FactoryError {
    #[error("[{0}] is not a supported action type")]
    UnknownType(String),
}
