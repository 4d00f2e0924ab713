//! Action factory.
//!
//! A registry mapping action type names to constructors. The built-in table
//! covers every action kind the engine ships; hosts may register additional
//! kinds before handing the factory to the store. Unknown names produce a
//! typed error rather than a null.

use std::collections::HashMap;
use std::sync::Arc;

use crate::actions::{
    const_model, email_send, foreach, incident_create, kusto_query, lock, model_build, set,
    time_window, ActionSet, AgentIncidentCreateAction, ConstModelAction, EmailSendAction,
    ForeachActionSet, KustoQueryAction, LockActionSet, ModelBuildAction, TimeApplicabilityAction,
};
use crate::error::FactoryError;
use crate::external::{
    IncidentCreator, KustoClientFactory, LockManager, MailSender, TemplateStore,
};
use crate::op::{Action, ActionOp};

/// Creates action instances by type name.
pub trait ActionFactory: Send + Sync {
    fn create(&self, action_type: &str) -> Result<Box<dyn Action>, FactoryError>;
}

/// External collaborators the built-in actions are constructed over.
#[derive(Clone)]
pub struct EngineDependencies {
    pub templates: Arc<dyn TemplateStore>,
    pub mail: Arc<dyn MailSender>,
    pub incidents: Arc<dyn IncidentCreator>,
    pub kusto: Arc<dyn KustoClientFactory>,
    pub locks: Arc<dyn LockManager>,
}

type Constructor = Box<dyn Fn() -> Box<dyn Action> + Send + Sync>;

/// Factory serving the built-in action kinds.
pub struct DefaultActionFactory {
    constructors: HashMap<String, Constructor>,
}

impl DefaultActionFactory {
    pub fn new(deps: EngineDependencies) -> Self {
        let mut factory = Self {
            constructors: HashMap::new(),
        };

        factory.register(set::ACTION_TYPE, || Box::new(ActionOp::new(ActionSet::new())));
        factory.register(foreach::ACTION_TYPE, || {
            Box::new(ActionOp::new(ForeachActionSet::new()))
        });

        let locks = deps.locks.clone();
        factory.register(lock::ACTION_TYPE, move || {
            Box::new(ActionOp::new(LockActionSet::new(locks.clone())))
        });

        factory.register(const_model::ACTION_TYPE, || {
            Box::new(ActionOp::new(ConstModelAction::new()))
        });
        factory.register(model_build::ACTION_TYPE, || {
            Box::new(ActionOp::new(ModelBuildAction::new()))
        });
        factory.register(time_window::ACTION_TYPE, || {
            Box::new(ActionOp::new(TimeApplicabilityAction::new()))
        });

        let (kusto, templates) = (deps.kusto.clone(), deps.templates.clone());
        factory.register(kusto_query::ACTION_TYPE, move || {
            Box::new(ActionOp::new(KustoQueryAction::new(
                kusto.clone(),
                templates.clone(),
            )))
        });

        let (templates, mail) = (deps.templates.clone(), deps.mail.clone());
        factory.register(email_send::ACTION_TYPE, move || {
            Box::new(ActionOp::new(EmailSendAction::new(
                templates.clone(),
                mail.clone(),
            )))
        });

        let (templates, incidents) = (deps.templates.clone(), deps.incidents.clone());
        factory.register(incident_create::ACTION_TYPE, move || {
            Box::new(ActionOp::new(AgentIncidentCreateAction::new(
                templates.clone(),
                incidents.clone(),
            )))
        });

        factory
    }

    /// Register (or replace) a constructor for an action type.
    pub fn register(
        &mut self,
        action_type: impl Into<String>,
        constructor: impl Fn() -> Box<dyn Action> + Send + Sync + 'static,
    ) {
        self.constructors
            .insert(action_type.into(), Box::new(constructor));
    }

    /// Registered type names, sorted.
    pub fn registered_types(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.constructors.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }
}

impl ActionFactory for DefaultActionFactory {
    fn create(&self, action_type: &str) -> Result<Box<dyn Action>, FactoryError> {
        self.constructors
            .get(action_type)
            .map(|constructor| constructor())
            .ok_or_else(|| FactoryError::UnknownType(action_type.to_string()))
    }
}
