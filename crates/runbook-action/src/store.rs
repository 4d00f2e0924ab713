//! Action store.
//!
//! A registry of parsed actions keyed by tag. The store is refreshed from a
//! host-supplied accessor: every definition is parsed through the factory,
//! then every action is expanded against the refreshed map so tag references
//! resolve. The live map is replaced only when the whole refresh succeeds,
//! so a bad definition batch never takes down a working store.

use std::collections::{HashMap, HashSet};
use std::sync::{Arc, RwLock};

use async_trait::async_trait;
use serde_json::Value;

use runbook_model::{Context, ContextActivity, ExecuteContext, ModelManipulator, ParseContext};

use crate::defs::{ActionDef, ActionRef};
use crate::error::{BoxError, StoreError};
use crate::factory::ActionFactory;
use crate::op::Action;

/// Read access to parsed actions during reference expansion.
pub trait ActionFetcher: Send + Sync {
    fn get_action(&self, tag: &str) -> Option<Arc<dyn Action>>;
}

/// Host-supplied persistence for raw action definitions.
#[async_trait]
pub trait ActionAccessor: Send + Sync {
    async fn retrieve_actions(&self) -> Result<Vec<ActionDef>, BoxError>;

    /// Persist a store update: removed tags, updated definitions, and newly
    /// added definitions.
    async fn write_action_changes(
        &self,
        removed: &[String],
        updated: &[ActionDef],
        added: &[ActionDef],
    ) -> Result<(), BoxError>;
}

/// The tag-keyed action registry.
pub struct ActionStore {
    manipulator: ModelManipulator,
    accessor: Arc<dyn ActionAccessor>,
    factory: Arc<dyn ActionFactory>,
    actions: RwLock<Option<HashMap<String, Arc<dyn Action>>>>,
    raw_defs: RwLock<Vec<ActionDef>>,
    update_lock: tokio::sync::Mutex<()>,
}

struct MapFetcher<'a>(&'a HashMap<String, Arc<dyn Action>>);

impl ActionFetcher for MapFetcher<'_> {
    fn get_action(&self, tag: &str) -> Option<Arc<dyn Action>> {
        self.0.get(tag).cloned()
    }
}

impl ActionStore {
    pub fn new(accessor: Arc<dyn ActionAccessor>, factory: Arc<dyn ActionFactory>) -> Self {
        Self {
            manipulator: ModelManipulator::new(),
            accessor,
            factory,
            actions: RwLock::new(None),
            raw_defs: RwLock::new(Vec::new()),
            update_lock: tokio::sync::Mutex::new(()),
        }
    }

    /// Number of actions currently in the store.
    pub fn count(&self) -> usize {
        self.actions
            .read()
            .expect("store lock poisoned")
            .as_ref()
            .map_or(0, HashMap::len)
    }

    /// The raw definitions behind the store, when the last refresh preserved
    /// them.
    pub fn enumerate_actions(&self) -> Vec<ActionDef> {
        self.raw_defs.read().expect("store lock poisoned").clone()
    }

    /// Rebuild the store from the accessor. Returns false (leaving the live
    /// store untouched) when any definition fails to parse or expand.
    pub async fn refresh(
        &self,
        ctx: &ParseContext,
        preserve_definitions: bool,
    ) -> Result<bool, StoreError> {
        let _guard = self.update_lock.lock().await;

        ctx.on_action_start(ContextActivity::Parse, "ActionLoad");

        let fetched = match self.accessor.retrieve_actions().await {
            Ok(fetched) => fetched,
            Err(source) => {
                ctx.on_action_end();
                return Err(StoreError::Accessor { source });
            }
        };

        let mut new_map = HashMap::new();
        let (ok, count) = self.populate(ctx, &mut new_map, &fetched, false);

        if ok {
            *self.actions.write().expect("store lock poisoned") = Some(new_map);
            *self.raw_defs.write().expect("store lock poisoned") = if preserve_definitions {
                fetched
            } else {
                Vec::new()
            };
            tracing::info!(count, "action store refreshed");
        }

        ctx.log(&format!("Read and processed {count} actions from store"));
        ctx.on_action_end();

        Ok(ok)
    }

    /// Apply a copy-on-write update: remove tags, then add or overwrite
    /// definitions. Changes are persisted through the accessor and the live
    /// map replaced only when everything parses and expands.
    pub async fn update(
        &self,
        ctx: &ParseContext,
        to_remove: &[String],
        to_add_or_update: &[ActionDef],
    ) -> Result<bool, StoreError> {
        let old_map = self
            .actions
            .read()
            .expect("store lock poisoned")
            .clone()
            .ok_or(StoreError::NotInitialized)?;

        let _guard = self.update_lock.lock().await;

        ctx.on_action_start(ContextActivity::Parse, "ActionUpdate");

        let mut new_map = old_map.clone();
        let mut removed = Vec::new();

        for tag in to_remove {
            if new_map.remove(tag).is_some() {
                removed.push(tag.clone());
            }
        }

        let (ok, count_added) = if to_add_or_update.is_empty() {
            (true, 0)
        } else {
            self.populate(ctx, &mut new_map, to_add_or_update, true)
        };

        ctx.log(&format!(
            "Updated store: added or updated {count_added} actions and removed {} actions",
            removed.len()
        ));

        if ok {
            let updated: Vec<ActionDef> = to_add_or_update
                .iter()
                .filter(|def| old_map.contains_key(&def.tag))
                .cloned()
                .collect();
            let added: Vec<ActionDef> = to_add_or_update
                .iter()
                .filter(|def| !old_map.contains_key(&def.tag))
                .cloned()
                .collect();

            if let Err(source) = self
                .accessor
                .write_action_changes(&removed, &updated, &added)
                .await
            {
                ctx.on_action_end();
                return Err(StoreError::Accessor { source });
            }

            *self.actions.write().expect("store lock poisoned") = Some(new_map);
            ctx.log_verbose("Action store changes committed");
        }

        ctx.on_action_end();

        Ok(ok)
    }

    /// Look up an action by tag.
    pub fn get_action(&self, tag: &str) -> Option<Arc<dyn Action>> {
        self.actions
            .read()
            .expect("store lock poisoned")
            .as_ref()
            .and_then(|map| map.get(tag).cloned())
    }

    /// Execute a referenced action against a fresh empty model and return
    /// the model.
    pub async fn execute_action(
        &self,
        ctx: &ExecuteContext,
        action_ref: &ActionRef,
    ) -> Result<Value, StoreError> {
        let tag = action_ref
            .tag
            .as_deref()
            .filter(|tag| !tag.trim().is_empty())
            .ok_or(StoreError::EmptyTag)?;

        if self.actions.read().expect("store lock poisoned").is_none() {
            return Err(StoreError::NotInitialized);
        }

        let action = self
            .get_action(tag)
            .ok_or_else(|| StoreError::UnknownTag(tag.to_string()))?;

        let mut model = self.manipulator.create_empty();
        action.execute(ctx, action_ref, &mut model).await?;

        Ok(model)
    }

    /// Execute a stored action by tag.
    pub async fn execute_action_by_tag(
        &self,
        ctx: &ExecuteContext,
        tag: &str,
    ) -> Result<Value, StoreError> {
        let action_ref = ActionRef {
            description: Some("store launched action".to_string()),
            ..ActionRef::for_tag(tag)
        };
        self.execute_action(ctx, &action_ref).await
    }

    /// Validate that a reference names a known action and carries the
    /// parameters that action requires.
    pub fn validate_reference(&self, ctx: &ParseContext, action_ref: &ActionRef) -> bool {
        let Some(tag) = action_ref.tag.as_deref().filter(|tag| !tag.trim().is_empty()) else {
            ctx.log_error("action reference must carry a non-empty tag");
            return false;
        };

        let Some(action) = self.get_action(tag) else {
            ctx.log_error(&format!("Action with tag [{tag}] was not found"));
            return false;
        };

        match action.validate(ctx, action_ref.arg_transform.as_ref()) {
            Ok(result) => result,
            Err(err) => {
                ctx.log_error(&err.to_string());
                false
            }
        }
    }

    /// Parse definitions into `map`, then expand every action in it against
    /// the map itself.
    fn populate(
        &self,
        ctx: &ParseContext,
        map: &mut HashMap<String, Arc<dyn Action>>,
        defs: &[ActionDef],
        allow_overwrite: bool,
    ) -> (bool, usize) {
        let mut duplicates: Vec<String> = Vec::new();
        let mut seen: HashSet<String> = HashSet::new();
        let mut ok = true;
        let mut count = 0;

        for def in defs {
            let item_tag = format!("[{}].[{}]", def.action_type, def.tag);

            ctx.on_action_start(ContextActivity::Parse, &item_tag);
            ctx.log_verbose(&format!("Processing definition for {item_tag}"));

            match self.factory.create(&def.action_type) {
                Err(err) => {
                    ctx.log_error(&err.to_string());
                    ok = false;
                }
                Ok(action) => {
                    let action: Arc<dyn Action> = Arc::from(action);
                    match action.parse_and_process_definition(
                        ctx,
                        self.factory.as_ref(),
                        &def.tag,
                        def.def.as_ref(),
                    ) {
                        Ok(true) => {
                            let key = action.tag().unwrap_or_default();
                            if !allow_overwrite && !seen.insert(key.clone()) {
                                duplicates.push(def.tag.clone());
                            } else {
                                if allow_overwrite && map.contains_key(&key) {
                                    ctx.log_verbose(&format!(
                                        "Replaced existing action [{}]",
                                        def.tag
                                    ));
                                }
                                map.insert(key, action);
                                count += 1;
                            }
                        }
                        Ok(false) => ok = false,
                        Err(err) => {
                            ctx.log_error(&err.to_string());
                            ok = false;
                        }
                    }
                }
            }

            ctx.on_action_end();
        }

        if !duplicates.is_empty() {
            ctx.log_error(&format!(
                "Action store contains duplicates of the following tags: {}",
                duplicates.join(", ")
            ));
            ok = false;
        }

        // expand references now that every action is in the map
        let fetcher = MapFetcher(map);
        for action in map.values() {
            match action.expand_definition(ctx, &fetcher) {
                Ok(true) => {}
                Ok(false) => ok = false,
                Err(err) => {
                    ctx.log_error(&err.to_string());
                    ok = false;
                }
            }
        }

        (ok, count)
    }
}

impl ActionFetcher for ActionStore {
    fn get_action(&self, tag: &str) -> Option<Arc<dyn Action>> {
        ActionStore::get_action(self, tag)
    }
}
