//! Analytics query leaf action.
//!
//! Renders a query template against the ambient model, serializes bound
//! query parameters to Kusto literal form, executes the query against the
//! configured cluster and database, and surfaces the first result table as
//! submodel `Table00` of a fresh result model.

use std::collections::BTreeMap;
use std::sync::{Arc, RwLock};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use runbook_model::{Context, ExecuteContext, MergeMode, ModelManipulator, ParseContext};

use crate::defs::{ActionRef, Validatable};
use crate::error::ActionError;
use crate::external::{KustoClientFactory, KustoQueryOptions, TemplateRef, TemplateStore};
use crate::factory::ActionFactory;
use crate::op::{extract_args, ActionInfo, ActionKind};

pub const ACTION_TYPE: &str = "MODELBUILD-QUERY-KUSTO";

/// Name of the submodel carrying the first result table.
pub const FIRST_TABLE_PROPERTY: &str = "Table00";

/// Definition of a query action.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default, rename_all = "snake_case")]
pub struct KustoQueryDef {
    pub query: TemplateRef,
    pub cluster_url: String,
    pub database: String,
}

impl Validatable for KustoQueryDef {
    fn validate_and_normalize(&mut self, ctx: &dyn Context) -> bool {
        let mut result = true;

        self.cluster_url = self.cluster_url.trim().to_string();
        self.database = self.database.trim().to_string();

        if self.cluster_url.is_empty() {
            ctx.log_error("must specify a non-empty cluster_url");
            result = false;
        }
        if self.database.is_empty() {
            ctx.log_error("must specify a non-empty database");
            result = false;
        }

        result
    }
}

/// Arguments bound through the reference's argument transform.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default, rename_all = "snake_case")]
struct KustoQueryArgs {
    query_tag_override: Option<String>,
    query_parameters: Option<BTreeMap<String, Value>>,
    counter_suffix: Option<String>,
}

impl Validatable for KustoQueryArgs {}

/// The analytics query leaf.
pub struct KustoQueryAction {
    manipulator: ModelManipulator,
    kusto: Arc<dyn KustoClientFactory>,
    templates: Arc<dyn TemplateStore>,
    def: RwLock<Option<KustoQueryDef>>,
}

impl KustoQueryAction {
    pub fn new(kusto: Arc<dyn KustoClientFactory>, templates: Arc<dyn TemplateStore>) -> Self {
        Self {
            manipulator: ModelManipulator::new(),
            kusto,
            templates,
            def: RwLock::new(None),
        }
    }
}

/// Serialize one bound query parameter to Kusto literal form: numbers and
/// booleans as bare literals, strings quoted, collections and objects as
/// JSON.
fn serialize_parameter(value: &Value) -> String {
    match value {
        Value::String(_) | Value::Array(_) | Value::Object(_) => {
            serde_json::to_string(value).unwrap_or_default()
        }
        other => other.to_string(),
    }
}

#[async_trait]
impl ActionKind for KustoQueryAction {
    type Def = KustoQueryDef;

    fn type_name(&self) -> &'static str {
        ACTION_TYPE
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

        let result = self.templates.validate_reference(ctx, &def.query);
        *self.def.write().expect("query def lock poisoned") = Some(def);
        result
    }

    async fn execute_internal(
        &self,
        ctx: &ExecuteContext,
        info: &ActionInfo,
        action_ref: &ActionRef,
        model: &mut Value,
    ) -> Result<(bool, Option<Value>), ActionError> {
        let args: KustoQueryArgs = extract_args(ctx, &self.manipulator, info, action_ref, model)?;

        let Some(def) = self.def.read().expect("query def lock poisoned").clone() else {
            return Err(ActionError::execution(
                format!("no query definition is available for {}", info.obj_text()),
                true,
            ));
        };

        let query_ref = match args.query_tag_override.as_deref() {
            Some(tag) if !tag.trim().is_empty() => def.query.with_tag_override(tag),
            _ => def.query.clone(),
        };

        let query_text = self.templates.render(ctx, &query_ref, model).unwrap_or_default();

        let mut options = KustoQueryOptions::default();
        if let Some(parameters) = &args.query_parameters {
            for (name, value) in parameters {
                options
                    .parameters
                    .insert(name.clone(), serialize_parameter(value));
            }
        }

        let client = self
            .kusto
            .create_client(&def.cluster_url, &def.database, &ctx.tag());

        ctx.log_verbose(&format!(
            "Executing query against [{}]/[{}]",
            def.cluster_url, def.database
        ));

        let data_set = match client.execute_query(&query_text, &options).await {
            Ok(rows) => match client.to_data_set(rows) {
                Ok(data_set) => data_set,
                Err(err) => return self.report_failure(ctx, info, &args, err),
            },
            Err(err) => return self.report_failure(ctx, info, &args, err),
        };

        ctx.increment_counter(
            "Kusto Queries Executed",
            Some(&info.tag),
            args.counter_suffix.as_deref(),
            1,
        );
        ctx.report_action_event("success", &info.action_type, &info.tag, BTreeMap::new());

        let mut result = self.manipulator.create_empty();
        if let Some(first_table) = data_set.tables.into_iter().next() {
            self.manipulator.add_submodel(
                ctx,
                &mut result,
                FIRST_TABLE_PROPERTY,
                first_table,
                MergeMode::ReplaceExisting,
            )?;
        }

        Ok((true, Some(result)))
    }
}

impl KustoQueryAction {
    fn report_failure(
        &self,
        ctx: &ExecuteContext,
        info: &ActionInfo,
        args: &KustoQueryArgs,
        err: crate::error::BoxError,
    ) -> Result<(bool, Option<Value>), ActionError> {
        ctx.increment_counter(
            "Kusto Query Errors",
            Some(&info.tag),
            args.counter_suffix.as_deref(),
            1,
        );
        ctx.report_action_error(
            "error",
            &info.action_type,
            &info.tag,
            &err.to_string(),
            BTreeMap::new(),
        );
        Err(ActionError::external(err))
    }
}
