//! Analytics (Kusto) client seam.

use std::collections::BTreeMap;
use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;

use crate::error::BoxError;

/// Options accompanying one query execution. Parameters are already
/// serialized to Kusto literal form by the query action.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct KustoQueryOptions {
    pub parameters: BTreeMap<String, String>,
}

/// Result tables of one query, in result-set order. Each table is a JSON
/// array of row objects.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct QueryDataSet {
    pub tables: Vec<Value>,
}

/// A client bound to one cluster and database.
#[async_trait]
pub trait KustoClient: Send + Sync {
    /// Execute the query, returning the raw row payload.
    async fn execute_query(
        &self,
        query: &str,
        options: &KustoQueryOptions,
    ) -> Result<Value, BoxError>;

    /// Convert a raw row payload into result tables.
    fn to_data_set(&self, rows: Value) -> Result<QueryDataSet, BoxError>;
}

/// Creates clients for a cluster/database pair; `telemetry_tag` labels the
/// client's own diagnostics with the calling action.
pub trait KustoClientFactory: Send + Sync {
    fn create_client(
        &self,
        cluster_url: &str,
        database: &str,
        telemetry_tag: &str,
    ) -> Arc<dyn KustoClient>;
}
