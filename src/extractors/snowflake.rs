//! Snowflake task extractor
//!
//! Snowflake tasks expose the query ids they ran, which are attached to the
//! lineage record. There is no built-in Snowflake catalog driver; hosts
//! supply a [`CatalogConnector`] that can run queries against the account.

use crate::connection::ConnectionParams;
use crate::extractors::TaskExtractor;
use crate::introspection::CatalogConnector;
use crate::models::task::TaskDescriptor;
use crate::sql::SqlDialect;
use async_trait::async_trait;
use std::sync::Arc;

pub const SNOWFLAKE_SCHEME: &str = "snowflake";
const DEFAULT_SCHEMA: &str = "PUBLIC";

pub struct SnowflakeExtractor {
    task_types: Vec<String>,
    catalog: Arc<dyn CatalogConnector>,
}

impl SnowflakeExtractor {
    pub fn new(catalog: Arc<dyn CatalogConnector>) -> Self {
        Self {
            task_types: vec!["SnowflakeOperator".to_string()],
            catalog,
        }
    }

    pub fn with_task_types<I, S>(mut self, task_types: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.task_types = task_types.into_iter().map(Into::into).collect();
        self
    }
}

#[async_trait]
impl TaskExtractor for SnowflakeExtractor {
    fn task_types(&self) -> &[String] {
        &self.task_types
    }

    fn scheme(&self) -> &str {
        SNOWFLAKE_SCHEME
    }

    fn dialect(&self) -> SqlDialect {
        SqlDialect::Snowflake
    }

    fn default_schema(&self, params: &ConnectionParams) -> String {
        params
            .option("schema")
            .map(String::from)
            .or_else(|| params.schema.clone())
            .unwrap_or_else(|| DEFAULT_SCHEMA.to_string())
    }

    /// The account identifier, else the first label of the host
    /// (`xy12345` in `xy12345.eu-west-1.snowflakecomputing.com`)
    fn authority(&self, params: &ConnectionParams) -> String {
        match params.option("account") {
            Some(account) => account.to_string(),
            None => params
                .host
                .split('.')
                .next()
                .unwrap_or(&params.host)
                .to_string(),
        }
    }

    fn database(&self, task: &TaskDescriptor, params: &ConnectionParams) -> Option<String> {
        task.database
            .clone()
            .or_else(|| params.option("database").map(String::from))
            .or_else(|| params.database.clone())
    }

    fn discover_query_ids(&self, task: &TaskDescriptor) -> Vec<String> {
        task.query_ids
            .iter()
            .filter(|id| !id.trim().is_empty())
            .cloned()
            .collect()
    }

    fn catalog(&self) -> Arc<dyn CatalogConnector> {
        self.catalog.clone()
    }
}
