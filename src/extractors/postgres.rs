//! PostgreSQL task extractor

use crate::connection::ConnectionParams;
use crate::db::PostgresCatalogConnector;
use crate::extractors::TaskExtractor;
use crate::introspection::CatalogConnector;
use crate::sql::SqlDialect;
use async_trait::async_trait;
use std::sync::Arc;

pub const POSTGRES_SCHEME: &str = "postgres";
const DEFAULT_SCHEMA: &str = "public";
const DEFAULT_PORT: u16 = 5432;

/// Extractor for tasks running SQL against PostgreSQL
pub struct PostgresExtractor {
    task_types: Vec<String>,
    catalog: Arc<dyn CatalogConnector>,
}

impl Default for PostgresExtractor {
    fn default() -> Self {
        Self {
            task_types: vec![
                "PostgresOperator".to_string(),
                "SQLExecuteQueryOperator".to_string(),
            ],
            catalog: Arc::new(PostgresCatalogConnector::default()),
        }
    }
}

impl PostgresExtractor {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace the catalog connector
    pub fn with_catalog(mut self, catalog: Arc<dyn CatalogConnector>) -> Self {
        self.catalog = catalog;
        self
    }

    /// Replace the task types this extractor claims
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
impl TaskExtractor for PostgresExtractor {
    fn task_types(&self) -> &[String] {
        &self.task_types
    }

    fn scheme(&self) -> &str {
        POSTGRES_SCHEME
    }

    fn dialect(&self) -> SqlDialect {
        SqlDialect::Postgres
    }

    fn default_schema(&self, params: &ConnectionParams) -> String {
        params
            .schema
            .clone()
            .unwrap_or_else(|| DEFAULT_SCHEMA.to_string())
    }

    fn authority(&self, params: &ConnectionParams) -> String {
        format!("{}:{}", params.host, params.port.unwrap_or(DEFAULT_PORT))
    }

    fn catalog(&self) -> Arc<dyn CatalogConnector> {
        self.catalog.clone()
    }
}
