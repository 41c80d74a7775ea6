//! Generic SQL extractor for providers without a dedicated variant

use crate::connection::ConnectionParams;
use crate::extractors::TaskExtractor;
use crate::introspection::CatalogConnector;
use crate::sql::SqlDialect;
use async_trait::async_trait;
use std::sync::Arc;

/// Extractor configured entirely by its constructor
pub struct GenericSqlExtractor {
    scheme: String,
    task_types: Vec<String>,
    default_schema: String,
    catalog: Arc<dyn CatalogConnector>,
}

impl GenericSqlExtractor {
    pub fn new<I, S>(scheme: impl Into<String>, task_types: I, catalog: Arc<dyn CatalogConnector>) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            scheme: scheme.into(),
            task_types: task_types.into_iter().map(Into::into).collect(),
            default_schema: "public".to_string(),
            catalog,
        }
    }

    pub fn with_default_schema(mut self, schema: impl Into<String>) -> Self {
        self.default_schema = schema.into();
        self
    }
}

#[async_trait]
impl TaskExtractor for GenericSqlExtractor {
    fn task_types(&self) -> &[String] {
        &self.task_types
    }

    fn scheme(&self) -> &str {
        &self.scheme
    }

    fn dialect(&self) -> SqlDialect {
        SqlDialect::Generic
    }

    fn default_schema(&self, params: &ConnectionParams) -> String {
        params.schema.clone().unwrap_or_else(|| self.default_schema.clone())
    }

    fn authority(&self, params: &ConnectionParams) -> String {
        params.host_port()
    }

    fn catalog(&self) -> Arc<dyn CatalogConnector> {
        self.catalog.clone()
    }
}
