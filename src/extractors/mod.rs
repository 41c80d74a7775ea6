//! Task extractors
//!
//! A [`TaskExtractor`] knows how one family of SQL tasks talks to its
//! database: which dialect the SQL is in, how the connection maps to a
//! lineage source, and how to reach the catalog. The
//! [`ExtractorRegistry`] dispatches tasks to extractors by task type.

pub mod generic;
pub mod postgres;
pub mod registry;
pub mod snowflake;

pub use generic::GenericSqlExtractor;
pub use postgres::PostgresExtractor;
pub use registry::{ExtractorRegistry, ExtractorRegistryBuilder};
pub use snowflake::SnowflakeExtractor;

use crate::connection::{ConnectionParams, ConnectionResolver};
use crate::error::ExtractResult;
use crate::introspection::CatalogConnector;
use crate::models::task::TaskDescriptor;
use crate::sql::SqlDialect;
use async_trait::async_trait;
use std::sync::Arc;

/// Provider-specific capabilities used during extraction
#[async_trait]
pub trait TaskExtractor: Send + Sync {
    /// Task types dispatched to this extractor
    fn task_types(&self) -> &[String];

    /// Provider name used as the lineage source scheme
    fn scheme(&self) -> &str;

    fn dialect(&self) -> SqlDialect;

    /// Schema assumed for unqualified table references
    fn default_schema(&self, params: &ConnectionParams) -> String;

    /// Obtain connection parameters for the task
    async fn resolve_connection_params(
        &self,
        task: &TaskDescriptor,
        resolver: &dyn ConnectionResolver,
    ) -> ExtractResult<ConnectionParams> {
        resolver.resolve(&task.conn_id).await
    }

    /// Scrubbed endpoint identifier, never containing credentials
    fn authority(&self, params: &ConnectionParams) -> String;

    /// Database the task ran against. The task's own setting wins.
    fn database(&self, task: &TaskDescriptor, params: &ConnectionParams) -> Option<String> {
        task.database.clone().or_else(|| params.database.clone())
    }

    /// Provider query ids exposed by the task
    fn discover_query_ids(&self, _task: &TaskDescriptor) -> Vec<String> {
        Vec::new()
    }

    /// Connector used to open the catalog connection
    fn catalog(&self) -> Arc<dyn CatalogConnector>;
}
