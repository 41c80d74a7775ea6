//! Lineage Extractor - table-level lineage for SQL tasks
//!
//! For a finished SQL task the extractor works out which tables it read and
//! wrote, looks up their column schemas in the live database catalog, and
//! emits a [`TaskMetadata`] lineage record:
//!
//! - **References**: the task SQL is parsed with `sqlparser` into read and
//!   write table sets
//! - **Schemas**: per-table catalog lookups, bounded and retried, never fatal
//! - **Assembly**: datasets named `<database>.<schema>.<table>` plus job facets
//!
//! Tasks are dispatched by type through an [`ExtractorRegistry`].

pub mod config;
pub mod connection;
pub mod db;
pub mod error;
pub mod extractors;
pub mod introspection;
pub mod lineage;
pub mod logging;
pub mod models;
pub mod pipeline;
pub mod sql;

pub use config::{CatalogSettings, ExtractorSettings};
pub use connection::{ConnectionParams, ConnectionRegistry, ConnectionResolver};
pub use error::{CatalogError, ExtractError, ExtractResult};
pub use extractors::{
    ExtractorRegistry, ExtractorRegistryBuilder, GenericSqlExtractor, PostgresExtractor,
    SnowflakeExtractor, TaskExtractor,
};
pub use introspection::{CatalogConnector, CatalogQuerier, CatalogRow, SchemaCatalogClient};
pub use lineage::LineageAssembler;
pub use models::{Dataset, DbColumn, DbTableName, DbTableSchema, Source, TaskDescriptor, TaskMetadata};
pub use pipeline::{ExtractionPhase, ExtractionRun};
pub use sql::{SqlDialect, TableReferenceResolver, TableReferences};
