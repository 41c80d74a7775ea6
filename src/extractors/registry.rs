//! Extractor registry and per-task extraction flow

use crate::config::ExtractorSettings;
use crate::connection::{ConnectionParams, ConnectionResolver};
use crate::error::{ExtractError, ExtractResult};
use crate::extractors::TaskExtractor;
use crate::introspection::{with_retry, CatalogScope, SchemaCatalogClient};
use crate::lineage::{AssemblyInput, LineageAssembler};
use crate::models::dataset::Source;
use crate::models::table::{DbTableName, DbTableSchema};
use crate::models::task::{TaskDescriptor, TaskMetadata};
use crate::pipeline::{ExtractionPhase, ExtractionRun};
use crate::sql::{TableReferenceResolver, TableReferences};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, info, info_span, warn, Instrument};

/// Builds an [`ExtractorRegistry`]
#[derive(Default)]
pub struct ExtractorRegistryBuilder {
    settings: ExtractorSettings,
    connections: Option<Arc<dyn ConnectionResolver>>,
    extractors: Vec<Arc<dyn TaskExtractor>>,
}

impl ExtractorRegistryBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_settings(mut self, settings: ExtractorSettings) -> Self {
        self.settings = settings;
        self
    }

    pub fn with_connections(mut self, connections: Arc<dyn ConnectionResolver>) -> Self {
        self.connections = Some(connections);
        self
    }

    pub fn register(mut self, extractor: impl TaskExtractor + 'static) -> Self {
        self.extractors.push(Arc::new(extractor));
        self
    }

    pub fn build(self) -> ExtractResult<ExtractorRegistry> {
        let connections = self
            .connections
            .ok_or_else(|| ExtractError::Config("a connection resolver is required".to_string()))?;

        let mut extractors: HashMap<String, Arc<dyn TaskExtractor>> = HashMap::new();
        for extractor in self.extractors {
            for task_type in extractor.task_types() {
                if extractors.insert(task_type.clone(), extractor.clone()).is_some() {
                    return Err(ExtractError::Config(format!(
                        "task type '{}' is registered more than once",
                        task_type
                    )));
                }
            }
        }

        debug!("Extractor registry built for {} task types", extractors.len());
        Ok(ExtractorRegistry {
            catalog: SchemaCatalogClient::new(self.settings.catalog.clone()),
            assembler: LineageAssembler::new(&self.settings),
            settings: self.settings,
            connections,
            extractors,
        })
    }
}

/// Dispatches tasks to extractors by task type. Immutable once built.
pub struct ExtractorRegistry {
    settings: ExtractorSettings,
    connections: Arc<dyn ConnectionResolver>,
    extractors: HashMap<String, Arc<dyn TaskExtractor>>,
    catalog: SchemaCatalogClient,
    assembler: LineageAssembler,
}

impl ExtractorRegistry {
    pub fn builder() -> ExtractorRegistryBuilder {
        ExtractorRegistryBuilder::new()
    }

    pub fn settings(&self) -> &ExtractorSettings {
        &self.settings
    }

    pub fn supports(&self, task_type: &str) -> bool {
        self.extractors.contains_key(task_type)
    }

    /// Registered task types, sorted
    pub fn task_types(&self) -> Vec<&str> {
        let mut types: Vec<&str> = self.extractors.keys().map(String::as_str).collect();
        types.sort_unstable();
        types
    }

    /// Extract lineage for a finished task
    pub async fn extract(&self, task: &TaskDescriptor) -> ExtractResult<TaskMetadata> {
        self.extract_with_run(task).await.1
    }

    /// Extract lineage and report the phases the extraction went through
    pub async fn extract_with_run(
        &self,
        task: &TaskDescriptor,
    ) -> (ExtractionRun, ExtractResult<TaskMetadata>) {
        let mut run = ExtractionRun::new(task.job_name());

        let Some(extractor) = self.extractors.get(&task.task_type) else {
            debug!("No extractor for task type {}", task.task_type);
            return (run, Err(ExtractError::UnsupportedTask(task.task_type.clone())));
        };

        let span = info_span!("extract_lineage", task = %run.job_name(), task_type = %task.task_type);
        let result = self
            .run_phases(extractor.as_ref(), task, &mut run)
            .instrument(span)
            .await;

        if let Err(e) = &result {
            run.fail(e);
        }
        (run, result)
    }

    async fn run_phases(
        &self,
        extractor: &dyn TaskExtractor,
        task: &TaskDescriptor,
        run: &mut ExtractionRun,
    ) -> ExtractResult<TaskMetadata> {
        run.advance(ExtractionPhase::ResolvingReferences)?;
        let params = extractor
            .resolve_connection_params(task, self.connections.as_ref())
            .await?;
        let database = extractor.database(task, &params).ok_or_else(|| {
            ExtractError::connection(&task.conn_id, "no database in task or connection parameters")
        })?;

        let references = TableReferenceResolver::new(extractor.dialect()).resolve(&task.sql);
        let scope = CatalogScope::new(extractor.dialect(), database, extractor.default_schema(&params));
        let source = Source::new(extractor.scheme(), extractor.authority(&params), params.uri.clone());

        run.advance(ExtractionPhase::FetchingSchemas)?;
        let schemas = self
            .fetch_schemas(extractor, &params, &scope, &references)
            .await;

        run.advance(ExtractionPhase::Assembling)?;
        let query_ids = extractor.discover_query_ids(task);
        let metadata = self.assembler.assemble(&AssemblyInput {
            job_name: run.job_name().to_string(),
            sql: &task.sql,
            source,
            scope: &scope,
            references: &references,
            schemas: &schemas,
            query_ids: &query_ids,
        });

        run.advance(ExtractionPhase::Done)?;
        info!(
            "Extracted lineage for {}: {} inputs, {} outputs",
            metadata.name,
            metadata.inputs.len(),
            metadata.outputs.len()
        );
        Ok(metadata)
    }

    /// Schemas for every referenced table. Catalog trouble only ever costs
    /// field lists.
    async fn fetch_schemas(
        &self,
        extractor: &dyn TaskExtractor,
        params: &ConnectionParams,
        scope: &CatalogScope,
        references: &TableReferences,
    ) -> HashMap<DbTableName, DbTableSchema> {
        let tables: Vec<DbTableName> = references
            .inputs
            .iter()
            .chain(references.outputs.iter())
            .cloned()
            .collect();
        if tables.is_empty() {
            return HashMap::new();
        }

        let connector = extractor.catalog();
        let connected = with_retry(&self.settings.catalog, "Catalog connection", || {
            connector.connect(params)
        })
        .await;
        let querier = match connected {
            Ok(querier) => querier,
            Err(e) => {
                warn!("Catalog connection failed, continuing without fields: {}", e);
                return scope.empty_schemas(&tables);
            }
        };

        // The querier is moved in and released once lookups finish
        self.catalog.fetch_schemas(querier, scope, &tables).await
    }
}
