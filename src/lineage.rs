//! Lineage assembly
//!
//! Joins resolved table references with their catalog schemas and turns them
//! into the datasets and job facets of a [`TaskMetadata`] record.

use crate::config::ExtractorSettings;
use crate::introspection::CatalogScope;
use crate::models::dataset::{Dataset, Source};
use crate::models::facets::{ExternalQueryFacet, JobFacet, SqlFacet, EXTERNAL_QUERY_FACET, SQL_FACET};
use crate::models::table::{DbTableName, DbTableSchema};
use crate::models::task::TaskMetadata;
use crate::sql::TableReferences;
use std::collections::{BTreeMap, HashMap, HashSet};
use tracing::{debug, warn};

/// Everything one extraction has gathered before assembly
#[derive(Debug)]
pub struct AssemblyInput<'a> {
    pub job_name: String,
    pub sql: &'a str,
    pub source: Source,
    pub scope: &'a CatalogScope,
    pub references: &'a TableReferences,
    pub schemas: &'a HashMap<DbTableName, DbTableSchema>,
    pub query_ids: &'a [String],
}

/// Builds lineage records
#[derive(Debug, Clone)]
pub struct LineageAssembler {
    attach_input_schemas: bool,
    producer: String,
}

impl Default for LineageAssembler {
    fn default() -> Self {
        Self::new(&ExtractorSettings::default())
    }
}

impl LineageAssembler {
    pub fn new(settings: &ExtractorSettings) -> Self {
        Self {
            attach_input_schemas: settings.attach_input_schemas,
            producer: settings.producer.clone(),
        }
    }

    pub fn assemble(&self, input: &AssemblyInput<'_>) -> TaskMetadata {
        let inputs = self.datasets(input, &input.references.inputs, self.attach_input_schemas);
        let outputs = self.datasets(input, &input.references.outputs, true);

        let metadata = TaskMetadata {
            name: input.job_name.clone(),
            inputs,
            outputs,
            job_facets: self.job_facets(input),
        };
        debug!(
            "Assembled lineage for {}: {} inputs, {} outputs, {} facets",
            metadata.name,
            metadata.inputs.len(),
            metadata.outputs.len(),
            metadata.job_facets.len()
        );
        metadata
    }

    /// Datasets for a reference list. Different spellings of one table
    /// resolve to the same name; the first occurrence is kept.
    fn datasets(&self, input: &AssemblyInput<'_>, tables: &[DbTableName], with_fields: bool) -> Vec<Dataset> {
        let mut seen = HashSet::new();
        tables
            .iter()
            .map(|table| self.dataset(input, table, with_fields))
            .filter(|dataset| seen.insert(dataset.name.clone()))
            .collect()
    }

    /// Dataset for one reference. Catalog names win over the names written
    /// in SQL; the reference's own database wins over the connection's.
    fn dataset(&self, input: &AssemblyInput<'_>, table: &DbTableName, with_fields: bool) -> Dataset {
        let found = input.schemas.get(table).filter(|schema| !schema.is_empty());

        let database = table.database.as_deref().unwrap_or(&input.scope.database);
        let schema = found
            .map(|s| s.schema_name.as_str())
            .or(table.schema_name.as_deref())
            .unwrap_or(&input.scope.default_schema);
        let name = found.map(|s| s.table_name.name.as_str()).unwrap_or(&table.name);

        let fields = match found {
            Some(s) if with_fields => s.columns.clone(),
            _ => Vec::new(),
        };

        Dataset::new(input.source.clone(), database, schema, name, fields)
    }

    fn job_facets(&self, input: &AssemblyInput<'_>) -> BTreeMap<String, JobFacet> {
        let mut facets = BTreeMap::new();

        if let Some((first, rest)) = input.query_ids.split_first() {
            if !rest.is_empty() {
                warn!(
                    "{} reported {} query ids, only {} is attached; ignored: {:?}",
                    input.job_name,
                    input.query_ids.len(),
                    first,
                    rest
                );
            }
            facets.insert(
                EXTERNAL_QUERY_FACET.to_string(),
                JobFacet::ExternalQuery(ExternalQueryFacet::new(
                    &self.producer,
                    first.clone(),
                    input.source.namespace(),
                )),
            );
        }

        if !input.sql.trim().is_empty() {
            facets.insert(
                SQL_FACET.to_string(),
                JobFacet::Sql(SqlFacet::new(&self.producer, input.sql)),
            );
        }

        facets
    }
}
