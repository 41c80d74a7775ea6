//! Job facets attached to lineage records

use serde::Serialize;

/// Facet key for provider-assigned query identifiers
pub const EXTERNAL_QUERY_FACET: &str = "externalQuery";

/// Facet key for the task SQL
pub const SQL_FACET: &str = "sql";

const FACET_SCHEMA_BASE: &str = "https://openlineage.io/spec/facets";
const EXTERNAL_QUERY_SCHEMA_VERSION: &str = "1-0-2";
const SQL_SCHEMA_VERSION: &str = "1-0-1";

/// Provider query id (e.g. a Snowflake query id) linked to the task run
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ExternalQueryFacet {
    #[serde(rename = "_producer")]
    pub producer: String,
    #[serde(rename = "_schemaURL")]
    pub schema_url: String,
    pub external_query_id: String,
    /// Namespace of the source that ran the query
    pub source: String,
}

impl ExternalQueryFacet {
    pub fn new(producer: &str, external_query_id: impl Into<String>, source: impl Into<String>) -> Self {
        Self {
            producer: producer.to_string(),
            schema_url: schema_url("ExternalQueryRunFacet", EXTERNAL_QUERY_SCHEMA_VERSION),
            external_query_id: external_query_id.into(),
            source: source.into(),
        }
    }
}

/// The SQL text a task executed
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SqlFacet {
    #[serde(rename = "_producer")]
    pub producer: String,
    #[serde(rename = "_schemaURL")]
    pub schema_url: String,
    pub query: String,
}

impl SqlFacet {
    pub fn new(producer: &str, query: impl Into<String>) -> Self {
        Self {
            producer: producer.to_string(),
            schema_url: schema_url("SQLJobFacet", SQL_SCHEMA_VERSION),
            query: query.into(),
        }
    }
}

/// Payload of a job facet
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(untagged)]
pub enum JobFacet {
    ExternalQuery(ExternalQueryFacet),
    Sql(SqlFacet),
}

impl JobFacet {
    pub fn as_external_query(&self) -> Option<&ExternalQueryFacet> {
        match self {
            JobFacet::ExternalQuery(facet) => Some(facet),
            _ => None,
        }
    }

    pub fn as_sql(&self) -> Option<&SqlFacet> {
        match self {
            JobFacet::Sql(facet) => Some(facet),
            _ => None,
        }
    }
}

fn schema_url(facet: &str, version: &str) -> String {
    format!("{}/{}/{}.json#/$defs/{}", FACET_SCHEMA_BASE, version, facet, facet)
}
