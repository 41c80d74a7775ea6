//! Task input descriptor and lineage output record

use crate::models::dataset::Dataset;
use crate::models::facets::{JobFacet, EXTERNAL_QUERY_FACET};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// What the orchestrator hands over about a finished SQL task
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TaskDescriptor {
    pub pipeline_id: String,
    pub task_id: String,
    /// Operator class name, e.g. `SnowflakeOperator`
    pub task_type: String,
    pub sql: String,
    pub conn_id: String,
    /// Overrides the database from the connection parameters
    #[serde(default)]
    pub database: Option<String>,
    /// Provider query ids exposed after execution
    #[serde(default)]
    pub query_ids: Vec<String>,
}

impl TaskDescriptor {
    pub fn new(
        pipeline_id: impl Into<String>,
        task_id: impl Into<String>,
        task_type: impl Into<String>,
        conn_id: impl Into<String>,
        sql: impl Into<String>,
    ) -> Self {
        Self {
            pipeline_id: pipeline_id.into(),
            task_id: task_id.into(),
            task_type: task_type.into(),
            sql: sql.into(),
            conn_id: conn_id.into(),
            database: None,
            query_ids: Vec::new(),
        }
    }

    pub fn with_database(mut self, database: impl Into<String>) -> Self {
        self.database = Some(database.into());
        self
    }

    pub fn with_query_ids<I, S>(mut self, ids: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.query_ids = ids.into_iter().map(Into::into).collect();
        self
    }

    /// `<pipeline-id>.<task-id>`
    pub fn job_name(&self) -> String {
        format!("{}.{}", self.pipeline_id, self.task_id)
    }
}

/// Lineage record for one task
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TaskMetadata {
    pub name: String,
    pub inputs: Vec<Dataset>,
    pub outputs: Vec<Dataset>,
    /// Ordered so serialization is deterministic
    pub job_facets: BTreeMap<String, JobFacet>,
}

impl TaskMetadata {
    /// Record with no datasets and no facets
    pub fn empty(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            inputs: Vec::new(),
            outputs: Vec::new(),
            job_facets: BTreeMap::new(),
        }
    }

    pub fn external_query_id(&self) -> Option<&str> {
        self.job_facets
            .get(EXTERNAL_QUERY_FACET)
            .and_then(JobFacet::as_external_query)
            .map(|facet| facet.external_query_id.as_str())
    }

    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string(self)
    }
}
