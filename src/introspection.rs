//! Schema Introspection Module
//!
//! Looks up column-level schemas for resolved table references from a live
//! database catalog. Lookups run per table on a bounded worker pool and never
//! fail the extraction: any table the catalog cannot describe gets an empty
//! schema.

use crate::config::CatalogSettings;
use crate::connection::ConnectionParams;
use crate::db::queries::SqlBuilder;
use crate::error::{CatalogError, CatalogResult};
use crate::models::table::{DbColumn, DbTableName, DbTableSchema};
use crate::sql::SqlDialect;
use async_trait::async_trait;
use rand::Rng;
use std::collections::{BTreeMap, HashMap, HashSet};
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tracing::{debug, warn};

/// One row of catalog column metadata
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CatalogRow {
    pub schema: String,
    pub table: String,
    pub column: String,
    pub ordinal_position: i32,
    pub data_type: String,
}

impl CatalogRow {
    pub fn new(
        schema: impl Into<String>,
        table: impl Into<String>,
        column: impl Into<String>,
        ordinal_position: i32,
        data_type: impl Into<String>,
    ) -> Self {
        Self {
            schema: schema.into(),
            table: table.into(),
            column: column.into(),
            ordinal_position,
            data_type: data_type.into(),
        }
    }
}

/// An open catalog connection
#[async_trait]
pub trait CatalogQuerier: Send + Sync {
    /// Run a catalog query and return its rows
    async fn fetch_rows(&self, sql: &str) -> CatalogResult<Vec<CatalogRow>>;
}

/// Opens catalog connections from connection parameters
#[async_trait]
pub trait CatalogConnector: Send + Sync {
    async fn connect(&self, params: &ConnectionParams) -> CatalogResult<Arc<dyn CatalogQuerier>>;
}

/// Where catalog lookups for one extraction are aimed
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CatalogScope {
    pub dialect: SqlDialect,
    pub database: String,
    pub default_schema: String,
}

impl CatalogScope {
    pub fn new(dialect: SqlDialect, database: impl Into<String>, default_schema: impl Into<String>) -> Self {
        Self {
            dialect,
            database: database.into(),
            default_schema: default_schema.into(),
        }
    }

    /// Placeholder for a table the catalog could not describe
    pub fn empty_schema(&self, table: &DbTableName) -> DbTableSchema {
        let schema = table
            .schema_name
            .clone()
            .unwrap_or_else(|| self.default_schema.clone());
        DbTableSchema::empty(schema, table.clone())
    }

    /// Empty schemas for every table
    pub fn empty_schemas(&self, tables: &[DbTableName]) -> HashMap<DbTableName, DbTableSchema> {
        tables
            .iter()
            .map(|table| (table.clone(), self.empty_schema(table)))
            .collect()
    }
}

/// Fetches table schemas from a catalog connection
#[derive(Debug, Clone, Default)]
pub struct SchemaCatalogClient {
    settings: CatalogSettings,
}

impl SchemaCatalogClient {
    pub fn new(settings: CatalogSettings) -> Self {
        Self { settings }
    }

    pub fn settings(&self) -> &CatalogSettings {
        &self.settings
    }

    /// Fetch the schema of every table. The returned map holds an entry for
    /// each distinct input table; tables without catalog rows map to an
    /// empty schema.
    pub async fn fetch_schemas(
        &self,
        querier: Arc<dyn CatalogQuerier>,
        scope: &CatalogScope,
        tables: &[DbTableName],
    ) -> HashMap<DbTableName, DbTableSchema> {
        let mut seen = HashSet::new();
        let unique: Vec<DbTableName> = tables
            .iter()
            .filter(|table| seen.insert((*table).clone()))
            .cloned()
            .collect();

        let semaphore = Arc::new(Semaphore::new(self.settings.max_concurrent_lookups.max(1)));
        let scope = Arc::new(scope.clone());
        let mut lookups = JoinSet::new();

        for table in unique.iter().cloned() {
            let semaphore = semaphore.clone();
            let querier = querier.clone();
            let scope = scope.clone();
            let settings = self.settings.clone();

            lookups.spawn(async move {
                // The semaphore is never closed, so acquiring only waits
                let _permit = semaphore.acquire_owned().await.ok();
                let schema = lookup_table(querier.as_ref(), &scope, &settings, &table).await;
                (table, schema)
            });
        }

        let mut schemas = HashMap::with_capacity(unique.len());
        while let Some(joined) = lookups.join_next().await {
            match joined {
                Ok((table, schema)) => {
                    schemas.insert(table, schema);
                }
                Err(e) => warn!("Catalog lookup task did not complete: {}", e),
            }
        }

        for table in &unique {
            if !schemas.contains_key(table) {
                schemas.insert(table.clone(), scope.empty_schema(table));
            }
        }

        debug!(
            "Fetched {} schemas, {} with columns",
            schemas.len(),
            schemas.values().filter(|s| !s.is_empty()).count()
        );
        schemas
    }
}

async fn lookup_table(
    querier: &dyn CatalogQuerier,
    scope: &CatalogScope,
    settings: &CatalogSettings,
    table: &DbTableName,
) -> DbTableSchema {
    let sql = SqlBuilder::columns_query(scope.dialect, &scope.database, table, &scope.default_schema);

    match query_with_retry(querier, &sql, settings).await {
        Ok(rows) if rows.is_empty() => {
            debug!("No catalog rows for {}", table);
            scope.empty_schema(table)
        }
        Ok(rows) => match group_rows(table, scope, rows) {
            Some(schema) => {
                debug!("Resolved {} columns for {}", schema.columns.len(), table);
                schema
            }
            None => {
                debug!("Catalog rows did not match {}", table);
                scope.empty_schema(table)
            }
        },
        Err(e) => {
            warn!("Schema lookup failed for {}, continuing without fields: {}", table, e);
            scope.empty_schema(table)
        }
    }
}

/// Run a catalog query, retrying transient failures with exponential backoff
async fn query_with_retry(
    querier: &dyn CatalogQuerier,
    sql: &str,
    settings: &CatalogSettings,
) -> CatalogResult<Vec<CatalogRow>> {
    with_retry(settings, "Catalog query", || querier.fetch_rows(sql)).await
}

/// Run `operation` under the query timeout. Transient failures are retried
/// up to `max_retries` times, doubling the backoff after every attempt.
pub(crate) async fn with_retry<T, F, Fut>(
    settings: &CatalogSettings,
    label: &str,
    mut operation: F,
) -> CatalogResult<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = CatalogResult<T>>,
{
    let mut backoff = settings.backoff();
    let mut attempt = 0;

    loop {
        let result = match tokio::time::timeout(settings.query_timeout(), operation()).await {
            Ok(result) => result,
            Err(_) => Err(CatalogError::Timeout(settings.query_timeout_ms)),
        };

        match result {
            Ok(value) => return Ok(value),
            Err(e) if e.is_retryable() && attempt < settings.max_retries => {
                attempt += 1;
                let delay = backoff + jitter(backoff);
                debug!(
                    "{} failed (attempt {}/{}), retrying in {:?}: {}",
                    label, attempt, settings.max_retries, delay, e
                );
                tokio::time::sleep(delay).await;
                backoff *= 2;
            }
            Err(e) => return Err(e),
        }
    }
}

/// Up to a quarter of the base delay
fn jitter(base: Duration) -> Duration {
    let max_ms = (base.as_millis() as u64 / 4).max(1);
    Duration::from_millis(rand::thread_rng().gen_range(0..max_ms))
}

/// Group rows by `(schema, table)` and build the schema of the best match
fn group_rows(table: &DbTableName, scope: &CatalogScope, rows: Vec<CatalogRow>) -> Option<DbTableSchema> {
    let mut groups: BTreeMap<(String, String), Vec<CatalogRow>> = BTreeMap::new();
    for row in rows {
        if !row.table.eq_ignore_ascii_case(&table.name) {
            continue;
        }
        if row.ordinal_position < 1 {
            debug!("Dropping catalog row with ordinal {} for {}", row.ordinal_position, table);
            continue;
        }
        groups
            .entry((row.schema.clone(), row.table.clone()))
            .or_default()
            .push(row);
    }

    let key = groups
        .keys()
        .find(|(schema, _)| table.schema_matches(schema))
        .or_else(|| {
            groups
                .keys()
                .find(|(schema, _)| schema.eq_ignore_ascii_case(&scope.default_schema))
        })
        .or_else(|| groups.keys().next())
        .cloned()?;

    if groups.len() > 1 {
        debug!("{} matches tables in {} schemas, using {}", table, groups.len(), key.0);
    }

    let mut rows = groups.remove(&key)?;
    // Stable sort, so the first row wins among duplicate ordinals
    rows.sort_by_key(|row| row.ordinal_position);
    let mut ordinals = HashSet::new();
    let columns = rows
        .into_iter()
        .filter(|row| ordinals.insert(row.ordinal_position))
        .map(|row| DbColumn::new(row.column, row.data_type, row.ordinal_position))
        .collect();

    let (schema_name, table_name) = key;
    Some(DbTableSchema {
        schema_name: schema_name.clone(),
        table_name: DbTableName {
            database: table.database.clone(),
            schema_name: Some(schema_name),
            name: table_name,
        },
        columns,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;

    /// Serves canned rows per table name, optionally failing first
    #[derive(Default)]
    struct FakeCatalog {
        rows: HashMap<String, Vec<CatalogRow>>,
        transient_failures: AtomicUsize,
        permanent_failure: bool,
        delay: Option<Duration>,
        calls: AtomicUsize,
        in_flight: AtomicUsize,
        peak_in_flight: AtomicUsize,
        queries: Mutex<Vec<String>>,
    }

    impl FakeCatalog {
        fn with_rows(mut self, table: &str, rows: Vec<CatalogRow>) -> Self {
            self.rows.insert(table.to_string(), rows);
            self
        }
    }

    #[async_trait]
    impl CatalogQuerier for FakeCatalog {
        async fn fetch_rows(&self, sql: &str) -> CatalogResult<Vec<CatalogRow>> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.queries.lock().unwrap().push(sql.to_string());

            let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
            self.peak_in_flight.fetch_max(now, Ordering::SeqCst);
            if let Some(delay) = self.delay {
                tokio::time::sleep(delay).await;
            }
            self.in_flight.fetch_sub(1, Ordering::SeqCst);

            if self.permanent_failure {
                return Err(CatalogError::Query("permission denied".into()));
            }
            let remaining = self.transient_failures.load(Ordering::SeqCst);
            if remaining > 0 {
                self.transient_failures.store(remaining - 1, Ordering::SeqCst);
                return Err(CatalogError::Connection("connection reset".into()));
            }

            Ok(self
                .rows
                .iter()
                .filter(|(table, _)| sql.contains(&format!("'{}'", table)))
                .flat_map(|(_, rows)| rows.clone())
                .collect())
        }
    }

    fn discounts_rows() -> Vec<CatalogRow> {
        vec![
            CatalogRow::new("public", "discounts", "id", 1, "int4"),
            CatalogRow::new("public", "discounts", "amount_off", 2, "int4"),
            CatalogRow::new("public", "discounts", "customer_email", 3, "varchar"),
            CatalogRow::new("public", "discounts", "starts_on", 4, "timestamp"),
            CatalogRow::new("public", "discounts", "ends_on", 5, "timestamp"),
        ]
    }

    fn fast_settings() -> CatalogSettings {
        CatalogSettings {
            max_retries: 3,
            backoff_ms: 1,
            query_timeout_ms: 1_000,
            max_concurrent_lookups: 2,
        }
    }

    fn scope() -> CatalogScope {
        CatalogScope::new(SqlDialect::Snowflake, "food_delivery", "public")
    }

    #[tokio::test]
    async fn test_columns_sorted_by_ordinal() {
        let mut rows = discounts_rows();
        rows.reverse();
        let catalog = Arc::new(FakeCatalog::default().with_rows("discounts", rows));
        let table = DbTableName::with_schema("food_delivery", "discounts");

        let schemas = SchemaCatalogClient::new(fast_settings())
            .fetch_schemas(catalog, &scope(), &[table.clone()])
            .await;

        let schema = &schemas[&table];
        assert_eq!(schema.schema_name, "public");
        assert_eq!(schema.table_name.to_string(), "public.discounts");
        let ordinals: Vec<i32> = schema.columns.iter().map(|c| c.ordinal_position).collect();
        assert_eq!(ordinals, vec![1, 2, 3, 4, 5]);
        assert_eq!(schema.columns[0], DbColumn::new("id", "int4", 1));
    }

    #[tokio::test]
    async fn test_duplicate_ordinals_keep_first_row() {
        let rows = vec![
            CatalogRow::new("public", "orders", "id", 1, "int4"),
            CatalogRow::new("public", "orders", "id_shadow", 1, "text"),
            CatalogRow::new("public", "orders", "placed_on", 2, "timestamp"),
        ];
        let catalog = Arc::new(FakeCatalog::default().with_rows("orders", rows));
        let table = DbTableName::new("orders");

        let schemas = SchemaCatalogClient::new(fast_settings())
            .fetch_schemas(catalog, &scope(), &[table.clone()])
            .await;

        let names: Vec<&str> = schemas[&table].columns.iter().map(|c| c.name.as_str()).collect();
        assert_eq!(names, vec!["id", "placed_on"]);
    }

    #[tokio::test]
    async fn test_schema_selection_across_groups() {
        let rows = vec![
            CatalogRow::new("archive", "orders", "legacy_id", 1, "int4"),
            CatalogRow::new("public", "orders", "id", 1, "int4"),
            CatalogRow::new("staging", "orders", "raw", 1, "variant"),
        ];
        let catalog = Arc::new(FakeCatalog::default().with_rows("orders", rows));
        let client = SchemaCatalogClient::new(fast_settings());

        let staged = DbTableName::with_schema("staging", "orders");
        let bare = DbTableName::new("orders");
        let schemas = client
            .fetch_schemas(catalog, &scope(), &[staged.clone(), bare.clone()])
            .await;

        assert_eq!(schemas[&staged].schema_name, "staging");
        // Default schema wins when the reference names none
        assert_eq!(schemas[&bare].schema_name, "public");
    }

    #[tokio::test]
    async fn test_missing_table_gets_empty_schema() {
        let catalog = Arc::new(FakeCatalog::default());
        let table = DbTableName::with_schema("sales", "nowhere");

        let schemas = SchemaCatalogClient::new(fast_settings())
            .fetch_schemas(catalog, &scope(), &[table.clone()])
            .await;

        assert!(schemas[&table].is_empty());
        assert_eq!(schemas[&table].schema_name, "sales");
    }

    #[tokio::test]
    async fn test_transient_errors_are_retried() {
        let catalog = Arc::new(FakeCatalog {
            transient_failures: AtomicUsize::new(2),
            ..FakeCatalog::default().with_rows("discounts", discounts_rows())
        });
        let table = DbTableName::new("discounts");

        let schemas = SchemaCatalogClient::new(fast_settings())
            .fetch_schemas(catalog.clone(), &scope(), &[table.clone()])
            .await;

        assert_eq!(schemas[&table].columns.len(), 5);
        assert_eq!(catalog.calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_retries_exhausted_degrade_to_empty() {
        let catalog = Arc::new(FakeCatalog {
            transient_failures: AtomicUsize::new(10),
            ..FakeCatalog::default().with_rows("discounts", discounts_rows())
        });
        let table = DbTableName::new("discounts");

        let schemas = SchemaCatalogClient::new(fast_settings())
            .fetch_schemas(catalog.clone(), &scope(), &[table.clone()])
            .await;

        assert!(schemas[&table].is_empty());
        // First attempt plus three retries
        assert_eq!(catalog.calls.load(Ordering::SeqCst), 4);
    }

    #[tokio::test]
    async fn test_permanent_errors_not_retried() {
        let catalog = Arc::new(FakeCatalog {
            permanent_failure: true,
            ..FakeCatalog::default()
        });
        let table = DbTableName::new("discounts");

        let schemas = SchemaCatalogClient::new(fast_settings())
            .fetch_schemas(catalog.clone(), &scope(), &[table.clone()])
            .await;

        assert!(schemas[&table].is_empty());
        assert_eq!(catalog.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_timeout_degrades_to_empty() {
        let catalog = Arc::new(FakeCatalog {
            delay: Some(Duration::from_millis(200)),
            ..FakeCatalog::default().with_rows("discounts", discounts_rows())
        });
        let settings = CatalogSettings {
            max_retries: 0,
            query_timeout_ms: 10,
            ..fast_settings()
        };
        let table = DbTableName::new("discounts");

        let schemas = SchemaCatalogClient::new(settings)
            .fetch_schemas(catalog, &scope(), &[table.clone()])
            .await;

        assert!(schemas[&table].is_empty());
    }

    #[tokio::test]
    async fn test_lookups_are_bounded() {
        let mut catalog = FakeCatalog {
            delay: Some(Duration::from_millis(20)),
            ..FakeCatalog::default()
        };
        let tables: Vec<DbTableName> = (0..6).map(|i| DbTableName::new(format!("t{}", i))).collect();
        for table in &tables {
            catalog = catalog.with_rows(&table.name, vec![CatalogRow::new("public", &table.name, "id", 1, "int4")]);
        }
        let catalog = Arc::new(catalog);

        let schemas = SchemaCatalogClient::new(fast_settings())
            .fetch_schemas(catalog.clone(), &scope(), &tables)
            .await;

        assert_eq!(schemas.len(), 6);
        assert!(schemas.values().all(|s| s.columns.len() == 1));
        assert!(catalog.peak_in_flight.load(Ordering::SeqCst) <= 2);
    }

    #[tokio::test]
    async fn test_duplicate_references_queried_once() {
        let catalog = Arc::new(FakeCatalog::default().with_rows("discounts", discounts_rows()));
        let tables = vec![
            DbTableName::with_schema("public", "discounts"),
            DbTableName::with_schema("PUBLIC", "DISCOUNTS"),
        ];

        let schemas = SchemaCatalogClient::new(fast_settings())
            .fetch_schemas(catalog.clone(), &scope(), &tables)
            .await;

        assert_eq!(schemas.len(), 1);
        assert_eq!(catalog.calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_jitter_is_bounded() {
        let base = Duration::from_millis(200);
        for _ in 0..100 {
            assert!(jitter(base) < Duration::from_millis(50));
        }
        assert_eq!(jitter(Duration::from_millis(1)), Duration::ZERO);
    }
}
