//! Database connection management
//!
//! PostgreSQL catalog connector. Each extraction gets its own small pool,
//! which closes when the last handle to the querier is dropped.

pub mod queries;

use crate::connection::ConnectionParams;
use crate::error::{CatalogError, CatalogResult};
use crate::introspection::{CatalogConnector, CatalogQuerier, CatalogRow};
use async_trait::async_trait;
use deadpool_postgres::{Config, ManagerConfig, Pool, PoolConfig, RecyclingMethod, Runtime};
use std::sync::Arc;
use tokio_postgres::NoTls;
use tracing::{debug, info};

const DEFAULT_PORT: u16 = 5432;

/// `sslmode` values that require an encrypted connection
const TLS_MODES: [&str; 3] = ["require", "verify-ca", "verify-full"];

/// Opens catalog connections to PostgreSQL
#[derive(Debug, Clone)]
pub struct PostgresCatalogConnector {
    max_pool_size: usize,
}

impl Default for PostgresCatalogConnector {
    fn default() -> Self {
        Self { max_pool_size: 4 }
    }
}

impl PostgresCatalogConnector {
    pub fn new(max_pool_size: usize) -> Self {
        Self {
            max_pool_size: max_pool_size.max(1),
        }
    }

    /// Whether the connection asks for TLS
    pub fn use_tls(params: &ConnectionParams) -> bool {
        params
            .option("sslmode")
            .is_some_and(|mode| TLS_MODES.contains(&mode.to_lowercase().as_str()))
            || params.host.ends_with("neon.tech")
    }

    /// Create a connection pool for the given parameters. No connection is
    /// opened until the pool is first used.
    pub fn create_pool(&self, params: &ConnectionParams) -> CatalogResult<Pool> {
        let mut cfg = Config::new();
        cfg.host = Some(params.host.clone());
        cfg.port = Some(params.port.unwrap_or(DEFAULT_PORT));
        cfg.user = Some(params.user.clone()).filter(|u| !u.is_empty());
        cfg.password = Some(params.password.clone()).filter(|p| !p.is_empty());
        cfg.dbname = params.database.clone();
        cfg.manager = Some(ManagerConfig {
            recycling_method: RecyclingMethod::Fast,
        });
        cfg.pool = Some(PoolConfig::new(self.max_pool_size));

        let pool = if Self::use_tls(params) {
            let certs = rustls_native_certs::load_native_certs();
            let mut root_store = rustls::RootCertStore::empty();
            for cert in certs.certs {
                root_store.add(cert).ok();
            }

            let tls_config = rustls::ClientConfig::builder()
                .with_root_certificates(root_store)
                .with_no_client_auth();

            let tls = tokio_postgres_rustls::MakeRustlsConnect::new(tls_config);
            cfg.create_pool(Some(Runtime::Tokio1), tls)
        } else {
            cfg.create_pool(Some(Runtime::Tokio1), NoTls)
        };

        pool.map_err(|e| CatalogError::Connection(format!("Failed to create pool: {}", e)))
    }
}

#[async_trait]
impl CatalogConnector for PostgresCatalogConnector {
    async fn connect(&self, params: &ConnectionParams) -> CatalogResult<Arc<dyn CatalogQuerier>> {
        let pool = self.create_pool(params)?;

        // Test connection
        let client = pool.get().await?;
        client.query_one("SELECT 1", &[]).await?;
        drop(client);

        info!(
            "Catalog connection established to {} (TLS: {})",
            params.host_port(),
            Self::use_tls(params)
        );
        Ok(Arc::new(PostgresCatalog { pool }))
    }
}

/// Catalog querier backed by a PostgreSQL pool
pub struct PostgresCatalog {
    pool: Pool,
}

impl PostgresCatalog {
    pub fn new(pool: Pool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl CatalogQuerier for PostgresCatalog {
    async fn fetch_rows(&self, sql: &str) -> CatalogResult<Vec<CatalogRow>> {
        let client = self.pool.get().await?;
        let rows = client.query(sql, &[]).await?;
        debug!("Catalog query returned {} rows", rows.len());
        rows.iter().map(catalog_row).collect()
    }
}

fn catalog_row(row: &tokio_postgres::Row) -> CatalogResult<CatalogRow> {
    let text = |idx: usize| {
        row.try_get::<_, String>(idx)
            .map_err(|e| CatalogError::Row(format!("column {}: {}", idx, e)))
    };
    let ordinal_position = row
        .try_get::<_, i32>(3)
        .map_err(|e| CatalogError::Row(format!("ordinal_position: {}", e)))?;

    Ok(CatalogRow {
        schema: text(0)?,
        table: text(1)?,
        column: text(2)?,
        ordinal_position,
        data_type: text(4)?,
    })
}
