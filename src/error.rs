//! Error handling module
//!
//! Provides the error taxonomy for lineage extraction. Only
//! [`ExtractError`] ever reaches the caller; catalog and parse errors are
//! degraded inside the extraction and logged.

use thiserror::Error;

/// Extraction-level error type
#[derive(Error, Debug)]
pub enum ExtractError {
    /// Connection parameters could not be obtained at all. This is the only
    /// fatal path of an extraction.
    #[error("Connection resolution failed for '{conn_id}': {reason}")]
    ConnectionResolution { conn_id: String, reason: String },

    /// No extractor is registered for the task type
    #[error("No extractor registered for task type: {0}")]
    UnsupportedTask(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Invalid extraction phase transition: {from} -> {to}")]
    InvalidTransition { from: String, to: String },
}

impl ExtractError {
    pub fn connection(conn_id: impl Into<String>, reason: impl std::fmt::Display) -> Self {
        ExtractError::ConnectionResolution {
            conn_id: conn_id.into(),
            reason: reason.to_string(),
        }
    }

    /// Whether this error aborted the extraction after dispatch
    pub fn is_fatal(&self) -> bool {
        matches!(self, ExtractError::ConnectionResolution { .. })
    }
}

/// Catalog lookup error for a single table
#[derive(Error, Debug)]
pub enum CatalogError {
    #[error("Catalog connection error: {0}")]
    Connection(String),

    #[error("Pool error: {0}")]
    Pool(#[from] deadpool_postgres::PoolError),

    #[error("Catalog query error: {0}")]
    Query(String),

    #[error("Catalog query timed out after {0}ms")]
    Timeout(u64),

    #[error("Unexpected catalog row: {0}")]
    Row(String),
}

impl CatalogError {
    /// Transient errors are worth another attempt
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            CatalogError::Connection(_) | CatalogError::Pool(_) | CatalogError::Timeout(_)
        )
    }
}

impl From<tokio_postgres::Error> for CatalogError {
    fn from(e: tokio_postgres::Error) -> Self {
        // A server-side SQLSTATE means the statement itself failed; anything
        // else is a broken or closed connection.
        if e.code().is_some() {
            CatalogError::Query(e.to_string())
        } else {
            CatalogError::Connection(e.to_string())
        }
    }
}

/// SQL text could not be parsed
#[derive(Error, Debug)]
#[error("SQL parse error: {0}")]
pub struct SqlParseError(#[from] pub sqlparser::parser::ParserError);

/// Result type alias for extraction entry points
pub type ExtractResult<T> = Result<T, ExtractError>;

/// Result type alias for catalog lookups
pub type CatalogResult<T> = Result<T, CatalogError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_only_connection_resolution_is_fatal() {
        assert!(ExtractError::connection("db", "missing").is_fatal());
        assert!(!ExtractError::UnsupportedTask("BashOperator".into()).is_fatal());
    }

    #[test]
    fn test_retryable_catalog_errors() {
        assert!(CatalogError::Connection("reset".into()).is_retryable());
        assert!(CatalogError::Timeout(10).is_retryable());
        assert!(!CatalogError::Query("relation does not exist".into()).is_retryable());
        assert!(!CatalogError::Row("bad ordinal".into()).is_retryable());
    }

    #[test]
    fn test_connection_error_message() {
        let err = ExtractError::connection("food_delivery_db", "not registered");
        assert_eq!(
            err.to_string(),
            "Connection resolution failed for 'food_delivery_db': not registered"
        );
    }
}
