//! Extractor configuration module
//!
//! Handles loading and validating extractor settings from environment
//! variables. Settings are an explicit value handed to the registry; nothing
//! here is process-global.

use serde::Deserialize;
use std::time::Duration;
use thiserror::Error;
use validator::Validate;

/// Default `_producer` written into every facet
pub const DEFAULT_PRODUCER: &str = "https://github.com/lineage-extractor/lineage-extractor";

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to load environment variables: {0}")]
    EnvLoad(#[from] dotenvy::Error),

    #[error("Invalid configuration value for {var}: {value}")]
    InvalidValue { var: String, value: String },

    #[error("Failed to parse settings: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("Configuration failed validation: {0}")]
    Validation(#[from] validator::ValidationErrors),
}

/// Catalog lookup tuning
#[derive(Debug, Clone, Deserialize, Validate)]
#[serde(default)]
pub struct CatalogSettings {
    /// Retries after the first attempt for transient failures
    #[validate(range(max = 10, message = "At most 10 retries are allowed"))]
    pub max_retries: u32,

    /// Base backoff in milliseconds, doubled on every retry
    #[validate(range(min = 1, max = 60000))]
    pub backoff_ms: u64,

    /// Per-query timeout in milliseconds
    #[validate(range(min = 1))]
    pub query_timeout_ms: u64,

    /// Worker pool size for per-table lookups
    #[validate(range(min = 1, max = 64, message = "Concurrency must be between 1 and 64"))]
    pub max_concurrent_lookups: usize,
}

impl Default for CatalogSettings {
    fn default() -> Self {
        Self {
            max_retries: 3,
            backoff_ms: 200,
            query_timeout_ms: 30_000,
            max_concurrent_lookups: 4,
        }
    }
}

impl CatalogSettings {
    pub fn backoff(&self) -> Duration {
        Duration::from_millis(self.backoff_ms)
    }

    pub fn query_timeout(&self) -> Duration {
        Duration::from_millis(self.query_timeout_ms)
    }
}

/// Complete extractor settings
#[derive(Debug, Clone, Deserialize, Validate)]
#[serde(default)]
pub struct ExtractorSettings {
    #[validate(nested)]
    pub catalog: CatalogSettings,

    /// Attach resolved column schemas to input datasets. When false, only
    /// outputs carry fields.
    pub attach_input_schemas: bool,

    #[validate(url)]
    pub producer: String,
}

impl Default for ExtractorSettings {
    fn default() -> Self {
        Self {
            catalog: CatalogSettings::default(),
            attach_input_schemas: true,
            producer: DEFAULT_PRODUCER.to_string(),
        }
    }
}

impl ExtractorSettings {
    /// Load settings from environment variables
    pub fn load() -> Result<Self, ConfigError> {
        // Load .env file if it exists (ignore errors if file not found)
        let _ = dotenvy::dotenv();
        Self::from_lookup(|var| std::env::var(var).ok())
    }

    /// Parse settings from a JSON document. Missing keys keep their defaults.
    pub fn from_json(raw: &str) -> Result<Self, ConfigError> {
        let settings: Self = serde_json::from_str(raw)?;
        settings.validate()?;
        Ok(settings)
    }

    /// Build settings from an arbitrary variable lookup, falling back to
    /// defaults for unset variables
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Self::default();

        let catalog = CatalogSettings {
            max_retries: parse_var(&lookup, "LINEAGE_CATALOG_MAX_RETRIES")?
                .unwrap_or(defaults.catalog.max_retries),
            backoff_ms: parse_var(&lookup, "LINEAGE_CATALOG_BACKOFF_MS")?
                .unwrap_or(defaults.catalog.backoff_ms),
            query_timeout_ms: parse_var(&lookup, "LINEAGE_CATALOG_TIMEOUT_MS")?
                .unwrap_or(defaults.catalog.query_timeout_ms),
            max_concurrent_lookups: parse_var(&lookup, "LINEAGE_CATALOG_CONCURRENCY")?
                .unwrap_or(defaults.catalog.max_concurrent_lookups),
        };

        let settings = Self {
            catalog,
            attach_input_schemas: parse_var(&lookup, "LINEAGE_ATTACH_INPUT_SCHEMAS")?
                .unwrap_or(defaults.attach_input_schemas),
            producer: lookup("LINEAGE_PRODUCER").unwrap_or(defaults.producer),
        };

        settings.validate()?;
        Ok(settings)
    }
}

fn parse_var<T, F>(lookup: &F, var: &str) -> Result<Option<T>, ConfigError>
where
    T: std::str::FromStr,
    F: Fn(&str) -> Option<String>,
{
    match lookup(var) {
        None => Ok(None),
        Some(raw) => raw
            .trim()
            .parse()
            .map(Some)
            .map_err(|_| ConfigError::InvalidValue {
                var: var.to_string(),
                value: raw,
            }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup_from(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |var| map.get(var).cloned()
    }

    #[test]
    fn test_default_settings() {
        let settings = ExtractorSettings::default();
        assert_eq!(settings.catalog.max_retries, 3);
        assert_eq!(settings.catalog.max_concurrent_lookups, 4);
        assert!(settings.attach_input_schemas);
        assert!(settings.validate().is_ok());
    }

    #[test]
    fn test_lookup_overrides() {
        let settings = ExtractorSettings::from_lookup(lookup_from(&[
            ("LINEAGE_CATALOG_MAX_RETRIES", "5"),
            ("LINEAGE_CATALOG_CONCURRENCY", "8"),
            ("LINEAGE_ATTACH_INPUT_SCHEMAS", "false"),
        ]))
        .unwrap();

        assert_eq!(settings.catalog.max_retries, 5);
        assert_eq!(settings.catalog.max_concurrent_lookups, 8);
        assert_eq!(settings.catalog.backoff(), Duration::from_millis(200));
        assert!(!settings.attach_input_schemas);
    }

    #[test]
    fn test_unparseable_value() {
        let result = ExtractorSettings::from_lookup(lookup_from(&[(
            "LINEAGE_CATALOG_BACKOFF_MS",
            "soon",
        )]));
        assert!(matches!(result, Err(ConfigError::InvalidValue { .. })));
    }

    #[test]
    fn test_json_fills_in_defaults() {
        let settings = ExtractorSettings::from_json(
            r#"{"catalog": {"max_retries": 1}, "attach_input_schemas": false}"#,
        )
        .unwrap();

        assert_eq!(settings.catalog.max_retries, 1);
        assert_eq!(settings.catalog.backoff_ms, 200);
        assert_eq!(settings.catalog.max_concurrent_lookups, 4);
        assert!(!settings.attach_input_schemas);
        assert_eq!(settings.producer, DEFAULT_PRODUCER);
    }

    #[test]
    fn test_json_is_validated() {
        let invalid = ExtractorSettings::from_json(r#"{"catalog": {"max_concurrent_lookups": 0}}"#);
        assert!(matches!(invalid, Err(ConfigError::Validation(_))));

        let malformed = ExtractorSettings::from_json("{not json");
        assert!(matches!(malformed, Err(ConfigError::Parse(_))));
    }

    #[test]
    fn test_zero_concurrency_rejected() {
        let result = ExtractorSettings::from_lookup(lookup_from(&[(
            "LINEAGE_CATALOG_CONCURRENCY",
            "0",
        )]));
        assert!(matches!(result, Err(ConfigError::Validation(_))));
    }
}
