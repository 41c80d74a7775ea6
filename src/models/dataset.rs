//! Dataset and source identity models

use crate::models::table::DbColumn;
use serde::{Serialize, Serializer};
use std::hash::{Hash, Hasher};

/// Identity of a connection endpoint.
///
/// `connection_url` is provenance only: it can carry credentials, so it is
/// masked on serialization and ignored by equality and hashing.
#[derive(Debug, Clone, Serialize)]
pub struct Source {
    pub scheme: String,
    pub authority: String,
    #[serde(serialize_with = "serialize_masked_url")]
    pub connection_url: String,
}

impl Source {
    pub fn new(
        scheme: impl Into<String>,
        authority: impl Into<String>,
        connection_url: impl Into<String>,
    ) -> Self {
        Self {
            scheme: scheme.into(),
            authority: authority.into(),
            connection_url: connection_url.into(),
        }
    }

    /// Lineage namespace, `<scheme>://<authority>`
    pub fn namespace(&self) -> String {
        format!("{}://{}", self.scheme, self.authority)
    }
}

impl PartialEq for Source {
    fn eq(&self, other: &Self) -> bool {
        self.scheme == other.scheme && self.authority == other.authority
    }
}

impl Eq for Source {}

impl Hash for Source {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.scheme.hash(state);
        self.authority.hash(state);
    }
}

/// Replace the password of a URL with `****`. Strings that are not URLs are
/// passed through unchanged.
pub fn mask_url_password(raw: &str) -> String {
    match url::Url::parse(raw) {
        Ok(mut parsed) if parsed.password().is_some() => {
            if parsed.set_password(Some("****")).is_ok() {
                parsed.to_string()
            } else {
                raw.to_string()
            }
        }
        _ => raw.to_string(),
    }
}

fn serialize_masked_url<S: Serializer>(url: &str, serializer: S) -> Result<S::Ok, S::Error> {
    serializer.serialize_str(&mask_url_password(url))
}

/// A table-like entity read or written by a task
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Dataset {
    /// `<database>.<schema>.<table>`
    pub name: String,
    pub source: Source,
    pub fields: Vec<DbColumn>,
}

impl Dataset {
    pub fn new(
        source: Source,
        database: &str,
        schema: &str,
        table: &str,
        fields: Vec<DbColumn>,
    ) -> Self {
        Self {
            name: Self::qualified_name(database, schema, table),
            source,
            fields,
        }
    }

    pub fn qualified_name(database: &str, schema: &str, table: &str) -> String {
        format!("{}.{}.{}", database, schema, table)
    }

    /// Split a dataset name back into `(database, schema, table)`
    pub fn split_name(name: &str) -> Option<(&str, &str, &str)> {
        let mut parts = name.splitn(3, '.');
        let database = parts.next()?;
        let schema = parts.next()?;
        let table = parts.next()?;
        if database.is_empty() || schema.is_empty() || table.is_empty() || table.contains('.') {
            return None;
        }
        Some((database, schema, table))
    }
}
