//! Table, column and schema models

use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::fmt;
use std::hash::{Hash, Hasher};

/// A table reference as written in SQL.
///
/// Equality, ordering and hashing ignore case, so `Public.Discounts` and
/// `public.discounts` are the same table.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DbTableName {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub database: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub schema_name: Option<String>,
    pub name: String,
}

impl DbTableName {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            database: None,
            schema_name: None,
            name: name.into(),
        }
    }

    pub fn with_schema(schema: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            database: None,
            schema_name: Some(schema.into()),
            name: name.into(),
        }
    }

    /// Build from identifier parts. One part is a bare table, two are
    /// `schema.table`, three are `database.schema.table`. Anything longer
    /// keeps the last three parts.
    pub fn from_parts<S: AsRef<str>>(parts: &[S]) -> Option<Self> {
        let parts: Vec<&str> = parts.iter().map(|p| p.as_ref()).collect();
        match parts.as_slice() {
            [] => None,
            [name] => Some(Self::new(*name)),
            [schema, name] => Some(Self::with_schema(*schema, *name)),
            [.., database, schema, name] => Some(Self {
                database: Some(database.to_string()),
                schema_name: Some(schema.to_string()),
                name: name.to_string(),
            }),
        }
    }

    /// Parse a dotted name such as `public.discounts`
    pub fn parse(qualified: &str) -> Option<Self> {
        let parts: Vec<&str> = qualified.split('.').map(str::trim).collect();
        if parts.iter().any(|p| p.is_empty()) {
            return None;
        }
        Self::from_parts(&parts)
    }

    /// Whether `schema` matches this reference's schema, ignoring case
    pub fn schema_matches(&self, schema: &str) -> bool {
        self.schema_name
            .as_deref()
            .is_some_and(|s| s.eq_ignore_ascii_case(schema))
    }

    fn key(&self) -> (Option<String>, Option<String>, String) {
        (
            self.database.as_ref().map(|d| d.to_lowercase()),
            self.schema_name.as_ref().map(|s| s.to_lowercase()),
            self.name.to_lowercase(),
        )
    }
}

impl PartialEq for DbTableName {
    fn eq(&self, other: &Self) -> bool {
        self.key() == other.key()
    }
}

impl Eq for DbTableName {}

impl Hash for DbTableName {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.key().hash(state);
    }
}

impl PartialOrd for DbTableName {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for DbTableName {
    fn cmp(&self, other: &Self) -> Ordering {
        self.key().cmp(&other.key())
    }
}

impl fmt::Display for DbTableName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if let Some(database) = &self.database {
            write!(f, "{}.", database)?;
        }
        if let Some(schema) = &self.schema_name {
            write!(f, "{}.", schema)?;
        }
        write!(f, "{}", self.name)
    }
}

/// Column description from the catalog
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DbColumn {
    pub name: String,
    #[serde(rename = "type")]
    pub data_type: String,
    /// 1-based, unique within a table
    pub ordinal_position: i32,
}

impl DbColumn {
    pub fn new(name: impl Into<String>, data_type: impl Into<String>, ordinal_position: i32) -> Self {
        Self {
            name: name.into(),
            data_type: data_type.into(),
            ordinal_position,
        }
    }
}

/// Column-level schema of one table
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DbTableSchema {
    pub schema_name: String,
    pub table_name: DbTableName,
    /// Ordered by ascending `ordinal_position`
    pub columns: Vec<DbColumn>,
}

impl DbTableSchema {
    /// Schema with no columns, used when the catalog has nothing for a table
    pub fn empty(schema_name: impl Into<String>, table_name: DbTableName) -> Self {
        Self {
            schema_name: schema_name.into(),
            table_name,
            columns: Vec::new(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.columns.is_empty()
    }
}
