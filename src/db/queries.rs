//! Catalog query builders
//!
//! Every catalog query returns rows shaped
//! `(table_schema, table_name, column_name, ordinal_position, data_type)`.

use crate::models::table::DbTableName;
use crate::sql::SqlDialect;
use once_cell::sync::Lazy;
use regex::Regex;

/// Identifiers that never need quoting
static PLAIN_IDENTIFIER: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[A-Za-z_][A-Za-z0-9_$]*$").expect("valid identifier regex"));

/// Column lookup against PostgreSQL's information schema. Domain-typed
/// columns are cast so they decode as plain text/int4.
const POSTGRES_COLUMNS: &str = r#"
    SELECT
        c.table_schema::text,
        c.table_name::text,
        c.column_name::text,
        c.ordinal_position::int4,
        c.data_type::text
    FROM information_schema.columns c
    WHERE lower(c.table_schema) = lower({schema})
        AND lower(c.table_name) = lower({table})
    ORDER BY c.table_schema, c.table_name, c.ordinal_position
"#;

/// Column lookup against a Snowflake database's information schema.
/// Filters on table name only; the schema is picked from the returned rows.
const SNOWFLAKE_COLUMNS: &str = r#"
    SELECT
        table_schema,
        table_name,
        column_name,
        ordinal_position,
        data_type
    FROM {database}.information_schema.columns
    WHERE UPPER(table_name) = UPPER({table})
    ORDER BY table_schema, table_name, ordinal_position
"#;

const GENERIC_COLUMNS: &str = r#"
    SELECT
        table_schema,
        table_name,
        column_name,
        ordinal_position,
        data_type
    FROM information_schema.columns
    WHERE LOWER(table_name) = LOWER({table}){schema_filter}
    ORDER BY table_schema, table_name, ordinal_position
"#;

/// SQL builder for safe identifier and literal quoting
pub struct SqlBuilder;

impl SqlBuilder {
    /// Quote an identifier (table/column name) safely
    pub fn quote_ident(ident: &str) -> String {
        format!("\"{}\"", ident.replace('"', "\"\""))
    }

    /// Leave plain identifiers bare so the engine applies its own case
    /// folding; quote everything else
    pub fn ident_if_needed(ident: &str) -> String {
        if PLAIN_IDENTIFIER.is_match(ident) {
            ident.to_string()
        } else {
            Self::quote_ident(ident)
        }
    }

    /// Quote a string literal
    pub fn quote_literal(value: &str) -> String {
        format!("'{}'", value.replace('\'', "''"))
    }

    /// Build the catalog column query for one table
    pub fn columns_query(
        dialect: SqlDialect,
        database: &str,
        table: &DbTableName,
        default_schema: &str,
    ) -> String {
        let table_literal = Self::quote_literal(&table.name);
        match dialect {
            SqlDialect::Postgres => {
                let schema = table.schema_name.as_deref().unwrap_or(default_schema);
                POSTGRES_COLUMNS
                    .replace("{schema}", &Self::quote_literal(schema))
                    .replace("{table}", &table_literal)
            }
            SqlDialect::Snowflake => {
                let database = table.database.as_deref().unwrap_or(database);
                SNOWFLAKE_COLUMNS
                    .replace("{database}", &Self::ident_if_needed(database))
                    .replace("{table}", &table_literal)
            }
            SqlDialect::Generic => {
                let schema_filter = table
                    .schema_name
                    .as_deref()
                    .map(|schema| {
                        format!(
                            "\n        AND LOWER(table_schema) = LOWER({})",
                            Self::quote_literal(schema)
                        )
                    })
                    .unwrap_or_default();
                GENERIC_COLUMNS
                    .replace("{table}", &table_literal)
                    .replace("{schema_filter}", &schema_filter)
            }
        }
    }
}
