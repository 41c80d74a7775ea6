//! Table reference resolution
//!
//! Walks the `sqlparser` AST of a task's SQL and splits the relations it
//! touches into read tables and write tables.

use crate::error::SqlParseError;
use crate::models::table::DbTableName;
use sqlparser::ast::{
    FromTable, Ident, ObjectName, Query, Statement, TableFactor, TableWithJoins, Visit, Visitor,
};
use sqlparser::dialect::{Dialect, GenericDialect, PostgreSqlDialect, SnowflakeDialect};
use sqlparser::parser::Parser;
use std::collections::HashSet;
use std::ops::ControlFlow;
use tracing::{debug, warn};

/// SQL dialect used to parse task SQL
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SqlDialect {
    #[default]
    Generic,
    Postgres,
    Snowflake,
}

impl SqlDialect {
    fn parser_dialect(&self) -> Box<dyn Dialect> {
        match self {
            SqlDialect::Generic => Box::new(GenericDialect {}),
            SqlDialect::Postgres => Box::new(PostgreSqlDialect {}),
            SqlDialect::Snowflake => Box::new(SnowflakeDialect {}),
        }
    }
}

/// Ordered, deduplicated tables read and written by a piece of SQL
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TableReferences {
    pub inputs: Vec<DbTableName>,
    pub outputs: Vec<DbTableName>,
}

impl TableReferences {
    pub fn is_empty(&self) -> bool {
        self.inputs.is_empty() && self.outputs.is_empty()
    }
}

/// Resolves table references from raw SQL
#[derive(Debug, Clone, Copy, Default)]
pub struct TableReferenceResolver {
    dialect: SqlDialect,
}

impl TableReferenceResolver {
    pub fn new(dialect: SqlDialect) -> Self {
        Self { dialect }
    }

    /// Resolve read and write tables. Unparseable SQL yields empty sets.
    pub fn resolve(&self, sql: &str) -> TableReferences {
        match self.try_resolve(sql) {
            Ok(refs) => refs,
            Err(e) => {
                warn!("Could not parse task SQL, no table references extracted: {}", e);
                TableReferences::default()
            }
        }
    }

    /// Resolve, surfacing parse failures to the caller
    pub fn try_resolve(&self, sql: &str) -> Result<TableReferences, SqlParseError> {
        let dialect = self.dialect.parser_dialect();
        let statements = Parser::parse_sql(dialect.as_ref(), sql)?;

        let mut collector = ReferenceCollector::default();
        for statement in &statements {
            collector.statement(statement);
        }

        let refs = collector.finish();
        debug!(
            "Resolved {} input and {} output tables from {} statements",
            refs.inputs.len(),
            refs.outputs.len(),
            statements.len()
        );
        Ok(refs)
    }
}

#[derive(Default)]
struct ReferenceCollector {
    reads: Vec<ObjectName>,
    writes: Vec<ObjectName>,
    /// CTE names declared by each query currently being walked, innermost last
    cte_scopes: Vec<HashSet<String>>,
}

impl ReferenceCollector {
    fn statement(&mut self, statement: &Statement) {
        match statement {
            Statement::Query(query) => self.read(query.as_ref()),
            Statement::Insert(insert) => {
                self.writes.push(insert.table_name.clone());
                if let Some(source) = &insert.source {
                    self.read(source.as_ref());
                }
            }
            Statement::Update {
                table,
                assignments,
                from,
                selection,
                ..
            } => {
                self.write_factor(&table.relation);
                for join in &table.joins {
                    self.read(&join.relation);
                }
                self.read(assignments);
                if let Some(from) = from {
                    self.read(from);
                }
                if let Some(selection) = selection {
                    self.read(selection);
                }
            }
            Statement::Merge {
                table, source, on, ..
            } => {
                self.write_factor(table);
                self.read(source);
                self.read(on.as_ref());
            }
            Statement::Delete(delete) => {
                let targets = match &delete.from {
                    FromTable::WithFromKeyword(tables) | FromTable::WithoutKeyword(tables) => tables,
                };
                for target in targets {
                    self.write_joined(target);
                }
                if let Some(using) = &delete.using {
                    self.read(using);
                }
                if let Some(selection) = &delete.selection {
                    self.read(selection);
                }
            }
            Statement::CreateTable(create) => {
                self.writes.push(create.name.clone());
                if let Some(query) = &create.query {
                    self.read(query.as_ref());
                }
            }
            Statement::CreateView { name, query, .. } => {
                self.writes.push(name.clone());
                self.read(query.as_ref());
            }
            other => {
                debug!("Skipping statement without table lineage: {}", statement_kind(other));
            }
        }
    }

    /// Collect every relation under `node` as a read
    fn read<V: Visit>(&mut self, node: &V) {
        let _ = node.visit(self);
    }

    fn write_factor(&mut self, factor: &TableFactor) {
        if let TableFactor::Table { name, .. } = factor {
            self.writes.push(name.clone());
        }
    }

    fn write_joined(&mut self, target: &TableWithJoins) {
        self.write_factor(&target.relation);
        for join in &target.joins {
            self.read(&join.relation);
        }
    }

    /// Whether a single-part name refers to a CTE visible at this point
    fn is_cte(&self, relation: &ObjectName) -> bool {
        match relation.0.as_slice() {
            [ident] => {
                let name = normalize(ident);
                self.cte_scopes.iter().any(|scope| scope.contains(&name))
            }
            _ => false,
        }
    }

    fn finish(self) -> TableReferences {
        let convert = |names: Vec<ObjectName>| -> Vec<DbTableName> {
            let mut seen = HashSet::new();
            names
                .iter()
                .filter_map(|name| {
                    let parts: Vec<&str> = name.0.iter().map(|ident| ident.value.as_str()).collect();
                    DbTableName::from_parts(&parts)
                })
                .filter(|table| seen.insert(table.clone()))
                .collect()
        };

        TableReferences {
            inputs: convert(self.reads),
            outputs: convert(self.writes),
        }
    }
}

impl Visitor for ReferenceCollector {
    type Break = ();

    fn pre_visit_query(&mut self, query: &Query) -> ControlFlow<Self::Break> {
        let names = query
            .with
            .iter()
            .flat_map(|with| with.cte_tables.iter())
            .map(|cte| normalize(&cte.alias.name))
            .collect();
        self.cte_scopes.push(names);
        ControlFlow::Continue(())
    }

    fn post_visit_query(&mut self, _query: &Query) -> ControlFlow<Self::Break> {
        self.cte_scopes.pop();
        ControlFlow::Continue(())
    }

    fn pre_visit_relation(&mut self, relation: &ObjectName) -> ControlFlow<Self::Break> {
        if !self.is_cte(relation) {
            self.reads.push(relation.clone());
        }
        ControlFlow::Continue(())
    }
}

fn normalize(ident: &Ident) -> String {
    ident.value.to_lowercase()
}

fn statement_kind(statement: &Statement) -> &'static str {
    match statement {
        Statement::Commit { .. } => "COMMIT",
        Statement::Rollback { .. } => "ROLLBACK",
        Statement::StartTransaction { .. } => "BEGIN",
        Statement::SetVariable { .. } => "SET",
        Statement::Use { .. } => "USE",
        Statement::Drop { .. } => "DROP",
        Statement::Truncate { .. } => "TRUNCATE",
        Statement::AlterTable { .. } => "ALTER TABLE",
        Statement::Copy { .. } => "COPY",
        Statement::Grant { .. } => "GRANT",
        Statement::Explain { .. } => "EXPLAIN",
        _ => "other",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn names(tables: &[DbTableName]) -> Vec<String> {
        tables.iter().map(|t| t.to_string()).collect()
    }

    #[test]
    fn test_select_from_qualified_table() {
        let refs = TableReferenceResolver::new(SqlDialect::Snowflake)
            .resolve("SELECT * FROM food_delivery.discounts;");

        assert_eq!(refs.inputs, vec![DbTableName::with_schema("food_delivery", "discounts")]);
        assert!(refs.outputs.is_empty());
    }

    #[test]
    fn test_joins_and_subqueries() {
        let sql = "SELECT o.id FROM orders o \
                   JOIN customers c ON o.customer_id = c.id \
                   WHERE o.id IN (SELECT order_id FROM delays)";
        let refs = TableReferenceResolver::default().resolve(sql);

        assert_eq!(names(&refs.inputs), vec!["orders", "customers", "delays"]);
    }

    #[test]
    fn test_insert_select() {
        let sql = "INSERT INTO analytics.top_delivery_times (order_id, placed_on) \
                   SELECT order_id, placed_on FROM public.delivery_7_days";
        let refs = TableReferenceResolver::new(SqlDialect::Postgres).resolve(sql);

        assert_eq!(names(&refs.outputs), vec!["analytics.top_delivery_times"]);
        assert_eq!(names(&refs.inputs), vec!["public.delivery_7_days"]);
    }

    #[test]
    fn test_ctes_are_not_tables() {
        let sql = "WITH recent AS (SELECT * FROM orders WHERE placed_on > now()) \
                   SELECT * FROM recent JOIN customers USING (customer_id)";
        let refs = TableReferenceResolver::new(SqlDialect::Postgres).resolve(sql);

        assert_eq!(names(&refs.inputs), vec!["orders", "customers"]);
    }

    #[test]
    fn test_cte_names_stay_in_their_query() {
        let sql = "WITH orders AS (SELECT * FROM raw.orders) SELECT * FROM orders; \
                   SELECT * FROM orders";
        let refs = TableReferenceResolver::new(SqlDialect::Postgres).resolve(sql);

        assert_eq!(names(&refs.inputs), vec!["raw.orders", "orders"]);
    }

    #[test]
    fn test_nested_cte_is_visible_in_subquery() {
        let sql = "WITH recent AS (SELECT * FROM orders) \
                   SELECT * FROM customers WHERE id IN (SELECT customer_id FROM recent)";
        let refs = TableReferenceResolver::new(SqlDialect::Postgres).resolve(sql);

        assert_eq!(names(&refs.inputs), vec!["orders", "customers"]);
    }

    #[test]
    fn test_update_from() {
        let sql = "UPDATE discounts SET amount_off = s.amount FROM staging.discounts s WHERE discounts.id = s.id";
        let refs = TableReferenceResolver::new(SqlDialect::Postgres).resolve(sql);

        assert_eq!(names(&refs.outputs), vec!["discounts"]);
        assert_eq!(names(&refs.inputs), vec!["staging.discounts"]);
    }

    #[test]
    fn test_merge_into() {
        let sql = "MERGE INTO dim.customers t USING staging.customers s ON t.id = s.id \
                   WHEN MATCHED THEN UPDATE SET t.email = s.email \
                   WHEN NOT MATCHED THEN INSERT (id, email) VALUES (s.id, s.email)";
        let refs = TableReferenceResolver::new(SqlDialect::Snowflake).resolve(sql);

        assert_eq!(names(&refs.outputs), vec!["dim.customers"]);
        assert_eq!(names(&refs.inputs), vec!["staging.customers"]);
    }

    #[test]
    fn test_create_table_as() {
        let sql = "CREATE TABLE reports.daily AS SELECT * FROM raw.events";
        let refs = TableReferenceResolver::default().resolve(sql);

        assert_eq!(names(&refs.outputs), vec!["reports.daily"]);
        assert_eq!(names(&refs.inputs), vec!["raw.events"]);
    }

    #[test]
    fn test_delete_is_a_write() {
        let refs = TableReferenceResolver::new(SqlDialect::Postgres)
            .resolve("DELETE FROM sessions WHERE expires_at < now()");

        assert_eq!(names(&refs.outputs), vec!["sessions"]);
        assert!(refs.inputs.is_empty());
    }

    #[test]
    fn test_deduplicates_case_insensitively() {
        let sql = "SELECT * FROM Public.Orders; SELECT count(*) FROM public.orders";
        let refs = TableReferenceResolver::default().resolve(sql);

        assert_eq!(refs.inputs.len(), 1);
        // First spelling wins
        assert_eq!(refs.inputs[0].to_string(), "Public.Orders");
    }

    #[test]
    fn test_three_part_names() {
        let refs = TableReferenceResolver::new(SqlDialect::Snowflake)
            .resolve("SELECT * FROM food_delivery.public.discounts");

        let table = &refs.inputs[0];
        assert_eq!(table.database.as_deref(), Some("food_delivery"));
        assert_eq!(table.schema_name.as_deref(), Some("public"));
        assert_eq!(table.name, "discounts");
    }

    #[test]
    fn test_unparseable_sql_is_empty() {
        let resolver = TableReferenceResolver::default();
        assert!(resolver.resolve("SELEC * FORM nowhere").is_empty());
        assert!(resolver.try_resolve("SELEC * FORM nowhere").is_err());
    }

    #[test]
    fn test_statements_without_tables() {
        assert!(TableReferenceResolver::default().resolve("COMMIT").is_empty());
    }

    #[test]
    fn test_statement_kind_names() {
        let parse = |sql: &str| Parser::parse_sql(&GenericDialect {}, sql).unwrap().remove(0);

        assert_eq!(statement_kind(&parse("COMMIT")), "COMMIT");
        assert_eq!(statement_kind(&parse("DROP TABLE staging.orders")), "DROP");
        assert_eq!(statement_kind(&parse("SELECT 1")), "other");
    }
}
