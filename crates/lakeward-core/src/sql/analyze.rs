//! Statement analysis.
//!
//! Parses caller SQL, rejects anything that is not a single read-only query
//! the rewriter can govern, and collects the tables it references.

use std::ops::ControlFlow;

use sqlparser::ast::{Expr, ObjectName, Query, SetExpr, Statement, TableFactor, Visit, Visitor};
use sqlparser::dialect::GenericDialect;
use sqlparser::parser::Parser;

use crate::config::EngineConfig;
use crate::governance::TableName;
use crate::security::{SecurityError, SecurityResult};

/// Functions that read files, attach databases or expose engine internals.
const BLOCKED_FUNCTIONS: &[&str] = &[
    "read_csv",
    "read_csv_auto",
    "read_parquet",
    "read_json",
    "read_json_auto",
    "read_text",
    "read_blob",
    "glob",
    "sqlite_scan",
    "query_table",
    "duckdb_extensions",
    "duckdb_settings",
    "duckdb_databases",
    "duckdb_secrets",
    "pragma_database_list",
    "load_extension",
    "readfile",
    "writefile",
    "edit",
    "fts3_tokenizer",
];

/// A parsed query and the catalog tables it references.
#[derive(Debug, Clone)]
pub struct AnalyzedQuery {
    /// The parsed statement.
    pub statement: Statement,
    /// Referenced tables in order of first appearance, without duplicates.
    pub tables: Vec<TableName>,
    /// Names of common table expressions defined anywhere in the query.
    pub cte_names: Vec<String>,
}

impl AnalyzedQuery {
    /// Whether the query reads no table at all, as in `SELECT 1`.
    pub fn is_table_free(&self) -> bool {
        self.tables.is_empty()
    }
}

/// Parses and vets caller SQL.
#[derive(Debug, Clone)]
pub struct StatementAnalyzer {
    default_catalog: String,
    default_schema: String,
}

impl StatementAnalyzer {
    /// Create an analyzer completing partial table names with the given
    /// defaults.
    pub fn new(default_catalog: &str, default_schema: &str) -> Self {
        Self {
            default_catalog: default_catalog.to_lowercase(),
            default_schema: default_schema.to_lowercase(),
        }
    }

    /// Create an analyzer from engine configuration.
    pub fn from_config(config: &EngineConfig) -> Self {
        Self::new(&config.default_catalog, &config.default_schema)
    }

    /// Normalize a table reference as written in SQL.
    pub fn table_name(&self, name: &ObjectName) -> Option<TableName> {
        let parts: Vec<&str> = name.0.iter().map(|ident| ident.value.as_str()).collect();
        TableName::from_parts(&parts, &self.default_catalog, &self.default_schema)
    }

    /// Normalize a bare name, such as a CTE name, as a table reference.
    pub fn bare_table_name(&self, name: &str) -> TableName {
        TableName::new(&self.default_catalog, &self.default_schema, name)
    }

    /// Parse `sql` and check that it is a single governed read.
    pub fn analyze(&self, sql: &str) -> SecurityResult<AnalyzedQuery> {
        if sql.trim().is_empty() {
            return Err(SecurityError::Validation("query must not be empty".into()));
        }

        let dialect = GenericDialect {};
        let mut statements = Parser::parse_sql(&dialect, sql)
            .map_err(|e| SecurityError::Validation(format!("invalid SQL: {}", e)))?;

        if statements.len() != 1 {
            return Err(SecurityError::Validation(
                "exactly one statement is allowed per query".into(),
            ));
        }
        let statement = statements.remove(0);
        if !matches!(statement, Statement::Query(_)) {
            return Err(SecurityError::Validation(
                "only SELECT queries are allowed".into(),
            ));
        }

        let mut collector = TableCollector {
            analyzer: self,
            statements: 0,
            cte_scopes: Vec::new(),
            cte_names: Vec::new(),
            tables: Vec::new(),
        };
        if let ControlFlow::Break(err) = statement.visit(&mut collector) {
            return Err(err);
        }

        Ok(AnalyzedQuery {
            tables: collector.tables,
            cte_names: collector.cte_names,
            statement,
        })
    }
}

/// Walks a query collecting table references and rejecting unsafe shapes.
struct TableCollector<'a> {
    analyzer: &'a StatementAnalyzer,
    statements: usize,
    cte_scopes: Vec<Vec<String>>,
    cte_names: Vec<String>,
    tables: Vec<TableName>,
}

impl TableCollector<'_> {
    fn is_cte(&self, name: &ObjectName) -> bool {
        match name.0.as_slice() {
            [ident] => {
                let name = ident.value.to_lowercase();
                self.cte_scopes.iter().any(|scope| scope.contains(&name))
            }
            _ => false,
        }
    }
}

fn check_body(body: &SetExpr) -> SecurityResult<()> {
    match body {
        SetExpr::Select(select) if select.into.is_some() => Err(SecurityError::Validation(
            "SELECT INTO is not allowed".into(),
        )),
        SetExpr::Select(_) | SetExpr::Query(_) | SetExpr::Values(_) => Ok(()),
        SetExpr::SetOperation { left, right, .. } => {
            check_body(left)?;
            check_body(right)
        }
        _ => Err(SecurityError::Validation(
            "only SELECT queries are allowed".into(),
        )),
    }
}

impl Visitor for TableCollector<'_> {
    type Break = SecurityError;

    fn pre_visit_statement(&mut self, _statement: &Statement) -> ControlFlow<Self::Break> {
        self.statements += 1;
        if self.statements > 1 {
            return ControlFlow::Break(SecurityError::Validation(
                "only SELECT queries are allowed".into(),
            ));
        }
        ControlFlow::Continue(())
    }

    fn pre_visit_query(&mut self, query: &Query) -> ControlFlow<Self::Break> {
        if let Err(err) = check_body(&query.body) {
            return ControlFlow::Break(err);
        }
        let names: Vec<String> = query
            .with
            .as_ref()
            .map(|with| {
                with.cte_tables
                    .iter()
                    .map(|cte| cte.alias.name.value.to_lowercase())
                    .collect()
            })
            .unwrap_or_default();
        self.cte_names.extend(names.iter().cloned());
        self.cte_scopes.push(names);
        ControlFlow::Continue(())
    }

    fn post_visit_query(&mut self, _query: &Query) -> ControlFlow<Self::Break> {
        self.cte_scopes.pop();
        ControlFlow::Continue(())
    }

    fn pre_visit_table_factor(&mut self, factor: &TableFactor) -> ControlFlow<Self::Break> {
        match factor {
            TableFactor::Table { name, args, .. } => {
                if args.is_some() {
                    return ControlFlow::Break(SecurityError::Validation(
                        "table functions are not allowed".into(),
                    ));
                }
                if self.is_cte(name) {
                    return ControlFlow::Continue(());
                }
                match self.analyzer.table_name(name) {
                    Some(table) => {
                        if !self.tables.contains(&table) {
                            self.tables.push(table);
                        }
                        ControlFlow::Continue(())
                    }
                    None => ControlFlow::Break(SecurityError::Validation(format!(
                        "invalid table reference: {}",
                        name
                    ))),
                }
            }
            TableFactor::Derived { .. } | TableFactor::NestedJoin { .. } => {
                ControlFlow::Continue(())
            }
            _ => ControlFlow::Break(SecurityError::Validation(
                "unsupported table expression".into(),
            )),
        }
    }

    fn pre_visit_expr(&mut self, expr: &Expr) -> ControlFlow<Self::Break> {
        if let Expr::Function(function) = expr {
            if let Some(ident) = function.name.0.last() {
                let name = ident.value.to_lowercase();
                if BLOCKED_FUNCTIONS.contains(&name.as_str()) {
                    return ControlFlow::Break(SecurityError::Validation(format!(
                        "function {} is not allowed",
                        name
                    )));
                }
            }
        }
        ControlFlow::Continue(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn analyzer() -> StatementAnalyzer {
        StatementAnalyzer::new("lake", "main")
    }

    fn names(sql: &str) -> Vec<String> {
        analyzer()
            .analyze(sql)
            .unwrap()
            .tables
            .iter()
            .map(|t| t.to_string())
            .collect()
    }

    fn rejected(sql: &str) -> bool {
        matches!(analyzer().analyze(sql), Err(SecurityError::Validation(_)))
    }

    #[test]
    fn test_collects_qualified_names() {
        assert_eq!(names("SELECT * FROM titanic"), vec!["lake.main.titanic"]);
        assert_eq!(names("SELECT * FROM Sales.Orders"), vec!["lake.sales.orders"]);
        assert_eq!(names("SELECT * FROM other.s.t"), vec!["other.s.t"]);
    }

    #[test]
    fn test_collects_joins_subqueries_and_dedups() {
        let tables = names(
            "SELECT a.x FROM t1 a JOIN t2 b ON a.id = b.id \
             WHERE a.y IN (SELECT y FROM t3) AND EXISTS (SELECT 1 FROM t1)",
        );
        assert_eq!(
            tables,
            vec!["lake.main.t1", "lake.main.t2", "lake.main.t3"]
        );
        assert_eq!(
            names("SELECT * FROM (SELECT * FROM t4) sub"),
            vec!["lake.main.t4"]
        );
        assert_eq!(
            names("SELECT x FROM t5 UNION SELECT x FROM t6"),
            vec!["lake.main.t5", "lake.main.t6"]
        );
    }

    #[test]
    fn test_cte_references_skipped() {
        let analyzed = analyzer()
            .analyze("WITH recent AS (SELECT * FROM titanic) SELECT * FROM recent")
            .unwrap();
        let tables: Vec<String> = analyzed.tables.iter().map(|t| t.to_string()).collect();
        assert_eq!(tables, vec!["lake.main.titanic"]);
        assert_eq!(analyzed.cte_names, vec!["recent"]);
    }

    #[test]
    fn test_table_free_select() {
        assert!(analyzer().analyze("SELECT 1 + 1").unwrap().is_table_free());
    }

    #[test]
    fn test_rejects_writes_and_multiple_statements() {
        assert!(rejected(""));
        assert!(rejected("   "));
        assert!(rejected("DELETE FROM titanic"));
        assert!(rejected("INSERT INTO titanic VALUES (1)"));
        assert!(rejected("UPDATE titanic SET x = 1"));
        assert!(rejected("DROP TABLE titanic"));
        assert!(rejected("SELECT 1; SELECT 2"));
        assert!(rejected("SELECT * FROM titanic; DROP TABLE titanic"));
        assert!(rejected("SELECT * INTO backup FROM titanic"));
        assert!(rejected("SELEC * FROM titanic"));
    }

    #[test]
    fn test_rejects_escape_hatches() {
        assert!(rejected("SELECT * FROM read_csv('/etc/passwd')"));
        assert!(rejected("SELECT readfile('/etc/passwd')"));
        assert!(rejected("SELECT load_extension('evil')"));
        assert!(rejected("SELECT name FROM titanic WHERE read_parquet('x') IS NULL"));
    }

    #[test]
    fn test_rejects_over_qualified_names() {
        assert!(rejected("SELECT * FROM a.b.c.d"));
    }
}
