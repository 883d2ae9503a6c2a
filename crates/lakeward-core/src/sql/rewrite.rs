//! Policy rewriting on the parsed statement tree.
//!
//! Each reference to a governed table is replaced by a derived table that
//! reads the physical relation, applies the principal's row filters and
//! substitutes masked columns under their original names:
//!
//! ```sql
//! SELECT "Name" FROM titanic t WHERE "Age" > 30
//! -- becomes
//! SELECT "Name" FROM (SELECT "PassengerId", ('***') AS "Name", ...
//!                     FROM "main"."titanic" WHERE ("Pclass" = 1)) AS t
//!   WHERE "Age" > 30
//! ```
//!
//! The caller's own predicates stay where they were, so policy predicates
//! are conjoined beneath them rather than replacing them. Every masked
//! column of a referenced table is substituted, whether or not the query
//! uses it.

use std::collections::BTreeMap;
use std::ops::ControlFlow;

use sqlparser::ast::{
    Expr, ObjectName, Query, SetExpr, Statement, TableAlias, TableFactor, VisitMut, VisitorMut,
};
use sqlparser::dialect::GenericDialect;
use sqlparser::parser::Parser;
use sqlparser::tokenizer::Token;
use tracing::warn;

use super::analyze::StatementAnalyzer;
use crate::governance::{TableInfo, TableName};
use crate::security::{RowFilterResolver, SecurityError, SecurityResult};

/// Quote an identifier, doubling embedded quotes.
pub fn quote_identifier(ident: &str) -> String {
    format!("\"{}\"", ident.replace('"', "\"\""))
}

/// Quote a dotted relation name part by part.
pub fn quote_relation(parts: &[String]) -> String {
    parts
        .iter()
        .map(|p| quote_identifier(p))
        .collect::<Vec<_>>()
        .join(".")
}

/// Parse a policy expression, requiring it to be exactly one expression.
pub fn parse_policy_expr(text: &str) -> Option<Expr> {
    let dialect = GenericDialect {};
    let mut parser = Parser::new(&dialect).try_with_sql(text).ok()?;
    let expr = parser.parse_expr().ok()?;
    if parser.peek_token().token != Token::EOF {
        return None;
    }
    Some(expr)
}

/// Policies that apply to one table for one principal.
#[derive(Debug, Clone)]
pub struct TablePolicy {
    /// The governed table.
    pub table: TableInfo,
    /// Row filter predicates, all of which must hold.
    pub row_filters: Vec<String>,
    /// Mask expressions keyed by column name.
    pub column_masks: BTreeMap<String, String>,
}

impl TablePolicy {
    /// Create a policy.
    pub fn new(
        table: TableInfo,
        row_filters: Vec<String>,
        column_masks: BTreeMap<String, String>,
    ) -> Self {
        Self {
            table,
            row_filters,
            column_masks,
        }
    }

    /// Whether anything restricts or alters what the principal reads.
    pub fn is_restrictive(&self) -> bool {
        !self.row_filters.is_empty() || !self.column_masks.is_empty()
    }

    fn mask_for(&self, column: &str) -> Option<&String> {
        self.column_masks
            .iter()
            .find(|(name, _)| name.eq_ignore_ascii_case(column))
            .map(|(_, expr)| expr)
    }
}

/// Output of a rewrite.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RewrittenQuery {
    /// SQL to hand to the embedded engine.
    pub sql: String,
    /// Whether any row filter or mask was injected.
    pub policies_applied: bool,
}

/// Replacement text for one governed table, validated once per rewrite.
struct Replacement {
    source: String,
    projection: Option<String>,
    predicate: Option<String>,
}

/// Rewrites governed table references.
pub struct PolicyRewriter<'a> {
    analyzer: &'a StatementAnalyzer,
}

impl<'a> PolicyRewriter<'a> {
    /// Create a rewriter resolving names like `analyzer`.
    pub fn new(analyzer: &'a StatementAnalyzer) -> Self {
        Self { analyzer }
    }

    /// Rewrite `statement`, which must reference only tables in `policies`
    /// (or CTEs).
    ///
    /// A policy expression that does not parse fails the rewrite with an
    /// execution error that names the table but not the policy.
    pub fn rewrite(
        &self,
        statement: &Statement,
        policies: &BTreeMap<TableName, TablePolicy>,
    ) -> SecurityResult<RewrittenQuery> {
        let mut replacements = BTreeMap::new();
        for (name, policy) in policies {
            replacements.insert(name.clone(), Self::replacement(name, policy)?);
        }

        let mut statement = statement.clone();
        let mut visitor = ReplaceTables {
            analyzer: self.analyzer,
            replacements: &replacements,
            cte_scopes: Vec::new(),
        };
        if let ControlFlow::Break(err) = statement.visit(&mut visitor) {
            return Err(err);
        }

        Ok(RewrittenQuery {
            sql: statement.to_string(),
            policies_applied: policies.values().any(TablePolicy::is_restrictive),
        })
    }

    fn replacement(name: &TableName, policy: &TablePolicy) -> SecurityResult<Replacement> {
        let unusable = || {
            warn!(table = %name, "policy expression failed to parse");
            SecurityError::Execution(format!("a policy on table {} could not be applied", name))
        };

        let mut filters = Vec::with_capacity(policy.row_filters.len());
        for filter in &policy.row_filters {
            filters.push(parse_policy_expr(filter).ok_or_else(unusable)?.to_string());
        }
        let predicate = RowFilterResolver::conjoin(&filters);

        let projection = if policy.column_masks.is_empty() {
            None
        } else {
            if policy.table.columns.is_empty() {
                // Masks cannot be placed without the column list.
                return Err(unusable());
            }
            let mut items = Vec::with_capacity(policy.table.columns.len());
            for column in &policy.table.columns {
                let quoted = quote_identifier(&column.name);
                match policy.mask_for(&column.name) {
                    Some(mask) => {
                        let expr = parse_policy_expr(mask).ok_or_else(unusable)?;
                        items.push(format!("({}) AS {}", expr, quoted));
                    }
                    None => items.push(quoted),
                }
            }
            Some(items.join(", "))
        };

        Ok(Replacement {
            source: quote_relation(&policy.table.physical_name()),
            projection,
            predicate,
        })
    }
}

/// Swaps governed table factors for their replacements.
struct ReplaceTables<'a> {
    analyzer: &'a StatementAnalyzer,
    replacements: &'a BTreeMap<TableName, Replacement>,
    cte_scopes: Vec<Vec<String>>,
}

impl ReplaceTables<'_> {
    fn is_cte(&self, name: &ObjectName) -> bool {
        match name.0.as_slice() {
            [ident] => {
                let name = ident.value.to_lowercase();
                self.cte_scopes.iter().any(|scope| scope.contains(&name))
            }
            _ => false,
        }
    }

    fn build(
        replacement: &Replacement,
        written: &ObjectName,
        alias: Option<&TableAlias>,
    ) -> SecurityResult<TableFactor> {
        // Unaliased references keep the table name as written.
        let alias = match (alias, written.0.last()) {
            (Some(alias), _) => alias.to_string(),
            (None, Some(ident)) => quote_identifier(&ident.value),
            (None, None) => {
                return Err(SecurityError::Execution("failed to build governed query".into()))
            }
        };
        let relation = if replacement.projection.is_none() && replacement.predicate.is_none() {
            format!("{} AS {}", replacement.source, alias)
        } else {
            let projection = replacement.projection.as_deref().unwrap_or("*");
            let filter = replacement
                .predicate
                .as_ref()
                .map(|p| format!(" WHERE {}", p))
                .unwrap_or_default();
            format!(
                "(SELECT {} FROM {}{}) AS {}",
                projection, replacement.source, filter, alias
            )
        };
        parse_table_factor(&relation)
    }
}

fn parse_table_factor(relation: &str) -> SecurityResult<TableFactor> {
    let internal = || SecurityError::Execution("failed to build governed query".into());
    let sql = format!("SELECT * FROM {}", relation);
    let statements = Parser::parse_sql(&GenericDialect {}, &sql).map_err(|_| internal())?;
    let Some(Statement::Query(query)) = statements.into_iter().next() else {
        return Err(internal());
    };
    let query = *query;
    match *query.body {
        SetExpr::Select(select) => select
            .from
            .into_iter()
            .next()
            .map(|table| table.relation)
            .ok_or_else(internal),
        _ => Err(internal()),
    }
}

impl VisitorMut for ReplaceTables<'_> {
    type Break = SecurityError;

    fn pre_visit_query(&mut self, query: &mut Query) -> ControlFlow<Self::Break> {
        let names = query
            .with
            .as_ref()
            .map(|with| {
                with.cte_tables
                    .iter()
                    .map(|cte| cte.alias.name.value.to_lowercase())
                    .collect()
            })
            .unwrap_or_default();
        self.cte_scopes.push(names);
        ControlFlow::Continue(())
    }

    fn post_visit_query(&mut self, _query: &mut Query) -> ControlFlow<Self::Break> {
        self.cte_scopes.pop();
        ControlFlow::Continue(())
    }

    fn post_visit_table_factor(&mut self, factor: &mut TableFactor) -> ControlFlow<Self::Break> {
        let TableFactor::Table {
            name,
            alias,
            args: None,
            ..
        } = factor
        else {
            return ControlFlow::Continue(());
        };
        if self.is_cte(name) {
            return ControlFlow::Continue(());
        }
        let Some(replacement) = self
            .analyzer
            .table_name(name)
            .and_then(|table| self.replacements.get(&table))
        else {
            return ControlFlow::Break(SecurityError::Execution(
                "failed to build governed query".into(),
            ));
        };
        match Self::build(replacement, name, alias.as_ref()) {
            Ok(rewritten) => {
                *factor = rewritten;
                ControlFlow::Continue(())
            }
            Err(err) => ControlFlow::Break(err),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::governance::ColumnInfo;

    fn titanic() -> TableInfo {
        TableInfo {
            id: 1,
            catalog_id: 1,
            schema_id: 1,
            catalog: "lake".into(),
            schema: "main".into(),
            name: "titanic".into(),
            columns: vec![
                ColumnInfo::new("PassengerId", "INTEGER"),
                ColumnInfo::new("Name", "TEXT"),
                ColumnInfo::new("Pclass", "INTEGER"),
            ],
            owner: None,
            physical_name: vec![],
            files: vec![],
            size_bytes: 0,
        }
    }

    fn rewrite(sql: &str, policy: TablePolicy) -> SecurityResult<RewrittenQuery> {
        let analyzer = StatementAnalyzer::new("lake", "main");
        let analyzed = analyzer.analyze(sql)?;
        let mut policies = BTreeMap::new();
        policies.insert(TableName::new("lake", "main", "titanic"), policy);
        PolicyRewriter::new(&analyzer).rewrite(&analyzed.statement, &policies)
    }

    #[test]
    fn test_quote_identifier() {
        assert_eq!(quote_identifier("Name"), "\"Name\"");
        assert_eq!(quote_identifier("a\"b"), "\"a\"\"b\"");
        assert_eq!(
            quote_relation(&["main".into(), "titanic".into()]),
            "\"main\".\"titanic\""
        );
    }

    #[test]
    fn test_parse_policy_expr() {
        assert!(parse_policy_expr("\"Pclass\" = 1").is_some());
        assert!(parse_policy_expr("substr(\"Name\", 1, 1) || '***'").is_some());
        assert!(parse_policy_expr("1) OR (1 = 1").is_none());
        assert!(parse_policy_expr("1 = 1; DROP TABLE titanic").is_none());
        assert!(parse_policy_expr("").is_none());
    }

    #[test]
    fn test_unrestricted_table_maps_to_physical_name() {
        let rewritten = rewrite(
            "SELECT * FROM titanic",
            TablePolicy::new(titanic(), vec![], BTreeMap::new()),
        )
        .unwrap();
        assert!(!rewritten.policies_applied);
        assert!(rewritten.sql.contains("FROM \"main\".\"titanic\""));
    }

    #[test]
    fn test_unrestricted_table_keeps_catalog_name() {
        let mut table = titanic();
        table.physical_name = vec!["raw".into(), "passengers_v2".into()];
        let rewritten = rewrite(
            "SELECT titanic.\"Name\" FROM titanic",
            TablePolicy::new(table.clone(), vec![], BTreeMap::new()),
        )
        .unwrap();
        assert!(rewritten
            .sql
            .contains("FROM \"raw\".\"passengers_v2\" AS \"titanic\""));

        let aliased = rewrite(
            "SELECT p.\"Name\" FROM titanic AS p",
            TablePolicy::new(table, vec![], BTreeMap::new()),
        )
        .unwrap();
        assert!(aliased.sql.contains("FROM \"raw\".\"passengers_v2\" AS p"));
    }

    #[test]
    fn test_filters_are_conjoined_beneath_caller_predicate() {
        let rewritten = rewrite(
            "SELECT \"Name\" FROM titanic t WHERE \"PassengerId\" < 10",
            TablePolicy::new(
                titanic(),
                vec!["\"Pclass\" = 1".into(), "\"Name\" LIKE 'A%'".into()],
                BTreeMap::new(),
            ),
        )
        .unwrap();
        assert!(rewritten.policies_applied);
        assert!(rewritten
            .sql
            .contains("WHERE (\"Pclass\" = 1) AND (\"Name\" LIKE 'A%')"));
        assert!(rewritten.sql.contains("AS t"));
        assert!(rewritten.sql.contains("\"PassengerId\" < 10"));
    }

    #[test]
    fn test_masks_keep_column_names() {
        let mut masks = BTreeMap::new();
        masks.insert("name".to_string(), "'***'".to_string());
        let rewritten = rewrite(
            "SELECT * FROM titanic",
            TablePolicy::new(titanic(), vec![], masks),
        )
        .unwrap();
        assert!(rewritten.sql.contains("('***') AS \"Name\""));
        assert!(rewritten.sql.contains("\"PassengerId\", ('***') AS \"Name\", \"Pclass\""));
        assert!(rewritten.sql.contains("AS \"titanic\""));
    }

    #[test]
    fn test_broken_policy_does_not_leak() {
        let err = rewrite(
            "SELECT * FROM titanic",
            TablePolicy::new(titanic(), vec!["secret_col = ) 'x'".into()], BTreeMap::new()),
        )
        .unwrap_err();
        assert!(matches!(err, SecurityError::Execution(_)));
        assert!(!err.to_string().contains("secret_col"));
    }

    #[test]
    fn test_masks_require_column_list() {
        let mut table = titanic();
        table.columns.clear();
        let mut masks = BTreeMap::new();
        masks.insert("Name".to_string(), "NULL".to_string());
        assert!(rewrite("SELECT * FROM titanic", TablePolicy::new(table, vec![], masks)).is_err());
    }

    #[test]
    fn test_every_reference_rewritten() {
        let rewritten = rewrite(
            "SELECT a.\"Name\" FROM titanic a WHERE a.\"PassengerId\" IN \
             (SELECT \"PassengerId\" FROM main.titanic)",
            TablePolicy::new(titanic(), vec!["\"Pclass\" = 1".into()], BTreeMap::new()),
        )
        .unwrap();
        assert_eq!(rewritten.sql.matches("WHERE (\"Pclass\" = 1)").count(), 2);
    }
}
