//! The authorization-aware secure query engine.
//!
//! Every exposed operation follows the same shape: capture a fresh access
//! snapshot, resolve the referenced tables, apply the shared table-read
//! check, resolve policies, do the work, and record exactly one audit
//! entry. Nothing is cached between calls.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::Utc;
use lakeward_proto::{Manifest, QueryResult, TableStatistics};
use tracing::{info, warn};

use super::executor::{ExecutorError, SqlExecutor};
use super::manifest::{build_manifest, FilePresigner, PassthroughPresigner};
use crate::config::EngineConfig;
use crate::governance::{Directory, GrantStore, PolicyStore, TableCatalog, TableInfo, TableName};
use crate::security::{
    AccessSnapshot, AuditAction, AuditDraft, AuditEntry, AuditSink, ColumnMaskResolver,
    NullAuditSink, PrivilegeResolver, RowFilterResolver, SecurityError, SecurityResult,
};
use crate::sql::{quote_relation, PolicyRewriter, StatementAnalyzer, TablePolicy};

/// Per-call execution options.
#[derive(Debug, Clone, Copy, Default)]
pub struct ExecuteOptions {
    /// Instant after which execution is abandoned.
    pub deadline: Option<Instant>,
}

impl ExecuteOptions {
    /// Options with a deadline `timeout` from now.
    pub fn with_timeout(timeout: Duration) -> Self {
        Self {
            deadline: Some(Instant::now() + timeout),
        }
    }
}

/// Resolves privileges and policies for each call and enforces them on
/// queries, manifests and profiles.
pub struct SecureQueryEngine {
    directory: Arc<dyn Directory>,
    grants: Arc<dyn GrantStore>,
    policies: Arc<dyn PolicyStore>,
    catalog: Arc<dyn TableCatalog>,
    executor: Arc<dyn SqlExecutor>,
    audit: Arc<dyn AuditSink>,
    presigner: Arc<dyn FilePresigner>,
    analyzer: StatementAnalyzer,
    config: EngineConfig,
}

impl SecureQueryEngine {
    /// Create an engine reading all governance state from one store.
    pub fn new<S>(store: Arc<S>, executor: Arc<dyn SqlExecutor>) -> Self
    where
        S: Directory + GrantStore + PolicyStore + TableCatalog + 'static,
    {
        Self::from_parts(store.clone(), store.clone(), store.clone(), store, executor)
    }

    /// Create an engine from separate collaborators.
    pub fn from_parts(
        directory: Arc<dyn Directory>,
        grants: Arc<dyn GrantStore>,
        policies: Arc<dyn PolicyStore>,
        catalog: Arc<dyn TableCatalog>,
        executor: Arc<dyn SqlExecutor>,
    ) -> Self {
        let config = EngineConfig::default();
        Self {
            directory,
            grants,
            policies,
            catalog,
            executor,
            audit: Arc::new(NullAuditSink),
            presigner: Arc::new(PassthroughPresigner),
            analyzer: StatementAnalyzer::from_config(&config),
            config,
        }
    }

    /// Set the audit sink.
    pub fn with_audit_sink(mut self, audit: Arc<dyn AuditSink>) -> Self {
        self.audit = audit;
        self
    }

    /// Set the presigner used for manifest file URLs.
    pub fn with_presigner(mut self, presigner: Arc<dyn FilePresigner>) -> Self {
        self.presigner = presigner;
        self
    }

    /// Set the engine configuration.
    pub fn with_config(mut self, config: EngineConfig) -> Self {
        self.analyzer = StatementAnalyzer::from_config(&config);
        self.config = config;
        self
    }

    /// Engine configuration.
    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    // ============== Exposed operations ==============

    /// Execute a read-only query as `principal`.
    pub fn execute(&self, principal: &str, sql: &str) -> SecurityResult<QueryResult> {
        self.execute_with(principal, sql, ExecuteOptions::default())
    }

    /// Execute a read-only query as `principal` with per-call options.
    ///
    /// The statement is denied as a whole if any referenced table fails the
    /// read check. Row filters and column masks are applied to every
    /// governed table reference before execution.
    pub fn execute_with(
        &self,
        principal: &str,
        sql: &str,
        options: ExecuteOptions,
    ) -> SecurityResult<QueryResult> {
        let started = Instant::now();
        let deadline = options
            .deadline
            .or_else(|| self.config.query_timeout.map(|t| started + t));
        let mut draft = AuditDraft::begin(principal, AuditAction::Query, sql);

        let outcome = self.run_query(principal, sql, deadline, &mut draft);
        self.complete(draft, started, &outcome, |r| Some(r.row_count as u64));
        outcome
    }

    /// Issue a read manifest for one table.
    ///
    /// The manifest carries the principal's unevaluated row filters and
    /// column masks; the reader consuming it is trusted to enforce them.
    pub fn get_manifest(
        &self,
        principal: &str,
        catalog: &str,
        schema: &str,
        table: &str,
    ) -> SecurityResult<Manifest> {
        let started = Instant::now();
        let mut draft = AuditDraft::begin(
            principal,
            AuditAction::Manifest,
            format!("GET MANIFEST {}.{}.{}", catalog, schema, table),
        );

        let outcome = self.build_manifest_for(principal, catalog, schema, table, &mut draft);
        self.complete(draft, started, &outcome, |_| None);
        outcome
    }

    /// Aggregate statistics over the whole table in the default catalog.
    ///
    /// Row filters do not apply: counts cover every row.
    pub fn profile_table(
        &self,
        principal: &str,
        schema: &str,
        table: &str,
    ) -> SecurityResult<TableStatistics> {
        let started = Instant::now();
        let deadline = self.config.query_timeout.map(|t| started + t);
        let mut draft = AuditDraft::begin(
            principal,
            AuditAction::Profile,
            format!("PROFILE TABLE {}.{}", schema, table),
        );

        let outcome = self.profile(principal, schema, table, deadline, &mut draft);
        self.complete(draft, started, &outcome, |_| None);
        outcome
    }

    // ============== Internals ==============

    fn run_query(
        &self,
        principal: &str,
        sql: &str,
        deadline: Option<Instant>,
        draft: &mut AuditDraft,
    ) -> SecurityResult<QueryResult> {
        let analyzed = self.analyzer.analyze(sql)?;
        let snapshot = self.snapshot(principal)?;

        for cte in &analyzed.cte_names {
            if self
                .catalog
                .resolve_table(&self.analyzer.bare_table_name(cte))?
                .is_some()
            {
                return Err(SecurityError::Validation(format!(
                    "common table expression {} shadows a catalog table",
                    cte
                )));
            }
        }

        if analyzed.is_table_free() {
            // Execute what was analyzed, not the raw text.
            let rendered = analyzed.statement.to_string();
            draft.set_rewritten_sql(&rendered);
            return self.run_sql(&rendered, deadline, false, draft);
        }

        let mut tables = Vec::with_capacity(analyzed.tables.len());
        for name in &analyzed.tables {
            draft.add_table(name.to_string());
            tables.push((name.clone(), self.resolve_table(name)?));
        }

        // Deny the statement as a whole before any policy is resolved.
        for (_, table) in &tables {
            PrivilegeResolver::authorize_table_read(&snapshot, table)?;
        }

        let mut policies = BTreeMap::new();
        for (name, table) in tables {
            let policy = self.table_policy(&snapshot, table)?;
            policies.insert(name, policy);
        }

        let rewritten = PolicyRewriter::new(&self.analyzer).rewrite(&analyzed.statement, &policies)?;
        draft.set_rewritten_sql(&rewritten.sql);
        self.run_sql(&rewritten.sql, deadline, rewritten.policies_applied, draft)
    }

    fn build_manifest_for(
        &self,
        principal: &str,
        catalog: &str,
        schema: &str,
        table: &str,
        draft: &mut AuditDraft,
    ) -> SecurityResult<Manifest> {
        let name = Self::checked_name(catalog, schema, table)?;
        draft.add_table(name.to_string());

        let snapshot = self.snapshot(principal)?;
        let table = self.resolve_table(&name)?;
        PrivilegeResolver::authorize_table_read(&snapshot, &table)?;

        let policy = self.table_policy(&snapshot, table)?;
        Ok(build_manifest(
            &policy.table,
            policy.row_filters,
            policy.column_masks,
            self.presigner.as_ref(),
            Utc::now(),
            self.config.manifest_ttl,
        ))
    }

    fn profile(
        &self,
        principal: &str,
        schema: &str,
        table: &str,
        deadline: Option<Instant>,
        draft: &mut AuditDraft,
    ) -> SecurityResult<TableStatistics> {
        let name = Self::checked_name(&self.config.default_catalog, schema, table)?;
        draft.add_table(name.to_string());

        let snapshot = self.snapshot(principal)?;
        let table = self.resolve_table(&name)?;
        PrivilegeResolver::authorize_table_read(&snapshot, &table)?;

        let sql = format!("SELECT COUNT(*) FROM {}", quote_relation(&table.physical_name()));
        draft.set_rewritten_sql(&sql);
        let result = self.run_sql(&sql, deadline, false, draft)?;
        let row_count = result
            .rows
            .first()
            .and_then(|row| row.first())
            .and_then(|v| v.as_i64())
            .ok_or_else(|| SecurityError::Execution("row count unavailable".into()))?;

        Ok(TableStatistics {
            row_count: row_count.max(0) as u64,
            size_bytes: table.size_bytes,
            column_count: table.columns.len(),
            last_profiled_at: Utc::now(),
            profiled_by: snapshot.principal().name.clone(),
        })
    }

    fn snapshot(&self, principal: &str) -> SecurityResult<AccessSnapshot> {
        AccessSnapshot::capture(self.directory.as_ref(), self.grants.as_ref(), principal)
    }

    fn resolve_table(&self, name: &TableName) -> SecurityResult<TableInfo> {
        self.catalog
            .resolve_table(name)?
            .ok_or_else(|| SecurityError::NotFound(format!("table {} does not exist", name)))
    }

    fn checked_name(catalog: &str, schema: &str, table: &str) -> SecurityResult<TableName> {
        if [catalog, schema, table].iter().any(|part| part.trim().is_empty()) {
            return Err(SecurityError::Validation(
                "catalog, schema and table names must not be empty".into(),
            ));
        }
        Ok(TableName::new(catalog.trim(), schema.trim(), table.trim()))
    }

    fn table_policy(
        &self,
        snapshot: &AccessSnapshot,
        table: TableInfo,
    ) -> SecurityResult<TablePolicy> {
        let bound = RowFilterResolver::load(self.policies.as_ref(), table.id)?;
        let filters = RowFilterResolver::filters_for(snapshot, table.id, &bound);
        let masks = self.policies.column_masks_for_table(table.id)?;
        let column_masks = ColumnMaskResolver::effective_masks(snapshot, &table, &masks);
        Ok(TablePolicy::new(
            table,
            RowFilterResolver::predicates(&filters),
            column_masks,
        ))
    }

    /// Run SQL on the executor. When policies were injected, engine error
    /// text stays in the audit trail and the caller gets a generic message.
    fn run_sql(
        &self,
        sql: &str,
        deadline: Option<Instant>,
        policies_applied: bool,
        draft: &mut AuditDraft,
    ) -> SecurityResult<QueryResult> {
        match self.executor.run(sql, deadline) {
            Ok(result) => Ok(result),
            Err(ExecutorError::DeadlineExceeded) => Err(SecurityError::Execution(
                "query exceeded its deadline".into(),
            )),
            Err(ExecutorError::NotReadOnly) => Err(SecurityError::Validation(
                "only read-only queries are allowed".into(),
            )),
            Err(ExecutorError::Engine(detail)) => {
                draft.set_error_detail(detail.clone());
                if policies_applied {
                    Err(SecurityError::Execution("query execution failed".into()))
                } else {
                    Err(SecurityError::Execution(detail))
                }
            }
        }
    }

    fn complete<T>(
        &self,
        draft: AuditDraft,
        started: Instant,
        outcome: &SecurityResult<T>,
        rows: impl FnOnce(&T) -> Option<u64>,
    ) {
        let duration_ms = started.elapsed().as_millis() as u64;
        let principal = draft.principal().to_string();
        let tables = draft.tables().to_vec();

        let entry = match outcome {
            Ok(value) => {
                let rows = rows(value);
                info!(
                    principal = %principal,
                    tables = ?tables,
                    rows = ?rows,
                    duration_ms,
                    "request completed"
                );
                draft.succeed(duration_ms, rows)
            }
            Err(err) => {
                warn!(
                    principal = %principal,
                    tables = ?tables,
                    kind = %err.kind(),
                    duration_ms,
                    "request failed"
                );
                draft.fail(err, duration_ms)
            }
        };
        self.record(entry);
    }

    fn record(&self, entry: AuditEntry) {
        if let Err(e) = self.audit.record(&entry) {
            warn!(id = %entry.id, error = %e, "audit write failed");
        }
    }
}
