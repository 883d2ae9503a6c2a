//! Audit trail for engine operations.
//!
//! Every call to the engine produces exactly one [`AuditEntry`], whatever
//! its outcome. Sinks are fire-and-forget from the engine's point of view:
//! a failing sink is logged and never fails the call.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::mpsc::{self, Receiver, SyncSender, TrySendError};
use std::sync::Arc;
use std::thread::{self, JoinHandle};

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{info, warn};

use super::error::SecurityError;

/// Counter for generating unique entry IDs.
static ENTRY_COUNTER: AtomicU64 = AtomicU64::new(0);

/// Generate a unique, time-ordered entry ID.
fn generate_entry_id(timestamp: DateTime<Utc>) -> String {
    let micros = timestamp.timestamp_micros().max(0) as u64;
    let counter = ENTRY_COUNTER.fetch_add(1, Ordering::Relaxed);
    let mut id = [0u8; 16];
    id[0..8].copy_from_slice(&micros.to_be_bytes());
    id[8..16].copy_from_slice(&counter.to_be_bytes());
    hex::encode(id)
}

/// Operation being audited.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AuditAction {
    /// SQL execution.
    Query,
    /// Manifest issuance.
    Manifest,
    /// Table profiling.
    Profile,
}

impl std::fmt::Display for AuditAction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            AuditAction::Query => write!(f, "QUERY"),
            AuditAction::Manifest => write!(f, "MANIFEST"),
            AuditAction::Profile => write!(f, "PROFILE"),
        }
    }
}

/// Outcome of an audited call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AuditStatus {
    /// Completed.
    Success,
    /// Rejected for a missing privilege.
    Denied,
    /// Failed for any other reason.
    Error,
}

impl AuditStatus {
    /// Status recorded for a failed call.
    pub fn for_error(err: &SecurityError) -> Self {
        match err {
            SecurityError::AccessDenied(_) => AuditStatus::Denied,
            _ => AuditStatus::Error,
        }
    }
}

impl std::fmt::Display for AuditStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            AuditStatus::Success => write!(f, "SUCCESS"),
            AuditStatus::Denied => write!(f, "DENIED"),
            AuditStatus::Error => write!(f, "ERROR"),
        }
    }
}

/// Immutable record of one engine call.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuditEntry {
    /// Unique entry ID, ordered by creation time.
    pub id: String,
    /// When the call started.
    pub timestamp: DateTime<Utc>,
    /// Requesting principal name.
    pub principal: String,
    /// Audited operation.
    pub action: AuditAction,
    /// SQL as submitted, or a description of the request.
    pub original_sql: String,
    /// SQL actually executed, if the call got that far.
    pub rewritten_sql: Option<String>,
    /// Fully qualified tables touched.
    pub tables: Vec<String>,
    /// Outcome.
    pub status: AuditStatus,
    /// Failure detail. May contain engine errors never shown to the caller.
    pub error_message: Option<String>,
    /// Elapsed wall time.
    pub duration_ms: u64,
    /// Rows returned on success.
    pub rows_returned: Option<u64>,
}

impl AuditEntry {
    /// Format the entry as a log line.
    pub fn to_log_line(&self) -> String {
        let mut line = format!(
            "{} id={} principal={} action={} status={} tables=[{}] duration_ms={}",
            self.timestamp.to_rfc3339(),
            self.id,
            self.principal,
            self.action,
            self.status,
            self.tables.join(","),
            self.duration_ms
        );
        if let Some(rows) = self.rows_returned {
            line.push_str(&format!(" rows={}", rows));
        }
        if let Some(err) = &self.error_message {
            line.push_str(&format!(" error={:?}", err));
        }
        line
    }
}

/// Accumulates the fields of an entry while a call is in progress.
#[derive(Debug, Clone)]
pub struct AuditDraft {
    started_at: DateTime<Utc>,
    principal: String,
    action: AuditAction,
    original_sql: String,
    rewritten_sql: Option<String>,
    tables: Vec<String>,
    error_detail: Option<String>,
}

impl AuditDraft {
    /// Start a draft now.
    pub fn begin(
        principal: impl Into<String>,
        action: AuditAction,
        original_sql: impl Into<String>,
    ) -> Self {
        Self {
            started_at: Utc::now(),
            principal: principal.into(),
            action,
            original_sql: original_sql.into(),
            rewritten_sql: None,
            tables: Vec::new(),
            error_detail: None,
        }
    }

    /// Principal the call was made for.
    pub fn principal(&self) -> &str {
        &self.principal
    }

    /// Tables recorded so far.
    pub fn tables(&self) -> &[String] {
        &self.tables
    }

    /// Record failure detail meant for the audit trail only.
    pub fn set_error_detail(&mut self, detail: impl Into<String>) {
        self.error_detail = Some(detail.into());
    }

    /// Record the statement sent to the engine.
    pub fn set_rewritten_sql(&mut self, sql: impl Into<String>) {
        self.rewritten_sql = Some(sql.into());
    }

    /// Record a touched table.
    pub fn add_table(&mut self, table: impl Into<String>) {
        let table = table.into();
        if !self.tables.contains(&table) {
            self.tables.push(table);
        }
    }

    /// Seal the draft as a success.
    pub fn succeed(self, duration_ms: u64, rows_returned: Option<u64>) -> AuditEntry {
        self.finish(AuditStatus::Success, None, duration_ms, rows_returned)
    }

    /// Seal the draft as a failure. Detail recorded with
    /// [`set_error_detail`](Self::set_error_detail) takes precedence over
    /// the caller-facing message.
    pub fn fail(mut self, err: &SecurityError, duration_ms: u64) -> AuditEntry {
        let message = self.error_detail.take().unwrap_or_else(|| err.to_string());
        self.finish(AuditStatus::for_error(err), Some(message), duration_ms, None)
    }

    /// Seal the draft into an entry.
    pub fn finish(
        self,
        status: AuditStatus,
        error_message: Option<String>,
        duration_ms: u64,
        rows_returned: Option<u64>,
    ) -> AuditEntry {
        AuditEntry {
            id: generate_entry_id(self.started_at),
            timestamp: self.started_at,
            principal: self.principal,
            action: self.action,
            original_sql: self.original_sql,
            rewritten_sql: self.rewritten_sql,
            tables: self.tables,
            status,
            error_message,
            duration_ms,
            rows_returned,
        }
    }
}

/// Audit sink error.
#[derive(Debug, Error)]
#[error("audit error: {0}")]
pub struct AuditError(pub String);

/// Destination for audit entries.
pub trait AuditSink: Send + Sync {
    /// Record an entry.
    fn record(&self, entry: &AuditEntry) -> Result<(), AuditError>;

    /// Flush any buffered entries.
    fn flush(&self) -> Result<(), AuditError> {
        Ok(())
    }
}

/// In-memory sink for testing.
#[derive(Debug, Default, Clone)]
pub struct MemoryAuditSink {
    entries: Arc<Mutex<Vec<AuditEntry>>>,
}

impl MemoryAuditSink {
    /// Create a new memory sink.
    pub fn new() -> Self {
        Self::default()
    }

    /// All recorded entries.
    pub fn entries(&self) -> Vec<AuditEntry> {
        self.entries.lock().clone()
    }

    /// The most recent entry.
    pub fn last(&self) -> Option<AuditEntry> {
        self.entries.lock().last().cloned()
    }

    /// Clear all entries.
    pub fn clear(&self) {
        self.entries.lock().clear();
    }

    /// Entry count.
    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    /// Check if empty.
    pub fn is_empty(&self) -> bool {
        self.entries.lock().is_empty()
    }
}

impl AuditSink for MemoryAuditSink {
    fn record(&self, entry: &AuditEntry) -> Result<(), AuditError> {
        self.entries.lock().push(entry.clone());
        Ok(())
    }
}

/// Sink that discards all entries.
#[derive(Debug, Default)]
pub struct NullAuditSink;

impl AuditSink for NullAuditSink {
    fn record(&self, _entry: &AuditEntry) -> Result<(), AuditError> {
        Ok(())
    }
}

/// Sink that emits entries as `tracing` events on the `lakeward::audit`
/// target.
#[derive(Debug, Default)]
pub struct TracingAuditSink;

impl AuditSink for TracingAuditSink {
    fn record(&self, entry: &AuditEntry) -> Result<(), AuditError> {
        info!(
            target: "lakeward::audit",
            id = %entry.id,
            principal = %entry.principal,
            action = %entry.action,
            status = %entry.status,
            tables = ?entry.tables,
            duration_ms = entry.duration_ms,
            rows = ?entry.rows_returned,
            error = ?entry.error_message,
            "audit"
        );
        Ok(())
    }
}

const AUDIT_TREE_NAME: &[u8] = b"audit:entries";

/// Append-only sink persisted in sled. Keys are entry IDs, so iteration
/// order is creation order.
#[derive(Clone)]
pub struct SledAuditSink {
    tree: sled::Tree,
}

impl SledAuditSink {
    /// Open the audit tree in `db`.
    pub fn open(db: &sled::Db) -> Result<Self, AuditError> {
        let tree = db
            .open_tree(AUDIT_TREE_NAME)
            .map_err(|e| AuditError(e.to_string()))?;
        Ok(Self { tree })
    }

    /// Up to `limit` entries, newest first.
    pub fn recent(&self, limit: usize) -> Result<Vec<AuditEntry>, AuditError> {
        self.tree
            .iter()
            .rev()
            .take(limit)
            .map(|result| {
                let (_, value) = result.map_err(|e| AuditError(e.to_string()))?;
                serde_json::from_slice(&value).map_err(|e| AuditError(e.to_string()))
            })
            .collect()
    }

    /// Number of stored entries.
    pub fn len(&self) -> usize {
        self.tree.len()
    }

    /// Check if empty.
    pub fn is_empty(&self) -> bool {
        self.tree.is_empty()
    }
}

impl AuditSink for SledAuditSink {
    fn record(&self, entry: &AuditEntry) -> Result<(), AuditError> {
        let value = serde_json::to_vec(entry).map_err(|e| AuditError(e.to_string()))?;
        self.tree
            .insert(entry.id.as_bytes(), value)
            .map_err(|e| AuditError(e.to_string()))?;
        Ok(())
    }

    fn flush(&self) -> Result<(), AuditError> {
        self.tree
            .flush()
            .map(|_| ())
            .map_err(|e| AuditError(e.to_string()))
    }
}

/// Configuration for the audit writer.
#[derive(Debug, Clone)]
pub struct AuditWriterConfig {
    /// Entries that may wait for the worker before new ones are dropped.
    pub queue_capacity: usize,
}

impl Default for AuditWriterConfig {
    fn default() -> Self {
        Self {
            queue_capacity: 1024,
        }
    }
}

/// Hands entries to a background thread that writes them to an inner sink.
///
/// `record` never blocks. When the queue is full the entry is dropped and
/// counted.
pub struct AuditWriter {
    sender: Mutex<Option<SyncSender<AuditEntry>>>,
    handle: Mutex<Option<JoinHandle<()>>>,
    dropped: AtomicU64,
}

impl AuditWriter {
    /// Start the writer thread.
    pub fn start(sink: Arc<dyn AuditSink>, config: AuditWriterConfig) -> Result<Self, AuditError> {
        let (sender, receiver) = mpsc::sync_channel(config.queue_capacity.max(1));
        let handle = thread::Builder::new()
            .name("lakeward-audit".into())
            .spawn(move || Self::worker_loop(sink, receiver))
            .map_err(|e| AuditError(format!("failed to start audit writer: {}", e)))?;

        Ok(Self {
            sender: Mutex::new(Some(sender)),
            handle: Mutex::new(Some(handle)),
            dropped: AtomicU64::new(0),
        })
    }

    /// Stop accepting entries, drain the queue and wait for the worker.
    pub fn stop(&self) {
        self.sender.lock().take();
        if let Some(handle) = self.handle.lock().take() {
            let _ = handle.join();
        }
    }

    /// Check if the worker is still running.
    pub fn is_running(&self) -> bool {
        self.handle
            .lock()
            .as_ref()
            .map(|h| !h.is_finished())
            .unwrap_or(false)
    }

    /// Entries dropped because the queue was full.
    pub fn dropped(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }

    fn worker_loop(sink: Arc<dyn AuditSink>, receiver: Receiver<AuditEntry>) {
        for entry in receiver {
            if let Err(e) = sink.record(&entry) {
                warn!(id = %entry.id, error = %e, "failed to write audit entry");
            }
        }
        if let Err(e) = sink.flush() {
            warn!(error = %e, "failed to flush audit sink");
        }
    }
}

impl AuditSink for AuditWriter {
    fn record(&self, entry: &AuditEntry) -> Result<(), AuditError> {
        let guard = self.sender.lock();
        let Some(sender) = guard.as_ref() else {
            return Err(AuditError("audit writer stopped".into()));
        };
        match sender.try_send(entry.clone()) {
            Ok(()) => Ok(()),
            Err(TrySendError::Full(_)) => {
                self.dropped.fetch_add(1, Ordering::Relaxed);
                Err(AuditError("audit queue full".into()))
            }
            Err(TrySendError::Disconnected(_)) => {
                Err(AuditError("audit writer stopped".into()))
            }
        }
    }
}

impl Drop for AuditWriter {
    fn drop(&mut self) {
        self.stop();
    }
}
