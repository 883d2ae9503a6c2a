//! Execution adapter for the embedded warehouse engine.
//!
//! The engine is opaque to the rest of the crate: it accepts one SQL
//! statement and returns normalized columns and rows, or a structured
//! failure.

use std::path::Path;
use std::time::Instant;

use lakeward_proto::{QueryResult, Value};
use parking_lot::Mutex;
use rusqlite::types::ValueRef;
use rusqlite::{Connection, ErrorCode, OpenFlags};
use thiserror::Error;
use tracing::debug;

/// Number of SQLite virtual machine instructions between deadline checks.
const PROGRESS_INTERVAL_OPS: i32 = 1_000;

/// Failure reported by an executor.
#[derive(Debug, Error)]
pub enum ExecutorError {
    /// The deadline passed before the statement completed.
    #[error("query deadline exceeded")]
    DeadlineExceeded,

    /// The statement would modify the warehouse.
    #[error("statement is not read-only")]
    NotReadOnly,

    /// Any other engine failure. The text comes from the engine and may
    /// mention column or table names.
    #[error("{0}")]
    Engine(String),
}

/// Runs one SQL statement synchronously.
pub trait SqlExecutor: Send + Sync {
    /// Execute `sql`, giving up once `deadline` has passed.
    fn run(&self, sql: &str, deadline: Option<Instant>) -> Result<QueryResult, ExecutorError>;
}

/// Executor backed by a single SQLite connection.
///
/// Calls are serialized on the connection. Statements that SQLite does not
/// consider read-only are refused before they run.
pub struct SqliteExecutor {
    conn: Mutex<Connection>,
}

impl SqliteExecutor {
    /// Wrap an open connection.
    pub fn new(conn: Connection) -> Self {
        Self {
            conn: Mutex::new(conn),
        }
    }

    /// Open a warehouse file read-write.
    pub fn open(path: impl AsRef<Path>) -> Result<Self, ExecutorError> {
        let conn = Connection::open(path).map_err(|e| ExecutorError::Engine(e.to_string()))?;
        Ok(Self::new(conn))
    }

    /// Open a warehouse file read-only.
    pub fn open_read_only(path: impl AsRef<Path>) -> Result<Self, ExecutorError> {
        let conn = Connection::open_with_flags(
            path,
            OpenFlags::SQLITE_OPEN_READ_ONLY | OpenFlags::SQLITE_OPEN_NO_MUTEX,
        )
        .map_err(|e| ExecutorError::Engine(e.to_string()))?;
        Ok(Self::new(conn))
    }

    /// Create an empty in-memory warehouse.
    pub fn open_in_memory() -> Result<Self, ExecutorError> {
        let conn = Connection::open_in_memory().map_err(|e| ExecutorError::Engine(e.to_string()))?;
        Ok(Self::new(conn))
    }

    /// Run `f` with exclusive access to the connection, for loading data.
    pub fn with_connection<T>(
        &self,
        f: impl FnOnce(&Connection) -> rusqlite::Result<T>,
    ) -> Result<T, ExecutorError> {
        let conn = self.conn.lock();
        f(&conn).map_err(|e| ExecutorError::Engine(e.to_string()))
    }

    fn query(conn: &Connection, sql: &str) -> Result<QueryResult, ExecutorError> {
        let mut stmt = conn.prepare(sql).map_err(map_error)?;
        if !stmt.readonly() {
            return Err(ExecutorError::NotReadOnly);
        }

        let columns: Vec<String> = stmt.column_names().into_iter().map(String::from).collect();
        let width = columns.len();

        let mut rows = Vec::new();
        let mut cursor = stmt.query([]).map_err(map_error)?;
        while let Some(row) = cursor.next().map_err(map_error)? {
            let mut values = Vec::with_capacity(width);
            for idx in 0..width {
                values.push(to_value(row.get_ref(idx).map_err(map_error)?));
            }
            rows.push(values);
        }

        Ok(QueryResult::new(columns, rows))
    }
}

impl SqlExecutor for SqliteExecutor {
    fn run(&self, sql: &str, deadline: Option<Instant>) -> Result<QueryResult, ExecutorError> {
        let conn = self.conn.lock();
        if deadline.is_some_and(|d| Instant::now() >= d) {
            return Err(ExecutorError::DeadlineExceeded);
        }

        if let Some(deadline) = deadline {
            conn.progress_handler(
                PROGRESS_INTERVAL_OPS,
                Some(move || Instant::now() >= deadline),
            );
        }
        let started = Instant::now();
        let result = Self::query(&conn, sql);
        if deadline.is_some() {
            conn.progress_handler(0, None::<fn() -> bool>);
        }

        debug!(
            elapsed_us = started.elapsed().as_micros() as u64,
            ok = result.is_ok(),
            "statement executed"
        );
        result
    }
}

fn map_error(err: rusqlite::Error) -> ExecutorError {
    match err {
        rusqlite::Error::SqliteFailure(failure, _)
            if failure.code == ErrorCode::OperationInterrupted =>
        {
            ExecutorError::DeadlineExceeded
        }
        other => ExecutorError::Engine(other.to_string()),
    }
}

fn to_value(value: ValueRef<'_>) -> Value {
    match value {
        ValueRef::Null => Value::Null,
        ValueRef::Integer(i) => Value::Int64(i),
        ValueRef::Real(f) => Value::Float64(f),
        ValueRef::Text(t) => Value::String(String::from_utf8_lossy(t).into_owned()),
        ValueRef::Blob(b) => Value::Bytes(b.to_vec()),
    }
}
