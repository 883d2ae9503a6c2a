//! Lakeward Core - authorization-aware secure query engine.
//!
//! Resolves a principal's effective privileges, injects row filters and
//! column masks into queries, issues time-boxed read manifests and records
//! an audit entry for every call.
//!
//! ```ignore
//! use std::sync::Arc;
//! use lakeward_core::{SecureQueryEngine, SledGovernanceStore, SqliteExecutor};
//!
//! let store = Arc::new(SledGovernanceStore::open(&db)?);
//! let executor = Arc::new(SqliteExecutor::open_read_only("warehouse.db")?);
//! let engine = SecureQueryEngine::new(store, executor);
//! let result = engine.execute("analyst1", "SELECT * FROM titanic")?;
//! ```

#[cfg(feature = "mimalloc")]
#[global_allocator]
static GLOBAL: mimalloc::MiMalloc = mimalloc::MiMalloc;

pub mod config;
pub mod engine;
pub mod error;
pub mod governance;
pub mod security;
pub mod sql;

pub use config::EngineConfig;
pub use engine::{
    ExecuteOptions, ExecutorError, FilePresigner, PassthroughPresigner, PresignKeyError,
    SecureQueryEngine, SignedUrlPresigner, SqlExecutor, SqliteExecutor,
};
pub use error::Error;
pub use governance::{
    ColumnInfo, ColumnMask, Directory, GovernanceSeed, GrantStore, Grantee, GranteeKind, Group,
    PolicyStore, Principal, PrincipalKind, Privilege, PrivilegeGrant, RowFilter, RowFilterBinding,
    Securable, SecurableKind, SledGovernanceStore, TableCatalog, TableInfo, TableName,
};

// Security exports
pub use security::{
    AccessSnapshot, AuditAction, AuditEntry, AuditSink, AuditStatus, AuditWriter,
    AuditWriterConfig, ColumnMaskResolver, MemoryAuditSink, PrivilegeResolver, PrivilegeSet,
    RowFilterResolver, SecurityError, SecurityResult, SledAuditSink, TracingAuditSink,
};

/// Re-export protocol types.
pub use lakeward_proto as proto;
