//! Authorization for the secure query engine.
//!
//! This module provides:
//! - Per-call snapshots of a principal's identity and grants
//! - Privilege resolution over the catalog/schema/table/column hierarchy
//! - Row filter and column mask resolution
//! - Audit entries and sinks
//!
//! # Example
//!
//! ```ignore
//! use lakeward_core::security::{AccessSnapshot, PrivilegeResolver};
//!
//! let snapshot = AccessSnapshot::capture(&store, &store, "analyst1")?;
//! PrivilegeResolver::authorize_table_read(&snapshot, &table)?;
//! ```

pub mod audit;
pub mod column_mask;
pub mod error;
pub mod privilege;
pub mod row_filter;
pub mod snapshot;

// Error types
pub use error::{SecurityError, SecurityResult};

// Resolution
pub use column_mask::ColumnMaskResolver;
pub use privilege::{PrivilegeResolver, PrivilegeSet};
pub use row_filter::{BoundRowFilter, RowFilterResolver};
pub use snapshot::AccessSnapshot;

// Audit
pub use audit::{
    AuditAction, AuditDraft, AuditEntry, AuditError, AuditSink, AuditStatus, AuditWriter,
    AuditWriterConfig, MemoryAuditSink, NullAuditSink, SledAuditSink, TracingAuditSink,
};
