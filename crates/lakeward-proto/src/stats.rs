//! Aggregate table statistics.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Aggregate statistics for a table.
///
/// Computed over the unfiltered table: row filters do not apply to
/// aggregate counts, so operators should treat profiling as its own
/// disclosure channel when granting SELECT.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TableStatistics {
    /// Total number of rows.
    pub row_count: u64,
    /// Size of the table's files in bytes.
    pub size_bytes: u64,
    /// Number of columns.
    pub column_count: usize,
    /// When the statistics were computed.
    pub last_profiled_at: DateTime<Utc>,
    /// Principal that requested the profile.
    pub profiled_by: String,
}
