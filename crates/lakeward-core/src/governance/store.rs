//! Read interfaces onto governance state.
//!
//! The engine consumes these and never caches their results, so every call
//! observes the current grants and policies.

use std::collections::BTreeSet;

use super::model::{
    ColumnMask, Grantee, GroupId, Principal, PrincipalId, PrivilegeGrant, RowFilter,
    RowFilterBinding, RowFilterId, SecurableKind, TableId, TableInfo, TableName,
};
use crate::error::Result;

/// Principal and group-membership lookups.
pub trait Directory: Send + Sync {
    /// Find a principal by name.
    fn principal_by_name(&self, name: &str) -> Result<Option<Principal>>;

    /// Groups the principal is a direct member of.
    fn groups_for(&self, principal: PrincipalId) -> Result<BTreeSet<GroupId>>;
}

/// Privilege grant lookups.
pub trait GrantStore: Send + Sync {
    /// Grants held directly by `grantee` on securables of `kind`.
    fn grants_for(&self, grantee: Grantee, kind: SecurableKind) -> Result<Vec<PrivilegeGrant>>;
}

/// Row filter and column mask lookups.
pub trait PolicyStore: Send + Sync {
    /// Row filters defined on a table.
    fn row_filters_for_table(&self, table: TableId) -> Result<Vec<RowFilter>>;

    /// Bindings of one row filter.
    fn row_filter_bindings(&self, filter: RowFilterId) -> Result<Vec<RowFilterBinding>>;

    /// Column masks defined on a table.
    fn column_masks_for_table(&self, table: TableId) -> Result<Vec<ColumnMask>>;
}

/// Table metadata lookups.
pub trait TableCatalog: Send + Sync {
    /// Resolve a fully qualified, normalized name.
    fn resolve_table(&self, name: &TableName) -> Result<Option<TableInfo>>;
}
