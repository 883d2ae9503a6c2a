//! Governance model and stores.
//!
//! The query engine reads principals, grants, row filters, column masks and
//! table metadata through the traits in [`store`]. [`SledGovernanceStore`]
//! implements all of them on top of sled.

pub mod model;
pub mod seed;
pub mod sled_store;
pub mod store;

pub use model::{
    CatalogId, ColumnInfo, ColumnMask, ColumnMaskId, Grantee, GranteeKind, Group, GroupId,
    ParsePrivilegeError, Principal, PrincipalId, PrincipalKind, Privilege, PrivilegeGrant,
    RowFilter, RowFilterBinding, RowFilterId, SchemaId, Securable, SecurableKind, SecurablePath,
    TableId, TableInfo, TableName,
};
pub use seed::{GovernanceSeed, GranteeRef, SeedSummary};
pub use sled_store::SledGovernanceStore;
pub use store::{Directory, GrantStore, PolicyStore, TableCatalog};
