//! Governance data model.
//!
//! Identities, securables, grants and per-table policy objects. These are
//! owned by governance operations outside the query engine; the engine only
//! reads them.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Principal identifier.
pub type PrincipalId = u64;
/// Group identifier.
pub type GroupId = u64;
/// Catalog identifier.
pub type CatalogId = u64;
/// Schema identifier.
pub type SchemaId = u64;
/// Table identifier.
pub type TableId = u64;
/// Row filter identifier.
pub type RowFilterId = u64;
/// Column mask identifier.
pub type ColumnMaskId = u64;

/// Kind of principal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PrincipalKind {
    /// Interactive user.
    User,
    /// Service account.
    Service,
}

/// An authenticated identity.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Principal {
    /// Principal ID.
    pub id: PrincipalId,
    /// Unique name.
    pub name: String,
    /// User or service.
    pub kind: PrincipalKind,
    /// Admins bypass every privilege check and policy.
    #[serde(default)]
    pub is_admin: bool,
}

impl Principal {
    /// Create a non-admin user.
    pub fn user(id: PrincipalId, name: impl Into<String>) -> Self {
        Self {
            id,
            name: name.into(),
            kind: PrincipalKind::User,
            is_admin: false,
        }
    }

    /// Create a service principal.
    pub fn service(id: PrincipalId, name: impl Into<String>) -> Self {
        Self {
            id,
            name: name.into(),
            kind: PrincipalKind::Service,
            is_admin: false,
        }
    }

    /// Mark the principal as admin.
    pub fn with_admin(mut self, is_admin: bool) -> Self {
        self.is_admin = is_admin;
        self
    }
}

/// A named group of principals.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Group {
    /// Group ID.
    pub id: GroupId,
    /// Unique name.
    pub name: String,
}

impl Group {
    /// Create a group.
    pub fn new(id: GroupId, name: impl Into<String>) -> Self {
        Self {
            id,
            name: name.into(),
        }
    }
}

/// Whether a grantee is a principal or a group.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum GranteeKind {
    /// A single principal.
    Principal,
    /// Every member of a group.
    Group,
}

/// Recipient of a grant or a row-filter binding.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Grantee {
    /// Principal or group.
    pub kind: GranteeKind,
    /// Principal or group ID.
    pub id: u64,
}

impl Grantee {
    /// A principal grantee.
    pub fn principal(id: PrincipalId) -> Self {
        Self {
            kind: GranteeKind::Principal,
            id,
        }
    }

    /// A group grantee.
    pub fn group(id: GroupId) -> Self {
        Self {
            kind: GranteeKind::Group,
            id,
        }
    }
}

impl fmt::Display for Grantee {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.kind {
            GranteeKind::Principal => write!(f, "principal:{}", self.id),
            GranteeKind::Group => write!(f, "group:{}", self.id),
        }
    }
}

/// Type of securable.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SecurableKind {
    /// Catalog.
    Catalog,
    /// Schema.
    Schema,
    /// Table.
    Table,
    /// Column.
    Column,
}

impl SecurableKind {
    /// All kinds, outermost first.
    pub const ALL: [SecurableKind; 4] = [
        SecurableKind::Catalog,
        SecurableKind::Schema,
        SecurableKind::Table,
        SecurableKind::Column,
    ];

    fn as_str(&self) -> &'static str {
        match self {
            SecurableKind::Catalog => "catalog",
            SecurableKind::Schema => "schema",
            SecurableKind::Table => "table",
            SecurableKind::Column => "column",
        }
    }
}

impl fmt::Display for SecurableKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// An object privileges are granted on.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum Securable {
    /// A catalog.
    Catalog { id: CatalogId },
    /// A schema.
    Schema { id: SchemaId },
    /// A table.
    Table { id: TableId },
    /// A column of a table.
    Column { table: TableId, name: String },
}

impl Securable {
    /// The securable's type.
    pub fn kind(&self) -> SecurableKind {
        match self {
            Securable::Catalog { .. } => SecurableKind::Catalog,
            Securable::Schema { .. } => SecurableKind::Schema,
            Securable::Table { .. } => SecurableKind::Table,
            Securable::Column { .. } => SecurableKind::Column,
        }
    }

    /// Stable key used in storage.
    pub fn storage_key(&self) -> String {
        match self {
            Securable::Catalog { id } => format!("catalog:{:020}", id),
            Securable::Schema { id } => format!("schema:{:020}", id),
            Securable::Table { id } => format!("table:{:020}", id),
            Securable::Column { table, name } => {
                format!("column:{:020}:{}", table, name.to_lowercase())
            }
        }
    }
}

impl fmt::Display for Securable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Securable::Catalog { id } => write!(f, "catalog {}", id),
            Securable::Schema { id } => write!(f, "schema {}", id),
            Securable::Table { id } => write!(f, "table {}", id),
            Securable::Column { table, name } => write!(f, "column {}.{}", table, name),
        }
    }
}

/// A securable followed by all of its ancestors, innermost first.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SecurablePath(Vec<Securable>);

impl SecurablePath {
    /// Path of a table: table, schema, catalog.
    pub fn for_table(table: &TableInfo) -> Self {
        Self(vec![
            Securable::Table { id: table.id },
            Securable::Schema {
                id: table.schema_id,
            },
            Securable::Catalog {
                id: table.catalog_id,
            },
        ])
    }

    /// Path of a schema: schema, catalog.
    pub fn for_schema(table: &TableInfo) -> Self {
        Self(vec![
            Securable::Schema {
                id: table.schema_id,
            },
            Securable::Catalog {
                id: table.catalog_id,
            },
        ])
    }

    /// The securable the path was built for.
    pub fn target(&self) -> Option<&Securable> {
        self.0.first()
    }

    /// Iterate over the securable and its ancestors.
    pub fn iter(&self) -> impl Iterator<Item = &Securable> {
        self.0.iter()
    }

    /// Whether the path contains a securable.
    pub fn contains(&self, securable: &Securable) -> bool {
        self.0.contains(securable)
    }
}

/// A named capability.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Privilege {
    /// Use a catalog or schema and list what it contains.
    Usage,
    /// Read rows.
    Select,
    /// Insert rows.
    Insert,
    /// Update rows.
    Update,
    /// Delete rows.
    Delete,
    /// Create tables in a schema.
    CreateTable,
    /// Create schemas in a catalog.
    CreateSchema,
    /// Every privilege on the securable and everything beneath it.
    AllPrivileges,
}

impl Privilege {
    /// Every privilege.
    pub const ALL: [Privilege; 8] = [
        Privilege::Usage,
        Privilege::Select,
        Privilege::Insert,
        Privilege::Update,
        Privilege::Delete,
        Privilege::CreateTable,
        Privilege::CreateSchema,
        Privilege::AllPrivileges,
    ];

    /// Canonical name.
    pub fn as_str(&self) -> &'static str {
        match self {
            Privilege::Usage => "USAGE",
            Privilege::Select => "SELECT",
            Privilege::Insert => "INSERT",
            Privilege::Update => "UPDATE",
            Privilege::Delete => "DELETE",
            Privilege::CreateTable => "CREATE_TABLE",
            Privilege::CreateSchema => "CREATE_SCHEMA",
            Privilege::AllPrivileges => "ALL_PRIVILEGES",
        }
    }
}

impl fmt::Display for Privilege {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Error returned when a privilege name is not recognized.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("unknown privilege: {0}")]
pub struct ParsePrivilegeError(pub String);

impl FromStr for Privilege {
    type Err = ParsePrivilegeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let normalized = s.trim().replace(' ', "_").to_uppercase();
        Privilege::ALL
            .into_iter()
            .find(|p| p.as_str() == normalized)
            .ok_or_else(|| ParsePrivilegeError(s.to_string()))
    }
}

/// A privilege granted to a principal or group on a securable.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PrivilegeGrant {
    /// Recipient.
    pub grantee: Grantee,
    /// Object the privilege applies to.
    pub securable: Securable,
    /// Granted privilege.
    pub privilege: Privilege,
    /// Principal that issued the grant.
    pub granted_by: String,
    /// When the grant was issued.
    pub granted_at: DateTime<Utc>,
}

impl PrivilegeGrant {
    /// Create a grant issued now.
    pub fn new(
        grantee: Grantee,
        securable: Securable,
        privilege: Privilege,
        granted_by: impl Into<String>,
    ) -> Self {
        Self {
            grantee,
            securable,
            privilege,
            granted_by: granted_by.into(),
            granted_at: Utc::now(),
        }
    }

    /// Whether two grants convey the same privilege to the same grantee.
    pub fn same_grant(&self, other: &PrivilegeGrant) -> bool {
        self.grantee == other.grantee
            && self.securable == other.securable
            && self.privilege == other.privilege
    }
}

/// A predicate restricting which rows of a table are visible.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RowFilter {
    /// Filter ID.
    pub id: RowFilterId,
    /// Table the filter applies to.
    pub table_id: TableId,
    /// SQL boolean expression over the table's columns.
    pub filter_sql: String,
    /// Free-form description.
    #[serde(default)]
    pub description: String,
}

/// Binds a row filter to a principal or group.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RowFilterBinding {
    /// Bound filter.
    pub row_filter_id: RowFilterId,
    /// Principal or group the filter applies to.
    pub grantee: Grantee,
}

/// An expression substituted for a column's raw value.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ColumnMask {
    /// Mask ID.
    pub id: ColumnMaskId,
    /// Table the mask applies to.
    pub table_id: TableId,
    /// Masked column.
    pub column_name: String,
    /// SQL expression producing the masked value.
    pub mask_expression: String,
    /// Free-form description.
    #[serde(default)]
    pub description: String,
}

/// Column metadata.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ColumnInfo {
    /// Column name as stored.
    pub name: String,
    /// Declared data type.
    pub data_type: String,
}

impl ColumnInfo {
    /// Create column metadata.
    pub fn new(name: impl Into<String>, data_type: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            data_type: data_type.into(),
        }
    }
}

/// Catalog entry for a governed table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TableInfo {
    /// Table ID.
    pub id: TableId,
    /// Containing catalog ID.
    pub catalog_id: CatalogId,
    /// Containing schema ID.
    pub schema_id: SchemaId,
    /// Catalog name.
    pub catalog: String,
    /// Schema name.
    pub schema: String,
    /// Table name.
    pub name: String,
    /// Columns in declaration order.
    #[serde(default)]
    pub columns: Vec<ColumnInfo>,
    /// Owning principal, exempt from column masks.
    #[serde(default)]
    pub owner: Option<PrincipalId>,
    /// Name of the relation in the embedded engine. Defaults to
    /// `[schema, name]`.
    #[serde(default)]
    pub physical_name: Vec<String>,
    /// Underlying data files.
    #[serde(default)]
    pub files: Vec<String>,
    /// Total size of the data files.
    #[serde(default)]
    pub size_bytes: u64,
}

impl TableInfo {
    /// Fully qualified name.
    pub fn table_name(&self) -> TableName {
        TableName::new(&self.catalog, &self.schema, &self.name)
    }

    /// Relation name in the embedded engine.
    pub fn physical_name(&self) -> Vec<String> {
        if self.physical_name.is_empty() {
            vec![self.schema.clone(), self.name.clone()]
        } else {
            self.physical_name.clone()
        }
    }

    /// Look up a column by name, case-insensitively.
    pub fn column(&self, name: &str) -> Option<&ColumnInfo> {
        self.columns
            .iter()
            .find(|c| c.name.eq_ignore_ascii_case(name))
    }
}

/// Normalized, fully qualified table name.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct TableName {
    /// Catalog.
    pub catalog: String,
    /// Schema.
    pub schema: String,
    /// Table.
    pub table: String,
}

impl TableName {
    /// Create a name; all parts are lower-cased.
    pub fn new(catalog: &str, schema: &str, table: &str) -> Self {
        Self {
            catalog: catalog.to_lowercase(),
            schema: schema.to_lowercase(),
            table: table.to_lowercase(),
        }
    }

    /// Complete a one-, two- or three-part reference with defaults.
    ///
    /// Returns `None` for empty or over-qualified references.
    pub fn from_parts(parts: &[&str], default_catalog: &str, default_schema: &str) -> Option<Self> {
        match parts {
            [table] => Some(Self::new(default_catalog, default_schema, table)),
            [schema, table] => Some(Self::new(default_catalog, schema, table)),
            [catalog, schema, table] => Some(Self::new(catalog, schema, table)),
            _ => None,
        }
    }

}

impl fmt::Display for TableName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}.{}", self.catalog, self.schema, self.table)
    }
}
