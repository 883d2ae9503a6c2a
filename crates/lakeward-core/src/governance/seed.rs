//! Declarative governance seed.
//!
//! A JSON document describing principals, groups, tables, grants and
//! policies, applied in one pass. Grantees are referenced by name so seeds
//! stay readable.
//!
//! ```json
//! {
//!   "principals": [{ "id": 1, "name": "analyst1", "kind": "user" }],
//!   "groups": [{ "id": 1, "name": "analysts" }],
//!   "memberships": [{ "principal": "analyst1", "group": "analysts" }],
//!   "grants": [
//!     { "grantee": { "group": "analysts" },
//!       "securable": { "type": "table", "id": 1 },
//!       "privilege": "SELECT" }
//!   ]
//! }
//! ```

use std::path::Path;

use serde::{Deserialize, Serialize};
use tracing::info;

use super::model::{
    ColumnMask, Grantee, Group, Principal, Privilege, PrivilegeGrant, RowFilter,
    RowFilterBinding, Securable, TableInfo,
};
use super::sled_store::SledGovernanceStore;
use super::store::Directory;
use crate::error::{Error, Result};

/// A grantee referenced by name.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum GranteeRef {
    /// Principal name.
    Principal(String),
    /// Group name.
    Group(String),
}

/// Group membership entry.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MembershipSeed {
    /// Principal name.
    pub principal: String,
    /// Group name.
    pub group: String,
}

/// Grant entry.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GrantSeed {
    /// Recipient.
    pub grantee: GranteeRef,
    /// Object granted on.
    pub securable: Securable,
    /// Granted privilege.
    pub privilege: Privilege,
}

/// Row filter entry with its bindings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RowFilterSeed {
    /// The filter.
    #[serde(flatten)]
    pub filter: RowFilter,
    /// Principals and groups the filter applies to.
    #[serde(default)]
    pub bound_to: Vec<GranteeRef>,
}

/// Counts of objects applied from a seed.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SeedSummary {
    /// Principals written.
    pub principals: usize,
    /// Tables written.
    pub tables: usize,
    /// Grants newly recorded. Already-present grants are not counted.
    pub grants: usize,
    /// Row filters written.
    pub row_filters: usize,
    /// Column masks written.
    pub column_masks: usize,
}

/// Governance state to load into a store.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct GovernanceSeed {
    /// Users and service principals, keyed by id.
    #[serde(default)]
    pub principals: Vec<Principal>,
    /// Groups, keyed by id.
    #[serde(default)]
    pub groups: Vec<Group>,
    /// Principal-to-group memberships, by name.
    #[serde(default)]
    pub memberships: Vec<MembershipSeed>,
    /// Catalog tables with their columns and files.
    #[serde(default)]
    pub tables: Vec<TableInfo>,
    /// Privilege grants on catalogs, schemas and tables.
    #[serde(default)]
    pub grants: Vec<GrantSeed>,
    /// Row filters and the grantees they are bound to.
    #[serde(default)]
    pub row_filters: Vec<RowFilterSeed>,
    /// Column masks. Masks apply to every non-exempt principal.
    #[serde(default)]
    pub column_masks: Vec<ColumnMask>,
}

impl GovernanceSeed {
    /// Parse a seed from JSON text.
    pub fn from_json(json: &str) -> Result<Self> {
        serde_json::from_str(json).map_err(|e| Error::Deserialization(e.to_string()))
    }

    /// Read a seed file.
    pub fn from_path(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let json = std::fs::read_to_string(path)
            .map_err(|e| Error::InvalidData(format!("{}: {}", path.display(), e)))?;
        Self::from_json(&json)
    }

    /// Write everything in the seed to `store`.
    ///
    /// Principals, groups and tables are written before anything that
    /// references them by name.
    pub fn apply(&self, store: &SledGovernanceStore, granted_by: &str) -> Result<SeedSummary> {
        let mut summary = SeedSummary::default();

        for principal in &self.principals {
            store.put_principal(principal)?;
            summary.principals += 1;
        }
        for group in &self.groups {
            store.put_group(group)?;
        }
        for membership in &self.memberships {
            let principal = resolve(store, &GranteeRef::Principal(membership.principal.clone()))?;
            let group = resolve(store, &GranteeRef::Group(membership.group.clone()))?;
            store.add_member(principal.id, group.id)?;
        }
        for table in &self.tables {
            store.put_table(table)?;
            summary.tables += 1;
        }
        for grant in &self.grants {
            let grantee = resolve(store, &grant.grantee)?;
            let record =
                PrivilegeGrant::new(grantee, grant.securable.clone(), grant.privilege, granted_by);
            if store.grant(&record)? {
                summary.grants += 1;
            }
        }
        for seed in &self.row_filters {
            store.put_row_filter(&seed.filter)?;
            for grantee in &seed.bound_to {
                store.bind_row_filter(&RowFilterBinding {
                    row_filter_id: seed.filter.id,
                    grantee: resolve(store, grantee)?,
                })?;
            }
            summary.row_filters += 1;
        }
        for mask in &self.column_masks {
            store.put_column_mask(mask)?;
            summary.column_masks += 1;
        }

        info!(
            principals = summary.principals,
            tables = summary.tables,
            grants = summary.grants,
            row_filters = summary.row_filters,
            column_masks = summary.column_masks,
            "governance seed applied"
        );
        Ok(summary)
    }
}

fn resolve(store: &SledGovernanceStore, grantee: &GranteeRef) -> Result<Grantee> {
    match grantee {
        GranteeRef::Principal(name) => store
            .principal_by_name(name)?
            .map(|p| Grantee::principal(p.id))
            .ok_or_else(|| Error::NotFound(format!("principal {}", name))),
        GranteeRef::Group(name) => store
            .group_by_name(name)?
            .map(|g| Grantee::group(g.id))
            .ok_or_else(|| Error::NotFound(format!("group {}", name))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::governance::model::{SecurableKind, TableName};
    use crate::governance::store::{GrantStore, PolicyStore, TableCatalog};

    const SEED: &str = r#"{
        "principals": [
            { "id": 1, "name": "analyst1", "kind": "user" },
            { "id": 2, "name": "admin_user", "kind": "user", "is_admin": true }
        ],
        "groups": [{ "id": 1, "name": "analysts" }],
        "memberships": [{ "principal": "analyst1", "group": "analysts" }],
        "tables": [{
            "id": 1, "catalog_id": 1, "schema_id": 1,
            "catalog": "lake", "schema": "main", "name": "titanic",
            "columns": [{ "name": "Pclass", "data_type": "INTEGER" }]
        }],
        "grants": [
            { "grantee": { "principal": "analyst1" },
              "securable": { "type": "schema", "id": 1 }, "privilege": "USAGE" },
            { "grantee": { "principal": "analyst1" },
              "securable": { "type": "table", "id": 1 }, "privilege": "SELECT" }
        ],
        "row_filters": [{
            "id": 1, "table_id": 1, "filter_sql": "\"Pclass\" = 1",
            "bound_to": [{ "group": "analysts" }]
        }]
    }"#;

    #[test]
    fn test_apply_seed() {
        let db = sled::Config::new().temporary(true).open().unwrap();
        let store = SledGovernanceStore::open(&db).unwrap();
        let seed = GovernanceSeed::from_json(SEED).unwrap();

        let summary = seed.apply(&store, "bootstrap").unwrap();
        assert_eq!(summary.principals, 2);
        assert_eq!(summary.grants, 2);
        assert_eq!(summary.row_filters, 1);

        assert!(store.principal_by_name("admin_user").unwrap().unwrap().is_admin);
        assert_eq!(store.groups_for(1).unwrap().len(), 1);
        assert!(store
            .resolve_table(&TableName::new("lake", "main", "titanic"))
            .unwrap()
            .is_some());
        assert_eq!(
            store
                .grants_for(Grantee::principal(1), SecurableKind::Table)
                .unwrap()[0]
                .granted_by,
            "bootstrap"
        );
        assert_eq!(
            store.row_filter_bindings(1).unwrap()[0].grantee,
            Grantee::group(1)
        );

        // Re-applying records no new grants.
        let again = seed.apply(&store, "bootstrap").unwrap();
        assert_eq!(again.grants, 0);
    }

    #[test]
    fn test_unknown_grantee_fails() {
        let db = sled::Config::new().temporary(true).open().unwrap();
        let store = SledGovernanceStore::open(&db).unwrap();
        let seed = GovernanceSeed::from_json(
            r#"{ "memberships": [{ "principal": "ghost", "group": "analysts" }] }"#,
        )
        .unwrap();
        assert!(matches!(seed.apply(&store, "x"), Err(Error::NotFound(_))));
    }
}
