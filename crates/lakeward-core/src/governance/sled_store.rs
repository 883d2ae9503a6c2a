//! Governance state persisted in sled.
//!
//! One tree per object type, JSON values, and keys laid out so that every
//! lookup the engine performs is a prefix scan. Principals and row filters
//! carry an id index so that renames and moves drop their old keys.

use std::collections::BTreeSet;

use serde::de::DeserializeOwned;
use serde::Serialize;
use tracing::debug;

use super::model::{
    ColumnMask, Group, GroupId, Grantee, GranteeKind, Principal, PrincipalId, PrivilegeGrant,
    RowFilter, RowFilterBinding, RowFilterId, SecurableKind, TableId, TableInfo, TableName,
};
use super::store::{Directory, GrantStore, PolicyStore, TableCatalog};
use crate::error::{Error, Result};

const PRINCIPALS_TREE: &[u8] = b"governance:principals";
const PRINCIPAL_IDS_TREE: &[u8] = b"governance:principal_ids";
const GROUPS_TREE: &[u8] = b"governance:groups";
const MEMBERS_TREE: &[u8] = b"governance:members";
const GRANTS_TREE: &[u8] = b"governance:grants";
const TABLES_TREE: &[u8] = b"governance:tables";
const TABLE_NAMES_TREE: &[u8] = b"governance:table_names";
const ROW_FILTERS_TREE: &[u8] = b"governance:row_filters";
const ROW_FILTER_IDS_TREE: &[u8] = b"governance:row_filter_ids";
const BINDINGS_TREE: &[u8] = b"governance:row_filter_bindings";
const MASKS_TREE: &[u8] = b"governance:column_masks";

/// Sled-backed implementation of every governance read interface, plus the
/// mutations governance operations use to maintain it.
#[derive(Clone)]
pub struct SledGovernanceStore {
    principals: sled::Tree,
    principal_ids: sled::Tree,
    groups: sled::Tree,
    members: sled::Tree,
    grants: sled::Tree,
    tables: sled::Tree,
    table_names: sled::Tree,
    row_filters: sled::Tree,
    row_filter_ids: sled::Tree,
    bindings: sled::Tree,
    masks: sled::Tree,
}

impl SledGovernanceStore {
    /// Open the store's trees in `db`.
    pub fn open(db: &sled::Db) -> Result<Self> {
        Ok(Self {
            principals: db.open_tree(PRINCIPALS_TREE)?,
            principal_ids: db.open_tree(PRINCIPAL_IDS_TREE)?,
            groups: db.open_tree(GROUPS_TREE)?,
            members: db.open_tree(MEMBERS_TREE)?,
            grants: db.open_tree(GRANTS_TREE)?,
            tables: db.open_tree(TABLES_TREE)?,
            table_names: db.open_tree(TABLE_NAMES_TREE)?,
            row_filters: db.open_tree(ROW_FILTERS_TREE)?,
            row_filter_ids: db.open_tree(ROW_FILTER_IDS_TREE)?,
            bindings: db.open_tree(BINDINGS_TREE)?,
            masks: db.open_tree(MASKS_TREE)?,
        })
    }

    // ============== Principals and groups ==============

    /// Insert or replace a principal.
    ///
    /// A principal whose name changed is no longer found under the old
    /// name. A different principal holding the new name is replaced.
    pub fn put_principal(&self, principal: &Principal) -> Result<()> {
        let name = principal.name.to_lowercase();
        if let Some(previous) = self.principal_ids.get(id_key(principal.id))? {
            if previous.as_ref() != name.as_bytes() {
                self.principals.remove(previous)?;
            }
        }
        if let Some(displaced) = self.principal_by_name(&name)? {
            if displaced.id != principal.id {
                self.principal_ids.remove(id_key(displaced.id))?;
            }
        }
        self.principals.insert(name.as_bytes(), encode(principal)?)?;
        self.principal_ids.insert(id_key(principal.id), name.as_bytes())?;
        Ok(())
    }

    /// Insert or replace a group.
    pub fn put_group(&self, group: &Group) -> Result<()> {
        self.groups.insert(id_key(group.id), encode(group)?)?;
        Ok(())
    }

    /// Find a group by name.
    pub fn group_by_name(&self, name: &str) -> Result<Option<Group>> {
        for result in self.groups.iter() {
            let (_, value) = result?;
            let group: Group = decode(&value)?;
            if group.name.eq_ignore_ascii_case(name) {
                return Ok(Some(group));
            }
        }
        Ok(None)
    }

    /// Add a principal to a group. Adding twice is a no-op.
    pub fn add_member(&self, principal: PrincipalId, group: GroupId) -> Result<()> {
        if self.groups.get(id_key(group))?.is_none() {
            return Err(Error::NotFound(format!("group {}", group)));
        }
        self.members.insert(member_key(principal, group), Vec::<u8>::new())?;
        Ok(())
    }

    /// Remove a principal from a group.
    pub fn remove_member(&self, principal: PrincipalId, group: GroupId) -> Result<bool> {
        Ok(self.members.remove(member_key(principal, group))?.is_some())
    }

    // ============== Tables ==============

    /// Insert or replace a table's catalog entry.
    pub fn put_table(&self, table: &TableInfo) -> Result<()> {
        let name = table.table_name().to_string();
        if let Some(previous) = self.table(table.id)? {
            let previous_name = previous.table_name().to_string();
            if previous_name != name {
                self.table_names.remove(previous_name.as_bytes())?;
            }
        }
        self.tables.insert(id_key(table.id), encode(table)?)?;
        self.table_names
            .insert(name.as_bytes(), id_key(table.id).to_vec())?;
        Ok(())
    }

    /// Get a table by ID.
    pub fn table(&self, id: TableId) -> Result<Option<TableInfo>> {
        self.tables
            .get(id_key(id))?
            .map(|v| decode(&v))
            .transpose()
    }

    // ============== Grants ==============

    /// Record a grant.
    ///
    /// Returns `false` when an identical grant already exists; the stored
    /// grant, including its `granted_at`, is left untouched.
    pub fn grant(&self, grant: &PrivilegeGrant) -> Result<bool> {
        let key = grant_key(grant);
        let inserted = self
            .grants
            .compare_and_swap(key.as_bytes(), None as Option<&[u8]>, Some(encode(grant)?))?
            .is_ok();
        debug!(
            grantee = %grant.grantee,
            securable = %grant.securable,
            privilege = %grant.privilege,
            inserted,
            "grant recorded"
        );
        Ok(inserted)
    }

    /// Remove a grant. Returns whether it existed.
    pub fn revoke(&self, grant: &PrivilegeGrant) -> Result<bool> {
        Ok(self.grants.remove(grant_key(grant).as_bytes())?.is_some())
    }

    // ============== Row filters ==============

    /// Insert or replace a row filter. A filter moved to another table no
    /// longer applies to the old one.
    pub fn put_row_filter(&self, filter: &RowFilter) -> Result<()> {
        if let Some(previous) = self.row_filter_table(filter.id)? {
            if previous != filter.table_id {
                self.row_filters.remove(child_key(previous, filter.id))?;
            }
        }
        self.row_filters
            .insert(child_key(filter.table_id, filter.id), encode(filter)?)?;
        self.row_filter_ids
            .insert(id_key(filter.id), id_key(filter.table_id).to_vec())?;
        Ok(())
    }

    /// Find a row filter by ID.
    pub fn row_filter(&self, id: RowFilterId) -> Result<Option<RowFilter>> {
        let Some(table) = self.row_filter_table(id)? else {
            return Ok(None);
        };
        self.row_filters
            .get(child_key(table, id))?
            .map(|v| decode(&v))
            .transpose()
    }

    fn row_filter_table(&self, id: RowFilterId) -> Result<Option<TableId>> {
        self.row_filter_ids
            .get(id_key(id))?
            .map(|v| decode_id(&v))
            .transpose()
    }

    /// Bind a row filter to a principal or group.
    pub fn bind_row_filter(&self, binding: &RowFilterBinding) -> Result<()> {
        if self.row_filter(binding.row_filter_id)?.is_none() {
            return Err(Error::NotFound(format!(
                "row filter {}",
                binding.row_filter_id
            )));
        }
        self.bindings
            .insert(binding_key(binding).as_bytes(), encode(binding)?)?;
        Ok(())
    }

    /// Remove one binding.
    pub fn unbind_row_filter(&self, binding: &RowFilterBinding) -> Result<bool> {
        Ok(self.bindings.remove(binding_key(binding).as_bytes())?.is_some())
    }

    /// Delete a row filter and all of its bindings.
    pub fn delete_row_filter(&self, id: RowFilterId) -> Result<bool> {
        let Some(filter) = self.row_filter(id)? else {
            return Ok(false);
        };
        for result in self.bindings.scan_prefix(binding_prefix(id).as_bytes()) {
            let (key, _) = result?;
            self.bindings.remove(key)?;
        }
        self.row_filters.remove(child_key(filter.table_id, id))?;
        self.row_filter_ids.remove(id_key(id))?;
        Ok(true)
    }

    // ============== Column masks ==============

    /// Set the mask of a column, replacing any existing mask on it.
    pub fn put_column_mask(&self, mask: &ColumnMask) -> Result<()> {
        self.masks
            .insert(mask_key(mask.table_id, &mask.column_name).as_bytes(), encode(mask)?)?;
        Ok(())
    }

    /// Remove the mask of a column.
    pub fn remove_column_mask(&self, table: TableId, column: &str) -> Result<bool> {
        Ok(self.masks.remove(mask_key(table, column).as_bytes())?.is_some())
    }

    /// Flush all trees to disk.
    pub fn flush(&self) -> Result<()> {
        for tree in [
            &self.principals,
            &self.principal_ids,
            &self.groups,
            &self.members,
            &self.grants,
            &self.tables,
            &self.table_names,
            &self.row_filters,
            &self.row_filter_ids,
            &self.bindings,
            &self.masks,
        ] {
            tree.flush()?;
        }
        Ok(())
    }
}

impl Directory for SledGovernanceStore {
    fn principal_by_name(&self, name: &str) -> Result<Option<Principal>> {
        self.principals
            .get(name.to_lowercase().as_bytes())?
            .map(|v| decode(&v))
            .transpose()
    }

    fn groups_for(&self, principal: PrincipalId) -> Result<BTreeSet<GroupId>> {
        let mut groups = BTreeSet::new();
        for result in self.members.scan_prefix(principal.to_be_bytes()) {
            let (key, _) = result?;
            let group = key
                .get(8..16)
                .and_then(|b| <[u8; 8]>::try_from(b).ok())
                .map(u64::from_be_bytes)
                .ok_or_else(|| Error::InvalidData("malformed membership key".into()))?;
            groups.insert(group);
        }
        Ok(groups)
    }
}

impl GrantStore for SledGovernanceStore {
    fn grants_for(&self, grantee: Grantee, kind: SecurableKind) -> Result<Vec<PrivilegeGrant>> {
        let prefix = format!("{}:{}:", grantee_key(grantee), kind);
        self.grants
            .scan_prefix(prefix.as_bytes())
            .map(|result| {
                let (_, value) = result?;
                decode(&value)
            })
            .collect()
    }
}

impl PolicyStore for SledGovernanceStore {
    fn row_filters_for_table(&self, table: TableId) -> Result<Vec<RowFilter>> {
        self.row_filters
            .scan_prefix(table.to_be_bytes())
            .map(|result| {
                let (_, value) = result?;
                decode(&value)
            })
            .collect()
    }

    fn row_filter_bindings(&self, filter: RowFilterId) -> Result<Vec<RowFilterBinding>> {
        self.bindings
            .scan_prefix(binding_prefix(filter).as_bytes())
            .map(|result| {
                let (_, value) = result?;
                decode(&value)
            })
            .collect()
    }

    fn column_masks_for_table(&self, table: TableId) -> Result<Vec<ColumnMask>> {
        self.masks
            .scan_prefix(format!("{:020}:", table).as_bytes())
            .map(|result| {
                let (_, value) = result?;
                decode(&value)
            })
            .collect()
    }
}

impl TableCatalog for SledGovernanceStore {
    fn resolve_table(&self, name: &TableName) -> Result<Option<TableInfo>> {
        let Some(id) = self.table_names.get(name.to_string().as_bytes())? else {
            return Ok(None);
        };
        self.table(decode_id(&id)?)
    }
}

fn encode<T: Serialize>(value: &T) -> Result<Vec<u8>> {
    serde_json::to_vec(value).map_err(|e| Error::Serialization(e.to_string()))
}

fn decode<T: DeserializeOwned>(bytes: &[u8]) -> Result<T> {
    serde_json::from_slice(bytes).map_err(|e| Error::Deserialization(e.to_string()))
}

fn id_key(id: u64) -> [u8; 8] {
    id.to_be_bytes()
}

fn decode_id(bytes: &[u8]) -> Result<u64> {
    <[u8; 8]>::try_from(bytes)
        .map(u64::from_be_bytes)
        .map_err(|_| Error::InvalidData("malformed id".into()))
}

fn child_key(parent: u64, id: u64) -> [u8; 16] {
    let mut key = [0u8; 16];
    key[0..8].copy_from_slice(&parent.to_be_bytes());
    key[8..16].copy_from_slice(&id.to_be_bytes());
    key
}

fn member_key(principal: PrincipalId, group: GroupId) -> [u8; 16] {
    child_key(principal, group)
}

fn grantee_key(grantee: Grantee) -> String {
    match grantee.kind {
        GranteeKind::Principal => format!("principal:{:020}", grantee.id),
        GranteeKind::Group => format!("group:{:020}", grantee.id),
    }
}

fn grant_key(grant: &PrivilegeGrant) -> String {
    format!(
        "{}:{}:{}",
        grantee_key(grant.grantee),
        grant.securable.storage_key(),
        grant.privilege
    )
}

fn binding_prefix(filter: RowFilterId) -> String {
    format!("{:020}:", filter)
}

fn binding_key(binding: &RowFilterBinding) -> String {
    format!(
        "{}{}",
        binding_prefix(binding.row_filter_id),
        grantee_key(binding.grantee)
    )
}

fn mask_key(table: TableId, column: &str) -> String {
    format!("{:020}:{}", table, column.to_lowercase())
}
