//! Column mask resolution.
//!
//! A mask on (table, column) applies to every principal except admins and
//! the table's owner. There is no separate unmask privilege.

use std::collections::BTreeMap;

use super::snapshot::AccessSnapshot;
use crate::governance::{ColumnMask, TableId, TableInfo};

/// Computes column masks for a principal.
pub struct ColumnMaskResolver;

impl ColumnMaskResolver {
    /// The mask defined on a column, if any.
    pub fn mask_for<'a>(
        masks: &'a [ColumnMask],
        table: TableId,
        column: &str,
    ) -> Option<&'a ColumnMask> {
        masks
            .iter()
            .find(|m| m.table_id == table && m.column_name.eq_ignore_ascii_case(column))
    }

    /// Whether the principal sees raw values of every column of `table`.
    pub fn is_exempt(snapshot: &AccessSnapshot, table: &TableInfo) -> bool {
        snapshot.is_admin() || table.owner == Some(snapshot.principal().id)
    }

    /// Mask expressions that apply to the principal, keyed by column name.
    ///
    /// Columns are named as declared on the table. Masks on columns the
    /// table does not declare keep the name they were defined with.
    pub fn effective_masks(
        snapshot: &AccessSnapshot,
        table: &TableInfo,
        masks: &[ColumnMask],
    ) -> BTreeMap<String, String> {
        if Self::is_exempt(snapshot, table) {
            return BTreeMap::new();
        }
        let mut effective: BTreeMap<String, String> = table
            .columns
            .iter()
            .filter_map(|column| {
                Self::mask_for(masks, table.id, &column.name)
                    .map(|m| (column.name.clone(), m.mask_expression.clone()))
            })
            .collect();
        for mask in masks {
            if mask.table_id == table.id && table.column(&mask.column_name).is_none() {
                effective
                    .entry(mask.column_name.clone())
                    .or_insert_with(|| mask.mask_expression.clone());
            }
        }
        effective
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::governance::{ColumnInfo, Principal};

    fn table(owner: Option<u64>) -> TableInfo {
        TableInfo {
            id: 1,
            catalog_id: 1,
            schema_id: 1,
            catalog: "lake".into(),
            schema: "main".into(),
            name: "titanic".into(),
            columns: vec![ColumnInfo::new("Name", "TEXT"), ColumnInfo::new("Age", "REAL")],
            owner,
            physical_name: vec![],
            files: vec![],
            size_bytes: 0,
        }
    }

    fn masks() -> Vec<ColumnMask> {
        vec![
            ColumnMask {
                id: 1,
                table_id: 1,
                column_name: "name".into(),
                mask_expression: "'***'".into(),
                description: String::new(),
            },
            ColumnMask {
                id: 2,
                table_id: 2,
                column_name: "Age".into(),
                mask_expression: "NULL".into(),
                description: String::new(),
            },
        ]
    }

    fn user(id: u64) -> AccessSnapshot {
        AccessSnapshot::new(Principal::user(id, "u"), Default::default(), vec![])
    }

    #[test]
    fn test_mask_for() {
        let masks = masks();
        assert_eq!(ColumnMaskResolver::mask_for(&masks, 1, "NAME").unwrap().id, 1);
        assert!(ColumnMaskResolver::mask_for(&masks, 1, "Age").is_none());
    }

    #[test]
    fn test_non_owner_masked_with_declared_name() {
        let effective = ColumnMaskResolver::effective_masks(&user(5), &table(Some(1)), &masks());
        assert_eq!(effective.len(), 1);
        assert_eq!(effective.get("Name").map(String::as_str), Some("'***'"));
    }

    #[test]
    fn test_owner_and_admin_exempt() {
        assert!(ColumnMaskResolver::effective_masks(&user(1), &table(Some(1)), &masks()).is_empty());
        let admin = AccessSnapshot::new(
            Principal::user(9, "admin").with_admin(true),
            Default::default(),
            vec![],
        );
        assert!(ColumnMaskResolver::effective_masks(&admin, &table(None), &masks()).is_empty());
    }

    #[test]
    fn test_undeclared_column_keeps_mask_name() {
        let mut masks = masks();
        masks.push(ColumnMask {
            id: 3,
            table_id: 1,
            column_name: "Ticket".into(),
            mask_expression: "NULL".into(),
            description: String::new(),
        });
        let effective = ColumnMaskResolver::effective_masks(&user(5), &table(None), &masks);
        assert_eq!(effective.len(), 2);
        assert_eq!(effective.get("Ticket").map(String::as_str), Some("NULL"));
        assert!(!effective.contains_key("Age"));
    }
}
