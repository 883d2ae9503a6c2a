//! Row filter resolution.
//!
//! A principal is subject to every filter on a table that is bound to it
//! directly or to one of its groups. Bound filters combine with AND: each
//! one restricts access, none of them widens it. Admins are never filtered.

use std::collections::BTreeMap;

use super::error::SecurityResult;
use super::snapshot::AccessSnapshot;
use crate::governance::{PolicyStore, RowFilter, RowFilterBinding, TableId};

/// A row filter together with its bindings.
#[derive(Debug, Clone)]
pub struct BoundRowFilter {
    /// The filter.
    pub filter: RowFilter,
    /// Who it applies to.
    pub bindings: Vec<RowFilterBinding>,
}

/// Computes the row filters that apply to a principal.
pub struct RowFilterResolver;

impl RowFilterResolver {
    /// Load a table's filters and their bindings.
    pub fn load(policies: &dyn PolicyStore, table: TableId) -> SecurityResult<Vec<BoundRowFilter>> {
        let mut bound = Vec::new();
        for filter in policies.row_filters_for_table(table)? {
            let bindings = policies.row_filter_bindings(filter.id)?;
            bound.push(BoundRowFilter { filter, bindings });
        }
        Ok(bound)
    }

    /// Filters on `table` that apply to the snapshot's principal, ordered
    /// by filter ID with duplicates removed.
    pub fn filters_for(
        snapshot: &AccessSnapshot,
        table: TableId,
        filters: &[BoundRowFilter],
    ) -> Vec<RowFilter> {
        if snapshot.is_admin() {
            return Vec::new();
        }

        let mut applicable = BTreeMap::new();
        for bound in filters {
            if bound.filter.table_id != table {
                continue;
            }
            if bound
                .bindings
                .iter()
                .any(|b| b.row_filter_id == bound.filter.id && snapshot.includes(&b.grantee))
            {
                applicable
                    .entry(bound.filter.id)
                    .or_insert_with(|| bound.filter.clone());
            }
        }
        applicable.into_values().collect()
    }

    /// Predicate text of each filter, in order.
    pub fn predicates(filters: &[RowFilter]) -> Vec<String> {
        filters.iter().map(|f| f.filter_sql.clone()).collect()
    }

    /// Conjunction of predicates, each parenthesized. `None` when empty.
    pub fn conjoin<S: AsRef<str>>(predicates: &[S]) -> Option<String> {
        if predicates.is_empty() {
            return None;
        }
        Some(
            predicates
                .iter()
                .map(|p| format!("({})", p.as_ref()))
                .collect::<Vec<_>>()
                .join(" AND "),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::governance::{Grantee, Principal};

    fn filter(id: u64, table_id: u64, sql: &str) -> RowFilter {
        RowFilter {
            id,
            table_id,
            filter_sql: sql.into(),
            description: String::new(),
        }
    }

    fn bound(filter: RowFilter, grantees: &[Grantee]) -> BoundRowFilter {
        let bindings = grantees
            .iter()
            .map(|g| RowFilterBinding {
                row_filter_id: filter.id,
                grantee: *g,
            })
            .collect();
        BoundRowFilter { filter, bindings }
    }

    fn analyst() -> AccessSnapshot {
        AccessSnapshot::new(
            Principal::user(1, "analyst1"),
            [7, 8].into_iter().collect(),
            vec![],
        )
    }

    #[test]
    fn test_direct_and_group_bindings() {
        let filters = vec![
            bound(filter(3, 1, "\"Sex\" = 'female'"), &[Grantee::principal(1)]),
            bound(filter(1, 1, "\"Pclass\" = 1"), &[Grantee::group(7)]),
            bound(filter(2, 1, "\"Age\" > 30"), &[Grantee::group(99)]),
        ];
        let applied = RowFilterResolver::filters_for(&analyst(), 1, &filters);
        let ids: Vec<u64> = applied.iter().map(|f| f.id).collect();
        assert_eq!(ids, vec![1, 3]);
    }

    #[test]
    fn test_filter_bound_twice_applies_once() {
        let filters = vec![bound(
            filter(1, 1, "\"Pclass\" = 1"),
            &[Grantee::group(7), Grantee::group(8), Grantee::principal(1)],
        )];
        assert_eq!(RowFilterResolver::filters_for(&analyst(), 1, &filters).len(), 1);
    }

    #[test]
    fn test_other_tables_ignored() {
        let filters = vec![bound(filter(1, 2, "1 = 0"), &[Grantee::principal(1)])];
        assert!(RowFilterResolver::filters_for(&analyst(), 1, &filters).is_empty());
    }

    #[test]
    fn test_admin_unfiltered() {
        let admin = AccessSnapshot::new(
            Principal::user(2, "admin_user").with_admin(true),
            [7].into_iter().collect(),
            vec![],
        );
        let filters = vec![bound(filter(1, 1, "\"Pclass\" = 1"), &[Grantee::group(7)])];
        assert!(RowFilterResolver::filters_for(&admin, 1, &filters).is_empty());
    }

    #[test]
    fn test_conjoin() {
        assert_eq!(RowFilterResolver::conjoin::<String>(&[]), None);
        assert_eq!(
            RowFilterResolver::conjoin(&["a = 1", "b = 2 OR c = 3"]).unwrap(),
            "(a = 1) AND (b = 2 OR c = 3)"
        );
    }
}
