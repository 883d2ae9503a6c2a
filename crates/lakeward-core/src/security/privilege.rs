//! Privilege resolution.
//!
//! Grants are purely additive: the effective set on a securable is the union
//! of every grant on it and on its ancestors held by the principal or one of
//! its groups. There is no deny. Admins resolve to the universal set.

use std::collections::BTreeSet;

use tracing::debug;

use super::error::{SecurityError, SecurityResult};
use super::snapshot::AccessSnapshot;
use crate::governance::{Privilege, SecurablePath, TableInfo};

/// Effective privileges on one securable.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PrivilegeSet {
    privileges: BTreeSet<Privilege>,
    universal: bool,
}

impl PrivilegeSet {
    /// The empty set.
    pub fn empty() -> Self {
        Self::default()
    }

    /// The set held by admins.
    pub fn universal() -> Self {
        Self {
            privileges: Privilege::ALL.into_iter().collect(),
            universal: true,
        }
    }

    /// Whether this is the admin set.
    pub fn is_universal(&self) -> bool {
        self.universal
    }

    /// Whether `privilege` was granted explicitly.
    pub fn contains(&self, privilege: Privilege) -> bool {
        self.privileges.contains(&privilege)
    }

    /// Whether the set authorizes an operation requiring `privilege`.
    ///
    /// `ALL_PRIVILEGES` authorizes everything.
    pub fn authorizes(&self, privilege: Privilege) -> bool {
        self.universal
            || self.privileges.contains(&privilege)
            || self.privileges.contains(&Privilege::AllPrivileges)
    }

    /// Whether no privilege is held.
    pub fn is_empty(&self) -> bool {
        self.privileges.is_empty()
    }

    /// Iterate over the explicit privileges.
    pub fn iter(&self) -> impl Iterator<Item = Privilege> + '_ {
        self.privileges.iter().copied()
    }
}

impl FromIterator<Privilege> for PrivilegeSet {
    fn from_iter<I: IntoIterator<Item = Privilege>>(iter: I) -> Self {
        Self {
            privileges: iter.into_iter().collect(),
            universal: false,
        }
    }
}

/// Computes effective privileges from a snapshot.
pub struct PrivilegeResolver;

impl PrivilegeResolver {
    /// Effective privileges on the first securable of `path`.
    pub fn resolve(snapshot: &AccessSnapshot, path: &SecurablePath) -> PrivilegeSet {
        if snapshot.is_admin() {
            return PrivilegeSet::universal();
        }
        snapshot
            .grants()
            .iter()
            .filter(|grant| path.contains(&grant.securable))
            .map(|grant| grant.privilege)
            .collect()
    }

    /// Check that the principal may read `table`.
    ///
    /// Requires `USAGE` on the containing schema and `SELECT` on the table,
    /// each satisfiable at any ancestor level or by `ALL_PRIVILEGES`. The
    /// same check gates querying, manifests and profiling.
    pub fn authorize_table_read(
        snapshot: &AccessSnapshot,
        table: &TableInfo,
    ) -> SecurityResult<()> {
        if snapshot.is_admin() {
            return Ok(());
        }

        let schema = Self::resolve(snapshot, &SecurablePath::for_schema(table));
        let on_table = Self::resolve(snapshot, &SecurablePath::for_table(table));
        let allowed = schema.authorizes(Privilege::Usage) && on_table.authorizes(Privilege::Select);

        debug!(
            principal = %snapshot.principal().name,
            table = %table.table_name(),
            allowed,
            "table read check"
        );

        if allowed {
            Ok(())
        } else {
            Err(SecurityError::AccessDenied(format!(
                "not authorized to read table {}",
                table.table_name()
            )))
        }
    }
}
