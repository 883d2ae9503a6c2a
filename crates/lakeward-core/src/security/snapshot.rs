//! Per-call snapshot of a principal's identity and grants.
//!
//! Resolution functions are pure over a snapshot. The engine captures a new
//! one on every call and never reuses it, so grant and membership changes
//! take effect on the next call.

use std::collections::BTreeSet;

use super::error::{SecurityError, SecurityResult};
use crate::governance::{
    Directory, GrantStore, Grantee, GranteeKind, Principal, PrivilegeGrant, SecurableKind,
};

/// Identity, direct group memberships and every grant that reaches the
/// principal directly or through one of its groups.
#[derive(Debug, Clone)]
pub struct AccessSnapshot {
    principal: Principal,
    groups: BTreeSet<u64>,
    grants: Vec<PrivilegeGrant>,
}

impl AccessSnapshot {
    /// Build a snapshot from already-loaded data.
    pub fn new(principal: Principal, groups: BTreeSet<u64>, grants: Vec<PrivilegeGrant>) -> Self {
        Self {
            principal,
            groups,
            grants,
        }
    }

    /// Load the snapshot for `principal_name`.
    ///
    /// An unknown principal is reported as access denied, so callers cannot
    /// discover which names exist.
    pub fn capture(
        directory: &dyn Directory,
        grants: &dyn GrantStore,
        principal_name: &str,
    ) -> SecurityResult<Self> {
        let principal = directory
            .principal_by_name(principal_name)?
            .ok_or_else(|| SecurityError::AccessDenied("unknown principal".into()))?;

        let groups = directory.groups_for(principal.id)?;

        let mut collected = Vec::new();
        if !principal.is_admin {
            let grantees = std::iter::once(Grantee::principal(principal.id))
                .chain(groups.iter().map(|g| Grantee::group(*g)));
            for grantee in grantees {
                for kind in SecurableKind::ALL {
                    collected.extend(grants.grants_for(grantee, kind)?);
                }
            }
        }

        Ok(Self::new(principal, groups, collected))
    }

    /// The principal.
    pub fn principal(&self) -> &Principal {
        &self.principal
    }

    /// Whether the principal is an admin.
    pub fn is_admin(&self) -> bool {
        self.principal.is_admin
    }

    /// Direct group memberships.
    pub fn groups(&self) -> &BTreeSet<u64> {
        &self.groups
    }

    /// Grants held by the principal or its groups.
    pub fn grants(&self) -> &[PrivilegeGrant] {
        &self.grants
    }

    /// Whether a grant or binding to `grantee` reaches this principal.
    pub fn includes(&self, grantee: &Grantee) -> bool {
        match grantee.kind {
            GranteeKind::Principal => grantee.id == self.principal.id,
            GranteeKind::Group => self.groups.contains(&grantee.id),
        }
    }
}
