//! Built-in role → permission table.

use std::collections::BTreeSet;

use crate::{Permission, Role};

const ADMIN: &[&str] = &["*"];

const MANAGER: &[&str] = &[
    "customers.*",
    "suppliers.*",
    "catalog.*",
    "projects.*",
    "quotes.*",
    "invoices.*",
    "purchasing.*",
    "inventory.*",
    "timesheets.*",
    "documents.*",
    "reports.*",
];

const ACCOUNTANT: &[&str] = &[
    "invoices.*",
    "quotes.read",
    "customers.*",
    "reports.*",
    "documents.*",
];

const STAFF: &[&str] = &[
    "timesheets.log",
    "timesheets.read",
    "projects.read",
    "quotes.read",
    "quotes.write",
    "catalog.read",
];

const VIEWER: &[&str] = &["*.read"];

/// Maps token roles to the permissions they grant.
///
/// Unknown roles grant nothing. Settings (`settings.*`) are only reachable
/// through `admin`.
#[derive(Debug, Clone, Copy, Default)]
pub struct RolePolicy;

impl RolePolicy {
    pub fn permissions_for(&self, role: &Role) -> &'static [&'static str] {
        match role.as_str() {
            "admin" => ADMIN,
            "manager" => MANAGER,
            "accountant" => ACCOUNTANT,
            "staff" => STAFF,
            "viewer" => VIEWER,
            _ => &[],
        }
    }

    /// Union of the permissions of every role, deduplicated.
    pub fn resolve(&self, roles: &[Role]) -> Vec<Permission> {
        roles
            .iter()
            .flat_map(|r| self.permissions_for(r).iter().copied())
            .collect::<BTreeSet<_>>()
            .into_iter()
            .map(Permission::from_static)
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn granted(roles: &[&'static str], required: &'static str) -> bool {
        let roles: Vec<Role> = roles.iter().map(|r| Role::new(*r)).collect();
        let required = Permission::from_static(required);
        RolePolicy
            .resolve(&roles)
            .iter()
            .any(|p| p.grants(&required))
    }

    #[test]
    fn admin_can_do_anything() {
        assert!(granted(&["admin"], "settings.numbering"));
        assert!(granted(&["admin"], "invoices.void"));
    }

    #[test]
    fn staff_logs_time_but_cannot_invoice() {
        assert!(granted(&["staff"], "timesheets.log"));
        assert!(!granted(&["staff"], "timesheets.approve"));
        assert!(!granted(&["staff"], "invoices.issue"));
    }

    #[test]
    fn accountant_reads_quotes_but_cannot_edit_them() {
        assert!(granted(&["accountant"], "quotes.read"));
        assert!(!granted(&["accountant"], "quotes.write"));
        assert!(granted(&["accountant"], "reports.read"));
    }

    #[test]
    fn viewer_is_read_only() {
        assert!(granted(&["viewer"], "invoices.read"));
        assert!(!granted(&["viewer"], "invoices.issue"));
    }

    #[test]
    fn manager_cannot_change_settings() {
        assert!(granted(&["manager"], "purchasing.approve"));
        assert!(!granted(&["manager"], "settings.numbering"));
    }

    #[test]
    fn roles_combine_and_unknown_roles_grant_nothing() {
        assert!(!granted(&["intern"], "quotes.read"));
        assert!(granted(&["intern", "staff"], "quotes.read"));
    }
}
