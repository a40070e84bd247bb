//! Permission checks at the command boundary, before anything is dispatched.
//!
//! Domain aggregates and infra stay auth-agnostic.

use axum::http::StatusCode;
use axum::response::Response;

use bizdesk_auth::{
    AuthzError, CommandAuthorization, Permission, Principal, RolePolicy, TenantMembership, authorize,
};

use crate::app::errors;
use crate::context::{PrincipalContext, TenantContext};

/// Permissions an endpoint needs.
pub struct Requires(Vec<Permission>);

impl Requires {
    pub fn one(permission: &'static str) -> Self {
        Self(vec![Permission::from_static(permission)])
    }
}

impl CommandAuthorization for Requires {
    fn required_permissions(&self) -> &[Permission] {
        &self.0
    }
}

/// Check every permission `command` requires against the caller's roles.
pub fn authorize_command<C: CommandAuthorization>(
    tenant: &TenantContext,
    principal: &PrincipalContext,
    command: &C,
) -> Result<(), AuthzError> {
    let membership = TenantMembership {
        tenant_id: tenant.tenant_id(),
        roles: principal.roles().to_vec(),
        permissions: RolePolicy.resolve(principal.roles()),
    };
    let principal = Principal {
        principal_id: principal.principal_id(),
        active_tenant_id: tenant.tenant_id(),
        membership,
    };

    for perm in command.required_permissions() {
        authorize(&principal, perm)?;
    }
    Ok(())
}

/// [`authorize_command`] for a single permission, as a ready 403 response.
pub fn require(
    tenant: &TenantContext,
    principal: &PrincipalContext,
    permission: &'static str,
) -> Result<(), Response> {
    authorize_command(tenant, principal, &Requires::one(permission)).map_err(|e| {
        tracing::debug!(principal = %principal.principal_id(), permission, "forbidden");
        errors::json_error(StatusCode::FORBIDDEN, "forbidden", e.to_string())
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use bizdesk_auth::{PrincipalId, Role};
    use bizdesk_core::TenantId;

    fn ctx(roles: &[&'static str]) -> (TenantContext, PrincipalContext) {
        (
            TenantContext::new(TenantId::new()),
            PrincipalContext::new(PrincipalId::new(), roles.iter().map(|r| Role::new(*r)).collect()),
        )
    }

    #[test]
    fn roles_are_resolved_through_the_policy() {
        let (t, p) = ctx(&["accountant"]);
        assert!(require(&t, &p, "invoices.void").is_ok());
        assert!(require(&t, &p, "purchasing.approve").is_err());
    }

    #[test]
    fn every_required_permission_must_be_granted() {
        let (t, p) = ctx(&["staff"]);
        let both = Requires(vec![
            Permission::from_static("timesheets.log"),
            Permission::from_static("timesheets.approve"),
        ]);
        assert_eq!(
            authorize_command(&t, &p, &both),
            Err(AuthzError::Forbidden("timesheets.approve".to_string()))
        );
    }
}
