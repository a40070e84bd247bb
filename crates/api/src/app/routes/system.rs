use axum::{extract::Extension, http::StatusCode, response::IntoResponse, Json};
use serde_json::json;

use bizdesk_auth::RolePolicy;

use crate::context::{PrincipalContext, TenantContext};

pub async fn health() -> impl IntoResponse {
    (StatusCode::OK, Json(json!({ "status": "ok" })))
}

/// The caller's tenant, roles and the permissions they resolve to.
pub async fn whoami(
    Extension(tenant): Extension<TenantContext>,
    Extension(principal): Extension<PrincipalContext>,
) -> impl IntoResponse {
    let mut permissions: Vec<String> = RolePolicy
        .resolve(principal.roles())
        .iter()
        .map(|p| p.as_str().to_string())
        .collect();
    permissions.sort();
    Json(json!({
        "tenant_id": tenant.tenant_id().to_string(),
        "principal_id": principal.principal_id().to_string(),
        "roles": principal.roles().iter().map(|r| r.as_str()).collect::<Vec<_>>(),
        "permissions": permissions,
    }))
}
