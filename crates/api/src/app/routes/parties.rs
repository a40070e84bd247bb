//! Customers and suppliers share one aggregate; each router is pinned to a kind.

use std::sync::Arc;

use axum::{
    extract::{Extension, Path},
    routing::{get, post},
    Json, Router,
};
use chrono::Utc;

use bizdesk_core::AggregateId;
use bizdesk_parties::{
    Party, PartyCommand, PartyId, PartyKind, ReactivateParty, RegisterParty, SuspendParty,
    UpdateDetails,
};

use crate::app::errors::{self, ApiResult};
use crate::app::routes::common;
use crate::app::services::AppServices;
use crate::app::dto;
use crate::authz::require;
use crate::context::{PrincipalContext, TenantContext};

pub fn router(kind: PartyKind) -> Router {
    Router::new()
        .route("/", post(register_party).get(list_parties))
        .route("/:id", get(get_party).patch(update_party))
        .route("/:id/suspend", post(suspend_party))
        .route("/:id/reactivate", post(reactivate_party))
        .layer(Extension(kind))
}

fn read_permission(kind: PartyKind) -> &'static str {
    match kind {
        PartyKind::Customer => "customers.read",
        PartyKind::Supplier => "suppliers.read",
    }
}

fn write_permission(kind: PartyKind) -> &'static str {
    match kind {
        PartyKind::Customer => "customers.write",
        PartyKind::Supplier => "suppliers.write",
    }
}

fn label(kind: PartyKind) -> &'static str {
    match kind {
        PartyKind::Customer => "customer",
        PartyKind::Supplier => "supplier",
    }
}

/// Load a party of the router's kind from the read model.
fn find(services: &AppServices, tenant: &TenantContext, kind: PartyKind, raw_id: &str) -> Result<Party, axum::response::Response> {
    let id = dto::parse_id(raw_id, label(kind))?;
    services
        .projections()
        .parties
        .get(tenant.tenant_id(), id)
        .filter(|p| p.kind() == kind)
        .ok_or_else(|| errors::not_found(label(kind)))
}

pub async fn register_party(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(tenant): Extension<TenantContext>,
    Extension(principal): Extension<PrincipalContext>,
    Extension(kind): Extension<PartyKind>,
    Json(body): Json<dto::RegisterPartyRequest>,
) -> ApiResult {
    require(&tenant, &principal, write_permission(kind))?;

    let party_id = PartyId::new(AggregateId::new());
    let cmd = PartyCommand::RegisterParty(RegisterParty {
        tenant_id: tenant.tenant_id(),
        party_id,
        kind,
        name: body.name,
        contact: Some(body.contact),
        tax_id: body.tax_id,
        payment_terms_days: body.payment_terms_days,
        occurred_at: Utc::now(),
    });

    let party = services
        .dispatch::<Party>(tenant.tenant_id(), party_id.0, cmd)
        .await
        .map_err(errors::dispatch_error_to_response)?;
    Ok(common::created(dto::party_to_json(&party)))
}

pub async fn list_parties(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(tenant): Extension<TenantContext>,
    Extension(principal): Extension<PrincipalContext>,
    Extension(kind): Extension<PartyKind>,
) -> ApiResult {
    require(&tenant, &principal, read_permission(kind))?;

    let mut parties: Vec<_> = services
        .projections()
        .parties
        .list(tenant.tenant_id())
        .into_iter()
        .filter(|p| p.kind() == kind)
        .collect();
    parties.sort_by(|a, b| a.name().cmp(b.name()));
    Ok(common::items(parties.iter().map(dto::party_to_json).collect()))
}

pub async fn get_party(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(tenant): Extension<TenantContext>,
    Extension(principal): Extension<PrincipalContext>,
    Extension(kind): Extension<PartyKind>,
    Path(id): Path<String>,
) -> ApiResult {
    require(&tenant, &principal, read_permission(kind))?;
    let party = find(&services, &tenant, kind, &id)?;
    Ok(common::ok(dto::party_to_json(&party)))
}

pub async fn update_party(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(tenant): Extension<TenantContext>,
    Extension(principal): Extension<PrincipalContext>,
    Extension(kind): Extension<PartyKind>,
    Path(id): Path<String>,
    Json(body): Json<dto::UpdatePartyRequest>,
) -> ApiResult {
    require(&tenant, &principal, write_permission(kind))?;
    let party_id = find(&services, &tenant, kind, &id)?.id_typed();

    let cmd = PartyCommand::UpdateDetails(UpdateDetails {
        tenant_id: tenant.tenant_id(),
        party_id,
        name: body.name,
        contact: body.contact,
        tax_id: body.tax_id,
        payment_terms_days: body.payment_terms_days,
        occurred_at: Utc::now(),
    });
    let party = services
        .dispatch::<Party>(tenant.tenant_id(), party_id.0, cmd)
        .await
        .map_err(errors::dispatch_error_to_response)?;
    Ok(common::ok(dto::party_to_json(&party)))
}

pub async fn suspend_party(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(tenant): Extension<TenantContext>,
    Extension(principal): Extension<PrincipalContext>,
    Extension(kind): Extension<PartyKind>,
    Path(id): Path<String>,
    body: Option<Json<dto::ReasonRequest>>,
) -> ApiResult {
    require(&tenant, &principal, write_permission(kind))?;
    let party_id = find(&services, &tenant, kind, &id)?.id_typed();
    let reason = body.and_then(|Json(b)| b.reason);

    let cmd = PartyCommand::SuspendParty(SuspendParty {
        tenant_id: tenant.tenant_id(),
        party_id,
        reason,
        occurred_at: Utc::now(),
    });
    let party = services
        .dispatch::<Party>(tenant.tenant_id(), party_id.0, cmd)
        .await
        .map_err(errors::dispatch_error_to_response)?;
    Ok(common::ok(dto::party_to_json(&party)))
}

pub async fn reactivate_party(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(tenant): Extension<TenantContext>,
    Extension(principal): Extension<PrincipalContext>,
    Extension(kind): Extension<PartyKind>,
    Path(id): Path<String>,
) -> ApiResult {
    require(&tenant, &principal, write_permission(kind))?;
    let party_id = find(&services, &tenant, kind, &id)?.id_typed();

    let cmd = PartyCommand::ReactivateParty(ReactivateParty {
        tenant_id: tenant.tenant_id(),
        party_id,
        occurred_at: Utc::now(),
    });
    let party = services
        .dispatch::<Party>(tenant.tenant_id(), party_id.0, cmd)
        .await
        .map_err(errors::dispatch_error_to_response)?;
    Ok(common::ok(dto::party_to_json(&party)))
}
