use std::sync::Arc;

use axum::{
    extract::{Extension, Path},
    routing::get,
    Json, Router,
};
use chrono::Utc;

use bizdesk_numbering::{
    ConfigureSequence, DocumentKind, DocumentSequence, SequenceCommand, SequenceId,
};

use crate::app::dto;
use crate::app::errors::{self, ApiResult};
use crate::app::routes::common;
use crate::app::services::AppServices;
use crate::authz::require;
use crate::context::{PrincipalContext, TenantContext};

pub fn router() -> Router {
    Router::new()
        .route("/numbering", get(list_numbering))
        .route("/numbering/:kind", get(get_numbering).put(configure_numbering))
}

fn sequence(services: &AppServices, tenant: &TenantContext, kind: DocumentKind) -> DocumentSequence {
    let id = SequenceId::for_kind(tenant.tenant_id(), kind);
    services
        .projections()
        .sequences
        .get(tenant.tenant_id(), id.0)
        .unwrap_or_else(|| DocumentSequence::empty(id))
}

pub async fn list_numbering(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(tenant): Extension<TenantContext>,
    Extension(principal): Extension<PrincipalContext>,
) -> ApiResult {
    require(&tenant, &principal, "settings.read")?;
    let items = DocumentKind::ALL
        .iter()
        .map(|&kind| dto::sequence_to_json(kind, &sequence(&services, &tenant, kind)))
        .collect();
    Ok(common::items(items))
}

pub async fn get_numbering(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(tenant): Extension<TenantContext>,
    Extension(principal): Extension<PrincipalContext>,
    Path(kind): Path<String>,
) -> ApiResult {
    require(&tenant, &principal, "settings.read")?;
    let kind = dto::parse_kind(&kind)?;
    Ok(common::ok(dto::sequence_to_json(kind, &sequence(&services, &tenant, kind))))
}

/// Change prefix, padding or the next value; numbers already issued are untouched.
pub async fn configure_numbering(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(tenant): Extension<TenantContext>,
    Extension(principal): Extension<PrincipalContext>,
    Path(kind): Path<String>,
    Json(body): Json<dto::ConfigureNumberingRequest>,
) -> ApiResult {
    require(&tenant, &principal, "settings.numbering")?;
    let kind = dto::parse_kind(&kind)?;
    let sequence_id = SequenceId::for_kind(tenant.tenant_id(), kind);

    let cmd = SequenceCommand::ConfigureSequence(ConfigureSequence {
        tenant_id: tenant.tenant_id(),
        sequence_id,
        kind,
        prefix: body.prefix,
        padding: body.padding,
        next_value: body.next_value,
        occurred_at: Utc::now(),
    });
    let sequence = services
        .dispatch::<DocumentSequence>(tenant.tenant_id(), sequence_id.0, cmd)
        .await
        .map_err(errors::dispatch_error_to_response)?;

    tracing::info!(kind = kind.as_str(), next = %sequence.peek(kind), "numbering configured");
    Ok(common::ok(dto::sequence_to_json(kind, &sequence)))
}
