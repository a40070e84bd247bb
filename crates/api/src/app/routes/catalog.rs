use std::sync::Arc;

use axum::{
    extract::{Extension, Path},
    routing::{get, post, put},
    Json, Router,
};
use chrono::Utc;

use bizdesk_catalog::{
    ArchiveCatalogItem, CatalogItem, CatalogItemCommand, CatalogItemId, CreateCatalogItem,
    ReactivateCatalogItem, UpdatePricing,
};
use bizdesk_core::AggregateId;

use crate::app::dto;
use crate::app::errors::{self, ApiResult};
use crate::app::routes::common;
use crate::app::services::AppServices;
use crate::authz::require;
use crate::context::{PrincipalContext, TenantContext};

pub fn router() -> Router {
    Router::new()
        .route("/", post(create_item).get(list_items))
        .route("/:id", get(get_item))
        .route("/:id/pricing", put(update_pricing))
        .route("/:id/archive", post(archive_item))
        .route("/:id/reactivate", post(reactivate_item))
}

fn find(services: &AppServices, tenant: &TenantContext, raw_id: &str) -> Result<CatalogItem, axum::response::Response> {
    let id = dto::parse_id(raw_id, "catalog item")?;
    services
        .projections()
        .catalog
        .get(tenant.tenant_id(), id)
        .ok_or_else(|| errors::not_found("catalog item"))
}

async fn dispatch(
    services: &AppServices,
    tenant: &TenantContext,
    item_id: CatalogItemId,
    cmd: CatalogItemCommand,
) -> ApiResult {
    let item = services
        .dispatch::<CatalogItem>(tenant.tenant_id(), item_id.0, cmd)
        .await
        .map_err(errors::dispatch_error_to_response)?;
    Ok(common::ok(dto::catalog_item_to_json(&item)))
}

pub async fn create_item(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(tenant): Extension<TenantContext>,
    Extension(principal): Extension<PrincipalContext>,
    Json(body): Json<dto::CreateCatalogItemRequest>,
) -> ApiResult {
    require(&tenant, &principal, "catalog.write")?;

    let sku = body.sku.trim().to_string();
    let duplicate = services
        .projections()
        .catalog
        .list(tenant.tenant_id())
        .iter()
        .any(|i| i.sku() == sku);
    if duplicate {
        return Err(errors::json_error(
            axum::http::StatusCode::CONFLICT,
            "conflict",
            format!("sku {sku} already exists"),
        ));
    }

    let item_id = CatalogItemId::new(AggregateId::new());
    let cmd = CatalogItemCommand::CreateCatalogItem(CreateCatalogItem {
        tenant_id: tenant.tenant_id(),
        item_id,
        sku,
        name: body.name,
        description: body.description,
        unit: body.unit,
        unit_price: body.unit_price,
        cost_price: body.cost_price,
        tax_rate_bps: body.tax_rate_bps,
        track_inventory: body.track_inventory,
        occurred_at: Utc::now(),
    });
    let item = services
        .dispatch::<CatalogItem>(tenant.tenant_id(), item_id.0, cmd)
        .await
        .map_err(errors::dispatch_error_to_response)?;
    Ok(common::created(dto::catalog_item_to_json(&item)))
}

pub async fn list_items(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(tenant): Extension<TenantContext>,
    Extension(principal): Extension<PrincipalContext>,
) -> ApiResult {
    require(&tenant, &principal, "catalog.read")?;
    let mut items = services.projections().catalog.list(tenant.tenant_id());
    items.sort_by(|a, b| a.sku().cmp(b.sku()));
    Ok(common::items(items.iter().map(dto::catalog_item_to_json).collect()))
}

pub async fn get_item(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(tenant): Extension<TenantContext>,
    Extension(principal): Extension<PrincipalContext>,
    Path(id): Path<String>,
) -> ApiResult {
    require(&tenant, &principal, "catalog.read")?;
    let item = find(&services, &tenant, &id)?;
    Ok(common::ok(dto::catalog_item_to_json(&item)))
}

pub async fn update_pricing(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(tenant): Extension<TenantContext>,
    Extension(principal): Extension<PrincipalContext>,
    Path(id): Path<String>,
    Json(body): Json<dto::UpdatePricingRequest>,
) -> ApiResult {
    require(&tenant, &principal, "catalog.write")?;
    let item_id = find(&services, &tenant, &id)?.id_typed();
    let cmd = CatalogItemCommand::UpdatePricing(UpdatePricing {
        tenant_id: tenant.tenant_id(),
        item_id,
        unit_price: body.unit_price,
        cost_price: body.cost_price,
        tax_rate_bps: body.tax_rate_bps,
        occurred_at: Utc::now(),
    });
    dispatch(&services, &tenant, item_id, cmd).await
}

pub async fn archive_item(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(tenant): Extension<TenantContext>,
    Extension(principal): Extension<PrincipalContext>,
    Path(id): Path<String>,
) -> ApiResult {
    require(&tenant, &principal, "catalog.write")?;
    let item_id = find(&services, &tenant, &id)?.id_typed();
    let cmd = CatalogItemCommand::ArchiveCatalogItem(ArchiveCatalogItem {
        tenant_id: tenant.tenant_id(),
        item_id,
        occurred_at: Utc::now(),
    });
    dispatch(&services, &tenant, item_id, cmd).await
}

pub async fn reactivate_item(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(tenant): Extension<TenantContext>,
    Extension(principal): Extension<PrincipalContext>,
    Path(id): Path<String>,
) -> ApiResult {
    require(&tenant, &principal, "catalog.write")?;
    let item_id = find(&services, &tenant, &id)?.id_typed();
    let cmd = CatalogItemCommand::ReactivateCatalogItem(ReactivateCatalogItem {
        tenant_id: tenant.tenant_id(),
        item_id,
        occurred_at: Utc::now(),
    });
    dispatch(&services, &tenant, item_id, cmd).await
}
