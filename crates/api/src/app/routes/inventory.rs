//! Stock is addressed by catalog item id; the stock stream id is derived from it.

use std::sync::Arc;

use axum::{
    extract::{Extension, Path},
    routing::{get, post, put},
    Json, Router,
};
use chrono::Utc;

use bizdesk_catalog::{CatalogItem, CatalogItemId};
use bizdesk_infra::command_dispatcher::DispatchError;
use bizdesk_infra::workflows::{self, AdjustStockInput};
use bizdesk_inventory::{
    CreateStockItem, InventoryCommand, SetReorderLevel, StockItem, StockItemId,
};

use crate::app::dto;
use crate::app::errors::{self, ApiResult};
use crate::app::routes::common;
use crate::app::services::AppServices;
use crate::authz::require;
use crate::context::{PrincipalContext, TenantContext};

pub fn router() -> Router {
    Router::new()
        .route("/", get(list_stock))
        .route("/:item_id", get(get_stock))
        .route("/:item_id/adjust", post(adjust_stock))
        .route("/:item_id/reorder-level", put(set_reorder_level))
}

pub async fn list_stock(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(tenant): Extension<TenantContext>,
    Extension(principal): Extension<PrincipalContext>,
) -> ApiResult {
    require(&tenant, &principal, "inventory.read")?;
    let mut stock = services.projections().stock.list(tenant.tenant_id());
    stock.sort_by(|a, b| a.name().cmp(b.name()));
    Ok(common::items(stock.iter().map(dto::stock_to_json).collect()))
}

pub async fn get_stock(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(tenant): Extension<TenantContext>,
    Extension(principal): Extension<PrincipalContext>,
    Path(item_id): Path<String>,
) -> ApiResult {
    require(&tenant, &principal, "inventory.read")?;
    let catalog_item_id = CatalogItemId::new(dto::parse_id(&item_id, "catalog item")?);
    let stock_id = StockItemId::for_catalog_item(tenant.tenant_id(), catalog_item_id);
    let stock = services
        .projections()
        .stock
        .get(tenant.tenant_id(), stock_id.0)
        .ok_or_else(|| errors::not_found("stock item"))?;
    Ok(common::ok(dto::stock_to_json(&stock)))
}

pub async fn adjust_stock(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(tenant): Extension<TenantContext>,
    Extension(principal): Extension<PrincipalContext>,
    Path(item_id): Path<String>,
    Json(body): Json<dto::AdjustStockRequest>,
) -> ApiResult {
    require(&tenant, &principal, "inventory.adjust")?;

    let input = AdjustStockInput {
        catalog_item_id: CatalogItemId::new(dto::parse_id(&item_id, "catalog item")?),
        delta: body.delta,
        reason: body.reason,
        note: body.note,
        occurred_at: Utc::now(),
    };
    let outcome = workflows::adjust_stock(services.dispatcher(), tenant.tenant_id(), &input)
        .await
        .map_err(errors::dispatch_error_to_response)?;
    services.project(tenant.tenant_id(), &outcome.committed).await;

    let stock = outcome.document;
    if stock.needs_reorder() {
        tracing::info!(item = stock.name(), on_hand = %stock.on_hand(), "stock at or below reorder level");
    }
    Ok(common::ok(dto::stock_to_json(&stock)))
}

/// Set the reorder level, opening the stock item if it has none yet.
pub async fn set_reorder_level(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(tenant): Extension<TenantContext>,
    Extension(principal): Extension<PrincipalContext>,
    Path(item_id): Path<String>,
    Json(body): Json<dto::ReorderLevelRequest>,
) -> ApiResult {
    require(&tenant, &principal, "inventory.adjust")?;
    let tenant_id = tenant.tenant_id();
    let catalog_item_id = CatalogItemId::new(dto::parse_id(&item_id, "catalog item")?);
    let stock_id = StockItemId::for_catalog_item(tenant_id, catalog_item_id);

    let existing = services
        .dispatcher()
        .load::<StockItem>(tenant_id, stock_id.0)
        .await
        .map_err(errors::dispatch_error_to_response)?;

    let cmd = if existing.is_created() {
        InventoryCommand::SetReorderLevel(SetReorderLevel {
            tenant_id,
            item_id: stock_id,
            reorder_level: body.reorder_level,
            occurred_at: Utc::now(),
        })
    } else {
        let item = services
            .dispatcher()
            .load_existing::<CatalogItem>(tenant_id, catalog_item_id.0)
            .await
            .map_err(errors::dispatch_error_to_response)?;
        if !item.track_inventory() {
            return Err(errors::dispatch_error_to_response(DispatchError::InvariantViolation(
                format!("{} does not track inventory", item.sku()),
            )));
        }
        InventoryCommand::CreateStockItem(CreateStockItem {
            tenant_id,
            item_id: stock_id,
            catalog_item_id,
            name: item.name().to_string(),
            reorder_level: body.reorder_level,
            occurred_at: Utc::now(),
        })
    };

    let stock = services
        .dispatch::<StockItem>(tenant_id, stock_id.0, cmd)
        .await
        .map_err(errors::dispatch_error_to_response)?;
    Ok(common::ok(dto::stock_to_json(&stock)))
}
