use std::sync::Arc;

use axum::{
    extract::{Extension, Path, Query},
    routing::{get, post},
    Json, Router,
};
use chrono::Utc;
use serde_json::json;

use bizdesk_catalog::CatalogItemId;
use bizdesk_infra::external::purchase_order_view;
use bizdesk_infra::workflows::{
    self, AddPurchaseLinesInput, CreatePurchaseOrderInput, PurchaseLineInput, ReceiveGoodsInput,
};
use bizdesk_parties::{Party, PartyId};
use bizdesk_purchasing::{
    ApprovePurchaseOrder, CancelPurchaseOrder, ClosePurchaseOrder, PurchaseOrder,
    PurchaseOrderCommand, PurchaseOrderId, PurchaseOrderStatus, Receipt, SendPurchaseOrder,
};

use crate::app::dto;
use crate::app::errors::{self, ApiResult};
use crate::app::routes::common;
use crate::app::services::AppServices;
use crate::authz::require;
use crate::context::{PrincipalContext, TenantContext};

pub fn router() -> Router {
    Router::new()
        .route("/", post(create_order).get(list_orders))
        .route("/:id", get(get_order))
        .route("/:id/lines", post(add_lines))
        .route("/:id/approve", post(approve_order))
        .route("/:id/send", post(send_order))
        .route("/:id/receive", post(receive_goods))
        .route("/:id/cancel", post(cancel_order))
        .route("/:id/close", post(close_order))
        .route("/:id/pdf", get(order_pdf))
        .route("/:id/email", post(email_order))
        .route("/:id/history", get(order_history))
}

fn find(services: &AppServices, tenant: &TenantContext, raw_id: &str) -> Result<PurchaseOrder, axum::response::Response> {
    let id = dto::parse_id(raw_id, "purchase order")?;
    services
        .projections()
        .purchase_orders
        .get(tenant.tenant_id(), id)
        .ok_or_else(|| errors::not_found("purchase order"))
}

fn supplier_of(services: &AppServices, tenant: &TenantContext, order: &PurchaseOrder) -> Result<Party, axum::response::Response> {
    order
        .supplier_id()
        .and_then(|s| services.projections().parties.get(tenant.tenant_id(), s.0))
        .ok_or_else(|| errors::not_found("supplier"))
}

fn purchase_line_inputs(
    lines: Vec<dto::PurchaseLineRequest>,
) -> Result<Vec<PurchaseLineInput>, axum::response::Response> {
    lines
        .into_iter()
        .map(|l| {
            Ok(PurchaseLineInput {
                catalog_item_id: CatalogItemId::new(dto::parse_id(&l.catalog_item_id, "catalog item")?),
                description: l.description,
                quantity: l.quantity,
                unit_cost: l.unit_cost,
                tax_rate_bps: l.tax_rate_bps,
            })
        })
        .collect()
}

async fn dispatch(
    services: &AppServices,
    tenant: &TenantContext,
    order_id: PurchaseOrderId,
    cmd: PurchaseOrderCommand,
) -> ApiResult {
    let order = services
        .dispatch::<PurchaseOrder>(tenant.tenant_id(), order_id.0, cmd)
        .await
        .map_err(errors::dispatch_error_to_response)?;
    Ok(common::ok(dto::purchase_order_to_json(&order)))
}

pub async fn create_order(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(tenant): Extension<TenantContext>,
    Extension(principal): Extension<PrincipalContext>,
    Json(body): Json<dto::CreatePurchaseOrderRequest>,
) -> ApiResult {
    require(&tenant, &principal, "purchasing.write")?;

    let lines = purchase_line_inputs(body.lines)?;

    let input = CreatePurchaseOrderInput {
        supplier_id: PartyId::new(dto::parse_id(&body.supplier_id, "supplier")?),
        currency: body.currency,
        expected_on: body.expected_on,
        notes: body.notes,
        lines,
        occurred_at: Utc::now(),
    };
    let outcome = workflows::create_purchase_order(services.dispatcher(), tenant.tenant_id(), &input)
        .await
        .map_err(errors::dispatch_error_to_response)?;
    services.project(tenant.tenant_id(), &outcome.committed).await;

    tracing::info!(number = outcome.document.number(), "purchase order created");
    Ok(common::created(dto::purchase_order_to_json(&outcome.document)))
}

pub async fn list_orders(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(tenant): Extension<TenantContext>,
    Extension(principal): Extension<PrincipalContext>,
    Query(query): Query<dto::StatusQuery>,
) -> ApiResult {
    require(&tenant, &principal, "purchasing.read")?;
    let status: Option<PurchaseOrderStatus> =
        common::parse_status(query.status.as_deref(), "purchase order")?;

    let mut orders: Vec<_> = services
        .projections()
        .purchase_orders
        .list(tenant.tenant_id())
        .into_iter()
        .filter(|o| status.is_none_or(|s| o.status() == s))
        .collect();
    orders.sort_by(|a, b| a.number().cmp(b.number()));
    Ok(common::items(orders.iter().map(dto::purchase_order_to_json).collect()))
}

pub async fn get_order(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(tenant): Extension<TenantContext>,
    Extension(principal): Extension<PrincipalContext>,
    Path(id): Path<String>,
) -> ApiResult {
    require(&tenant, &principal, "purchasing.read")?;
    let order = find(&services, &tenant, &id)?;
    Ok(common::ok(dto::purchase_order_to_json(&order)))
}

/// Append lines to a draft order.
pub async fn add_lines(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(tenant): Extension<TenantContext>,
    Extension(principal): Extension<PrincipalContext>,
    Path(id): Path<String>,
    Json(body): Json<dto::AddPurchaseLinesRequest>,
) -> ApiResult {
    require(&tenant, &principal, "purchasing.write")?;
    let order_id = find(&services, &tenant, &id)?.id_typed();

    let input = AddPurchaseLinesInput {
        order_id,
        lines: purchase_line_inputs(body.lines)?,
        occurred_at: Utc::now(),
    };
    let outcome = workflows::add_purchase_lines(services.dispatcher(), tenant.tenant_id(), &input)
        .await
        .map_err(errors::dispatch_error_to_response)?;
    services.project(tenant.tenant_id(), &outcome.committed).await;
    Ok(common::ok(dto::purchase_order_to_json(&outcome.document)))
}

pub async fn approve_order(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(tenant): Extension<TenantContext>,
    Extension(principal): Extension<PrincipalContext>,
    Path(id): Path<String>,
) -> ApiResult {
    require(&tenant, &principal, "purchasing.approve")?;
    let order_id = find(&services, &tenant, &id)?.id_typed();
    let cmd = PurchaseOrderCommand::ApprovePurchaseOrder(ApprovePurchaseOrder {
        tenant_id: tenant.tenant_id(),
        order_id,
        approved_by: Some(principal.principal_id().to_string()),
        occurred_at: Utc::now(),
    });
    dispatch(&services, &tenant, order_id, cmd).await
}

pub async fn send_order(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(tenant): Extension<TenantContext>,
    Extension(principal): Extension<PrincipalContext>,
    Path(id): Path<String>,
) -> ApiResult {
    require(&tenant, &principal, "purchasing.write")?;
    let order_id = find(&services, &tenant, &id)?.id_typed();
    let cmd = PurchaseOrderCommand::SendPurchaseOrder(SendPurchaseOrder {
        tenant_id: tenant.tenant_id(),
        order_id,
        occurred_at: Utc::now(),
    });
    dispatch(&services, &tenant, order_id, cmd).await
}

/// Book received quantities; tracked items gain stock in the same commit.
pub async fn receive_goods(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(tenant): Extension<TenantContext>,
    Extension(principal): Extension<PrincipalContext>,
    Path(id): Path<String>,
    Json(body): Json<dto::ReceiveGoodsRequest>,
) -> ApiResult {
    require(&tenant, &principal, "purchasing.receive")?;
    let order_id = PurchaseOrderId::new(dto::parse_id(&id, "purchase order")?);

    let input = ReceiveGoodsInput {
        order_id,
        receipts: body
            .receipts
            .into_iter()
            .map(|r| Receipt {
                line_no: r.line_no,
                quantity: r.quantity,
            })
            .collect(),
        occurred_at: Utc::now(),
    };
    let receiving = workflows::receive_purchase_order(services.dispatcher(), tenant.tenant_id(), &input)
        .await
        .map_err(errors::dispatch_error_to_response)?;
    services.project(tenant.tenant_id(), &receiving.committed).await;

    Ok(common::ok(json!({
        "order": dto::purchase_order_to_json(&receiving.order),
        "stock": receiving.stock.iter().map(dto::stock_to_json).collect::<Vec<_>>(),
    })))
}

pub async fn cancel_order(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(tenant): Extension<TenantContext>,
    Extension(principal): Extension<PrincipalContext>,
    Path(id): Path<String>,
    body: Option<Json<dto::ReasonRequest>>,
) -> ApiResult {
    require(&tenant, &principal, "purchasing.write")?;
    let order_id = find(&services, &tenant, &id)?.id_typed();
    let cmd = PurchaseOrderCommand::CancelPurchaseOrder(CancelPurchaseOrder {
        tenant_id: tenant.tenant_id(),
        order_id,
        reason: body.and_then(|Json(b)| b.reason),
        occurred_at: Utc::now(),
    });
    dispatch(&services, &tenant, order_id, cmd).await
}

pub async fn close_order(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(tenant): Extension<TenantContext>,
    Extension(principal): Extension<PrincipalContext>,
    Path(id): Path<String>,
) -> ApiResult {
    require(&tenant, &principal, "purchasing.write")?;
    let order_id = find(&services, &tenant, &id)?.id_typed();
    let cmd = PurchaseOrderCommand::ClosePurchaseOrder(ClosePurchaseOrder {
        tenant_id: tenant.tenant_id(),
        order_id,
        occurred_at: Utc::now(),
    });
    dispatch(&services, &tenant, order_id, cmd).await
}

pub async fn order_pdf(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(tenant): Extension<TenantContext>,
    Extension(principal): Extension<PrincipalContext>,
    Path(id): Path<String>,
) -> ApiResult {
    require(&tenant, &principal, "purchasing.read")?;
    let order = find(&services, &tenant, &id)?;
    let supplier = supplier_of(&services, &tenant, &order)?;

    let documents = services.documents();
    let view = purchase_order_view(&order, &supplier, documents.company());
    let rendered = documents
        .render(&view)
        .map_err(errors::document_error_to_response)?;
    Ok(common::pdf(rendered))
}

pub async fn email_order(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(tenant): Extension<TenantContext>,
    Extension(principal): Extension<PrincipalContext>,
    Path(id): Path<String>,
    body: Option<Json<dto::EmailDocumentRequest>>,
) -> ApiResult {
    require(&tenant, &principal, "purchasing.read")?;
    require(&tenant, &principal, "documents.send")?;
    let order = find(&services, &tenant, &id)?;
    let supplier = supplier_of(&services, &tenant, &order)?;
    let body = body.map(|Json(b)| b).unwrap_or_default();

    let documents = services.documents();
    let view = purchase_order_view(&order, &supplier, documents.company());
    let emailed = documents
        .email(
            tenant.tenant_id(),
            &view,
            supplier.contact().email.as_deref(),
            body.to.as_deref(),
            body.message.as_deref(),
        )
        .await
        .map_err(errors::document_error_to_response)?;
    Ok(common::ok(json!({ "email": emailed })))
}

pub async fn order_history(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(tenant): Extension<TenantContext>,
    Extension(principal): Extension<PrincipalContext>,
    Path(id): Path<String>,
) -> ApiResult {
    require(&tenant, &principal, "purchasing.read")?;
    common::history(&services, tenant.tenant_id(), &id, "purchasing.order", "purchase order").await
}
