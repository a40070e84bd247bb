//! Read-only reports computed from the read models on request.

use std::sync::Arc;

use axum::{
    extract::{Extension, Query},
    routing::get,
    Router,
};
use chrono::{Datelike, NaiveDate};
use serde_json::json;

use bizdesk_infra::reporting::{self, Period};

use crate::app::dto;
use crate::app::errors::{self, ApiResult};
use crate::app::routes::common;
use crate::app::services::AppServices;
use crate::authz::require;
use crate::context::{PrincipalContext, TenantContext};

pub fn router() -> Router {
    Router::new()
        .route("/sales", get(sales_summary))
        .route("/ar-aging", get(ar_aging))
        .route("/quote-pipeline", get(quote_pipeline))
        .route("/inventory-valuation", get(inventory_valuation))
        .route("/reorder", get(reorder_list))
        .route("/timesheets", get(timesheet_summary))
}

/// `from`..=`to`, defaulting to the current month up to today.
fn period(query: &dto::ReportQuery) -> Result<Period, axum::response::Response> {
    let today = common::today();
    let from = query
        .from
        .or_else(|| NaiveDate::from_ymd_opt(today.year(), today.month(), 1))
        .unwrap_or(today);
    let to = query.to.unwrap_or(today);
    Period::new(from, to).map_err(errors::domain_error_to_response)
}

pub async fn sales_summary(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(tenant): Extension<TenantContext>,
    Extension(principal): Extension<PrincipalContext>,
    Query(query): Query<dto::ReportQuery>,
) -> ApiResult {
    require(&tenant, &principal, "reports.read")?;
    let period = period(&query)?;
    let invoices = services.projections().invoices.list(tenant.tenant_id());
    Ok(common::ok(json!(reporting::sales_summary(&invoices, period))))
}

pub async fn ar_aging(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(tenant): Extension<TenantContext>,
    Extension(principal): Extension<PrincipalContext>,
    Query(query): Query<dto::ReportQuery>,
) -> ApiResult {
    require(&tenant, &principal, "reports.read")?;
    let projections = services.projections();
    let aging = reporting::ar_aging(
        &projections.invoices.list(tenant.tenant_id()),
        &projections.parties.list(tenant.tenant_id()),
        query.as_of.unwrap_or_else(common::today),
    );
    Ok(common::ok(json!(aging)))
}

pub async fn quote_pipeline(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(tenant): Extension<TenantContext>,
    Extension(principal): Extension<PrincipalContext>,
    Query(query): Query<dto::ReportQuery>,
) -> ApiResult {
    require(&tenant, &principal, "reports.read")?;
    let quotes = services.projections().quotes.list(tenant.tenant_id());
    let pipeline = reporting::quote_pipeline(&quotes, query.as_of.unwrap_or_else(common::today));
    Ok(common::ok(json!(pipeline)))
}

pub async fn inventory_valuation(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(tenant): Extension<TenantContext>,
    Extension(principal): Extension<PrincipalContext>,
) -> ApiResult {
    require(&tenant, &principal, "reports.read")?;
    let projections = services.projections();
    let valuation = reporting::inventory_valuation(
        &projections.stock.list(tenant.tenant_id()),
        &projections.catalog.list(tenant.tenant_id()),
    );
    Ok(common::ok(json!(valuation)))
}

pub async fn reorder_list(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(tenant): Extension<TenantContext>,
    Extension(principal): Extension<PrincipalContext>,
) -> ApiResult {
    require(&tenant, &principal, "inventory.read")?;
    let stock = services.projections().stock.list(tenant.tenant_id());
    Ok(common::ok(json!({ "items": reporting::reorder_list(&stock) })))
}

pub async fn timesheet_summary(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(tenant): Extension<TenantContext>,
    Extension(principal): Extension<PrincipalContext>,
    Query(query): Query<dto::ReportQuery>,
) -> ApiResult {
    require(&tenant, &principal, "reports.read")?;
    let period = period(&query)?;
    let projections = services.projections();
    let summary = reporting::timesheet_summary(
        &projections.time_entries.list(tenant.tenant_id()),
        &projections.projects.list(tenant.tenant_id()),
        period,
    );
    Ok(common::ok(json!(summary)))
}
