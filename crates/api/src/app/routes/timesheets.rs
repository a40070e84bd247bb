use std::sync::Arc;

use axum::{
    extract::{Extension, Path, Query},
    routing::{get, post},
    Json, Router,
};
use chrono::Utc;

use bizdesk_core::UserId;
use bizdesk_infra::workflows::{self, InvoiceTimeInput, LogTimeInput};
use bizdesk_projects::ProjectId;
use bizdesk_timesheets::{
    ApproveTimeEntry, RejectTimeEntry, TimeEntry, TimeEntryCommand, TimeEntryId, TimeEntryStatus,
    UpdateTimeEntry,
};

use crate::app::dto;
use crate::app::errors::{self, ApiResult};
use crate::app::routes::common;
use crate::app::services::AppServices;
use crate::authz::{Requires, authorize_command, require};
use crate::context::{PrincipalContext, TenantContext};

pub fn router() -> Router {
    Router::new()
        .route("/", post(log_time).get(list_entries))
        .route("/bill", post(bill_entries))
        .route("/:id", get(get_entry).patch(update_entry))
        .route("/:id/approve", post(approve_entry))
        .route("/:id/reject", post(reject_entry))
}

fn caller(principal: &PrincipalContext) -> UserId {
    UserId::from_uuid(*principal.principal_id().as_uuid())
}

/// Approvers see and edit everyone's time; others only their own.
fn is_approver(tenant: &TenantContext, principal: &PrincipalContext) -> bool {
    authorize_command(tenant, principal, &Requires::one("timesheets.approve")).is_ok()
}

fn find(
    services: &AppServices,
    tenant: &TenantContext,
    principal: &PrincipalContext,
    raw_id: &str,
) -> Result<TimeEntry, axum::response::Response> {
    let id = dto::parse_id(raw_id, "time entry")?;
    services
        .projections()
        .time_entries
        .get(tenant.tenant_id(), id)
        .filter(|e| is_approver(tenant, principal) || e.user_id() == Some(caller(principal)))
        .ok_or_else(|| errors::not_found("time entry"))
}

async fn dispatch(
    services: &AppServices,
    tenant: &TenantContext,
    entry_id: TimeEntryId,
    cmd: TimeEntryCommand,
) -> ApiResult {
    let entry = services
        .dispatch::<TimeEntry>(tenant.tenant_id(), entry_id.0, cmd)
        .await
        .map_err(errors::dispatch_error_to_response)?;
    Ok(common::ok(dto::time_entry_to_json(&entry)))
}

pub async fn log_time(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(tenant): Extension<TenantContext>,
    Extension(principal): Extension<PrincipalContext>,
    Json(body): Json<dto::LogTimeRequest>,
) -> ApiResult {
    require(&tenant, &principal, "timesheets.log")?;

    let input = LogTimeInput {
        project_id: ProjectId::new(dto::parse_id(&body.project_id, "project")?),
        user_id: caller(&principal),
        work_date: body.work_date,
        minutes: body.minutes,
        description: body.description,
        billable: body.billable,
        hourly_rate: body.hourly_rate,
        occurred_at: Utc::now(),
    };
    let outcome = workflows::log_time(services.dispatcher(), tenant.tenant_id(), &input)
        .await
        .map_err(errors::dispatch_error_to_response)?;
    services.project(tenant.tenant_id(), &outcome.committed).await;
    Ok(common::created(dto::time_entry_to_json(&outcome.document)))
}

pub async fn list_entries(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(tenant): Extension<TenantContext>,
    Extension(principal): Extension<PrincipalContext>,
    Query(query): Query<dto::TimesheetListQuery>,
) -> ApiResult {
    require(&tenant, &principal, "timesheets.read")?;
    let project_id = dto::parse_optional_id(query.project_id.as_deref(), "project")?.map(ProjectId::new);
    let status: Option<TimeEntryStatus> = common::parse_status(query.status.as_deref(), "time entry")?;
    let only_own = (!is_approver(&tenant, &principal)).then(|| caller(&principal));

    let mut entries: Vec<_> = services
        .projections()
        .time_entries
        .list(tenant.tenant_id())
        .into_iter()
        .filter(|e| project_id.is_none_or(|p| e.project_id() == Some(p)))
        .filter(|e| status.is_none_or(|s| e.status() == s))
        .filter(|e| only_own.is_none_or(|u| e.user_id() == Some(u)))
        .collect();
    entries.sort_by_key(|e| (e.work_date(), e.id_typed().0));
    Ok(common::items(entries.iter().map(dto::time_entry_to_json).collect()))
}

pub async fn get_entry(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(tenant): Extension<TenantContext>,
    Extension(principal): Extension<PrincipalContext>,
    Path(id): Path<String>,
) -> ApiResult {
    require(&tenant, &principal, "timesheets.read")?;
    let entry = find(&services, &tenant, &principal, &id)?;
    Ok(common::ok(dto::time_entry_to_json(&entry)))
}

pub async fn update_entry(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(tenant): Extension<TenantContext>,
    Extension(principal): Extension<PrincipalContext>,
    Path(id): Path<String>,
    Json(body): Json<dto::UpdateTimeEntryRequest>,
) -> ApiResult {
    require(&tenant, &principal, "timesheets.log")?;
    let entry_id = find(&services, &tenant, &principal, &id)?.id_typed();
    let cmd = TimeEntryCommand::UpdateTimeEntry(UpdateTimeEntry {
        tenant_id: tenant.tenant_id(),
        entry_id,
        work_date: body.work_date,
        minutes: body.minutes,
        description: body.description,
        billable: body.billable,
        hourly_rate: body.hourly_rate,
        occurred_at: Utc::now(),
    });
    dispatch(&services, &tenant, entry_id, cmd).await
}

pub async fn approve_entry(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(tenant): Extension<TenantContext>,
    Extension(principal): Extension<PrincipalContext>,
    Path(id): Path<String>,
) -> ApiResult {
    require(&tenant, &principal, "timesheets.approve")?;
    let entry_id = find(&services, &tenant, &principal, &id)?.id_typed();
    let cmd = TimeEntryCommand::ApproveTimeEntry(ApproveTimeEntry {
        tenant_id: tenant.tenant_id(),
        entry_id,
        occurred_at: Utc::now(),
    });
    dispatch(&services, &tenant, entry_id, cmd).await
}

pub async fn reject_entry(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(tenant): Extension<TenantContext>,
    Extension(principal): Extension<PrincipalContext>,
    Path(id): Path<String>,
    body: Option<Json<dto::ReasonRequest>>,
) -> ApiResult {
    require(&tenant, &principal, "timesheets.approve")?;
    let entry_id = find(&services, &tenant, &principal, &id)?.id_typed();
    let cmd = TimeEntryCommand::RejectTimeEntry(RejectTimeEntry {
        tenant_id: tenant.tenant_id(),
        entry_id,
        reason: body.and_then(|Json(b)| b.reason),
        occurred_at: Utc::now(),
    });
    dispatch(&services, &tenant, entry_id, cmd).await
}

/// Invoice approved billable entries of one project.
pub async fn bill_entries(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(tenant): Extension<TenantContext>,
    Extension(principal): Extension<PrincipalContext>,
    Json(body): Json<dto::BillTimeRequest>,
) -> ApiResult {
    require(&tenant, &principal, "invoices.issue")?;

    let entry_ids = body
        .entry_ids
        .iter()
        .map(|raw| dto::parse_id(raw, "time entry").map(TimeEntryId::new))
        .collect::<Result<Vec<_>, _>>()?;
    let input = InvoiceTimeInput {
        project_id: ProjectId::new(dto::parse_id(&body.project_id, "project")?),
        entry_ids,
        currency: body.currency,
        tax_rate_bps: body.tax_rate_bps,
        issue_date: body.issue_date.unwrap_or_else(common::today),
        due_date: body.due_date,
        notes: body.notes,
        occurred_at: Utc::now(),
    };
    let outcome = workflows::invoice_time_entries(services.dispatcher(), tenant.tenant_id(), &input)
        .await
        .map_err(errors::dispatch_error_to_response)?;
    services.project(tenant.tenant_id(), &outcome.committed).await;

    tracing::info!(
        number = outcome.document.number(),
        entries = input.entry_ids.len(),
        "time invoiced"
    );
    Ok(common::created(dto::invoice_to_json(&outcome.document, common::today())))
}
