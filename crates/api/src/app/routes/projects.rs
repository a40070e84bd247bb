use std::sync::Arc;

use axum::{
    extract::{Extension, Path},
    routing::{get, post},
    Json, Router,
};
use chrono::Utc;

use bizdesk_core::AggregateId;
use bizdesk_infra::command_dispatcher::DispatchError;
use bizdesk_infra::reporting;
use bizdesk_parties::{Party, PartyId, PartyKind};
use bizdesk_projects::{
    ArchiveProject, CompleteProject, CreateProject, Project, ProjectCommand, ProjectId,
    RenameProject, ReopenProject,
};

use crate::app::dto;
use crate::app::errors::{self, ApiResult};
use crate::app::routes::common;
use crate::app::services::AppServices;
use crate::authz::require;
use crate::context::{PrincipalContext, TenantContext};

pub fn router() -> Router {
    Router::new()
        .route("/", post(create_project).get(list_projects))
        .route("/:id", get(get_project).patch(rename_project))
        .route("/:id/complete", post(complete_project))
        .route("/:id/reopen", post(reopen_project))
        .route("/:id/archive", post(archive_project))
        .route("/:id/summary", get(project_summary))
}

fn find(services: &AppServices, tenant: &TenantContext, raw_id: &str) -> Result<Project, axum::response::Response> {
    let id = dto::parse_id(raw_id, "project")?;
    services
        .projections()
        .projects
        .get(tenant.tenant_id(), id)
        .ok_or_else(|| errors::not_found("project"))
}

async fn dispatch(
    services: &AppServices,
    tenant: &TenantContext,
    project_id: ProjectId,
    cmd: ProjectCommand,
) -> ApiResult {
    let project = services
        .dispatch::<Project>(tenant.tenant_id(), project_id.0, cmd)
        .await
        .map_err(errors::dispatch_error_to_response)?;
    Ok(common::ok(dto::project_to_json(&project)))
}

pub async fn create_project(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(tenant): Extension<TenantContext>,
    Extension(principal): Extension<PrincipalContext>,
    Json(body): Json<dto::CreateProjectRequest>,
) -> ApiResult {
    require(&tenant, &principal, "projects.write")?;

    let customer_id = dto::parse_id(&body.customer_id, "customer")?;
    let customer = services
        .dispatcher()
        .load_existing::<Party>(tenant.tenant_id(), customer_id)
        .await
        .map_err(|e| match e {
            DispatchError::NotFound => DispatchError::InvariantViolation(format!(
                "customer {customer_id} does not exist"
            )),
            other => other,
        })
        .map_err(errors::dispatch_error_to_response)?;
    if customer.kind() != PartyKind::Customer {
        return Err(errors::dispatch_error_to_response(DispatchError::InvariantViolation(
            format!("party {} is not a customer", customer.name()),
        )));
    }

    let project_id = ProjectId::new(AggregateId::new());
    let cmd = ProjectCommand::CreateProject(CreateProject {
        tenant_id: tenant.tenant_id(),
        project_id,
        customer_id: PartyId::new(customer_id),
        code: body.code,
        name: body.name,
        hourly_rate: body.hourly_rate,
        budget: body.budget,
        occurred_at: Utc::now(),
    });
    let project = services
        .dispatch::<Project>(tenant.tenant_id(), project_id.0, cmd)
        .await
        .map_err(errors::dispatch_error_to_response)?;
    Ok(common::created(dto::project_to_json(&project)))
}

pub async fn list_projects(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(tenant): Extension<TenantContext>,
    Extension(principal): Extension<PrincipalContext>,
) -> ApiResult {
    require(&tenant, &principal, "projects.read")?;
    let mut projects = services.projections().projects.list(tenant.tenant_id());
    projects.sort_by(|a, b| a.code().cmp(b.code()));
    Ok(common::items(projects.iter().map(dto::project_to_json).collect()))
}

pub async fn get_project(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(tenant): Extension<TenantContext>,
    Extension(principal): Extension<PrincipalContext>,
    Path(id): Path<String>,
) -> ApiResult {
    require(&tenant, &principal, "projects.read")?;
    let project = find(&services, &tenant, &id)?;
    Ok(common::ok(dto::project_to_json(&project)))
}

pub async fn rename_project(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(tenant): Extension<TenantContext>,
    Extension(principal): Extension<PrincipalContext>,
    Path(id): Path<String>,
    Json(body): Json<dto::RenameProjectRequest>,
) -> ApiResult {
    require(&tenant, &principal, "projects.write")?;
    let project_id = find(&services, &tenant, &id)?.id_typed();
    let cmd = ProjectCommand::RenameProject(RenameProject {
        tenant_id: tenant.tenant_id(),
        project_id,
        name: body.name,
        occurred_at: Utc::now(),
    });
    dispatch(&services, &tenant, project_id, cmd).await
}

pub async fn complete_project(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(tenant): Extension<TenantContext>,
    Extension(principal): Extension<PrincipalContext>,
    Path(id): Path<String>,
) -> ApiResult {
    require(&tenant, &principal, "projects.write")?;
    let project_id = find(&services, &tenant, &id)?.id_typed();
    let cmd = ProjectCommand::CompleteProject(CompleteProject {
        tenant_id: tenant.tenant_id(),
        project_id,
        occurred_at: Utc::now(),
    });
    dispatch(&services, &tenant, project_id, cmd).await
}

pub async fn reopen_project(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(tenant): Extension<TenantContext>,
    Extension(principal): Extension<PrincipalContext>,
    Path(id): Path<String>,
) -> ApiResult {
    require(&tenant, &principal, "projects.write")?;
    let project_id = find(&services, &tenant, &id)?.id_typed();
    let cmd = ProjectCommand::ReopenProject(ReopenProject {
        tenant_id: tenant.tenant_id(),
        project_id,
        occurred_at: Utc::now(),
    });
    dispatch(&services, &tenant, project_id, cmd).await
}

pub async fn archive_project(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(tenant): Extension<TenantContext>,
    Extension(principal): Extension<PrincipalContext>,
    Path(id): Path<String>,
) -> ApiResult {
    require(&tenant, &principal, "projects.write")?;
    let project_id = find(&services, &tenant, &id)?.id_typed();
    let cmd = ProjectCommand::ArchiveProject(ArchiveProject {
        tenant_id: tenant.tenant_id(),
        project_id,
        occurred_at: Utc::now(),
    });
    dispatch(&services, &tenant, project_id, cmd).await
}

/// Hours, unbilled value and budget position of one project.
pub async fn project_summary(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(tenant): Extension<TenantContext>,
    Extension(principal): Extension<PrincipalContext>,
    Path(id): Path<String>,
) -> ApiResult {
    require(&tenant, &principal, "projects.read")?;
    let project = find(&services, &tenant, &id)?;
    let projections = services.projections();
    let summary = reporting::project_summary(
        &project,
        &projections.time_entries.list(tenant.tenant_id()),
        &projections.invoices.list(tenant.tenant_id()),
    );
    Ok(common::ok(serde_json::json!(summary)))
}
