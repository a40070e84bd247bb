use std::sync::Arc;

use axum::{
    extract::{Extension, Path, Query},
    routing::{get, post},
    Json, Router,
};
use chrono::Utc;
use serde_json::json;

use bizdesk_infra::external::invoice_view;
use bizdesk_infra::workflows::{self, IssueInvoiceInput};
use bizdesk_invoicing::{
    Invoice, InvoiceCommand, InvoiceId, InvoiceStatus, MarkInvoiceSent, RegisterPayment,
    VoidInvoice,
};
use bizdesk_parties::{Party, PartyId};
use bizdesk_projects::ProjectId;

use crate::app::dto;
use crate::app::errors::{self, ApiResult};
use crate::app::routes::common;
use crate::app::services::AppServices;
use crate::authz::require;
use crate::context::{PrincipalContext, TenantContext};

pub fn router() -> Router {
    Router::new()
        .route("/", post(issue_invoice).get(list_invoices))
        .route("/:id", get(get_invoice))
        .route("/:id/send", post(mark_sent))
        .route("/:id/payments", post(register_payment))
        .route("/:id/void", post(void_invoice))
        .route("/:id/pdf", get(invoice_pdf))
        .route("/:id/email", post(email_invoice))
        .route("/:id/history", get(invoice_history))
}

fn find(services: &AppServices, tenant: &TenantContext, raw_id: &str) -> Result<Invoice, axum::response::Response> {
    let id = dto::parse_id(raw_id, "invoice")?;
    services
        .projections()
        .invoices
        .get(tenant.tenant_id(), id)
        .ok_or_else(|| errors::not_found("invoice"))
}

fn customer_of(services: &AppServices, tenant: &TenantContext, invoice: &Invoice) -> Result<Party, axum::response::Response> {
    invoice
        .customer_id()
        .and_then(|c| services.projections().parties.get(tenant.tenant_id(), c.0))
        .ok_or_else(|| errors::not_found("customer"))
}

async fn dispatch(
    services: &AppServices,
    tenant: &TenantContext,
    invoice_id: InvoiceId,
    cmd: InvoiceCommand,
) -> Result<Invoice, axum::response::Response> {
    services
        .dispatch::<Invoice>(tenant.tenant_id(), invoice_id.0, cmd)
        .await
        .map_err(errors::dispatch_error_to_response)
}

pub async fn issue_invoice(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(tenant): Extension<TenantContext>,
    Extension(principal): Extension<PrincipalContext>,
    Json(body): Json<dto::IssueInvoiceRequest>,
) -> ApiResult {
    require(&tenant, &principal, "invoices.issue")?;

    let input = IssueInvoiceInput {
        customer_id: PartyId::new(dto::parse_id(&body.customer_id, "customer")?),
        project_id: dto::parse_optional_id(body.project_id.as_deref(), "project")?.map(ProjectId::new),
        currency: body.currency,
        lines: common::line_inputs(body.lines)?,
        issue_date: body.issue_date.unwrap_or_else(common::today),
        due_date: body.due_date,
        notes: body.notes,
        occurred_at: Utc::now(),
    };
    let outcome = workflows::issue_invoice(services.dispatcher(), tenant.tenant_id(), &input)
        .await
        .map_err(errors::dispatch_error_to_response)?;
    services.project(tenant.tenant_id(), &outcome.committed).await;

    tracing::info!(number = outcome.document.number(), "invoice issued");
    Ok(common::created(dto::invoice_to_json(&outcome.document, common::today())))
}

pub async fn list_invoices(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(tenant): Extension<TenantContext>,
    Extension(principal): Extension<PrincipalContext>,
    Query(query): Query<dto::StatusQuery>,
) -> ApiResult {
    require(&tenant, &principal, "invoices.read")?;
    let status: Option<InvoiceStatus> = common::parse_status(query.status.as_deref(), "invoice")?;

    let today = common::today();
    let mut invoices: Vec<_> = services
        .projections()
        .invoices
        .list(tenant.tenant_id())
        .into_iter()
        .filter(|i| status.is_none_or(|s| i.status() == s))
        .collect();
    invoices.sort_by(|a, b| a.number().cmp(b.number()));
    Ok(common::items(invoices.iter().map(|i| dto::invoice_to_json(i, today)).collect()))
}

pub async fn get_invoice(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(tenant): Extension<TenantContext>,
    Extension(principal): Extension<PrincipalContext>,
    Path(id): Path<String>,
) -> ApiResult {
    require(&tenant, &principal, "invoices.read")?;
    let invoice = find(&services, &tenant, &id)?;
    Ok(common::ok(dto::invoice_to_json(&invoice, common::today())))
}

pub async fn mark_sent(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(tenant): Extension<TenantContext>,
    Extension(principal): Extension<PrincipalContext>,
    Path(id): Path<String>,
) -> ApiResult {
    require(&tenant, &principal, "invoices.issue")?;
    let invoice_id = find(&services, &tenant, &id)?.id_typed();
    let cmd = InvoiceCommand::MarkInvoiceSent(MarkInvoiceSent {
        tenant_id: tenant.tenant_id(),
        invoice_id,
        occurred_at: Utc::now(),
    });
    let invoice = dispatch(&services, &tenant, invoice_id, cmd).await?;
    Ok(common::ok(dto::invoice_to_json(&invoice, common::today())))
}

pub async fn register_payment(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(tenant): Extension<TenantContext>,
    Extension(principal): Extension<PrincipalContext>,
    Path(id): Path<String>,
    Json(body): Json<dto::RegisterPaymentRequest>,
) -> ApiResult {
    require(&tenant, &principal, "invoices.payments")?;
    let invoice_id = find(&services, &tenant, &id)?.id_typed();
    let cmd = InvoiceCommand::RegisterPayment(RegisterPayment {
        tenant_id: tenant.tenant_id(),
        invoice_id,
        amount: body.amount,
        method: body.method,
        reference: body.reference,
        occurred_at: Utc::now(),
    });
    let invoice = dispatch(&services, &tenant, invoice_id, cmd).await?;
    tracing::info!(
        number = invoice.number(),
        amount = body.amount,
        outstanding = invoice.outstanding_amount(),
        "payment registered"
    );
    Ok(common::ok(dto::invoice_to_json(&invoice, common::today())))
}

pub async fn void_invoice(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(tenant): Extension<TenantContext>,
    Extension(principal): Extension<PrincipalContext>,
    Path(id): Path<String>,
    body: Option<Json<dto::ReasonRequest>>,
) -> ApiResult {
    require(&tenant, &principal, "invoices.void")?;
    let invoice_id = find(&services, &tenant, &id)?.id_typed();
    let cmd = InvoiceCommand::VoidInvoice(VoidInvoice {
        tenant_id: tenant.tenant_id(),
        invoice_id,
        reason: body.and_then(|Json(b)| b.reason),
        occurred_at: Utc::now(),
    });
    let invoice = dispatch(&services, &tenant, invoice_id, cmd).await?;
    Ok(common::ok(dto::invoice_to_json(&invoice, common::today())))
}

pub async fn invoice_pdf(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(tenant): Extension<TenantContext>,
    Extension(principal): Extension<PrincipalContext>,
    Path(id): Path<String>,
) -> ApiResult {
    require(&tenant, &principal, "invoices.read")?;
    let invoice = find(&services, &tenant, &id)?;
    let customer = customer_of(&services, &tenant, &invoice)?;

    let documents = services.documents();
    let view = invoice_view(&invoice, &customer, documents.company());
    let rendered = documents
        .render(&view)
        .map_err(errors::document_error_to_response)?;
    Ok(common::pdf(rendered))
}

/// Email the PDF and record the invoice as sent.
pub async fn email_invoice(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(tenant): Extension<TenantContext>,
    Extension(principal): Extension<PrincipalContext>,
    Path(id): Path<String>,
    body: Option<Json<dto::EmailDocumentRequest>>,
) -> ApiResult {
    require(&tenant, &principal, "invoices.read")?;
    require(&tenant, &principal, "documents.send")?;
    let invoice = find(&services, &tenant, &id)?;
    let customer = customer_of(&services, &tenant, &invoice)?;
    let body = body.map(|Json(b)| b).unwrap_or_default();

    let documents = services.documents();
    let view = invoice_view(&invoice, &customer, documents.company());
    let emailed = documents
        .email(
            tenant.tenant_id(),
            &view,
            customer.contact().email.as_deref(),
            body.to.as_deref(),
            body.message.as_deref(),
        )
        .await
        .map_err(errors::document_error_to_response)?;

    let invoice = if invoice.sent_at().is_none() && invoice.status() != InvoiceStatus::Void {
        let invoice_id = invoice.id_typed();
        let cmd = InvoiceCommand::MarkInvoiceSent(MarkInvoiceSent {
            tenant_id: tenant.tenant_id(),
            invoice_id,
            occurred_at: Utc::now(),
        });
        dispatch(&services, &tenant, invoice_id, cmd).await?
    } else {
        invoice
    };

    Ok(common::ok(json!({
        "invoice": dto::invoice_to_json(&invoice, common::today()),
        "email": emailed,
    })))
}

pub async fn invoice_history(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(tenant): Extension<TenantContext>,
    Extension(principal): Extension<PrincipalContext>,
    Path(id): Path<String>,
) -> ApiResult {
    require(&tenant, &principal, "invoices.read")?;
    common::history(&services, tenant.tenant_id(), &id, "invoicing.invoice", "invoice").await
}
