use std::sync::Arc;

use axum::{
    extract::{Extension, Path, Query},
    routing::{delete, get, post},
    Json, Router,
};
use chrono::Utc;
use serde_json::json;

use bizdesk_infra::external::quote_view;
use bizdesk_infra::workflows::{self, AddQuoteLinesInput, ConvertQuoteInput, CreateQuoteInput};
use bizdesk_parties::{Party, PartyId};
use bizdesk_projects::ProjectId;
use bizdesk_quotes::{
    AcceptQuote, DeclineQuote, Quote, QuoteCommand, QuoteId, QuoteStatus, RemoveQuoteLine,
    SendQuote,
};

use crate::app::dto;
use crate::app::errors::{self, ApiResult};
use crate::app::routes::common;
use crate::app::services::AppServices;
use crate::authz::require;
use crate::context::{PrincipalContext, TenantContext};

pub fn router() -> Router {
    Router::new()
        .route("/", post(create_quote).get(list_quotes))
        .route("/:id", get(get_quote))
        .route("/:id/lines", post(add_lines))
        .route("/:id/lines/:line_no", delete(remove_line))
        .route("/:id/send", post(send_quote))
        .route("/:id/accept", post(accept_quote))
        .route("/:id/decline", post(decline_quote))
        .route("/:id/convert", post(convert_quote))
        .route("/:id/pdf", get(quote_pdf))
        .route("/:id/email", post(email_quote))
        .route("/:id/history", get(quote_history))
}

fn find(services: &AppServices, tenant: &TenantContext, raw_id: &str) -> Result<Quote, axum::response::Response> {
    let id = dto::parse_id(raw_id, "quote")?;
    services
        .projections()
        .quotes
        .get(tenant.tenant_id(), id)
        .ok_or_else(|| errors::not_found("quote"))
}

fn customer_of(services: &AppServices, tenant: &TenantContext, quote: &Quote) -> Result<Party, axum::response::Response> {
    quote
        .customer_id()
        .and_then(|c| services.projections().parties.get(tenant.tenant_id(), c.0))
        .ok_or_else(|| errors::not_found("customer"))
}

async fn dispatch(
    services: &AppServices,
    tenant: &TenantContext,
    quote_id: QuoteId,
    cmd: QuoteCommand,
) -> ApiResult {
    let quote = services
        .dispatch::<Quote>(tenant.tenant_id(), quote_id.0, cmd)
        .await
        .map_err(errors::dispatch_error_to_response)?;
    Ok(common::ok(dto::quote_to_json(&quote, common::today())))
}

pub async fn create_quote(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(tenant): Extension<TenantContext>,
    Extension(principal): Extension<PrincipalContext>,
    Json(body): Json<dto::CreateQuoteRequest>,
) -> ApiResult {
    require(&tenant, &principal, "quotes.write")?;

    let input = CreateQuoteInput {
        customer_id: PartyId::new(dto::parse_id(&body.customer_id, "customer")?),
        project_id: dto::parse_optional_id(body.project_id.as_deref(), "project")?.map(ProjectId::new),
        currency: body.currency,
        valid_until: body.valid_until,
        notes: body.notes,
        lines: common::line_inputs(body.lines)?,
        occurred_at: Utc::now(),
    };
    let outcome = workflows::create_quote(services.dispatcher(), tenant.tenant_id(), &input)
        .await
        .map_err(errors::dispatch_error_to_response)?;
    services.project(tenant.tenant_id(), &outcome.committed).await;

    tracing::info!(number = outcome.document.number(), "quote created");
    Ok(common::created(dto::quote_to_json(&outcome.document, common::today())))
}

pub async fn list_quotes(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(tenant): Extension<TenantContext>,
    Extension(principal): Extension<PrincipalContext>,
    Query(query): Query<dto::StatusQuery>,
) -> ApiResult {
    require(&tenant, &principal, "quotes.read")?;
    let status: Option<QuoteStatus> = common::parse_status(query.status.as_deref(), "quote")?;

    let today = common::today();
    let mut quotes: Vec<_> = services
        .projections()
        .quotes
        .list(tenant.tenant_id())
        .into_iter()
        .filter(|q| status.is_none_or(|s| q.status() == s))
        .collect();
    quotes.sort_by(|a, b| a.number().cmp(b.number()));
    Ok(common::items(quotes.iter().map(|q| dto::quote_to_json(q, today)).collect()))
}

pub async fn get_quote(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(tenant): Extension<TenantContext>,
    Extension(principal): Extension<PrincipalContext>,
    Path(id): Path<String>,
) -> ApiResult {
    require(&tenant, &principal, "quotes.read")?;
    let quote = find(&services, &tenant, &id)?;
    Ok(common::ok(dto::quote_to_json(&quote, common::today())))
}

/// Append lines to a draft quote.
pub async fn add_lines(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(tenant): Extension<TenantContext>,
    Extension(principal): Extension<PrincipalContext>,
    Path(id): Path<String>,
    Json(body): Json<dto::AddLinesRequest>,
) -> ApiResult {
    require(&tenant, &principal, "quotes.write")?;
    let quote_id = find(&services, &tenant, &id)?.id_typed();

    let input = AddQuoteLinesInput {
        quote_id,
        lines: common::line_inputs(body.lines)?,
        occurred_at: Utc::now(),
    };
    let outcome = workflows::add_quote_lines(services.dispatcher(), tenant.tenant_id(), &input)
        .await
        .map_err(errors::dispatch_error_to_response)?;
    services.project(tenant.tenant_id(), &outcome.committed).await;
    Ok(common::ok(dto::quote_to_json(&outcome.document, common::today())))
}

pub async fn remove_line(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(tenant): Extension<TenantContext>,
    Extension(principal): Extension<PrincipalContext>,
    Path((id, line_no)): Path<(String, u32)>,
) -> ApiResult {
    require(&tenant, &principal, "quotes.write")?;
    let quote_id = find(&services, &tenant, &id)?.id_typed();
    let cmd = QuoteCommand::RemoveQuoteLine(RemoveQuoteLine {
        tenant_id: tenant.tenant_id(),
        quote_id,
        line_no,
        occurred_at: Utc::now(),
    });
    dispatch(&services, &tenant, quote_id, cmd).await
}

pub async fn send_quote(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(tenant): Extension<TenantContext>,
    Extension(principal): Extension<PrincipalContext>,
    Path(id): Path<String>,
) -> ApiResult {
    require(&tenant, &principal, "quotes.write")?;
    let quote_id = find(&services, &tenant, &id)?.id_typed();
    let cmd = QuoteCommand::SendQuote(SendQuote {
        tenant_id: tenant.tenant_id(),
        quote_id,
        occurred_at: Utc::now(),
    });
    dispatch(&services, &tenant, quote_id, cmd).await
}

pub async fn accept_quote(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(tenant): Extension<TenantContext>,
    Extension(principal): Extension<PrincipalContext>,
    Path(id): Path<String>,
) -> ApiResult {
    require(&tenant, &principal, "quotes.write")?;
    let quote_id = find(&services, &tenant, &id)?.id_typed();
    let cmd = QuoteCommand::AcceptQuote(AcceptQuote {
        tenant_id: tenant.tenant_id(),
        quote_id,
        occurred_at: Utc::now(),
    });
    dispatch(&services, &tenant, quote_id, cmd).await
}

pub async fn decline_quote(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(tenant): Extension<TenantContext>,
    Extension(principal): Extension<PrincipalContext>,
    Path(id): Path<String>,
    body: Option<Json<dto::ReasonRequest>>,
) -> ApiResult {
    require(&tenant, &principal, "quotes.write")?;
    let quote_id = find(&services, &tenant, &id)?.id_typed();
    let cmd = QuoteCommand::DeclineQuote(DeclineQuote {
        tenant_id: tenant.tenant_id(),
        quote_id,
        reason: body.and_then(|Json(b)| b.reason),
        occurred_at: Utc::now(),
    });
    dispatch(&services, &tenant, quote_id, cmd).await
}

/// Convert to an invoice; quote, invoice and invoice number commit together.
pub async fn convert_quote(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(tenant): Extension<TenantContext>,
    Extension(principal): Extension<PrincipalContext>,
    Path(id): Path<String>,
    body: Option<Json<dto::ConvertQuoteRequest>>,
) -> ApiResult {
    require(&tenant, &principal, "quotes.convert")?;
    let quote_id = QuoteId::new(dto::parse_id(&id, "quote")?);
    let body = body.map(|Json(b)| b).unwrap_or_default();

    let input = ConvertQuoteInput {
        quote_id,
        issue_date: body.issue_date.unwrap_or_else(common::today),
        due_date: body.due_date,
        notes: body.notes,
        occurred_at: Utc::now(),
    };
    let conversion = workflows::convert_quote_to_invoice(services.dispatcher(), tenant.tenant_id(), &input)
        .await
        .map_err(errors::dispatch_error_to_response)?;
    services.project(tenant.tenant_id(), &conversion.committed).await;

    tracing::info!(
        quote = conversion.quote.number(),
        invoice = conversion.invoice.number(),
        "quote converted"
    );
    let today = common::today();
    Ok(common::created(json!({
        "quote": dto::quote_to_json(&conversion.quote, today),
        "invoice": dto::invoice_to_json(&conversion.invoice, today),
    })))
}

pub async fn quote_pdf(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(tenant): Extension<TenantContext>,
    Extension(principal): Extension<PrincipalContext>,
    Path(id): Path<String>,
) -> ApiResult {
    require(&tenant, &principal, "quotes.read")?;
    let quote = find(&services, &tenant, &id)?;
    let customer = customer_of(&services, &tenant, &quote)?;

    let documents = services.documents();
    let view = quote_view(&quote, &customer, documents.company());
    let rendered = documents
        .render(&view)
        .map_err(errors::document_error_to_response)?;
    Ok(common::pdf(rendered))
}

/// Email the PDF; a draft quote is marked sent once the mail is out.
pub async fn email_quote(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(tenant): Extension<TenantContext>,
    Extension(principal): Extension<PrincipalContext>,
    Path(id): Path<String>,
    body: Option<Json<dto::EmailDocumentRequest>>,
) -> ApiResult {
    require(&tenant, &principal, "quotes.read")?;
    require(&tenant, &principal, "documents.send")?;
    let quote = find(&services, &tenant, &id)?;
    let customer = customer_of(&services, &tenant, &quote)?;
    let body = body.map(|Json(b)| b).unwrap_or_default();

    let documents = services.documents();
    let view = quote_view(&quote, &customer, documents.company());
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

    let mut quote = quote;
    if quote.status() == QuoteStatus::Draft {
        let quote_id = quote.id_typed();
        quote = services
            .dispatch::<Quote>(
                tenant.tenant_id(),
                quote_id.0,
                QuoteCommand::SendQuote(SendQuote {
                    tenant_id: tenant.tenant_id(),
                    quote_id,
                    occurred_at: Utc::now(),
                }),
            )
            .await
            .map_err(errors::dispatch_error_to_response)?;
    }

    Ok(common::ok(json!({
        "quote": dto::quote_to_json(&quote, common::today()),
        "email": emailed,
    })))
}

pub async fn quote_history(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(tenant): Extension<TenantContext>,
    Extension(principal): Extension<PrincipalContext>,
    Path(id): Path<String>,
) -> ApiResult {
    require(&tenant, &principal, "quotes.read")?;
    common::history(&services, tenant.tenant_id(), &id, "quotes.quote", "quote").await
}
