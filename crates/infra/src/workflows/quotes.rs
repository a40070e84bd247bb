use chrono::{DateTime, Duration, NaiveDate, Utc};
use serde_json::Value as JsonValue;

use bizdesk_core::TenantId;
use bizdesk_events::{EventBus, EventEnvelope};
use bizdesk_invoicing::{
    Invoice, InvoiceCommand, InvoiceSource, IssueInvoice, invoice_lines_from_quote,
};
use bizdesk_numbering::DocumentKind;
use bizdesk_parties::{PartyId, PartyKind};
use bizdesk_projects::{Project, ProjectId};
use bizdesk_quotes::{
    AddQuoteLine, CreateQuote, MarkQuoteConverted, Quote, QuoteCommand, QuoteId,
};

use super::{
    LineInput, Outcome, allocate_number, load_new, load_party, must_exist, resolve_lines,
    retry_on_conflict,
};
use crate::command_dispatcher::{CommandDispatcher, DispatchError};
use crate::event_store::{EventStore, StoredEvent};

#[derive(Debug, Clone)]
pub struct CreateQuoteInput {
    pub customer_id: PartyId,
    pub project_id: Option<ProjectId>,
    pub currency: String,
    pub valid_until: NaiveDate,
    pub notes: Option<String>,
    pub lines: Vec<LineInput>,
    pub occurred_at: DateTime<Utc>,
}

/// Create a draft quote with its lines, numbered from the quote sequence.
#[tracing::instrument(skip(dispatcher, input), fields(tenant_id = %tenant_id))]
pub async fn create_quote<S, B>(
    dispatcher: &CommandDispatcher<S, B>,
    tenant_id: TenantId,
    input: &CreateQuoteInput,
) -> Result<Outcome<Quote>, DispatchError>
where
    S: EventStore,
    B: EventBus<EventEnvelope<JsonValue>>,
{
    retry_on_conflict!(try_create_quote(dispatcher, tenant_id, input))
}

async fn try_create_quote<S, B>(
    dispatcher: &CommandDispatcher<S, B>,
    tenant_id: TenantId,
    input: &CreateQuoteInput,
) -> Result<Outcome<Quote>, DispatchError>
where
    S: EventStore,
    B: EventBus<EventEnvelope<JsonValue>>,
{
    let mut uow = dispatcher.unit_of_work(tenant_id);

    load_party(&mut uow, input.customer_id.0, PartyKind::Customer).await?;
    if let Some(project_id) = input.project_id {
        let project = uow
            .load_existing::<Project>(project_id.0)
            .await
            .map_err(must_exist("project", project_id.0))?;
        if project.customer_id() != Some(input.customer_id) {
            return Err(DispatchError::InvariantViolation(format!(
                "project {} belongs to another customer",
                project.code()
            )));
        }
    }
    let lines = resolve_lines(&mut uow, &input.lines).await?;
    let number = allocate_number(&mut uow, DocumentKind::Quote, input.occurred_at).await?;

    let mut quote = load_new::<Quote, _, _>(&mut uow).await?;
    let quote_id = quote.id_typed();
    uow.decide(
        &mut quote,
        &QuoteCommand::CreateQuote(CreateQuote {
            tenant_id,
            quote_id,
            number,
            customer_id: input.customer_id,
            project_id: input.project_id,
            currency: input.currency.clone(),
            valid_until: input.valid_until,
            notes: input.notes.clone(),
            occurred_at: input.occurred_at,
        }),
    )?;
    for line in lines {
        uow.decide(
            &mut quote,
            &QuoteCommand::AddQuoteLine(AddQuoteLine {
                tenant_id,
                quote_id,
                line,
                occurred_at: input.occurred_at,
            }),
        )?;
    }

    let committed = uow.commit().await?;
    tracing::info!(quote_id = %quote_id, number = quote.number(), "quote created");
    Ok(Outcome {
        document: quote,
        committed,
    })
}

#[derive(Debug, Clone)]
pub struct AddQuoteLinesInput {
    pub quote_id: QuoteId,
    pub lines: Vec<LineInput>,
    pub occurred_at: DateTime<Utc>,
}

/// Price and append lines to a draft quote. Lines take the next free numbers.
#[tracing::instrument(skip(dispatcher, input), fields(tenant_id = %tenant_id, quote_id = %input.quote_id))]
pub async fn add_quote_lines<S, B>(
    dispatcher: &CommandDispatcher<S, B>,
    tenant_id: TenantId,
    input: &AddQuoteLinesInput,
) -> Result<Outcome<Quote>, DispatchError>
where
    S: EventStore,
    B: EventBus<EventEnvelope<JsonValue>>,
{
    retry_on_conflict!(try_add_lines(dispatcher, tenant_id, input))
}

async fn try_add_lines<S, B>(
    dispatcher: &CommandDispatcher<S, B>,
    tenant_id: TenantId,
    input: &AddQuoteLinesInput,
) -> Result<Outcome<Quote>, DispatchError>
where
    S: EventStore,
    B: EventBus<EventEnvelope<JsonValue>>,
{
    if input.lines.is_empty() {
        return Err(DispatchError::Validation("no lines to add".to_string()));
    }
    let mut uow = dispatcher.unit_of_work(tenant_id);
    let mut quote = uow.load_existing::<Quote>(input.quote_id.0).await?;
    let lines = resolve_lines(&mut uow, &input.lines).await?;
    for line in lines {
        uow.decide(
            &mut quote,
            &QuoteCommand::AddQuoteLine(AddQuoteLine {
                tenant_id,
                quote_id: input.quote_id,
                line,
                occurred_at: input.occurred_at,
            }),
        )?;
    }

    let committed = uow.commit().await?;
    Ok(Outcome {
        document: quote,
        committed,
    })
}

#[derive(Debug, Clone)]
pub struct ConvertQuoteInput {
    pub quote_id: QuoteId,
    pub issue_date: NaiveDate,
    /// Defaults to the issue date plus the customer's payment terms.
    pub due_date: Option<NaiveDate>,
    /// Defaults to the quote's notes.
    pub notes: Option<String>,
    pub occurred_at: DateTime<Utc>,
}

/// Both documents after a conversion.
#[derive(Debug, Clone)]
pub struct Conversion {
    pub quote: Quote,
    pub invoice: Invoice,
    pub committed: Vec<StoredEvent>,
}

/// Turn a sent or accepted quote into an invoice.
///
/// Marking the quote converted, allocating the invoice number and issuing
/// the invoice are committed together: either all three happen or none does.
#[tracing::instrument(skip(dispatcher, input), fields(tenant_id = %tenant_id, quote_id = %input.quote_id))]
pub async fn convert_quote_to_invoice<S, B>(
    dispatcher: &CommandDispatcher<S, B>,
    tenant_id: TenantId,
    input: &ConvertQuoteInput,
) -> Result<Conversion, DispatchError>
where
    S: EventStore,
    B: EventBus<EventEnvelope<JsonValue>>,
{
    retry_on_conflict!(try_convert(dispatcher, tenant_id, input))
}

async fn try_convert<S, B>(
    dispatcher: &CommandDispatcher<S, B>,
    tenant_id: TenantId,
    input: &ConvertQuoteInput,
) -> Result<Conversion, DispatchError>
where
    S: EventStore,
    B: EventBus<EventEnvelope<JsonValue>>,
{
    let mut uow = dispatcher.unit_of_work(tenant_id);

    let mut quote = uow.load_existing::<Quote>(input.quote_id.0).await?;
    let customer_id = quote
        .customer_id()
        .ok_or_else(|| DispatchError::InvariantViolation("quote has no customer".to_string()))?;
    let customer = load_party(&mut uow, customer_id.0, PartyKind::Customer).await?;

    let due_date = input.due_date.unwrap_or_else(|| {
        input.issue_date + Duration::days(i64::from(customer.payment_terms_days()))
    });
    let lines = invoice_lines_from_quote(&quote);
    let invoice_number = allocate_number(&mut uow, DocumentKind::Invoice, input.occurred_at).await?;

    let mut invoice = load_new::<Invoice, _, _>(&mut uow).await?;
    let invoice_id = invoice.id_typed();

    uow.decide(
        &mut quote,
        &QuoteCommand::MarkQuoteConverted(MarkQuoteConverted {
            tenant_id,
            quote_id: input.quote_id,
            invoice_id: invoice_id.0,
            invoice_number: invoice_number.clone(),
            occurred_at: input.occurred_at,
        }),
    )?;
    uow.decide(
        &mut invoice,
        &InvoiceCommand::IssueInvoice(IssueInvoice {
            tenant_id,
            invoice_id,
            number: invoice_number,
            customer_id,
            project_id: quote.project_id(),
            source: InvoiceSource::Quote {
                quote_id: input.quote_id,
                quote_number: quote.number().to_string(),
            },
            currency: quote.currency().to_string(),
            lines,
            issue_date: input.issue_date,
            due_date,
            notes: input
                .notes
                .clone()
                .or_else(|| quote.notes().map(str::to_string)),
            occurred_at: input.occurred_at,
        }),
    )?;

    let committed = uow.commit().await?;
    tracing::info!(
        quote = quote.number(),
        invoice = invoice.number(),
        total = invoice.total_amount(),
        "quote converted to invoice"
    );
    Ok(Conversion {
        quote,
        invoice,
        committed,
    })
}
