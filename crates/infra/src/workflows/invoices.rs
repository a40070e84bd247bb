use std::collections::HashSet;

use chrono::{DateTime, Duration, NaiveDate, Utc};
use serde_json::Value as JsonValue;

use bizdesk_core::TenantId;
use bizdesk_events::{EventBus, EventEnvelope};
use bizdesk_invoicing::{
    Invoice, InvoiceCommand, InvoiceSource, IssueInvoice, invoice_lines_from_time,
};
use bizdesk_numbering::DocumentKind;
use bizdesk_parties::{PartyId, PartyKind};
use bizdesk_projects::{Project, ProjectId};
use bizdesk_timesheets::{MarkTimeBilled, TimeEntry, TimeEntryCommand, TimeEntryId};

use super::{
    LineInput, Outcome, allocate_number, load_new, load_party, must_exist, resolve_lines,
    retry_on_conflict,
};
use crate::command_dispatcher::{CommandDispatcher, DispatchError};
use crate::event_store::EventStore;

#[derive(Debug, Clone)]
pub struct IssueInvoiceInput {
    pub customer_id: PartyId,
    pub project_id: Option<ProjectId>,
    pub currency: String,
    pub lines: Vec<LineInput>,
    pub issue_date: NaiveDate,
    pub due_date: Option<NaiveDate>,
    pub notes: Option<String>,
    pub occurred_at: DateTime<Utc>,
}

/// Issue a manual invoice.
#[tracing::instrument(skip(dispatcher, input), fields(tenant_id = %tenant_id))]
pub async fn issue_invoice<S, B>(
    dispatcher: &CommandDispatcher<S, B>,
    tenant_id: TenantId,
    input: &IssueInvoiceInput,
) -> Result<Outcome<Invoice>, DispatchError>
where
    S: EventStore,
    B: EventBus<EventEnvelope<JsonValue>>,
{
    retry_on_conflict!(try_issue(dispatcher, tenant_id, input))
}

async fn try_issue<S, B>(
    dispatcher: &CommandDispatcher<S, B>,
    tenant_id: TenantId,
    input: &IssueInvoiceInput,
) -> Result<Outcome<Invoice>, DispatchError>
where
    S: EventStore,
    B: EventBus<EventEnvelope<JsonValue>>,
{
    let mut uow = dispatcher.unit_of_work(tenant_id);

    let customer = load_party(&mut uow, input.customer_id.0, PartyKind::Customer).await?;
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
    let number = allocate_number(&mut uow, DocumentKind::Invoice, input.occurred_at).await?;

    let mut invoice = load_new::<Invoice, _, _>(&mut uow).await?;
    let invoice_id = invoice.id_typed();
    uow.decide(
        &mut invoice,
        &InvoiceCommand::IssueInvoice(IssueInvoice {
            tenant_id,
            invoice_id,
            number,
            customer_id: input.customer_id,
            project_id: input.project_id,
            source: InvoiceSource::Manual,
            currency: input.currency.clone(),
            lines,
            issue_date: input.issue_date,
            due_date: input.due_date.unwrap_or_else(|| {
                input.issue_date + Duration::days(i64::from(customer.payment_terms_days()))
            }),
            notes: input.notes.clone(),
            occurred_at: input.occurred_at,
        }),
    )?;

    let committed = uow.commit().await?;
    tracing::info!(invoice_id = %invoice_id, number = invoice.number(), "invoice issued");
    Ok(Outcome {
        document: invoice,
        committed,
    })
}

#[derive(Debug, Clone)]
pub struct InvoiceTimeInput {
    pub project_id: ProjectId,
    pub entry_ids: Vec<TimeEntryId>,
    pub currency: String,
    pub tax_rate_bps: u32,
    pub issue_date: NaiveDate,
    pub due_date: Option<NaiveDate>,
    pub notes: Option<String>,
    pub occurred_at: DateTime<Utc>,
}

/// Bill approved time of one project: issue the invoice and mark every
/// entry billed against it, atomically.
#[tracing::instrument(
    skip(dispatcher, input),
    fields(tenant_id = %tenant_id, project_id = %input.project_id, entries = input.entry_ids.len())
)]
pub async fn invoice_time_entries<S, B>(
    dispatcher: &CommandDispatcher<S, B>,
    tenant_id: TenantId,
    input: &InvoiceTimeInput,
) -> Result<Outcome<Invoice>, DispatchError>
where
    S: EventStore,
    B: EventBus<EventEnvelope<JsonValue>>,
{
    if input.entry_ids.is_empty() {
        return Err(DispatchError::Validation("no time entries selected".to_string()));
    }
    let mut seen = HashSet::new();
    if let Some(dup) = input.entry_ids.iter().find(|id| !seen.insert(**id)) {
        return Err(DispatchError::Validation(format!(
            "time entry {dup} selected twice"
        )));
    }
    retry_on_conflict!(try_invoice_time(dispatcher, tenant_id, input))
}

async fn try_invoice_time<S, B>(
    dispatcher: &CommandDispatcher<S, B>,
    tenant_id: TenantId,
    input: &InvoiceTimeInput,
) -> Result<Outcome<Invoice>, DispatchError>
where
    S: EventStore,
    B: EventBus<EventEnvelope<JsonValue>>,
{
    let mut uow = dispatcher.unit_of_work(tenant_id);

    let project = uow.load_existing::<Project>(input.project_id.0).await?;
    let customer_id = project
        .customer_id()
        .ok_or_else(|| DispatchError::InvariantViolation("project has no customer".to_string()))?;
    let customer = load_party(&mut uow, customer_id.0, PartyKind::Customer).await?;

    let mut entries: Vec<TimeEntry> = Vec::with_capacity(input.entry_ids.len());
    for entry_id in &input.entry_ids {
        let entry = uow
            .load_existing::<TimeEntry>(entry_id.0)
            .await
            .map_err(must_exist("time entry", entry_id.0))?;
        if entry.project_id() != Some(input.project_id) {
            return Err(DispatchError::InvariantViolation(format!(
                "time entry {entry_id} does not belong to project {}",
                project.code()
            )));
        }
        entries.push(entry);
    }
    let lines = invoice_lines_from_time(&entries, input.tax_rate_bps)?;
    let number = allocate_number(&mut uow, DocumentKind::Invoice, input.occurred_at).await?;

    let mut invoice = load_new::<Invoice, _, _>(&mut uow).await?;
    let invoice_id = invoice.id_typed();
    uow.decide(
        &mut invoice,
        &InvoiceCommand::IssueInvoice(IssueInvoice {
            tenant_id,
            invoice_id,
            number,
            customer_id,
            project_id: Some(input.project_id),
            source: InvoiceSource::Timesheet {
                entry_ids: input.entry_ids.clone(),
            },
            currency: input.currency.clone(),
            lines,
            issue_date: input.issue_date,
            due_date: input.due_date.unwrap_or_else(|| {
                input.issue_date + Duration::days(i64::from(customer.payment_terms_days()))
            }),
            notes: input.notes.clone(),
            occurred_at: input.occurred_at,
        }),
    )?;
    for entry in &mut entries {
        let entry_id = entry.id_typed();
        uow.decide(
            entry,
            &TimeEntryCommand::MarkTimeBilled(MarkTimeBilled {
                tenant_id,
                entry_id,
                invoice_id: invoice_id.0,
                occurred_at: input.occurred_at,
            }),
        )?;
    }

    let committed = uow.commit().await?;
    tracing::info!(
        invoice = invoice.number(),
        entries = entries.len(),
        "time invoiced"
    );
    Ok(Outcome {
        document: invoice,
        committed,
    })
}
