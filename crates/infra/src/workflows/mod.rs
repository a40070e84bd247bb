//! Multi-aggregate workflows.
//!
//! Each workflow loads everything it needs through one [`UnitOfWork`],
//! decides every command, and commits once. Document numbers are allocated
//! inside the same commit as the document, so a failed workflow never burns
//! a number and two concurrent workflows can never get the same one.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;

use bizdesk_catalog::{CatalogItem, CatalogItemId, PricedLine};
use bizdesk_core::{AggregateId, Quantity};
use bizdesk_events::{EventBus, EventEnvelope};
use bizdesk_numbering::{
    AllocateNumber, DocumentKind, DocumentSequence, SequenceCommand, SequenceEvent, SequenceId,
};
use bizdesk_parties::{Party, PartyKind};

use crate::command_dispatcher::DispatchError;
use crate::event_store::{EventStore, StoredEvent};
use crate::streams::EventSourced;
use crate::unit_of_work::UnitOfWork;

/// Attempts for workflows that lose a race on a shared stream.
pub const MAX_ATTEMPTS: u32 = 3;

/// Re-run a workflow attempt while it loses optimistic concurrency races.
macro_rules! retry_on_conflict {
    ($attempt:expr) => {{
        let mut attempt = 1u32;
        loop {
            match $attempt.await {
                Err($crate::command_dispatcher::DispatchError::Concurrency(msg))
                    if attempt < $crate::workflows::MAX_ATTEMPTS =>
                {
                    tracing::debug!(attempt, %msg, "retrying workflow after concurrent append");
                    attempt += 1;
                }
                outcome => break outcome,
            }
        }
    }};
}
pub(crate) use retry_on_conflict;

pub mod inventory;
pub mod invoices;
pub mod purchasing;
pub mod quotes;
pub mod timesheets;

pub use inventory::{AdjustStockInput, adjust_stock};
pub use invoices::{IssueInvoiceInput, InvoiceTimeInput, invoice_time_entries, issue_invoice};
pub use purchasing::{
    AddPurchaseLinesInput, CreatePurchaseOrderInput, PurchaseLineInput, ReceiveGoodsInput,
    Receiving, add_purchase_lines, create_purchase_order, receive_purchase_order,
};
pub use quotes::{
    AddQuoteLinesInput, Conversion, ConvertQuoteInput, CreateQuoteInput, add_quote_lines,
    convert_quote_to_invoice, create_quote,
};
pub use timesheets::{LogTimeInput, log_time};

/// A document line as entered by a user.
///
/// With a catalog item, name, list price and tax rate come from the item and
/// any field given here overrides it. Without one, description and price are
/// required.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LineInput {
    pub catalog_item_id: Option<CatalogItemId>,
    pub description: Option<String>,
    pub quantity: Quantity,
    pub unit_price: Option<u64>,
    #[serde(default)]
    pub discount_bps: u32,
    pub tax_rate_bps: Option<u32>,
}

/// Outcome of a single-document workflow.
#[derive(Debug, Clone)]
pub struct Outcome<A> {
    pub document: A,
    pub committed: Vec<StoredEvent>,
}

/// Map `NotFound` for a referenced (not the target) aggregate to an invariant.
pub(crate) fn must_exist(what: &str, id: AggregateId) -> impl FnOnce(DispatchError) -> DispatchError + '_ {
    move |err| match err {
        DispatchError::NotFound => {
            DispatchError::InvariantViolation(format!("{what} {id} does not exist"))
        }
        other => other,
    }
}

pub(crate) async fn load_party<S, B>(
    uow: &mut UnitOfWork<'_, S, B>,
    party_id: AggregateId,
    kind: PartyKind,
) -> Result<Party, DispatchError>
where
    S: EventStore,
    B: EventBus<EventEnvelope<JsonValue>>,
{
    let what = match kind {
        PartyKind::Customer => "customer",
        PartyKind::Supplier => "supplier",
    };
    let party = uow
        .load_existing::<Party>(party_id)
        .await
        .map_err(must_exist(what, party_id))?;
    if party.kind() != kind {
        return Err(DispatchError::InvariantViolation(format!(
            "party {} is not a {what}",
            party.name()
        )));
    }
    if !party.can_transact() {
        return Err(DispatchError::InvariantViolation(format!(
            "{what} {} is suspended",
            party.name()
        )));
    }
    Ok(party)
}

/// Stage the next number of `kind` and return it formatted.
pub(crate) async fn allocate_number<S, B>(
    uow: &mut UnitOfWork<'_, S, B>,
    kind: DocumentKind,
    occurred_at: DateTime<Utc>,
) -> Result<String, DispatchError>
where
    S: EventStore,
    B: EventBus<EventEnvelope<JsonValue>>,
{
    let tenant_id = uow.tenant_id();
    let sequence_id = SequenceId::for_kind(tenant_id, kind);
    let mut sequence = uow.load::<DocumentSequence>(sequence_id.0).await?;
    let events = uow.decide(
        &mut sequence,
        &SequenceCommand::AllocateNumber(AllocateNumber {
            tenant_id,
            sequence_id,
            kind,
            occurred_at,
        }),
    )?;
    events
        .into_iter()
        .find_map(|e| match e {
            SequenceEvent::NumberAllocated(n) => Some(n.formatted),
            SequenceEvent::SequenceConfigured(_) => None,
        })
        .ok_or_else(|| DispatchError::InvariantViolation("no number was allocated".to_string()))
}

/// Price user-entered lines, numbering them from 1.
pub(crate) async fn resolve_lines<S, B>(
    uow: &mut UnitOfWork<'_, S, B>,
    inputs: &[LineInput],
) -> Result<Vec<PricedLine>, DispatchError>
where
    S: EventStore,
    B: EventBus<EventEnvelope<JsonValue>>,
{
    let mut lines = Vec::with_capacity(inputs.len());
    for (i, input) in inputs.iter().enumerate() {
        let line_no = i as u32 + 1;
        let line = match input.catalog_item_id {
            Some(item_id) => {
                let item = uow
                    .load_existing::<CatalogItem>(item_id.0)
                    .await
                    .map_err(must_exist("catalog item", item_id.0))?;
                let mut line = item.sales_line(line_no, input.quantity, input.discount_bps)?;
                if let Some(description) = &input.description {
                    line.description = description.clone();
                }
                if let Some(price) = input.unit_price {
                    line.unit_price = price;
                }
                if let Some(tax) = input.tax_rate_bps {
                    line.tax_rate_bps = tax;
                }
                line
            }
            None => PricedLine {
                line_no,
                catalog_item_id: None,
                description: input.description.clone().unwrap_or_default(),
                quantity: input.quantity,
                unit_price: input.unit_price.unwrap_or(0),
                discount_bps: input.discount_bps,
                tax_rate_bps: input.tax_rate_bps.unwrap_or(0),
            },
        };
        line.validate()
            .map_err(|e| prefix_line_error(line_no, e.into()))?;
        lines.push(line);
    }
    Ok(lines)
}

fn prefix_line_error(line_no: u32, err: DispatchError) -> DispatchError {
    match err {
        DispatchError::Validation(msg) => DispatchError::Validation(format!("line {line_no}: {msg}")),
        other => other,
    }
}

/// Fresh id for a document the workflow is about to create.
pub(crate) async fn load_new<A, S, B>(uow: &mut UnitOfWork<'_, S, B>) -> Result<A, DispatchError>
where
    A: EventSourced,
    S: EventStore,
    B: EventBus<EventEnvelope<JsonValue>>,
{
    uow.load::<A>(AggregateId::new()).await
}
