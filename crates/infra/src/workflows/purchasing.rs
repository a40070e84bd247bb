use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;

use bizdesk_catalog::{CatalogItem, CatalogItemId};
use bizdesk_core::{Quantity, TenantId};
use bizdesk_events::{EventBus, EventEnvelope};
use bizdesk_inventory::{AdjustmentReason, StockItem};
use bizdesk_numbering::DocumentKind;
use bizdesk_parties::{PartyId, PartyKind};
use bizdesk_purchasing::{
    AddPurchaseLine, CreatePurchaseOrder, PurchaseOrder, PurchaseOrderCommand,
    PurchaseOrderEvent, PurchaseOrderId, Receipt, ReceiveGoods,
};

use super::inventory::StagedStock;
use super::{Outcome, allocate_number, load_new, load_party, must_exist, retry_on_conflict};
use crate::command_dispatcher::{CommandDispatcher, DispatchError};
use crate::event_store::{EventStore, StoredEvent};
use crate::unit_of_work::UnitOfWork;

/// A purchase line as entered. Description, cost and tax default to the
/// catalog item's name, cost price and tax rate.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PurchaseLineInput {
    pub catalog_item_id: CatalogItemId,
    pub description: Option<String>,
    pub quantity: Quantity,
    pub unit_cost: Option<u64>,
    pub tax_rate_bps: Option<u32>,
}

#[derive(Debug, Clone)]
pub struct CreatePurchaseOrderInput {
    pub supplier_id: PartyId,
    pub currency: String,
    pub expected_on: Option<NaiveDate>,
    pub notes: Option<String>,
    pub lines: Vec<PurchaseLineInput>,
    pub occurred_at: DateTime<Utc>,
}

/// Create a draft purchase order with its lines, numbered from the PO sequence.
#[tracing::instrument(skip(dispatcher, input), fields(tenant_id = %tenant_id))]
pub async fn create_purchase_order<S, B>(
    dispatcher: &CommandDispatcher<S, B>,
    tenant_id: TenantId,
    input: &CreatePurchaseOrderInput,
) -> Result<Outcome<PurchaseOrder>, DispatchError>
where
    S: EventStore,
    B: EventBus<EventEnvelope<JsonValue>>,
{
    retry_on_conflict!(try_create(dispatcher, tenant_id, input))
}

async fn try_create<S, B>(
    dispatcher: &CommandDispatcher<S, B>,
    tenant_id: TenantId,
    input: &CreatePurchaseOrderInput,
) -> Result<Outcome<PurchaseOrder>, DispatchError>
where
    S: EventStore,
    B: EventBus<EventEnvelope<JsonValue>>,
{
    let mut uow = dispatcher.unit_of_work(tenant_id);
    load_party(&mut uow, input.supplier_id.0, PartyKind::Supplier).await?;

    let items = load_line_items(&mut uow, &input.lines).await?;

    let number = allocate_number(&mut uow, DocumentKind::PurchaseOrder, input.occurred_at).await?;
    let mut order = load_new::<PurchaseOrder, _, _>(&mut uow).await?;
    let order_id = order.id_typed();
    uow.decide(
        &mut order,
        &PurchaseOrderCommand::CreatePurchaseOrder(CreatePurchaseOrder {
            tenant_id,
            order_id,
            number,
            supplier_id: input.supplier_id,
            currency: input.currency.clone(),
            expected_on: input.expected_on,
            notes: input.notes.clone(),
            occurred_at: input.occurred_at,
        }),
    )?;
    add_lines(&mut uow, &mut order, &input.lines, &items, input.occurred_at)?;

    let committed = uow.commit().await?;
    tracing::info!(order_id = %order_id, number = order.number(), "purchase order created");
    Ok(Outcome {
        document: order,
        committed,
    })
}

/// Catalog items of the entered lines; every one must exist and be active.
async fn load_line_items<S, B>(
    uow: &mut UnitOfWork<'_, S, B>,
    lines: &[PurchaseLineInput],
) -> Result<Vec<CatalogItem>, DispatchError>
where
    S: EventStore,
    B: EventBus<EventEnvelope<JsonValue>>,
{
    let mut items = Vec::with_capacity(lines.len());
    for line in lines {
        let item = uow
            .load_existing::<CatalogItem>(line.catalog_item_id.0)
            .await
            .map_err(must_exist("catalog item", line.catalog_item_id.0))?;
        if !item.can_be_used() {
            return Err(DispatchError::InvariantViolation(format!(
                "catalog item {} is archived",
                item.sku()
            )));
        }
        items.push(item);
    }
    Ok(items)
}

fn add_lines<S, B>(
    uow: &mut UnitOfWork<'_, S, B>,
    order: &mut PurchaseOrder,
    lines: &[PurchaseLineInput],
    items: &[CatalogItem],
    occurred_at: DateTime<Utc>,
) -> Result<(), DispatchError>
where
    S: EventStore,
    B: EventBus<EventEnvelope<JsonValue>>,
{
    let tenant_id = uow.tenant_id();
    let order_id = order.id_typed();
    for (line, item) in lines.iter().zip(items) {
        uow.decide(
            order,
            &PurchaseOrderCommand::AddPurchaseLine(AddPurchaseLine {
                tenant_id,
                order_id,
                catalog_item_id: line.catalog_item_id,
                description: line
                    .description
                    .clone()
                    .unwrap_or_else(|| item.name().to_string()),
                quantity: line.quantity,
                unit_cost: line.unit_cost.unwrap_or_else(|| item.cost_price()),
                tax_rate_bps: line.tax_rate_bps.unwrap_or_else(|| item.tax_rate_bps()),
                occurred_at,
            }),
        )?;
    }
    Ok(())
}

#[derive(Debug, Clone)]
pub struct AddPurchaseLinesInput {
    pub order_id: PurchaseOrderId,
    pub lines: Vec<PurchaseLineInput>,
    pub occurred_at: DateTime<Utc>,
}

/// Append lines to a draft purchase order.
#[tracing::instrument(skip(dispatcher, input), fields(tenant_id = %tenant_id, order_id = %input.order_id))]
pub async fn add_purchase_lines<S, B>(
    dispatcher: &CommandDispatcher<S, B>,
    tenant_id: TenantId,
    input: &AddPurchaseLinesInput,
) -> Result<Outcome<PurchaseOrder>, DispatchError>
where
    S: EventStore,
    B: EventBus<EventEnvelope<JsonValue>>,
{
    retry_on_conflict!(try_add_lines(dispatcher, tenant_id, input))
}

async fn try_add_lines<S, B>(
    dispatcher: &CommandDispatcher<S, B>,
    tenant_id: TenantId,
    input: &AddPurchaseLinesInput,
) -> Result<Outcome<PurchaseOrder>, DispatchError>
where
    S: EventStore,
    B: EventBus<EventEnvelope<JsonValue>>,
{
    if input.lines.is_empty() {
        return Err(DispatchError::Validation("no lines to add".to_string()));
    }
    let mut uow = dispatcher.unit_of_work(tenant_id);
    let mut order = uow.load_existing::<PurchaseOrder>(input.order_id.0).await?;
    let items = load_line_items(&mut uow, &input.lines).await?;
    add_lines(&mut uow, &mut order, &input.lines, &items, input.occurred_at)?;

    let committed = uow.commit().await?;
    Ok(Outcome {
        document: order,
        committed,
    })
}

#[derive(Debug, Clone)]
pub struct ReceiveGoodsInput {
    pub order_id: PurchaseOrderId,
    pub receipts: Vec<Receipt>,
    pub occurred_at: DateTime<Utc>,
}

/// The order and every stock item a delivery touched.
#[derive(Debug, Clone)]
pub struct Receiving {
    pub order: PurchaseOrder,
    pub stock: Vec<StockItem>,
    pub committed: Vec<StoredEvent>,
}

/// Book a delivery against a sent order and raise stock of tracked items
/// in the same commit.
#[tracing::instrument(skip(dispatcher, input), fields(tenant_id = %tenant_id, order_id = %input.order_id))]
pub async fn receive_purchase_order<S, B>(
    dispatcher: &CommandDispatcher<S, B>,
    tenant_id: TenantId,
    input: &ReceiveGoodsInput,
) -> Result<Receiving, DispatchError>
where
    S: EventStore,
    B: EventBus<EventEnvelope<JsonValue>>,
{
    retry_on_conflict!(try_receive(dispatcher, tenant_id, input))
}

async fn try_receive<S, B>(
    dispatcher: &CommandDispatcher<S, B>,
    tenant_id: TenantId,
    input: &ReceiveGoodsInput,
) -> Result<Receiving, DispatchError>
where
    S: EventStore,
    B: EventBus<EventEnvelope<JsonValue>>,
{
    let mut uow = dispatcher.unit_of_work(tenant_id);

    let mut order = uow.load_existing::<PurchaseOrder>(input.order_id.0).await?;
    let events = uow.decide(
        &mut order,
        &PurchaseOrderCommand::ReceiveGoods(ReceiveGoods {
            tenant_id,
            order_id: input.order_id,
            receipts: input.receipts.clone(),
            occurred_at: input.occurred_at,
        }),
    )?;

    let mut staged = StagedStock::default();
    for event in &events {
        let PurchaseOrderEvent::GoodsReceived(received) = event else {
            continue;
        };
        for line in &received.lines {
            let item = uow
                .load_existing::<CatalogItem>(line.catalog_item_id.0)
                .await
                .map_err(must_exist("catalog item", line.catalog_item_id.0))?;
            if !item.track_inventory() {
                continue;
            }
            staged
                .adjust(
                    &mut uow,
                    &item,
                    line.quantity,
                    AdjustmentReason::PurchaseReceipt,
                    Some(input.order_id.0),
                    Some(format!("{} line {}", order.number(), line.line_no)),
                    input.occurred_at,
                )
                .await?;
        }
    }

    let committed = uow.commit().await?;
    tracing::info!(
        order = order.number(),
        status = order.status().as_str(),
        "goods received"
    );
    Ok(Receiving {
        order,
        stock: staged.into_items(),
        committed,
    })
}
