use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde_json::Value as JsonValue;

use bizdesk_catalog::{CatalogItem, CatalogItemId};
use bizdesk_core::{AggregateId, Quantity, TenantId};
use bizdesk_events::{EventBus, EventEnvelope};
use bizdesk_inventory::{
    AdjustStock, AdjustmentReason, CreateStockItem, InventoryCommand, StockItem, StockItemId,
};

use super::{Outcome, must_exist, retry_on_conflict};
use crate::command_dispatcher::{CommandDispatcher, DispatchError};
use crate::event_store::EventStore;
use crate::unit_of_work::UnitOfWork;

/// Stock items touched by one unit of work, keyed by stream.
///
/// A delivery may carry the same catalog item on several lines; every
/// adjustment must land on the same staged instance.
#[derive(Debug, Default)]
pub(crate) struct StagedStock {
    items: BTreeMap<StockItemId, StockItem>,
}

impl StagedStock {
    /// Stage `delta` on the stock of `item`, creating the stock item on first use.
    #[allow(clippy::too_many_arguments)]
    pub(crate) async fn adjust<S, B>(
        &mut self,
        uow: &mut UnitOfWork<'_, S, B>,
        item: &CatalogItem,
        delta: Quantity,
        reason: AdjustmentReason,
        reference: Option<AggregateId>,
        note: Option<String>,
        occurred_at: DateTime<Utc>,
    ) -> Result<(), DispatchError>
    where
        S: EventStore,
        B: EventBus<EventEnvelope<JsonValue>>,
    {
        if !item.track_inventory() {
            return Err(DispatchError::InvariantViolation(format!(
                "catalog item {} does not track inventory",
                item.sku()
            )));
        }
        let tenant_id = uow.tenant_id();
        let catalog_item_id = item.id_typed();
        let stock_id = StockItemId::for_catalog_item(tenant_id, catalog_item_id);

        if !self.items.contains_key(&stock_id) {
            let mut stock = uow.load::<StockItem>(stock_id.0).await?;
            if !stock.is_created() {
                uow.decide(
                    &mut stock,
                    &InventoryCommand::CreateStockItem(CreateStockItem {
                        tenant_id,
                        item_id: stock_id,
                        catalog_item_id,
                        name: item.name().to_string(),
                        reorder_level: Quantity::ZERO,
                        occurred_at,
                    }),
                )?;
            }
            self.items.insert(stock_id, stock);
        }
        let Some(stock) = self.items.get_mut(&stock_id) else {
            return Err(DispatchError::InvariantViolation("stock item not staged".to_string()));
        };

        uow.decide(
            stock,
            &InventoryCommand::AdjustStock(AdjustStock {
                tenant_id,
                item_id: stock_id,
                delta,
                reason,
                reference,
                note,
                occurred_at,
            }),
        )?;
        Ok(())
    }

    pub(crate) fn into_items(self) -> Vec<StockItem> {
        self.items.into_values().collect()
    }
}

#[derive(Debug, Clone)]
pub struct AdjustStockInput {
    pub catalog_item_id: CatalogItemId,
    pub delta: Quantity,
    pub reason: AdjustmentReason,
    pub note: Option<String>,
    pub occurred_at: DateTime<Utc>,
}

/// Manual stock correction (count, damage, issue) for a tracked catalog item.
#[tracing::instrument(skip(dispatcher, input), fields(tenant_id = %tenant_id, catalog_item_id = %input.catalog_item_id))]
pub async fn adjust_stock<S, B>(
    dispatcher: &CommandDispatcher<S, B>,
    tenant_id: TenantId,
    input: &AdjustStockInput,
) -> Result<Outcome<StockItem>, DispatchError>
where
    S: EventStore,
    B: EventBus<EventEnvelope<JsonValue>>,
{
    retry_on_conflict!(try_adjust(dispatcher, tenant_id, input))
}

async fn try_adjust<S, B>(
    dispatcher: &CommandDispatcher<S, B>,
    tenant_id: TenantId,
    input: &AdjustStockInput,
) -> Result<Outcome<StockItem>, DispatchError>
where
    S: EventStore,
    B: EventBus<EventEnvelope<JsonValue>>,
{
    let mut uow = dispatcher.unit_of_work(tenant_id);
    let item = uow
        .load_existing::<CatalogItem>(input.catalog_item_id.0)
        .await
        .map_err(must_exist("catalog item", input.catalog_item_id.0))?;

    let mut staged = StagedStock::default();
    staged
        .adjust(
            &mut uow,
            &item,
            input.delta,
            input.reason,
            None,
            input.note.clone(),
            input.occurred_at,
        )
        .await?;

    let committed = uow.commit().await?;
    let document = staged
        .into_items()
        .into_iter()
        .next()
        .ok_or_else(|| DispatchError::InvariantViolation("stock item not staged".to_string()))?;
    Ok(Outcome {
        document,
        committed,
    })
}
