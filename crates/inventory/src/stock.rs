use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use bizdesk_catalog::CatalogItemId;
use bizdesk_core::{Aggregate, AggregateId, AggregateRoot, DomainError, Quantity, TenantId};
use bizdesk_events::Event;

/// Stock item identifier.
///
/// There is exactly one stock stream per tracked catalog item, so the id is
/// derived from the tenant and catalog item rather than generated.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct StockItemId(pub AggregateId);

impl StockItemId {
    pub fn new(id: AggregateId) -> Self {
        Self(id)
    }

    pub fn for_catalog_item(tenant_id: TenantId, catalog_item_id: CatalogItemId) -> Self {
        Self(AggregateId::derived(
            tenant_id.as_uuid(),
            &format!("stock:{catalog_item_id}"),
        ))
    }
}

impl core::fmt::Display for StockItemId {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        core::fmt::Display::fmt(&self.0, f)
    }
}

/// Why stock moved.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AdjustmentReason {
    /// Goods received against a purchase order.
    PurchaseReceipt,
    /// Delivered or consumed on a job.
    Issue,
    /// Physical count correction.
    Count,
    Damage,
    Other,
}

/// Aggregate root: StockItem.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StockItem {
    id: StockItemId,
    tenant_id: Option<TenantId>,
    catalog_item_id: Option<CatalogItemId>,
    name: String,
    on_hand: Quantity,
    reorder_level: Quantity,
    version: u64,
    created: bool,
}

impl StockItem {
    /// Create an empty, not-yet-created aggregate instance for rehydration.
    pub fn empty(id: StockItemId) -> Self {
        Self {
            id,
            tenant_id: None,
            catalog_item_id: None,
            name: String::new(),
            on_hand: Quantity::ZERO,
            reorder_level: Quantity::ZERO,
            version: 0,
            created: false,
        }
    }

    pub fn id_typed(&self) -> StockItemId {
        self.id
    }

    pub fn tenant_id(&self) -> Option<TenantId> {
        self.tenant_id
    }

    pub fn is_created(&self) -> bool {
        self.created
    }

    pub fn catalog_item_id(&self) -> Option<CatalogItemId> {
        self.catalog_item_id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn on_hand(&self) -> Quantity {
        self.on_hand
    }

    pub fn reorder_level(&self) -> Quantity {
        self.reorder_level
    }

    pub fn needs_reorder(&self) -> bool {
        self.created && self.on_hand <= self.reorder_level
    }
}

impl AggregateRoot for StockItem {
    type Id = StockItemId;

    fn id(&self) -> &Self::Id {
        &self.id
    }

    fn version(&self) -> u64 {
        self.version
    }
}

/// Command: CreateStockItem.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CreateStockItem {
    pub tenant_id: TenantId,
    pub item_id: StockItemId,
    pub catalog_item_id: CatalogItemId,
    pub name: String,
    #[serde(default)]
    pub reorder_level: Quantity,
    pub occurred_at: DateTime<Utc>,
}

/// Command: AdjustStock.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AdjustStock {
    pub tenant_id: TenantId,
    pub item_id: StockItemId,
    pub delta: Quantity,
    pub reason: AdjustmentReason,
    /// Document that caused the movement, e.g. the purchase order.
    pub reference: Option<AggregateId>,
    pub note: Option<String>,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SetReorderLevel {
    pub tenant_id: TenantId,
    pub item_id: StockItemId,
    pub reorder_level: Quantity,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum InventoryCommand {
    CreateStockItem(CreateStockItem),
    AdjustStock(AdjustStock),
    SetReorderLevel(SetReorderLevel),
}

/// Event: StockItemCreated.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StockItemCreated {
    pub tenant_id: TenantId,
    pub item_id: StockItemId,
    pub catalog_item_id: CatalogItemId,
    pub name: String,
    pub reorder_level: Quantity,
    pub occurred_at: DateTime<Utc>,
}

/// Event: StockAdjusted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StockAdjusted {
    pub tenant_id: TenantId,
    pub item_id: StockItemId,
    pub delta: Quantity,
    pub reason: AdjustmentReason,
    pub reference: Option<AggregateId>,
    pub note: Option<String>,
    pub on_hand_after: Quantity,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReorderLevelSet {
    pub tenant_id: TenantId,
    pub item_id: StockItemId,
    pub reorder_level: Quantity,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum InventoryEvent {
    StockItemCreated(StockItemCreated),
    StockAdjusted(StockAdjusted),
    ReorderLevelSet(ReorderLevelSet),
}

impl Event for InventoryEvent {
    fn event_type(&self) -> &'static str {
        match self {
            InventoryEvent::StockItemCreated(_) => "inventory.stock.created",
            InventoryEvent::StockAdjusted(_) => "inventory.stock.adjusted",
            InventoryEvent::ReorderLevelSet(_) => "inventory.stock.reorder_level_set",
        }
    }

    fn version(&self) -> u32 {
        1
    }

    fn occurred_at(&self) -> DateTime<Utc> {
        match self {
            InventoryEvent::StockItemCreated(e) => e.occurred_at,
            InventoryEvent::StockAdjusted(e) => e.occurred_at,
            InventoryEvent::ReorderLevelSet(e) => e.occurred_at,
        }
    }
}

impl Aggregate for StockItem {
    type Command = InventoryCommand;
    type Event = InventoryEvent;
    type Error = DomainError;

    fn apply(&mut self, event: &Self::Event) {
        match event {
            InventoryEvent::StockItemCreated(e) => {
                self.id = e.item_id;
                self.tenant_id = Some(e.tenant_id);
                self.catalog_item_id = Some(e.catalog_item_id);
                self.name = e.name.clone();
                self.reorder_level = e.reorder_level;
                self.on_hand = Quantity::ZERO;
                self.created = true;
            }
            InventoryEvent::StockAdjusted(e) => {
                self.on_hand = e.on_hand_after;
            }
            InventoryEvent::ReorderLevelSet(e) => {
                self.reorder_level = e.reorder_level;
            }
        }

        self.version += 1;
    }

    fn handle(&self, command: &Self::Command) -> Result<Vec<Self::Event>, Self::Error> {
        match command {
            InventoryCommand::CreateStockItem(cmd) => self.handle_create(cmd),
            InventoryCommand::AdjustStock(cmd) => self.handle_adjust(cmd),
            InventoryCommand::SetReorderLevel(cmd) => self.handle_set_reorder_level(cmd),
        }
    }
}

impl StockItem {
    fn ensure_exists(&self, tenant_id: TenantId, item_id: StockItemId) -> Result<(), DomainError> {
        if !self.created {
            return Err(DomainError::not_found());
        }
        if self.tenant_id != Some(tenant_id) {
            return Err(DomainError::invariant("tenant mismatch"));
        }
        if self.id != item_id {
            return Err(DomainError::invariant("item_id mismatch"));
        }
        Ok(())
    }

    fn handle_create(&self, cmd: &CreateStockItem) -> Result<Vec<InventoryEvent>, DomainError> {
        if self.created {
            return Err(DomainError::conflict("stock item already exists"));
        }
        if cmd.item_id != StockItemId::for_catalog_item(cmd.tenant_id, cmd.catalog_item_id) {
            return Err(DomainError::invariant(
                "stock item id does not belong to this catalog item",
            ));
        }
        if cmd.name.trim().is_empty() {
            return Err(DomainError::validation("name cannot be empty"));
        }
        if cmd.reorder_level.milli() < 0 {
            return Err(DomainError::validation("reorder level cannot be negative"));
        }

        Ok(vec![InventoryEvent::StockItemCreated(StockItemCreated {
            tenant_id: cmd.tenant_id,
            item_id: cmd.item_id,
            catalog_item_id: cmd.catalog_item_id,
            name: cmd.name.trim().to_string(),
            reorder_level: cmd.reorder_level,
            occurred_at: cmd.occurred_at,
        })])
    }

    fn handle_adjust(&self, cmd: &AdjustStock) -> Result<Vec<InventoryEvent>, DomainError> {
        self.ensure_exists(cmd.tenant_id, cmd.item_id)?;

        if cmd.delta == Quantity::ZERO {
            return Err(DomainError::validation("delta cannot be zero"));
        }
        if cmd.reason == AdjustmentReason::PurchaseReceipt && !cmd.delta.is_positive() {
            return Err(DomainError::validation("a receipt must increase stock"));
        }

        let on_hand_after = self
            .on_hand
            .checked_add(cmd.delta)
            .ok_or_else(|| DomainError::invariant("stock overflow"))?;
        if on_hand_after.milli() < 0 {
            return Err(DomainError::invariant(format!(
                "stock cannot go negative (on hand {}, delta {})",
                self.on_hand, cmd.delta
            )));
        }

        Ok(vec![InventoryEvent::StockAdjusted(StockAdjusted {
            tenant_id: cmd.tenant_id,
            item_id: cmd.item_id,
            delta: cmd.delta,
            reason: cmd.reason,
            reference: cmd.reference,
            note: cmd.note.clone(),
            on_hand_after,
            occurred_at: cmd.occurred_at,
        })])
    }

    fn handle_set_reorder_level(&self, cmd: &SetReorderLevel) -> Result<Vec<InventoryEvent>, DomainError> {
        self.ensure_exists(cmd.tenant_id, cmd.item_id)?;

        if cmd.reorder_level.milli() < 0 {
            return Err(DomainError::validation("reorder level cannot be negative"));
        }

        Ok(vec![InventoryEvent::ReorderLevelSet(ReorderLevelSet {
            tenant_id: cmd.tenant_id,
            item_id: cmd.item_id,
            reorder_level: cmd.reorder_level,
            occurred_at: cmd.occurred_at,
        })])
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bizdesk_events::execute;
    use proptest::prelude::*;

    fn created(reorder_level: Quantity) -> (TenantId, StockItemId, StockItem) {
        let tenant_id = TenantId::new();
        let catalog_item_id = CatalogItemId::new(AggregateId::new());
        let item_id = StockItemId::for_catalog_item(tenant_id, catalog_item_id);
        let mut item = StockItem::empty(item_id);
        execute(
            &mut item,
            &InventoryCommand::CreateStockItem(CreateStockItem {
                tenant_id,
                item_id,
                catalog_item_id,
                name: "Copper pipe".to_string(),
                reorder_level,
                occurred_at: Utc::now(),
            }),
        )
        .unwrap();
        (tenant_id, item_id, item)
    }

    fn adjust(tenant_id: TenantId, item_id: StockItemId, delta: Quantity) -> InventoryCommand {
        InventoryCommand::AdjustStock(AdjustStock {
            tenant_id,
            item_id,
            delta,
            reason: if delta.is_positive() {
                AdjustmentReason::PurchaseReceipt
            } else {
                AdjustmentReason::Issue
            },
            reference: None,
            note: None,
            occurred_at: Utc::now(),
        })
    }

    #[test]
    fn id_is_stable_per_tenant_and_item() {
        let tenant = TenantId::new();
        let item = CatalogItemId::new(AggregateId::new());
        assert_eq!(
            StockItemId::for_catalog_item(tenant, item),
            StockItemId::for_catalog_item(tenant, item)
        );
        assert_ne!(
            StockItemId::for_catalog_item(tenant, item),
            StockItemId::for_catalog_item(TenantId::new(), item)
        );
    }

    #[test]
    fn create_rejects_foreign_id() {
        let item = StockItem::empty(StockItemId::new(AggregateId::new()));
        let err = item
            .handle(&InventoryCommand::CreateStockItem(CreateStockItem {
                tenant_id: TenantId::new(),
                item_id: *item.id(),
                catalog_item_id: CatalogItemId::new(AggregateId::new()),
                name: "Widget".to_string(),
                reorder_level: Quantity::ZERO,
                occurred_at: Utc::now(),
            }))
            .unwrap_err();
        assert!(matches!(err, DomainError::InvariantViolation(_)));
    }

    #[test]
    fn stock_never_goes_negative() {
        let (tenant_id, item_id, mut item) = created(Quantity::ZERO);
        execute(&mut item, &adjust(tenant_id, item_id, Quantity::from_units(5))).unwrap();
        let err = item
            .handle(&adjust(tenant_id, item_id, Quantity::from_units(-6)))
            .unwrap_err();
        assert!(matches!(err, DomainError::InvariantViolation(msg) if msg.contains("negative")));
        assert_eq!(item.on_hand(), Quantity::from_units(5));
    }

    #[test]
    fn reorder_flag_follows_level() {
        let (tenant_id, item_id, mut item) = created(Quantity::from_units(3));
        assert!(item.needs_reorder());

        execute(&mut item, &adjust(tenant_id, item_id, Quantity::from_units(10))).unwrap();
        assert!(!item.needs_reorder());

        execute(
            &mut item,
            &InventoryCommand::SetReorderLevel(SetReorderLevel {
                tenant_id,
                item_id,
                reorder_level: Quantity::from_units(10),
                occurred_at: Utc::now(),
            }),
        )
        .unwrap();
        assert!(item.needs_reorder());
    }

    #[test]
    fn tenant_mismatch_is_rejected() {
        let (_, item_id, item) = created(Quantity::ZERO);
        let err = item
            .handle(&adjust(TenantId::new(), item_id, Quantity::from_units(1)))
            .unwrap_err();
        assert!(matches!(err, DomainError::InvariantViolation(msg) if msg.contains("tenant")));
    }

    proptest! {
        #[test]
        fn on_hand_stays_non_negative(deltas in prop::collection::vec(-5_000i64..5_000, 1..40)) {
            let (tenant_id, item_id, mut item) = created(Quantity::ZERO);
            for d in deltas {
                let _ = execute(&mut item, &adjust(tenant_id, item_id, Quantity::from_milli(d)));
                prop_assert!(item.on_hand().milli() >= 0);
            }
        }
    }
}
