use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use bizdesk_core::{
    Aggregate, AggregateId, AggregateRoot, BPS_SCALE, DomainError, Quantity, TenantId,
};
use bizdesk_events::Event;

use crate::pricing::PricedLine;

#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CatalogItemId(pub AggregateId);

impl CatalogItemId {
    pub fn new(id: AggregateId) -> Self {
        Self(id)
    }
}

impl core::fmt::Display for CatalogItemId {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        core::fmt::Display::fmt(&self.0, f)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CatalogItemStatus {
    Active,
    Archived,
}

/// Aggregate root: a product or service that can be put on a document.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CatalogItem {
    id: CatalogItemId,
    tenant_id: Option<TenantId>,
    sku: String,
    name: String,
    description: Option<String>,
    unit: String,
    unit_price: u64,
    cost_price: u64,
    tax_rate_bps: u32,
    track_inventory: bool,
    status: CatalogItemStatus,
    version: u64,
    created: bool,
}

impl CatalogItem {
    pub fn empty(id: CatalogItemId) -> Self {
        Self {
            id,
            tenant_id: None,
            sku: String::new(),
            name: String::new(),
            description: None,
            unit: String::new(),
            unit_price: 0,
            cost_price: 0,
            tax_rate_bps: 0,
            track_inventory: false,
            status: CatalogItemStatus::Active,
            version: 0,
            created: false,
        }
    }

    pub fn id_typed(&self) -> CatalogItemId {
        self.id
    }

    pub fn tenant_id(&self) -> Option<TenantId> {
        self.tenant_id
    }

    pub fn is_created(&self) -> bool {
        self.created
    }

    pub fn sku(&self) -> &str {
        &self.sku
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn description(&self) -> Option<&str> {
        self.description.as_deref()
    }

    pub fn unit(&self) -> &str {
        &self.unit
    }

    pub fn unit_price(&self) -> u64 {
        self.unit_price
    }

    pub fn cost_price(&self) -> u64 {
        self.cost_price
    }

    pub fn tax_rate_bps(&self) -> u32 {
        self.tax_rate_bps
    }

    pub fn track_inventory(&self) -> bool {
        self.track_inventory
    }

    pub fn status(&self) -> CatalogItemStatus {
        self.status
    }

    /// Archived items cannot be quoted, invoiced or purchased.
    pub fn can_be_used(&self) -> bool {
        self.created && self.status == CatalogItemStatus::Active
    }

    /// A sales line priced from this item's current list price and tax rate.
    pub fn sales_line(
        &self,
        line_no: u32,
        quantity: Quantity,
        discount_bps: u32,
    ) -> Result<PricedLine, DomainError> {
        if !self.can_be_used() {
            return Err(DomainError::invariant(format!(
                "catalog item {} is not available",
                self.sku
            )));
        }
        let line = PricedLine {
            line_no,
            catalog_item_id: Some(self.id),
            description: self.name.clone(),
            quantity,
            unit_price: self.unit_price,
            discount_bps,
            tax_rate_bps: self.tax_rate_bps,
        };
        line.validate()?;
        Ok(line)
    }
}

impl AggregateRoot for CatalogItem {
    type Id = CatalogItemId;

    fn id(&self) -> &Self::Id {
        &self.id
    }

    fn version(&self) -> u64 {
        self.version
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CreateCatalogItem {
    pub tenant_id: TenantId,
    pub item_id: CatalogItemId,
    pub sku: String,
    pub name: String,
    pub description: Option<String>,
    /// Unit of measure shown on documents ("h", "pcs", "m²").
    pub unit: String,
    pub unit_price: u64,
    pub cost_price: u64,
    pub tax_rate_bps: u32,
    pub track_inventory: bool,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UpdatePricing {
    pub tenant_id: TenantId,
    pub item_id: CatalogItemId,
    pub unit_price: Option<u64>,
    pub cost_price: Option<u64>,
    pub tax_rate_bps: Option<u32>,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ArchiveCatalogItem {
    pub tenant_id: TenantId,
    pub item_id: CatalogItemId,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReactivateCatalogItem {
    pub tenant_id: TenantId,
    pub item_id: CatalogItemId,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum CatalogItemCommand {
    CreateCatalogItem(CreateCatalogItem),
    UpdatePricing(UpdatePricing),
    ArchiveCatalogItem(ArchiveCatalogItem),
    ReactivateCatalogItem(ReactivateCatalogItem),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CatalogItemCreated {
    pub tenant_id: TenantId,
    pub item_id: CatalogItemId,
    pub sku: String,
    pub name: String,
    pub description: Option<String>,
    pub unit: String,
    pub unit_price: u64,
    pub cost_price: u64,
    pub tax_rate_bps: u32,
    pub track_inventory: bool,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PricingUpdated {
    pub tenant_id: TenantId,
    pub item_id: CatalogItemId,
    pub unit_price: u64,
    pub cost_price: u64,
    pub tax_rate_bps: u32,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CatalogItemArchived {
    pub tenant_id: TenantId,
    pub item_id: CatalogItemId,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CatalogItemReactivated {
    pub tenant_id: TenantId,
    pub item_id: CatalogItemId,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum CatalogItemEvent {
    CatalogItemCreated(CatalogItemCreated),
    PricingUpdated(PricingUpdated),
    CatalogItemArchived(CatalogItemArchived),
    CatalogItemReactivated(CatalogItemReactivated),
}

impl Event for CatalogItemEvent {
    fn event_type(&self) -> &'static str {
        match self {
            CatalogItemEvent::CatalogItemCreated(_) => "catalog.item.created",
            CatalogItemEvent::PricingUpdated(_) => "catalog.item.pricing_updated",
            CatalogItemEvent::CatalogItemArchived(_) => "catalog.item.archived",
            CatalogItemEvent::CatalogItemReactivated(_) => "catalog.item.reactivated",
        }
    }

    fn version(&self) -> u32 {
        1
    }

    fn occurred_at(&self) -> DateTime<Utc> {
        match self {
            CatalogItemEvent::CatalogItemCreated(e) => e.occurred_at,
            CatalogItemEvent::PricingUpdated(e) => e.occurred_at,
            CatalogItemEvent::CatalogItemArchived(e) => e.occurred_at,
            CatalogItemEvent::CatalogItemReactivated(e) => e.occurred_at,
        }
    }
}

impl Aggregate for CatalogItem {
    type Command = CatalogItemCommand;
    type Event = CatalogItemEvent;
    type Error = DomainError;

    fn apply(&mut self, event: &Self::Event) {
        match event {
            CatalogItemEvent::CatalogItemCreated(e) => {
                self.id = e.item_id;
                self.tenant_id = Some(e.tenant_id);
                self.sku = e.sku.clone();
                self.name = e.name.clone();
                self.description = e.description.clone();
                self.unit = e.unit.clone();
                self.unit_price = e.unit_price;
                self.cost_price = e.cost_price;
                self.tax_rate_bps = e.tax_rate_bps;
                self.track_inventory = e.track_inventory;
                self.status = CatalogItemStatus::Active;
                self.created = true;
            }
            CatalogItemEvent::PricingUpdated(e) => {
                self.unit_price = e.unit_price;
                self.cost_price = e.cost_price;
                self.tax_rate_bps = e.tax_rate_bps;
            }
            CatalogItemEvent::CatalogItemArchived(_) => {
                self.status = CatalogItemStatus::Archived;
            }
            CatalogItemEvent::CatalogItemReactivated(_) => {
                self.status = CatalogItemStatus::Active;
            }
        }

        self.version += 1;
    }

    fn handle(&self, command: &Self::Command) -> Result<Vec<Self::Event>, Self::Error> {
        match command {
            CatalogItemCommand::CreateCatalogItem(cmd) => self.handle_create(cmd),
            CatalogItemCommand::UpdatePricing(cmd) => self.handle_update_pricing(cmd),
            CatalogItemCommand::ArchiveCatalogItem(cmd) => self.handle_archive(cmd),
            CatalogItemCommand::ReactivateCatalogItem(cmd) => self.handle_reactivate(cmd),
        }
    }
}

fn validate_sku(sku: &str) -> Result<(), DomainError> {
    let ok_len = (1..=32).contains(&sku.len());
    let ok_chars = sku
        .chars()
        .all(|c| c.is_ascii_uppercase() || c.is_ascii_digit() || c == '-' || c == '_');
    if ok_len && ok_chars {
        Ok(())
    } else {
        Err(DomainError::validation(format!(
            "sku '{sku}' must be 1-32 chars of A-Z, 0-9, '-' or '_'"
        )))
    }
}

fn validate_tax_rate(bps: u32) -> Result<(), DomainError> {
    if u64::from(bps) > BPS_SCALE {
        return Err(DomainError::validation("tax rate cannot exceed 100%"));
    }
    Ok(())
}

impl CatalogItem {
    fn ensure_exists(&self, tenant_id: TenantId, item_id: CatalogItemId) -> Result<(), DomainError> {
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

    fn handle_create(&self, cmd: &CreateCatalogItem) -> Result<Vec<CatalogItemEvent>, DomainError> {
        if self.created {
            return Err(DomainError::conflict("catalog item already exists"));
        }
        validate_sku(&cmd.sku)?;
        if cmd.name.trim().is_empty() {
            return Err(DomainError::validation("name cannot be empty"));
        }
        if cmd.unit.trim().is_empty() {
            return Err(DomainError::validation("unit cannot be empty"));
        }
        if cmd.unit_price == 0 {
            return Err(DomainError::validation("unit price must be positive"));
        }
        validate_tax_rate(cmd.tax_rate_bps)?;

        Ok(vec![CatalogItemEvent::CatalogItemCreated(CatalogItemCreated {
            tenant_id: cmd.tenant_id,
            item_id: cmd.item_id,
            sku: cmd.sku.clone(),
            name: cmd.name.trim().to_string(),
            description: cmd.description.clone(),
            unit: cmd.unit.trim().to_string(),
            unit_price: cmd.unit_price,
            cost_price: cmd.cost_price,
            tax_rate_bps: cmd.tax_rate_bps,
            track_inventory: cmd.track_inventory,
            occurred_at: cmd.occurred_at,
        })])
    }

    fn handle_update_pricing(&self, cmd: &UpdatePricing) -> Result<Vec<CatalogItemEvent>, DomainError> {
        self.ensure_exists(cmd.tenant_id, cmd.item_id)?;
        if self.status == CatalogItemStatus::Archived {
            return Err(DomainError::invariant("cannot reprice an archived item"));
        }

        let unit_price = cmd.unit_price.unwrap_or(self.unit_price);
        let cost_price = cmd.cost_price.unwrap_or(self.cost_price);
        let tax_rate_bps = cmd.tax_rate_bps.unwrap_or(self.tax_rate_bps);
        if unit_price == 0 {
            return Err(DomainError::validation("unit price must be positive"));
        }
        validate_tax_rate(tax_rate_bps)?;

        Ok(vec![CatalogItemEvent::PricingUpdated(PricingUpdated {
            tenant_id: cmd.tenant_id,
            item_id: cmd.item_id,
            unit_price,
            cost_price,
            tax_rate_bps,
            occurred_at: cmd.occurred_at,
        })])
    }

    fn handle_archive(&self, cmd: &ArchiveCatalogItem) -> Result<Vec<CatalogItemEvent>, DomainError> {
        self.ensure_exists(cmd.tenant_id, cmd.item_id)?;
        if self.status == CatalogItemStatus::Archived {
            return Err(DomainError::conflict("catalog item is already archived"));
        }
        Ok(vec![CatalogItemEvent::CatalogItemArchived(CatalogItemArchived {
            tenant_id: cmd.tenant_id,
            item_id: cmd.item_id,
            occurred_at: cmd.occurred_at,
        })])
    }

    fn handle_reactivate(&self, cmd: &ReactivateCatalogItem) -> Result<Vec<CatalogItemEvent>, DomainError> {
        self.ensure_exists(cmd.tenant_id, cmd.item_id)?;
        if self.status == CatalogItemStatus::Active {
            return Err(DomainError::conflict("catalog item is already active"));
        }
        Ok(vec![CatalogItemEvent::CatalogItemReactivated(CatalogItemReactivated {
            tenant_id: cmd.tenant_id,
            item_id: cmd.item_id,
            occurred_at: cmd.occurred_at,
        })])
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bizdesk_events::execute;
    use proptest::prelude::*;

    fn test_tenant_id() -> TenantId {
        TenantId::new()
    }

    fn test_item_id() -> CatalogItemId {
        CatalogItemId::new(AggregateId::new())
    }

    fn create_cmd(tenant_id: TenantId, item_id: CatalogItemId, sku: &str) -> CreateCatalogItem {
        CreateCatalogItem {
            tenant_id,
            item_id,
            sku: sku.to_string(),
            name: "Consulting hour".to_string(),
            description: None,
            unit: "h".to_string(),
            unit_price: 12_000,
            cost_price: 0,
            tax_rate_bps: 2000,
            track_inventory: false,
            occurred_at: Utc::now(),
        }
    }

    fn created(tenant_id: TenantId, item_id: CatalogItemId) -> CatalogItem {
        let mut item = CatalogItem::empty(item_id);
        execute(
            &mut item,
            &CatalogItemCommand::CreateCatalogItem(create_cmd(tenant_id, item_id, "SVC-CONSULT")),
        )
        .unwrap();
        item
    }

    #[test]
    fn create_sets_pricing() {
        let item = created(test_tenant_id(), test_item_id());
        assert_eq!(item.sku(), "SVC-CONSULT");
        assert_eq!(item.unit_price(), 12_000);
        assert_eq!(item.tax_rate_bps(), 2000);
        assert!(item.can_be_used());
        assert_eq!(item.version(), 1);
    }

    #[test]
    fn create_rejects_bad_sku() {
        let item = CatalogItem::empty(test_item_id());
        let too_long = "X".repeat(33);
        for sku in ["", "lower", "HAS SPACE", too_long.as_str()] {
            let err = item
                .handle(&CatalogItemCommand::CreateCatalogItem(create_cmd(
                    test_tenant_id(),
                    test_item_id(),
                    sku,
                )))
                .unwrap_err();
            assert!(matches!(err, DomainError::Validation(msg) if msg.contains("sku")));
        }
    }

    #[test]
    fn update_pricing_keeps_unspecified_fields() {
        let tenant_id = test_tenant_id();
        let item_id = test_item_id();
        let mut item = created(tenant_id, item_id);

        execute(
            &mut item,
            &CatalogItemCommand::UpdatePricing(UpdatePricing {
                tenant_id,
                item_id,
                unit_price: Some(15_000),
                cost_price: None,
                tax_rate_bps: None,
                occurred_at: Utc::now(),
            }),
        )
        .unwrap();

        assert_eq!(item.unit_price(), 15_000);
        assert_eq!(item.tax_rate_bps(), 2000);
    }

    #[test]
    fn archived_item_cannot_be_used_or_repriced() {
        let tenant_id = test_tenant_id();
        let item_id = test_item_id();
        let mut item = created(tenant_id, item_id);

        execute(
            &mut item,
            &CatalogItemCommand::ArchiveCatalogItem(ArchiveCatalogItem {
                tenant_id,
                item_id,
                occurred_at: Utc::now(),
            }),
        )
        .unwrap();

        assert!(!item.can_be_used());
        assert!(item.sales_line(1, Quantity::from_units(1), 0).is_err());
        let err = item
            .handle(&CatalogItemCommand::UpdatePricing(UpdatePricing {
                tenant_id,
                item_id,
                unit_price: Some(1),
                cost_price: None,
                tax_rate_bps: None,
                occurred_at: Utc::now(),
            }))
            .unwrap_err();
        assert!(matches!(err, DomainError::InvariantViolation(_)));

        execute(
            &mut item,
            &CatalogItemCommand::ReactivateCatalogItem(ReactivateCatalogItem {
                tenant_id,
                item_id,
                occurred_at: Utc::now(),
            }),
        )
        .unwrap();
        assert!(item.can_be_used());
    }

    #[test]
    fn sales_line_copies_price_and_tax() {
        let item = created(test_tenant_id(), test_item_id());
        let line = item.sales_line(3, Quantity::from_milli(2500), 500).unwrap();

        assert_eq!(line.line_no, 3);
        assert_eq!(line.catalog_item_id, Some(item.id_typed()));
        assert_eq!(line.unit_price, 12_000);
        assert_eq!(line.tax_rate_bps, 2000);
        assert_eq!(line.discount_bps, 500);
        assert_eq!(line.gross().unwrap(), 30_000);
    }

    #[test]
    fn commands_on_missing_item_are_not_found() {
        let item = CatalogItem::empty(test_item_id());
        let err = item
            .handle(&CatalogItemCommand::ArchiveCatalogItem(ArchiveCatalogItem {
                tenant_id: test_tenant_id(),
                item_id: *item.id(),
                occurred_at: Utc::now(),
            }))
            .unwrap_err();
        assert_eq!(err, DomainError::NotFound);
    }

    proptest! {
        #![proptest_config(ProptestConfig {
            cases: 200,
            .. ProptestConfig::default()
        })]

        #[test]
        fn handle_does_not_mutate(sku in "[A-Z0-9_-]{1,32}") {
            let item = CatalogItem::empty(test_item_id());
            let before = item.clone();
            let cmd = CatalogItemCommand::CreateCatalogItem(create_cmd(test_tenant_id(), test_item_id(), &sku));

            let first = item.handle(&cmd);
            let second = item.handle(&cmd);

            prop_assert_eq!(&item, &before);
            prop_assert_eq!(first, second);
        }
    }
}
