use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use bizdesk_catalog::{CatalogItemId, DocumentTotals, PricedLine, compute_totals};
use bizdesk_core::{Aggregate, AggregateId, AggregateRoot, DomainError, Quantity, TenantId, validate_currency};
use bizdesk_events::Event;
use bizdesk_parties::PartyId;

/// Purchase order identifier (tenant-scoped via `tenant_id` fields in events/commands).
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PurchaseOrderId(pub AggregateId);

impl PurchaseOrderId {
    pub fn new(id: AggregateId) -> Self {
        Self(id)
    }
}

impl core::fmt::Display for PurchaseOrderId {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        core::fmt::Display::fmt(&self.0, f)
    }
}

/// Purchase order status lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PurchaseOrderStatus {
    Draft,
    Approved,
    Sent,
    PartiallyReceived,
    Received,
    Closed,
    Cancelled,
}

impl PurchaseOrderStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            PurchaseOrderStatus::Draft => "draft",
            PurchaseOrderStatus::Approved => "approved",
            PurchaseOrderStatus::Sent => "sent",
            PurchaseOrderStatus::PartiallyReceived => "partially_received",
            PurchaseOrderStatus::Received => "received",
            PurchaseOrderStatus::Closed => "closed",
            PurchaseOrderStatus::Cancelled => "cancelled",
        }
    }

    fn accepts_receipts(self) -> bool {
        matches!(
            self,
            PurchaseOrderStatus::Sent | PurchaseOrderStatus::PartiallyReceived
        )
    }
}

/// Purchase order line: what was ordered and how much has arrived.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PurchaseLine {
    pub line_no: u32,
    pub catalog_item_id: CatalogItemId,
    pub description: String,
    pub quantity: Quantity,
    pub unit_cost: u64,
    #[serde(default)]
    pub tax_rate_bps: u32,
    #[serde(default)]
    pub received: Quantity,
}

impl PurchaseLine {
    pub fn outstanding(&self) -> Quantity {
        self.quantity.checked_sub(self.received).unwrap_or(Quantity::ZERO)
    }

    pub fn is_fully_received(&self) -> bool {
        self.received >= self.quantity
    }

    /// Same line in the shared pricing shape, for totals and rendering.
    pub fn priced(&self) -> PricedLine {
        PricedLine {
            line_no: self.line_no,
            catalog_item_id: Some(self.catalog_item_id),
            description: self.description.clone(),
            quantity: self.quantity,
            unit_price: self.unit_cost,
            discount_bps: 0,
            tax_rate_bps: self.tax_rate_bps,
        }
    }
}

/// One `(line_no, quantity)` pair of a delivery.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Receipt {
    pub line_no: u32,
    pub quantity: Quantity,
}

/// A receipt resolved against the order, carrying the catalog item so the
/// stock side can be updated without reloading the order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReceivedLine {
    pub line_no: u32,
    pub catalog_item_id: CatalogItemId,
    pub quantity: Quantity,
}

/// Aggregate root: PurchaseOrder.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PurchaseOrder {
    id: PurchaseOrderId,
    tenant_id: Option<TenantId>,
    number: String,
    supplier_id: Option<PartyId>,
    currency: String,
    expected_on: Option<NaiveDate>,
    notes: Option<String>,
    status: PurchaseOrderStatus,
    lines: Vec<PurchaseLine>,
    totals: DocumentTotals,
    version: u64,
    created: bool,
}

impl PurchaseOrder {
    /// Create an empty, not-yet-created aggregate instance for rehydration.
    pub fn empty(id: PurchaseOrderId) -> Self {
        Self {
            id,
            tenant_id: None,
            number: String::new(),
            supplier_id: None,
            currency: String::new(),
            expected_on: None,
            notes: None,
            status: PurchaseOrderStatus::Draft,
            lines: Vec::new(),
            totals: DocumentTotals::default(),
            version: 0,
            created: false,
        }
    }

    pub fn id_typed(&self) -> PurchaseOrderId {
        self.id
    }

    pub fn tenant_id(&self) -> Option<TenantId> {
        self.tenant_id
    }

    pub fn is_created(&self) -> bool {
        self.created
    }

    pub fn number(&self) -> &str {
        &self.number
    }

    pub fn supplier_id(&self) -> Option<PartyId> {
        self.supplier_id
    }

    pub fn currency(&self) -> &str {
        &self.currency
    }

    pub fn expected_on(&self) -> Option<NaiveDate> {
        self.expected_on
    }

    pub fn notes(&self) -> Option<&str> {
        self.notes.as_deref()
    }

    pub fn status(&self) -> PurchaseOrderStatus {
        self.status
    }

    pub fn lines(&self) -> &[PurchaseLine] {
        &self.lines
    }

    pub fn totals(&self) -> DocumentTotals {
        self.totals
    }

    pub fn priced_lines(&self) -> Vec<PricedLine> {
        self.lines.iter().map(PurchaseLine::priced).collect()
    }

    fn recompute_totals(&mut self) {
        // Lines were validated on the way in.
        self.totals = compute_totals(&self.priced_lines()).unwrap_or_default();
    }
}

impl AggregateRoot for PurchaseOrder {
    type Id = PurchaseOrderId;

    fn id(&self) -> &Self::Id {
        &self.id
    }

    fn version(&self) -> u64 {
        self.version
    }
}

/// Command: CreatePurchaseOrder.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CreatePurchaseOrder {
    pub tenant_id: TenantId,
    pub order_id: PurchaseOrderId,
    /// Allocated from the tenant's purchase order sequence.
    pub number: String,
    pub supplier_id: PartyId,
    pub currency: String,
    pub expected_on: Option<NaiveDate>,
    pub notes: Option<String>,
    pub occurred_at: DateTime<Utc>,
}

/// Command: AddPurchaseLine (only allowed in Draft).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AddPurchaseLine {
    pub tenant_id: TenantId,
    pub order_id: PurchaseOrderId,
    pub catalog_item_id: CatalogItemId,
    pub description: String,
    pub quantity: Quantity,
    pub unit_cost: u64,
    #[serde(default)]
    pub tax_rate_bps: u32,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RemovePurchaseLine {
    pub tenant_id: TenantId,
    pub order_id: PurchaseOrderId,
    pub line_no: u32,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ApprovePurchaseOrder {
    pub tenant_id: TenantId,
    pub order_id: PurchaseOrderId,
    pub approved_by: Option<String>,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SendPurchaseOrder {
    pub tenant_id: TenantId,
    pub order_id: PurchaseOrderId,
    pub occurred_at: DateTime<Utc>,
}

/// Command: ReceiveGoods. May be partial; repeated deliveries accumulate.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReceiveGoods {
    pub tenant_id: TenantId,
    pub order_id: PurchaseOrderId,
    pub receipts: Vec<Receipt>,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CancelPurchaseOrder {
    pub tenant_id: TenantId,
    pub order_id: PurchaseOrderId,
    pub reason: Option<String>,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClosePurchaseOrder {
    pub tenant_id: TenantId,
    pub order_id: PurchaseOrderId,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum PurchaseOrderCommand {
    CreatePurchaseOrder(CreatePurchaseOrder),
    AddPurchaseLine(AddPurchaseLine),
    RemovePurchaseLine(RemovePurchaseLine),
    ApprovePurchaseOrder(ApprovePurchaseOrder),
    SendPurchaseOrder(SendPurchaseOrder),
    ReceiveGoods(ReceiveGoods),
    CancelPurchaseOrder(CancelPurchaseOrder),
    ClosePurchaseOrder(ClosePurchaseOrder),
}

/// Event: PurchaseOrderCreated.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PurchaseOrderCreated {
    pub tenant_id: TenantId,
    pub order_id: PurchaseOrderId,
    pub number: String,
    pub supplier_id: PartyId,
    pub currency: String,
    pub expected_on: Option<NaiveDate>,
    pub notes: Option<String>,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PurchaseLineAdded {
    pub tenant_id: TenantId,
    pub order_id: PurchaseOrderId,
    pub line: PurchaseLine,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PurchaseLineRemoved {
    pub tenant_id: TenantId,
    pub order_id: PurchaseOrderId,
    pub line_no: u32,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PurchaseOrderApproved {
    pub tenant_id: TenantId,
    pub order_id: PurchaseOrderId,
    pub approved_by: Option<String>,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PurchaseOrderSent {
    pub tenant_id: TenantId,
    pub order_id: PurchaseOrderId,
    pub occurred_at: DateTime<Utc>,
}

/// Event: GoodsReceived.
///
/// Carries the catalog item per line so the stock items of tracked products
/// can be increased in the same commit.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GoodsReceived {
    pub tenant_id: TenantId,
    pub order_id: PurchaseOrderId,
    pub supplier_id: PartyId,
    pub lines: Vec<ReceivedLine>,
    /// True when this delivery completed every line.
    pub fully_received: bool,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PurchaseOrderCancelled {
    pub tenant_id: TenantId,
    pub order_id: PurchaseOrderId,
    pub reason: Option<String>,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PurchaseOrderClosed {
    pub tenant_id: TenantId,
    pub order_id: PurchaseOrderId,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum PurchaseOrderEvent {
    PurchaseOrderCreated(PurchaseOrderCreated),
    PurchaseLineAdded(PurchaseLineAdded),
    PurchaseLineRemoved(PurchaseLineRemoved),
    PurchaseOrderApproved(PurchaseOrderApproved),
    PurchaseOrderSent(PurchaseOrderSent),
    GoodsReceived(GoodsReceived),
    PurchaseOrderCancelled(PurchaseOrderCancelled),
    PurchaseOrderClosed(PurchaseOrderClosed),
}

impl Event for PurchaseOrderEvent {
    fn event_type(&self) -> &'static str {
        match self {
            PurchaseOrderEvent::PurchaseOrderCreated(_) => "purchasing.order.created",
            PurchaseOrderEvent::PurchaseLineAdded(_) => "purchasing.order.line_added",
            PurchaseOrderEvent::PurchaseLineRemoved(_) => "purchasing.order.line_removed",
            PurchaseOrderEvent::PurchaseOrderApproved(_) => "purchasing.order.approved",
            PurchaseOrderEvent::PurchaseOrderSent(_) => "purchasing.order.sent",
            PurchaseOrderEvent::GoodsReceived(_) => "purchasing.order.goods_received",
            PurchaseOrderEvent::PurchaseOrderCancelled(_) => "purchasing.order.cancelled",
            PurchaseOrderEvent::PurchaseOrderClosed(_) => "purchasing.order.closed",
        }
    }

    fn version(&self) -> u32 {
        1
    }

    fn occurred_at(&self) -> DateTime<Utc> {
        match self {
            PurchaseOrderEvent::PurchaseOrderCreated(e) => e.occurred_at,
            PurchaseOrderEvent::PurchaseLineAdded(e) => e.occurred_at,
            PurchaseOrderEvent::PurchaseLineRemoved(e) => e.occurred_at,
            PurchaseOrderEvent::PurchaseOrderApproved(e) => e.occurred_at,
            PurchaseOrderEvent::PurchaseOrderSent(e) => e.occurred_at,
            PurchaseOrderEvent::GoodsReceived(e) => e.occurred_at,
            PurchaseOrderEvent::PurchaseOrderCancelled(e) => e.occurred_at,
            PurchaseOrderEvent::PurchaseOrderClosed(e) => e.occurred_at,
        }
    }
}

impl Aggregate for PurchaseOrder {
    type Command = PurchaseOrderCommand;
    type Event = PurchaseOrderEvent;
    type Error = DomainError;

    fn apply(&mut self, event: &Self::Event) {
        match event {
            PurchaseOrderEvent::PurchaseOrderCreated(e) => {
                self.id = e.order_id;
                self.tenant_id = Some(e.tenant_id);
                self.number = e.number.clone();
                self.supplier_id = Some(e.supplier_id);
                self.currency = e.currency.clone();
                self.expected_on = e.expected_on;
                self.notes = e.notes.clone();
                self.status = PurchaseOrderStatus::Draft;
                self.lines.clear();
                self.totals = DocumentTotals::default();
                self.created = true;
            }
            PurchaseOrderEvent::PurchaseLineAdded(e) => {
                self.lines.push(e.line.clone());
                self.recompute_totals();
            }
            PurchaseOrderEvent::PurchaseLineRemoved(e) => {
                self.lines.retain(|l| l.line_no != e.line_no);
                self.recompute_totals();
            }
            PurchaseOrderEvent::PurchaseOrderApproved(_) => {
                self.status = PurchaseOrderStatus::Approved;
            }
            PurchaseOrderEvent::PurchaseOrderSent(_) => {
                self.status = PurchaseOrderStatus::Sent;
            }
            PurchaseOrderEvent::GoodsReceived(e) => {
                for received in &e.lines {
                    if let Some(line) = self.lines.iter_mut().find(|l| l.line_no == received.line_no) {
                        line.received = line
                            .received
                            .checked_add(received.quantity)
                            .unwrap_or(line.quantity);
                    }
                }
                self.status = if e.fully_received {
                    PurchaseOrderStatus::Received
                } else {
                    PurchaseOrderStatus::PartiallyReceived
                };
            }
            PurchaseOrderEvent::PurchaseOrderCancelled(_) => {
                self.status = PurchaseOrderStatus::Cancelled;
            }
            PurchaseOrderEvent::PurchaseOrderClosed(_) => {
                self.status = PurchaseOrderStatus::Closed;
            }
        }

        self.version += 1;
    }

    fn handle(&self, command: &Self::Command) -> Result<Vec<Self::Event>, Self::Error> {
        match command {
            PurchaseOrderCommand::CreatePurchaseOrder(cmd) => self.handle_create(cmd),
            PurchaseOrderCommand::AddPurchaseLine(cmd) => self.handle_add_line(cmd),
            PurchaseOrderCommand::RemovePurchaseLine(cmd) => self.handle_remove_line(cmd),
            PurchaseOrderCommand::ApprovePurchaseOrder(cmd) => self.handle_approve(cmd),
            PurchaseOrderCommand::SendPurchaseOrder(cmd) => self.handle_send(cmd),
            PurchaseOrderCommand::ReceiveGoods(cmd) => self.handle_receive(cmd),
            PurchaseOrderCommand::CancelPurchaseOrder(cmd) => self.handle_cancel(cmd),
            PurchaseOrderCommand::ClosePurchaseOrder(cmd) => self.handle_close(cmd),
        }
    }
}

impl PurchaseOrder {
    fn ensure_exists(&self, tenant_id: TenantId, order_id: PurchaseOrderId) -> Result<(), DomainError> {
        if !self.created {
            return Err(DomainError::not_found());
        }
        if self.tenant_id != Some(tenant_id) {
            return Err(DomainError::invariant("tenant mismatch"));
        }
        if self.id != order_id {
            return Err(DomainError::invariant("order_id mismatch"));
        }
        Ok(())
    }

    fn ensure_draft(&self) -> Result<(), DomainError> {
        if self.status != PurchaseOrderStatus::Draft {
            return Err(DomainError::invariant(
                "cannot modify purchase order once approved",
            ));
        }
        Ok(())
    }

    fn handle_create(
        &self,
        cmd: &CreatePurchaseOrder,
    ) -> Result<Vec<PurchaseOrderEvent>, DomainError> {
        if self.created {
            return Err(DomainError::conflict("purchase order already exists"));
        }
        if cmd.number.trim().is_empty() {
            return Err(DomainError::validation("purchase order number cannot be empty"));
        }
        validate_currency(&cmd.currency)?;

        Ok(vec![PurchaseOrderEvent::PurchaseOrderCreated(
            PurchaseOrderCreated {
                tenant_id: cmd.tenant_id,
                order_id: cmd.order_id,
                number: cmd.number.clone(),
                supplier_id: cmd.supplier_id,
                currency: cmd.currency.clone(),
                expected_on: cmd.expected_on,
                notes: cmd.notes.clone(),
                occurred_at: cmd.occurred_at,
            },
        )])
    }

    fn handle_add_line(&self, cmd: &AddPurchaseLine) -> Result<Vec<PurchaseOrderEvent>, DomainError> {
        self.ensure_exists(cmd.tenant_id, cmd.order_id)?;
        self.ensure_draft()?;

        let line_no = self.lines.iter().map(|l| l.line_no).max().unwrap_or(0) + 1;
        let line = PurchaseLine {
            line_no,
            catalog_item_id: cmd.catalog_item_id,
            description: cmd.description.clone(),
            quantity: cmd.quantity,
            unit_cost: cmd.unit_cost,
            tax_rate_bps: cmd.tax_rate_bps,
            received: Quantity::ZERO,
        };
        line.priced().validate()?;

        let mut all = self.priced_lines();
        all.push(line.priced());
        compute_totals(&all)?;

        Ok(vec![PurchaseOrderEvent::PurchaseLineAdded(PurchaseLineAdded {
            tenant_id: cmd.tenant_id,
            order_id: cmd.order_id,
            line,
            occurred_at: cmd.occurred_at,
        })])
    }

    fn handle_remove_line(
        &self,
        cmd: &RemovePurchaseLine,
    ) -> Result<Vec<PurchaseOrderEvent>, DomainError> {
        self.ensure_exists(cmd.tenant_id, cmd.order_id)?;
        self.ensure_draft()?;

        if !self.lines.iter().any(|l| l.line_no == cmd.line_no) {
            return Err(DomainError::validation(format!(
                "line {} does not exist",
                cmd.line_no
            )));
        }

        Ok(vec![PurchaseOrderEvent::PurchaseLineRemoved(PurchaseLineRemoved {
            tenant_id: cmd.tenant_id,
            order_id: cmd.order_id,
            line_no: cmd.line_no,
            occurred_at: cmd.occurred_at,
        })])
    }

    fn handle_approve(&self, cmd: &ApprovePurchaseOrder) -> Result<Vec<PurchaseOrderEvent>, DomainError> {
        self.ensure_exists(cmd.tenant_id, cmd.order_id)?;

        if self.status != PurchaseOrderStatus::Draft {
            return Err(DomainError::invariant(
                "only draft purchase orders can be approved",
            ));
        }
        if self.lines.is_empty() {
            return Err(DomainError::validation(
                "cannot approve purchase order without lines",
            ));
        }

        Ok(vec![PurchaseOrderEvent::PurchaseOrderApproved(
            PurchaseOrderApproved {
                tenant_id: cmd.tenant_id,
                order_id: cmd.order_id,
                approved_by: cmd.approved_by.clone(),
                occurred_at: cmd.occurred_at,
            },
        )])
    }

    fn handle_send(&self, cmd: &SendPurchaseOrder) -> Result<Vec<PurchaseOrderEvent>, DomainError> {
        self.ensure_exists(cmd.tenant_id, cmd.order_id)?;

        if self.status != PurchaseOrderStatus::Approved {
            return Err(DomainError::invariant(
                "only approved purchase orders can be sent",
            ));
        }

        Ok(vec![PurchaseOrderEvent::PurchaseOrderSent(PurchaseOrderSent {
            tenant_id: cmd.tenant_id,
            order_id: cmd.order_id,
            occurred_at: cmd.occurred_at,
        })])
    }

    fn handle_receive(&self, cmd: &ReceiveGoods) -> Result<Vec<PurchaseOrderEvent>, DomainError> {
        self.ensure_exists(cmd.tenant_id, cmd.order_id)?;

        if !self.status.accepts_receipts() {
            return Err(DomainError::invariant(
                "cannot receive goods before purchase order is sent",
            ));
        }
        let supplier_id = self
            .supplier_id
            .ok_or_else(|| DomainError::invariant("supplier must be set"))?;
        if cmd.receipts.is_empty() {
            return Err(DomainError::validation("receipt has no lines"));
        }

        // Accumulate per line so the same line may appear twice in one delivery.
        let mut after: Vec<PurchaseLine> = self.lines.clone();
        let mut received = Vec::with_capacity(cmd.receipts.len());
        for receipt in &cmd.receipts {
            if !receipt.quantity.is_positive() {
                return Err(DomainError::validation(format!(
                    "line {}: received quantity must be positive",
                    receipt.line_no
                )));
            }
            let line = after
                .iter_mut()
                .find(|l| l.line_no == receipt.line_no)
                .ok_or_else(|| {
                    DomainError::validation(format!("line {} does not exist", receipt.line_no))
                })?;
            let total = line
                .received
                .checked_add(receipt.quantity)
                .ok_or_else(|| DomainError::invariant("received quantity overflow"))?;
            if total > line.quantity {
                return Err(DomainError::invariant(format!(
                    "line {}: cannot receive {} (outstanding {})",
                    line.line_no,
                    receipt.quantity,
                    line.outstanding()
                )));
            }
            line.received = total;
            received.push(ReceivedLine {
                line_no: line.line_no,
                catalog_item_id: line.catalog_item_id,
                quantity: receipt.quantity,
            });
        }

        let fully_received = after.iter().all(PurchaseLine::is_fully_received);
        Ok(vec![PurchaseOrderEvent::GoodsReceived(GoodsReceived {
            tenant_id: cmd.tenant_id,
            order_id: cmd.order_id,
            supplier_id,
            lines: received,
            fully_received,
            occurred_at: cmd.occurred_at,
        })])
    }

    fn handle_cancel(&self, cmd: &CancelPurchaseOrder) -> Result<Vec<PurchaseOrderEvent>, DomainError> {
        self.ensure_exists(cmd.tenant_id, cmd.order_id)?;

        if !matches!(
            self.status,
            PurchaseOrderStatus::Draft | PurchaseOrderStatus::Approved
        ) {
            return Err(DomainError::invariant(format!(
                "cannot cancel a {} purchase order",
                self.status.as_str()
            )));
        }

        Ok(vec![PurchaseOrderEvent::PurchaseOrderCancelled(
            PurchaseOrderCancelled {
                tenant_id: cmd.tenant_id,
                order_id: cmd.order_id,
                reason: cmd.reason.clone(),
                occurred_at: cmd.occurred_at,
            },
        )])
    }

    fn handle_close(&self, cmd: &ClosePurchaseOrder) -> Result<Vec<PurchaseOrderEvent>, DomainError> {
        self.ensure_exists(cmd.tenant_id, cmd.order_id)?;

        // Short-closing a partial delivery is allowed; the rest is not expected.
        if !matches!(
            self.status,
            PurchaseOrderStatus::Received | PurchaseOrderStatus::PartiallyReceived
        ) {
            return Err(DomainError::invariant(
                "only received purchase orders can be closed",
            ));
        }

        Ok(vec![PurchaseOrderEvent::PurchaseOrderClosed(PurchaseOrderClosed {
            tenant_id: cmd.tenant_id,
            order_id: cmd.order_id,
            occurred_at: cmd.occurred_at,
        })])
    }
}
