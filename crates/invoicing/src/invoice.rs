use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use bizdesk_catalog::{DocumentTotals, PricedLine, compute_totals};
use bizdesk_core::{Aggregate, AggregateId, AggregateRoot, DomainError, TenantId, validate_currency};
use bizdesk_events::Event;
use bizdesk_parties::PartyId;
use bizdesk_projects::ProjectId;
use bizdesk_quotes::QuoteId;
use bizdesk_timesheets::TimeEntryId;

#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct InvoiceId(pub AggregateId);

impl InvoiceId {
    pub fn new(id: AggregateId) -> Self {
        Self(id)
    }
}

impl core::fmt::Display for InvoiceId {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        core::fmt::Display::fmt(&self.0, f)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum InvoiceStatus {
    Open,
    Paid,
    Void,
}

impl InvoiceStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            InvoiceStatus::Open => "open",
            InvoiceStatus::Paid => "paid",
            InvoiceStatus::Void => "void",
        }
    }
}

/// What an invoice was derived from.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum InvoiceSource {
    Manual,
    Quote {
        quote_id: QuoteId,
        quote_number: String,
    },
    Timesheet {
        entry_ids: Vec<TimeEntryId>,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PaymentMethod {
    BankTransfer,
    Card,
    Cash,
    Cheque,
    Other,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Payment {
    pub amount: u64,
    pub method: PaymentMethod,
    pub reference: Option<String>,
    pub received_at: DateTime<Utc>,
}

/// Aggregate root: Invoice.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Invoice {
    id: InvoiceId,
    tenant_id: Option<TenantId>,
    number: String,
    customer_id: Option<PartyId>,
    project_id: Option<ProjectId>,
    source: InvoiceSource,
    currency: String,
    lines: Vec<PricedLine>,
    totals: DocumentTotals,
    issue_date: Option<NaiveDate>,
    due_date: Option<NaiveDate>,
    notes: Option<String>,
    status: InvoiceStatus,
    sent_at: Option<DateTime<Utc>>,
    payments: Vec<Payment>,
    total_paid: u64,
    version: u64,
    created: bool,
}

impl Invoice {
    pub fn empty(id: InvoiceId) -> Self {
        Self {
            id,
            tenant_id: None,
            number: String::new(),
            customer_id: None,
            project_id: None,
            source: InvoiceSource::Manual,
            currency: String::new(),
            lines: Vec::new(),
            totals: DocumentTotals::default(),
            issue_date: None,
            due_date: None,
            notes: None,
            status: InvoiceStatus::Open,
            sent_at: None,
            payments: Vec::new(),
            total_paid: 0,
            version: 0,
            created: false,
        }
    }

    pub fn id_typed(&self) -> InvoiceId {
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

    pub fn customer_id(&self) -> Option<PartyId> {
        self.customer_id
    }

    pub fn project_id(&self) -> Option<ProjectId> {
        self.project_id
    }

    pub fn source(&self) -> &InvoiceSource {
        &self.source
    }

    pub fn currency(&self) -> &str {
        &self.currency
    }

    pub fn lines(&self) -> &[PricedLine] {
        &self.lines
    }

    pub fn totals(&self) -> DocumentTotals {
        self.totals
    }

    pub fn issue_date(&self) -> Option<NaiveDate> {
        self.issue_date
    }

    pub fn due_date(&self) -> Option<NaiveDate> {
        self.due_date
    }

    pub fn notes(&self) -> Option<&str> {
        self.notes.as_deref()
    }

    pub fn status(&self) -> InvoiceStatus {
        self.status
    }

    pub fn sent_at(&self) -> Option<DateTime<Utc>> {
        self.sent_at
    }

    pub fn payments(&self) -> &[Payment] {
        &self.payments
    }

    pub fn total_amount(&self) -> u64 {
        self.totals.total
    }

    pub fn total_paid(&self) -> u64 {
        self.total_paid
    }

    pub fn outstanding_amount(&self) -> u64 {
        self.totals.total.saturating_sub(self.total_paid)
    }

    pub fn can_accept_payment(&self) -> bool {
        self.created && self.status == InvoiceStatus::Open && self.outstanding_amount() > 0
    }

    pub fn is_overdue(&self, today: NaiveDate) -> bool {
        self.status == InvoiceStatus::Open && self.due_date.is_some_and(|due| today > due)
    }
}

impl AggregateRoot for Invoice {
    type Id = InvoiceId;

    fn id(&self) -> &Self::Id {
        &self.id
    }

    fn version(&self) -> u64 {
        self.version
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IssueInvoice {
    pub tenant_id: TenantId,
    pub invoice_id: InvoiceId,
    /// Allocated from the tenant's invoice sequence.
    pub number: String,
    pub customer_id: PartyId,
    pub project_id: Option<ProjectId>,
    pub source: InvoiceSource,
    pub currency: String,
    pub lines: Vec<PricedLine>,
    pub issue_date: NaiveDate,
    pub due_date: NaiveDate,
    pub notes: Option<String>,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MarkInvoiceSent {
    pub tenant_id: TenantId,
    pub invoice_id: InvoiceId,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RegisterPayment {
    pub tenant_id: TenantId,
    pub invoice_id: InvoiceId,
    pub amount: u64,
    pub method: PaymentMethod,
    pub reference: Option<String>,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VoidInvoice {
    pub tenant_id: TenantId,
    pub invoice_id: InvoiceId,
    pub reason: Option<String>,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum InvoiceCommand {
    IssueInvoice(IssueInvoice),
    MarkInvoiceSent(MarkInvoiceSent),
    RegisterPayment(RegisterPayment),
    VoidInvoice(VoidInvoice),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InvoiceIssued {
    pub tenant_id: TenantId,
    pub invoice_id: InvoiceId,
    pub number: String,
    pub customer_id: PartyId,
    pub project_id: Option<ProjectId>,
    pub source: InvoiceSource,
    pub currency: String,
    pub lines: Vec<PricedLine>,
    pub totals: DocumentTotals,
    pub issue_date: NaiveDate,
    pub due_date: NaiveDate,
    pub notes: Option<String>,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InvoiceSent {
    pub tenant_id: TenantId,
    pub invoice_id: InvoiceId,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PaymentRegistered {
    pub tenant_id: TenantId,
    pub invoice_id: InvoiceId,
    pub amount: u64,
    pub method: PaymentMethod,
    pub reference: Option<String>,
    pub new_total_paid: u64,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InvoiceVoided {
    pub tenant_id: TenantId,
    pub invoice_id: InvoiceId,
    pub reason: Option<String>,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum InvoiceEvent {
    InvoiceIssued(InvoiceIssued),
    InvoiceSent(InvoiceSent),
    PaymentRegistered(PaymentRegistered),
    InvoiceVoided(InvoiceVoided),
}

impl Event for InvoiceEvent {
    fn event_type(&self) -> &'static str {
        match self {
            InvoiceEvent::InvoiceIssued(_) => "invoicing.invoice.issued",
            InvoiceEvent::InvoiceSent(_) => "invoicing.invoice.sent",
            InvoiceEvent::PaymentRegistered(_) => "invoicing.invoice.payment_registered",
            InvoiceEvent::InvoiceVoided(_) => "invoicing.invoice.voided",
        }
    }

    fn version(&self) -> u32 {
        1
    }

    fn occurred_at(&self) -> DateTime<Utc> {
        match self {
            InvoiceEvent::InvoiceIssued(e) => e.occurred_at,
            InvoiceEvent::InvoiceSent(e) => e.occurred_at,
            InvoiceEvent::PaymentRegistered(e) => e.occurred_at,
            InvoiceEvent::InvoiceVoided(e) => e.occurred_at,
        }
    }
}

impl Aggregate for Invoice {
    type Command = InvoiceCommand;
    type Event = InvoiceEvent;
    type Error = DomainError;

    fn apply(&mut self, event: &Self::Event) {
        match event {
            InvoiceEvent::InvoiceIssued(e) => {
                self.id = e.invoice_id;
                self.tenant_id = Some(e.tenant_id);
                self.number = e.number.clone();
                self.customer_id = Some(e.customer_id);
                self.project_id = e.project_id;
                self.source = e.source.clone();
                self.currency = e.currency.clone();
                self.lines = e.lines.clone();
                self.totals = e.totals;
                self.issue_date = Some(e.issue_date);
                self.due_date = Some(e.due_date);
                self.notes = e.notes.clone();
                self.total_paid = 0;
                self.status = InvoiceStatus::Open;
                self.created = true;
            }
            InvoiceEvent::InvoiceSent(e) => {
                self.sent_at = Some(e.occurred_at);
            }
            InvoiceEvent::PaymentRegistered(e) => {
                self.payments.push(Payment {
                    amount: e.amount,
                    method: e.method,
                    reference: e.reference.clone(),
                    received_at: e.occurred_at,
                });
                self.total_paid = e.new_total_paid;
                if self.total_paid >= self.totals.total {
                    self.status = InvoiceStatus::Paid;
                }
            }
            InvoiceEvent::InvoiceVoided(_) => {
                self.status = InvoiceStatus::Void;
            }
        }

        self.version += 1;
    }

    fn handle(&self, command: &Self::Command) -> Result<Vec<Self::Event>, Self::Error> {
        match command {
            InvoiceCommand::IssueInvoice(cmd) => self.handle_issue(cmd),
            InvoiceCommand::MarkInvoiceSent(cmd) => self.handle_mark_sent(cmd),
            InvoiceCommand::RegisterPayment(cmd) => self.handle_register_payment(cmd),
            InvoiceCommand::VoidInvoice(cmd) => self.handle_void(cmd),
        }
    }
}

impl Invoice {
    fn ensure_exists(&self, tenant_id: TenantId, invoice_id: InvoiceId) -> Result<(), DomainError> {
        if !self.created {
            return Err(DomainError::not_found());
        }
        if self.tenant_id != Some(tenant_id) {
            return Err(DomainError::invariant("tenant mismatch"));
        }
        if self.id != invoice_id {
            return Err(DomainError::invariant("invoice_id mismatch"));
        }
        Ok(())
    }

    fn handle_issue(&self, cmd: &IssueInvoice) -> Result<Vec<InvoiceEvent>, DomainError> {
        if self.created {
            return Err(DomainError::conflict("invoice already exists"));
        }
        if cmd.number.trim().is_empty() {
            return Err(DomainError::validation("invoice number cannot be empty"));
        }
        validate_currency(&cmd.currency)?;
        if cmd.lines.is_empty() {
            return Err(DomainError::validation("cannot issue invoice without lines"));
        }
        if cmd.due_date < cmd.issue_date {
            return Err(DomainError::validation("due date cannot precede issue date"));
        }
        if let InvoiceSource::Timesheet { entry_ids } = &cmd.source {
            if entry_ids.is_empty() {
                return Err(DomainError::validation("timesheet invoice needs at least one entry"));
            }
        }

        let totals = compute_totals(&cmd.lines)?;
        if totals.total == 0 {
            return Err(DomainError::invariant("invoice total must be positive"));
        }

        Ok(vec![InvoiceEvent::InvoiceIssued(InvoiceIssued {
            tenant_id: cmd.tenant_id,
            invoice_id: cmd.invoice_id,
            number: cmd.number.clone(),
            customer_id: cmd.customer_id,
            project_id: cmd.project_id,
            source: cmd.source.clone(),
            currency: cmd.currency.clone(),
            lines: cmd.lines.clone(),
            totals,
            issue_date: cmd.issue_date,
            due_date: cmd.due_date,
            notes: cmd.notes.clone(),
            occurred_at: cmd.occurred_at,
        })])
    }

    fn handle_mark_sent(&self, cmd: &MarkInvoiceSent) -> Result<Vec<InvoiceEvent>, DomainError> {
        self.ensure_exists(cmd.tenant_id, cmd.invoice_id)?;
        if self.status == InvoiceStatus::Void {
            return Err(DomainError::invariant("cannot send a void invoice"));
        }
        Ok(vec![InvoiceEvent::InvoiceSent(InvoiceSent {
            tenant_id: cmd.tenant_id,
            invoice_id: cmd.invoice_id,
            occurred_at: cmd.occurred_at,
        })])
    }

    fn handle_register_payment(&self, cmd: &RegisterPayment) -> Result<Vec<InvoiceEvent>, DomainError> {
        self.ensure_exists(cmd.tenant_id, cmd.invoice_id)?;

        if !self.can_accept_payment() {
            return Err(DomainError::invariant(
                "cannot register payment on void or fully paid invoice",
            ));
        }
        if cmd.amount == 0 {
            return Err(DomainError::validation("payment amount must be positive"));
        }

        let new_total_paid = self
            .total_paid
            .checked_add(cmd.amount)
            .ok_or_else(|| DomainError::invariant("payment total overflow"))?;
        if new_total_paid > self.totals.total {
            return Err(DomainError::invariant(format!(
                "cannot overpay invoice (outstanding {}, paying {})",
                self.outstanding_amount(),
                cmd.amount
            )));
        }

        Ok(vec![InvoiceEvent::PaymentRegistered(PaymentRegistered {
            tenant_id: cmd.tenant_id,
            invoice_id: cmd.invoice_id,
            amount: cmd.amount,
            method: cmd.method,
            reference: cmd.reference.clone(),
            new_total_paid,
            occurred_at: cmd.occurred_at,
        })])
    }

    fn handle_void(&self, cmd: &VoidInvoice) -> Result<Vec<InvoiceEvent>, DomainError> {
        self.ensure_exists(cmd.tenant_id, cmd.invoice_id)?;

        match self.status {
            InvoiceStatus::Void => return Err(DomainError::conflict("invoice is already void")),
            InvoiceStatus::Paid => return Err(DomainError::invariant("cannot void a paid invoice")),
            InvoiceStatus::Open => {}
        }
        if self.total_paid > 0 {
            return Err(DomainError::invariant(
                "cannot void an invoice with registered payments",
            ));
        }

        Ok(vec![InvoiceEvent::InvoiceVoided(InvoiceVoided {
            tenant_id: cmd.tenant_id,
            invoice_id: cmd.invoice_id,
            reason: cmd.reason.clone(),
            occurred_at: cmd.occurred_at,
        })])
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bizdesk_core::Quantity;
    use bizdesk_events::execute;
    use chrono::Duration;
    use proptest::prelude::*;

    fn test_line(line_no: u32, unit_price: u64) -> PricedLine {
        PricedLine {
            line_no,
            catalog_item_id: None,
            description: "Widget".to_string(),
            quantity: Quantity::from_units(1),
            unit_price,
            discount_bps: 0,
            tax_rate_bps: 0,
        }
    }

    fn issue_cmd(tenant_id: TenantId, invoice_id: InvoiceId, lines: Vec<PricedLine>) -> IssueInvoice {
        let today = Utc::now().date_naive();
        IssueInvoice {
            tenant_id,
            invoice_id,
            number: "INV-00001".to_string(),
            customer_id: PartyId::new(AggregateId::new()),
            project_id: None,
            source: InvoiceSource::Manual,
            currency: "USD".to_string(),
            lines,
            issue_date: today,
            due_date: today + Duration::days(30),
            notes: None,
            occurred_at: Utc::now(),
        }
    }

    fn issued(total: u64) -> (TenantId, InvoiceId, Invoice) {
        let tenant_id = TenantId::new();
        let invoice_id = InvoiceId::new(AggregateId::new());
        let mut invoice = Invoice::empty(invoice_id);
        execute(
            &mut invoice,
            &InvoiceCommand::IssueInvoice(issue_cmd(tenant_id, invoice_id, vec![test_line(1, total)])),
        )
        .unwrap();
        (tenant_id, invoice_id, invoice)
    }

    fn pay(tenant_id: TenantId, invoice_id: InvoiceId, amount: u64) -> InvoiceCommand {
        InvoiceCommand::RegisterPayment(RegisterPayment {
            tenant_id,
            invoice_id,
            amount,
            method: PaymentMethod::BankTransfer,
            reference: None,
            occurred_at: Utc::now(),
        })
    }

    fn void(tenant_id: TenantId, invoice_id: InvoiceId) -> InvoiceCommand {
        InvoiceCommand::VoidInvoice(VoidInvoice {
            tenant_id,
            invoice_id,
            reason: Some("duplicate".to_string()),
            occurred_at: Utc::now(),
        })
    }

    #[test]
    fn issue_computes_totals() {
        let (_, _, invoice) = issued(10_000);
        assert_eq!(invoice.total_amount(), 10_000);
        assert_eq!(invoice.outstanding_amount(), 10_000);
        assert_eq!(invoice.status(), InvoiceStatus::Open);
        assert_eq!(invoice.number(), "INV-00001");
    }

    #[test]
    fn issue_rejects_due_before_issue() {
        let invoice = Invoice::empty(InvoiceId::new(AggregateId::new()));
        let mut cmd = issue_cmd(TenantId::new(), *invoice.id(), vec![test_line(1, 100)]);
        cmd.due_date = cmd.issue_date - Duration::days(1);
        let err = invoice.handle(&InvoiceCommand::IssueInvoice(cmd)).unwrap_err();
        assert!(matches!(err, DomainError::Validation(msg) if msg.contains("due date")));
    }

    #[test]
    fn issue_rejects_no_lines() {
        let invoice = Invoice::empty(InvoiceId::new(AggregateId::new()));
        let cmd = issue_cmd(TenantId::new(), *invoice.id(), vec![]);
        assert!(matches!(
            invoice.handle(&InvoiceCommand::IssueInvoice(cmd)),
            Err(DomainError::Validation(_))
        ));
    }

    #[test]
    fn partial_then_full_payment_marks_paid() {
        let (tenant_id, invoice_id, mut invoice) = issued(10_000);

        execute(&mut invoice, &pay(tenant_id, invoice_id, 4_000)).unwrap();
        assert_eq!(invoice.status(), InvoiceStatus::Open);
        assert_eq!(invoice.outstanding_amount(), 6_000);

        execute(&mut invoice, &pay(tenant_id, invoice_id, 6_000)).unwrap();
        assert_eq!(invoice.status(), InvoiceStatus::Paid);
        assert_eq!(invoice.payments().len(), 2);

        let err = invoice.handle(&pay(tenant_id, invoice_id, 1)).unwrap_err();
        assert!(matches!(err, DomainError::InvariantViolation(_)));
    }

    #[test]
    fn overpayment_is_rejected() {
        let (tenant_id, invoice_id, invoice) = issued(10_000);
        let err = invoice.handle(&pay(tenant_id, invoice_id, 10_001)).unwrap_err();
        assert!(matches!(err, DomainError::InvariantViolation(msg) if msg.contains("overpay")));
    }

    #[test]
    fn partially_paid_invoice_cannot_be_voided() {
        let (tenant_id, invoice_id, mut invoice) = issued(10_000);
        execute(&mut invoice, &pay(tenant_id, invoice_id, 1_000)).unwrap();
        let err = invoice.handle(&void(tenant_id, invoice_id)).unwrap_err();
        assert!(matches!(err, DomainError::InvariantViolation(msg) if msg.contains("payments")));
    }

    #[test]
    fn void_invoice_rejects_payments_and_sending() {
        let (tenant_id, invoice_id, mut invoice) = issued(10_000);
        execute(&mut invoice, &void(tenant_id, invoice_id)).unwrap();
        assert_eq!(invoice.status(), InvoiceStatus::Void);

        assert!(invoice.handle(&pay(tenant_id, invoice_id, 100)).is_err());
        assert!(
            invoice
                .handle(&InvoiceCommand::MarkInvoiceSent(MarkInvoiceSent {
                    tenant_id,
                    invoice_id,
                    occurred_at: Utc::now(),
                }))
                .is_err()
        );
        assert!(matches!(
            invoice.handle(&void(tenant_id, invoice_id)),
            Err(DomainError::Conflict(_))
        ));
    }

    #[test]
    fn overdue_only_while_open() {
        let (tenant_id, invoice_id, mut invoice) = issued(500);
        let due = invoice.due_date().unwrap();
        assert!(!invoice.is_overdue(due));
        assert!(invoice.is_overdue(due + Duration::days(1)));

        execute(&mut invoice, &pay(tenant_id, invoice_id, 500)).unwrap();
        assert!(!invoice.is_overdue(due + Duration::days(1)));
    }

    proptest! {
        #[test]
        fn total_paid_never_exceeds_total(payments in prop::collection::vec(1u64..5_000, 1..20)) {
            let (tenant_id, invoice_id, mut invoice) = issued(20_000);
            for amount in payments {
                let _ = execute(&mut invoice, &pay(tenant_id, invoice_id, amount));
                prop_assert!(invoice.total_paid() <= invoice.total_amount());
            }
        }
    }
}
