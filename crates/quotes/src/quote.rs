use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use bizdesk_catalog::{DocumentTotals, PricedLine, compute_totals};
use bizdesk_core::{Aggregate, AggregateId, AggregateRoot, DomainError, TenantId, validate_currency};
use bizdesk_events::Event;
use bizdesk_parties::PartyId;
use bizdesk_projects::ProjectId;

#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct QuoteId(pub AggregateId);

impl QuoteId {
    pub fn new(id: AggregateId) -> Self {
        Self(id)
    }
}

impl core::fmt::Display for QuoteId {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        core::fmt::Display::fmt(&self.0, f)
    }
}

/// ```text
/// Draft ─send─▶ Sent ─accept─▶ Accepted ─convert─▶ Converted
///                 │ └──────────convert────────────▶ Converted
///                 └─decline─▶ Declined
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum QuoteStatus {
    Draft,
    Sent,
    Accepted,
    Declined,
    Converted,
}

impl QuoteStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            QuoteStatus::Draft => "draft",
            QuoteStatus::Sent => "sent",
            QuoteStatus::Accepted => "accepted",
            QuoteStatus::Declined => "declined",
            QuoteStatus::Converted => "converted",
        }
    }
}

/// Aggregate root: Quote.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Quote {
    id: QuoteId,
    tenant_id: Option<TenantId>,
    number: String,
    customer_id: Option<PartyId>,
    project_id: Option<ProjectId>,
    currency: String,
    valid_until: Option<NaiveDate>,
    notes: Option<String>,
    lines: Vec<PricedLine>,
    totals: DocumentTotals,
    status: QuoteStatus,
    converted_invoice_id: Option<AggregateId>,
    version: u64,
    created: bool,
}

impl Quote {
    pub fn empty(id: QuoteId) -> Self {
        Self {
            id,
            tenant_id: None,
            number: String::new(),
            customer_id: None,
            project_id: None,
            currency: String::new(),
            valid_until: None,
            notes: None,
            lines: Vec::new(),
            totals: DocumentTotals::default(),
            status: QuoteStatus::Draft,
            converted_invoice_id: None,
            version: 0,
            created: false,
        }
    }

    pub fn id_typed(&self) -> QuoteId {
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

    pub fn currency(&self) -> &str {
        &self.currency
    }

    pub fn valid_until(&self) -> Option<NaiveDate> {
        self.valid_until
    }

    pub fn notes(&self) -> Option<&str> {
        self.notes.as_deref()
    }

    pub fn lines(&self) -> &[PricedLine] {
        &self.lines
    }

    pub fn totals(&self) -> DocumentTotals {
        self.totals
    }

    pub fn status(&self) -> QuoteStatus {
        self.status
    }

    pub fn converted_invoice_id(&self) -> Option<AggregateId> {
        self.converted_invoice_id
    }

    pub fn is_expired(&self, today: NaiveDate) -> bool {
        self.valid_until.is_some_and(|until| today > until)
    }

    /// Sent and Accepted quotes may be turned into an invoice, once.
    pub fn can_convert(&self) -> bool {
        self.created && matches!(self.status, QuoteStatus::Sent | QuoteStatus::Accepted)
    }

    fn next_line_no(&self) -> u32 {
        self.lines.iter().map(|l| l.line_no).max().unwrap_or(0) + 1
    }
}

impl AggregateRoot for Quote {
    type Id = QuoteId;

    fn id(&self) -> &Self::Id {
        &self.id
    }

    fn version(&self) -> u64 {
        self.version
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CreateQuote {
    pub tenant_id: TenantId,
    pub quote_id: QuoteId,
    /// Allocated from the tenant's quote sequence.
    pub number: String,
    pub customer_id: PartyId,
    pub project_id: Option<ProjectId>,
    pub currency: String,
    pub valid_until: NaiveDate,
    pub notes: Option<String>,
    pub occurred_at: DateTime<Utc>,
}

/// The aggregate assigns `line.line_no`; whatever the caller put there is ignored.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AddQuoteLine {
    pub tenant_id: TenantId,
    pub quote_id: QuoteId,
    pub line: PricedLine,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RemoveQuoteLine {
    pub tenant_id: TenantId,
    pub quote_id: QuoteId,
    pub line_no: u32,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SendQuote {
    pub tenant_id: TenantId,
    pub quote_id: QuoteId,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AcceptQuote {
    pub tenant_id: TenantId,
    pub quote_id: QuoteId,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeclineQuote {
    pub tenant_id: TenantId,
    pub quote_id: QuoteId,
    pub reason: Option<String>,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MarkQuoteConverted {
    pub tenant_id: TenantId,
    pub quote_id: QuoteId,
    pub invoice_id: AggregateId,
    pub invoice_number: String,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum QuoteCommand {
    CreateQuote(CreateQuote),
    AddQuoteLine(AddQuoteLine),
    RemoveQuoteLine(RemoveQuoteLine),
    SendQuote(SendQuote),
    AcceptQuote(AcceptQuote),
    DeclineQuote(DeclineQuote),
    MarkQuoteConverted(MarkQuoteConverted),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QuoteCreated {
    pub tenant_id: TenantId,
    pub quote_id: QuoteId,
    pub number: String,
    pub customer_id: PartyId,
    pub project_id: Option<ProjectId>,
    pub currency: String,
    pub valid_until: NaiveDate,
    pub notes: Option<String>,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QuoteLineAdded {
    pub tenant_id: TenantId,
    pub quote_id: QuoteId,
    pub line: PricedLine,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QuoteLineRemoved {
    pub tenant_id: TenantId,
    pub quote_id: QuoteId,
    pub line_no: u32,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QuoteSent {
    pub tenant_id: TenantId,
    pub quote_id: QuoteId,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QuoteAccepted {
    pub tenant_id: TenantId,
    pub quote_id: QuoteId,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QuoteDeclined {
    pub tenant_id: TenantId,
    pub quote_id: QuoteId,
    pub reason: Option<String>,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QuoteConverted {
    pub tenant_id: TenantId,
    pub quote_id: QuoteId,
    pub invoice_id: AggregateId,
    pub invoice_number: String,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum QuoteEvent {
    QuoteCreated(QuoteCreated),
    QuoteLineAdded(QuoteLineAdded),
    QuoteLineRemoved(QuoteLineRemoved),
    QuoteSent(QuoteSent),
    QuoteAccepted(QuoteAccepted),
    QuoteDeclined(QuoteDeclined),
    QuoteConverted(QuoteConverted),
}

impl Event for QuoteEvent {
    fn event_type(&self) -> &'static str {
        match self {
            QuoteEvent::QuoteCreated(_) => "quotes.quote.created",
            QuoteEvent::QuoteLineAdded(_) => "quotes.quote.line_added",
            QuoteEvent::QuoteLineRemoved(_) => "quotes.quote.line_removed",
            QuoteEvent::QuoteSent(_) => "quotes.quote.sent",
            QuoteEvent::QuoteAccepted(_) => "quotes.quote.accepted",
            QuoteEvent::QuoteDeclined(_) => "quotes.quote.declined",
            QuoteEvent::QuoteConverted(_) => "quotes.quote.converted",
        }
    }

    fn version(&self) -> u32 {
        1
    }

    fn occurred_at(&self) -> DateTime<Utc> {
        match self {
            QuoteEvent::QuoteCreated(e) => e.occurred_at,
            QuoteEvent::QuoteLineAdded(e) => e.occurred_at,
            QuoteEvent::QuoteLineRemoved(e) => e.occurred_at,
            QuoteEvent::QuoteSent(e) => e.occurred_at,
            QuoteEvent::QuoteAccepted(e) => e.occurred_at,
            QuoteEvent::QuoteDeclined(e) => e.occurred_at,
            QuoteEvent::QuoteConverted(e) => e.occurred_at,
        }
    }
}

impl Aggregate for Quote {
    type Command = QuoteCommand;
    type Event = QuoteEvent;
    type Error = DomainError;

    fn apply(&mut self, event: &Self::Event) {
        match event {
            QuoteEvent::QuoteCreated(e) => {
                self.id = e.quote_id;
                self.tenant_id = Some(e.tenant_id);
                self.number = e.number.clone();
                self.customer_id = Some(e.customer_id);
                self.project_id = e.project_id;
                self.currency = e.currency.clone();
                self.valid_until = Some(e.valid_until);
                self.notes = e.notes.clone();
                self.status = QuoteStatus::Draft;
                self.created = true;
            }
            QuoteEvent::QuoteLineAdded(e) => {
                self.lines.push(e.line.clone());
                self.totals = compute_totals(&self.lines).unwrap_or_default();
            }
            QuoteEvent::QuoteLineRemoved(e) => {
                self.lines.retain(|l| l.line_no != e.line_no);
                self.totals = compute_totals(&self.lines).unwrap_or_default();
            }
            QuoteEvent::QuoteSent(_) => self.status = QuoteStatus::Sent,
            QuoteEvent::QuoteAccepted(_) => self.status = QuoteStatus::Accepted,
            QuoteEvent::QuoteDeclined(_) => self.status = QuoteStatus::Declined,
            QuoteEvent::QuoteConverted(e) => {
                self.status = QuoteStatus::Converted;
                self.converted_invoice_id = Some(e.invoice_id);
            }
        }

        self.version += 1;
    }

    fn handle(&self, command: &Self::Command) -> Result<Vec<Self::Event>, Self::Error> {
        match command {
            QuoteCommand::CreateQuote(cmd) => self.handle_create(cmd),
            QuoteCommand::AddQuoteLine(cmd) => self.handle_add_line(cmd),
            QuoteCommand::RemoveQuoteLine(cmd) => self.handle_remove_line(cmd),
            QuoteCommand::SendQuote(cmd) => self.handle_send(cmd),
            QuoteCommand::AcceptQuote(cmd) => self.handle_accept(cmd),
            QuoteCommand::DeclineQuote(cmd) => self.handle_decline(cmd),
            QuoteCommand::MarkQuoteConverted(cmd) => self.handle_mark_converted(cmd),
        }
    }
}

impl Quote {
    fn ensure_exists(&self, tenant_id: TenantId, quote_id: QuoteId) -> Result<(), DomainError> {
        if !self.created {
            return Err(DomainError::not_found());
        }
        if self.tenant_id != Some(tenant_id) {
            return Err(DomainError::invariant("tenant mismatch"));
        }
        if self.id != quote_id {
            return Err(DomainError::invariant("quote_id mismatch"));
        }
        Ok(())
    }

    fn ensure_status(&self, allowed: &[QuoteStatus], action: &str) -> Result<(), DomainError> {
        if allowed.contains(&self.status) {
            Ok(())
        } else {
            Err(DomainError::invariant(format!(
                "cannot {action} a quote in status '{}'",
                self.status.as_str()
            )))
        }
    }

    fn ensure_not_expired(&self, at: DateTime<Utc>) -> Result<(), DomainError> {
        if self.is_expired(at.date_naive()) {
            return Err(DomainError::invariant(format!("quote {} has expired", self.number)));
        }
        Ok(())
    }

    fn handle_create(&self, cmd: &CreateQuote) -> Result<Vec<QuoteEvent>, DomainError> {
        if self.created {
            return Err(DomainError::conflict("quote already exists"));
        }
        if cmd.number.trim().is_empty() {
            return Err(DomainError::validation("quote number cannot be empty"));
        }
        validate_currency(&cmd.currency)?;
        if cmd.valid_until < cmd.occurred_at.date_naive() {
            return Err(DomainError::validation("valid_until cannot be in the past"));
        }

        Ok(vec![QuoteEvent::QuoteCreated(QuoteCreated {
            tenant_id: cmd.tenant_id,
            quote_id: cmd.quote_id,
            number: cmd.number.clone(),
            customer_id: cmd.customer_id,
            project_id: cmd.project_id,
            currency: cmd.currency.clone(),
            valid_until: cmd.valid_until,
            notes: cmd.notes.clone(),
            occurred_at: cmd.occurred_at,
        })])
    }

    fn handle_add_line(&self, cmd: &AddQuoteLine) -> Result<Vec<QuoteEvent>, DomainError> {
        self.ensure_exists(cmd.tenant_id, cmd.quote_id)?;
        self.ensure_status(&[QuoteStatus::Draft], "edit lines of")?;

        let line = PricedLine {
            line_no: self.next_line_no(),
            ..cmd.line.clone()
        };
        let mut candidate = self.lines.clone();
        candidate.push(line.clone());
        compute_totals(&candidate)?;

        Ok(vec![QuoteEvent::QuoteLineAdded(QuoteLineAdded {
            tenant_id: cmd.tenant_id,
            quote_id: cmd.quote_id,
            line,
            occurred_at: cmd.occurred_at,
        })])
    }

    fn handle_remove_line(&self, cmd: &RemoveQuoteLine) -> Result<Vec<QuoteEvent>, DomainError> {
        self.ensure_exists(cmd.tenant_id, cmd.quote_id)?;
        self.ensure_status(&[QuoteStatus::Draft], "edit lines of")?;
        if !self.lines.iter().any(|l| l.line_no == cmd.line_no) {
            return Err(DomainError::validation(format!("line {} does not exist", cmd.line_no)));
        }

        Ok(vec![QuoteEvent::QuoteLineRemoved(QuoteLineRemoved {
            tenant_id: cmd.tenant_id,
            quote_id: cmd.quote_id,
            line_no: cmd.line_no,
            occurred_at: cmd.occurred_at,
        })])
    }

    fn handle_send(&self, cmd: &SendQuote) -> Result<Vec<QuoteEvent>, DomainError> {
        self.ensure_exists(cmd.tenant_id, cmd.quote_id)?;
        self.ensure_status(&[QuoteStatus::Draft], "send")?;
        if self.lines.is_empty() {
            return Err(DomainError::invariant("cannot send a quote without lines"));
        }
        self.ensure_not_expired(cmd.occurred_at)?;

        Ok(vec![QuoteEvent::QuoteSent(QuoteSent {
            tenant_id: cmd.tenant_id,
            quote_id: cmd.quote_id,
            occurred_at: cmd.occurred_at,
        })])
    }

    fn handle_accept(&self, cmd: &AcceptQuote) -> Result<Vec<QuoteEvent>, DomainError> {
        self.ensure_exists(cmd.tenant_id, cmd.quote_id)?;
        self.ensure_status(&[QuoteStatus::Sent], "accept")?;
        self.ensure_not_expired(cmd.occurred_at)?;

        Ok(vec![QuoteEvent::QuoteAccepted(QuoteAccepted {
            tenant_id: cmd.tenant_id,
            quote_id: cmd.quote_id,
            occurred_at: cmd.occurred_at,
        })])
    }

    fn handle_decline(&self, cmd: &DeclineQuote) -> Result<Vec<QuoteEvent>, DomainError> {
        self.ensure_exists(cmd.tenant_id, cmd.quote_id)?;
        self.ensure_status(&[QuoteStatus::Sent], "decline")?;

        Ok(vec![QuoteEvent::QuoteDeclined(QuoteDeclined {
            tenant_id: cmd.tenant_id,
            quote_id: cmd.quote_id,
            reason: cmd.reason.clone(),
            occurred_at: cmd.occurred_at,
        })])
    }

    fn handle_mark_converted(&self, cmd: &MarkQuoteConverted) -> Result<Vec<QuoteEvent>, DomainError> {
        self.ensure_exists(cmd.tenant_id, cmd.quote_id)?;
        if self.status == QuoteStatus::Converted {
            return Err(DomainError::conflict(format!(
                "quote {} was already converted",
                self.number
            )));
        }
        self.ensure_status(&[QuoteStatus::Sent, QuoteStatus::Accepted], "convert")?;
        if self.lines.is_empty() {
            return Err(DomainError::invariant("cannot convert a quote without lines"));
        }
        if cmd.invoice_number.trim().is_empty() {
            return Err(DomainError::validation("invoice number cannot be empty"));
        }

        Ok(vec![QuoteEvent::QuoteConverted(QuoteConverted {
            tenant_id: cmd.tenant_id,
            quote_id: cmd.quote_id,
            invoice_id: cmd.invoice_id,
            invoice_number: cmd.invoice_number.clone(),
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

    struct Fixture {
        tenant_id: TenantId,
        quote_id: QuoteId,
        quote: Quote,
    }

    fn draft() -> Fixture {
        let tenant_id = TenantId::new();
        let quote_id = QuoteId::new(AggregateId::new());
        let mut quote = Quote::empty(quote_id);
        execute(
            &mut quote,
            &QuoteCommand::CreateQuote(CreateQuote {
                tenant_id,
                quote_id,
                number: "QUO-00001".to_string(),
                customer_id: PartyId::new(AggregateId::new()),
                project_id: None,
                currency: "EUR".to_string(),
                valid_until: Utc::now().date_naive() + Duration::days(30),
                notes: None,
                occurred_at: Utc::now(),
            }),
        )
        .unwrap();
        Fixture { tenant_id, quote_id, quote }
    }

    fn line(unit_price: u64) -> PricedLine {
        PricedLine {
            line_no: 99,
            catalog_item_id: None,
            description: "Design work".to_string(),
            quantity: Quantity::from_units(2),
            unit_price,
            discount_bps: 0,
            tax_rate_bps: 2000,
        }
    }

    fn add_line(f: &mut Fixture, unit_price: u64) {
        execute(
            &mut f.quote,
            &QuoteCommand::AddQuoteLine(AddQuoteLine {
                tenant_id: f.tenant_id,
                quote_id: f.quote_id,
                line: line(unit_price),
                occurred_at: Utc::now(),
            }),
        )
        .unwrap();
    }

    fn send(f: &mut Fixture) {
        execute(
            &mut f.quote,
            &QuoteCommand::SendQuote(SendQuote {
                tenant_id: f.tenant_id,
                quote_id: f.quote_id,
                occurred_at: Utc::now(),
            }),
        )
        .unwrap();
    }

    fn convert_cmd(f: &Fixture) -> QuoteCommand {
        QuoteCommand::MarkQuoteConverted(MarkQuoteConverted {
            tenant_id: f.tenant_id,
            quote_id: f.quote_id,
            invoice_id: AggregateId::new(),
            invoice_number: "INV-00001".to_string(),
            occurred_at: Utc::now(),
        })
    }

    #[test]
    fn lines_are_numbered_and_totalled() {
        let mut f = draft();
        add_line(&mut f, 1_000);
        add_line(&mut f, 500);

        let nos: Vec<u32> = f.quote.lines().iter().map(|l| l.line_no).collect();
        assert_eq!(nos, vec![1, 2]);
        assert_eq!(f.quote.totals().subtotal, 3_000);
        assert_eq!(f.quote.totals().tax, 600);
        assert_eq!(f.quote.totals().total, 3_600);
    }

    #[test]
    fn removing_a_line_updates_totals() {
        let mut f = draft();
        add_line(&mut f, 1_000);
        add_line(&mut f, 500);

        execute(
            &mut f.quote,
            &QuoteCommand::RemoveQuoteLine(RemoveQuoteLine {
                tenant_id: f.tenant_id,
                quote_id: f.quote_id,
                line_no: 1,
                occurred_at: Utc::now(),
            }),
        )
        .unwrap();

        assert_eq!(f.quote.lines().len(), 1);
        assert_eq!(f.quote.totals().subtotal, 1_000);
        add_line(&mut f, 700);
        assert_eq!(f.quote.lines()[1].line_no, 3);
    }

    #[test]
    fn cannot_send_empty_quote() {
        let f = draft();
        let err = f
            .quote
            .handle(&QuoteCommand::SendQuote(SendQuote {
                tenant_id: f.tenant_id,
                quote_id: f.quote_id,
                occurred_at: Utc::now(),
            }))
            .unwrap_err();
        assert!(matches!(err, DomainError::InvariantViolation(msg) if msg.contains("without lines")));
    }

    #[test]
    fn lines_are_frozen_after_sending() {
        let mut f = draft();
        add_line(&mut f, 1_000);
        send(&mut f);

        let err = f
            .quote
            .handle(&QuoteCommand::AddQuoteLine(AddQuoteLine {
                tenant_id: f.tenant_id,
                quote_id: f.quote_id,
                line: line(1),
                occurred_at: Utc::now(),
            }))
            .unwrap_err();
        assert!(matches!(err, DomainError::InvariantViolation(msg) if msg.contains("status 'sent'")));
    }

    #[test]
    fn expired_quote_cannot_be_accepted() {
        let mut f = draft();
        add_line(&mut f, 1_000);
        send(&mut f);

        let later = Utc::now() + Duration::days(31);
        let err = f
            .quote
            .handle(&QuoteCommand::AcceptQuote(AcceptQuote {
                tenant_id: f.tenant_id,
                quote_id: f.quote_id,
                occurred_at: later,
            }))
            .unwrap_err();
        assert!(matches!(err, DomainError::InvariantViolation(msg) if msg.contains("expired")));
    }

    #[test]
    fn draft_cannot_be_converted() {
        let mut f = draft();
        add_line(&mut f, 1_000);
        assert!(!f.quote.can_convert());
        assert!(matches!(
            f.quote.handle(&convert_cmd(&f)),
            Err(DomainError::InvariantViolation(_))
        ));
    }

    #[test]
    fn accepted_quote_converts_exactly_once() {
        let mut f = draft();
        add_line(&mut f, 1_000);
        send(&mut f);
        execute(
            &mut f.quote,
            &QuoteCommand::AcceptQuote(AcceptQuote {
                tenant_id: f.tenant_id,
                quote_id: f.quote_id,
                occurred_at: Utc::now(),
            }),
        )
        .unwrap();

        let cmd = convert_cmd(&f);
        execute(&mut f.quote, &cmd).unwrap();
        assert_eq!(f.quote.status(), QuoteStatus::Converted);
        assert!(f.quote.converted_invoice_id().is_some());

        let again = f.quote.handle(&convert_cmd(&f)).unwrap_err();
        assert!(matches!(again, DomainError::Conflict(msg) if msg.contains("already converted")));
    }

    #[test]
    fn sent_quote_can_convert_directly() {
        let mut f = draft();
        add_line(&mut f, 1_000);
        send(&mut f);
        assert!(f.quote.can_convert());
        assert!(f.quote.handle(&convert_cmd(&f)).is_ok());
    }

    #[test]
    fn declined_quote_cannot_convert() {
        let mut f = draft();
        add_line(&mut f, 1_000);
        send(&mut f);
        execute(
            &mut f.quote,
            &QuoteCommand::DeclineQuote(DeclineQuote {
                tenant_id: f.tenant_id,
                quote_id: f.quote_id,
                reason: Some("too expensive".to_string()),
                occurred_at: Utc::now(),
            }),
        )
        .unwrap();

        assert_eq!(f.quote.status(), QuoteStatus::Declined);
        assert!(f.quote.handle(&convert_cmd(&f)).is_err());
    }

    #[test]
    fn create_validates_currency_and_validity() {
        let quote = Quote::empty(QuoteId::new(AggregateId::new()));
        let base = CreateQuote {
            tenant_id: TenantId::new(),
            quote_id: *quote.id(),
            number: "QUO-1".to_string(),
            customer_id: PartyId::new(AggregateId::new()),
            project_id: None,
            currency: "eur".to_string(),
            valid_until: Utc::now().date_naive(),
            notes: None,
            occurred_at: Utc::now(),
        };
        assert!(quote.handle(&QuoteCommand::CreateQuote(base.clone())).is_err());

        let past = CreateQuote {
            currency: "EUR".to_string(),
            valid_until: Utc::now().date_naive() - Duration::days(1),
            ..base
        };
        assert!(matches!(
            quote.handle(&QuoteCommand::CreateQuote(past)),
            Err(DomainError::Validation(msg)) if msg.contains("valid_until")
        ));
    }
}
