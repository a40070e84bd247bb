//! `DocumentSequence` aggregate.
//!
//! A sequence stream is addressed by `(tenant, kind)` rather than by a
//! client-generated id, so the stream id is derived deterministically (see
//! [`SequenceId::for_kind`]). A sequence that was never configured still
//! allocates, using the kind's default prefix and padding.
//!
//! Gap-freeness comes from the commit, not from this aggregate: allocation is
//! appended with an exact expected revision in the same batch as the document
//! that consumes the number, so a failed or conflicting commit leaves the
//! counter untouched.

use core::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use bizdesk_core::{Aggregate, AggregateId, AggregateRoot, DomainError, TenantId};
use bizdesk_events::Event;

pub const DEFAULT_PADDING: u8 = 5;
pub const MAX_PADDING: u8 = 12;
pub const MAX_PREFIX_LEN: usize = 16;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DocumentKind {
    Quote,
    Invoice,
    PurchaseOrder,
}

impl DocumentKind {
    pub const ALL: [DocumentKind; 3] = [
        DocumentKind::Quote,
        DocumentKind::Invoice,
        DocumentKind::PurchaseOrder,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            DocumentKind::Quote => "quote",
            DocumentKind::Invoice => "invoice",
            DocumentKind::PurchaseOrder => "purchase_order",
        }
    }

    pub fn default_prefix(self) -> &'static str {
        match self {
            DocumentKind::Quote => "QUO-",
            DocumentKind::Invoice => "INV-",
            DocumentKind::PurchaseOrder => "PO-",
        }
    }
}

impl core::fmt::Display for DocumentKind {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for DocumentKind {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "quote" | "quotes" => Ok(DocumentKind::Quote),
            "invoice" | "invoices" => Ok(DocumentKind::Invoice),
            "purchase_order" | "purchase-order" | "purchase-orders" | "po" => {
                Ok(DocumentKind::PurchaseOrder)
            }
            other => Err(DomainError::validation(format!("unknown document kind '{other}'"))),
        }
    }
}

#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SequenceId(pub AggregateId);

impl SequenceId {
    /// The one stream holding `kind` numbers for `tenant_id`.
    pub fn for_kind(tenant_id: TenantId, kind: DocumentKind) -> Self {
        Self(AggregateId::derived(
            tenant_id.as_uuid(),
            &format!("sequence:{}", kind.as_str()),
        ))
    }
}

impl core::fmt::Display for SequenceId {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        core::fmt::Display::fmt(&self.0, f)
    }
}

/// `prefix` followed by `value` left-padded with zeros to `padding` digits.
///
/// Values wider than `padding` are printed in full.
pub fn format_number(prefix: &str, padding: u8, value: u64) -> String {
    format!("{prefix}{value:0>width$}", width = padding as usize)
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DocumentSequence {
    id: SequenceId,
    tenant_id: Option<TenantId>,
    kind: Option<DocumentKind>,
    prefix: String,
    padding: u8,
    next_value: u64,
    version: u64,
    created: bool,
}

impl DocumentSequence {
    pub fn empty(id: SequenceId) -> Self {
        Self {
            id,
            tenant_id: None,
            kind: None,
            prefix: String::new(),
            padding: DEFAULT_PADDING,
            next_value: 1,
            version: 0,
            created: false,
        }
    }

    pub fn id_typed(&self) -> SequenceId {
        self.id
    }

    pub fn tenant_id(&self) -> Option<TenantId> {
        self.tenant_id
    }

    pub fn is_created(&self) -> bool {
        self.created
    }

    pub fn kind(&self) -> Option<DocumentKind> {
        self.kind
    }

    pub fn prefix(&self) -> &str {
        &self.prefix
    }

    pub fn padding(&self) -> u8 {
        self.padding
    }

    pub fn next_value(&self) -> u64 {
        self.next_value
    }

    /// Settings in effect for `kind`, falling back to defaults for an
    /// untouched stream.
    pub fn effective_settings(&self, kind: DocumentKind) -> (String, u8, u64) {
        if self.created {
            (self.prefix.clone(), self.padding, self.next_value)
        } else {
            (kind.default_prefix().to_string(), DEFAULT_PADDING, 1)
        }
    }

    /// The number the next allocation would produce.
    pub fn peek(&self, kind: DocumentKind) -> String {
        let (prefix, padding, next) = self.effective_settings(kind);
        format_number(&prefix, padding, next)
    }
}

impl AggregateRoot for DocumentSequence {
    type Id = SequenceId;

    fn id(&self) -> &Self::Id {
        &self.id
    }

    fn version(&self) -> u64 {
        self.version
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConfigureSequence {
    pub tenant_id: TenantId,
    pub sequence_id: SequenceId,
    pub kind: DocumentKind,
    pub prefix: String,
    pub padding: u8,
    /// Must not be lower than the current next value.
    pub next_value: u64,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AllocateNumber {
    pub tenant_id: TenantId,
    pub sequence_id: SequenceId,
    pub kind: DocumentKind,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum SequenceCommand {
    ConfigureSequence(ConfigureSequence),
    AllocateNumber(AllocateNumber),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SequenceConfigured {
    pub tenant_id: TenantId,
    pub sequence_id: SequenceId,
    pub kind: DocumentKind,
    pub prefix: String,
    pub padding: u8,
    pub next_value: u64,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NumberAllocated {
    pub tenant_id: TenantId,
    pub sequence_id: SequenceId,
    pub kind: DocumentKind,
    pub prefix: String,
    pub padding: u8,
    pub value: u64,
    pub formatted: String,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum SequenceEvent {
    SequenceConfigured(SequenceConfigured),
    NumberAllocated(NumberAllocated),
}

impl Event for SequenceEvent {
    fn event_type(&self) -> &'static str {
        match self {
            SequenceEvent::SequenceConfigured(_) => "numbering.sequence.configured",
            SequenceEvent::NumberAllocated(_) => "numbering.sequence.number_allocated",
        }
    }

    fn version(&self) -> u32 {
        1
    }

    fn occurred_at(&self) -> DateTime<Utc> {
        match self {
            SequenceEvent::SequenceConfigured(e) => e.occurred_at,
            SequenceEvent::NumberAllocated(e) => e.occurred_at,
        }
    }
}

impl Aggregate for DocumentSequence {
    type Command = SequenceCommand;
    type Event = SequenceEvent;
    type Error = DomainError;

    fn apply(&mut self, event: &Self::Event) {
        match event {
            SequenceEvent::SequenceConfigured(e) => {
                self.id = e.sequence_id;
                self.tenant_id = Some(e.tenant_id);
                self.kind = Some(e.kind);
                self.prefix = e.prefix.clone();
                self.padding = e.padding;
                self.next_value = e.next_value;
                self.created = true;
            }
            SequenceEvent::NumberAllocated(e) => {
                self.id = e.sequence_id;
                self.tenant_id = Some(e.tenant_id);
                self.kind = Some(e.kind);
                self.prefix = e.prefix.clone();
                self.padding = e.padding;
                self.next_value = e.value + 1;
                self.created = true;
            }
        }

        self.version += 1;
    }

    fn handle(&self, command: &Self::Command) -> Result<Vec<Self::Event>, Self::Error> {
        match command {
            SequenceCommand::ConfigureSequence(cmd) => self.handle_configure(cmd),
            SequenceCommand::AllocateNumber(cmd) => self.handle_allocate(cmd),
        }
    }
}

impl DocumentSequence {
    fn ensure_stream(
        &self,
        tenant_id: TenantId,
        sequence_id: SequenceId,
        kind: DocumentKind,
    ) -> Result<(), DomainError> {
        if self.id != sequence_id {
            return Err(DomainError::invariant("sequence_id mismatch"));
        }
        if sequence_id != SequenceId::for_kind(tenant_id, kind) {
            return Err(DomainError::invariant("sequence does not belong to this tenant and kind"));
        }
        if self.created && (self.tenant_id != Some(tenant_id) || self.kind != Some(kind)) {
            return Err(DomainError::invariant("tenant mismatch"));
        }
        Ok(())
    }

    fn handle_configure(&self, cmd: &ConfigureSequence) -> Result<Vec<SequenceEvent>, DomainError> {
        self.ensure_stream(cmd.tenant_id, cmd.sequence_id, cmd.kind)?;

        if cmd.prefix.len() > MAX_PREFIX_LEN || cmd.prefix.chars().any(char::is_whitespace) {
            return Err(DomainError::validation(format!(
                "prefix must be at most {MAX_PREFIX_LEN} characters without whitespace"
            )));
        }
        if !(1..=MAX_PADDING).contains(&cmd.padding) {
            return Err(DomainError::validation(format!(
                "padding must be between 1 and {MAX_PADDING}"
            )));
        }
        let (_, _, current_next) = self.effective_settings(cmd.kind);
        if cmd.next_value < current_next {
            return Err(DomainError::invariant(format!(
                "next value cannot go backwards (current {current_next}, requested {})",
                cmd.next_value
            )));
        }

        Ok(vec![SequenceEvent::SequenceConfigured(SequenceConfigured {
            tenant_id: cmd.tenant_id,
            sequence_id: cmd.sequence_id,
            kind: cmd.kind,
            prefix: cmd.prefix.clone(),
            padding: cmd.padding,
            next_value: cmd.next_value,
            occurred_at: cmd.occurred_at,
        })])
    }

    fn handle_allocate(&self, cmd: &AllocateNumber) -> Result<Vec<SequenceEvent>, DomainError> {
        self.ensure_stream(cmd.tenant_id, cmd.sequence_id, cmd.kind)?;

        let (prefix, padding, value) = self.effective_settings(cmd.kind);
        if value == u64::MAX {
            return Err(DomainError::invariant("sequence exhausted"));
        }

        Ok(vec![SequenceEvent::NumberAllocated(NumberAllocated {
            tenant_id: cmd.tenant_id,
            sequence_id: cmd.sequence_id,
            kind: cmd.kind,
            formatted: format_number(&prefix, padding, value),
            prefix,
            padding,
            value,
            occurred_at: cmd.occurred_at,
        })])
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bizdesk_events::execute;
    use proptest::prelude::*;

    fn allocate(seq: &mut DocumentSequence, tenant_id: TenantId, kind: DocumentKind) -> NumberAllocated {
        let events = execute(
            seq,
            &SequenceCommand::AllocateNumber(AllocateNumber {
                tenant_id,
                sequence_id: SequenceId::for_kind(tenant_id, kind),
                kind,
                occurred_at: Utc::now(),
            }),
        )
        .unwrap();
        match events.into_iter().next() {
            Some(SequenceEvent::NumberAllocated(e)) => e,
            other => panic!("expected NumberAllocated, got {other:?}"),
        }
    }

    fn configure(tenant_id: TenantId, kind: DocumentKind, prefix: &str, padding: u8, next_value: u64) -> SequenceCommand {
        SequenceCommand::ConfigureSequence(ConfigureSequence {
            tenant_id,
            sequence_id: SequenceId::for_kind(tenant_id, kind),
            kind,
            prefix: prefix.to_string(),
            padding,
            next_value,
            occurred_at: Utc::now(),
        })
    }

    #[test]
    fn unconfigured_sequence_uses_defaults() {
        let tenant_id = TenantId::new();
        let mut seq = DocumentSequence::empty(SequenceId::for_kind(tenant_id, DocumentKind::Invoice));

        assert_eq!(allocate(&mut seq, tenant_id, DocumentKind::Invoice).formatted, "INV-00001");
        assert_eq!(allocate(&mut seq, tenant_id, DocumentKind::Invoice).formatted, "INV-00002");
        assert_eq!(seq.next_value(), 3);
        assert_eq!(seq.version(), 2);
    }

    #[test]
    fn default_prefixes_per_kind() {
        let tenant_id = TenantId::new();
        for (kind, expected) in [
            (DocumentKind::Quote, "QUO-00001"),
            (DocumentKind::PurchaseOrder, "PO-00001"),
        ] {
            let mut seq = DocumentSequence::empty(SequenceId::for_kind(tenant_id, kind));
            assert_eq!(allocate(&mut seq, tenant_id, kind).formatted, expected);
        }
    }

    #[test]
    fn configured_sequence_continues_from_next_value() {
        let tenant_id = TenantId::new();
        let kind = DocumentKind::Invoice;
        let mut seq = DocumentSequence::empty(SequenceId::for_kind(tenant_id, kind));

        execute(&mut seq, &configure(tenant_id, kind, "F2026/", 4, 42)).unwrap();

        let n = allocate(&mut seq, tenant_id, kind);
        assert_eq!(n.value, 42);
        assert_eq!(n.formatted, "F2026/0042");
    }

    #[test]
    fn next_value_cannot_go_backwards() {
        let tenant_id = TenantId::new();
        let kind = DocumentKind::Quote;
        let mut seq = DocumentSequence::empty(SequenceId::for_kind(tenant_id, kind));
        for _ in 0..5 {
            allocate(&mut seq, tenant_id, kind);
        }

        let err = seq.handle(&configure(tenant_id, kind, "Q-", 3, 5)).unwrap_err();
        assert!(matches!(err, DomainError::InvariantViolation(msg) if msg.contains("backwards")));
        assert!(seq.handle(&configure(tenant_id, kind, "Q-", 3, 6)).is_ok());
    }

    #[test]
    fn configure_validates_prefix_and_padding() {
        let tenant_id = TenantId::new();
        let kind = DocumentKind::Quote;
        let seq = DocumentSequence::empty(SequenceId::for_kind(tenant_id, kind));

        assert!(seq.handle(&configure(tenant_id, kind, "HAS SPACE", 5, 1)).is_err());
        assert!(seq.handle(&configure(tenant_id, kind, "Q-", 0, 1)).is_err());
        assert!(seq.handle(&configure(tenant_id, kind, "Q-", 13, 1)).is_err());
    }

    #[test]
    fn foreign_stream_is_rejected() {
        let tenant_id = TenantId::new();
        let other = TenantId::new();
        let seq = DocumentSequence::empty(SequenceId::for_kind(tenant_id, DocumentKind::Invoice));

        let err = seq
            .handle(&SequenceCommand::AllocateNumber(AllocateNumber {
                tenant_id: other,
                sequence_id: SequenceId::for_kind(tenant_id, DocumentKind::Invoice),
                kind: DocumentKind::Invoice,
                occurred_at: Utc::now(),
            }))
            .unwrap_err();
        assert!(matches!(err, DomainError::InvariantViolation(_)));
    }

    #[test]
    fn kind_parses_from_route_segments() {
        assert_eq!("invoices".parse::<DocumentKind>().unwrap(), DocumentKind::Invoice);
        assert_eq!("purchase-orders".parse::<DocumentKind>().unwrap(), DocumentKind::PurchaseOrder);
        assert!("receipts".parse::<DocumentKind>().is_err());
    }

    proptest! {
        #[test]
        fn formatted_number_round_trips_value(
            prefix in "[A-Z]{0,6}-?",
            padding in 1u8..=MAX_PADDING,
            value in 1u64..10_000_000_000u64,
        ) {
            let s = format_number(&prefix, padding, value);
            let digits = s.strip_prefix(prefix.as_str()).unwrap();
            prop_assert!(digits.len() >= padding as usize);
            prop_assert_eq!(digits.parse::<u64>().unwrap(), value);
        }

        #[test]
        fn allocations_are_consecutive(n in 1usize..50) {
            let tenant_id = TenantId::new();
            let kind = DocumentKind::PurchaseOrder;
            let mut seq = DocumentSequence::empty(SequenceId::for_kind(tenant_id, kind));
            let values: Vec<u64> = (0..n).map(|_| allocate(&mut seq, tenant_id, kind).value).collect();
            let expected: Vec<u64> = (1..=n as u64).collect();
            prop_assert_eq!(values, expected);
        }
    }
}
