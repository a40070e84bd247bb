use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use bizdesk_core::{Aggregate, AggregateId, AggregateRoot, DomainError, TenantId};
use bizdesk_events::Event;

/// Upper bound on payment terms a party can be given.
pub const MAX_PAYMENT_TERMS_DAYS: u32 = 365;

#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PartyId(pub AggregateId);

impl PartyId {
    pub fn new(id: AggregateId) -> Self {
        Self(id)
    }
}

impl core::fmt::Display for PartyId {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        core::fmt::Display::fmt(&self.0, f)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PartyKind {
    Customer,
    Supplier,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PartyStatus {
    Active,
    Suspended,
}

/// Where documents for a party are addressed.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContactInfo {
    pub email: Option<String>,
    pub phone: Option<String>,
    pub address: Option<String>,
}

impl ContactInfo {
    fn validate(&self) -> Result<(), DomainError> {
        if let Some(email) = &self.email {
            let email = email.trim();
            if email.is_empty() || !email.contains('@') {
                return Err(DomainError::validation(format!("invalid email '{email}'")));
            }
        }
        Ok(())
    }
}

/// Aggregate root: Party.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Party {
    id: PartyId,
    tenant_id: Option<TenantId>,
    kind: PartyKind,
    name: String,
    contact: ContactInfo,
    tax_id: Option<String>,
    payment_terms_days: u32,
    status: PartyStatus,
    version: u64,
    created: bool,
}

impl Party {
    /// Not-yet-created instance for rehydration.
    pub fn empty(id: PartyId) -> Self {
        Self {
            id,
            tenant_id: None,
            kind: PartyKind::Customer,
            name: String::new(),
            contact: ContactInfo::default(),
            tax_id: None,
            payment_terms_days: 0,
            status: PartyStatus::Active,
            version: 0,
            created: false,
        }
    }

    pub fn id_typed(&self) -> PartyId {
        self.id
    }

    pub fn tenant_id(&self) -> Option<TenantId> {
        self.tenant_id
    }

    pub fn is_created(&self) -> bool {
        self.created
    }

    pub fn kind(&self) -> PartyKind {
        self.kind
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn contact(&self) -> &ContactInfo {
        &self.contact
    }

    pub fn tax_id(&self) -> Option<&str> {
        self.tax_id.as_deref()
    }

    pub fn payment_terms_days(&self) -> u32 {
        self.payment_terms_days
    }

    pub fn status(&self) -> PartyStatus {
        self.status
    }

    /// Suspended parties cannot be quoted, invoiced or ordered from.
    pub fn can_transact(&self) -> bool {
        self.created && self.status == PartyStatus::Active
    }
}

impl AggregateRoot for Party {
    type Id = PartyId;

    fn id(&self) -> &Self::Id {
        &self.id
    }

    fn version(&self) -> u64 {
        self.version
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RegisterParty {
    pub tenant_id: TenantId,
    pub party_id: PartyId,
    pub kind: PartyKind,
    pub name: String,
    pub contact: Option<ContactInfo>,
    pub tax_id: Option<String>,
    pub payment_terms_days: u32,
    pub occurred_at: DateTime<Utc>,
}

/// Partial update; `None` keeps the current value.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UpdateDetails {
    pub tenant_id: TenantId,
    pub party_id: PartyId,
    pub name: Option<String>,
    pub contact: Option<ContactInfo>,
    pub tax_id: Option<String>,
    pub payment_terms_days: Option<u32>,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SuspendParty {
    pub tenant_id: TenantId,
    pub party_id: PartyId,
    pub reason: Option<String>,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReactivateParty {
    pub tenant_id: TenantId,
    pub party_id: PartyId,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum PartyCommand {
    RegisterParty(RegisterParty),
    UpdateDetails(UpdateDetails),
    SuspendParty(SuspendParty),
    ReactivateParty(ReactivateParty),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PartyRegistered {
    pub tenant_id: TenantId,
    pub party_id: PartyId,
    pub kind: PartyKind,
    pub name: String,
    pub contact: ContactInfo,
    pub tax_id: Option<String>,
    pub payment_terms_days: u32,
    pub occurred_at: DateTime<Utc>,
}

/// Carries the full post-update details, not a diff.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PartyUpdated {
    pub tenant_id: TenantId,
    pub party_id: PartyId,
    pub name: String,
    pub contact: ContactInfo,
    pub tax_id: Option<String>,
    pub payment_terms_days: u32,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PartySuspended {
    pub tenant_id: TenantId,
    pub party_id: PartyId,
    pub reason: Option<String>,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PartyReactivated {
    pub tenant_id: TenantId,
    pub party_id: PartyId,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum PartyEvent {
    PartyRegistered(PartyRegistered),
    PartyUpdated(PartyUpdated),
    PartySuspended(PartySuspended),
    PartyReactivated(PartyReactivated),
}

impl Event for PartyEvent {
    fn event_type(&self) -> &'static str {
        match self {
            PartyEvent::PartyRegistered(_) => "parties.party.registered",
            PartyEvent::PartyUpdated(_) => "parties.party.updated",
            PartyEvent::PartySuspended(_) => "parties.party.suspended",
            PartyEvent::PartyReactivated(_) => "parties.party.reactivated",
        }
    }

    fn version(&self) -> u32 {
        1
    }

    fn occurred_at(&self) -> DateTime<Utc> {
        match self {
            PartyEvent::PartyRegistered(e) => e.occurred_at,
            PartyEvent::PartyUpdated(e) => e.occurred_at,
            PartyEvent::PartySuspended(e) => e.occurred_at,
            PartyEvent::PartyReactivated(e) => e.occurred_at,
        }
    }
}

impl Aggregate for Party {
    type Command = PartyCommand;
    type Event = PartyEvent;
    type Error = DomainError;

    fn apply(&mut self, event: &Self::Event) {
        match event {
            PartyEvent::PartyRegistered(e) => {
                self.id = e.party_id;
                self.tenant_id = Some(e.tenant_id);
                self.kind = e.kind;
                self.name = e.name.clone();
                self.contact = e.contact.clone();
                self.tax_id = e.tax_id.clone();
                self.payment_terms_days = e.payment_terms_days;
                self.status = PartyStatus::Active;
                self.created = true;
            }
            PartyEvent::PartyUpdated(e) => {
                self.name = e.name.clone();
                self.contact = e.contact.clone();
                self.tax_id = e.tax_id.clone();
                self.payment_terms_days = e.payment_terms_days;
            }
            PartyEvent::PartySuspended(_) => {
                self.status = PartyStatus::Suspended;
            }
            PartyEvent::PartyReactivated(_) => {
                self.status = PartyStatus::Active;
            }
        }

        self.version += 1;
    }

    fn handle(&self, command: &Self::Command) -> Result<Vec<Self::Event>, Self::Error> {
        match command {
            PartyCommand::RegisterParty(cmd) => self.handle_register(cmd),
            PartyCommand::UpdateDetails(cmd) => self.handle_update(cmd),
            PartyCommand::SuspendParty(cmd) => self.handle_suspend(cmd),
            PartyCommand::ReactivateParty(cmd) => self.handle_reactivate(cmd),
        }
    }
}

impl Party {
    fn ensure_exists(&self, tenant_id: TenantId, party_id: PartyId) -> Result<(), DomainError> {
        if !self.created {
            return Err(DomainError::not_found());
        }
        if self.tenant_id != Some(tenant_id) {
            return Err(DomainError::invariant("tenant mismatch"));
        }
        if self.id != party_id {
            return Err(DomainError::invariant("party_id mismatch"));
        }
        Ok(())
    }

    fn validate_details(name: &str, contact: &ContactInfo, terms: u32) -> Result<(), DomainError> {
        if name.trim().is_empty() {
            return Err(DomainError::validation("name cannot be empty"));
        }
        contact.validate()?;
        if terms > MAX_PAYMENT_TERMS_DAYS {
            return Err(DomainError::validation(format!(
                "payment terms cannot exceed {MAX_PAYMENT_TERMS_DAYS} days"
            )));
        }
        Ok(())
    }

    fn handle_register(&self, cmd: &RegisterParty) -> Result<Vec<PartyEvent>, DomainError> {
        if self.created {
            return Err(DomainError::conflict("party already exists"));
        }

        let contact = cmd.contact.clone().unwrap_or_default();
        Self::validate_details(&cmd.name, &contact, cmd.payment_terms_days)?;

        Ok(vec![PartyEvent::PartyRegistered(PartyRegistered {
            tenant_id: cmd.tenant_id,
            party_id: cmd.party_id,
            kind: cmd.kind,
            name: cmd.name.trim().to_string(),
            contact,
            tax_id: cmd.tax_id.clone(),
            payment_terms_days: cmd.payment_terms_days,
            occurred_at: cmd.occurred_at,
        })])
    }

    fn handle_update(&self, cmd: &UpdateDetails) -> Result<Vec<PartyEvent>, DomainError> {
        self.ensure_exists(cmd.tenant_id, cmd.party_id)?;

        let name = cmd
            .name
            .as_deref()
            .map(|n| n.trim().to_string())
            .unwrap_or_else(|| self.name.clone());
        let contact = cmd.contact.clone().unwrap_or_else(|| self.contact.clone());
        let terms = cmd.payment_terms_days.unwrap_or(self.payment_terms_days);
        Self::validate_details(&name, &contact, terms)?;

        Ok(vec![PartyEvent::PartyUpdated(PartyUpdated {
            tenant_id: cmd.tenant_id,
            party_id: cmd.party_id,
            name,
            contact,
            tax_id: cmd.tax_id.clone().or_else(|| self.tax_id.clone()),
            payment_terms_days: terms,
            occurred_at: cmd.occurred_at,
        })])
    }

    fn handle_suspend(&self, cmd: &SuspendParty) -> Result<Vec<PartyEvent>, DomainError> {
        self.ensure_exists(cmd.tenant_id, cmd.party_id)?;

        if self.status == PartyStatus::Suspended {
            return Err(DomainError::conflict("party is already suspended"));
        }

        Ok(vec![PartyEvent::PartySuspended(PartySuspended {
            tenant_id: cmd.tenant_id,
            party_id: cmd.party_id,
            reason: cmd.reason.clone(),
            occurred_at: cmd.occurred_at,
        })])
    }

    fn handle_reactivate(&self, cmd: &ReactivateParty) -> Result<Vec<PartyEvent>, DomainError> {
        self.ensure_exists(cmd.tenant_id, cmd.party_id)?;

        if self.status == PartyStatus::Active {
            return Err(DomainError::conflict("party is already active"));
        }

        Ok(vec![PartyEvent::PartyReactivated(PartyReactivated {
            tenant_id: cmd.tenant_id,
            party_id: cmd.party_id,
            occurred_at: cmd.occurred_at,
        })])
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bizdesk_events::execute;

    fn test_tenant_id() -> TenantId {
        TenantId::new()
    }

    fn test_party_id() -> PartyId {
        PartyId::new(AggregateId::new())
    }

    fn register_cmd(tenant_id: TenantId, party_id: PartyId) -> RegisterParty {
        RegisterParty {
            tenant_id,
            party_id,
            kind: PartyKind::Customer,
            name: "  Acme Ltd ".to_string(),
            contact: Some(ContactInfo {
                email: Some("billing@acme.test".to_string()),
                phone: None,
                address: Some("1 Main St".to_string()),
            }),
            tax_id: Some("GB123".to_string()),
            payment_terms_days: 30,
            occurred_at: Utc::now(),
        }
    }

    fn registered(tenant_id: TenantId, party_id: PartyId) -> Party {
        let mut party = Party::empty(party_id);
        execute(&mut party, &PartyCommand::RegisterParty(register_cmd(tenant_id, party_id))).unwrap();
        party
    }

    #[test]
    fn register_trims_name_and_keeps_terms() {
        let tenant_id = test_tenant_id();
        let party_id = test_party_id();
        let party = registered(tenant_id, party_id);

        assert_eq!(party.name(), "Acme Ltd");
        assert_eq!(party.payment_terms_days(), 30);
        assert_eq!(party.tax_id(), Some("GB123"));
        assert_eq!(party.version(), 1);
        assert!(party.can_transact());
    }

    #[test]
    fn register_rejects_bad_email_and_long_terms() {
        let party = Party::empty(test_party_id());

        let mut cmd = register_cmd(test_tenant_id(), test_party_id());
        cmd.contact = Some(ContactInfo {
            email: Some("nope".to_string()),
            ..ContactInfo::default()
        });
        assert!(matches!(
            party.handle(&PartyCommand::RegisterParty(cmd)),
            Err(DomainError::Validation(_))
        ));

        let mut cmd = register_cmd(test_tenant_id(), test_party_id());
        cmd.payment_terms_days = 400;
        assert!(matches!(
            party.handle(&PartyCommand::RegisterParty(cmd)),
            Err(DomainError::Validation(msg)) if msg.contains("payment terms")
        ));
    }

    #[test]
    fn register_twice_is_a_conflict() {
        let tenant_id = test_tenant_id();
        let party_id = test_party_id();
        let party = registered(tenant_id, party_id);

        let err = party
            .handle(&PartyCommand::RegisterParty(register_cmd(tenant_id, party_id)))
            .unwrap_err();
        assert!(matches!(err, DomainError::Conflict(_)));
    }

    #[test]
    fn update_keeps_unspecified_fields() {
        let tenant_id = test_tenant_id();
        let party_id = test_party_id();
        let mut party = registered(tenant_id, party_id);

        execute(
            &mut party,
            &PartyCommand::UpdateDetails(UpdateDetails {
                tenant_id,
                party_id,
                name: None,
                contact: None,
                tax_id: None,
                payment_terms_days: Some(14),
                occurred_at: Utc::now(),
            }),
        )
        .unwrap();

        assert_eq!(party.name(), "Acme Ltd");
        assert_eq!(party.payment_terms_days(), 14);
        assert_eq!(party.contact().email.as_deref(), Some("billing@acme.test"));
    }

    #[test]
    fn update_on_missing_party_is_not_found() {
        let party = Party::empty(test_party_id());
        let err = party
            .handle(&PartyCommand::UpdateDetails(UpdateDetails {
                tenant_id: test_tenant_id(),
                party_id: *party.id(),
                name: Some("x".to_string()),
                contact: None,
                tax_id: None,
                payment_terms_days: None,
                occurred_at: Utc::now(),
            }))
            .unwrap_err();
        assert_eq!(err, DomainError::NotFound);
    }

    #[test]
    fn suspend_and_reactivate_toggle_can_transact() {
        let tenant_id = test_tenant_id();
        let party_id = test_party_id();
        let mut party = registered(tenant_id, party_id);

        execute(
            &mut party,
            &PartyCommand::SuspendParty(SuspendParty {
                tenant_id,
                party_id,
                reason: Some("unpaid invoices".to_string()),
                occurred_at: Utc::now(),
            }),
        )
        .unwrap();
        assert!(!party.can_transact());

        let again = party.handle(&PartyCommand::SuspendParty(SuspendParty {
            tenant_id,
            party_id,
            reason: None,
            occurred_at: Utc::now(),
        }));
        assert!(matches!(again, Err(DomainError::Conflict(_))));

        execute(
            &mut party,
            &PartyCommand::ReactivateParty(ReactivateParty {
                tenant_id,
                party_id,
                occurred_at: Utc::now(),
            }),
        )
        .unwrap();
        assert!(party.can_transact());
        assert_eq!(party.version(), 3);
    }

    #[test]
    fn other_tenant_cannot_touch_party() {
        let party_id = test_party_id();
        let party = registered(test_tenant_id(), party_id);

        let err = party
            .handle(&PartyCommand::SuspendParty(SuspendParty {
                tenant_id: test_tenant_id(),
                party_id,
                reason: None,
                occurred_at: Utc::now(),
            }))
            .unwrap_err();
        assert!(matches!(err, DomainError::InvariantViolation(msg) if msg.contains("tenant")));
    }
}
