//! Read models built from published events.
//!
//! Projections are:
//! - **Rebuildable**: reconstructed from the event log at any time
//! - **Tenant-isolated**: every record is partitioned by tenant
//! - **Idempotent**: safe under at-least-once delivery

pub mod stream;

use std::sync::Arc;

use serde_json::Value as JsonValue;

use bizdesk_catalog::CatalogItem;
use bizdesk_core::{AggregateId, TenantId};
use bizdesk_events::EventEnvelope;
use bizdesk_inventory::StockItem;
use bizdesk_invoicing::Invoice;
use bizdesk_numbering::DocumentSequence;
use bizdesk_parties::Party;
use bizdesk_projects::Project;
use bizdesk_purchasing::PurchaseOrder;
use bizdesk_quotes::Quote;
use bizdesk_timesheets::TimeEntry;

use crate::event_store::StoredEvent;
use crate::read_model::InMemoryTenantStore;

pub use stream::{ProjectionError, StreamProjection};

pub type InMemoryProjection<A> = StreamProjection<A, Arc<InMemoryTenantStore<AggregateId, A>>>;

fn in_memory<A>() -> InMemoryProjection<A>
where
    A: crate::streams::EventSourced,
{
    StreamProjection::new(Arc::new(InMemoryTenantStore::new()))
}

/// One projection per stream type, fed from the same envelopes.
#[derive(Debug)]
pub struct Projections {
    pub parties: InMemoryProjection<Party>,
    pub catalog: InMemoryProjection<CatalogItem>,
    pub projects: InMemoryProjection<Project>,
    pub sequences: InMemoryProjection<DocumentSequence>,
    pub quotes: InMemoryProjection<Quote>,
    pub invoices: InMemoryProjection<Invoice>,
    pub purchase_orders: InMemoryProjection<PurchaseOrder>,
    pub stock: InMemoryProjection<StockItem>,
    pub time_entries: InMemoryProjection<TimeEntry>,
}

impl Default for Projections {
    fn default() -> Self {
        Self::new()
    }
}

impl Projections {
    pub fn new() -> Self {
        Self {
            parties: in_memory(),
            catalog: in_memory(),
            projects: in_memory(),
            sequences: in_memory(),
            quotes: in_memory(),
            invoices: in_memory(),
            purchase_orders: in_memory(),
            stock: in_memory(),
            time_entries: in_memory(),
        }
    }

    /// Route an envelope to the projection of its stream type.
    /// Unknown stream types are ignored.
    pub fn apply(&self, envelope: &EventEnvelope<JsonValue>) -> Result<(), ProjectionError> {
        match envelope.aggregate_type() {
            t if t == self.parties.aggregate_type() => self.parties.apply_envelope(envelope),
            t if t == self.catalog.aggregate_type() => self.catalog.apply_envelope(envelope),
            t if t == self.projects.aggregate_type() => self.projects.apply_envelope(envelope),
            t if t == self.sequences.aggregate_type() => self.sequences.apply_envelope(envelope),
            t if t == self.quotes.aggregate_type() => self.quotes.apply_envelope(envelope),
            t if t == self.invoices.aggregate_type() => self.invoices.apply_envelope(envelope),
            t if t == self.purchase_orders.aggregate_type() => {
                self.purchase_orders.apply_envelope(envelope)
            }
            t if t == self.stock.aggregate_type() => self.stock.apply_envelope(envelope),
            t if t == self.time_entries.aggregate_type() => {
                self.time_entries.apply_envelope(envelope)
            }
            other => {
                tracing::trace!(aggregate_type = other, "no projection for stream type");
                Ok(())
            }
        }
    }

    /// Apply a full stream from the store; already applied events are skipped.
    pub fn catch_up(&self, stream: &[StoredEvent]) -> Result<(), ProjectionError> {
        for stored in stream {
            self.apply(&stored.to_envelope())?;
        }
        Ok(())
    }

    /// Drop and rebuild every read model from the event log.
    #[tracing::instrument(skip_all, fields(events = log.len()))]
    pub fn rebuild(&self, log: &[StoredEvent]) -> Result<(), ProjectionError> {
        let envelopes: Vec<_> = log.iter().map(StoredEvent::to_envelope).collect();
        self.parties.rebuild_from_scratch(envelopes.iter().cloned())?;
        self.catalog.rebuild_from_scratch(envelopes.iter().cloned())?;
        self.projects.rebuild_from_scratch(envelopes.iter().cloned())?;
        self.sequences.rebuild_from_scratch(envelopes.iter().cloned())?;
        self.quotes.rebuild_from_scratch(envelopes.iter().cloned())?;
        self.invoices.rebuild_from_scratch(envelopes.iter().cloned())?;
        self.purchase_orders.rebuild_from_scratch(envelopes.iter().cloned())?;
        self.stock.rebuild_from_scratch(envelopes.iter().cloned())?;
        self.time_entries.rebuild_from_scratch(envelopes)?;
        tracing::info!("read models rebuilt");
        Ok(())
    }

    /// Position of one stream in its projection, for any stream type.
    pub fn position(&self, tenant_id: TenantId, aggregate_type: &str, id: AggregateId) -> u64 {
        match aggregate_type {
            t if t == self.parties.aggregate_type() => self.parties.position(tenant_id, id),
            t if t == self.catalog.aggregate_type() => self.catalog.position(tenant_id, id),
            t if t == self.projects.aggregate_type() => self.projects.position(tenant_id, id),
            t if t == self.sequences.aggregate_type() => self.sequences.position(tenant_id, id),
            t if t == self.quotes.aggregate_type() => self.quotes.position(tenant_id, id),
            t if t == self.invoices.aggregate_type() => self.invoices.position(tenant_id, id),
            t if t == self.purchase_orders.aggregate_type() => {
                self.purchase_orders.position(tenant_id, id)
            }
            t if t == self.stock.aggregate_type() => self.stock.position(tenant_id, id),
            t if t == self.time_entries.aggregate_type() => self.time_entries.position(tenant_id, id),
            _ => 0,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::command_dispatcher::CommandDispatcher;
    use crate::event_store::{EventStore, InMemoryEventStore};
    use bizdesk_events::{EventBus, InMemoryEventBus};
    use bizdesk_parties::{ContactInfo, PartyCommand, PartyId, PartyKind, RegisterParty};
    use chrono::Utc;

    fn register(tenant_id: TenantId, party_id: PartyId, name: &str) -> PartyCommand {
        PartyCommand::RegisterParty(RegisterParty {
            tenant_id,
            party_id,
            kind: PartyKind::Customer,
            name: name.to_string(),
            contact: Some(ContactInfo::default()),
            tax_id: None,
            payment_terms_days: 30,
            occurred_at: Utc::now(),
        })
    }

    #[tokio::test]
    async fn published_events_land_in_the_matching_projection() {
        let d = CommandDispatcher::new(InMemoryEventStore::new(), InMemoryEventBus::new());
        let sub = d.bus().subscribe();
        let projections = Projections::new();
        let t = TenantId::new();
        let id = PartyId::new(AggregateId::new());

        d.dispatch::<Party>(t, id.0, register(t, id, "Acme Ltd"))
            .await
            .unwrap();
        while let Ok(env) = sub.try_recv() {
            projections.apply(&env).unwrap();
        }

        assert_eq!(projections.parties.get(t, id.0).unwrap().name(), "Acme Ltd");
        assert!(projections.invoices.list(t).is_empty());
        assert_eq!(projections.position(t, "parties.party", id.0), 1);
    }

    #[tokio::test]
    async fn rebuild_matches_incremental_state() {
        let d = CommandDispatcher::new(InMemoryEventStore::new(), InMemoryEventBus::new());
        let t = TenantId::new();
        for name in ["Acme Ltd", "Globex", "Initech"] {
            let id = PartyId::new(AggregateId::new());
            d.dispatch::<Party>(t, id.0, register(t, id, name)).await.unwrap();
        }

        let projections = Projections::new();
        let log = d.store().load_all().await.unwrap();
        projections.rebuild(&log).unwrap();
        projections.rebuild(&log).unwrap();

        let mut names: Vec<_> = projections
            .parties
            .list(t)
            .iter()
            .map(|p| p.name().to_string())
            .collect();
        names.sort();
        assert_eq!(names, vec!["Acme Ltd", "Globex", "Initech"]);
    }

    #[tokio::test]
    async fn catch_up_fills_a_gap() {
        let d = CommandDispatcher::new(InMemoryEventStore::new(), InMemoryEventBus::new());
        let t = TenantId::new();
        let id = PartyId::new(AggregateId::new());
        d.dispatch::<Party>(t, id.0, register(t, id, "Acme Ltd")).await.unwrap();
        d.dispatch::<Party>(
            t,
            id.0,
            PartyCommand::SuspendParty(bizdesk_parties::SuspendParty {
                tenant_id: t,
                party_id: id,
                reason: None,
                occurred_at: Utc::now(),
            }),
        )
        .await
        .unwrap();

        let projections = Projections::new();
        let stream = d.history(t, id.0).await.unwrap();
        let err = projections.apply(&stream[1].to_envelope()).unwrap_err();
        assert!(matches!(err, ProjectionError::Gap { .. }));

        projections.catch_up(&stream).unwrap();
        assert!(!projections.parties.get(t, id.0).unwrap().can_transact());
    }
}
