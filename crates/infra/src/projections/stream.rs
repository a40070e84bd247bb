use std::marker::PhantomData;
use std::sync::Mutex;

use serde_json::Value as JsonValue;
use thiserror::Error;

use bizdesk_core::{Aggregate, AggregateId, TenantId};
use bizdesk_events::EventEnvelope;

use crate::read_model::TenantStore;
use crate::streams::EventSourced;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ProjectionError {
    #[error("failed to deserialize {aggregate_type} event: {message}")]
    Deserialize {
        aggregate_type: &'static str,
        message: String,
    },

    #[error("tenant isolation violation: {0}")]
    TenantIsolation(String),

    /// An envelope arrived ahead of its predecessors; catch up from the store.
    #[error("sequence gap on {aggregate_id} (last={last}, found={found})")]
    Gap {
        aggregate_id: AggregateId,
        last: u64,
        found: u64,
    },
}

/// Keeps the current state of every aggregate of one stream type.
///
/// The stored aggregate's version doubles as the per-stream cursor:
/// envelopes at or below it are replays and are ignored, the next one is
/// applied, anything further ahead is a [`ProjectionError::Gap`].
#[derive(Debug)]
pub struct StreamProjection<A, S> {
    store: S,
    apply_lock: Mutex<()>,
    _aggregate: PhantomData<fn() -> A>,
}

impl<A, S> StreamProjection<A, S>
where
    A: EventSourced,
    S: TenantStore<AggregateId, A>,
{
    pub fn new(store: S) -> Self {
        Self {
            store,
            apply_lock: Mutex::new(()),
            _aggregate: PhantomData,
        }
    }

    pub fn aggregate_type(&self) -> &'static str {
        A::AGGREGATE_TYPE
    }

    pub fn get(&self, tenant_id: TenantId, id: AggregateId) -> Option<A> {
        self.store.get(tenant_id, &id)
    }

    pub fn list(&self, tenant_id: TenantId) -> Vec<A> {
        self.store.list(tenant_id)
    }

    /// Last applied sequence number of one stream.
    pub fn position(&self, tenant_id: TenantId, id: AggregateId) -> u64 {
        self.store
            .get(tenant_id, &id)
            .map(|a| a.version())
            .unwrap_or(0)
    }

    /// Apply one published envelope. Envelopes of other stream types are skipped.
    pub fn apply_envelope(&self, envelope: &EventEnvelope<JsonValue>) -> Result<(), ProjectionError> {
        if envelope.aggregate_type() != A::AGGREGATE_TYPE {
            return Ok(());
        }
        // Read-modify-write of one aggregate must not interleave with another apply.
        let _guard = self.apply_lock.lock().unwrap_or_else(|poisoned| poisoned.into_inner());

        let tenant_id = envelope.tenant_id();
        let aggregate_id = envelope.aggregate_id();
        let seq = envelope.sequence_number();

        let mut aggregate = self
            .store
            .get(tenant_id, &aggregate_id)
            .unwrap_or_else(|| A::empty_for(aggregate_id));
        let last = aggregate.version();

        if seq <= last {
            return Ok(());
        }
        if seq != last + 1 {
            return Err(ProjectionError::Gap {
                aggregate_id,
                last,
                found: seq,
            });
        }

        let event: A::Event = serde_json::from_value(envelope.payload().clone()).map_err(|e| {
            ProjectionError::Deserialize {
                aggregate_type: A::AGGREGATE_TYPE,
                message: e.to_string(),
            }
        })?;
        aggregate.apply(&event);

        if aggregate.owner() != Some(tenant_id) {
            return Err(ProjectionError::TenantIsolation(format!(
                "{} {aggregate_id} is not owned by the envelope's tenant",
                A::AGGREGATE_TYPE
            )));
        }

        self.store.upsert(tenant_id, aggregate_id, aggregate);
        Ok(())
    }

    /// Rebuild from scratch by replaying envelopes.
    ///
    /// Tenants present in `envelopes` are cleared first; replay is ordered by
    /// tenant, aggregate and sequence.
    pub fn rebuild_from_scratch(
        &self,
        envelopes: impl IntoIterator<Item = EventEnvelope<JsonValue>>,
    ) -> Result<(), ProjectionError> {
        let mut envs: Vec<_> = envelopes
            .into_iter()
            .filter(|e| e.aggregate_type() == A::AGGREGATE_TYPE)
            .collect();

        let mut tenants = envs.iter().map(|e| e.tenant_id()).collect::<Vec<_>>();
        tenants.sort();
        tenants.dedup();
        for t in tenants {
            self.store.clear_tenant(t);
        }

        envs.sort_by_key(|e| (e.tenant_id(), e.aggregate_id(), e.sequence_number()));
        for env in &envs {
            self.apply_envelope(env)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event_store::{StoredEvent, UncommittedEvent};
    use crate::read_model::InMemoryTenantStore;
    use bizdesk_parties::{
        ContactInfo, Party, PartyEvent, PartyId, PartyKind, PartyRegistered, PartySuspended,
    };
    use chrono::Utc;
    use uuid::Uuid;

    type Parties = StreamProjection<Party, InMemoryTenantStore<AggregateId, Party>>;

    fn envelope(tenant_id: TenantId, party_id: PartyId, seq: u64, event: &PartyEvent) -> EventEnvelope<JsonValue> {
        let u = UncommittedEvent::from_typed(tenant_id, party_id.0, "parties.party", Uuid::now_v7(), event)
            .unwrap();
        StoredEvent {
            event_id: u.event_id,
            tenant_id: u.tenant_id,
            aggregate_id: u.aggregate_id,
            aggregate_type: u.aggregate_type,
            sequence_number: seq,
            event_type: u.event_type,
            event_version: u.event_version,
            occurred_at: u.occurred_at,
            payload: u.payload,
        }
        .to_envelope()
    }

    fn registered(tenant_id: TenantId, party_id: PartyId) -> PartyEvent {
        PartyEvent::PartyRegistered(PartyRegistered {
            tenant_id,
            party_id,
            kind: PartyKind::Customer,
            name: "Acme Ltd".to_string(),
            contact: ContactInfo::default(),
            tax_id: None,
            payment_terms_days: 30,
            occurred_at: Utc::now(),
        })
    }

    fn suspended(tenant_id: TenantId, party_id: PartyId) -> PartyEvent {
        PartyEvent::PartySuspended(PartySuspended {
            tenant_id,
            party_id,
            reason: None,
            occurred_at: Utc::now(),
        })
    }

    #[test]
    fn applies_in_order_and_ignores_replays() {
        let p = Parties::new(InMemoryTenantStore::new());
        let t = TenantId::new();
        let id = PartyId::new(AggregateId::new());

        let first = envelope(t, id, 1, &registered(t, id));
        p.apply_envelope(&first).unwrap();
        p.apply_envelope(&first).unwrap();
        p.apply_envelope(&envelope(t, id, 2, &suspended(t, id))).unwrap();

        let party = p.get(t, id.0).unwrap();
        assert_eq!(party.name(), "Acme Ltd");
        assert!(!party.can_transact());
        assert_eq!(p.position(t, id.0), 2);
    }

    #[test]
    fn gap_is_reported_and_nothing_applied() {
        let p = Parties::new(InMemoryTenantStore::new());
        let t = TenantId::new();
        let id = PartyId::new(AggregateId::new());

        let err = p
            .apply_envelope(&envelope(t, id, 2, &suspended(t, id)))
            .unwrap_err();
        assert_eq!(
            err,
            ProjectionError::Gap {
                aggregate_id: id.0,
                last: 0,
                found: 2
            }
        );
        assert!(p.get(t, id.0).is_none());
    }

    #[test]
    fn event_for_another_tenant_is_rejected() {
        let p = Parties::new(InMemoryTenantStore::new());
        let t = TenantId::new();
        let other = TenantId::new();
        let id = PartyId::new(AggregateId::new());

        let err = p
            .apply_envelope(&envelope(t, id, 1, &registered(other, id)))
            .unwrap_err();
        assert!(matches!(err, ProjectionError::TenantIsolation(_)));
        assert!(p.list(t).is_empty());
    }

    #[test]
    fn rebuild_replays_out_of_order_input() {
        let p = Parties::new(InMemoryTenantStore::new());
        let t = TenantId::new();
        let id = PartyId::new(AggregateId::new());

        let envs = vec![
            envelope(t, id, 2, &suspended(t, id)),
            envelope(t, id, 1, &registered(t, id)),
        ];
        p.rebuild_from_scratch(envs.clone()).unwrap();
        p.rebuild_from_scratch(envs).unwrap();

        assert_eq!(p.list(t).len(), 1);
        assert_eq!(p.position(t, id.0), 2);
    }
}
