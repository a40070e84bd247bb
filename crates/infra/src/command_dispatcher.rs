//! Command execution pipeline (application-level orchestration).
//!
//! ```text
//! Command
//!   ↓
//! 1. Load events from store (tenant-scoped)
//!   ↓
//! 2. Rehydrate aggregate (apply historical events to rebuild state)
//!   ↓
//! 3. Handle command (pure decision logic, produces events)
//!   ↓
//! 4. Persist events to store (append-only, optimistic concurrency check)
//!   ↓
//! 5. Publish events to bus (projections)
//! ```
//!
//! Commands that touch several aggregates go through a [`UnitOfWork`]
//! instead, which ends in one atomic append for all streams.

use serde_json::Value as JsonValue;
use thiserror::Error;
use uuid::Uuid;

use bizdesk_core::{AggregateId, DomainError, ExpectedVersion, TenantId};
use bizdesk_events::{EventBus, EventEnvelope};

use crate::event_store::{EventStore, EventStoreError, StoredEvent, UncommittedEvent};
use crate::streams::EventSourced;
use crate::unit_of_work::UnitOfWork;

#[derive(Debug, Error)]
pub enum DispatchError {
    /// Optimistic concurrency failure (stale revision, or the aggregate already exists).
    #[error("conflict: {0}")]
    Concurrency(String),
    /// Cross-tenant or cross-stream mixing.
    #[error("tenant isolation violation: {0}")]
    TenantIsolation(String),
    #[error("validation failed: {0}")]
    Validation(String),
    #[error("invariant violated: {0}")]
    InvariantViolation(String),
    #[error("unauthorized")]
    Unauthorized,
    #[error("not found")]
    NotFound,
    /// Historical payload does not decode into the aggregate's event type.
    #[error("failed to deserialize stored event: {0}")]
    Deserialize(String),
    #[error("event store error: {0}")]
    Store(EventStoreError),
    /// Publication failed after a successful append (at-least-once; retry may duplicate).
    #[error("failed to publish committed events: {0}")]
    Publish(String),
}

impl From<EventStoreError> for DispatchError {
    fn from(value: EventStoreError) -> Self {
        match value {
            EventStoreError::Concurrency(msg) => DispatchError::Concurrency(msg),
            EventStoreError::TenantIsolation(msg) => DispatchError::TenantIsolation(msg),
            other => DispatchError::Store(other),
        }
    }
}

impl From<DomainError> for DispatchError {
    fn from(value: DomainError) -> Self {
        match value {
            DomainError::Validation(msg) => DispatchError::Validation(msg),
            DomainError::InvariantViolation(msg) => DispatchError::InvariantViolation(msg),
            DomainError::Conflict(msg) => DispatchError::Concurrency(msg),
            DomainError::Unauthorized => DispatchError::Unauthorized,
            DomainError::NotFound => DispatchError::NotFound,
            DomainError::InvalidId(msg) => DispatchError::Validation(msg),
        }
    }
}

/// Result of a successful dispatch: the aggregate after the command, plus
/// what was committed.
#[derive(Debug, Clone)]
pub struct Dispatched<A> {
    pub aggregate: A,
    pub committed: Vec<StoredEvent>,
}

/// Reusable command execution engine for event-sourced aggregates.
///
/// Events are persisted before publication: if the append fails nothing is
/// published. If publication fails after a successful append the error is
/// returned, but the events stay committed (at-least-once).
#[derive(Debug)]
pub struct CommandDispatcher<S, B> {
    store: S,
    bus: B,
}

impl<S, B> CommandDispatcher<S, B> {
    pub fn new(store: S, bus: B) -> Self {
        Self { store, bus }
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn bus(&self) -> &B {
        &self.bus
    }
}

impl<S, B> CommandDispatcher<S, B>
where
    S: EventStore,
    B: EventBus<EventEnvelope<JsonValue>>,
{
    /// Load, rehydrate, decide, append (expecting the loaded revision), publish.
    #[tracing::instrument(
        skip(self, command),
        fields(aggregate_type = A::AGGREGATE_TYPE, tenant_id = %tenant_id, aggregate_id = %aggregate_id)
    )]
    pub async fn dispatch<A>(
        &self,
        tenant_id: TenantId,
        aggregate_id: AggregateId,
        command: A::Command,
    ) -> Result<Dispatched<A>, DispatchError>
    where
        A: EventSourced,
    {
        let history = self.store.load_stream(tenant_id, aggregate_id).await?;
        validate_loaded_stream(tenant_id, aggregate_id, &history)?;
        let expected = ExpectedVersion::Exact(stream_version(&history));

        let mut aggregate = A::empty_for(aggregate_id);
        apply_history(&mut aggregate, &history)?;

        let decided = aggregate.handle(&command)?;
        if decided.is_empty() {
            return Ok(Dispatched {
                aggregate,
                committed: vec![],
            });
        }
        for ev in &decided {
            aggregate.apply(ev);
        }

        let uncommitted = to_uncommitted::<A>(tenant_id, aggregate_id, &decided)?;
        let committed = self.store.append(uncommitted, expected).await?;
        self.publish(&committed)?;

        tracing::debug!(events = committed.len(), "command committed");
        Ok(Dispatched {
            aggregate,
            committed,
        })
    }

    /// Rehydrate an aggregate from its stream. Unknown streams yield an
    /// uncreated instance.
    pub async fn load<A>(&self, tenant_id: TenantId, aggregate_id: AggregateId) -> Result<A, DispatchError>
    where
        A: EventSourced,
    {
        let history = self.store.load_stream(tenant_id, aggregate_id).await?;
        validate_loaded_stream(tenant_id, aggregate_id, &history)?;
        let mut aggregate = A::empty_for(aggregate_id);
        apply_history(&mut aggregate, &history)?;
        Ok(aggregate)
    }

    /// Like [`load`](Self::load), but `NotFound` for a stream that was never created.
    pub async fn load_existing<A>(
        &self,
        tenant_id: TenantId,
        aggregate_id: AggregateId,
    ) -> Result<A, DispatchError>
    where
        A: EventSourced,
    {
        let aggregate = self.load::<A>(tenant_id, aggregate_id).await?;
        if aggregate.exists() {
            Ok(aggregate)
        } else {
            Err(DispatchError::NotFound)
        }
    }

    /// Raw stream of one aggregate (history endpoints, projection catch-up).
    pub async fn history(
        &self,
        tenant_id: TenantId,
        aggregate_id: AggregateId,
    ) -> Result<Vec<StoredEvent>, DispatchError> {
        let history = self.store.load_stream(tenant_id, aggregate_id).await?;
        validate_loaded_stream(tenant_id, aggregate_id, &history)?;
        Ok(history)
    }

    /// Start a multi-aggregate unit of work for one tenant.
    pub fn unit_of_work(&self, tenant_id: TenantId) -> UnitOfWork<'_, S, B> {
        UnitOfWork::new(&self.store, &self.bus, tenant_id)
    }

    pub(crate) fn publish(&self, committed: &[StoredEvent]) -> Result<(), DispatchError> {
        publish_committed(&self.bus, committed)
    }
}

pub(crate) fn publish_committed<B>(bus: &B, committed: &[StoredEvent]) -> Result<(), DispatchError>
where
    B: EventBus<EventEnvelope<JsonValue>>,
{
    for stored in committed {
        bus.publish(stored.to_envelope())
            .map_err(|e| DispatchError::Publish(format!("{e:?}")))?;
    }
    Ok(())
}

pub(crate) fn to_uncommitted<A>(
    tenant_id: TenantId,
    aggregate_id: AggregateId,
    events: &[A::Event],
) -> Result<Vec<UncommittedEvent>, DispatchError>
where
    A: EventSourced,
{
    events
        .iter()
        .map(|ev| {
            UncommittedEvent::from_typed(
                tenant_id,
                aggregate_id,
                A::AGGREGATE_TYPE,
                Uuid::now_v7(),
                ev,
            )
        })
        .collect::<Result<Vec<_>, _>>()
        .map_err(DispatchError::from)
}

pub(crate) fn stream_version(stream: &[StoredEvent]) -> u64 {
    stream.last().map(|e| e.sequence_number).unwrap_or(0)
}

pub(crate) fn validate_loaded_stream(
    tenant_id: TenantId,
    aggregate_id: AggregateId,
    stream: &[StoredEvent],
) -> Result<(), DispatchError> {
    // A buggy backend must not leak another tenant's data into this aggregate.
    let mut last = 0u64;
    for (idx, e) in stream.iter().enumerate() {
        if e.tenant_id != tenant_id {
            return Err(DispatchError::TenantIsolation(format!(
                "loaded stream contains wrong tenant_id at index {idx}"
            )));
        }
        if e.aggregate_id != aggregate_id {
            return Err(DispatchError::TenantIsolation(format!(
                "loaded stream contains wrong aggregate_id at index {idx}"
            )));
        }
        if e.sequence_number != last + 1 {
            return Err(DispatchError::Store(EventStoreError::InvalidAppend(format!(
                "non-contiguous sequence_number in loaded stream (last={last}, found={})",
                e.sequence_number
            ))));
        }
        last = e.sequence_number;
    }
    Ok(())
}

pub(crate) fn apply_history<A>(aggregate: &mut A, history: &[StoredEvent]) -> Result<(), DispatchError>
where
    A: EventSourced,
{
    for stored in history {
        if stored.aggregate_type != A::AGGREGATE_TYPE {
            return Err(DispatchError::Store(EventStoreError::AggregateTypeMismatch(format!(
                "stream holds '{}', expected '{}'",
                stored.aggregate_type,
                A::AGGREGATE_TYPE
            ))));
        }
        let ev: A::Event = serde_json::from_value(stored.payload.clone())
            .map_err(|e| DispatchError::Deserialize(e.to_string()))?;
        aggregate.apply(&ev);
    }
    Ok(())
}
