use std::collections::HashSet;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use thiserror::Error;
use uuid::Uuid;

use bizdesk_core::{AggregateId, ExpectedVersion, TenantId};

/// An event ready to be appended to a stream (not yet assigned a sequence number).
///
/// Lifecycle: an aggregate's `handle` yields a typed event, [`UncommittedEvent::from_typed`]
/// wraps it with stream metadata, the store assigns a sequence number and returns a
/// [`StoredEvent`], which is finally published as an `EventEnvelope`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UncommittedEvent {
    pub event_id: Uuid,
    pub tenant_id: TenantId,
    pub aggregate_id: AggregateId,
    pub aggregate_type: String,

    pub event_type: String,
    pub event_version: u32,
    pub occurred_at: DateTime<Utc>,

    pub payload: JsonValue,
}

/// A stored event in an append-only stream.
///
/// Sequence numbers are per stream `(tenant_id, aggregate_id)`, start at 1 and
/// have no gaps. The sequence number of the last event is the stream revision
/// used for optimistic concurrency.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoredEvent {
    pub event_id: Uuid,
    pub tenant_id: TenantId,
    pub aggregate_id: AggregateId,
    pub aggregate_type: String,

    /// Monotonically increasing position in the aggregate stream.
    pub sequence_number: u64,

    pub event_type: String,
    pub event_version: u32,
    pub occurred_at: DateTime<Utc>,

    pub payload: JsonValue,
}

impl StoredEvent {
    pub fn stream_version(&self) -> u64 {
        self.sequence_number
    }

    /// Convert a stored event into a tenant-scoped event envelope for publication.
    pub fn to_envelope(&self) -> bizdesk_events::EventEnvelope<JsonValue> {
        bizdesk_events::EventEnvelope::new(
            self.event_id,
            self.tenant_id,
            self.aggregate_id,
            self.aggregate_type.clone(),
            self.event_type.clone(),
            self.sequence_number,
            self.payload.clone(),
        )
    }
}

/// Events for one stream inside an atomic batch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StreamAppend {
    pub tenant_id: TenantId,
    pub aggregate_id: AggregateId,
    pub expected_version: ExpectedVersion,
    pub events: Vec<UncommittedEvent>,
}

/// Event store operation error.
///
/// Infrastructure failures (storage, concurrency, isolation) as opposed to the
/// domain's `DomainError`.
#[derive(Debug, Error)]
pub enum EventStoreError {
    #[error("optimistic concurrency check failed: {0}")]
    Concurrency(String),

    #[error("tenant isolation violation: {0}")]
    TenantIsolation(String),

    #[error("aggregate type mismatch: {0}")]
    AggregateTypeMismatch(String),

    #[error("invalid append: {0}")]
    InvalidAppend(String),

    #[error("storage backend error: {0}")]
    Backend(String),
}

/// Append-only, tenant-scoped event store.
///
/// Streams are keyed by `(tenant_id, aggregate_id)`. Every operation is
/// tenant-scoped; a stream of one tenant is invisible to another.
///
/// Implementations must:
/// - enforce optimistic concurrency against the current stream revision
/// - assign sequence numbers `current + 1, current + 2, ...`
/// - make [`append_batch`](EventStore::append_batch) all-or-nothing across
///   every stream in the batch
#[async_trait::async_trait]
pub trait EventStore: Send + Sync {
    /// Atomically append to several streams, each with its own expected revision.
    ///
    /// Either every stream receives its events or none does. Returns the
    /// committed events in batch order.
    async fn append_batch(&self, batch: Vec<StreamAppend>) -> Result<Vec<StoredEvent>, EventStoreError>;

    /// Load one stream in sequence order. Unknown streams are empty.
    async fn load_stream(
        &self,
        tenant_id: TenantId,
        aggregate_id: AggregateId,
    ) -> Result<Vec<StoredEvent>, EventStoreError>;

    /// Every stored event of every tenant, for projection rebuilds at startup.
    async fn load_all(&self) -> Result<Vec<StoredEvent>, EventStoreError>;

    /// Append events to a single aggregate stream.
    async fn append(
        &self,
        events: Vec<UncommittedEvent>,
        expected_version: ExpectedVersion,
    ) -> Result<Vec<StoredEvent>, EventStoreError> {
        let Some(first) = events.first() else {
            return Ok(vec![]);
        };
        let append = StreamAppend {
            tenant_id: first.tenant_id,
            aggregate_id: first.aggregate_id,
            expected_version,
            events,
        };
        self.append_batch(vec![append]).await
    }
}

#[async_trait::async_trait]
impl<S> EventStore for Arc<S>
where
    S: EventStore + ?Sized,
{
    async fn append_batch(&self, batch: Vec<StreamAppend>) -> Result<Vec<StoredEvent>, EventStoreError> {
        (**self).append_batch(batch).await
    }

    async fn load_stream(
        &self,
        tenant_id: TenantId,
        aggregate_id: AggregateId,
    ) -> Result<Vec<StoredEvent>, EventStoreError> {
        (**self).load_stream(tenant_id, aggregate_id).await
    }

    async fn load_all(&self) -> Result<Vec<StoredEvent>, EventStoreError> {
        (**self).load_all().await
    }

    async fn append(
        &self,
        events: Vec<UncommittedEvent>,
        expected_version: ExpectedVersion,
    ) -> Result<Vec<StoredEvent>, EventStoreError> {
        (**self).append(events, expected_version).await
    }
}

/// Check that every event of a stream append targets that stream.
pub(crate) fn validate_stream_append(append: &StreamAppend) -> Result<(), EventStoreError> {
    let Some(first) = append.events.first() else {
        return Ok(());
    };
    for (idx, e) in append.events.iter().enumerate() {
        if e.tenant_id != append.tenant_id {
            return Err(EventStoreError::TenantIsolation(format!(
                "batch contains multiple tenant_ids (index {idx})"
            )));
        }
        if e.aggregate_id != append.aggregate_id {
            return Err(EventStoreError::InvalidAppend(format!(
                "batch contains multiple aggregate_ids (index {idx})"
            )));
        }
        if e.aggregate_type != first.aggregate_type {
            return Err(EventStoreError::AggregateTypeMismatch(format!(
                "batch contains multiple aggregate_types (index {idx})"
            )));
        }
    }
    Ok(())
}

/// Check every stream of a batch and reject a stream named twice.
pub(crate) fn validate_batch(batch: &[StreamAppend]) -> Result<(), EventStoreError> {
    let mut seen = HashSet::new();
    for append in batch {
        validate_stream_append(append)?;
        if !seen.insert((append.tenant_id, append.aggregate_id)) {
            return Err(EventStoreError::InvalidAppend(format!(
                "stream {} appears twice in one batch",
                append.aggregate_id
            )));
        }
    }
    Ok(())
}

impl UncommittedEvent {
    /// Wrap a typed domain event, capturing the metadata needed to decode it later.
    pub fn from_typed<E>(
        tenant_id: TenantId,
        aggregate_id: AggregateId,
        aggregate_type: impl Into<String>,
        event_id: Uuid,
        event: &E,
    ) -> Result<Self, EventStoreError>
    where
        E: bizdesk_events::Event + Serialize,
    {
        let payload = serde_json::to_value(event)
            .map_err(|e| EventStoreError::InvalidAppend(format!("payload serialization failed: {e}")))?;

        Ok(Self {
            event_id,
            tenant_id,
            aggregate_id,
            aggregate_type: aggregate_type.into(),
            event_type: event.event_type().to_string(),
            event_version: event.version(),
            occurred_at: event.occurred_at(),
            payload,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn append(tenant_id: TenantId, aggregate_id: AggregateId) -> StreamAppend {
        let event = UncommittedEvent {
            event_id: Uuid::now_v7(),
            tenant_id,
            aggregate_id,
            aggregate_type: "test.stream".to_string(),
            event_type: "test.happened".to_string(),
            event_version: 1,
            occurred_at: Utc::now(),
            payload: serde_json::json!({}),
        };
        StreamAppend {
            tenant_id,
            aggregate_id,
            expected_version: ExpectedVersion::Any,
            events: vec![event],
        }
    }

    #[test]
    fn batch_naming_a_stream_twice_is_rejected() {
        let tenant = TenantId::new();
        let id = AggregateId::new();

        let err = validate_batch(&[append(tenant, id), append(tenant, id)]).unwrap_err();
        assert!(matches!(err, EventStoreError::InvalidAppend(_)));

        assert!(validate_batch(&[append(tenant, id), append(tenant, AggregateId::new())]).is_ok());
        // Same aggregate id under another tenant is a different stream.
        assert!(validate_batch(&[append(tenant, id), append(TenantId::new(), id)]).is_ok());
    }
}
