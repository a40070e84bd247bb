use std::collections::HashMap;
use std::sync::RwLock;

use bizdesk_core::{AggregateId, TenantId};

use super::r#trait::{
    EventStore, EventStoreError, StoredEvent, StreamAppend, validate_batch,
};

#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
struct StreamKey {
    tenant_id: TenantId,
    aggregate_id: AggregateId,
}

#[derive(Debug, Default)]
struct Inner {
    streams: HashMap<StreamKey, Vec<StoredEvent>>,
    /// Global commit order, for `load_all`.
    log: Vec<StreamKey>,
}

/// In-memory append-only event store.
///
/// Intended for tests and dev. A batch is checked in full under the write
/// lock before anything is written, which makes it atomic.
#[derive(Debug, Default)]
pub struct InMemoryEventStore {
    inner: RwLock<Inner>,
}

impl InMemoryEventStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn current_version(stream: Option<&Vec<StoredEvent>>) -> u64 {
        stream
            .and_then(|s| s.last())
            .map(|e| e.sequence_number)
            .unwrap_or(0)
    }
}

#[async_trait::async_trait]
impl EventStore for InMemoryEventStore {
    async fn append_batch(&self, batch: Vec<StreamAppend>) -> Result<Vec<StoredEvent>, EventStoreError> {
        let mut inner = self
            .inner
            .write()
            .map_err(|_| EventStoreError::Backend("lock poisoned".to_string()))?;

        // Phase 1: validate every stream; nothing is written yet.
        validate_batch(&batch)?;
        for append in &batch {
            let key = StreamKey {
                tenant_id: append.tenant_id,
                aggregate_id: append.aggregate_id,
            };

            let stream = inner.streams.get(&key);
            let current = Self::current_version(stream);
            if !append.expected_version.matches(current) {
                return Err(EventStoreError::Concurrency(format!(
                    "stream {}: expected {:?}, found {current}",
                    append.aggregate_id, append.expected_version
                )));
            }
            if let (Some(existing), Some(new)) = (stream.and_then(|s| s.first()), append.events.first()) {
                if existing.aggregate_type != new.aggregate_type {
                    return Err(EventStoreError::AggregateTypeMismatch(format!(
                        "stream aggregate_type is '{}', attempted append with '{}'",
                        existing.aggregate_type, new.aggregate_type
                    )));
                }
            }
        }

        // Phase 2: write.
        let mut committed = Vec::new();
        for append in batch {
            let key = StreamKey {
                tenant_id: append.tenant_id,
                aggregate_id: append.aggregate_id,
            };
            let mut next = Self::current_version(inner.streams.get(&key)) + 1;
            for e in append.events {
                let stored = StoredEvent {
                    event_id: e.event_id,
                    tenant_id: e.tenant_id,
                    aggregate_id: e.aggregate_id,
                    aggregate_type: e.aggregate_type,
                    sequence_number: next,
                    event_type: e.event_type,
                    event_version: e.event_version,
                    occurred_at: e.occurred_at,
                    payload: e.payload,
                };
                next += 1;
                inner.streams.entry(key).or_default().push(stored.clone());
                inner.log.push(key);
                committed.push(stored);
            }
        }

        Ok(committed)
    }

    async fn load_stream(
        &self,
        tenant_id: TenantId,
        aggregate_id: AggregateId,
    ) -> Result<Vec<StoredEvent>, EventStoreError> {
        let key = StreamKey {
            tenant_id,
            aggregate_id,
        };

        let inner = self
            .inner
            .read()
            .map_err(|_| EventStoreError::Backend("lock poisoned".to_string()))?;

        Ok(inner.streams.get(&key).cloned().unwrap_or_default())
    }

    async fn load_all(&self) -> Result<Vec<StoredEvent>, EventStoreError> {
        let inner = self
            .inner
            .read()
            .map_err(|_| EventStoreError::Backend("lock poisoned".to_string()))?;

        let mut positions: HashMap<StreamKey, usize> = HashMap::new();
        let mut all = Vec::with_capacity(inner.log.len());
        for key in &inner.log {
            let pos = positions.entry(*key).or_insert(0);
            if let Some(e) = inner.streams.get(key).and_then(|s| s.get(*pos)) {
                all.push(e.clone());
            }
            *pos += 1;
        }
        Ok(all)
    }
}
