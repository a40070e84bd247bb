//! Multi-aggregate command execution with a single atomic commit.
//!
//! A unit of work loads every aggregate it touches, remembers the revision
//! each was loaded at, stages decided events per stream, and commits them all
//! with one [`EventStore::append_batch`]. If any stream moved in the meantime
//! the whole batch is rejected and nothing is published.

use std::collections::HashMap;

use serde_json::Value as JsonValue;

use bizdesk_core::{AggregateId, ExpectedVersion, TenantId};
use bizdesk_events::{EventBus, EventEnvelope};

use crate::command_dispatcher::{
    DispatchError, apply_history, publish_committed, stream_version, to_uncommitted,
    validate_loaded_stream,
};
use crate::event_store::{EventStore, EventStoreError, StoredEvent, StreamAppend};
use crate::streams::EventSourced;

pub struct UnitOfWork<'a, S, B> {
    store: &'a S,
    bus: &'a B,
    tenant_id: TenantId,
    loaded: HashMap<AggregateId, u64>,
    staged: Vec<StreamAppend>,
}

impl<'a, S, B> UnitOfWork<'a, S, B>
where
    S: EventStore,
    B: EventBus<EventEnvelope<JsonValue>>,
{
    pub(crate) fn new(store: &'a S, bus: &'a B, tenant_id: TenantId) -> Self {
        Self {
            store,
            bus,
            tenant_id,
            loaded: HashMap::new(),
            staged: Vec::new(),
        }
    }

    pub fn tenant_id(&self) -> TenantId {
        self.tenant_id
    }

    /// Rehydrate an aggregate and record the revision it was read at.
    ///
    /// Loading a stream that already has staged events is rejected: the
    /// fresh copy would not reflect them.
    pub async fn load<A>(&mut self, aggregate_id: AggregateId) -> Result<A, DispatchError>
    where
        A: EventSourced,
    {
        if self.staged.iter().any(|s| s.aggregate_id == aggregate_id) {
            return Err(DispatchError::Store(EventStoreError::InvalidAppend(format!(
                "stream {aggregate_id} reloaded after staging events"
            ))));
        }

        let history = self.store.load_stream(self.tenant_id, aggregate_id).await?;
        validate_loaded_stream(self.tenant_id, aggregate_id, &history)?;
        let mut aggregate = A::empty_for(aggregate_id);
        apply_history(&mut aggregate, &history)?;

        self.loaded
            .entry(aggregate_id)
            .or_insert_with(|| stream_version(&history));
        Ok(aggregate)
    }

    /// [`load`](Self::load) that fails `NotFound` for a stream never created.
    pub async fn load_existing<A>(&mut self, aggregate_id: AggregateId) -> Result<A, DispatchError>
    where
        A: EventSourced,
    {
        let aggregate = self.load::<A>(aggregate_id).await?;
        if aggregate.exists() {
            Ok(aggregate)
        } else {
            Err(DispatchError::NotFound)
        }
    }

    /// Decide a command against a loaded aggregate, fold the events into it
    /// and stage them for commit.
    pub fn decide<A>(&mut self, aggregate: &mut A, command: &A::Command) -> Result<Vec<A::Event>, DispatchError>
    where
        A: EventSourced,
    {
        let aggregate_id = aggregate.aggregate_id();
        let Some(&loaded_at) = self.loaded.get(&aggregate_id) else {
            return Err(DispatchError::Store(EventStoreError::InvalidAppend(format!(
                "stream {aggregate_id} was not loaded through this unit of work"
            ))));
        };

        let events = bizdesk_events::execute(aggregate, command)?;
        if events.is_empty() {
            return Ok(events);
        }

        let uncommitted = to_uncommitted::<A>(self.tenant_id, aggregate_id, &events)?;
        match self.staged.iter_mut().find(|s| s.aggregate_id == aggregate_id) {
            Some(stream) => stream.events.extend(uncommitted),
            None => self.staged.push(StreamAppend {
                tenant_id: self.tenant_id,
                aggregate_id,
                expected_version: ExpectedVersion::Exact(loaded_at),
                events: uncommitted,
            }),
        }
        Ok(events)
    }

    pub fn staged_streams(&self) -> usize {
        self.staged.len()
    }

    /// Append every staged stream atomically, then publish.
    #[tracing::instrument(skip(self), fields(tenant_id = %self.tenant_id, streams = self.staged.len()))]
    pub async fn commit(self) -> Result<Vec<StoredEvent>, DispatchError> {
        if self.staged.is_empty() {
            return Ok(vec![]);
        }
        let committed = self.store.append_batch(self.staged).await?;
        publish_committed(self.bus, &committed)?;
        tracing::debug!(events = committed.len(), "unit of work committed");
        Ok(committed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::command_dispatcher::CommandDispatcher;
    use crate::event_store::InMemoryEventStore;
    use bizdesk_events::InMemoryEventBus;
    use bizdesk_numbering::{
        AllocateNumber, DocumentKind, DocumentSequence, SequenceCommand, SequenceId,
    };
    use chrono::Utc;

    fn dispatcher() -> CommandDispatcher<InMemoryEventStore, InMemoryEventBus<EventEnvelope<JsonValue>>> {
        CommandDispatcher::new(InMemoryEventStore::new(), InMemoryEventBus::new())
    }

    fn allocate(tenant_id: TenantId, kind: DocumentKind) -> SequenceCommand {
        SequenceCommand::AllocateNumber(AllocateNumber {
            tenant_id,
            sequence_id: SequenceId::for_kind(tenant_id, kind),
            kind,
            occurred_at: Utc::now(),
        })
    }

    #[tokio::test]
    async fn repeated_decisions_on_one_stream_are_merged() {
        let d = dispatcher();
        let tenant = TenantId::new();
        let seq_id = SequenceId::for_kind(tenant, DocumentKind::Invoice);

        let mut uow = d.unit_of_work(tenant);
        let mut seq = uow.load::<DocumentSequence>(seq_id.0).await.unwrap();
        uow.decide(&mut seq, &allocate(tenant, DocumentKind::Invoice)).unwrap();
        uow.decide(&mut seq, &allocate(tenant, DocumentKind::Invoice)).unwrap();
        assert_eq!(uow.staged_streams(), 1);

        let committed = uow.commit().await.unwrap();
        assert_eq!(
            committed.iter().map(|e| e.sequence_number).collect::<Vec<_>>(),
            vec![1, 2]
        );
        let reloaded = d.load::<DocumentSequence>(tenant, seq_id.0).await.unwrap();
        assert_eq!(reloaded.peek(DocumentKind::Invoice), "INV-00003");
    }

    #[tokio::test]
    async fn stale_stream_rejects_the_whole_unit() {
        let d = dispatcher();
        let tenant = TenantId::new();
        let quotes = SequenceId::for_kind(tenant, DocumentKind::Quote);
        let invoices = SequenceId::for_kind(tenant, DocumentKind::Invoice);

        let mut uow = d.unit_of_work(tenant);
        let mut q = uow.load::<DocumentSequence>(quotes.0).await.unwrap();
        let mut i = uow.load::<DocumentSequence>(invoices.0).await.unwrap();
        uow.decide(&mut q, &allocate(tenant, DocumentKind::Quote)).unwrap();
        uow.decide(&mut i, &allocate(tenant, DocumentKind::Invoice)).unwrap();

        // A concurrent writer takes the next invoice number first.
        d.dispatch::<DocumentSequence>(tenant, invoices.0, allocate(tenant, DocumentKind::Invoice))
            .await
            .unwrap();

        let err = uow.commit().await.unwrap_err();
        assert!(matches!(err, DispatchError::Concurrency(_)));
        assert!(d.history(tenant, quotes.0).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn deciding_on_an_unloaded_aggregate_is_rejected() {
        let d = dispatcher();
        let tenant = TenantId::new();
        let seq_id = SequenceId::for_kind(tenant, DocumentKind::Quote);
        let mut uow = d.unit_of_work(tenant);
        let mut seq = DocumentSequence::empty(seq_id);

        let err = uow
            .decide(&mut seq, &allocate(tenant, DocumentKind::Quote))
            .unwrap_err();
        assert!(matches!(err, DispatchError::Store(EventStoreError::InvalidAppend(_))));
    }

    #[tokio::test]
    async fn reloading_a_staged_stream_is_rejected() {
        let d = dispatcher();
        let tenant = TenantId::new();
        let seq_id = SequenceId::for_kind(tenant, DocumentKind::Quote);
        let mut uow = d.unit_of_work(tenant);
        let mut seq = uow.load::<DocumentSequence>(seq_id.0).await.unwrap();
        uow.decide(&mut seq, &allocate(tenant, DocumentKind::Quote)).unwrap();

        assert!(uow.load::<DocumentSequence>(seq_id.0).await.is_err());
    }
}
