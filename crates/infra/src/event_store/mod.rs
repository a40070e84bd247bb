//! Append-only, tenant-scoped event storage.
//!
//! Streams are keyed by `(tenant_id, aggregate_id)`; a batch of appends over
//! several streams commits all-or-nothing.

pub mod in_memory;
pub mod postgres;
pub mod r#trait;

pub use in_memory::InMemoryEventStore;
pub use postgres::PostgresEventStore;
pub use r#trait::{EventStore, EventStoreError, StoredEvent, StreamAppend, UncommittedEvent};
