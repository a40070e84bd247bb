//! `bizdesk-events`: event contracts shared by the domain and infra crates.
//!
//! - [`Event`]: what every domain event exposes (type name, schema version, time)
//! - [`EventEnvelope`]: stream metadata around a persisted event
//! - [`EventBus`]: publish/subscribe after events are committed
//! - [`execute`]: decide + evolve helper for aggregates

pub mod bus;
pub mod envelope;
pub mod event;
pub mod handler;
pub mod in_memory_bus;
pub mod tenant;

pub use bus::{EventBus, Subscription};
pub use envelope::EventEnvelope;
pub use event::Event;
pub use handler::execute;
pub use in_memory_bus::{InMemoryBusError, InMemoryEventBus};
pub use tenant::TenantScoped;
