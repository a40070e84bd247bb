use chrono::{DateTime, Utc};

/// A fact recorded by an aggregate.
///
/// Events are immutable and append-only. `event_type` is a stable dotted name
/// (`"quotes.quote.converted"`) that is persisted alongside the payload, so it
/// must never change once shipped; bump `version` when the payload shape does.
pub trait Event: Clone + core::fmt::Debug + Send + Sync + 'static {
    fn event_type(&self) -> &'static str;

    fn version(&self) -> u32;

    /// Business time at which the event happened.
    fn occurred_at(&self) -> DateTime<Utc>;
}
