//! Binding of domain aggregates to persisted event streams.

use serde::Serialize;
use serde::de::DeserializeOwned;

use bizdesk_catalog::{CatalogItem, CatalogItemId};
use bizdesk_core::{Aggregate, AggregateId, DomainError, TenantId};
use bizdesk_events::Event;
use bizdesk_inventory::{StockItem, StockItemId};
use bizdesk_invoicing::{Invoice, InvoiceId};
use bizdesk_numbering::{DocumentSequence, SequenceId};
use bizdesk_parties::{Party, PartyId};
use bizdesk_projects::{Project, ProjectId};
use bizdesk_purchasing::{PurchaseOrder, PurchaseOrderId};
use bizdesk_quotes::{Quote, QuoteId};
use bizdesk_timesheets::{TimeEntry, TimeEntryId};

/// An aggregate that can be stored as, and rebuilt from, an event stream.
///
/// `AGGREGATE_TYPE` is persisted with every event and routes envelopes to
/// projections; it must never change once shipped.
pub trait EventSourced:
    Aggregate<
        Error = DomainError,
        Command: Send + Sync,
        Event: Event + Serialize + DeserializeOwned,
    > + Clone
    + Send
    + Sync
    + 'static
{
    const AGGREGATE_TYPE: &'static str;

    /// Fresh, uncreated instance for rehydration.
    fn empty_for(id: AggregateId) -> Self;

    fn aggregate_id(&self) -> AggregateId;

    /// Owning tenant; `None` until the creation event was applied.
    fn owner(&self) -> Option<TenantId>;

    fn exists(&self) -> bool;
}

macro_rules! event_sourced {
    ($aggregate:ty, $id:ident, $stream:literal) => {
        impl EventSourced for $aggregate {
            const AGGREGATE_TYPE: &'static str = $stream;

            fn empty_for(id: AggregateId) -> Self {
                <$aggregate>::empty($id(id))
            }

            fn aggregate_id(&self) -> AggregateId {
                self.id_typed().0
            }

            fn owner(&self) -> Option<TenantId> {
                self.tenant_id()
            }

            fn exists(&self) -> bool {
                self.is_created()
            }
        }
    };
}

event_sourced!(Party, PartyId, "parties.party");
event_sourced!(CatalogItem, CatalogItemId, "catalog.item");
event_sourced!(Project, ProjectId, "projects.project");
event_sourced!(DocumentSequence, SequenceId, "numbering.sequence");
event_sourced!(Quote, QuoteId, "quotes.quote");
event_sourced!(Invoice, InvoiceId, "invoicing.invoice");
event_sourced!(PurchaseOrder, PurchaseOrderId, "purchasing.order");
event_sourced!(StockItem, StockItemId, "inventory.stock");
event_sourced!(TimeEntry, TimeEntryId, "timesheets.entry");
