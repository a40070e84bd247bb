//! Infrastructure wiring: event store, bus, dispatcher, read models, documents.

use std::sync::Arc;

use anyhow::Context;
use serde_json::Value as JsonValue;

use bizdesk_core::TenantId;
use bizdesk_events::{EventEnvelope, InMemoryEventBus};
use bizdesk_infra::command_dispatcher::{CommandDispatcher, DispatchError};
use bizdesk_infra::config::AppConfig;
use bizdesk_infra::event_store::{EventStore, InMemoryEventStore, PostgresEventStore, StoredEvent};
use bizdesk_infra::external::{
    CompanyProfile, DocumentService, EmailSender, InMemoryObjectStore, InMemoryOutbox,
    LocalFsObjectStore, ObjectStore, SendGridSender,
};
use bizdesk_infra::projections::{ProjectionError, Projections};
use bizdesk_infra::streams::EventSourced;

pub type SharedStore = Arc<dyn EventStore>;
pub type SharedBus = Arc<InMemoryEventBus<EventEnvelope<JsonValue>>>;
pub type Dispatcher = CommandDispatcher<SharedStore, SharedBus>;
pub type Documents = DocumentService<Arc<dyn EmailSender>, Arc<dyn ObjectStore>>;

pub struct AppServices {
    dispatcher: Dispatcher,
    projections: Projections,
    documents: Documents,
}

impl AppServices {
    pub fn new(
        store: SharedStore,
        email: Arc<dyn EmailSender>,
        objects: Arc<dyn ObjectStore>,
        company: CompanyProfile,
    ) -> Self {
        Self {
            dispatcher: CommandDispatcher::new(store, Arc::new(InMemoryEventBus::new())),
            projections: Projections::new(),
            documents: DocumentService::new(email, objects, company),
        }
    }

    /// Everything in memory; mail lands in the returned outbox.
    pub fn in_memory(company: CompanyProfile) -> (Self, Arc<InMemoryOutbox>) {
        let outbox = Arc::new(InMemoryOutbox::new());
        let services = Self::new(
            Arc::new(InMemoryEventStore::new()),
            outbox.clone(),
            Arc::new(InMemoryObjectStore::new()),
            company,
        );
        (services, outbox)
    }

    /// Pick backends from configuration and rebuild read models from the log.
    pub async fn from_config(config: &AppConfig) -> anyhow::Result<Self> {
        let store: SharedStore = match (&config.database_url, config.use_persistent_stores) {
            (Some(url), true) => {
                let store = PostgresEventStore::connect(url)
                    .await
                    .context("connecting to the event store")?;
                store.ensure_schema().await.context("preparing the event store schema")?;
                tracing::info!("using postgres event store");
                Arc::new(store)
            }
            _ => {
                tracing::info!("using in-memory event store");
                Arc::new(InMemoryEventStore::new())
            }
        };

        let email: Arc<dyn EmailSender> = match &config.email.sendgrid_api_key {
            Some(key) => Arc::new(SendGridSender::new(key.clone(), config.email.from.clone())),
            None => Arc::new(InMemoryOutbox::new()),
        };
        let objects: Arc<dyn ObjectStore> = match &config.document_store_dir {
            Some(dir) => Arc::new(LocalFsObjectStore::new(dir.clone())),
            None => Arc::new(InMemoryObjectStore::new()),
        };

        let services = Self::new(store, email, objects, config.company.clone());
        let events = services
            .rebuild_read_models()
            .await
            .context("rebuilding read models")?;
        tracing::info!(events, "read models ready");
        Ok(services)
    }

    pub fn dispatcher(&self) -> &Dispatcher {
        &self.dispatcher
    }

    pub fn projections(&self) -> &Projections {
        &self.projections
    }

    pub fn documents(&self) -> &Documents {
        &self.documents
    }

    /// Replay the whole log into fresh read models. Returns the event count.
    pub async fn rebuild_read_models(&self) -> anyhow::Result<usize> {
        let log = self.dispatcher.store().load_all().await?;
        self.projections.rebuild(&log)?;
        Ok(log.len())
    }

    /// Dispatch one command and bring the read models up to date.
    pub async fn dispatch<A: EventSourced>(
        &self,
        tenant_id: TenantId,
        aggregate_id: bizdesk_core::AggregateId,
        command: A::Command,
    ) -> Result<A, DispatchError> {
        let dispatched = self
            .dispatcher
            .dispatch::<A>(tenant_id, aggregate_id, command)
            .await?;
        self.project(tenant_id, &dispatched.committed).await;
        Ok(dispatched.aggregate)
    }

    /// Apply freshly committed events to the read models.
    ///
    /// A gap means another request's events have not been applied yet; the
    /// affected stream is caught up from the store.
    pub async fn project(&self, tenant_id: TenantId, committed: &[StoredEvent]) {
        for stored in committed {
            match self.projections.apply(&stored.to_envelope()) {
                Ok(()) => {}
                Err(ProjectionError::Gap { aggregate_id, .. }) => {
                    let caught_up = match self.dispatcher.history(tenant_id, aggregate_id).await {
                        Ok(history) => self.projections.catch_up(&history).map_err(|e| e.to_string()),
                        Err(e) => Err(e.to_string()),
                    };
                    if let Err(error) = caught_up {
                        tracing::warn!(%aggregate_id, %error, "projection catch-up failed");
                    }
                }
                Err(error) => {
                    tracing::warn!(event_id = %stored.event_id, %error, "projection failed");
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use chrono::Utc;

    use bizdesk_core::AggregateId;
    use bizdesk_parties::{ContactInfo, Party, PartyCommand, PartyId, PartyKind, RegisterParty};

    use super::*;

    #[tokio::test]
    async fn dispatch_updates_read_models_inline() {
        let (services, _outbox) = AppServices::in_memory(CompanyProfile::default());
        let t = TenantId::new();
        let id = PartyId::new(AggregateId::new());

        services
            .dispatch::<Party>(
                t,
                id.0,
                PartyCommand::RegisterParty(RegisterParty {
                    tenant_id: t,
                    party_id: id,
                    kind: PartyKind::Customer,
                    name: "Acme Ltd".to_string(),
                    contact: Some(ContactInfo::default()),
                    tax_id: None,
                    payment_terms_days: 30,
                    occurred_at: Utc::now(),
                }),
            )
            .await
            .unwrap();

        let party = services.projections().parties.get(t, id.0).unwrap();
        assert_eq!(party.name(), "Acme Ltd");
        assert!(services.projections().parties.get(TenantId::new(), id.0).is_none());
        assert_eq!(services.rebuild_read_models().await.unwrap(), 1);
    }
}
