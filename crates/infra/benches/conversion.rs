use std::sync::Arc;

use chrono::{NaiveDate, Utc};
use criterion::{BenchmarkId, Criterion, Throughput, black_box, criterion_group, criterion_main};
use serde_json::Value as JsonValue;
use tokio::runtime::Runtime;

use bizdesk_catalog::{CatalogItem, CatalogItemCommand, CatalogItemId, CreateCatalogItem};
use bizdesk_core::{AggregateId, Quantity, TenantId};
use bizdesk_events::{EventEnvelope, InMemoryEventBus};
use bizdesk_infra::command_dispatcher::CommandDispatcher;
use bizdesk_infra::event_store::{EventStore, InMemoryEventStore};
use bizdesk_infra::projections::Projections;
use bizdesk_infra::workflows::{
    ConvertQuoteInput, CreateQuoteInput, LineInput, convert_quote_to_invoice, create_quote,
};
use bizdesk_parties::{Party, PartyCommand, PartyId, PartyKind, RegisterParty};
use bizdesk_quotes::{Quote, QuoteCommand, QuoteId, SendQuote};

type Dispatcher = CommandDispatcher<InMemoryEventStore, Arc<InMemoryEventBus<EventEnvelope<JsonValue>>>>;

struct Fixture {
    dispatcher: Dispatcher,
    tenant_id: TenantId,
    customer_id: PartyId,
    item_id: CatalogItemId,
}

fn fixture(rt: &Runtime) -> Fixture {
    let dispatcher = CommandDispatcher::new(InMemoryEventStore::new(), Arc::new(InMemoryEventBus::new()));
    let tenant_id = TenantId::new();
    let customer_id = PartyId::new(AggregateId::new());
    let item_id = CatalogItemId::new(AggregateId::new());
    rt.block_on(async {
        dispatcher
            .dispatch::<Party>(
                tenant_id,
                customer_id.0,
                PartyCommand::RegisterParty(RegisterParty {
                    tenant_id,
                    party_id: customer_id,
                    kind: PartyKind::Customer,
                    name: "Bench Customer".to_string(),
                    contact: None,
                    tax_id: None,
                    payment_terms_days: 14,
                    occurred_at: Utc::now(),
                }),
            )
            .await
            .unwrap();
        dispatcher
            .dispatch::<CatalogItem>(
                tenant_id,
                item_id.0,
                CatalogItemCommand::CreateCatalogItem(CreateCatalogItem {
                    tenant_id,
                    item_id,
                    sku: "BENCH-1".to_string(),
                    name: "Bench item".to_string(),
                    description: None,
                    unit: "pcs".to_string(),
                    unit_price: 1_250,
                    cost_price: 700,
                    tax_rate_bps: 2_000,
                    track_inventory: false,
                    occurred_at: Utc::now(),
                }),
            )
            .await
            .unwrap();
    });
    Fixture {
        dispatcher,
        tenant_id,
        customer_id,
        item_id,
    }
}

fn quote_input(f: &Fixture, lines: usize) -> CreateQuoteInput {
    CreateQuoteInput {
        customer_id: f.customer_id,
        project_id: None,
        currency: "EUR".to_string(),
        valid_until: NaiveDate::from_ymd_opt(2099, 1, 1).unwrap(),
        notes: None,
        lines: (0..lines)
            .map(|i| LineInput {
                catalog_item_id: Some(f.item_id),
                description: None,
                quantity: Quantity::from_units(i as i64 + 1),
                unit_price: None,
                discount_bps: 500,
                tax_rate_bps: None,
            })
            .collect(),
        occurred_at: Utc::now(),
    }
}

async fn sent_quote(f: &Fixture, lines: usize) -> QuoteId {
    let quote = create_quote(&f.dispatcher, f.tenant_id, &quote_input(f, lines))
        .await
        .unwrap()
        .document;
    let quote_id = quote.id_typed();
    f.dispatcher
        .dispatch::<Quote>(
            f.tenant_id,
            quote_id.0,
            QuoteCommand::SendQuote(SendQuote {
                tenant_id: f.tenant_id,
                quote_id,
                occurred_at: Utc::now(),
            }),
        )
        .await
        .unwrap();
    quote_id
}

fn bench_create_quote(c: &mut Criterion) {
    let rt = Runtime::new().unwrap();
    let mut group = c.benchmark_group("create_quote");
    for lines in [1usize, 10, 50] {
        let f = fixture(&rt);
        let input = quote_input(&f, lines);
        group.throughput(Throughput::Elements(lines as u64));
        group.bench_with_input(BenchmarkId::from_parameter(lines), &input, |b, input| {
            b.iter(|| {
                rt.block_on(async {
                    black_box(create_quote(&f.dispatcher, f.tenant_id, input).await.unwrap())
                })
            })
        });
    }
    group.finish();
}

fn bench_convert_quote(c: &mut Criterion) {
    let rt = Runtime::new().unwrap();
    let mut group = c.benchmark_group("convert_quote_to_invoice");
    for lines in [1usize, 10, 50] {
        let f = fixture(&rt);
        group.bench_function(BenchmarkId::from_parameter(lines), |b| {
            b.iter_batched(
                || rt.block_on(sent_quote(&f, lines)),
                |quote_id| {
                    rt.block_on(async {
                        let input = ConvertQuoteInput {
                            quote_id,
                            issue_date: NaiveDate::from_ymd_opt(2026, 1, 1).unwrap(),
                            due_date: None,
                            notes: None,
                            occurred_at: Utc::now(),
                        };
                        black_box(
                            convert_quote_to_invoice(&f.dispatcher, f.tenant_id, &input)
                                .await
                                .unwrap(),
                        )
                    })
                },
                criterion::BatchSize::SmallInput,
            )
        });
    }
    group.finish();
}

fn bench_projection_rebuild(c: &mut Criterion) {
    let rt = Runtime::new().unwrap();
    let mut group = c.benchmark_group("projection_rebuild");
    for quotes in [10usize, 100] {
        let f = fixture(&rt);
        let log = rt.block_on(async {
            for _ in 0..quotes {
                sent_quote(&f, 5).await;
            }
            f.dispatcher.store().load_all().await.unwrap()
        });
        group.throughput(Throughput::Elements(log.len() as u64));
        group.bench_with_input(BenchmarkId::from_parameter(log.len()), &log, |b, log| {
            b.iter(|| {
                let projections = Projections::new();
                projections.rebuild(black_box(log)).unwrap();
                projections
            })
        });
    }
    group.finish();
}

criterion_group!(benches, bench_create_quote, bench_convert_quote, bench_projection_rebuild);
criterion_main!(benches);
