use std::sync::Arc;

use chrono::Utc;
use criterion::{BenchmarkId, Criterion, Throughput, black_box, criterion_group, criterion_main};
use serde_json::Value as JsonValue;

use labstock_core::{AggregateId, CategoryId, LabId, UserId};
use labstock_events::{EventEnvelope, InMemoryEventBus};
use labstock_infra::command_dispatcher::CommandDispatcher;
use labstock_infra::event_store::{EventStore, InMemoryEventStore};
use labstock_infra::projections::StockProjections;
use labstock_infra::reconciliation::{ReconcileRequest, ReconciliationEngine};
use labstock_infra::streams::ITEM_STREAM;
use labstock_inventory::{
    Item, ItemCommand, ItemId, ItemMetadata, ItemStatus, ReconciliationSource, RegisterItem,
};

type Bus = Arc<InMemoryEventBus<EventEnvelope<JsonValue>>>;
type Dispatcher = CommandDispatcher<Arc<InMemoryEventStore>, Bus>;

fn setup() -> (Arc<Dispatcher>, Arc<InMemoryEventStore>) {
    let store = Arc::new(InMemoryEventStore::new());
    let bus: Bus = Arc::new(InMemoryEventBus::new());
    (Arc::new(CommandDispatcher::new(store.clone(), bus)), store)
}

fn register(dispatcher: &Dispatcher) -> ItemId {
    let item_id = ItemId::new(AggregateId::new());
    dispatcher
        .dispatch(
            item_id.0,
            ITEM_STREAM,
            ItemCommand::RegisterItem(RegisterItem {
                item_id,
                metadata: ItemMetadata {
                    name: "Ethanol".to_string(),
                    lab_id: LabId::new(),
                    category_id: CategoryId::new(),
                    unit: "ml".to_string(),
                    min_stock: 5,
                    expiry_date: None,
                    status: ItemStatus::Active,
                },
                initial_quantity: 100,
                registered_by: UserId::new(),
                occurred_at: Utc::now(),
            }),
            |id| Item::empty(ItemId::new(id)),
        )
        .unwrap();
    item_id
}

fn request(item_id: ItemId, actor: UserId) -> ReconcileRequest {
    ReconcileRequest {
        item_id,
        source: ReconciliationSource::UsageRequest {
            request_id: AggregateId::new(),
        },
        tag: "bench".to_string(),
        actor,
        on_behalf_of: None,
    }
}

/// Reconciles `count` changes into a fresh item.
fn seeded_item(engine: &ReconciliationEngine<Arc<InMemoryEventStore>, Bus>, dispatcher: &Dispatcher, count: usize) -> ItemId {
    let item_id = register(dispatcher);
    let actor = UserId::new();
    for i in 0..count {
        engine.reconcile(request(item_id, actor), if i % 2 == 0 { 3 } else { -2 }).unwrap();
    }
    item_id
}

fn bench_reconcile_latency(c: &mut Criterion) {
    let mut group = c.benchmark_group("reconcile_latency");

    for history in [0usize, 100, 1000] {
        group.bench_with_input(BenchmarkId::new("history", history), &history, |b, &history| {
            let (dispatcher, _) = setup();
            let engine = ReconciliationEngine::new(dispatcher.clone());
            let item_id = seeded_item(&engine, &dispatcher, history);
            let actor = UserId::new();

            b.iter(|| {
                black_box(engine.reconcile(request(item_id, actor), black_box(1)).unwrap());
            });
        });
    }

    group.finish();
}

fn bench_audit_trail(c: &mut Criterion) {
    let mut group = c.benchmark_group("audit_trail");

    for history in [10usize, 100, 1000] {
        group.throughput(Throughput::Elements(history as u64));
        group.bench_with_input(BenchmarkId::new("entries", history), &history, |b, &history| {
            let (dispatcher, _) = setup();
            let engine = ReconciliationEngine::new(dispatcher.clone());
            let item_id = seeded_item(&engine, &dispatcher, history);

            b.iter(|| black_box(engine.audit_trail(item_id).unwrap()));
        });
    }

    group.finish();
}

fn bench_projection_rebuild(c: &mut Criterion) {
    let mut group = c.benchmark_group("projection_rebuild");
    group.sample_size(20);

    for items in [10usize, 100] {
        let (dispatcher, store) = setup();
        let engine = ReconciliationEngine::new(dispatcher.clone());
        for _ in 0..items {
            seeded_item(&engine, &dispatcher, 20);
        }
        let envelopes: Vec<_> = store
            .load_all()
            .unwrap()
            .iter()
            .map(|e| e.to_envelope())
            .collect();

        group.throughput(Throughput::Elements(envelopes.len() as u64));
        group.bench_with_input(BenchmarkId::new("items", items), &envelopes, |b, envelopes| {
            let projections = StockProjections::new();
            b.iter(|| black_box(projections.rebuild(envelopes.iter().cloned()).unwrap()));
        });
    }

    group.finish();
}

criterion_group!(benches, bench_reconcile_latency, bench_audit_trail, bench_projection_rebuild);
criterion_main!(benches);
