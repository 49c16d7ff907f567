use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};

use std::sync::Arc;

use chrono::Utc;
use rust_decimal::Decimal;
use tokio::runtime::Runtime;

use stockledger_core::{ItemId, LocationId, MovementId};
use stockledger_infra::{InMemoryCatalog, InMemoryLedgerStore, LedgerOptions, StockLedger};
use stockledger_inventory::{fold_quantity, AppendMovement, Item, Location, MovementKind};

fn runtime() -> Runtime {
    tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .unwrap()
}

fn seeded() -> (
    StockLedger<Arc<InMemoryLedgerStore>, Arc<InMemoryCatalog>>,
    ItemId,
    LocationId,
) {
    let catalog = Arc::new(InMemoryCatalog::new());
    let item = ItemId::new();
    let location = LocationId::new();
    catalog.insert_item(Item::new(item, "Bench item", "pcs")).unwrap();
    catalog.insert_location(Location::new(location, "BENCH")).unwrap();

    let ledger = StockLedger::new(
        Arc::new(InMemoryLedgerStore::new()),
        catalog,
        LedgerOptions::default(),
    );
    (ledger, item, location)
}

/// Guarded ISSUE latency as the bucket history grows.
fn bench_guarded_issue(c: &mut Criterion) {
    let rt = runtime();
    let mut group = c.benchmark_group("guarded_issue");

    for history in [10usize, 100, 1000] {
        group.bench_with_input(BenchmarkId::from_parameter(history), &history, |b, &history| {
            let (ledger, item, location) = seeded();
            rt.block_on(async {
                for _ in 0..history {
                    ledger
                        .append(
                            AppendMovement::new(item, MovementKind::Income, Decimal::from(1_000_000_000))
                                .at(location),
                        )
                        .await
                        .unwrap();
                }
            });

            b.iter(|| {
                rt.block_on(ledger.append(black_box(
                    AppendMovement::new(item, MovementKind::Issue, Decimal::ONE).at(location),
                )))
                .unwrap()
            });
        });
    }

    group.finish();
}

fn bench_unguarded_append(c: &mut Criterion) {
    let rt = runtime();
    let mut group = c.benchmark_group("unguarded_append");
    group.throughput(Throughput::Elements(1));

    group.bench_function("income", |b| {
        let (ledger, item, location) = seeded();
        b.iter(|| {
            rt.block_on(ledger.append(black_box(
                AppendMovement::new(item, MovementKind::Income, Decimal::ONE).at(location),
            )))
            .unwrap()
        });
    });

    group.finish();
}

/// Folding history into a quantity, the work behind every read.
fn bench_fold_quantity(c: &mut Criterion) {
    let mut group = c.benchmark_group("fold_quantity");
    let item = ItemId::new();
    let location = LocationId::new();

    for count in [100usize, 1_000, 10_000] {
        let movements: Vec<_> = (0..count)
            .map(|i| {
                let kind = if i % 3 == 0 {
                    MovementKind::Issue
                } else {
                    MovementKind::Income
                };
                AppendMovement::new(item, kind, Decimal::new(125, 2))
                    .at(location)
                    .stamp(MovementId::new(), Utc::now())
                    .commit(i as u64 + 1)
            })
            .collect();

        group.throughput(Throughput::Elements(count as u64));
        group.bench_with_input(BenchmarkId::from_parameter(count), &movements, |b, movements| {
            b.iter(|| fold_quantity(black_box(movements)))
        });
    }

    group.finish();
}

criterion_group!(
    benches,
    bench_guarded_issue,
    bench_unguarded_append,
    bench_fold_quantity
);
criterion_main!(benches);
