//! Performance benchmarks for reconciliation and feed fan-out.

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use poolsync::{
    Action, ChangeFeed, ChangeRecord, ChannelConfig, FeedEvent, FilterExpr, ItemFilter, ItemId,
    ReconcilerState, Transaction, TransactionStatus, TransactionType,
};
use serde_json::json;

fn transactions(count: i64) -> Vec<Transaction> {
    (0..count)
        .map(|id| Transaction::new(id, "pool", TransactionType::Deposit))
        .collect()
}

/// Benchmark in-place updates against collections of varying size
fn bench_reconcile_updates(c: &mut Criterion) {
    let mut group = c.benchmark_group("reconcile_updates");

    for size in [100, 1_000, 10_000] {
        group.bench_with_input(BenchmarkId::new("collection_size", size), &size, |b, &size| {
            let mut state = ReconcilerState::new();
            state.apply(Action::LoadSucceeded(transactions(size)));

            let mut next = 0;
            b.iter(|| {
                // Touch the middle of the list, the typical position of a pending tx
                let id = size / 2 + (next % 10);
                next += 1;
                let updated = Transaction::new(id, "pool", TransactionType::Deposit)
                    .with_status(TransactionStatus::Completed);
                black_box(state.apply(Action::ItemUpdated(updated)));
            });
        });
    }

    group.finish();
}

/// Benchmark insert/delete churn at the head of the list
fn bench_reconcile_churn(c: &mut Criterion) {
    let mut state = ReconcilerState::new();
    state.apply(Action::LoadSucceeded(transactions(1_000)));

    c.bench_function("reconcile_insert_delete", |b| {
        b.iter(|| {
            let tx = Transaction::new(1_000_000, "pool", TransactionType::Withdrawal);
            state.apply(Action::ItemInserted(tx));
            black_box(state.apply(Action::ItemDeleted(ItemId(1_000_000))));
        });
    });
}

/// Benchmark publish cost with many channels on one feed
fn bench_feed_fanout(c: &mut Criterion) {
    let mut group = c.benchmark_group("feed_fanout");

    for channels in [1, 16, 128] {
        group.bench_with_input(BenchmarkId::new("channels", channels), &channels, |b, &n| {
            let feed = ChangeFeed::default();
            feed.connect();
            let handles: Vec<_> = (0..n)
                .map(|i| {
                    let config = ChannelConfig::table("public", "transactions")
                        .with_filter(FilterExpr::eq("pool_id", (i % 4).to_string()));
                    feed.subscribe(config).unwrap()
                })
                .collect();
            for handle in &handles {
                assert_eq!(handle.recv().unwrap(), FeedEvent::Subscribed);
            }

            let record = ChangeRecord::insert(
                "public",
                "transactions",
                json!({"id": 1, "pool_id": "0", "status": "pending"}),
            );

            b.iter(|| {
                black_box(feed.publish(&record));
                // Drain so channels are never dropped
                for handle in &handles {
                    while handle.try_recv().is_ok() {}
                }
            });
        });
    }

    group.finish();
}

/// Benchmark client-side filter evaluation
fn bench_filter_matching(c: &mut Criterion) {
    let filter = ItemFilter::exclude_failed().eq("type", "deposit");
    let tx = Transaction::new(1, "pool", TransactionType::Deposit).with_amount(10.0);

    c.bench_function("filter_matches", |b| {
        b.iter(|| black_box(filter.matches(&tx)));
    });
}

criterion_group!(
    benches,
    bench_reconcile_updates,
    bench_reconcile_churn,
    bench_feed_fanout,
    bench_filter_matching
);
criterion_main!(benches);
