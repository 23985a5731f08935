//! Performance benchmarks for subscription sets.

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use flexsync::{SubscriptionOptions, Subscriptions, SubscriptionsConfig};
use tempfile::TempDir;

fn seeded(count: usize) -> Subscriptions {
    let subs = Subscriptions::in_memory();
    subs.update(|s| {
        for i in 0..count {
            s.add("Item", &format!("rank == {}", i))?;
        }
        Ok(())
    })
    .unwrap();
    subs
}

/// Benchmark an update that adds one subscription to sets of varying size
fn bench_update(c: &mut Criterion) {
    let mut group = c.benchmark_group("update_add_one");

    for size in [10, 100, 1000, 10000] {
        group.bench_with_input(BenchmarkId::new("set_size", size), &size, |b, &size| {
            let subs = seeded(size);
            let mut n = 0u64;

            b.iter(|| {
                n += 1;
                let set = subs
                    .update(|s| {
                        s.add("Extra", &format!("n == {}", n))?;
                        Ok(())
                    })
                    .unwrap();
                black_box(set.len());
            });
        });
    }

    group.finish();
}

/// Benchmark a rolled-back update (fork cost only)
fn bench_rollback(c: &mut Criterion) {
    let mut group = c.benchmark_group("update_rollback");

    for size in [100, 10000] {
        group.bench_with_input(BenchmarkId::new("set_size", size), &size, |b, &size| {
            let subs = seeded(size);

            b.iter(|| {
                let result = subs.update(|s| {
                    s.remove_all(true);
                    Err(flexsync::SubscriptionError::InvalidState("abort".into()))
                });
                black_box(result.is_err());
            });
        });
    }

    group.finish();
}

/// Benchmark lookups on a large snapshot
fn bench_lookup(c: &mut Criterion) {
    let set = seeded(10000).current();

    c.bench_function("find_by_query", |b| {
        b.iter(|| black_box(set.find_by_query("Item", "rank == 5000")));
    });

    let name = set.get(5000).unwrap().name.clone();
    c.bench_function("find_by_name", |b| {
        b.iter(|| black_box(set.find_by_name(&name)));
    });
}

/// Benchmark a persisted commit
fn bench_persisted_update(c: &mut Criterion) {
    let dir = TempDir::new().unwrap();
    let subs = Subscriptions::open(SubscriptionsConfig::at(dir.path().join("subs"))).unwrap();
    subs.update(|s| {
        for i in 0..100 {
            s.add_with(
                "Item",
                &format!("rank == {}", i),
                SubscriptionOptions::named(format!("item-{}", i)),
            )?;
        }
        Ok(())
    })
    .unwrap();

    c.bench_function("persisted_update", |b| {
        b.iter(|| {
            let set = subs.update(|_| Ok(())).unwrap();
            black_box(set.version());
        });
    });
}

criterion_group!(
    benches,
    bench_update,
    bench_rollback,
    bench_lookup,
    bench_persisted_update
);
criterion_main!(benches);
