//! Benchmark for the pod deletion decision table
//!
//! The decision sits on every pod DELETE admission, so it must stay cheap
//! next to the placement driver round trip.

use criterion::{black_box, criterion_group, criterion_main, Criterion, Throughput};
use std::time::Duration;
use tikv_safety_webhook::webhook::{decide, Decision, DeletionFacts, StoreClass};

const TIMEOUT: Duration = Duration::from_secs(180);

fn all_facts() -> Vec<DeletionFacts> {
    let mut facts = Vec::new();
    for store in [
        StoreClass::NotFound,
        StoreClass::Tombstone,
        StoreClass::Offline,
        StoreClass::Down,
        StoreClass::Up,
    ] {
        for ordinal_in_range in [false, true] {
            for upgrading in [false, true] {
                for eviction_age in [
                    None,
                    Some(Duration::from_secs(30)),
                    Some(Duration::from_secs(600)),
                ] {
                    for leader_count in [0, 42] {
                        facts.push(DeletionFacts {
                            store,
                            ordinal_in_range,
                            upgrading,
                            eviction_age,
                            leader_count,
                        });
                    }
                }
            }
        }
    }
    facts
}

fn bench_decide_single(c: &mut Criterion) {
    let mut group = c.benchmark_group("deletion_decision");
    group.throughput(Throughput::Elements(1));

    let facts = DeletionFacts {
        store: StoreClass::Up,
        ordinal_in_range: true,
        upgrading: true,
        eviction_age: Some(Duration::from_secs(30)),
        leader_count: 42,
    };

    group.bench_function("decide_eviction_in_progress", |b| {
        b.iter(|| decide(black_box(&facts), black_box(TIMEOUT)));
    });

    group.finish();
}

fn bench_decide_table(c: &mut Criterion) {
    let facts = all_facts();
    let mut group = c.benchmark_group("deletion_decision");
    group.throughput(Throughput::Elements(facts.len() as u64));

    group.bench_function("decide_full_table", |b| {
        b.iter(|| {
            facts
                .iter()
                .filter(|f| matches!(decide(black_box(f), TIMEOUT), Decision::Allow))
                .count()
        });
    });

    group.finish();
}

criterion_group!(benches, bench_decide_single, bench_decide_table);
criterion_main!(benches);
