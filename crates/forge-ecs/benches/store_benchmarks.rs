//! Benchmarks for the hot paths of [`forge_ecs::store::ComponentStore`]:
//! single attach/get, batched attach_many/get_many, and query_all over a
//! populated store. Run with: `cargo bench --bench store_benchmarks`

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};

use forge_ecs::prelude::*;

fn populated_store(entity_count: u64, component_count: u64) -> ComponentStore {
    let store = ComponentStore::new(entity_count as usize, component_count as usize);
    for id in 0..entity_count {
        for cid in 0..component_count {
            store
                .attach(EntityId::new(id), ComponentId::new(cid), id as f32)
                .unwrap();
        }
    }
    store
}

fn bench_attach(c: &mut Criterion) {
    let store = ComponentStore::new(100_000, 16);
    let mut id = 0u64;
    c.bench_function("attach_single", |b| {
        b.iter(|| {
            store
                .attach(EntityId::new(id % 100_000), ComponentId::new(0), black_box(1.0))
                .unwrap();
            id += 1;
        })
    });
}

fn bench_get(c: &mut Criterion) {
    let store = populated_store(10_000, 8);
    c.bench_function("get_single", |b| {
        b.iter(|| black_box(store.get(EntityId::new(5_000), ComponentId::new(3))))
    });
}

fn bench_query_all(c: &mut Criterion) {
    let mut group = c.benchmark_group("query_all");
    for &entity_count in &[1_000u64, 10_000u64] {
        let store = populated_store(entity_count, 4);
        let cids = [ComponentId::new(0), ComponentId::new(1)];
        group.bench_with_input(
            BenchmarkId::from_parameter(entity_count),
            &entity_count,
            |b, _| b.iter(|| black_box(store.query_all(&cids))),
        );
    }
    group.finish();
}

criterion_group!(benches, bench_attach, bench_get, bench_query_all);
criterion_main!(benches);
