//! Search path benchmarks.

use std::collections::HashMap;
use std::hint::black_box;

use criterion::{Criterion, criterion_group, criterion_main};

use simdex::{BackendKind, DistanceMetric, HnswParams, IndexConfiguration, IndexManager};

const DIMENSION: usize = 64;
const COLLECTION: usize = 10_000;

fn pseudo_vector(seed: usize) -> Vec<f32> {
    // Deterministic, cheap, spread across the unit cube.
    (0..DIMENSION)
        .map(|d| {
            let x = (seed.wrapping_mul(31).wrapping_add(d).wrapping_mul(2654435761)) as u32;
            (x as f32 / u32::MAX as f32) * 2.0 - 1.0
        })
        .collect()
}

fn populated_manager(backend: BackendKind) -> IndexManager {
    let config = IndexConfiguration::new(DistanceMetric::InnerProduct, backend, DIMENSION)
        .with_optimize_threshold(0);
    let manager = IndexManager::new(config).unwrap();
    let entries: Vec<_> = (0..COLLECTION)
        .map(|i| (format!("v{i}"), pseudo_vector(i), HashMap::new()))
        .collect();
    manager.add_batch(entries).unwrap();
    manager
}

fn bench_flat_search(c: &mut Criterion) {
    let manager = populated_manager(BackendKind::Flat);
    let query = pseudo_vector(COLLECTION + 1);
    c.bench_function("flat_search_10k_k10", |b| {
        b.iter(|| black_box(manager.search(black_box(&query), 10).unwrap()))
    });
}

fn bench_hnsw_search(c: &mut Criterion) {
    let manager = populated_manager(BackendKind::Hnsw(HnswParams::default()));
    let query = pseudo_vector(COLLECTION + 1);
    c.bench_function("hnsw_search_10k_k10", |b| {
        b.iter(|| black_box(manager.search(black_box(&query), 10).unwrap()))
    });
}

fn bench_cached_vs_uncached(c: &mut Criterion) {
    let manager = populated_manager(BackendKind::Flat);

    c.bench_function("search_cached_hit", |b| {
        let query = pseudo_vector(COLLECTION + 2);
        manager.search(&query, 10).unwrap();
        b.iter(|| black_box(manager.search(black_box(&query), 10).unwrap()))
    });

    c.bench_function("search_cache_miss", |b| {
        let mut seed = 0usize;
        b.iter(|| {
            seed += 1;
            let query = pseudo_vector(COLLECTION + 100 + seed);
            black_box(manager.search(&query, 10).unwrap())
        })
    });
}

criterion_group!(
    benches,
    bench_flat_search,
    bench_hnsw_search,
    bench_cached_vs_uncached
);
criterion_main!(benches);
