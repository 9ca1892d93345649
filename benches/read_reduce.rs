// SPDX-License-Identifier: MIT OR Apache-2.0
// Benchmarks: missing_docs - criterion_group! macro generates undocumentable code
#![allow(missing_docs)]
// Benchmarks: clippy lints relaxed for benchmark code (not production)
#![allow(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
//! Benchmarks of the windowed time-sum over both encodings and in memory.

use criterion::{BenchmarkId, Criterion, Throughput, criterion_group, criterion_main};
use gridbench::{
    ArtifactStore, ChunkGeometry, EncodingKind, ExecConfig, ExecutionContext, GridSpec,
    LazyDataset, SliceWindow, synthesize, window_time_sum,
};
use std::hint::black_box;

// =============================================================================
// Test Data
// =============================================================================

fn grid() -> GridSpec {
    GridSpec::with_shape(40, 180, 360)
}

fn geometries() -> [ChunkGeometry; 3] {
    [
        ChunkGeometry::new(40, 18, 36),
        ChunkGeometry::new(1, 180, 360),
        ChunkGeometry::new(10, 45, 90),
    ]
}

// =============================================================================
// Benchmarks
// =============================================================================

fn bench_encodings(c: &mut Criterion) {
    let dir = tempfile::tempdir().expect("tempdir");
    let store = ArtifactStore::new(dir.path());
    let dataset = synthesize(&grid(), Some(42)).expect("synthesize");
    let ctx = ExecutionContext::acquire(ExecConfig::new(4, 1)).expect("context");
    let trace = dir.path().join("trace.json");
    let window = SliceWindow::default().region(dataset.shape());

    let mut group = c.benchmark_group("window_time_sum");
    group.throughput(Throughput::Bytes((window.len() * 4) as u64));
    for geometry in geometries() {
        store.persist(&dataset, geometry).expect("persist");
        let id = geometry.chunk_id();
        for kind in EncodingKind::ALL {
            let lazy = store.open(kind, &id, Some(geometry)).expect("open");
            group.bench_with_input(BenchmarkId::new(kind.label(), &id), &lazy, |b, lazy| {
                b.iter(|| {
                    let graph = window_time_sum(lazy, window);
                    black_box(ctx.run_graph(&graph, &trace).expect("run"))
                });
            });
        }
        let lazy = LazyDataset::in_memory(dataset.clone(), geometry);
        group.bench_with_input(BenchmarkId::new("memory", &id), &lazy, |b, lazy| {
            b.iter(|| {
                let graph = window_time_sum(lazy, window);
                black_box(ctx.run_graph(&graph, &trace).expect("run"))
            });
        });
    }
    group.finish();
}

fn bench_persist(c: &mut Criterion) {
    let dir = tempfile::tempdir().expect("tempdir");
    let store = ArtifactStore::new(dir.path());
    let dataset = synthesize(&grid(), Some(42)).expect("synthesize");

    let mut group = c.benchmark_group("persist");
    group.sample_size(10);
    for geometry in geometries() {
        group.bench_with_input(
            BenchmarkId::from_parameter(geometry.chunk_id()),
            &geometry,
            |b, &geometry| b.iter(|| store.persist(&dataset, geometry).expect("persist")),
        );
    }
    group.finish();
}

criterion_group!(benches, bench_encodings, bench_persist);
criterion_main!(benches);
