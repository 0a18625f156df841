// Copyright 2025 the Territory Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

use criterion::{BatchSize, Criterion, Throughput, black_box, criterion_group, criterion_main};
use territory_index::{Aabb2D, Index, IndexGeneric, RTreeIndex};

#[derive(Clone)]
struct Rng(u64);

impl Rng {
    fn new(seed: u64) -> Self {
        Self(seed)
    }
    fn next_u64(&mut self) -> u64 {
        let mut x = self.0;
        x ^= x << 13;
        x ^= x >> 7;
        x ^= x << 17;
        self.0 = x;
        x
    }
    fn next_f64(&mut self) -> f64 {
        let v = self.next_u64() >> 11;
        (v as f64) / ((1u64 << 53) as f64)
    }
}

/// Region-like bboxes on an `n` x `n` lattice of 0.05° cells over Germany.
fn lattice(n: usize) -> Vec<(Aabb2D<f64>, u32)> {
    let cell = 0.05;
    let mut out = Vec::with_capacity(n * n);
    for j in 0..n {
        for i in 0..n {
            let x0 = 6.0 + i as f64 * cell;
            let y0 = 47.5 + j as f64 * cell;
            out.push((Aabb2D::new(x0, y0, x0 + cell, y0 + cell), (j * n + i) as u32));
        }
    }
    out
}

/// Bboxes clustered around a handful of city centers, the way dense urban
/// postcodes are.
fn clustered(n_clusters: usize, per_cluster: usize) -> Vec<(Aabb2D<f64>, u32)> {
    let mut rng = Rng::new(0xC1A5_7E55_9999_ABCD);
    let mut out = Vec::with_capacity(n_clusters * per_cluster);
    for _ in 0..n_clusters {
        let (cx, cy) = (6.0 + rng.next_f64() * 9.0, 47.5 + rng.next_f64() * 7.0);
        for _ in 0..per_cluster {
            let x0 = cx + (rng.next_f64() - 0.5) * 0.4;
            let y0 = cy + (rng.next_f64() - 0.5) * 0.4;
            let w = 0.005 + rng.next_f64() * 0.02;
            let id = out.len() as u32;
            out.push((Aabb2D::new(x0, y0, x0 + w, y0 + w), id));
        }
    }
    out
}

fn query_points(count: usize) -> Vec<(f64, f64)> {
    let mut rng = Rng::new(0xCAFE_F00D_DEAD_BEEF);
    (0..count)
        .map(|_| (6.0 + rng.next_f64() * 9.0, 47.5 + rng.next_f64() * 7.0))
        .collect()
}

fn bench_build(c: &mut Criterion) {
    let mut group = c.benchmark_group("build");
    for &n in &[64usize, 128, 256] {
        let entries = lattice(n);
        group.throughput(Throughput::Elements((n * n) as u64));
        group.bench_function(format!("flatvec_n{n}"), |b| {
            b.iter_batched(
                || entries.clone(),
                |e| black_box(Index::<f64, u32>::build(e)),
                BatchSize::SmallInput,
            );
        });
        group.bench_function(format!("rtree_n{n}"), |b| {
            b.iter_batched(
                || entries.clone(),
                |e| black_box(RTreeIndex::<f64, u32>::build(e)),
                BatchSize::SmallInput,
            );
        });
    }
    group.finish();
}

fn bench_point_queries(c: &mut Criterion) {
    let mut group = c.benchmark_group("query_point");
    let entries = lattice(128);
    let flat: Index<f64, u32> = IndexGeneric::build(entries.clone());
    let rtree: RTreeIndex<f64, u32> = IndexGeneric::build(entries);
    let points = query_points(1_000);
    group.throughput(Throughput::Elements(points.len() as u64));
    group.bench_function("flatvec_lattice", |b| {
        b.iter(|| {
            let hits: usize = points.iter().map(|&(x, y)| flat.query_point(x, y).count()).sum();
            black_box(hits)
        });
    });
    group.bench_function("rtree_lattice", |b| {
        b.iter(|| {
            let hits: usize = points.iter().map(|&(x, y)| rtree.query_point(x, y).count()).sum();
            black_box(hits)
        });
    });
    let dense: RTreeIndex<f64, u32> = IndexGeneric::build(clustered(40, 500));
    group.bench_function("rtree_clustered", |b| {
        b.iter(|| {
            let hits: usize = points.iter().map(|&(x, y)| dense.query_point(x, y).count()).sum();
            black_box(hits)
        });
    });
    group.finish();
}

fn bench_rect_queries(c: &mut Criterion) {
    let mut group = c.benchmark_group("query_rect");
    let entries = lattice(128);
    let flat: Index<f64, u32> = IndexGeneric::build(entries.clone());
    let rtree: RTreeIndex<f64, u32> = IndexGeneric::build(entries);
    // Roughly a 20 km search circle's bbox.
    let windows: Vec<Aabb2D<f64>> = query_points(200)
        .into_iter()
        .map(|(x, y)| Aabb2D::new(x - 0.27, y - 0.18, x + 0.27, y + 0.18))
        .collect();
    group.bench_function("flatvec", |b| {
        b.iter(|| {
            let hits: usize = windows.iter().map(|w| flat.query_rect(*w).count()).sum();
            black_box(hits)
        });
    });
    group.bench_function("rtree", |b| {
        b.iter(|| {
            let hits: usize = windows.iter().map(|w| rtree.query_rect(*w).count()).sum();
            black_box(hits)
        });
    });
    group.finish();
}

criterion_group!(benches, bench_build, bench_point_queries, bench_rect_queries);
criterion_main!(benches);
