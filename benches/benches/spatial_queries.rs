// Copyright 2025 the Territory Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

use std::collections::BTreeSet;
use std::sync::Arc;

use criterion::{BatchSize, Criterion, Throughput, black_box, criterion_group, criterion_main};
use kurbo::Point;
use serde_json::{Map, Value};
use territory_spatial::{
    BoundaryDataset, Granularity, RawFeature, RawGeometry, SelectionContext, SpatialConfig,
    SpatialIndex, SpatialIndexBackend, circle_select, polygon_select,
};

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

const CELL: f64 = 0.05;

/// An `n` x `n` tiling of octagon-ish cells starting at 6°E 47.5°N.
///
/// Every cell is a 12-gon so ring tests cost something realistic.
fn dataset(n: usize) -> BoundaryDataset {
    let mut raw = Vec::with_capacity(n * n);
    for j in 0..n {
        for i in 0..n {
            let x0 = 6.0 + i as f64 * CELL;
            let y0 = 47.5 + j as f64 * CELL;
            let step = CELL / 3.0;
            let mut ring = Vec::with_capacity(13);
            for k in 0..3 {
                ring.push(vec![x0 + k as f64 * step, y0]);
            }
            for k in 0..3 {
                ring.push(vec![x0 + CELL, y0 + k as f64 * step]);
            }
            for k in 0..3 {
                ring.push(vec![x0 + CELL - k as f64 * step, y0 + CELL]);
            }
            for k in 0..3 {
                ring.push(vec![x0, y0 + CELL - k as f64 * step]);
            }
            ring.push(vec![x0, y0]);
            raw.push(RawFeature {
                id: None,
                properties: Map::from_iter([(
                    "plz".to_owned(),
                    Value::from(format!("{:05}", j * n + i)),
                )]),
                geometry: RawGeometry::Polygon(vec![ring]),
            });
        }
    }
    let keys = SpatialConfig::default().code_keys;
    BoundaryDataset::from_raw(Granularity::FIVE, raw, &keys).unwrap()
}

fn index(ds: &Arc<BoundaryDataset>, backend: SpatialIndexBackend) -> SpatialIndex {
    let config = SpatialConfig {
        backend,
        ..SpatialConfig::default()
    };
    SpatialIndex::new(ds.clone(), &config)
}

fn query_points(count: usize, n: usize) -> Vec<Point> {
    let mut rng = Rng::new(0xBADC_F00D_1234_5678);
    let span = n as f64 * CELL;
    (0..count)
        .map(|_| Point::new(6.0 + rng.next_f64() * span, 47.5 + rng.next_f64() * span))
        .collect()
}

fn bench_index_build(c: &mut Criterion) {
    let mut group = c.benchmark_group("spatial_index_build");
    let ds = Arc::new(dataset(100));
    group.throughput(Throughput::Elements(ds.len() as u64));
    for backend in [SpatialIndexBackend::RTree, SpatialIndexBackend::FlatVec] {
        group.bench_function(format!("{backend:?}"), |b| {
            b.iter(|| black_box(index(&ds, backend)));
        });
    }
    group.finish();
}

fn bench_point_query(c: &mut Criterion) {
    let mut group = c.benchmark_group("point_query");
    let ds = Arc::new(dataset(100));
    let points = query_points(1_000, 100);
    group.throughput(Throughput::Elements(points.len() as u64));
    for backend in [SpatialIndexBackend::RTree, SpatialIndexBackend::FlatVec] {
        let ix = index(&ds, backend);
        group.bench_function(format!("{backend:?}"), |b| {
            b.iter(|| {
                let hits = points.iter().filter(|p| ix.point_query(**p).is_some()).count();
                black_box(hits)
            });
        });
    }
    group.finish();
}

fn bench_circle_query(c: &mut Criterion) {
    let mut group = c.benchmark_group("circle_query");
    let ds = Arc::new(dataset(100));
    let ix = index(&ds, SpatialIndexBackend::RTree);
    let centers = query_points(100, 100);
    for &km in &[5.0_f64, 20.0, 80.0] {
        group.bench_function(format!("r{km}km"), |b| {
            b.iter(|| {
                let total: usize = centers
                    .iter()
                    .map(|&p| ix.circle_query_meters(p, km * 1_000.0).map_or(0, |v| v.len()))
                    .sum();
                black_box(total)
            });
        });
    }
    group.finish();
}

fn bench_polygon_select(c: &mut Criterion) {
    let mut group = c.benchmark_group("polygon_select");
    let ds = Arc::new(dataset(100));
    let ix = index(&ds, SpatialIndexBackend::RTree);
    let ctx = SelectionContext::new(&ix, 10.0);
    // A 64-vertex lasso around the middle of the tiling.
    let lasso: Vec<Point> = (0..64)
        .map(|k| {
            let t = k as f64 / 64.0 * std::f64::consts::TAU;
            Point::new(8.5 + 1.5 * t.cos(), 50.0 + 1.0 * t.sin())
        })
        .collect();
    group.bench_function("lasso_64", |b| {
        b.iter(|| black_box(polygon_select(&ctx, &lasso).codes.len()));
    });
    group.bench_function("circle_100px", |b| {
        b.iter(|| black_box(circle_select(&ctx, Point::new(8.5, 50.0), 100.0).codes.len()));
    });
    group.finish();
}

fn bench_adjacency_and_holes(c: &mut Criterion) {
    let mut group = c.benchmark_group("topology");
    let ds = Arc::new(dataset(60));
    group.bench_function("adjacency_graph_60x60", |b| {
        b.iter_batched(
            || index(&ds, SpatialIndexBackend::RTree),
            |ix| black_box(ix.adjacency_graph().len()),
            BatchSize::LargeInput,
        );
    });
    let ix = index(&ds, SpatialIndexBackend::RTree);
    // A ring of selected cells with an unselected 10x10 interior.
    let mut selected = BTreeSet::new();
    for j in 20..40 {
        for i in 20..40 {
            let inner = (25..35).contains(&i) && (25..35).contains(&j);
            if !inner {
                selected.insert(format!("{:05}", j * 60 + i).into());
            }
        }
    }
    let _ = ix.adjacency_graph();
    group.bench_function("hole_detection_60x60", |b| {
        b.iter(|| black_box(ix.hole_detection(&selected).len()));
    });
    group.finish();
}

criterion_group!(
    benches,
    bench_index_build,
    bench_point_query,
    bench_circle_query,
    bench_polygon_select,
    bench_adjacency_and_holes
);
criterion_main!(benches);
