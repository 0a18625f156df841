// Copyright 2025 the Territory Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

use criterion::{BatchSize, Criterion, black_box, criterion_group, criterion_main};
use territory_layers::{
    AutosaveCoordinator, ChangeId, EngineConfig, LayerDiff, LayerId, LayerStore, ManualClock,
    Session, SnapshotMeta,
};
use territory_spatial::{Granularity, RegionCode};

fn codes(range: core::ops::Range<u32>) -> Vec<RegionCode> {
    range.map(|n| RegionCode::new(format!("{n:05}"))).collect()
}

/// A session with `layers` layers of `per_layer` codes each, every other
/// layer overlapping its predecessor by half.
fn populated(layers: u32, per_layer: u32) -> (Session<ManualClock>, Vec<LayerId>) {
    let mut store = LayerStore::new();
    let area = store.create_area("Bench", Granularity::FIVE);
    let mut session =
        Session::open(&EngineConfig::default(), ManualClock::new(0), store, area).unwrap();
    let mut ids = Vec::new();
    for l in 0..layers {
        let id = session.create_layer(format!("L{l}"), "#888").unwrap();
        let start = l * per_layer / 2;
        session.assign(id, codes(start..start + per_layer)).unwrap();
        ids.push(id);
    }
    session.commit().unwrap();
    (session, ids)
}

fn bench_commit_undo_redo(c: &mut Criterion) {
    let mut group = c.benchmark_group("history");
    group.bench_function("commit_1000_codes", |b| {
        b.iter_batched(
            || populated(4, 1_000),
            |(mut s, ids)| {
                s.mutate(ids[0], codes(50_000..51_000), codes(0..500)).unwrap();
                black_box(s.commit().unwrap())
            },
            BatchSize::LargeInput,
        );
    });
    group.bench_function("undo_redo_1000_codes", |b| {
        b.iter_batched(
            || {
                let (mut s, ids) = populated(4, 1_000);
                s.assign(ids[1], codes(60_000..61_000)).unwrap();
                s.commit().unwrap();
                s
            },
            |mut s| {
                s.undo().unwrap();
                black_box(s.redo().unwrap())
            },
            BatchSize::LargeInput,
        );
    });
    group.bench_function("snapshot_restore_20_layers", |b| {
        b.iter_batched(
            || {
                let (mut s, ids) = populated(20, 500);
                let v = s.snapshot(SnapshotMeta::named("bench")).unwrap();
                for id in ids {
                    s.unassign(id, codes(0..2_000)).unwrap();
                }
                s.commit().unwrap();
                (s, v)
            },
            |(mut s, v)| black_box(s.restore(v).unwrap()),
            BatchSize::LargeInput,
        );
    });
    group.finish();
}

fn bench_conflicts(c: &mut Criterion) {
    let (s, _) = populated(20, 1_000);
    c.bench_function("conflicts_20_layers", |b| {
        b.iter(|| black_box(s.conflicts().unwrap().len()));
    });
}

fn bench_autosave_coalescing(c: &mut Criterion) {
    c.bench_function("autosave_coalesce_500_edits", |b| {
        b.iter(|| {
            let mut a = AutosaveCoordinator::new(2_000);
            for n in 0..500_u32 {
                let mut diff = LayerDiff::new(LayerId(u64::from(n % 4)));
                diff.added.insert(RegionCode::new(format!("{:05}", n / 2)));
                if n % 3 == 0 {
                    diff = diff.inverse();
                }
                a.record(territory_layers::AreaId(1), &diff, ChangeId(u64::from(n)), u64::from(n));
            }
            black_box(a.drain().writes.len())
        });
    });
}

criterion_group!(
    benches,
    bench_commit_undo_redo,
    bench_conflicts,
    bench_autosave_coalescing
);
criterion_main!(benches);
