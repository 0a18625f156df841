// Copyright 2025 the Territory Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Territory session.
//!
//! Loads an engine configuration, edits two layers, inspects conflicts,
//! checkpoints and restores a version, and drives autosave against a
//! persistence backend that fails once.
//!
//! Run:
//! - `RUST_LOG=info cargo run -p territory_demos --example territory_session`

use std::error::Error;

use territory_layers::{
    AreaId, EngineConfig, LayerDiff, LayerStore, PersistError, PersistenceStore, Session,
    SnapshotMeta, SystemClock, VersionSnapshot,
};
use territory_spatial::{Granularity, RegionCode};
use tracing_subscriber::EnvFilter;

const CONFIG: &str = r#"
[history]
undo_depth = 20

[autosave]
debounce_ms = 0
"#;

/// Prints every write; refuses the first `fail_next` of them.
#[derive(Default)]
struct PrintingBackend {
    fail_next: usize,
}

impl PersistenceStore for PrintingBackend {
    fn write_diff(&mut self, area_id: AreaId, diff: &LayerDiff) -> Result<(), PersistError> {
        if self.fail_next > 0 {
            self.fail_next -= 1;
            return Err("503 service unavailable".into());
        }
        println!(
            "  write {area_id} {}: +{} -{}",
            diff.layer_id,
            diff.added.len(),
            diff.removed.len()
        );
        Ok(())
    }

    fn write_snapshot(&mut self, snapshot: &VersionSnapshot) -> Result<(), PersistError> {
        println!(
            "  write snapshot v{} {:?}",
            snapshot.version_number,
            snapshot.name.as_deref().unwrap_or("")
        );
        Ok(())
    }
}

fn codes(list: &[&str]) -> Vec<RegionCode> {
    list.iter().map(|&c| RegionCode::from(c)).collect()
}

fn main() -> Result<(), Box<dyn Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let config = EngineConfig::from_toml_str(CONFIG)?;
    let mut store = LayerStore::new();
    let area = store.create_area("Munich sales", Granularity::FIVE);
    let mut session = Session::open(&config, SystemClock, store, area)?;
    let mut backend = PrintingBackend::default();

    let north = session.create_layer("North", "#e6194b")?;
    let south = session.create_layer("South", "#3cb44b")?;
    session.assign(north, codes(&["80331", "80333", "80335"]))?;
    session.assign(south, codes(&["80335", "81241"]))?;
    let summary = session.commit()?.ok_or("nothing to commit")?;
    println!("== Commit {} ==", summary.record.id);
    for conflict in &summary.conflicts {
        let owners: Vec<&str> = conflict.owners.iter().map(|o| o.name.as_str()).collect();
        println!("  conflict {} owned by {}", conflict.code, owners.join(", "));
    }
    session.pump(&mut backend);

    println!("\n== Snapshot, edit, restore ==");
    let plan = session.snapshot(SnapshotMeta::named("Q1 plan"))?;
    session.unassign(south, codes(&["80335"]))?;
    session.commit()?;
    println!("  after edit: {:?} conflicts", session.conflicts()?.len());
    let outcome = session.restore(plan)?;
    println!(
        "  restored as {} ({} conflicts)",
        outcome.change_id,
        session.conflicts()?.len()
    );

    println!("\n== Autosave with a failing backend ==");
    backend.fail_next = 1;
    let report = session.pump(&mut backend);
    for failure in &report.failures {
        println!("  failed: {failure}");
        if session.retry(failure) {
            println!("  retry queued for {:?}", failure.layer_id());
        }
    }
    let report = session.force_flush(&mut backend);
    println!(
        "  flushed: {} confirmed, {} failed, state {:?}",
        report.confirmed.len(),
        report.failures.len(),
        session.state()
    );

    println!("\n== History ==");
    println!("  undo {} / redo {}", session.undo_count(), session.redo_count());
    for v in session.versions() {
        println!(
            "  v{} {:?} restored_from={:?}",
            v.version_number,
            v.name.as_deref().unwrap_or(""),
            v.restored_from
        );
    }
    Ok(())
}
