// Copyright 2025 the Territory Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Version snapshots and history replay.

use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};
use territory_spatial::RegionCode;
use tracing::info;

use crate::error::StoreError;
use crate::history::ChangeRecord;
use crate::ids::{AreaId, ChangeId, LayerId, VersionId};
use crate::model::Layer;
use crate::store::LayerStore;

/// A layer and its assignments as captured by a snapshot.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct LayerState {
    /// Layer record.
    pub layer: Layer,
    /// Assigned codes.
    pub codes: BTreeSet<RegionCode>,
}

/// Full, restorable capture of an area. Append-only.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct VersionSnapshot {
    /// Identifier.
    pub id: VersionId,
    /// Captured area.
    pub area_id: AreaId,
    /// Increases by one per snapshot within the area, starting at 1.
    pub version_number: u32,
    /// Optional name, e.g. `"Q1 plan"`.
    pub name: Option<String>,
    /// Optional description.
    pub description: Option<String>,
    /// Capture time, milliseconds since the Unix epoch.
    pub created_ms: u64,
    /// Layers in render order.
    pub layers: Vec<LayerState>,
    /// Snapshot this one was restored from, if it was created by a restore.
    pub restored_from: Option<VersionId>,
    /// Most recent applied change at capture time.
    pub last_change: Option<ChangeId>,
}

impl VersionSnapshot {
    /// Captured assignments keyed by layer.
    pub fn assignments(&self) -> BTreeMap<LayerId, BTreeSet<RegionCode>> {
        self.layers
            .iter()
            .map(|s| (s.layer.id, s.codes.clone()))
            .collect()
    }
}

/// Snapshot details supplied by the caller.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct SnapshotMeta {
    /// Optional name.
    pub name: Option<String>,
    /// Optional description.
    pub description: Option<String>,
}

impl SnapshotMeta {
    /// Named snapshot without description.
    pub fn named(name: impl Into<String>) -> Self {
        Self {
            name: Some(name.into()),
            description: None,
        }
    }
}

/// Snapshot contents assembled ahead of [`VersionLog::append`], which
/// cannot fail.
#[derive(Clone, Debug)]
pub(crate) struct Capture {
    pub(crate) area_id: AreaId,
    pub(crate) version_number: u32,
    pub(crate) meta: SnapshotMeta,
    pub(crate) layers: Vec<LayerState>,
    pub(crate) restored_from: Option<VersionId>,
    pub(crate) last_change: Option<ChangeId>,
    pub(crate) created_ms: u64,
}

/// Append-only list of snapshots across areas.
///
/// A log outlives the session that filled it: hand it back with
/// [`Session::into_parts`](crate::Session::into_parts), or rebuild it from
/// persisted snapshots with [`VersionLog::from_snapshots`].
#[derive(Clone, Debug, Default)]
pub struct VersionLog {
    snapshots: Vec<VersionSnapshot>,
    next_id: u64,
}

impl VersionLog {
    /// Empty log.
    pub fn new() -> Self {
        Self::default()
    }

    /// Log seeded with previously captured snapshots, e.g. loaded from
    /// persistence. New ids continue after the highest seeded id and the
    /// store's own counter.
    pub fn from_snapshots(snapshots: impl IntoIterator<Item = VersionSnapshot>) -> Self {
        let mut snapshots: Vec<VersionSnapshot> = snapshots.into_iter().collect();
        snapshots.sort_by_key(|s| (s.area_id, s.version_number, s.id));
        let next_id = snapshots.iter().map(|s| s.id.0).max().unwrap_or(0);
        Self { snapshots, next_id }
    }

    /// Capture the current state of `area_id`.
    ///
    /// The version number is one more than the higher of the log's latest
    /// number for the area and the area's `current_version_number`, and
    /// becomes the area's new `current_version_number`.
    pub fn capture(
        &mut self,
        store: &mut LayerStore,
        area_id: AreaId,
        meta: SnapshotMeta,
        restored_from: Option<VersionId>,
        last_change: Option<ChangeId>,
        now_ms: u64,
    ) -> Result<&VersionSnapshot, StoreError> {
        let version_number = self.next_number(store, area_id)?;
        let layers = store
            .layers_in(area_id)
            .into_iter()
            .map(|layer| {
                Ok(LayerState {
                    layer: layer.clone(),
                    codes: store.assignments(layer.id)?.clone(),
                })
            })
            .collect::<Result<Vec<_>, StoreError>>()?;
        Ok(self.append(
            store,
            Capture {
                area_id,
                version_number,
                meta,
                layers,
                restored_from,
                last_change,
                created_ms: now_ms,
            },
        ))
    }

    /// Number the next snapshot of `area_id` would get.
    pub fn next_number(&self, store: &LayerStore, area_id: AreaId) -> Result<u32, StoreError> {
        let floor = store.area(area_id)?.current_version_number;
        let latest = self.latest(area_id).map_or(0, |s| s.version_number);
        Ok(latest.max(floor) + 1)
    }

    pub(crate) fn append(&mut self, store: &mut LayerStore, capture: Capture) -> &VersionSnapshot {
        store.bump_current_version(capture.area_id, capture.version_number);
        let id = store.allocate_version_id(self.next_id);
        self.next_id = id.0;
        let snapshot = VersionSnapshot {
            id,
            area_id: capture.area_id,
            version_number: capture.version_number,
            name: capture.meta.name,
            description: capture.meta.description,
            created_ms: capture.created_ms,
            layers: capture.layers,
            restored_from: capture.restored_from,
            last_change: capture.last_change,
        };
        info!(
            area = %snapshot.area_id,
            version = snapshot.version_number,
            name = snapshot.name.as_deref().unwrap_or(""),
            "version snapshot captured"
        );
        self.snapshots.push(snapshot);
        &self.snapshots[self.snapshots.len() - 1]
    }

    /// Look up a snapshot.
    pub fn get(&self, id: VersionId) -> Result<&VersionSnapshot, StoreError> {
        self.snapshots
            .iter()
            .find(|s| s.id == id)
            .ok_or(StoreError::VersionNotFound(id))
    }

    /// Snapshots of an area, oldest first.
    pub fn list(&self, area_id: AreaId) -> impl Iterator<Item = &VersionSnapshot> + '_ {
        self.snapshots.iter().filter(move |s| s.area_id == area_id)
    }

    /// Highest-numbered snapshot of an area.
    pub fn latest(&self, area_id: AreaId) -> Option<&VersionSnapshot> {
        self.list(area_id).max_by_key(|s| s.version_number)
    }
}

/// Assignment sets derived from a snapshot plus the records applied after it.
///
/// Layers created or deleted by a record (restores) are added or dropped.
pub fn rebuild_assignments<'a>(
    snapshot: &VersionSnapshot,
    records: impl IntoIterator<Item = &'a ChangeRecord>,
) -> BTreeMap<LayerId, BTreeSet<RegionCode>> {
    let mut state = snapshot.assignments();
    for record in records {
        for swap in &record.layers {
            if swap.after.is_some() {
                state.entry(swap.layer_id).or_default();
            }
        }
        for diff in &record.diffs {
            if let Some(set) = state.get_mut(&diff.layer_id) {
                diff.apply_to(set);
            }
        }
        for swap in &record.layers {
            if swap.after.is_none() {
                state.remove(&swap.layer_id);
            }
        }
    }
    state
}
