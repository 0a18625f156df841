// Copyright 2025 the Territory Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Change tracking: invertible diffs, undo/redo, and session state.
//!
//! ## State machine
//!
//! ```text
//!          mutate                commit               confirm (all)
//! Clean ───────────▶ Dirty ───────────────▶ Saved ───────────────▶ Clean
//!   ▲                  │ ▲                    │
//!   └──────────────────┘ └────── mutate ──────┘
//!   (edits cancel out)
//! ```
//!
//! [`ChangeTracker::mutate`] applies an edit to the store immediately and
//! stages its effective diff. [`ChangeTracker::commit`] turns everything
//! staged into one [`ChangeRecord`]. Records stay tentative until the write
//! covering them is acknowledged through [`ChangeTracker::confirm`].
//!
//! Undo and redo move records between the two stacks and re-apply them in
//! the store; a moved record becomes tentative again because the persisted
//! state no longer matches.

use std::collections::{BTreeMap, BTreeSet, VecDeque};

use serde::{Deserialize, Serialize};
use territory_spatial::RegionCode;
use tracing::{debug, info};

use crate::error::{HistoryDirection, StoreError};
use crate::ids::{AreaId, ChangeId, LayerId, VersionId};
use crate::model::Layer;
use crate::store::LayerStore;

/// Net change of one layer's assignment set.
///
/// Diffs are effective: `added` codes were absent and `removed` codes were
/// present when the diff was made.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct LayerDiff {
    /// Layer the diff applies to.
    pub layer_id: LayerId,
    /// Codes added.
    pub added: BTreeSet<RegionCode>,
    /// Codes removed.
    pub removed: BTreeSet<RegionCode>,
}

impl LayerDiff {
    /// Empty diff for a layer.
    pub fn new(layer_id: LayerId) -> Self {
        Self {
            layer_id,
            added: BTreeSet::new(),
            removed: BTreeSet::new(),
        }
    }

    /// Diff between two assignment sets.
    pub fn between(
        layer_id: LayerId,
        before: &BTreeSet<RegionCode>,
        after: &BTreeSet<RegionCode>,
    ) -> Self {
        Self {
            layer_id,
            added: after.difference(before).cloned().collect(),
            removed: before.difference(after).cloned().collect(),
        }
    }

    /// Whether the diff changes nothing.
    pub fn is_empty(&self) -> bool {
        self.added.is_empty() && self.removed.is_empty()
    }

    /// The diff that undoes this one.
    pub fn inverse(&self) -> Self {
        Self {
            layer_id: self.layer_id,
            added: self.removed.clone(),
            removed: self.added.clone(),
        }
    }

    /// Fold a later diff of the same layer into this one, keeping the net effect.
    ///
    /// A code added here and removed later (or the reverse) cancels out.
    pub fn then(&mut self, later: &Self) {
        debug_assert_eq!(self.layer_id, later.layer_id, "diffs of different layers");
        for code in &later.added {
            if !self.removed.remove(code) {
                self.added.insert(code.clone());
            }
        }
        for code in &later.removed {
            if !self.added.remove(code) {
                self.removed.insert(code.clone());
            }
        }
    }

    /// Apply to an assignment set.
    pub fn apply_to(&self, set: &mut BTreeSet<RegionCode>) {
        for code in &self.removed {
            set.remove(code);
        }
        set.extend(self.added.iter().cloned());
    }
}

/// Layer record before and after a wholesale change (restore).
///
/// `None` means the layer does not exist on that side.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct LayerSwap {
    /// Affected layer.
    pub layer_id: LayerId,
    /// Record before the change.
    pub before: Option<Layer>,
    /// Record after the change.
    pub after: Option<Layer>,
}

impl LayerSwap {
    pub(crate) fn target(&self, forward: bool) -> Option<&Layer> {
        if forward {
            self.after.as_ref()
        } else {
            self.before.as_ref()
        }
    }
}

/// Why a change record exists.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "version", rename_all = "snake_case")]
pub enum ChangeKind {
    /// Committed operator edits.
    Edit,
    /// Wholesale restore of a version snapshot.
    Restore(VersionId),
    /// Inverse of a write that failed to persist.
    Compensation,
}

/// One committed, invertible change. Append-only.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChangeRecord {
    /// Identifier, increasing within an area.
    pub id: ChangeId,
    /// Area the change belongs to.
    pub area_id: AreaId,
    /// Commit time, milliseconds since the Unix epoch.
    pub timestamp_ms: u64,
    /// Origin of the change.
    pub kind: ChangeKind,
    /// Assignment diffs, at most one per layer.
    pub diffs: Vec<LayerDiff>,
    /// Layer records created, deleted or replaced (restores only).
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub layers: Vec<LayerSwap>,
}

impl ChangeRecord {
    /// Layers whose assignments this record changes.
    pub fn layer_ids(&self) -> impl Iterator<Item = LayerId> + '_ {
        self.diffs.iter().map(|d| d.layer_id)
    }

    /// Diff for one layer, if the record touches it.
    pub fn diff_for(&self, layer: LayerId) -> Option<&LayerDiff> {
        self.diffs.iter().find(|d| d.layer_id == layer)
    }
}

/// Where the area session is in the edit/persist cycle.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum SessionState {
    /// Nothing staged and every record persisted.
    Clean,
    /// Edits applied but not yet committed.
    Dirty,
    /// Committed, waiting for persistence to acknowledge.
    Saved,
}

/// Result of an undo or redo.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct AppliedChange {
    /// Record that was moved between stacks.
    pub change_id: ChangeId,
    /// Diffs applied to the store, in the direction they were applied.
    pub diffs: Vec<LayerDiff>,
}

/// Undo/redo stacks and staged edits for one area.
#[derive(Clone, Debug)]
pub struct ChangeTracker {
    area_id: AreaId,
    depth: usize,
    staged: BTreeMap<LayerId, LayerDiff>,
    undo: VecDeque<ChangeRecord>,
    redo: Vec<ChangeRecord>,
    unconfirmed: BTreeSet<ChangeId>,
    next_id: u64,
}

impl ChangeTracker {
    /// Tracker for `area_id` keeping at most `depth` undo entries.
    pub fn new(area_id: AreaId, depth: usize) -> Self {
        Self {
            area_id,
            depth: depth.max(1),
            staged: BTreeMap::new(),
            undo: VecDeque::new(),
            redo: Vec::new(),
            unconfirmed: BTreeSet::new(),
            next_id: 0,
        }
    }

    /// Area this tracker belongs to.
    pub fn area_id(&self) -> AreaId {
        self.area_id
    }

    /// Apply an edit to `store` and stage its effective diff.
    ///
    /// Codes already present in `added` or absent in `removed` are ignored.
    /// A code in both lists ends up unassigned.
    pub fn mutate(
        &mut self,
        store: &mut LayerStore,
        layer_id: LayerId,
        added: impl IntoIterator<Item = RegionCode>,
        removed: impl IntoIterator<Item = RegionCode>,
    ) -> Result<LayerDiff, StoreError> {
        store.ensure_writable(self.area_id)?;
        store.layer_in(self.area_id, layer_id)?;
        let mut diff = LayerDiff::new(layer_id);
        diff.added.extend(store.assign(layer_id, added)?);
        let mut removal = LayerDiff::new(layer_id);
        removal.removed.extend(store.unassign(layer_id, removed)?);
        diff.then(&removal);
        if !diff.is_empty() {
            let staged = self
                .staged
                .entry(layer_id)
                .or_insert_with(|| LayerDiff::new(layer_id));
            staged.then(&diff);
            if staged.is_empty() {
                self.staged.remove(&layer_id);
            }
        }
        debug!(
            layer = %layer_id,
            added = diff.added.len(),
            removed = diff.removed.len(),
            "edit staged"
        );
        Ok(diff)
    }

    /// Staged, uncommitted diffs.
    pub fn staged(&self) -> impl Iterator<Item = &LayerDiff> + '_ {
        self.staged.values()
    }

    /// Turn staged edits into a new record on the undo stack.
    ///
    /// Clears the redo stack. Returns `None` when nothing is staged.
    pub fn commit(&mut self, now_ms: u64) -> Option<ChangeRecord> {
        if self.staged.is_empty() {
            return None;
        }
        let diffs: Vec<LayerDiff> = core::mem::take(&mut self.staged).into_values().collect();
        let record = self.new_record(now_ms, ChangeKind::Edit, diffs, Vec::new());
        info!(change = %record.id, layers = record.diffs.len(), "change committed");
        self.push(record.clone(), false);
        Some(record)
    }

    pub(crate) fn new_record(
        &mut self,
        now_ms: u64,
        kind: ChangeKind,
        diffs: Vec<LayerDiff>,
        layers: Vec<LayerSwap>,
    ) -> ChangeRecord {
        self.next_id += 1;
        ChangeRecord {
            id: ChangeId(self.next_id),
            area_id: self.area_id,
            timestamp_ms: now_ms,
            kind,
            diffs,
            layers,
        }
    }

    /// Push an already-applied record, evicting the oldest past the depth
    /// limit and clearing redo.
    pub(crate) fn push(&mut self, record: ChangeRecord, confirmed: bool) {
        if !confirmed {
            self.unconfirmed.insert(record.id);
        }
        self.undo.push_back(record);
        while self.undo.len() > self.depth {
            if let Some(old) = self.undo.pop_front() {
                debug!(change = %old.id, "evicting oldest undo entry");
            }
        }
        self.redo.clear();
    }

    /// Undo the most recent record. Staged edits are committed first.
    pub fn undo(&mut self, store: &mut LayerStore, now_ms: u64) -> Result<AppliedChange, StoreError> {
        store.ensure_writable(self.area_id)?;
        self.commit(now_ms);
        let record = self
            .undo
            .pop_back()
            .ok_or(StoreError::NoHistory(HistoryDirection::Undo))?;
        let diffs = store.apply_record(&record, false);
        info!(change = %record.id, "change undone");
        let change_id = record.id;
        self.unconfirmed.insert(change_id);
        self.redo.push(record);
        Ok(AppliedChange { change_id, diffs })
    }

    /// Re-apply the most recently undone record.
    pub fn redo(&mut self, store: &mut LayerStore) -> Result<AppliedChange, StoreError> {
        store.ensure_writable(self.area_id)?;
        let record = self
            .redo
            .pop()
            .ok_or(StoreError::NoHistory(HistoryDirection::Redo))?;
        let diffs = store.apply_record(&record, true);
        info!(change = %record.id, "change redone");
        let change_id = record.id;
        self.unconfirmed.insert(change_id);
        self.undo.push_back(record);
        Ok(AppliedChange { change_id, diffs })
    }

    /// Whether [`Self::undo`] would succeed.
    pub fn can_undo(&self) -> bool {
        !self.undo.is_empty() || !self.staged.is_empty()
    }

    /// Whether [`Self::redo`] would succeed.
    pub fn can_redo(&self) -> bool {
        !self.redo.is_empty()
    }

    /// Committed records on the undo stack.
    pub fn undo_count(&self) -> usize {
        self.undo.len()
    }

    /// Records on the redo stack.
    pub fn redo_count(&self) -> usize {
        self.redo.len()
    }

    /// Mark records as persisted.
    pub fn confirm(&mut self, ids: impl IntoIterator<Item = ChangeId>) -> SessionState {
        for id in ids {
            self.unconfirmed.remove(&id);
        }
        self.state()
    }

    /// Records waiting for a persistence acknowledgment.
    pub fn unconfirmed(&self) -> impl Iterator<Item = ChangeId> + '_ {
        self.unconfirmed.iter().copied()
    }

    /// Current state.
    pub fn state(&self) -> SessionState {
        if !self.staged.is_empty() {
            SessionState::Dirty
        } else if !self.unconfirmed.is_empty() {
            SessionState::Saved
        } else {
            SessionState::Clean
        }
    }

    /// Applied records, oldest first.
    pub fn records(&self) -> impl Iterator<Item = &ChangeRecord> + '_ {
        self.undo.iter()
    }

    /// Applied records after `anchor` (all of them for `None`).
    ///
    /// Returns `None` when the anchor is no longer on the undo stack, either
    /// because it was evicted or undone.
    pub fn applied_since(&self, anchor: Option<ChangeId>) -> Option<Vec<&ChangeRecord>> {
        let start = match anchor {
            None => 0,
            Some(id) => self.undo.iter().position(|r| r.id == id)? + 1,
        };
        Some(self.undo.iter().skip(start).collect())
    }

    /// Id of the most recent applied record.
    pub fn head(&self) -> Option<ChangeId> {
        self.undo.back().map(|r| r.id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use territory_spatial::Granularity;

    fn codes(list: &[&str]) -> Vec<RegionCode> {
        list.iter().map(|&c| RegionCode::from(c)).collect()
    }

    fn setup() -> (LayerStore, ChangeTracker, LayerId) {
        let mut store = LayerStore::new();
        let area = store.create_area("Bavaria", Granularity::FIVE);
        store.create_layer(area, "One", "#111").unwrap();
        store.create_layer(area, "Two", "#222").unwrap();
        let three = store.create_layer(area, "Three", "#333").unwrap();
        (store, ChangeTracker::new(area, 50), three)
    }

    #[test]
    fn diff_merge_cancels() {
        let l = LayerId(1);
        let mut a = LayerDiff::new(l);
        a.added.extend(codes(&["1", "2"]));
        let mut b = LayerDiff::new(l);
        b.removed.extend(codes(&["2", "3"]));
        a.then(&b);
        assert_eq!(a.added, codes(&["1"]).into_iter().collect::<BTreeSet<_>>());
        assert_eq!(a.removed, codes(&["3"]).into_iter().collect::<BTreeSet<_>>());
        assert_eq!(a.inverse().inverse(), a);
    }

    #[test]
    fn commit_undo_redo_scenario() {
        let (mut store, mut t, three) = setup();
        store.assign(three, codes(&["80335"])).unwrap();
        let prior = store.assignments(three).unwrap().clone();
        assert_eq!(t.state(), SessionState::Clean);

        t.mutate(&mut store, three, codes(&["80331", "80333"]), []).unwrap();
        assert_eq!(t.state(), SessionState::Dirty);
        let record = t.commit(1_000).unwrap();
        assert_eq!(record.diffs.len(), 1);
        assert_eq!(t.state(), SessionState::Saved);
        let after = store.assignments(three).unwrap().clone();

        t.undo(&mut store, 2_000).unwrap();
        assert_eq!(store.assignments(three).unwrap(), &prior);
        assert!(t.can_redo());
        assert_eq!(t.redo_count(), 1);
        assert_eq!(t.undo_count(), 0);

        t.redo(&mut store).unwrap();
        assert_eq!(store.assignments(three).unwrap(), &after);
        assert!(!t.can_redo());
        assert_eq!(t.confirm([record.id]), SessionState::Clean);
    }

    #[test]
    fn empty_stacks_report_no_history() {
        let (mut store, mut t, _) = setup();
        assert_eq!(
            t.undo(&mut store, 0),
            Err(StoreError::NoHistory(HistoryDirection::Undo))
        );
        assert_eq!(
            t.redo(&mut store),
            Err(StoreError::NoHistory(HistoryDirection::Redo))
        );
        assert!(t.commit(0).is_none());
    }

    #[test]
    fn new_commit_clears_redo() {
        let (mut store, mut t, l) = setup();
        t.mutate(&mut store, l, codes(&["1"]), []).unwrap();
        t.commit(0);
        t.undo(&mut store, 0).unwrap();
        assert!(t.can_redo());
        t.mutate(&mut store, l, codes(&["2"]), []).unwrap();
        t.commit(0);
        assert!(!t.can_redo());
    }

    #[test]
    fn undo_commits_staged_edits_first() {
        let (mut store, mut t, l) = setup();
        t.mutate(&mut store, l, codes(&["1"]), []).unwrap();
        assert!(t.can_undo());
        t.undo(&mut store, 0).unwrap();
        assert!(store.assignments(l).unwrap().is_empty());
        assert_eq!(t.redo_count(), 1);
    }

    #[test]
    fn depth_bounds_undo_stack() {
        let (mut store, _, l) = setup();
        let mut t = ChangeTracker::new(store.layer(l).unwrap().area_id, 3);
        for i in 0..5 {
            t.mutate(&mut store, l, [RegionCode::new(i.to_string())], []).unwrap();
            t.commit(i);
        }
        assert_eq!(t.undo_count(), 3);
        assert_eq!(t.records().next().map(|r| r.id), Some(ChangeId(3)));
    }

    #[test]
    fn edits_that_cancel_leave_nothing_staged() {
        let (mut store, mut t, l) = setup();
        t.mutate(&mut store, l, codes(&["1"]), []).unwrap();
        t.mutate(&mut store, l, [], codes(&["1"])).unwrap();
        assert_eq!(t.state(), SessionState::Clean);
        assert!(t.commit(0).is_none());
    }

    #[test]
    fn mutate_rejects_foreign_layer() {
        let (mut store, mut t, _) = setup();
        let other = store.create_area("Other", Granularity::FIVE);
        let foreign = store.create_layer(other, "X", "#000").unwrap();
        assert!(matches!(
            t.mutate(&mut store, foreign, codes(&["1"]), []),
            Err(StoreError::ForeignLayer { .. })
        ));
    }

    proptest! {
        #[test]
        fn undo_redo_round_trip(
            initial in proptest::collection::btree_set(0_u8..30, 0..15),
            added in proptest::collection::btree_set(0_u8..30, 0..15),
            removed in proptest::collection::btree_set(0_u8..30, 0..15),
        ) {
            let (mut store, mut t, l) = setup();
            let to_codes = |s: &BTreeSet<u8>| -> Vec<RegionCode> {
                s.iter().map(|n| RegionCode::new(n.to_string())).collect()
            };
            store.assign(l, to_codes(&initial)).unwrap();
            let before = store.assignments(l).unwrap().clone();
            t.mutate(&mut store, l, to_codes(&added), to_codes(&removed)).unwrap();
            t.commit(0);
            let after = store.assignments(l).unwrap().clone();
            if t.can_undo() {
                t.undo(&mut store, 0).unwrap();
                prop_assert_eq!(store.assignments(l).unwrap(), &before);
                t.redo(&mut store).unwrap();
            }
            prop_assert_eq!(store.assignments(l).unwrap(), &after);
        }
    }
}
