// Copyright 2025 the Territory Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Explicit per-area editing session.
//!
//! A [`Session`] owns everything one writer needs for one area: the layer
//! store, the change tracker, the version log and the autosave coordinator.
//! There is no ambient state; every operation goes through the session.
//!
//! Edits follow a two-phase protocol. They are applied in memory immediately
//! and recorded as tentative [`ChangeRecord`]s. An acknowledged write confirms
//! the records it covered. A failed write parks its layer until the caller
//! either [retries](Session::retry) it or [compensates](Session::compensate)
//! with an explicit inverse change.

use std::collections::{BTreeMap, BTreeSet};

use territory_spatial::RegionCode;
use tracing::{info, warn};

use crate::autosave::{AutosaveCoordinator, Dispatch, PersistenceStore, PumpReport, WriteTicket};
use crate::clock::{Clock, SystemClock};
use crate::config::EngineConfig;
use crate::conflicts::ConflictingCode;
use crate::error::{FailedWrite, PersistenceFailure, StoreError};
use crate::history::{
    AppliedChange, ChangeKind, ChangeRecord, ChangeTracker, LayerDiff, LayerSwap, SessionState,
};
use crate::ids::{AreaId, ChangeId, LayerId, VersionId};
use crate::model::{Area, Layer, LayerPatch};
use crate::store::LayerStore;
use crate::versions::{Capture, LayerState, SnapshotMeta, VersionLog, VersionSnapshot};

/// Result of [`Session::commit`].
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CommitSummary {
    /// The new record.
    pub record: ChangeRecord,
    /// Conflicts involving codes the record added. Informational only.
    pub conflicts: Vec<ConflictingCode>,
}

/// Result of [`Session::restore`].
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct RestoreOutcome {
    /// The change record produced by the restore; undoable like any other.
    pub change_id: ChangeId,
    /// Snapshot captured right after the restore.
    pub version_id: VersionId,
}

/// Single-writer editing session for one area.
#[derive(Debug)]
pub struct Session<C: Clock = SystemClock> {
    area_id: AreaId,
    clock: C,
    store: LayerStore,
    tracker: ChangeTracker,
    versions: VersionLog,
    autosave: AutosaveCoordinator,
    unsaved_snapshots: Vec<VersionId>,
}

impl<C: Clock> Session<C> {
    /// Open a session on an existing area of `store` with an empty version
    /// log. Version numbers still continue from the area's counter.
    pub fn open(
        config: &EngineConfig,
        clock: C,
        store: LayerStore,
        area_id: AreaId,
    ) -> Result<Self, StoreError> {
        Self::open_with_versions(config, clock, store, area_id, VersionLog::new())
    }

    /// Open a session that can restore snapshots taken earlier.
    ///
    /// `versions` is typically the log returned by [`Self::into_parts`] or one
    /// rebuilt with [`VersionLog::from_snapshots`].
    pub fn open_with_versions(
        config: &EngineConfig,
        clock: C,
        store: LayerStore,
        area_id: AreaId,
        versions: VersionLog,
    ) -> Result<Self, StoreError> {
        store.area(area_id)?;
        info!(
            area = %area_id,
            versions = versions.list(area_id).count(),
            "session opened"
        );
        Ok(Self {
            area_id,
            clock,
            store,
            tracker: ChangeTracker::new(area_id, config.history.undo_depth),
            versions,
            autosave: AutosaveCoordinator::new(config.autosave.debounce_ms),
            unsaved_snapshots: Vec::new(),
        })
    }

    /// Area being edited.
    pub fn area_id(&self) -> AreaId {
        self.area_id
    }

    /// The area record.
    pub fn area(&self) -> Result<&Area, StoreError> {
        self.store.area(self.area_id)
    }

    /// Read access to the underlying store.
    pub fn store(&self) -> &LayerStore {
        &self.store
    }

    /// Change history.
    pub fn history(&self) -> &ChangeTracker {
        &self.tracker
    }

    /// Snapshots of this area known to the session.
    pub fn versions(&self) -> impl Iterator<Item = &VersionSnapshot> + '_ {
        self.versions.list(self.area_id)
    }

    /// Look up a snapshot of this area.
    pub fn version(&self, id: VersionId) -> Result<&VersionSnapshot, StoreError> {
        let snapshot = self.versions.get(id)?;
        if snapshot.area_id != self.area_id {
            return Err(StoreError::VersionNotFound(id));
        }
        Ok(snapshot)
    }

    /// Autosave queues.
    pub fn autosave(&self) -> &AutosaveCoordinator {
        &self.autosave
    }

    /// End the session and hand back the store.
    ///
    /// Call [`Self::force_flush`] first; queued writes are dropped.
    pub fn into_store(self) -> LayerStore {
        self.into_parts().0
    }

    /// End the session and hand back the store and the version log, ready
    /// for [`Self::open_with_versions`].
    pub fn into_parts(self) -> (LayerStore, VersionLog) {
        if !self.autosave.is_idle() {
            warn!(area = %self.area_id, "closing session with unsaved writes");
        }
        (self.store, self.versions)
    }

    /// Rename the area.
    pub fn rename_area(&mut self, name: impl Into<String>) -> Result<(), StoreError> {
        self.store.rename_area(self.area_id, name)
    }

    /// Layers of the area in render order.
    pub fn layers(&self) -> Vec<&Layer> {
        self.store.layers_in(self.area_id)
    }

    /// Codes assigned to one of the area's layers.
    pub fn assignments(&self, layer_id: LayerId) -> Result<&BTreeSet<RegionCode>, StoreError> {
        self.store.layer_in(self.area_id, layer_id)?;
        self.store.assignments(layer_id)
    }

    /// Create an empty layer at the end of the render order.
    pub fn create_layer(
        &mut self,
        name: impl Into<String>,
        color: impl Into<String>,
    ) -> Result<LayerId, StoreError> {
        self.store.create_layer(self.area_id, name, color)
    }

    /// Update layer metadata.
    pub fn update_layer(&mut self, layer_id: LayerId, patch: LayerPatch) -> Result<(), StoreError> {
        self.store.layer_in(self.area_id, layer_id)?;
        self.store.update_layer(layer_id, patch)
    }

    /// Set the render order.
    pub fn reorder_layers(&mut self, order: &[LayerId]) -> Result<(), StoreError> {
        self.store.reorder_layers(self.area_id, order)
    }

    /// Delete a layer as an undoable change.
    ///
    /// Staged edits are committed first. The removal of the layer's codes is
    /// queued for autosave like any other edit.
    pub fn delete_layer(&mut self, layer_id: LayerId) -> Result<ChangeId, StoreError> {
        self.store.ensure_writable(self.area_id)?;
        let layer = self.store.layer_in(self.area_id, layer_id)?.clone();
        let codes = self.store.assignments(layer_id)?.clone();
        let now = self.clock.now_ms();
        self.commit_at(now);
        let diff = LayerDiff::between(layer_id, &codes, &BTreeSet::new());
        let diffs = if diff.is_empty() { Vec::new() } else { vec![diff] };
        let swap = LayerSwap {
            layer_id,
            before: Some(layer),
            after: None,
        };
        let record = self
            .tracker
            .new_record(now, ChangeKind::Edit, diffs, vec![swap]);
        let applied = self.store.apply_record(&record, true);
        let change_id = record.id;
        self.tracker.push(record, false);
        self.queue_writes(change_id, &applied, now);
        info!(area = %self.area_id, layer = %layer_id, "layer deleted");
        Ok(change_id)
    }

    /// Apply an edit immediately and stage it for the next commit.
    pub fn mutate(
        &mut self,
        layer_id: LayerId,
        added: impl IntoIterator<Item = RegionCode>,
        removed: impl IntoIterator<Item = RegionCode>,
    ) -> Result<LayerDiff, StoreError> {
        self.tracker.mutate(&mut self.store, layer_id, added, removed)
    }

    /// Stage the addition of `codes` to a layer.
    pub fn assign(
        &mut self,
        layer_id: LayerId,
        codes: impl IntoIterator<Item = RegionCode>,
    ) -> Result<LayerDiff, StoreError> {
        self.mutate(layer_id, codes, [])
    }

    /// Stage the removal of `codes` from a layer.
    pub fn unassign(
        &mut self,
        layer_id: LayerId,
        codes: impl IntoIterator<Item = RegionCode>,
    ) -> Result<LayerDiff, StoreError> {
        self.mutate(layer_id, [], codes)
    }

    /// Commit staged edits as one change record and queue them for autosave.
    ///
    /// Returns `None` when nothing is staged.
    pub fn commit(&mut self) -> Result<Option<CommitSummary>, StoreError> {
        self.store.ensure_writable(self.area_id)?;
        let now = self.clock.now_ms();
        let Some(record) = self.commit_at(now) else {
            return Ok(None);
        };
        let added: BTreeSet<&RegionCode> = record.diffs.iter().flat_map(|d| &d.added).collect();
        let conflicts: Vec<ConflictingCode> = self
            .store
            .conflicts_in_area(self.area_id)?
            .into_iter()
            .filter(|c| added.contains(&c.code))
            .collect();
        if !conflicts.is_empty() {
            info!(change = %record.id, conflicts = conflicts.len(), "commit created conflicts");
        }
        Ok(Some(CommitSummary { record, conflicts }))
    }

    fn commit_at(&mut self, now_ms: u64) -> Option<ChangeRecord> {
        let record = self.tracker.commit(now_ms)?;
        self.queue_writes(record.id, &record.diffs, now_ms);
        Some(record)
    }

    fn queue_writes(&mut self, change_id: ChangeId, diffs: &[LayerDiff], now_ms: u64) {
        let mut queued = false;
        for diff in diffs.iter().filter(|d| !d.is_empty()) {
            self.autosave.record(self.area_id, diff, change_id, now_ms);
            queued = true;
        }
        if !queued {
            self.confirm_settled([change_id]);
        }
    }

    /// Confirm records whose writes have landed, skipping any id that a
    /// queued, in-flight or failed write still covers.
    fn confirm_settled(&mut self, ids: impl IntoIterator<Item = ChangeId>) -> SessionState {
        let autosave = &self.autosave;
        let settled: Vec<ChangeId> = ids.into_iter().filter(|id| !autosave.covers(*id)).collect();
        self.tracker.confirm(settled)
    }

    /// Undo the most recent change. Staged edits are committed first.
    pub fn undo(&mut self) -> Result<AppliedChange, StoreError> {
        let now = self.clock.now_ms();
        self.store.ensure_writable(self.area_id)?;
        if let Some(record) = self.tracker.commit(now) {
            self.queue_writes(record.id, &record.diffs, now);
        }
        let applied = self.tracker.undo(&mut self.store, now)?;
        self.queue_writes(applied.change_id, &applied.diffs, now);
        Ok(applied)
    }

    /// Re-apply the most recently undone change.
    pub fn redo(&mut self) -> Result<AppliedChange, StoreError> {
        let applied = self.tracker.redo(&mut self.store)?;
        let now = self.clock.now_ms();
        self.queue_writes(applied.change_id, &applied.diffs, now);
        Ok(applied)
    }

    /// Whether [`Self::undo`] would succeed.
    pub fn can_undo(&self) -> bool {
        self.tracker.can_undo()
    }

    /// Whether [`Self::redo`] would succeed.
    pub fn can_redo(&self) -> bool {
        self.tracker.can_redo()
    }

    /// Entries on the undo stack.
    pub fn undo_count(&self) -> usize {
        self.tracker.undo_count()
    }

    /// Entries on the redo stack.
    pub fn redo_count(&self) -> usize {
        self.tracker.redo_count()
    }

    /// Edit/persist state.
    pub fn state(&self) -> SessionState {
        self.tracker.state()
    }

    /// Every code held by two or more layers of the area.
    pub fn conflicts(&self) -> Result<Vec<ConflictingCode>, StoreError> {
        self.store.conflicts_in_area(self.area_id)
    }

    /// Capture a version snapshot. Staged edits are committed first.
    ///
    /// The snapshot is written on the next [`Self::pump`] regardless of the
    /// debounce window.
    pub fn snapshot(&mut self, meta: SnapshotMeta) -> Result<VersionId, StoreError> {
        self.store.area(self.area_id)?;
        let now = self.clock.now_ms();
        self.commit_at(now);
        let head = self.tracker.head();
        let id = self
            .versions
            .capture(&mut self.store, self.area_id, meta, None, head, now)?
            .id;
        self.unsaved_snapshots.push(id);
        Ok(id)
    }

    /// Replace every layer and assignment with a snapshot's state.
    ///
    /// Produces one undoable change record and a new snapshot pointing back
    /// at the restored one. Either all of that happens or, if the area is
    /// archived or the version is unknown, nothing does: staged edits stay
    /// staged and the history is unchanged.
    pub fn restore(&mut self, version_id: VersionId) -> Result<RestoreOutcome, StoreError> {
        self.store.ensure_writable(self.area_id)?;
        let target = self.version(version_id)?.clone();
        let version_number = self.versions.next_number(&self.store, self.area_id)?;

        // Staged edits are already applied, so this is the state to replace.
        let mut current: BTreeMap<LayerId, (Layer, BTreeSet<RegionCode>)> = BTreeMap::new();
        for layer in self.store.layers_in(self.area_id) {
            let codes = self.store.assignments(layer.id)?.clone();
            current.insert(layer.id, (layer.clone(), codes));
        }

        // Render order after the restore, renumbered from zero.
        let mut restored: Vec<LayerState> = target.layers.clone();
        restored.sort_by_key(|s| (s.layer.order_index, s.layer.id));
        for (i, state) in restored.iter_mut().enumerate() {
            state.layer.order_index = u32::try_from(i).unwrap_or(u32::MAX);
        }
        let wanted: BTreeMap<LayerId, (&Layer, &BTreeSet<RegionCode>)> = restored
            .iter()
            .map(|s| (s.layer.id, (&s.layer, &s.codes)))
            .collect();
        let ids: BTreeSet<LayerId> = current.keys().chain(wanted.keys()).copied().collect();

        let empty = BTreeSet::new();
        let mut diffs = Vec::new();
        let mut swaps = Vec::new();
        for id in ids {
            let before = current.get(&id);
            let after = wanted.get(&id);
            let before_layer = before.map(|(l, _)| l.clone());
            let after_layer = after.map(|(l, _)| (*l).clone());
            if before_layer != after_layer {
                swaps.push(LayerSwap {
                    layer_id: id,
                    before: before_layer,
                    after: after_layer,
                });
            }
            let diff = LayerDiff::between(
                id,
                before.map_or(&empty, |(_, c)| c),
                after.map_or(&empty, |(_, c)| *c),
            );
            if !diff.is_empty() {
                diffs.push(diff);
            }
        }

        // Nothing below can fail.
        let now = self.clock.now_ms();
        self.commit_at(now);
        let record = self
            .tracker
            .new_record(now, ChangeKind::Restore(version_id), diffs, swaps);
        let change_id = record.id;
        let applied = self.store.apply_record(&record, true);
        self.tracker.push(record, false);
        self.queue_writes(change_id, &applied, now);

        let capture = Capture {
            area_id: self.area_id,
            version_number,
            meta: SnapshotMeta::named(format!("Restored from version {}", target.version_number)),
            layers: restored,
            restored_from: Some(version_id),
            last_change: Some(change_id),
            created_ms: now,
        };
        let version = self.versions.append(&mut self.store, capture).id;
        self.unsaved_snapshots.push(version);
        info!(
            area = %self.area_id,
            from = target.version_number,
            change = %change_id,
            "version restored"
        );
        Ok(RestoreOutcome {
            change_id,
            version_id: version,
        })
    }

    /// Writes due now, for callers driving persistence asynchronously.
    ///
    /// Records whose edits cancelled out are confirmed right away.
    pub fn dispatch(&mut self) -> Dispatch {
        let dispatch = self.autosave.due(self.clock.now_ms());
        self.confirm_settled(dispatch.settled.iter().copied());
        dispatch
    }

    /// Report the outcome of a write obtained from [`Self::dispatch`].
    pub fn acknowledge(
        &mut self,
        ticket: WriteTicket,
        result: Result<(), String>,
    ) -> Result<SessionState, PersistenceFailure> {
        let ids = self.autosave.complete(ticket, result)?;
        Ok(self.confirm_settled(ids))
    }

    /// Synchronously send due writes and queued snapshots to `store`.
    pub fn pump(&mut self, store: &mut dyn PersistenceStore) -> PumpReport {
        let mut report = self.autosave.pump(self.clock.now_ms(), store);
        self.finish_pump(store, &mut report);
        report
    }

    /// Send every queued write now, ignoring the debounce window.
    pub fn force_flush(&mut self, store: &mut dyn PersistenceStore) -> PumpReport {
        let mut report = self.autosave.force_flush(store);
        self.finish_pump(store, &mut report);
        info!(
            area = %self.area_id,
            confirmed = report.confirmed.len(),
            failures = report.failures.len(),
            "autosave flushed"
        );
        report
    }

    fn finish_pump(&mut self, store: &mut dyn PersistenceStore, report: &mut PumpReport) {
        self.confirm_settled(report.confirmed.iter().copied());
        for id in core::mem::take(&mut self.unsaved_snapshots) {
            let Ok(snapshot) = self.versions.get(id) else {
                continue;
            };
            if let Err(failure) = self.autosave.persist_snapshot(store, snapshot) {
                report.failures.push(failure);
            }
        }
    }

    /// Re-queue a failed write, due immediately.
    ///
    /// Returns `false` if there is nothing to retry for this failure.
    pub fn retry(&mut self, failure: &PersistenceFailure) -> bool {
        match &failure.write {
            FailedWrite::Diff { diff, .. } => {
                self.autosave.retry(diff.layer_id, self.clock.now_ms())
            }
            FailedWrite::Snapshot(id) => {
                if self.version(*id).is_err() || self.unsaved_snapshots.contains(id) {
                    return false;
                }
                self.unsaved_snapshots.push(*id);
                true
            }
        }
    }

    /// Roll the in-memory state back to what persistence holds after a failed
    /// diff write.
    ///
    /// Applies the effective inverse of the attempted diff as a new, already
    /// confirmed change record, confirms the records the failed write
    /// covered, and unblocks the layer. Returns `None` when nothing needed to
    /// change or the failure was not a diff write.
    ///
    /// Fails with [`StoreError::LayerNotFound`] and leaves the failure parked
    /// if the layer has since been deleted; [retry](Self::retry) it instead.
    pub fn compensate(
        &mut self,
        failure: &PersistenceFailure,
    ) -> Result<Option<ChangeId>, StoreError> {
        let FailedWrite::Diff { diff, change_ids } = &failure.write else {
            return Ok(None);
        };
        self.store.ensure_writable(self.area_id)?;
        if let Err(err) = self.store.layer_in(self.area_id, diff.layer_id) {
            warn!(layer = %diff.layer_id, "cannot compensate a write for a deleted layer");
            return Err(err);
        }
        let codes = self.store.assignments(diff.layer_id)?;
        let mut inverse = LayerDiff::new(diff.layer_id);
        inverse
            .removed
            .extend(diff.added.iter().filter(|c| codes.contains(*c)).cloned());
        inverse
            .added
            .extend(diff.removed.iter().filter(|c| !codes.contains(*c)).cloned());

        let now = self.clock.now_ms();
        self.commit_at(now);
        self.autosave.take_failure(diff.layer_id);
        self.confirm_settled(change_ids.iter().copied());
        if inverse.is_empty() {
            return Ok(None);
        }
        let record = self
            .tracker
            .new_record(now, ChangeKind::Compensation, vec![inverse], Vec::new());
        self.store.apply_record(&record, true);
        let change_id = record.id;
        warn!(
            layer = %diff.layer_id,
            change = %change_id,
            "compensated failed write"
        );
        self.tracker.push(record, true);
        Ok(Some(change_id))
    }
}
