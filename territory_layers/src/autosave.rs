// Copyright 2025 the Territory Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Autosave coordinator: debounced, per-layer serialized writes.
//!
//! The coordinator is a pure function of elapsed time and its queues. Callers
//! feed it committed diffs with [`AutosaveCoordinator::record`] and ask which
//! writes are due with [`AutosaveCoordinator::due`]; it never reads a clock
//! and never performs I/O itself. [`AutosaveCoordinator::pump`] and
//! [`AutosaveCoordinator::force_flush`] are thin synchronous drivers over a
//! [`PersistenceStore`].
//!
//! Per layer:
//!
//! - diffs recorded within the debounce window merge into one net diff, and
//!   the window restarts on every edit (trailing debounce);
//! - at most one write is in flight; edits arriving meanwhile queue up and go
//!   out after the acknowledgment;
//! - a failed write parks the layer. Nothing more is sent for it until the
//!   caller either [retries](AutosaveCoordinator::retry) or
//!   [discards](AutosaveCoordinator::take_failure) the failure.
//!
//! Different layers write independently.

use std::collections::{BTreeMap, BTreeSet};

use tracing::{debug, info, warn};

use crate::error::{FailedWrite, PersistenceFailure};
use crate::history::LayerDiff;
use crate::ids::{AreaId, ChangeId, LayerId};
use crate::versions::VersionSnapshot;

/// Error type returned by a [`PersistenceStore`].
pub type PersistError = Box<dyn std::error::Error + Send + Sync>;

/// Geometry-aware persistence collaborator.
pub trait PersistenceStore {
    /// Persist a layer's net assignment diff.
    fn write_diff(&mut self, area_id: AreaId, diff: &LayerDiff) -> Result<(), PersistError>;
    /// Persist a version snapshot.
    fn write_snapshot(&mut self, snapshot: &VersionSnapshot) -> Result<(), PersistError>;
}

/// Handle of an in-flight write.
#[derive(Copy, Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct WriteTicket(pub u64);

/// A write the caller should send to the persistence store.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct WriteRequest {
    /// Pass back to [`AutosaveCoordinator::complete`].
    pub ticket: WriteTicket,
    /// Area of the layer.
    pub area_id: AreaId,
    /// Net diff to persist.
    pub diff: LayerDiff,
    /// Change records this write covers.
    pub change_ids: Vec<ChangeId>,
}

/// Output of [`AutosaveCoordinator::due`].
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Dispatch {
    /// Writes to send now.
    pub writes: Vec<WriteRequest>,
    /// Records whose edits cancelled out; nothing needs writing for them.
    pub settled: Vec<ChangeId>,
}

/// Outcome of a synchronous pump or flush.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct PumpReport {
    /// Records now persisted (or settled without a write).
    pub confirmed: Vec<ChangeId>,
    /// Writes that failed during this pump.
    pub failures: Vec<PersistenceFailure>,
}

#[derive(Clone, Debug)]
struct Pending {
    diff: LayerDiff,
    change_ids: BTreeSet<ChangeId>,
    last_edit_ms: u64,
}

#[derive(Clone, Debug)]
struct InFlight {
    ticket: WriteTicket,
    diff: LayerDiff,
    change_ids: Vec<ChangeId>,
}

#[derive(Clone, Debug)]
struct LayerQueue {
    area_id: AreaId,
    pending: Option<Pending>,
    in_flight: Option<InFlight>,
    failed: Option<PersistenceFailure>,
}

impl LayerQueue {
    fn is_idle(&self) -> bool {
        self.pending.is_none() && self.in_flight.is_none() && self.failed.is_none()
    }
}

/// Debounces and serializes outgoing writes per layer.
#[derive(Clone, Debug)]
pub struct AutosaveCoordinator {
    debounce_ms: u64,
    queues: BTreeMap<LayerId, LayerQueue>,
    next_ticket: u64,
}

impl AutosaveCoordinator {
    /// Coordinator with the given quiet period.
    pub fn new(debounce_ms: u64) -> Self {
        Self {
            debounce_ms,
            queues: BTreeMap::new(),
            next_ticket: 0,
        }
    }

    /// Debounce window in milliseconds.
    pub fn debounce_ms(&self) -> u64 {
        self.debounce_ms
    }

    /// Queue a committed diff. Restarts the layer's debounce window.
    pub fn record(&mut self, area_id: AreaId, diff: &LayerDiff, change_id: ChangeId, now_ms: u64) {
        let queue = self
            .queues
            .entry(diff.layer_id)
            .or_insert_with(|| LayerQueue {
                area_id,
                pending: None,
                in_flight: None,
                failed: None,
            });
        let pending = queue.pending.get_or_insert_with(|| Pending {
            diff: LayerDiff::new(diff.layer_id),
            change_ids: BTreeSet::new(),
            last_edit_ms: now_ms,
        });
        pending.diff.then(diff);
        pending.change_ids.insert(change_id);
        pending.last_edit_ms = now_ms;
        debug!(layer = %diff.layer_id, change = %change_id, "diff queued for autosave");
    }

    /// Writes whose debounce window has elapsed by `now_ms`.
    pub fn due(&mut self, now_ms: u64) -> Dispatch {
        let debounce = self.debounce_ms;
        self.dispatch(|p| now_ms >= p.last_edit_ms.saturating_add(debounce))
    }

    /// Every pending write regardless of the debounce window.
    pub fn drain(&mut self) -> Dispatch {
        self.dispatch(|_| true)
    }

    fn dispatch(&mut self, ready: impl Fn(&Pending) -> bool) -> Dispatch {
        let mut out = Dispatch::default();
        for (&layer_id, queue) in &mut self.queues {
            if queue.in_flight.is_some() || queue.failed.is_some() {
                continue;
            }
            let Some(pending) = queue.pending.take_if(|p| ready(p)) else {
                continue;
            };
            let change_ids: Vec<ChangeId> = pending.change_ids.into_iter().collect();
            if pending.diff.is_empty() {
                debug!(layer = %layer_id, "queued edits cancelled out; nothing to write");
                out.settled.extend(change_ids);
                continue;
            }
            self.next_ticket += 1;
            let ticket = WriteTicket(self.next_ticket);
            info!(
                layer = %layer_id,
                ticket = ticket.0,
                added = pending.diff.added.len(),
                removed = pending.diff.removed.len(),
                "dispatching autosave write"
            );
            queue.in_flight = Some(InFlight {
                ticket,
                diff: pending.diff.clone(),
                change_ids: change_ids.clone(),
            });
            out.writes.push(WriteRequest {
                ticket,
                area_id: queue.area_id,
                diff: pending.diff,
                change_ids,
            });
        }
        self.queues.retain(|_, q| !q.is_idle());
        out
    }

    /// Report the outcome of a dispatched write.
    ///
    /// On success returns the change records the write covered. On failure
    /// the layer is parked and the failure is returned; it is not retried.
    /// Unknown tickets are ignored.
    pub fn complete(
        &mut self,
        ticket: WriteTicket,
        result: Result<(), String>,
    ) -> Result<Vec<ChangeId>, PersistenceFailure> {
        let Some((&layer_id, queue)) = self
            .queues
            .iter_mut()
            .find(|(_, q)| q.in_flight.as_ref().is_some_and(|f| f.ticket == ticket))
        else {
            warn!(ticket = ticket.0, "completion for unknown autosave ticket");
            return Ok(Vec::new());
        };
        let Some(flight) = queue.in_flight.take() else {
            return Ok(Vec::new());
        };
        let outcome = match result {
            Ok(()) => {
                debug!(layer = %layer_id, ticket = ticket.0, "autosave write acknowledged");
                Ok(flight.change_ids)
            }
            Err(message) => {
                let failure = PersistenceFailure {
                    area_id: queue.area_id,
                    write: FailedWrite::Diff {
                        diff: flight.diff,
                        change_ids: flight.change_ids,
                    },
                    message,
                };
                warn!(layer = %layer_id, error = %failure.message, "autosave write failed");
                queue.failed = Some(failure.clone());
                Err(failure)
            }
        };
        if queue.is_idle() {
            self.queues.remove(&layer_id);
        }
        outcome
    }

    /// Re-queue a parked failure ahead of newer edits, due immediately.
    ///
    /// Returns `false` if the layer has no parked failure.
    pub fn retry(&mut self, layer_id: LayerId, now_ms: u64) -> bool {
        let Some(queue) = self.queues.get_mut(&layer_id) else {
            return false;
        };
        let Some(failure) = queue.failed.take() else {
            return false;
        };
        let FailedWrite::Diff { mut diff, change_ids } = failure.write else {
            return false;
        };
        let mut ids: BTreeSet<ChangeId> = change_ids.into_iter().collect();
        if let Some(newer) = queue.pending.take() {
            diff.then(&newer.diff);
            ids.extend(newer.change_ids);
        }
        queue.pending = Some(Pending {
            diff,
            change_ids: ids,
            last_edit_ms: now_ms.saturating_sub(self.debounce_ms),
        });
        info!(layer = %layer_id, "retrying failed autosave write");
        true
    }

    /// Remove and return a parked failure, unblocking the layer.
    pub fn take_failure(&mut self, layer_id: LayerId) -> Option<PersistenceFailure> {
        let queue = self.queues.get_mut(&layer_id)?;
        let failure = queue.failed.take();
        if queue.is_idle() {
            self.queues.remove(&layer_id);
        }
        failure
    }

    /// Parked failures.
    pub fn failures(&self) -> impl Iterator<Item = &PersistenceFailure> + '_ {
        self.queues.values().filter_map(|q| q.failed.as_ref())
    }

    /// Layers with queued, in-flight or failed writes.
    pub fn pending_layers(&self) -> Vec<LayerId> {
        self.queues.keys().copied().collect()
    }

    /// Whether a write for `layer_id` is in flight.
    pub fn is_in_flight(&self, layer_id: LayerId) -> bool {
        self.queues
            .get(&layer_id)
            .is_some_and(|q| q.in_flight.is_some())
    }

    /// Earliest time a queued write becomes due.
    pub fn next_deadline(&self) -> Option<u64> {
        self.queues
            .values()
            .filter(|q| q.in_flight.is_none() && q.failed.is_none())
            .filter_map(|q| q.pending.as_ref())
            .map(|p| p.last_edit_ms.saturating_add(self.debounce_ms))
            .min()
    }

    /// Whether a queued, in-flight or failed write still covers `change_id`.
    ///
    /// Undo and redo re-queue the original record's id, so an acknowledged
    /// write does not imply every write for that id has landed.
    pub fn covers(&self, change_id: ChangeId) -> bool {
        self.queues.values().any(|q| {
            q.pending
                .as_ref()
                .is_some_and(|p| p.change_ids.contains(&change_id))
                || q.in_flight
                    .as_ref()
                    .is_some_and(|f| f.change_ids.contains(&change_id))
                || q.failed.as_ref().is_some_and(|f| match &f.write {
                    FailedWrite::Diff { change_ids, .. } => change_ids.contains(&change_id),
                    FailedWrite::Snapshot(_) => false,
                })
        })
    }

    /// Whether nothing is queued, in flight or failed.
    pub fn is_idle(&self) -> bool {
        self.queues.is_empty()
    }

    /// Send every due write to `store` and collect the outcomes.
    pub fn pump(&mut self, now_ms: u64, store: &mut dyn PersistenceStore) -> PumpReport {
        let dispatch = self.due(now_ms);
        self.send(dispatch, store)
    }

    /// Send every queued write now, ignoring the debounce window.
    ///
    /// Used on session teardown. Layers parked on a failure stay parked.
    pub fn force_flush(&mut self, store: &mut dyn PersistenceStore) -> PumpReport {
        let dispatch = self.drain();
        self.send(dispatch, store)
    }

    fn send(&mut self, dispatch: Dispatch, store: &mut dyn PersistenceStore) -> PumpReport {
        let mut report = PumpReport {
            confirmed: dispatch.settled,
            failures: Vec::new(),
        };
        for write in dispatch.writes {
            let result = store
                .write_diff(write.area_id, &write.diff)
                .map_err(|e| e.to_string());
            match self.complete(write.ticket, result) {
                Ok(ids) => report.confirmed.extend(ids),
                Err(failure) => report.failures.push(failure),
            }
        }
        report
    }

    /// Write a snapshot immediately. Snapshots are not debounced.
    pub fn persist_snapshot(
        &self,
        store: &mut dyn PersistenceStore,
        snapshot: &VersionSnapshot,
    ) -> Result<(), PersistenceFailure> {
        store.write_snapshot(snapshot).map_err(|e| {
            warn!(version = %snapshot.id, error = %e, "snapshot write failed");
            PersistenceFailure {
                area_id: snapshot.area_id,
                write: FailedWrite::Snapshot(snapshot.id),
                message: e.to_string(),
            }
        })
    }
}
