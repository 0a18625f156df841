// Copyright 2025 the Territory Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Error types for the layer store, history, and persistence.

use thiserror::Error;

use crate::history::LayerDiff;
use crate::ids::{AreaId, ChangeId, LayerId, VersionId};

/// Failure of a store, history or version operation.
#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum StoreError {
    /// No area with this id.
    #[error("{0} not found")]
    AreaNotFound(AreaId),
    /// No layer with this id.
    #[error("{0} not found")]
    LayerNotFound(LayerId),
    /// No version snapshot with this id.
    #[error("{0} not found")]
    VersionNotFound(VersionId),
    /// The layer exists but belongs to another area.
    #[error("{layer} does not belong to {area}")]
    ForeignLayer {
        /// Layer that was addressed.
        layer: LayerId,
        /// Area of the session or request.
        area: AreaId,
    },
    /// The area is archived and rejects mutations.
    #[error("{0} is archived")]
    AreaArchived(AreaId),
    /// Undo or redo was called with an empty stack.
    #[error("no history to {0}")]
    NoHistory(HistoryDirection),
    /// A reorder list was not a permutation of the area's layers.
    #[error("layer order for {0} must list every layer of the area exactly once")]
    InvalidOrder(AreaId),
}

/// Which stack [`StoreError::NoHistory`] refers to.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum HistoryDirection {
    /// The undo stack.
    Undo,
    /// The redo stack.
    Redo,
}

impl core::fmt::Display for HistoryDirection {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(match self {
            Self::Undo => "undo",
            Self::Redo => "redo",
        })
    }
}

/// What a failed write was trying to persist.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum FailedWrite {
    /// A layer's net assignment diff.
    Diff {
        /// Attempted diff (carries the layer id).
        diff: LayerDiff,
        /// Change records the diff covered.
        change_ids: Vec<ChangeId>,
    },
    /// A version snapshot.
    Snapshot(VersionId),
}

/// An external write failed. Never retried automatically.
///
/// Carries enough context to retry or compensate by hand.
#[derive(Clone, Debug, Error, PartialEq, Eq)]
#[error("persisting {write:?} for {area_id} failed: {message}")]
pub struct PersistenceFailure {
    /// Area the write belonged to.
    pub area_id: AreaId,
    /// The attempted write.
    pub write: FailedWrite,
    /// Error reported by the store.
    pub message: String,
}

impl PersistenceFailure {
    /// Layer of a failed diff write.
    pub fn layer_id(&self) -> Option<LayerId> {
        match &self.write {
            FailedWrite::Diff { diff, .. } => Some(diff.layer_id),
            FailedWrite::Snapshot(_) => None,
        }
    }
}
