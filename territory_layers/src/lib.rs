// Copyright 2025 the Territory Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Territory Layers: versioned, conflict-aware assignment of regions to layers.
//!
//! An area holds ordered, colored layers; each layer holds a set of
//! [`RegionCode`](territory_spatial::RegionCode)s. This crate manages that
//! state and everything around editing it:
//!
//! - [`LayerStore`]: areas, layers and assignment sets.
//! - [`detect_conflicts`]: codes held by more than one layer.
//! - [`ChangeTracker`]: invertible [`LayerDiff`]s, bounded undo/redo and the
//!   `Clean → Dirty → Saved` cycle.
//! - [`VersionLog`]: append-only [`VersionSnapshot`]s and history replay.
//! - [`AutosaveCoordinator`]: debounced, per-layer serialized writes to a
//!   [`PersistenceStore`].
//! - [`Session`]: the explicit per-area context tying the above together.
//!
//! ## Example
//!
//! ```
//! use territory_layers::{EngineConfig, LayerStore, ManualClock, Session, SessionState, SnapshotMeta};
//! use territory_spatial::{Granularity, RegionCode};
//!
//! let mut store = LayerStore::new();
//! let area = store.create_area("Munich", Granularity::FIVE);
//! let mut session = Session::open(&EngineConfig::default(), ManualClock::new(0), store, area)?;
//!
//! let north = session.create_layer("North", "#3388ff")?;
//! session.assign(north, [RegionCode::from("80331"), RegionCode::from("80333")])?;
//! session.commit()?;
//! assert_eq!(session.state(), SessionState::Saved);
//!
//! let plan = session.snapshot(SnapshotMeta::named("Q1 plan"))?;
//! session.unassign(north, [RegionCode::from("80331")])?;
//! session.commit()?;
//!
//! session.restore(plan)?;
//! assert_eq!(session.assignments(north)?.len(), 2);
//!
//! session.undo()?;
//! assert_eq!(session.assignments(north)?.len(), 1);
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```

pub mod autosave;
pub mod clock;
pub mod config;
pub mod conflicts;
pub mod error;
pub mod history;
pub mod ids;
pub mod model;
pub mod session;
pub mod store;
pub mod versions;

pub use autosave::{
    AutosaveCoordinator, Dispatch, PersistError, PersistenceStore, PumpReport, WriteRequest,
    WriteTicket,
};
pub use clock::{Clock, ManualClock, SystemClock};
pub use config::{AutosaveConfig, ConfigError, EngineConfig, HistoryConfig};
pub use conflicts::{ConflictingCode, LayerOwner, detect_conflicts};
pub use error::{FailedWrite, HistoryDirection, PersistenceFailure, StoreError};
pub use history::{
    AppliedChange, ChangeKind, ChangeRecord, ChangeTracker, LayerDiff, LayerSwap, SessionState,
};
pub use ids::{AreaId, ChangeId, LayerId, VersionId};
pub use model::{Area, Layer, LayerPatch};
pub use session::{CommitSummary, RestoreOutcome, Session};
pub use store::LayerStore;
pub use versions::{LayerState, SnapshotMeta, VersionLog, VersionSnapshot, rebuild_assignments};
