// Copyright 2025 the Territory Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Area, layer and assignment records.
//!
//! The store is plain record management: it validates ids and archive state
//! and keeps each layer's assignment set. It has no notion of history;
//! [`ChangeTracker`](crate::ChangeTracker) drives it for undoable edits.

use std::collections::{BTreeMap, BTreeSet};

use territory_spatial::{Granularity, RegionCode};
use tracing::debug;

use crate::conflicts::{ConflictingCode, detect_conflicts};
use crate::error::StoreError;
use crate::history::{ChangeRecord, LayerDiff};
use crate::ids::{AreaId, LayerId, VersionId};
use crate::model::{Area, Layer, LayerPatch};

/// Default fill for new layers.
const DEFAULT_OPACITY: u8 = 50;

/// In-memory areas, layers and assignments.
#[derive(Clone, Debug, Default)]
pub struct LayerStore {
    areas: BTreeMap<AreaId, Area>,
    layers: BTreeMap<LayerId, Layer>,
    assignments: BTreeMap<LayerId, BTreeSet<RegionCode>>,
    next_area: u64,
    next_layer: u64,
    next_version: u64,
}

impl LayerStore {
    /// Empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create an area.
    pub fn create_area(&mut self, name: impl Into<String>, granularity: Granularity) -> AreaId {
        self.next_area += 1;
        let id = AreaId(self.next_area);
        self.areas.insert(
            id,
            Area {
                id,
                name: name.into(),
                granularity,
                archived: false,
                current_version_number: 0,
            },
        );
        id
    }

    /// Look up an area.
    pub fn area(&self, id: AreaId) -> Result<&Area, StoreError> {
        self.areas.get(&id).ok_or(StoreError::AreaNotFound(id))
    }

    /// All areas, archived ones included.
    pub fn areas(&self) -> impl Iterator<Item = &Area> + '_ {
        self.areas.values()
    }

    fn area_mut(&mut self, id: AreaId) -> Result<&mut Area, StoreError> {
        self.areas.get_mut(&id).ok_or(StoreError::AreaNotFound(id))
    }

    /// Fail with [`StoreError::AreaArchived`] unless the area accepts mutations.
    pub fn ensure_writable(&self, id: AreaId) -> Result<&Area, StoreError> {
        let area = self.area(id)?;
        if area.archived {
            return Err(StoreError::AreaArchived(id));
        }
        Ok(area)
    }

    /// Rename an active area.
    pub fn rename_area(&mut self, id: AreaId, name: impl Into<String>) -> Result<(), StoreError> {
        self.ensure_writable(id)?;
        self.area_mut(id)?.name = name.into();
        Ok(())
    }

    /// Archive an area. Idempotent.
    pub fn archive_area(&mut self, id: AreaId) -> Result<(), StoreError> {
        self.area_mut(id)?.archived = true;
        Ok(())
    }

    /// Reactivate an archived area. Idempotent.
    pub fn unarchive_area(&mut self, id: AreaId) -> Result<(), StoreError> {
        self.area_mut(id)?.archived = false;
        Ok(())
    }

    /// Fresh snapshot id above both this store's counter and `floor`.
    pub(crate) fn allocate_version_id(&mut self, floor: u64) -> VersionId {
        self.next_version = self.next_version.max(floor) + 1;
        VersionId(self.next_version)
    }

    /// Raise the area's version counter. Never lowers it.
    pub(crate) fn bump_current_version(&mut self, id: AreaId, number: u32) {
        if let Some(area) = self.areas.get_mut(&id) {
            area.current_version_number = area.current_version_number.max(number);
        }
    }

    /// Create a layer at the end of the area's order.
    pub fn create_layer(
        &mut self,
        area_id: AreaId,
        name: impl Into<String>,
        color: impl Into<String>,
    ) -> Result<LayerId, StoreError> {
        self.ensure_writable(area_id)?;
        let order_index = u32::try_from(self.layers_in(area_id).len()).unwrap_or(u32::MAX);
        self.next_layer += 1;
        let id = LayerId(self.next_layer);
        self.layers.insert(
            id,
            Layer {
                id,
                area_id,
                name: name.into(),
                color: color.into(),
                opacity: DEFAULT_OPACITY,
                visible: true,
                order_index,
            },
        );
        self.assignments.insert(id, BTreeSet::new());
        Ok(id)
    }

    /// Look up a layer.
    pub fn layer(&self, id: LayerId) -> Result<&Layer, StoreError> {
        self.layers.get(&id).ok_or(StoreError::LayerNotFound(id))
    }

    /// Look up a layer that must belong to `area_id`.
    pub fn layer_in(&self, area_id: AreaId, id: LayerId) -> Result<&Layer, StoreError> {
        let layer = self.layer(id)?;
        if layer.area_id != area_id {
            return Err(StoreError::ForeignLayer { layer: id, area: area_id });
        }
        Ok(layer)
    }

    fn writable_layer(&self, id: LayerId) -> Result<&Layer, StoreError> {
        let layer = self.layer(id)?;
        self.ensure_writable(layer.area_id)?;
        Ok(layer)
    }

    /// Update layer metadata.
    pub fn update_layer(&mut self, id: LayerId, patch: LayerPatch) -> Result<(), StoreError> {
        self.writable_layer(id)?;
        if let Some(layer) = self.layers.get_mut(&id) {
            patch.apply(layer);
        }
        Ok(())
    }

    /// Delete a layer and return the codes it held.
    ///
    /// The remaining layers of the area are renumbered to keep `order_index`
    /// dense.
    pub fn delete_layer(&mut self, id: LayerId) -> Result<BTreeSet<RegionCode>, StoreError> {
        let area_id = self.writable_layer(id)?.area_id;
        self.layers.remove(&id);
        let codes = self.assignments.remove(&id).unwrap_or_default();
        self.renumber(area_id);
        Ok(codes)
    }

    /// Layers of an area, sorted by `order_index`.
    pub fn layers_in(&self, area_id: AreaId) -> Vec<&Layer> {
        let mut layers: Vec<&Layer> = self
            .layers
            .values()
            .filter(|l| l.area_id == area_id)
            .collect();
        layers.sort_by_key(|l| (l.order_index, l.id));
        layers
    }

    /// Set the render order of an area's layers.
    ///
    /// `order` must list every layer of the area exactly once.
    pub fn reorder_layers(&mut self, area_id: AreaId, order: &[LayerId]) -> Result<(), StoreError> {
        self.ensure_writable(area_id)?;
        let current: BTreeSet<LayerId> = self.layers_in(area_id).iter().map(|l| l.id).collect();
        let requested: BTreeSet<LayerId> = order.iter().copied().collect();
        if requested.len() != order.len() || requested != current {
            return Err(StoreError::InvalidOrder(area_id));
        }
        self.set_order(order);
        Ok(())
    }

    fn renumber(&mut self, area_id: AreaId) {
        let order: Vec<LayerId> = self.layers_in(area_id).iter().map(|l| l.id).collect();
        self.set_order(&order);
    }

    fn set_order(&mut self, order: &[LayerId]) {
        for (i, id) in order.iter().enumerate() {
            if let Some(layer) = self.layers.get_mut(id) {
                layer.order_index = u32::try_from(i).unwrap_or(u32::MAX);
            }
        }
    }

    /// Codes assigned to a layer.
    pub fn assignments(&self, id: LayerId) -> Result<&BTreeSet<RegionCode>, StoreError> {
        self.assignments.get(&id).ok_or(StoreError::LayerNotFound(id))
    }

    /// Add codes to a layer; returns the codes that were not present before.
    ///
    /// Idempotent: assigning codes the layer already holds changes nothing
    /// and returns an empty list.
    pub fn assign(
        &mut self,
        id: LayerId,
        codes: impl IntoIterator<Item = RegionCode>,
    ) -> Result<Vec<RegionCode>, StoreError> {
        self.writable_layer(id)?;
        let set = self.assignments.entry(id).or_default();
        let mut changed: Vec<RegionCode> =
            codes.into_iter().filter(|c| set.insert(c.clone())).collect();
        changed.sort_unstable();
        Ok(changed)
    }

    /// Remove codes from a layer; returns the codes that were present before.
    pub fn unassign(
        &mut self,
        id: LayerId,
        codes: impl IntoIterator<Item = RegionCode>,
    ) -> Result<Vec<RegionCode>, StoreError> {
        self.writable_layer(id)?;
        let set = self.assignments.entry(id).or_default();
        let mut changed: Vec<RegionCode> = codes.into_iter().filter(|c| set.remove(c)).collect();
        changed.sort_unstable();
        Ok(changed)
    }

    /// Conflicts among the given layers.
    pub fn detect_conflicts(&self, ids: &[LayerId]) -> Result<Vec<ConflictingCode>, StoreError> {
        let layers = ids
            .iter()
            .map(|&id| Ok((self.layer(id)?, self.assignments(id)?)))
            .collect::<Result<Vec<_>, StoreError>>()?;
        Ok(detect_conflicts(layers))
    }

    /// Conflicts among all layers of an area.
    pub fn conflicts_in_area(&self, area_id: AreaId) -> Result<Vec<ConflictingCode>, StoreError> {
        self.area(area_id)?;
        let ids: Vec<LayerId> = self.layers_in(area_id).iter().map(|l| l.id).collect();
        self.detect_conflicts(&ids)
    }

    /// Insert or overwrite a layer record as captured elsewhere, keeping its id.
    fn put_layer(&mut self, layer: Layer) {
        self.next_layer = self.next_layer.max(layer.id.0);
        self.assignments.entry(layer.id).or_default();
        self.layers.insert(layer.id, layer);
    }

    /// Apply a recorded change forwards (redo) or backwards (undo).
    ///
    /// Callers validate before calling; this never fails. Layers missing from
    /// the store (deleted after the record was made) are skipped. Returns the
    /// diffs that were applied, in the direction they were applied.
    pub(crate) fn apply_record(&mut self, record: &ChangeRecord, forward: bool) -> Vec<LayerDiff> {
        for swap in &record.layers {
            if let Some(layer) = swap.target(forward) {
                self.put_layer(layer.clone());
            }
        }
        let mut applied = Vec::with_capacity(record.diffs.len());
        for diff in &record.diffs {
            let diff = if forward { diff.clone() } else { diff.inverse() };
            match self.assignments.get_mut(&diff.layer_id) {
                Some(set) => {
                    diff.apply_to(set);
                    applied.push(diff);
                }
                None => debug!(layer = %diff.layer_id, "skipping diff for deleted layer"),
            }
        }
        for swap in &record.layers {
            if swap.target(forward).is_none() {
                self.layers.remove(&swap.layer_id);
                self.assignments.remove(&swap.layer_id);
            }
        }
        if !record.layers.is_empty() {
            self.renumber(record.area_id);
        }
        applied
    }
}
