// Copyright 2025 the Territory Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Areas and layers.

use serde::{Deserialize, Serialize};
use territory_spatial::Granularity;

use crate::ids::{AreaId, LayerId};

/// Top-level working project. Archived rather than deleted.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Area {
    /// Identifier.
    pub id: AreaId,
    /// Display name.
    pub name: String,
    /// Granularity of every code assigned within the area.
    pub granularity: Granularity,
    /// Archived areas reject every mutation.
    pub archived: bool,
    /// Number of the latest version snapshot, `0` before the first one.
    pub current_version_number: u32,
}

/// A named, colored territory inside an area.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Layer {
    /// Identifier.
    pub id: LayerId,
    /// Owning area.
    pub area_id: AreaId,
    /// Display name.
    pub name: String,
    /// CSS-style color, e.g. `#3388ff`.
    pub color: String,
    /// Fill opacity in percent, `0..=100`.
    pub opacity: u8,
    /// Whether the presentation layer draws it.
    pub visible: bool,
    /// Position in the area's render order.
    pub order_index: u32,
}

/// Partial update for [`LayerStore::update_layer`](crate::LayerStore::update_layer).
///
/// `None` leaves a field unchanged. Opacity is clamped to `0..=100`.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LayerPatch {
    /// New name.
    pub name: Option<String>,
    /// New color.
    pub color: Option<String>,
    /// New opacity.
    pub opacity: Option<u8>,
    /// New visibility.
    pub visible: Option<bool>,
}

impl LayerPatch {
    pub(crate) fn apply(self, layer: &mut Layer) {
        if let Some(name) = self.name {
            layer.name = name;
        }
        if let Some(color) = self.color {
            layer.color = color;
        }
        if let Some(opacity) = self.opacity {
            layer.opacity = opacity.min(100);
        }
        if let Some(visible) = self.visible {
            layer.visible = visible;
        }
    }
}
