// Copyright 2025 the Territory Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Spatial settings: adjacency tolerance, index backend, code property keys.

use serde::{Deserialize, Serialize};

/// Candidate index used by [`SpatialIndex`](crate::SpatialIndex).
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SpatialIndexBackend {
    /// Packed STR R-tree. Logarithmic queries.
    #[default]
    #[serde(rename = "rtree")]
    RTree,
    /// Linear scan. Useful for tiny datasets and as a reference in tests.
    FlatVec,
}

/// Settings for dataset ingestion and the spatial index.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SpatialConfig {
    /// Boundary distance (degrees) under which two regions count as adjacent.
    pub adjacency_epsilon: f64,
    /// Candidate index backend.
    pub backend: SpatialIndexBackend,
    /// Property keys tried in order when resolving a feature's region code.
    pub code_keys: Vec<String>,
}

impl Default for SpatialConfig {
    fn default() -> Self {
        Self {
            adjacency_epsilon: 1e-7,
            backend: SpatialIndexBackend::RTree,
            code_keys: ["code", "plz", "postcode"].map(String::from).to_vec(),
        }
    }
}
