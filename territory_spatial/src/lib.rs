// Copyright 2025 the Territory Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Territory Spatial: postal region boundaries and the queries that select them.
//!
//! This crate turns a provider's boundary features into an immutable
//! [`BoundaryDataset`], indexes it once into a [`SpatialIndex`], and exposes
//! the selection operators that convert map gestures into sets of
//! [`RegionCode`]s.
//!
//! - [`BoundaryDataset`]: normalized boundaries for one [`Granularity`], with
//!   cached bbox and centroid per feature.
//! - [`SpatialIndex`]: point, circle, polygon and rect queries, the adjacency
//!   graph, and hole detection. Candidates are narrowed through
//!   [`territory_index`] (packed R-tree by default, see [`SpatialIndexBackend`]).
//! - [`select`]: point, lasso and circle selection with an explicit
//!   [`SelectionContext`].
//! - [`drive_time`]: drive-time selection through an external
//!   [`RoutingProvider`], gated so stale results are discarded.
//! - [`projection`]: Web Mercator helpers for pixel radii and screen-space rings.
//!
//! Coordinates are [`kurbo::Point`]s with `x = longitude` and `y = latitude`.
//!
//! ## Conventions
//!
//! - Containment uses half-open ray casting on outer rings: points on a
//!   ring's left or bottom edge are inside, points on its right or top edge
//!   are outside. A point on a shared edge belongs to exactly one region.
//! - Circle queries measure great-circle (haversine) distance from the circle
//!   center to each feature centroid.
//! - Query results are sorted by code and deduplicated.
//!
//! ## Example
//!
//! ```
//! use std::sync::Arc;
//!
//! use kurbo::Point;
//! use territory_spatial::{BoundaryDataset, Granularity, SpatialConfig, SpatialIndex};
//!
//! let geojson = r#"{
//!   "type": "FeatureCollection",
//!   "features": [
//!     { "type": "Feature", "properties": { "plz": "80331" },
//!       "geometry": { "type": "Polygon",
//!                     "coordinates": [[[11.0,48.0],[11.1,48.0],[11.1,48.1],[11.0,48.1],[11.0,48.0]]] } },
//!     { "type": "Feature", "properties": { "plz": "80333" },
//!       "geometry": { "type": "Polygon",
//!                     "coordinates": [[[11.1,48.0],[11.2,48.0],[11.2,48.1],[11.1,48.1],[11.1,48.0]]] } }
//!   ]
//! }"#;
//!
//! let config = SpatialConfig::default();
//! let dataset = BoundaryDataset::from_geojson_str(Granularity::FIVE, geojson, &config.code_keys)?;
//! let index = SpatialIndex::new(Arc::new(dataset), &config);
//!
//! let hit = index.point_query(Point::new(11.05, 48.05));
//! assert_eq!(hit.map(|c| c.as_str()), Some("80331"));
//!
//! let lasso = [
//!     Point::new(10.9, 47.9),
//!     Point::new(11.3, 47.9),
//!     Point::new(11.3, 48.2),
//!     Point::new(10.9, 48.2),
//! ];
//! assert_eq!(index.polygon_query(&lasso)?.len(), 2);
//! assert_eq!(index.neighbors("80331").map(|n| n.len()), Some(1));
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```

pub mod config;
pub mod dataset;
pub mod drive_time;
pub mod error;
pub mod geometry;
pub mod projection;
pub mod select;
pub mod spatial;
pub mod types;

pub use config::{SpatialConfig, SpatialIndexBackend};
pub use dataset::{BoundaryDataset, BoundaryFeature, Polygon, RawFeature, RawGeometry};
pub use drive_time::{
    CancelToken, DriveTimeError, DriveTimeGate, DriveTimeRequest, DriveTimeTicket, GestureId,
    RoutingError, RoutingProvider, RoutingResult, drive_time_select,
};
pub use error::{DatasetError, GeometryError};
pub use projection::{Unproject, WebMercatorViewport};
pub use select::{Selection, SelectionContext, circle_select, point_select, polygon_select};
pub use spatial::SpatialIndex;
pub use types::{Granularity, RegionCode};
