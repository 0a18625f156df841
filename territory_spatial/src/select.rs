// Copyright 2025 the Territory Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Selection operators: gestures in, region codes out.
//!
//! Operators are pure with respect to the index. They never touch assignment
//! state; callers commit the returned codes explicitly. Invalid gestures do not
//! surface as errors: the operator returns an empty [`Selection`] carrying the
//! reason in [`Selection::rejected`].

use kurbo::Point;
use tracing::debug;

use crate::error::GeometryError;
use crate::geometry::is_geographic;
use crate::projection::{Unproject, pixel_radius_to_degrees};
use crate::spatial::SpatialIndex;
use crate::types::RegionCode;

/// Everything a selection operator needs, passed explicitly per call.
#[derive(Copy, Clone)]
pub struct SelectionContext<'a> {
    /// Index to query.
    pub index: &'a SpatialIndex,
    /// Inverse projection for gestures captured in screen space.
    pub unproject: Option<&'a dyn Unproject>,
    /// Current map zoom, used to convert pixel radii.
    pub zoom: f64,
}

impl core::fmt::Debug for SelectionContext<'_> {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("SelectionContext")
            .field("features", &self.index.len())
            .field("unproject", &self.unproject.is_some())
            .field("zoom", &self.zoom)
            .finish()
    }
}

impl<'a> SelectionContext<'a> {
    /// Context without an inverse projection.
    pub fn new(index: &'a SpatialIndex, zoom: f64) -> Self {
        Self {
            index,
            unproject: None,
            zoom,
        }
    }

    /// Attach an inverse projection.
    pub fn with_unproject(mut self, unproject: &'a dyn Unproject) -> Self {
        self.unproject = Some(unproject);
        self
    }

    fn to_geo(&self, p: Point) -> Point {
        match self.unproject {
            Some(u) if p.is_finite() && !is_geographic(p) => u.unproject(p),
            _ => p,
        }
    }
}

/// Result of a selection gesture.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Selection {
    /// Selected codes, sorted and deduplicated.
    pub codes: Vec<RegionCode>,
    /// Why the gesture produced nothing, if it was rejected.
    pub rejected: Option<GeometryError>,
}

impl Selection {
    fn from_query(result: Result<Vec<RegionCode>, GeometryError>) -> Self {
        match result {
            Ok(mut codes) => {
                codes.sort_unstable();
                codes.dedup();
                Self {
                    codes,
                    rejected: None,
                }
            }
            Err(e) => {
                debug!(error = %e, "selection gesture rejected");
                Self {
                    codes: Vec::new(),
                    rejected: Some(e),
                }
            }
        }
    }

    /// Whether nothing was selected.
    pub fn is_empty(&self) -> bool {
        self.codes.is_empty()
    }
}

/// Region under a clicked coordinate.
pub fn point_select(ctx: &SelectionContext<'_>, coord: Point) -> Option<RegionCode> {
    ctx.index.point_query(ctx.to_geo(coord)).cloned()
}

/// Regions whose centroid lies inside a lasso ring.
///
/// Screen-space vertices are unprojected when the context carries an inverse
/// projection; otherwise they reject the ring.
pub fn polygon_select(ctx: &SelectionContext<'_>, ring: &[Point]) -> Selection {
    Selection::from_query(match ctx.unproject {
        Some(u) => ctx.index.polygon_query_projected(ring, u),
        None => ctx.index.polygon_query(ring),
    })
}

/// Regions whose centroid lies within an on-screen circle.
///
/// `pixel_radius` is converted at the circle center's latitude and the
/// context zoom.
pub fn circle_select(ctx: &SelectionContext<'_>, center: Point, pixel_radius: f64) -> Selection {
    let center = ctx.to_geo(center);
    if !pixel_radius.is_finite() || pixel_radius < 0.0 {
        return Selection::from_query(Err(GeometryError::InvalidRadius(pixel_radius)));
    }
    let degrees = pixel_radius_to_degrees(pixel_radius, center.y, ctx.zoom);
    Selection::from_query(ctx.index.circle_query(center, degrees))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::SpatialConfig;
    use crate::dataset::{BoundaryDataset, RawFeature, RawGeometry};
    use crate::projection::meters_per_pixel;
    use crate::types::Granularity;
    use serde_json::{Map, Value};
    use std::sync::Arc;

    fn index() -> SpatialIndex {
        let mut raw = Vec::new();
        for i in 0..4 {
            for j in 0..4 {
                let (x, y) = (11.0 + f64::from(i) * 0.1, 48.0 + f64::from(j) * 0.1);
                raw.push(RawFeature {
                    id: None,
                    properties: Map::from_iter([(
                        "plz".to_owned(),
                        Value::from(format!("8{i}{j}00")),
                    )]),
                    geometry: RawGeometry::Polygon(vec![vec![
                        vec![x, y],
                        vec![x + 0.1, y],
                        vec![x + 0.1, y + 0.1],
                        vec![x, y + 0.1],
                    ]]),
                });
            }
        }
        let config = SpatialConfig::default();
        let ds = BoundaryDataset::from_raw(Granularity::FIVE, raw, &config.code_keys).unwrap();
        SpatialIndex::new(Arc::new(ds), &config)
    }

    #[test]
    fn point_select_clicks_a_region() {
        let ix = index();
        let ctx = SelectionContext::new(&ix, 10.0);
        assert_eq!(
            point_select(&ctx, Point::new(11.15, 48.25)),
            Some(RegionCode::from("81200"))
        );
        assert_eq!(point_select(&ctx, Point::new(0.0, 0.0)), None);
    }

    #[test]
    fn degenerate_lasso_selects_nothing() {
        let ix = index();
        let ctx = SelectionContext::new(&ix, 10.0);
        let sel = polygon_select(&ctx, &[Point::new(11.0, 48.0), Point::new(11.3, 48.3)]);
        assert!(sel.is_empty());
        assert_eq!(sel.rejected, Some(GeometryError::TooFewPoints { points: 2 }));
    }

    #[test]
    fn screen_lasso_without_projection_is_rejected() {
        let ix = index();
        let ctx = SelectionContext::new(&ix, 10.0);
        let sel = polygon_select(
            &ctx,
            &[Point::new(10.0, 10.0), Point::new(500.0, 10.0), Point::new(500.0, 400.0)],
        );
        assert!(sel.is_empty());
        assert!(matches!(sel.rejected, Some(GeometryError::OutOfRange { .. })));
    }

    #[test]
    fn screen_lasso_with_projection() {
        let ix = index();
        let offset = |p: Point| Point::new(p.x - 1000.0, p.y - 1000.0);
        let ctx = SelectionContext::new(&ix, 10.0).with_unproject(&offset);
        let ring = [
            Point::new(1011.0, 1048.0),
            Point::new(1011.2, 1048.0),
            Point::new(1011.2, 1048.2),
            Point::new(1011.0, 1048.2),
        ];
        let sel = polygon_select(&ctx, &ring);
        assert_eq!(sel.rejected, None);
        assert_eq!(
            sel.codes,
            ["80000", "80100", "81000", "81100"].map(RegionCode::from).to_vec()
        );
    }

    #[test]
    fn circle_select_converts_pixels() {
        let ix = index();
        let center = ix.feature("81100").unwrap().centroid();
        let zoom = 10.0;
        // Enough pixels for ~8 km, which reaches east/west neighbours only.
        let px = 8_000.0 / meters_per_pixel(center.y, zoom);
        let ctx = SelectionContext::new(&ix, zoom);
        let sel = circle_select(&ctx, center, px);
        assert_eq!(
            sel.codes,
            ["80100", "81100", "82100"].map(RegionCode::from).to_vec()
        );
        assert_eq!(circle_select(&ctx, center, 0.0).codes.len(), 1);
        let bad = circle_select(&ctx, center, f64::NAN);
        assert!(bad.is_empty() && bad.rejected.is_some());
    }
}
