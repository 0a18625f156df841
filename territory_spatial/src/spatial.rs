// Copyright 2025 the Territory Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Spatial index over a [`BoundaryDataset`].
//!
//! Two candidate indexes are built once, up front:
//!
//! - feature bounding boxes, for point lookup and adjacency;
//! - feature centroids (as degenerate boxes), for circle, polygon and rect queries.
//!
//! Every query narrows candidates through one of them and then runs the exact
//! test only on that small set. The adjacency graph is computed lazily on first
//! use and cached; after construction the index is read-only and `Sync`.

use std::collections::{BTreeMap, BTreeSet, VecDeque};
use std::f64::consts::{FRAC_PI_2, PI};
use std::sync::{Arc, OnceLock};

use kurbo::{Point, Rect};
use territory_index::{Aabb2D, Index, IndexGeneric, RTreeIndex};
use tracing::{debug, info};

use crate::config::{SpatialConfig, SpatialIndexBackend};
use crate::dataset::{BoundaryDataset, BoundaryFeature};
use crate::error::GeometryError;
use crate::geometry::{
    EARTH_RADIUS_M, clean_ring, haversine_m, is_geographic, rect_to_aabb, rects_touch, ring_bbox,
    ring_contains, rings_touch,
};
use crate::projection::{METERS_PER_DEGREE, Unproject};
use crate::types::RegionCode;

#[derive(Debug)]
enum Candidates {
    RTree(RTreeIndex<f64, usize>),
    Flat(Index<f64, usize>),
}

impl Candidates {
    fn build(backend: SpatialIndexBackend, entries: Vec<(Aabb2D<f64>, usize)>) -> Self {
        match backend {
            SpatialIndexBackend::RTree => Self::RTree(IndexGeneric::build(entries)),
            SpatialIndexBackend::FlatVec => Self::Flat(IndexGeneric::build(entries)),
        }
    }

    fn query_point(&self, p: Point) -> Box<dyn Iterator<Item = usize> + '_> {
        match self {
            Self::RTree(ix) => Box::new(ix.query_point(p.x, p.y).map(|(_, i)| i)),
            Self::Flat(ix) => Box::new(ix.query_point(p.x, p.y).map(|(_, i)| i)),
        }
    }

    fn query_rect(&self, r: Rect) -> Box<dyn Iterator<Item = usize> + '_> {
        let aabb = rect_to_aabb(r);
        match self {
            Self::RTree(ix) => Box::new(ix.query_rect(aabb).map(|(_, i)| i)),
            Self::Flat(ix) => Box::new(ix.query_rect(aabb).map(|(_, i)| i)),
        }
    }
}

/// Read-only spatial index answering point, circle, polygon and rect queries.
#[derive(Debug)]
pub struct SpatialIndex {
    dataset: Arc<BoundaryDataset>,
    bounds: Candidates,
    centroids: Candidates,
    epsilon: f64,
    adjacency: OnceLock<Vec<Vec<usize>>>,
}

impl SpatialIndex {
    /// Build the candidate indexes for `dataset`.
    pub fn new(dataset: Arc<BoundaryDataset>, config: &SpatialConfig) -> Self {
        let features = dataset.features();
        let bounds = Candidates::build(
            config.backend,
            features
                .iter()
                .enumerate()
                .map(|(i, f)| (rect_to_aabb(f.bbox()), i))
                .collect(),
        );
        let centroids = Candidates::build(
            config.backend,
            features
                .iter()
                .enumerate()
                .map(|(i, f)| {
                    let c = f.centroid();
                    (Aabb2D::from_point(c.x, c.y), i)
                })
                .collect(),
        );
        info!(
            features = features.len(),
            backend = ?config.backend,
            "spatial index built"
        );
        Self {
            dataset,
            bounds,
            centroids,
            epsilon: config.adjacency_epsilon.abs(),
            adjacency: OnceLock::new(),
        }
    }

    /// The indexed dataset.
    pub fn dataset(&self) -> &Arc<BoundaryDataset> {
        &self.dataset
    }

    /// Look up a feature by code.
    pub fn feature(&self, code: &str) -> Option<&BoundaryFeature> {
        self.dataset.feature(code)
    }

    /// Bounding box of the whole dataset.
    pub fn envelope(&self) -> Rect {
        self.dataset.envelope()
    }

    /// Region containing `p`, if any.
    ///
    /// When several outer rings contain the point (overlapping or enclave
    /// boundaries), the feature with the smallest bbox area wins; equal areas
    /// fall back to the lexicographically smaller code.
    pub fn point_query(&self, p: Point) -> Option<&RegionCode> {
        if !p.is_finite() {
            return None;
        }
        let features = self.dataset.features();
        self.bounds
            .query_point(p)
            .map(|i| &features[i])
            .filter(|f| f.contains(p))
            .min_by(|a, b| {
                a.bbox()
                    .area()
                    .total_cmp(&b.bbox().area())
                    .then_with(|| a.code().cmp(b.code()))
            })
            .map(BoundaryFeature::code)
    }

    /// Codes whose centroid lies within `radius_degrees` of `center`.
    ///
    /// The degree radius is converted to metres with the flat 111 320 m/° factor
    /// and compared against the haversine distance; see
    /// [`Self::circle_query_meters`].
    pub fn circle_query(
        &self,
        center: Point,
        radius_degrees: f64,
    ) -> Result<Vec<RegionCode>, GeometryError> {
        if !radius_degrees.is_finite() || radius_degrees < 0.0 {
            return Err(GeometryError::InvalidRadius(radius_degrees));
        }
        self.circle_query_meters(center, radius_degrees * METERS_PER_DEGREE)
    }

    /// Codes whose centroid lies within `radius_m` metres (great-circle) of
    /// `center`, sorted by code.
    pub fn circle_query_meters(
        &self,
        center: Point,
        radius_m: f64,
    ) -> Result<Vec<RegionCode>, GeometryError> {
        if !center.is_finite() {
            return Err(GeometryError::NonFinite { index: 0 });
        }
        if !is_geographic(center) {
            return Err(GeometryError::OutOfRange {
                index: 0,
                x: center.x,
                y: center.y,
            });
        }
        if !radius_m.is_finite() || radius_m < 0.0 {
            return Err(GeometryError::InvalidRadius(radius_m));
        }
        let features = self.dataset.features();
        let mut hits: Vec<usize> = search_rects(center, radius_m)
            .into_iter()
            .flat_map(|r| self.centroids.query_rect(r))
            .filter(|&i| haversine_m(center, features[i].centroid()) <= radius_m)
            .collect();
        hits.sort_unstable();
        hits.dedup();
        Ok(sorted_codes(features, hits))
    }

    /// Codes whose centroid lies inside `ring`, sorted by code.
    ///
    /// Every vertex must be finite and in geographic range; use
    /// [`Self::polygon_query_projected`] for rings drawn in screen space.
    pub fn polygon_query(&self, ring: &[Point]) -> Result<Vec<RegionCode>, GeometryError> {
        let cleaned =
            clean_ring(ring).inspect_err(|e| debug!(error = %e, "rejecting query ring"))?;
        if let Some((index, p)) = ring.iter().enumerate().find(|(_, p)| !is_geographic(**p)) {
            return Err(GeometryError::OutOfRange {
                index,
                x: p.x,
                y: p.y,
            });
        }
        let features = self.dataset.features();
        let hits: Vec<usize> = self
            .centroids
            .query_rect(ring_bbox(&cleaned))
            .filter(|&i| ring_contains(&cleaned, features[i].centroid()))
            .collect();
        Ok(sorted_codes(features, hits))
    }

    /// Like [`Self::polygon_query`], first converting every vertex outside the
    /// geographic range through `unproject`.
    pub fn polygon_query_projected(
        &self,
        ring: &[Point],
        unproject: &dyn Unproject,
    ) -> Result<Vec<RegionCode>, GeometryError> {
        let geo: Vec<Point> = ring
            .iter()
            .map(|&p| {
                if p.is_finite() && !is_geographic(p) {
                    unproject.unproject(p)
                } else {
                    p
                }
            })
            .collect();
        self.polygon_query(&geo)
    }

    /// Codes whose centroid lies in `rect` (edges inclusive), sorted by code.
    pub fn rect_query(&self, rect: Rect) -> Vec<RegionCode> {
        let rect = rect.abs();
        let features = self.dataset.features();
        let hits: Vec<usize> = self
            .centroids
            .query_rect(rect)
            .filter(|&i| {
                let c = features[i].centroid();
                c.x >= rect.x0 && c.x <= rect.x1 && c.y >= rect.y0 && c.y <= rect.y1
            })
            .collect();
        sorted_codes(features, hits)
    }

    fn adjacency(&self) -> &[Vec<usize>] {
        self.adjacency.get_or_init(|| {
            let features = self.dataset.features();
            let mut adj: Vec<Vec<usize>> = vec![Vec::new(); features.len()];
            let mut pairs = 0_usize;
            for (i, a) in features.iter().enumerate() {
                let window = a.bbox().inflate(self.epsilon, self.epsilon);
                for j in self.bounds.query_rect(window) {
                    if j <= i || !touches(a, &features[j], self.epsilon) {
                        continue;
                    }
                    adj[i].push(j);
                    adj[j].push(i);
                    pairs += 1;
                }
            }
            for list in &mut adj {
                list.sort_unstable();
            }
            info!(features = features.len(), pairs, "adjacency graph built");
            adj
        })
    }

    /// Every region mapped to the set of regions whose boundaries touch it.
    pub fn adjacency_graph(&self) -> BTreeMap<RegionCode, BTreeSet<RegionCode>> {
        let features = self.dataset.features();
        self.adjacency()
            .iter()
            .enumerate()
            .map(|(i, list)| {
                (
                    features[i].code().clone(),
                    list.iter().map(|&j| features[j].code().clone()).collect(),
                )
            })
            .collect()
    }

    /// Regions adjacent to `code`, sorted. `None` for an unknown code.
    pub fn neighbors(&self, code: &str) -> Option<Vec<RegionCode>> {
        let i = self.dataset.position(code)?;
        Some(sorted_codes(
            self.dataset.features(),
            self.adjacency()[i].clone(),
        ))
    }

    /// Unselected regions fully enclosed by selected ones, sorted by code.
    ///
    /// Unselected regions touching the dataset envelope, and unselected
    /// regions with no neighbours at all, seed a flood fill through unselected
    /// neighbours. Whatever the fill does not reach is a hole. Unknown codes in
    /// `selected` are ignored.
    pub fn hole_detection(&self, selected: &BTreeSet<RegionCode>) -> Vec<RegionCode> {
        let features = self.dataset.features();
        let adj = self.adjacency();
        let env = self.envelope();
        let eps = self.epsilon;
        let open: Vec<bool> = features.iter().map(|f| !selected.contains(f.code())).collect();
        let mut reached = vec![false; features.len()];
        let mut queue = VecDeque::new();
        for (i, f) in features.iter().enumerate() {
            let b = f.bbox();
            let on_envelope = b.x0 <= env.x0 + eps
                || b.y0 <= env.y0 + eps
                || b.x1 >= env.x1 - eps
                || b.y1 >= env.y1 - eps;
            if open[i] && (on_envelope || adj[i].is_empty()) {
                reached[i] = true;
                queue.push_back(i);
            }
        }
        while let Some(i) = queue.pop_front() {
            for &j in &adj[i] {
                if open[j] && !reached[j] {
                    reached[j] = true;
                    queue.push_back(j);
                }
            }
        }
        let holes: Vec<usize> = (0..features.len())
            .filter(|&i| open[i] && !reached[i])
            .collect();
        debug!(
            selected = selected.len(),
            holes = holes.len(),
            "hole detection finished"
        );
        sorted_codes(features, holes)
    }

    /// Number of indexed features.
    pub fn len(&self) -> usize {
        self.dataset.len()
    }

    /// Whether the index is empty.
    pub fn is_empty(&self) -> bool {
        self.dataset.is_empty()
    }
}

fn touches(a: &BoundaryFeature, b: &BoundaryFeature, eps: f64) -> bool {
    a.polygons().iter().any(|pa| {
        b.polygons().iter().any(|pb| {
            let (ba, bb) = (ring_bbox(&pa.exterior), ring_bbox(&pb.exterior));
            rects_touch(ba.inflate(eps, eps), bb) && rings_touch(&pa.exterior, &pb.exterior, eps)
        })
    })
}

fn sorted_codes(features: &[BoundaryFeature], hits: Vec<usize>) -> Vec<RegionCode> {
    let mut codes: Vec<RegionCode> = hits.into_iter().map(|i| features[i].code().clone()).collect();
    codes.sort_unstable();
    codes.dedup();
    codes
}

/// Longitude/latitude boxes guaranteed to cover a spherical cap.
///
/// Splits at the antimeridian and widens to every longitude when the cap
/// contains a pole.
fn search_rects(center: Point, radius_m: f64) -> Vec<Rect> {
    let d = radius_m / EARTH_RADIUS_M;
    let slack = 1e-9;
    let lat = center.y.to_radians();
    let (lat0, lat1) = (lat - d, lat + d);
    if d >= PI || lat0 <= -FRAC_PI_2 || lat1 >= FRAC_PI_2 {
        let y0 = lat0.max(-FRAC_PI_2).to_degrees() - slack;
        let y1 = lat1.min(FRAC_PI_2).to_degrees() + slack;
        return vec![Rect::new(-180.0, y0, 180.0, y1)];
    }
    let dlng = (d.sin() / lat.cos()).min(1.0).asin().to_degrees() + slack;
    let y0 = lat0.to_degrees() - slack;
    let y1 = lat1.to_degrees() + slack;
    let (x0, x1) = (center.x - dlng, center.x + dlng);
    if x0 < -180.0 {
        vec![Rect::new(-180.0, y0, x1, y1), Rect::new(x0 + 360.0, y0, 180.0, y1)]
    } else if x1 > 180.0 {
        vec![Rect::new(x0, y0, 180.0, y1), Rect::new(-180.0, y0, x1 - 360.0, y1)]
    } else {
        vec![Rect::new(x0, y0, x1, y1)]
    }
}
