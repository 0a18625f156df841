// Copyright 2025 the Territory Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Ring geometry on longitude/latitude points.
//!
//! Rings are slices of [`Point`] with `x = longitude` and `y = latitude`. They
//! are implicitly closed: the last vertex connects back to the first, and a
//! repeated closing vertex is tolerated everywhere.
//!
//! ## Containment convention
//!
//! [`ring_contains`] uses half-open ray casting. For a point exactly on an edge,
//! the result depends on which side of the ring the edge is on: points on
//! left or bottom edges are inside, points on right or top edges are outside.
//! Two regions sharing an edge therefore never both claim a point on it.

use kurbo::{Line, ParamCurveNearest, Point, Rect, Shape};
use territory_index::Aabb2D;

use crate::error::GeometryError;

/// Mean earth radius (IUGG) in metres, used by [`haversine_m`].
pub const EARTH_RADIUS_M: f64 = 6_371_008.8;

/// Accuracy passed to kurbo's nearest-point solver; exact for lines.
const NEAREST_ACCURACY: f64 = 1e-12;

/// Whether a point is a valid longitude/latitude pair.
pub fn is_geographic(p: Point) -> bool {
    (-180.0..=180.0).contains(&p.x) && (-90.0..=90.0).contains(&p.y)
}

/// Check a caller-supplied ring and return it without repeated vertices.
///
/// Fails if any coordinate is non-finite or fewer than three distinct vertices
/// remain after dropping consecutive repeats (including the closing vertex).
pub fn clean_ring(ring: &[Point]) -> Result<Vec<Point>, GeometryError> {
    if let Some(index) = ring.iter().position(|p| !p.is_finite()) {
        return Err(GeometryError::NonFinite { index });
    }
    let mut out: Vec<Point> = Vec::with_capacity(ring.len());
    for &p in ring {
        if out.last() != Some(&p) {
            out.push(p);
        }
    }
    while out.len() > 1 && out.first() == out.last() {
        out.pop();
    }
    if out.len() < 3 {
        return Err(GeometryError::TooFewPoints { points: out.len() });
    }
    Ok(out)
}

/// Half-open ray-casting point-in-ring test.
pub fn ring_contains(ring: &[Point], p: Point) -> bool {
    let mut inside = false;
    let n = ring.len();
    if n < 3 {
        return false;
    }
    let mut j = n - 1;
    for i in 0..n {
        let (a, b) = (ring[i], ring[j]);
        if (a.y > p.y) != (b.y > p.y) {
            let x_cross = (b.x - a.x) * (p.y - a.y) / (b.y - a.y) + a.x;
            if p.x < x_cross {
                inside = !inside;
            }
        }
        j = i;
    }
    inside
}

/// Signed shoelace area in square degrees (positive when counter-clockwise).
pub fn signed_area(ring: &[Point]) -> f64 {
    edges(ring)
        .map(|l| l.p0.x * l.p1.y - l.p1.x * l.p0.y)
        .sum::<f64>()
        * 0.5
}

/// Area-weighted centroid of a ring.
///
/// Falls back to the vertex mean for rings with (near) zero area.
pub fn ring_centroid(ring: &[Point]) -> Point {
    let a = signed_area(ring);
    if a.abs() <= f64::EPSILON {
        let n = ring.len().max(1) as f64;
        let (sx, sy) = ring.iter().fold((0.0, 0.0), |(sx, sy), p| (sx + p.x, sy + p.y));
        return Point::new(sx / n, sy / n);
    }
    // Translate to the first vertex to keep products small for real coordinates.
    let o = ring[0].to_vec2();
    let (mut cx, mut cy) = (0.0, 0.0);
    for l in edges(ring) {
        let (p0, p1) = (l.p0 - o, l.p1 - o);
        let cross = p0.x * p1.y - p1.x * p0.y;
        cx += (p0.x + p1.x) * cross;
        cy += (p0.y + p1.y) * cross;
    }
    Point::new(cx / (6.0 * a) + o.x, cy / (6.0 * a) + o.y)
}

/// Bounding box of a ring. Returns [`Rect::ZERO`] for an empty ring.
pub fn ring_bbox(ring: &[Point]) -> Rect {
    let mut it = ring.iter();
    let Some(&first) = it.next() else {
        return Rect::ZERO;
    };
    it.fold(Rect::from_points(first, first), |r, &p| r.union_pt(p))
}

/// Iterate the closed edges of a ring.
pub fn edges(ring: &[Point]) -> impl Iterator<Item = Line> + '_ {
    let n = ring.len();
    (0..n).map(move |i| Line::new(ring[i], ring[(i + 1) % n]))
}

/// Inclusive bbox overlap for kurbo rects.
pub fn rects_touch(a: Rect, b: Rect) -> bool {
    a.x0 <= b.x1 && b.x0 <= a.x1 && a.y0 <= b.y1 && b.y0 <= a.y1
}

/// Convert a kurbo rect to an index AABB.
pub fn rect_to_aabb(r: Rect) -> Aabb2D<f64> {
    let r = r.abs();
    Aabb2D::new(r.x0, r.y0, r.x1, r.y1)
}

/// Whether two segments share at least one point.
pub fn segments_intersect(a: Line, b: Line) -> bool {
    let d1 = orient(b.p0, b.p1, a.p0);
    let d2 = orient(b.p0, b.p1, a.p1);
    let d3 = orient(a.p0, a.p1, b.p0);
    let d4 = orient(a.p0, a.p1, b.p1);
    if ((d1 > 0.0 && d2 < 0.0) || (d1 < 0.0 && d2 > 0.0))
        && ((d3 > 0.0 && d4 < 0.0) || (d3 < 0.0 && d4 > 0.0))
    {
        return true;
    }
    (d1 == 0.0 && on_segment(b, a.p0))
        || (d2 == 0.0 && on_segment(b, a.p1))
        || (d3 == 0.0 && on_segment(a, b.p0))
        || (d4 == 0.0 && on_segment(a, b.p1))
}

/// Minimum distance between two segments, in coordinate units.
pub fn segment_distance(a: Line, b: Line) -> f64 {
    if segments_intersect(a, b) {
        return 0.0;
    }
    [
        a.nearest(b.p0, NEAREST_ACCURACY).distance_sq,
        a.nearest(b.p1, NEAREST_ACCURACY).distance_sq,
        b.nearest(a.p0, NEAREST_ACCURACY).distance_sq,
        b.nearest(a.p1, NEAREST_ACCURACY).distance_sq,
    ]
    .into_iter()
    .fold(f64::INFINITY, f64::min)
    .sqrt()
}

/// Whether the boundaries of two rings come within `eps` of each other.
///
/// Edges are pre-filtered by inflated bounding boxes, so the cost is close to
/// linear for neighbours that share only a short stretch of border.
pub fn rings_touch(a: &[Point], b: &[Point], eps: f64) -> bool {
    let b_edges: Vec<(Line, Rect)> = edges(b).map(|l| (l, l.bounding_box())).collect();
    edges(a).any(|ea| {
        let ra = ea.bounding_box().inflate(eps, eps);
        b_edges
            .iter()
            .any(|(eb, rb)| rects_touch(ra, *rb) && segment_distance(ea, *eb) <= eps)
    })
}

/// Great-circle distance in metres between two longitude/latitude points.
pub fn haversine_m(a: Point, b: Point) -> f64 {
    let (lat1, lat2) = (a.y.to_radians(), b.y.to_radians());
    let dlat = lat2 - lat1;
    let dlng = (b.x - a.x).to_radians();
    let h = (dlat * 0.5).sin().powi(2) + lat1.cos() * lat2.cos() * (dlng * 0.5).sin().powi(2);
    2.0 * EARTH_RADIUS_M * h.sqrt().min(1.0).asin()
}

fn orient(a: Point, b: Point, c: Point) -> f64 {
    (b - a).cross(c - a)
}

fn on_segment(s: Line, p: Point) -> bool {
    p.x >= s.p0.x.min(s.p1.x)
        && p.x <= s.p0.x.max(s.p1.x)
        && p.y >= s.p0.y.min(s.p1.y)
        && p.y <= s.p0.y.max(s.p1.y)
}
