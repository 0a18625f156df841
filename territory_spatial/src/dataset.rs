// Copyright 2025 the Territory Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Boundary dataset: ingestion, normalization, and the immutable feature set.
//!
//! ## Ingestion
//!
//! Providers hand over GeoJSON-shaped features (`properties` plus a `Polygon`
//! or `MultiPolygon` geometry). [`BoundaryDataset::from_raw`] runs the single
//! normalization pass:
//!
//! - resolve the region code from the first configured property key that holds
//!   a string or number (falling back to the feature `id`), then normalize it
//!   with [`Granularity::normalize`];
//! - convert positions to [`Point`]s and validate outer rings with
//!   [`clean_ring`]; holes that fail validation are dropped;
//! - merge features that share a code into one multi-polygon;
//! - cache bbox and centroid (the centroid of the largest outer ring).
//!
//! Nothing downstream ever looks at raw properties to find a code again.

use std::collections::HashMap;

use kurbo::{Point, Rect};
use serde::Deserialize;
use serde_json::{Map, Value};
use tracing::{debug, info};

use crate::error::{DatasetError, GeometryError};
use crate::geometry::{clean_ring, ring_bbox, ring_centroid, ring_contains, signed_area};
use crate::types::{Granularity, RegionCode};

/// A GeoJSON position: `[lng, lat]` with optional extra ordinates.
pub type Position = Vec<f64>;

/// Geometry of a raw feature.
#[derive(Clone, Debug, Deserialize, PartialEq)]
#[serde(tag = "type", content = "coordinates")]
pub enum RawGeometry {
    /// Outer ring followed by holes.
    Polygon(Vec<Vec<Position>>),
    /// Several polygons.
    MultiPolygon(Vec<Vec<Vec<Position>>>),
}

/// A feature as supplied by the boundary provider.
#[derive(Clone, Debug, Deserialize, PartialEq)]
pub struct RawFeature {
    /// Optional top-level feature id.
    #[serde(default)]
    pub id: Option<Value>,
    /// Free-form properties.
    #[serde(default)]
    pub properties: Map<String, Value>,
    /// Boundary geometry.
    pub geometry: RawGeometry,
}

#[derive(Deserialize)]
struct RawCollection {
    features: Vec<RawFeature>,
}

/// One polygon of a boundary: outer ring plus holes, without closing vertices.
#[derive(Clone, Debug, PartialEq)]
pub struct Polygon {
    /// Outer ring.
    pub exterior: Vec<Point>,
    /// Interior rings.
    pub holes: Vec<Vec<Point>>,
}

impl Polygon {
    /// Absolute area of the outer ring, in square degrees.
    pub fn area(&self) -> f64 {
        signed_area(&self.exterior).abs()
    }
}

/// An immutable region boundary with cached bbox and centroid.
#[derive(Clone, Debug)]
pub struct BoundaryFeature {
    code: RegionCode,
    polygons: Vec<Polygon>,
    bbox: Rect,
    centroid: Point,
    properties: Map<String, Value>,
}

impl BoundaryFeature {
    fn new(code: RegionCode, polygons: Vec<Polygon>, properties: Map<String, Value>) -> Self {
        let bbox = polygons
            .iter()
            .map(|p| ring_bbox(&p.exterior))
            .reduce(|a, b| a.union(b))
            .unwrap_or(Rect::ZERO);
        let centroid = polygons
            .iter()
            .max_by(|a, b| a.area().total_cmp(&b.area()))
            .map(|p| ring_centroid(&p.exterior))
            .unwrap_or_else(|| bbox.center());
        Self {
            code,
            polygons,
            bbox,
            centroid,
            properties,
        }
    }

    /// Canonical region code.
    pub fn code(&self) -> &RegionCode {
        &self.code
    }

    /// Polygons making up the boundary.
    pub fn polygons(&self) -> &[Polygon] {
        &self.polygons
    }

    /// Bounding box over all outer rings.
    pub fn bbox(&self) -> Rect {
        self.bbox
    }

    /// Centroid of the largest polygon's outer ring.
    pub fn centroid(&self) -> Point {
        self.centroid
    }

    /// Provider properties, kept for display only.
    pub fn properties(&self) -> &Map<String, Value> {
        &self.properties
    }

    /// Whether any outer ring contains `p` (half-open ray casting).
    pub fn contains(&self, p: Point) -> bool {
        self.polygons.iter().any(|poly| ring_contains(&poly.exterior, p))
    }
}

/// Immutable collection of region boundaries for one granularity.
#[derive(Clone, Debug)]
pub struct BoundaryDataset {
    granularity: Granularity,
    features: Vec<BoundaryFeature>,
    by_code: HashMap<RegionCode, usize>,
    envelope: Rect,
}

impl BoundaryDataset {
    /// Normalize raw provider features into a dataset.
    ///
    /// `code_keys` are tried in order on each feature's properties.
    pub fn from_raw(
        granularity: Granularity,
        raw: impl IntoIterator<Item = RawFeature>,
        code_keys: &[String],
    ) -> Result<Self, DatasetError> {
        let mut features: Vec<(RegionCode, Vec<Polygon>, Map<String, Value>)> = Vec::new();
        let mut by_code: HashMap<RegionCode, usize> = HashMap::new();
        for (index, f) in raw.into_iter().enumerate() {
            let raw_code = resolve_code(&f, code_keys).ok_or(DatasetError::MissingCode { index })?;
            let code = granularity
                .normalize(&raw_code)
                .ok_or_else(|| DatasetError::CodeLength {
                    code: raw_code.clone(),
                    digits: granularity.digits(),
                })?;
            let polygons = convert_geometry(&code, f.geometry)?;
            if let Some(&slot) = by_code.get(&code) {
                debug!(code = %code, "merging duplicate boundary into multi-polygon");
                features[slot].1.extend(polygons);
            } else {
                by_code.insert(code.clone(), features.len());
                features.push((code, polygons, f.properties));
            }
        }
        let features: Vec<BoundaryFeature> = features
            .into_iter()
            .map(|(code, polygons, props)| BoundaryFeature::new(code, polygons, props))
            .collect();
        let envelope = features
            .iter()
            .map(BoundaryFeature::bbox)
            .reduce(|a, b| a.union(b))
            .unwrap_or(Rect::ZERO);
        info!(
            granularity = granularity.digits(),
            features = features.len(),
            "boundary dataset loaded"
        );
        Ok(Self {
            granularity,
            features,
            by_code,
            envelope,
        })
    }

    /// Parse a GeoJSON `FeatureCollection` and normalize it.
    pub fn from_geojson_str(
        granularity: Granularity,
        text: &str,
        code_keys: &[String],
    ) -> Result<Self, DatasetError> {
        let collection: RawCollection = serde_json::from_str(text)?;
        Self::from_raw(granularity, collection.features, code_keys)
    }

    /// Granularity of every code in the dataset.
    pub fn granularity(&self) -> Granularity {
        self.granularity
    }

    /// All features in ingestion order.
    pub fn features(&self) -> &[BoundaryFeature] {
        &self.features
    }

    /// Number of features.
    pub fn len(&self) -> usize {
        self.features.len()
    }

    /// Whether the dataset has no features.
    pub fn is_empty(&self) -> bool {
        self.features.is_empty()
    }

    /// Look up a feature by code.
    pub fn feature(&self, code: &str) -> Option<&BoundaryFeature> {
        self.position(code).map(|i| &self.features[i])
    }

    /// Position of a code in [`Self::features`].
    pub fn position(&self, code: &str) -> Option<usize> {
        self.by_code.get(code).copied()
    }

    /// Bounding box of the whole dataset.
    pub fn envelope(&self) -> Rect {
        self.envelope
    }
}

fn resolve_code(f: &RawFeature, code_keys: &[String]) -> Option<String> {
    code_keys
        .iter()
        .filter_map(|k| f.properties.get(k))
        .chain(f.id.as_ref())
        .find_map(value_as_code)
}

fn value_as_code(v: &Value) -> Option<String> {
    match v {
        Value::String(s) if !s.trim().is_empty() => Some(s.clone()),
        Value::Number(n) if n.is_u64() => Some(n.to_string()),
        _ => None,
    }
}

fn convert_ring(code: &RegionCode, ring: &[Position]) -> Result<Vec<Point>, DatasetError> {
    ring.iter()
        .map(|pos| match pos.as_slice() {
            [x, y, ..] => Ok(Point::new(*x, *y)),
            _ => Err(DatasetError::InvalidPosition {
                code: code.to_string(),
            }),
        })
        .collect()
}

fn convert_polygon(code: &RegionCode, rings: Vec<Vec<Position>>) -> Result<Polygon, DatasetError> {
    let mut rings = rings.into_iter();
    let Some(outer) = rings.next() else {
        return Err(DatasetError::InvalidRing {
            code: code.to_string(),
            source: GeometryError::TooFewPoints { points: 0 },
        });
    };
    let exterior = clean_ring(&convert_ring(code, &outer)?).map_err(|source| {
        DatasetError::InvalidRing {
            code: code.to_string(),
            source,
        }
    })?;
    let mut holes = Vec::new();
    for hole in rings {
        match clean_ring(&convert_ring(code, &hole)?) {
            Ok(h) => holes.push(h),
            Err(e) => debug!(code = %code, error = %e, "dropping degenerate hole"),
        }
    }
    Ok(Polygon { exterior, holes })
}

fn convert_geometry(code: &RegionCode, g: RawGeometry) -> Result<Vec<Polygon>, DatasetError> {
    match g {
        RawGeometry::Polygon(rings) => Ok(vec![convert_polygon(code, rings)?]),
        RawGeometry::MultiPolygon(polys) => polys
            .into_iter()
            .map(|rings| convert_polygon(code, rings))
            .collect(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn keys() -> Vec<String> {
        vec!["plz".to_owned(), "code".to_owned()]
    }

    const COLLECTION: &str = r#"{
        "type": "FeatureCollection",
        "features": [
            {
                "type": "Feature",
                "properties": { "plz": "80331", "note": "Altstadt" },
                "geometry": { "type": "Polygon", "coordinates": [[[0,0],[1,0],[1,1],[0,1],[0,0]]] }
            },
            {
                "type": "Feature",
                "properties": { "code": 1067 },
                "geometry": { "type": "MultiPolygon", "coordinates": [
                    [[[2,0],[3,0],[3,1],[2,1],[2,0]]],
                    [[[4,0],[8,0],[8,4],[4,4],[4,0]], [[5,1],[6,1],[6,2],[5,1]]]
                ] }
            }
        ]
    }"#;

    #[test]
    fn geojson_ingestion_normalizes_codes() {
        let ds = BoundaryDataset::from_geojson_str(Granularity::FIVE, COLLECTION, &keys()).unwrap();
        assert_eq!(ds.len(), 2);
        assert!(ds.feature("80331").is_some());
        let f = ds.feature("01067").expect("numeric code is zero padded");
        assert_eq!(f.polygons().len(), 2);
        assert_eq!(f.polygons()[1].holes.len(), 1);
        // Largest polygon is the 4x4 square.
        assert_eq!(f.centroid(), Point::new(6.0, 2.0));
        assert_eq!(f.bbox(), Rect::new(2.0, 0.0, 8.0, 4.0));
        assert_eq!(ds.envelope(), Rect::new(0.0, 0.0, 8.0, 4.0));
        assert_eq!(
            ds.feature("80331").map(|f| f.properties().contains_key("note")),
            Some(true)
        );
    }

    #[test]
    fn duplicate_codes_merge() {
        let square = |x: f64| RawFeature {
            id: None,
            properties: Map::from_iter([("plz".to_owned(), Value::from("12"))]),
            geometry: RawGeometry::Polygon(vec![vec![
                vec![x, 0.0],
                vec![x + 1.0, 0.0],
                vec![x + 1.0, 1.0],
                vec![x, 1.0],
            ]]),
        };
        let ds = BoundaryDataset::from_raw(Granularity::TWO, [square(0.0), square(5.0)], &keys())
            .unwrap();
        assert_eq!(ds.len(), 1);
        assert_eq!(ds.features()[0].polygons().len(), 2);
        assert!(ds.features()[0].contains(Point::new(5.5, 0.5)));
    }

    #[test]
    fn missing_code_and_bad_ring_are_reported() {
        let no_code = RawFeature {
            id: None,
            properties: Map::new(),
            geometry: RawGeometry::Polygon(vec![]),
        };
        let err = BoundaryDataset::from_raw(Granularity::FIVE, [no_code], &keys()).unwrap_err();
        assert!(matches!(err, DatasetError::MissingCode { index: 0 }));

        let sliver = RawFeature {
            id: Some(Value::from("99999")),
            properties: Map::new(),
            geometry: RawGeometry::Polygon(vec![vec![vec![0.0, 0.0], vec![1.0, 1.0], vec![0.0, 0.0]]]),
        };
        let err = BoundaryDataset::from_raw(Granularity::FIVE, [sliver], &keys()).unwrap_err();
        assert!(matches!(
            err,
            DatasetError::InvalidRing { source: GeometryError::TooFewPoints { points: 2 }, .. }
        ));
    }

    #[test]
    fn malformed_json_is_an_error() {
        let err = BoundaryDataset::from_geojson_str(Granularity::FIVE, "{", &keys()).unwrap_err();
        assert!(matches!(err, DatasetError::Json(_)));
    }
}
