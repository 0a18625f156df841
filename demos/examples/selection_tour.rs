// Copyright 2025 the Territory Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Selection tour.
//!
//! Builds a small boundary dataset around Munich and walks through every
//! selection gesture: click, lasso in screen space, pixel-radius circle and
//! drive-time, followed by the adjacency graph and hole detection.
//!
//! Run:
//! - `RUST_LOG=debug cargo run -p territory_demos --example selection_tour`

use std::collections::BTreeSet;
use std::error::Error;
use std::sync::Arc;

use kurbo::{Point, Size};
use serde_json::{Map, Value};
use territory_spatial::drive_time::{
    CancelToken, DriveTimeGate, DriveTimeRequest, GestureId, RoutingError, RoutingProvider,
    RoutingResult, drive_time_select,
};
use territory_spatial::{
    BoundaryDataset, Granularity, RawFeature, RawGeometry, RegionCode, SelectionContext,
    SpatialConfig, SpatialIndex, WebMercatorViewport, circle_select, point_select, polygon_select,
};
use tracing_subscriber::EnvFilter;

/// Fake router: everything within a lng/lat box scaled by minutes.
struct BoxRouter;

impl RoutingProvider for BoxRouter {
    fn resolve(
        &self,
        request: &DriveTimeRequest,
        cancel: &CancelToken,
    ) -> Result<RoutingResult, RoutingError> {
        if cancel.is_cancelled() {
            return Err(RoutingError::Cancelled);
        }
        let r = request.max_duration_minutes / 200.0;
        let o = request.origin;
        Ok(RoutingResult::Isochrone(vec![
            Point::new(o.x - r, o.y - r),
            Point::new(o.x + r, o.y - r),
            Point::new(o.x + r, o.y + r),
            Point::new(o.x - r, o.y + r),
        ]))
    }
}

/// A 6 x 6 grid of 0.05° cells with codes `8JI00`.
fn munich() -> Result<BoundaryDataset, Box<dyn Error>> {
    let mut raw = Vec::new();
    for j in 0..6 {
        for i in 0..6 {
            let (x0, y0) = (11.4 + f64::from(i) * 0.05, 48.0 + f64::from(j) * 0.05);
            let (x1, y1) = (x0 + 0.05, y0 + 0.05);
            raw.push(RawFeature {
                id: None,
                properties: Map::from_iter([("plz".to_owned(), Value::from(format!("8{j}{i}00")))]),
                geometry: RawGeometry::Polygon(vec![vec![
                    vec![x0, y0],
                    vec![x1, y0],
                    vec![x1, y1],
                    vec![x0, y1],
                    vec![x0, y0],
                ]]),
            });
        }
    }
    let keys = SpatialConfig::default().code_keys;
    Ok(BoundaryDataset::from_raw(Granularity::FIVE, raw, &keys)?)
}

fn show(label: &str, codes: &[RegionCode]) {
    let list: Vec<&str> = codes.iter().map(RegionCode::as_str).collect();
    println!("{label:<22} {} -> {}", list.len(), list.join(" "));
}

fn main() -> Result<(), Box<dyn Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let config = SpatialConfig::default();
    let index = SpatialIndex::new(Arc::new(munich()?), &config);
    let center = Point::new(11.55, 48.15);
    let viewport = WebMercatorViewport::new(center, 11.0, Size::new(800.0, 600.0));
    let ctx = SelectionContext::new(&index, 11.0).with_unproject(&viewport);

    println!("== Gestures ==");
    let click = point_select(&ctx, Point::new(11.43, 48.02));
    show("click", click.as_slice());

    // Screen-space lasso around the viewport center.
    let lasso = [
        Point::new(300.0, 200.0),
        Point::new(500.0, 200.0),
        Point::new(500.0, 400.0),
        Point::new(300.0, 400.0),
    ];
    show("lasso (screen)", &polygon_select(&ctx, &lasso).codes);

    let circle = circle_select(&ctx, center, 60.0);
    show("circle 60px", &circle.codes);

    let bad = polygon_select(&ctx, &[Point::new(0.0, 0.0), Point::new(1.0, 1.0)]);
    println!("{:<22} rejected: {:?}", "degenerate lasso", bad.rejected);

    let gate = DriveTimeGate::new();
    let request = DriveTimeRequest {
        origin: center,
        max_duration_minutes: 15.0,
        granularity: Granularity::FIVE,
    };
    let reachable = drive_time_select(&gate, &index, GestureId(1), request, &BoxRouter)?;
    show("drive 15 min", &reachable);

    println!("\n== Topology ==");
    let neighbors = index.neighbors("82200").unwrap_or_default();
    show("neighbors of 82200", &neighbors);

    let mut ring: BTreeSet<RegionCode> = BTreeSet::new();
    for j in 1..5 {
        for i in 1..5 {
            if !(2..4).contains(&i) || !(2..4).contains(&j) {
                ring.insert(RegionCode::new(format!("8{j}{i}00")));
            }
        }
    }
    show("holes in ring", &index.hole_detection(&ring));
    Ok(())
}
