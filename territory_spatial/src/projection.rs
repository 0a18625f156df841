// Copyright 2025 the Territory Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Screen/geographic conversions used by selection gestures.

use core::f64::consts::PI;

use kurbo::{Point, Size};

/// Web Mercator ground resolution at zoom 0 on the equator, metres per pixel
/// (256 px tiles).
pub const METERS_PER_PIXEL_Z0: f64 = 156_543.033_92;

/// Flat conversion factor from metres to degrees used for radius inputs.
pub const METERS_PER_DEGREE: f64 = 111_320.0;

/// Ground resolution at `lat` degrees and `zoom`.
///
/// `metersPerPixel = 156543.03392 * cos(lat) / 2^zoom`
pub fn meters_per_pixel(lat: f64, zoom: f64) -> f64 {
    METERS_PER_PIXEL_Z0 * lat.to_radians().cos() / zoom.exp2()
}

/// Convert an on-screen radius to metres at the circle center.
pub fn pixel_radius_to_meters(pixel_radius: f64, lat: f64, zoom: f64) -> f64 {
    pixel_radius * meters_per_pixel(lat, zoom)
}

/// Convert an on-screen radius to the degree radius expected by circle queries.
pub fn pixel_radius_to_degrees(pixel_radius: f64, lat: f64, zoom: f64) -> f64 {
    pixel_radius_to_meters(pixel_radius, lat, zoom) / METERS_PER_DEGREE
}

/// Caller-supplied inverse projection from screen space to longitude/latitude.
///
/// Selection gestures arrive in whatever space the presentation layer draws
/// in. Any vertex outside the geographic range is passed through this before
/// it reaches a spatial query.
pub trait Unproject {
    /// Convert a screen-space point to `(lng, lat)`.
    fn unproject(&self, screen: Point) -> Point;
}

impl<F: Fn(Point) -> Point> Unproject for F {
    fn unproject(&self, screen: Point) -> Point {
        self(screen)
    }
}

/// A Web Mercator viewport: center, zoom and pixel size of the drawing surface.
///
/// Screen coordinates have their origin at the top-left corner, with `y`
/// growing downwards.
#[derive(Copy, Clone, Debug, PartialEq)]
pub struct WebMercatorViewport {
    /// Geographic center of the viewport (`x = lng`, `y = lat`).
    pub center: Point,
    /// Fractional zoom level.
    pub zoom: f64,
    /// Pixel size of the surface.
    pub size: Size,
    /// Tile edge length in pixels (256 for classic raster maps, 512 for vector styles).
    pub tile_size: f64,
}

impl WebMercatorViewport {
    /// Viewport with 256 px tiles.
    pub fn new(center: Point, zoom: f64, size: Size) -> Self {
        Self {
            center,
            zoom,
            size,
            tile_size: 256.0,
        }
    }

    fn world_size(&self) -> f64 {
        self.tile_size * self.zoom.exp2()
    }

    /// Longitude/latitude to world pixel coordinates.
    pub fn project_world(&self, geo: Point) -> Point {
        let w = self.world_size();
        let x = (geo.x + 180.0) / 360.0 * w;
        let lat = geo.y.clamp(-85.051_128_78, 85.051_128_78).to_radians();
        let y = (1.0 - (lat.tan() + 1.0 / lat.cos()).ln() / PI) / 2.0 * w;
        Point::new(x, y)
    }

    /// Longitude/latitude to screen pixels.
    pub fn project(&self, geo: Point) -> Point {
        let c = self.project_world(self.center);
        let p = self.project_world(geo);
        Point::new(
            p.x - c.x + self.size.width / 2.0,
            p.y - c.y + self.size.height / 2.0,
        )
    }
}

impl Unproject for WebMercatorViewport {
    fn unproject(&self, screen: Point) -> Point {
        let w = self.world_size();
        let c = self.project_world(self.center);
        let wx = c.x + screen.x - self.size.width / 2.0;
        let wy = c.y + screen.y - self.size.height / 2.0;
        let lng = wx / w * 360.0 - 180.0;
        let n = PI - 2.0 * PI * wy / w;
        let lat = n.sinh().atan().to_degrees();
        Point::new(lng, lat)
    }
}
