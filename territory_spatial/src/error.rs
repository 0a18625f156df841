// Copyright 2025 the Territory Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Error types for geometry validation and dataset ingestion.

use thiserror::Error;

/// Invalid selection or query geometry.
///
/// Queries that fail validation return no codes at all; they never produce a
/// partial result.
#[derive(Clone, Debug, Error, PartialEq)]
pub enum GeometryError {
    /// A ring needs at least three distinct vertices.
    #[error("ring has {points} distinct points; at least 3 are required")]
    TooFewPoints {
        /// Distinct vertices found after dropping repeats.
        points: usize,
    },
    /// A coordinate was NaN or infinite.
    #[error("coordinate #{index} is not finite")]
    NonFinite {
        /// Position of the offending vertex in the input.
        index: usize,
    },
    /// A coordinate lies outside `[-180, 180] x [-90, 90]` and could not be unprojected.
    #[error("coordinate #{index} ({x}, {y}) is outside geographic range and no inverse projection was supplied")]
    OutOfRange {
        /// Position of the offending vertex in the input.
        index: usize,
        /// Input x.
        x: f64,
        /// Input y.
        y: f64,
    },
    /// A radius was negative or not finite.
    #[error("radius {0} must be finite and non-negative")]
    InvalidRadius(f64),
}

/// Failure while normalizing a boundary dataset.
#[derive(Debug, Error)]
pub enum DatasetError {
    /// None of the configured code keys yielded a usable code.
    #[error("feature #{index} has no region code under any of the configured keys")]
    MissingCode {
        /// Position of the feature in the input.
        index: usize,
    },
    /// A numeric code has more digits than the granularity allows.
    #[error("code {code:?} is longer than {digits} digits")]
    CodeLength {
        /// Offending code.
        code: String,
        /// Digit count of the dataset granularity.
        digits: u8,
    },
    /// A position had fewer than two ordinates.
    #[error("feature {code:?} has a position with fewer than two ordinates")]
    InvalidPosition {
        /// Code of the feature.
        code: String,
    },
    /// An outer ring failed validation.
    #[error("feature {code:?} has an invalid ring")]
    InvalidRing {
        /// Code of the feature.
        code: String,
        /// What was wrong with the ring.
        #[source]
        source: GeometryError,
    },
    /// Input text was not a GeoJSON-shaped feature collection.
    #[error("malformed boundary input")]
    Json(#[from] serde_json::Error),
}
