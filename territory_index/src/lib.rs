// Copyright 2025 the Territory Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Territory Index: a build-once 2D AABB index.
//!
//! Territory Index is the candidate-narrowing layer under region queries.
//!
//! - Collect axis-aligned bounding boxes (AABBs) with small `Copy` payloads.
//! - Build the spatial structure once; the result is read-only and `Sync` when the payload is.
//! - Query by point or by intersecting rectangle.
//!
//! It is generic over the scalar type `T` and does not depend on any geometry crate.
//! Higher layers (like a boundary dataset) compute bounding boxes or centroid points and feed them here,
//! then refine candidates with exact geometry.
//!
//! Backends are pluggable via a simple trait so you can swap the spatial strategy without API churn.
//! The default backend is a flat vector (linear scan).
//! The packed R-tree is bulk-loaded with Sort-Tile-Recursive and is the choice for real datasets.
//!
//! # Example
//!
//! ```rust
//! use territory_index::{Aabb2D, IndexBuilder, RTreeIndex};
//!
//! let mut b = IndexBuilder::new();
//! b.push(Aabb2D::new(0.0, 0.0, 10.0, 10.0), 1_u32);
//! b.push(Aabb2D::new(5.0, 5.0, 15.0, 15.0), 2_u32);
//! let idx: RTreeIndex<f64, u32> = b.finish();
//!
//! // Query a point inside both boxes.
//! let mut hits: Vec<_> = idx.query_point(6.0, 6.0).map(|(_, p)| p).collect();
//! hits.sort();
//! assert_eq!(hits, [1, 2]);
//! ```
//!
//! Points are indexed as degenerate boxes:
//!
//! ```rust
//! use territory_index::{Aabb2D, Index, IndexGeneric};
//!
//! let idx: Index<f64, &str> = IndexGeneric::build([
//!     (Aabb2D::from_point(11.5, 48.1), "munich"),
//!     (Aabb2D::from_point(13.4, 52.5), "berlin"),
//! ]);
//! let south: Vec<_> = idx
//!     .query_rect(Aabb2D::new(5.0, 47.0, 15.0, 50.0))
//!     .map(|(_, p)| p)
//!     .collect();
//! assert_eq!(south, ["munich"]);
//! ```
//!
//! ## Choosing a backend
//!
//! - `FlatVec` (default): simplest and smallest, linear scans. Good for very small sets and tests.
//! - `RTreeF32`/`RTreeF64`: packed R-tree; logarithmic queries over tens of thousands of regions.
//!
//! ### Float semantics
//!
//! This crate assumes no NaNs for coordinates. Incomparable values sort as equal and never match
//! a containment test.

#![no_std]

extern crate alloc;

pub mod backend;
pub mod backends;
pub mod index;
pub mod types;

pub use backend::Backend;
pub use backends::flatvec::FlatVec;
pub use backends::rtree::{RTree, RTreeF32, RTreeF64};
pub use index::{Index, IndexBuilder, IndexGeneric, Key, RTreeIndex};
pub use types::{Aabb2D, Scalar, area};
