// Copyright 2025 the Territory Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Backend implementations for different spatial strategies.
//!
//! - `flatvec`: flat vector with linear scans (small, simple).
//! - `rtree`: packed R-tree (`T: Scalar`) bulk-loaded with Sort-Tile-Recursive (aliases: `RTreeF32`, `RTreeF64`).
//!
//! STR note
//! --------
//! Items are sorted by center x and cut into `ceil(sqrt(leaves))` vertical slices.
//! Each slice is sorted by center y and chunked into leaves of at most `max_children` entries.
//! Parent levels repeat the same tiling over child node boxes until one root remains.
//! The result is a balanced tree with near-full nodes and little overlap for tiled inputs
//! such as postal regions.

pub mod flatvec;
pub mod rtree;
