// Copyright 2025 the Territory Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Backend trait for spatial indexing implementations.

use alloc::boxed::Box;

use crate::types::{Aabb2D, Scalar};

/// Spatial backend abstraction used by `IndexGeneric`.
///
/// Backends are built once from `(slot, aabb)` pairs and are read-only afterwards,
/// so a built backend can be shared between threads for concurrent queries.
pub trait Backend<T: Scalar> {
    /// Build the spatial structure from every slot at once.
    fn build(items: &[(usize, Aabb2D<T>)]) -> Self
    where
        Self: Sized;

    /// Number of slots held by the structure.
    fn len(&self) -> usize;

    /// Whether the structure holds no slots.
    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Query slots whose AABB contains the point.
    fn query_point<'a>(&'a self, x: T, y: T) -> Box<dyn Iterator<Item = usize> + 'a>;

    /// Query slots whose AABB intersects (or touches) the rectangle.
    fn query_rect<'a>(&'a self, rect: Aabb2D<T>) -> Box<dyn Iterator<Item = usize> + 'a>;
}
