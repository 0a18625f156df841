// Copyright 2025 the Territory Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Public `Index` API and generic implementation over a pluggable backend.

use alloc::vec::Vec;
use core::fmt::Debug;

use crate::backend::Backend;
use crate::types::{Aabb2D, Scalar};

/// Stable handle of an entry: its insertion position in the build input.
#[derive(Copy, Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Key(u32);

impl Key {
    #[allow(
        clippy::cast_possible_truncation,
        reason = "Index keys are 32-bit; datasets beyond u32::MAX entries are not supported."
    )]
    const fn new(idx: usize) -> Self {
        Self(idx as u32)
    }

    /// Position of the entry in the build input.
    pub const fn index(self) -> usize {
        self.0 as usize
    }
}

#[derive(Clone, Debug)]
struct Entry<T, P> {
    aabb: Aabb2D<T>,
    payload: P,
}

/// A build-once AABB index parameterized by a spatial backend.
///
/// Entries are collected with [`IndexBuilder`] (or [`IndexGeneric::build`]) and the
/// backend is constructed in one pass. The finished index is read-only.
#[derive(Debug)]
pub struct IndexGeneric<T: Scalar, P: Copy + Debug, B: Backend<T>> {
    entries: Vec<Entry<T, P>>,
    backend: B,
}

impl<T, P, B> IndexGeneric<T, P, B>
where
    T: Scalar,
    P: Copy + Debug,
    B: Backend<T>,
{
    /// Build an index from `(aabb, payload)` pairs.
    pub fn build(entries: impl IntoIterator<Item = (Aabb2D<T>, P)>) -> Self {
        let entries: Vec<Entry<T, P>> = entries
            .into_iter()
            .map(|(aabb, payload)| Entry { aabb, payload })
            .collect();
        let pairs: Vec<(usize, Aabb2D<T>)> =
            entries.iter().enumerate().map(|(i, e)| (i, e.aabb)).collect();
        Self {
            backend: B::build(&pairs),
            entries,
        }
    }

    /// Number of entries.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the index has no entries.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// AABB and payload stored under `key`.
    pub fn get(&self, key: Key) -> Option<(Aabb2D<T>, P)> {
        self.entries.get(key.index()).map(|e| (e.aabb, e.payload))
    }

    /// Borrow the backend (for diagnostics).
    pub fn backend(&self) -> &B {
        &self.backend
    }

    /// Query for entries whose AABB contains the point.
    pub fn query_point(&self, x: T, y: T) -> impl Iterator<Item = (Key, P)> + '_ {
        self.resolve(self.backend.query_point(x, y))
    }

    /// Query for entries whose AABB intersects (or touches) the given rectangle.
    pub fn query_rect(&self, rect: Aabb2D<T>) -> impl Iterator<Item = (Key, P)> + '_ {
        self.resolve(self.backend.query_rect(rect))
    }

    fn resolve<'a>(
        &'a self,
        slots: impl Iterator<Item = usize> + 'a,
    ) -> impl Iterator<Item = (Key, P)> + 'a {
        slots.filter_map(move |i| self.entries.get(i).map(|e| (Key::new(i), e.payload)))
    }
}

/// Incremental collector for a build-once index.
#[derive(Debug)]
pub struct IndexBuilder<T, P> {
    entries: Vec<(Aabb2D<T>, P)>,
}

impl<T, P> Default for IndexBuilder<T, P> {
    fn default() -> Self {
        Self {
            entries: Vec::new(),
        }
    }
}

impl<T: Scalar, P: Copy + Debug> IndexBuilder<T, P> {
    /// Create an empty builder.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a builder with room for `n` entries.
    pub fn with_capacity(n: usize) -> Self {
        Self {
            entries: Vec::with_capacity(n),
        }
    }

    /// Queue an entry. Returns the key it will have in the finished index.
    pub fn push(&mut self, aabb: Aabb2D<T>, payload: P) -> Key {
        self.entries.push((aabb, payload));
        Key::new(self.entries.len() - 1)
    }

    /// Build the index with backend `B`.
    pub fn finish<B: Backend<T>>(self) -> IndexGeneric<T, P, B> {
        IndexGeneric::build(self.entries)
    }
}

/// Default index using a flat vector backend.
pub type Index<T, P> = IndexGeneric<T, P, crate::backends::flatvec::FlatVec<T>>;

/// Index backed by a packed R-tree.
pub type RTreeIndex<T, P> = IndexGeneric<T, P, crate::backends::rtree::RTree<T>>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builder_keys_follow_push_order() {
        let mut b = IndexBuilder::<f64, char>::new();
        let ka = b.push(Aabb2D::new(0.0, 0.0, 1.0, 1.0), 'a');
        let kb = b.push(Aabb2D::new(2.0, 0.0, 3.0, 1.0), 'b');
        let idx: RTreeIndex<f64, char> = b.finish();
        assert_eq!(idx.len(), 2);
        assert_eq!(idx.get(ka).map(|(_, p)| p), Some('a'));
        assert_eq!(idx.get(kb).map(|(_, p)| p), Some('b'));
        let hits: Vec<_> = idx.query_point(2.5, 0.5).collect();
        assert_eq!(hits, [(kb, 'b')]);
    }

    #[test]
    fn flat_and_rtree_agree() {
        let boxes = [
            (Aabb2D::new(0.0, 0.0, 4.0, 4.0), 1_u32),
            (Aabb2D::new(1.0, 1.0, 2.0, 2.0), 2),
            (Aabb2D::new(5.0, 5.0, 6.0, 6.0), 3),
        ];
        let flat: Index<f64, u32> = IndexGeneric::build(boxes);
        let tree: RTreeIndex<f64, u32> = IndexGeneric::build(boxes);
        let q = Aabb2D::new(1.5, 1.5, 5.0, 5.0);
        let mut a: Vec<_> = flat.query_rect(q).map(|(_, p)| p).collect();
        let mut b: Vec<_> = tree.query_rect(q).map(|(_, p)| p).collect();
        a.sort_unstable();
        b.sort_unstable();
        assert_eq!(a, b);
        assert_eq!(a, [1, 2, 3]);
    }
}
