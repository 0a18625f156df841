// Copyright 2025 the Territory Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Packed R-tree backend generic over scalar `T: Scalar`, bulk-loaded with STR.

use alloc::boxed::Box;
use alloc::vec;
use alloc::vec::Vec;
use core::fmt::Debug;

use crate::backend::Backend;
use crate::types::{Aabb2D, Scalar, cmp_t};

/// Packed R-tree backend.
///
/// The tree is immutable once built: leaves hold `(slot, bbox)` items and inner
/// nodes hold child node indices into a flat arena.
pub struct RTree<T: Scalar> {
    max_children: usize,
    root: Option<NodeIdx>,
    arena: Vec<RNode<T>>,
    len: usize,
}

#[derive(Clone)]
struct RNode<T: Scalar> {
    bbox: Aabb2D<T>,
    children: RChildren<T>,
}

#[derive(Clone)]
enum RChildren<T: Scalar> {
    Items(Vec<(usize, Aabb2D<T>)>),
    Nodes(Vec<NodeIdx>),
}

#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
struct NodeIdx(usize);

impl NodeIdx {
    const fn get(self) -> usize {
        self.0
    }
}

impl<T: Scalar> Default for RTree<T> {
    fn default() -> Self {
        Self {
            max_children: Self::DEFAULT_MAX_CHILDREN,
            root: None,
            arena: Vec::new(),
            len: 0,
        }
    }
}

impl<T: Scalar> RTree<T> {
    /// Fan-out used by [`Backend::build`].
    pub const DEFAULT_MAX_CHILDREN: usize = 8;

    /// Build a packed tree with an explicit fan-out (clamped to at least 2).
    pub fn build_with_fanout(items: &[(usize, Aabb2D<T>)], max_children: usize) -> Self {
        let max_children = max_children.max(2);
        let mut arena = Vec::new();
        let mut items = items.to_vec();
        let root = Self::pack(&mut arena, &mut items, max_children);
        Self {
            max_children,
            root,
            arena,
            len: items.len(),
        }
    }

    /// Depth of the tree (0 when empty, 1 for a single leaf).
    pub fn depth(&self) -> usize {
        let mut depth = 0;
        let mut cursor = self.root;
        while let Some(idx) = cursor {
            depth += 1;
            cursor = match &self.arena[idx.get()].children {
                RChildren::Nodes(nodes) => nodes.first().copied(),
                RChildren::Items(_) => None,
            };
        }
        depth
    }

    fn center_x(a: &Aabb2D<T>) -> T {
        T::mid(a.min_x, a.max_x)
    }

    fn center_y(a: &Aabb2D<T>) -> T {
        T::mid(a.min_y, a.max_y)
    }

    /// Number of vertical slices for `groups` output groups: `ceil(sqrt(groups))`.
    fn slice_count(groups: usize) -> usize {
        let mut gx = 1_usize;
        while gx * gx < groups {
            gx += 1;
        }
        gx
    }

    /// Tile `entries` into groups of at most `max_children` using STR ordering.
    fn tile<E: Copy>(
        entries: &mut [E],
        max_children: usize,
        bbox_of: impl Fn(&E) -> Aabb2D<T>,
    ) -> Vec<Vec<E>> {
        let groups = entries.len().div_ceil(max_children);
        let per_slice = groups.div_ceil(Self::slice_count(groups).max(1));
        let slice_size = (max_children * per_slice).max(1);
        entries.sort_by(|a, b| cmp_t(&Self::center_x(&bbox_of(a)), &Self::center_x(&bbox_of(b))));
        let mut out = Vec::with_capacity(groups);
        for slice in entries.chunks_mut(slice_size) {
            slice.sort_by(|a, b| {
                cmp_t(&Self::center_y(&bbox_of(a)), &Self::center_y(&bbox_of(b)))
            });
            for chunk in slice.chunks(max_children) {
                out.push(chunk.to_vec());
            }
        }
        out
    }

    fn union_all(boxes: impl Iterator<Item = Aabb2D<T>>) -> Option<Aabb2D<T>> {
        boxes.reduce(|acc, b| acc.union(&b))
    }

    fn pack(
        arena: &mut Vec<RNode<T>>,
        items: &mut [(usize, Aabb2D<T>)],
        max_children: usize,
    ) -> Option<NodeIdx> {
        if items.is_empty() {
            return None;
        }

        let mut level: Vec<NodeIdx> = Vec::new();
        for leaf in Self::tile(items, max_children, |(_, b)| *b) {
            let bbox = Self::union_all(leaf.iter().map(|(_, b)| *b))?;
            level.push(NodeIdx(arena.len()));
            arena.push(RNode {
                bbox,
                children: RChildren::Items(leaf),
            });
        }

        while level.len() > 1 {
            let mut next = Vec::new();
            let groups = {
                let arena_ref = &*arena;
                Self::tile(&mut level, max_children, |i| arena_ref[i.get()].bbox)
            };
            for group in groups {
                let bbox = Self::union_all(group.iter().map(|i| arena[i.get()].bbox))?;
                next.push(NodeIdx(arena.len()));
                arena.push(RNode {
                    bbox,
                    children: RChildren::Nodes(group),
                });
            }
            level = next;
        }
        level.first().copied()
    }

    fn collect(&self, hit: impl Fn(&Aabb2D<T>) -> bool) -> Vec<usize> {
        let mut out = Vec::new();
        let Some(root) = self.root else {
            return out;
        };
        let mut stack = vec![root];
        while let Some(i) = stack.pop() {
            let n = &self.arena[i.get()];
            if !hit(&n.bbox) {
                continue;
            }
            match &n.children {
                RChildren::Items(items) => {
                    out.extend(items.iter().filter(|(_, b)| hit(b)).map(|(slot, _)| *slot));
                }
                RChildren::Nodes(nodes) => stack.extend(nodes.iter().copied()),
            }
        }
        out
    }
}

impl<T: Scalar> Backend<T> for RTree<T> {
    fn build(items: &[(usize, Aabb2D<T>)]) -> Self {
        Self::build_with_fanout(items, Self::DEFAULT_MAX_CHILDREN)
    }

    fn len(&self) -> usize {
        self.len
    }

    fn query_point<'a>(&'a self, x: T, y: T) -> Box<dyn Iterator<Item = usize> + 'a> {
        Box::new(self.collect(|b| b.contains_point(x, y)).into_iter())
    }

    fn query_rect<'a>(&'a self, rect: Aabb2D<T>) -> Box<dyn Iterator<Item = usize> + 'a> {
        Box::new(self.collect(|b| b.overlaps(&rect)).into_iter())
    }
}

impl<T: Scalar> Debug for RTree<T> {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("RTree")
            .field("max_children", &self.max_children)
            .field("arena_nodes", &self.arena.len())
            .field("len", &self.len)
            .field("depth", &self.depth())
            .finish_non_exhaustive()
    }
}

/// R-tree with f32 coordinates and f64 metrics.
pub type RTreeF32 = RTree<f32>;

/// R-tree with f64 coordinates and f64 metrics.
pub type RTreeF64 = RTree<f64>;

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backends::flatvec::FlatVec;
    use alloc::vec;

    fn grid(n: usize) -> Vec<(usize, Aabb2D<f64>)> {
        let mut out = Vec::new();
        for y in 0..n {
            for x in 0..n {
                let (x0, y0) = (x as f64, y as f64);
                out.push((y * n + x, Aabb2D::new(x0, y0, x0 + 1.0, y0 + 1.0)));
            }
        }
        out
    }

    #[test]
    fn empty_tree_answers_nothing() {
        let t = RTreeF64::build(&[]);
        assert!(t.is_empty());
        assert_eq!(t.depth(), 0);
        assert_eq!(t.query_point(0.0, 0.0).count(), 0);
    }

    #[test]
    fn packed_tree_is_balanced() {
        let t = RTreeF64::build(&grid(20));
        assert_eq!(t.len(), 400);
        // 400 items / 8 = 50 leaves -> 7 parents after slicing -> 1 root.
        assert_eq!(t.depth(), 3);
        assert_eq!(t.arena.len(), 50 + 7 + 1);
    }

    #[test]
    fn slices_hold_whole_nodes() {
        // Every level packs into the minimum number of nodes.
        for (n, fanout) in [(400_usize, 8_usize), (1_000, 8), (999, 4), (37, 3), (64, 16)] {
            let items: Vec<_> = grid(40).into_iter().take(n).collect();
            let t = RTreeF64::build_with_fanout(&items, fanout);
            let mut expected = 0;
            let mut level = n;
            loop {
                level = level.div_ceil(fanout);
                expected += level;
                if level == 1 {
                    break;
                }
            }
            assert_eq!(t.arena.len(), expected, "n={n} fanout={fanout}");
        }
    }

    #[test]
    fn matches_linear_scan() {
        let items = grid(13);
        let t = RTreeF64::build(&items);
        let flat = FlatVec::<f64>::build(&items);
        for q in [
            Aabb2D::new(2.5, 2.5, 4.5, 3.0),
            Aabb2D::new(-1.0, -1.0, 0.0, 0.0),
            Aabb2D::new(12.9, 0.0, 20.0, 20.0),
        ] {
            let mut a: Vec<_> = t.query_rect(q).collect();
            let mut b: Vec<_> = flat.query_rect(q).collect();
            a.sort_unstable();
            b.sort_unstable();
            assert_eq!(a, b, "rect query {q:?} must agree with linear scan");
        }
        let mut hits: Vec<_> = t.query_point(3.0, 3.5).collect();
        hits.sort_unstable();
        assert_eq!(hits, vec![3 * 13 + 2, 3 * 13 + 3]);
    }

    #[test]
    fn small_fanout_still_finds_everything() {
        let items = grid(5);
        let t = RTreeF64::build_with_fanout(&items, 1);
        assert_eq!(t.max_children, 2);
        assert_eq!(t.query_rect(Aabb2D::new(0.0, 0.0, 5.0, 5.0)).count(), 25);
    }
}
