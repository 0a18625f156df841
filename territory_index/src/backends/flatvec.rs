// Copyright 2025 the Territory Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Flat vector backend with linear scans. Small and simple; good for tiny sets.

use alloc::boxed::Box;
use alloc::vec::Vec;
use core::fmt::Debug;

use crate::backend::Backend;
use crate::types::{Aabb2D, Scalar};

/// Flat vector backend with linear scans.
pub struct FlatVec<T: Scalar> {
    entries: Vec<Option<Aabb2D<T>>>,
}

impl<T: Scalar> Default for FlatVec<T> {
    fn default() -> Self {
        Self {
            entries: Vec::new(),
        }
    }
}

impl<T: Scalar> Debug for FlatVec<T> {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        let total = self.entries.len();
        let alive = self.entries.iter().filter(|e| e.is_some()).count();
        f.debug_struct("FlatVec")
            .field("total_slots", &total)
            .field("alive", &alive)
            .finish_non_exhaustive()
    }
}

impl<T: Scalar> Backend<T> for FlatVec<T> {
    fn build(items: &[(usize, Aabb2D<T>)]) -> Self {
        let mut entries: Vec<Option<Aabb2D<T>>> = Vec::new();
        for (slot, aabb) in items.iter().copied() {
            if entries.len() <= slot {
                entries.resize_with(slot + 1, || None);
            }
            entries[slot] = Some(aabb);
        }
        Self { entries }
    }

    fn len(&self) -> usize {
        self.entries.iter().filter(|e| e.is_some()).count()
    }

    fn query_point<'a>(&'a self, x: T, y: T) -> Box<dyn Iterator<Item = usize> + 'a> {
        Box::new(self.entries.iter().enumerate().filter_map(move |(i, slot)| {
            slot.as_ref()
                .filter(|a| a.contains_point(x, y))
                .map(|_| i)
        }))
    }

    fn query_rect<'a>(&'a self, rect: Aabb2D<T>) -> Box<dyn Iterator<Item = usize> + 'a> {
        Box::new(self.entries.iter().enumerate().filter_map(move |(i, slot)| {
            slot.as_ref().filter(|a| a.overlaps(&rect)).map(|_| i)
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use alloc::vec;

    #[test]
    fn sparse_slots_are_skipped() {
        let b = FlatVec::<f64>::build(&[
            (0, Aabb2D::new(0.0, 0.0, 1.0, 1.0)),
            (3, Aabb2D::new(2.0, 2.0, 3.0, 3.0)),
        ]);
        assert_eq!(b.len(), 2);
        let hits: Vec<_> = b.query_rect(Aabb2D::new(0.5, 0.5, 2.5, 2.5)).collect();
        assert_eq!(hits, vec![0, 3]);
        assert_eq!(b.query_point(10.0, 10.0).count(), 0);
    }
}
