//! Capacity ordering of the instances in one pool
//!
//! Instances are kept sorted by available pages, largest first, ties broken
//! by instance id so that selection is deterministic. Only the instance whose
//! capacity changed is moved; every other entry keeps its relative order.

use alloc::vec::Vec;
use core::cmp::Reverse;

/// Sort key of one instance.
#[inline]
fn rank(id: usize, available_pages: usize) -> (Reverse<usize>, usize) {
    (Reverse(available_pages), id)
}

/// Instance ids of one pool in selection order.
#[derive(Debug, Default, Clone)]
pub struct CapacityOrder {
    ids: Vec<usize>,
}

impl CapacityOrder {
    pub const fn new() -> Self {
        Self { ids: Vec::new() }
    }

    pub fn len(&self) -> usize {
        self.ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }

    /// Instance with the most available pages.
    pub fn head(&self) -> Option<usize> {
        self.ids.first().copied()
    }

    /// Current selection order, head first.
    pub fn as_slice(&self) -> &[usize] {
        &self.ids
    }

    /// Insert `id` at its sorted position.
    pub fn insert(&mut self, id: usize, available: impl Fn(usize) -> usize) {
        let key = rank(id, available(id));
        let pos = self
            .ids
            .partition_point(|&other| rank(other, available(other)) < key);
        self.ids.insert(pos, id);
    }

    /// Move `id` to its sorted position after its capacity changed.
    ///
    /// Returns `false` if `id` is not part of this pool.
    pub fn reposition(&mut self, id: usize, available: impl Fn(usize) -> usize) -> bool {
        let Some(pos) = self.ids.iter().position(|&other| other == id) else {
            return false;
        };
        self.ids.remove(pos);
        self.insert(id, available);
        true
    }

    /// Whether the ordering agrees with the given capacities.
    pub fn is_sorted_by_capacity(&self, available: impl Fn(usize) -> usize) -> bool {
        self.ids
            .windows(2)
            .all(|pair| rank(pair[0], available(pair[0])) < rank(pair[1], available(pair[1])))
    }
}
