//! Bitmap-tree buddy allocator for a single memory region
//!
//! The region is `2^min_order` pages viewed as a complete binary tree.
//! All bookkeeping lives in two bit-vectors outside the managed memory:
//! `occupied` marks nodes that cannot be handed out at their own order,
//! `heads` marks the exact nodes returned by [`BuddyAllocator::alloc`].

use crate::{AllocError, AllocResult, FreeError, FreeResult, OrderAllocator};

#[cfg(feature = "log")]
use log::{debug, warn};

use super::{
    index::{self, ROOT},
    occupancy::OccupancyTracker,
    MAX_MIN_ORDER,
};

/// Whether a freshly allocated block is written before it is returned.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum FillMode {
    /// Zero the whole block.
    Zero,
    /// Leave the block contents untouched.
    #[default]
    None,
}

/// The record needed to free a block again.
///
/// The address alone is ambiguous: a block shares its start address with
/// every left-most descendant and ancestor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Allocation {
    pub order: usize,
    pub node_index: usize,
    pub address: usize,
}

/// Buddy allocator over one contiguous region.
pub struct BuddyAllocator<const PAGE_SIZE: usize = { crate::DEFAULT_PAGE_SIZE }> {
    base_addr: usize,
    min_order: usize,
    occupied: OccupancyTracker,
    heads: OccupancyTracker,
    used_pages: usize,
    live_blocks: usize,
}

impl<const PAGE_SIZE: usize> BuddyAllocator<PAGE_SIZE> {
    /// Create an allocator for the region `[base_addr, base_addr + 2^min_order * PAGE_SIZE)`.
    ///
    /// # Panics
    ///
    /// Panics if `min_order` exceeds [`MAX_MIN_ORDER`] or the region wraps the
    /// address space.
    pub fn new(base_addr: usize, min_order: usize) -> Self {
        assert!(PAGE_SIZE.is_power_of_two(), "page size must be a power of two");
        assert!(
            min_order <= MAX_MIN_ORDER,
            "min_order {} exceeds maximum {}",
            min_order,
            MAX_MIN_ORDER
        );
        let fits = match index::region_size::<PAGE_SIZE>(min_order) {
            Some(size) => base_addr.checked_add(size).is_some(),
            None => false,
        };
        assert!(
            fits,
            "region at {:#x} with min_order {} overflows the address space",
            base_addr,
            min_order
        );

        let nodes = index::node_count(min_order);
        Self {
            base_addr,
            min_order,
            occupied: OccupancyTracker::new(nodes),
            heads: OccupancyTracker::new(nodes),
            used_pages: 0,
            live_blocks: 0,
        }
    }

    /// Deepest order of the tree, i.e. single pages.
    pub const fn min_order(&self) -> usize {
        self.min_order
    }

    /// Order of the whole-region block. Always 0.
    pub const fn max_order(&self) -> usize {
        0
    }

    pub const fn base_addr(&self) -> usize {
        self.base_addr
    }

    pub const fn region_size(&self) -> usize {
        PAGE_SIZE << self.min_order
    }

    pub const fn end_addr(&self) -> usize {
        self.base_addr + self.region_size()
    }

    /// Check if an address belongs to this region
    pub const fn contains(&self, addr: usize) -> bool {
        addr >= self.base_addr && addr < self.end_addr()
    }

    /// Bytes covered by one block of `order`.
    pub const fn block_size(&self, order: usize) -> usize {
        index::block_size::<PAGE_SIZE>(order, self.min_order)
    }

    pub const fn total_pages(&self) -> usize {
        1 << self.min_order
    }

    pub const fn used_pages(&self) -> usize {
        self.used_pages
    }

    pub const fn available_pages(&self) -> usize {
        self.total_pages() - self.used_pages
    }

    /// Number of blocks currently handed out.
    pub const fn live_blocks(&self) -> usize {
        self.live_blocks
    }

    /// Allocate one block of `order` using left-to-right first fit.
    pub fn alloc(&mut self, order: usize) -> AllocResult<Allocation> {
        if order > self.min_order {
            warn!(
                "buddy region {:#x}: invalid order {} (min order {})",
                self.base_addr, order, self.min_order
            );
            return Err(AllocError::InvalidOrder);
        }

        let Some(node_index) = self.occupied.first_clear_in(index::level_range(order)) else {
            debug!(
                "buddy region {:#x}: no free block at order {}",
                self.base_addr, order
            );
            return Err(AllocError::OutOfMemory);
        };

        let claimed = self.occupied.test_and_set(node_index);
        assert!(claimed, "node {} was reported free but is occupied", node_index);
        assert!(
            !self.heads.test(node_index),
            "node {} is free but recorded as allocated",
            node_index
        );
        self.heads.set(node_index);
        self.mark_ancestors(node_index);
        self.mark_descendants(node_index, order);

        self.used_pages += index::block_pages(order, self.min_order);
        self.live_blocks += 1;

        Ok(Allocation {
            order,
            node_index,
            address: self.address_of(node_index, order),
        })
    }

    /// Allocate a block and fill it according to `fill`.
    ///
    /// # Safety
    ///
    /// With [`FillMode::Zero`] the caller must own the memory behind this
    /// region and it must be writable.
    pub unsafe fn alloc_with(&mut self, order: usize, fill: FillMode) -> AllocResult<Allocation> {
        let block = self.alloc(order)?;
        if fill == FillMode::Zero {
            // SAFETY: the block lies inside the region, which the caller guarantees is writable.
            unsafe {
                core::ptr::write_bytes(block.address as *mut u8, 0, self.block_size(order));
            }
        }
        Ok(block)
    }

    /// Allocate a zero-filled block.
    ///
    /// # Safety
    ///
    /// See [`alloc_with`](Self::alloc_with).
    pub unsafe fn alloc_zeroed(&mut self, order: usize) -> AllocResult<Allocation> {
        unsafe { self.alloc_with(order, FillMode::Zero) }
    }

    /// Free the block `(order, node_index)` and coalesce with free buddies.
    pub fn free(&mut self, order: usize, node_index: usize) -> FreeResult {
        if order > self.min_order || !index::level_range(order).contains(&node_index) {
            warn!(
                "buddy region {:#x}: node {} is not a block of order {}",
                self.base_addr, node_index, order
            );
            return Err(FreeError::InvalidFree);
        }

        if !self.heads.test(node_index) {
            if self.occupied.test(node_index) {
                warn!(
                    "buddy region {:#x}: node {} (order {}) overlaps another allocation",
                    self.base_addr, node_index, order
                );
                return Err(FreeError::InvalidFree);
            }
            warn!(
                "buddy region {:#x}: double free of node {} (order {})",
                self.base_addr, node_index, order
            );
            return Err(FreeError::DoubleFree);
        }

        self.heads.clear(node_index);
        self.occupied.clear(node_index);
        for depth in 1..=self.min_order - order {
            self.occupied
                .clear_range(index::descendants_at_depth(node_index, depth));
        }

        // Coalescing ascent: the parent becomes available again only when
        // both of its children are.
        let mut current = node_index;
        while current != ROOT {
            if self.occupied.test(index::buddy(current)) {
                break;
            }
            current = index::parent(current);
            assert!(
                !self.heads.test(current),
                "ancestor {} of freed node {} is itself allocated",
                current,
                node_index
            );
            self.occupied.clear(current);
        }

        self.used_pages -= index::block_pages(order, self.min_order);
        self.live_blocks -= 1;
        Ok(())
    }

    /// Free a block using the record returned by [`alloc`](Self::alloc).
    pub fn free_allocation(&mut self, block: &Allocation) -> FreeResult {
        if block.address != self.address_of_checked(block.node_index, block.order) {
            warn!(
                "buddy region {:#x}: address {:#x} does not match node {}",
                self.base_addr, block.address, block.node_index
            );
            return Err(FreeError::InvalidFree);
        }
        self.free(block.order, block.node_index)
    }

    /// Whether some block of `order` is free. Never mutates.
    pub fn scan_order(&self, order: usize) -> bool {
        order <= self.min_order && self.occupied.any_clear_in(index::level_range(order))
    }

    /// Smallest order that can currently be satisfied, i.e. the largest free block.
    pub fn largest_free_order(&self) -> Option<usize> {
        (0..=self.min_order).find(|&order| self.scan_order(order))
    }

    /// Whether `(order, node_index)` is a live allocation.
    pub fn is_allocated(&self, order: usize, node_index: usize) -> bool {
        order <= self.min_order
            && index::level_range(order).contains(&node_index)
            && self.heads.test(node_index)
    }

    /// Whether the node is unavailable at its own order.
    pub fn is_occupied(&self, node_index: usize) -> bool {
        node_index < self.occupied.len() && self.occupied.test(node_index)
    }

    /// Recompute every occupancy bit from the live allocations and compare.
    ///
    /// A node must be occupied iff it or an ancestor is allocated, or a
    /// descendant is allocated. Also checks the page and block counters.
    pub fn check_consistency(&self) -> bool {
        let nodes = self.occupied.len();
        let mut covered = OccupancyTracker::new(nodes);
        let mut below = OccupancyTracker::new(nodes);

        for idx in 0..nodes {
            if self.heads.test(idx) || (idx != ROOT && covered.test(index::parent(idx))) {
                covered.set(idx);
            }
        }
        for idx in (0..nodes).rev() {
            let left = index::left_child(idx);
            let has_head_below = left < nodes
                && (self.heads.test(left)
                    || below.test(left)
                    || self.heads.test(left + 1)
                    || below.test(left + 1));
            if has_head_below {
                below.set(idx);
            }
        }

        let mut used_pages = 0;
        for idx in 0..nodes {
            let expected = covered.test(idx) || below.test(idx);
            if expected != self.occupied.test(idx) {
                warn!(
                    "buddy region {:#x}: node {} occupancy {} expected {}",
                    self.base_addr,
                    idx,
                    self.occupied.test(idx),
                    expected
                );
                return false;
            }
            if self.heads.test(idx) {
                // Nested heads would mean a block was handed out twice.
                if below.test(idx) || (idx != ROOT && covered.test(index::parent(idx))) {
                    return false;
                }
                used_pages += index::block_pages(index::order_of(idx), self.min_order);
            }
        }

        used_pages == self.used_pages && self.heads.count_set() == self.live_blocks
    }

    /// Statistics of this region
    #[cfg(feature = "tracking")]
    pub fn stats(&self) -> super::stats::BuddyStats {
        let mut stats = super::stats::BuddyStats::new();
        stats.total_pages = self.total_pages();
        stats.used_pages = self.used_pages;
        stats.free_pages = self.available_pages();
        stats.live_blocks = self.live_blocks;
        for order in 0..=self.min_order {
            stats.free_blocks_by_order[order] = self.free_blocks_at(order);
        }
        stats
    }

    /// Number of maximal free blocks of `order`: free nodes with an unavailable parent.
    pub fn free_blocks_at(&self, order: usize) -> usize {
        if order > self.min_order {
            return 0;
        }
        if order == 0 {
            return usize::from(!self.occupied.test(ROOT));
        }
        let free = index::nodes_at_order(order) - self.occupied.count_set_in(index::level_range(order));
        if free == 0 {
            return 0;
        }
        index::level_range(order)
            .filter(|&idx| !self.occupied.test(idx) && self.occupied.test(index::parent(idx)))
            .count()
    }

    /// Address of a node, normalizing the tree index to its offset within the level.
    fn address_of(&self, node_index: usize, order: usize) -> usize {
        self.base_addr + index::offset_in_level(node_index) * self.block_size(order)
    }

    fn address_of_checked(&self, node_index: usize, order: usize) -> usize {
        if order > self.min_order || !index::level_range(order).contains(&node_index) {
            return usize::MAX;
        }
        self.address_of(node_index, order)
    }

    fn mark_ancestors(&mut self, node_index: usize) {
        let mut current = node_index;
        while current != ROOT {
            current = index::parent(current);
            self.occupied.set(current);
        }
    }

    fn mark_descendants(&mut self, node_index: usize, order: usize) {
        for depth in 1..=self.min_order - order {
            self.occupied
                .set_range(index::descendants_at_depth(node_index, depth));
        }
    }
}

impl<const PAGE_SIZE: usize> OrderAllocator for BuddyAllocator<PAGE_SIZE> {
    type Block = Allocation;

    fn alloc_order(&mut self, order: usize) -> AllocResult<Allocation> {
        self.alloc(order)
    }

    fn free_block(&mut self, block: Allocation) -> FreeResult {
        self.free_allocation(&block)
    }

    fn total_pages(&self) -> usize {
        BuddyAllocator::<PAGE_SIZE>::total_pages(self)
    }

    fn used_pages(&self) -> usize {
        self.used_pages
    }

    fn available_pages(&self) -> usize {
        BuddyAllocator::<PAGE_SIZE>::available_pages(self)
    }
}
