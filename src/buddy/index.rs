//! Index arithmetic for the implicit buddy tree
//!
//! The tree is stored heap-style: node 0 is the whole region at order 0,
//! node `i` has children `2i + 1` and `2i + 2`. Every order occupies one
//! contiguous run of indices, `[2^order - 1, 2^(order + 1) - 2]`.

use core::ops::RangeInclusive;

/// Index of the root node (the whole region).
pub const ROOT: usize = 0;

/// Parent of `idx`. The root is its own parent.
#[inline]
pub const fn parent(idx: usize) -> usize {
    if idx == ROOT {
        ROOT
    } else {
        (idx - 1) / 2
    }
}

#[inline]
pub const fn left_child(idx: usize) -> usize {
    idx * 2 + 1
}

#[inline]
pub const fn right_child(idx: usize) -> usize {
    idx * 2 + 2
}

/// Sibling of `idx` under the same parent. The root has no buddy and maps to itself.
#[inline]
pub const fn buddy(idx: usize) -> usize {
    if idx == ROOT {
        ROOT
    } else {
        ((idx - 1) ^ 1) + 1
    }
}

/// Number of nodes on the level of `order`.
#[inline]
pub const fn nodes_at_order(order: usize) -> usize {
    1 << order
}

/// First node index of `order`'s level.
#[inline]
pub const fn level_start(order: usize) -> usize {
    nodes_at_order(order) - 1
}

/// Last node index of `order`'s level (inclusive).
#[inline]
pub const fn level_end(order: usize) -> usize {
    level_start(order) + nodes_at_order(order) - 1
}

#[inline]
pub const fn level_range(order: usize) -> RangeInclusive<usize> {
    level_start(order)..=level_end(order)
}

/// Order (tree depth) of a node index.
#[inline]
pub const fn order_of(idx: usize) -> usize {
    (usize::BITS - 1 - (idx + 1).leading_zeros()) as usize
}

/// Zero-based position of `idx` inside its own level.
///
/// Raw tree indices are not linear offsets: node 2 is the second block of
/// order 1, not the third. Addresses must always be computed from this value.
#[inline]
pub const fn offset_in_level(idx: usize) -> usize {
    idx - level_start(order_of(idx))
}

/// Total number of nodes in a tree whose deepest level is `min_order`.
#[inline]
pub const fn node_count(min_order: usize) -> usize {
    (1 << (min_order + 1)) - 1
}

/// Pages covered by one block of `order` in a tree of depth `min_order`.
#[inline]
pub const fn block_pages(order: usize, min_order: usize) -> usize {
    1 << (min_order - order)
}

/// Bytes covered by one block of `order` in a tree of depth `min_order`.
#[inline]
pub const fn block_size<const PAGE_SIZE: usize>(order: usize, min_order: usize) -> usize {
    block_pages(order, min_order) * PAGE_SIZE
}

/// Bytes covered by a whole tree of depth `min_order`, or `None` if that does
/// not fit in `usize`.
#[inline]
pub const fn region_size<const PAGE_SIZE: usize>(min_order: usize) -> Option<usize> {
    if min_order >= usize::BITS as usize {
        return None;
    }
    PAGE_SIZE.checked_mul(1 << min_order)
}

/// Descendants of `idx` that sit `depth` levels below it, as a contiguous index range.
#[inline]
pub const fn descendants_at_depth(idx: usize, depth: usize) -> RangeInclusive<usize> {
    let first = ((idx + 1) << depth) - 1;
    first..=first + (1 << depth) - 1
}
