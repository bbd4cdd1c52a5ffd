//! Buddy allocator module
//!
//! This module provides the single-region buddy tree:
//! - Index arithmetic over the implicit binary tree
//! - Occupancy bit-vectors
//! - The order-granular allocator with coalescing
//! - Statistics and failure reporting

pub mod buddy_allocator;
pub mod index;
pub mod occupancy;
pub mod stats;

/// Deepest tree supported by one region (`2^24` pages, 64 GiB with 4 KiB pages)
pub const MAX_MIN_ORDER: usize = 24;

pub use buddy_allocator::{Allocation, BuddyAllocator, FillMode};
pub use occupancy::OccupancyTracker;
pub use stats::{BuddyStats, MemoryStatsReporter, ZoneInfo};
