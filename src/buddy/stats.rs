//! Statistics and debugging for buddy allocator
//!
//! Provides per-region statistics and failure reporting.

use super::MAX_MIN_ORDER;

/// Layout descriptor of one buddy region inside a zone
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ZoneInfo {
    pub start_addr: usize,
    pub end_addr: usize,
    pub total_pages: usize,
    pub zone_id: usize,
    pub fast_path: bool,
}

/// Buddy region statistics
///
/// `free_blocks_by_order[o]` counts maximal free blocks of order `o`, i.e.
/// free nodes whose parent is unavailable.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BuddyStats {
    pub total_pages: usize,
    pub free_pages: usize,
    pub used_pages: usize,
    pub live_blocks: usize,
    pub free_blocks_by_order: [usize; MAX_MIN_ORDER + 1],
}

impl Default for BuddyStats {
    fn default() -> Self {
        Self::new()
    }
}

impl BuddyStats {
    pub const fn new() -> Self {
        Self {
            total_pages: 0,
            free_pages: 0,
            used_pages: 0,
            live_blocks: 0,
            free_blocks_by_order: [0; MAX_MIN_ORDER + 1],
        }
    }

    /// Add statistics from another BuddyStats
    ///
    /// Orders are only comparable between regions of the same depth, which
    /// is always the case inside one zone manager.
    pub fn add(&mut self, other: &BuddyStats) {
        self.total_pages += other.total_pages;
        self.free_pages += other.free_pages;
        self.used_pages += other.used_pages;
        self.live_blocks += other.live_blocks;
        for (i, &count) in other.free_blocks_by_order.iter().enumerate() {
            self.free_blocks_by_order[i] += count;
        }
    }
}

/// Detailed memory statistics reporter
pub struct MemoryStatsReporter;

impl MemoryStatsReporter {
    /// Print detailed allocation failure statistics
    #[allow(unused_variables)]
    pub fn print_alloc_failure_stats(
        page_size: usize,
        min_order: usize,
        total_stats: &BuddyStats,
        zone_infos: &[ZoneInfo],
        zone_stats: &[BuddyStats],
        request_order: usize,
    ) {
        #[cfg(feature = "log")]
        use log::error;

        let request_pages = 1usize << (min_order - request_order.min(min_order));
        error!("========================================");
        error!(
            "Request: order {} ({} pages, {} KB)",
            request_order,
            request_pages,
            (request_pages * page_size) / 1024
        );

        error!("Overall Memory State:");
        error!("  Total zones: {}", zone_infos.len());
        error!(
            "  Total pages: {} ({} KB)",
            total_stats.total_pages,
            (total_stats.total_pages * page_size) / 1024
        );
        error!(
            "  Free pages: {} ({} KB)",
            total_stats.free_pages,
            (total_stats.free_pages * page_size) / 1024
        );
        error!(
            "  Used pages: {} ({} KB) in {} blocks",
            total_stats.used_pages,
            (total_stats.used_pages * page_size) / 1024,
            total_stats.live_blocks
        );
        error!("========================================");

        for (info, stats) in zone_infos.iter().zip(zone_stats) {
            error!(
                "Zone {} ({}):",
                info.zone_id,
                if info.fast_path { "fast" } else { "slow" }
            );
            error!("  Range: [{:#x}, {:#x})", info.start_addr, info.end_addr);
            error!("  Free pages: {} / {}", stats.free_pages, info.total_pages);
            error!("  Free blocks by order:");

            for order in 0..=min_order {
                let count = stats.free_blocks_by_order[order];
                if count > 0 {
                    let block_size = (1usize << (min_order - order)) * page_size;
                    error!(
                        "    Order {}: {} blocks ({} KB each, {} KB total)",
                        order,
                        count,
                        block_size / 1024,
                        (count * block_size) / 1024
                    );
                }
            }
            error!("----------------------------------------");
        }

        error!("========================================");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stats_add() {
        let mut total = BuddyStats::new();
        let mut one = BuddyStats::new();
        one.total_pages = 8;
        one.free_pages = 6;
        one.used_pages = 2;
        one.live_blocks = 1;
        one.free_blocks_by_order[1] = 1;
        one.free_blocks_by_order[2] = 1;

        total.add(&one);
        total.add(&one);
        assert_eq!(total.total_pages, 16);
        assert_eq!(total.free_pages, 12);
        assert_eq!(total.used_pages, 4);
        assert_eq!(total.live_blocks, 2);
        assert_eq!(total.free_blocks_by_order[1], 2);
        assert_eq!(total.free_blocks_by_order[2], 2);
        assert_eq!(total.free_blocks_by_order[0], 0);
    }
}
