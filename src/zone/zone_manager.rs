//! Multi-instance buddy zone
//!
//! A zone owns several same-sized buddy regions laid out back to back and
//! splits them into two pools. Small requests are served from the fast-path
//! pool and fall back to the slow-path pool once it is exhausted; large
//! requests only ever touch the slow-path pool. Inside a pool the instance
//! with the most available pages is tried first.

use alloc::vec::Vec;

use crate::buddy::{index, Allocation, BuddyAllocator, ZoneInfo};
use crate::{AllocError, AllocResult, FreeError, FreeResult, OrderAllocator};

#[cfg(feature = "log")]
use log::{debug, info, warn};

#[cfg(feature = "tracking")]
use crate::buddy::{BuddyStats, MemoryStatsReporter};

use super::{config::ZoneConfig, zone_order::CapacityOrder};

/// Opaque identifier of one buddy region inside a zone.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ZoneId(usize);

impl ZoneId {
    /// Identifier of the region created at position `index`.
    pub const fn from_index(index: usize) -> Self {
        Self(index)
    }

    /// Position of the region in creation order.
    pub const fn index(self) -> usize {
        self.0
    }
}

/// The pool a region belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Pool {
    /// Reserved for small, frequent requests.
    FastPath,
    /// General regions, used for large requests and as fallback.
    SlowPath,
}

/// A block handed out by a [`ZoneManager`], tagged with its region.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ZoneAllocation {
    pub zone: ZoneId,
    pub block: Allocation,
}

impl ZoneAllocation {
    pub const fn address(&self) -> usize {
        self.block.address
    }

    pub const fn order(&self) -> usize {
        self.block.order
    }
}

/// Zone of buddy regions with capacity-ordered selection.
pub struct ZoneManager<const PAGE_SIZE: usize = { crate::DEFAULT_PAGE_SIZE }> {
    base_addr: usize,
    config: ZoneConfig,
    instances: Vec<BuddyAllocator<PAGE_SIZE>>,
    fast_path: CapacityOrder,
    slow_path: CapacityOrder,
}

impl<const PAGE_SIZE: usize> ZoneManager<PAGE_SIZE> {
    /// Build a zone of `instance_count` regions starting at `base_addr`.
    ///
    /// Requests with `order >= fast_path_threshold` are treated as small.
    /// Region depth and pool split come from [`ZoneConfig::default`].
    pub fn new(base_addr: usize, instance_count: usize, fast_path_threshold: usize) -> Self {
        Self::with_config(
            base_addr,
            ZoneConfig::default()
                .with_instance_count(instance_count)
                .with_fast_path_threshold(fast_path_threshold),
        )
    }

    /// Build a zone from an explicit configuration.
    ///
    /// # Panics
    ///
    /// Panics if the configuration is inconsistent or the zone does not fit
    /// in the address space.
    pub fn with_config(base_addr: usize, config: ZoneConfig) -> Self {
        config.validate();

        let region_size =
            index::region_size::<PAGE_SIZE>(config.min_order).expect("region size overflows usize");
        let zone_size = region_size
            .checked_mul(config.instance_count)
            .expect("zone size overflows usize");
        assert!(
            base_addr.checked_add(zone_size).is_some(),
            "zone at {:#x} of {:#x} bytes overflows the address space",
            base_addr,
            zone_size
        );

        let fast_count = config.fast_path_count();
        let mut zone = Self {
            base_addr,
            config,
            instances: Vec::with_capacity(config.instance_count),
            fast_path: CapacityOrder::new(),
            slow_path: CapacityOrder::new(),
        };

        for id in 0..config.instance_count {
            zone.instances.push(BuddyAllocator::new(
                base_addr + id * region_size,
                config.min_order,
            ));
            let instances = &zone.instances;
            let pool = if id < fast_count {
                &mut zone.fast_path
            } else {
                &mut zone.slow_path
            };
            pool.insert(id, |i| instances[i].available_pages());
        }

        debug!(
            "zone at {:#x}: {} regions of {:#x} bytes, {} fast-path, threshold order {}",
            base_addr,
            config.instance_count,
            region_size,
            fast_count,
            config.fast_path_threshold
        );
        zone
    }

    pub const fn config(&self) -> &ZoneConfig {
        &self.config
    }

    pub const fn base_addr(&self) -> usize {
        self.base_addr
    }

    pub fn instance_count(&self) -> usize {
        self.instances.len()
    }

    pub fn fast_path_count(&self) -> usize {
        self.fast_path.len()
    }

    pub fn slow_path_count(&self) -> usize {
        self.slow_path.len()
    }

    /// The region behind `zone`, if it exists.
    pub fn instance(&self, zone: ZoneId) -> Option<&BuddyAllocator<PAGE_SIZE>> {
        self.instances.get(zone.0)
    }

    /// Pool of `zone`, or `None` for an unknown id.
    pub fn pool_of(&self, zone: ZoneId) -> Option<Pool> {
        if zone.0 >= self.instances.len() {
            None
        } else if zone.0 < self.config.fast_path_count() {
            Some(Pool::FastPath)
        } else {
            Some(Pool::SlowPath)
        }
    }

    /// Whether a request of `order` is routed to the fast path first.
    pub const fn is_fast_path_request(&self, order: usize) -> bool {
        order >= self.config.fast_path_threshold
    }

    /// Current selection order of `pool`, head first.
    pub fn instances_by_capacity(&self, pool: Pool) -> Vec<ZoneId> {
        self.ordering(pool).as_slice().iter().map(|&id| ZoneId(id)).collect()
    }

    /// Find the region that contains the given address
    pub fn find_zone_for_addr(&self, addr: usize) -> Option<ZoneId> {
        self.instances
            .iter()
            .position(|instance| instance.contains(addr))
            .map(ZoneId)
    }

    pub fn total_pages(&self) -> usize {
        self.instances.iter().map(|i| i.total_pages()).sum()
    }

    pub fn used_pages(&self) -> usize {
        self.instances.iter().map(|i| i.used_pages()).sum()
    }

    pub fn available_pages(&self) -> usize {
        self.instances.iter().map(|i| i.available_pages()).sum()
    }

    /// Allocate one block of `order` from the best region of the matching pool.
    pub fn allocate(&mut self, order: usize) -> AllocResult<ZoneAllocation> {
        if order > self.config.min_order {
            warn!(
                "zone at {:#x}: invalid order {} (min order {})",
                self.base_addr, order, self.config.min_order
            );
            return Err(AllocError::InvalidOrder);
        }

        if self.is_fast_path_request(order) {
            if let Some(result) = alloc_from_pool(&mut self.fast_path, &mut self.instances, order) {
                return Ok(result);
            }
            debug!(
                "zone at {:#x}: fast path exhausted for order {}, falling back to slow path",
                self.base_addr, order
            );
        }

        if let Some(result) = alloc_from_pool(&mut self.slow_path, &mut self.instances, order) {
            return Ok(result);
        }

        debug!(
            "zone at {:#x}: allocation failure at order {} ({} pages available)",
            self.base_addr,
            order,
            self.available_pages()
        );
        self.print_alloc_failure_stats(order);
        Err(AllocError::OutOfMemory)
    }

    /// Return a block to the region it came from.
    pub fn free(&mut self, allocation: ZoneAllocation) -> FreeResult {
        let id = allocation.zone.0;
        let Some(instance) = self.instances.get_mut(id) else {
            warn!(
                "zone at {:#x}: free with unknown region id {}",
                self.base_addr, id
            );
            return Err(FreeError::InvalidZone);
        };

        instance.free_allocation(&allocation.block)?;

        let instances = &self.instances;
        let repositioned = if id < self.config.fast_path_count() {
            self.fast_path.reposition(id, |i| instances[i].available_pages())
        } else {
            self.slow_path.reposition(id, |i| instances[i].available_pages())
        };
        assert!(repositioned, "region {} missing from its pool", id);
        Ok(())
    }

    /// Region layout descriptors, in creation order.
    pub fn zone_infos(&self) -> Vec<ZoneInfo> {
        let fast_count = self.config.fast_path_count();
        self.instances
            .iter()
            .enumerate()
            .map(|(id, instance)| ZoneInfo {
                start_addr: instance.base_addr(),
                end_addr: instance.end_addr(),
                total_pages: instance.total_pages(),
                zone_id: id,
                fast_path: id < fast_count,
            })
            .collect()
    }

    /// Whether every region is internally consistent and both pools are sorted.
    pub fn check_consistency(&self) -> bool {
        let available = |i: usize| self.instances[i].available_pages();
        self.instances.iter().all(|i| i.check_consistency())
            && self.fast_path.is_sorted_by_capacity(available)
            && self.slow_path.is_sorted_by_capacity(available)
            && self.fast_path.len() + self.slow_path.len() == self.instances.len()
    }

    /// Aggregated statistics over all regions
    #[cfg(feature = "tracking")]
    pub fn stats(&self) -> BuddyStats {
        let mut total = BuddyStats::new();
        for instance in &self.instances {
            total.add(&instance.stats());
        }
        total
    }

    /// Print all region information and block distribution
    pub fn print_zone_info(&self) {
        info!("========== Buddy Zone Info ==========");
        info!("Total regions: {}", self.instances.len());
        info!("Page size: {:#x} ({})", PAGE_SIZE, PAGE_SIZE);
        info!(
            "Fast path: {} regions for order >= {}",
            self.fast_path.len(),
            self.config.fast_path_threshold
        );
        info!("");

        for info in self.zone_infos() {
            let instance = &self.instances[info.zone_id];
            info!(
                "Region {} ({}):",
                info.zone_id,
                if info.fast_path { "fast" } else { "slow" }
            );
            info!(
                "  Address range: [{:#x}, {:#x})",
                info.start_addr, info.end_addr
            );
            info!(
                "  Pages: {} total, {} used in {} blocks",
                info.total_pages,
                instance.used_pages(),
                instance.live_blocks()
            );
            info!("  Free blocks distribution:");
            for order in 0..=instance.min_order() {
                let block_count = instance.free_blocks_at(order);
                if block_count > 0 {
                    let _block_size = instance.block_size(order);
                    info!(
                        "    Order {}: {} blocks (size {} bytes each, total {:#x})",
                        order,
                        block_count,
                        _block_size,
                        block_count * _block_size
                    );
                }
            }
            info!("");
        }
        info!("=====================================");
    }

    #[cfg(feature = "tracking")]
    fn print_alloc_failure_stats(&self, order: usize) {
        let infos = self.zone_infos();
        let stats: Vec<BuddyStats> = self.instances.iter().map(|i| i.stats()).collect();
        MemoryStatsReporter::print_alloc_failure_stats(
            PAGE_SIZE,
            self.config.min_order,
            &self.stats(),
            &infos,
            &stats,
            order,
        );
    }

    #[cfg(not(feature = "tracking"))]
    fn print_alloc_failure_stats(&self, _order: usize) {
        // No-op when tracking is disabled
    }

    fn ordering(&self, pool: Pool) -> &CapacityOrder {
        match pool {
            Pool::FastPath => &self.fast_path,
            Pool::SlowPath => &self.slow_path,
        }
    }
}

/// Try the regions of one pool in capacity order and keep the pool sorted.
fn alloc_from_pool<const PAGE_SIZE: usize>(
    pool: &mut CapacityOrder,
    instances: &mut [BuddyAllocator<PAGE_SIZE>],
    order: usize,
) -> Option<ZoneAllocation> {
    for pos in 0..pool.len() {
        let id = pool.as_slice()[pos];
        let instance = &mut instances[id];

        // The pool is sorted by available pages, so nobody further down fits either.
        if instance.available_pages() < index::block_pages(order, instance.min_order()) {
            break;
        }

        match instance.alloc(order) {
            Ok(block) => {
                pool.reposition(id, |i| instances[i].available_pages());
                return Some(ZoneAllocation {
                    zone: ZoneId(id),
                    block,
                });
            }
            // Fragmented despite enough free pages, try the next one.
            Err(_) => continue,
        }
    }
    None
}

impl<const PAGE_SIZE: usize> OrderAllocator for ZoneManager<PAGE_SIZE> {
    type Block = ZoneAllocation;

    fn alloc_order(&mut self, order: usize) -> AllocResult<ZoneAllocation> {
        self.allocate(order)
    }

    fn free_block(&mut self, block: ZoneAllocation) -> FreeResult {
        self.free(block)
    }

    fn total_pages(&self) -> usize {
        ZoneManager::<PAGE_SIZE>::total_pages(self)
    }

    fn used_pages(&self) -> usize {
        ZoneManager::<PAGE_SIZE>::used_pages(self)
    }

    fn available_pages(&self) -> usize {
        ZoneManager::<PAGE_SIZE>::available_pages(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const TEST_PAGE_SIZE: usize = 0x1000;
    const BASE: usize = 0x4000_0000;

    type TestZone = ZoneManager<TEST_PAGE_SIZE>;

    fn small_zone() -> TestZone {
        // 4 regions of 16 pages, 2 fast-path, orders >= 3 (<= 2 pages) are small.
        TestZone::with_config(
            BASE,
            ZoneConfig::default()
                .with_instance_count(4)
                .with_min_order(4)
                .with_fast_path_threshold(3),
        )
    }

    #[test]
    fn test_zone_layout() {
        let zone = small_zone();
        assert_eq!(zone.base_addr(), BASE);
        assert_eq!(zone.config().min_order, 4);
        assert_eq!(zone.config().fast_path_threshold, 3);
        assert_eq!(zone.instance_count(), 4);
        assert_eq!(zone.fast_path_count(), 2);
        assert_eq!(zone.slow_path_count(), 2);
        assert_eq!(zone.total_pages(), 64);

        let infos = zone.zone_infos();
        for (id, info) in infos.iter().enumerate() {
            assert_eq!(info.start_addr, BASE + id * 16 * TEST_PAGE_SIZE);
            assert_eq!(info.end_addr, info.start_addr + 16 * TEST_PAGE_SIZE);
            assert_eq!(info.fast_path, id < 2);
        }
        assert_eq!(zone.find_zone_for_addr(BASE + 17 * TEST_PAGE_SIZE), Some(ZoneId(1)));
        assert_eq!(zone.find_zone_for_addr(BASE + 64 * TEST_PAGE_SIZE), None);
        assert_eq!(zone.instances_by_capacity(Pool::FastPath), [ZoneId(0), ZoneId(1)]);
        assert_eq!(zone.instances_by_capacity(Pool::SlowPath), [ZoneId(2), ZoneId(3)]);
    }

    #[test]
    fn test_most_free_first_and_reposition() {
        let mut zone = small_zone();

        let a = zone.allocate(4).unwrap();
        assert_eq!(a.zone, ZoneId(0));
        // Region 0 lost a page, so region 1 now has the most free space.
        let b = zone.allocate(4).unwrap();
        assert_eq!(b.zone, ZoneId(1));
        let c = zone.allocate(3).unwrap();
        assert_eq!(c.zone, ZoneId(0));
        assert_eq!(zone.instances_by_capacity(Pool::FastPath), [ZoneId(1), ZoneId(0)]);

        zone.free(c).unwrap();
        zone.free(a).unwrap();
        assert_eq!(zone.instances_by_capacity(Pool::FastPath), [ZoneId(0), ZoneId(1)]);
        assert!(zone.check_consistency());
    }

    #[test]
    fn test_large_requests_skip_fast_path() {
        let mut zone = small_zone();
        let big = zone.allocate(1).unwrap();
        assert_eq!(zone.pool_of(big.zone), Some(Pool::SlowPath));
        let whole = zone.allocate(0).unwrap();
        assert_eq!(zone.pool_of(whole.zone), Some(Pool::SlowPath));
        assert_ne!(big.zone, whole.zone);

        // Only half a slow region is left; the fast regions are untouched.
        assert_eq!(zone.allocate(0), Err(AllocError::OutOfMemory));
        assert_eq!(zone.instance(ZoneId(0)).unwrap().used_pages(), 0);
        assert_eq!(zone.instance(ZoneId(1)).unwrap().used_pages(), 0);
    }

    #[test]
    fn test_small_requests_fall_back_to_slow_path() {
        let mut zone = small_zone();
        let mut blocks = Vec::new();
        for _ in 0..32 {
            let block = zone.allocate(4).unwrap();
            assert_eq!(zone.pool_of(block.zone), Some(Pool::FastPath));
            blocks.push(block);
        }
        let spill = zone.allocate(4).unwrap();
        assert_eq!(zone.pool_of(spill.zone), Some(Pool::SlowPath));

        zone.free(blocks.pop().unwrap()).unwrap();
        let back = zone.allocate(4).unwrap();
        assert_eq!(zone.pool_of(back.zone), Some(Pool::FastPath));
        assert!(zone.check_consistency());
    }

    #[test]
    fn test_fragmented_head_falls_through() {
        let mut zone = TestZone::with_config(
            BASE,
            ZoneConfig::default()
                .with_instance_count(2)
                .with_min_order(2)
                .with_fast_path_threshold(2)
                .with_fast_path_instances(0),
        );
        let blocks: Vec<ZoneAllocation> = (0..8).map(|_| zone.allocate(2).unwrap()).collect();
        assert_eq!(zone.available_pages(), 0);
        let page = |region: usize, n: usize| {
            *blocks
                .iter()
                .find(|b| b.address() == BASE + (region * 4 + n) * TEST_PAGE_SIZE)
                .unwrap()
        };

        // Region 0 keeps two free pages that are not buddies, region 1 a free pair.
        zone.free(page(0, 0)).unwrap();
        zone.free(page(0, 2)).unwrap();
        zone.free(page(1, 2)).unwrap();
        zone.free(page(1, 3)).unwrap();
        assert_eq!(zone.instances_by_capacity(Pool::SlowPath), [ZoneId(0), ZoneId(1)]);

        let pair = zone.allocate(1).unwrap();
        assert_eq!(pair.zone, ZoneId(1));
        assert_eq!(pair.address(), BASE + 6 * TEST_PAGE_SIZE);

        let single = zone.allocate(2).unwrap();
        assert_eq!(single.zone, ZoneId(0));
        assert_eq!(zone.allocate(1), Err(AllocError::OutOfMemory));
        assert!(zone.check_consistency());
    }

    #[test]
    fn test_free_errors() {
        let mut zone = small_zone();
        let block = zone.allocate(2).unwrap();

        let bogus = ZoneAllocation {
            zone: ZoneId(9),
            ..block
        };
        assert_eq!(zone.free(bogus), Err(FreeError::InvalidZone));

        zone.free(block).unwrap();
        assert_eq!(zone.free(block), Err(FreeError::DoubleFree));
        assert_eq!(zone.allocate(5), Err(AllocError::InvalidOrder));
        assert_eq!(zone.used_pages(), 0);
    }

    #[test]
    fn test_all_fast_zone_rejects_large_requests() {
        let mut zone = TestZone::with_config(
            BASE,
            ZoneConfig::default()
                .with_instance_count(2)
                .with_min_order(4)
                .with_fast_path_threshold(3)
                .with_fast_path_instances(2),
        );
        assert_eq!(zone.fast_path_count(), 2);
        assert_eq!(zone.slow_path_count(), 0);

        // Plenty of room, but only in fast regions.
        for order in 0..3 {
            assert_eq!(zone.allocate(order), Err(AllocError::OutOfMemory));
        }
        assert_eq!(zone.used_pages(), 0);

        let small = zone.allocate(3).unwrap();
        assert_eq!(zone.pool_of(small.zone), Some(Pool::FastPath));
        zone.free(small).unwrap();
        assert!(zone.check_consistency());
    }

    #[test]
    #[should_panic(expected = "region size overflows usize")]
    fn test_zone_region_size_wraps() {
        let _ = ZoneManager::<{ 1 << (usize::BITS - 4) }>::with_config(
            0,
            ZoneConfig::default()
                .with_instance_count(2)
                .with_min_order(20)
                .with_fast_path_threshold(4),
        );
    }

    #[test]
    fn test_single_instance_zone_has_no_fast_path() {
        let mut zone = TestZone::new(BASE, 1, 8);
        assert_eq!(zone.fast_path_count(), 0);
        let block = zone.allocate(10).unwrap();
        assert_eq!(block.zone, ZoneId(0));
        assert_eq!(block.address(), BASE);
        zone.free(block).unwrap();
    }
}
