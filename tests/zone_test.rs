//! Integration tests for the zone manager
//!
//! Covers pool routing, most-free-first selection and the locked wrapper.

#![no_std]

extern crate alloc;
extern crate buddy_zone_allocator;

use alloc::vec::Vec;
use buddy_zone_allocator::{
    AllocError, FreeError, LockedZoneManager, Pool, ZoneAllocation, ZoneConfig, ZoneId,
    ZoneManager,
};
use core::alloc::Layout;

const PAGE_SIZE: usize = 0x1000;
const MIN_ORDER: usize = 6; // 64 pages per region
const INSTANCES: usize = 6;
const THRESHOLD: usize = 4; // blocks of 4 pages or less are small
const TEST_HEAP_SIZE: usize = (PAGE_SIZE << MIN_ORDER) * INSTANCES;

static LOCKED_ZONE: LockedZoneManager<PAGE_SIZE> = LockedZoneManager::new();

/// Allocate test memory using system allocator
fn alloc_test_heap(size: usize) -> (*mut u8, Layout) {
    let layout = Layout::from_size_align(size, PAGE_SIZE).unwrap();
    let ptr = unsafe { alloc::alloc::alloc(layout) };
    assert!(!ptr.is_null(), "Failed to allocate test heap");
    (ptr, layout)
}

/// Deallocate test memory
fn dealloc_test_heap(ptr: *mut u8, layout: Layout) {
    unsafe { alloc::alloc::dealloc(ptr, layout) };
}

fn test_config() -> ZoneConfig {
    ZoneConfig::default()
        .with_instance_count(INSTANCES)
        .with_min_order(MIN_ORDER)
        .with_fast_path_threshold(THRESHOLD)
        .with_fast_path_instances(2)
}

#[test]
fn test_zone_serves_real_memory() {
    let (heap_ptr, heap_layout) = alloc_test_heap(TEST_HEAP_SIZE);
    let heap_addr = heap_ptr as usize;

    let mut zone = ZoneManager::<PAGE_SIZE>::with_config(heap_addr, test_config());
    let mut blocks = Vec::new();
    for order in [MIN_ORDER, 2, 5, 0, 3, MIN_ORDER, 1] {
        let block = zone.allocate(order).unwrap();
        let size = PAGE_SIZE << (MIN_ORDER - order);
        assert!(block.address() >= heap_addr);
        assert!(block.address() + size <= heap_addr + TEST_HEAP_SIZE);
        assert_eq!(zone.find_zone_for_addr(block.address()), Some(block.zone));
        unsafe { core::ptr::write_bytes(block.address() as *mut u8, 0x5a, size) };
        blocks.push(block);
    }
    assert!(zone.check_consistency());

    for block in blocks {
        zone.free(block).unwrap();
    }
    assert_eq!(zone.used_pages(), 0);
    assert!(zone.check_consistency());

    dealloc_test_heap(heap_ptr, heap_layout);
}

#[test]
fn test_routing_by_size() {
    let mut zone = ZoneManager::<PAGE_SIZE>::with_config(0x4000_0000, test_config());
    let fast_pages = 2 << MIN_ORDER;

    let mut small = Vec::new();
    let mut large = Vec::new();
    for i in 0..fast_pages {
        let block = zone.allocate(MIN_ORDER).unwrap();
        assert_eq!(zone.pool_of(block.zone), Some(Pool::FastPath), "page {}", i);
        small.push(block);

        if i % 16 == 0 {
            let big = zone.allocate(THRESHOLD - 1).unwrap();
            assert_eq!(zone.pool_of(big.zone), Some(Pool::SlowPath));
            large.push(big);
        }
    }

    // Fast pool is full now; small requests spill into the slow pool.
    let spilled = zone.allocate(THRESHOLD).unwrap();
    assert_eq!(zone.pool_of(spilled.zone), Some(Pool::SlowPath));

    // Large requests never touch fast regions, even when those have room.
    zone.free(small.pop().unwrap()).unwrap();
    zone.free(small.pop().unwrap()).unwrap();
    while let Ok(big) = zone.allocate(1) {
        assert_eq!(zone.pool_of(big.zone), Some(Pool::SlowPath));
        large.push(big);
    }
    assert_eq!(large.len(), 8 + 4);
    let fast_used: usize = [ZoneId::from_index(0), ZoneId::from_index(1)]
        .iter()
        .map(|&id| zone.instance(id).unwrap().used_pages())
        .sum();
    assert_eq!(fast_used, fast_pages - 2);
    assert!(zone.check_consistency());
}

#[test]
fn test_most_free_first() {
    let mut zone = ZoneManager::<PAGE_SIZE>::with_config(
        0x4000_0000,
        test_config().with_fast_path_instances(0),
    );

    // Equal capacity: creation order decides, and every region gets one
    // block before any region gets a second.
    let mut blocks = Vec::new();
    for expected in 0..INSTANCES {
        let block = zone.allocate(2).unwrap();
        assert_eq!(block.zone, ZoneId::from_index(expected));
        blocks.push(block);
    }
    assert_eq!(zone.allocate(2).unwrap().zone, ZoneId::from_index(0));

    // Emptying region 3 makes it the head again.
    zone.free(blocks[3]).unwrap();
    assert_eq!(
        zone.instances_by_capacity(Pool::SlowPath)[0],
        ZoneId::from_index(3)
    );
    assert_eq!(zone.allocate(MIN_ORDER).unwrap().zone, ZoneId::from_index(3));
    assert!(zone.check_consistency());
}

#[test]
fn test_zone_errors() {
    let mut zone = ZoneManager::<PAGE_SIZE>::with_config(0x4000_0000, test_config());
    assert_eq!(zone.allocate(MIN_ORDER + 1), Err(AllocError::InvalidOrder));

    let block = zone.allocate(1).unwrap();
    let foreign = ZoneAllocation {
        zone: ZoneId::from_index(INSTANCES),
        ..block
    };
    assert_eq!(zone.free(foreign), Err(FreeError::InvalidZone));

    // Right region id, wrong region for the block.
    let other = ZoneAllocation {
        zone: ZoneId::from_index(if block.zone.index() == 2 { 3 } else { 2 }),
        ..block
    };
    assert_eq!(zone.free(other), Err(FreeError::InvalidFree));

    zone.free(block).unwrap();
    assert_eq!(zone.free(block), Err(FreeError::DoubleFree));
}

#[test]
fn test_locked_zone() {
    let (heap_ptr, heap_layout) = alloc_test_heap(TEST_HEAP_SIZE);
    let heap_addr = heap_ptr as usize;

    assert_eq!(LOCKED_ZONE.init(heap_addr, test_config()), Ok(()));
    assert_eq!(
        LOCKED_ZONE.init(heap_addr, test_config()),
        Err(AllocError::AlreadyInitialized)
    );

    let total = LOCKED_ZONE.available_pages();
    let block = LOCKED_ZONE.allocate(MIN_ORDER).unwrap();
    assert_eq!(LOCKED_ZONE.available_pages(), total - 1);
    LOCKED_ZONE.free(block).unwrap();
    assert_eq!(LOCKED_ZONE.available_pages(), total);
    assert_eq!(LOCKED_ZONE.with(|zone| zone.check_consistency()), Some(true));

    dealloc_test_heap(heap_ptr, heap_layout);
}
