//! Buddy Zone Allocator
//!
//! This crate implements a fixed-capacity buddy allocator over contiguous
//! memory regions, featuring:
//! - Bitmap-tree buddy allocator with order-granular alloc/free and coalescing
//! - All metadata kept outside the managed memory
//! - Zone manager with fast-path/slow-path pools and most-free-first selection
//! - Optional lock-protected zone for shared use
//!
//! Orders count tree depth: order 0 is a whole region, order `min_order` a
//! single page.

#![no_std]

extern crate alloc;

use core::fmt;

// Logging support - conditionally import log crate
#[cfg(feature = "log")]
extern crate log;

// Stub macros when log is disabled - these become no-ops
#[cfg(not(feature = "log"))]
macro_rules! error {
    ($($arg:tt)*) => {};
}
#[cfg(not(feature = "log"))]
macro_rules! warn {
    ($($arg:tt)*) => {};
}
#[cfg(not(feature = "log"))]
macro_rules! info {
    ($($arg:tt)*) => {};
}
#[cfg(not(feature = "log"))]
macro_rules! debug {
    ($($arg:tt)*) => {};
}

/// Default page size for backward compatibility
pub const DEFAULT_PAGE_SIZE: usize = 0x1000;

/// The error type used for allocation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AllocError {
    /// Requested order lies outside `[0, min_order]`.
    InvalidOrder,
    /// No free block at the requested order.
    OutOfMemory,
    /// The allocator was already initialized.
    AlreadyInitialized,
}

/// The error type used for deallocation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FreeError {
    /// The handle does not name a live block (wrong order, index or address).
    InvalidFree,
    /// The block is already free.
    DoubleFree,
    /// The handle names a region the zone does not have.
    InvalidZone,
}

impl fmt::Display for AllocError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AllocError::InvalidOrder => f.write_str("invalid order"),
            AllocError::OutOfMemory => f.write_str("out of memory"),
            AllocError::AlreadyInitialized => f.write_str("allocator already initialized"),
        }
    }
}

impl fmt::Display for FreeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FreeError::InvalidFree => f.write_str("block is not allocated"),
            FreeError::DoubleFree => f.write_str("block freed twice"),
            FreeError::InvalidZone => f.write_str("unknown zone"),
        }
    }
}

impl core::error::Error for AllocError {}
impl core::error::Error for FreeError {}

/// A [`Result`] type with [`AllocError`] as the error type.
pub type AllocResult<T = ()> = Result<T, AllocError>;

/// A [`Result`] type with [`FreeError`] as the error type.
pub type FreeResult<T = ()> = Result<T, FreeError>;

/// Order-granular allocator.
pub trait OrderAllocator {
    /// Handle needed to give a block back.
    type Block;

    /// Allocate one block of the given order.
    fn alloc_order(&mut self, order: usize) -> AllocResult<Self::Block>;

    /// Return a block obtained from [`alloc_order`](Self::alloc_order).
    fn free_block(&mut self, block: Self::Block) -> FreeResult;

    /// Returns the total number of memory pages.
    fn total_pages(&self) -> usize;

    /// Returns the number of allocated memory pages.
    fn used_pages(&self) -> usize;

    /// Returns the number of available memory pages.
    fn available_pages(&self) -> usize;
}

// Export our allocator implementations
pub mod buddy;
#[cfg(feature = "tracking")]
pub use buddy::BuddyStats;
pub use buddy::{Allocation, BuddyAllocator, FillMode, ZoneInfo, MAX_MIN_ORDER};

pub mod zone;
pub use zone::{Pool, ZoneAllocation, ZoneConfig, ZoneId, ZoneManager};

pub mod locked;
pub use locked::LockedZoneManager;
