//! Lock-protected zone manager.
//!
//! The zone manager itself is single-threaded. This wrapper serializes every
//! call so that choosing a region, allocating from it and re-sorting the pool
//! all happen inside one critical section.

use core::sync::atomic::{AtomicBool, Ordering};

use kspin::SpinNoIrq;

#[cfg(feature = "log")]
use log::{error, warn};

use crate::zone::{ZoneAllocation, ZoneConfig, ZoneManager};
use crate::{AllocError, AllocResult, FreeError, FreeResult};

/// Zone manager behind a `SpinNoIrq` lock, usable from a `static`.
pub struct LockedZoneManager<const PAGE_SIZE: usize = { crate::DEFAULT_PAGE_SIZE }> {
    inner: SpinNoIrq<Option<ZoneManager<PAGE_SIZE>>>,
    initialized: AtomicBool,
}

impl<const PAGE_SIZE: usize> LockedZoneManager<PAGE_SIZE> {
    pub const fn new() -> Self {
        Self {
            inner: SpinNoIrq::new(None),
            initialized: AtomicBool::new(false),
        }
    }

    /// Build the zone at `base_addr`. Can only be done once.
    pub fn init(&self, base_addr: usize, config: ZoneConfig) -> AllocResult {
        let mut inner = self.inner.lock();
        if inner.is_some() {
            warn!("locked zone: already initialized");
            return Err(AllocError::AlreadyInitialized);
        }
        *inner = Some(ZoneManager::with_config(base_addr, config));
        self.initialized.store(true, Ordering::SeqCst);
        Ok(())
    }

    pub fn is_initialized(&self) -> bool {
        self.initialized.load(Ordering::SeqCst)
    }

    pub fn allocate(&self, order: usize) -> AllocResult<ZoneAllocation> {
        match self.inner.lock().as_mut() {
            Some(zone) => zone.allocate(order),
            None => {
                error!("locked zone: allocate before init");
                Err(AllocError::OutOfMemory)
            }
        }
    }

    pub fn free(&self, allocation: ZoneAllocation) -> FreeResult {
        match self.inner.lock().as_mut() {
            Some(zone) => zone.free(allocation),
            None => {
                error!("locked zone: free before init");
                Err(FreeError::InvalidZone)
            }
        }
    }

    pub fn available_pages(&self) -> usize {
        self.inner
            .lock()
            .as_ref()
            .map_or(0, |zone| zone.available_pages())
    }

    /// Run `f` with exclusive access to the zone, if initialized.
    pub fn with<R>(&self, f: impl FnOnce(&mut ZoneManager<PAGE_SIZE>) -> R) -> Option<R> {
        self.inner.lock().as_mut().map(f)
    }
}

impl<const PAGE_SIZE: usize> Default for LockedZoneManager<PAGE_SIZE> {
    fn default() -> Self {
        Self::new()
    }
}
