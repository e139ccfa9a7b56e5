//! In-memory register bus.
//!
//! Stands in for `/dev/mem` off-target and in tests. Register contents live
//! per physical base address and survive a close/reopen, as real hardware
//! does. Opens can be made to fail to exercise mapping errors.

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicU32, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

use super::HardwareError;
use super::regmap::{RegisterIo, WindowSource};

/// Backing store for one simulated peripheral.
#[derive(Debug)]
pub struct SimRegion {
    words: Vec<AtomicU32>,
}

impl SimRegion {
    fn new(size: usize) -> Self {
        Self {
            words: (0..size.div_ceil(4)).map(|_| AtomicU32::new(0)).collect(),
        }
    }

    pub fn peek(&self, offset: usize) -> u32 {
        self.words[offset / 4].load(Ordering::SeqCst)
    }

    pub fn poke(&self, offset: usize, value: u32) {
        self.words[offset / 4].store(value, Ordering::SeqCst);
    }
}

struct SimWindow {
    region: Arc<SimRegion>,
    live: Arc<AtomicUsize>,
}

impl RegisterIo for SimWindow {
    fn read32(&self, offset: usize) -> u32 {
        assert!(offset % 4 == 0, "register offset {offset:#x} is not word aligned");
        self.region.peek(offset)
    }

    fn write32(&self, offset: usize, value: u32) {
        assert!(offset % 4 == 0, "register offset {offset:#x} is not word aligned");
        self.region.poke(offset, value);
    }
}

impl Drop for SimWindow {
    fn drop(&mut self) {
        self.live.fetch_sub(1, Ordering::SeqCst);
    }
}

#[derive(Default)]
pub struct SimBus {
    regions: Mutex<HashMap<u64, Arc<SimRegion>>>,
    failing: Mutex<HashSet<u64>>,
    opens: AtomicUsize,
    live: Arc<AtomicUsize>,
}

impl SimBus {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every later open of `phys_addr` fail.
    pub fn fail_open(&self, phys_addr: u64) {
        self.failing
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(phys_addr);
    }

    /// Register contents for the peripheral at `phys_addr`, once opened.
    pub fn region(&self, phys_addr: u64) -> Option<Arc<SimRegion>> {
        self.regions
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&phys_addr)
            .cloned()
    }

    /// Number of successful opens so far.
    pub fn open_count(&self) -> usize {
        self.opens.load(Ordering::SeqCst)
    }

    /// Number of windows not yet dropped.
    pub fn live_windows(&self) -> usize {
        self.live.load(Ordering::SeqCst)
    }
}

impl WindowSource for SimBus {
    fn open(&self, phys_addr: u64, size: usize) -> Result<Arc<dyn RegisterIo>, HardwareError> {
        if self
            .failing
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .contains(&phys_addr)
        {
            return Err(HardwareError::Map {
                addr: phys_addr,
                source: std::io::Error::from_raw_os_error(libc::EPERM),
            });
        }
        let region = self
            .regions
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .entry(phys_addr)
            .or_insert_with(|| Arc::new(SimRegion::new(size)))
            .clone();
        self.opens.fetch_add(1, Ordering::SeqCst);
        self.live.fetch_add(1, Ordering::SeqCst);
        tracing::debug!("simulated window {:#x}+{:#x}", phys_addr, size);
        Ok(Arc::new(SimWindow {
            region,
            live: self.live.clone(),
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_contents_survive_reopen() {
        let bus = SimBus::new();
        let window = bus.open(0x1000, 0x10).unwrap();
        window.write32(0x8, 0xdead_beef);
        drop(window);
        assert_eq!(bus.live_windows(), 0);

        let window = bus.open(0x1000, 0x10).unwrap();
        assert_eq!(window.read32(0x8), 0xdead_beef);
        assert_eq!(bus.open_count(), 2);
    }

    #[test]
    fn test_fail_open() {
        let bus = SimBus::new();
        bus.fail_open(0x2000);
        assert!(matches!(bus.open(0x2000, 4), Err(HardwareError::Map { addr: 0x2000, .. })));
        assert!(bus.region(0x2000).is_none());
    }
}
