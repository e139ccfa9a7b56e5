//! Shared, reference-counted peripheral mappings.
//!
//! PWM outputs and tachometers each need the TTC block, and either may need
//! the MIO block, without owning the other's lifetime. Every user takes a
//! [`PeripheralLease`]; the first lease maps the peripheral and dropping the
//! last one unmaps it.

use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use super::HardwareError;
use super::mio::{MIO_BASE, MIO_SIZE};
use super::regmap::{RegisterIo, WindowSource};
use super::ttc::{TTC_BASE, TTC_SIZE};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PeripheralKind {
    /// Both triple timer counters.
    TimerCounter,
    /// MIO pin configuration registers.
    PinMux,
}

impl PeripheralKind {
    pub fn base(self) -> u64 {
        match self {
            PeripheralKind::TimerCounter => TTC_BASE,
            PeripheralKind::PinMux => MIO_BASE,
        }
    }

    pub fn size(self) -> usize {
        match self {
            PeripheralKind::TimerCounter => TTC_SIZE,
            PeripheralKind::PinMux => MIO_SIZE,
        }
    }
}

impl fmt::Display for PeripheralKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PeripheralKind::TimerCounter => write!(f, "TTC"),
            PeripheralKind::PinMux => write!(f, "MIO"),
        }
    }
}

#[derive(Default)]
struct Slot {
    refs: usize,
    window: Option<Arc<dyn RegisterIo>>,
}

struct RegistryInner {
    source: Arc<dyn WindowSource>,
    timer_counter: Mutex<Slot>,
    pin_mux: Mutex<Slot>,
}

impl RegistryInner {
    fn slot(&self, kind: PeripheralKind) -> MutexGuard<'_, Slot> {
        let slot = match kind {
            PeripheralKind::TimerCounter => &self.timer_counter,
            PeripheralKind::PinMux => &self.pin_mux,
        };
        slot.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn release(&self, kind: PeripheralKind) {
        let mut slot = self.slot(kind);
        debug_assert!(slot.refs > 0, "{kind} released more often than acquired");
        slot.refs = slot.refs.saturating_sub(1);
        if slot.refs == 0 {
            slot.window = None;
            tracing::debug!("{} unmapped", kind);
        }
    }
}

/// The process's one handle on the TTC and MIO register blocks.
///
/// Cloning is cheap and shares the same mappings.
#[derive(Clone)]
pub struct PeripheralRegistry {
    inner: Arc<RegistryInner>,
}

impl PeripheralRegistry {
    pub fn new(source: Arc<dyn WindowSource>) -> Self {
        Self {
            inner: Arc::new(RegistryInner {
                source,
                timer_counter: Mutex::new(Slot::default()),
                pin_mux: Mutex::new(Slot::default()),
            }),
        }
    }

    /// Check out `kind`, mapping it if nobody else holds it.
    pub fn acquire(&self, kind: PeripheralKind) -> Result<PeripheralLease, HardwareError> {
        let mut slot = self.inner.slot(kind);
        let window = match &slot.window {
            Some(window) => window.clone(),
            None => {
                let window = self.inner.source.open(kind.base(), kind.size())?;
                tracing::debug!("{} mapped at {:#x}", kind, kind.base());
                slot.window = Some(window.clone());
                window
            }
        };
        slot.refs += 1;
        Ok(PeripheralLease {
            registry: self.inner.clone(),
            kind,
            window,
        })
    }

    /// Outstanding leases on `kind`.
    pub fn ref_count(&self, kind: PeripheralKind) -> usize {
        self.inner.slot(kind).refs
    }

    pub fn is_mapped(&self, kind: PeripheralKind) -> bool {
        self.inner.slot(kind).window.is_some()
    }
}

/// Access to one mapped peripheral for as long as the lease lives.
pub struct PeripheralLease {
    registry: Arc<RegistryInner>,
    kind: PeripheralKind,
    window: Arc<dyn RegisterIo>,
}

impl PeripheralLease {
    pub fn read32(&self, offset: usize) -> u32 {
        self.window.read32(offset)
    }

    pub fn write32(&self, offset: usize, value: u32) {
        self.window.write32(offset, value)
    }
}

impl Clone for PeripheralLease {
    fn clone(&self) -> Self {
        self.registry.slot(self.kind).refs += 1;
        Self {
            registry: self.registry.clone(),
            kind: self.kind,
            window: self.window.clone(),
        }
    }
}

impl Drop for PeripheralLease {
    fn drop(&mut self) {
        // The registry drops its reference here; ours goes right after, which
        // is what finally unmaps the window.
        self.registry.release(self.kind);
    }
}

impl fmt::Debug for PeripheralLease {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PeripheralLease").field("kind", &self.kind).finish()
    }
}
