//! Multiplexed I/O pins (PS side).

use arbitrary_int::{u3, u7};

use super::HardwareError;
use super::registry::{PeripheralKind, PeripheralLease, PeripheralRegistry};

pub const MIO_BASE: u64 = 0xF800_0700;
pub const MIO_SIZE: usize = MIO_PIN_COUNT as usize * 4;
pub const MIO_PIN_COUNT: u8 = 54;

/// I/O standard of a pin.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum IoType {
    Lvcmos18 = 1,
    Lvcmos25 = 2,
    Lvcmos33 = 3,
    Hstl = 4,
}

/// Signal routed to a pin, as the raw L0..L3 select bits.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MioFunction {
    Gpio,
    /// TTC waveform output.
    Wave,
    /// TTC external clock input.
    TtcClock,
}

impl MioFunction {
    pub fn select(self) -> u7 {
        match self {
            MioFunction::Gpio => u7::new(0),
            // L3_SEL = 0b110; the same encoding serves both directions
            MioFunction::Wave | MioFunction::TtcClock => u7::new(6 << 4),
        }
    }
}

/// MIO_PIN_xx control word.
#[bitbybit::bitfield(u32, default = 0x0, debug)]
pub struct MioPin {
    #[bit(13, rw)]
    disable_hstl_rcvr: bool,
    #[bit(12, rw)]
    pullup: bool,
    #[bits(9..=11, rw)]
    io_type: u3,
    #[bit(8, rw)]
    fast: bool,
    /// L0_SEL..L3_SEL.
    #[bits(1..=7, rw)]
    select: u7,
    /// Output tri-state; set for input pins.
    #[bit(0, rw)]
    tri_enable: bool,
}

impl MioPin {
    pub fn with_io_standard(self, io: IoType) -> Self {
        self.with_io_type(u3::new(io as u8))
    }
}

/// Routes peripheral signals to MIO pins.
#[derive(Debug, Clone)]
pub struct PinMux {
    lease: PeripheralLease,
}

impl PinMux {
    pub fn open(registry: &PeripheralRegistry) -> Result<Self, HardwareError> {
        Ok(Self {
            lease: registry.acquire(PeripheralKind::PinMux)?,
        })
    }

    fn offset(pin: u8) -> Result<usize, HardwareError> {
        if pin >= MIO_PIN_COUNT {
            return Err(HardwareError::NoSuchPin(pin));
        }
        Ok(usize::from(pin) * 4)
    }

    pub fn pin(&self, pin: u8) -> Result<MioPin, HardwareError> {
        Ok(MioPin::new_with_raw_value(self.lease.read32(Self::offset(pin)?)))
    }

    /// Read-modify-write of one pin's control word.
    pub fn modify(&self, pin: u8, f: impl FnOnce(MioPin) -> MioPin) -> Result<(), HardwareError> {
        let offset = Self::offset(pin)?;
        let old = MioPin::new_with_raw_value(self.lease.read32(offset));
        let new = f(old);
        tracing::debug!("MIO{} {:#06x} -> {:#06x}", pin, old.raw_value(), new.raw_value());
        self.lease.write32(offset, new.raw_value());
        Ok(())
    }

    /// Select `function` on `pin`, leaving every other field as it was.
    pub fn route(&self, pin: u8, function: MioFunction) -> Result<(), HardwareError> {
        self.modify(pin, |p| p.with_select(function.select()))
    }

    /// Route an external clock input and tri-state the pin's output driver.
    pub fn route_input(&self, pin: u8, function: MioFunction) -> Result<(), HardwareError> {
        self.modify(pin, |p| p.with_select(function.select()).with_tri_enable(true))
    }
}
