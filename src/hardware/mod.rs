//! Register-level access to the Zynq TTC and MIO blocks, and the PWM and
//! tachometer channels built on them.

pub mod mio;
pub mod pwm;
pub mod regmap;
pub mod registry;
pub mod sim;
pub mod tachometer;
pub mod ttc;

use std::path::PathBuf;

use thiserror::Error;

pub use mio::{MioFunction, PinMux};
pub use pwm::{PwmChannel, PwmClock, PwmConfig};
pub use regmap::{DevMem, RegisterIo, RegisterWindow, WindowSource};
pub use registry::{PeripheralKind, PeripheralLease, PeripheralRegistry};
pub use sim::SimBus;
pub use tachometer::{Tachometer, TachometerConfig};
pub use ttc::{ChannelAddress, TimerChannel};

#[derive(Debug, Error)]
pub enum HardwareError {
    #[error("{}: {source}", .path.display())]
    DeviceOpen {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("mmap of {addr:#x} failed: {source}")]
    Map {
        addr: u64,
        #[source]
        source: std::io::Error,
    },
    #[error("munmap failed: {0}")]
    Unmap(#[source] std::io::Error),
    #[error("TTC must be 0 or 1, not {0}")]
    NoSuchTtc(u8),
    #[error("TTC timer must be 0, 1, or 2, not {0}")]
    NoSuchTimer(u8),
    #[error("MIO pin {0} does not exist")]
    NoSuchPin(u8),
    #[error("PWM on TTC{instance}: MIO must be {}, not {pin}", pin_list(.legal))]
    IllegalPwmPin {
        instance: u8,
        pin: u8,
        legal: &'static [u8],
    },
    #[error("tachometer on TTC{instance}: MIO must be 0 (EMIO), {}, not {pin}", pin_list(.legal))]
    IllegalTachometerPin {
        instance: u8,
        pin: u8,
        legal: &'static [u8],
    },
    #[error("for MIO, timer must be 0, not {0}")]
    MioClockOnTimer(u8),
    #[error("prescaler shift must be 0..=16, not {0}")]
    InvalidPrescale(u8),
    #[error("{hz} Hz is out of range for a {clock_hz} Hz timer clock")]
    FrequencyOutOfRange { hz: u32, clock_hz: u64 },
    #[error("duty cycle {0} outside 0.0..=1.0")]
    InvalidDuty(f64),
}

fn pin_list(pins: &[u8]) -> String {
    match pins {
        [] => String::new(),
        [only] => only.to_string(),
        [init @ .., last] => {
            let init: Vec<String> = init.iter().map(u8::to_string).collect();
            format!("{}, or {}", init.join(", "), last)
        }
    }
}
