//! Fan control: duty policy, board topology and the control loop.

pub mod command;
pub mod controller;
pub mod manual;
pub mod service;
pub mod topology;

use thiserror::Error;

use crate::communication::PortError;
use crate::hardware::HardwareError;

pub use command::{CommandError, parse_duty, shutdown_active};
pub use controller::{ControllerSettings, FanController};
pub use service::FanService;
pub use topology::BoardTopology;

/// Below this duty fans may stall or fail to spin up.
pub const DEFAULT_MIN_DUTY: u8 = 30;

#[derive(Debug, Error)]
pub enum FanError {
    #[error(transparent)]
    Hardware(#[from] HardwareError),
    #[error(transparent)]
    Publish(#[from] PortError),
    #[error("command queue closed")]
    TransportClosed,
}

/// Raises non-zero duties below `min_duty` unless `force` is set.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DutyPolicy {
    pub min_duty: u8,
    pub force: bool,
}

impl Default for DutyPolicy {
    fn default() -> Self {
        Self {
            min_duty: DEFAULT_MIN_DUTY,
            force: false,
        }
    }
}

impl DutyPolicy {
    pub fn effective(&self, requested: u8) -> u8 {
        if requested == 0 || requested >= self.min_duty || self.force {
            requested
        } else {
            self.min_duty
        }
    }
}
