//! Clock abstraction for code that measures elapsed wall time.

pub mod std_time_sync;

use std::sync::Mutex;
use std::time::{Duration, SystemTime};

pub use std_time_sync::StdTimeSync;

pub trait TimeInterface: Send + Sync {
    /// Current wall-clock time. May step backwards.
    fn now_wallclock(&self) -> SystemTime;
}

/// A clock that only moves when told to.
#[derive(Debug)]
pub struct ManualClock {
    now: Mutex<SystemTime>,
}

impl ManualClock {
    pub fn new(start: SystemTime) -> Self {
        Self { now: Mutex::new(start) }
    }

    pub fn advance(&self, by: Duration) {
        let mut now = self.now.lock().unwrap_or_else(|e| e.into_inner());
        *now += by;
    }

    pub fn rewind(&self, by: Duration) {
        let mut now = self.now.lock().unwrap_or_else(|e| e.into_inner());
        *now -= by;
    }
}

impl Default for ManualClock {
    fn default() -> Self {
        Self::new(SystemTime::UNIX_EPOCH + Duration::from_secs(1_600_000_000))
    }
}

impl TimeInterface for ManualClock {
    fn now_wallclock(&self) -> SystemTime {
        *self.now.lock().unwrap_or_else(|e| e.into_inner())
    }
}
