//! Boundary between the fan controller and the message bus.
//!
//! The controller only sees [`TelemetryPort`] for outbound values and
//! receives [`Command`]s from whatever task owns the transport.

pub mod mqtt;

use thiserror::Error;

/// An outbound value. Channels are named after the board topology entries
/// ("left", "front", "front-1", ...).
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Telemetry {
    /// Current commanded duty of an output, in percent.
    Duty { output: &'static str, percent: u8 },
    /// Minimum duty enforced on an output, emitted once at startup.
    MinDuty { output: &'static str, percent: u8 },
    /// Latest tachometer reading, rounded.
    Rpm { sensor: &'static str, rpm: u32 },
}

/// An inbound request, with its payload still unparsed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    SetDuty { output: &'static str, payload: Vec<u8> },
    Shutdown { payload: Vec<u8> },
}

#[derive(Debug, Error)]
pub enum PortError {
    #[error("transport rejected publish to {topic}: {reason}")]
    Rejected { topic: String, reason: String },
    #[error("transport is closed")]
    Closed,
}

pub trait TelemetryPort: Send {
    fn publish(&mut self, telemetry: Telemetry) -> Result<(), PortError>;
}

/// Keeps every published value. Used off-target and in tests.
#[derive(Debug, Default, Clone)]
pub struct RecordingPort {
    published: Vec<Telemetry>,
    fail: bool,
}

impl RecordingPort {
    pub fn new() -> Self {
        Self::default()
    }

    /// Refuse every subsequent publish with [`PortError::Closed`].
    pub fn fail_publishes(&mut self) {
        self.fail = true;
    }

    pub fn published(&self) -> &[Telemetry] {
        &self.published
    }

    pub fn take(&mut self) -> Vec<Telemetry> {
        std::mem::take(&mut self.published)
    }

    /// Last duty published for `output`.
    pub fn last_duty(&self, output: &str) -> Option<u8> {
        self.published.iter().rev().find_map(|t| match t {
            Telemetry::Duty { output: o, percent } if *o == output => Some(*percent),
            _ => None,
        })
    }
}

impl TelemetryPort for RecordingPort {
    fn publish(&mut self, telemetry: Telemetry) -> Result<(), PortError> {
        if self.fail {
            return Err(PortError::Closed);
        }
        tracing::debug!("publish {:?}", telemetry);
        self.published.push(telemetry);
        Ok(())
    }
}
