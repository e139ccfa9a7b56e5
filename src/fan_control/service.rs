//! Async driver for a [`FanController`].
//!
//! A single task owns the controller. Tachometers are polled on a fixed
//! interval and commands arrive through a bounded queue, so register access
//! never happens from two places at once.

use std::time::Duration;

use tokio::sync::mpsc;
use tokio::time::{Instant, MissedTickBehavior, interval_at};

use super::{FanController, FanError};
use crate::communication::{Command, TelemetryPort};

pub struct FanService<P: TelemetryPort> {
    controller: FanController<P>,
    commands: mpsc::Receiver<Command>,
    poll_interval: Duration,
}

impl<P: TelemetryPort> FanService<P> {
    pub fn new(
        controller: FanController<P>,
        commands: mpsc::Receiver<Command>,
        poll_interval: Duration,
    ) -> Self {
        Self {
            controller,
            commands,
            poll_interval,
        }
    }

    pub fn controller(&self) -> &FanController<P> {
        &self.controller
    }

    /// Run until a fatal error. The first poll happens one interval after
    /// start so the tachometers have something to measure.
    pub async fn run(&mut self) -> Result<(), FanError> {
        let mut ticker = interval_at(Instant::now() + self.poll_interval, self.poll_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        tracing::info!("polling tachometers every {:?}", self.poll_interval);

        loop {
            tokio::select! {
                _ = ticker.tick() => self.controller.poll_tick()?,
                command = self.commands.recv() => match command {
                    Some(command) => {
                        tracing::debug!("command {:?}", command);
                        self.controller.handle(command)?;
                    }
                    None => return Err(FanError::TransportClosed),
                },
            }
        }
    }
}
