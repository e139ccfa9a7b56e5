//! The fan controller: PWM outputs and tachometers for one board.

use std::sync::Arc;

use super::command::{parse_duty, shutdown_active};
use super::topology::{BoardTopology, OutputLayout, SensorLayout};
use super::{DutyPolicy, FanError};
use crate::communication::{Command, Telemetry, TelemetryPort};
use crate::hardware::{
    ChannelAddress, HardwareError, PeripheralRegistry, PwmChannel, PwmClock, PwmConfig, Tachometer,
    TachometerConfig,
};
use crate::scheduler::TimeInterface;

/// Duty every output starts at, before any command is accepted.
pub const STARTUP_DUTY: u8 = 100;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ControllerSettings {
    pub topology: BoardTopology,
    /// cpu_1x frequency, the PWM timer clock.
    pub pclk_hz: u64,
    pub pwm_hz: u32,
    pub policy: DutyPolicy,
    pub invert: bool,
}

/// Configure the PWM timer for `layout` at `settings.pwm_hz`, stopped.
pub(crate) fn open_output(
    registry: &PeripheralRegistry,
    layout: &OutputLayout,
    settings: &ControllerSettings,
) -> Result<PwmChannel, HardwareError> {
    let config = PwmConfig {
        address: ChannelAddress::new(layout.instance, layout.timer)?,
        clock: PwmClock::CpuOneX,
        prescale_shift: 0,
        invert: settings.invert,
        pin: layout.pin,
    };
    let mut pwm = PwmChannel::configure(registry, config, settings.pclk_hz)?;
    pwm.set_frequency(settings.pwm_hz)?;
    Ok(pwm)
}

fn open_sensor(
    registry: &PeripheralRegistry,
    layout: &SensorLayout,
    clock: Arc<dyn TimeInterface>,
) -> Result<Tachometer, HardwareError> {
    let config = TachometerConfig {
        address: ChannelAddress::new(layout.instance, layout.timer)?,
        pin: layout.pin,
    };
    Tachometer::configure(registry, config, clock)
}

#[derive(Debug)]
struct Output {
    name: &'static str,
    pwm: PwmChannel,
    duty: u8,
}

#[derive(Debug)]
struct Sensor {
    name: &'static str,
    tachometer: Tachometer,
    rpm: Option<u32>,
}

/// Owns every fan channel of the board.
///
/// All register access happens through `&mut self`, so commands and polling
/// are serialized by whoever drives the controller.
#[derive(Debug)]
pub struct FanController<P: TelemetryPort> {
    topology: BoardTopology,
    policy: DutyPolicy,
    outputs: Vec<Output>,
    sensors: Vec<Sensor>,
    port: P,
    shutting_down: bool,
}

impl<P: TelemetryPort> FanController<P> {
    /// Bring up every output at full duty, publish the minimum duty, and
    /// take a baseline on every tachometer.
    pub fn new(
        registry: &PeripheralRegistry,
        settings: ControllerSettings,
        port: P,
        clock: Arc<dyn TimeInterface>,
    ) -> Result<Self, FanError> {
        let topology = settings.topology;
        let mut controller = Self {
            topology,
            policy: settings.policy,
            outputs: Vec::with_capacity(topology.outputs().len()),
            sensors: Vec::with_capacity(topology.sensors().len()),
            port,
            shutting_down: false,
        };

        for layout in topology.outputs() {
            let pwm = open_output(registry, layout, &settings)?;
            controller.outputs.push(Output {
                name: layout.name,
                pwm,
                duty: 0,
            });
            let index = controller.outputs.len() - 1;
            controller.write_duty(index, STARTUP_DUTY)?;
            controller.outputs[index].pwm.start();
        }

        for output in &controller.outputs {
            controller.port.publish(Telemetry::MinDuty {
                output: output.name,
                percent: settings.policy.min_duty,
            })?;
        }

        for layout in topology.sensors() {
            controller.sensors.push(Sensor {
                name: layout.name,
                tachometer: open_sensor(registry, layout, clock.clone())?,
                rpm: None,
            });
        }

        tracing::info!(
            "{} board up: {} outputs at {}%, {} tachometers, minimum duty {}%{}",
            topology,
            controller.outputs.len(),
            STARTUP_DUTY,
            controller.sensors.len(),
            settings.policy.min_duty,
            if settings.policy.force { " (not enforced)" } else { "" }
        );
        Ok(controller)
    }

    fn write_duty(&mut self, index: usize, percent: u8) -> Result<(), FanError> {
        let output = &mut self.outputs[index];
        output.pwm.set_duty_percent(percent)?;
        output.duty = percent;
        self.port.publish(Telemetry::Duty {
            output: output.name,
            percent,
        })?;
        Ok(())
    }

    /// Apply a requested duty to `output`, subject to the minimum-duty
    /// policy. Ignored while shutting down, for unknown outputs, and for
    /// values above 100.
    pub fn set_duty(&mut self, output: &str, requested: u8) -> Result<(), FanError> {
        if self.shutting_down {
            tracing::debug!("{}: duty {} ignored while shutting down", output, requested);
            return Ok(());
        }
        if requested > 100 {
            tracing::warn!("{}: duty {} out of range", output, requested);
            return Ok(());
        }
        let Some(index) = self.outputs.iter().position(|o| o.name == output) else {
            tracing::warn!("no fan output named {:?}", output);
            return Ok(());
        };
        let duty = self.policy.effective(requested);
        if duty != requested {
            tracing::debug!("{}: duty {} raised to {}", output, requested, duty);
        }
        self.write_duty(index, duty)
    }

    /// Parse and apply a duty-set payload. Malformed payloads are logged and
    /// dropped.
    pub fn handle_duty_command(&mut self, output: &str, payload: &[u8]) -> Result<(), FanError> {
        if self.shutting_down {
            return Ok(());
        }
        match parse_duty(payload) {
            Ok(duty) => self.set_duty(output, duty),
            Err(e) => {
                tracing::warn!("{}: {}", output, e);
                Ok(())
            }
        }
    }

    /// Set or clear the shutdown latch. Setting it drives every output to
    /// 100%; clearing it leaves duties where they are.
    pub fn shutdown(&mut self, active: bool) -> Result<(), FanError> {
        if active != self.shutting_down {
            tracing::info!("shutdown {}", if active { "requested" } else { "cancelled" });
        }
        self.shutting_down = active;
        if active {
            for index in 0..self.outputs.len() {
                self.write_duty(index, 100)?;
            }
        }
        Ok(())
    }

    pub fn handle(&mut self, command: Command) -> Result<(), FanError> {
        match command {
            Command::SetDuty { output, payload } => self.handle_duty_command(output, &payload),
            Command::Shutdown { payload } => self.shutdown(shutdown_active(&payload)),
        }
    }

    /// Sample every tachometer and publish the readings.
    pub fn poll_tick(&mut self) -> Result<(), FanError> {
        for sensor in &mut self.sensors {
            let rpm = sensor.tachometer.sample().round() as u32;
            sensor.rpm = Some(rpm);
            self.port.publish(Telemetry::Rpm {
                sensor: sensor.name,
                rpm,
            })?;
        }
        Ok(())
    }

    pub fn topology(&self) -> BoardTopology {
        self.topology
    }

    pub fn is_shutting_down(&self) -> bool {
        self.shutting_down
    }

    pub fn output_names(&self) -> impl Iterator<Item = &'static str> + '_ {
        self.outputs.iter().map(|o| o.name)
    }

    pub fn sensor_names(&self) -> impl Iterator<Item = &'static str> + '_ {
        self.sensors.iter().map(|s| s.name)
    }

    /// Last duty written to `output`.
    pub fn duty(&self, output: &str) -> Option<u8> {
        self.outputs.iter().find(|o| o.name == output).map(|o| o.duty)
    }

    /// Last published reading of `sensor`.
    pub fn rpm(&self, sensor: &str) -> Option<u32> {
        self.sensors.iter().find(|s| s.name == sensor).and_then(|s| s.rpm)
    }

    pub fn port(&self) -> &P {
        &self.port
    }

    pub fn port_mut(&mut self) -> &mut P {
        &mut self.port
    }
}
