//! One-shot local mode: set the first output once, without a message bus.

use super::controller::{ControllerSettings, open_output};
use super::FanError;
use crate::hardware::{PeripheralRegistry, PwmChannel};

/// Configure and start the first output of the board at `duty` percent,
/// after the minimum-duty policy. The returned channel keeps the peripherals
/// mapped; the output keeps running after it is dropped.
pub fn apply(
    registry: &PeripheralRegistry,
    settings: &ControllerSettings,
    duty: u8,
) -> Result<PwmChannel, FanError> {
    let layout = &settings.topology.outputs()[0];
    let effective = settings.policy.effective(duty);
    let mut pwm = open_output(registry, layout, settings)?;
    pwm.set_duty_percent(effective)?;
    pwm.start();
    tracing::info!("{} fan set to {}%", layout.name, effective);
    Ok(pwm)
}
