//! Fan and sensor layout per board generation.

use std::fmt;

use serde::{Deserialize, Serialize};

/// A PWM output driving one or more fans.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OutputLayout {
    pub name: &'static str,
    pub instance: u8,
    pub timer: u8,
    pub pin: u8,
}

/// A tachometer input. `pin` is `None` for EMIO routing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SensorLayout {
    pub name: &'static str,
    pub instance: u8,
    pub timer: u8,
    pub pin: Option<u8>,
}

const fn output(name: &'static str, instance: u8, pin: u8) -> OutputLayout {
    OutputLayout {
        name,
        instance,
        timer: 0,
        pin,
    }
}

const fn sensor(name: &'static str, instance: u8, timer: u8) -> SensorLayout {
    SensorLayout {
        name,
        instance,
        timer,
        pin: None,
    }
}

const TWO_FAN_OUTPUTS: [OutputLayout; 2] = [output("left", 0, 30), output("right", 1, 28)];
const TWO_FAN_SENSORS: [SensorLayout; 2] = [sensor("right", 0, 1), sensor("left", 1, 1)];

const FOUR_SENSOR_OUTPUTS: [OutputLayout; 2] = [output("front", 0, 30), output("rear", 1, 28)];
const FOUR_SENSOR_SENSORS: [SensorLayout; 4] = [
    sensor("front-1", 0, 1),
    sensor("front-2", 1, 1),
    sensor("rear-1", 0, 2),
    sensor("rear-2", 1, 2),
];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum BoardTopology {
    /// Generations 0 and 1: left and right fans, one tachometer each.
    TwoFan,
    /// Generation 2: front and rear outputs, two tachometers each.
    FourSensor,
}

impl BoardTopology {
    pub fn from_generation(generation: u8) -> Option<Self> {
        match generation {
            0 | 1 => Some(BoardTopology::TwoFan),
            2 => Some(BoardTopology::FourSensor),
            _ => None,
        }
    }

    pub fn outputs(self) -> &'static [OutputLayout] {
        match self {
            BoardTopology::TwoFan => &TWO_FAN_OUTPUTS,
            BoardTopology::FourSensor => &FOUR_SENSOR_OUTPUTS,
        }
    }

    pub fn sensors(self) -> &'static [SensorLayout] {
        match self {
            BoardTopology::TwoFan => &TWO_FAN_SENSORS,
            BoardTopology::FourSensor => &FOUR_SENSOR_SENSORS,
        }
    }

    pub fn output(self, name: &str) -> Option<&'static OutputLayout> {
        self.outputs().iter().find(|o| o.name == name)
    }
}

impl fmt::Display for BoardTopology {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BoardTopology::TwoFan => write!(f, "2-fan"),
            BoardTopology::FourSensor => write!(f, "4-sensor"),
        }
    }
}
