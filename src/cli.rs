//! Command line.

use std::path::PathBuf;

use clap::Parser;

use crate::config::{
    Backend, Config, MAX_POLL_INTERVAL_SECS, MIN_POLL_INTERVAL_SECS, poll_interval_in_range,
};
use crate::fan_control::command::parse_percent;

/// Fan controller daemon: PWM fan drive and tachometer readout over MQTT.
#[derive(Parser, Debug)]
#[command(name = "fand", version)]
pub struct Cli {
    /// Fork and run in the background after initializing
    #[arg(short = 'b')]
    pub background: bool,

    /// Allow duty cycles below the minimum
    #[arg(short = 'f')]
    pub force: bool,

    /// Board generation: 0 = first revision, 1 = second to fourth, 2 = fifth
    #[arg(short = 'g', value_parser = clap::value_parser!(u8).range(0..=2))]
    pub generation: Option<u8>,

    /// Invert waveform polarity
    #[arg(short = 'i')]
    pub invert: bool,

    /// Tachometer poll interval in seconds
    #[arg(short = 't', value_name = "SECONDS", value_parser = parse_seconds)]
    pub poll_interval: Option<f64>,

    /// Verbose operation
    #[arg(short = 'v')]
    pub verbose: bool,

    /// Path to a TOML config file
    #[arg(short = 'c', long)]
    pub config: Option<PathBuf>,

    /// Use in-memory registers instead of /dev/mem
    #[arg(long)]
    pub simulate: bool,

    /// Set the first fan output to this duty cycle (0..=100) and exit
    #[arg(value_parser = parse_duty_arg)]
    pub duty: Option<u8>,
}

fn parse_seconds(s: &str) -> Result<f64, String> {
    match s.parse::<f64>() {
        Ok(secs) if poll_interval_in_range(secs) => Ok(secs),
        _ => Err(format!(
            "invalid duration: \"{}\" (must be {} to {} seconds)",
            s, MIN_POLL_INTERVAL_SECS, MAX_POLL_INTERVAL_SECS
        )),
    }
}

fn parse_duty_arg(s: &str) -> Result<u8, String> {
    parse_percent(s).map_err(|_| format!("duty cycle must be 0 <= n <= 100, not \"{}\"", s))
}

impl Cli {
    /// Fold the flags into `config`. Flags only ever switch options on.
    pub fn apply(&self, config: &mut Config) {
        if self.force {
            config.fan.force = true;
        }
        if self.invert {
            config.fan.invert = true;
        }
        if let Some(generation) = self.generation {
            config.board.generation = Some(generation);
        }
        if let Some(secs) = self.poll_interval {
            config.fan.poll_interval_secs = secs;
        }
        if self.simulate {
            config.hardware.backend = Backend::Simulated;
        }
    }
}
