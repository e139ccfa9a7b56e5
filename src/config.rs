//! # Daemon configuration
//!
//! Every section and key is optional; missing values fall back to the
//! defaults below. Command-line flags override the file.
//!
//! ```toml
//! [board]
//! generation = 2
//! pclk_path = "/sys/kernel/debug/clk/cpu_1x/clk_rate"
//!
//! [fan]
//! pwm_hz = 25000
//! min_duty = 30
//! poll_interval_secs = 1.0
//!
//! [mqtt]
//! host = "localhost"
//! port = 1883
//!
//! [hardware]
//! backend = "devmem"
//! ```

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("TOML parse error: {0}")]
    Toml(#[from] toml::de::Error),
    #[error("invalid configuration: {0}")]
    Invalid(String),
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct Config {
    #[serde(default)]
    pub board: BoardConfig,
    #[serde(default)]
    pub fan: FanConfig,
    #[serde(default)]
    pub mqtt: MqttConfig,
    #[serde(default)]
    pub hardware: HardwareConfig,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct BoardConfig {
    /// Board generation; falls back to `BOARD_GENERATION` when absent.
    #[serde(default)]
    pub generation: Option<u8>,
    #[serde(default = "default_pclk_path")]
    pub pclk_path: PathBuf,
    /// Skip reading `pclk_path` and use this frequency.
    #[serde(default)]
    pub pclk_hz: Option<u64>,
}

impl Default for BoardConfig {
    fn default() -> Self {
        Self {
            generation: None,
            pclk_path: default_pclk_path(),
            pclk_hz: None,
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct FanConfig {
    #[serde(default = "default_pwm_hz")]
    pub pwm_hz: u32,
    #[serde(default = "default_min_duty")]
    pub min_duty: u8,
    /// Allow non-zero duties below `min_duty`.
    #[serde(default)]
    pub force: bool,
    #[serde(default)]
    pub invert: bool,
    #[serde(default = "default_poll_interval_secs")]
    pub poll_interval_secs: f64,
}

impl Default for FanConfig {
    fn default() -> Self {
        Self {
            pwm_hz: default_pwm_hz(),
            min_duty: default_min_duty(),
            force: false,
            invert: false,
            poll_interval_secs: default_poll_interval_secs(),
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct MqttConfig {
    #[serde(default = "default_mqtt_host")]
    pub host: String,
    #[serde(default = "default_mqtt_port")]
    pub port: u16,
    #[serde(default = "default_keep_alive_secs")]
    pub keep_alive_secs: u64,
    #[serde(default = "default_client_id")]
    pub client_id: String,
    /// Outbound request queue and inbound command queue depth.
    #[serde(default = "default_queue_capacity")]
    pub queue_capacity: usize,
}

impl Default for MqttConfig {
    fn default() -> Self {
        Self {
            host: default_mqtt_host(),
            port: default_mqtt_port(),
            keep_alive_secs: default_keep_alive_secs(),
            client_id: default_client_id(),
            queue_capacity: default_queue_capacity(),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Backend {
    /// Physical registers through `/dev/mem`.
    #[default]
    DevMem,
    /// In-memory registers.
    Simulated,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct HardwareConfig {
    #[serde(default)]
    pub backend: Backend,
    #[serde(default = "default_dev_mem")]
    pub dev_mem: PathBuf,
}

impl Default for HardwareConfig {
    fn default() -> Self {
        Self {
            backend: Backend::default(),
            dev_mem: default_dev_mem(),
        }
    }
}

/// Shortest tachometer poll interval; below this the interval timer sees zero.
pub const MIN_POLL_INTERVAL_SECS: f64 = 1e-6;
/// Longest tachometer poll interval, one day.
pub const MAX_POLL_INTERVAL_SECS: f64 = 86_400.0;

/// NaN and infinities are out of range.
pub fn poll_interval_in_range(secs: f64) -> bool {
    (MIN_POLL_INTERVAL_SECS..=MAX_POLL_INTERVAL_SECS).contains(&secs)
}

impl Config {
    pub fn validate(&self) -> Result<(), ConfigError> {
        let invalid = |msg: String| Err(ConfigError::Invalid(msg));
        if self.fan.min_duty > 100 {
            return invalid(format!("fan.min_duty must be <= 100, not {}", self.fan.min_duty));
        }
        if self.fan.pwm_hz == 0 {
            return invalid("fan.pwm_hz must be > 0".to_string());
        }
        if !poll_interval_in_range(self.fan.poll_interval_secs) {
            return invalid(format!(
                "fan.poll_interval_secs must be in {}..={}, not {}",
                MIN_POLL_INTERVAL_SECS, MAX_POLL_INTERVAL_SECS, self.fan.poll_interval_secs
            ));
        }
        if self.mqtt.queue_capacity == 0 {
            return invalid("mqtt.queue_capacity must be > 0".to_string());
        }
        if self.mqtt.keep_alive_secs > u64::from(u16::MAX) {
            return invalid(format!(
                "mqtt.keep_alive_secs must be <= {}, not {}",
                u16::MAX,
                self.mqtt.keep_alive_secs
            ));
        }
        if let Some(generation) = self.board.generation {
            if generation > 2 {
                return invalid(format!("board.generation must be 0, 1, or 2, not {}", generation));
            }
        }
        Ok(())
    }
}

fn default_pclk_path() -> PathBuf { PathBuf::from("/sys/kernel/debug/clk/cpu_1x/clk_rate") }
fn default_pwm_hz() -> u32 { 25_000 }
fn default_min_duty() -> u8 { crate::fan_control::DEFAULT_MIN_DUTY }
fn default_poll_interval_secs() -> f64 { 1.0 }
fn default_mqtt_host() -> String { "localhost".to_string() }
fn default_mqtt_port() -> u16 { 1883 }
fn default_keep_alive_secs() -> u64 { 3600 }
fn default_client_id() -> String { "fand".to_string() }
fn default_queue_capacity() -> usize { 64 }
fn default_dev_mem() -> PathBuf { PathBuf::from("/dev/mem") }

/// Load configuration from a TOML file at the given path.
pub fn load_config(path: &Path) -> Result<Config, ConfigError> {
    match std::fs::read_to_string(path) {
        Ok(contents) => match toml::from_str(&contents) {
            Ok(config) => Ok(config),
            Err(e) => {
                tracing::error!("Failed to parse config TOML: {}", e);
                Err(ConfigError::Toml(e))
            }
        },
        Err(e) => {
            tracing::error!("Failed to read config file '{}': {}", path.display(), e);
            Err(ConfigError::Io(e))
        }
    }
}
