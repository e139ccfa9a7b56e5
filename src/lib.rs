//! Fan PWM generation and tachometer readout for Zynq-7000 boards, driven
//! over MQTT.

pub mod board_config;
pub mod cli;
pub mod communication;
pub mod config;
pub mod daemon;
pub mod fan_control;
pub mod hardware;
pub mod scheduler;
