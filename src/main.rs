// src/main.rs - fand entry point
use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use tokio::sync::mpsc;

use fand::board_config::{self, GENERATION_ENV};
use fand::cli::Cli;
use fand::communication::mqtt::{self, MqttLink, MqttPort};
use fand::config::{self, Backend, Config, HardwareConfig};
use fand::daemon::{self, Fork};
use fand::fan_control::{ControllerSettings, DutyPolicy, FanController, FanService, manual};
use fand::hardware::{DevMem, PeripheralRegistry, SimBus, WindowSource};
use fand::scheduler::StdTimeSync;

type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

fn main() -> ExitCode {
    let cli = Cli::parse();

    tracing_subscriber::fmt()
        .with_max_level(if cli.verbose {
            tracing::Level::DEBUG
        } else {
            tracing::Level::INFO
        })
        .with_writer(std::io::stderr)
        .init();

    match run(cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            tracing::error!("{}", e);
            ExitCode::FAILURE
        }
    }
}

fn window_source(hardware: &HardwareConfig) -> Arc<dyn WindowSource> {
    match hardware.backend {
        Backend::DevMem => Arc::new(DevMem::new(&hardware.dev_mem)),
        Backend::Simulated => {
            tracing::info!("using simulated registers");
            Arc::new(SimBus::new())
        }
    }
}

fn run(cli: Cli) -> Result<(), BoxError> {
    let mut config = match &cli.config {
        Some(path) => {
            tracing::info!("Loading configuration from: {}", path.display());
            config::load_config(path)?
        }
        None => Config::default(),
    };
    cli.apply(&mut config);
    config.validate()?;

    let env_generation = std::env::var(GENERATION_ENV).ok();
    let generation =
        board_config::resolve_generation(config.board.generation, env_generation.as_deref())?;
    let topology = board_config::topology(generation)?;
    let pclk_hz = match config.board.pclk_hz {
        Some(hz) => hz,
        None => board_config::read_pclk(&config.board.pclk_path)?,
    };

    let registry = PeripheralRegistry::new(window_source(&config.hardware));
    let settings = ControllerSettings {
        topology,
        pclk_hz,
        pwm_hz: config.fan.pwm_hz,
        policy: DutyPolicy {
            min_duty: config.fan.min_duty,
            force: config.fan.force,
        },
        invert: config.fan.invert,
    };

    if let Some(duty) = cli.duty {
        manual::apply(&registry, &settings, duty)?;
        return Ok(());
    }

    tracing::info!("Starting fand, generation {} ({} board)", generation, topology);
    let (port, link) = mqtt::connect(&config.mqtt, topology);
    let controller = FanController::new(&registry, settings, port, Arc::new(StdTimeSync))?;

    if cli.background && daemon::daemonize(cli.verbose)? == Fork::Parent {
        return Ok(());
    }

    let runtime = tokio::runtime::Builder::new_multi_thread().enable_all().build()?;
    runtime.block_on(serve(controller, link, &config))
}

async fn serve(
    controller: FanController<MqttPort>,
    link: MqttLink,
    config: &Config,
) -> Result<(), BoxError> {
    let (tx, rx) = mpsc::channel(config.mqtt.queue_capacity);
    tokio::spawn(link.run(tx));

    let poll_interval = Duration::from_secs_f64(config.fan.poll_interval_secs);
    let mut service = FanService::new(controller, rx, poll_interval);
    tokio::select! {
        result = service.run() => result?,
        _ = tokio::signal::ctrl_c() => tracing::info!("interrupted, fans stay at their current duty"),
    }
    Ok(())
}
