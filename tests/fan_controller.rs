// Fan controller scenarios against simulated registers

use std::sync::Arc;
use std::time::Duration;

use fand::communication::mqtt;
use fand::communication::{Command, RecordingPort, Telemetry};
use fand::fan_control::{BoardTopology, ControllerSettings, DutyPolicy, FanController};
use fand::hardware::ttc::{TTC_BASE, TtcRegister};
use fand::hardware::{ChannelAddress, PeripheralRegistry, SimBus};
use fand::scheduler::ManualClock;

const PCLK_HZ: u64 = 111_111_115;

struct Board {
    bus: Arc<SimBus>,
    clock: Arc<ManualClock>,
    controller: FanController<RecordingPort>,
}

impl Board {
    fn new(topology: BoardTopology, force: bool) -> Self {
        let bus = Arc::new(SimBus::new());
        let registry = PeripheralRegistry::new(bus.clone());
        let clock = Arc::new(ManualClock::default());
        let settings = ControllerSettings {
            topology,
            pclk_hz: PCLK_HZ,
            pwm_hz: 25_000,
            policy: DutyPolicy {
                force,
                ..DutyPolicy::default()
            },
            invert: false,
        };
        let controller =
            FanController::new(&registry, settings, RecordingPort::new(), clock.clone()).unwrap();
        Self {
            bus,
            clock,
            controller,
        }
    }

    fn set_counter(&self, instance: u8, timer: u8, value: u32) {
        let address = ChannelAddress::new(instance, timer).unwrap();
        self.bus
            .region(TTC_BASE)
            .unwrap()
            .poke(TtcRegister::Counter.offset(address), value);
    }

    fn match_register(&self, instance: u8) -> u32 {
        let address = ChannelAddress::new(instance, 0).unwrap();
        self.bus
            .region(TTC_BASE)
            .unwrap()
            .peek(TtcRegister::Match1.offset(address))
    }

    fn command(&mut self, topic: &str, payload: &[u8]) {
        let command = mqtt::route(self.controller.topology(), topic, payload).unwrap();
        self.controller.handle(command).unwrap();
    }

    fn last_duty(&self, output: &str) -> Option<u8> {
        self.controller.port().last_duty(output)
    }
}

#[test]
fn test_two_fan_topology() {
    let board = Board::new(BoardTopology::TwoFan, false);
    let outputs: Vec<_> = board.controller.output_names().collect();
    let sensors: Vec<_> = board.controller.sensor_names().collect();
    assert_eq!(outputs, ["left", "right"]);
    assert_eq!(sensors, ["right", "left"]);

    let published = board.controller.port().published();
    for output in ["left", "right"] {
        assert!(published.contains(&Telemetry::Duty { output, percent: 100 }));
        assert!(published.contains(&Telemetry::MinDuty { output, percent: 30 }));
    }
    assert_eq!(board.match_register(0), 4444);
    assert_eq!(board.match_register(1), 4444);
}

#[test]
fn test_four_sensor_topology() {
    let mut board = Board::new(BoardTopology::FourSensor, false);
    let outputs: Vec<_> = board.controller.output_names().collect();
    let sensors: Vec<_> = board.controller.sensor_names().collect();
    assert_eq!(outputs, ["front", "rear"]);
    assert_eq!(sensors, ["front-1", "front-2", "rear-1", "rear-2"]);

    board.set_counter(0, 1, 20);
    board.set_counter(1, 1, 40);
    board.set_counter(0, 2, 60);
    board.set_counter(1, 2, 80);
    board.clock.advance(Duration::from_secs(1));
    board.controller.port_mut().take();
    board.controller.poll_tick().unwrap();

    assert_eq!(
        board.controller.port().published(),
        &[
            Telemetry::Rpm { sensor: "front-1", rpm: 600 },
            Telemetry::Rpm { sensor: "front-2", rpm: 1200 },
            Telemetry::Rpm { sensor: "rear-1", rpm: 1800 },
            Telemetry::Rpm { sensor: "rear-2", rpm: 2400 },
        ]
    );
    let topics: Vec<_> = board
        .controller
        .port()
        .published()
        .iter()
        .map(|t| mqtt::encode(t).0)
        .collect();
    assert_eq!(
        topics,
        ["/fan/front/1/rpm", "/fan/front/2/rpm", "/fan/rear/1/rpm", "/fan/rear/2/rpm"]
    );
}

#[test]
fn test_rpm_is_rounded_when_published() {
    let mut board = Board::new(BoardTopology::TwoFan, false);
    // 7 pulses in 4 s: 52.5 rpm
    board.set_counter(0, 1, 7);
    board.clock.advance(Duration::from_secs(4));
    board.controller.poll_tick().unwrap();
    assert_eq!(board.controller.rpm("right"), Some(53));
    assert_eq!(board.controller.rpm("left"), Some(0));
}

#[test]
fn test_end_to_end_duty_commands() {
    let mut board = Board::new(BoardTopology::TwoFan, false);

    board.command("/fan/left/pwm-set", b"45");
    assert_eq!(board.last_duty("left"), Some(45));
    assert_eq!(board.match_register(0), 2000);

    board.command("/fan/left/pwm-set", b"5");
    assert_eq!(board.last_duty("left"), Some(30));

    board.command("/fan/left/pwm-set", b"0");
    assert_eq!(board.last_duty("left"), Some(0));
    assert_eq!(board.match_register(0), 0);

    assert_eq!(board.last_duty("right"), Some(100));
}

#[test]
fn test_force_allows_low_duty() {
    let mut board = Board::new(BoardTopology::TwoFan, true);
    board.command("/fan/right/pwm-set", b"5");
    assert_eq!(board.last_duty("right"), Some(5));
}

#[test]
fn test_malformed_commands_change_nothing() {
    let mut board = Board::new(BoardTopology::FourSensor, false);
    board.command("/fan/front/pwm-set", b"60");
    board.controller.port_mut().take();

    let payloads: [&[u8]; 5] = [b"101", b"60%", b"-1", b"12345678901", b"sixty"];
    for payload in payloads {
        board.command("/fan/front/pwm-set", payload);
    }
    assert!(board.controller.port().published().is_empty());
    assert_eq!(board.controller.duty("front"), Some(60));
    assert_eq!(board.match_register(0), 2666);
}

#[test]
fn test_shutdown_is_idempotent_and_latches() {
    let mut board = Board::new(BoardTopology::FourSensor, false);
    board.command("/fan/front/pwm-set", b"40");
    board.command("/fan/rear/pwm-set", b"50");

    board.command("/sys/shutdown", b"1");
    let once = (
        board.controller.duty("front"),
        board.controller.duty("rear"),
        board.controller.is_shutting_down(),
    );
    board.command("/sys/shutdown", b"yes");
    let twice = (
        board.controller.duty("front"),
        board.controller.duty("rear"),
        board.controller.is_shutting_down(),
    );
    assert_eq!(once, (Some(100), Some(100), true));
    assert_eq!(once, twice);
    assert_eq!(board.match_register(1), 4444);

    board.command("/fan/rear/pwm-set", b"30");
    assert_eq!(board.last_duty("rear"), Some(100));

    board.command("/sys/shutdown", b"0");
    assert!(!board.controller.is_shutting_down());
    board.command("/fan/rear/pwm-set", b"30");
    assert_eq!(board.last_duty("rear"), Some(30));
}

#[test]
fn test_empty_shutdown_payload_cancels() {
    let mut board = Board::new(BoardTopology::TwoFan, false);
    board.controller.handle(Command::Shutdown { payload: b"1".to_vec() }).unwrap();
    board.controller.handle(Command::Shutdown { payload: Vec::new() }).unwrap();
    assert!(!board.controller.is_shutting_down());
}
