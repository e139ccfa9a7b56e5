//! Fan speed from tacho pulses counted by a free-running TTC timer.

use std::sync::Arc;
use std::time::SystemTime;

use super::HardwareError;
use super::mio::{MioFunction, PinMux};
use super::registry::PeripheralRegistry;
use super::ttc::{ChannelAddress, ClockControl, ClockSource, CounterControl, TimerChannel};
use crate::scheduler::TimeInterface;

/// MIO pins that can feed each TTC's external clock input (timer 0 only).
pub const TACHOMETER_PINS: [&[u8]; 2] = [&[19, 31, 43], &[17, 29, 41]];

/// A fan's tacho line gives two pulses per revolution.
pub const CYCLES_PER_REVOLUTION: f64 = 2.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TachometerConfig {
    pub address: ChannelAddress,
    /// MIO pin carrying the tacho signal. `None` or 0 when it arrives over
    /// EMIO; MIO pin 0 is never a tachometer input.
    pub pin: Option<u8>,
}

impl TachometerConfig {
    fn mio_pin(&self) -> Option<u8> {
        self.pin.filter(|&pin| pin != 0)
    }

    fn validate(&self) -> Result<(), HardwareError> {
        let Some(pin) = self.mio_pin() else {
            return Ok(());
        };
        let instance = self.address.instance();
        let legal = TACHOMETER_PINS[usize::from(instance)];
        if !legal.contains(&pin) {
            return Err(HardwareError::IllegalTachometerPin { instance, pin, legal });
        }
        if self.address.timer() != 0 {
            return Err(HardwareError::MioClockOnTimer(self.address.timer()));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Copy)]
struct Sample {
    count: u16,
    at: SystemTime,
}

pub struct Tachometer {
    timer: TimerChannel,
    _mux: Option<PinMux>,
    clock: Arc<dyn TimeInterface>,
    last: Sample,
}

impl Tachometer {
    pub fn configure(
        registry: &PeripheralRegistry,
        config: TachometerConfig,
        clock: Arc<dyn TimeInterface>,
    ) -> Result<Self, HardwareError> {
        config.validate()?;

        let timer = TimerChannel::open(registry, config.address)?;
        timer.set_clock_control(ClockControl::new_with_raw_value(0).with_clk_src(ClockSource::External));
        // running, counting up, overflow mode
        timer.set_counter_control(CounterControl::new_with_raw_value(0));

        let mux = match config.mio_pin() {
            Some(pin) => {
                let mux = PinMux::open(registry)?;
                mux.route_input(pin, MioFunction::TtcClock)?;
                Some(mux)
            }
            None => None,
        };

        let last = Sample {
            count: timer.counter(),
            at: clock.now_wallclock(),
        };
        tracing::debug!("tachometer {} configured, count {}", config.address, last.count);
        Ok(Self {
            timer,
            _mux: mux,
            clock,
            last,
        })
    }

    pub fn address(&self) -> ChannelAddress {
        self.timer.address()
    }

    /// Revolutions per minute since the previous sample.
    ///
    /// Returns 0 when wall time did not advance; the baseline still moves to
    /// the new reading.
    pub fn sample(&mut self) -> f64 {
        let now = Sample {
            count: self.timer.counter(),
            at: self.clock.now_wallclock(),
        };
        let previous = std::mem::replace(&mut self.last, now);

        let dt = match now.at.duration_since(previous.at) {
            Ok(dt) if !dt.is_zero() => dt.as_secs_f64(),
            _ => {
                tracing::warn!("{}: time stood still or went backwards", self.address());
                return 0.0;
            }
        };
        let pulses = now.count.wrapping_sub(previous.count);
        f64::from(pulses) * 60.0 / dt / CYCLES_PER_REVOLUTION
    }
}

impl std::fmt::Debug for Tachometer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Tachometer")
            .field("address", &self.address())
            .field("last_count", &self.last.count)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hardware::mio::MIO_BASE;
    use crate::hardware::regmap::WindowSource;
    use crate::hardware::sim::{SimBus, SimRegion};
    use crate::hardware::ttc::{TTC_BASE, TtcRegister};
    use crate::scheduler::ManualClock;
    use std::time::Duration;

    struct Rig {
        bus: Arc<SimBus>,
        registry: PeripheralRegistry,
        clock: Arc<ManualClock>,
    }

    impl Rig {
        fn new() -> Self {
            let bus = Arc::new(SimBus::new());
            Self {
                registry: PeripheralRegistry::new(bus.clone()),
                bus,
                clock: Arc::new(ManualClock::default()),
            }
        }

        fn tachometer(&self, instance: u8, timer: u8, pin: Option<u8>) -> Result<Tachometer, HardwareError> {
            let config = TachometerConfig {
                address: ChannelAddress::new(instance, timer).unwrap(),
                pin,
            };
            Tachometer::configure(&self.registry, config, self.clock.clone())
        }

        fn ttc(&self) -> Arc<SimRegion> {
            self.bus.region(TTC_BASE).unwrap()
        }
    }

    #[test]
    fn test_rate_from_counter_delta() {
        let rig = Rig::new();
        let mut tach = rig.tachometer(0, 1, None).unwrap();
        let counter = TtcRegister::Counter.offset(tach.address());

        rig.ttc().poke(counter, 100);
        rig.clock.advance(Duration::from_secs(1));
        // re-baseline at 100
        tach.sample();

        rig.ttc().poke(counter, 150);
        rig.clock.advance(Duration::from_secs(1));
        assert_eq!(tach.sample(), 1500.0);

        rig.ttc().poke(counter, 250);
        rig.clock.advance(Duration::from_millis(500));
        assert_eq!(tach.sample(), 100.0 * 60.0 / 0.5 / 2.0);
    }

    #[test]
    fn test_counter_wraps_at_16_bits() {
        let rig = Rig::new();
        let address = ChannelAddress::new(1, 2).unwrap();
        rig.bus.open(TTC_BASE, crate::hardware::ttc::TTC_SIZE).unwrap();
        rig.ttc().poke(TtcRegister::Counter.offset(address), 0xfff0);

        let mut tach = rig.tachometer(1, 2, None).unwrap();
        rig.ttc().poke(TtcRegister::Counter.offset(address), 0x0010);
        rig.clock.advance(Duration::from_secs(2));
        assert_eq!(tach.sample(), 32.0 * 60.0 / 2.0 / 2.0);
    }

    #[test]
    fn test_time_going_backwards_reports_zero() {
        let rig = Rig::new();
        let mut tach = rig.tachometer(0, 1, None).unwrap();
        let counter = TtcRegister::Counter.offset(tach.address());

        rig.ttc().poke(counter, 500);
        rig.clock.rewind(Duration::from_secs(3));
        assert_eq!(tach.sample(), 0.0);

        // same instant again
        rig.ttc().poke(counter, 600);
        assert_eq!(tach.sample(), 0.0);

        // baseline moved to 600 at the rewound time
        rig.ttc().poke(counter, 660);
        rig.clock.advance(Duration::from_secs(1));
        assert_eq!(tach.sample(), 1800.0);
    }

    #[test]
    fn test_configure_registers() {
        let rig = Rig::new();
        let tach = rig.tachometer(1, 0, Some(17)).unwrap();
        let ttc = rig.ttc();
        assert_eq!(ttc.peek(TtcRegister::ClockControl.offset(tach.address())), 1 << 5);
        assert_eq!(ttc.peek(TtcRegister::CounterControl.offset(tach.address())), 0);
        let mio = rig.bus.region(MIO_BASE).unwrap();
        assert_eq!(mio.peek(17 * 4), 0xc1);
    }

    #[test]
    fn test_emio_does_not_map_pin_mux() {
        let rig = Rig::new();
        let _tach = rig.tachometer(0, 2, None).unwrap();
        assert!(rig.bus.region(MIO_BASE).is_none());
    }

    #[test]
    fn test_pin_zero_is_emio() {
        let rig = Rig::new();
        let _tach = rig.tachometer(1, 2, Some(0)).unwrap();
        assert!(rig.bus.region(MIO_BASE).is_none());
    }

    #[test]
    fn test_pin_rules() {
        let rig = Rig::new();
        assert!(matches!(
            rig.tachometer(0, 0, Some(17)),
            Err(HardwareError::IllegalTachometerPin { instance: 0, pin: 17, .. })
        ));
        assert!(matches!(
            rig.tachometer(0, 1, Some(19)),
            Err(HardwareError::MioClockOnTimer(1))
        ));
        assert!(rig.tachometer(0, 0, Some(43)).is_ok());
    }
}
