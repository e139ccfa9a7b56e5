//! PWM output on a TTC timer.
//!
//! The timer runs in interval mode: it counts up to the interval value and
//! restarts, and the waveform flips on the first match register. The duty
//! cycle is therefore `match / interval`.

use arbitrary_int::u4;

use super::HardwareError;
use super::mio::{MioFunction, PinMux};
use super::registry::PeripheralRegistry;
use super::ttc::{
    ChannelAddress, ClockControl, ClockSource, CounterControl, Mode, TimerChannel, WavePolarity,
};

/// MIO pins that can carry each TTC's waveform output.
pub const PWM_PINS: [&[u8]; 2] = [&[18, 30, 42], &[16, 28, 40]];

/// Timer clock for PWM generation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PwmClock {
    External,
    /// cpu_1x (PCLK).
    CpuOneX,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PwmConfig {
    pub address: ChannelAddress,
    pub clock: PwmClock,
    /// Divide the timer clock by `2^prescale_shift`; 0 disables the prescaler.
    pub prescale_shift: u8,
    pub invert: bool,
    pub pin: u8,
}

impl PwmConfig {
    fn validate(&self) -> Result<(), HardwareError> {
        let instance = self.address.instance();
        let legal = PWM_PINS[usize::from(instance)];
        if !legal.contains(&self.pin) {
            return Err(HardwareError::IllegalPwmPin {
                instance,
                pin: self.pin,
                legal,
            });
        }
        if self.prescale_shift > 16 {
            return Err(HardwareError::InvalidPrescale(self.prescale_shift));
        }
        Ok(())
    }

    fn clock_control(&self) -> ClockControl {
        let source = match self.clock {
            PwmClock::External => ClockSource::External,
            PwmClock::CpuOneX => ClockSource::Pclk,
        };
        let clk = ClockControl::new_with_raw_value(0).with_clk_src(source);
        if self.prescale_shift == 0 {
            clk
        } else {
            clk.with_prescaler(u4::new(self.prescale_shift - 1))
                .with_prescale_enable(true)
        }
    }

    fn counter_control(&self) -> CounterControl {
        let polarity = if self.invert {
            WavePolarity::LowToHighOnMatch
        } else {
            WavePolarity::HighToLowOnMatch
        };
        CounterControl::new_with_raw_value(0)
            .with_wave_polarity(polarity)
            .with_match_enable(true)
            .with_mode(Mode::Interval)
            .with_disable(true)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PwmState {
    Stopped,
    Running,
}

#[derive(Debug)]
pub struct PwmChannel {
    timer: TimerChannel,
    _mux: PinMux,
    config: PwmConfig,
    clock_hz: u64,
    duty: f64,
    state: PwmState,
}

impl PwmChannel {
    /// Program the timer as a stopped waveform generator and route it to
    /// `config.pin`. `clock_hz` is the frequency of the selected timer clock
    /// before prescaling.
    pub fn configure(
        registry: &PeripheralRegistry,
        config: PwmConfig,
        clock_hz: u64,
    ) -> Result<Self, HardwareError> {
        config.validate()?;

        let timer = TimerChannel::open(registry, config.address)?;
        timer.set_clock_control(config.clock_control());
        timer.set_counter_control(config.counter_control());

        let mux = PinMux::open(registry)?;
        mux.route(config.pin, MioFunction::Wave)?;

        tracing::debug!("PWM {} on MIO{} configured", config.address, config.pin);
        Ok(Self {
            timer,
            _mux: mux,
            config,
            clock_hz,
            duty: 0.0,
            state: PwmState::Stopped,
        })
    }

    pub fn config(&self) -> &PwmConfig {
        &self.config
    }

    pub fn state(&self) -> PwmState {
        self.state
    }

    fn counter_hz(&self) -> f64 {
        self.clock_hz as f64 / f64::from(1u32 << self.config.prescale_shift)
    }

    /// Program the interval for an output frequency of `hz`. Returns the
    /// interval written.
    pub fn set_frequency(&mut self, hz: u32) -> Result<u16, HardwareError> {
        let out_of_range = HardwareError::FrequencyOutOfRange {
            hz,
            clock_hz: self.clock_hz,
        };
        if hz == 0 {
            return Err(out_of_range);
        }
        let interval = (self.counter_hz() / f64::from(hz)).round();
        if !(1.0..=f64::from(u16::MAX)).contains(&interval) {
            return Err(out_of_range);
        }
        let interval = interval as u16;
        self.timer.set_interval(interval);
        self.write_match(interval);
        tracing::debug!("PWM {} interval {} for {} Hz", self.config.address, interval, hz);
        Ok(interval)
    }

    /// Effective output period in seconds.
    pub fn period(&self) -> f64 {
        f64::from(self.timer.interval()) / self.counter_hz()
    }

    /// Set the fraction of each period spent in the active level.
    pub fn set_duty(&mut self, fraction: f64) -> Result<(), HardwareError> {
        if !(0.0..=1.0).contains(&fraction) {
            return Err(HardwareError::InvalidDuty(fraction));
        }
        self.duty = fraction;
        self.write_match(self.timer.interval());
        Ok(())
    }

    pub fn set_duty_percent(&mut self, percent: u8) -> Result<(), HardwareError> {
        self.set_duty(f64::from(percent) / 100.0)
    }

    fn write_match(&self, interval: u16) {
        let value = (self.duty * f64::from(interval)).round() as u16;
        self.timer.set_match_value(value);
    }

    /// Duty cycle as programmed in the registers.
    pub fn duty(&self) -> f64 {
        let interval = self.timer.interval();
        if interval == 0 {
            return 0.0;
        }
        f64::from(self.timer.match_value()) / f64::from(interval)
    }

    pub fn start(&mut self) {
        self.timer.modify_counter_control(|c| c.with_disable(false));
        self.state = PwmState::Running;
        tracing::debug!("PWM {} started", self.config.address);
    }

    /// Drive the output to its inactive level. The timer keeps running; it
    /// cannot be halted mid-period without a glitch.
    pub fn stop(&mut self) -> Result<(), HardwareError> {
        self.set_duty(0.0)
    }
}
