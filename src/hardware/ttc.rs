//! Triple timer counter (TTC) registers and per-timer access.
//!
//! Both TTC instances sit in one mapping: instance 1 follows instance 0 at a
//! 4 KiB stride, and each register is an array of three words, one per timer.

use std::fmt;

use arbitrary_int::u4;

use super::HardwareError;
use super::registry::{PeripheralKind, PeripheralLease, PeripheralRegistry};

pub const TTC_BASE: u64 = 0xF800_1000;
pub const TTC_SIZE: usize = 0x1000 + 0x84;
pub const TTC_INSTANCE_STRIDE: usize = 0x1000;
pub const TIMERS_PER_TTC: u8 = 3;

#[derive(Debug, Default)]
#[bitbybit::bitenum(u1, exhaustive = true)]
pub enum ClockSource {
    /// cpu_1x (PCLK).
    #[default]
    Pclk = 0b0,
    External = 0b1,
}

#[bitbybit::bitfield(u32, default = 0x0, debug)]
pub struct ClockControl {
    /// Count on the falling edge of the external clock.
    #[bit(6, rw)]
    ext_clk_edge: bool,
    #[bit(5, rw)]
    clk_src: ClockSource,
    /// Divide by 2^(prescaler + 1) when enabled.
    #[bits(1..=4, rw)]
    prescaler: u4,
    #[bit(0, rw)]
    prescale_enable: bool,
}

#[bitbybit::bitenum(u1, exhaustive = true)]
#[derive(Debug)]
pub enum Mode {
    Overflow = 0b0,
    Interval = 0b1,
}

#[bitbybit::bitenum(u1, exhaustive = true)]
#[derive(Debug, Default)]
pub enum WavePolarity {
    /// Output goes low on match and high again on interval/overflow.
    #[default]
    HighToLowOnMatch = 0b0,
    /// Output goes high on match and low again on interval/overflow.
    LowToHighOnMatch = 0b1,
}

#[bitbybit::bitenum(u1, exhaustive = true)]
#[derive(Debug)]
pub enum WaveEnable {
    Enable = 0b0,
    Disable = 0b1,
}

#[bitbybit::bitfield(u32, default = 0x0, debug)]
pub struct CounterControl {
    #[bit(6, rw)]
    wave_polarity: WavePolarity,
    /// Active low.
    #[bit(5, rw)]
    wave_enable_n: WaveEnable,
    /// Self-clearing counter reset.
    #[bit(4, rw)]
    reset: bool,
    #[bit(3, rw)]
    match_enable: bool,
    #[bit(2, rw)]
    decrementing: bool,
    #[bit(1, rw)]
    mode: Mode,
    /// Stops the counter when set.
    #[bit(0, rw)]
    disable: bool,
}

/// Register arrays within one TTC instance.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TtcRegister {
    ClockControl,
    CounterControl,
    Counter,
    Interval,
    Match1,
    Match2,
    Match3,
}

impl TtcRegister {
    fn array_offset(self) -> usize {
        match self {
            TtcRegister::ClockControl => 0x00,
            TtcRegister::CounterControl => 0x0c,
            TtcRegister::Counter => 0x18,
            TtcRegister::Interval => 0x24,
            TtcRegister::Match1 => 0x30,
            TtcRegister::Match2 => 0x3c,
            TtcRegister::Match3 => 0x48,
        }
    }

    /// Byte offset of this register for `address` from [`TTC_BASE`].
    pub fn offset(self, address: ChannelAddress) -> usize {
        usize::from(address.instance()) * TTC_INSTANCE_STRIDE
            + self.array_offset()
            + usize::from(address.timer()) * 4
    }
}

/// One timer: TTC instance 0 or 1, timer 0..=2.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ChannelAddress {
    instance: u8,
    timer: u8,
}

impl ChannelAddress {
    pub fn new(instance: u8, timer: u8) -> Result<Self, HardwareError> {
        if instance > 1 {
            return Err(HardwareError::NoSuchTtc(instance));
        }
        if timer >= TIMERS_PER_TTC {
            return Err(HardwareError::NoSuchTimer(timer));
        }
        Ok(Self { instance, timer })
    }

    pub const fn instance(&self) -> u8 {
        self.instance
    }

    pub const fn timer(&self) -> u8 {
        self.timer
    }
}

impl fmt::Display for ChannelAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "TTC{}.{}", self.instance, self.timer)
    }
}

/// Register accessors for a single timer. No policy lives here.
#[derive(Debug)]
pub struct TimerChannel {
    lease: PeripheralLease,
    address: ChannelAddress,
}

impl TimerChannel {
    pub fn open(registry: &PeripheralRegistry, address: ChannelAddress) -> Result<Self, HardwareError> {
        Ok(Self {
            lease: registry.acquire(PeripheralKind::TimerCounter)?,
            address,
        })
    }

    pub fn address(&self) -> ChannelAddress {
        self.address
    }

    fn read(&self, reg: TtcRegister) -> u32 {
        self.lease.read32(reg.offset(self.address))
    }

    fn write(&self, reg: TtcRegister, value: u32) {
        tracing::trace!("{} {:?} <- {:#x}", self.address, reg, value);
        self.lease.write32(reg.offset(self.address), value)
    }

    pub fn clock_control(&self) -> ClockControl {
        ClockControl::new_with_raw_value(self.read(TtcRegister::ClockControl))
    }

    pub fn set_clock_control(&self, value: ClockControl) {
        self.write(TtcRegister::ClockControl, value.raw_value())
    }

    pub fn counter_control(&self) -> CounterControl {
        CounterControl::new_with_raw_value(self.read(TtcRegister::CounterControl))
    }

    pub fn set_counter_control(&self, value: CounterControl) {
        self.write(TtcRegister::CounterControl, value.raw_value())
    }

    pub fn modify_counter_control(&self, f: impl FnOnce(CounterControl) -> CounterControl) {
        self.set_counter_control(f(self.counter_control()))
    }

    pub fn interval(&self) -> u16 {
        self.read(TtcRegister::Interval) as u16
    }

    pub fn set_interval(&self, value: u16) {
        self.write(TtcRegister::Interval, u32::from(value))
    }

    pub fn match_value(&self) -> u16 {
        self.read(TtcRegister::Match1) as u16
    }

    pub fn set_match_value(&self, value: u16) {
        self.write(TtcRegister::Match1, u32::from(value))
    }

    /// Live 16-bit count.
    pub fn counter(&self) -> u16 {
        self.read(TtcRegister::Counter) as u16
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hardware::sim::SimBus;
    use std::sync::Arc;

    #[test]
    fn test_register_offsets() {
        let a = ChannelAddress::new(0, 0).unwrap();
        assert_eq!(TtcRegister::ClockControl.offset(a), 0x00);
        assert_eq!(TtcRegister::CounterControl.offset(a), 0x0c);

        let b = ChannelAddress::new(1, 2).unwrap();
        assert_eq!(TtcRegister::Counter.offset(b), 0x1000 + 0x18 + 8);
        assert_eq!(TtcRegister::Match1.offset(b), 0x1000 + 0x30 + 8);
        // last word of the mapping
        assert_eq!(TtcRegister::Match3.offset(b) + 4, 0x1000 + 0x54);
        assert!(TtcRegister::Match3.offset(b) + 4 <= TTC_SIZE);
    }

    #[test]
    fn test_address_bounds() {
        assert!(matches!(ChannelAddress::new(2, 0), Err(HardwareError::NoSuchTtc(2))));
        assert!(matches!(ChannelAddress::new(0, 3), Err(HardwareError::NoSuchTimer(3))));
        assert_eq!(ChannelAddress::new(1, 2).unwrap().to_string(), "TTC1.2");
    }

    #[test]
    fn test_bitfield_encoding() {
        let clk = ClockControl::new_with_raw_value(0)
            .with_clk_src(ClockSource::External)
            .with_prescaler(u4::new(3))
            .with_prescale_enable(true);
        assert_eq!(clk.raw_value(), (1 << 5) | (3 << 1) | 1);

        let cnt = CounterControl::new_with_raw_value(0)
            .with_wave_polarity(WavePolarity::LowToHighOnMatch)
            .with_match_enable(true)
            .with_mode(Mode::Interval)
            .with_disable(true);
        assert_eq!(cnt.raw_value(), 0x4b);
    }

    #[test]
    fn test_timer_channel_accessors() {
        let bus = Arc::new(SimBus::new());
        let registry = PeripheralRegistry::new(bus.clone());
        let address = ChannelAddress::new(1, 1).unwrap();
        let timer = TimerChannel::open(&registry, address).unwrap();

        timer.set_interval(4440);
        timer.set_match_value(2220);
        let region = bus.region(TTC_BASE).unwrap();
        assert_eq!(region.peek(0x1000 + 0x24 + 4), 4440);
        assert_eq!(region.peek(0x1000 + 0x30 + 4), 2220);

        region.poke(TtcRegister::Counter.offset(address), 0x0001_fffe);
        assert_eq!(timer.counter(), 0xfffe);

        timer.set_counter_control(CounterControl::new_with_raw_value(0).with_disable(true));
        timer.modify_counter_control(|c| c.with_disable(false).with_match_enable(true));
        assert_eq!(region.peek(0x1000 + 0x0c + 4), 1 << 3);
    }
}
