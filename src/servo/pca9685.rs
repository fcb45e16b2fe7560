//! PCA9685 16-channel PWM controller.
//!
//! The driver talks to the chip through `RegisterBus`, so the register
//! protocol is testable without an I2C adapter. On Linux the rppal binding
//! in `servo::i2c` provides the real bus.

use std::thread::sleep;
use std::time::Duration;

use crate::error::{ArmError, Result};
use crate::servo::{PulseRange, ServoBus};

/// Channels on one PCA9685
pub const CHANNELS: usize = 16;

const MODE1: u8 = 0x00;
const MODE2: u8 = 0x01;
const LED0_ON_L: u8 = 0x06;
const PRESCALE: u8 = 0xFE;

const MODE1_RESTART: u8 = 0x80;
const MODE1_AI: u8 = 0x20;
const MODE1_SLEEP: u8 = 0x10;
const MODE2_OUTDRV: u8 = 0x04;

const OSC_CLOCK: f64 = 25_000_000.0;
const PWM_RES: f64 = 4_096.0;

/// Byte-wide register access to the chip.
pub trait RegisterBus: Send {
    fn write_register(&mut self, register: u8, value: u8) -> Result<()>;
    fn read_register(&mut self, register: u8) -> Result<u8>;
}

/// PCA9685 servo driver
pub struct Pca9685<B: RegisterBus> {
    bus: B,
    frequency_hz: f64,
    ranges: [PulseRange; CHANNELS],
    angles: [Option<f64>; CHANNELS],
}

impl<B: RegisterBus> Pca9685<B> {
    /// Wake the chip and program the PWM frequency.
    pub fn new(bus: B, frequency_hz: f64) -> Result<Self> {
        let mut driver = Self {
            bus,
            frequency_hz,
            ranges: [PulseRange::default(); CHANNELS],
            angles: [None; CHANNELS],
        };

        driver.bus.write_register(MODE2, MODE2_OUTDRV)?;
        driver.bus.write_register(MODE1, MODE1_AI)?;
        sleep(Duration::from_millis(5));
        driver.set_pwm_frequency(frequency_hz)?;

        log::debug!("PCA9685 initialised at {} Hz", frequency_hz);
        Ok(driver)
    }

    /// Prescaler value for a PWM frequency.
    pub fn prescale_for(frequency_hz: f64) -> Result<u8> {
        if !(24.0..=1526.0).contains(&frequency_hz) {
            return Err(ArmError::Config(format!(
                "PWM frequency {} Hz outside 24..=1526",
                frequency_hz
            )));
        }
        let prescale = (OSC_CLOCK / (PWM_RES * frequency_hz)).round() - 1.0;
        Ok(prescale.clamp(3.0, 255.0) as u8)
    }

    /// Program the prescaler. The chip only accepts it while asleep.
    pub fn set_pwm_frequency(&mut self, frequency_hz: f64) -> Result<()> {
        let prescale = Self::prescale_for(frequency_hz)?;

        let old_mode = self.bus.read_register(MODE1)?;
        let sleep_mode = (old_mode & !MODE1_RESTART) | MODE1_SLEEP;

        self.bus.write_register(MODE1, sleep_mode)?;
        self.bus.write_register(PRESCALE, prescale)?;
        self.bus.write_register(MODE1, old_mode)?;

        sleep(Duration::from_millis(5));

        self.bus.write_register(MODE1, old_mode | MODE1_RESTART)?;
        self.frequency_hz = frequency_hz;
        Ok(())
    }

    /// Raw on/off tick counts for one channel.
    pub fn set_pwm(&mut self, channel: usize, on: u16, off: u16) -> Result<()> {
        let base = Self::channel_base(channel)?;

        self.bus.write_register(base, (on & 0xFF) as u8)?;
        self.bus.write_register(base + 1, (on >> 8) as u8)?;
        self.bus.write_register(base + 2, (off & 0xFF) as u8)?;
        self.bus.write_register(base + 3, (off >> 8) as u8)?;
        Ok(())
    }

    /// Tick count (out of 4096) for a pulse width at the current frequency.
    pub fn ticks_for(&self, pulse_us: f64) -> u16 {
        let ticks = pulse_us * self.frequency_hz * PWM_RES / 1_000_000.0;
        ticks.round().clamp(0.0, PWM_RES - 1.0) as u16
    }

    pub fn frequency_hz(&self) -> f64 {
        self.frequency_hz
    }

    /// Hand back the register bus.
    pub fn into_inner(self) -> B {
        self.bus
    }

    fn channel_base(channel: usize) -> Result<u8> {
        if channel >= CHANNELS {
            return Err(ArmError::InvalidJoint {
                index: channel,
                count: CHANNELS,
            });
        }
        Ok(LED0_ON_L + 4 * channel as u8)
    }
}

impl<B: RegisterBus> ServoBus for Pca9685<B> {
    fn channels(&self) -> usize {
        CHANNELS
    }

    fn set_angle(&mut self, channel: usize, degrees: f64) -> Result<()> {
        Self::channel_base(channel)?;
        let pulse = self.ranges[channel].pulse_for(degrees)?;
        let off = self.ticks_for(pulse);
        self.set_pwm(channel, 0, off)?;
        self.angles[channel] = Some(degrees);
        Ok(())
    }

    fn angle(&self, channel: usize) -> Option<f64> {
        self.angles.get(channel).copied().flatten()
    }

    fn set_pulse_width_range(&mut self, channel: usize, range: PulseRange) -> Result<()> {
        Self::channel_base(channel)?;
        self.ranges[channel] = range;
        Ok(())
    }
}
