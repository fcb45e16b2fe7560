//! Servo layer - the capability interface the motion code drives.
//!
//! This module provides:
//! - `ServoBus` trait: set/get angle per channel, pulse-width calibration
//! - `PulseRange`: angle to pulse-width mapping
//! - `Pca9685`: 16-channel PWM driver over a `RegisterBus`
//! - `MockServoBus`: recording fake for tests and dry runs

pub mod mock;
pub mod pca9685;

#[cfg(target_os = "linux")]
pub mod i2c;

use serde::{Deserialize, Serialize};

use crate::error::{ArmError, Result};

pub use mock::{MockServoBus, ServoLog, ServoWrite};
pub use pca9685::{Pca9685, RegisterBus};

/// Per-channel angle control.
///
/// Angles are in degrees. `angle()` returns the last commanded angle, or
/// `None` when the channel has never been written since power-up.
pub trait ServoBus: Send {
    /// Number of addressable channels
    fn channels(&self) -> usize;

    /// Command a channel to an angle
    fn set_angle(&mut self, channel: usize, degrees: f64) -> Result<()>;

    /// Last commanded angle for a channel
    fn angle(&self, channel: usize) -> Option<f64>;

    /// Configure the pulse width that maps to the channel's angle range
    fn set_pulse_width_range(&mut self, channel: usize, range: PulseRange) -> Result<()>;
}

impl ServoBus for Box<dyn ServoBus> {
    fn channels(&self) -> usize {
        (**self).channels()
    }

    fn set_angle(&mut self, channel: usize, degrees: f64) -> Result<()> {
        (**self).set_angle(channel, degrees)
    }

    fn angle(&self, channel: usize) -> Option<f64> {
        (**self).angle(channel)
    }

    fn set_pulse_width_range(&mut self, channel: usize, range: PulseRange) -> Result<()> {
        (**self).set_pulse_width_range(channel, range)
    }
}

/// Pulse width (microseconds) spanning a servo's actuation range.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PulseRange {
    pub min_us: u32,
    pub max_us: u32,
    /// Degrees covered between `min_us` and `max_us`
    pub actuation_range: f64,
}

impl Default for PulseRange {
    fn default() -> Self {
        Self {
            min_us: 500,
            max_us: 2500,
            actuation_range: 180.0,
        }
    }
}

impl PulseRange {
    pub fn new(min_us: u32, max_us: u32, actuation_range: f64) -> Result<Self> {
        if min_us >= max_us {
            return Err(ArmError::Config(format!(
                "pulse min ({}us) must be below max ({}us)",
                min_us, max_us
            )));
        }
        if actuation_range <= 0.0 {
            return Err(ArmError::Config(format!(
                "actuation range must be positive, got {}",
                actuation_range
            )));
        }
        Ok(Self {
            min_us,
            max_us,
            actuation_range,
        })
    }

    /// Pulse width in microseconds for an angle.
    pub fn pulse_for(&self, degrees: f64) -> Result<f64> {
        check_angle(degrees, self.actuation_range)?;
        let span = (self.max_us - self.min_us) as f64;
        Ok(self.min_us as f64 + span * degrees / self.actuation_range)
    }
}

/// Reject angles outside `0..=max`.
pub fn check_angle(degrees: f64, max: f64) -> Result<()> {
    if !degrees.is_finite() || !(0.0..=max).contains(&degrees) {
        return Err(ArmError::AngleOutOfRange { angle: degrees, max });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_pulse_range() {
        let range = PulseRange::default();
        assert_eq!(range.min_us, 500);
        assert_eq!(range.max_us, 2500);
        assert_eq!(range.actuation_range, 180.0);
    }

    #[test]
    fn test_pulse_for_endpoints_and_midpoint() {
        let range = PulseRange::default();
        assert_eq!(range.pulse_for(0.0).unwrap(), 500.0);
        assert_eq!(range.pulse_for(90.0).unwrap(), 1500.0);
        assert_eq!(range.pulse_for(180.0).unwrap(), 2500.0);
    }

    #[test]
    fn test_pulse_for_rejects_out_of_range() {
        let range = PulseRange::default();
        assert!(matches!(
            range.pulse_for(181.0),
            Err(ArmError::AngleOutOfRange { .. })
        ));
        assert!(range.pulse_for(-1.0).is_err());
        assert!(range.pulse_for(f64::NAN).is_err());
    }

    #[test]
    fn test_pulse_range_new_validates() {
        assert!(PulseRange::new(2500, 500, 180.0).is_err());
        assert!(PulseRange::new(500, 2500, 0.0).is_err());
        assert!(PulseRange::new(1000, 2000, 90.0).is_ok());
    }

    #[test]
    fn test_boxed_bus_delegates() {
        let mock = MockServoBus::new(16);
        let log = mock.log();
        let mut bus: Box<dyn ServoBus> = Box::new(mock);

        assert_eq!(bus.channels(), 16);
        assert_eq!(bus.angle(3), None);
        bus.set_angle(3, 45.0).unwrap();
        assert_eq!(bus.angle(3), Some(45.0));
        assert_eq!(log.writes().len(), 1);
    }
}
