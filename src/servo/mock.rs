//! Recording servo bus.
//!
//! Used by tests and by `--dry-run`, where the arm is absent but the rest of
//! the controller should behave as in production.

use std::sync::{Arc, Mutex, PoisonError};

use tokio::time::Instant;

use crate::error::{ArmError, Result};
use crate::servo::{PulseRange, ServoBus, check_angle};

/// One recorded angle command.
#[derive(Debug, Clone, PartialEq)]
pub struct ServoWrite {
    pub channel: usize,
    pub angle: f64,
    pub at: Instant,
}

#[derive(Debug, Default)]
struct LogInner {
    writes: Vec<ServoWrite>,
    calibrations: Vec<(usize, PulseRange)>,
}

/// Shared view of everything a `MockServoBus` was asked to do.
///
/// Cloned handles stay valid after the bus is moved into a sequencer.
#[derive(Debug, Clone, Default)]
pub struct ServoLog {
    inner: Arc<Mutex<LogInner>>,
}

impl ServoLog {
    pub fn writes(&self) -> Vec<ServoWrite> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner).writes.clone()
    }

    /// Angles written to one channel, in order
    pub fn angles_for(&self, channel: usize) -> Vec<f64> {
        self.writes()
            .into_iter()
            .filter(|w| w.channel == channel)
            .map(|w| w.angle)
            .collect()
    }

    pub fn calibrations(&self) -> Vec<(usize, PulseRange)> {
        self.inner
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .calibrations
            .clone()
    }

    pub fn clear(&self) {
        let mut inner = self.inner.lock().unwrap_or_else(PoisonError::into_inner);
        inner.writes.clear();
        inner.calibrations.clear();
    }

    fn record_write(&self, write: ServoWrite) {
        self.inner
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .writes
            .push(write);
    }

    fn record_calibration(&self, channel: usize, range: PulseRange) {
        self.inner
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .calibrations
            .push((channel, range));
    }
}

/// In-memory servo bus that records every command.
#[derive(Debug)]
pub struct MockServoBus {
    angles: Vec<Option<f64>>,
    ranges: Vec<PulseRange>,
    log: ServoLog,
    /// Fail the n-th angle write (0-based), if set
    fail_at: Option<usize>,
    write_count: usize,
}

impl MockServoBus {
    pub fn new(channels: usize) -> Self {
        Self {
            angles: vec![None; channels],
            ranges: vec![PulseRange::default(); channels],
            log: ServoLog::default(),
            fail_at: None,
            write_count: 0,
        }
    }

    /// Make the n-th angle write (0-based) fail with a servo error.
    pub fn fail_on_write(mut self, n: usize) -> Self {
        self.fail_at = Some(n);
        self
    }

    /// Preset a channel's position without recording a write.
    pub fn with_angle(mut self, channel: usize, degrees: f64) -> Self {
        if let Some(slot) = self.angles.get_mut(channel) {
            *slot = Some(degrees);
        }
        self
    }

    pub fn log(&self) -> ServoLog {
        self.log.clone()
    }

    fn check_channel(&self, channel: usize) -> Result<()> {
        if channel >= self.angles.len() {
            return Err(ArmError::InvalidJoint {
                index: channel,
                count: self.angles.len(),
            });
        }
        Ok(())
    }
}

impl ServoBus for MockServoBus {
    fn channels(&self) -> usize {
        self.angles.len()
    }

    fn set_angle(&mut self, channel: usize, degrees: f64) -> Result<()> {
        self.check_channel(channel)?;
        check_angle(degrees, self.ranges[channel].actuation_range)?;

        let n = self.write_count;
        self.write_count += 1;
        if self.fail_at == Some(n) {
            return Err(ArmError::Servo(format!("injected failure on write {}", n)));
        }

        self.angles[channel] = Some(degrees);
        self.log.record_write(ServoWrite {
            channel,
            angle: degrees,
            at: Instant::now(),
        });
        Ok(())
    }

    fn angle(&self, channel: usize) -> Option<f64> {
        self.angles.get(channel).copied().flatten()
    }

    fn set_pulse_width_range(&mut self, channel: usize, range: PulseRange) -> Result<()> {
        self.check_channel(channel)?;
        self.ranges[channel] = range;
        self.log.record_calibration(channel, range);
        Ok(())
    }
}
