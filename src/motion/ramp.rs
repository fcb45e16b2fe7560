//! Linear angle ramps.

use crate::error::{ArmError, Result};

/// `steps + 1` evenly spaced angles from `current` to `target`, inclusive.
///
/// The last element is exactly `target`, independent of float rounding.
pub fn ramp(current: f64, target: f64, steps: u32) -> Result<Vec<f64>> {
    if steps == 0 {
        return Err(ArmError::InvalidSteps(steps));
    }

    let delta = target - current;
    let n = steps as f64;
    let points = (0..=steps)
        .map(|i| {
            if i == steps {
                target
            } else {
                current + delta * i as f64 / n
            }
        })
        .collect();
    Ok(points)
}
