//! Pose: one angle per actuator.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::{ArmError, Result};
use crate::servo::check_angle;

/// Actuators on the arm: base, shoulder, elbow, wrist pitch, wrist roll, gripper.
pub const ACTUATOR_COUNT: usize = 6;

/// Angles (degrees) for every actuator at one instant.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Pose([f64; ACTUATOR_COUNT]);

impl Pose {
    /// Build a pose, checking each angle against `0..=max`.
    pub fn new(angles: [f64; ACTUATOR_COUNT], max: f64) -> Result<Self> {
        let pose = Self(angles);
        pose.validate(max)?;
        Ok(pose)
    }

    /// Same angle on every actuator.
    pub fn uniform(angle: f64) -> Self {
        Self([angle; ACTUATOR_COUNT])
    }

    /// Startup / reset pose: joints centred, gripper open.
    pub fn default_pose() -> Self {
        Self([90.0, 90.0, 90.0, 90.0, 90.0, 100.0])
    }

    pub fn validate(&self, max: f64) -> Result<()> {
        self.0.iter().try_for_each(|&angle| check_angle(angle, max))
    }

    pub fn get(&self, joint: usize) -> Result<f64> {
        self.0.get(joint).copied().ok_or(ArmError::InvalidJoint {
            index: joint,
            count: ACTUATOR_COUNT,
        })
    }

    pub fn angles(&self) -> &[f64; ACTUATOR_COUNT] {
        &self.0
    }

    pub fn iter(&self) -> impl Iterator<Item = (usize, f64)> + '_ {
        self.0.iter().copied().enumerate()
    }
}

impl Default for Pose {
    fn default() -> Self {
        Self::default_pose()
    }
}

impl fmt::Display for Pose {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let parts: Vec<String> = self.0.iter().map(|a| format!("{:.0}", a)).collect();
        write!(f, "[{}]", parts.join(", "))
    }
}
