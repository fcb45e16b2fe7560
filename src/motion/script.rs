//! Motion scripts - ordered typed steps run by the sequencer.
//!
//! The built-in pick-and-place task is a `Script`; the config file may
//! replace it with its own list of steps:
//!
//! ```yaml
//! motion:
//!   script:
//!     name: wave
//!     steps:
//!       - op: interpolate
//!         joint: 0
//!         target: 120
//!       - op: hold
//!         ms: 500
//!       - op: publish
//!       - op: home
//! ```

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{ArmError, Result};
use crate::motion::pose::ACTUATOR_COUNT;
use crate::servo::check_angle;

/// One action of a motion script.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "kebab-case")]
pub enum Step {
    /// Ramp one joint to a target angle
    Interpolate {
        joint: usize,
        target: f64,
        /// Overrides the configured step count
        #[serde(default, skip_serializing_if = "Option::is_none")]
        steps: Option<u32>,
        /// Overrides the configured per-step delay
        #[serde(
            default,
            rename = "step-delay-ms",
            skip_serializing_if = "Option::is_none"
        )]
        step_delay_ms: Option<u64>,
    },
    /// Command a joint directly, no ramp
    Set { joint: usize, angle: f64 },
    /// Pause
    Hold { ms: u64 },
    /// Console progress message
    Say { message: String },
    /// Write the completion signal
    Publish,
    /// Ramp every joint back to the default pose
    Home,
}

impl Step {
    pub fn interpolate(joint: usize, target: f64) -> Self {
        Step::Interpolate {
            joint,
            target,
            steps: None,
            step_delay_ms: None,
        }
    }

    pub fn set(joint: usize, angle: f64) -> Self {
        Step::Set { joint, angle }
    }

    pub fn hold(duration: Duration) -> Self {
        Step::Hold {
            ms: duration.as_millis() as u64,
        }
    }

    pub fn say(message: impl Into<String>) -> Self {
        Step::Say {
            message: message.into(),
        }
    }

    fn validate(&self, max_angle: f64) -> Result<()> {
        match self {
            Step::Interpolate {
                joint,
                target,
                steps,
                ..
            } => {
                check_joint(*joint)?;
                check_angle(*target, max_angle)?;
                if *steps == Some(0) {
                    return Err(ArmError::InvalidSteps(0));
                }
                Ok(())
            }
            Step::Set { joint, angle } => {
                check_joint(*joint)?;
                check_angle(*angle, max_angle)
            }
            Step::Hold { .. } | Step::Say { .. } | Step::Publish | Step::Home => Ok(()),
        }
    }
}

fn check_joint(joint: usize) -> Result<()> {
    if joint >= ACTUATOR_COUNT {
        return Err(ArmError::InvalidJoint {
            index: joint,
            count: ACTUATOR_COUNT,
        });
    }
    Ok(())
}

/// Named list of steps.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Script {
    pub name: String,
    pub steps: Vec<Step>,
}

impl Script {
    /// Approach, grip, carry to the drop-off, release, report, go home.
    pub fn pick_and_place() -> Self {
        Self {
            name: "pick-and-place".to_string(),
            steps: vec![
                Step::interpolate(1, 50.0),
                Step::interpolate(0, 160.0),
                Step::interpolate(1, 90.0),
                Step::interpolate(2, 70.0),
                Step::say("Grabbing object (servo 5)..."),
                Step::set(5, 180.0),
                Step::hold(Duration::from_millis(1000)),
                Step::interpolate(1, 60.0),
                Step::interpolate(0, 80.0),
                Step::interpolate(1, 90.0),
                Step::say("Releasing object..."),
                Step::set(5, 100.0),
                Step::hold(Duration::from_millis(400)),
                Step::Publish,
                Step::Home,
            ],
        }
    }

    /// Check every joint index and angle before anything moves.
    pub fn validate(&self, max_angle: f64) -> Result<()> {
        for (i, step) in self.steps.iter().enumerate() {
            step.validate(max_angle).map_err(|e| {
                ArmError::Config(format!("script '{}' step {}: {}", self.name, i, e))
            })?;
        }
        Ok(())
    }

    /// Number of `Publish` steps
    pub fn publish_count(&self) -> usize {
        self.steps.iter().filter(|s| matches!(s, Step::Publish)).count()
    }
}

impl Default for Script {
    fn default() -> Self {
        Self::pick_and_place()
    }
}
