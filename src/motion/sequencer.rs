//! Sequencer - runs motion scripts against a servo bus.
//!
//! The sequencer owns the servo bus. Every angle it writes goes through
//! `ServoBus`, and the completion signal goes through `StatusStore`, so both
//! can be swapped for recording fakes.

use std::sync::Arc;
use std::time::Duration;

use colored::*;
use serde_json::Value;
use tokio::time::{Instant, sleep};

use crate::cloud::StatusStore;
use crate::error::{ArmError, Result};
use crate::motion::pose::{ACTUATOR_COUNT, Pose};
use crate::motion::ramp::ramp;
use crate::motion::script::{Script, Step};
use crate::servo::{PulseRange, ServoBus, check_angle};

/// Where and what to publish when a script reaches `Step::Publish`.
#[derive(Debug, Clone, PartialEq)]
pub struct Completion {
    pub key: String,
    pub value: String,
}

impl Default for Completion {
    fn default() -> Self {
        Self {
            key: "robot/status".to_string(),
            value: "task_done".to_string(),
        }
    }
}

/// Timing and pose settings for the sequencer.
#[derive(Debug, Clone)]
pub struct MotionSettings {
    /// Ramp step count
    pub steps: u32,
    /// Pause after each ramp write
    pub step_delay: Duration,
    /// Pause after a direct reset
    pub settle: Duration,
    /// Angle used for the shutdown reset
    pub neutral_angle: f64,
    /// Assumed position of a channel that was never written
    pub unknown_angle: f64,
    /// Physical range of every actuator
    pub max_angle: f64,
    pub default_pose: Pose,
    pub completion: Completion,
}

impl Default for MotionSettings {
    fn default() -> Self {
        Self {
            steps: 20,
            step_delay: Duration::from_millis(50),
            settle: Duration::from_secs(1),
            neutral_angle: 90.0,
            unknown_angle: 90.0,
            max_angle: 180.0,
            default_pose: Pose::default_pose(),
            completion: Completion::default(),
        }
    }
}

/// What a script run did.
#[derive(Debug, Clone, PartialEq)]
pub struct SequenceReport {
    pub script: String,
    /// Start of the script until just before the first `Home` step
    pub active: Duration,
    pub total: Duration,
    pub publishes: usize,
    pub writes: usize,
}

/// Executes motion scripts on one arm.
pub struct Sequencer<S, P>
where
    S: ServoBus,
    P: StatusStore,
{
    bus: S,
    publisher: Arc<P>,
    settings: MotionSettings,
    script: Script,
    writes: usize,
}

impl<S, P> Sequencer<S, P>
where
    S: ServoBus,
    P: StatusStore,
{
    /// Sequencer running the built-in pick-and-place script.
    pub fn new(bus: S, publisher: Arc<P>, settings: MotionSettings) -> Self {
        Self {
            bus,
            publisher,
            settings,
            script: Script::pick_and_place(),
            writes: 0,
        }
    }

    /// Replace the script run by `run_default_sequence`.
    pub fn with_script(mut self, script: Script) -> Result<Self> {
        script.validate(self.settings.max_angle)?;
        self.script = script;
        Ok(self)
    }

    pub fn settings(&self) -> &MotionSettings {
        &self.settings
    }

    pub fn script(&self) -> &Script {
        &self.script
    }

    pub fn bus(&self) -> &S {
        &self.bus
    }

    /// Last commanded angle per actuator.
    pub fn positions(&self) -> [Option<f64>; ACTUATOR_COUNT] {
        std::array::from_fn(|joint| self.bus.angle(joint))
    }

    /// Apply one pulse-width range to every channel on the bus.
    pub fn calibrate(&mut self, range: PulseRange) -> Result<()> {
        for channel in 0..self.bus.channels() {
            self.bus.set_pulse_width_range(channel, range)?;
        }
        log::info!(
            "Calibrated {} channels to {}-{}us",
            self.bus.channels(),
            range.min_us,
            range.max_us
        );
        Ok(())
    }

    /// Ramp a joint to `target` with the configured step count and delay.
    pub async fn interpolate(&mut self, joint: usize, target: f64) -> Result<()> {
        let steps = self.settings.steps;
        let delay = self.settings.step_delay;
        self.interpolate_with(joint, target, steps, delay).await
    }

    /// Ramp a joint to `target`, sleeping `step_delay` after every write.
    ///
    /// Starts from the last commanded angle, or the configured unknown angle
    /// when the channel was never written.
    pub async fn interpolate_with(
        &mut self,
        joint: usize,
        target: f64,
        steps: u32,
        step_delay: Duration,
    ) -> Result<()> {
        self.check_joint(joint)?;
        check_angle(target, self.settings.max_angle)?;

        let current = self.bus.angle(joint).unwrap_or(self.settings.unknown_angle);
        let points = ramp(current, target, steps)?;
        log::debug!(
            "Joint {}: {:.1} -> {:.1} in {} steps",
            joint,
            current,
            target,
            steps
        );

        for angle in points {
            self.write(joint, angle)?;
            sleep(step_delay).await;
        }
        Ok(())
    }

    /// Command a joint without ramping.
    pub fn set_direct(&mut self, joint: usize, angle: f64) -> Result<()> {
        self.check_joint(joint)?;
        check_angle(angle, self.settings.max_angle)?;
        self.write(joint, angle)
    }

    /// Set every joint directly to the default pose, then settle.
    pub async fn reset_to_default(&mut self) -> Result<()> {
        println!("{}", "Initializing to default angles...".cyan());
        log::info!("Resetting to default pose {}", self.settings.default_pose);

        let pose = self.settings.default_pose;
        for (joint, angle) in pose.iter() {
            self.set_direct(joint, angle)?;
        }
        sleep(self.settings.settle).await;
        Ok(())
    }

    /// Ramp every joint back to the default pose.
    pub async fn home(&mut self) -> Result<()> {
        let pose = self.settings.default_pose;
        for (joint, angle) in pose.iter() {
            self.interpolate(joint, angle).await?;
        }
        Ok(())
    }

    /// Set every joint directly to the neutral angle. No settle.
    pub fn neutral(&mut self) -> Result<()> {
        let angle = self.settings.neutral_angle;
        log::info!("Moving all joints to neutral {}", angle);
        for joint in 0..ACTUATOR_COUNT {
            self.set_direct(joint, angle)?;
        }
        Ok(())
    }

    /// Write the completion signal.
    pub async fn publish_completion(&mut self) -> Result<()> {
        let Completion { key, value } = &self.settings.completion;
        self.publisher
            .set(key, Value::String(value.clone()))
            .await?;
        println!("{} {} = {}", "Task completed, status set:".green(), key, value);
        log::info!("Published {} = {}", key, value);
        Ok(())
    }

    /// Run the configured task script (pick-and-place unless overridden).
    pub async fn run_default_sequence(&mut self) -> Result<SequenceReport> {
        let script = self.script.clone();
        self.run_script(&script).await
    }

    /// Run a script step by step. The first failing step aborts the run.
    pub async fn run_script(&mut self, script: &Script) -> Result<SequenceReport> {
        script.validate(self.settings.max_angle)?;

        println!("{} {}", "Starting movement sequence:".cyan(), script.name);
        log::info!(
            "Starting script '{}' ({} steps)",
            script.name,
            script.steps.len()
        );

        let started = Instant::now();
        let writes_before = self.writes;
        let mut active = None;
        let mut publishes = 0;

        for step in &script.steps {
            match step {
                Step::Interpolate {
                    joint,
                    target,
                    steps,
                    step_delay_ms,
                } => {
                    let steps = steps.unwrap_or(self.settings.steps);
                    let delay = step_delay_ms
                        .map(Duration::from_millis)
                        .unwrap_or(self.settings.step_delay);
                    self.interpolate_with(*joint, *target, steps, delay).await?;
                }
                Step::Set { joint, angle } => self.set_direct(*joint, *angle)?,
                Step::Hold { ms } => sleep(Duration::from_millis(*ms)).await,
                Step::Say { message } => {
                    println!("{}", message.yellow());
                    log::info!("{}", message);
                }
                Step::Publish => {
                    self.publish_completion().await?;
                    publishes += 1;
                }
                Step::Home => {
                    if active.is_none() {
                        let elapsed = started.elapsed();
                        println!(
                            "{} {:.3} seconds",
                            "Task duration (excluding reset):".cyan(),
                            elapsed.as_secs_f64()
                        );
                        log::info!("Script '{}' active for {:?}", script.name, elapsed);
                        active = Some(elapsed);
                    }
                    println!("{}", "Returning to default angles...".cyan());
                    self.home().await?;
                }
            }
        }

        let total = started.elapsed();
        log::info!("Script '{}' finished in {:?}", script.name, total);

        Ok(SequenceReport {
            script: script.name.clone(),
            active: active.unwrap_or(total),
            total,
            publishes,
            writes: self.writes - writes_before,
        })
    }

    fn check_joint(&self, joint: usize) -> Result<()> {
        if joint >= ACTUATOR_COUNT || joint >= self.bus.channels() {
            return Err(ArmError::InvalidJoint {
                index: joint,
                count: ACTUATOR_COUNT.min(self.bus.channels()),
            });
        }
        Ok(())
    }

    fn write(&mut self, joint: usize, angle: f64) -> Result<()> {
        self.bus.set_angle(joint, angle)?;
        self.writes += 1;
        Ok(())
    }
}
