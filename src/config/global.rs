//! Global configuration.
//!
//! Loaded from ./pickarm.yml or ~/.config/pickarm/pickarm.yml

use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use colored::*;
use eyre::{Context, Result};
use log::LevelFilter;
use serde::{Deserialize, Serialize};

use crate::cloud::AuthConfig;
use crate::motion::{ACTUATOR_COUNT, Completion, MotionSettings, Pose, Script};
use crate::servo::PulseRange;
use crate::servo::pca9685::CHANNELS;

/// Global configuration for pickarm.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(default)]
pub struct GlobalConfig {
    /// Log level when RUST_LOG is unset.
    #[serde(rename = "log-level")]
    pub log_level: Option<String>,

    /// Servo controller settings.
    pub servo: ServoConfig,

    /// Motion timing and poses.
    pub motion: MotionConfig,

    /// Cloud status store.
    pub cloud: CloudConfig,
}

impl GlobalConfig {
    /// Load configuration with fallback chain.
    ///
    /// Search order:
    /// 1. Explicit path if provided
    /// 2. pickarm.yml in current directory
    /// 3. ~/.config/pickarm/pickarm.yml
    /// 4. Defaults
    pub fn load(config_path: Option<&PathBuf>) -> Result<Self> {
        // Explicit path takes precedence
        if let Some(path) = config_path {
            return Self::load_from_file(path)
                .context(format!("Failed to load config from {}", path.display()));
        }

        let project_name = env!("CARGO_PKG_NAME");

        // Try project config
        let project_config = PathBuf::from(format!("{}.yml", project_name));
        if project_config.exists() {
            match Self::load_from_file(&project_config) {
                Ok(config) => {
                    log::info!("Loaded config from {}", project_config.display());
                    return Ok(config);
                }
                Err(e) => {
                    log::warn!("Failed to load {}: {}", project_config.display(), e);
                    eprintln!(
                        "{} {}: {:#}",
                        "Ignoring unreadable config".yellow(),
                        project_config.display(),
                        e
                    );
                }
            }
        }

        // Try user config
        if let Some(config_dir) = dirs::config_dir() {
            let user_config = config_dir
                .join(project_name)
                .join(format!("{}.yml", project_name));
            if user_config.exists() {
                match Self::load_from_file(&user_config) {
                    Ok(config) => {
                        log::info!("Loaded config from {}", user_config.display());
                        return Ok(config);
                    }
                    Err(e) => {
                        log::warn!("Failed to load {}: {}", user_config.display(), e);
                        eprintln!(
                            "{} {}: {:#}",
                            "Ignoring unreadable config".yellow(),
                            user_config.display(),
                            e
                        );
                    }
                }
            }
        }

        // Use defaults
        log::info!("No config file found, using defaults");
        Ok(Self::default())
    }

    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = fs::read_to_string(&path).context("Failed to read config file")?;
        let config: Self = serde_yaml::from_str(&content).context("Failed to parse config file")?;
        Ok(config)
    }

    /// Validate everything that does not need the network.
    pub fn validate(&self) -> Result<()> {
        if let Some(level) = &self.log_level {
            level
                .parse::<LevelFilter>()
                .map_err(|_| eyre::eyre!("log-level '{}' is not a log level", level))?;
        }
        self.pulse_range()?;
        if !(24.0..=1526.0).contains(&self.servo.frequency_hz) {
            eyre::bail!("servo.frequency-hz must be within 24..=1526");
        }
        if !(ACTUATOR_COUNT..=CHANNELS).contains(&self.servo.channels) {
            eyre::bail!(
                "servo.channels must be within {}..={}",
                ACTUATOR_COUNT,
                CHANNELS
            );
        }
        if self.motion.steps == 0 {
            eyre::bail!("motion.steps must be > 0");
        }
        let max = self.servo.actuation_range;
        self.motion
            .default_pose
            .validate(max)
            .context("motion.default-pose")?;
        if !(0.0..=max).contains(&self.motion.neutral_angle) {
            eyre::bail!("motion.neutral-angle must be within 0..={}", max);
        }
        if let Some(script) = &self.motion.script {
            script.validate(max)?;
        }
        if self.cloud.trigger_value.trim().is_empty() {
            eyre::bail!("cloud.trigger-value must not be empty");
        }
        if self.cloud.completion_value.trim().is_empty() {
            eyre::bail!("cloud.completion-value must not be empty");
        }
        Ok(())
    }

    /// Validate, additionally requiring a database URL.
    pub fn validate_for_cloud(&self) -> Result<()> {
        self.validate()?;
        if self.cloud.database_url.trim().is_empty() {
            eyre::bail!("cloud.database-url must be set");
        }
        Ok(())
    }

    /// Level used when RUST_LOG is unset; info unless configured.
    pub fn log_level_filter(&self) -> LevelFilter {
        self.log_level
            .as_deref()
            .and_then(|level| level.parse().ok())
            .unwrap_or(LevelFilter::Info)
    }

    pub fn pulse_range(&self) -> Result<PulseRange> {
        PulseRange::new(
            self.servo.pulse_min_us,
            self.servo.pulse_max_us,
            self.servo.actuation_range,
        )
        .context("servo pulse range")
    }

    /// Sequencer settings derived from the motion and cloud sections.
    pub fn motion_settings(&self) -> MotionSettings {
        MotionSettings {
            steps: self.motion.steps,
            step_delay: Duration::from_millis(self.motion.step_delay_ms),
            settle: Duration::from_millis(self.motion.settle_ms),
            neutral_angle: self.motion.neutral_angle,
            unknown_angle: self.servo.actuation_range / 2.0,
            max_angle: self.servo.actuation_range,
            default_pose: self.motion.default_pose,
            completion: Completion {
                key: self.cloud.status_path.clone(),
                value: self.cloud.completion_value.clone(),
            },
        }
    }

    /// Script to run on a trigger.
    pub fn script(&self) -> Script {
        self.motion.script.clone().unwrap_or_else(Script::pick_and_place)
    }
}

/// PCA9685 settings.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ServoConfig {
    /// I2C bus number (/dev/i2c-N).
    #[serde(rename = "i2c-bus")]
    pub i2c_bus: u8,

    /// Chip address.
    pub address: u16,

    /// Channels on the simulated bus used by --dry-run. The PCA9685 always
    /// has 16.
    pub channels: usize,

    /// PWM frequency.
    #[serde(rename = "frequency-hz")]
    pub frequency_hz: f64,

    #[serde(rename = "pulse-min-us")]
    pub pulse_min_us: u32,

    #[serde(rename = "pulse-max-us")]
    pub pulse_max_us: u32,

    /// Degrees between min and max pulse.
    #[serde(rename = "actuation-range")]
    pub actuation_range: f64,
}

impl Default for ServoConfig {
    fn default() -> Self {
        Self {
            i2c_bus: 1,
            address: 0x40,
            channels: 16,
            frequency_hz: 50.0,
            pulse_min_us: 500,
            pulse_max_us: 2500,
            actuation_range: 180.0,
        }
    }
}

/// Motion timing and poses.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct MotionConfig {
    /// Steps per ramp.
    pub steps: u32,

    #[serde(rename = "step-delay-ms")]
    pub step_delay_ms: u64,

    /// Pause after the startup reset.
    #[serde(rename = "settle-ms")]
    pub settle_ms: u64,

    /// Shutdown angle for every joint.
    #[serde(rename = "neutral-angle")]
    pub neutral_angle: f64,

    #[serde(rename = "default-pose")]
    pub default_pose: Pose,

    /// Replaces the built-in pick-and-place script.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub script: Option<Script>,
}

impl Default for MotionConfig {
    fn default() -> Self {
        Self {
            steps: 20,
            step_delay_ms: 50,
            settle_ms: 1000,
            neutral_angle: 90.0,
            default_pose: Pose::default_pose(),
            script: None,
        }
    }
}

/// Realtime Database settings.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct CloudConfig {
    #[serde(rename = "database-url")]
    pub database_url: String,

    /// Key watched for the trigger and written on completion.
    #[serde(rename = "status-path")]
    pub status_path: String,

    /// Key reserved for remote servo control.
    #[serde(rename = "servo-path")]
    pub servo_path: String,

    #[serde(rename = "trigger-value")]
    pub trigger_value: String,

    #[serde(rename = "completion-value")]
    pub completion_value: String,

    /// Startup budget for auth and the first read.
    #[serde(rename = "connect-timeout-ms")]
    pub connect_timeout_ms: u64,

    pub auth: AuthConfig,
}

impl Default for CloudConfig {
    fn default() -> Self {
        Self {
            database_url: String::new(),
            status_path: "robot/status".to_string(),
            servo_path: "arm/servos".to_string(),
            trigger_value: "waiting".to_string(),
            completion_value: "task_done".to_string(),
            connect_timeout_ms: 10_000,
            auth: AuthConfig::default(),
        }
    }
}

impl CloudConfig {
    pub fn connect_timeout(&self) -> Duration {
        Duration::from_millis(self.connect_timeout_ms)
    }
}
