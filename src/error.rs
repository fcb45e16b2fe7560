//! Error types for pickarm
//!
//! Centralized error handling using thiserror.

use thiserror::Error;

/// All error types that can occur in pickarm
#[derive(Debug, Error)]
pub enum ArmError {
    /// Actuator index outside the pose
    #[error("Invalid joint: {index} (arm has {count} actuators)")]
    InvalidJoint { index: usize, count: usize },

    /// Angle outside the actuator's physical range
    #[error("Angle out of range: {angle} (allowed 0..={max})")]
    AngleOutOfRange { angle: f64, max: f64 },

    /// Interpolation needs at least one step
    #[error("Invalid step count: {0}")]
    InvalidSteps(u32),

    /// Servo driver / bus failure
    #[error("Servo error: {0}")]
    Servo(String),

    /// Cloud store error
    #[error("Cloud error: {0}")]
    Cloud(String),

    /// Authentication against the cloud store failed
    #[error("Auth error: {0}")]
    Auth(String),

    /// Configuration is invalid
    #[error("Config error: {0}")]
    Config(String),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization/deserialization error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// YAML parsing error
    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    /// HTTP transport error
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),
}

/// Result type alias for pickarm operations
pub type Result<T> = std::result::Result<T, ArmError>;
