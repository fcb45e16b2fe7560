//! Pickarm - a six-servo pick-and-place arm driven by a cloud status key.
//!
//! The controller watches one key in a Firebase Realtime Database. When the
//! key reads "waiting" the arm runs its pick-and-place script, writes
//! "task_done" back to the same key and returns to its default pose.

pub mod bridge;
pub mod cloud;
pub mod config;
pub mod daemon;
pub mod error;
pub mod motion;
pub mod servo;

pub use error::{ArmError, Result};
