//! Motion - poses, ramps, scripts and the sequencer that runs them.
//!
//! This module provides:
//! - `Pose`: one angle per actuator
//! - `ramp`: evenly spaced intermediate angles
//! - `Script` / `Step`: the task as data, pick-and-place by default
//! - `Sequencer`: drives a `ServoBus` through a script

pub mod pose;
pub mod ramp;
pub mod script;
pub mod sequencer;

pub use pose::{ACTUATOR_COUNT, Pose};
pub use ramp::ramp;
pub use script::{Script, Step};
pub use sequencer::{Completion, MotionSettings, SequenceReport, Sequencer};
