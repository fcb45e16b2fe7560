//! CLI command definitions using clap.
//!
//! Defines the main CLI structure and subcommands:
//! - run: the trigger service (default)
//! - sequence: run the task script once
//! - reset: move the arm to its default or neutral pose
//! - status / set-status: read or write the status key

use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// Pickarm - cloud-triggered pick-and-place arm controller
#[derive(Parser, Debug)]
#[command(name = "pickarm")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Optional config file path
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    /// Verbose output
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Subcommand to execute
    #[command(subcommand)]
    pub command: Option<Commands>,
}

impl Cli {
    /// Check if verbose mode is enabled
    pub fn is_verbose(&self) -> bool {
        self.verbose
    }
}

/// Main subcommands
#[derive(Subcommand, Debug, Clone, PartialEq, Eq)]
pub enum Commands {
    /// Watch the status key and run the task on each trigger
    Run {
        /// Use a simulated servo bus instead of the PCA9685
        #[arg(long)]
        dry_run: bool,
    },

    /// Run the task script once, then return
    Sequence {
        /// Use a simulated servo bus instead of the PCA9685
        #[arg(long)]
        dry_run: bool,

        /// Write the completion value to the cloud store
        #[arg(short, long)]
        publish: bool,
    },

    /// Move every joint to the default pose
    Reset {
        /// Use the neutral angle instead of the default pose
        #[arg(short, long)]
        neutral: bool,

        /// Use a simulated servo bus instead of the PCA9685
        #[arg(long)]
        dry_run: bool,
    },

    /// Print the current status value
    Status,

    /// Write a status value (e.g. "waiting" to trigger a run)
    SetStatus {
        /// Value to write
        value: String,
    },
}
