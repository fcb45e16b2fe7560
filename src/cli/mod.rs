//! CLI module for pickarm - command-line interface and subcommands.
//!
//! With no subcommand the controller service runs, same as `pickarm run`.

pub mod commands;

pub use commands::Cli;
