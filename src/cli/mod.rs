//! CLI module for SuperLink
//!
//! Argument parsing and the handlers behind each subcommand.

pub mod args;
pub mod commands;

pub use args::{Args, Commands, Verbosity};
pub use commands::run;
