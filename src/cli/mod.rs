//! CLI module for helmsync.
//!
//! This module provides the command-line interface for planning and
//! applying component releases.

mod commands;
mod output;

pub use commands::{Cli, Commands, LogFormat, OutputFormat};
pub use output::OutputFormatter;
