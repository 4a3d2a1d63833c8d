//! CLI command definitions.
//!
//! This module defines all CLI commands and their arguments using clap.

use clap::{Parser, Subcommand};
use std::path::PathBuf;

use crate::planner::ApplyPhase;

/// helmsync - Declarative Helm release reconciliation.
#[derive(Parser, Debug)]
#[command(name = "helmsync")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Path to the settings file.
    #[arg(short, long, global = true, env = "HELMSYNC_CONFIG")]
    pub config: Option<PathBuf>,

    /// Enable verbose output.
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Output format (text, json).
    #[arg(long, global = true, default_value = "text")]
    pub output: OutputFormat,

    /// Log format (text, json).
    #[arg(long, global = true, default_value = "text")]
    pub log_format: LogFormat,

    /// Subcommand to execute.
    #[command(subcommand)]
    pub command: Commands,
}

/// Available CLI commands.
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Validate the settings and component declarations.
    Validate {
        /// Show all warnings, not just errors.
        #[arg(short, long)]
        warnings: bool,
    },

    /// Compute and display the apply plan.
    Plan {
        /// Show field-level changes.
        #[arg(short, long)]
        detailed: bool,
    },

    /// Apply the plan against the cluster.
    Apply {
        /// Skip confirmation prompt.
        #[arg(short, long)]
        yes: bool,

        /// Ask helm to validate without changing anything.
        #[arg(long)]
        dry_run: bool,

        /// Recreate every updated release and reuse release names.
        #[arg(long)]
        force: bool,

        /// Attempt every component even after a failure.
        #[arg(long)]
        continue_on_error: bool,

        /// Stage to skip (create, update, delete). Can be repeated.
        #[arg(long = "disable", value_name = "STAGE")]
        disabled_stages: Vec<ApplyPhase>,
    },

    /// Check for drift between declarations and deployed releases.
    Drift,

    /// Show the deployment status of every component.
    Status,
}

/// Output format options.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, clap::ValueEnum)]
pub enum OutputFormat {
    /// Human-readable text output.
    #[default]
    Text,
    /// JSON output for scripting.
    Json,
}

/// Log format options.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, clap::ValueEnum)]
pub enum LogFormat {
    /// Human-readable log lines.
    #[default]
    Text,
    /// One JSON object per event.
    Json,
}

impl Cli {
    /// Parses CLI arguments from the command line.
    #[must_use]
    pub fn parse_args() -> Self {
        Self::parse()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_definition_is_consistent() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_parse_apply_flags() {
        let cli = Cli::try_parse_from([
            "helmsync",
            "--output",
            "json",
            "apply",
            "--yes",
            "--dry-run",
            "--continue-on-error",
            "--disable",
            "delete",
            "--disable",
            "update",
        ])
        .unwrap();

        assert_eq!(cli.output, OutputFormat::Json);
        match cli.command {
            Commands::Apply {
                yes,
                dry_run,
                force,
                continue_on_error,
                disabled_stages,
            } => {
                assert!(yes);
                assert!(dry_run);
                assert!(!force);
                assert!(continue_on_error);
                assert_eq!(disabled_stages, vec![ApplyPhase::Delete, ApplyPhase::Update]);
            }
            other => panic!("unexpected command: {other:?}"),
        }
    }

    #[test]
    fn test_rejects_unknown_stage() {
        let result = Cli::try_parse_from(["helmsync", "apply", "--disable", "rollback"]);
        assert!(result.is_err());
    }

    #[test]
    fn test_global_flags_after_subcommand() {
        let cli =
            Cli::try_parse_from(["helmsync", "drift", "--verbose", "--log-format", "json"]).unwrap();
        assert!(cli.verbose);
        assert_eq!(cli.log_format, LogFormat::Json);
        assert!(matches!(cli.command, Commands::Drift));
    }
}
