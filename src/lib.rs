// ============================================================================
// Strict linting - Dangerous or non-idiomatic practices are forbidden
// ============================================================================

#![forbid(unsafe_code)]               // Unsafe code is forbidden
#![deny(missing_docs)]                // All public items must be documented
#![deny(non_camel_case_types)]        // Types must follow CamelCase convention
#![deny(unused_must_use)]             // Must handle Result and Option explicitly
#![deny(non_snake_case)]              // Variables and functions must be snake_case
#![deny(non_upper_case_globals)]      // Constants must be UPPER_CASE
#![deny(nonstandard_style)]           // Non-standard code style is forbidden
#![forbid(unsafe_op_in_unsafe_fn)]    // Unsafe ops in unsafe fns are forbidden

// Clippy lints (warnings only)
#![warn(clippy::all)]                 // All standard Clippy lints
#![warn(clippy::pedantic)]            // Very strict Clippy lints
#![warn(clippy::nursery)]             // Experimental lints
#![warn(clippy::unwrap_used)]         // unwrap() warning
#![warn(clippy::expect_used)]         // expect() warning
#![warn(clippy::panic)]               // panic!() warning
#![warn(clippy::print_stdout)]        // println!() warning
#![warn(clippy::todo)]                // TODO warning
#![warn(clippy::unimplemented)]       // unimplemented!() warning
#![warn(clippy::unwrap_in_result)]    // unwrap() in Result warning
#![warn(clippy::redundant_clone)]     // Useless clones warning
#![warn(clippy::too_many_arguments)]  // Limit function arguments
#![cfg_attr(test, allow(clippy::unwrap_used, clippy::expect_used, clippy::panic))]

// Safety and robustness lints
#![deny(overflowing_literals)]        // Overflowing literals are forbidden
#![deny(arithmetic_overflow)]         // Arithmetic overflow is forbidden

// ============================================================================
// Crate Documentation
// ============================================================================

//! # helmsync
//!
//! Declarative reconciliation of Helm releases and the secrets they mount.
//!
//! ## Overview
//!
//! Every component is declared in a YAML file: a chart reference, the values
//! passed to the chart, and the names of the secrets it needs. helmsync
//! compares the declarations with the releases deployed in the cluster and
//! runs the minimal set of installs, upgrades and uninstalls to converge.
//!
//! ## Architecture
//!
//! 1. **Desired state**: declarations, with secret values read from the
//!    environment
//! 2. **Current state**: deployed releases carrying helmsync metadata, with
//!    secret values read from the secret store
//! 3. **Executor**: diffs both, recreates releases that cannot be upgraded
//!    in place, then applies deletes, updates and creates in that order
//!
//! ## Modules
//!
//! - [`component`]: Component model and fingerprints
//! - [`config`]: Settings and declaration parsing and validation
//! - [`chart`]: Chart loading from local repositories
//! - [`release`]: Release backends (helm CLI, in-memory)
//! - [`secrets`]: Secret stores and sources
//! - [`planner`]: Diff, forced-update detection and the executor
//! - [`reconciler`]: Desired/current state assembly, drift and status
//! - [`cli`]: Command-line interface
//!
//! ## Example
//!
//! ```yaml
//! name: connector-hdfs
//! namespace: data
//! release:
//!   chart: repo/connector-hdfs:0.1.0
//!   version: 1.0.0
//! configuration:
//!   FlushSize: 3
//! secrets:
//!   - TestSecret1
//! ```

// ============================================================================
// Modules
// ============================================================================

pub mod chart;
pub mod cli;
pub mod component;
pub mod config;
pub mod error;
pub mod planner;
pub mod reconciler;
pub mod release;
pub mod secrets;

// ============================================================================
// Re-exports
// ============================================================================

pub use cli::{Cli, Commands, OutputFormatter};
pub use component::{Component, Components, Configuration, Metadata, Release};
pub use config::{ComponentDeclaration, ConfigParser, ConfigValidator, Settings};
pub use error::{HelmsyncError, Result};
pub use planner::{ApplyPlan, ApplyReport, Executor, ExecutorOptions, FailurePolicy};
pub use reconciler::{DriftReport, ReconciliationResult, Reconciler};
