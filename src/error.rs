//! Error types for the helmsync reconciliation system.
//!
//! This module provides the error hierarchy for every stage of a
//! reconciliation pass: configuration, secret storage, chart loading,
//! release operations and the apply phase itself.

use std::path::PathBuf;
use thiserror::Error;

use crate::planner::ApplyPhase;

/// The main error type for helmsync.
#[derive(Debug, Error)]
pub enum HelmsyncError {
    /// Configuration-related errors.
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    /// Secret store errors.
    #[error("Secret store error: {0}")]
    Secret(#[from] SecretError),

    /// Chart loading errors.
    #[error("Chart error: {0}")]
    Chart(#[from] ChartError),

    /// Release backend errors.
    #[error("Release backend error: {0}")]
    Release(#[from] ReleaseError),

    /// Apply phase errors.
    #[error("Apply error: {0}")]
    Apply(#[from] ApplyError),

    /// IO errors.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Generic internal error.
    #[error("Internal error: {0}")]
    Internal(String),
}

/// Configuration-related errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// The configuration file was not found.
    #[error("Configuration file not found: {path}")]
    FileNotFound {
        /// Path to the missing file.
        path: PathBuf,
    },

    /// A configuration or declaration file could not be parsed.
    #[error("Failed to parse configuration: {message}")]
    ParseError {
        /// Description of the parse error.
        message: String,
        /// Optional source location.
        location: Option<String>,
    },

    /// Validation failed.
    #[error("Configuration validation failed: {message}")]
    ValidationError {
        /// Description of the validation error.
        message: String,
        /// Field that failed validation.
        field: Option<String>,
    },

    /// Duplicate component definition.
    #[error("Duplicate component name: {name}")]
    DuplicateName {
        /// The duplicated name.
        name: String,
    },

    /// A chart reference does not have the `<repository>/<chart>:<version>` shape.
    #[error("Invalid chart reference: {reference}")]
    InvalidChartReference {
        /// The offending reference.
        reference: String,
    },
}

/// Secret store errors.
#[derive(Debug, Error)]
pub enum SecretError {
    /// No secret object exists for the component.
    #[error("No secrets found for component '{component}' in namespace '{namespace}'")]
    NotFound {
        /// Component name.
        component: String,
        /// Namespace.
        namespace: String,
    },

    /// The object being created already exists.
    #[error("{kind} '{name}' already exists")]
    AlreadyExists {
        /// Kind of object (namespace, secret).
        kind: String,
        /// Object name.
        name: String,
    },

    /// Any other backend failure.
    #[error("Secret backend failure for component '{component}': {message}")]
    Backend {
        /// Component name.
        component: String,
        /// Description of the failure.
        message: String,
    },
}

/// Chart loading errors.
#[derive(Debug, Error)]
pub enum ChartError {
    /// The chart repository is not configured.
    #[error("Unknown chart repository: {repository}")]
    UnknownRepository {
        /// Repository name.
        repository: String,
    },

    /// The chart could not be found in its repository.
    #[error("Chart not found: {reference}")]
    NotFound {
        /// Chart reference.
        reference: String,
    },

    /// The chart found does not have the requested version.
    #[error("Chart {name} has version {found}, expected {expected}")]
    VersionMismatch {
        /// Chart name.
        name: String,
        /// Requested version.
        expected: String,
        /// Version found on disk.
        found: String,
    },

    /// The chart could not be read or parsed.
    #[error("Invalid chart at {path}: {message}")]
    Invalid {
        /// Chart path.
        path: PathBuf,
        /// Description of the problem.
        message: String,
    },

    /// Component metadata needed to build the reference is missing.
    #[error("Component '{component}' has no chart repository metadata")]
    MissingMetadata {
        /// Component name.
        component: String,
    },
}

/// Release backend errors.
#[derive(Debug, Error)]
pub enum ReleaseError {
    /// The release does not exist.
    #[error("Release not found: {name}")]
    NotFound {
        /// Release name.
        name: String,
    },

    /// The release already exists.
    #[error("Release already exists: {name}")]
    AlreadyExists {
        /// Release name.
        name: String,
    },

    /// A backend command failed.
    #[error("Release command '{command}' failed: {message}")]
    CommandFailed {
        /// The operation that failed.
        command: String,
        /// Error output from the backend.
        message: String,
    },

    /// Backend output could not be interpreted.
    #[error("Invalid release backend response: {message}")]
    InvalidResponse {
        /// Description of the response issue.
        message: String,
    },
}

/// Apply phase errors.
#[derive(Debug, Error)]
pub enum ApplyError {
    /// A component operation failed.
    #[error("Failed to {phase} component '{name}': {source}")]
    ComponentFailed {
        /// Component name.
        name: String,
        /// Phase in which the failure happened.
        phase: ApplyPhase,
        /// Underlying failure.
        #[source]
        source: Box<HelmsyncError>,
    },

    /// The forced-update detector could not inspect a component.
    #[error("Failed to inspect chart of component '{name}': {source}")]
    Detection {
        /// Component name.
        name: String,
        /// Underlying failure.
        #[source]
        source: Box<HelmsyncError>,
    },

    /// One or more components failed while continuing on errors.
    #[error("{failed} of {attempted} component operations failed")]
    Incomplete {
        /// Number of failed operations.
        failed: usize,
        /// Number of attempted operations.
        attempted: usize,
    },
}

/// Result type alias for helmsync operations.
pub type Result<T> = std::result::Result<T, HelmsyncError>;

impl HelmsyncError {
    /// Creates a new internal error with the given message.
    #[must_use]
    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal(message.into())
    }

    /// Returns true if this error reports an absent object.
    #[must_use]
    pub const fn is_not_found(&self) -> bool {
        matches!(
            self,
            Self::Secret(SecretError::NotFound { .. })
                | Self::Release(ReleaseError::NotFound { .. })
                | Self::Chart(ChartError::NotFound { .. })
        )
    }

    /// Returns true if this error reports an object that already exists.
    #[must_use]
    pub const fn is_already_exists(&self) -> bool {
        matches!(
            self,
            Self::Secret(SecretError::AlreadyExists { .. })
                | Self::Release(ReleaseError::AlreadyExists { .. })
        )
    }
}

impl ConfigError {
    /// Creates a validation error for a specific field.
    #[must_use]
    pub fn validation(message: impl Into<String>, field: impl Into<String>) -> Self {
        Self::ValidationError {
            message: message.into(),
            field: Some(field.into()),
        }
    }

    /// Creates a parse error for a file.
    #[must_use]
    pub fn parse(message: impl Into<String>, location: impl Into<String>) -> Self {
        Self::ParseError {
            message: message.into(),
            location: Some(location.into()),
        }
    }
}

impl SecretError {
    /// Creates a backend error for a component.
    #[must_use]
    pub fn backend(component: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Backend {
            component: component.into(),
            message: message.into(),
        }
    }
}

impl ReleaseError {
    /// Creates a command failure.
    #[must_use]
    pub fn command(command: impl Into<String>, message: impl Into<String>) -> Self {
        Self::CommandFailed {
            command: command.into(),
            message: message.into(),
        }
    }
}

impl ApplyError {
    /// Wraps a failure with the component and phase it happened in.
    #[must_use]
    pub fn component(name: impl Into<String>, phase: ApplyPhase, source: HelmsyncError) -> Self {
        Self::ComponentFailed {
            name: name.into(),
            phase,
            source: Box::new(source),
        }
    }
}
