//! Validation of settings and component declarations.
//!
//! Every problem is collected before reporting, so a single `validate`
//! run lists all of them.

use crate::chart::ChartReference;
use crate::component::METADATA_KEY;
use crate::error::{ConfigError, HelmsyncError, Result};
use std::collections::HashSet;
use tracing::debug;

use super::spec::{ComponentDeclaration, Settings};

/// Maximum length of a release name.
const MAX_COMPONENT_NAME_LEN: usize = 53;

/// Maximum length of a namespace name.
const MAX_NAMESPACE_LEN: usize = 63;

/// Maximum length of a secret key.
const MAX_SECRET_NAME_LEN: usize = 253;

/// Validator for settings and component declarations.
#[derive(Debug, Default)]
pub struct ConfigValidator;

/// Validation result containing all errors found.
#[derive(Debug, Default)]
pub struct ValidationResult {
    /// List of validation errors.
    pub errors: Vec<ValidationError>,
    /// List of warnings (non-fatal issues).
    pub warnings: Vec<String>,
}

/// A single validation error.
#[derive(Debug)]
pub struct ValidationError {
    /// The field path that failed validation.
    pub field: String,
    /// The error message.
    pub message: String,
}

impl ConfigValidator {
    /// Creates a new validator.
    #[must_use]
    pub const fn new() -> Self {
        Self
    }

    /// Validates settings and declarations.
    ///
    /// # Errors
    ///
    /// Returns the first validation error if any check fails.
    pub fn validate(
        &self,
        settings: &Settings,
        declarations: &[ComponentDeclaration],
    ) -> Result<ValidationResult> {
        let result = self.check(settings, declarations);

        if let Some(first_error) = result.errors.first() {
            Err(HelmsyncError::Config(ConfigError::ValidationError {
                message: first_error.message.clone(),
                field: Some(first_error.field.clone()),
            }))
        } else {
            debug!("Configuration validation passed");
            Ok(result)
        }
    }

    /// Runs every check and returns the collected result.
    #[must_use]
    pub fn check(
        &self,
        settings: &Settings,
        declarations: &[ComponentDeclaration],
    ) -> ValidationResult {
        let mut result = ValidationResult::default();

        Self::validate_settings(settings, &mut result);
        Self::validate_declarations(settings, declarations, &mut result);

        result
    }

    fn validate_settings(settings: &Settings, result: &mut ValidationResult) {
        if !is_dns_label(&settings.namespace, MAX_NAMESPACE_LEN) {
            result.errors.push(ValidationError {
                field: String::from("namespace"),
                message: format!(
                    "Namespace '{}' is invalid. Must be lowercase alphanumeric with hyphens.",
                    settings.namespace
                ),
            });
        }

        if settings.helm.binary.trim().is_empty() {
            result.errors.push(ValidationError {
                field: String::from("helm.binary"),
                message: String::from("Helm binary cannot be empty"),
            });
        }

        for (i, marker) in settings.forced_update.markers.iter().enumerate() {
            if marker.trim().is_empty() {
                result.errors.push(ValidationError {
                    field: format!("forced_update.markers[{i}]"),
                    message: String::from("Marker cannot be empty"),
                });
            }
        }

        if settings.chart_repositories.is_empty() {
            result
                .warnings
                .push(String::from("No chart repositories defined in settings"));
        }

        if settings.apply.disabled_stages.len() == 3 {
            result
                .warnings
                .push(String::from("apply.disabled_stages: every stage is disabled"));
        }
    }

    fn validate_declarations(
        settings: &Settings,
        declarations: &[ComponentDeclaration],
        result: &mut ValidationResult,
    ) {
        if declarations.is_empty() {
            result
                .warnings
                .push(String::from("No components declared"));
            return;
        }

        let mut seen_names = HashSet::new();

        for declaration in declarations {
            let prefix = format!("components.{}", declaration.name);

            if !seen_names.insert(declaration.name.as_str()) {
                result.errors.push(ValidationError {
                    field: format!("{prefix}.name"),
                    message: format!("Duplicate component name: {}", declaration.name),
                });
            }

            if !is_dns_label(&declaration.name, MAX_COMPONENT_NAME_LEN) {
                result.errors.push(ValidationError {
                    field: format!("{prefix}.name"),
                    message: format!(
                        "Component name '{}' is invalid. Must be lowercase alphanumeric with \
                         hyphens, at most {MAX_COMPONENT_NAME_LEN} characters.",
                        declaration.name
                    ),
                });
            }

            if let Some(namespace) = &declaration.namespace
                && !is_dns_label(namespace, MAX_NAMESPACE_LEN)
            {
                result.errors.push(ValidationError {
                    field: format!("{prefix}.namespace"),
                    message: format!("Namespace '{namespace}' is invalid"),
                });
            }

            Self::validate_release(settings, declaration, &prefix, result);
            Self::validate_configuration(declaration, &prefix, result);
            Self::validate_secrets(declaration, &prefix, result);
        }
    }

    fn validate_release(
        settings: &Settings,
        declaration: &ComponentDeclaration,
        prefix: &str,
        result: &mut ValidationResult,
    ) {
        match ChartReference::parse(&declaration.release.chart) {
            Ok(reference) => {
                if reference.version.is_none() {
                    result.errors.push(ValidationError {
                        field: format!("{prefix}.release.chart"),
                        message: format!(
                            "Chart reference '{}' has no version, expected <repository>/<chart>:<version>",
                            declaration.release.chart
                        ),
                    });
                }
                if !settings.chart_repositories.contains_key(&reference.repository) {
                    result.errors.push(ValidationError {
                        field: format!("{prefix}.release.chart"),
                        message: format!(
                            "Chart repository '{}' is not declared in chart_repositories",
                            reference.repository
                        ),
                    });
                }
            }
            Err(e) => result.errors.push(ValidationError {
                field: format!("{prefix}.release.chart"),
                message: e.to_string(),
            }),
        }

        if declaration.release.version.trim().is_empty() {
            result.errors.push(ValidationError {
                field: format!("{prefix}.release.version"),
                message: String::from("Release version cannot be empty"),
            });
        }
    }

    fn validate_configuration(
        declaration: &ComponentDeclaration,
        prefix: &str,
        result: &mut ValidationResult,
    ) {
        for (key, value) in &declaration.configuration {
            if key == METADATA_KEY {
                result.errors.push(ValidationError {
                    field: format!("{prefix}.configuration.{key}"),
                    message: format!("'{METADATA_KEY}' is reserved"),
                });
            } else if value.is_object() || value.is_array() {
                result.errors.push(ValidationError {
                    field: format!("{prefix}.configuration.{key}"),
                    message: String::from("Configuration values must be scalars"),
                });
            }
        }
    }

    fn validate_secrets(
        declaration: &ComponentDeclaration,
        prefix: &str,
        result: &mut ValidationResult,
    ) {
        let mut seen = HashSet::new();

        for (i, secret) in declaration.secrets.iter().enumerate() {
            if !is_secret_key(secret) {
                result.errors.push(ValidationError {
                    field: format!("{prefix}.secrets[{i}]"),
                    message: format!(
                        "Secret name '{secret}' is invalid. Must be alphanumeric, '-', '_' or '.'."
                    ),
                });
            }
            if !seen.insert(secret.as_str()) {
                result.warnings.push(format!(
                    "{prefix}.secrets[{i}]: Secret '{secret}' is listed more than once"
                ));
            }
        }
    }
}

/// Returns true if `name` is a DNS-1123 label of at most `max_len` characters.
fn is_dns_label(name: &str, max_len: usize) -> bool {
    if name.is_empty() || name.len() > max_len {
        return false;
    }

    let valid_chars = name
        .chars()
        .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '-');

    valid_chars && !name.starts_with('-') && !name.ends_with('-')
}

/// Returns true if `name` can be used as a Kubernetes Secret data key.
fn is_secret_key(name: &str) -> bool {
    !name.is_empty()
        && name.len() <= MAX_SECRET_NAME_LEN
        && name
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.'))
}

impl ValidationResult {
    /// Returns true if validation passed (no errors).
    #[must_use]
    pub const fn is_valid(&self) -> bool {
        self.errors.is_empty()
    }

    /// Returns the number of errors.
    #[must_use]
    pub const fn error_count(&self) -> usize {
        self.errors.len()
    }

    /// Returns the number of warnings.
    #[must_use]
    pub const fn warning_count(&self) -> usize {
        self.warnings.len()
    }
}

impl std::fmt::Display for ValidationError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.field, self.message)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ReleaseDeclaration;
    use std::collections::BTreeMap;
    use std::path::PathBuf;

    fn settings() -> Settings {
        let mut settings = Settings::default();
        settings
            .chart_repositories
            .insert(String::from("repo"), PathBuf::from("/charts"));
        settings
    }

    fn declaration(name: &str) -> ComponentDeclaration {
        ComponentDeclaration {
            name: name.to_string(),
            namespace: Some(String::from("data")),
            release: ReleaseDeclaration {
                chart: String::from("repo/connector-hdfs:0.1.0"),
                version: String::from("1.0.0"),
            },
            configuration: BTreeMap::from([(String::from("FlushSize"), serde_json::json!(3))]),
            secrets: vec![String::from("TestSecret1")],
        }
    }

    #[test]
    fn test_dns_label() {
        assert!(is_dns_label("connector-hdfs", 53));
        assert!(is_dns_label("3scale", 53));
        assert!(!is_dns_label("", 53));
        assert!(!is_dns_label("Connector", 53));
        assert!(!is_dns_label("connector_hdfs", 53));
        assert!(!is_dns_label("-hdfs", 53));
        assert!(!is_dns_label("hdfs-", 53));
        assert!(!is_dns_label(&"a".repeat(54), 53));
    }

    #[test]
    fn test_secret_key() {
        assert!(is_secret_key("TestSecret1"));
        assert!(is_secret_key("db.password_2"));
        assert!(!is_secret_key("db password"));
        assert!(!is_secret_key(""));
    }

    #[test]
    fn test_valid_configuration() {
        let result = ConfigValidator::new()
            .validate(&settings(), &[declaration("hdfs"), declaration("web")])
            .unwrap();
        assert!(result.is_valid());
        assert_eq!(result.warning_count(), 0);
    }

    #[test]
    fn test_collects_every_error() {
        let mut bad = declaration("Bad_Name");
        bad.release.chart = String::from("other/web");
        bad.configuration
            .insert(String::from(METADATA_KEY), serde_json::json!({}));
        bad.configuration
            .insert(String::from("nested"), serde_json::json!([1, 2]));

        let result = ConfigValidator::new().check(&settings(), &[bad]);
        let fields: Vec<&str> = result.errors.iter().map(|e| e.field.as_str()).collect();

        assert_eq!(result.error_count(), 5);
        assert!(fields.contains(&"components.Bad_Name.name"));
        assert!(fields.contains(&"components.Bad_Name.release.chart"));
        assert!(fields.contains(&"components.Bad_Name.configuration._metadata"));
        assert!(fields.contains(&"components.Bad_Name.configuration.nested"));
    }

    #[test]
    fn test_duplicate_names() {
        let err = ConfigValidator::new()
            .validate(&settings(), &[declaration("hdfs"), declaration("hdfs")])
            .unwrap_err();
        assert!(err.to_string().contains("Duplicate component name"));
    }

    #[test]
    fn test_duplicate_secret_is_a_warning() {
        let mut decl = declaration("hdfs");
        decl.secrets.push(String::from("TestSecret1"));

        let result = ConfigValidator::new().check(&settings(), &[decl]);
        assert!(result.is_valid());
        assert_eq!(result.warning_count(), 1);
    }

    #[test]
    fn test_empty_inputs_warn() {
        let result = ConfigValidator::new().check(&Settings::default(), &[]);
        assert!(result.is_valid());
        assert_eq!(result.warning_count(), 2);
    }
}
