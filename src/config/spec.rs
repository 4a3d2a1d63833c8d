//! Settings and component declaration types.
//!
//! This module defines the structs that map to the `helmsync.yaml` settings
//! file and to the component declaration files it points at.

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::path::{Path, PathBuf};

use crate::chart::ChartReference;
use crate::component::{Component, Components, Configuration, Metadata, Release};
use crate::error::{ConfigError, HelmsyncError, Result};
use crate::planner::{ApplyPhase, FailurePolicy};

/// Root settings of a helmsync project.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Settings {
    /// Namespace of components that do not declare one.
    #[serde(default = "default_namespace")]
    pub namespace: String,
    /// Directory holding the component declaration files.
    #[serde(default = "default_components_dir")]
    pub components_dir: PathBuf,
    /// Chart repositories, by name, as local directories.
    #[serde(default)]
    pub chart_repositories: BTreeMap<String, PathBuf>,
    /// Secret store settings.
    #[serde(default)]
    pub secrets: SecretsConfig,
    /// Helm settings.
    #[serde(default)]
    pub helm: HelmConfig,
    /// Forced update settings.
    #[serde(default)]
    pub forced_update: ForcedUpdateConfig,
    /// Apply settings.
    #[serde(default)]
    pub apply: ApplyConfig,
}

/// Secret store settings.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct SecretsConfig {
    /// Store backend.
    #[serde(default)]
    pub store: SecretStoreKind,
    /// Directory of the local store.
    #[serde(default)]
    pub path: Option<PathBuf>,
}

/// Secret store backends.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum SecretStoreKind {
    /// Kubernetes Secrets in the component namespace.
    #[default]
    Kubernetes,
    /// JSON files on the local filesystem.
    Local,
}

/// Helm settings.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct HelmConfig {
    /// Helm binary.
    #[serde(default = "default_helm_binary")]
    pub binary: String,
    /// Kubeconfig context, for helm and the Kubernetes secret store.
    #[serde(default)]
    pub kube_context: Option<String>,
}

/// Forced update settings.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct ForcedUpdateConfig {
    /// Template markers, in addition to the built-in one, of releases that
    /// must be recreated instead of upgraded.
    #[serde(default)]
    pub markers: Vec<String>,
}

/// Apply settings.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct ApplyConfig {
    /// Failure handling.
    #[serde(default)]
    pub failure_policy: FailurePolicy,
    /// Phases that are never applied.
    #[serde(default)]
    pub disabled_stages: BTreeSet<ApplyPhase>,
}

/// A component as declared in a YAML file.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ComponentDeclaration {
    /// Component name.
    pub name: String,
    /// Namespace, defaults to the settings namespace.
    #[serde(default)]
    pub namespace: Option<String>,
    /// Chart reference.
    pub release: ReleaseDeclaration,
    /// Values passed to the chart.
    #[serde(default)]
    pub configuration: BTreeMap<String, serde_json::Value>,
    /// Names of required secrets.
    #[serde(default)]
    pub secrets: Vec<String>,
}

/// Chart reference as declared.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ReleaseDeclaration {
    /// Chart as `<repository>/<chart>:<version>`.
    pub chart: String,
    /// Component release version.
    pub version: String,
}

fn default_namespace() -> String {
    String::from("default")
}

fn default_components_dir() -> PathBuf {
    PathBuf::from("components")
}

fn default_helm_binary() -> String {
    String::from("helm")
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            namespace: default_namespace(),
            components_dir: default_components_dir(),
            chart_repositories: BTreeMap::new(),
            secrets: SecretsConfig::default(),
            helm: HelmConfig::default(),
            forced_update: ForcedUpdateConfig::default(),
            apply: ApplyConfig::default(),
        }
    }
}

impl Default for HelmConfig {
    fn default() -> Self {
        Self {
            binary: default_helm_binary(),
            kube_context: None,
        }
    }
}

impl Settings {
    /// Resolves relative paths against `base` and expands `~`.
    pub fn resolve_paths(&mut self, base: &Path) {
        self.components_dir = resolve(base, &self.components_dir);
        for root in self.chart_repositories.values_mut() {
            *root = resolve(base, root);
        }
        if let Some(path) = &self.secrets.path {
            self.secrets.path = Some(resolve(base, path));
        }
    }
}

fn resolve(base: &Path, path: &Path) -> PathBuf {
    if let Ok(rest) = path.strip_prefix("~")
        && let Some(home) = dirs::home_dir()
    {
        return home.join(rest);
    }

    if path.is_absolute() {
        path.to_path_buf()
    } else {
        base.join(path)
    }
}

impl ComponentDeclaration {
    /// Converts the declaration into a component.
    ///
    /// The repository is split off the chart reference into the metadata and
    /// secret names are sorted and deduplicated.
    ///
    /// # Errors
    ///
    /// Returns an error if the chart reference is malformed.
    pub fn to_component(&self, default_namespace: &str) -> Result<Component> {
        let reference = ChartReference::parse(&self.release.chart)?;
        let Some(chart_version) = &reference.version else {
            return Err(HelmsyncError::Config(ConfigError::InvalidChartReference {
                reference: self.release.chart.clone(),
            }));
        };

        let mut configuration: Configuration = self
            .configuration
            .iter()
            .map(|(key, value)| (key.clone(), value.clone()))
            .collect();
        configuration.set_metadata(&Metadata::new(
            reference.repository.as_str(),
            self.release.version.as_str(),
        ));

        let mut secrets = self.secrets.clone();
        secrets.sort();
        secrets.dedup();

        Ok(Component::new(
            self.name.as_str(),
            self.namespace.as_deref().unwrap_or(default_namespace),
            Release::new(
                format!("{}:{chart_version}", reference.name),
                self.release.version.as_str(),
            ),
            configuration,
            secrets,
        ))
    }
}

/// Converts declarations into components keyed by name.
///
/// # Errors
///
/// Returns an error on a malformed declaration or a duplicated name.
pub fn into_components(
    declarations: &[ComponentDeclaration],
    default_namespace: &str,
) -> Result<Components> {
    let mut components = Components::new();

    for declaration in declarations {
        let component = declaration.to_component(default_namespace)?;
        if components.contains_key(&component.name) {
            return Err(HelmsyncError::Config(ConfigError::DuplicateName {
                name: component.name,
            }));
        }
        components.insert(component.name.clone(), component);
    }

    Ok(components)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn declaration(name: &str) -> ComponentDeclaration {
        ComponentDeclaration {
            name: name.to_string(),
            namespace: None,
            release: ReleaseDeclaration {
                chart: String::from("repo/connector-hdfs:0.1.0"),
                version: String::from("1.0.0"),
            },
            configuration: BTreeMap::from([(String::from("FlushSize"), serde_json::json!(3))]),
            secrets: vec![
                String::from("TestSecret2"),
                String::from("TestSecret1"),
                String::from("TestSecret2"),
            ],
        }
    }

    #[test]
    fn test_to_component_splits_repository() {
        let component = declaration("hdfs").to_component("data").unwrap();

        assert_eq!(component.namespace, "data");
        assert_eq!(component.release.chart, "connector-hdfs:0.1.0");
        assert_eq!(component.release.version, "1.0.0");
        assert_eq!(component.secrets, vec!["TestSecret1", "TestSecret2"]);
        assert_eq!(component.chart_ref().unwrap(), "repo/connector-hdfs:0.1.0");
        assert_eq!(
            component.configuration.metadata(),
            Some(Metadata::new("repo", "1.0.0"))
        );
    }

    #[test]
    fn test_to_component_requires_chart_version() {
        let mut decl = declaration("hdfs");
        decl.release.chart = String::from("repo/connector-hdfs");
        assert!(decl.to_component("data").is_err());
    }

    #[test]
    fn test_into_components_rejects_duplicates() {
        let err =
            into_components(&[declaration("hdfs"), declaration("hdfs")], "data").unwrap_err();
        assert!(matches!(
            err,
            HelmsyncError::Config(ConfigError::DuplicateName { .. })
        ));
    }

    #[test]
    fn test_resolve_paths() {
        let mut settings = Settings::default();
        settings
            .chart_repositories
            .insert(String::from("repo"), PathBuf::from("/srv/charts"));
        settings.secrets.path = Some(PathBuf::from("secrets"));

        settings.resolve_paths(Path::new("/work"));

        assert_eq!(settings.components_dir, PathBuf::from("/work/components"));
        assert_eq!(settings.chart_repositories["repo"], PathBuf::from("/srv/charts"));
        assert_eq!(settings.secrets.path, Some(PathBuf::from("/work/secrets")));
    }
}
