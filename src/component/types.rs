//! Component model types.
//!
//! A component is one deployable unit: a chart release plus the configuration
//! and secret material it is installed with.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::error::{ChartError, HelmsyncError, Result};

/// Reserved configuration key holding [`Metadata`].
pub const METADATA_KEY: &str = "_metadata";

/// Names of the secrets a component requires.
pub type Secrets = Vec<String>;

/// Resolved secret values by secret name.
///
/// These are never written anywhere except the secret store.
pub type SecretValues = BTreeMap<String, Vec<u8>>;

/// Components keyed by name.
pub type Components = BTreeMap<String, Component>;

/// Release values passed to the chart, keyed by value name.
///
/// Whole-number floats are stored as integers, so `1.0` from a declaration
/// compares equal to the `1` helm reports back.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(transparent)]
pub struct Configuration(
    #[serde(deserialize_with = "deserialize_normalized")] BTreeMap<String, serde_json::Value>,
);

/// Versioned chart reference of a component.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct Release {
    /// Chart name and version, as `<chart>:<version>`.
    pub chart: String,
    /// Version of the component release.
    pub version: String,
}

/// Bookkeeping injected into the configuration of every managed component.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct Metadata {
    /// Repository the chart is loaded from.
    pub chart_repository: String,
    /// Version of the component release.
    pub release_version: String,
}

/// A deployable unit.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Component {
    /// Unique name, also used as the release name.
    pub name: String,
    /// Target namespace.
    pub namespace: String,
    /// Chart reference.
    pub release: Release,
    /// Values passed to the chart.
    pub configuration: Configuration,
    /// Names of the secrets this component requires.
    pub secrets: Secrets,
    /// Secret values resolved at apply time.
    pub secret_values: SecretValues,
}

impl Component {
    /// Creates a component without resolved secret values.
    #[must_use]
    pub fn new(
        name: impl Into<String>,
        namespace: impl Into<String>,
        release: Release,
        configuration: Configuration,
        secrets: Secrets,
    ) -> Self {
        Self {
            name: name.into(),
            namespace: namespace.into(),
            release,
            configuration,
            secrets,
            secret_values: SecretValues::new(),
        }
    }

    /// Compares every field except the resolved secret values.
    #[must_use]
    pub fn same_definition(&self, other: &Self) -> bool {
        self.name == other.name
            && self.namespace == other.namespace
            && self.release == other.release
            && self.configuration == other.configuration
            && self.secrets == other.secrets
    }

    /// Returns the package reference `<repository>/<chart>`.
    ///
    /// # Errors
    ///
    /// Returns an error if the configuration carries no repository metadata.
    pub fn chart_ref(&self) -> Result<String> {
        let repository = self
            .configuration
            .metadata()
            .map(|m| m.chart_repository)
            .filter(|r| !r.is_empty())
            .ok_or_else(|| {
                HelmsyncError::Chart(ChartError::MissingMetadata {
                    component: self.name.clone(),
                })
            })?;

        Ok(format!("{repository}/{}", self.release.chart))
    }
}

impl Release {
    /// Creates a release reference.
    #[must_use]
    pub fn new(chart: impl Into<String>, version: impl Into<String>) -> Self {
        Self {
            chart: chart.into(),
            version: version.into(),
        }
    }

    /// Splits the chart into name and optional version.
    #[must_use]
    pub fn chart_name_version(&self) -> (&str, Option<&str>) {
        match self.chart.split_once(':') {
            Some((name, version)) => (name, Some(version)),
            None => (self.chart.as_str(), None),
        }
    }
}

impl Configuration {
    /// Creates an empty configuration.
    #[must_use]
    pub const fn new() -> Self {
        Self(BTreeMap::new())
    }

    /// Sets a value.
    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<serde_json::Value>) {
        self.0.insert(key.into(), normalize(value.into()));
    }

    /// Gets a value.
    #[must_use]
    pub fn get(&self, key: &str) -> Option<&serde_json::Value> {
        self.0.get(key)
    }

    /// Iterates over all values, metadata included.
    pub fn iter(&self) -> impl Iterator<Item = (&String, &serde_json::Value)> {
        self.0.iter()
    }

    /// Returns the number of values, metadata included.
    #[must_use]
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Returns true if there are no values.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Stores the metadata under [`METADATA_KEY`].
    pub fn set_metadata(&mut self, metadata: &Metadata) {
        // Metadata only holds strings, serialization cannot fail.
        if let Ok(value) = serde_json::to_value(metadata) {
            self.0.insert(String::from(METADATA_KEY), value);
        }
    }

    /// Reads the metadata, if present and well formed.
    #[must_use]
    pub fn metadata(&self) -> Option<Metadata> {
        self.0
            .get(METADATA_KEY)
            .and_then(|v| serde_json::from_value(v.clone()).ok())
    }

    /// Renders the configuration as a YAML values document.
    ///
    /// # Errors
    ///
    /// Returns an error if a value cannot be serialized.
    pub fn to_yaml(&self) -> Result<String> {
        serde_yaml::to_string(&self.0)
            .map_err(|e| HelmsyncError::internal(format!("Failed to render values: {e}")))
    }
}

impl From<BTreeMap<String, serde_json::Value>> for Configuration {
    fn from(values: BTreeMap<String, serde_json::Value>) -> Self {
        values.into_iter().collect()
    }
}

impl FromIterator<(String, serde_json::Value)> for Configuration {
    fn from_iter<I: IntoIterator<Item = (String, serde_json::Value)>>(iter: I) -> Self {
        Self(iter.into_iter().map(|(k, v)| (k, normalize(v))).collect())
    }
}

fn deserialize_normalized<'de, D>(
    deserializer: D,
) -> std::result::Result<BTreeMap<String, serde_json::Value>, D::Error>
where
    D: serde::Deserializer<'de>,
{
    let values = BTreeMap::<String, serde_json::Value>::deserialize(deserializer)?;
    Ok(values.into_iter().map(|(k, v)| (k, normalize(v))).collect())
}

/// Rewrites floats without a fractional part as integers, recursively.
#[allow(
    clippy::cast_possible_truncation,
    clippy::cast_precision_loss,
    clippy::float_cmp
)]
fn normalize(value: serde_json::Value) -> serde_json::Value {
    use serde_json::Value;

    match value {
        Value::Number(n) if n.is_f64() => match n.as_f64() {
            Some(f) if f.fract() == 0.0 && f >= i64::MIN as f64 && f < i64::MAX as f64 => {
                Value::from(f as i64)
            }
            _ => Value::Number(n),
        },
        Value::Array(items) => Value::Array(items.into_iter().map(normalize).collect()),
        Value::Object(map) => {
            Value::Object(map.into_iter().map(|(k, v)| (k, normalize(v))).collect())
        }
        other => other,
    }
}

impl Metadata {
    /// Creates metadata for a repository and release version.
    #[must_use]
    pub fn new(chart_repository: impl Into<String>, release_version: impl Into<String>) -> Self {
        Self {
            chart_repository: chart_repository.into(),
            release_version: release_version.into(),
        }
    }
}

impl std::fmt::Display for Component {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}/{} ({})", self.namespace, self.name, self.release.chart)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn component() -> Component {
        let mut configuration = Configuration::new();
        configuration.insert("FlushSize", 3);
        configuration.set_metadata(&Metadata::new("repo", "1.0.0"));

        let mut cmp = Component::new(
            "hdfs",
            "data",
            Release::new("connector-hdfs:0.1.0", "1.0.0"),
            configuration,
            vec![String::from("hdfs-password")],
        );
        cmp.secret_values
            .insert(String::from("hdfs-password"), b"hunter2".to_vec());
        cmp
    }

    #[test]
    fn test_chart_ref_uses_metadata_repository() {
        let cmp = component();
        assert_eq!(cmp.chart_ref().unwrap(), "repo/connector-hdfs:0.1.0");
    }

    #[test]
    fn test_whole_floats_compare_equal_to_integers() {
        let declared: Configuration =
            serde_yaml::from_str("ratio: 1.0\nlimits:\n  cpu: 2.0\nthreshold: 0.5").unwrap();
        let reported: Configuration =
            serde_json::from_str(r#"{"ratio": 1, "limits": {"cpu": 2}, "threshold": 0.5}"#).unwrap();
        assert_eq!(declared, reported);

        let mut inserted = Configuration::new();
        inserted.insert("ratio", 1.0);
        assert_eq!(inserted.get("ratio"), Some(&serde_json::json!(1)));
        assert_eq!(inserted.to_yaml().unwrap().trim(), "ratio: 1");
    }

    #[test]
    fn test_chart_ref_without_metadata() {
        let mut cmp = component();
        cmp.configuration = Configuration::new();
        assert!(cmp.chart_ref().is_err());
    }

    #[test]
    fn test_same_definition_ignores_secret_values() {
        let a = component();
        let mut b = component();
        b.secret_values.clear();
        assert!(a.same_definition(&b));
        assert_ne!(a, b);

        b.configuration.insert("FlushSize", 4);
        assert!(!a.same_definition(&b));
    }

    #[test]
    fn test_chart_name_version() {
        let release = Release::new("connector-hdfs:0.1.0", "1.0.0");
        assert_eq!(release.chart_name_version(), ("connector-hdfs", Some("0.1.0")));

        let release = Release::new("connector-hdfs", "1.0.0");
        assert_eq!(release.chart_name_version(), ("connector-hdfs", None));
    }

    #[test]
    fn test_metadata_round_trip_through_configuration() {
        let cmp = component();
        let metadata = cmp.configuration.metadata().unwrap();
        assert_eq!(metadata.chart_repository, "repo");
        assert_eq!(metadata.release_version, "1.0.0");

        let yaml = cmp.configuration.to_yaml().unwrap();
        assert!(yaml.contains("chartRepository: repo"));
    }
}
