//! Diff between desired and current components.
//!
//! Components are compared by definition: every field except the resolved
//! secret values. Secret-only changes are detected separately with
//! [`is_only_secret_value_diff`].

use serde::Serialize;
use tracing::debug;

use crate::component::{Component, Components};

/// Components classified by the operation they need.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ComponentDiff {
    /// Desired components absent from the current state.
    pub create: Components,
    /// Desired components whose definition changed.
    pub update: Components,
    /// Current components absent from the desired state.
    pub delete: Components,
}

/// Detail about a specific difference.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DiffDetail {
    /// Field that differs.
    pub field: String,
    /// Old value.
    pub old_value: Option<String>,
    /// New value.
    pub new_value: Option<String>,
}

/// Classifies components into create, update and delete sets.
///
/// A name only in `desired` is created, a name only in `current` is
/// deleted, and a name in both is updated when the definitions differ.
#[must_use]
pub fn diff(desired: &Components, current: &Components) -> ComponentDiff {
    let mut result = ComponentDiff::default();

    for (name, component) in desired {
        match current.get(name) {
            None => {
                result.create.insert(name.clone(), component.clone());
            }
            Some(existing) if !component.same_definition(existing) => {
                result.update.insert(name.clone(), component.clone());
            }
            Some(_) => {}
        }
    }

    for (name, component) in current {
        if !desired.contains_key(name) {
            result.delete.insert(name.clone(), component.clone());
        }
    }

    debug!(
        "Diff: {} to create, {} to update, {} to delete",
        result.create.len(),
        result.update.len(),
        result.delete.len()
    );

    result
}

/// Returns true if `a` and `b` differ only in their resolved secret values.
#[must_use]
pub fn is_only_secret_value_diff(a: &Component, b: &Component) -> bool {
    a.same_definition(b) && a.secret_values != b.secret_values
}

/// Lists the fields that differ between a current and a desired component.
///
/// Secret values are reported by name only.
#[must_use]
pub fn describe_changes(current: &Component, desired: &Component) -> Vec<DiffDetail> {
    let mut details = Vec::new();

    if current.namespace != desired.namespace {
        details.push(DiffDetail::changed(
            "namespace",
            &current.namespace,
            &desired.namespace,
        ));
    }
    if current.release.chart != desired.release.chart {
        details.push(DiffDetail::changed(
            "release.chart",
            &current.release.chart,
            &desired.release.chart,
        ));
    }
    if current.release.version != desired.release.version {
        details.push(DiffDetail::changed(
            "release.version",
            &current.release.version,
            &desired.release.version,
        ));
    }

    let keys: std::collections::BTreeSet<&String> = current
        .configuration
        .iter()
        .chain(desired.configuration.iter())
        .map(|(key, _)| key)
        .collect();
    for key in keys {
        let old = current.configuration.get(key);
        let new = desired.configuration.get(key);
        if old != new {
            details.push(DiffDetail {
                field: format!("configuration.{key}"),
                old_value: old.map(ToString::to_string),
                new_value: new.map(ToString::to_string),
            });
        }
    }

    if current.secrets != desired.secrets {
        details.push(DiffDetail::changed(
            "secrets",
            &current.secrets.join(","),
            &desired.secrets.join(","),
        ));
    }

    let changed_values: Vec<&String> = desired
        .secret_values
        .iter()
        .filter(|(key, value)| current.secret_values.get(*key) != Some(*value))
        .map(|(key, _)| key)
        .chain(
            current
                .secret_values
                .keys()
                .filter(|key| !desired.secret_values.contains_key(*key)),
        )
        .collect();
    for key in changed_values {
        details.push(DiffDetail {
            field: format!("secret_values.{key}"),
            old_value: None,
            new_value: None,
        });
    }

    details
}

impl ComponentDiff {
    /// Returns true if nothing needs to change.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.create.is_empty() && self.update.is_empty() && self.delete.is_empty()
    }

    /// Returns the total number of operations.
    #[must_use]
    pub fn len(&self) -> usize {
        self.create.len() + self.update.len() + self.delete.len()
    }
}

impl DiffDetail {
    fn changed(field: &str, old: &str, new: &str) -> Self {
        Self {
            field: field.to_string(),
            old_value: Some(old.to_string()),
            new_value: Some(new.to_string()),
        }
    }
}

impl std::fmt::Display for DiffDetail {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match (&self.old_value, &self.new_value) {
            (Some(old), Some(new)) => write!(f, "{}: {old} -> {new}", self.field),
            (None, Some(new)) => write!(f, "{}: (none) -> {new}", self.field),
            (Some(old), None) => write!(f, "{}: {old} -> (none)", self.field),
            (None, None) => write!(f, "{}: changed", self.field),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::component::{Configuration, Release, SecretValues};

    fn component(name: &str, replicas: i64) -> Component {
        let mut configuration = Configuration::new();
        configuration.insert("replicas", replicas);
        Component::new(
            name,
            "data",
            Release::new("connector-hdfs:0.1.0", "1.0.0"),
            configuration,
            vec![String::from("TestSecret1")],
        )
    }

    fn components(items: &[Component]) -> Components {
        items.iter().map(|c| (c.name.clone(), c.clone())).collect()
    }

    #[test]
    fn test_diff_classifies_components() {
        let desired = components(&[component("c", 1), component("u", 2), component("same", 1)]);
        let current = components(&[component("u", 1), component("same", 1), component("d", 1)]);

        let result = diff(&desired, &current);

        assert_eq!(result.create.keys().collect::<Vec<_>>(), vec!["c"]);
        assert_eq!(result.update.keys().collect::<Vec<_>>(), vec!["u"]);
        assert_eq!(result.delete.keys().collect::<Vec<_>>(), vec!["d"]);
        assert_eq!(result.update["u"], desired["u"]);
        assert_eq!(result.delete["d"], current["d"]);
        assert_eq!(result.len(), 3);
    }

    #[test]
    fn test_diff_ignores_secret_values() {
        let mut desired = component("a", 1);
        desired.secret_values = SecretValues::from([(String::from("TestSecret1"), b"new".to_vec())]);
        let current = component("a", 1);

        let result = diff(&components(&[desired]), &components(&[current]));
        assert!(result.is_empty());
    }

    #[test]
    fn test_diff_of_empty_maps() {
        assert!(diff(&Components::new(), &Components::new()).is_empty());
    }

    #[test]
    fn test_is_only_secret_value_diff() {
        let base = component("a", 1);
        let mut rotated = base.clone();
        rotated.secret_values = SecretValues::from([(String::from("TestSecret1"), b"v2".to_vec())]);

        assert!(!is_only_secret_value_diff(&base, &base));
        assert!(is_only_secret_value_diff(&base, &rotated));

        let mut changed = rotated.clone();
        changed.configuration.insert("replicas", 3);
        assert!(!is_only_secret_value_diff(&base, &changed));
        assert!(!is_only_secret_value_diff(&base, &component("a", 2)));
    }

    #[test]
    fn test_describe_changes() {
        let current = component("a", 1);
        let mut desired = component("a", 2);
        desired.release = Release::new("connector-hdfs:0.2.0", "1.0.0");
        desired.secret_values = SecretValues::from([(String::from("TestSecret1"), b"x".to_vec())]);

        let details = describe_changes(&current, &desired);
        let fields: Vec<&str> = details.iter().map(|d| d.field.as_str()).collect();

        assert_eq!(
            fields,
            vec![
                "release.chart",
                "configuration.replicas",
                "secret_values.TestSecret1"
            ]
        );
        assert_eq!(details[1].to_string(), "configuration.replicas: 1 -> 2");
        assert_eq!(details[2].to_string(), "secret_values.TestSecret1: changed");
    }
}
