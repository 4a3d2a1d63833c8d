//! Release backend and observer traits.
//!
//! The backend performs install, upgrade and uninstall of packaged releases.
//! The observer lists what is currently deployed so the current state can
//! be rebuilt.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::component::Configuration;
use crate::error::Result;

/// Options for installing a release.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct InstallOptions {
    /// Release name.
    pub release_name: String,
    /// Values passed to the chart.
    pub values: Configuration,
    /// Validate without mutating.
    pub dry_run: bool,
    /// Reuse the name of a release that already exists.
    pub reuse_name: bool,
}

/// Options for updating a release.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct UpdateOptions {
    /// Namespace the release lives in.
    pub namespace: String,
    /// Values passed to the chart.
    pub values: Configuration,
    /// Validate without mutating.
    pub dry_run: bool,
}

/// Options for deleting a release.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DeleteOptions {
    /// Namespace the release lives in.
    pub namespace: String,
    /// Remove the release history as well.
    pub purge: bool,
    /// Validate without mutating.
    pub dry_run: bool,
}

/// A release observed in the target environment.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct DeployedRelease {
    /// Release name.
    pub name: String,
    /// Namespace.
    pub namespace: String,
    /// Chart label, as `<chart>-<version>`.
    pub chart: String,
    /// Release revision.
    pub revision: u32,
    /// Backend status string (deployed, failed, ...).
    pub status: String,
    /// User-supplied values.
    pub values: Configuration,
}

/// Installs, updates and deletes releases.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait ReleaseBackend: Send + Sync {
    /// Installs a chart as a new release.
    async fn install(
        &self,
        chart_path: &Path,
        namespace: &str,
        options: &InstallOptions,
    ) -> Result<()>;

    /// Upgrades an existing release.
    async fn update(
        &self,
        release_name: &str,
        chart_path: &Path,
        options: &UpdateOptions,
    ) -> Result<()>;

    /// Deletes a release. Deleting an absent release succeeds.
    async fn delete(&self, release_name: &str, options: &DeleteOptions) -> Result<()>;

    /// Returns the backend type name.
    fn backend_type(&self) -> &'static str;
}

/// Lists deployed releases.
#[async_trait]
pub trait ReleaseObserver: Send + Sync {
    /// Returns every release visible to the backend.
    async fn list_releases(&self) -> Result<Vec<DeployedRelease>>;
}

/// Splits a `<chart>-<version>` label into name and version.
///
/// The version starts at the first `-` followed by a digit.
#[must_use]
pub fn split_chart_label(label: &str) -> (&str, Option<&str>) {
    let bytes = label.as_bytes();
    let split = bytes
        .windows(2)
        .position(|w| w[0] == b'-' && w[1].is_ascii_digit());

    match split {
        Some(index) if index > 0 => (&label[..index], Some(&label[index + 1..])),
        _ => (label, None),
    }
}

impl DeployedRelease {
    /// Returns the chart as `<chart>:<version>`, the way components declare it.
    #[must_use]
    pub fn chart_reference(&self) -> String {
        match split_chart_label(&self.chart) {
            (name, Some(version)) => format!("{name}:{version}"),
            (name, None) => name.to_string(),
        }
    }
}

impl std::fmt::Display for DeployedRelease {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{}/{} ({}, revision {}, {})",
            self.namespace, self.name, self.chart, self.revision, self.status
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_split_chart_label() {
        assert_eq!(
            split_chart_label("connector-hdfs-0.1.0"),
            ("connector-hdfs", Some("0.1.0"))
        );
        assert_eq!(
            split_chart_label("connector-hdfs-0.1.0-rc-1"),
            ("connector-hdfs", Some("0.1.0-rc-1"))
        );
        assert_eq!(split_chart_label("nginx"), ("nginx", None));
        assert_eq!(split_chart_label("-1.0"), ("-1.0", None));
    }

    #[test]
    fn test_chart_reference() {
        let release = DeployedRelease {
            chart: String::from("connector-hdfs-0.1.0"),
            ..DeployedRelease::default()
        };
        assert_eq!(release.chart_reference(), "connector-hdfs:0.1.0");
    }
}
