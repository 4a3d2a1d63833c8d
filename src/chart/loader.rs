//! Chart loader trait and chart types.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

use crate::error::{ConfigError, HelmsyncError, Result};

/// Chart metadata, as declared in `Chart.yaml`.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct ChartMetadata {
    /// Chart name.
    pub name: String,
    /// Chart version.
    pub version: String,
    /// Optional description.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

/// A single template file of a chart.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Template {
    /// Path of the template relative to the chart root.
    pub name: String,
    /// Raw template body.
    pub data: Vec<u8>,
}

/// A chart with its templates.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Chart {
    /// Chart metadata.
    pub metadata: ChartMetadata,
    /// Template files.
    pub templates: Vec<Template>,
}

/// A chart materialized on the local filesystem.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoadedChart {
    /// Parsed chart.
    pub chart: Chart,
    /// Local path handed to the release backend.
    pub path: PathBuf,
}

/// A parsed `<repository>/<chart>[:<version>]` reference.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChartReference {
    /// Repository name.
    pub repository: String,
    /// Chart name.
    pub name: String,
    /// Requested version, if any.
    pub version: Option<String>,
}

/// Resolves chart references to local charts.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait ChartLoader: Send + Sync {
    /// Loads the chart a reference points to.
    async fn load(&self, reference: &str) -> Result<LoadedChart>;
}

impl Chart {
    /// Returns true if any template body contains `marker`.
    #[must_use]
    pub fn any_template_contains(&self, marker: &str) -> bool {
        let marker = marker.as_bytes();
        if marker.is_empty() {
            return false;
        }

        self.templates
            .iter()
            .any(|t| t.data.windows(marker.len()).any(|w| w == marker))
    }
}

impl ChartReference {
    /// Parses a chart reference.
    ///
    /// # Errors
    ///
    /// Returns an error if the repository or chart name is missing.
    pub fn parse(reference: &str) -> Result<Self> {
        let invalid = || {
            HelmsyncError::Config(ConfigError::InvalidChartReference {
                reference: reference.to_string(),
            })
        };

        let (repository, chart) = reference.split_once('/').ok_or_else(invalid)?;
        let (name, version) = match chart.split_once(':') {
            Some((name, version)) => (name, Some(version)),
            None => (chart, None),
        };

        if repository.is_empty() || name.is_empty() || version.is_some_and(str::is_empty) {
            return Err(invalid());
        }

        Ok(Self {
            repository: repository.to_string(),
            name: name.to_string(),
            version: version.map(String::from),
        })
    }
}

impl std::fmt::Display for ChartReference {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}/{}", self.repository, self.name)?;
        if let Some(version) = &self.version {
            write!(f, ":{version}")?;
        }
        Ok(())
    }
}
