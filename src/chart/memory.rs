//! In-memory chart loader.

use async_trait::async_trait;
use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::{Mutex, MutexGuard, PoisonError};

use crate::error::{ChartError, HelmsyncError, Result};

use super::loader::{Chart, ChartLoader, ChartMetadata, LoadedChart, Template};

/// Serves a fixed set of charts by reference and records every request.
#[derive(Debug, Default)]
pub struct StaticChartLoader {
    charts: BTreeMap<String, LoadedChart>,
    requests: Mutex<Vec<String>>,
}

impl StaticChartLoader {
    /// Creates a loader without charts.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a chart under a reference.
    ///
    /// The chart name and version are taken from the reference, the
    /// templates from `templates` as `(name, body)` pairs.
    #[must_use]
    pub fn with_chart(
        mut self,
        reference: &str,
        path: impl Into<PathBuf>,
        templates: &[(&str, &str)],
    ) -> Self {
        let chart_part = reference.rsplit_once('/').map_or(reference, |(_, c)| c);
        let (name, version) = chart_part.split_once(':').unwrap_or((chart_part, ""));

        let chart = Chart {
            metadata: ChartMetadata {
                name: name.to_string(),
                version: version.to_string(),
                description: None,
            },
            templates: templates
                .iter()
                .map(|(name, body)| Template {
                    name: (*name).to_string(),
                    data: body.as_bytes().to_vec(),
                })
                .collect(),
        };

        self.charts.insert(
            reference.to_string(),
            LoadedChart {
                chart,
                path: path.into(),
            },
        );
        self
    }

    /// Returns every reference requested so far.
    #[must_use]
    pub fn requests(&self) -> Vec<String> {
        self.lock().clone()
    }

    fn lock(&self) -> MutexGuard<'_, Vec<String>> {
        self.requests.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

#[async_trait]
impl ChartLoader for StaticChartLoader {
    async fn load(&self, reference: &str) -> Result<LoadedChart> {
        self.lock().push(reference.to_string());

        self.charts.get(reference).cloned().ok_or_else(|| {
            HelmsyncError::Chart(ChartError::NotFound {
                reference: reference.to_string(),
            })
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_serves_registered_charts() {
        let loader = StaticChartLoader::new().with_chart(
            "repo/connector-hdfs:0.1.0",
            "/charts/connector-hdfs-0.1.0",
            &[("templates/job.yaml", "type: ScheduledJob")],
        );

        let loaded = loader.load("repo/connector-hdfs:0.1.0").await.unwrap();
        assert_eq!(loaded.path, PathBuf::from("/charts/connector-hdfs-0.1.0"));
        assert_eq!(loaded.chart.metadata.name, "connector-hdfs");
        assert_eq!(loaded.chart.metadata.version, "0.1.0");

        assert!(loader.load("repo/missing").await.is_err());
        assert_eq!(
            loader.requests(),
            vec!["repo/connector-hdfs:0.1.0", "repo/missing"]
        );
    }
}
