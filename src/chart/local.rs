//! Local directory chart repositories.
//!
//! A repository is a directory holding unpacked charts, either as
//! `<name>-<version>/` or as `<name>/`. Each chart directory contains a
//! `Chart.yaml` and a `templates/` tree.

use async_trait::async_trait;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use tokio::fs;
use tracing::{debug, info};

use crate::error::{ChartError, HelmsyncError, Result};

use super::loader::{Chart, ChartLoader, ChartMetadata, ChartReference, LoadedChart, Template};

/// Chart metadata file name.
const CHART_FILE: &str = "Chart.yaml";

/// Templates directory name.
const TEMPLATES_DIR: &str = "templates";

/// Loads charts from local directory repositories.
#[derive(Debug, Default)]
pub struct LocalChartLoader {
    /// Repository roots by repository name.
    repositories: BTreeMap<String, PathBuf>,
}

impl LocalChartLoader {
    /// Creates a loader without repositories.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            repositories: BTreeMap::new(),
        }
    }

    /// Adds a repository.
    #[must_use]
    pub fn with_repository(mut self, name: impl Into<String>, root: impl Into<PathBuf>) -> Self {
        self.repositories.insert(name.into(), root.into());
        self
    }

    /// Finds the chart directory for a reference.
    fn locate(&self, reference: &ChartReference) -> Result<PathBuf> {
        let root = self.repositories.get(&reference.repository).ok_or_else(|| {
            HelmsyncError::Chart(ChartError::UnknownRepository {
                repository: reference.repository.clone(),
            })
        })?;

        let mut candidates = Vec::new();
        if let Some(version) = &reference.version {
            candidates.push(root.join(format!("{}-{version}", reference.name)));
        }
        candidates.push(root.join(&reference.name));

        candidates
            .into_iter()
            .find(|dir| dir.join(CHART_FILE).is_file())
            .ok_or_else(|| {
                HelmsyncError::Chart(ChartError::NotFound {
                    reference: reference.to_string(),
                })
            })
    }

    /// Reads `Chart.yaml`.
    async fn read_metadata(dir: &Path) -> Result<ChartMetadata> {
        let path = dir.join(CHART_FILE);
        let content = fs::read_to_string(&path)
            .await
            .map_err(|e| invalid(dir, format!("Failed to read {CHART_FILE}: {e}")))?;

        serde_yaml::from_str(&content)
            .map_err(|e| invalid(dir, format!("Failed to parse {CHART_FILE}: {e}")))
    }

    /// Reads every file below `templates/`, sorted by path.
    async fn read_templates(dir: &Path) -> Result<Vec<Template>> {
        let root = dir.join(TEMPLATES_DIR);
        let mut templates = Vec::new();

        if !root.is_dir() {
            return Ok(templates);
        }

        let mut pending = vec![root];
        while let Some(current) = pending.pop() {
            let mut entries = fs::read_dir(&current)
                .await
                .map_err(|e| invalid(dir, format!("Failed to list {}: {e}", current.display())))?;

            while let Some(entry) = entries
                .next_entry()
                .await
                .map_err(|e| invalid(dir, format!("Failed to list {}: {e}", current.display())))?
            {
                let path = entry.path();
                if path.is_dir() {
                    pending.push(path);
                    continue;
                }

                let data = fs::read(&path)
                    .await
                    .map_err(|e| invalid(dir, format!("Failed to read {}: {e}", path.display())))?;
                let name = path
                    .strip_prefix(dir)
                    .unwrap_or(&path)
                    .to_string_lossy()
                    .into_owned();

                templates.push(Template { name, data });
            }
        }

        templates.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(templates)
    }
}

#[async_trait]
impl ChartLoader for LocalChartLoader {
    async fn load(&self, reference: &str) -> Result<LoadedChart> {
        let parsed = ChartReference::parse(reference)?;
        let dir = self.locate(&parsed)?;
        debug!("Loading chart {reference} from {}", dir.display());

        let metadata = Self::read_metadata(&dir).await?;
        if let Some(expected) = &parsed.version
            && metadata.version != *expected
        {
            return Err(HelmsyncError::Chart(ChartError::VersionMismatch {
                name: parsed.name,
                expected: expected.clone(),
                found: metadata.version,
            }));
        }

        let templates = Self::read_templates(&dir).await?;
        info!(
            "Loaded chart {} {} ({} templates)",
            metadata.name,
            metadata.version,
            templates.len()
        );

        Ok(LoadedChart {
            chart: Chart {
                metadata,
                templates,
            },
            path: dir,
        })
    }
}

fn invalid(path: &Path, message: String) -> HelmsyncError {
    HelmsyncError::Chart(ChartError::Invalid {
        path: path.to_path_buf(),
        message,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn write_chart(root: &Path, dir_name: &str, name: &str, version: &str) -> PathBuf {
        let dir = root.join(dir_name);
        std::fs::create_dir_all(dir.join("templates/jobs")).expect("Failed to create chart dirs");
        std::fs::write(
            dir.join(CHART_FILE),
            format!("apiVersion: v2\nname: {name}\nversion: {version}\n"),
        )
        .expect("Failed to write Chart.yaml");
        std::fs::write(dir.join("templates/deployment.yaml"), "kind: Deployment\n")
            .expect("Failed to write template");
        std::fs::write(dir.join("templates/jobs/cleanup.yaml"), "type: ScheduledJob\n")
            .expect("Failed to write template");
        dir
    }

    #[tokio::test]
    async fn test_load_versioned_directory() {
        let temp = TempDir::new().expect("Failed to create temp dir");
        let dir = write_chart(temp.path(), "connector-hdfs-0.1.0", "connector-hdfs", "0.1.0");
        let loader = LocalChartLoader::new().with_repository("repo", temp.path());

        let loaded = loader.load("repo/connector-hdfs:0.1.0").await.unwrap();

        assert_eq!(loaded.path, dir);
        assert_eq!(loaded.chart.metadata.name, "connector-hdfs");
        assert_eq!(loaded.chart.templates.len(), 2);
        assert_eq!(loaded.chart.templates[0].name, "templates/deployment.yaml");
        assert!(loaded.chart.any_template_contains("type: ScheduledJob"));
    }

    #[tokio::test]
    async fn test_load_unversioned_directory() {
        let temp = TempDir::new().expect("Failed to create temp dir");
        write_chart(temp.path(), "connector-hdfs", "connector-hdfs", "0.2.0");
        let loader = LocalChartLoader::new().with_repository("repo", temp.path());

        let loaded = loader.load("repo/connector-hdfs").await.unwrap();
        assert_eq!(loaded.chart.metadata.version, "0.2.0");
    }

    #[tokio::test]
    async fn test_version_mismatch() {
        let temp = TempDir::new().expect("Failed to create temp dir");
        write_chart(temp.path(), "connector-hdfs", "connector-hdfs", "0.2.0");
        let loader = LocalChartLoader::new().with_repository("repo", temp.path());

        let err = loader.load("repo/connector-hdfs:0.1.0").await.unwrap_err();
        assert!(matches!(
            err,
            HelmsyncError::Chart(ChartError::VersionMismatch { .. })
        ));
    }

    #[tokio::test]
    async fn test_unknown_repository_and_missing_chart() {
        let temp = TempDir::new().expect("Failed to create temp dir");
        let loader = LocalChartLoader::new().with_repository("repo", temp.path());

        let err = loader.load("other/connector-hdfs").await.unwrap_err();
        assert!(matches!(
            err,
            HelmsyncError::Chart(ChartError::UnknownRepository { .. })
        ));

        let err = loader.load("repo/connector-hdfs").await.unwrap_err();
        assert!(err.is_not_found());
    }
}
