//! Helm CLI release backend.
//!
//! Every operation shells out to the `helm` binary. Values are streamed as a
//! YAML document on stdin so they never touch the filesystem.

use async_trait::async_trait;
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use tokio::io::AsyncWriteExt;
use tokio::process::Command;
use tracing::{debug, info, warn};

use crate::component::Configuration;
use crate::error::{HelmsyncError, ReleaseError, Result};

use super::backend::{
    DeleteOptions, DeployedRelease, InstallOptions, ReleaseBackend, ReleaseObserver,
    UpdateOptions,
};

/// Default helm binary.
const DEFAULT_HELM_BINARY: &str = "helm";

/// Entry of `helm list -o json`.
#[derive(Debug, Deserialize)]
struct ListEntry {
    name: String,
    namespace: String,
    #[serde(default)]
    revision: String,
    #[serde(default)]
    status: String,
    #[serde(default)]
    chart: String,
}

/// Release backend driving the helm CLI.
#[derive(Debug, Clone)]
pub struct HelmCli {
    /// Path or name of the helm binary.
    binary: PathBuf,
    /// Kubeconfig context passed to every invocation.
    kube_context: Option<String>,
}

impl Default for HelmCli {
    fn default() -> Self {
        Self::new()
    }
}

impl HelmCli {
    /// Creates a backend using `helm` from `PATH`.
    #[must_use]
    pub fn new() -> Self {
        Self {
            binary: PathBuf::from(DEFAULT_HELM_BINARY),
            kube_context: None,
        }
    }

    /// Uses a specific helm binary.
    #[must_use]
    pub fn with_binary(mut self, binary: impl Into<PathBuf>) -> Self {
        self.binary = binary.into();
        self
    }

    /// Targets a specific kubeconfig context.
    #[must_use]
    pub fn with_kube_context(mut self, context: Option<String>) -> Self {
        self.kube_context = context;
        self
    }

    fn global_args(&self) -> Vec<String> {
        self.kube_context
            .as_ref()
            .map(|context| vec![String::from("--kube-context"), context.clone()])
            .unwrap_or_default()
    }

    /// Runs helm with the given arguments, optionally feeding stdin.
    ///
    /// `subject` is the release the command acts on, reported when helm
    /// answers that it does not exist.
    async fn run(
        &self,
        command: &str,
        subject: &str,
        args: Vec<String>,
        stdin: Option<String>,
    ) -> Result<Vec<u8>> {
        let mut args = args;
        args.extend(self.global_args());
        debug!("Running {} {}", self.binary.display(), args.join(" "));

        let mut cmd = Command::new(&self.binary);
        cmd.args(&args)
            .stdin(if stdin.is_some() {
                Stdio::piped()
            } else {
                Stdio::null()
            })
            .stdout(Stdio::piped())
            .stderr(Stdio::piped());

        let mut child = cmd.spawn().map_err(|e| {
            HelmsyncError::Release(ReleaseError::command(
                command,
                format!("Failed to spawn {}: {e}", self.binary.display()),
            ))
        })?;

        if let (Some(input), Some(mut pipe)) = (stdin, child.stdin.take()) {
            pipe.write_all(input.as_bytes()).await.map_err(|e| {
                HelmsyncError::Release(ReleaseError::command(
                    command,
                    format!("Failed to write values: {e}"),
                ))
            })?;
            pipe.shutdown().await.map_err(|e| {
                HelmsyncError::Release(ReleaseError::command(
                    command,
                    format!("Failed to close stdin: {e}"),
                ))
            })?;
        }

        let output = child.wait_with_output().await.map_err(|e| {
            HelmsyncError::Release(ReleaseError::command(
                command,
                format!("Failed to wait for helm: {e}"),
            ))
        })?;

        if output.status.success() {
            return Ok(output.stdout);
        }

        let stderr = String::from_utf8_lossy(&output.stderr).trim().to_string();
        if is_not_found_message(&stderr) {
            return Err(HelmsyncError::Release(ReleaseError::NotFound {
                name: subject.to_string(),
            }));
        }

        Err(HelmsyncError::Release(ReleaseError::command(command, stderr)))
    }

    async fn get_values(&self, name: &str, namespace: &str) -> Result<Configuration> {
        let stdout = self
            .run("get values", name, get_values_args(name, namespace), None)
            .await?;
        parse_values(&stdout)
    }
}

#[async_trait]
impl ReleaseBackend for HelmCli {
    async fn install(
        &self,
        chart_path: &Path,
        namespace: &str,
        options: &InstallOptions,
    ) -> Result<()> {
        info!(
            release = %options.release_name,
            namespace = %namespace,
            dry_run = options.dry_run,
            "Installing release"
        );
        let values = options.values.to_yaml()?;
        self.run(
            "install",
            &options.release_name,
            install_args(chart_path, namespace, options),
            Some(values),
        )
        .await?;
        Ok(())
    }

    async fn update(
        &self,
        release_name: &str,
        chart_path: &Path,
        options: &UpdateOptions,
    ) -> Result<()> {
        info!(
            release = %release_name,
            namespace = %options.namespace,
            dry_run = options.dry_run,
            "Upgrading release"
        );
        let values = options.values.to_yaml()?;
        self.run(
            "upgrade",
            release_name,
            upgrade_args(release_name, chart_path, options),
            Some(values),
        )
        .await?;
        Ok(())
    }

    async fn delete(&self, release_name: &str, options: &DeleteOptions) -> Result<()> {
        info!(
            release = %release_name,
            namespace = %options.namespace,
            dry_run = options.dry_run,
            "Uninstalling release"
        );
        let args = uninstall_args(release_name, options);
        match self.run("uninstall", release_name, args, None).await {
            Err(e) if e.is_not_found() => {
                warn!(release = %release_name, "Release not found, nothing to delete");
                Ok(())
            }
            other => other.map(|_| ()),
        }
    }

    fn backend_type(&self) -> &'static str {
        "helm"
    }
}

#[async_trait]
impl ReleaseObserver for HelmCli {
    async fn list_releases(&self) -> Result<Vec<DeployedRelease>> {
        let stdout = self.run("list", "", list_args(), None).await?;
        let entries: Vec<ListEntry> = serde_json::from_slice(&stdout).map_err(|e| {
            HelmsyncError::Release(ReleaseError::InvalidResponse {
                message: format!("Failed to parse helm list output: {e}"),
            })
        })?;

        let mut releases = Vec::with_capacity(entries.len());
        for entry in entries {
            let values = self.get_values(&entry.name, &entry.namespace).await?;
            releases.push(DeployedRelease {
                revision: entry.revision.parse().unwrap_or_default(),
                name: entry.name,
                namespace: entry.namespace,
                chart: entry.chart,
                status: entry.status,
                values,
            });
        }

        debug!("Observed {} releases", releases.len());
        Ok(releases)
    }
}

fn install_args(chart_path: &Path, namespace: &str, options: &InstallOptions) -> Vec<String> {
    let mut args = vec![
        String::from("install"),
        options.release_name.clone(),
        chart_path.display().to_string(),
        String::from("--namespace"),
        namespace.to_string(),
        String::from("--create-namespace"),
        String::from("--values"),
        String::from("-"),
    ];
    if options.dry_run {
        args.push(String::from("--dry-run"));
    }
    if options.reuse_name {
        args.push(String::from("--replace"));
    }
    args
}

fn upgrade_args(release_name: &str, chart_path: &Path, options: &UpdateOptions) -> Vec<String> {
    let mut args = vec![
        String::from("upgrade"),
        release_name.to_string(),
        chart_path.display().to_string(),
        String::from("--namespace"),
        options.namespace.clone(),
        String::from("--values"),
        String::from("-"),
    ];
    if options.dry_run {
        args.push(String::from("--dry-run"));
    }
    args
}

fn uninstall_args(release_name: &str, options: &DeleteOptions) -> Vec<String> {
    let mut args = vec![
        String::from("uninstall"),
        release_name.to_string(),
        String::from("--namespace"),
        options.namespace.clone(),
    ];
    if !options.purge {
        args.push(String::from("--keep-history"));
    }
    if options.dry_run {
        args.push(String::from("--dry-run"));
    }
    args
}

fn list_args() -> Vec<String> {
    ["list", "--all-namespaces", "--all", "--output", "json"]
        .into_iter()
        .map(String::from)
        .collect()
}

fn get_values_args(name: &str, namespace: &str) -> Vec<String> {
    vec![
        String::from("get"),
        String::from("values"),
        name.to_string(),
        String::from("--namespace"),
        namespace.to_string(),
        String::from("--output"),
        String::from("json"),
    ]
}

fn parse_values(stdout: &[u8]) -> Result<Configuration> {
    let parsed: Option<Configuration> = serde_json::from_slice(stdout).map_err(|e| {
        HelmsyncError::Release(ReleaseError::InvalidResponse {
            message: format!("Failed to parse helm values: {e}"),
        })
    })?;
    Ok(parsed.unwrap_or_default())
}

/// Matches helm's release lookup failure, not other missing resources.
fn is_not_found_message(stderr: &str) -> bool {
    stderr.contains("release: not found")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_install_args() {
        let options = InstallOptions {
            release_name: String::from("hdfs"),
            values: Configuration::new(),
            dry_run: true,
            reuse_name: true,
        };

        let args = install_args(Path::new("/charts/hdfs"), "data", &options);
        assert_eq!(
            args,
            vec![
                "install",
                "hdfs",
                "/charts/hdfs",
                "--namespace",
                "data",
                "--create-namespace",
                "--values",
                "-",
                "--dry-run",
                "--replace"
            ]
        );
    }

    #[test]
    fn test_upgrade_args_without_dry_run() {
        let options = UpdateOptions {
            namespace: String::from("data"),
            ..UpdateOptions::default()
        };

        let args = upgrade_args("hdfs", Path::new("/charts/hdfs"), &options);
        assert!(!args.contains(&String::from("--dry-run")));
        assert_eq!(args[0], "upgrade");
        assert_eq!(args[1], "hdfs");
    }

    #[test]
    fn test_uninstall_args() {
        let purge = DeleteOptions {
            namespace: String::from("data"),
            purge: true,
            dry_run: false,
        };
        assert!(!uninstall_args("hdfs", &purge).contains(&String::from("--keep-history")));

        let keep = DeleteOptions {
            purge: false,
            ..purge
        };
        assert!(uninstall_args("hdfs", &keep).contains(&String::from("--keep-history")));
    }

    #[test]
    fn test_global_args_carry_context() {
        let helm = HelmCli::new().with_kube_context(Some(String::from("staging")));
        assert_eq!(helm.global_args(), vec!["--kube-context", "staging"]);
        assert!(HelmCli::new().global_args().is_empty());
    }

    #[test]
    fn test_parse_values() {
        let values = parse_values(br#"{"replicas": 2, "_metadata": {"chartRepository": "repo", "releaseVersion": "1.0.0"}}"#)
            .unwrap();
        assert_eq!(values.get("replicas"), Some(&serde_json::json!(2)));
        assert_eq!(
            values.metadata().map(|m| m.chart_repository),
            Some(String::from("repo"))
        );

        assert!(parse_values(b"null").unwrap().is_empty());
        assert!(parse_values(b"not json").is_err());
    }

    #[test]
    fn test_not_found_detection() {
        assert!(is_not_found_message(
            "Error: uninstall: Release not loaded: hdfs: release: not found"
        ));
        assert!(is_not_found_message("Error: release: not found"));
        assert!(!is_not_found_message("Error: timed out waiting for the condition"));
        assert!(!is_not_found_message(
            "Error: INSTALLATION FAILED: create: failed to create: namespaces \"x\" not found"
        ));
    }
}
