//! In-memory release backend.
//!
//! Keeps releases in a map and records every call. Failures can be injected
//! per release name to exercise error paths.

use async_trait::async_trait;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard, PoisonError};

use crate::error::{HelmsyncError, ReleaseError, Result};

use super::backend::{
    DeleteOptions, DeployedRelease, InstallOptions, ReleaseBackend, ReleaseObserver,
    UpdateOptions,
};

/// A recorded backend call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReleaseCall {
    /// `install` was called.
    Install {
        /// Chart path.
        chart_path: PathBuf,
        /// Target namespace.
        namespace: String,
        /// Options passed.
        options: InstallOptions,
    },
    /// `update` was called.
    Update {
        /// Release name.
        release_name: String,
        /// Chart path.
        chart_path: PathBuf,
        /// Options passed.
        options: UpdateOptions,
    },
    /// `delete` was called.
    Delete {
        /// Release name.
        release_name: String,
        /// Options passed.
        options: DeleteOptions,
    },
}

impl ReleaseCall {
    /// Returns the release name the call acts on.
    #[must_use]
    pub fn release_name(&self) -> &str {
        match self {
            Self::Install { options, .. } => &options.release_name,
            Self::Update { release_name, .. } | Self::Delete { release_name, .. } => release_name,
        }
    }
}

#[derive(Debug, Default)]
struct Inner {
    releases: BTreeMap<String, DeployedRelease>,
    calls: Vec<ReleaseCall>,
    failures: BTreeMap<String, String>,
}

/// Release backend kept in process memory.
#[derive(Debug, Default)]
pub struct InMemoryReleaseBackend {
    inner: Mutex<Inner>,
}

impl InMemoryReleaseBackend {
    /// Creates an empty backend.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Seeds a deployed release.
    #[must_use]
    pub fn with_release(self, release: DeployedRelease) -> Self {
        self.lock().releases.insert(release.name.clone(), release);
        self
    }

    /// Makes every call acting on `release_name` fail with `message`.
    #[must_use]
    pub fn fail_on(self, release_name: &str, message: &str) -> Self {
        self.lock()
            .failures
            .insert(release_name.to_string(), message.to_string());
        self
    }

    /// Returns every call made so far.
    #[must_use]
    pub fn calls(&self) -> Vec<ReleaseCall> {
        self.lock().calls.clone()
    }

    /// Returns a deployed release by name.
    #[must_use]
    pub fn release(&self, name: &str) -> Option<DeployedRelease> {
        self.lock().releases.get(name).cloned()
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Records a call and returns the injected failure for it, if any.
    fn record(inner: &mut Inner, call: ReleaseCall, command: &str) -> Result<()> {
        let failure = inner.failures.get(call.release_name()).cloned();
        inner.calls.push(call);

        match failure {
            Some(message) => Err(HelmsyncError::Release(ReleaseError::command(
                command, message,
            ))),
            None => Ok(()),
        }
    }
}

fn chart_label(chart_path: &Path) -> String {
    chart_path
        .file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_default()
}

#[async_trait]
impl ReleaseBackend for InMemoryReleaseBackend {
    async fn install(
        &self,
        chart_path: &Path,
        namespace: &str,
        options: &InstallOptions,
    ) -> Result<()> {
        let mut inner = self.lock();
        let call = ReleaseCall::Install {
            chart_path: chart_path.to_path_buf(),
            namespace: namespace.to_string(),
            options: options.clone(),
        };
        Self::record(&mut inner, call, "install")?;

        if options.dry_run {
            return Ok(());
        }

        if inner.releases.contains_key(&options.release_name) && !options.reuse_name {
            return Err(HelmsyncError::Release(ReleaseError::AlreadyExists {
                name: options.release_name.clone(),
            }));
        }

        inner.releases.insert(
            options.release_name.clone(),
            DeployedRelease {
                name: options.release_name.clone(),
                namespace: namespace.to_string(),
                chart: chart_label(chart_path),
                revision: 1,
                status: String::from("deployed"),
                values: options.values.clone(),
            },
        );
        Ok(())
    }

    async fn update(
        &self,
        release_name: &str,
        chart_path: &Path,
        options: &UpdateOptions,
    ) -> Result<()> {
        let mut inner = self.lock();
        let call = ReleaseCall::Update {
            release_name: release_name.to_string(),
            chart_path: chart_path.to_path_buf(),
            options: options.clone(),
        };
        Self::record(&mut inner, call, "upgrade")?;

        let Some(release) = inner.releases.get_mut(release_name) else {
            return Err(HelmsyncError::Release(ReleaseError::NotFound {
                name: release_name.to_string(),
            }));
        };

        if !options.dry_run {
            release.chart = chart_label(chart_path);
            release.values = options.values.clone();
            release.revision += 1;
        }
        Ok(())
    }

    async fn delete(&self, release_name: &str, options: &DeleteOptions) -> Result<()> {
        let mut inner = self.lock();
        let call = ReleaseCall::Delete {
            release_name: release_name.to_string(),
            options: options.clone(),
        };
        Self::record(&mut inner, call, "uninstall")?;

        if !options.dry_run {
            inner.releases.remove(release_name);
        }
        Ok(())
    }

    fn backend_type(&self) -> &'static str {
        "memory"
    }
}

#[async_trait]
impl ReleaseObserver for InMemoryReleaseBackend {
    async fn list_releases(&self) -> Result<Vec<DeployedRelease>> {
        Ok(self.lock().releases.values().cloned().collect())
    }
}
