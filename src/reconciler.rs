//! Reconciler for converging deployed releases toward the declarations.
//!
//! This module builds the desired components (declarations plus the secret
//! source) and the current components (observed releases plus the secret
//! store), then hands both to the [`Executor`].

use serde::Serialize;
use tracing::{debug, info, warn};

use crate::chart::ChartLoader;
use crate::component::{Component, ComponentHasher, Components, Release};
use crate::config::{ComponentDeclaration, Settings, into_components};
use crate::error::Result;
use crate::planner::{
    ApplyPlan, ApplyReport, DiffDetail, Executor, ExecutorOptions, describe_changes, diff,
    is_only_secret_value_diff,
};
use crate::release::{DeployedRelease, ReleaseBackend, ReleaseObserver};
use crate::secrets::{SecretsReadWriteDeleter, SecretsReader};

/// Reconciler for maintaining desired state.
pub struct Reconciler<'a> {
    /// Settings.
    settings: &'a Settings,
    /// Source of desired secret values.
    source: &'a dyn SecretsReader,
    /// Store holding the secrets of deployed components.
    store: &'a dyn SecretsReadWriteDeleter,
    /// Chart loader.
    loader: &'a dyn ChartLoader,
    /// Release backend.
    backend: &'a dyn ReleaseBackend,
    /// Release observer.
    observer: &'a dyn ReleaseObserver,
    /// Executor options.
    options: ExecutorOptions,
}

/// Result of a reconciliation run.
#[derive(Debug, Serialize)]
pub struct ReconciliationResult {
    /// Whether every operation succeeded.
    pub success: bool,
    /// Number of components installed.
    pub created: usize,
    /// Number of components upgraded in place.
    pub updated: usize,
    /// Number of components uninstalled.
    pub deleted: usize,
    /// Number of components recreated.
    pub recreated: usize,
    /// Number of declared components left untouched.
    pub unchanged: usize,
    /// Execution report.
    pub report: ApplyReport,
}

/// How a component drifted from its declaration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum DriftKind {
    /// Declared but not deployed.
    Missing,
    /// Deployed with a different definition.
    Changed,
    /// Deployed with different secret values.
    SecretsChanged,
    /// Deployed but no longer declared.
    Orphaned,
}

/// A drifted component.
#[derive(Debug, Clone, Serialize)]
pub struct DriftEntry {
    /// Component name.
    pub name: String,
    /// Namespace.
    pub namespace: String,
    /// Kind of drift.
    pub kind: DriftKind,
    /// Field-level changes.
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub changes: Vec<DiffDetail>,
}

/// Report of drift detection.
#[derive(Debug, Serialize)]
pub struct DriftReport {
    /// Whether drift was detected.
    pub has_drift: bool,
    /// Drifted components.
    pub entries: Vec<DriftEntry>,
    /// Number of declared components.
    pub declared_count: usize,
    /// Number of managed releases observed.
    pub observed_count: usize,
}

/// Deployment status of one component.
#[derive(Debug, Clone, Serialize)]
pub struct ComponentStatus {
    /// Component name.
    pub name: String,
    /// Namespace.
    pub namespace: String,
    /// Declared chart, or the deployed one for undeclared releases.
    pub chart: String,
    /// Short definition fingerprint of the declaration.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub fingerprint: Option<String>,
    /// Deployed revision.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub revision: Option<u32>,
    /// Backend status, or `not deployed`.
    pub status: String,
    /// Whether the component is declared.
    pub declared: bool,
    /// Whether the deployed definition matches the declaration.
    pub in_sync: bool,
}

impl<'a> Reconciler<'a> {
    /// Creates a new reconciler.
    #[must_use]
    pub fn new(
        settings: &'a Settings,
        source: &'a dyn SecretsReader,
        store: &'a dyn SecretsReadWriteDeleter,
        loader: &'a dyn ChartLoader,
        backend: &'a dyn ReleaseBackend,
        observer: &'a dyn ReleaseObserver,
    ) -> Self {
        let options = ExecutorOptions {
            failure_policy: settings.apply.failure_policy,
            disabled_stages: settings.apply.disabled_stages.clone(),
            ..ExecutorOptions::default()
        };

        Self {
            settings,
            source,
            store,
            loader,
            backend,
            observer,
            options,
        }
    }

    /// Sets the executor options, replacing those derived from settings.
    #[must_use]
    pub fn with_options(mut self, options: ExecutorOptions) -> Self {
        self.options = options;
        self
    }

    /// Returns the executor options.
    #[must_use]
    pub const fn options(&self) -> &ExecutorOptions {
        &self.options
    }

    fn executor(&self) -> Executor<'_> {
        Executor::new(self.store, self.loader, self.backend)
            .with_options(self.options.clone())
            .with_markers(self.settings.forced_update.markers.iter().cloned())
    }

    /// Builds the desired components, with secret values from the source.
    ///
    /// # Errors
    ///
    /// Returns an error on an invalid declaration or a secret source failure.
    pub async fn resolve_desired(
        &self,
        declarations: &[ComponentDeclaration],
    ) -> Result<Components> {
        let mut desired = into_components(declarations, &self.settings.namespace)?;

        for component in desired.values_mut() {
            if component.secrets.is_empty() {
                continue;
            }
            component.secret_values = self
                .source
                .read(&component.name, &component.namespace, &component.secrets)
                .await?;
        }

        debug!("Resolved {} desired components", desired.len());
        Ok(desired)
    }

    /// Rebuilds the current components from deployed releases.
    ///
    /// Releases without helmsync metadata are not managed and are ignored.
    ///
    /// # Errors
    ///
    /// Returns an error if the observer or the secret store fails.
    pub async fn observe_current(&self) -> Result<Components> {
        let releases = self.observer.list_releases().await?;
        let mut current = Components::new();

        for release in releases {
            let Some(mut component) = managed_component(&release) else {
                debug!(release = %release.name, "Ignoring unmanaged release");
                continue;
            };

            component.secret_values = self
                .store
                .read(&component.name, &component.namespace, &[])
                .await?;
            component.secrets = component.secret_values.keys().cloned().collect();

            if let Some(previous) = current.insert(component.name.clone(), component) {
                warn!(
                    component = %previous.name,
                    namespace = %previous.namespace,
                    "Release name deployed in several namespaces, keeping the last one"
                );
            }
        }

        debug!("Observed {} managed components", current.len());
        Ok(current)
    }

    /// Computes the apply plan without applying it.
    ///
    /// # Errors
    ///
    /// Returns an error if desired or current state cannot be built, or if
    /// forced-update detection fails.
    pub async fn plan(&self, declarations: &[ComponentDeclaration]) -> Result<ApplyPlan> {
        let desired = self.resolve_desired(declarations).await?;
        let current = self.observe_current().await?;

        self.executor().plan(&desired, &current).await
    }

    /// Performs a full reconciliation.
    ///
    /// # Errors
    ///
    /// Returns an error if planning fails, or at the first failed operation
    /// under the fail-fast policy.
    pub async fn reconcile(
        &self,
        declarations: &[ComponentDeclaration],
    ) -> Result<ReconciliationResult> {
        info!(
            namespace = %self.settings.namespace,
            "Starting reconciliation of {} declared components",
            declarations.len()
        );

        let desired = self.resolve_desired(declarations).await?;
        let current = self.observe_current().await?;

        let plan = self.executor().plan(&desired, &current).await?;
        self.execute(&plan, desired.len()).await
    }

    /// Applies a plan computed by [`Reconciler::plan`].
    ///
    /// `declared` is the number of declared components, used to count the
    /// unchanged ones.
    ///
    /// # Errors
    ///
    /// Returns an error at the first failed operation under the fail-fast
    /// policy.
    pub async fn execute(&self, plan: &ApplyPlan, declared: usize) -> Result<ReconciliationResult> {
        let recreated = plan.forced.len();
        let created = plan.create.len().saturating_sub(recreated);
        let deleted = plan.delete.len().saturating_sub(recreated);

        info!(
            "Plan: {created} creates, {} updates, {deleted} deletes, {recreated} recreates",
            plan.update.len()
        );

        let report = self.executor().execute(plan).await?;

        Ok(ReconciliationResult {
            success: report.is_success(),
            created,
            updated: plan.update.len(),
            deleted,
            recreated,
            unchanged: declared.saturating_sub(plan.create.len() + plan.update.len()),
            report,
        })
    }

    /// Checks for drift without applying changes.
    ///
    /// Charts are not loaded, so releases that would be recreated are
    /// reported as changed.
    ///
    /// # Errors
    ///
    /// Returns an error if desired or current state cannot be built.
    pub async fn check_drift(&self, declarations: &[ComponentDeclaration]) -> Result<DriftReport> {
        info!("Checking for drift");

        let desired = self.resolve_desired(declarations).await?;
        let current = self.observe_current().await?;
        let changes = diff(&desired, &current);

        let mut entries: Vec<DriftEntry> = Vec::new();

        for component in changes.create.values() {
            entries.push(DriftEntry::new(component, DriftKind::Missing, Vec::new()));
        }
        for component in changes.update.values() {
            let details = current
                .get(&component.name)
                .map(|old| describe_changes(old, component))
                .unwrap_or_default();
            entries.push(DriftEntry::new(component, DriftKind::Changed, details));
        }
        for (name, component) in &desired {
            if let Some(old) = current.get(name)
                && is_only_secret_value_diff(component, old)
            {
                let details = describe_changes(old, component);
                entries.push(DriftEntry::new(component, DriftKind::SecretsChanged, details));
            }
        }
        for component in changes.delete.values() {
            entries.push(DriftEntry::new(component, DriftKind::Orphaned, Vec::new()));
        }

        entries.sort_by(|a, b| a.name.cmp(&b.name));

        Ok(DriftReport {
            has_drift: !entries.is_empty(),
            entries,
            declared_count: desired.len(),
            observed_count: current.len(),
        })
    }

    /// Lists declared components and managed releases with their status.
    ///
    /// # Errors
    ///
    /// Returns an error if desired or current state cannot be built.
    pub async fn status(
        &self,
        declarations: &[ComponentDeclaration],
    ) -> Result<Vec<ComponentStatus>> {
        let desired = self.resolve_desired(declarations).await?;
        let releases = self.observer.list_releases().await?;
        let current = self.observe_current().await?;
        let hasher = ComponentHasher::new();

        let mut statuses: Vec<ComponentStatus> = desired
            .values()
            .map(|component| {
                let release = releases.iter().find(|r| {
                    r.name == component.name && r.namespace == component.namespace
                });
                ComponentStatus {
                    name: component.name.clone(),
                    namespace: component.namespace.clone(),
                    chart: component.release.chart.clone(),
                    fingerprint: Some(hasher.short_hash(&hasher.fingerprint(component))),
                    revision: release.map(|r| r.revision),
                    status: release
                        .map_or_else(|| String::from("not deployed"), |r| r.status.clone()),
                    declared: true,
                    in_sync: current.get(&component.name) == Some(component),
                }
            })
            .collect();

        for component in current.values() {
            if desired.contains_key(&component.name) {
                continue;
            }
            let release = releases.iter().find(|r| r.name == component.name);
            statuses.push(ComponentStatus {
                name: component.name.clone(),
                namespace: component.namespace.clone(),
                chart: component.release.chart.clone(),
                fingerprint: None,
                revision: release.map(|r| r.revision),
                status: release.map_or_else(String::new, |r| r.status.clone()),
                declared: false,
                in_sync: false,
            });
        }

        statuses.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(statuses)
    }
}

/// Rebuilds a component from a release carrying helmsync metadata.
fn managed_component(release: &DeployedRelease) -> Option<Component> {
    let metadata = release.values.metadata()?;

    Some(Component::new(
        release.name.as_str(),
        release.namespace.as_str(),
        Release::new(release.chart_reference(), metadata.release_version),
        release.values.clone(),
        Vec::new(),
    ))
}

impl std::fmt::Debug for Reconciler<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Reconciler")
            .field("namespace", &self.settings.namespace)
            .field("backend", &self.backend.backend_type())
            .field("options", &self.options)
            .finish_non_exhaustive()
    }
}

impl DriftEntry {
    fn new(component: &Component, kind: DriftKind, changes: Vec<DiffDetail>) -> Self {
        Self {
            name: component.name.clone(),
            namespace: component.namespace.clone(),
            kind,
            changes,
        }
    }
}

impl DriftKind {
    /// Returns a short label.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Missing => "missing",
            Self::Changed => "changed",
            Self::SecretsChanged => "secrets changed",
            Self::Orphaned => "orphaned",
        }
    }
}

impl DriftReport {
    /// Returns true if the state is converged (no drift).
    #[must_use]
    pub const fn is_converged(&self) -> bool {
        !self.has_drift
    }
}

impl std::fmt::Display for DriftReport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if self.has_drift {
            writeln!(f, "Drift detected:")?;
            for entry in &self.entries {
                writeln!(
                    f,
                    "  - {} in {}: {}",
                    entry.name,
                    entry.namespace,
                    entry.kind.as_str()
                )?;
                for change in &entry.changes {
                    writeln!(f, "      {change}")?;
                }
            }
        } else {
            write!(f, "No drift detected - state is converged")?;
        }
        Ok(())
    }
}

impl std::fmt::Display for ReconciliationResult {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let status = if self.success { "successful" } else { "incomplete" };
        writeln!(f, "Reconciliation {status}:")?;
        writeln!(f, "  Created: {}", self.created)?;
        writeln!(f, "  Updated: {}", self.updated)?;
        writeln!(f, "  Recreated: {}", self.recreated)?;
        writeln!(f, "  Deleted: {}", self.deleted)?;
        writeln!(f, "  Unchanged: {}", self.unchanged)?;

        let failures: Vec<_> = self.report.failures().collect();
        if !failures.is_empty() {
            writeln!(f, "  Errors:")?;
            for outcome in failures {
                writeln!(f, "    - {outcome}")?;
            }
        }

        Ok(())
    }
}
