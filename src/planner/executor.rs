//! Executor for reconciliation passes.
//!
//! The executor computes the plan (diff, detection, forced-update
//! integration) and applies it against the release backend and the secret
//! store: deletes first, then updates, then creates.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet, HashMap};
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::chart::{ChartLoader, LoadedChart};
use crate::component::{Component, Components};
use crate::error::{ApplyError, HelmsyncError, Result};
use crate::release::{DeleteOptions, InstallOptions, ReleaseBackend, UpdateOptions};
use crate::secrets::SecretsWriteDeleter;

use super::detector::ScheduledWorkloadDetector;
use super::diff::{describe_changes, diff, is_only_secret_value_diff};
use super::forced::integrate_forced_updates;
use super::plan::{ApplyPhase, ApplyPlan};

/// What to do when a component operation fails.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum FailurePolicy {
    /// Abort the pass at the first failure.
    #[default]
    FailFast,
    /// Attempt every component and report all failures.
    ContinueOnError,
}

/// Toggles of an apply pass.
#[derive(Debug, Clone, Default)]
pub struct ExecutorOptions {
    /// Ask the backend to validate without mutating.
    pub dry_run: bool,
    /// Recreate every updated release and reuse release names.
    pub force: bool,
    /// Failure handling.
    pub failure_policy: FailurePolicy,
    /// Phases that are not applied.
    pub disabled_stages: BTreeSet<ApplyPhase>,
}

/// Status of one component operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum OutcomeStatus {
    /// The operation succeeded.
    Applied,
    /// The operation failed.
    Failed,
    /// The operation did not run.
    Skipped,
}

/// Outcome of one component operation.
#[derive(Debug, Clone, Serialize)]
pub struct ComponentOutcome {
    /// Component name.
    pub name: String,
    /// Namespace.
    pub namespace: String,
    /// Phase of the operation.
    pub phase: ApplyPhase,
    /// Whether the operation is half of a forced recreate.
    pub forced: bool,
    /// Status.
    pub status: OutcomeStatus,
    /// Error or skip reason.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

/// Result of an apply pass.
#[derive(Debug, Clone, Serialize)]
pub struct ApplyReport {
    /// Identifier of the pass, for log correlation.
    pub run_id: Uuid,
    /// When the pass started.
    pub started_at: DateTime<Utc>,
    /// When the pass finished.
    pub finished_at: DateTime<Utc>,
    /// Whether the pass was a dry run.
    pub dry_run: bool,
    /// Outcome of every planned operation, in apply order.
    pub outcomes: Vec<ComponentOutcome>,
}

/// Applies component changes against a release backend and a secret store.
pub struct Executor<'a> {
    secrets: &'a dyn SecretsWriteDeleter,
    loader: &'a dyn ChartLoader,
    backend: &'a dyn ReleaseBackend,
    detector: ScheduledWorkloadDetector<'a>,
    options: ExecutorOptions,
}

impl<'a> Executor<'a> {
    /// Creates an executor with default options.
    #[must_use]
    pub fn new(
        secrets: &'a dyn SecretsWriteDeleter,
        loader: &'a dyn ChartLoader,
        backend: &'a dyn ReleaseBackend,
    ) -> Self {
        Self {
            secrets,
            loader,
            backend,
            detector: ScheduledWorkloadDetector::new(loader),
            options: ExecutorOptions::default(),
        }
    }

    /// Sets the pass options.
    #[must_use]
    pub fn with_options(mut self, options: ExecutorOptions) -> Self {
        self.options = options;
        self
    }

    /// Adds template markers of releases that cannot be updated in place.
    #[must_use]
    pub fn with_markers<I, S>(mut self, markers: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.detector = self.detector.with_markers(markers);
        self
    }

    /// Returns the pass options.
    #[must_use]
    pub const fn options(&self) -> &ExecutorOptions {
        &self.options
    }

    async fn load_chart(&self, component: &Component) -> Result<LoadedChart> {
        let reference = component.chart_ref()?;
        self.loader.load(&reference).await
    }

    /// Installs a component.
    ///
    /// Secrets are written before the install so the release finds them.
    ///
    /// # Errors
    ///
    /// Returns the first loader, secret store or backend error.
    pub async fn create_component(&self, component: &Component) -> Result<()> {
        let loaded = self.load_chart(component).await?;

        if !component.secrets.is_empty() {
            self.secrets
                .write(&component.name, &component.namespace, &component.secret_values)
                .await?;
        }

        let options = InstallOptions {
            release_name: component.name.clone(),
            values: component.configuration.clone(),
            dry_run: self.options.dry_run,
            reuse_name: self.options.force,
        };

        info!(component = %component.name, namespace = %component.namespace, "Creating component");
        self.backend
            .install(&loaded.path, &component.namespace, &options)
            .await
    }

    /// Upgrades a component in place.
    ///
    /// # Errors
    ///
    /// Returns the first loader, secret store or backend error.
    pub async fn update_component(&self, component: &Component) -> Result<()> {
        let loaded = self.load_chart(component).await?;

        if !component.secrets.is_empty() {
            self.secrets
                .write(&component.name, &component.namespace, &component.secret_values)
                .await?;
        } else if !self.options.dry_run {
            self.secrets
                .delete(&component.name, &component.namespace)
                .await?;
        }

        let options = UpdateOptions {
            namespace: component.namespace.clone(),
            values: component.configuration.clone(),
            dry_run: self.options.dry_run,
        };

        info!(component = %component.name, namespace = %component.namespace, "Updating component");
        self.backend
            .update(&component.name, &loaded.path, &options)
            .await
    }

    /// Uninstalls a component and removes its secrets.
    ///
    /// The secret entry is kept in dry run mode.
    ///
    /// # Errors
    ///
    /// Returns the first backend or secret store error.
    pub async fn delete_component(&self, component: &Component) -> Result<()> {
        let options = DeleteOptions {
            namespace: component.namespace.clone(),
            purge: true,
            dry_run: self.options.dry_run,
        };

        info!(component = %component.name, namespace = %component.namespace, "Deleting component");
        self.backend.delete(&component.name, &options).await?;

        if self.options.dry_run {
            debug!(component = %component.name, "Dry run, keeping secrets");
            return Ok(());
        }

        self.secrets
            .delete(&component.name, &component.namespace)
            .await
    }

    /// Computes the plan for a pass without applying it.
    ///
    /// # Errors
    ///
    /// Returns [`ApplyError::Detection`] if a chart cannot be inspected.
    pub async fn plan(&self, desired: &Components, current: &Components) -> Result<ApplyPlan> {
        let mut changes = diff(desired, current);
        let mut need_forced_update: HashMap<String, bool> = HashMap::new();

        for (name, component) in &changes.update {
            let moved = current
                .get(name)
                .is_some_and(|existing| existing.namespace != component.namespace);
            let forced = if self.options.force {
                true
            } else if moved {
                // Releases are namespaced: a move cannot be an upgrade.
                debug!(
                    component = %name,
                    namespace = %component.namespace,
                    "Namespace changed, recreating"
                );
                true
            } else {
                self.detector.is_cron_job(component).await.map_err(|e| {
                    HelmsyncError::Apply(ApplyError::Detection {
                        name: name.clone(),
                        source: Box::new(e),
                    })
                })?
            };
            need_forced_update.insert(name.clone(), forced);
        }

        let mut secret_refresh = BTreeSet::new();
        for (name, component) in desired {
            if let Some(existing) = current.get(name)
                && is_only_secret_value_diff(component, existing)
            {
                debug!(component = %name, "Only secret values changed, recreating");
                changes.update.insert(name.clone(), component.clone());
                need_forced_update.insert(name.clone(), true);
                secret_refresh.insert(name.clone());
            }
        }

        let details: BTreeMap<_, _> = changes
            .update
            .iter()
            .filter_map(|(name, component)| {
                current
                    .get(name)
                    .map(|existing| (name.clone(), describe_changes(existing, component)))
            })
            .collect();

        let forced: BTreeSet<String> = need_forced_update
            .iter()
            .filter(|(_, forced)| **forced)
            .map(|(name, _)| name.clone())
            .collect();

        let integrated = integrate_forced_updates(current, changes, &need_forced_update);

        Ok(ApplyPlan {
            create: integrated.create,
            update: integrated.update,
            delete: integrated.delete,
            forced,
            secret_refresh,
            changes: details,
            ..ApplyPlan::empty()
        })
    }

    /// Plans and applies a pass.
    ///
    /// # Errors
    ///
    /// Returns an error if planning fails, or on the first failed component
    /// operation under [`FailurePolicy::FailFast`].
    pub async fn apply(&self, desired: &Components, current: &Components) -> Result<ApplyReport> {
        let plan = self.plan(desired, current).await?;
        self.execute(&plan).await
    }

    /// Applies a computed plan.
    ///
    /// # Errors
    ///
    /// Returns [`ApplyError::ComponentFailed`] on the first failure under
    /// [`FailurePolicy::FailFast`].
    pub async fn execute(&self, plan: &ApplyPlan) -> Result<ApplyReport> {
        let run_id = Uuid::new_v4();
        let started_at = Utc::now();
        info!(
            run_id = %run_id,
            dry_run = self.options.dry_run,
            "Applying plan with {} operations",
            plan.action_count()
        );

        let mut outcomes = Vec::new();
        let mut failed_deletes: BTreeSet<String> = BTreeSet::new();
        let deletes_disabled = self.options.disabled_stages.contains(&ApplyPhase::Delete);

        for phase in ApplyPhase::ALL {
            let stage_disabled = self.options.disabled_stages.contains(&phase);

            for component in plan.components(phase).values() {
                let forced = plan.is_forced(&component.name);

                if stage_disabled {
                    info!(component = %component.name, %phase, "Stage disabled, skipping");
                    outcomes.push(ComponentOutcome::skipped(
                        component,
                        phase,
                        forced,
                        "Stage disabled",
                    ));
                    continue;
                }

                if phase == ApplyPhase::Create
                    && forced
                    && (deletes_disabled || failed_deletes.contains(&component.name))
                {
                    warn!(
                        component = %component.name,
                        "Previous release was not deleted, skipping create"
                    );
                    outcomes.push(ComponentOutcome::skipped(
                        component,
                        phase,
                        forced,
                        "Previous release was not deleted",
                    ));
                    continue;
                }

                match self.apply_one(phase, component).await {
                    Ok(()) => outcomes.push(ComponentOutcome::applied(component, phase, forced)),
                    Err(e) => {
                        error!(component = %component.name, %phase, "Operation failed: {e}");

                        if self.options.failure_policy == FailurePolicy::FailFast {
                            return Err(ApplyError::component(&component.name, phase, e).into());
                        }

                        if phase == ApplyPhase::Delete {
                            failed_deletes.insert(component.name.clone());
                        }
                        outcomes.push(ComponentOutcome::failed(component, phase, forced, &e));
                    }
                }
            }
        }

        let report = ApplyReport {
            run_id,
            started_at,
            finished_at: Utc::now(),
            dry_run: self.options.dry_run,
            outcomes,
        };
        info!(run_id = %run_id, "{report}");

        Ok(report)
    }

    async fn apply_one(&self, phase: ApplyPhase, component: &Component) -> Result<()> {
        match phase {
            ApplyPhase::Delete => self.delete_component(component).await,
            ApplyPhase::Update => self.update_component(component).await,
            ApplyPhase::Create => self.create_component(component).await,
        }
    }
}

impl std::fmt::Debug for Executor<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Executor")
            .field("secrets", &self.secrets.backend_type())
            .field("backend", &self.backend.backend_type())
            .field("detector", &self.detector)
            .field("options", &self.options)
            .finish_non_exhaustive()
    }
}

impl ComponentOutcome {
    fn new(
        component: &Component,
        phase: ApplyPhase,
        forced: bool,
        status: OutcomeStatus,
        message: Option<String>,
    ) -> Self {
        Self {
            name: component.name.clone(),
            namespace: component.namespace.clone(),
            phase,
            forced,
            status,
            message,
        }
    }

    fn applied(component: &Component, phase: ApplyPhase, forced: bool) -> Self {
        Self::new(component, phase, forced, OutcomeStatus::Applied, None)
    }

    fn failed(component: &Component, phase: ApplyPhase, forced: bool, err: &HelmsyncError) -> Self {
        Self::new(
            component,
            phase,
            forced,
            OutcomeStatus::Failed,
            Some(err.to_string()),
        )
    }

    fn skipped(component: &Component, phase: ApplyPhase, forced: bool, reason: &str) -> Self {
        Self::new(
            component,
            phase,
            forced,
            OutcomeStatus::Skipped,
            Some(reason.to_string()),
        )
    }
}

impl std::fmt::Display for ComponentOutcome {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} '{}' in {}", self.phase, self.name, self.namespace)?;
        if self.forced {
            write!(f, " (recreate)")?;
        }
        if let Some(message) = &self.message {
            write!(f, ": {message}")?;
        }
        Ok(())
    }
}

impl ApplyReport {
    fn count(&self, status: OutcomeStatus) -> usize {
        self.outcomes.iter().filter(|o| o.status == status).count()
    }

    /// Returns the number of applied operations.
    #[must_use]
    pub fn applied(&self) -> usize {
        self.count(OutcomeStatus::Applied)
    }

    /// Returns the number of failed operations.
    #[must_use]
    pub fn failed(&self) -> usize {
        self.count(OutcomeStatus::Failed)
    }

    /// Returns the number of skipped operations.
    #[must_use]
    pub fn skipped(&self) -> usize {
        self.count(OutcomeStatus::Skipped)
    }

    /// Returns true if no operation failed.
    #[must_use]
    pub fn is_success(&self) -> bool {
        self.failed() == 0
    }

    /// Returns the failed operations.
    pub fn failures(&self) -> impl Iterator<Item = &ComponentOutcome> {
        self.outcomes
            .iter()
            .filter(|o| o.status == OutcomeStatus::Failed)
    }
}

impl std::fmt::Display for ApplyReport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "Executed {} operations: {} applied, {} failed, {} skipped",
            self.outcomes.len(),
            self.applied(),
            self.failed(),
            self.skipped()
        )?;
        if self.dry_run {
            write!(f, " (dry run)")?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chart::StaticChartLoader;
    use crate::component::{Configuration, Metadata, Release, SecretValues};
    use crate::release::{DeployedRelease, InMemoryReleaseBackend, MockReleaseBackend, ReleaseCall};
    use crate::secrets::{InMemorySecretStore, SecretOperation};
    use std::path::Path;
    use std::sync::Arc;

    const HDFS_CHART: &str = "connector-hdfs:0.1.0";
    const CRON_CHART: &str = "cleanup:0.1.0";

    fn loader() -> StaticChartLoader {
        StaticChartLoader::new()
            .with_chart(
                "repo/connector-hdfs:0.1.0",
                "/charts/connector-hdfs-0.1.0",
                &[("templates/deployment.yaml", "kind: Deployment")],
            )
            .with_chart(
                "repo/cleanup:0.1.0",
                "/charts/cleanup-0.1.0",
                &[("templates/job.yaml", "spec:\n  type: ScheduledJob\n")],
            )
    }

    fn secret_values() -> SecretValues {
        SecretValues::from([
            (String::from("TestSecret1"), b"value1".to_vec()),
            (String::from("TestSecret2"), b"value2".to_vec()),
        ])
    }

    fn test_component(name: &str, chart: &str) -> Component {
        let mut configuration = Configuration::new();
        configuration.insert("FlushSize", 3);
        configuration.set_metadata(&Metadata::new("repo", "1.0.0"));

        let mut component = Component::new(
            name,
            "default",
            Release::new(chart, "1.0.0"),
            configuration,
            vec![String::from("TestSecret1"), String::from("TestSecret2")],
        );
        component.secret_values = secret_values();
        component
    }

    fn components(items: &[Component]) -> Components {
        items.iter().map(|c| (c.name.clone(), c.clone())).collect()
    }

    fn seeded_backend(names: &[&str]) -> InMemoryReleaseBackend {
        names.iter().fold(InMemoryReleaseBackend::new(), |backend, name| {
            backend.with_release(DeployedRelease {
                name: (*name).to_string(),
                namespace: String::from("default"),
                ..DeployedRelease::default()
            })
        })
    }

    fn summary(calls: &[ReleaseCall]) -> Vec<String> {
        calls
            .iter()
            .map(|call| match call {
                ReleaseCall::Install { options, .. } => format!("install {}", options.release_name),
                ReleaseCall::Update { release_name, .. } => format!("update {release_name}"),
                ReleaseCall::Delete { release_name, .. } => format!("delete {release_name}"),
            })
            .collect()
    }

    /// Desired and current states with one component per outcome:
    /// C created, U updated, F forced (scheduled workload), D deleted.
    fn integration_states() -> (Components, Components) {
        let mut updated = test_component("U", HDFS_CHART);
        updated.configuration.insert("FlushSize", 4);
        let mut forced = test_component("F", CRON_CHART);
        forced.configuration.insert("FlushSize", 4);

        let desired = components(&[test_component("C", HDFS_CHART), updated, forced]);
        let current = components(&[
            test_component("U", HDFS_CHART),
            test_component("F", CRON_CHART),
            test_component("D", HDFS_CHART),
        ]);
        (desired, current)
    }

    #[tokio::test]
    async fn test_create_component_writes_secrets_before_install() {
        let store = Arc::new(InMemorySecretStore::new());
        let loader = loader();
        let mut backend = MockReleaseBackend::new();

        let observed = Arc::clone(&store);
        backend
            .expect_install()
            .times(1)
            .returning(move |path, namespace, options| {
                assert_eq!(observed.get("hdfs", "default"), Some(secret_values()));
                assert_eq!(path, Path::new("/charts/connector-hdfs-0.1.0"));
                assert_eq!(namespace, "default");
                assert_eq!(options.release_name, "hdfs");
                assert!(!options.dry_run);
                assert!(!options.reuse_name);
                assert_eq!(
                    options.values.metadata().map(|m| m.chart_repository),
                    Some(String::from("repo"))
                );
                Ok(())
            });

        let executor = Executor::new(&*store, &loader, &backend);
        executor
            .create_component(&test_component("hdfs", HDFS_CHART))
            .await
            .unwrap();

        assert_eq!(loader.requests(), vec!["repo/connector-hdfs:0.1.0"]);
    }

    #[tokio::test]
    async fn test_create_component_without_secrets_leaves_store_alone() {
        let store = InMemorySecretStore::new();
        let loader = loader();
        let backend = InMemoryReleaseBackend::new();
        let mut component = test_component("hdfs", HDFS_CHART);
        component.secrets.clear();

        let executor = Executor::new(&store, &loader, &backend);
        executor.create_component(&component).await.unwrap();

        assert!(store.operations().is_empty());
        assert!(backend.release("hdfs").is_some());
    }

    #[tokio::test]
    async fn test_create_component_unknown_chart_fails_before_secrets() {
        let store = InMemorySecretStore::new();
        let loader = StaticChartLoader::new();
        let backend = InMemoryReleaseBackend::new();

        let executor = Executor::new(&store, &loader, &backend);
        let err = executor
            .create_component(&test_component("hdfs", HDFS_CHART))
            .await
            .unwrap_err();

        assert!(err.is_not_found());
        assert!(store.operations().is_empty());
        assert!(backend.calls().is_empty());
    }

    #[tokio::test]
    async fn test_update_component_overwrites_secrets() {
        let store = InMemorySecretStore::new().with_entry(
            "hdfs",
            "default",
            SecretValues::from([(String::from("TestSecret1"), b"old".to_vec())]),
        );
        let loader = loader();
        let backend = seeded_backend(&["hdfs"]);

        let executor = Executor::new(&store, &loader, &backend);
        executor
            .update_component(&test_component("hdfs", HDFS_CHART))
            .await
            .unwrap();

        assert_eq!(store.get("hdfs", "default"), Some(secret_values()));
        assert_eq!(summary(&backend.calls()), vec!["update hdfs"]);
    }

    #[tokio::test]
    async fn test_update_component_writes_secrets_before_upgrade() {
        let store = Arc::new(InMemorySecretStore::new().with_entry(
            "hdfs",
            "default",
            SecretValues::from([(String::from("TestSecret1"), b"old".to_vec())]),
        ));
        let loader = loader();
        let mut backend = MockReleaseBackend::new();

        let observed = Arc::clone(&store);
        backend
            .expect_update()
            .times(1)
            .returning(move |release_name, path, options| {
                assert_eq!(observed.get("hdfs", "default"), Some(secret_values()));
                assert_eq!(release_name, "hdfs");
                assert_eq!(path, Path::new("/charts/connector-hdfs-0.1.0"));
                assert_eq!(options.namespace, "default");
                assert!(!options.dry_run);
                Ok(())
            });

        let executor = Executor::new(&*store, &loader, &backend);
        executor
            .update_component(&test_component("hdfs", HDFS_CHART))
            .await
            .unwrap();

        assert_eq!(
            store.operations(),
            vec![SecretOperation::Write {
                component: String::from("hdfs"),
                namespace: String::from("default"),
                values: secret_values(),
            }]
        );
    }

    #[tokio::test]
    async fn test_update_component_without_secrets_deletes_stale_entry() {
        let store = InMemorySecretStore::new().with_entry("hdfs", "default", secret_values());
        let loader = loader();
        let backend = seeded_backend(&["hdfs"]);
        let mut component = test_component("hdfs", HDFS_CHART);
        component.secrets.clear();
        component.secret_values.clear();

        let executor = Executor::new(&store, &loader, &backend);
        executor.update_component(&component).await.unwrap();

        assert!(store.get("hdfs", "default").is_none());
    }

    #[tokio::test]
    async fn test_delete_component_purges_release_and_secrets() {
        let store = InMemorySecretStore::new().with_entry("hdfs", "default", secret_values());
        let loader = loader();
        let backend = seeded_backend(&["hdfs"]);

        let executor = Executor::new(&store, &loader, &backend);
        executor
            .delete_component(&test_component("hdfs", HDFS_CHART))
            .await
            .unwrap();

        match &backend.calls()[0] {
            ReleaseCall::Delete { options, .. } => {
                assert!(options.purge);
                assert!(!options.dry_run);
            }
            other => panic!("unexpected call: {other:?}"),
        }
        assert!(store.get("hdfs", "default").is_none());
        assert!(loader.requests().is_empty());
    }

    #[tokio::test]
    async fn test_delete_component_dry_run_keeps_secrets() {
        let store = InMemorySecretStore::new().with_entry("hdfs", "default", secret_values());
        let loader = loader();
        let backend = seeded_backend(&["hdfs"]);
        let options = ExecutorOptions {
            dry_run: true,
            ..ExecutorOptions::default()
        };

        let executor = Executor::new(&store, &loader, &backend).with_options(options);
        executor
            .delete_component(&test_component("hdfs", HDFS_CHART))
            .await
            .unwrap();

        assert!(store.get("hdfs", "default").is_some());
        assert!(backend.release("hdfs").is_some());
    }

    #[tokio::test]
    async fn test_plan_integrates_forced_updates() {
        let store = InMemorySecretStore::new();
        let loader = loader();
        let backend = InMemoryReleaseBackend::new();
        let (desired, current) = integration_states();

        let executor = Executor::new(&store, &loader, &backend);
        let plan = executor.plan(&desired, &current).await.unwrap();

        assert_eq!(plan.create.keys().collect::<Vec<_>>(), vec!["C", "F"]);
        assert_eq!(plan.update.keys().collect::<Vec<_>>(), vec!["U"]);
        assert_eq!(plan.delete.keys().collect::<Vec<_>>(), vec!["D", "F"]);
        assert!(plan.is_forced("F"));
        assert_eq!(plan.changes["U"][0].field, "configuration.FlushSize");
        assert!(backend.calls().is_empty());
    }

    #[tokio::test]
    async fn test_namespace_move_recreates_component() {
        let store = InMemorySecretStore::new().with_entry("hdfs", "a", secret_values());
        let loader = loader();
        let backend = InMemoryReleaseBackend::new().with_release(DeployedRelease {
            name: String::from("hdfs"),
            namespace: String::from("a"),
            ..DeployedRelease::default()
        });

        let mut existing = test_component("hdfs", HDFS_CHART);
        existing.namespace = String::from("a");
        let mut moved = test_component("hdfs", HDFS_CHART);
        moved.namespace = String::from("b");

        let executor = Executor::new(&store, &loader, &backend);
        let current = components(&[existing]);
        let desired = components(&[moved]);
        let plan = executor.plan(&desired, &current).await.unwrap();

        assert!(plan.update.is_empty());
        assert_eq!(plan.delete["hdfs"].namespace, "a");
        assert_eq!(plan.create["hdfs"].namespace, "b");
        assert!(plan.is_forced("hdfs"));

        let report = executor.execute(&plan).await.unwrap();
        assert!(report.is_success());
        assert!(matches!(
            backend.calls().as_slice(),
            [
                ReleaseCall::Delete { options: deleted, .. },
                ReleaseCall::Install { namespace, .. },
            ] if deleted.namespace == "a" && namespace == "b"
        ));
        assert!(store.get("hdfs", "a").is_none());
        assert_eq!(store.get("hdfs", "b"), Some(secret_values()));
    }

    #[tokio::test]
    async fn test_apply_runs_deletes_then_updates_then_creates() {
        let store = InMemorySecretStore::new();
        let loader = loader();
        let backend = seeded_backend(&["U", "F", "D"]);
        let (desired, current) = integration_states();

        let executor = Executor::new(&store, &loader, &backend);
        let report = executor.apply(&desired, &current).await.unwrap();

        assert_eq!(
            summary(&backend.calls()),
            vec!["delete D", "delete F", "update U", "install C", "install F"]
        );
        assert!(report.is_success());
        assert_eq!(report.applied(), 5);
        assert!(backend.release("D").is_none());
        assert!(store.get("D", "default").is_none());
        assert_eq!(store.get("F", "default"), Some(secret_values()));
    }

    #[tokio::test]
    async fn test_secret_only_change_recreates_component() {
        let store = InMemorySecretStore::new();
        let loader = loader();
        let backend = seeded_backend(&["hdfs"]);

        let mut rotated = test_component("hdfs", HDFS_CHART);
        rotated
            .secret_values
            .insert(String::from("TestSecret1"), b"rotated".to_vec());
        let desired = components(&[rotated.clone()]);
        let current = components(&[test_component("hdfs", HDFS_CHART)]);

        let executor = Executor::new(&store, &loader, &backend);
        let plan = executor.plan(&desired, &current).await.unwrap();
        assert!(plan.secret_refresh.contains("hdfs"));

        executor.execute(&plan).await.unwrap();

        assert_eq!(summary(&backend.calls()), vec!["delete hdfs", "install hdfs"]);
        assert_eq!(
            store.get("hdfs", "default"),
            Some(rotated.secret_values.clone())
        );
        assert_eq!(
            store.operations().first(),
            Some(&SecretOperation::Delete {
                component: String::from("hdfs"),
                namespace: String::from("default"),
            })
        );
    }

    #[tokio::test]
    async fn test_unchanged_components_are_left_alone() {
        let store = InMemorySecretStore::new();
        let loader = loader();
        let backend = seeded_backend(&["hdfs"]);
        let state = components(&[test_component("hdfs", HDFS_CHART)]);

        let executor = Executor::new(&store, &loader, &backend);
        let report = executor.apply(&state, &state).await.unwrap();

        assert!(report.outcomes.is_empty());
        assert!(backend.calls().is_empty());
        assert!(loader.requests().is_empty());
    }

    #[tokio::test]
    async fn test_force_recreates_every_update_with_reused_names() {
        let store = InMemorySecretStore::new();
        let loader = loader();
        let backend = seeded_backend(&["U", "F", "D"]);
        let (desired, current) = integration_states();
        let options = ExecutorOptions {
            force: true,
            ..ExecutorOptions::default()
        };

        let executor = Executor::new(&store, &loader, &backend).with_options(options);
        executor.apply(&desired, &current).await.unwrap();

        let calls = backend.calls();
        assert_eq!(
            summary(&calls),
            vec![
                "delete D",
                "delete F",
                "delete U",
                "install C",
                "install F",
                "install U"
            ]
        );
        assert!(calls.iter().all(|call| match call {
            ReleaseCall::Install { options, .. } => options.reuse_name,
            _ => true,
        }));
    }

    #[tokio::test]
    async fn test_dry_run_is_passed_to_backend() {
        let store = InMemorySecretStore::new();
        let loader = loader();
        let backend = seeded_backend(&["U", "F", "D"]);
        let (desired, current) = integration_states();
        let options = ExecutorOptions {
            dry_run: true,
            ..ExecutorOptions::default()
        };

        let executor = Executor::new(&store, &loader, &backend).with_options(options);
        let report = executor.apply(&desired, &current).await.unwrap();

        assert!(report.dry_run);
        assert!(backend.calls().iter().all(|call| match call {
            ReleaseCall::Install { options, .. } => options.dry_run,
            ReleaseCall::Update { options, .. } => options.dry_run,
            ReleaseCall::Delete { options, .. } => options.dry_run,
        }));
        assert!(backend.release("D").is_some());
        assert!(backend.release("C").is_none());
        assert_eq!(store.get("C", "default"), Some(secret_values()));
    }

    #[tokio::test]
    async fn test_disabled_stage_is_skipped() {
        let store = InMemorySecretStore::new();
        let loader = loader();
        let backend = seeded_backend(&["U", "F", "D"]);
        let (desired, current) = integration_states();
        let options = ExecutorOptions {
            disabled_stages: BTreeSet::from([ApplyPhase::Delete]),
            ..ExecutorOptions::default()
        };

        let executor = Executor::new(&store, &loader, &backend).with_options(options);
        let report = executor.apply(&desired, &current).await.unwrap();

        assert_eq!(summary(&backend.calls()), vec!["update U", "install C"]);
        assert_eq!(report.skipped(), 3);
        assert!(report.is_success());
        assert!(backend.release("D").is_some());
    }

    #[tokio::test]
    async fn test_fail_fast_stops_at_first_failure() {
        let store = InMemorySecretStore::new();
        let loader = loader();
        let backend = seeded_backend(&["U", "F", "D"]).fail_on("D", "connection refused");
        let (desired, current) = integration_states();

        let executor = Executor::new(&store, &loader, &backend);
        let err = executor.apply(&desired, &current).await.unwrap_err();

        match err {
            HelmsyncError::Apply(ApplyError::ComponentFailed { name, phase, .. }) => {
                assert_eq!(name, "D");
                assert_eq!(phase, ApplyPhase::Delete);
            }
            other => panic!("unexpected error: {other}"),
        }
        assert_eq!(summary(&backend.calls()), vec!["delete D"]);
    }

    #[tokio::test]
    async fn test_continue_on_error_collects_failures_and_skips_dependents() {
        let store = InMemorySecretStore::new();
        let loader = loader();
        let backend = seeded_backend(&["U", "F", "D"]).fail_on("F", "timed out");
        let (desired, current) = integration_states();
        let options = ExecutorOptions {
            failure_policy: FailurePolicy::ContinueOnError,
            ..ExecutorOptions::default()
        };

        let executor = Executor::new(&store, &loader, &backend).with_options(options);
        let report = executor.apply(&desired, &current).await.unwrap();

        assert_eq!(
            summary(&backend.calls()),
            vec!["delete D", "delete F", "update U", "install C"]
        );
        assert_eq!(report.applied(), 3);
        assert_eq!(report.failed(), 1);
        assert_eq!(report.skipped(), 1);
        assert!(!report.is_success());

        let failure = report.failures().next().unwrap();
        assert_eq!(failure.name, "F");
        assert_eq!(failure.phase, ApplyPhase::Delete);
        assert!(failure.message.as_deref().unwrap_or_default().contains("timed out"));
    }

    #[tokio::test]
    async fn test_detection_error_aborts_pass() {
        let store = InMemorySecretStore::new();
        let loader = StaticChartLoader::new();
        let backend = seeded_backend(&["U", "F", "D"]);
        let (desired, current) = integration_states();

        let executor = Executor::new(&store, &loader, &backend);
        let err = executor.apply(&desired, &current).await.unwrap_err();

        assert!(matches!(
            err,
            HelmsyncError::Apply(ApplyError::Detection { .. })
        ));
        assert!(backend.calls().is_empty());
    }

    #[test]
    fn test_report_display() {
        let report = ApplyReport {
            run_id: Uuid::new_v4(),
            started_at: Utc::now(),
            finished_at: Utc::now(),
            dry_run: true,
            outcomes: vec![ComponentOutcome::applied(
                &test_component("hdfs", HDFS_CHART),
                ApplyPhase::Create,
                false,
            )],
        };

        assert_eq!(
            report.to_string(),
            "Executed 1 operations: 1 applied, 0 failed, 0 skipped (dry run)"
        );
    }
}
