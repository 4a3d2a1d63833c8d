//! Detection of releases that cannot be updated in place.

use tracing::debug;

use crate::chart::ChartLoader;
use crate::component::Component;
use crate::error::Result;

/// Template marker of scheduled workloads.
pub const DEFAULT_MARKER: &str = "type: ScheduledJob";

/// Flags components whose chart templates declare scheduled workloads.
pub struct ScheduledWorkloadDetector<'a> {
    loader: &'a dyn ChartLoader,
    markers: Vec<String>,
}

impl<'a> ScheduledWorkloadDetector<'a> {
    /// Creates a detector looking for [`DEFAULT_MARKER`].
    #[must_use]
    pub fn new(loader: &'a dyn ChartLoader) -> Self {
        Self {
            loader,
            markers: vec![String::from(DEFAULT_MARKER)],
        }
    }

    /// Adds a marker.
    #[must_use]
    pub fn with_marker(mut self, marker: impl Into<String>) -> Self {
        let marker = marker.into();
        if !marker.is_empty() && !self.markers.contains(&marker) {
            self.markers.push(marker);
        }
        self
    }

    /// Adds several markers.
    #[must_use]
    pub fn with_markers<I, S>(self, markers: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        markers
            .into_iter()
            .fold(self, |detector, marker| detector.with_marker(marker))
    }

    /// Returns the markers searched for.
    #[must_use]
    pub fn markers(&self) -> &[String] {
        &self.markers
    }

    /// Returns true if any template of the component's chart contains a marker.
    ///
    /// # Errors
    ///
    /// Returns the loader error unchanged if the chart cannot be resolved.
    pub async fn is_cron_job(&self, component: &Component) -> Result<bool> {
        let reference = component.chart_ref()?;
        let loaded = self.loader.load(&reference).await?;

        let found = self
            .markers
            .iter()
            .any(|marker| loaded.chart.any_template_contains(marker));

        debug!(
            component = %component.name,
            chart = %reference,
            found,
            "Checked chart for scheduled workloads"
        );
        Ok(found)
    }
}

impl std::fmt::Debug for ScheduledWorkloadDetector<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ScheduledWorkloadDetector")
            .field("markers", &self.markers)
            .finish_non_exhaustive()
    }
}
