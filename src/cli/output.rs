//! Output formatting for CLI commands.
//!
//! This module renders plans, reports and statuses either as colored text
//! tables or as JSON.

use colored::Colorize;
use serde::Serialize;
use std::fmt::Write;
use tabled::{Table, Tabled};

use crate::config::ValidationResult;
use crate::planner::{ApplyPhase, ApplyPlan, ApplyReport, OutcomeStatus, PlannedAction};
use crate::reconciler::{ComponentStatus, DriftKind, DriftReport, ReconciliationResult};

use super::commands::OutputFormat;

/// Output formatter for CLI.
#[derive(Debug)]
pub struct OutputFormatter {
    /// Output format.
    format: OutputFormat,
}

/// Plan action row for table display.
#[derive(Tabled)]
struct PlanActionRow {
    #[tabled(rename = "#")]
    index: usize,
    #[tabled(rename = "Action")]
    action: String,
    #[tabled(rename = "Component")]
    component: String,
    #[tabled(rename = "Namespace")]
    namespace: String,
    #[tabled(rename = "Chart")]
    chart: String,
    #[tabled(rename = "Reason")]
    reason: String,
}

/// Component status row for table display.
#[derive(Tabled)]
struct StatusRow {
    #[tabled(rename = "Name")]
    name: String,
    #[tabled(rename = "Namespace")]
    namespace: String,
    #[tabled(rename = "Chart")]
    chart: String,
    #[tabled(rename = "Revision")]
    revision: String,
    #[tabled(rename = "Status")]
    status: String,
    #[tabled(rename = "Sync")]
    sync: String,
}

/// Apply outcome row for table display.
#[derive(Tabled)]
struct OutcomeRow {
    #[tabled(rename = "Phase")]
    phase: String,
    #[tabled(rename = "Component")]
    component: String,
    #[tabled(rename = "Result")]
    result: String,
    #[tabled(rename = "Message")]
    message: String,
}

#[derive(Serialize)]
struct PlanJson<'a> {
    created_at: String,
    action_count: usize,
    actions: &'a [PlannedAction],
}

#[derive(Serialize)]
struct ValidationJson<'a> {
    valid: bool,
    components: usize,
    errors: Vec<String>,
    warnings: &'a [String],
}

impl OutputFormatter {
    /// Creates a new output formatter.
    #[must_use]
    pub const fn new(format: OutputFormat) -> Self {
        Self { format }
    }

    /// Formats an apply plan for display.
    #[must_use]
    pub fn format_plan(&self, plan: &ApplyPlan, detailed: bool) -> String {
        let actions = plan.actions();
        match self.format {
            OutputFormat::Json => to_json(&PlanJson {
                created_at: plan.created_at.to_rfc3339(),
                action_count: actions.len(),
                actions: &actions,
            }),
            OutputFormat::Text => Self::format_plan_text(&actions, detailed),
        }
    }

    fn format_plan_text(actions: &[PlannedAction], detailed: bool) -> String {
        if actions.is_empty() {
            return format!("{} No changes required - releases are up to date.\n", "✓".green());
        }

        let mut output = String::from("\nApply Plan\n\n");

        let rows: Vec<PlanActionRow> = actions
            .iter()
            .enumerate()
            .map(|(i, a)| PlanActionRow {
                index: i + 1,
                action: Self::format_action(a),
                component: a.component.clone(),
                namespace: a.namespace.clone(),
                chart: a.chart.clone(),
                reason: truncate(&a.reason, 40),
            })
            .collect();
        output.push_str(&Table::new(rows).to_string());
        output.push('\n');

        if detailed {
            output.push_str("\nChanges:\n");
            for action in actions.iter().filter(|a| !a.changes.is_empty()) {
                let _ = writeln!(output, "   {} ({}):", action.component, action.fingerprint);
                for change in &action.changes {
                    let _ = writeln!(output, "     {change}");
                }
            }
        }

        let count = |phase: ApplyPhase, forced: bool| {
            actions
                .iter()
                .filter(|a| a.phase == phase && a.forced == forced)
                .count()
        };
        let _ = writeln!(
            output,
            "\nPlan: {} to create, {} to update, {} to recreate, {} to delete",
            count(ApplyPhase::Create, false).to_string().green(),
            count(ApplyPhase::Update, false).to_string().yellow(),
            count(ApplyPhase::Create, true).to_string().magenta(),
            count(ApplyPhase::Delete, false).to_string().red()
        );

        output
    }

    fn format_action(action: &PlannedAction) -> String {
        match (action.phase, action.forced) {
            (ApplyPhase::Delete, true) => "-recreate".magenta().to_string(),
            (ApplyPhase::Create, true) => "+recreate".magenta().to_string(),
            (ApplyPhase::Delete, false) => "-delete".red().to_string(),
            (ApplyPhase::Update, _) => "~update".yellow().to_string(),
            (ApplyPhase::Create, false) => "+create".green().to_string(),
        }
    }

    /// Formats a validation result.
    #[must_use]
    pub fn format_validation(
        &self,
        result: &ValidationResult,
        components: usize,
        show_warnings: bool,
    ) -> String {
        match self.format {
            OutputFormat::Json => to_json(&ValidationJson {
                valid: result.is_valid(),
                components,
                errors: result.errors.iter().map(ToString::to_string).collect(),
                warnings: &result.warnings,
            }),
            OutputFormat::Text => {
                let mut output = String::new();

                if result.is_valid() {
                    let _ = writeln!(
                        output,
                        "{} Configuration is valid ({components} components)",
                        "✓".green()
                    );
                } else {
                    let _ = writeln!(
                        output,
                        "{} {} validation errors:",
                        "✗".red(),
                        result.error_count()
                    );
                    for error in &result.errors {
                        let _ = writeln!(output, "   - {error}");
                    }
                }

                if show_warnings && !result.warnings.is_empty() {
                    let _ = writeln!(output, "\n{} Warnings:", "⚠".yellow());
                    for warning in &result.warnings {
                        let _ = writeln!(output, "   - {warning}");
                    }
                }

                output
            }
        }
    }

    /// Formats a reconciliation result.
    #[must_use]
    pub fn format_reconciliation(&self, result: &ReconciliationResult) -> String {
        match self.format {
            OutputFormat::Json => to_json(result),
            OutputFormat::Text => {
                let status = if result.success {
                    format!("{} Reconciliation successful", "✓".green())
                } else {
                    format!("{} Reconciliation incomplete", "✗".red())
                };

                let mut output = format!("{status}\n\n");
                output.push_str(&Self::format_report_text(&result.report));
                let _ = writeln!(output, "\n   Created: {}", result.created);
                let _ = writeln!(output, "   Updated: {}", result.updated);
                let _ = writeln!(output, "   Recreated: {}", result.recreated);
                let _ = writeln!(output, "   Deleted: {}", result.deleted);
                let _ = writeln!(output, "   Unchanged: {}", result.unchanged);

                output
            }
        }
    }

    fn format_report_text(report: &ApplyReport) -> String {
        let mut output = String::new();

        if !report.outcomes.is_empty() {
            let rows: Vec<OutcomeRow> = report
                .outcomes
                .iter()
                .map(|o| OutcomeRow {
                    phase: if o.forced {
                        format!("{} (recreate)", o.phase)
                    } else {
                        o.phase.to_string()
                    },
                    component: format!("{}/{}", o.namespace, o.name),
                    result: match o.status {
                        OutcomeStatus::Applied => "applied".green().to_string(),
                        OutcomeStatus::Failed => "failed".red().to_string(),
                        OutcomeStatus::Skipped => "skipped".dimmed().to_string(),
                    },
                    message: o.message.as_deref().map(|m| truncate(m, 60)).unwrap_or_default(),
                })
                .collect();
            output.push_str(&Table::new(rows).to_string());
            output.push('\n');
        }

        let _ = writeln!(output, "{report}");
        output
    }

    /// Formats a drift report.
    #[must_use]
    pub fn format_drift(&self, report: &DriftReport) -> String {
        match self.format {
            OutputFormat::Json => to_json(report),
            OutputFormat::Text => {
                if report.is_converged() {
                    return format!("{} No drift detected - releases are converged.\n", "✓".green());
                }

                let mut output = format!("{} Drift detected:\n\n", "⚠".yellow());
                for entry in &report.entries {
                    let kind = match entry.kind {
                        DriftKind::Missing => entry.kind.as_str().green(),
                        DriftKind::Changed | DriftKind::SecretsChanged => {
                            entry.kind.as_str().yellow()
                        }
                        DriftKind::Orphaned => entry.kind.as_str().red(),
                    };
                    let _ = writeln!(output, "   - {}/{}: {kind}", entry.namespace, entry.name);
                    for change in &entry.changes {
                        let _ = writeln!(output, "       {change}");
                    }
                }
                let _ = write!(
                    output,
                    "\n{} drifted, {} declared, {} deployed.\n",
                    report.entries.len(),
                    report.declared_count,
                    report.observed_count
                );
                output
            }
        }
    }

    /// Formats component statuses.
    #[must_use]
    pub fn format_status(&self, statuses: &[ComponentStatus]) -> String {
        match self.format {
            OutputFormat::Json => to_json(&statuses),
            OutputFormat::Text => {
                if statuses.is_empty() {
                    return String::from("No components declared or deployed.\n");
                }

                let rows: Vec<StatusRow> = statuses
                    .iter()
                    .map(|s| StatusRow {
                        name: s.name.clone(),
                        namespace: s.namespace.clone(),
                        chart: s.chart.clone(),
                        revision: s.revision.map(|r| r.to_string()).unwrap_or_default(),
                        status: s.status.clone(),
                        sync: if !s.declared {
                            "orphaned".red().to_string()
                        } else if s.in_sync {
                            "in sync".green().to_string()
                        } else {
                            "out of sync".yellow().to_string()
                        },
                    })
                    .collect();

                let mut output = Table::new(rows).to_string();
                output.push('\n');
                output
            }
        }
    }
}

fn to_json<T: Serialize + ?Sized>(value: &T) -> String {
    serde_json::to_string_pretty(value).unwrap_or_default()
}

/// Truncates a string to at most `max_len` characters.
fn truncate(s: &str, max_len: usize) -> String {
    if s.chars().count() <= max_len {
        s.to_string()
    } else {
        let kept: String = s.chars().take(max_len.saturating_sub(3)).collect();
        format!("{kept}...")
    }
}
