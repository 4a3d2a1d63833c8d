//! Apply plan types.
//!
//! A plan is the outcome of diffing, detection and forced-update integration.
//! It is displayed by `plan` and executed by `apply`.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::str::FromStr;

use crate::component::{Component, ComponentHasher, Components};
use crate::error::ConfigError;

use super::diff::DiffDetail;

/// Phase of the apply pass.
///
/// Variants are declared in apply order, so sorting phases yields the order
/// they run in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ApplyPhase {
    /// Delete releases no longer declared.
    Delete,
    /// Upgrade releases in place.
    Update,
    /// Install new releases.
    Create,
}

/// A fully computed apply plan.
#[derive(Debug, Clone)]
pub struct ApplyPlan {
    /// When the plan was created.
    pub created_at: DateTime<Utc>,
    /// Components to install.
    pub create: Components,
    /// Components to upgrade in place.
    pub update: Components,
    /// Components to uninstall.
    pub delete: Components,
    /// Names turned into delete+create pairs.
    pub forced: BTreeSet<String>,
    /// Names recreated because only their secret values changed.
    pub secret_refresh: BTreeSet<String>,
    /// Field-level changes of every updated or recreated component.
    pub changes: BTreeMap<String, Vec<DiffDetail>>,
}

/// A single planned operation, for display.
#[derive(Debug, Clone, Serialize)]
pub struct PlannedAction {
    /// Phase the action runs in.
    pub phase: ApplyPhase,
    /// Component name.
    pub component: String,
    /// Namespace.
    pub namespace: String,
    /// Chart, as `<chart>:<version>`.
    pub chart: String,
    /// Whether the action is half of a forced recreate.
    pub forced: bool,
    /// Why the action is needed.
    pub reason: String,
    /// Definition fingerprint of the component acted on.
    pub fingerprint: String,
    /// Field-level changes.
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub changes: Vec<DiffDetail>,
}

impl ApplyPhase {
    /// All phases in apply order.
    pub const ALL: [Self; 3] = [Self::Delete, Self::Update, Self::Create];

    /// Returns the phase name.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Delete => "delete",
            Self::Update => "update",
            Self::Create => "create",
        }
    }
}

impl std::fmt::Display for ApplyPhase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for ApplyPhase {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "delete" => Ok(Self::Delete),
            "update" => Ok(Self::Update),
            "create" => Ok(Self::Create),
            other => Err(ConfigError::validation(
                format!("Unknown stage '{other}', expected create, update or delete"),
                "disabled_stages",
            )),
        }
    }
}

impl ApplyPlan {
    /// Creates an empty plan.
    #[must_use]
    pub fn empty() -> Self {
        Self {
            created_at: Utc::now(),
            create: Components::new(),
            update: Components::new(),
            delete: Components::new(),
            forced: BTreeSet::new(),
            secret_refresh: BTreeSet::new(),
            changes: BTreeMap::new(),
        }
    }

    /// Returns true if the plan has no operations.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.create.is_empty() && self.update.is_empty() && self.delete.is_empty()
    }

    /// Returns the number of operations.
    #[must_use]
    pub fn action_count(&self) -> usize {
        self.create.len() + self.update.len() + self.delete.len()
    }

    /// Returns the components of a phase.
    #[must_use]
    pub const fn components(&self, phase: ApplyPhase) -> &Components {
        match phase {
            ApplyPhase::Delete => &self.delete,
            ApplyPhase::Update => &self.update,
            ApplyPhase::Create => &self.create,
        }
    }

    /// Returns true if `name` is recreated rather than updated.
    #[must_use]
    pub fn is_forced(&self, name: &str) -> bool {
        self.forced.contains(name)
    }

    /// Returns every planned operation in apply order.
    #[must_use]
    pub fn actions(&self) -> Vec<PlannedAction> {
        let hasher = ComponentHasher::new();

        ApplyPhase::ALL
            .iter()
            .flat_map(|phase| {
                self.components(*phase)
                    .values()
                    .map(move |component| (*phase, component))
            })
            .map(|(phase, component)| PlannedAction {
                phase,
                component: component.name.clone(),
                namespace: component.namespace.clone(),
                chart: component.release.chart.clone(),
                forced: self.is_forced(&component.name),
                reason: self.reason(phase, component),
                fingerprint: hasher.short_hash(&hasher.fingerprint(component)),
                changes: if phase == ApplyPhase::Delete {
                    Vec::new()
                } else {
                    self.changes.get(&component.name).cloned().unwrap_or_default()
                },
            })
            .collect()
    }

    fn reason(&self, phase: ApplyPhase, component: &Component) -> String {
        let reason = if self.secret_refresh.contains(&component.name) {
            "Secret values changed"
        } else if self.is_forced(&component.name) {
            "Release cannot be updated in place"
        } else {
            match phase {
                ApplyPhase::Delete => "Component no longer declared",
                ApplyPhase::Update => "Component definition changed",
                ApplyPhase::Create => "Component declared",
            }
        };
        reason.to_string()
    }
}

impl PlannedAction {
    /// Returns a human-readable description of the action.
    #[must_use]
    pub fn description(&self) -> String {
        let verb = match (self.phase, self.forced) {
            (ApplyPhase::Delete, true) => "Recreate (delete)",
            (ApplyPhase::Create, true) => "Recreate (create)",
            (ApplyPhase::Delete, false) => "Delete",
            (ApplyPhase::Update, _) => "Update",
            (ApplyPhase::Create, false) => "Create",
        };
        format!("{verb} '{}' in {}", self.component, self.namespace)
    }
}

impl std::fmt::Display for PlannedAction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} [{}] ({})", self.description(), self.chart, self.reason)
    }
}

impl std::fmt::Display for ApplyPlan {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if self.is_empty() {
            return write!(f, "No changes required");
        }

        let actions = self.actions();
        writeln!(f, "Apply Plan ({} actions):", actions.len())?;
        for (i, action) in actions.iter().enumerate() {
            writeln!(f, "  {i}. {action}")?;
            for change in &action.changes {
                writeln!(f, "       {change}")?;
            }
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::component::{Configuration, Release};

    fn component(name: &str) -> Component {
        Component::new(
            name,
            "data",
            Release::new("connector-hdfs:0.1.0", "1.0.0"),
            Configuration::new(),
            vec![],
        )
    }

    #[test]
    fn test_phase_order_and_parsing() {
        let mut phases = vec![ApplyPhase::Create, ApplyPhase::Delete, ApplyPhase::Update];
        phases.sort();
        assert_eq!(phases, ApplyPhase::ALL.to_vec());

        assert_eq!("Delete".parse::<ApplyPhase>().unwrap(), ApplyPhase::Delete);
        assert_eq!(" create ".parse::<ApplyPhase>().unwrap(), ApplyPhase::Create);
        assert!("rollback".parse::<ApplyPhase>().is_err());
        assert_eq!(ApplyPhase::Update.to_string(), "update");
    }

    #[test]
    fn test_actions_are_in_apply_order() {
        let mut plan = ApplyPlan::empty();
        plan.create.insert(String::from("c"), component("c"));
        plan.create.insert(String::from("f"), component("f"));
        plan.update.insert(String::from("u"), component("u"));
        plan.delete.insert(String::from("d"), component("d"));
        plan.delete.insert(String::from("f"), component("f"));
        plan.forced.insert(String::from("f"));

        let actions = plan.actions();
        let order: Vec<(ApplyPhase, &str)> = actions
            .iter()
            .map(|a| (a.phase, a.component.as_str()))
            .collect();

        assert_eq!(
            order,
            vec![
                (ApplyPhase::Delete, "d"),
                (ApplyPhase::Delete, "f"),
                (ApplyPhase::Update, "u"),
                (ApplyPhase::Create, "c"),
                (ApplyPhase::Create, "f"),
            ]
        );
        assert!(actions[1].forced);
        assert_eq!(actions[1].description(), "Recreate (delete) 'f' in data");
        assert_eq!(plan.action_count(), 5);
    }

    #[test]
    fn test_empty_plan_display() {
        let plan = ApplyPlan::empty();
        assert!(plan.is_empty());
        assert_eq!(plan.to_string(), "No changes required");
    }
}
