//! Forced-update integration.
//!
//! Some releases cannot be upgraded in place. For those, an update is
//! replaced by a delete of the current release followed by a create of the
//! desired one.

use std::collections::HashMap;
use tracing::info;

use crate::component::Components;

use super::diff::ComponentDiff;

/// Turns every update flagged in `need_forced_update` into a delete+create pair.
///
/// The delete carries the current component, the create the desired one.
/// Unflagged updates and all creates and deletes pass through unchanged.
#[must_use]
pub fn integrate_forced_updates(
    current: &Components,
    diff: ComponentDiff,
    need_forced_update: &HashMap<String, bool>,
) -> ComponentDiff {
    let ComponentDiff {
        mut create,
        update,
        mut delete,
    } = diff;
    let mut remaining = Components::new();

    for (name, desired) in update {
        if !need_forced_update.get(&name).copied().unwrap_or(false) {
            remaining.insert(name, desired);
            continue;
        }

        info!(component = %name, "Forcing update as delete and create");
        if let Some(existing) = current.get(&name) {
            delete.insert(name.clone(), existing.clone());
        }
        create.insert(name, desired);
    }

    ComponentDiff {
        create,
        update: remaining,
        delete,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::component::{Component, Configuration, Release};

    fn component(name: &str, version: &str) -> Component {
        Component::new(
            name,
            "default",
            Release::new("connector-hdfs:0.1.0", version),
            Configuration::new(),
            vec![],
        )
    }

    fn components(items: &[Component]) -> Components {
        items.iter().map(|c| (c.name.clone(), c.clone())).collect()
    }

    #[test]
    fn test_integrate_forced_updates() {
        let current = components(&[
            component("U", "1.0.0"),
            component("F", "1.0.0"),
            component("D", "1.0.0"),
        ]);
        let diff = ComponentDiff {
            create: components(&[component("C", "1.0.0")]),
            update: components(&[component("U", "2.0.0"), component("F", "2.0.0")]),
            delete: components(&[component("D", "1.0.0")]),
        };
        let need = HashMap::from([(String::from("F"), true)]);

        let result = integrate_forced_updates(&current, diff, &need);

        assert_eq!(result.create.keys().collect::<Vec<_>>(), vec!["C", "F"]);
        assert_eq!(result.update.keys().collect::<Vec<_>>(), vec!["U"]);
        assert_eq!(result.delete.keys().collect::<Vec<_>>(), vec!["D", "F"]);
        assert_eq!(result.create["F"].release.version, "2.0.0");
        assert_eq!(result.delete["F"].release.version, "1.0.0");
    }

    #[test]
    fn test_false_flags_pass_through() {
        let current = components(&[component("U", "1.0.0")]);
        let diff = ComponentDiff {
            update: components(&[component("U", "2.0.0")]),
            ..ComponentDiff::default()
        };
        let need = HashMap::from([(String::from("U"), false)]);

        let result = integrate_forced_updates(&current, diff.clone(), &need);
        assert_eq!(result, diff);
    }
}
