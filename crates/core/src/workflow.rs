//! Seeding actions from classification presets and workflow bundles.
//!
//! Types, presets and workflow templates are managed elsewhere; the engine
//! only receives their suggested action names as raw strings.

use serde::{Deserialize, Serialize};

use crate::model::Action;
use crate::types::{names_match, EntityId};

/// A named list of action names supplied by a workflow template.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkflowBundle {
    pub name: String,
    pub actions: Vec<String>,
}

/// Append one action per suggested name, skipping blanks and names already
/// present in `existing` (compared loosely). Returns the new ids in order.
pub fn seed_actions<I, S>(existing: &mut Vec<Action>, names: I) -> Vec<EntityId>
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    let mut added = Vec::new();
    for name in names {
        let name = name.as_ref().trim();
        if name.is_empty() || existing.iter().any(|a| names_match(&a.name, name)) {
            continue;
        }
        let action = Action::new(name);
        added.push(action.id.clone());
        existing.push(action);
    }
    added
}

/// Seed every action of a bundle onto an action list.
pub fn apply_bundle(existing: &mut Vec<Action>, bundle: &WorkflowBundle) -> Vec<EntityId> {
    seed_actions(existing, &bundle.actions)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn seeding_skips_blanks_and_duplicates() {
        let mut actions = vec![Action::new("Draft")];
        let added = seed_actions(&mut actions, ["draft ", "", "Review", "  review", "Deliver"]);
        let names: Vec<&str> = actions.iter().map(|a| a.name.as_str()).collect();
        assert_eq!(names, vec!["Draft", "Review", "Deliver"]);
        assert_eq!(added.len(), 2);
        assert!(actions.iter().all(|a| !a.completed));
    }

    #[test]
    fn bundle_is_applied_in_order() {
        let bundle = WorkflowBundle {
            name: "Illustration".into(),
            actions: vec!["Sketch".into(), "Ink".into(), "Color".into()],
        };
        let mut actions = Vec::new();
        let added = apply_bundle(&mut actions, &bundle);
        assert_eq!(added.len(), 3);
        assert_eq!(actions[0].name, "Sketch");
        assert_eq!(actions[2].name, "Color");
    }
}
