//! Action-driven promotion of a project's status.
//!
//! Completing an action whose name matches a trigger-enabled status asks for
//! the project to move to that status. The promotion only happens once every
//! asset in the project is ready for it; otherwise the project falls back to
//! ordinary progress-based recomputation.

use serde::Serialize;

use crate::model::{Action, Asset};
use crate::status_config::{StatusConfigProvider, STATUS_DONE};
use crate::types::names_match;

/// Result of resolving an action name against the status vocabulary.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize)]
pub struct AutoTrigger {
    pub should_trigger: bool,
    pub status_name: Option<String>,
}

/// Resolve `action_name` to a trigger-enabled status, if any.
pub fn should_auto_trigger_status(
    config: &dyn StatusConfigProvider,
    action_name: &str,
) -> AutoTrigger {
    match config.find(action_name) {
        Some(def) if def.auto_trigger_from_action == Some(true) => AutoTrigger {
            should_trigger: true,
            status_name: Some(def.name.clone()),
        },
        _ => AutoTrigger::default(),
    }
}

/// Whether a single completion event may request a project status change.
///
/// `before` is the action as it was prior to the mutation and `after` the
/// action as it is now. Only a direct incomplete → complete transition
/// counts; completions implied by auto-check-above never do.
pub fn completion_trigger(
    config: &dyn StatusConfigProvider,
    before: &Action,
    after: &Action,
) -> Option<String> {
    if before.completed || !after.completed || after.is_auto_checked() {
        return None;
    }
    should_auto_trigger_status(config, &after.name).status_name
}

/// Whether every asset is ready for the project to take `target_status`.
///
/// For "Done" each asset must be fully completed (an asset with no actions
/// must itself be marked completed). For any other status, an asset only
/// blocks if it carries an action named like the target that is still
/// open; assets without such an action do not apply.
pub fn check_if_should_auto_trigger(assets: &[Asset], target_status: &str) -> bool {
    if names_match(target_status, STATUS_DONE) {
        return assets.iter().all(|asset| {
            if asset.actions.is_empty() {
                asset.counts_as_completed()
            } else {
                asset.actions.iter().all(|a| a.completed)
            }
        });
    }

    assets.iter().all(|asset| {
        asset
            .actions
            .iter()
            .find(|a| names_match(&a.name, target_status))
            .map_or(true, |a| a.completed)
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::status_config::{StatusCatalog, StatusDefinition};

    fn action(name: &str, completed: bool) -> Action {
        let mut a = Action::new(name);
        a.completed = completed;
        a
    }

    fn asset(actions: Vec<Action>) -> Asset {
        let mut asset = Asset::new("asset");
        asset.actions = actions;
        asset
    }

    fn catalog() -> StatusCatalog {
        StatusCatalog::new(vec![
            StatusDefinition::new("Review", "#8B5CF6", 1).auto_trigger(),
            StatusDefinition::new("Lightroom", "#F59E0B", 2),
            StatusDefinition::new("Done", "#10B981", 3).auto_trigger(),
        ])
        .expect("catalog should build")
    }

    #[test]
    fn resolves_trigger_enabled_status_by_loose_name() {
        let t = should_auto_trigger_status(&catalog(), "  review ");
        assert!(t.should_trigger);
        assert_eq!(t.status_name.as_deref(), Some("Review"));
    }

    #[test]
    fn statuses_without_flag_do_not_trigger() {
        assert_eq!(
            should_auto_trigger_status(&catalog(), "Lightroom"),
            AutoTrigger::default()
        );
        assert_eq!(
            should_auto_trigger_status(&catalog(), "Unknown"),
            AutoTrigger::default()
        );
    }

    #[test]
    fn only_direct_transitions_are_eligible() {
        let cfg = catalog();
        let open = action("Review", false);
        let mut done = open.clone();
        done.completed = true;

        assert_eq!(completion_trigger(&cfg, &open, &done).as_deref(), Some("Review"));
        // Already complete before the mutation.
        assert_eq!(completion_trigger(&cfg, &done, &done), None);
        // Unchecked.
        assert_eq!(completion_trigger(&cfg, &done, &open), None);

        let mut implied = done.clone();
        implied.was_auto_checked = Some(true);
        assert_eq!(completion_trigger(&cfg, &open, &implied), None);
    }

    #[test]
    fn readiness_blocks_on_any_open_matching_action() {
        let a = asset(vec![action("Draft", true), action("Review", true)]);
        let b = asset(vec![action("Draft", true), action("Review", false)]);
        assert!(!check_if_should_auto_trigger(&[a.clone(), b], "Review"));

        let b = asset(vec![action("Draft", false), action("review", true)]);
        assert!(check_if_should_auto_trigger(&[a, b], "Review"));
    }

    #[test]
    fn assets_without_the_checkpoint_do_not_block() {
        let a = asset(vec![action("Review", true)]);
        let b = asset(vec![action("Sketch", false)]);
        let c = asset(vec![]);
        assert!(check_if_should_auto_trigger(&[a, b, c], "Review"));
    }

    #[test]
    fn done_requires_every_asset_complete() {
        let a = asset(vec![action("Draft", true), action("Done", true)]);
        let mut empty_done = asset(vec![]);
        empty_done.set_status("Done");
        assert!(check_if_should_auto_trigger(&[a.clone(), empty_done], "Done"));

        let empty_open = asset(vec![]);
        assert!(!check_if_should_auto_trigger(&[a.clone(), empty_open], "Done"));

        let partial = asset(vec![action("Draft", false), action("Done", true)]);
        assert!(!check_if_should_auto_trigger(&[a, partial], "done"));
    }
}
