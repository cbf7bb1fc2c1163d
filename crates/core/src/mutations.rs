//! Structural and field edits on the owned, ordered lists of a project.
//!
//! Every function validates before it mutates, so an `Err` leaves the list
//! untouched. Status and completion are always written together through
//! [`Asset::set_status`].

use crate::error::CoreError;
use crate::model::{Action, Asset, Collaborator};
use crate::progress::asset_progress;
use crate::status_config::{STATUS_DONE, STATUS_IN_PROGRESS, STATUS_NOT_STARTED};
use crate::types::{new_entity_id, EntityId};

/// Maximum length of an asset or action name.
pub const MAX_NAME_LENGTH: usize = 500;

/// Suffix appended to the name of a duplicated asset.
pub const DUPLICATE_SUFFIX: &str = " (copy)";

// ---------------------------------------------------------------------------
// Validation
// ---------------------------------------------------------------------------

/// Validate a user-supplied name and return it trimmed.
pub fn validate_name(name: &str) -> Result<String, CoreError> {
    let trimmed = name.trim();
    if trimmed.is_empty() {
        return Err(CoreError::Validation("Name must not be empty".to_string()));
    }
    if trimmed.chars().count() > MAX_NAME_LENGTH {
        return Err(CoreError::Validation(format!(
            "Name exceeds maximum length of {MAX_NAME_LENGTH} characters"
        )));
    }
    Ok(trimmed.to_string())
}

fn asset_mut<'a>(assets: &'a mut [Asset], asset_id: &str) -> Result<&'a mut Asset, CoreError> {
    assets
        .iter_mut()
        .find(|a| a.id == asset_id)
        .ok_or_else(|| CoreError::not_found("asset", asset_id))
}

fn action_position(actions: &[Action], action_id: &str) -> Result<usize, CoreError> {
    actions
        .iter()
        .position(|a| a.id == action_id)
        .ok_or_else(|| CoreError::not_found("action", action_id))
}

// ---------------------------------------------------------------------------
// Assets
// ---------------------------------------------------------------------------

/// Append a new asset and return its id.
pub fn add_asset(
    assets: &mut Vec<Asset>,
    name: &str,
    asset_type: Option<String>,
    illustration_type: Option<String>,
) -> Result<EntityId, CoreError> {
    let mut asset = Asset::new(validate_name(name)?);
    asset.asset_type = asset_type;
    asset.illustration_type = illustration_type;
    let id = asset.id.clone();
    assets.push(asset);
    Ok(id)
}

/// Remove an asset, returning it.
pub fn remove_asset(assets: &mut Vec<Asset>, asset_id: &str) -> Result<Asset, CoreError> {
    let index = assets
        .iter()
        .position(|a| a.id == asset_id)
        .ok_or_else(|| CoreError::not_found("asset", asset_id))?;
    Ok(assets.remove(index))
}

/// Copy an asset right after the original.
///
/// The copy gets fresh ids for itself and every action, keeps names,
/// classification and collaborators, and starts with nothing completed.
pub fn duplicate_asset(assets: &mut Vec<Asset>, asset_id: &str) -> Result<EntityId, CoreError> {
    let index = assets
        .iter()
        .position(|a| a.id == asset_id)
        .ok_or_else(|| CoreError::not_found("asset", asset_id))?;

    let source = &assets[index];
    let mut copy = source.clone();
    copy.id = new_entity_id();
    copy.name = format!("{}{DUPLICATE_SUFFIX}", source.name);
    copy.actions = source
        .actions
        .iter()
        .map(|a| Action::new(a.name.clone()))
        .collect();
    copy.set_status(STATUS_NOT_STARTED);

    let id = copy.id.clone();
    assets.insert(index + 1, copy);
    Ok(id)
}

pub fn rename_asset(assets: &mut [Asset], asset_id: &str, name: &str) -> Result<(), CoreError> {
    let name = validate_name(name)?;
    asset_mut(assets, asset_id)?.name = name;
    Ok(())
}

/// Replace an asset's classification tags.
pub fn set_asset_classification(
    assets: &mut [Asset],
    asset_id: &str,
    asset_type: Option<String>,
    illustration_type: Option<String>,
) -> Result<(), CoreError> {
    let asset = asset_mut(assets, asset_id)?;
    asset.asset_type = asset_type;
    asset.illustration_type = illustration_type;
    Ok(())
}

/// Explicitly set an asset's status (and its completion flag with it).
pub fn set_asset_status(
    assets: &mut [Asset],
    asset_id: &str,
    status: &str,
) -> Result<(), CoreError> {
    if status.trim().is_empty() {
        return Err(CoreError::Validation("Status must not be empty".to_string()));
    }
    asset_mut(assets, asset_id)?.set_status(status.trim());
    Ok(())
}

/// Explicitly mark an asset completed or reopen it.
///
/// Reopening picks "In Progress" when any action is checked and
/// "Not Started" otherwise.
pub fn set_asset_completed(
    assets: &mut [Asset],
    asset_id: &str,
    completed: bool,
) -> Result<(), CoreError> {
    let asset = asset_mut(assets, asset_id)?;
    if completed {
        asset.set_status(STATUS_DONE);
    } else if asset_progress(&asset.actions) > 0 {
        asset.set_status(STATUS_IN_PROGRESS);
    } else {
        asset.set_status(STATUS_NOT_STARTED);
    }
    Ok(())
}

/// Move an asset to `to_index` (clamped to the end of the list).
pub fn move_asset(
    assets: &mut Vec<Asset>,
    asset_id: &str,
    to_index: usize,
) -> Result<(), CoreError> {
    let from = assets
        .iter()
        .position(|a| a.id == asset_id)
        .ok_or_else(|| CoreError::not_found("asset", asset_id))?;
    let asset = assets.remove(from);
    let to = to_index.min(assets.len());
    assets.insert(to, asset);
    Ok(())
}

// ---------------------------------------------------------------------------
// Actions
// ---------------------------------------------------------------------------

/// Insert a new action at `position` (or append) and return its id.
pub fn add_action(
    actions: &mut Vec<Action>,
    name: &str,
    position: Option<usize>,
) -> Result<EntityId, CoreError> {
    let action = Action::new(validate_name(name)?);
    let id = action.id.clone();
    match position {
        Some(p) => actions.insert(p.min(actions.len()), action),
        None => actions.push(action),
    }
    Ok(id)
}

pub fn remove_action(actions: &mut Vec<Action>, action_id: &str) -> Result<Action, CoreError> {
    let index = action_position(actions, action_id)?;
    Ok(actions.remove(index))
}

pub fn rename_action(actions: &mut [Action], action_id: &str, name: &str) -> Result<(), CoreError> {
    let name = validate_name(name)?;
    let index = action_position(actions, action_id)?;
    actions[index].name = name;
    Ok(())
}

/// Move an action to `to_index` (clamped to the end of the list).
pub fn move_action(
    actions: &mut Vec<Action>,
    action_id: &str,
    to_index: usize,
) -> Result<(), CoreError> {
    let from = action_position(actions, action_id)?;
    let action = actions.remove(from);
    let to = to_index.min(actions.len());
    actions.insert(to, action);
    Ok(())
}

// ---------------------------------------------------------------------------
// Collaborators
// ---------------------------------------------------------------------------

/// Add a collaborator. Returns `false` if one with the same id is present.
pub fn add_collaborator(
    collaborators: &mut Vec<Collaborator>,
    collaborator: Collaborator,
) -> Result<bool, CoreError> {
    if collaborator.id.trim().is_empty() {
        return Err(CoreError::Validation(
            "Collaborator id must not be empty".to_string(),
        ));
    }
    if collaborators.iter().any(|c| c.id == collaborator.id) {
        return Ok(false);
    }
    collaborators.push(collaborator);
    Ok(true)
}

pub fn remove_collaborator(
    collaborators: &mut Vec<Collaborator>,
    collaborator_id: &str,
) -> Result<Collaborator, CoreError> {
    let index = collaborators
        .iter()
        .position(|c| c.id == collaborator_id)
        .ok_or_else(|| CoreError::not_found("collaborator", collaborator_id))?;
    Ok(collaborators.remove(index))
}

#[cfg(test)]
mod tests {
    use assert_matches::assert_matches;

    use super::*;

    fn names(actions: &[Action]) -> Vec<&str> {
        actions.iter().map(|a| a.name.as_str()).collect()
    }

    #[test]
    fn add_asset_trims_and_validates() {
        let mut assets = Vec::new();
        let id = add_asset(&mut assets, "  Cover  ", Some("print".into()), None)
            .expect("add should succeed");
        assert_eq!(assets[0].id, id);
        assert_eq!(assets[0].name, "Cover");
        assert_eq!(assets[0].status, STATUS_NOT_STARTED);

        assert_matches!(
            add_asset(&mut assets, "   ", None, None),
            Err(CoreError::Validation(_))
        );
        assert_eq!(assets.len(), 1);
    }

    #[test]
    fn duplicate_resets_completion_and_carries_classification() {
        let mut assets = Vec::new();
        let id = add_asset(&mut assets, "Poster", Some("print".into()), Some("vector".into()))
            .expect("add should succeed");
        let mut done = Action::new("Draft");
        done.completed = true;
        done.was_auto_checked = Some(true);
        assets[0].actions.push(done);
        assets[0].set_status(STATUS_DONE);
        add_asset(&mut assets, "Trailing", None, None).expect("add should succeed");

        let copy_id = duplicate_asset(&mut assets, &id).expect("duplicate should succeed");
        let copy = &assets[1];
        assert_eq!(copy.id, copy_id);
        assert_ne!(copy.id, id);
        assert_eq!(copy.name, "Poster (copy)");
        assert_eq!(copy.asset_type.as_deref(), Some("print"));
        assert_eq!(copy.illustration_type.as_deref(), Some("vector"));
        assert_eq!(copy.status, STATUS_NOT_STARTED);
        assert!(!copy.is_completed);
        assert_eq!(names(&copy.actions), vec!["Draft"]);
        assert!(!copy.actions[0].completed);
        assert_eq!(copy.actions[0].was_auto_checked, None);
        assert_ne!(copy.actions[0].id, assets[0].actions[0].id);
        assert_eq!(assets[2].name, "Trailing");
    }

    #[test]
    fn unknown_asset_is_not_found() {
        let mut assets: Vec<Asset> = Vec::new();
        assert_matches!(
            remove_asset(&mut assets, "missing"),
            Err(CoreError::NotFound { entity: "asset", .. })
        );
        assert_matches!(
            set_asset_status(&mut assets, "missing", "Done"),
            Err(CoreError::NotFound { .. })
        );
    }

    #[test]
    fn completion_and_status_move_together() {
        let mut assets = Vec::new();
        let id = add_asset(&mut assets, "Cover", None, None).expect("add should succeed");

        set_asset_status(&mut assets, &id, "done").expect("status should be set");
        assert!(assets[0].is_completed);

        set_asset_completed(&mut assets, &id, false).expect("reopen should succeed");
        assert_eq!(assets[0].status, STATUS_NOT_STARTED);
        assert!(!assets[0].is_completed);

        let mut checked = Action::new("Draft");
        checked.completed = true;
        assets[0].actions.push(checked);
        set_asset_completed(&mut assets, &id, true).expect("complete should succeed");
        set_asset_completed(&mut assets, &id, false).expect("reopen should succeed");
        assert_eq!(assets[0].status, STATUS_IN_PROGRESS);
    }

    #[test]
    fn actions_insert_rename_move_remove() {
        let mut actions = Vec::new();
        let a = add_action(&mut actions, "Draft", None).expect("add should succeed");
        let b = add_action(&mut actions, "Deliver", None).expect("add should succeed");
        let c = add_action(&mut actions, "Review", Some(1)).expect("add should succeed");
        assert_eq!(names(&actions), vec!["Draft", "Review", "Deliver"]);

        rename_action(&mut actions, &c, "Client review").expect("rename should succeed");
        move_action(&mut actions, &a, 99).expect("move should succeed");
        assert_eq!(names(&actions), vec!["Client review", "Deliver", "Draft"]);

        let removed = remove_action(&mut actions, &b).expect("remove should succeed");
        assert_eq!(removed.name, "Deliver");
        assert_matches!(
            rename_action(&mut actions, &b, "x"),
            Err(CoreError::NotFound { entity: "action", .. })
        );
    }

    #[test]
    fn move_asset_reorders() {
        let mut assets = Vec::new();
        let a = add_asset(&mut assets, "A", None, None).expect("add should succeed");
        add_asset(&mut assets, "B", None, None).expect("add should succeed");
        move_asset(&mut assets, &a, 1).expect("move should succeed");
        let order: Vec<&str> = assets.iter().map(|a| a.name.as_str()).collect();
        assert_eq!(order, vec!["B", "A"]);
    }

    #[test]
    fn collaborators_are_deduplicated_by_id() {
        let mut list = Vec::new();
        let ana = Collaborator {
            id: "u1".into(),
            name: "Ana".into(),
            role: None,
        };
        assert!(add_collaborator(&mut list, ana.clone()).expect("add should succeed"));
        assert!(!add_collaborator(&mut list, ana).expect("add should succeed"));
        assert_eq!(list.len(), 1);

        remove_collaborator(&mut list, "u1").expect("remove should succeed");
        assert!(remove_collaborator(&mut list, "u1").is_err());
    }

    #[test]
    fn overly_long_names_are_rejected() {
        let long = "x".repeat(MAX_NAME_LENGTH + 1);
        assert!(validate_name(&long).is_err());
        assert!(validate_name(&"x".repeat(MAX_NAME_LENGTH)).is_ok());
    }
}
