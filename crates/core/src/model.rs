//! Canonical project / asset / action model.
//!
//! These are the shapes the engine operates on after legacy records have
//! been passed through [`normalize`](crate::normalize). Serde field names
//! follow the persisted record layout, which mixes snake_case and
//! camelCase keys for historical reasons.

use serde::{Deserialize, Serialize};

use crate::status_config::{STATUS_DONE, STATUS_NOT_STARTED};
use crate::types::{names_match, EntityId, Timestamp};

// ---------------------------------------------------------------------------
// Action
// ---------------------------------------------------------------------------

/// Leaf-level completable checklist entry belonging to an [`Asset`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Action {
    pub id: EntityId,
    pub name: String,
    pub completed: bool,
    /// `Some(true)` only when completed as a side effect of auto-check-above.
    #[serde(
        rename = "wasAutoChecked",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub was_auto_checked: Option<bool>,
}

impl Action {
    /// Create a new, incomplete action with a fresh id.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            id: crate::types::new_entity_id(),
            name: name.into(),
            completed: false,
            was_auto_checked: None,
        }
    }

    /// Whether the action was completed only as a side effect.
    pub fn is_auto_checked(&self) -> bool {
        self.was_auto_checked.unwrap_or(false)
    }
}

// ---------------------------------------------------------------------------
// Collaborator
// ---------------------------------------------------------------------------

/// A person attached to a project or an individual asset.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Collaborator {
    pub id: EntityId,
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub role: Option<String>,
}

// ---------------------------------------------------------------------------
// Asset
// ---------------------------------------------------------------------------

/// Mid-tier work item ("actionable item") owned by exactly one project.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Asset {
    pub id: EntityId,
    pub name: String,
    pub status: String,
    pub is_completed: bool,
    pub actions: Vec<Action>,
    #[serde(rename = "type", default, skip_serializing_if = "Option::is_none")]
    pub asset_type: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub illustration_type: Option<String>,
    #[serde(default)]
    pub collaborators: Vec<Collaborator>,
}

impl Asset {
    /// Create a new, empty asset in the "Not Started" state.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            id: crate::types::new_entity_id(),
            name: name.into(),
            status: STATUS_NOT_STARTED.to_string(),
            is_completed: false,
            actions: Vec::new(),
            asset_type: None,
            illustration_type: None,
            collaborators: Vec::new(),
        }
    }

    /// An asset counts as completed if either legacy field says so.
    pub fn counts_as_completed(&self) -> bool {
        self.is_completed || names_match(&self.status, STATUS_DONE)
    }

    /// Set `status` and reconcile `is_completed` in the same write.
    pub fn set_status(&mut self, status: impl Into<String>) {
        let status = status.into();
        self.is_completed = names_match(&status, STATUS_DONE);
        self.status = status;
    }

    pub fn find_action(&self, action_id: &str) -> Option<&Action> {
        self.actions.iter().find(|a| a.id == action_id)
    }
}

// ---------------------------------------------------------------------------
// Project
// ---------------------------------------------------------------------------

/// Top-level work item owning an ordered list of assets.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Project {
    pub id: EntityId,
    pub name: String,
    pub status: String,
    pub actionable_items: Vec<Asset>,
    #[serde(default)]
    pub completed_at: Option<Timestamp>,
    #[serde(default)]
    pub collaborators: Vec<Collaborator>,
}

impl Project {
    pub fn new(id: impl Into<EntityId>, name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            status: STATUS_NOT_STARTED.to_string(),
            actionable_items: Vec::new(),
            completed_at: None,
            collaborators: Vec::new(),
        }
    }

    pub fn find_asset(&self, asset_id: &str) -> Option<&Asset> {
        self.actionable_items.iter().find(|a| a.id == asset_id)
    }

    pub fn find_asset_mut(&mut self, asset_id: &str) -> Option<&mut Asset> {
        self.actionable_items.iter_mut().find(|a| a.id == asset_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn set_status_reconciles_completion_flag() {
        let mut asset = Asset::new("Cover");
        asset.set_status("done");
        assert!(asset.is_completed);
        asset.set_status("In Progress");
        assert!(!asset.is_completed);
    }

    #[test]
    fn legacy_completion_is_recognised_from_either_field() {
        let mut asset = Asset::new("Cover");
        asset.is_completed = true;
        assert!(asset.counts_as_completed());

        let mut asset = Asset::new("Cover");
        asset.status = "Done".to_string();
        assert!(asset.counts_as_completed());
    }

    #[test]
    fn action_serializes_auto_check_flag_in_camel_case() {
        let mut action = Action::new("Review");
        action.completed = true;
        action.was_auto_checked = Some(true);
        let json = serde_json::to_value(&action).expect("serialization should succeed");
        assert_eq!(json["wasAutoChecked"], true);

        action.was_auto_checked = None;
        let json = serde_json::to_value(&action).expect("serialization should succeed");
        assert!(json.get("wasAutoChecked").is_none());
    }

    #[test]
    fn asset_type_uses_type_key() {
        let mut asset = Asset::new("Poster");
        asset.asset_type = Some("print".to_string());
        let json = serde_json::to_value(&asset).expect("serialization should succeed");
        assert_eq!(json["type"], "print");
    }
}
