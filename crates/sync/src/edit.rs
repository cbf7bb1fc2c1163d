//! Serializable user edits, as sent to a running driver or read from a
//! replay script.

use serde::{Deserialize, Serialize};
use worktrack_core::model::Collaborator;
use worktrack_core::types::EntityId;
use worktrack_core::workflow::WorkflowBundle;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum Edit {
    ToggleAction {
        asset_id: EntityId,
        action_id: EntityId,
        checked: bool,
    },
    AddAsset {
        name: String,
        #[serde(default, rename = "type")]
        asset_type: Option<String>,
        #[serde(default)]
        illustration_type: Option<String>,
    },
    RemoveAsset {
        asset_id: EntityId,
    },
    DuplicateAsset {
        asset_id: EntityId,
    },
    MoveAsset {
        asset_id: EntityId,
        to_index: usize,
    },
    RenameAsset {
        asset_id: EntityId,
        name: String,
    },
    SetAssetClassification {
        asset_id: EntityId,
        #[serde(default, rename = "type")]
        asset_type: Option<String>,
        #[serde(default)]
        illustration_type: Option<String>,
    },
    SetAssetStatus {
        asset_id: EntityId,
        status: String,
    },
    SetAssetCompleted {
        asset_id: EntityId,
        completed: bool,
    },
    SetProjectStatus {
        status: String,
    },
    RenameProject {
        name: String,
    },
    AddAction {
        asset_id: EntityId,
        name: String,
        #[serde(default)]
        position: Option<usize>,
    },
    RemoveAction {
        asset_id: EntityId,
        action_id: EntityId,
    },
    RenameAction {
        asset_id: EntityId,
        action_id: EntityId,
        name: String,
    },
    MoveAction {
        asset_id: EntityId,
        action_id: EntityId,
        to_index: usize,
    },
    SeedActions {
        asset_id: EntityId,
        names: Vec<String>,
    },
    ApplyWorkflowBundle {
        asset_id: EntityId,
        bundle: WorkflowBundle,
    },
    AddCollaborator {
        collaborator: Collaborator,
        #[serde(default)]
        asset_id: Option<EntityId>,
    },
    RemoveCollaborator {
        collaborator_id: EntityId,
        #[serde(default)]
        asset_id: Option<EntityId>,
    },
}

impl Edit {
    /// Short operation name for logs.
    pub fn name(&self) -> &'static str {
        match self {
            Self::ToggleAction { .. } => "toggle_action",
            Self::AddAsset { .. } => "add_asset",
            Self::RemoveAsset { .. } => "remove_asset",
            Self::DuplicateAsset { .. } => "duplicate_asset",
            Self::MoveAsset { .. } => "move_asset",
            Self::RenameAsset { .. } => "rename_asset",
            Self::SetAssetClassification { .. } => "set_asset_classification",
            Self::SetAssetStatus { .. } => "set_asset_status",
            Self::SetAssetCompleted { .. } => "set_asset_completed",
            Self::SetProjectStatus { .. } => "set_project_status",
            Self::RenameProject { .. } => "rename_project",
            Self::AddAction { .. } => "add_action",
            Self::RemoveAction { .. } => "remove_action",
            Self::RenameAction { .. } => "rename_action",
            Self::MoveAction { .. } => "move_action",
            Self::SeedActions { .. } => "seed_actions",
            Self::ApplyWorkflowBundle { .. } => "apply_workflow_bundle",
            Self::AddCollaborator { .. } => "add_collaborator",
            Self::RemoveCollaborator { .. } => "remove_collaborator",
        }
    }
}

#[cfg(test)]
mod tests {
    use assert_matches::assert_matches;

    use super::*;

    #[test]
    fn parses_tagged_edits() {
        let edit: Edit = serde_json::from_str(
            r#"{"op": "toggle_action", "asset_id": "a1", "action_id": "x1", "checked": true}"#,
        )
        .expect("edit should parse");
        assert_matches!(edit, Edit::ToggleAction { checked: true, .. });
        assert_eq!(edit.name(), "toggle_action");
    }

    #[test]
    fn optional_fields_default() {
        let edit: Edit =
            serde_json::from_str(r#"{"op": "add_asset", "name": "Poster", "type": "print"}"#)
                .expect("edit should parse");
        assert_matches!(
            edit,
            Edit::AddAsset { asset_type: Some(ref t), illustration_type: None, .. } if t == "print"
        );
    }
}
