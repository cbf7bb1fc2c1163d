//! Completion toggling with optional auto-check-above propagation.
//!
//! Checking a later step of an ordered action list implies that the earlier
//! steps happened. Those implied completions are tagged so the auto-trigger
//! resolver can tell them apart from deliberate checks.

use serde::Serialize;

use crate::error::CoreError;
use crate::model::Action;
use crate::types::EntityId;

/// What a single toggle changed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ToggleOutcome {
    /// The action the user toggled.
    pub action_id: EntityId,
    /// The action as it was before the toggle.
    pub before: Action,
    /// `true` if the toggled action's `completed` flag actually changed.
    pub transitioned: bool,
    /// Actions completed as a side effect, in list order.
    pub auto_checked: Vec<EntityId>,
}

impl ToggleOutcome {
    /// Whether the toggle changed anything at all.
    pub fn changed(&self) -> bool {
        self.transitioned || !self.auto_checked.is_empty()
    }
}

/// Set the completion of the action at `index`.
///
/// When checking with `auto_check_above`, every incomplete action before
/// `index` is completed and tagged `was_auto_checked = Some(true)`. The
/// toggled action itself always has the tag cleared. Unchecking never
/// cascades.
pub fn toggle_action(
    actions: &mut [Action],
    index: usize,
    checked: bool,
    auto_check_above: bool,
) -> Result<ToggleOutcome, CoreError> {
    if index >= actions.len() {
        return Err(CoreError::Validation(format!(
            "Action index {index} out of range for list of {}",
            actions.len()
        )));
    }

    let before = actions[index].clone();
    let mut auto_checked = Vec::new();

    if checked && auto_check_above {
        for above in actions[..index].iter_mut().filter(|a| !a.completed) {
            above.completed = true;
            above.was_auto_checked = Some(true);
            auto_checked.push(above.id.clone());
        }
    }

    let target = &mut actions[index];
    target.completed = checked;
    target.was_auto_checked = None;

    Ok(ToggleOutcome {
        action_id: before.id.clone(),
        transitioned: before.completed != checked,
        before,
        auto_checked,
    })
}
