//! Manual-status policy and derived-status recomputation.
//!
//! A status is "manual" when only an explicit user action may change it.
//! Automatic recomputation from child completion never overwrites a manual
//! status. The heuristics layered on top of historical data (the name
//! fallback for legacy definitions and the single-action rule) live in
//! [`StatusPolicy`] so they can be tuned per deployment.

use serde::Serialize;

use crate::model::{Action, Asset, Project};
use crate::progress::{asset_progress, project_progress, total_action_count};
use crate::status_config::{
    StatusConfigProvider, STATUS_DONE, STATUS_IN_PROGRESS, STATUS_NOT_STARTED,
};
use crate::types::{names_match, normalize_name, Timestamp};

// ---------------------------------------------------------------------------
// Constants
// ---------------------------------------------------------------------------

/// Names treated as manual when a definition predates the `is_manual` flag.
pub const DEFAULT_MANUAL_SYNONYMS: &[&str] = &[
    "done",
    "canceled",
    "cancelled",
    "on hold",
    "hold",
    "on review",
    "in review",
    "babysit",
    "on list lightroom",
    "on lightroom list",
    "lightroom list",
    "lightroom",
    "in lightroom",
];

/// Projects with at most this many actions keep "In Progress" when every
/// action is unchecked again.
pub const DEFAULT_SINGLE_ACTION_THRESHOLD: usize = 1;

// ---------------------------------------------------------------------------
// Guards and decisions
// ---------------------------------------------------------------------------

/// Whether asset-level recomputation honours manual statuses.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum AssetGuard {
    /// Recompute regardless of the current status.
    #[default]
    Ignore,
    /// Leave manual statuses untouched.
    RespectManual,
}

/// Outcome of a status recomputation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StatusDecision {
    pub status: String,
    pub progress: Option<u8>,
    pub changed: bool,
}

impl StatusDecision {
    fn keep(current: &str, progress: Option<u8>) -> Self {
        Self {
            status: current.to_string(),
            progress,
            changed: false,
        }
    }

    fn to(current: &str, next: &str, progress: Option<u8>) -> Self {
        Self {
            status: next.to_string(),
            progress,
            changed: !names_match(current, next),
        }
    }
}

// ---------------------------------------------------------------------------
// Policy
// ---------------------------------------------------------------------------

/// Tunable status heuristics.
#[derive(Debug, Clone)]
pub struct StatusPolicy {
    manual_synonyms: Vec<String>,
    single_action_threshold: usize,
}

impl Default for StatusPolicy {
    fn default() -> Self {
        Self {
            manual_synonyms: DEFAULT_MANUAL_SYNONYMS
                .iter()
                .map(|s| s.to_string())
                .collect(),
            single_action_threshold: DEFAULT_SINGLE_ACTION_THRESHOLD,
        }
    }
}

impl StatusPolicy {
    pub fn with_single_action_threshold(mut self, threshold: usize) -> Self {
        self.single_action_threshold = threshold;
        self
    }

    pub fn with_manual_synonyms<I, S>(mut self, synonyms: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        self.manual_synonyms = synonyms
            .into_iter()
            .map(|s| normalize_name(s.as_ref()))
            .collect();
        self
    }

    pub fn single_action_threshold(&self) -> usize {
        self.single_action_threshold
    }

    /// Whether `name` is a status only a user may change.
    ///
    /// An explicit `is_manual` on the definition wins. Definitions without
    /// the flag (and names with no definition at all) fall back to the
    /// synonym list.
    pub fn is_manual_status(&self, config: &dyn StatusConfigProvider, name: &str) -> bool {
        if name.trim().is_empty() {
            return false;
        }

        if let Some(manual) = config.find(name).and_then(|d| d.is_manual) {
            return manual;
        }

        let normalized = normalize_name(name);
        let manual = self.manual_synonyms.iter().any(|s| *s == normalized);
        tracing::debug!(
            status = %name,
            manual,
            "Status has no is_manual flag, resolved by name fallback"
        );
        manual
    }

    /// Recompute a project's status from its assets.
    pub fn derive_project_status(
        &self,
        config: &dyn StatusConfigProvider,
        current: &str,
        assets: &[Asset],
    ) -> StatusDecision {
        let progress = project_progress(assets);

        if self.is_manual_status(config, current) {
            return StatusDecision::keep(current, progress);
        }

        let all_completed = !assets.is_empty() && assets.iter().all(Asset::counts_as_completed);
        let next = self.derive(current, progress, all_completed, total_action_count(assets));
        StatusDecision::to(current, &next, progress)
    }

    /// Recompute an asset's status from its own actions.
    pub fn derive_asset_status(
        &self,
        config: &dyn StatusConfigProvider,
        current: &str,
        actions: &[Action],
        guard: AssetGuard,
    ) -> StatusDecision {
        let progress = (!actions.is_empty()).then(|| asset_progress(actions));

        if guard == AssetGuard::RespectManual && self.is_manual_status(config, current) {
            return StatusDecision::keep(current, progress);
        }

        let all_completed = !actions.is_empty() && actions.iter().all(|a| a.completed);
        let next = self.derive(current, progress, all_completed, actions.len());
        StatusDecision::to(current, &next, progress)
    }

    fn derive(
        &self,
        current: &str,
        progress: Option<u8>,
        all_completed: bool,
        total_actions: usize,
    ) -> String {
        // Once in progress, only completion moves the status; never back.
        if names_match(current, STATUS_IN_PROGRESS) {
            return if all_completed {
                STATUS_DONE.to_string()
            } else {
                STATUS_IN_PROGRESS.to_string()
            };
        }

        let Some(progress) = progress else {
            return current.to_string();
        };

        match progress {
            100 => STATUS_DONE.to_string(),
            0 if names_match(current, STATUS_NOT_STARTED) => current.to_string(),
            0 if (1..=self.single_action_threshold).contains(&total_actions) => {
                STATUS_IN_PROGRESS.to_string()
            }
            0 => STATUS_NOT_STARTED.to_string(),
            _ => STATUS_IN_PROGRESS.to_string(),
        }
    }
}

/// Write a status onto a project, updating `completed_at` in the same
/// mutation. Returns `true` if the status changed.
pub fn apply_project_status(project: &mut Project, status: &str, now: Timestamp) -> bool {
    let changed = !names_match(&project.status, status);
    project.completed_at = completed_at_after(&project.status, project.completed_at, status, now);
    project.status = status.to_string();
    changed
}

/// `completed_at` after moving from `previous_status` to `next_status`:
/// stamped on entering "Done", kept while staying there, cleared otherwise.
pub fn completed_at_after(
    previous_status: &str,
    previous: Option<Timestamp>,
    next_status: &str,
    now: Timestamp,
) -> Option<Timestamp> {
    if !names_match(next_status, STATUS_DONE) {
        return None;
    }
    if names_match(previous_status, STATUS_DONE) {
        previous.or(Some(now))
    } else {
        Some(now)
    }
}
