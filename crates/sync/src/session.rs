//! One project opened for editing.
//!
//! A [`ProjectSession`] owns an [`OptimisticStore`] per editable collection:
//!
//! - the project header (name, status, `completed_at`),
//! - the asset list (written as the project's `actionable_items`),
//! - one action list per asset (written through the asset record),
//! - the project collaborator list.
//!
//! Every operation mutates local state synchronously, recomputes derived
//! statuses in the same call and returns the [`PersistRequest`]s to issue
//! now. Debounced edits and batched status writes are released by
//! [`ProjectSession::poll`].
//!
//! The asset list embeds every action list, so writes through one record
//! also register the expected echo on the other. When an action list is
//! written while the asset list has its own pending edit, the asset list is
//! written instead, so the remote never sees the two out of step.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::Utc;
use serde::Serialize;
use tokio::time::Instant;
use worktrack_core::auto_check::{toggle_action, ToggleOutcome};
use worktrack_core::auto_trigger::{check_if_should_auto_trigger, completion_trigger};
use worktrack_core::error::CoreError;
use worktrack_core::model::{Action, Asset, Collaborator, Project};
use worktrack_core::mutations;
use worktrack_core::status_config::StatusConfigProvider;
use worktrack_core::status_policy::{AssetGuard, StatusDecision, StatusPolicy};
use worktrack_core::types::{names_match, EntityId};
use worktrack_core::workflow::{self, WorkflowBundle};
use worktrack_events::TrackerEvent;

use crate::batcher::{StatusChangeBatcher, StatusChangeKey};
use crate::config::SyncConfig;
use crate::edit::Edit;
use crate::header::ProjectHeader;
use crate::machine::{ExternalVerdict, MutationKind, SyncDirective};
use crate::persistence::{PartialUpdate, PersistRequest};
use crate::store::OptimisticStore;

// ---------------------------------------------------------------------------
// Reports
// ---------------------------------------------------------------------------

/// What a completion toggle did.
#[derive(Debug, Clone, Serialize)]
pub struct ToggleReport {
    pub outcome: ToggleOutcome,
    /// Recomputed status of the toggled action's asset.
    pub asset_status: StatusDecision,
    /// `true` if the asset became completed with this toggle.
    pub asset_completed: bool,
    /// Status the project was promoted to by an action trigger.
    pub triggered_status: Option<String>,
    pub requests: Vec<PersistRequest>,
}

/// Result of applying an [`Edit`].
#[derive(Debug, Clone, Default)]
pub struct EditOutcome {
    pub requests: Vec<PersistRequest>,
    /// Asset that became completed; focus may move past it.
    pub completed_asset: Option<EntityId>,
}

impl From<Vec<PersistRequest>> for EditOutcome {
    fn from(requests: Vec<PersistRequest>) -> Self {
        Self {
            requests,
            completed_asset: None,
        }
    }
}

// ---------------------------------------------------------------------------
// Session
// ---------------------------------------------------------------------------

pub struct ProjectSession {
    project_id: EntityId,
    config: Arc<dyn StatusConfigProvider>,
    policy: StatusPolicy,
    settings: SyncConfig,
    header: OptimisticStore<ProjectHeader>,
    assets: OptimisticStore<Vec<Asset>>,
    actions: HashMap<EntityId, OptimisticStore<Vec<Action>>>,
    collaborators: OptimisticStore<Vec<Collaborator>>,
    batcher: StatusChangeBatcher,
    events: Vec<TrackerEvent>,
    /// Set after a failed write; the next write sends the whole project.
    resync: bool,
}

impl ProjectSession {
    pub fn new(
        project: Project,
        config: Arc<dyn StatusConfigProvider>,
        policy: StatusPolicy,
        settings: SyncConfig,
    ) -> Self {
        let debounce = settings.debounce;
        let actions = project
            .actionable_items
            .iter()
            .map(|asset| {
                (
                    asset.id.clone(),
                    OptimisticStore::new(asset.actions.clone(), debounce),
                )
            })
            .collect();

        Self {
            header: OptimisticStore::new(ProjectHeader::from(&project), debounce),
            collaborators: OptimisticStore::new(project.collaborators, debounce),
            assets: OptimisticStore::new(project.actionable_items, debounce),
            actions,
            batcher: StatusChangeBatcher::new(settings.status_batch_delay),
            project_id: project.id,
            config,
            policy,
            settings,
            events: Vec::new(),
            resync: false,
        }
    }

    pub fn project_id(&self) -> &str {
        &self.project_id
    }

    pub fn settings(&self) -> &SyncConfig {
        &self.settings
    }

    pub fn header(&self) -> &ProjectHeader {
        self.header.local()
    }

    pub fn assets(&self) -> &[Asset] {
        self.assets.local()
    }

    /// Current local view of the whole project.
    pub fn snapshot(&self) -> Project {
        let header = self.header.local();
        Project {
            id: self.project_id.clone(),
            name: header.name.clone(),
            status: header.status.clone(),
            actionable_items: self.assets.local().clone(),
            completed_at: header.completed_at,
            collaborators: self.collaborators.local().clone(),
        }
    }

    /// Whether any write is still waiting for a timer.
    pub fn has_pending(&self) -> bool {
        self.header.has_pending()
            || self.assets.has_pending()
            || self.collaborators.has_pending()
            || self.actions.values().any(OptimisticStore::has_pending)
            || self.batcher.has_pending()
    }

    /// Earliest instant at which [`poll`](Self::poll) has work to do.
    pub fn next_deadline(&self) -> Option<Instant> {
        [
            self.header.deadline(),
            self.assets.deadline(),
            self.collaborators.deadline(),
            self.batcher.next_deadline(),
        ]
        .into_iter()
        .chain(self.actions.values().map(OptimisticStore::deadline))
        .flatten()
        .min()
    }

    /// Events produced since the last call.
    pub fn drain_events(&mut self) -> Vec<TrackerEvent> {
        std::mem::take(&mut self.events)
    }

    /// First incomplete asset after `after_asset_id`, wrapping around to the
    /// start of the list. The asset itself is never returned.
    pub fn next_incomplete_asset(&self, after_asset_id: &str) -> Option<EntityId> {
        let assets = self.assets.local();
        let start = assets
            .iter()
            .position(|a| a.id == after_asset_id)
            .map_or(0, |i| i + 1);
        assets[start..]
            .iter()
            .chain(assets[..start].iter())
            .find(|a| a.id != after_asset_id && !a.counts_as_completed())
            .map(|a| a.id.clone())
    }

    /// Apply a serialized edit.
    pub fn apply(&mut self, edit: Edit) -> Result<EditOutcome, CoreError> {
        let outcome = match edit {
            Edit::ToggleAction {
                asset_id,
                action_id,
                checked,
            } => {
                let report = self.toggle_action(&asset_id, &action_id, checked)?;
                EditOutcome {
                    requests: report.requests,
                    completed_asset: report.asset_completed.then_some(asset_id),
                }
            }
            Edit::AddAsset {
                name,
                asset_type,
                illustration_type,
            } => self.add_asset(&name, asset_type, illustration_type)?.1.into(),
            Edit::RemoveAsset { asset_id } => self.remove_asset(&asset_id)?.into(),
            Edit::DuplicateAsset { asset_id } => self.duplicate_asset(&asset_id)?.1.into(),
            Edit::MoveAsset { asset_id, to_index } => self.move_asset(&asset_id, to_index)?.into(),
            Edit::RenameAsset { asset_id, name } => self.rename_asset(&asset_id, &name)?.into(),
            Edit::SetAssetClassification {
                asset_id,
                asset_type,
                illustration_type,
            } => self
                .set_asset_classification(&asset_id, asset_type, illustration_type)?
                .into(),
            Edit::SetAssetStatus { asset_id, status } => {
                self.set_asset_status(&asset_id, &status)?.into()
            }
            Edit::SetAssetCompleted {
                asset_id,
                completed,
            } => self.set_asset_completed(&asset_id, completed)?.into(),
            Edit::SetProjectStatus { status } => self.set_project_status(&status)?.into(),
            Edit::RenameProject { name } => self.rename_project(&name)?.into(),
            Edit::AddAction {
                asset_id,
                name,
                position,
            } => self.add_action(&asset_id, &name, position)?.1.into(),
            Edit::RemoveAction {
                asset_id,
                action_id,
            } => self.remove_action(&asset_id, &action_id)?.into(),
            Edit::RenameAction {
                asset_id,
                action_id,
                name,
            } => self.rename_action(&asset_id, &action_id, &name)?.into(),
            Edit::MoveAction {
                asset_id,
                action_id,
                to_index,
            } => self.move_action(&asset_id, &action_id, to_index)?.into(),
            Edit::SeedActions { asset_id, names } => {
                self.seed_actions(&asset_id, &names)?.1.into()
            }
            Edit::ApplyWorkflowBundle { asset_id, bundle } => {
                self.apply_workflow_bundle(&asset_id, &bundle)?.1.into()
            }
            Edit::AddCollaborator {
                collaborator,
                asset_id,
            } => self
                .add_collaborator(collaborator, asset_id.as_deref())?
                .into(),
            Edit::RemoveCollaborator {
                collaborator_id,
                asset_id,
            } => self
                .remove_collaborator(&collaborator_id, asset_id.as_deref())?
                .into(),
        };
        Ok(outcome)
    }

    // -----------------------------------------------------------------------
    // Actions
    // -----------------------------------------------------------------------

    /// Check or uncheck an action.
    ///
    /// The asset status is recomputed from its actions. A deliberate
    /// completion whose action name is a trigger-enabled status promotes the
    /// project once every asset is ready; otherwise the project status is
    /// recomputed from progress.
    pub fn toggle_action(
        &mut self,
        asset_id: &str,
        action_id: &str,
        checked: bool,
    ) -> Result<ToggleReport, CoreError> {
        let auto_check_above = self.settings.auto_check_above;
        let was_completed = self.asset(asset_id)?.counts_as_completed();

        let (outcome, directive) =
            self.mutate_actions(asset_id, MutationKind::Immediate, |actions| {
                let index = actions
                    .iter()
                    .position(|a| a.id == action_id)
                    .ok_or_else(|| CoreError::not_found("action", action_id))?;
                toggle_action(actions, index, checked, auto_check_above)
            })?;

        let asset_status = self.recompute_asset(asset_id)?;
        let asset_completed = !was_completed && self.asset(asset_id)?.counts_as_completed();

        let mut requests = Vec::new();
        if directive.is_some() {
            self.write_actions(asset_id, &mut requests);
        }

        let triggered_status = self.resolve_trigger(asset_id, &outcome)?;
        match &triggered_status {
            Some(status) => {
                let mut request = self.flush_header();
                request.triggered_status = Some(status.clone());
                requests.push(request);
            }
            None => self.recompute_project(),
        }

        Ok(ToggleReport {
            outcome,
            asset_status,
            asset_completed,
            triggered_status,
            requests: self.finish(requests),
        })
    }

    pub fn add_action(
        &mut self,
        asset_id: &str,
        name: &str,
        position: Option<usize>,
    ) -> Result<(EntityId, Vec<PersistRequest>), CoreError> {
        let (id, directive) = self.mutate_actions(asset_id, MutationKind::Immediate, |actions| {
            mutations::add_action(actions, name, position)
        })?;
        let requests = self.after_action_change(asset_id, directive)?;
        Ok((id, requests))
    }

    pub fn remove_action(
        &mut self,
        asset_id: &str,
        action_id: &str,
    ) -> Result<Vec<PersistRequest>, CoreError> {
        let (_, directive) = self.mutate_actions(asset_id, MutationKind::Immediate, |actions| {
            mutations::remove_action(actions, action_id)
        })?;
        self.after_action_change(asset_id, directive)
    }

    /// Rename an action; persisted after the debounce window.
    pub fn rename_action(
        &mut self,
        asset_id: &str,
        action_id: &str,
        name: &str,
    ) -> Result<Vec<PersistRequest>, CoreError> {
        let (_, directive) = self.mutate_actions(asset_id, MutationKind::Debounced, |actions| {
            mutations::rename_action(actions, action_id, name)
        })?;
        self.after_action_change(asset_id, directive)
    }

    pub fn move_action(
        &mut self,
        asset_id: &str,
        action_id: &str,
        to_index: usize,
    ) -> Result<Vec<PersistRequest>, CoreError> {
        let (_, directive) = self.mutate_actions(asset_id, MutationKind::Immediate, |actions| {
            mutations::move_action(actions, action_id, to_index)
        })?;
        self.after_action_change(asset_id, directive)
    }

    /// Append suggested actions (from a classification preset).
    pub fn seed_actions(
        &mut self,
        asset_id: &str,
        names: &[String],
    ) -> Result<(Vec<EntityId>, Vec<PersistRequest>), CoreError> {
        let (ids, directive) = self.mutate_actions(asset_id, MutationKind::Immediate, |actions| {
            Ok(workflow::seed_actions(actions, names))
        })?;
        let requests = self.after_action_change(asset_id, directive)?;
        Ok((ids, requests))
    }

    pub fn apply_workflow_bundle(
        &mut self,
        asset_id: &str,
        bundle: &WorkflowBundle,
    ) -> Result<(Vec<EntityId>, Vec<PersistRequest>), CoreError> {
        tracing::debug!(asset_id, bundle = %bundle.name, "Applying workflow bundle");
        let (ids, directive) = self.mutate_actions(asset_id, MutationKind::Immediate, |actions| {
            Ok(workflow::apply_bundle(actions, bundle))
        })?;
        let requests = self.after_action_change(asset_id, directive)?;
        Ok((ids, requests))
    }

    // -----------------------------------------------------------------------
    // Assets
    // -----------------------------------------------------------------------

    pub fn add_asset(
        &mut self,
        name: &str,
        asset_type: Option<String>,
        illustration_type: Option<String>,
    ) -> Result<(EntityId, Vec<PersistRequest>), CoreError> {
        let (id, requests) = self.mutate_assets(MutationKind::Immediate, |assets| {
            mutations::add_asset(assets, name, asset_type, illustration_type)
        })?;
        self.recompute_project();
        Ok((id, self.finish(requests)))
    }

    pub fn remove_asset(&mut self, asset_id: &str) -> Result<Vec<PersistRequest>, CoreError> {
        let (_, requests) = self.mutate_assets(MutationKind::Immediate, |assets| {
            mutations::remove_asset(assets, asset_id)
        })?;
        self.recompute_project();
        Ok(self.finish(requests))
    }

    pub fn duplicate_asset(
        &mut self,
        asset_id: &str,
    ) -> Result<(EntityId, Vec<PersistRequest>), CoreError> {
        let (id, requests) = self.mutate_assets(MutationKind::Immediate, |assets| {
            mutations::duplicate_asset(assets, asset_id)
        })?;
        self.recompute_project();
        Ok((id, self.finish(requests)))
    }

    pub fn move_asset(
        &mut self,
        asset_id: &str,
        to_index: usize,
    ) -> Result<Vec<PersistRequest>, CoreError> {
        let (_, requests) = self.mutate_assets(MutationKind::Immediate, |assets| {
            mutations::move_asset(assets, asset_id, to_index)
        })?;
        Ok(self.finish(requests))
    }

    /// Rename an asset; persisted after the debounce window.
    pub fn rename_asset(
        &mut self,
        asset_id: &str,
        name: &str,
    ) -> Result<Vec<PersistRequest>, CoreError> {
        let (_, requests) = self.mutate_assets(MutationKind::Debounced, |assets| {
            mutations::rename_asset(assets, asset_id, name)
        })?;
        Ok(self.finish(requests))
    }

    pub fn set_asset_classification(
        &mut self,
        asset_id: &str,
        asset_type: Option<String>,
        illustration_type: Option<String>,
    ) -> Result<Vec<PersistRequest>, CoreError> {
        let (_, requests) = self.mutate_assets(MutationKind::Immediate, |assets| {
            mutations::set_asset_classification(assets, asset_id, asset_type, illustration_type)
        })?;
        Ok(self.finish(requests))
    }

    /// Explicitly set an asset's status. Manual statuses are allowed.
    pub fn set_asset_status(
        &mut self,
        asset_id: &str,
        status: &str,
    ) -> Result<Vec<PersistRequest>, CoreError> {
        let from = self.asset(asset_id)?.status.clone();
        self.warn_if_unknown(status);
        let (_, requests) = self.mutate_assets(MutationKind::Immediate, |assets| {
            mutations::set_asset_status(assets, asset_id, status)
        })?;
        self.note_asset_status(asset_id, &from)?;
        self.recompute_project();
        Ok(self.finish(requests))
    }

    /// Explicitly mark an asset completed or reopen it.
    pub fn set_asset_completed(
        &mut self,
        asset_id: &str,
        completed: bool,
    ) -> Result<Vec<PersistRequest>, CoreError> {
        let from = self.asset(asset_id)?.status.clone();
        let (_, requests) = self.mutate_assets(MutationKind::Immediate, |assets| {
            mutations::set_asset_completed(assets, asset_id, completed)
        })?;
        self.note_asset_status(asset_id, &from)?;
        self.recompute_project();
        Ok(self.finish(requests))
    }

    // -----------------------------------------------------------------------
    // Project header
    // -----------------------------------------------------------------------

    /// Explicitly set the project status. Manual statuses are allowed. A
    /// batched derived change is dropped, or written now if it already
    /// shows the chosen status.
    pub fn set_project_status(&mut self, status: &str) -> Result<Vec<PersistRequest>, CoreError> {
        let status = status.trim();
        if status.is_empty() {
            return Err(CoreError::Validation("Status must not be empty".to_string()));
        }
        self.warn_if_unknown(status);

        let from = self.header.local().status.clone();
        let (_, directive) = self.header.mutate(MutationKind::Immediate, Instant::now(), |h| {
            h.apply_status(status, Utc::now());
            Ok(())
        })?;

        let mut requests = Vec::new();
        if directive.is_some() {
            self.batcher.cancel(&self.project_id);
            self.note_project_status(&from, status, None);
            requests.push(self.flush_header());
        } else if self.batcher.is_pending(&self.project_id) {
            // Already shown locally by a derived change that is not written yet.
            requests.push(self.flush_header());
        }
        Ok(self.finish(requests))
    }

    /// Rename the project; persisted after the debounce window.
    pub fn rename_project(&mut self, name: &str) -> Result<Vec<PersistRequest>, CoreError> {
        let name = mutations::validate_name(name)?;
        let (_, directive) = self.header.mutate(MutationKind::Debounced, Instant::now(), |h| {
            h.name = name;
            Ok(())
        })?;

        let mut requests = Vec::new();
        if directive == Some(SyncDirective::FlushNow) {
            requests.push(self.flush_header());
        }
        Ok(self.finish(requests))
    }

    // -----------------------------------------------------------------------
    // Collaborators
    // -----------------------------------------------------------------------

    /// Add a collaborator to the project and, if given, to one asset.
    ///
    /// The two writes are independent: a failing branch is logged and the
    /// other still goes through. An error is returned only if every branch
    /// failed.
    pub fn add_collaborator(
        &mut self,
        collaborator: Collaborator,
        asset_id: Option<&str>,
    ) -> Result<Vec<PersistRequest>, CoreError> {
        let mut requests = Vec::new();
        let mut failures = Vec::new();

        let project_branch = self
            .collaborators
            .mutate(MutationKind::Immediate, Instant::now(), |list| {
                mutations::add_collaborator(list, collaborator.clone())
            });
        match project_branch {
            Ok((_, Some(_))) => requests.push(self.flush_collaborators()),
            Ok((_, None)) => {}
            Err(e) => failures.push(("project", e)),
        }

        if let Some(asset_id) = asset_id {
            let asset_branch = self.mutate_assets(MutationKind::Immediate, |assets| {
                let asset = find_asset_mut(assets, asset_id)?;
                mutations::add_collaborator(&mut asset.collaborators, collaborator.clone())
            });
            match asset_branch {
                Ok((_, written)) => requests.extend(written),
                Err(e) => failures.push(("asset", e)),
            }
        }

        self.settle_fan_out("add", &collaborator.id, requests, failures)
    }

    /// Remove a collaborator from the project and, if given, from one asset.
    pub fn remove_collaborator(
        &mut self,
        collaborator_id: &str,
        asset_id: Option<&str>,
    ) -> Result<Vec<PersistRequest>, CoreError> {
        let mut requests = Vec::new();
        let mut failures = Vec::new();

        let project_branch = self
            .collaborators
            .mutate(MutationKind::Immediate, Instant::now(), |list| {
                mutations::remove_collaborator(list, collaborator_id)
            });
        match project_branch {
            Ok((_, Some(_))) => requests.push(self.flush_collaborators()),
            Ok((_, None)) => {}
            Err(e) => failures.push(("project", e)),
        }

        if let Some(asset_id) = asset_id {
            let asset_branch = self.mutate_assets(MutationKind::Immediate, |assets| {
                let asset = find_asset_mut(assets, asset_id)?;
                mutations::remove_collaborator(&mut asset.collaborators, collaborator_id)
            });
            match asset_branch {
                Ok((_, written)) => requests.extend(written),
                Err(e) => failures.push(("asset", e)),
            }
        }

        self.settle_fan_out("remove", collaborator_id, requests, failures)
    }

    fn settle_fan_out(
        &mut self,
        op: &str,
        collaborator_id: &str,
        requests: Vec<PersistRequest>,
        failures: Vec<(&'static str, CoreError)>,
    ) -> Result<Vec<PersistRequest>, CoreError> {
        let mut first_error = None;
        for (branch, error) in failures {
            tracing::warn!(
                project_id = %self.project_id,
                collaborator_id,
                op,
                branch,
                error = %error,
                "Collaborator update failed for one branch"
            );
            first_error.get_or_insert(error);
        }

        match first_error {
            Some(error) if requests.is_empty() => Err(error),
            _ => Ok(self.finish(requests)),
        }
    }

    // -----------------------------------------------------------------------
    // Sync
    // -----------------------------------------------------------------------

    /// Release debounced edits and batched status writes that are due.
    pub fn poll(&mut self, now: Instant) -> Vec<PersistRequest> {
        let mut requests = Vec::new();

        if let Some(assets) = self.assets.poll(now) {
            requests.push(self.assets_request(assets));
        }

        for asset_id in self.asset_ids() {
            let due = self
                .actions
                .get(&asset_id)
                .is_some_and(|store| store.deadline().is_some_and(|d| d <= now));
            if due {
                self.write_actions(&asset_id, &mut requests);
            }
        }

        let status_due = !self.batcher.due(now).is_empty();
        if let Some(header) = self.header.poll(now) {
            requests.push(self.header_request(header));
        } else if status_due {
            requests.push(self.flush_header());
        }

        if let Some(collaborators) = self.collaborators.poll(now) {
            requests.push(self.collaborators_request(collaborators));
        }

        self.finish(requests)
    }

    /// Leave the editing context, writing everything still pending.
    pub fn teardown(&mut self) -> Vec<PersistRequest> {
        let mut requests = Vec::new();

        if let Some(assets) = self.assets.teardown() {
            requests.push(self.assets_request(assets));
        }

        for asset_id in self.asset_ids() {
            let pending = self
                .actions
                .get(&asset_id)
                .is_some_and(OptimisticStore::has_pending);
            if pending {
                self.write_actions(&asset_id, &mut requests);
            }
        }

        let status_pending = !self.batcher.drain_all().is_empty();
        if let Some(header) = self.header.teardown() {
            requests.push(self.header_request(header));
        } else if status_pending {
            requests.push(self.flush_header());
        }

        if let Some(collaborators) = self.collaborators.teardown() {
            requests.push(self.collaborators_request(collaborators));
        }

        if !requests.is_empty() {
            tracing::debug!(
                project_id = %self.project_id,
                count = requests.len(),
                "Flushing pending writes on teardown"
            );
        }
        self.finish(requests)
    }

    /// Compare an externally delivered project with local state.
    ///
    /// Echoes of our own writes are ignored; independent changes replace
    /// the affected collections and drop their pending edits. Adoption does
    /// not trigger status recomputation.
    pub fn receive_external(&mut self, incoming: Project) {
        if incoming.id != self.project_id {
            tracing::warn!(
                project_id = %self.project_id,
                incoming_id = %incoming.id,
                "Ignoring snapshot for another project"
            );
            return;
        }

        if self.header.receive_external(ProjectHeader::from(&incoming)) == ExternalVerdict::Foreign
        {
            self.batcher.cancel(&self.project_id);
            self.adopted("header");
        }

        let mut actions_adopted = false;
        for asset in &incoming.actionable_items {
            if let Some(store) = self.actions.get_mut(&asset.id) {
                actions_adopted |=
                    store.receive_external(asset.actions.clone()) == ExternalVerdict::Foreign;
            }
        }
        if actions_adopted {
            self.adopted("actions");
        }

        if self.assets.receive_external(incoming.actionable_items) == ExternalVerdict::Foreign {
            self.adopted("assets");
        }

        if self.collaborators.receive_external(incoming.collaborators) == ExternalVerdict::Foreign
        {
            self.adopted("collaborators");
        }

        self.sync_action_stores();
    }

    /// Note that a write failed. Local state is kept and the next write
    /// carries the whole project.
    pub fn on_persist_failed(&mut self) {
        self.resync = true;
    }

    // -----------------------------------------------------------------------
    // Internals
    // -----------------------------------------------------------------------

    fn asset(&self, asset_id: &str) -> Result<&Asset, CoreError> {
        self.assets
            .local()
            .iter()
            .find(|a| a.id == asset_id)
            .ok_or_else(|| CoreError::not_found("asset", asset_id))
    }

    fn asset_ids(&self) -> Vec<EntityId> {
        self.assets.local().iter().map(|a| a.id.clone()).collect()
    }

    fn mutate_assets<R>(
        &mut self,
        kind: MutationKind,
        f: impl FnOnce(&mut Vec<Asset>) -> Result<R, CoreError>,
    ) -> Result<(R, Vec<PersistRequest>), CoreError> {
        let (result, directive) = self.assets.mutate(kind, Instant::now(), f)?;
        self.sync_action_stores();

        let mut requests = Vec::new();
        if directive == Some(SyncDirective::FlushNow) {
            let assets = self.assets.flush();
            requests.push(self.assets_request(assets));
        }
        Ok((result, requests))
    }

    /// Mutate one asset's action list and mirror it into the asset list.
    fn mutate_actions<R>(
        &mut self,
        asset_id: &str,
        kind: MutationKind,
        f: impl FnOnce(&mut Vec<Action>) -> Result<R, CoreError>,
    ) -> Result<(R, Option<SyncDirective>), CoreError> {
        let store = self
            .actions
            .get_mut(asset_id)
            .ok_or_else(|| CoreError::not_found("asset", asset_id))?;
        let (result, directive) = store.mutate(kind, Instant::now(), f)?;
        let actions = store.local().clone();

        self.assets.edit_untracked(|assets| {
            if let Some(asset) = assets.iter_mut().find(|a| a.id == asset_id) {
                asset.actions = actions;
            }
        });
        Ok((result, directive))
    }

    fn after_action_change(
        &mut self,
        asset_id: &str,
        directive: Option<SyncDirective>,
    ) -> Result<Vec<PersistRequest>, CoreError> {
        let mut requests = Vec::new();
        if directive == Some(SyncDirective::FlushNow) {
            self.recompute_asset(asset_id)?;
            self.write_actions(asset_id, &mut requests);
            self.recompute_project();
        }
        Ok(self.finish(requests))
    }

    /// Keep one action store per asset, creating stores for new assets and
    /// dropping those of removed ones. The action stores own the action
    /// lists, so their content is mirrored back into the asset list.
    fn sync_action_stores(&mut self) {
        let debounce = self.settings.debounce;
        let ids = self.asset_ids();
        self.actions.retain(|id, _| ids.contains(id));

        let stores = &mut self.actions;
        self.assets.edit_untracked(|assets| {
            for asset in assets.iter_mut() {
                let store = stores
                    .entry(asset.id.clone())
                    .or_insert_with(|| OptimisticStore::new(asset.actions.clone(), debounce));
                if asset.actions != *store.local() {
                    asset.actions = store.local().clone();
                }
            }
        });
    }

    fn recompute_asset(&mut self, asset_id: &str) -> Result<StatusDecision, CoreError> {
        let guard = if self.settings.respect_manual_asset_status {
            AssetGuard::RespectManual
        } else {
            AssetGuard::Ignore
        };
        let config = Arc::clone(&self.config);
        let policy = &self.policy;

        let (decision, from) = self.assets.edit_untracked(|assets| {
            let asset = find_asset_mut(assets, asset_id)?;
            let from = asset.status.clone();
            let decision =
                policy.derive_asset_status(config.as_ref(), &asset.status, &asset.actions, guard);
            if decision.changed {
                asset.set_status(decision.status.clone());
            }
            Ok::<_, CoreError>((decision, from))
        })?;

        if decision.changed {
            tracing::info!(
                project_id = %self.project_id,
                asset_id,
                from = %from,
                to = %decision.status,
                progress = ?decision.progress,
                "Asset status derived"
            );
            self.events.push(TrackerEvent::StatusChanged {
                entity_id: asset_id.to_string(),
                from,
                to: decision.status.clone(),
                progress: decision.progress,
            });
        }
        Ok(decision)
    }

    /// Recompute the project status from its assets. A change is applied
    /// locally now and written once the batch delay elapses.
    fn recompute_project(&mut self) {
        let from = self.header.local().status.clone();
        let decision =
            self.policy
                .derive_project_status(self.config.as_ref(), &from, self.assets.local());
        if !decision.changed {
            return;
        }

        self.header
            .edit_untracked(|h| h.apply_status(&decision.status, Utc::now()));
        self.batcher.submit(
            StatusChangeKey::new(self.project_id.clone(), decision.progress, &decision.status),
            Instant::now(),
        );
        self.note_project_status(&from, &decision.status, decision.progress);
    }

    /// Promote the project if the toggle was a deliberate completion of a
    /// trigger action and every asset is ready.
    fn resolve_trigger(
        &mut self,
        asset_id: &str,
        outcome: &ToggleOutcome,
    ) -> Result<Option<String>, CoreError> {
        let asset = self.asset(asset_id)?;
        let Some(after) = asset.find_action(&outcome.action_id) else {
            return Ok(None);
        };
        let Some(target) = completion_trigger(self.config.as_ref(), &outcome.before, after)
        else {
            return Ok(None);
        };

        let current = self.header.local().status.clone();
        if names_match(&current, &target) {
            return Ok(None);
        }
        if self.policy.is_manual_status(self.config.as_ref(), &current) {
            tracing::debug!(
                project_id = %self.project_id,
                status = %current,
                target = %target,
                "Manual project status blocks action trigger"
            );
            return Ok(None);
        }
        if !check_if_should_auto_trigger(self.assets.local(), &target) {
            tracing::debug!(
                project_id = %self.project_id,
                target = %target,
                "Not every asset is ready for triggered status"
            );
            return Ok(None);
        }

        self.header
            .mutate(MutationKind::Immediate, Instant::now(), |h| {
                h.apply_status(&target, Utc::now());
                Ok(())
            })?;
        self.batcher.cancel(&self.project_id);

        tracing::info!(
            project_id = %self.project_id,
            action_id = %outcome.action_id,
            status = %target,
            "Action triggered project status"
        );
        self.events.push(TrackerEvent::AutoTriggered {
            project_id: self.project_id.clone(),
            action_id: outcome.action_id.clone(),
            status: target.clone(),
        });
        self.note_project_status(&current, &target, None);
        Ok(Some(target))
    }

    fn note_project_status(&mut self, from: &str, to: &str, progress: Option<u8>) {
        tracing::info!(
            project_id = %self.project_id,
            from = %from,
            to = %to,
            progress = ?progress,
            "Project status changed"
        );
        self.events.push(TrackerEvent::StatusChanged {
            entity_id: self.project_id.clone(),
            from: from.to_string(),
            to: to.to_string(),
            progress,
        });
    }

    fn note_asset_status(&mut self, asset_id: &str, from: &str) -> Result<(), CoreError> {
        let to = self.asset(asset_id)?.status.clone();
        if !names_match(from, &to) {
            self.events.push(TrackerEvent::StatusChanged {
                entity_id: asset_id.to_string(),
                from: from.to_string(),
                to,
                progress: None,
            });
        }
        Ok(())
    }

    fn warn_if_unknown(&self, status: &str) {
        if self.config.find(status).is_none() {
            tracing::warn!(
                project_id = %self.project_id,
                status,
                "Status is not in the configured catalog"
            );
        }
    }

    fn adopted(&mut self, collection: &str) {
        tracing::warn!(
            project_id = %self.project_id,
            collection,
            "Adopted independent external change"
        );
        self.events.push(TrackerEvent::ExternalAdopted {
            project_id: self.project_id.clone(),
            collection: collection.to_string(),
        });
    }

    // -----------------------------------------------------------------------
    // Writes
    // -----------------------------------------------------------------------

    /// Write one asset's action list, or the whole asset list if that has
    /// its own pending edit.
    fn write_actions(&mut self, asset_id: &str, requests: &mut Vec<PersistRequest>) {
        let Some(store) = self.actions.get_mut(asset_id) else {
            return;
        };
        let actions = store.flush();

        if self.assets.has_pending() {
            let assets = self.assets.flush();
            requests.push(self.assets_request(assets));
            return;
        }

        let (status, is_completed) = match self.assets.local().iter().find(|a| a.id == asset_id) {
            Some(asset) => (Some(asset.status.clone()), Some(asset.is_completed)),
            None => (None, None),
        };
        let echo = self.echo_of_asset_write(asset_id);
        self.assets.expect_echo_of(echo);
        requests.push(PersistRequest::asset(
            self.project_id.clone(),
            asset_id,
            PartialUpdate {
                status,
                is_completed,
                actions: Some(actions),
                ..Default::default()
            },
        ));
    }

    /// The asset list the remote will hold once one asset's record is
    /// written: other assets keep the actions last written for them, so
    /// their unwritten edits are not part of the expected echo.
    fn echo_of_asset_write(&self, asset_id: &str) -> Vec<Asset> {
        self.assets
            .local()
            .iter()
            .map(|asset| {
                let mut asset = asset.clone();
                if asset.id != asset_id {
                    if let Some(store) = self.actions.get(&asset.id) {
                        asset.actions = store.written().clone();
                    }
                }
                asset
            })
            .collect()
    }

    fn assets_request(&mut self, assets: Vec<Asset>) -> PersistRequest {
        for store in self.actions.values_mut() {
            store.expect_echo_of_local();
        }
        PersistRequest::project(
            self.project_id.clone(),
            PartialUpdate {
                actionable_items: Some(assets),
                ..Default::default()
            },
        )
    }

    fn flush_header(&mut self) -> PersistRequest {
        let header = self.header.flush();
        self.header_request(header)
    }

    fn header_request(&mut self, header: ProjectHeader) -> PersistRequest {
        // The header carries the status, so any batched change is written.
        if let Some(key) = self.batcher.cancel(&self.project_id) {
            self.batcher.mark_applied(key);
        }
        PersistRequest::project(
            self.project_id.clone(),
            PartialUpdate {
                name: Some(header.name),
                status: Some(header.status),
                completed_at: Some(header.completed_at),
                ..Default::default()
            },
        )
    }

    fn flush_collaborators(&mut self) -> PersistRequest {
        let collaborators = self.collaborators.flush();
        self.collaborators_request(collaborators)
    }

    fn collaborators_request(&self, collaborators: Vec<Collaborator>) -> PersistRequest {
        PersistRequest::project(
            self.project_id.clone(),
            PartialUpdate {
                collaborators: Some(collaborators),
                ..Default::default()
            },
        )
    }

    /// Replace the writes of one operation by a single full-project write
    /// if an earlier write failed.
    fn finish(&mut self, requests: Vec<PersistRequest>) -> Vec<PersistRequest> {
        if !self.resync || requests.is_empty() {
            return requests;
        }
        self.resync = false;

        let triggered_status = requests.iter().find_map(|r| r.triggered_status.clone());
        for store in self.actions.values_mut() {
            store.flush();
        }
        let assets = self.assets.flush();
        let collaborators = self.collaborators.flush();
        let mut request = self.flush_header();
        request.update.actionable_items = Some(assets);
        request.update.collaborators = Some(collaborators);
        request.triggered_status = triggered_status;

        tracing::info!(project_id = %self.project_id, "Resyncing full project after failed write");
        vec![request]
    }
}

fn find_asset_mut<'a>(assets: &'a mut [Asset], asset_id: &str) -> Result<&'a mut Asset, CoreError> {
    assets
        .iter_mut()
        .find(|a| a.id == asset_id)
        .ok_or_else(|| CoreError::not_found("asset", asset_id))
}
