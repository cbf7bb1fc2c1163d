//! Shared fixtures for the sync integration tests.

#![allow(dead_code)]

use std::sync::Arc;

use worktrack_core::model::{Action, Asset, Project};
use worktrack_core::status_config::StatusCatalog;
use worktrack_core::status_policy::StatusPolicy;
use worktrack_sync::{ProjectSession, SyncConfig};

pub fn action(name: &str, completed: bool) -> Action {
    let mut a = Action::new(name);
    a.completed = completed;
    a
}

pub fn asset(name: &str, actions: Vec<Action>) -> Asset {
    let mut asset = Asset::new(name);
    asset.actions = actions;
    asset
}

pub fn project(assets: Vec<Asset>) -> Project {
    let mut project = Project::new("p1", "Spring campaign");
    project.actionable_items = assets;
    project
}

pub fn session(project: Project) -> ProjectSession {
    session_with(project, SyncConfig::default())
}

pub fn session_with(project: Project, settings: SyncConfig) -> ProjectSession {
    ProjectSession::new(
        project,
        Arc::new(StatusCatalog::builtin()),
        StatusPolicy::default(),
        settings,
    )
}

/// Ids of (asset, action) at the given positions.
pub fn ids(session: &ProjectSession, asset: usize, action: usize) -> (String, String) {
    let a = &session.assets()[asset];
    (a.id.clone(), a.actions[action].id.clone())
}
