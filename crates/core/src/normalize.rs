//! Normalize-on-read migration from legacy record shapes.
//!
//! Older records may carry numeric ids, only one of `status` /
//! `is_completed`, a single `collaborator` instead of a list, missing action
//! lists, unparseable timestamps, or fields of the wrong type.
//! [`normalize_project`] runs once at the data boundary so the rest of the
//! engine only ever sees the canonical [`Project`] shape.

use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Deserializer};

use crate::error::CoreError;
use crate::model::{Action, Asset, Collaborator, Project};
use crate::status_config::{StatusConfigProvider, STATUS_DONE};
use crate::types::{names_match, new_entity_id, EntityId, Timestamp};

// ---------------------------------------------------------------------------
// Raw shapes
// ---------------------------------------------------------------------------

/// An id as it may appear in legacy records.
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum RawId {
    Text(String),
    Number(i64),
}

impl RawId {
    fn into_id(self) -> Option<EntityId> {
        match self {
            Self::Text(s) if s.trim().is_empty() => None,
            Self::Text(s) => Some(s),
            Self::Number(n) => Some(n.to_string()),
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct RawCollaborator {
    #[serde(deserialize_with = "lenient")]
    pub id: Option<RawId>,
    #[serde(deserialize_with = "lenient")]
    pub name: Option<String>,
    #[serde(deserialize_with = "lenient")]
    pub role: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct RawAction {
    #[serde(deserialize_with = "lenient")]
    pub id: Option<RawId>,
    #[serde(deserialize_with = "lenient")]
    pub name: Option<String>,
    #[serde(deserialize_with = "lenient")]
    pub completed: Option<bool>,
    #[serde(rename = "wasAutoChecked", deserialize_with = "lenient")]
    pub was_auto_checked: Option<bool>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct RawAsset {
    #[serde(deserialize_with = "lenient")]
    pub id: Option<RawId>,
    #[serde(deserialize_with = "lenient")]
    pub name: Option<String>,
    #[serde(deserialize_with = "lenient")]
    pub status: Option<String>,
    #[serde(deserialize_with = "lenient")]
    pub is_completed: Option<bool>,
    #[serde(deserialize_with = "lenient_list")]
    pub actions: Option<Vec<RawAction>>,
    #[serde(rename = "type", deserialize_with = "lenient")]
    pub asset_type: Option<String>,
    #[serde(deserialize_with = "lenient")]
    pub illustration_type: Option<String>,
    #[serde(deserialize_with = "lenient")]
    pub collaborator: Option<RawCollaborator>,
    #[serde(deserialize_with = "lenient_list")]
    pub collaborators: Option<Vec<RawCollaborator>>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct RawProject {
    #[serde(deserialize_with = "lenient")]
    pub id: Option<RawId>,
    #[serde(deserialize_with = "lenient")]
    pub name: Option<String>,
    #[serde(deserialize_with = "lenient")]
    pub status: Option<String>,
    #[serde(deserialize_with = "lenient_list")]
    pub actionable_items: Option<Vec<RawAsset>>,
    #[serde(deserialize_with = "lenient")]
    pub completed_at: Option<String>,
    #[serde(deserialize_with = "lenient")]
    pub collaborator: Option<RawCollaborator>,
    #[serde(deserialize_with = "lenient_list")]
    pub collaborators: Option<Vec<RawCollaborator>>,
}

/// Read a field, treating a value of the wrong type as absent.
fn lenient<'de, D, T>(deserializer: D) -> Result<Option<T>, D::Error>
where
    D: Deserializer<'de>,
    T: DeserializeOwned,
{
    let value = serde_json::Value::deserialize(deserializer)?;
    if value.is_null() {
        return Ok(None);
    }
    match T::deserialize(value) {
        Ok(parsed) => Ok(Some(parsed)),
        Err(e) => {
            tracing::debug!(error = %e, "Ignoring malformed field");
            Ok(None)
        }
    }
}

/// Read a list field. A non-array is absent and malformed entries are
/// skipped.
fn lenient_list<'de, D, T>(deserializer: D) -> Result<Option<Vec<T>>, D::Error>
where
    D: Deserializer<'de>,
    T: DeserializeOwned,
{
    let serde_json::Value::Array(items) = serde_json::Value::deserialize(deserializer)? else {
        return Ok(None);
    };
    let parsed = items
        .into_iter()
        .filter_map(|item| match T::deserialize(item) {
            Ok(parsed) => Some(parsed),
            Err(e) => {
                tracing::debug!(error = %e, "Skipping malformed list entry");
                None
            }
        })
        .collect();
    Ok(Some(parsed))
}

// ---------------------------------------------------------------------------
// Normalization
// ---------------------------------------------------------------------------

/// Parse and normalize a project record from JSON.
pub fn normalize_project_json(
    value: serde_json::Value,
    config: &dyn StatusConfigProvider,
) -> Result<Project, CoreError> {
    let raw: RawProject = serde_json::from_value(value)
        .map_err(|e| CoreError::Validation(format!("Malformed project record: {e}")))?;
    normalize_project(raw, config)
}

/// Convert a raw project record to the canonical shape.
///
/// Only a missing project id is fatal; every other gap gets a
/// deterministic default.
pub fn normalize_project(
    raw: RawProject,
    config: &dyn StatusConfigProvider,
) -> Result<Project, CoreError> {
    let id = raw
        .id
        .and_then(RawId::into_id)
        .ok_or_else(|| CoreError::Validation("Project record has no id".to_string()))?;

    let status = non_blank(raw.status).unwrap_or_else(|| config.default_status_name());
    if config.find(&status).is_none() {
        tracing::warn!(project_id = %id, status = %status, "Project status not in configuration");
    }

    let actionable_items = raw
        .actionable_items
        .unwrap_or_default()
        .into_iter()
        .map(|a| normalize_asset(a, config))
        .collect();

    Ok(Project {
        completed_at: raw.completed_at.as_deref().and_then(parse_timestamp),
        collaborators: merge_collaborators(raw.collaborator, raw.collaborators),
        name: raw.name.unwrap_or_default(),
        id,
        status,
        actionable_items,
    })
}

/// Convert a raw asset record, reconciling `status` with `is_completed`.
pub fn normalize_asset(raw: RawAsset, config: &dyn StatusConfigProvider) -> Asset {
    let id = raw.id.and_then(RawId::into_id).unwrap_or_else(|| {
        let id = new_entity_id();
        tracing::warn!(asset_id = %id, "Asset record had no id, assigned a new one");
        id
    });

    let flagged_done = raw.is_completed.unwrap_or(false);
    let status = match non_blank(raw.status) {
        Some(s) if flagged_done || names_match(&s, STATUS_DONE) => STATUS_DONE.to_string(),
        Some(s) => s,
        None if flagged_done => STATUS_DONE.to_string(),
        None => config.default_status_name(),
    };

    Asset {
        is_completed: names_match(&status, STATUS_DONE),
        name: raw.name.unwrap_or_default(),
        actions: raw
            .actions
            .unwrap_or_default()
            .into_iter()
            .map(normalize_action)
            .collect(),
        asset_type: non_blank(raw.asset_type),
        illustration_type: non_blank(raw.illustration_type),
        collaborators: merge_collaborators(raw.collaborator, raw.collaborators),
        id,
        status,
    }
}

pub fn normalize_action(raw: RawAction) -> Action {
    let completed = raw.completed.unwrap_or(false);
    Action {
        id: raw.id.and_then(RawId::into_id).unwrap_or_else(new_entity_id),
        name: raw.name.unwrap_or_default(),
        completed,
        // The tag is meaningless on an incomplete action.
        was_auto_checked: raw.was_auto_checked.filter(|&tag| tag && completed),
    }
}

/// Merge the legacy single `collaborator` with the `collaborators` list,
/// deduplicating by id (first occurrence wins).
pub fn merge_collaborators(
    single: Option<RawCollaborator>,
    list: Option<Vec<RawCollaborator>>,
) -> Vec<Collaborator> {
    let mut merged: Vec<Collaborator> = Vec::new();
    for raw in single.into_iter().chain(list.unwrap_or_default()) {
        let Some(id) = raw.id.and_then(RawId::into_id) else {
            continue;
        };
        if merged.iter().any(|c| c.id == id) {
            continue;
        }
        merged.push(Collaborator {
            name: raw.name.unwrap_or_else(|| id.clone()),
            role: non_blank(raw.role),
            id,
        });
    }
    merged
}

fn parse_timestamp(s: &str) -> Option<Timestamp> {
    match DateTime::parse_from_rfc3339(s.trim()) {
        Ok(dt) => Some(dt.with_timezone(&Utc)),
        Err(e) => {
            tracing::debug!(value = %s, error = %e, "Ignoring unparseable completed_at");
            None
        }
    }
}

fn non_blank(s: Option<String>) -> Option<String> {
    s.map(|s| s.trim().to_string()).filter(|s| !s.is_empty())
}
