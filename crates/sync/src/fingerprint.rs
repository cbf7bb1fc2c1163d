//! Structural equality for externally delivered collections.
//!
//! A fingerprint keeps identity, scalar fields and nested action
//! `(id, name, completed)` triples, sorted by id, so that a pure reordering
//! is not mistaken for a change.

use worktrack_core::model::{Action, Asset, Collaborator};
use worktrack_core::types::{normalize_name, EntityId};

/// A value that can be compared structurally with an external snapshot.
pub trait Fingerprint {
    type Print: Clone + Eq + std::fmt::Debug + Send;

    fn fingerprint(&self) -> Self::Print;
}

#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
pub struct ActionPrint {
    pub id: EntityId,
    pub name: String,
    pub completed: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
pub struct CollaboratorPrint {
    pub id: EntityId,
    pub name: String,
    pub role: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
pub struct AssetPrint {
    pub id: EntityId,
    pub name: String,
    /// Status compared loosely ("done" and "Done" are the same).
    pub status: String,
    pub is_completed: bool,
    pub asset_type: Option<String>,
    pub illustration_type: Option<String>,
    pub actions: Vec<ActionPrint>,
    pub collaborators: Vec<CollaboratorPrint>,
}

fn sorted<T: Ord>(mut items: Vec<T>) -> Vec<T> {
    items.sort();
    items
}

impl Fingerprint for Action {
    type Print = ActionPrint;

    fn fingerprint(&self) -> ActionPrint {
        ActionPrint {
            id: self.id.clone(),
            name: self.name.clone(),
            completed: self.completed,
        }
    }
}

impl Fingerprint for Collaborator {
    type Print = CollaboratorPrint;

    fn fingerprint(&self) -> CollaboratorPrint {
        CollaboratorPrint {
            id: self.id.clone(),
            name: self.name.clone(),
            role: self.role.clone(),
        }
    }
}

impl Fingerprint for Asset {
    type Print = AssetPrint;

    fn fingerprint(&self) -> AssetPrint {
        AssetPrint {
            id: self.id.clone(),
            name: self.name.clone(),
            status: normalize_name(&self.status),
            is_completed: self.is_completed,
            asset_type: self.asset_type.clone(),
            illustration_type: self.illustration_type.clone(),
            actions: self.actions.fingerprint(),
            collaborators: self.collaborators.fingerprint(),
        }
    }
}

impl<T: Fingerprint> Fingerprint for Vec<T>
where
    T::Print: Ord,
{
    type Print = Vec<T::Print>;

    fn fingerprint(&self) -> Vec<T::Print> {
        sorted(self.iter().map(Fingerprint::fingerprint).collect())
    }
}
