//! Short delay and deduplication for derived status writes.
//!
//! Rapid toggles can make the derived status flip several times within a
//! fraction of a second. Derived changes are applied locally right away but
//! their persistence waits for a short delay; a newer decision for the same
//! entity replaces the older one, and an identical decision is dropped.

use std::collections::HashMap;
use std::time::Duration;

use tokio::time::Instant;
use worktrack_core::types::{normalize_name, EntityId};

/// Identity of a derived status change.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct StatusChangeKey {
    pub entity_id: EntityId,
    pub progress: Option<u8>,
    pub status: String,
}

impl StatusChangeKey {
    pub fn new(entity_id: impl Into<EntityId>, progress: Option<u8>, status: &str) -> Self {
        Self {
            entity_id: entity_id.into(),
            progress,
            status: normalize_name(status),
        }
    }
}

#[derive(Debug, Clone)]
struct Scheduled {
    key: StatusChangeKey,
    deadline: Instant,
}

#[derive(Debug, Clone)]
pub struct StatusChangeBatcher {
    delay: Duration,
    pending: HashMap<EntityId, Scheduled>,
    applied: HashMap<EntityId, StatusChangeKey>,
}

impl StatusChangeBatcher {
    pub fn new(delay: Duration) -> Self {
        Self {
            delay,
            pending: HashMap::new(),
            applied: HashMap::new(),
        }
    }

    /// Schedule a change. Returns `false` if it was a duplicate of the
    /// pending or last applied change for the entity.
    pub fn submit(&mut self, key: StatusChangeKey, now: Instant) -> bool {
        if self.pending.get(&key.entity_id).is_some_and(|s| s.key == key) {
            return false;
        }
        if !self.pending.contains_key(&key.entity_id)
            && self.applied.get(&key.entity_id) == Some(&key)
        {
            return false;
        }

        tracing::debug!(
            entity_id = %key.entity_id,
            status = %key.status,
            progress = ?key.progress,
            "Status change scheduled"
        );
        self.pending.insert(
            key.entity_id.clone(),
            Scheduled {
                key,
                deadline: now + self.delay,
            },
        );
        true
    }

    /// Drop a scheduled change, e.g. because an explicit status superseded it.
    pub fn cancel(&mut self, entity_id: &str) -> Option<StatusChangeKey> {
        self.applied.remove(entity_id);
        self.pending.remove(entity_id).map(|s| s.key)
    }

    /// Record a change as persisted outside the batcher.
    pub fn mark_applied(&mut self, key: StatusChangeKey) {
        self.pending.remove(&key.entity_id);
        self.applied.insert(key.entity_id.clone(), key);
    }

    pub fn is_pending(&self, entity_id: &str) -> bool {
        self.pending.contains_key(entity_id)
    }

    pub fn has_pending(&self) -> bool {
        !self.pending.is_empty()
    }

    pub fn next_deadline(&self) -> Option<Instant> {
        self.pending.values().map(|s| s.deadline).min()
    }

    /// Remove and return every change whose delay has elapsed.
    pub fn due(&mut self, now: Instant) -> Vec<StatusChangeKey> {
        let ready: Vec<EntityId> = self
            .pending
            .iter()
            .filter(|(_, s)| s.deadline <= now)
            .map(|(id, _)| id.clone())
            .collect();
        self.take(ready)
    }

    /// Remove and return every pending change regardless of its deadline.
    pub fn drain_all(&mut self) -> Vec<StatusChangeKey> {
        let all: Vec<EntityId> = self.pending.keys().cloned().collect();
        self.take(all)
    }

    fn take(&mut self, ids: Vec<EntityId>) -> Vec<StatusChangeKey> {
        let mut keys: Vec<StatusChangeKey> = ids
            .into_iter()
            .filter_map(|id| self.pending.remove(&id))
            .map(|s| s.key)
            .collect();
        keys.sort_by(|a, b| a.entity_id.cmp(&b.entity_id));
        for key in &keys {
            self.applied.insert(key.entity_id.clone(), key.clone());
        }
        keys
    }
}
