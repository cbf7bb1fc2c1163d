//! Per-collection sync state machine.
//!
//! ```text
//!            local Immediate                 flush
//!   Clean ─────────────────────▶ PendingImmediate ─────▶ Clean
//!     │                                ▲
//!     │ local Debounced                │ local Immediate
//!     ▼                                │
//!   PendingDebounced{deadline} ────────┘
//!     │   ▲  local Debounced (deadline reset)
//!     │   └──┘
//!     ├── timer fire / teardown ──▶ flush ──▶ Clean
//!     └── foreign external snapshot ──▶ Clean (pending edit dropped)
//! ```
//!
//! Every flush records the written fingerprint as an outstanding echo. An
//! external snapshot matching one of them is recognised as the round trip
//! of our own write and is not adopted.

use std::collections::VecDeque;
use std::time::Duration;

use tokio::time::Instant;

use crate::config::MAX_OUTSTANDING_ECHOES;

/// How urgently a local mutation must be persisted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MutationKind {
    /// Structural changes and anything derived state depends on.
    Immediate,
    /// Cosmetic edits such as free-text titles.
    Debounced,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncState {
    Clean,
    PendingImmediate,
    PendingDebounced { deadline: Instant },
}

/// What the owner of a track should do after a local mutation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncDirective {
    FlushNow,
    FlushAt(Instant),
}

/// Classification of an externally delivered snapshot.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExternalVerdict {
    /// Structurally identical to the last external snapshot.
    Unchanged,
    /// The round trip of one of our own writes; local state is kept.
    Echo,
    /// An independent change; local state must adopt it.
    Foreign,
}

#[derive(Debug, Clone)]
pub struct SyncTrack<F> {
    state: SyncState,
    debounce: Duration,
    last_external: F,
    outstanding: VecDeque<F>,
}

impl<F: Clone + Eq> SyncTrack<F> {
    /// Start clean, with `baseline` as the last known persisted snapshot.
    pub fn new(baseline: F, debounce: Duration) -> Self {
        Self {
            state: SyncState::Clean,
            debounce,
            last_external: baseline,
            outstanding: VecDeque::new(),
        }
    }

    pub fn state(&self) -> SyncState {
        self.state
    }

    pub fn has_pending(&self) -> bool {
        self.state != SyncState::Clean
    }

    /// Deadline of a pending debounced write.
    pub fn deadline(&self) -> Option<Instant> {
        match self.state {
            SyncState::PendingDebounced { deadline } => Some(deadline),
            _ => None,
        }
    }

    /// Register a local mutation.
    pub fn on_local_mutation(&mut self, kind: MutationKind, now: Instant) -> SyncDirective {
        match (kind, self.state) {
            (MutationKind::Immediate, _)
            | (MutationKind::Debounced, SyncState::PendingImmediate) => {
                self.state = SyncState::PendingImmediate;
                SyncDirective::FlushNow
            }
            (MutationKind::Debounced, _) => {
                let deadline = now + self.debounce;
                self.state = SyncState::PendingDebounced { deadline };
                SyncDirective::FlushAt(deadline)
            }
        }
    }

    /// Whether a pending write should be flushed at `now`.
    pub fn is_due(&self, now: Instant) -> bool {
        match self.state {
            SyncState::Clean => false,
            SyncState::PendingImmediate => true,
            SyncState::PendingDebounced { deadline } => deadline <= now,
        }
    }

    /// Record that `written` is being persisted; returns to `Clean`.
    pub fn record_flush(&mut self, written: F) {
        self.state = SyncState::Clean;
        self.expect_echo(written);
    }

    /// Remember `written` as an outstanding echo without touching the state.
    pub fn expect_echo(&mut self, written: F) {
        if self.outstanding.back() == Some(&written) {
            return;
        }
        if self.outstanding.len() == MAX_OUTSTANDING_ECHOES {
            self.outstanding.pop_front();
        }
        self.outstanding.push_back(written);
    }

    pub fn outstanding_echoes(&self) -> usize {
        self.outstanding.len()
    }

    /// Classify an external snapshot and update the external baseline.
    pub fn observe_external(&mut self, incoming: F) -> ExternalVerdict {
        if incoming == self.last_external {
            return ExternalVerdict::Unchanged;
        }

        let verdict = match self.outstanding.iter().position(|f| *f == incoming) {
            Some(index) => {
                // Older writes were superseded by this one.
                self.outstanding.drain(..=index);
                ExternalVerdict::Echo
            }
            None => {
                self.outstanding.clear();
                self.state = SyncState::Clean;
                ExternalVerdict::Foreign
            }
        };
        self.last_external = incoming;
        verdict
    }

    /// Leave the editing context. Returns `true` if a write was pending and
    /// must be flushed by the caller now.
    pub fn teardown(&mut self) -> bool {
        let pending = self.has_pending();
        self.state = SyncState::Clean;
        pending
    }
}
