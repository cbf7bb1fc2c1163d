//! Optimistic local state for one editable collection.

use std::time::Duration;

use tokio::time::Instant;
use worktrack_core::error::CoreError;

use crate::fingerprint::Fingerprint;
use crate::machine::{ExternalVerdict, MutationKind, SyncDirective, SyncState, SyncTrack};

/// Local copy of a collection, mutated synchronously, plus the state
/// machine deciding when it is persisted.
#[derive(Debug, Clone)]
pub struct OptimisticStore<T: Fingerprint> {
    local: T,
    /// What the remote holds as far as this store knows: the last value
    /// written or adopted.
    written: T,
    track: SyncTrack<T::Print>,
}

impl<T: Fingerprint + Clone + PartialEq> OptimisticStore<T> {
    pub fn new(initial: T, debounce: Duration) -> Self {
        let baseline = initial.fingerprint();
        Self {
            written: initial.clone(),
            local: initial,
            track: SyncTrack::new(baseline, debounce),
        }
    }

    pub fn local(&self) -> &T {
        &self.local
    }

    pub fn written(&self) -> &T {
        &self.written
    }

    pub fn state(&self) -> SyncState {
        self.track.state()
    }

    pub fn has_pending(&self) -> bool {
        self.track.has_pending()
    }

    pub fn deadline(&self) -> Option<Instant> {
        self.track.deadline()
    }

    /// Apply a user mutation to a draft of the local state.
    ///
    /// The draft replaces local state only if `f` succeeds and actually
    /// changed something; otherwise nothing is registered and the returned
    /// directive is `None`.
    pub fn mutate<R>(
        &mut self,
        kind: MutationKind,
        now: Instant,
        f: impl FnOnce(&mut T) -> Result<R, CoreError>,
    ) -> Result<(R, Option<SyncDirective>), CoreError> {
        let mut draft = self.local.clone();
        let result = f(&mut draft)?;
        if draft == self.local {
            return Ok((result, None));
        }
        self.local = draft;
        Ok((result, Some(self.track.on_local_mutation(kind, now))))
    }

    /// Change local state as a consequence of a write tracked elsewhere
    /// (e.g. a nested list persisted through its own record).
    pub fn edit_untracked<R>(&mut self, f: impl FnOnce(&mut T) -> R) -> R {
        f(&mut self.local)
    }

    /// Snapshot local state for persistence and mark it written.
    pub fn flush(&mut self) -> T {
        self.track.record_flush(self.local.fingerprint());
        self.written = self.local.clone();
        self.local.clone()
    }

    /// Flush if a pending write is due at `now`.
    pub fn poll(&mut self, now: Instant) -> Option<T> {
        self.track.is_due(now).then(|| self.flush())
    }

    /// Expect the current local state to come back as an echo of a write
    /// issued through another record.
    pub fn expect_echo_of_local(&mut self) {
        self.track.expect_echo(self.local.fingerprint());
        self.written = self.local.clone();
    }

    /// Expect `value` to come back as an echo of a write issued through
    /// another record, when that write does not carry all of local state.
    pub fn expect_echo_of(&mut self, value: T) {
        self.track.expect_echo(value.fingerprint());
        self.written = value;
    }

    /// Compare an external snapshot and adopt it if it is foreign.
    pub fn receive_external(&mut self, incoming: T) -> ExternalVerdict {
        let verdict = self.track.observe_external(incoming.fingerprint());
        if verdict == ExternalVerdict::Foreign {
            self.written = incoming.clone();
            self.local = incoming;
        }
        verdict
    }

    /// Leave the editing context, returning a snapshot if a write was
    /// still pending.
    pub fn teardown(&mut self) -> Option<T> {
        if self.track.teardown() {
            Some(self.flush())
        } else {
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use assert_matches::assert_matches;
    use worktrack_core::model::Collaborator;

    use super::*;

    fn collaborator(id: &str) -> Collaborator {
        Collaborator {
            id: id.into(),
            name: id.to_uppercase(),
            role: None,
        }
    }

    fn store() -> OptimisticStore<Vec<Collaborator>> {
        OptimisticStore::new(vec![collaborator("a")], Duration::from_millis(300))
    }

    #[test]
    fn mutation_is_visible_immediately() {
        let mut s = store();
        let (_, directive) = s
            .mutate(MutationKind::Immediate, Instant::now(), |list| {
                list.push(collaborator("b"));
                Ok(())
            })
            .expect("mutation should succeed");
        assert_eq!(directive, Some(SyncDirective::FlushNow));
        assert_eq!(s.local().len(), 2);
    }

    #[test]
    fn no_op_mutation_registers_nothing() {
        let mut s = store();
        let (_, directive) = s
            .mutate(MutationKind::Immediate, Instant::now(), |list| {
                list.retain(|c| c.id != "missing");
                Ok(())
            })
            .expect("mutation should succeed");
        assert_eq!(directive, None);
        assert!(!s.has_pending());
    }

    #[test]
    fn failed_mutation_registers_nothing() {
        let mut s = store();
        let result: Result<((), _), _> = s.mutate(MutationKind::Immediate, Instant::now(), |list| {
            list.push(collaborator("b"));
            Err(CoreError::Validation("nope".into()))
        });
        assert!(result.is_err());
        assert_eq!(s.state(), SyncState::Clean);
        assert_eq!(s.local().len(), 1);
    }

    #[test]
    fn round_trip_echo_keeps_local_state() {
        let mut s = store();
        s.mutate(MutationKind::Immediate, Instant::now(), |list| {
            list.push(collaborator("b"));
            Ok(())
        })
        .expect("mutation should succeed");
        let written = s.flush();

        // A newer local edit lands before the echo arrives.
        s.mutate(MutationKind::Immediate, Instant::now(), |list| {
            list.push(collaborator("c"));
            Ok(())
        })
        .expect("mutation should succeed");

        assert_matches!(s.receive_external(written), ExternalVerdict::Echo);
        assert_eq!(s.local().len(), 3);
    }

    #[test]
    fn written_lags_local_until_flush() {
        let mut s = store();
        s.mutate(MutationKind::Debounced, Instant::now(), |list| {
            list[0].name = "Renamed".into();
            Ok(())
        })
        .expect("mutation should succeed");
        assert_eq!(s.written()[0].name, "A");

        s.flush();
        assert_eq!(s.written()[0].name, "Renamed");
    }

    #[test]
    fn echo_of_partial_write_is_recognised() {
        let mut s = store();
        s.edit_untracked(|list| list.push(collaborator("b")));
        let partial = vec![collaborator("a"), collaborator("c")];
        s.expect_echo_of(partial.clone());

        assert_matches!(s.receive_external(partial), ExternalVerdict::Echo);
        assert_eq!(s.local().len(), 2);
        assert_eq!(s.local()[1].id, "b");
    }

    #[test]
    fn foreign_snapshot_replaces_local_state() {
        let mut s = store();
        let verdict = s.receive_external(vec![collaborator("z")]);
        assert_matches!(verdict, ExternalVerdict::Foreign);
        assert_eq!(s.local()[0].id, "z");
    }

    #[test]
    fn poll_flushes_only_when_due() {
        let mut s = store();
        let start = Instant::now();
        s.mutate(MutationKind::Debounced, start, |list| {
            list[0].name = "Renamed".into();
            Ok(())
        })
        .expect("mutation should succeed");
        assert!(s.poll(start + Duration::from_millis(100)).is_none());
        let flushed = s.poll(start + Duration::from_millis(300)).expect("write should be due");
        assert_eq!(flushed[0].name, "Renamed");
        assert_eq!(s.state(), SyncState::Clean);
    }

    #[test]
    fn teardown_flushes_pending_debounce() {
        let mut s = store();
        s.mutate(MutationKind::Debounced, Instant::now(), |list| {
            list[0].name = "Renamed".into();
            Ok(())
        })
        .expect("mutation should succeed");
        assert!(s.teardown().is_some());
        assert!(s.teardown().is_none());
    }
}
