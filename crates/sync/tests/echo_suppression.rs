//! Optimistic sync through [`ProjectSession`]: echoes of our own writes are
//! ignored, independent changes are adopted, debounced edits coalesce and
//! teardown writes what is still pending.

mod common;

use std::time::Duration;

use tokio::time::Instant;
use worktrack_core::model::Project;
use worktrack_events::TrackerEvent;
use worktrack_sync::persistence::apply_update;
use worktrack_sync::{PersistRequest, ProjectSession};

use common::{action, asset, ids, project, session};

/// Apply writes to a remote copy and return the snapshot after each one.
fn replay(remote: &mut Project, requests: &[PersistRequest]) -> Vec<Project> {
    requests
        .iter()
        .map(|request| {
            apply_update(remote, request).expect("write should apply");
            remote.clone()
        })
        .collect()
}

fn adopted(session: &mut ProjectSession) -> Vec<String> {
    session
        .drain_events()
        .into_iter()
        .filter_map(|e| match e {
            TrackerEvent::ExternalAdopted { collection, .. } => Some(collection),
            _ => None,
        })
        .collect()
}

// ---------------------------------------------------------------------------
// Test: echo round trip
// ---------------------------------------------------------------------------

/// The echo of a toggle is not adopted and does not recompute anything.
#[test]
fn echo_of_toggle_is_ignored() {
    let initial = project(vec![asset(
        "Poster",
        vec![action("Draft", false), action("Print", false)],
    )]);
    let mut remote = initial.clone();
    let mut s = session(initial);
    let (asset_id, action_id) = ids(&s, 0, 0);

    let report = s
        .toggle_action(&asset_id, &action_id, true)
        .expect("toggle should succeed");
    let local = s.snapshot();
    s.drain_events();

    for echo in replay(&mut remote, &report.requests) {
        s.receive_external(echo);
    }

    assert_eq!(s.snapshot(), local);
    assert!(s.drain_events().is_empty());
    assert!(s.poll(Instant::now()).is_empty());
}

/// A late echo of an older write does not roll back a newer local edit.
#[test]
fn stale_echo_does_not_revert_newer_edit() {
    let initial = project(vec![asset(
        "Poster",
        vec![action("Draft", false), action("Print", false)],
    )]);
    let mut remote = initial.clone();
    let mut s = session(initial);

    let (asset_id, draft) = ids(&s, 0, 0);
    let first = s
        .toggle_action(&asset_id, &draft, true)
        .expect("toggle should succeed");
    let (_, print) = ids(&s, 0, 1);
    let second = s
        .toggle_action(&asset_id, &print, true)
        .expect("toggle should succeed");

    let early = replay(&mut remote, &first.requests);
    let late = replay(&mut remote, &second.requests);

    for echo in early {
        s.receive_external(echo);
    }
    assert!(s.assets()[0].actions[1].completed);

    for echo in late {
        s.receive_external(echo);
    }
    assert!(s.assets()[0].actions.iter().all(|a| a.completed));
    assert!(adopted(&mut s).is_empty());
}

/// Reordered but otherwise identical snapshots are not changes.
#[test]
fn reordered_snapshot_is_unchanged() {
    let initial = project(vec![
        asset("A", vec![action("Draft", false), action("Print", false)]),
        asset("B", vec![]),
    ]);
    let mut s = session(initial.clone());

    let mut reordered = initial;
    reordered.actionable_items.reverse();
    reordered.actionable_items[1].actions.reverse();
    s.receive_external(reordered);

    assert!(adopted(&mut s).is_empty());
    assert_eq!(s.assets()[0].name, "A");
}

/// The echo of one asset's write is recognised while another asset still
/// has an unwritten rename, and the rename goes out later.
#[test]
fn echo_is_recognised_with_unwritten_rename_elsewhere() {
    let initial = project(vec![
        asset("Poster", vec![action("Draft", false)]),
        asset("Flyer", vec![action("Draft", false), action("Print", false)]),
    ]);
    let mut remote = initial.clone();
    let mut s = session(initial);

    let (poster, poster_draft) = ids(&s, 0, 0);
    let renamed = s
        .rename_action(&poster, &poster_draft, "Sketch")
        .expect("rename should succeed");
    assert!(renamed.is_empty());

    let (flyer, flyer_draft) = ids(&s, 1, 0);
    let report = s
        .toggle_action(&flyer, &flyer_draft, true)
        .expect("toggle should succeed");
    s.drain_events();

    for echo in replay(&mut remote, &report.requests) {
        s.receive_external(echo);
    }
    assert!(adopted(&mut s).is_empty());
    assert_eq!(s.assets()[0].actions[0].name, "Sketch");

    let released = s.poll(Instant::now() + Duration::from_secs(1));
    for echo in replay(&mut remote, &released) {
        s.receive_external(echo);
    }
    assert!(adopted(&mut s).is_empty());
    assert_eq!(remote.actionable_items[0].actions[0].name, "Sketch");
    assert_eq!(remote, s.snapshot());
}

// ---------------------------------------------------------------------------
// Test: explicit status
// ---------------------------------------------------------------------------

/// Picking the status a batched derived change already shows still gets it
/// written.
#[test]
fn explicit_status_matching_batched_change_is_written() {
    let initial = project(vec![asset(
        "Poster",
        vec![action("Draft", false), action("Print", false)],
    )]);
    let mut remote = initial.clone();
    let mut s = session(initial);
    let (asset_id, action_id) = ids(&s, 0, 0);

    let report = s
        .toggle_action(&asset_id, &action_id, true)
        .expect("toggle should succeed");
    replay(&mut remote, &report.requests);
    assert_eq!(s.header().status, "In Progress");
    assert_eq!(remote.status, "Not Started");

    let requests = s
        .set_project_status("In Progress")
        .expect("status should be accepted");
    assert_eq!(requests.len(), 1);
    replay(&mut remote, &requests);
    replay(&mut remote, &s.poll(Instant::now() + Duration::from_secs(5)));
    replay(&mut remote, &s.teardown());

    assert_eq!(remote.status, "In Progress");
}

/// An explicit status that differs drops the batched change.
#[test]
fn explicit_status_supersedes_batched_change() {
    let initial = project(vec![asset(
        "Poster",
        vec![action("Draft", false), action("Print", false)],
    )]);
    let mut remote = initial.clone();
    let mut s = session(initial);
    let (asset_id, action_id) = ids(&s, 0, 0);

    let report = s
        .toggle_action(&asset_id, &action_id, true)
        .expect("toggle should succeed");
    replay(&mut remote, &report.requests);

    let requests = s
        .set_project_status("On Hold")
        .expect("status should be accepted");
    replay(&mut remote, &requests);
    assert!(s.poll(Instant::now() + Duration::from_secs(5)).is_empty());
    assert_eq!(remote.status, "On Hold");
}

// ---------------------------------------------------------------------------
// Test: independent changes
// ---------------------------------------------------------------------------

/// A change made elsewhere replaces local state.
#[test]
fn independent_change_is_adopted() {
    let initial = project(vec![asset("Poster", vec![action("Draft", false)])]);
    let mut s = session(initial.clone());

    let mut remote = initial;
    remote.name = "Summer campaign".into();
    remote.actionable_items[0].actions[0].completed = true;
    s.receive_external(remote);

    assert_eq!(s.header().name, "Summer campaign");
    assert!(s.assets()[0].actions[0].completed);
    let collections = adopted(&mut s);
    assert!(collections.contains(&"header".to_string()));
    assert!(collections.contains(&"actions".to_string()));
}

/// Adopting an independent change drops a pending debounced edit.
#[test]
fn independent_change_cancels_pending_debounce() {
    let initial = project(vec![asset("Poster", vec![]), asset("Flyer", vec![])]);
    let mut s = session(initial.clone());
    let flyer = s.assets()[1].id.clone();
    s.rename_asset(&flyer, "Leaflet").expect("rename should succeed");

    let mut remote = initial;
    remote.actionable_items.remove(0);
    s.receive_external(remote);

    assert_eq!(s.assets().len(), 1);
    assert_eq!(s.assets()[0].name, "Flyer");
    assert!(s
        .poll(Instant::now() + Duration::from_secs(1))
        .is_empty());
}

/// Assets added elsewhere get their own action tracking.
#[test]
fn adopted_assets_are_editable() {
    let initial = project(vec![asset("Poster", vec![])]);
    let mut s = session(initial.clone());

    let mut remote = initial;
    remote
        .actionable_items
        .push(asset("Banner", vec![action("Draft", false)]));
    s.receive_external(remote);

    let (banner, draft) = ids(&s, 1, 0);
    let report = s
        .toggle_action(&banner, &draft, true)
        .expect("toggle should succeed");
    assert!(report.asset_completed);
}

// ---------------------------------------------------------------------------
// Test: debounce and teardown
// ---------------------------------------------------------------------------

/// Several renames within the quiet window produce a single write carrying
/// the last value.
#[test]
fn debounced_renames_coalesce() {
    let mut s = session(project(vec![asset("Poster", vec![])]));
    let asset_id = s.assets()[0].id.clone();

    for name in ["P", "Po", "Poster v2"] {
        let requests = s.rename_asset(&asset_id, name).expect("rename should succeed");
        assert!(requests.is_empty());
    }

    let deadline = s.next_deadline().expect("a write should be scheduled");
    let released = s.poll(deadline);
    assert_eq!(released.len(), 1);
    let assets = released[0]
        .update
        .actionable_items
        .as_ref()
        .expect("asset list should be written");
    assert_eq!(assets[0].name, "Poster v2");
    assert!(s.poll(deadline + Duration::from_secs(1)).is_empty());
}

/// A structural edit flushes a pending text edit along with it.
#[test]
fn immediate_edit_flushes_pending_debounce() {
    let mut s = session(project(vec![asset("Poster", vec![])]));
    let asset_id = s.assets()[0].id.clone();

    s.rename_asset(&asset_id, "Poster v2")
        .expect("rename should succeed");
    let (_, requests) = s
        .add_asset("Flyer", None, None)
        .expect("add should succeed");

    assert_eq!(requests.len(), 1);
    let assets = requests[0]
        .update
        .actionable_items
        .as_ref()
        .expect("asset list should be written");
    assert_eq!(assets[0].name, "Poster v2");
    assert_eq!(s.next_deadline(), None);
}

/// Leaving the session writes pending debounced edits once.
#[test]
fn teardown_flushes_pending_edits() {
    let initial = project(vec![asset("Poster", vec![action("Draft", false)])]);
    let mut remote = initial.clone();
    let mut s = session(initial);
    let (asset_id, action_id) = ids(&s, 0, 0);

    s.rename_action(&asset_id, &action_id, "Sketch")
        .expect("rename should succeed");
    let requests = s.teardown();
    replay(&mut remote, &requests);

    assert_eq!(remote.actionable_items[0].actions[0].name, "Sketch");
    assert!(s.teardown().is_empty());
}
