//! Completion percentages for assets and projects.
//!
//! Pure functions, safe to call on every recompute.

use serde::Serialize;

use crate::model::{Action, Asset};

/// Completion percentage of an action list, 0 when the list is empty.
pub fn asset_progress(actions: &[Action]) -> u8 {
    if actions.is_empty() {
        return 0;
    }
    let completed = actions.iter().filter(|a| a.completed).count();
    percentage(completed, actions.len())
}

/// Unweighted mean of [`asset_progress`] over assets that have actions.
///
/// Returns `None` when no asset has any action: progress is undefined rather
/// than zero, so adding an empty asset never drags the figure down.
pub fn project_progress(assets: &[Asset]) -> Option<u8> {
    let tracked: Vec<u8> = assets
        .iter()
        .filter(|a| !a.actions.is_empty())
        .map(|a| asset_progress(&a.actions))
        .collect();

    if tracked.is_empty() {
        return None;
    }

    let sum: u32 = tracked.iter().map(|&p| u32::from(p)).sum();
    let mean = (f64::from(sum) / tracked.len() as f64).round() as u8;
    let all_done = tracked.iter().all(|&p| p == 100);
    let any_started = tracked.iter().any(|&p| p > 0);
    Some(clamp_rounded(mean, any_started, all_done))
}

/// Number of actions across every asset.
pub fn total_action_count(assets: &[Asset]) -> usize {
    assets.iter().map(|a| a.actions.len()).sum()
}

/// Number of completed actions across every asset.
pub fn completed_action_count(assets: &[Asset]) -> usize {
    assets
        .iter()
        .flat_map(|a| a.actions.iter())
        .filter(|a| a.completed)
        .count()
}

/// Rounded percentage that is 0 only when nothing is done and 100 only
/// when everything is.
fn percentage(part: usize, total: usize) -> u8 {
    let pct = (part as f64 / total as f64 * 100.0).round() as u8;
    clamp_rounded(pct, part > 0, part >= total)
}

fn clamp_rounded(pct: u8, any_done: bool, all_done: bool) -> u8 {
    match (any_done, all_done) {
        (_, true) => 100,
        (false, false) => 0,
        (true, false) => pct.clamp(1, 99),
    }
}

/// Aggregate counts for a project.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ProgressSummary {
    pub progress: Option<u8>,
    pub total_assets: usize,
    pub completed_assets: usize,
    pub total_actions: usize,
    pub completed_actions: usize,
}

impl ProgressSummary {
    pub fn of(assets: &[Asset]) -> Self {
        Self {
            progress: project_progress(assets),
            total_assets: assets.len(),
            completed_assets: assets.iter().filter(|a| a.counts_as_completed()).count(),
            total_actions: total_action_count(assets),
            completed_actions: completed_action_count(assets),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn actions(states: &[bool]) -> Vec<Action> {
        states
            .iter()
            .enumerate()
            .map(|(i, &done)| {
                let mut a = Action::new(format!("step {i}"));
                a.completed = done;
                a
            })
            .collect()
    }

    fn asset(states: &[bool]) -> Asset {
        let mut asset = Asset::new("asset");
        asset.actions = actions(states);
        asset
    }

    #[test]
    fn empty_action_list_is_zero() {
        assert_eq!(asset_progress(&[]), 0);
    }

    #[test]
    fn asset_progress_rounds() {
        assert_eq!(asset_progress(&actions(&[true, false, false])), 33);
        assert_eq!(asset_progress(&actions(&[true, true, false])), 67);
        assert_eq!(asset_progress(&actions(&[true, true])), 100);
    }

    #[test]
    fn asset_progress_stays_in_bounds() {
        for n in 1..12 {
            for done in 0..=n {
                let states: Vec<bool> = (0..n).map(|i| i < done).collect();
                let p = asset_progress(&actions(&states));
                assert!(p <= 100);
                if done == 0 {
                    assert_eq!(p, 0);
                }
                if done == n {
                    assert_eq!(p, 100);
                }
            }
        }
    }

    #[test]
    fn rounding_never_reaches_the_bounds_early() {
        let mut nearly: Vec<bool> = vec![true; 199];
        nearly.push(false);
        assert_eq!(asset_progress(&actions(&nearly)), 99);

        let mut barely = vec![false; 299];
        barely.push(true);
        assert_eq!(asset_progress(&actions(&barely)), 1);

        // 100 and 99 average to 99.5.
        let assets = vec![asset(&[true]), asset(&nearly)];
        assert_eq!(project_progress(&assets), Some(99));
    }

    #[test]
    fn project_without_actions_has_no_progress() {
        assert_eq!(project_progress(&[]), None);
        assert_eq!(project_progress(&[asset(&[]), asset(&[])]), None);
    }

    #[test]
    fn empty_assets_are_excluded_from_the_average() {
        let assets = vec![asset(&[true, true]), asset(&[])];
        assert_eq!(project_progress(&assets), Some(100));
    }

    #[test]
    fn project_progress_is_unweighted() {
        // 1/1 and 0/3 average to 50, not 25.
        let assets = vec![asset(&[true]), asset(&[false, false, false])];
        assert_eq!(project_progress(&assets), Some(50));
    }

    #[test]
    fn summary_counts_everything() {
        let mut done = asset(&[true]);
        done.is_completed = true;
        let summary = ProgressSummary::of(&[done, asset(&[false, true]), asset(&[])]);
        assert_eq!(summary.total_assets, 3);
        assert_eq!(summary.completed_assets, 1);
        assert_eq!(summary.total_actions, 3);
        assert_eq!(summary.completed_actions, 2);
        assert_eq!(summary.progress, Some(75));
    }
}
