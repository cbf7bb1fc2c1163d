//! Timing and behaviour knobs for the sync layer.
//!
//! | Variable                     | Default | Description                                   |
//! |------------------------------|---------|-----------------------------------------------|
//! | `WORKTRACK_DEBOUNCE_MS`      | `300`   | Quiet window before a text edit is persisted  |
//! | `WORKTRACK_STATUS_BATCH_MS`  | `175`   | Delay before a derived status change is written |
//! | `WORKTRACK_FOCUS_DELAY_MS`   | `250`   | Pause before focus moves to the next asset    |
//! | `WORKTRACK_AUTO_CHECK_ABOVE` | `false` | Checking an action also checks earlier ones   |
//! | `WORKTRACK_RESPECT_MANUAL_ASSET_STATUS` | `false` | Asset recompute leaves manual statuses alone |

use std::time::Duration;

/// Default quiet window for debounced writes.
pub const DEFAULT_DEBOUNCE_MS: u64 = 300;

/// Default batching delay for derived status changes.
pub const DEFAULT_STATUS_BATCH_MS: u64 = 175;

/// Default pause before auto-advancing focus.
pub const DEFAULT_FOCUS_DELAY_MS: u64 = 250;

/// Maximum number of written snapshots remembered while awaiting their echo.
pub const MAX_OUTSTANDING_ECHOES: usize = 16;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SyncConfig {
    pub debounce: Duration,
    pub status_batch_delay: Duration,
    pub focus_advance_delay: Duration,
    pub auto_check_above: bool,
    pub respect_manual_asset_status: bool,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            debounce: Duration::from_millis(DEFAULT_DEBOUNCE_MS),
            status_batch_delay: Duration::from_millis(DEFAULT_STATUS_BATCH_MS),
            focus_advance_delay: Duration::from_millis(DEFAULT_FOCUS_DELAY_MS),
            auto_check_above: false,
            respect_manual_asset_status: false,
        }
    }
}

impl SyncConfig {
    /// Read the configuration from the process environment.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Read the configuration through an arbitrary key lookup.
    ///
    /// Unparseable values are logged and replaced by their default.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let defaults = Self::default();
        Self {
            debounce: millis(&lookup, "WORKTRACK_DEBOUNCE_MS").unwrap_or(defaults.debounce),
            status_batch_delay: millis(&lookup, "WORKTRACK_STATUS_BATCH_MS")
                .unwrap_or(defaults.status_batch_delay),
            focus_advance_delay: millis(&lookup, "WORKTRACK_FOCUS_DELAY_MS")
                .unwrap_or(defaults.focus_advance_delay),
            auto_check_above: flag(&lookup, "WORKTRACK_AUTO_CHECK_ABOVE")
                .unwrap_or(defaults.auto_check_above),
            respect_manual_asset_status: flag(&lookup, "WORKTRACK_RESPECT_MANUAL_ASSET_STATUS")
                .unwrap_or(defaults.respect_manual_asset_status),
        }
    }
}

fn millis(lookup: &impl Fn(&str) -> Option<String>, key: &str) -> Option<Duration> {
    let raw = lookup(key)?;
    match raw.trim().parse::<u64>() {
        Ok(ms) => Some(Duration::from_millis(ms)),
        Err(_) => {
            tracing::warn!(key, value = %raw, "Ignoring invalid millisecond value");
            None
        }
    }
}

fn flag(lookup: &impl Fn(&str) -> Option<String>, key: &str) -> Option<bool> {
    let raw = lookup(key)?;
    match raw.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => {
            tracing::warn!(key, value = %raw, "Ignoring invalid boolean value");
            None
        }
    }
}
