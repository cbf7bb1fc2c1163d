//! `worktrack-replay` -- run a scripted editing session through the sync
//! engine and print the resulting project as JSON.
//!
//! Usage: `worktrack-replay <fixture.json>`
//!
//! # Environment variables
//!
//! | Variable                     | Default | Description                                   |
//! |------------------------------|---------|-----------------------------------------------|
//! | `WORKTRACK_DEBOUNCE_MS`      | `300`   | Quiet window before a text edit is persisted  |
//! | `WORKTRACK_STATUS_BATCH_MS`  | `175`   | Delay before a derived status change is written |
//! | `WORKTRACK_FOCUS_DELAY_MS`   | `250`   | Pause before focus moves to the next asset    |
//! | `WORKTRACK_AUTO_CHECK_ABOVE` | `false` | Checking an action also checks earlier ones   |
//! | `WORKTRACK_RESPECT_MANUAL_ASSET_STATUS` | `false` | Asset recompute leaves manual statuses alone |

use std::path::PathBuf;

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use worktrack_replay::{load_fixture, replay};
use worktrack_sync::SyncConfig;

#[tokio::main]
async fn main() {
    dotenvy::dotenv().ok();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "worktrack_replay=info,worktrack_sync=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let path: PathBuf = std::env::args_os().nth(1).map(PathBuf::from).unwrap_or_else(|| {
        tracing::error!("Usage: worktrack-replay <fixture.json>");
        std::process::exit(2);
    });

    let fixture = load_fixture(&path).unwrap_or_else(|e| {
        tracing::error!(path = %path.display(), error = %e, "Failed to load fixture");
        std::process::exit(1);
    });

    let settings = SyncConfig::from_env();
    tracing::info!(?settings, "Starting worktrack-replay");

    let report = replay(fixture, settings).await.unwrap_or_else(|e| {
        tracing::error!(error = %e, "Replay failed");
        std::process::exit(1);
    });

    match serde_json::to_string_pretty(&report) {
        Ok(json) => println!("{json}"),
        Err(e) => {
            tracing::error!(error = %e, "Failed to serialize report");
            std::process::exit(1);
        }
    }
}
