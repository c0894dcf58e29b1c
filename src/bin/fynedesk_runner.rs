//! FyneDesk runner
//!
//! Keeps the desktop running: starts `fynedesk` (or the binary named by the
//! first argument) and starts it again whenever it crashes.

use std::path::PathBuf;

use anyhow::{Context, Result};
use tokio::process::Command;
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use fynedesk::runner::{describe, next_step_for, Next, RESTART_DELAY};

/// The desktop binary: the first argument, else `fynedesk` next to this
/// executable, else `fynedesk` from PATH
fn desktop_binary() -> PathBuf {
    if let Some(path) = std::env::args_os().nth(1) {
        return PathBuf::from(path);
    }
    let sibling = std::env::current_exe()
        .ok()
        .and_then(|exe| exe.parent().map(|dir| dir.join("fynedesk")));
    match sibling {
        Some(path) if path.exists() => path,
        _ => PathBuf::from("fynedesk"),
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG").unwrap_or_else(|_| "fynedesk=debug,info".into()),
        ))
        .with(tracing_subscriber::fmt::layer())
        .init();

    let binary = desktop_binary();
    loop {
        info!("Launching {:?}", binary);
        let status = Command::new(&binary)
            .status()
            .await
            .with_context(|| format!("Failed to spawn {:?}", binary))?;

        match next_step_for(&status) {
            Next::Stop => {
                info!("Desktop {}; runner exiting", describe(&status));
                return Ok(());
            }
            Next::Restart => {
                warn!("Desktop {}; restarting", describe(&status));
                tokio::time::sleep(RESTART_DELAY).await;
            }
        }
    }
}
