//! FyneDesk
//!
//! Starts the window manager on the current X display and runs its event
//! loop until it is told to quit or receives SIGTERM/SIGINT.

use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;

use anyhow::{Context, Result};
use tracing::{error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use fynedesk::config::Config;
use fynedesk::runner::{EXIT_ERROR, EXIT_NO_DISPLAY};
use fynedesk::wm::WindowManager;
use fynedesk::x::server::X11rbServer;
use fynedesk::x::XConn;

/// `--config PATH` or `--config=PATH`
fn config_arg() -> Option<PathBuf> {
    let mut args = std::env::args().skip(1);
    while let Some(arg) = args.next() {
        if arg == "--config" {
            return args.next().map(PathBuf::from);
        }
        if let Some(path) = arg.strip_prefix("--config=") {
            return Some(PathBuf::from(path));
        }
    }
    None
}

fn load_config() -> Result<Config> {
    match config_arg() {
        Some(path) => Config::load_from(&path),
        None => Config::load(),
    }
}

async fn run(server: X11rbServer, config: Config) -> Result<()> {
    let conn = Arc::new(XConn::new(server).context("Failed to set up the X connection")?);
    let wm = WindowManager::start(&conn, config).context("Failed to start the window manager")?;

    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};
        let mut sigterm = signal(SignalKind::terminate())?;
        let mut sigint = signal(SignalKind::interrupt())?;
        let (conn, wm) = (conn.clone(), wm.clone());
        tokio::spawn(async move {
            tokio::select! {
                _ = sigterm.recv() => info!("Received SIGTERM, shutting down gracefully"),
                _ = sigint.recv() => info!("Received SIGINT, shutting down gracefully"),
            }
            if let Err(e) = wm.request_stop(&conn) {
                warn!("Failed to wake the event loop: {}", e);
            }
        });
    }

    // The dispatcher blocks on the X connection; keep it off the runtime
    let dispatcher = conn.clone();
    let result = tokio::task::spawn_blocking(move || dispatcher.run())
        .await
        .context("Event loop thread panicked")?;

    if let Err(e) = wm.shutdown(&conn) {
        warn!("Failed to release windows: {}", e);
    }
    result.context("Event loop failed")
}

#[tokio::main]
async fn main() -> ExitCode {
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG").unwrap_or_else(|_| "fynedesk=debug,info".into()),
        ))
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!("Starting FyneDesk");

    let config = match load_config() {
        Ok(config) => config,
        Err(e) => {
            error!("{:#}", e);
            return ExitCode::from(EXIT_ERROR as u8);
        }
    };

    let server = match X11rbServer::connect(None) {
        Ok(server) => server,
        Err(e) => {
            error!("X server unavailable: {}", e);
            return ExitCode::from(EXIT_NO_DISPLAY as u8);
        }
    };

    match run(server, config).await {
        Ok(()) => {
            info!("FyneDesk exited");
            ExitCode::SUCCESS
        }
        Err(e) => {
            error!("{:#}", e);
            ExitCode::from(EXIT_ERROR as u8)
        }
    }
}
