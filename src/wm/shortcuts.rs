//! Shortcuts Module
//!
//! Keyboard shortcut actions and their configuration names.

use std::process::Command;
use tracing::{debug, info, warn};

use crate::config::ShortcutConfig;

/// Keyboard shortcut action
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Shortcut {
    /// Close the focused window
    CloseWindow,
    /// Maximize the focused window, or restore it
    ToggleMaximize,
    /// Minimize the focused window
    Minimize,
    /// Focus the least recently used window
    FocusNext,
    /// Step back to the window focused before the current one
    FocusPrevious,
    /// Stop the window manager
    Quit,
    /// Run a shell command
    Spawn(String),
}

impl Shortcut {
    /// Map a configured action name to a shortcut
    pub fn from_config(config: &ShortcutConfig) -> Option<Self> {
        let shortcut = match config.action.as_str() {
            "close_window" => Self::CloseWindow,
            "toggle_maximize" => Self::ToggleMaximize,
            "minimize" => Self::Minimize,
            "focus_next" => Self::FocusNext,
            "focus_previous" => Self::FocusPrevious,
            "quit" => Self::Quit,
            "spawn" => match config.command.as_deref().map(str::trim) {
                Some(cmd) if !cmd.is_empty() => Self::Spawn(cmd.to_string()),
                _ => {
                    warn!("Shortcut {} spawns nothing; set command", config.binding);
                    return None;
                }
            },
            other => {
                warn!("Unknown shortcut action '{}' for {}", other, config.binding);
                return None;
            }
        };
        Some(shortcut)
    }

    /// Whether the action works on the focused window
    pub fn needs_focus(&self) -> bool {
        matches!(self, Self::CloseWindow | Self::ToggleMaximize | Self::Minimize)
    }
}

/// Launch `command` through the shell without waiting for it
///
/// The child is reaped from a detached thread once it exits.
pub fn spawn(command: &str) {
    info!("Launching: {}", command);
    let mut child = match Command::new("sh").arg("-c").arg(command).spawn() {
        Ok(child) => child,
        Err(e) => {
            warn!("Failed to launch {}: {}", command, e);
            return;
        }
    };
    let command = command.to_string();
    let reaper = std::thread::Builder::new()
        .name("fynedesk-reaper".into())
        .spawn(move || match child.wait() {
            Ok(status) if !status.success() => debug!("{} exited with {}", command, status),
            Ok(_) => {}
            Err(e) => warn!("Failed to wait for {}: {}", command, e),
        });
    if let Err(e) = reaper {
        warn!("Failed to start reaper thread: {}", e);
    }
}
