//! Runner Module
//!
//! Restart policy for the process that keeps the desktop alive: the desktop
//! is restarted whenever it crashes, and left alone when it exits on purpose
//! or finds no display to run on.

use std::process::ExitStatus;
use std::time::Duration;

/// The desktop quit cleanly
pub const EXIT_OK: i32 = 0;
/// The desktop hit an error
pub const EXIT_ERROR: i32 = 1;
/// No X server could be reached
pub const EXIT_NO_DISPLAY: i32 = 2;

/// Pause before starting the desktop again
pub const RESTART_DELAY: Duration = Duration::from_secs(1);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Next {
    Stop,
    Restart,
}

/// What to do after the desktop exited with `code`; `None` means it was
/// killed by a signal
pub fn next_step(code: Option<i32>) -> Next {
    match code {
        Some(EXIT_OK) | Some(EXIT_NO_DISPLAY) => Next::Stop,
        _ => Next::Restart,
    }
}

pub fn next_step_for(status: &ExitStatus) -> Next {
    next_step(status.code())
}

/// Human readable reason for an exit, for the log
pub fn describe(status: &ExitStatus) -> String {
    if let Some(code) = status.code() {
        return match code {
            EXIT_OK => "exited cleanly".to_string(),
            EXIT_NO_DISPLAY => "could not reach the X server".to_string(),
            code => format!("failed with status {}", code),
        };
    }
    #[cfg(unix)]
    {
        use std::os::unix::process::ExitStatusExt;
        if let Some(signal) = status.signal() {
            return format!("killed by signal {}", signal);
        }
    }
    "terminated".to_string()
}
