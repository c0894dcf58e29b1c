//! FyneDesk window-management core
//!
//! An X11 event dispatcher with key and mouse binding registries, window and
//! screen geometry helpers, and the window manager built on them.

pub mod config;
pub mod error;
pub mod rect;
pub mod runner;
pub mod wm;
pub mod x;

pub use error::{Error, Result};
