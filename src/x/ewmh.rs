//! EWMH Module
//!
//! Root window properties the window manager publishes, the per-client
//! `_NET_WM_*` properties it reads, and the client messages that ask a
//! window manager to act.

use tracing::debug;
use x11rb::protocol::xproto::{EventMask, Window};

use crate::error::Result;
use crate::rect::{Rect, Strut};
use crate::x::icccm::{self, atom_names, set_atoms, set_u32s, u32s};
use crate::x::{Property, XConn};

/// Hints this window manager understands, published in `_NET_SUPPORTED`
pub const SUPPORTED: &[&str] = &[
    "_NET_SUPPORTED",
    "_NET_SUPPORTING_WM_CHECK",
    "_NET_WM_NAME",
    "_NET_CLIENT_LIST",
    "_NET_CLIENT_LIST_STACKING",
    "_NET_ACTIVE_WINDOW",
    "_NET_WORKAREA",
    "_NET_CLOSE_WINDOW",
    "_NET_FRAME_EXTENTS",
    "_NET_WM_WINDOW_TYPE",
    "_NET_WM_WINDOW_TYPE_DOCK",
    "_NET_WM_STATE",
    "_NET_WM_STATE_HIDDEN",
    "_NET_WM_STATE_MAXIMIZED_VERT",
    "_NET_WM_STATE_MAXIMIZED_HORZ",
    "_NET_WM_STATE_DEMANDS_ATTENTION",
    "_NET_WM_STRUT",
    "_NET_WM_STRUT_PARTIAL",
];

pub const STATE_HIDDEN: &str = "_NET_WM_STATE_HIDDEN";
pub const STATE_MAXIMIZED_VERT: &str = "_NET_WM_STATE_MAXIMIZED_VERT";
pub const STATE_MAXIMIZED_HORZ: &str = "_NET_WM_STATE_MAXIMIZED_HORZ";
pub const STATE_DEMANDS_ATTENTION: &str = "_NET_WM_STATE_DEMANDS_ATTENTION";

pub const TYPE_DOCK: &str = "_NET_WM_WINDOW_TYPE_DOCK";
pub const TYPE_DESKTOP: &str = "_NET_WM_WINDOW_TYPE_DESKTOP";

fn client_message_mask() -> EventMask {
    EventMask::SUBSTRUCTURE_NOTIFY | EventMask::SUBSTRUCTURE_REDIRECT
}

pub fn set_supported(conn: &XConn, names: &[&str]) -> Result<()> {
    set_atoms(conn, conn.root(), "_NET_SUPPORTED", names)
}

/// Point both the root and `check` at `check`, marking a compliant WM
pub fn set_supporting_wm_check(conn: &XConn, check: Window) -> Result<()> {
    set_u32s(conn, conn.root(), "_NET_SUPPORTING_WM_CHECK", "WINDOW", &[check])?;
    set_u32s(conn, check, "_NET_SUPPORTING_WM_CHECK", "WINDOW", &[check])
}

pub fn set_wm_name(conn: &XConn, window: Window, name: &str) -> Result<()> {
    let type_ = conn.atom("UTF8_STRING")?;
    conn.server().change_property(
        window,
        conn.atom("_NET_WM_NAME")?,
        &Property::from_bytes(type_, name.as_bytes()),
    )
}

pub fn wm_name(conn: &XConn, window: Window) -> Result<Option<String>> {
    Ok(icccm::property(conn, window, "_NET_WM_NAME")?
        .map(|p| p.as_string())
        .filter(|s| !s.is_empty()))
}

/// Best title for a window: `_NET_WM_NAME`, falling back to `WM_NAME`
pub fn title(conn: &XConn, window: Window) -> Result<String> {
    if let Some(name) = wm_name(conn, window)? {
        return Ok(name);
    }
    Ok(icccm::wm_name(conn, window)?.unwrap_or_default())
}

pub fn set_client_list(conn: &XConn, windows: &[Window]) -> Result<()> {
    set_u32s(conn, conn.root(), "_NET_CLIENT_LIST", "WINDOW", windows)
}

pub fn set_client_list_stacking(conn: &XConn, windows: &[Window]) -> Result<()> {
    set_u32s(conn, conn.root(), "_NET_CLIENT_LIST_STACKING", "WINDOW", windows)
}

pub fn set_active_window(conn: &XConn, window: Window) -> Result<()> {
    set_u32s(conn, conn.root(), "_NET_ACTIVE_WINDOW", "WINDOW", &[window])
}

pub fn active_window(conn: &XConn) -> Result<Option<Window>> {
    Ok(u32s(conn, conn.root(), "_NET_ACTIVE_WINDOW")?
        .and_then(|v| v.first().copied())
        .filter(|w| *w != x11rb::NONE))
}

/// Publish one workarea per desktop; there is a single desktop
pub fn set_workarea(conn: &XConn, area: Rect) -> Result<()> {
    let values = [area.x as u32, area.y as u32, area.width as u32, area.height as u32];
    set_u32s(conn, conn.root(), "_NET_WORKAREA", "CARDINAL", &values)
}

/// Border widths a frame adds: left, right, top, bottom
pub fn set_frame_extents(conn: &XConn, window: Window, extents: [u32; 4]) -> Result<()> {
    set_u32s(conn, window, "_NET_FRAME_EXTENTS", "CARDINAL", &extents)
}

pub fn window_types(conn: &XConn, window: Window) -> Result<Vec<String>> {
    atom_names(conn, window, "_NET_WM_WINDOW_TYPE")
}

pub fn is_dock(conn: &XConn, window: Window) -> Result<bool> {
    Ok(window_types(conn, window)?
        .iter()
        .any(|t| t == TYPE_DOCK || t == TYPE_DESKTOP))
}

pub fn wm_state(conn: &XConn, window: Window) -> Result<Vec<String>> {
    atom_names(conn, window, "_NET_WM_STATE")
}

pub fn set_wm_state(conn: &XConn, window: Window, states: &[String]) -> Result<()> {
    let names: Vec<&str> = states.iter().map(String::as_str).collect();
    set_atoms(conn, window, "_NET_WM_STATE", &names)
}

/// `_NET_WM_STATE` client message action
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StateAction {
    Remove = 0,
    Add = 1,
    Toggle = 2,
}

impl StateAction {
    pub fn from_u32(v: u32) -> Option<Self> {
        match v {
            0 => Some(Self::Remove),
            1 => Some(Self::Add),
            2 => Some(Self::Toggle),
            _ => None,
        }
    }
}

/// Apply `action` for `state` to a state list; returns whether it changed
pub fn apply_state(states: &mut Vec<String>, action: StateAction, state: &str) -> bool {
    let present = states.iter().any(|s| s == state);
    let add = match action {
        StateAction::Add => true,
        StateAction::Remove => false,
        StateAction::Toggle => !present,
    };
    if add && !present {
        states.push(state.to_string());
        true
    } else if !add && present {
        states.retain(|s| s != state);
        true
    } else {
        false
    }
}

/// Add or remove a single state on a window we manage directly
pub fn update_state(conn: &XConn, window: Window, action: StateAction, state: &str) -> Result<()> {
    let mut states = wm_state(conn, window)?;
    if apply_state(&mut states, action, state) {
        set_wm_state(conn, window, &states)?;
    }
    Ok(())
}

fn send_root_message(conn: &XConn, window: Window, name: &str, data: [u32; 5]) -> Result<()> {
    debug!("Sending {} for 0x{:x}", name, window);
    conn.server().send_client_message(
        conn.root(),
        window,
        conn.atom(name)?,
        data,
        client_message_mask(),
    )
}

/// Ask the window manager to change up to two states of `window`
pub fn request_state(
    conn: &XConn,
    window: Window,
    action: StateAction,
    first: &str,
    second: Option<&str>,
) -> Result<()> {
    let second = match second {
        Some(s) => conn.atom(s)?,
        None => x11rb::NONE,
    };
    let data = [action as u32, conn.atom(first)?, second, 2, 0];
    send_root_message(conn, window, "_NET_WM_STATE", data)
}

pub fn request_close(conn: &XConn, window: Window) -> Result<()> {
    send_root_message(conn, window, "_NET_CLOSE_WINDOW", [conn.time(), 2, 0, 0, 0])
}

pub fn request_active(conn: &XConn, window: Window) -> Result<()> {
    send_root_message(conn, window, "_NET_ACTIVE_WINDOW", [2, conn.time(), 0, 0, 0])
}

/// Strut reserved by a panel or dock
///
/// `_NET_WM_STRUT_PARTIAL` wins; a legacy `_NET_WM_STRUT` is taken to span
/// the whole screen edge.
pub fn strut(conn: &XConn, window: Window) -> Result<Option<Strut>> {
    if let Some(v) = u32s(conn, window, "_NET_WM_STRUT_PARTIAL")? {
        if v.len() >= 12 {
            return Ok(Some(Strut {
                left: v[0],
                right: v[1],
                top: v[2],
                bottom: v[3],
                left_start_y: v[4],
                left_end_y: v[5],
                right_start_y: v[6],
                right_end_y: v[7],
                top_start_x: v[8],
                top_end_x: v[9],
                bottom_start_x: v[10],
                bottom_end_x: v[11],
            }));
        }
    }
    let Some(v) = u32s(conn, window, "_NET_WM_STRUT")? else {
        return Ok(None);
    };
    if v.len() < 4 {
        return Ok(None);
    }
    let (width, height) = conn.screen_size();
    let (w, h) = (width as u32, height as u32);
    Ok(Some(Strut {
        left: v[0],
        right: v[1],
        top: v[2],
        bottom: v[3],
        left_start_y: 0,
        left_end_y: h,
        right_start_y: 0,
        right_end_y: h,
        top_start_x: 0,
        top_end_x: w,
        bottom_start_x: 0,
        bottom_end_x: w,
    }))
}
