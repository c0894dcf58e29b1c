//! ICCCM Module
//!
//! Reading and writing the ICCCM client properties: WM_PROTOCOLS, WM_HINTS,
//! WM_NORMAL_HINTS, WM_STATE, WM_NAME, WM_CLASS and WM_TRANSIENT_FOR, plus
//! the WM_DELETE_WINDOW and WM_TAKE_FOCUS protocol messages.

use tracing::debug;
use x11rb::protocol::xproto::{EventMask, Window};

use crate::error::{Error, Result};
use crate::x::{Property, XConn};

/// Fetch a property by name; `None` when it is not set
pub fn property(conn: &XConn, window: Window, name: &str) -> Result<Option<Property>> {
    conn.server().get_property(window, conn.atom(name)?)
}

/// Fetch a format 32 property as a list of values
pub fn u32s(conn: &XConn, window: Window, name: &str) -> Result<Option<Vec<u32>>> {
    let Some(prop) = property(conn, window, name)? else {
        return Ok(None);
    };
    prop.as_u32s().map(Some).ok_or_else(|| Error::BadProperty {
        window,
        property: name.to_string(),
    })
}

/// Fetch a list of atoms and resolve their names
pub fn atom_names(conn: &XConn, window: Window, name: &str) -> Result<Vec<String>> {
    u32s(conn, window, name)?
        .unwrap_or_default()
        .into_iter()
        .map(|atom| conn.atom_name(atom))
        .collect()
}

/// Replace a list-of-atoms property
pub fn set_atoms(conn: &XConn, window: Window, name: &str, values: &[&str]) -> Result<()> {
    let atoms = values
        .iter()
        .map(|v| conn.atom(v))
        .collect::<Result<Vec<_>>>()?;
    let type_ = conn.atom("ATOM")?;
    conn.server()
        .change_property(window, conn.atom(name)?, &Property::from_u32s(type_, &atoms))
}

pub fn set_u32s(conn: &XConn, window: Window, name: &str, type_name: &str, values: &[u32]) -> Result<()> {
    let type_ = conn.atom(type_name)?;
    conn.server()
        .change_property(window, conn.atom(name)?, &Property::from_u32s(type_, values))
}

/// Names of the WM_PROTOCOLS a client takes part in
pub fn wm_protocols(conn: &XConn, window: Window) -> Result<Vec<String>> {
    atom_names(conn, window, "WM_PROTOCOLS")
}

pub fn supports_protocol(conn: &XConn, window: Window, protocol: &str) -> Result<bool> {
    Ok(wm_protocols(conn, window)?.iter().any(|p| p == protocol))
}

/// Send a WM_PROTOCOLS client message such as WM_DELETE_WINDOW
pub fn send_protocol(conn: &XConn, window: Window, protocol: &str) -> Result<()> {
    let data = [conn.atom(protocol)?, conn.time(), 0, 0, 0];
    debug!("Sending {} to 0x{:x}", protocol, window);
    conn.server().send_client_message(
        window,
        window,
        conn.atom("WM_PROTOCOLS")?,
        data,
        EventMask::NO_EVENT,
    )
}

pub fn delete_window(conn: &XConn, window: Window) -> Result<()> {
    send_protocol(conn, window, "WM_DELETE_WINDOW")
}

pub fn take_focus(conn: &XConn, window: Window) -> Result<()> {
    send_protocol(conn, window, "WM_TAKE_FOCUS")
}

const INPUT_HINT: u32 = 1 << 0;
const STATE_HINT: u32 = 1 << 1;
const URGENCY_HINT: u32 = 1 << 8;

/// WM_HINTS
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct WmHints {
    pub flags: u32,
    pub input: bool,
    pub initial_state: u32,
    pub icon_pixmap: u32,
    pub icon_window: u32,
    pub icon_x: i32,
    pub icon_y: i32,
    pub icon_mask: u32,
    pub window_group: u32,
}

impl WmHints {
    /// Decode from the raw values; short properties from old clients are
    /// zero padded
    pub fn from_values(values: &[u32]) -> Self {
        let mut v = [0u32; 9];
        for (dst, src) in v.iter_mut().zip(values) {
            *dst = *src;
        }
        Self {
            flags: v[0],
            input: v[1] != 0,
            initial_state: v[2],
            icon_pixmap: v[3],
            icon_window: v[4],
            icon_x: v[5] as i32,
            icon_y: v[6] as i32,
            icon_mask: v[7],
            window_group: v[8],
        }
    }

    /// Whether the window manager should set input focus on the client;
    /// a client that does not say is assumed to want it
    pub fn accepts_input(&self) -> bool {
        self.flags & INPUT_HINT == 0 || self.input
    }

    pub fn is_urgent(&self) -> bool {
        self.flags & URGENCY_HINT != 0
    }

    pub fn starts_iconic(&self) -> bool {
        self.flags & STATE_HINT != 0 && self.initial_state == WmState::Iconic as u32
    }
}

pub fn wm_hints(conn: &XConn, window: Window) -> Result<Option<WmHints>> {
    Ok(u32s(conn, window, "WM_HINTS")?.map(|v| WmHints::from_values(&v)))
}

const P_MIN_SIZE: u32 = 1 << 4;
const P_MAX_SIZE: u32 = 1 << 5;
const P_RESIZE_INC: u32 = 1 << 6;
const P_BASE_SIZE: u32 = 1 << 8;

/// WM_NORMAL_HINTS
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SizeHints {
    pub flags: u32,
    pub x: i32,
    pub y: i32,
    pub width: i32,
    pub height: i32,
    pub min_width: i32,
    pub min_height: i32,
    pub max_width: i32,
    pub max_height: i32,
    pub width_inc: i32,
    pub height_inc: i32,
    pub min_aspect_num: i32,
    pub min_aspect_den: i32,
    pub max_aspect_num: i32,
    pub max_aspect_den: i32,
    pub base_width: i32,
    pub base_height: i32,
    pub win_gravity: u32,
}

impl SizeHints {
    /// Decode from the raw values; pre-ICCCM clients send only 15
    pub fn from_values(values: &[u32]) -> Self {
        let mut v = [0u32; 18];
        for (dst, src) in v.iter_mut().zip(values) {
            *dst = *src;
        }
        let i = |n: usize| v[n] as i32;
        Self {
            flags: v[0],
            x: i(1),
            y: i(2),
            width: i(3),
            height: i(4),
            min_width: i(5),
            min_height: i(6),
            max_width: i(7),
            max_height: i(8),
            width_inc: i(9),
            height_inc: i(10),
            min_aspect_num: i(11),
            min_aspect_den: i(12),
            max_aspect_num: i(13),
            max_aspect_den: i(14),
            base_width: i(15),
            base_height: i(16),
            win_gravity: v[17],
        }
    }

    /// Apply min/max size and resize increments to a requested client size
    pub fn constrain(&self, width: i32, height: i32) -> (i32, i32) {
        let (mut w, mut h) = (width, height);
        if self.flags & P_MIN_SIZE != 0 {
            w = w.max(self.min_width);
            h = h.max(self.min_height);
        }
        if self.flags & P_MAX_SIZE != 0 {
            if self.max_width > 0 {
                w = w.min(self.max_width);
            }
            if self.max_height > 0 {
                h = h.min(self.max_height);
            }
        }
        if self.flags & P_RESIZE_INC != 0 {
            let (base_w, base_h) = if self.flags & P_BASE_SIZE != 0 {
                (self.base_width, self.base_height)
            } else if self.flags & P_MIN_SIZE != 0 {
                (self.min_width, self.min_height)
            } else {
                (0, 0)
            };
            if self.width_inc > 1 && w > base_w {
                w = base_w + (w - base_w) / self.width_inc * self.width_inc;
            }
            if self.height_inc > 1 && h > base_h {
                h = base_h + (h - base_h) / self.height_inc * self.height_inc;
            }
        }
        (w.max(1), h.max(1))
    }
}

pub fn wm_normal_hints(conn: &XConn, window: Window) -> Result<Option<SizeHints>> {
    Ok(u32s(conn, window, "WM_NORMAL_HINTS")?.map(|v| SizeHints::from_values(&v)))
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WmState {
    Withdrawn = 0,
    Normal = 1,
    Iconic = 3,
}

pub fn wm_state(conn: &XConn, window: Window) -> Result<Option<WmState>> {
    let state = u32s(conn, window, "WM_STATE")?.and_then(|v| v.first().copied());
    Ok(match state {
        Some(0) => Some(WmState::Withdrawn),
        Some(1) => Some(WmState::Normal),
        Some(3) => Some(WmState::Iconic),
        _ => None,
    })
}

pub fn set_wm_state(conn: &XConn, window: Window, state: WmState) -> Result<()> {
    set_u32s(conn, window, "WM_STATE", "WM_STATE", &[state as u32, x11rb::NONE])
}

/// WM_NAME, decoded leniently
pub fn wm_name(conn: &XConn, window: Window) -> Result<Option<String>> {
    Ok(property(conn, window, "WM_NAME")?
        .map(|p| p.as_string())
        .filter(|s| !s.is_empty()))
}

/// WM_CLASS as (instance, class)
pub fn wm_class(conn: &XConn, window: Window) -> Result<Option<(String, String)>> {
    let Some(prop) = property(conn, window, "WM_CLASS")? else {
        return Ok(None);
    };
    let mut parts = prop.as_strings().into_iter();
    Ok(match (parts.next(), parts.next()) {
        (Some(instance), Some(class)) => Some((instance, class)),
        (Some(instance), None) => Some((instance.clone(), instance)),
        _ => None,
    })
}

pub fn wm_transient_for(conn: &XConn, window: Window) -> Result<Option<Window>> {
    Ok(u32s(conn, window, "WM_TRANSIENT_FOR")?
        .and_then(|v| v.first().copied())
        .filter(|w| *w != x11rb::NONE))
}
