//! X Module
//!
//! The protocol binding layer and everything built directly on it: event
//! dispatch, key and mouse bindings, the window wrapper, head geometry and
//! the ICCCM/EWMH/Motif property helpers.
//!
//! All wire traffic goes through the [`XServer`] trait. [`server::X11rbServer`]
//! implements it over x11rb; tests use an in-crate fake.

pub mod conn;
pub mod event;
pub mod ewmh;
pub mod grabs;
pub mod heads;
pub mod icccm;
pub mod keybind;
pub mod keymap;
pub mod keysym;
pub mod motif;
pub mod mousebind;
pub mod server;
pub mod window;

#[cfg(test)]
pub(crate) mod testing;

use x11rb::protocol::xproto::{Atom, Cursor, EventMask, StackMode, Timestamp, Window};
use x11rb::protocol::Event;

use crate::error::Result;
use crate::rect::Rect;

pub use conn::XConn;
pub use event::EventKind;
pub use window::XWindow;

/// Raw keyboard mapping as returned by GetKeyboardMapping
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct KeyboardMapping {
    pub min_keycode: u8,
    pub max_keycode: u8,
    pub keysyms_per_keycode: u8,
    pub keysyms: Vec<u32>,
}

/// Raw modifier mapping as returned by GetModifierMapping
///
/// Eight rows (shift, lock, control, mod1..mod5) of `keycodes_per_modifier`
/// keycodes each; zero entries are unused.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ModifierMapping {
    pub keycodes_per_modifier: u8,
    pub keycodes: Vec<u8>,
}

/// Result of a QueryTree request
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Tree {
    pub root: Window,
    pub parent: Window,
    pub children: Vec<Window>,
}

/// The subset of GetWindowAttributes the window manager cares about
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct WindowAttributes {
    pub override_redirect: bool,
    pub viewable: bool,
}

/// A property value in its raw wire form
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Property {
    pub type_: Atom,
    pub format: u8,
    pub value: Vec<u8>,
}

impl Property {
    pub fn from_u32s(type_: Atom, data: &[u32]) -> Self {
        Self {
            type_,
            format: 32,
            value: data.iter().flat_map(|v| v.to_ne_bytes()).collect(),
        }
    }

    pub fn from_bytes(type_: Atom, data: &[u8]) -> Self {
        Self {
            type_,
            format: 8,
            value: data.to_vec(),
        }
    }

    /// The value as 32-bit items, or `None` if this is not a format 32 property
    pub fn as_u32s(&self) -> Option<Vec<u32>> {
        if self.format != 32 {
            return None;
        }
        Some(
            self.value
                .chunks_exact(4)
                .map(|c| u32::from_ne_bytes([c[0], c[1], c[2], c[3]]))
                .collect(),
        )
    }

    pub fn as_string(&self) -> String {
        let end = self.value.iter().position(|&b| b == 0).unwrap_or(self.value.len());
        String::from_utf8_lossy(&self.value[..end]).into_owned()
    }

    /// NUL separated list of strings, as used by WM_CLASS
    pub fn as_strings(&self) -> Vec<String> {
        self.value
            .split(|&b| b == 0)
            .filter(|s| !s.is_empty())
            .map(|s| String::from_utf8_lossy(s).into_owned())
            .collect()
    }
}

/// A ConfigureWindow request
///
/// Only fields that are `Some` are sent, and only those are recorded into a
/// window's cached geometry.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct WindowChanges {
    pub x: Option<i32>,
    pub y: Option<i32>,
    pub width: Option<u32>,
    pub height: Option<u32>,
    pub border_width: Option<u32>,
    pub sibling: Option<Window>,
    pub stack_mode: Option<StackMode>,
}

impl WindowChanges {
    pub fn position(x: i32, y: i32) -> Self {
        Self {
            x: Some(x),
            y: Some(y),
            ..Default::default()
        }
    }

    pub fn size(width: u32, height: u32) -> Self {
        Self {
            width: Some(width),
            height: Some(height),
            ..Default::default()
        }
    }

    pub fn rect(r: Rect) -> Self {
        Self {
            x: Some(r.x),
            y: Some(r.y),
            width: Some(r.width.max(1) as u32),
            height: Some(r.height.max(1) as u32),
            ..Default::default()
        }
    }

    pub fn stack(mode: StackMode) -> Self {
        Self {
            stack_mode: Some(mode),
            ..Default::default()
        }
    }
}

/// The wire protocol seam
///
/// Every request the core makes goes through this trait. Grab and
/// event-mask requests are checked so their errors come back synchronously;
/// everything else may report errors asynchronously as [`Event::Error`].
pub trait XServer: Send + Sync {
    /// Root window of the default screen
    fn root(&self) -> Window;

    /// Size of the whole virtual screen
    fn screen_size(&self) -> (u16, u16);

    fn intern_atom(&self, name: &str) -> Result<Atom>;
    fn atom_name(&self, atom: Atom) -> Result<String>;

    fn keyboard_mapping(&self) -> Result<KeyboardMapping>;
    fn modifier_mapping(&self) -> Result<ModifierMapping>;

    fn grab_key(&self, window: Window, modifiers: u16, keycode: u8) -> Result<()>;
    fn ungrab_key(&self, window: Window, modifiers: u16, keycode: u8) -> Result<()>;
    fn grab_button(&self, window: Window, modifiers: u16, button: u8) -> Result<()>;
    fn ungrab_button(&self, window: Window, modifiers: u16, button: u8) -> Result<()>;

    /// Actively grab the pointer; `Ok(false)` means the server refused
    fn grab_pointer(&self, window: Window, confine_to: Window, cursor: Cursor) -> Result<bool>;
    fn ungrab_pointer(&self) -> Result<()>;

    fn query_tree(&self, window: Window) -> Result<Tree>;
    fn geometry(&self, window: Window) -> Result<Rect>;
    fn window_attributes(&self, window: Window) -> Result<WindowAttributes>;

    fn create_window(&self, parent: Window, rect: Rect, event_mask: EventMask) -> Result<Window>;
    fn destroy_window(&self, window: Window) -> Result<()>;
    fn configure_window(&self, window: Window, changes: &WindowChanges) -> Result<()>;
    fn map_window(&self, window: Window) -> Result<()>;
    fn unmap_window(&self, window: Window) -> Result<()>;
    fn reparent_window(&self, window: Window, parent: Window, x: i32, y: i32) -> Result<()>;
    fn select_input(&self, window: Window, event_mask: EventMask) -> Result<()>;
    fn set_input_focus(&self, window: Window, time: Timestamp) -> Result<()>;
    fn kill_client(&self, window: Window) -> Result<()>;

    fn get_property(&self, window: Window, property: Atom) -> Result<Option<Property>>;
    fn change_property(&self, window: Window, property: Atom, value: &Property) -> Result<()>;
    fn delete_property(&self, window: Window, property: Atom) -> Result<()>;

    /// Send a format 32 ClientMessage about `window` to `destination`
    fn send_client_message(
        &self,
        destination: Window,
        window: Window,
        type_: Atom,
        data: [u32; 5],
        event_mask: EventMask,
    ) -> Result<()>;

    /// Xinerama screens, or `None` when Xinerama is not active
    fn xinerama_screens(&self) -> Result<Option<Vec<Rect>>>;

    fn poll_for_event(&self) -> Result<Option<Event>>;
    fn wait_for_event(&self) -> Result<Event>;

    /// Round trip so every event the server has sent so far is readable
    fn sync(&self) -> Result<()>;
    fn flush(&self) -> Result<()>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_property_u32_decoding() {
        let prop = Property::from_u32s(6, &[1, 2, 0xffff_ffff]);
        assert_eq!(prop.as_u32s(), Some(vec![1, 2, 0xffff_ffff]));
        assert_eq!(Property::from_bytes(31, b"abc").as_u32s(), None);
    }

    #[test]
    fn test_property_strings() {
        let prop = Property::from_bytes(31, b"xterm\0XTerm\0");
        assert_eq!(prop.as_strings(), vec!["xterm", "XTerm"]);
        assert_eq!(prop.as_string(), "xterm");
    }

    #[test]
    fn test_window_changes_rect_clamps_size() {
        let ch = WindowChanges::rect(Rect::new(1, 2, 0, -5));
        assert_eq!(ch.width, Some(1));
        assert_eq!(ch.height, Some(1));
        assert_eq!(ch.x, Some(1));
        assert!(ch.stack_mode.is_none());
    }
}
