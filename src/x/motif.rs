//! Motif Hints
//!
//! `_MOTIF_WM_HINTS` is five 32-bit fields: flags, functions, decorations,
//! input mode and status. Legacy toolkits still use it to ask for no
//! decorations.

use bitflags::bitflags;
use x11rb::protocol::xproto::Window;

use crate::error::Result;
use crate::x::icccm::u32s;
use crate::x::XConn;

bitflags! {
    /// Which of the other fields are meaningful
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
    pub struct MotifFlags: u32 {
        const FUNCTIONS   = 1 << 0;
        const DECORATIONS = 1 << 1;
        const INPUT_MODE  = 1 << 2;
        const STATUS      = 1 << 3;
    }
}

bitflags! {
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
    pub struct MotifFunctions: u32 {
        const ALL      = 1 << 0;
        const RESIZE   = 1 << 1;
        const MOVE     = 1 << 2;
        const MINIMIZE = 1 << 3;
        const MAXIMIZE = 1 << 4;
        const CLOSE    = 1 << 5;
    }
}

bitflags! {
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
    pub struct MotifDecorations: u32 {
        const ALL      = 1 << 0;
        const BORDER   = 1 << 1;
        const RESIZEH  = 1 << 2;
        const TITLE    = 1 << 3;
        const MENU     = 1 << 4;
        const MINIMIZE = 1 << 5;
        const MAXIMIZE = 1 << 6;
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct MotifHints {
    pub flags: MotifFlags,
    pub functions: MotifFunctions,
    pub decorations: MotifDecorations,
    pub input_mode: u32,
    pub status: u32,
}

impl MotifHints {
    /// Decode the raw property; fewer than five values is not a Motif hint
    pub fn from_values(values: &[u32]) -> Option<Self> {
        let v: &[u32; 5] = values.get(..5)?.try_into().ok()?;
        Some(Self {
            flags: MotifFlags::from_bits_truncate(v[0]),
            functions: MotifFunctions::from_bits_truncate(v[1]),
            decorations: MotifDecorations::from_bits_truncate(v[2]),
            input_mode: v[3],
            status: v[4],
        })
    }

    /// False when the client asked for no title bar and no border
    pub fn wants_decorations(&self) -> bool {
        if !self.flags.contains(MotifFlags::DECORATIONS) {
            return true;
        }
        self.decorations
            .intersects(MotifDecorations::ALL | MotifDecorations::BORDER | MotifDecorations::TITLE)
    }
}

pub fn motif_hints(conn: &XConn, window: Window) -> Result<Option<MotifHints>> {
    Ok(u32s(conn, window, "_MOTIF_WM_HINTS")?.and_then(|v| MotifHints::from_values(&v)))
}

/// Whether `window` should get a frame; windows without the hint do
pub fn wants_decorations(conn: &XConn, window: Window) -> Result<bool> {
    Ok(motif_hints(conn, window)?.map_or(true, |h| h.wants_decorations()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::x::testing::FakeServer;
    use crate::x::Property;

    #[test]
    fn test_decoration_flags() {
        let none = MotifHints::from_values(&[2, 0, 0, 0, 0]).unwrap();
        assert!(!none.wants_decorations());

        let menu_only = MotifHints::from_values(&[2, 0, 1 << 4, 0, 0]).unwrap();
        assert!(!menu_only.wants_decorations());

        let border = MotifHints::from_values(&[2, 0, 2, 0, 0]).unwrap();
        assert!(border.wants_decorations());

        // decorations field ignored unless its flag is set
        let functions_only = MotifHints::from_values(&[1, 4, 0, 0, 0]).unwrap();
        assert!(functions_only.wants_decorations());
        assert!(functions_only.functions.contains(MotifFunctions::MOVE));

        assert_eq!(MotifHints::from_values(&[2, 0, 0]), None);
    }

    #[test]
    fn test_read_from_window() {
        let server = FakeServer::new();
        let type_ = server.atom("_MOTIF_WM_HINTS");
        server.set_property(0x42, "_MOTIF_WM_HINTS", Property::from_u32s(type_, &[2, 0, 0, 0, 0]));
        let conn = XConn::new(server).unwrap();
        assert!(!wants_decorations(&conn, 0x42).unwrap());
        assert!(wants_decorations(&conn, 0x43).unwrap());
    }
}
