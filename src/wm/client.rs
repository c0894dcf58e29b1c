//! Client Module
//!
//! One managed top-level window and the frame it is reparented into.

use tracing::{debug, info};
use x11rb::protocol::xproto::{EventMask, Window};

use crate::config::DecorationConfig;
use crate::error::Result;
use crate::rect::Rect;
use crate::x::icccm::{self, SizeHints, WmHints, WmState};
use crate::x::{ewmh, motif, XConn, XWindow};

/// Space a frame adds around its client
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Extents {
    pub left: i32,
    pub right: i32,
    pub top: i32,
    pub bottom: i32,
}

impl Extents {
    pub fn from_config(config: &DecorationConfig) -> Self {
        let border = config.border_width as i32;
        Self {
            left: border,
            right: border,
            top: config.titlebar_height as i32,
            bottom: border,
        }
    }

    /// Frame rect around a client rect given in root coordinates
    pub fn outer(&self, inner: Rect) -> Rect {
        Rect::new(
            inner.x - self.left,
            inner.y - self.top,
            inner.width + self.left + self.right,
            inner.height + self.top + self.bottom,
        )
    }

    /// Client rect inside a frame rect
    pub fn inner(&self, outer: Rect) -> Rect {
        Rect::new(
            outer.x + self.left,
            outer.y + self.top,
            (outer.width - self.left - self.right).max(1),
            (outer.height - self.top - self.bottom).max(1),
        )
    }

    fn as_property(&self) -> [u32; 4] {
        [
            self.left as u32,
            self.right as u32,
            self.top as u32,
            self.bottom as u32,
        ]
    }
}

/// Events a frame listens for
pub fn frame_event_mask() -> EventMask {
    EventMask::SUBSTRUCTURE_REDIRECT
        | EventMask::SUBSTRUCTURE_NOTIFY
        | EventMask::BUTTON_PRESS
        | EventMask::EXPOSURE
}

/// Events selected on the client itself; structure changes arrive through
/// the frame or the root
pub fn client_event_mask() -> EventMask {
    EventMask::PROPERTY_CHANGE
}

#[derive(Debug, Clone)]
pub struct Client {
    pub window: XWindow,
    pub frame: Option<XWindow>,
    pub extents: Extents,
    pub title: String,
    pub protocols: Vec<String>,
    pub hints: WmHints,
    pub size_hints: SizeHints,
    /// Frame geometry to restore when leaving the maximized state
    pub saved_rect: Option<Rect>,
    pub minimized: bool,
    /// UnmapNotify events this process caused and must not treat as withdrawal
    pub pending_unmaps: u32,
}

impl Client {
    /// Take over `id`: read its properties and, unless it asks for none,
    /// wrap it in a frame
    ///
    /// The window is left unmapped; [`Client::show`] maps it.
    pub fn manage(conn: &XConn, id: Window, decorations: &DecorationConfig) -> Result<Self> {
        let mut window = XWindow::new(id);
        let geom = window.geometry(conn)?;
        let viewable = conn.server().window_attributes(id)?.viewable;

        let decorated = motif::wants_decorations(conn, id)?;
        let extents = if decorated {
            Extents::from_config(decorations)
        } else {
            Extents::default()
        };

        let mut client = Self {
            window,
            frame: None,
            extents,
            title: ewmh::title(conn, id)?,
            protocols: icccm::wm_protocols(conn, id)?,
            hints: icccm::wm_hints(conn, id)?.unwrap_or_default(),
            size_hints: icccm::wm_normal_hints(conn, id)?.unwrap_or_default(),
            saved_rect: None,
            minimized: false,
            pending_unmaps: 0,
        };

        window.listen(conn, client_event_mask())?;

        if decorated {
            let outer = Rect::new(
                geom.x,
                geom.y,
                geom.width + extents.left + extents.right,
                geom.height + extents.top + extents.bottom,
            );
            let frame = XWindow::create(conn, conn.root(), outer, frame_event_mask())?;
            if viewable {
                client.pending_unmaps += 1;
            }
            client.window.reparent(conn, frame.id, extents.left, extents.top)?;
            client.frame = Some(frame);
            debug!("Framed 0x{:x} in 0x{:x}", id, frame.id);
        }
        ewmh::set_frame_extents(conn, id, extents.as_property())?;
        info!("Managing 0x{:x} '{}'", id, client.title);
        Ok(client)
    }

    pub fn id(&self) -> Window {
        self.window.id
    }

    /// The top-level window: the frame, or the client when undecorated
    pub fn top(&self) -> XWindow {
        self.frame.unwrap_or(self.window)
    }

    /// Geometry of the top-level window in root coordinates
    pub fn outer_rect(&self) -> Rect {
        self.top().geom
    }

    pub fn is_maximized(&self) -> bool {
        self.saved_rect.is_some()
    }

    pub fn show(&mut self, conn: &XConn) -> Result<()> {
        self.window.map(conn)?;
        if let Some(frame) = &self.frame {
            frame.map(conn)?;
        }
        icccm::set_wm_state(conn, self.id(), WmState::Normal)
    }

    /// Place the whole decorated window at `outer`
    pub fn move_resize_outer(&mut self, conn: &XConn, outer: Rect) -> Result<()> {
        match self.frame.as_mut() {
            Some(frame) => {
                frame.move_resize(conn, outer)?;
                let inner = self.extents.inner(outer);
                self.window.move_resize(
                    conn,
                    Rect::new(self.extents.left, self.extents.top, inner.width, inner.height),
                )
            }
            None => self.window.move_resize(conn, outer),
        }
    }

    /// Resize the client to `width` x `height` after applying its size
    /// hints, growing or shrinking the frame to match
    pub fn resize_client(&mut self, conn: &XConn, width: i32, height: i32) -> Result<()> {
        let (w, h) = self.size_hints.constrain(width, height);
        let top = self.outer_rect();
        let outer = Rect::new(
            top.x,
            top.y,
            w + self.extents.left + self.extents.right,
            h + self.extents.top + self.extents.bottom,
        );
        self.move_resize_outer(conn, outer)
    }

    pub fn move_to(&mut self, conn: &XConn, x: i32, y: i32) -> Result<()> {
        match self.frame.as_mut() {
            Some(frame) => frame.move_to(conn, x, y),
            None => self.window.move_to(conn, x, y),
        }
    }

    pub fn raise(&self, conn: &XConn) -> Result<()> {
        self.top().raise(conn)
    }

    /// Give the client input focus the way it asked for it
    pub fn focus(&self, conn: &XConn) -> Result<()> {
        if self.hints.accepts_input() {
            self.window.focus(conn)?;
        }
        if self.protocols.iter().any(|p| p == "WM_TAKE_FOCUS") {
            icccm::take_focus(conn, self.id())?;
        }
        Ok(())
    }

    /// Politely ask the client to close, or kill it if it cannot be asked
    pub fn close(&self, conn: &XConn) -> Result<()> {
        if self.protocols.iter().any(|p| p == "WM_DELETE_WINDOW") {
            icccm::delete_window(conn, self.id())
        } else {
            info!("0x{:x} does not support WM_DELETE_WINDOW; killing it", self.id());
            self.window.kill(conn)
        }
    }

    /// Finish managing a client that asked to start iconified
    pub fn show_iconic(&mut self, conn: &XConn) -> Result<()> {
        if self.frame.is_some() {
            self.window.map(conn)?;
        }
        self.minimized = true;
        icccm::set_wm_state(conn, self.id(), WmState::Iconic)?;
        ewmh::update_state(conn, self.id(), ewmh::StateAction::Add, ewmh::STATE_HIDDEN)
    }

    pub fn minimize(&mut self, conn: &XConn) -> Result<()> {
        if self.minimized {
            return Ok(());
        }
        self.minimized = true;
        if self.frame.is_none() {
            self.pending_unmaps += 1;
        }
        self.top().unmap(conn)?;
        icccm::set_wm_state(conn, self.id(), WmState::Iconic)?;
        ewmh::update_state(conn, self.id(), ewmh::StateAction::Add, ewmh::STATE_HIDDEN)
    }

    pub fn restore(&mut self, conn: &XConn) -> Result<()> {
        if !self.minimized {
            return Ok(());
        }
        self.minimized = false;
        self.top().map(conn)?;
        icccm::set_wm_state(conn, self.id(), WmState::Normal)?;
        ewmh::update_state(conn, self.id(), ewmh::StateAction::Remove, ewmh::STATE_HIDDEN)
    }

    /// Release the client back to the root and drop the frame
    ///
    /// `destroyed` skips requests on the client itself, which no longer
    /// exists. The frame goes away even if releasing the client fails.
    pub fn unmanage(&mut self, conn: &XConn, destroyed: bool) -> Result<()> {
        conn.detach(self.id());
        let released = if destroyed { Ok(()) } else { self.release(conn) };
        if let Some(frame) = self.frame.take() {
            frame.destroy(conn)?;
        }
        info!("Unmanaged 0x{:x}", self.id());
        released
    }

    fn release(&mut self, conn: &XConn) -> Result<()> {
        if let Some(frame) = &self.frame {
            let outer = frame.geom;
            self.window.reparent(conn, conn.root(), outer.x, outer.y)?;
        }
        icccm::set_wm_state(conn, self.id(), WmState::Withdrawn)
    }
}
