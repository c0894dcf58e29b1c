//! Window Module
//!
//! A thin handle over a native window id with a cached geometry. Parents are
//! never stored; the decoration tree belongs to whichever process reparented
//! the window and is queried on demand.

use x11rb::protocol::xproto::{EventMask, StackMode, Window};

use crate::error::Result;
use crate::rect::Rect;
use crate::x::{WindowChanges, XConn};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct XWindow {
    pub id: Window,
    /// Last known geometry relative to the parent; a local cache only
    pub geom: Rect,
}

impl XWindow {
    pub fn new(id: Window) -> Self {
        Self {
            id,
            geom: Rect::default(),
        }
    }

    /// Create a new child of `parent` selecting `event_mask`
    pub fn create(conn: &XConn, parent: Window, rect: Rect, event_mask: EventMask) -> Result<Self> {
        let id = conn.server().create_window(parent, rect, event_mask)?;
        Ok(Self { id, geom: rect })
    }

    /// Refresh the cached geometry from the server
    pub fn geometry(&mut self, conn: &XConn) -> Result<Rect> {
        self.geom = conn.server().geometry(self.id)?;
        Ok(self.geom)
    }

    /// The immediate parent in the window tree
    pub fn parent(&self, conn: &XConn) -> Result<XWindow> {
        Ok(XWindow::new(conn.server().query_tree(self.id)?.parent))
    }

    /// The top-level ancestor directly below the root
    ///
    /// For an undecorated window that is the window itself; otherwise it is
    /// whichever frame the window manager wrapped it in, however deep.
    pub fn decor_window(&self, conn: &XConn) -> Result<XWindow> {
        let root = conn.root();
        let mut current = *self;
        loop {
            let parent = current.parent(conn)?;
            if parent.id == root || parent.id == x11rb::NONE {
                return Ok(current);
            }
            current = parent;
        }
    }

    /// Geometry including decorations: that of the top-level ancestor
    pub fn decor_geometry(&self, conn: &XConn) -> Result<Rect> {
        self.decor_window(conn)?.geometry(conn)
    }

    /// Issue a ConfigureWindow, caching only the fields it carries
    pub fn configure(&mut self, conn: &XConn, changes: &WindowChanges) -> Result<()> {
        conn.server().configure_window(self.id, changes)?;
        if let Some(x) = changes.x {
            self.geom.x = x;
        }
        if let Some(y) = changes.y {
            self.geom.y = y;
        }
        if let Some(w) = changes.width {
            self.geom.width = w as i32;
        }
        if let Some(h) = changes.height {
            self.geom.height = h as i32;
        }
        Ok(())
    }

    pub fn move_to(&mut self, conn: &XConn, x: i32, y: i32) -> Result<()> {
        self.configure(conn, &WindowChanges::position(x, y))
    }

    pub fn resize(&mut self, conn: &XConn, width: i32, height: i32) -> Result<()> {
        self.configure(
            conn,
            &WindowChanges::size(width.max(1) as u32, height.max(1) as u32),
        )
    }

    pub fn move_resize(&mut self, conn: &XConn, rect: Rect) -> Result<()> {
        self.configure(conn, &WindowChanges::rect(rect))
    }

    /// Client size that makes the decorated window `width` x `height`
    ///
    /// Subtracts whatever the frame adds around the client, clamped so a
    /// request never asks for a zero size.
    pub fn adjust_size(&mut self, conn: &XConn, width: i32, height: i32) -> Result<(i32, i32)> {
        let client = self.geometry(conn)?;
        let decor = self.decor_geometry(conn)?;
        let w = width - (decor.width - client.width);
        let h = height - (decor.height - client.height);
        Ok((w.max(1), h.max(1)))
    }

    /// Resize so the window including decorations is `width` x `height`
    pub fn resize_decorated(&mut self, conn: &XConn, width: i32, height: i32) -> Result<()> {
        let (w, h) = self.adjust_size(conn, width, height)?;
        self.resize(conn, w, h)
    }

    /// Place the decorated window at `rect`: the frame moves, the client
    /// resizes
    pub fn move_resize_decorated(&mut self, conn: &XConn, rect: Rect) -> Result<()> {
        let (w, h) = self.adjust_size(conn, rect.width, rect.height)?;
        let mut top = self.decor_window(conn)?;
        if top.id == self.id {
            return self.move_resize(conn, Rect::new(rect.x, rect.y, w, h));
        }
        top.move_to(conn, rect.x, rect.y)?;
        self.resize(conn, w, h)
    }

    pub fn map(&self, conn: &XConn) -> Result<()> {
        conn.server().map_window(self.id)
    }

    pub fn unmap(&self, conn: &XConn) -> Result<()> {
        conn.server().unmap_window(self.id)
    }

    /// Destroy the window and forget its callbacks and bindings
    pub fn destroy(&self, conn: &XConn) -> Result<()> {
        conn.detach(self.id);
        conn.server().destroy_window(self.id)
    }

    pub fn focus(&self, conn: &XConn) -> Result<()> {
        conn.server().set_input_focus(self.id, conn.time())
    }

    pub fn stack(&self, conn: &XConn, mode: StackMode) -> Result<()> {
        conn.server().configure_window(self.id, &WindowChanges::stack(mode))
    }

    pub fn raise(&self, conn: &XConn) -> Result<()> {
        self.stack(conn, StackMode::ABOVE)
    }

    /// Select the events this client wants on the window
    pub fn listen(&self, conn: &XConn, mask: EventMask) -> Result<()> {
        conn.server().select_input(self.id, mask)
    }

    pub fn reparent(&mut self, conn: &XConn, parent: Window, x: i32, y: i32) -> Result<()> {
        conn.server().reparent_window(self.id, parent, x, y)?;
        self.geom.x = x;
        self.geom.y = y;
        Ok(())
    }

    pub fn kill(&self, conn: &XConn) -> Result<()> {
        conn.server().kill_client(self.id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::x::testing::{FakeServer, Request, ROOT};

    const FRAME: Window = 0x40;
    const CLIENT: Window = 0x42;

    fn decorated() -> (FakeServer, XConn) {
        let server = FakeServer::new();
        server.add_window(FRAME, ROOT, Rect::new(100, 100, 210, 130));
        server.add_window(CLIENT, FRAME, Rect::new(5, 25, 200, 100));
        let conn = XConn::new(server.clone()).unwrap();
        (server, conn)
    }

    #[test]
    fn test_resize_decorated_subtracts_frame() {
        let (server, conn) = decorated();
        let mut win = XWindow::new(CLIENT);
        win.resize_decorated(&conn, 220, 150).unwrap();
        assert_eq!(
            server.requests().last(),
            Some(&Request::Configure {
                window: CLIENT,
                changes: WindowChanges::size(210, 120)
            })
        );
        assert_eq!(win.geom, Rect::new(5, 25, 210, 120));
    }

    #[test]
    fn test_resize_decorated_clamps_to_one() {
        let (server, conn) = decorated();
        let mut win = XWindow::new(CLIENT);
        win.resize_decorated(&conn, 5, 20).unwrap();
        assert_eq!(
            server.requests().last(),
            Some(&Request::Configure {
                window: CLIENT,
                changes: WindowChanges::size(1, 1)
            })
        );
    }

    #[test]
    fn test_decor_geometry_walks_any_depth() {
        let server = FakeServer::new();
        server.add_window(0x30, ROOT, Rect::new(0, 0, 300, 300));
        server.add_window(0x31, 0x30, Rect::new(2, 2, 296, 296));
        server.add_window(0x32, 0x31, Rect::new(0, 20, 296, 276));
        server.add_window(0x50, ROOT, Rect::new(9, 9, 50, 50));
        let conn = XConn::new(server).unwrap();

        assert_eq!(
            XWindow::new(0x32).decor_geometry(&conn).unwrap(),
            Rect::new(0, 0, 300, 300)
        );
        assert_eq!(
            XWindow::new(0x50).decor_geometry(&conn).unwrap(),
            Rect::new(9, 9, 50, 50)
        );
    }

    #[test]
    fn test_configure_caches_only_sent_fields() {
        let (_server, conn) = decorated();
        let mut win = XWindow::new(CLIENT);
        win.geometry(&conn).unwrap();
        win.configure(
            &conn,
            &WindowChanges {
                width: Some(300),
                ..Default::default()
            },
        )
        .unwrap();
        assert_eq!(win.geom, Rect::new(5, 25, 300, 100));
        win.move_to(&conn, -4, 7).unwrap();
        assert_eq!(win.geom, Rect::new(-4, 7, 300, 100));
    }

    #[test]
    fn test_geometry_of_destroyed_window_is_an_error() {
        let (_server, conn) = decorated();
        let mut win = XWindow::new(0x99);
        let err = win.geometry(&conn).unwrap_err();
        assert!(err.is_bad_window());
        assert!(XWindow::new(0x99).decor_geometry(&conn).is_err());
    }

    #[test]
    fn test_move_resize_decorated_moves_frame() {
        let (server, conn) = decorated();
        let mut win = XWindow::new(CLIENT);
        win.move_resize_decorated(&conn, Rect::new(0, 0, 410, 330))
            .unwrap();
        let reqs = server.requests();
        assert!(reqs.contains(&Request::Configure {
            window: FRAME,
            changes: WindowChanges::position(0, 0)
        }));
        assert!(reqs.contains(&Request::Configure {
            window: CLIENT,
            changes: WindowChanges::size(400, 300)
        }));
    }
}
