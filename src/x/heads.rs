//! Heads Module
//!
//! Physical monitor rectangles from Xinerama and the workareas left over
//! once panel and dock struts are taken out of them.

use tracing::debug;

use crate::error::Result;
use crate::rect::{apply_strut, largest_overlap, Rect, Strut};
use crate::x::XConn;

/// Sort heads by (x, y) and drop cloned outputs that share an origin
pub fn physical_order(mut heads: Vec<Rect>) -> Vec<Rect> {
    heads.sort_by_key(|h| (h.x, h.y));
    heads.dedup_by_key(|h| (h.x, h.y));
    heads
}

/// Current physical heads; the whole root window when Xinerama is inactive
pub fn physical_heads(conn: &XConn) -> Result<Vec<Rect>> {
    let (width, height) = conn.screen_size();
    let heads = match conn.server().xinerama_screens()? {
        Some(screens) if !screens.is_empty() => physical_order(screens),
        _ => vec![Rect::new(0, 0, width, height)],
    };
    debug!("Physical heads: {:?}", heads);
    Ok(heads)
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Heads {
    root: Rect,
    physical: Vec<Rect>,
    workareas: Vec<Rect>,
}

impl Heads {
    pub fn new(root: Rect, physical: Vec<Rect>) -> Self {
        let physical = physical_order(physical);
        Self {
            root,
            workareas: physical.clone(),
            physical,
        }
    }

    pub fn load(conn: &XConn) -> Result<Self> {
        let (width, height) = conn.screen_size();
        Ok(Self::new(Rect::new(0, 0, width, height), physical_heads(conn)?))
    }

    pub fn root(&self) -> Rect {
        self.root
    }

    pub fn physical(&self) -> &[Rect] {
        &self.physical
    }

    pub fn workareas(&self) -> &[Rect] {
        &self.workareas
    }

    /// Recompute workareas from scratch with every strut in `struts`
    pub fn apply_struts<'a>(&mut self, struts: impl IntoIterator<Item = &'a Strut>) {
        self.workareas = self.physical.clone();
        for strut in struts {
            apply_strut(
                &mut self.workareas,
                self.root.width,
                self.root.height,
                strut,
            );
        }
    }

    /// Index of the head `rect` mostly lies on, defaulting to the first
    pub fn head_for(&self, rect: &Rect) -> usize {
        largest_overlap(rect, &self.physical).unwrap_or(0)
    }

    /// Workarea of the head `rect` mostly lies on
    pub fn workarea_for(&self, rect: &Rect) -> Rect {
        self.workareas
            .get(self.head_for(rect))
            .copied()
            .unwrap_or(self.root)
    }

    /// Bounding box of all workareas, as published in `_NET_WORKAREA`
    pub fn bounding_workarea(&self) -> Rect {
        let Some(first) = self.workareas.first() else {
            return self.root;
        };
        let (mut x0, mut y0, mut x1, mut y1) = (first.x, first.y, first.right(), first.bottom());
        for r in &self.workareas[1..] {
            x0 = x0.min(r.x);
            y0 = y0.min(r.y);
            x1 = x1.max(r.right());
            y1 = y1.max(r.bottom());
        }
        Rect::new(x0, y0, x1 - x0, y1 - y0)
    }
}
