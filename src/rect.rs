//! Rect Module
//!
//! Axis-aligned rectangle math used for window geometry, head (monitor)
//! geometry, workarea computation and "which head is this window on" queries.

/// Window or head geometry
///
/// A rect is only valid when both width and height are positive.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct Rect {
    pub x: i32,
    pub y: i32,
    pub width: i32,
    pub height: i32,
}

impl Rect {
    pub fn new(x: i32, y: i32, width: i32, height: i32) -> Self {
        Self {
            x,
            y,
            width,
            height,
        }
    }

    pub fn is_valid(&self) -> bool {
        self.width > 0 && self.height > 0
    }

    /// Exclusive right edge
    pub fn right(&self) -> i32 {
        self.x + self.width
    }

    /// Exclusive bottom edge
    pub fn bottom(&self) -> i32 {
        self.y + self.height
    }

    pub fn area(&self) -> i64 {
        if self.is_valid() {
            self.width as i64 * self.height as i64
        } else {
            0
        }
    }

    pub fn contains_point(&self, x: i32, y: i32) -> bool {
        x >= self.x && x < self.right() && y >= self.y && y < self.bottom()
    }

    /// True when `other` lies entirely inside `self`
    pub fn covers(&self, other: &Rect) -> bool {
        self.x <= other.x
            && self.y <= other.y
            && self.right() >= other.right()
            && self.bottom() >= other.bottom()
    }

    /// Overlapping region, if any
    pub fn intersect(&self, other: &Rect) -> Option<Rect> {
        let x = self.x.max(other.x);
        let y = self.y.max(other.y);
        let r = Rect::new(
            x,
            y,
            self.right().min(other.right()) - x,
            self.bottom().min(other.bottom()) - y,
        );
        r.is_valid().then_some(r)
    }

    /// Area of the overlap between two rects; symmetric in its arguments
    pub fn intersect_area(&self, other: &Rect) -> i64 {
        self.intersect(other).map_or(0, |r| r.area())
    }

    /// Remove `other` from `self`
    ///
    /// Returns no fragments when `other` covers `self`, `self` unchanged when
    /// they do not overlap, and otherwise up to four disjoint fragments: full
    /// width bands above and below the overlap, and bands left and right of it
    /// limited to the overlap's rows.
    pub fn subtract(&self, other: &Rect) -> Vec<Rect> {
        if !self.is_valid() {
            return Vec::new();
        }
        let Some(hole) = self.intersect(other) else {
            return vec![*self];
        };

        let candidates = [
            // above
            Rect::new(self.x, self.y, self.width, hole.y - self.y),
            // below
            Rect::new(self.x, hole.bottom(), self.width, self.bottom() - hole.bottom()),
            // left
            Rect::new(self.x, hole.y, hole.x - self.x, hole.height),
            // right
            Rect::new(hole.right(), hole.y, self.right() - hole.right(), hole.height),
        ];
        candidates.into_iter().filter(Rect::is_valid).collect()
    }
}

/// Index of the rect in `haystack` that overlaps `needle` the most
///
/// Returns `None` when nothing overlaps at all.
pub fn largest_overlap(needle: &Rect, haystack: &[Rect]) -> Option<usize> {
    let mut best: Option<(usize, i64)> = None;
    for (i, r) in haystack.iter().enumerate() {
        let area = needle.intersect_area(r);
        if area > 0 && best.map_or(true, |(_, a)| area > a) {
            best = Some((i, area));
        }
    }
    best.map(|(i, _)| i)
}

/// Space a panel or dock reserves along the screen edges
///
/// Thickness per edge plus the range it covers on the perpendicular axis, as
/// in `_NET_WM_STRUT_PARTIAL`. A zero-length range disables that edge.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Strut {
    pub left: u32,
    pub right: u32,
    pub top: u32,
    pub bottom: u32,
    pub left_start_y: u32,
    pub left_end_y: u32,
    pub right_start_y: u32,
    pub right_end_y: u32,
    pub top_start_x: u32,
    pub top_end_x: u32,
    pub bottom_start_x: u32,
    pub bottom_end_x: u32,
}

impl Strut {
    pub fn is_empty(&self) -> bool {
        self.left == 0 && self.right == 0 && self.top == 0 && self.bottom == 0
    }
}

fn span_hits(start: u32, end: u32, lo: i32, len: i32) -> bool {
    if start == end {
        return false;
    }
    let (start, end) = (start as i64, end as i64);
    let (lo, hi) = (lo as i64, lo as i64 + len as i64);
    start < hi && end >= lo
}

/// How far a strut of `thickness`, measured from the screen edge, cuts into a
/// head `gap` pixels away from that edge; never more than `extent - 1`
fn strut_reach(thickness: u32, gap: i32, extent: i32) -> i32 {
    let reach = i64::from(thickness) - i64::from(gap);
    reach.clamp(0, i64::from(extent - 1).max(0)) as i32
}

/// Shrink head rects to exclude the space a strut reserves
///
/// `root_width`/`root_height` are the size of the whole virtual screen; strut
/// thickness is measured from its edges, so heads not touching that edge are
/// only shrunk by whatever part of the strut reaches them. Per head, only the
/// first matching edge in bottom, top, right, left order is applied. A head
/// always keeps at least one pixel in each dimension.
pub fn apply_strut(heads: &mut [Rect], root_width: i32, root_height: i32, strut: &Strut) {
    for head in heads.iter_mut() {
        if strut.bottom > 0 && span_hits(strut.bottom_start_x, strut.bottom_end_x, head.x, head.width) {
            let reach = strut_reach(strut.bottom, root_height - head.bottom(), head.height);
            if reach > 0 {
                head.height -= reach;
            }
        } else if strut.top > 0 && span_hits(strut.top_start_x, strut.top_end_x, head.x, head.width) {
            let reach = strut_reach(strut.top, head.y, head.height);
            if reach > 0 {
                head.y += reach;
                head.height -= reach;
            }
        } else if strut.right > 0
            && span_hits(strut.right_start_y, strut.right_end_y, head.y, head.height)
        {
            let reach = strut_reach(strut.right, root_width - head.right(), head.width);
            if reach > 0 {
                head.width -= reach;
            }
        } else if strut.left > 0 && span_hits(strut.left_start_y, strut.left_end_y, head.y, head.height) {
            let reach = strut_reach(strut.left, head.x, head.width);
            if reach > 0 {
                head.x += reach;
                head.width -= reach;
            }
        }
    }
}
