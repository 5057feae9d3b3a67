//! Rectangles and dirty regions in frame coordinates.

// ── Point ────────────────────────────────────────────────────────

/// A pixel coordinate. Used for cursor hotspots.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Point {
    pub x: u32,
    pub y: u32,
}

impl Point {
    pub const fn new(x: u32, y: u32) -> Self {
        Self { x, y }
    }
}

// ── Rect ─────────────────────────────────────────────────────────

/// An axis-aligned rectangle in frame coordinates.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Rect {
    /// Left edge in pixels.
    pub x: u32,
    /// Top edge in pixels.
    pub y: u32,
    /// Width in pixels.
    pub width: u32,
    /// Height in pixels.
    pub height: u32,
}

impl Rect {
    pub const fn new(x: u32, y: u32, width: u32, height: u32) -> Self {
        Self {
            x,
            y,
            width,
            height,
        }
    }

    /// A rectangle of the given size at the origin.
    pub const fn from_size(width: u32, height: u32) -> Self {
        Self::new(0, 0, width, height)
    }

    /// One past the right edge.
    pub const fn right(&self) -> u32 {
        self.x + self.width
    }

    /// One past the bottom edge.
    pub const fn bottom(&self) -> u32 {
        self.y + self.height
    }

    pub const fn is_empty(&self) -> bool {
        self.width == 0 || self.height == 0
    }

    pub const fn area(&self) -> u64 {
        self.width as u64 * self.height as u64
    }

    /// Smallest rectangle containing both `self` and `other`.
    pub fn union(&self, other: &Rect) -> Rect {
        if self.is_empty() {
            return *other;
        }
        if other.is_empty() {
            return *self;
        }
        let x = self.x.min(other.x);
        let y = self.y.min(other.y);
        Rect {
            x,
            y,
            width: self.right().max(other.right()) - x,
            height: self.bottom().max(other.bottom()) - y,
        }
    }
}

// ── Region ───────────────────────────────────────────────────────

/// A set of non-overlapping rectangles describing the pixels that differ
/// from the previous frame. Insertion order is irrelevant.
///
/// An empty region is a valid, common steady-state outcome ("no visually
/// meaningful change"), not an error.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Region {
    rects: Vec<Rect>,
}

impl Region {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_empty(&self) -> bool {
        self.rects.is_empty()
    }

    pub fn len(&self) -> usize {
        self.rects.len()
    }

    /// Add a rectangle. Empty rectangles are ignored.
    ///
    /// Callers are responsible for keeping the set non-overlapping; the
    /// differ's merge step guarantees this for its own output.
    pub fn push(&mut self, rect: Rect) {
        if !rect.is_empty() {
            self.rects.push(rect);
        }
    }

    pub fn rects(&self) -> &[Rect] {
        &self.rects
    }

    pub fn clear(&mut self) {
        self.rects.clear();
    }

    /// Total covered area in pixels.
    pub fn area(&self) -> u64 {
        self.rects.iter().map(Rect::area).sum()
    }

    /// Bounding box of all rectangles, or `None` when empty.
    pub fn bounding_box(&self) -> Option<Rect> {
        let mut it = self.rects.iter();
        let first = *it.next()?;
        Some(it.fold(first, |acc, r| acc.union(r)))
    }
}

impl FromIterator<Rect> for Region {
    fn from_iter<I: IntoIterator<Item = Rect>>(iter: I) -> Self {
        let mut region = Region::new();
        for rect in iter {
            region.push(rect);
        }
        region
    }
}

// ── Tests ────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rect_edges_and_area() {
        let r = Rect::new(10, 20, 30, 40);
        assert_eq!(r.right(), 40);
        assert_eq!(r.bottom(), 60);
        assert_eq!(r.area(), 1200);
        assert!(!r.is_empty());
        assert!(Rect::new(5, 5, 0, 10).is_empty());
    }

    #[test]
    fn rect_union() {
        let a = Rect::new(0, 0, 10, 10);
        let b = Rect::new(5, 5, 10, 10);
        assert_eq!(a.union(&b), Rect::new(0, 0, 15, 15));
        // Union with an empty rect is the non-empty one.
        assert_eq!(a.union(&Rect::default()), a);
    }

    #[test]
    fn region_skips_empty_rects() {
        let mut region = Region::new();
        region.push(Rect::new(0, 0, 0, 100));
        assert!(region.is_empty());
        region.push(Rect::new(0, 0, 4, 4));
        assert_eq!(region.len(), 1);
        assert_eq!(region.area(), 16);
    }

    #[test]
    fn region_bounding_box() {
        let region: Region = [Rect::new(0, 0, 10, 10), Rect::new(20, 30, 10, 10)]
            .into_iter()
            .collect();
        assert_eq!(region.bounding_box(), Some(Rect::new(0, 0, 30, 40)));
        assert_eq!(Region::new().bounding_box(), None);
    }
}
