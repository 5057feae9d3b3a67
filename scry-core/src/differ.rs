//! Block-level dirty-region detection between consecutive frames.
//!
//! The frame is partitioned into a grid of `BLOCK_SIZE × BLOCK_SIZE`
//! tiles; a tile is dirty if any byte differs between the two buffers.
//! Dirty tiles are then merged into a small set of maximal, disjoint
//! rectangles: each rectangle grows right along its row as far as the
//! tiles stay dirty, then grows down as long as the whole horizontal
//! extent stays dirty. Output size is proportional to visual change, not
//! frame size, which is what keeps downstream encoders efficient.

use crate::frame::Frame;
use crate::geometry::{Rect, Region};

/// Tile edge in pixels. A tuning constant, not a correctness parameter.
const BLOCK_SIZE: u32 = 32;

// ── Differ ───────────────────────────────────────────────────────

/// Region-differencing engine scoped to one display size.
///
/// A `Differ` is created fresh whenever capture resources are recreated,
/// so its dimensions always match the frame ring it is compared against.
/// Passing frames of any other size is a programming-contract violation
/// (resource invalidation failed to keep the ring and differ in sync) and
/// fails loudly in debug builds.
pub struct Differ {
    width: u32,
    height: u32,
    blocks_x: usize,
    blocks_y: usize,
    /// Dirty flags for the current comparison, row-major over the grid.
    dirty: Vec<bool>,
}

impl Differ {
    /// Create a differ for frames of exactly `width × height` pixels.
    pub fn new(width: u32, height: u32) -> Self {
        let blocks_x = width.div_ceil(BLOCK_SIZE) as usize;
        let blocks_y = height.div_ceil(BLOCK_SIZE) as usize;
        Self {
            width,
            height,
            blocks_x,
            blocks_y,
            dirty: vec![false; blocks_x * blocks_y],
        }
    }

    /// Compare two frames and return the set of changed rectangles.
    ///
    /// Identical frames yield an empty region; a frame that differs
    /// everywhere yields a single rectangle covering the full bounds.
    pub fn diff(&mut self, previous: &Frame, current: &Frame) -> Region {
        debug_assert_eq!(current.width(), self.width, "frame/differ width mismatch");
        debug_assert_eq!(current.height(), self.height, "frame/differ height mismatch");
        debug_assert_eq!(previous.byte_len(), current.byte_len());

        self.mark_dirty_blocks(previous, current);
        self.merge_blocks()
    }

    // ── Internal ─────────────────────────────────────────────────

    fn mark_dirty_blocks(&mut self, previous: &Frame, current: &Frame) {
        let bpp = current.format().bytes_per_pixel();
        let stride = current.stride() as usize;
        let prev = previous.data();
        let cur = current.data();

        for by in 0..self.blocks_y {
            let y0 = by as u32 * BLOCK_SIZE;
            let y1 = (y0 + BLOCK_SIZE).min(self.height);

            for bx in 0..self.blocks_x {
                let x0 = (bx as u32 * BLOCK_SIZE) as usize * bpp;
                let x1 = (((bx as u32 + 1) * BLOCK_SIZE).min(self.width)) as usize * bpp;

                self.dirty[by * self.blocks_x + bx] =
                    Self::block_differs(prev, cur, stride, x0, x1, y0, y1);
            }
        }
    }

    /// Row-by-row byte comparison for one tile.
    fn block_differs(
        prev: &[u8],
        cur: &[u8],
        stride: usize,
        left: usize,
        right: usize,
        y0: u32,
        y1: u32,
    ) -> bool {
        for y in y0..y1 {
            let row = y as usize * stride;
            if prev[row + left..row + right] != cur[row + left..row + right] {
                return true;
            }
        }
        false
    }

    /// Consume the dirty grid, emitting maximal disjoint rectangles.
    fn merge_blocks(&mut self) -> Region {
        let mut region = Region::new();

        for by in 0..self.blocks_y {
            for bx in 0..self.blocks_x {
                if !self.dirty[by * self.blocks_x + bx] {
                    continue;
                }

                // Grow right along this row.
                let mut bx_end = bx + 1;
                while bx_end < self.blocks_x && self.dirty[by * self.blocks_x + bx_end] {
                    bx_end += 1;
                }

                // Grow down while the full span stays dirty.
                let mut by_end = by + 1;
                while by_end < self.blocks_y
                    && (bx..bx_end).all(|x| self.dirty[by_end * self.blocks_x + x])
                {
                    by_end += 1;
                }

                // Consume the covered tiles so they are not emitted twice.
                for y in by..by_end {
                    for x in bx..bx_end {
                        self.dirty[y * self.blocks_x + x] = false;
                    }
                }

                region.push(self.block_rect(bx, bx_end, by, by_end));
            }
        }

        region
    }

    /// Pixel rectangle of a tile span, clipped to frame bounds.
    fn block_rect(&self, bx: usize, bx_end: usize, by: usize, by_end: usize) -> Rect {
        let x = bx as u32 * BLOCK_SIZE;
        let y = by as u32 * BLOCK_SIZE;
        Rect::new(
            x,
            y,
            (bx_end as u32 * BLOCK_SIZE).min(self.width) - x,
            (by_end as u32 * BLOCK_SIZE).min(self.height) - y,
        )
    }
}

// ── Tests ────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::frame::PixelFormat;

    fn make_frame(w: u32, h: u32, fill: u8) -> Frame {
        let mut frame = Frame::new(w, h, PixelFormat::Bgra8);
        frame.data_mut().fill(fill);
        frame
    }

    /// Fill a pixel rectangle with a value.
    fn paint(frame: &mut Frame, rect: Rect, value: u8) {
        let stride = frame.stride() as usize;
        let bpp = frame.format().bytes_per_pixel();
        for y in rect.y..rect.bottom() {
            let row = y as usize * stride;
            let left = row + rect.x as usize * bpp;
            let right = row + rect.right() as usize * bpp;
            frame.data_mut()[left..right].fill(value);
        }
    }

    #[test]
    fn identical_frames_yield_empty_region() {
        let mut differ = Differ::new(256, 256);
        let a = make_frame(256, 256, 0x5A);
        let b = make_frame(256, 256, 0x5A);
        assert!(differ.diff(&a, &b).is_empty());
    }

    #[test]
    fn single_rect_change_yields_its_bounding_box() {
        let mut differ = Differ::new(256, 192);
        let prev = make_frame(256, 192, 0);
        let mut cur = make_frame(256, 192, 0);
        let changed = Rect::new(40, 50, 60, 30);
        paint(&mut cur, changed, 0xFF);

        let region = differ.diff(&prev, &cur);
        let bbox = region.bounding_box().unwrap();

        // Block-grid quantisation: the bounding box may only extend to
        // the enclosing 32-px tile edges, never shrink.
        assert!(bbox.x <= changed.x && bbox.x + BLOCK_SIZE > changed.x);
        assert!(bbox.y <= changed.y && bbox.y + BLOCK_SIZE > changed.y);
        assert!(bbox.right() >= changed.right());
        assert!(bbox.bottom() >= changed.bottom());
        assert!(bbox.right() < changed.right() + BLOCK_SIZE);
        assert!(bbox.bottom() < changed.bottom() + BLOCK_SIZE);
    }

    #[test]
    fn diff_detects_same_region_in_both_directions() {
        let mut differ = Differ::new(128, 128);
        let a = make_frame(128, 128, 0);
        let mut b = make_frame(128, 128, 0);
        paint(&mut b, Rect::new(0, 0, 32, 32), 0xCC);

        let forward = differ.diff(&a, &b);
        let backward = differ.diff(&b, &a);
        assert_eq!(forward, backward);
        assert!(!forward.is_empty());
    }

    #[test]
    fn fully_changed_frame_collapses_to_one_rect() {
        let mut differ = Differ::new(200, 120);
        let prev = make_frame(200, 120, 0);
        let cur = make_frame(200, 120, 0xFF);

        let region = differ.diff(&prev, &cur);
        assert_eq!(region.len(), 1);
        assert_eq!(region.rects()[0], Rect::from_size(200, 120));
    }

    #[test]
    fn disjoint_changes_stay_disjoint() {
        let mut differ = Differ::new(256, 256);
        let prev = make_frame(256, 256, 0);
        let mut cur = make_frame(256, 256, 0);
        paint(&mut cur, Rect::new(0, 0, 16, 16), 1);
        paint(&mut cur, Rect::new(200, 200, 16, 16), 2);

        let region = differ.diff(&prev, &cur);
        assert_eq!(region.len(), 2);
        // No pair of output rects overlaps.
        let rects = region.rects();
        for (i, a) in rects.iter().enumerate() {
            for b in &rects[i + 1..] {
                let disjoint = a.right() <= b.x
                    || b.right() <= a.x
                    || a.bottom() <= b.y
                    || b.bottom() <= a.y;
                assert!(disjoint, "{a:?} overlaps {b:?}");
            }
        }
    }

    #[test]
    fn non_block_aligned_bounds_are_clipped() {
        // 100 is not a multiple of 32; the rightmost/bottom tiles are
        // partial and must clip to the frame, not the grid.
        let mut differ = Differ::new(100, 100);
        let prev = make_frame(100, 100, 0);
        let cur = make_frame(100, 100, 0xFF);

        let region = differ.diff(&prev, &cur);
        assert_eq!(region.bounding_box(), Some(Rect::from_size(100, 100)));
    }
}
