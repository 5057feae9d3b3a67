//! Mouse cursor shape extraction.
//!
//! Converts the raw mask/color bitmaps read from an OS cursor resource
//! into a normalised premultiplied-alpha image plus hotspot. Handles the
//! two legacy encodings:
//!
//! - **Color cursors** may or may not carry a real alpha channel; when
//!   every alpha byte is zero the transparency is reconstructed from the
//!   AND mask.
//! - **Monochrome cursors** pack two stacked masks (AND over XOR) into
//!   one bitmap of twice the cursor height; the XOR half becomes the
//!   color image.
//!
//! "Reverse-screen" (XOR) cursors are not supported and are approximated
//! as opaque black; whenever that approximation fires, a white outline is
//! added around the shape so it stays visible on dark backgrounds.

use crate::error::CaptureError;
use crate::geometry::Point;

// Pixels are `u32` values in 0xAARRGGBB layout, i.e. B,G,R,A byte order
// in memory on little-endian targets (matching 32bpp BGRA bitmaps).
const PIXEL_BLACK: u32 = 0xFF00_0000;
const PIXEL_WHITE: u32 = 0xFFFF_FFFF;
const PIXEL_TRANSPARENT: u32 = 0x0000_0000;

/// An AND-mask pixel whose RGB is white (bit set). Mask bitmaps are read
/// at 32bpp with the alpha byte zeroed.
const MASK_WHITE: u32 = 0x00FF_FFFF;

// ── CursorBitmaps ────────────────────────────────────────────────

/// Raw bitmaps read from an OS cursor resource, before reconstruction.
///
/// `mask` always holds `width × height` 32bpp pixels. For monochrome
/// cursors (`color == None`) the reported `height` covers both stacked
/// masks and the true cursor height is half of it.
#[derive(Debug, Clone)]
pub struct CursorBitmaps {
    pub width: u32,
    pub height: u32,
    /// AND mask (and, for monochrome cursors, the XOR mask below it).
    pub mask: Vec<u32>,
    /// Color bitmap, absent for monochrome cursors.
    pub color: Option<Vec<u32>>,
    /// The pixel within the bitmap that tracks the pointer position.
    pub hotspot: Point,
}

// ── MouseCursor ──────────────────────────────────────────────────

/// A reconstructed cursor image with premultiplied alpha.
///
/// Solely owned by the caller; the extractor retains no reference.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MouseCursor {
    image: Vec<u32>,
    width: u32,
    height: u32,
    hotspot: Point,
}

impl MouseCursor {
    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn hotspot(&self) -> Point {
        self.hotspot
    }

    /// Premultiplied 0xAARRGGBB pixels, row-major.
    pub fn pixels(&self) -> &[u32] {
        &self.image
    }
}

// ── Extraction ───────────────────────────────────────────────────

/// Reconstruct a [`MouseCursor`] from raw cursor bitmaps.
///
/// Failure is local to this call; the capture pipeline degrades to "no
/// cursor shape this cycle".
pub fn extract(bitmaps: CursorBitmaps) -> Result<MouseCursor, CaptureError> {
    let width = bitmaps.width as usize;
    let reported_height = bitmaps.height as usize;

    if width == 0 || reported_height == 0 {
        return Err(CaptureError::Cursor("zero-sized cursor bitmap"));
    }
    if bitmaps.mask.len() != width * reported_height {
        return Err(CaptureError::Cursor("mask bitmap size mismatch"));
    }

    let (height, mut image, has_alpha) = match bitmaps.color {
        Some(color) => {
            if color.len() != width * reported_height {
                return Err(CaptureError::Cursor("color bitmap size mismatch"));
            }
            let has_alpha = color.iter().any(|px| px & 0xFF00_0000 != 0);
            (reported_height, color, has_alpha)
        }
        None => {
            // The mask holds an AND mask stacked over an XOR mask of
            // equal height; the XOR half becomes the color image.
            if reported_height % 2 != 0 {
                return Err(CaptureError::Cursor("odd monochrome mask height"));
            }
            let height = reported_height / 2;
            let image = bitmaps.mask[width * height..].to_vec();
            (height, image, false)
        }
    };

    // Reconstruct transparency from the AND mask when the color image
    // carries no native alpha channel.
    //
    //  mask  color   Windows result   Our result    RGB   Alpha
    //   0     00      Black            Black         00    ff
    //   0     ff      White            White         ff    ff
    //   1     00      Screen           Transparent   00    00
    //   1     ff      Reverse-screen   Black         00    ff
    //
    // Reverse-screen cursors are approximated as black; when that
    // happens the shape also gets a white outline.
    if !has_alpha {
        let mut add_outline = false;

        for (dst, mask) in image.iter_mut().zip(&bitmaps.mask) {
            if mask & MASK_WHITE == MASK_WHITE {
                if *dst != 0 {
                    add_outline = true;
                    *dst = PIXEL_BLACK;
                } else {
                    *dst = PIXEL_TRANSPARENT;
                }
            } else {
                *dst ^= PIXEL_BLACK;
            }
        }

        if add_outline {
            add_cursor_outline(&mut image, width, height);
        }
    }

    // Consumers expect premultiplied pixels.
    premultiply_alpha(&mut image);

    Ok(MouseCursor {
        image,
        width: bitmaps.width,
        height: height as u32,
        hotspot: bitmaps.hotspot,
    })
}

/// Turn transparent pixels 4-adjacent to opaque black into opaque white,
/// so an all-black shape stays visible against dark backgrounds.
fn add_cursor_outline(image: &mut [u32], width: usize, height: usize) {
    for y in 0..height {
        for x in 0..width {
            let i = y * width + x;
            if image[i] != PIXEL_TRANSPARENT {
                continue;
            }
            if (y > 0 && image[i - width] == PIXEL_BLACK)
                || (y < height - 1 && image[i + width] == PIXEL_BLACK)
                || (x > 0 && image[i - 1] == PIXEL_BLACK)
                || (x < width - 1 && image[i + 1] == PIXEL_BLACK)
            {
                image[i] = PIXEL_WHITE;
            }
        }
    }
}

/// Scale each color channel by the pixel's alpha (c' = c·a/255).
fn premultiply_alpha(image: &mut [u32]) {
    for px in image.iter_mut() {
        let a = *px >> 24;
        let r = ((*px >> 16 & 0xFF) * a) / 0xFF;
        let g = ((*px >> 8 & 0xFF) * a) / 0xFF;
        let b = ((*px & 0xFF) * a) / 0xFF;
        *px = a << 24 | r << 16 | g << 8 | b;
    }
}

// ── Tests ────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    fn color_cursor(width: u32, height: u32, color: Vec<u32>, mask: Vec<u32>) -> CursorBitmaps {
        CursorBitmaps {
            width,
            height,
            mask,
            color: Some(color),
            hotspot: Point::new(1, 2),
        }
    }

    /// Monochrome cursor: `and_mask`/`xor_mask` are per-pixel bits for a
    /// cursor of `width × height` (true height).
    fn mono_cursor(width: u32, height: u32, and_mask: &[u32], xor_mask: &[u32]) -> CursorBitmaps {
        let to_px = |bit: &u32| if *bit != 0 { MASK_WHITE } else { 0 };
        let mut mask: Vec<u32> = and_mask.iter().map(to_px).collect();
        mask.extend(xor_mask.iter().map(to_px));
        CursorBitmaps {
            width,
            height: height * 2,
            mask,
            color: None,
            hotspot: Point::new(0, 0),
        }
    }

    #[test]
    fn alpha_less_color_cursor_becomes_fully_opaque() {
        // Fully opaque test cursor: alpha-less color data, all-black mask.
        let (w, h) = (8, 6);
        let color = vec![0x0012_3456; (w * h) as usize];
        let mask = vec![0u32; (w * h) as usize];

        let cursor = extract(color_cursor(w, h, color, mask)).unwrap();
        assert_eq!(cursor.width(), w);
        assert_eq!(cursor.height(), h);
        assert!(cursor.pixels().iter().all(|px| px >> 24 == 0xFF));
        assert_eq!(cursor.hotspot(), Point::new(1, 2));
    }

    #[test]
    fn native_alpha_is_left_alone_apart_from_premultiply() {
        // One opaque white pixel, one transparent; mask all set. The
        // alpha scan must detect the native channel and skip the
        // mask-based reconstruction entirely.
        let color = vec![0xFFFF_FFFF, 0x0000_0000];
        let mask = vec![MASK_WHITE, MASK_WHITE];

        let cursor = extract(color_cursor(2, 1, color, mask)).unwrap();
        assert_eq!(cursor.pixels(), &[0xFFFF_FFFF, 0x0000_0000]);
    }

    #[test]
    fn monochrome_masked_pixel_is_transparent() {
        // AND=1, XOR=0 → screen → fully transparent.
        let cursor = extract(mono_cursor(2, 1, &[1, 0], &[0, 0])).unwrap();
        assert_eq!(cursor.pixels()[0], PIXEL_TRANSPARENT);
        // AND=0, XOR=0 → opaque black.
        assert_eq!(cursor.pixels()[1], PIXEL_BLACK);
    }

    #[test]
    fn monochrome_halves_reported_height() {
        let cursor = extract(mono_cursor(4, 3, &[0; 12], &[0; 12])).unwrap();
        assert_eq!(cursor.width(), 4);
        assert_eq!(cursor.height(), 3);
    }

    #[test]
    fn reverse_screen_pixel_triggers_outline() {
        // Centre pixel is AND=1/XOR=1 (reverse screen): approximated as
        // opaque black, and every transparent 4-neighbour of a black
        // pixel becomes opaque white.
        let and_mask = [1, 1, 1, 1, 1, 1, 1, 1, 1];
        let xor_mask = [0, 0, 0, 0, 1, 0, 0, 0, 0];
        let cursor = extract(mono_cursor(3, 3, &and_mask, &xor_mask)).unwrap();

        let px = cursor.pixels();
        assert_eq!(px[4], PIXEL_BLACK);
        // 4-adjacent neighbours outlined white.
        for i in [1, 3, 5, 7] {
            assert_eq!(px[i], PIXEL_WHITE, "pixel {i} should be outlined");
        }
        // Diagonals stay transparent.
        for i in [0, 2, 6, 8] {
            assert_eq!(px[i], PIXEL_TRANSPARENT);
        }
    }

    #[test]
    fn no_outline_without_reverse_screen_pixels() {
        // Plain transparent/black cursor: outline pass must not run.
        let and_mask = [1, 1, 1, 1, 0, 1, 1, 1, 1];
        let xor_mask = [0; 9];
        let cursor = extract(mono_cursor(3, 3, &and_mask, &xor_mask)).unwrap();

        let px = cursor.pixels();
        assert_eq!(px[4], PIXEL_BLACK);
        for i in [0, 1, 2, 3, 5, 6, 7, 8] {
            assert_eq!(px[i], PIXEL_TRANSPARENT);
        }
    }

    #[test]
    fn output_is_premultiplied() {
        // Half-transparent pure red, native alpha.
        let color = vec![0x80FF_0000];
        let mask = vec![0];
        let cursor = extract(color_cursor(1, 1, color, mask)).unwrap();
        // 0xFF × 0x80 / 0xFF = 0x80.
        assert_eq!(cursor.pixels()[0], 0x8080_0000);
    }

    #[test]
    fn malformed_bitmaps_are_rejected() {
        let bad = CursorBitmaps {
            width: 4,
            height: 4,
            mask: vec![0; 7], // wrong size
            color: None,
            hotspot: Point::default(),
        };
        assert!(extract(bad).is_err());

        let odd = CursorBitmaps {
            width: 2,
            height: 3, // monochrome height must be even
            mask: vec![0; 6],
            color: None,
            hotspot: Point::default(),
        };
        assert!(extract(odd).is_err());
    }
}
