//! Raw frame buffers and the fixed-size capture ring.
//!
//! A [`Frame`] is a contiguous pixel buffer plus the "changed region"
//! attached after differencing. Frames live in a [`FrameRing`] owned
//! exclusively by the capture thread: the ring is a fixed array indexed
//! with modular arithmetic, so "current" and "previous" are plain indices
//! rather than cyclic references.

use serde::{Deserialize, Serialize};

use crate::geometry::Region;

// ── PixelFormat ──────────────────────────────────────────────────

/// Pixel layout for captured frames.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PixelFormat {
    /// 4 bytes per pixel: Blue, Green, Red, Alpha (GDI / DXGI default).
    Bgra8,
    /// 4 bytes per pixel: Red, Green, Blue, Alpha.
    Rgba8,
}

impl PixelFormat {
    /// Bytes consumed by a single pixel in this format.
    pub const fn bytes_per_pixel(self) -> usize {
        match self {
            PixelFormat::Bgra8 | PixelFormat::Rgba8 => 4,
        }
    }
}

// ── Frame ────────────────────────────────────────────────────────

/// An uncompressed screen frame.
///
/// The buffer holds `height` rows of `stride` bytes each; rows are packed
/// (`stride == width * bytes_per_pixel`). The attached region describes
/// which pixels changed relative to the previously captured frame and is
/// empty until differencing has run.
#[derive(Debug, Clone)]
pub struct Frame {
    width: u32,
    height: u32,
    stride: u32,
    format: PixelFormat,
    data: Vec<u8>,
    updated_region: Region,
}

impl Frame {
    /// Allocate a zero-filled frame of the given size.
    pub fn new(width: u32, height: u32, format: PixelFormat) -> Self {
        let stride = width * format.bytes_per_pixel() as u32;
        Self {
            width,
            height,
            stride,
            format,
            data: vec![0; stride as usize * height as usize],
            updated_region: Region::new(),
        }
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    /// Row pitch in bytes.
    pub fn stride(&self) -> u32 {
        self.stride
    }

    pub fn format(&self) -> PixelFormat {
        self.format
    }

    pub fn data(&self) -> &[u8] {
        &self.data
    }

    pub fn data_mut(&mut self) -> &mut [u8] {
        &mut self.data
    }

    /// Total byte size of the pixel buffer.
    pub fn byte_len(&self) -> usize {
        self.data.len()
    }

    /// One row of pixel bytes.
    pub fn row(&self, y: u32) -> &[u8] {
        let start = y as usize * self.stride as usize;
        &self.data[start..start + self.stride as usize]
    }

    /// The region that changed relative to the previous capture.
    pub fn updated_region(&self) -> &Region {
        &self.updated_region
    }

    pub fn set_updated_region(&mut self, region: Region) {
        self.updated_region = region;
    }
}

// ── FrameRing ────────────────────────────────────────────────────

/// Number of frames kept in the capture ring.
pub const RING_LEN: usize = 2;

/// Fixed-size ring of frames sized to one display configuration.
///
/// The ring is reallocated whenever display bounds change and freed when
/// capture resources are invalidated. It is never shared across threads
/// while a slot is being written.
#[derive(Debug)]
pub struct FrameRing {
    frames: Vec<Frame>,
    current: usize,
}

impl FrameRing {
    /// Allocate `RING_LEN` zero-filled frames of the given size.
    pub fn new(width: u32, height: u32, format: PixelFormat) -> Self {
        let frames = (0..RING_LEN)
            .map(|_| Frame::new(width, height, format))
            .collect();
        Self { frames, current: 0 }
    }

    /// Mutable access to the slot being written this cycle, together with
    /// a shared borrow of the previously captured slot.
    pub fn split_current_previous(&mut self) -> (&mut Frame, &Frame) {
        let len = self.frames.len();
        let prev = (self.current + len - 1) % len;
        debug_assert_ne!(self.current, prev);

        if self.current > prev {
            let (head, tail) = self.frames.split_at_mut(self.current);
            (&mut tail[0], &head[prev])
        } else {
            let (head, tail) = self.frames.split_at_mut(prev);
            (&mut head[self.current], &tail[0])
        }
    }

    /// Advance the ring cursor; the slot just written becomes the
    /// "previous" frame of the next cycle.
    pub fn advance(&mut self) {
        self.current = (self.current + 1) % self.frames.len();
    }

    /// The most recently completed frame (the slot written before the
    /// last [`advance`](Self::advance)).
    pub fn last_captured(&self) -> &Frame {
        let len = self.frames.len();
        &self.frames[(self.current + len - 1) % len]
    }
}

// ── Tests ────────────────────────────────────────────────────────
