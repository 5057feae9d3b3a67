//! Encoder boundary for video packets and cursor shapes.
//!
//! Encoders are pluggable by configured [`VideoEncoding`] kind and
//! otherwise opaque to the capture loop: the contract is
//! `encode(frame-with-region) -> packet | none`. Two implementations are
//! provided: zstd-compressed dirty rects and an uncompressed variant for
//! loopback/debug use.
//!
//! Payload framing (little-endian), before compression:
//!
//! ```text
//! rect_count: u32
//! per rect:   x: u32, y: u32, width: u32, height: u32,
//!             then width×height tightly packed pixels
//! ```

use bytes::Bytes;
use serde::{Deserialize, Serialize};

use crate::cursor::MouseCursor;
use crate::error::CaptureError;
use crate::frame::Frame;
use crate::geometry::{Point, Rect};

// ── VideoEncoding ────────────────────────────────────────────────

/// Selectable video packet encoding.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum VideoEncoding {
    /// Dirty rects compressed with zstd.
    Zstd,
    /// Dirty rects, uncompressed.
    Raw,
}

// ── Packet types ─────────────────────────────────────────────────

/// An encoded video update, ready for a transport/session layer.
#[derive(Debug, Clone)]
pub struct VideoPacket {
    /// Sequential frame counter.
    pub frame_number: u64,
    /// Full frame width in pixels.
    pub width: u32,
    /// Full frame height in pixels.
    pub height: u32,
    /// The rectangles this packet updates.
    pub rects: Vec<Rect>,
    /// How `data` is encoded.
    pub encoding: VideoEncoding,
    /// Encoded payload.
    pub data: Bytes,
}

/// An encoded cursor shape.
#[derive(Debug, Clone)]
pub struct CursorShape {
    pub width: u32,
    pub height: u32,
    pub hotspot: Point,
    /// Zstd-compressed premultiplied BGRA pixels.
    pub data: Bytes,
}

// ── VideoEncoder ─────────────────────────────────────────────────

/// The video side of the encoder boundary.
///
/// Returns `Ok(None)` when the frame carries no changed pixels.
pub trait VideoEncoder: Send + std::fmt::Debug {
    fn encode(&mut self, frame: &Frame) -> Result<Option<VideoPacket>, CaptureError>;
}

/// Construct the encoder for the configured kind.
///
/// A misconfigured kind (here: a zstd level outside `1..=19`) is fatal at
/// loop start, per the error taxonomy.
pub fn create_video_encoder(
    kind: VideoEncoding,
    zstd_level: i32,
) -> Result<Box<dyn VideoEncoder>, CaptureError> {
    match kind {
        VideoEncoding::Zstd => {
            if !(1..=19).contains(&zstd_level) {
                return Err(CaptureError::EncoderInit(format!(
                    "zstd level {zstd_level} outside 1..=19"
                )));
            }
            Ok(Box::new(ZstdVideoEncoder {
                level: zstd_level,
                frame_number: 0,
            }))
        }
        VideoEncoding::Raw => Ok(Box::new(RawVideoEncoder { frame_number: 0 })),
    }
}

#[derive(Debug)]
struct ZstdVideoEncoder {
    level: i32,
    frame_number: u64,
}

impl VideoEncoder for ZstdVideoEncoder {
    fn encode(&mut self, frame: &Frame) -> Result<Option<VideoPacket>, CaptureError> {
        if frame.updated_region().is_empty() {
            return Ok(None);
        }

        let raw = pack_dirty_rects(frame);
        let compressed = zstd::encode_all(raw.as_slice(), self.level)
            .map_err(|e| CaptureError::Encoding(format!("zstd encode failed: {e}")))?;

        self.frame_number += 1;
        Ok(Some(VideoPacket {
            frame_number: self.frame_number,
            width: frame.width(),
            height: frame.height(),
            rects: frame.updated_region().rects().to_vec(),
            encoding: VideoEncoding::Zstd,
            data: Bytes::from(compressed),
        }))
    }
}

#[derive(Debug)]
struct RawVideoEncoder {
    frame_number: u64,
}

impl VideoEncoder for RawVideoEncoder {
    fn encode(&mut self, frame: &Frame) -> Result<Option<VideoPacket>, CaptureError> {
        if frame.updated_region().is_empty() {
            return Ok(None);
        }

        self.frame_number += 1;
        Ok(Some(VideoPacket {
            frame_number: self.frame_number,
            width: frame.width(),
            height: frame.height(),
            rects: frame.updated_region().rects().to_vec(),
            encoding: VideoEncoding::Raw,
            data: Bytes::from(pack_dirty_rects(frame)),
        }))
    }
}

/// Emit `[count | rect header | packed pixels]…` for the frame's region.
fn pack_dirty_rects(frame: &Frame) -> Vec<u8> {
    let bpp = frame.format().bytes_per_pixel();
    let stride = frame.stride() as usize;
    let rects = frame.updated_region().rects();

    let pixel_bytes: usize = rects.iter().map(|r| r.area() as usize * bpp).sum();
    let mut out = Vec::with_capacity(4 + rects.len() * 16 + pixel_bytes);

    out.extend_from_slice(&(rects.len() as u32).to_le_bytes());
    for rect in rects {
        out.extend_from_slice(&rect.x.to_le_bytes());
        out.extend_from_slice(&rect.y.to_le_bytes());
        out.extend_from_slice(&rect.width.to_le_bytes());
        out.extend_from_slice(&rect.height.to_le_bytes());

        let left = rect.x as usize * bpp;
        let row_bytes = rect.width as usize * bpp;
        for y in rect.y..rect.bottom() {
            let offset = y as usize * stride + left;
            out.extend_from_slice(&frame.data()[offset..offset + row_bytes]);
        }
    }

    out
}

// ── CursorEncoder ────────────────────────────────────────────────

/// Compression level for cursor shapes; they are tiny and infrequent.
const CURSOR_ZSTD_LEVEL: i32 = 3;

/// Encodes [`MouseCursor`]s, suppressing retransmission of an unchanged
/// shape via a content digest of the previous one.
pub struct CursorEncoder {
    last_digest: Option<blake3::Hash>,
}

impl CursorEncoder {
    pub fn new() -> Self {
        Self { last_digest: None }
    }

    /// Returns `Ok(None)` when the shape is identical to the last one
    /// encoded.
    pub fn encode(&mut self, cursor: &MouseCursor) -> Result<Option<CursorShape>, CaptureError> {
        let mut raw = Vec::with_capacity(cursor.pixels().len() * 4);
        for px in cursor.pixels() {
            raw.extend_from_slice(&px.to_le_bytes());
        }

        let digest = blake3::hash(&raw);
        if self.last_digest == Some(digest) {
            return Ok(None);
        }

        let compressed = zstd::encode_all(raw.as_slice(), CURSOR_ZSTD_LEVEL)
            .map_err(|e| CaptureError::Encoding(format!("cursor zstd encode failed: {e}")))?;

        self.last_digest = Some(digest);
        Ok(Some(CursorShape {
            width: cursor.width(),
            height: cursor.height(),
            hotspot: cursor.hotspot(),
            data: Bytes::from(compressed),
        }))
    }
}

impl Default for CursorEncoder {
    fn default() -> Self {
        Self::new()
    }
}

// ── Tests ────────────────────────────────────────────────────────
