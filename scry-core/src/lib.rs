//! # scry-core
//!
//! Host-side screen acquisition engine for remote desktop sessions.
//!
//! This crate contains:
//! - **Frames**: `Frame`, `FrameRing` — double-buffered BGRA frame storage
//! - **Geometry**: `Point`, `Rect`, `Region` — pixel-space primitives
//! - **Differ**: block-based change detection between consecutive frames
//! - **Cursor**: `MouseCursor` extraction from native AND/XOR/color bitmaps
//! - **Desktop**: `DesktopOps` backend seam, `VirtualDesktop` for tests,
//!   `GdiDesktop` on Windows
//! - **Capturer**: `ScreenCapturer` — session-guarded capture orchestration
//! - **Scheduler**: adaptive pacing toward a target frame interval
//! - **Encoder**: zstd/raw dirty-rect video packets and cursor shapes
//! - **Updater**: `ScreenUpdater` — the producer thread and its wake protocol
//! - **Error**: `CaptureError` — typed, `thiserror`-based error hierarchy

pub mod capturer;
pub mod cursor;
pub mod desktop;
pub mod differ;
pub mod encoder;
pub mod error;
pub mod frame;
pub mod geometry;
pub mod scheduler;
pub mod updater;

#[cfg(target_os = "windows")]
pub mod gdi;

// ── Re-exports for ergonomic usage ───────────────────────────────

pub use capturer::ScreenCapturer;
pub use cursor::{CursorBitmaps, MouseCursor};
pub use desktop::{DesktopOps, SessionId, VirtualDesktop};
pub use differ::Differ;
pub use encoder::{
    CursorEncoder, CursorShape, VideoEncoder, VideoEncoding, VideoPacket, create_video_encoder,
};
pub use error::CaptureError;
pub use frame::{Frame, FrameRing, PixelFormat, RING_LEN};
pub use geometry::{Point, Rect, Region};
pub use scheduler::CaptureScheduler;
pub use updater::{Features, ScreenUpdater, UpdateEvent, UpdateSink, UpdaterConfig, UpdaterHandle};

#[cfg(target_os = "windows")]
pub use gdi::GdiDesktop;
