//! Desktop/session primitives behind a trait seam.
//!
//! [`DesktopOps`] abstracts the handful of OS services the capture
//! pipeline needs: input-session identity, thread binding, display
//! bounds, the bulk pixel copy, cursor readout, and the best-effort
//! compositor vote. The real backend is [`crate::gdi::GdiDesktop`]
//! (Windows); [`VirtualDesktop`] is an in-memory framebuffer used for
//! headless operation and tests.

use std::fmt;

use crate::cursor::CursorBitmaps;
use crate::error::CaptureError;
use crate::frame::Frame;
use crate::geometry::Rect;

// ── SessionId ────────────────────────────────────────────────────

/// Identifier of the desktop session currently receiving user input.
///
/// Comparably equal to a previously captured session; replaced, never
/// mutated, when a different session is detected.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct SessionId(String);

impl SessionId {
    pub fn new(name: impl Into<String>) -> Self {
        Self(name.into())
    }

    pub fn name(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

// ── DesktopOps ───────────────────────────────────────────────────

/// OS desktop services consumed by the screen capturer.
///
/// Implementations own the OS-side half of the capture resources (device
/// contexts, compatible bitmaps); the capturer owns the frame ring and
/// differ and drives this trait's lifecycle methods.
pub trait DesktopOps: Send {
    /// The session currently receiving user input, or `None` if it
    /// cannot be determined this cycle.
    fn current_input_session(&mut self) -> Option<SessionId>;

    /// Bind the calling thread to `session`. Returns `false` on failure;
    /// the capturer then continues with the previous binding rather than
    /// aborting.
    fn bind_to_session(&mut self, session: &SessionId) -> bool;

    /// Current full-display bounds.
    fn display_bounds(&mut self) -> Rect;

    /// Create OS-side capture resources for the given bounds.
    fn create_resources(&mut self, bounds: Rect) -> Result<(), CaptureError>;

    /// Release all OS-side capture resources.
    fn release_resources(&mut self);

    /// One bulk pixel copy from the live desktop surface into `dst`,
    /// which is sized to `bounds`.
    fn copy_desktop_pixels(&mut self, dst: &mut Frame, bounds: Rect) -> Result<(), CaptureError>;

    /// Read the current cursor resource as raw bitmaps plus hotspot.
    fn read_cursor(&mut self) -> Result<CursorBitmaps, CaptureError>;

    /// Vote to enable/disable desktop compositor effects that would
    /// corrupt bulk pixel reads. Best-effort; ignored if unsupported.
    fn set_compositor_enabled(&mut self, _enabled: bool) {}
}

// ── VirtualDesktop ───────────────────────────────────────────────

/// In-memory framebuffer backend.
///
/// Behaves like a single static display at the origin: tests and
/// headless runs paint into the framebuffer and the capturer sees the
/// change on its next cycle. Failure injection hooks cover the
/// resource-error paths that a real display only hits under session
/// churn.
pub struct VirtualDesktop {
    width: u32,
    height: u32,
    /// BGRA rows, `width * 4` bytes each.
    framebuffer: Vec<u8>,
    session: SessionId,
    bound_session: Option<SessionId>,
    cursor: Option<CursorBitmaps>,
    refuse_bind: bool,
    copy_failures: u32,
    create_failures: u32,
}

impl VirtualDesktop {
    pub fn new(width: u32, height: u32) -> Self {
        Self {
            width,
            height,
            framebuffer: vec![0; (width * height * 4) as usize],
            session: SessionId::new("virtual-0"),
            bound_session: None,
            cursor: None,
            refuse_bind: false,
            copy_failures: 0,
            create_failures: 0,
        }
    }

    /// Paint a rectangle of the framebuffer with one BGRA value.
    pub fn fill_rect(&mut self, rect: Rect, bgra: [u8; 4]) {
        let right = rect.right().min(self.width);
        let bottom = rect.bottom().min(self.height);
        for y in rect.y..bottom {
            for x in rect.x..right {
                let i = ((y * self.width + x) * 4) as usize;
                self.framebuffer[i..i + 4].copy_from_slice(&bgra);
            }
        }
    }

    /// Replace the display with a new, zero-filled size (resolution
    /// change from the capturer's point of view).
    pub fn resize(&mut self, width: u32, height: u32) {
        self.width = width;
        self.height = height;
        self.framebuffer = vec![0; (width * height * 4) as usize];
    }

    /// Switch the input-receiving session.
    pub fn switch_session(&mut self, name: impl Into<String>) {
        self.session = SessionId::new(name);
    }

    /// The session this desktop is currently bound to, if any.
    pub fn bound_session(&self) -> Option<&SessionId> {
        self.bound_session.as_ref()
    }

    /// Install a cursor resource returned by subsequent `read_cursor`
    /// calls.
    pub fn set_cursor(&mut self, cursor: CursorBitmaps) {
        self.cursor = Some(cursor);
    }

    /// Make the next `bind_to_session` calls fail.
    pub fn refuse_bind(&mut self, refuse: bool) {
        self.refuse_bind = refuse;
    }

    /// Make the next `n` pixel copies fail.
    pub fn fail_copies(&mut self, n: u32) {
        self.copy_failures = n;
    }

    /// Make the next `n` resource creations fail.
    pub fn fail_creates(&mut self, n: u32) {
        self.create_failures = n;
    }
}

impl DesktopOps for VirtualDesktop {
    fn current_input_session(&mut self) -> Option<SessionId> {
        Some(self.session.clone())
    }

    fn bind_to_session(&mut self, session: &SessionId) -> bool {
        if self.refuse_bind {
            return false;
        }
        self.bound_session = Some(session.clone());
        true
    }

    fn display_bounds(&mut self) -> Rect {
        Rect::from_size(self.width, self.height)
    }

    fn create_resources(&mut self, _bounds: Rect) -> Result<(), CaptureError> {
        if self.create_failures > 0 {
            self.create_failures -= 1;
            return Err(CaptureError::Resource("virtual resource failure"));
        }
        Ok(())
    }

    fn release_resources(&mut self) {}

    fn copy_desktop_pixels(&mut self, dst: &mut Frame, bounds: Rect) -> Result<(), CaptureError> {
        if self.copy_failures > 0 {
            self.copy_failures -= 1;
            return Err(CaptureError::PixelCopy("virtual copy failure"));
        }
        if bounds.width != self.width || bounds.height != self.height {
            return Err(CaptureError::PixelCopy("stale display bounds"));
        }
        dst.data_mut().copy_from_slice(&self.framebuffer);
        Ok(())
    }

    fn read_cursor(&mut self) -> Result<CursorBitmaps, CaptureError> {
        self.cursor
            .clone()
            .ok_or(CaptureError::Cursor("no cursor resource installed"))
    }
}

// ── Tests ────────────────────────────────────────────────────────
