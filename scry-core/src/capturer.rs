//! Screen capture orchestration with desktop/session guarding.
//!
//! [`ScreenCapturer`] produces one fully-populated frame per cycle:
//!
//! 1. Switch to the desktop session receiving user input, if it changed.
//! 2. Recreate capture resources when the display bounds changed.
//! 3. Bulk-copy the desktop surface into the next ring slot.
//! 4. Diff against the previous slot and attach the changed region.
//!
//! Capture resources (frame ring, differ, OS-side handles) are valid
//! only for the (session, bounds) pair they were created under; any
//! mismatch forces full teardown and recreation before the next capture.

use tracing::{debug, warn};

use crate::desktop::{DesktopOps, SessionId};
use crate::differ::Differ;
use crate::error::CaptureError;
use crate::frame::{Frame, FrameRing, PixelFormat};
use crate::geometry::Rect;

// ── ScreenCapturer ───────────────────────────────────────────────

/// Double-buffered screen capturer over a [`DesktopOps`] backend.
///
/// Owned exclusively by the capture thread; frames it returns borrow the
/// internal ring and are never shared while being written.
pub struct ScreenCapturer<D: DesktopOps> {
    desktop: D,
    format: PixelFormat,
    /// Session the current resources were created under.
    session: Option<SessionId>,
    /// Bounds the current resources were created under.
    resource_bounds: Option<Rect>,
    frames: Option<FrameRing>,
    differ: Option<Differ>,
}

impl<D: DesktopOps> ScreenCapturer<D> {
    pub fn new(desktop: D, format: PixelFormat) -> Self {
        Self {
            desktop,
            format,
            session: None,
            resource_bounds: None,
            frames: None,
            differ: None,
        }
    }

    pub fn desktop(&self) -> &D {
        &self.desktop
    }

    /// Backend access for per-cycle cursor readout.
    pub fn desktop_mut(&mut self) -> &mut D {
        &mut self.desktop
    }

    /// Ensure capture resources exist and are bound to the current
    /// (session, bounds) pair.
    ///
    /// Creation failure is returned, not silently retried within the
    /// same cycle; the caller sees a failed capture.
    pub fn prepare_resources(&mut self) -> Result<(), CaptureError> {
        // Switch to the desktop receiving user input if different from
        // the one our resources are bound to.
        if let Some(input) = self.desktop.current_input_session() {
            if self.session.as_ref() != Some(&input) {
                // Release resources first; rebinding fails while they
                // are alive.
                self.release_resources();

                // If binding fails the thread keeps its previous
                // assignment, so we can continue capturing, just from
                // the wrong session.
                if self.desktop.bind_to_session(&input) {
                    debug!(session = %input, "bound capture thread to input session");
                    self.session = Some(input);
                } else {
                    warn!(session = %input, "session bind failed; capturing from previous session");
                }
            }
        }

        // If the display bounds changed, the ring and differ are sized
        // wrong; recreate everything.
        let bounds = self.desktop.display_bounds();
        if self.resource_bounds.is_some_and(|b| b != bounds) {
            debug!(?bounds, "display bounds changed; recreating capture resources");
            self.release_resources();
        }

        if self.frames.is_none() {
            // Vote to disable compositor effects while capturing; the OS
            // restores them when the vote is withdrawn or we exit.
            self.desktop.set_compositor_enabled(false);

            self.desktop.create_resources(bounds)?;
            self.frames = Some(FrameRing::new(bounds.width, bounds.height, self.format));
            self.differ = Some(Differ::new(bounds.width, bounds.height));
            self.resource_bounds = Some(bounds);
        }

        Ok(())
    }

    /// Capture one frame: copy, diff, attach region, advance the ring.
    pub fn capture_frame(&mut self) -> Result<&Frame, CaptureError> {
        self.prepare_resources()?;

        let bounds = self
            .resource_bounds
            .ok_or(CaptureError::Resource("capture bounds missing"))?;
        let Some(ring) = self.frames.as_mut() else {
            return Err(CaptureError::Resource("frame ring missing"));
        };
        let Some(differ) = self.differ.as_mut() else {
            return Err(CaptureError::Resource("differ missing"));
        };

        let (current, previous) = ring.split_current_previous();
        self.desktop.copy_desktop_pixels(current, bounds)?;

        let region = differ.diff(previous, current);
        current.set_updated_region(region);

        ring.advance();
        Ok(ring.last_captured())
    }

    fn release_resources(&mut self) {
        self.frames = None;
        self.differ = None;
        self.resource_bounds = None;
        self.desktop.release_resources();
    }
}

impl<D: DesktopOps> Drop for ScreenCapturer<D> {
    fn drop(&mut self) {
        self.release_resources();
        // Withdraw the compositor vote.
        self.desktop.set_compositor_enabled(true);
    }
}

// ── Tests ────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::desktop::VirtualDesktop;

    fn capturer(width: u32, height: u32) -> ScreenCapturer<VirtualDesktop> {
        ScreenCapturer::new(VirtualDesktop::new(width, height), PixelFormat::Bgra8)
    }

    #[test]
    fn first_capture_reports_resources_created() {
        let mut cap = capturer(64, 64);
        let frame = cap.capture_frame().unwrap();
        assert_eq!(frame.width(), 64);
        assert_eq!(frame.height(), 64);
    }

    #[test]
    fn unchanged_desktop_yields_empty_region() {
        let mut cap = capturer(64, 64);
        cap.desktop_mut()
            .fill_rect(Rect::new(0, 0, 64, 64), [9, 9, 9, 255]);

        let _ = cap.capture_frame().unwrap();
        let second = cap.capture_frame().unwrap();
        assert!(second.updated_region().is_empty());
    }

    #[test]
    fn painted_change_shows_up_in_region() {
        let mut cap = capturer(128, 128);
        let _ = cap.capture_frame().unwrap();

        cap.desktop_mut()
            .fill_rect(Rect::new(10, 10, 20, 20), [255, 0, 0, 255]);
        let frame = cap.capture_frame().unwrap();
        assert!(!frame.updated_region().is_empty());
    }

    #[test]
    fn bounds_change_recreates_resources() {
        let mut cap = capturer(64, 64);
        let _ = cap.capture_frame().unwrap();

        cap.desktop_mut().resize(128, 96);
        let frame = cap.capture_frame().unwrap();
        assert_eq!(frame.width(), 128);
        assert_eq!(frame.height(), 96);
        // Fresh differ: the new reference frame starts zeroed, so a
        // zero-filled display legitimately reports no change, but the
        // ring must be sized to the new bounds.
        assert_eq!(frame.byte_len(), 128 * 96 * 4);
    }

    #[test]
    fn session_switch_rebinds() {
        let mut cap = capturer(32, 32);
        let _ = cap.capture_frame().unwrap();

        cap.desktop_mut().switch_session("virtual-1");
        let _ = cap.capture_frame().unwrap();
        assert_eq!(
            cap.desktop().bound_session().map(SessionId::name),
            Some("virtual-1")
        );
    }

    #[test]
    fn bind_failure_degrades_gracefully() {
        let mut cap = capturer(32, 32);
        let _ = cap.capture_frame().unwrap();

        cap.desktop_mut().refuse_bind(true);
        cap.desktop_mut().switch_session("virtual-1");
        // Capture proceeds with the previous binding.
        assert!(cap.capture_frame().is_ok());
        assert_ne!(
            cap.desktop().bound_session().map(SessionId::name),
            Some("virtual-1")
        );
    }

    #[test]
    fn resource_creation_failure_is_reported_then_retried() {
        let mut desktop = VirtualDesktop::new(32, 32);
        desktop.fail_creates(1);
        let mut cap = ScreenCapturer::new(desktop, PixelFormat::Bgra8);

        assert!(cap.capture_frame().is_err());
        // Next cycle retries and succeeds.
        assert!(cap.capture_frame().is_ok());
    }

    #[test]
    fn copy_failure_fails_the_cycle_only() {
        let mut cap = capturer(32, 32);
        let _ = cap.capture_frame().unwrap();

        cap.desktop_mut().fail_copies(1);
        assert!(cap.capture_frame().is_err());
        assert!(cap.capture_frame().is_ok());
    }
}
