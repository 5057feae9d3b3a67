//! GDI desktop backend for Windows.
//!
//! Implements [`DesktopOps`] with the classic GDI capture path:
//! `OpenInputDesktop`/`SetThreadDesktop` for session guarding, a DIB
//! section + `BitBlt(CAPTUREBLT)` for the bulk pixel copy, a
//! `DwmEnableComposition` vote while capturing, and
//! `GetCursorInfo`/`GetIconInfo`/`GetDIBits` for cursor readout.
//!
//! # Platform
//!
//! This module is **Windows-only** and compiled out elsewhere; headless
//! and test builds use [`crate::desktop::VirtualDesktop`].
//!
//! # Safety
//!
//! All unsafe FFI calls are confined to this module. Every handle is
//! owned by exactly one field or scoped wrapper and released on every
//! exit path.

use tracing::warn;

use crate::cursor::CursorBitmaps;
use crate::desktop::{DesktopOps, SessionId};
use crate::error::CaptureError;
use crate::frame::Frame;
use crate::geometry::{Point, Rect};

use windows::Win32::Foundation::{GENERIC_ALL, HANDLE};
use windows::Win32::Graphics::Dwm::{
    DWM_EC_DISABLECOMPOSITION, DWM_EC_ENABLECOMPOSITION, DwmEnableComposition,
};
use windows::Win32::Graphics::Gdi::{
    BI_RGB, BITMAP, BITMAPINFO, BITMAPINFOHEADER, BITMAPV5HEADER, BitBlt, CAPTUREBLT,
    CreateCompatibleDC, CreateDIBSection, DIB_RGB_COLORS, DeleteDC, DeleteObject, GetDC,
    GetDIBits, GetObjectW, HBITMAP, HDC, HGDIOBJ, ReleaseDC, SRCCOPY, SelectObject,
};
use windows::Win32::System::StationsAndDesktops::{
    CloseDesktop, DESKTOP_ACCESS_FLAGS, HDESK, OpenInputDesktop, SetThreadDesktop,
};
use windows::Win32::UI::WindowsAndMessaging::{
    CURSOR_SHOWING, CURSORINFO, GetCursorInfo, GetIconInfo, GetSystemMetrics, HICON, ICONINFO,
    SM_CXVIRTUALSCREEN, SM_CYVIRTUALSCREEN, SM_XVIRTUALSCREEN, SM_YVIRTUALSCREEN,
};

const BYTES_PER_PIXEL: usize = 4;

// ── Scoped handle wrappers ───────────────────────────────────────

/// `HBITMAP` released on drop.
struct ScopedBitmap(HBITMAP);

impl Drop for ScopedBitmap {
    fn drop(&mut self) {
        if !self.0.is_invalid() {
            unsafe {
                let _ = DeleteObject(HGDIOBJ(self.0.0));
            }
        }
    }
}

/// `HDESK` closed on drop.
struct ScopedDesktop(HDESK);

impl Drop for ScopedDesktop {
    fn drop(&mut self) {
        if !self.0.is_invalid() {
            unsafe {
                let _ = CloseDesktop(self.0);
            }
        }
    }
}

// ── GdiDesktop ───────────────────────────────────────────────────

/// GDI-backed [`DesktopOps`] implementation.
pub struct GdiDesktop {
    /// Desktop this thread is currently assigned to.
    bound: Option<ScopedDesktop>,
    /// Input desktop handle from the last `current_input_session` call,
    /// kept so `bind_to_session` can consume it.
    candidate: Option<(ScopedDesktop, SessionId)>,

    desktop_dc: Option<HDC>,
    memory_dc: Option<HDC>,
    dib: Option<HBITMAP>,
    dib_bits: *mut u8,
    dib_len: usize,

    /// Virtual-screen origin; the desktop may extend into negative
    /// coordinates on multi-monitor layouts.
    origin_x: i32,
    origin_y: i32,
}

// The raw DIB pointer is only dereferenced from the capture thread that
// owns this backend; nothing here is shared.
unsafe impl Send for GdiDesktop {}

impl GdiDesktop {
    pub fn new() -> Self {
        Self {
            bound: None,
            candidate: None,
            desktop_dc: None,
            memory_dc: None,
            dib: None,
            dib_bits: std::ptr::null_mut(),
            dib_len: 0,
            origin_x: 0,
            origin_y: 0,
        }
    }

    /// Name of a desktop object, used as the session identifier.
    fn desktop_name(desktop: HDESK) -> Option<String> {
        use windows::Win32::System::StationsAndDesktops::{
            GetUserObjectInformationW, UOI_NAME,
        };

        let mut buf = [0u16; 256];
        let mut needed = 0u32;
        unsafe {
            GetUserObjectInformationW(
                HANDLE(desktop.0),
                UOI_NAME,
                Some(buf.as_mut_ptr().cast()),
                (buf.len() * 2) as u32,
                Some(&mut needed),
            )
            .ok()?;
        }
        let len = buf.iter().position(|&c| c == 0).unwrap_or(buf.len());
        Some(String::from_utf16_lossy(&buf[..len]))
    }

    /// Read one GDI bitmap as top-down 32bpp pixels.
    fn read_bitmap_pixels(
        dc: HDC,
        bitmap: HBITMAP,
        width: i32,
        height: i32,
    ) -> Result<Vec<u32>, CaptureError> {
        let mut pixels = vec![0u32; (width * height) as usize];

        // GetDIBits converts to 32bpp along the way and zeroes the alpha
        // component of every pixel.
        let mut bmi = BITMAPV5HEADER {
            bV5Size: std::mem::size_of::<BITMAPV5HEADER>() as u32,
            bV5Width: width,
            bV5Height: -height, // top-down
            bV5Planes: 1,
            bV5BitCount: (BYTES_PER_PIXEL * 8) as u16,
            bV5Compression: BI_RGB.0,
            bV5AlphaMask: 0xFF00_0000,
            ..Default::default()
        };

        let rows = unsafe {
            GetDIBits(
                dc,
                bitmap,
                0,
                height as u32,
                Some(pixels.as_mut_ptr().cast()),
                (&raw mut bmi).cast::<BITMAPINFO>(),
                DIB_RGB_COLORS,
            )
        };
        if rows == 0 {
            return Err(CaptureError::Cursor("GetDIBits failed"));
        }

        Ok(pixels)
    }
}

impl Default for GdiDesktop {
    fn default() -> Self {
        Self::new()
    }
}

impl DesktopOps for GdiDesktop {
    fn current_input_session(&mut self) -> Option<SessionId> {
        let desktop = unsafe {
            OpenInputDesktop(0, false, DESKTOP_ACCESS_FLAGS(GENERIC_ALL.0)).ok()?
        };
        let desktop = ScopedDesktop(desktop);
        let name = Self::desktop_name(desktop.0)?;
        let session = SessionId::new(name);
        self.candidate = Some((desktop, session.clone()));
        Some(session)
    }

    fn bind_to_session(&mut self, session: &SessionId) -> bool {
        let Some((desktop, candidate_session)) = self.candidate.take() else {
            return false;
        };
        if candidate_session != *session {
            return false;
        }

        // If SetThreadDesktop fails the thread keeps its previous
        // desktop; the capturer continues from there.
        if unsafe { SetThreadDesktop(desktop.0) }.is_err() {
            return false;
        }
        self.bound = Some(desktop);
        true
    }

    fn display_bounds(&mut self) -> Rect {
        unsafe {
            self.origin_x = GetSystemMetrics(SM_XVIRTUALSCREEN);
            self.origin_y = GetSystemMetrics(SM_YVIRTUALSCREEN);
            let width = GetSystemMetrics(SM_CXVIRTUALSCREEN).max(0) as u32;
            let height = GetSystemMetrics(SM_CYVIRTUALSCREEN).max(0) as u32;
            Rect::from_size(width, height)
        }
    }

    fn create_resources(&mut self, bounds: Rect) -> Result<(), CaptureError> {
        self.release_resources();

        let desktop_dc = unsafe { GetDC(None) };
        if desktop_dc.is_invalid() {
            return Err(CaptureError::Resource("GetDC failed"));
        }
        self.desktop_dc = Some(desktop_dc);

        let memory_dc = unsafe { CreateCompatibleDC(Some(desktop_dc)) };
        if memory_dc.is_invalid() {
            return Err(CaptureError::Resource("CreateCompatibleDC failed"));
        }
        self.memory_dc = Some(memory_dc);

        // DIB section the size of the full display; BitBlt renders into
        // it and the bits are copied out through `dib_bits`.
        let info = BITMAPINFO {
            bmiHeader: BITMAPINFOHEADER {
                biSize: std::mem::size_of::<BITMAPINFOHEADER>() as u32,
                biWidth: bounds.width as i32,
                biHeight: -(bounds.height as i32), // top-down
                biPlanes: 1,
                biBitCount: (BYTES_PER_PIXEL * 8) as u16,
                biCompression: BI_RGB.0,
                ..Default::default()
            },
            ..Default::default()
        };

        let mut bits: *mut core::ffi::c_void = std::ptr::null_mut();
        let dib = unsafe {
            CreateDIBSection(
                Some(memory_dc),
                &info,
                DIB_RGB_COLORS,
                &mut bits,
                None,
                0,
            )
        }
        .map_err(|_| CaptureError::Resource("CreateDIBSection failed"))?;

        unsafe { SelectObject(memory_dc, HGDIOBJ(dib.0)) };

        self.dib = Some(dib);
        self.dib_bits = bits.cast();
        self.dib_len = bounds.width as usize * bounds.height as usize * BYTES_PER_PIXEL;
        Ok(())
    }

    fn release_resources(&mut self) {
        unsafe {
            if let Some(dib) = self.dib.take() {
                let _ = DeleteObject(HGDIOBJ(dib.0));
            }
            if let Some(memory_dc) = self.memory_dc.take() {
                let _ = DeleteDC(memory_dc);
            }
            if let Some(desktop_dc) = self.desktop_dc.take() {
                ReleaseDC(None, desktop_dc);
            }
        }
        self.dib_bits = std::ptr::null_mut();
        self.dib_len = 0;
    }

    fn copy_desktop_pixels(&mut self, dst: &mut Frame, bounds: Rect) -> Result<(), CaptureError> {
        let (Some(memory_dc), Some(desktop_dc)) = (self.memory_dc, self.desktop_dc) else {
            return Err(CaptureError::Resource("capture DCs missing"));
        };
        if self.dib_bits.is_null() || dst.byte_len() != self.dib_len {
            return Err(CaptureError::PixelCopy("DIB/frame size mismatch"));
        }

        unsafe {
            BitBlt(
                memory_dc,
                0,
                0,
                bounds.width as i32,
                bounds.height as i32,
                Some(desktop_dc),
                self.origin_x,
                self.origin_y,
                SRCCOPY | CAPTUREBLT,
            )
            .map_err(|_| CaptureError::PixelCopy("BitBlt failed"))?;

            std::ptr::copy_nonoverlapping(self.dib_bits, dst.data_mut().as_mut_ptr(), self.dib_len);
        }
        Ok(())
    }

    fn read_cursor(&mut self) -> Result<CursorBitmaps, CaptureError> {
        let mut cursor_info = CURSORINFO {
            cbSize: std::mem::size_of::<CURSORINFO>() as u32,
            ..Default::default()
        };
        unsafe { GetCursorInfo(&mut cursor_info) }
            .map_err(|_| CaptureError::Cursor("GetCursorInfo failed"))?;
        if cursor_info.flags != CURSOR_SHOWING {
            return Err(CaptureError::Cursor("cursor hidden"));
        }

        let mut icon_info = ICONINFO::default();
        unsafe { GetIconInfo(HICON(cursor_info.hCursor.0), &mut icon_info) }
            .map_err(|_| CaptureError::Cursor("GetIconInfo failed"))?;

        // Make sure the bitmaps are freed on every path below.
        let mask_bitmap = ScopedBitmap(icon_info.hbmMask);
        let color_bitmap = ScopedBitmap(icon_info.hbmColor);

        let mut bitmap = BITMAP::default();
        let got = unsafe {
            GetObjectW(
                HGDIOBJ(mask_bitmap.0.0),
                std::mem::size_of::<BITMAP>() as i32,
                Some((&raw mut bitmap).cast()),
            )
        };
        if got == 0 {
            return Err(CaptureError::Cursor("GetObjectW failed"));
        }

        let width = bitmap.bmWidth;
        let height = bitmap.bmHeight;

        let dc = self
            .memory_dc
            .or(self.desktop_dc)
            .ok_or(CaptureError::Resource("capture DCs missing"))?;

        let mask = Self::read_bitmap_pixels(dc, mask_bitmap.0, width, height)?;
        let color = if color_bitmap.0.is_invalid() {
            None
        } else {
            Some(Self::read_bitmap_pixels(dc, color_bitmap.0, width, height)?)
        };

        Ok(CursorBitmaps {
            width: width as u32,
            height: height as u32,
            mask,
            color,
            hotspot: Point::new(icon_info.xHotspot, icon_info.yHotspot),
        })
    }

    fn set_compositor_enabled(&mut self, enabled: bool) {
        // Best-effort vote; a no-op on Windows 8 and later, where DWM
        // composition can no longer be disabled.
        let action = if enabled {
            DWM_EC_ENABLECOMPOSITION
        } else {
            DWM_EC_DISABLECOMPOSITION
        };
        if unsafe { DwmEnableComposition(action) }.is_err() {
            warn!("DwmEnableComposition vote failed");
        }
    }
}

impl Drop for GdiDesktop {
    fn drop(&mut self) {
        self.release_resources();
    }
}
