//! Error types for the capture pipeline.
//!
//! All fallible operations return `Result<T, CaptureError>`. Variants are
//! split along the recovery boundaries the update loop cares about:
//! resource errors are retried on the next cycle, cursor errors degrade to
//! "no shape this cycle", encoder initialisation errors are terminal.

use thiserror::Error;

/// The canonical error type for the capture pipeline.
#[derive(Debug, Error)]
pub enum CaptureError {
    // ── Resource Errors ──────────────────────────────────────────
    /// The capture thread could not be bound to the input session.
    #[error("failed to bind capture thread to input session")]
    SessionBind,

    /// A capture-side resource (device context, bitmap, frame buffer)
    /// could not be created.
    #[error("capture resource creation failed: {0}")]
    Resource(&'static str),

    /// The bulk pixel copy from the live desktop surface failed.
    #[error("desktop pixel copy failed: {0}")]
    PixelCopy(&'static str),

    // ── Cursor Errors ────────────────────────────────────────────
    /// The OS cursor resource could not be read or was malformed.
    #[error("cursor read failed: {0}")]
    Cursor(&'static str),

    // ── Encoder Errors ───────────────────────────────────────────
    /// The configured encoding kind is unsupported or misconfigured.
    /// Fatal at update-loop start.
    #[error("encoder initialisation failed: {0}")]
    EncoderInit(String),

    /// Encoding a frame or cursor shape failed.
    #[error("encoding error: {0}")]
    Encoding(String),

    // ── System Errors ────────────────────────────────────────────
    /// The OS layer reported an I/O error.
    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),
}

impl CaptureError {
    /// Whether this error is resource-class: capture-fatal for the
    /// current cycle only, retried on the next one.
    pub fn is_resource(&self) -> bool {
        matches!(
            self,
            CaptureError::SessionBind
                | CaptureError::Resource(_)
                | CaptureError::PixelCopy(_)
                | CaptureError::Io(_)
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_display_messages() {
        let e = CaptureError::Resource("memory dc");
        assert!(e.to_string().contains("memory dc"));

        let e = CaptureError::EncoderInit("zstd level 40".into());
        assert!(e.to_string().contains("zstd level 40"));
    }

    #[test]
    fn resource_classification() {
        assert!(CaptureError::SessionBind.is_resource());
        assert!(CaptureError::PixelCopy("blit").is_resource());
        assert!(!CaptureError::Cursor("bad mask").is_resource());
        assert!(!CaptureError::EncoderInit("kind".into()).is_resource());
    }

    #[test]
    fn from_io() {
        let io_err = std::io::Error::new(std::io::ErrorKind::OutOfMemory, "alloc");
        let e: CaptureError = io_err.into();
        assert!(matches!(e, CaptureError::Io(_)));
    }
}
