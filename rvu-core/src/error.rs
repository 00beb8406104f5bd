//! Error types for the RVU viewer core.
//!
//! All fallible operations return `Result<T, RvuError>`.
//! The only unrecoverable condition is a library initialization failure,
//! which is surfaced exactly once through the worker's start future.

use thiserror::Error;

/// The canonical error type for the viewer core.
#[derive(Debug, Error)]
pub enum RvuError {
    // ── Library Errors ───────────────────────────────────────────
    /// The remote-access library failed to load or initialize.
    ///
    /// Fatal to the library worker; reported once via the start future.
    #[error("library initialization failed: {message}")]
    Init { message: String },

    /// The library worker has been stopped; no further sessions may run.
    #[error("library worker has been stopped")]
    WorkerStopped,

    /// A session was started while a previous one was still current.
    #[error("a viewer session is already running")]
    SessionActive,

    // ── Connection Errors ────────────────────────────────────────
    /// The transport layer reported an error before or during a session.
    #[error("connection error: {0}")]
    Connection(#[from] std::io::Error),

    /// A channel between threads was closed unexpectedly.
    #[error("channel closed")]
    ChannelClosed,

    // ── Frame-buffer Errors ──────────────────────────────────────
    /// A frame buffer was requested with a zero dimension.
    #[error("invalid framebuffer geometry: {width}x{height}")]
    InvalidGeometry { width: u32, height: u32 },

    /// A pixel buffer's length disagrees with its declared dimensions.
    #[error("framebuffer length mismatch: expected {expected} bytes, got {actual}")]
    BufferMismatch { expected: usize, actual: usize },

    /// Catch-all for errors that do not fit another variant.
    #[error("{0}")]
    Other(String),
}

// ── Convenient From implementations ──────────────────────────────

impl From<String> for RvuError {
    fn from(s: String) -> Self {
        RvuError::Other(s)
    }
}

impl From<&str> for RvuError {
    fn from(s: &str) -> Self {
        RvuError::Other(s.to_string())
    }
}

impl<T> From<std::sync::mpsc::SendError<T>> for RvuError {
    fn from(_: std::sync::mpsc::SendError<T>) -> Self {
        RvuError::ChannelClosed
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_display_messages() {
        let e = RvuError::Init {
            message: "missing shared object".into(),
        };
        assert!(e.to_string().contains("missing shared object"));

        let e = RvuError::BufferMismatch {
            expected: 8294400,
            actual: 0,
        };
        assert!(e.to_string().contains("8294400"));
    }

    #[test]
    fn from_string() {
        let e: RvuError = "something broke".into();
        assert!(matches!(e, RvuError::Other(_)));
    }

    #[test]
    fn from_io() {
        let io_err = std::io::Error::new(std::io::ErrorKind::ConnectionRefused, "refused");
        let e: RvuError = io_err.into();
        assert!(matches!(e, RvuError::Connection(_)));
    }

    #[test]
    fn from_send_error() {
        let (tx, rx) = std::sync::mpsc::channel::<u8>();
        drop(rx);
        let e: RvuError = tx.send(1).unwrap_err().into();
        assert!(matches!(e, RvuError::ChannelClosed));
    }
}
