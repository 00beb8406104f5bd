//! Contract with the external remote-access library.
//!
//! The wire protocol, encodings, and authentication all live behind this
//! seam; the core only drives the lifecycle. A real vendor library is
//! wrapped in these traits by the embedding application; the in-process
//! [`crate::loopback`] implementation backs tests and demo mode.
//!
//! The library delivers its notifications as [`RemoteEvent`] values sent
//! through the [`EventSender`] supplied at connect time. Events are
//! processed by the session's blocking run loop on the library worker
//! thread, so an implementation may deliver them from any thread it owns.

use std::sync::Arc;
use std::sync::mpsc;

use crate::error::RvuError;
use crate::framebuffer::PixelBuffer;
use crate::session::SessionMessage;

// ── PixelFormat ──────────────────────────────────────────────────

/// Pixel layout of the viewer frame buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PixelFormat {
    /// 4 bytes per pixel: Blue, Green, Red, Alpha.
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

// ── Rect ─────────────────────────────────────────────────────────

/// A sub-rectangle of the frame buffer, in pixels.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Rect {
    pub x: u32,
    pub y: u32,
    pub width: u32,
    pub height: u32,
}

impl Rect {
    pub const fn new(x: u32, y: u32, width: u32, height: u32) -> Self {
        Self {
            x,
            y,
            width,
            height,
        }
    }

    /// Rectangle covering a full `width` x `height` buffer.
    pub const fn full(width: u32, height: u32) -> Self {
        Self::new(0, 0, width, height)
    }

    pub const fn is_empty(&self) -> bool {
        self.width == 0 || self.height == 0
    }

    /// Smallest rectangle covering both `self` and `other`.
    pub fn union(&self, other: &Rect) -> Rect {
        if self.is_empty() {
            return *other;
        }
        if other.is_empty() {
            return *self;
        }
        let x1 = self.x.min(other.x);
        let y1 = self.y.min(other.y);
        let x2 = (self.x + self.width).max(other.x + other.width);
        let y2 = (self.y + self.height).max(other.y + other.height);
        Rect::new(x1, y1, x2 - x1, y2 - y1)
    }
}

// ── Flags ────────────────────────────────────────────────────────

bitflags::bitflags! {
    /// Flags attached to a disconnect notification, carried verbatim
    /// from the library.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
    pub struct DisconnectFlags: u32 {
        /// The connection was shut down cleanly at the protocol level.
        const CLEAN = 1 << 0;
        /// The remote peer initiated the disconnection.
        const REMOTE_INITIATED = 1 << 1;
        /// The connection ended due to an authentication failure.
        const AUTH_FAILURE = 1 << 2;
        /// The local user requested the disconnection.
        const USER_REQUESTED = 1 << 3;
    }
}

bitflags::bitflags! {
    /// Pointer button state for [`RemoteConnection::send_pointer`].
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
    pub struct MouseButtons: u8 {
        const LEFT = 1 << 0;
        const MIDDLE = 1 << 1;
        const RIGHT = 1 << 2;
    }
}

/// Scroll wheel axis for [`RemoteConnection::send_scroll`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScrollAxis {
    Horizontal,
    Vertical,
}

// ── RemoteEvent ──────────────────────────────────────────────────

/// Notifications delivered by the library to a running session.
#[derive(Debug, Clone)]
pub enum RemoteEvent {
    /// The connection to the remote peer has been established.
    Connected,
    /// The connection ended. Reason and flags are supplied by the
    /// library verbatim.
    Disconnected {
        reason: String,
        flags: DisconnectFlags,
    },
    /// The remote screen geometry changed.
    ServerSizeChanged { width: u32, height: u32 },
    /// Fresh pixel data has been written to the registered frame buffer.
    RegionUpdated(Rect),
    /// The remote peer changed its advertised name.
    FriendlyNameChanged(String),
}

/// Sending half handed to the library at connect time.
///
/// Cloneable so a library implementation may deliver events from its own
/// threads. Sends after the session has ended are silently dropped.
#[derive(Clone)]
pub struct EventSender {
    pub(crate) tx: mpsc::Sender<SessionMessage>,
}

impl EventSender {
    /// Deliver an event to the owning session.
    pub fn send(&self, event: RemoteEvent) {
        let _ = self.tx.send(SessionMessage::Remote(event));
    }
}

// ── Library traits ───────────────────────────────────────────────

/// Process-wide entry points of the remote-access library.
///
/// Initialization and shutdown happen exactly once per worker lifetime,
/// and every method is only ever invoked on the library worker thread.
pub trait RemoteLibrary: Send + 'static {
    /// Initialize the library. Called once, before any connection.
    fn initialize(&mut self) -> Result<(), RvuError>;

    /// Shut the library down. Called once, after the last connection.
    fn shutdown(&mut self);

    /// Open a new, not-yet-connected connection object.
    fn open(&mut self) -> Result<Box<dyn RemoteConnection>, RvuError>;
}

/// One connection to a remote peer.
///
/// Only used on the library worker thread, within a single session's
/// lifetime. Dropping the object tears the connection down abruptly.
pub trait RemoteConnection {
    /// Begin connecting to `host:port`. Completion is reported through
    /// `events` ([`RemoteEvent::Connected`] or a disconnect).
    fn connect(&mut self, host: &str, port: u16, events: EventSender) -> Result<(), RvuError>;

    /// Request a clean protocol-level disconnect. The library confirms
    /// with [`RemoteEvent::Disconnected`].
    fn disconnect(&mut self);

    fn send_key_down(&mut self, keysym: u32, keycode: u32) -> Result<(), RvuError>;

    fn send_key_up(&mut self, keycode: u32) -> Result<(), RvuError>;

    fn send_pointer(&mut self, x: i32, y: i32, buttons: MouseButtons) -> Result<(), RvuError>;

    fn send_scroll(&mut self, delta: i32, axis: ScrollAxis) -> Result<(), RvuError>;

    /// Register the buffer the library decodes incoming pixels into.
    ///
    /// Replaces any previously registered buffer; the caller keeps the
    /// previous allocation alive until this returns.
    fn register_framebuffer(
        &mut self,
        buffer: Arc<PixelBuffer>,
        format: PixelFormat,
    ) -> Result<(), RvuError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pixel_format_size() {
        assert_eq!(PixelFormat::Bgra8.bytes_per_pixel(), 4);
        assert_eq!(PixelFormat::Rgba8.bytes_per_pixel(), 4);
    }

    #[test]
    fn rect_helpers() {
        assert!(Rect::new(0, 0, 0, 10).is_empty());
        let r = Rect::full(1920, 1080);
        assert_eq!((r.width, r.height), (1920, 1080));
        assert!(!r.is_empty());
    }

    #[test]
    fn disconnect_flags_compose() {
        let f = DisconnectFlags::CLEAN | DisconnectFlags::USER_REQUESTED;
        assert!(f.contains(DisconnectFlags::CLEAN));
        assert!(!f.contains(DisconnectFlags::AUTH_FAILURE));
    }
}
