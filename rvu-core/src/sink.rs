//! Consumer-side frame hand-off.
//!
//! The session (on the library worker thread) delivers resize and
//! region-update notifications to a [`FrameSink`]; [`SharedFrame`] is the
//! standard sink that double-buffers the latest complete frame for a
//! renderer polling at its own cadence.

use std::sync::{Arc, Mutex};

use bytes::Bytes;
use tracing::warn;

use crate::framebuffer::{BYTES_PER_PIXEL, PixelBuffer};
use crate::remote::Rect;

// ── FrameSink ────────────────────────────────────────────────────

/// Receiver of frame-buffer notifications from a running session.
///
/// These two callbacks are the only notifications a rendering surface
/// needs to implement. Both are invoked on the library worker thread, so
/// implementations must hand any UI work to the dispatcher.
pub trait FrameSink: Send + Sync {
    /// The frame buffer has been (re)allocated, or released.
    ///
    /// `buffer` is `None` when a session ends (blank screen). The stride
    /// is in pixels and always equals the width for a live buffer.
    /// `request_window_resize` is set when the geometry change was
    /// initiated by the remote peer rather than the local window.
    fn on_framebuffer_resized(
        &self,
        width: u32,
        height: u32,
        stride: u32,
        buffer: Option<Arc<PixelBuffer>>,
        request_window_resize: bool,
    );

    /// A sub-rectangle of the registered buffer holds fresh pixel data.
    fn on_framebuffer_updated(&self, region: Rect);
}

// ── SharedFrame ──────────────────────────────────────────────────

/// A complete frame ready for upload.
#[derive(Debug, Clone)]
pub struct FrameImage {
    pub width: u32,
    pub height: u32,
    /// Row stride in pixels.
    pub stride: u32,
    pub pixels: Bytes,
}

struct SharedFrameState {
    buffer: Option<Arc<PixelBuffer>>,
    width: u32,
    height: u32,
    stride: u32,
    /// Geometry change the consumer has not picked up yet.
    pending_resize: Option<(u32, u32, bool)>,
    /// Union of dirty rectangles since the last `take_dirty`.
    dirty: Option<Rect>,
}

/// The standard [`FrameSink`]: holds one buffer reference, replaced
/// wholesale under a lock, so a polling renderer never observes a
/// half-updated reference.
pub struct SharedFrame {
    state: Mutex<SharedFrameState>,
}

impl SharedFrame {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            state: Mutex::new(SharedFrameState {
                buffer: None,
                width: 0,
                height: 0,
                stride: 0,
                pending_resize: None,
                dirty: None,
            }),
        })
    }

    /// Snapshot the most recent complete frame.
    ///
    /// Validates that the buffer length matches the last-reported
    /// `width * height * 4` before exposing it; on mismatch the upload is
    /// skipped with a warning rather than reading out of bounds. The lock
    /// is held only for the reference clone, not the pixel copy.
    pub fn latest(&self) -> Option<FrameImage> {
        let (buffer, width, height, stride) = {
            let state = self.state.lock().expect("frame lock poisoned");
            (
                state.buffer.clone()?,
                state.width,
                state.height,
                state.stride,
            )
        };

        let pixels = buffer.snapshot();
        let expected = width as usize * height as usize * BYTES_PER_PIXEL;
        if pixels.len() != expected {
            warn!(
                expected,
                actual = pixels.len(),
                "framebuffer length disagrees with reported geometry; skipping frame"
            );
            return None;
        }

        Some(FrameImage {
            width,
            height,
            stride,
            pixels,
        })
    }

    /// Pending geometry change, if any: `(width, height,
    /// request_window_resize)`. Consumed on read.
    pub fn take_resize(&self) -> Option<(u32, u32, bool)> {
        self.state
            .lock()
            .expect("frame lock poisoned")
            .pending_resize
            .take()
    }

    /// Union of regions updated since the last call. Consumed on read.
    ///
    /// Current consumers re-upload the full frame; the rectangle is
    /// recorded so a later implementation can upload partial regions.
    pub fn take_dirty(&self) -> Option<Rect> {
        self.state
            .lock()
            .expect("frame lock poisoned")
            .dirty
            .take()
    }
}

impl FrameSink for SharedFrame {
    fn on_framebuffer_resized(
        &self,
        width: u32,
        height: u32,
        stride: u32,
        buffer: Option<Arc<PixelBuffer>>,
        request_window_resize: bool,
    ) {
        let mut state = self.state.lock().expect("frame lock poisoned");
        match buffer {
            Some(buffer) => {
                state.buffer = Some(buffer);
                state.width = width;
                state.height = height;
                state.stride = stride;
                state.dirty = Some(Rect::full(width, height));
                state.pending_resize = Some((width, height, request_window_resize));
            }
            None => {
                // Session over — blank screen.
                state.buffer = None;
                state.width = 0;
                state.height = 0;
                state.stride = 0;
                state.dirty = None;
                state.pending_resize = None;
            }
        }
    }

    fn on_framebuffer_updated(&self, region: Rect) {
        let mut state = self.state.lock().expect("frame lock poisoned");
        state.dirty = Some(match state.dirty {
            Some(existing) => existing.union(&region),
            None => region,
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn latest_matches_reported_geometry() {
        let sink = SharedFrame::new();
        let buf = PixelBuffer::new(640, 480).unwrap();
        sink.on_framebuffer_resized(640, 480, 640, Some(buf), false);

        let frame = sink.latest().expect("frame should be available");
        assert_eq!((frame.width, frame.height), (640, 480));
        assert_eq!(frame.pixels.len(), 640 * 480 * 4);
    }

    #[test]
    fn mismatched_length_is_skipped() {
        let sink = SharedFrame::new();
        let buf = PixelBuffer::new(4, 4).unwrap();
        // Declared geometry disagrees with the actual allocation.
        sink.on_framebuffer_resized(8, 8, 8, Some(buf), false);
        assert!(sink.latest().is_none());
    }

    #[test]
    fn blank_on_session_end() {
        let sink = SharedFrame::new();
        let buf = PixelBuffer::new(640, 480).unwrap();
        sink.on_framebuffer_resized(640, 480, 640, Some(buf), false);
        assert!(sink.latest().is_some());

        sink.on_framebuffer_resized(0, 0, 0, None, false);
        assert!(sink.latest().is_none());
        assert!(sink.take_resize().is_none());
    }

    #[test]
    fn dirty_rects_merge() {
        let sink = SharedFrame::new();
        let buf = PixelBuffer::new(100, 100).unwrap();
        sink.on_framebuffer_resized(100, 100, 100, Some(buf), false);
        let _ = sink.take_dirty();

        sink.on_framebuffer_updated(Rect::new(0, 0, 10, 10));
        sink.on_framebuffer_updated(Rect::new(20, 20, 10, 10));
        assert_eq!(sink.take_dirty(), Some(Rect::new(0, 0, 30, 30)));
        assert!(sink.take_dirty().is_none());
    }

    #[test]
    fn resize_is_consumed_once() {
        let sink = SharedFrame::new();
        let buf = PixelBuffer::new(640, 480).unwrap();
        sink.on_framebuffer_resized(640, 480, 640, Some(buf), true);
        assert_eq!(sink.take_resize(), Some((640, 480, true)));
        assert!(sink.take_resize().is_none());
    }
}
