//! Viewer frame-buffer ownership.
//!
//! [`PixelBuffer`] is the flat `width * height * 4` byte allocation the
//! library decodes into; [`FrameBuffer`] owns the current allocation for a
//! session and handles reallocation on geometry changes. A new allocation
//! is installed with the library before the previous one is dropped, so an
//! in-flight read never loses its backing storage.

use std::sync::{Arc, Mutex};

use bytes::Bytes;

use crate::error::RvuError;
use crate::remote::{PixelFormat, RemoteConnection};

/// Bytes per pixel. The viewer always runs a 4-byte format.
pub const BYTES_PER_PIXEL: usize = 4;

// ── PixelBuffer ──────────────────────────────────────────────────

/// A fixed-size pixel allocation shared between the session and the
/// library.
///
/// Dimensions are immutable; a geometry change allocates a new buffer.
/// Pixel access is serialized by the internal lock, held only for the
/// duration of a write or a snapshot copy.
pub struct PixelBuffer {
    width: u32,
    height: u32,
    stride: u32,
    data: Mutex<Box<[u8]>>,
}

impl PixelBuffer {
    /// Allocate a zeroed buffer of exactly `width * height * 4` bytes,
    /// with stride equal to the width.
    pub fn new(width: u32, height: u32) -> Result<Arc<Self>, RvuError> {
        if width == 0 || height == 0 {
            return Err(RvuError::InvalidGeometry { width, height });
        }
        let len = width as usize * height as usize * BYTES_PER_PIXEL;
        Ok(Arc::new(Self {
            width,
            height,
            stride: width,
            data: Mutex::new(vec![0u8; len].into_boxed_slice()),
        }))
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    /// Row stride in pixels (always equal to the width).
    pub fn stride(&self) -> u32 {
        self.stride
    }

    /// Total byte length of the allocation.
    pub fn byte_len(&self) -> usize {
        self.width as usize * self.height as usize * BYTES_PER_PIXEL
    }

    /// Copy the current contents out as an owned [`Bytes`].
    pub fn snapshot(&self) -> Bytes {
        let data = self.data.lock().expect("pixel lock poisoned");
        Bytes::copy_from_slice(&data)
    }

    /// Mutate the pixel contents under the lock.
    ///
    /// Used by library implementations to deliver decoded pixels.
    pub fn write_with(&self, f: impl FnOnce(&mut [u8])) {
        let mut data = self.data.lock().expect("pixel lock poisoned");
        f(&mut data);
    }
}

impl std::fmt::Debug for PixelBuffer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PixelBuffer")
            .field("width", &self.width)
            .field("height", &self.height)
            .field("stride", &self.stride)
            .finish()
    }
}

// ── FrameBuffer ──────────────────────────────────────────────────

/// Session-side owner of the registered pixel allocation.
pub struct FrameBuffer {
    format: PixelFormat,
    current: Option<Arc<PixelBuffer>>,
}

impl FrameBuffer {
    pub fn new(format: PixelFormat) -> Self {
        Self {
            format,
            current: None,
        }
    }

    /// The currently installed allocation, if any.
    pub fn current(&self) -> Option<&Arc<PixelBuffer>> {
        self.current.as_ref()
    }

    /// Allocate a buffer for the new geometry and register it with the
    /// library. The previous allocation is only dropped after the new one
    /// has been installed.
    pub fn resize(
        &mut self,
        conn: &mut dyn RemoteConnection,
        width: u32,
        height: u32,
    ) -> Result<Arc<PixelBuffer>, RvuError> {
        let next = PixelBuffer::new(width, height)?;
        conn.register_framebuffer(Arc::clone(&next), self.format)?;
        self.current = Some(Arc::clone(&next));
        Ok(next)
    }

    /// Drop the current allocation. The library-side reference (if the
    /// connection still holds one) keeps the storage alive.
    pub fn release(&mut self) {
        self.current = None;
    }
}
