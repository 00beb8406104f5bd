//! Frame renderer — blits the session's frame buffer into the window.
//!
//! Uses GDI `StretchDIBits` for maximum compatibility; the dirty
//! rectangle the sink records would allow partial blits in a later
//! iteration.

#[cfg(target_os = "windows")]
mod platform {
    use rvu_core::{FrameImage, RvuError};
    use windows::Win32::Foundation::*;
    use windows::Win32::Graphics::Gdi::*;

    /// Renders BGRA8 frames into an HWND using GDI.
    pub struct FrameRenderer {
        hwnd: HWND,
        width: u32,
        height: u32,
    }

    impl FrameRenderer {
        /// Create a renderer targeting the given window.
        pub fn new(hwnd: HWND, width: u32, height: u32) -> Self {
            Self {
                hwnd,
                width,
                height,
            }
        }

        /// Update the target size (call after a window resize).
        pub fn resize(&mut self, width: u32, height: u32) {
            self.width = width;
            self.height = height;
        }

        /// Stretch-blit `frame` to fill the window.
        pub fn render(&self, frame: &FrameImage) -> Result<(), RvuError> {
            let expected = frame.width as usize * frame.height as usize * 4;
            if frame.pixels.len() != expected {
                return Err(RvuError::BufferMismatch {
                    expected,
                    actual: frame.pixels.len(),
                });
            }
            if frame.width == 0 || frame.height == 0 {
                return Ok(());
            }

            unsafe {
                let hdc = GetDC(self.hwnd);
                if hdc.is_invalid() {
                    return Err(RvuError::Other("GetDC failed".into()));
                }

                let bmi = BITMAPINFO {
                    bmiHeader: BITMAPINFOHEADER {
                        biSize: std::mem::size_of::<BITMAPINFOHEADER>() as u32,
                        biWidth: frame.width as i32,
                        // Negative height = top-down DIB (origin at top-left).
                        biHeight: -(frame.height as i32),
                        biPlanes: 1,
                        biBitCount: 32,
                        biCompression: BI_RGB.0,
                        biSizeImage: 0,
                        biXPelsPerMeter: 0,
                        biYPelsPerMeter: 0,
                        biClrUsed: 0,
                        biClrImportant: 0,
                    },
                    bmiColors: [RGBQUAD::default(); 1],
                };

                StretchDIBits(
                    hdc,
                    0,
                    0,
                    self.width as i32,
                    self.height as i32,
                    0,
                    0,
                    frame.width as i32,
                    frame.height as i32,
                    Some(frame.pixels.as_ptr() as *const _),
                    &bmi,
                    DIB_RGB_COLORS,
                    SRCCOPY,
                );

                ReleaseDC(self.hwnd, hdc);
            }

            Ok(())
        }
    }
}

#[cfg(target_os = "windows")]
pub use platform::*;

// ── Non-Windows stub ─────────────────────────────────────────────

#[cfg(not(target_os = "windows"))]
pub mod stub {
    use rvu_core::{FrameImage, RvuError};

    pub struct FrameRenderer;

    impl FrameRenderer {
        pub fn new(_hwnd: (), _w: u32, _h: u32) -> Self {
            Self
        }

        pub fn resize(&mut self, _w: u32, _h: u32) {}

        pub fn render(&self, _frame: &FrameImage) -> Result<(), RvuError> {
            Err(RvuError::Other(
                "frame rendering is only supported on Windows".into(),
            ))
        }
    }
}

#[cfg(not(target_os = "windows"))]
pub use stub::*;
