//! Native viewer window and message pump.
//!
//! Produces [`WindowEvent`]s that the main loop turns into session
//! interactive calls and renderer updates. The wndproc forwards raw
//! events through an `mpsc` channel; nothing here touches the session
//! directly.

#[cfg(target_os = "windows")]
mod platform {
    use std::sync::mpsc;

    use windows::Win32::Foundation::*;
    use windows::Win32::System::LibraryLoader::GetModuleHandleW;
    use windows::Win32::UI::WindowsAndMessaging::*;
    use windows::core::PCWSTR;

    /// Events produced by the window message loop.
    #[derive(Debug, Clone)]
    pub enum WindowEvent {
        /// Window close requested.
        Close,
        /// Client area resized.
        Resize(u32, u32),
        /// Pointer moved (client-relative coordinates).
        MouseMove(i32, i32),
        /// Mouse button pressed or released.
        MouseButton(MouseBtn, bool),
        /// Wheel delta (positive = away from the user).
        MouseWheel(i16),
        /// Key event: virtual-key code, scan code, pressed.
        Key(u16, u16, bool),
    }

    /// Mouse button identifiers.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub enum MouseBtn {
        Left,
        Right,
        Middle,
    }

    /// Handle to the native window.
    pub struct ViewerWindow {
        hwnd: HWND,
        event_rx: mpsc::Receiver<WindowEvent>,
    }

    // The boxed event sender lives in GWLP_USERDATA for as long as the
    // window exists; Drop reclaims it.
    unsafe extern "system" fn wndproc(
        hwnd: HWND,
        msg: u32,
        wparam: WPARAM,
        lparam: LPARAM,
    ) -> LRESULT {
        let tx_ptr =
            unsafe { GetWindowLongPtrW(hwnd, GWLP_USERDATA) } as *const mpsc::Sender<WindowEvent>;
        if tx_ptr.is_null() {
            return unsafe { DefWindowProcW(hwnd, msg, wparam, lparam) };
        }
        let tx = unsafe { &*tx_ptr };

        let event = match msg {
            WM_CLOSE => Some(WindowEvent::Close),
            WM_SIZE => {
                let w = (lparam.0 & 0xFFFF) as u32;
                let h = ((lparam.0 >> 16) & 0xFFFF) as u32;
                Some(WindowEvent::Resize(w, h))
            }
            WM_MOUSEMOVE => {
                let x = (lparam.0 & 0xFFFF) as i16 as i32;
                let y = ((lparam.0 >> 16) & 0xFFFF) as i16 as i32;
                Some(WindowEvent::MouseMove(x, y))
            }
            WM_LBUTTONDOWN => Some(WindowEvent::MouseButton(MouseBtn::Left, true)),
            WM_LBUTTONUP => Some(WindowEvent::MouseButton(MouseBtn::Left, false)),
            WM_RBUTTONDOWN => Some(WindowEvent::MouseButton(MouseBtn::Right, true)),
            WM_RBUTTONUP => Some(WindowEvent::MouseButton(MouseBtn::Right, false)),
            WM_MBUTTONDOWN => Some(WindowEvent::MouseButton(MouseBtn::Middle, true)),
            WM_MBUTTONUP => Some(WindowEvent::MouseButton(MouseBtn::Middle, false)),
            WM_MOUSEWHEEL => {
                let delta = ((wparam.0 >> 16) & 0xFFFF) as i16;
                Some(WindowEvent::MouseWheel(delta))
            }
            WM_KEYDOWN | WM_SYSKEYDOWN | WM_KEYUP | WM_SYSKEYUP => {
                let vk = (wparam.0 & 0xFFFF) as u16;
                let scan = ((lparam.0 >> 16) & 0xFF) as u16;
                let pressed = matches!(msg, WM_KEYDOWN | WM_SYSKEYDOWN);
                Some(WindowEvent::Key(vk, scan, pressed))
            }
            WM_DESTROY => {
                unsafe { PostQuitMessage(0) };
                None
            }
            _ => return unsafe { DefWindowProcW(hwnd, msg, wparam, lparam) },
        };

        if let Some(event) = event {
            let _ = tx.send(event);
        }
        LRESULT(0)
    }

    impl ViewerWindow {
        /// Create a new top-level window.
        pub fn create(title: &str, width: u32, height: u32) -> Result<Self, String> {
            let (event_tx, event_rx) = mpsc::channel();

            let hinstance = unsafe { GetModuleHandleW(None) }
                .map_err(|e| format!("GetModuleHandle: {e}"))?;

            let class_name_wide: Vec<u16> = "RvuViewerClass\0".encode_utf16().collect();
            let wc = WNDCLASSW {
                lpfnWndProc: Some(wndproc),
                hInstance: hinstance.into(),
                lpszClassName: PCWSTR(class_name_wide.as_ptr()),
                hCursor: unsafe { LoadCursorW(None, IDC_ARROW) }.unwrap_or_default(),
                ..Default::default()
            };
            if unsafe { RegisterClassW(&wc) } == 0 {
                return Err("RegisterClassW failed".into());
            }

            let title_wide: Vec<u16> = title.encode_utf16().chain(std::iter::once(0)).collect();
            let hwnd = unsafe {
                CreateWindowExW(
                    WINDOW_EX_STYLE(0),
                    PCWSTR(class_name_wide.as_ptr()),
                    PCWSTR(title_wide.as_ptr()),
                    WS_OVERLAPPEDWINDOW | WS_VISIBLE,
                    CW_USEDEFAULT,
                    CW_USEDEFAULT,
                    width as i32,
                    height as i32,
                    None,
                    None,
                    hinstance,
                    None,
                )
            }
            .map_err(|e| format!("CreateWindowExW failed: {e}"))?;

            if hwnd.is_invalid() {
                return Err("CreateWindowExW returned invalid HWND".into());
            }

            let tx_ptr = Box::into_raw(Box::new(event_tx));
            unsafe {
                SetWindowLongPtrW(hwnd, GWLP_USERDATA, tx_ptr as isize);
            }

            Ok(Self { hwnd, event_rx })
        }

        /// Pump pending window messages and return the collected events.
        pub fn poll_events(&self) -> Vec<WindowEvent> {
            unsafe {
                let mut msg = MSG::default();
                while PeekMessageW(&mut msg, self.hwnd, 0, 0, PM_REMOVE).as_bool() {
                    let _ = TranslateMessage(&msg);
                    DispatchMessageW(&msg);
                }
            }
            let mut events = Vec::new();
            while let Ok(event) = self.event_rx.try_recv() {
                events.push(event);
            }
            events
        }

        /// The raw window handle.
        pub fn hwnd(&self) -> windows::Win32::Foundation::HWND {
            self.hwnd
        }
    }

    impl Drop for ViewerWindow {
        fn drop(&mut self) {
            unsafe {
                let ptr = GetWindowLongPtrW(self.hwnd, GWLP_USERDATA)
                    as *mut mpsc::Sender<WindowEvent>;
                if !ptr.is_null() {
                    drop(Box::from_raw(ptr));
                    SetWindowLongPtrW(self.hwnd, GWLP_USERDATA, 0);
                }
                let _ = DestroyWindow(self.hwnd);
            }
        }
    }
}

#[cfg(target_os = "windows")]
pub use platform::*;

// ── Non-Windows stub ─────────────────────────────────────────────

#[cfg(not(target_os = "windows"))]
pub mod stub {
    /// Events produced by the window message loop.
    #[derive(Debug, Clone)]
    pub enum WindowEvent {
        Close,
        Resize(u32, u32),
        MouseMove(i32, i32),
        MouseButton(MouseBtn, bool),
        MouseWheel(i16),
        Key(u16, u16, bool),
    }

    /// Mouse button identifiers.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub enum MouseBtn {
        Left,
        Right,
        Middle,
    }

    pub struct ViewerWindow;

    impl ViewerWindow {
        pub fn create(_title: &str, _w: u32, _h: u32) -> Result<Self, String> {
            Err("window creation is only supported on Windows".into())
        }

        pub fn poll_events(&self) -> Vec<WindowEvent> {
            Vec::new()
        }

        pub fn hwnd(&self) {}
    }
}

#[cfg(not(target_os = "windows"))]
pub use stub::*;
