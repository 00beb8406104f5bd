//! One viewer session: a single connection attempt, from connect through
//! disconnect.
//!
//! A session's [`run`](ViewerSession::run) executes on the library worker
//! thread and blocks until the connection ends. All protocol events from
//! the library and all interactive calls marshalled from other threads
//! arrive on one FIFO channel, so everything the session does happens on
//! the worker thread in a deterministic order.
//!
//! Every `run` reports exactly one disconnect notification — clean,
//! remote-initiated, and error exits all funnel through the same path.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::mpsc;

use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::dispatcher::Dispatcher;
use crate::error::RvuError;
use crate::framebuffer::FrameBuffer;
use crate::remote::{
    DisconnectFlags, EventSender, MouseButtons, PixelFormat, RemoteEvent, RemoteLibrary,
    ScrollAxis,
};
use crate::sink::FrameSink;

/// Canvas used when the caller does not configure one.
pub const DEFAULT_CANVAS: (u32, u32) = (1920, 1080);

/// Smallest permitted buffer dimension, to avoid degenerate allocations.
pub const MIN_DIMENSION: u32 = 10;

// ── SessionConfig ────────────────────────────────────────────────

/// Connection target and canvas for one session.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionConfig {
    /// Remote host address.
    pub host: String,
    /// Remote TCP port.
    pub port: u16,
    /// Desired canvas size; defaults to 1920x1080 when unset.
    pub canvas: Option<(u32, u32)>,
}

// ── SessionPhase ─────────────────────────────────────────────────

/// Lifecycle phase of a viewer session.
///
/// ```text
///  Created ──► Connecting ──► Connected ──► Disconnecting ──► Disconnected
///                  │                                               ▲
///                  └───────────────────────────────────────────────┘
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SessionPhase {
    #[default]
    Created,
    Connecting,
    Connected,
    Disconnecting,
    Disconnected,
}

impl std::fmt::Display for SessionPhase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Self::Created => "Created",
            Self::Connecting => "Connecting",
            Self::Connected => "Connected",
            Self::Disconnecting => "Disconnecting",
            Self::Disconnected => "Disconnected",
        };
        write!(f, "{name}")
    }
}

// ── Messages ─────────────────────────────────────────────────────

/// Everything a running session processes, in FIFO order.
pub(crate) enum SessionMessage {
    /// A protocol event delivered by the library.
    Remote(RemoteEvent),
    /// An interactive call marshalled from another thread.
    Command(SessionCommand),
    /// Abrupt break from [`crate::worker::LibraryWorker::stop`]. No clean
    /// protocol disconnect is attempted.
    HardStop,
}

pub(crate) enum SessionCommand {
    Disconnect,
    KeyDown { keysym: u32, keycode: u32 },
    KeyUp { keycode: u32 },
    Pointer { x: i32, y: i32, buttons: MouseButtons },
    Scroll { delta: i32, axis: ScrollAxis },
    ResizeCanvas { width: u32, height: u32 },
}

// ── Callbacks ────────────────────────────────────────────────────

#[derive(Default)]
struct SessionCallbacks {
    on_connect: Option<Box<dyn FnOnce() + Send>>,
    on_disconnect: Option<Box<dyn FnOnce(String, DisconnectFlags) + Send>>,
    on_status: Option<Arc<dyn Fn(String) + Send + Sync>>,
}

// ── ViewerSession ────────────────────────────────────────────────

/// Drives one connection attempt end-to-end on the library worker thread.
///
/// Construct with [`new`](Self::new), attach callbacks, then hand the
/// session to [`crate::worker::LibraryWorker::start_session`], which
/// returns the [`SessionHandle`] used for interactive calls.
pub struct ViewerSession {
    config: SessionConfig,
    sink: Arc<dyn FrameSink>,
    dispatcher: Arc<Dispatcher>,
    callbacks: SessionCallbacks,

    tx: mpsc::Sender<SessionMessage>,
    rx: mpsc::Receiver<SessionMessage>,
    generation: u64,

    phase: SessionPhase,
    canvas: (u32, u32),
    server_aspect: Option<f64>,
    framebuffer: FrameBuffer,

    disconnect_reason: String,
    disconnect_flags: DisconnectFlags,
    reported: bool,
}

impl ViewerSession {
    pub fn new(
        config: SessionConfig,
        sink: Arc<dyn FrameSink>,
        dispatcher: Arc<Dispatcher>,
    ) -> Self {
        let (tx, rx) = mpsc::channel();
        let canvas = config.canvas.unwrap_or(DEFAULT_CANVAS);
        Self {
            config,
            sink,
            dispatcher,
            callbacks: SessionCallbacks::default(),
            tx,
            rx,
            generation: 0,
            phase: SessionPhase::Created,
            canvas,
            server_aspect: None,
            framebuffer: FrameBuffer::new(PixelFormat::Bgra8),
            disconnect_reason: "Stopped".into(),
            disconnect_flags: DisconnectFlags::empty(),
            reported: false,
        }
    }

    /// Called once when the connection is established. Runs on the
    /// dispatcher's consumer thread.
    pub fn on_connect(mut self, f: impl FnOnce() + Send + 'static) -> Self {
        self.callbacks.on_connect = Some(Box::new(f));
        self
    }

    /// Called exactly once when the session ends, with the disconnect
    /// reason and flags. Runs on the dispatcher's consumer thread.
    pub fn on_disconnect(
        mut self,
        f: impl FnOnce(String, DisconnectFlags) + Send + 'static,
    ) -> Self {
        self.callbacks.on_disconnect = Some(Box::new(f));
        self
    }

    /// Called for human-readable status messages (connection progress,
    /// server name changes). Runs on the dispatcher's consumer thread.
    pub fn on_status(mut self, f: impl Fn(String) + Send + Sync + 'static) -> Self {
        self.callbacks.on_status = Some(Arc::new(f));
        self
    }

    // ── Worker-side plumbing ─────────────────────────────────────

    pub(crate) fn sender(&self) -> mpsc::Sender<SessionMessage> {
        self.tx.clone()
    }

    pub(crate) fn set_generation(&mut self, generation: u64) {
        self.generation = generation;
    }

    pub(crate) fn generation(&self) -> u64 {
        self.generation
    }

    /// The main routine, executed on the library worker thread.
    ///
    /// Returns only when the session has ended; the terminal disconnect
    /// notification has been posted by then.
    pub(crate) fn run(&mut self, lib: &mut dyn RemoteLibrary) {
        info!(
            host = %self.config.host,
            port = self.config.port,
            "session starting"
        );
        self.set_phase(SessionPhase::Connecting);

        if let Err(e) = self.drive(lib) {
            // Connect failures and in-session errors become the
            // disconnect reason; flags stay unset.
            warn!("session error: {e}");
            self.disconnect_reason = e.to_string();
            self.disconnect_flags = DisconnectFlags::empty();
        }

        self.framebuffer.release();
        self.set_phase(SessionPhase::Disconnected);
        self.report_disconnection();
    }

    /// Terminal report when `run` itself was torn down by a panic.
    pub(crate) fn report_failure(&mut self, reason: String) {
        self.disconnect_reason = reason;
        self.disconnect_flags = DisconnectFlags::empty();
        self.framebuffer.release();
        self.set_phase(SessionPhase::Disconnected);
        self.report_disconnection();
    }

    // ── Session body ─────────────────────────────────────────────

    fn drive(&mut self, lib: &mut dyn RemoteLibrary) -> Result<(), RvuError> {
        let mut conn = lib.open()?;

        // Initial buffer sized to the configured canvas.
        self.apply_canvas_fit(conn.as_mut(), false)?;

        self.status(format!(
            "connecting to {}:{}",
            self.config.host, self.config.port
        ));
        conn.connect(
            &self.config.host,
            self.config.port,
            EventSender {
                tx: self.tx.clone(),
            },
        )?;

        loop {
            let message = match self.rx.recv() {
                Ok(m) => m,
                Err(_) => {
                    self.disconnect_reason = "event channel closed".into();
                    break;
                }
            };
            match message {
                SessionMessage::Remote(event) => {
                    if self.handle_remote(conn.as_mut(), event)? {
                        break;
                    }
                }
                SessionMessage::Command(command) => {
                    self.handle_command(conn.as_mut(), command)?;
                }
                SessionMessage::HardStop => {
                    self.disconnect_reason = "Stopped".into();
                    self.disconnect_flags = DisconnectFlags::empty();
                    break;
                }
            }
        }
        Ok(())
    }

    /// Returns `true` when the session is over.
    fn handle_remote(
        &mut self,
        conn: &mut dyn crate::remote::RemoteConnection,
        event: RemoteEvent,
    ) -> Result<bool, RvuError> {
        match event {
            RemoteEvent::Connected => {
                self.set_phase(SessionPhase::Connected);
                if let Some(cb) = self.callbacks.on_connect.take() {
                    self.dispatcher.post(cb);
                }
            }
            RemoteEvent::Disconnected { reason, flags } => {
                self.disconnect_reason = reason;
                self.disconnect_flags = flags;
                return Ok(true);
            }
            RemoteEvent::ServerSizeChanged { width, height } => {
                if width == 0 || height == 0 {
                    warn!(width, height, "ignoring degenerate server resize");
                    return Ok(false);
                }
                self.server_aspect = Some(width as f64 / height as f64);
                self.apply_canvas_fit(conn, true)?;
            }
            RemoteEvent::RegionUpdated(region) => {
                self.sink.on_framebuffer_updated(region);
            }
            RemoteEvent::FriendlyNameChanged(name) => {
                self.status(format!("server name changed: {name}"));
            }
        }
        Ok(false)
    }

    fn handle_command(
        &mut self,
        conn: &mut dyn crate::remote::RemoteConnection,
        command: SessionCommand,
    ) -> Result<(), RvuError> {
        match command {
            SessionCommand::Disconnect => {
                self.set_phase(SessionPhase::Disconnecting);
                // The library confirms with a Disconnected event, which
                // ends the run loop through the ordinary path.
                conn.disconnect();
            }
            SessionCommand::KeyDown { keysym, keycode } => {
                conn.send_key_down(keysym, keycode)?;
            }
            SessionCommand::KeyUp { keycode } => {
                conn.send_key_up(keycode)?;
            }
            SessionCommand::Pointer { x, y, buttons } => {
                conn.send_pointer(x, y, buttons)?;
            }
            SessionCommand::Scroll { delta, axis } => {
                conn.send_scroll(delta, axis)?;
            }
            SessionCommand::ResizeCanvas { width, height } => {
                if width == 0 || height == 0 {
                    debug!(width, height, "ignoring degenerate canvas resize");
                    return Ok(());
                }
                self.canvas = (width, height);
                self.apply_canvas_fit(conn, false)?;
            }
        }
        Ok(())
    }

    /// Reallocate the frame buffer to the canvas-fitted geometry and
    /// notify the sink. The resize notification always precedes any
    /// region update that references the new buffer, since both are
    /// delivered from this thread.
    fn apply_canvas_fit(
        &mut self,
        conn: &mut dyn crate::remote::RemoteConnection,
        request_window_resize: bool,
    ) -> Result<(), RvuError> {
        let (width, height) = fit_to_canvas(self.canvas, self.server_aspect);
        let buffer = self.framebuffer.resize(conn, width, height)?;
        debug!(width, height, "framebuffer resized");
        self.sink.on_framebuffer_resized(
            width,
            height,
            width,
            Some(buffer),
            request_window_resize,
        );
        Ok(())
    }

    fn report_disconnection(&mut self) {
        if self.reported {
            return;
        }
        self.reported = true;

        // Blank the consumer surface; omitting this would keep the last
        // image on screen.
        self.sink.on_framebuffer_resized(0, 0, 0, None, false);

        info!(reason = %self.disconnect_reason, "session disconnected");
        if let Some(cb) = self.callbacks.on_disconnect.take() {
            let reason = self.disconnect_reason.clone();
            let flags = self.disconnect_flags;
            self.dispatcher.post(move || cb(reason, flags));
        }
    }

    fn status(&self, message: String) {
        info!("{message}");
        if let Some(cb) = &self.callbacks.on_status {
            let cb = Arc::clone(cb);
            self.dispatcher.post(move || cb(message));
        }
    }

    fn set_phase(&mut self, phase: SessionPhase) {
        debug!(from = %self.phase, to = %phase, "session phase");
        self.phase = phase;
    }
}

// ── Geometry ─────────────────────────────────────────────────────

/// Fit the remote aspect ratio inside the canvas.
///
/// Without a known aspect the canvas is used as-is. Each computed axis is
/// bounded by its own canvas dimension, and both are clamped to
/// [`MIN_DIMENSION`].
fn fit_to_canvas(canvas: (u32, u32), server_aspect: Option<f64>) -> (u32, u32) {
    let (canvas_w, canvas_h) = canvas;
    let (mut width, mut height) = (canvas_w, canvas_h);

    if let Some(aspect) = server_aspect.filter(|a| *a > 0.0) {
        // Round, don't truncate: 1440 * (1024/768) lands at 1919.99…
        let inferred_h = (canvas_w as f64 / aspect).round() as u32;
        if inferred_h <= canvas_h {
            height = inferred_h;
        } else {
            width = (canvas_h as f64 * aspect).round() as u32;
        }
    }

    (width.max(MIN_DIMENSION), height.max(MIN_DIMENSION))
}

// ── SessionHandle ────────────────────────────────────────────────

/// Thread-safe handle for interactive calls against a running session.
///
/// Every call marshals the actual library call onto the worker thread's
/// session loop. Calls against a session that is no longer current are
/// silently dropped — an expected race between a UI and the worker, with
/// zero library-side effects.
#[derive(Clone)]
pub struct SessionHandle {
    tx: mpsc::Sender<SessionMessage>,
    generation: u64,
    current: Arc<AtomicU64>,
}

impl SessionHandle {
    pub(crate) fn new(
        tx: mpsc::Sender<SessionMessage>,
        generation: u64,
        current: Arc<AtomicU64>,
    ) -> Self {
        Self {
            tx,
            generation,
            current,
        }
    }

    /// Whether this handle's session is still the worker's current one.
    pub fn is_current(&self) -> bool {
        self.current.load(Ordering::Acquire) == self.generation
    }

    fn post(&self, command: SessionCommand) {
        if !self.is_current() {
            debug!(generation = self.generation, "dropping call for stale session");
            return;
        }
        if self.tx.send(SessionMessage::Command(command)).is_err() {
            debug!("session channel closed; call dropped");
        }
    }

    /// Request a clean disconnect. Safe to call from any thread.
    pub fn disconnect(&self) {
        self.post(SessionCommand::Disconnect);
    }

    pub fn send_key_down(&self, keysym: u32, keycode: u32) {
        self.post(SessionCommand::KeyDown { keysym, keycode });
    }

    pub fn send_key_up(&self, keycode: u32) {
        self.post(SessionCommand::KeyUp { keycode });
    }

    pub fn send_pointer(&self, x: i32, y: i32, buttons: MouseButtons) {
        self.post(SessionCommand::Pointer { x, y, buttons });
    }

    pub fn send_scroll(&self, delta: i32, axis: ScrollAxis) {
        self.post(SessionCommand::Scroll { delta, axis });
    }

    /// Resize the local canvas (e.g. after a window resize).
    pub fn resize_canvas(&self, width: u32, height: u32) {
        self.post(SessionCommand::ResizeCanvas { width, height });
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fit_bounds_width_when_height_overflows() {
        // 2560x1440 canvas, 1024x768 remote (4:3): inferred height 1920
        // exceeds the canvas, so the width is recomputed instead.
        let fitted = fit_to_canvas((2560, 1440), Some(1024.0 / 768.0));
        assert_eq!(fitted, (1920, 1440));
    }

    #[test]
    fn fit_bounds_height_when_it_fits() {
        let fitted = fit_to_canvas((1000, 1000), Some(2.0));
        assert_eq!(fitted, (1000, 500));
    }

    #[test]
    fn fit_exact_aspect_is_identity() {
        let fitted = fit_to_canvas((1920, 1080), Some(16.0 / 9.0));
        assert_eq!(fitted, (1920, 1080));
    }

    #[test]
    fn fit_without_aspect_uses_canvas() {
        assert_eq!(fit_to_canvas((800, 600), None), (800, 600));
    }

    #[test]
    fn fit_clamps_degenerate_dimensions() {
        let fitted = fit_to_canvas((200, 200), Some(100.0));
        assert_eq!(fitted, (200, 10));
    }

    #[test]
    fn stale_handle_drops_commands() {
        let (tx, rx) = mpsc::channel();
        let current = Arc::new(AtomicU64::new(0));
        let handle = SessionHandle::new(tx, 7, Arc::clone(&current));

        assert!(!handle.is_current());
        handle.send_key_down(0x61, 30);
        assert!(rx.try_recv().is_err());

        current.store(7, Ordering::Release);
        assert!(handle.is_current());
        handle.send_key_down(0x61, 30);
        assert!(matches!(
            rx.try_recv(),
            Ok(SessionMessage::Command(SessionCommand::KeyDown { .. }))
        ));
    }
}
