//! In-process implementation of the remote-access library contract.
//!
//! Stands in where a proprietary viewer library would be loaded: backs
//! the integration tests (scripted connects, refusals, remote resizes,
//! disconnects) and the viewer's demo mode (an animated test pattern).
//! Every interactive call is counted, so tests can assert that calls
//! against a stale session produce zero library-side effects.

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use tracing::debug;

use crate::error::RvuError;
use crate::framebuffer::PixelBuffer;
use crate::remote::{
    DisconnectFlags, EventSender, MouseButtons, PixelFormat, Rect, RemoteConnection,
    RemoteEvent, RemoteLibrary, ScrollAxis,
};

// ── Probe ────────────────────────────────────────────────────────

#[derive(Default)]
struct Counters {
    key_down: AtomicUsize,
    key_up: AtomicUsize,
    pointer: AtomicUsize,
    scroll: AtomicUsize,
    register: AtomicUsize,
    disconnect: AtomicUsize,
}

/// Observation and scripting handle for a [`LoopbackLibrary`].
///
/// Lets tests count interactive calls and inject remote-side events into
/// whatever session is currently connected.
pub struct LoopbackProbe {
    init_count: AtomicUsize,
    shutdown_count: AtomicUsize,
    initialized: AtomicBool,
    connected: AtomicBool,
    counters: Counters,
    events: Mutex<Option<EventSender>>,
    framebuffer: Mutex<Option<Arc<PixelBuffer>>>,
}

impl LoopbackProbe {
    fn new() -> Arc<Self> {
        Arc::new(Self {
            init_count: AtomicUsize::new(0),
            shutdown_count: AtomicUsize::new(0),
            initialized: AtomicBool::new(false),
            connected: AtomicBool::new(false),
            counters: Counters::default(),
            events: Mutex::new(None),
            framebuffer: Mutex::new(None),
        })
    }

    pub fn init_count(&self) -> usize {
        self.init_count.load(Ordering::SeqCst)
    }

    pub fn shutdown_count(&self) -> usize {
        self.shutdown_count.load(Ordering::SeqCst)
    }

    pub fn key_down_count(&self) -> usize {
        self.counters.key_down.load(Ordering::SeqCst)
    }

    pub fn key_up_count(&self) -> usize {
        self.counters.key_up.load(Ordering::SeqCst)
    }

    pub fn pointer_count(&self) -> usize {
        self.counters.pointer.load(Ordering::SeqCst)
    }

    pub fn scroll_count(&self) -> usize {
        self.counters.scroll.load(Ordering::SeqCst)
    }

    pub fn register_count(&self) -> usize {
        self.counters.register.load(Ordering::SeqCst)
    }

    pub fn disconnect_count(&self) -> usize {
        self.counters.disconnect.load(Ordering::SeqCst)
    }

    pub fn is_connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }

    /// Block until a session has connected, or the timeout elapses.
    pub fn wait_connected(&self, timeout: Duration) -> bool {
        let deadline = Instant::now() + timeout;
        while Instant::now() < deadline {
            if self.is_connected() {
                return true;
            }
            std::thread::sleep(Duration::from_millis(1));
        }
        false
    }

    /// The buffer most recently registered by the session, if any.
    pub fn framebuffer(&self) -> Option<Arc<PixelBuffer>> {
        self.framebuffer.lock().expect("probe lock poisoned").clone()
    }

    fn send(&self, event: RemoteEvent) {
        if let Some(events) = &*self.events.lock().expect("probe lock poisoned") {
            events.send(event);
        }
    }

    /// Announce a remote screen-size change.
    pub fn server_resize(&self, width: u32, height: u32) {
        self.send(RemoteEvent::ServerSizeChanged { width, height });
    }

    /// Announce fresh pixels in a region of the registered buffer.
    pub fn region_update(&self, region: Rect) {
        self.send(RemoteEvent::RegionUpdated(region));
    }

    /// Announce a name change of the remote peer.
    pub fn rename_server(&self, name: &str) {
        self.send(RemoteEvent::FriendlyNameChanged(name.into()));
    }

    /// End the session from the remote side.
    pub fn remote_disconnect(&self, reason: &str) {
        self.send(RemoteEvent::Disconnected {
            reason: reason.into(),
            flags: DisconnectFlags::CLEAN | DisconnectFlags::REMOTE_INITIATED,
        });
    }

    /// Paint the registered buffer a solid BGRA color and announce the
    /// full-buffer update.
    pub fn paint(&self, bgra: [u8; 4]) {
        if let Some(buffer) = self.framebuffer() {
            buffer.write_with(|px| {
                for chunk in px.chunks_exact_mut(4) {
                    chunk.copy_from_slice(&bgra);
                }
            });
            self.region_update(Rect::full(buffer.width(), buffer.height()));
        }
    }
}

// ── LoopbackLibrary ──────────────────────────────────────────────

/// A [`RemoteLibrary`] whose "remote peer" lives in this process.
pub struct LoopbackLibrary {
    probe: Arc<LoopbackProbe>,
    server_size: Option<(u32, u32)>,
    refuse_connect: bool,
    animate: bool,
}

impl LoopbackLibrary {
    pub fn new() -> Self {
        Self {
            probe: LoopbackProbe::new(),
            server_size: None,
            refuse_connect: false,
            animate: false,
        }
    }

    /// Report this remote screen size right after connecting.
    pub fn with_server_size(mut self, width: u32, height: u32) -> Self {
        self.server_size = Some((width, height));
        self
    }

    /// Refuse every connection attempt with a transport error.
    pub fn refuse_connections(mut self) -> Self {
        self.refuse_connect = true;
        self
    }

    /// Run an animated test pattern while connected (demo mode).
    pub fn animated(mut self) -> Self {
        self.animate = true;
        self
    }

    /// Handle for scripting and observing this library from tests.
    pub fn probe(&self) -> Arc<LoopbackProbe> {
        Arc::clone(&self.probe)
    }
}

impl Default for LoopbackLibrary {
    fn default() -> Self {
        Self::new()
    }
}

impl RemoteLibrary for LoopbackLibrary {
    fn initialize(&mut self) -> Result<(), RvuError> {
        if self.probe.initialized.swap(true, Ordering::SeqCst) {
            return Err(RvuError::Init {
                message: "library initialized twice".into(),
            });
        }
        self.probe.init_count.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    fn shutdown(&mut self) {
        self.probe.initialized.store(false, Ordering::SeqCst);
        self.probe.shutdown_count.fetch_add(1, Ordering::SeqCst);
    }

    fn open(&mut self) -> Result<Box<dyn RemoteConnection>, RvuError> {
        if !self.probe.initialized.load(Ordering::SeqCst) {
            return Err(RvuError::Init {
                message: "library not initialized".into(),
            });
        }
        Ok(Box::new(LoopbackConnection {
            probe: Arc::clone(&self.probe),
            server_size: self.server_size,
            refuse_connect: self.refuse_connect,
            animate: self.animate,
            feeder_stop: Arc::new(AtomicBool::new(false)),
            feeder: None,
        }))
    }
}

// ── LoopbackConnection ───────────────────────────────────────────

struct LoopbackConnection {
    probe: Arc<LoopbackProbe>,
    server_size: Option<(u32, u32)>,
    refuse_connect: bool,
    animate: bool,
    feeder_stop: Arc<AtomicBool>,
    feeder: Option<std::thread::JoinHandle<()>>,
}

impl RemoteConnection for LoopbackConnection {
    fn connect(&mut self, host: &str, port: u16, events: EventSender) -> Result<(), RvuError> {
        if self.refuse_connect {
            return Err(RvuError::Connection(std::io::Error::new(
                std::io::ErrorKind::ConnectionRefused,
                format!("connection to {host}:{port} refused"),
            )));
        }

        debug!(host, port, "loopback peer accepting connection");
        *self.probe.events.lock().expect("probe lock poisoned") = Some(events.clone());
        self.probe.connected.store(true, Ordering::SeqCst);

        events.send(RemoteEvent::Connected);
        if let Some((width, height)) = self.server_size {
            events.send(RemoteEvent::ServerSizeChanged { width, height });
        }

        if self.animate {
            let probe = Arc::clone(&self.probe);
            let stop = Arc::clone(&self.feeder_stop);
            self.feeder = Some(std::thread::spawn(move || feeder_loop(probe, stop)));
        }
        Ok(())
    }

    fn disconnect(&mut self) {
        self.probe.counters.disconnect.fetch_add(1, Ordering::SeqCst);
        self.probe.send(RemoteEvent::Disconnected {
            reason: "Disconnected by viewer".into(),
            flags: DisconnectFlags::CLEAN | DisconnectFlags::USER_REQUESTED,
        });
    }

    fn send_key_down(&mut self, _keysym: u32, _keycode: u32) -> Result<(), RvuError> {
        self.probe.counters.key_down.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    fn send_key_up(&mut self, _keycode: u32) -> Result<(), RvuError> {
        self.probe.counters.key_up.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    fn send_pointer(&mut self, _x: i32, _y: i32, _buttons: MouseButtons) -> Result<(), RvuError> {
        self.probe.counters.pointer.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    fn send_scroll(&mut self, _delta: i32, _axis: ScrollAxis) -> Result<(), RvuError> {
        self.probe.counters.scroll.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    fn register_framebuffer(
        &mut self,
        buffer: Arc<PixelBuffer>,
        _format: PixelFormat,
    ) -> Result<(), RvuError> {
        self.probe.counters.register.fetch_add(1, Ordering::SeqCst);
        paint_pattern(&buffer, 0);
        *self.probe.framebuffer.lock().expect("probe lock poisoned") = Some(buffer);
        Ok(())
    }
}

impl Drop for LoopbackConnection {
    fn drop(&mut self) {
        self.feeder_stop.store(true, Ordering::SeqCst);
        if let Some(feeder) = self.feeder.take() {
            let _ = feeder.join();
        }
        self.probe.connected.store(false, Ordering::SeqCst);
        *self.probe.events.lock().expect("probe lock poisoned") = None;
        *self.probe.framebuffer.lock().expect("probe lock poisoned") = None;
    }
}

// ── Test pattern ─────────────────────────────────────────────────

/// Paced feeder that repaints the registered buffer ~30 times a second.
fn feeder_loop(probe: Arc<LoopbackProbe>, stop: Arc<AtomicBool>) {
    let mut tick: u32 = 0;
    while !stop.load(Ordering::SeqCst) {
        if let Some(buffer) = probe.framebuffer() {
            paint_pattern(&buffer, tick);
            probe.region_update(Rect::full(buffer.width(), buffer.height()));
        }
        tick = tick.wrapping_add(1);
        std::thread::sleep(Duration::from_millis(33));
    }
}

/// BGRA gradient, shifted by `tick` so the demo visibly animates.
fn paint_pattern(buffer: &PixelBuffer, tick: u32) {
    let (w, h) = (buffer.width() as usize, buffer.height() as usize);
    buffer.write_with(|px| {
        for y in 0..h {
            for x in 0..w {
                let i = (y * w + x) * 4;
                px[i] = (x * 255 / w) as u8;
                px[i + 1] = (y * 255 / h) as u8;
                px[i + 2] = (tick % 256) as u8;
                px[i + 3] = 255;
            }
        }
    });
}
