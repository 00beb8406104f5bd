//! RVU viewer — entry point.
//!
//! ```text
//! rvu-viewer                      Connect with defaults
//! rvu-viewer --config <path>      Use custom config TOML
//! rvu-viewer --host <addr>        Override the remote host
//! rvu-viewer --demo               View the built-in animated peer
//! rvu-viewer --gen-config         Dump default config and exit
//! ```
//!
//! Press `C` after a session ends to reconnect.

use std::path::PathBuf;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use clap::Parser;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use rvu_core::loopback::LoopbackLibrary;
use rvu_core::{
    Dispatcher, LibraryWorker, RvuError, SessionConfig, SessionHandle, SharedFrame,
    ViewerSession,
};

use rvu_viewer::config::ViewerConfig;
use rvu_viewer::display::FrameRenderer;
use rvu_viewer::input::{InputCall, InputTracker};
use rvu_viewer::window::{ViewerWindow, WindowEvent};

// ── CLI ──────────────────────────────────────────────────────────

#[derive(Parser, Debug)]
#[command(name = "rvu-viewer", about = "RVU remote desktop viewer")]
struct Cli {
    /// Path to configuration TOML file.
    #[arg(short, long, default_value = "rvu-viewer.toml")]
    config: PathBuf,

    /// Remote host (overrides config).
    #[arg(long)]
    host: Option<String>,

    /// Remote port (overrides config).
    #[arg(long)]
    port: Option<u16>,

    /// Connect to the built-in animated loopback peer.
    #[arg(long)]
    demo: bool,

    /// Print the default configuration to stdout and exit.
    #[arg(long)]
    gen_config: bool,
}

// ── Session wiring ───────────────────────────────────────────────

fn launch_session(
    worker: &LibraryWorker,
    config: &ViewerConfig,
    sink: &Arc<SharedFrame>,
    dispatcher: &Arc<Dispatcher>,
    session_over: &Arc<AtomicBool>,
) -> Result<SessionHandle, RvuError> {
    let over = Arc::clone(session_over);
    let session = ViewerSession::new(
        SessionConfig {
            host: config.connection.host.clone(),
            port: config.connection.port,
            canvas: Some((config.display.width, config.display.height)),
        },
        sink.clone(),
        Arc::clone(dispatcher),
    )
    .on_connect(|| info!("connected"))
    .on_disconnect(move |reason, flags| {
        info!(?flags, "disconnected: {reason}");
        over.store(true, Ordering::SeqCst);
    })
    .on_status(|message| info!("{message}"));

    worker.start_session(session)
}

// ── Main ─────────────────────────────────────────────────────────

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    if cli.gen_config {
        let text = toml::to_string_pretty(&ViewerConfig::default())?;
        println!("{text}");
        return Ok(());
    }

    let mut config = ViewerConfig::load(&cli.config);
    if let Some(host) = cli.host {
        config.connection.host = host;
    }
    if let Some(port) = cli.port {
        config.connection.port = port;
    }

    // Init tracing.
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&config.logging.level));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    info!("rvu-viewer v{}", env!("CARGO_PKG_VERSION"));

    // ── 1. Create the window ────────────────────────────────────

    let window = ViewerWindow::create(
        "RVU Remote Viewer",
        config.display.width,
        config.display.height,
    )?;
    let mut renderer = FrameRenderer::new(
        window.hwnd(),
        config.display.width,
        config.display.height,
    );

    // ── 2. Start the library worker ─────────────────────────────

    // A vendor library adapter would slot in here through the
    // `RemoteLibrary` trait; the in-process loopback peer stands in
    // until one is linked.
    let lib = if cli.demo {
        LoopbackLibrary::new().with_server_size(1280, 720).animated()
    } else {
        LoopbackLibrary::new()
    };
    let worker = LibraryWorker::start(lib).await?;

    // ── 3. Start the viewer session ─────────────────────────────

    let dispatcher = Dispatcher::global();
    let sink = SharedFrame::new();
    let session_over = Arc::new(AtomicBool::new(false));
    let mut handle = launch_session(&worker, &config, &sink, &dispatcher, &session_over)?;

    // ── 4. Event loop ───────────────────────────────────────────

    let mut tracker = InputTracker::new();
    let mut win_size = (config.display.width, config.display.height);
    let mut remote_size = win_size;
    let mut running = true;

    while running {
        dispatcher.drain_once();

        for event in window.poll_events() {
            match event {
                WindowEvent::Close => {
                    running = false;
                    break;
                }
                WindowEvent::Resize(w, h) => {
                    win_size = (w, h);
                    renderer.resize(w, h);
                    handle.resize_canvas(w, h);
                    continue;
                }
                // Reconnect on C once the previous session has ended.
                WindowEvent::Key(0x43, _, true) if session_over.load(Ordering::SeqCst) => {
                    session_over.store(false, Ordering::SeqCst);
                    match launch_session(&worker, &config, &sink, &dispatcher, &session_over) {
                        Ok(h) => handle = h,
                        Err(e) => {
                            // Previous session may still be unwinding.
                            warn!("reconnect failed: {e}");
                            session_over.store(true, Ordering::SeqCst);
                        }
                    }
                    continue;
                }
                _ => {}
            }

            if let Some(call) = tracker.translate(&event, win_size, remote_size) {
                match call {
                    InputCall::Pointer { x, y, buttons } if config.input.capture_mouse => {
                        handle.send_pointer(x, y, buttons);
                    }
                    InputCall::Scroll { delta, axis } if config.input.capture_mouse => {
                        handle.send_scroll(delta, axis);
                    }
                    InputCall::KeyDown { keysym, keycode } if config.input.capture_keyboard => {
                        handle.send_key_down(keysym, keycode);
                    }
                    InputCall::KeyUp { keycode } if config.input.capture_keyboard => {
                        handle.send_key_up(keycode);
                    }
                    _ => {}
                }
            }
        }

        if let Some((w, h, _request_window_resize)) = sink.take_resize() {
            remote_size = (w, h);
        }

        if let Some(frame) = sink.latest() {
            if let Err(e) = renderer.render(&frame) {
                warn!("render error: {e}");
            }
        }

        // Yield briefly so Tokio can make progress.
        tokio::time::sleep(Duration::from_millis(1)).await;
    }

    // ── 5. Shutdown ─────────────────────────────────────────────

    info!("shutting down");
    handle.disconnect();
    worker.stop();

    Ok(())
}
