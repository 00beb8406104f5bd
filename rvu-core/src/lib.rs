//! # rvu-core
//!
//! Core library for the RVU remote-desktop viewer.
//!
//! The remote-access library that owns the wire protocol demands one
//! initialization and one shutdown per process, all on a single thread.
//! This crate builds the viewer lifecycle around that constraint:
//!
//! - **Worker**: [`LibraryWorker`] — the dedicated thread that owns the
//!   library and runs sessions one at a time
//! - **Session**: [`ViewerSession`] / [`SessionHandle`] — one connection
//!   attempt, with interactive calls marshalled from any thread
//! - **Frame hand-off**: [`FrameBuffer`] / [`SharedFrame`] — the pixel
//!   buffer exchanged between the worker and a polling renderer
//! - **Dispatcher**: [`Dispatcher`] — single-consumer queue moving
//!   completion and status notifications onto the consumer thread
//! - **Remote seam**: [`remote`] — the trait contract a vendor library is
//!   wrapped in; [`loopback`] implements it in-process for tests and demo
//! - **Error**: [`RvuError`] — typed, `thiserror`-based error hierarchy

pub mod dispatcher;
pub mod error;
pub mod framebuffer;
pub mod loopback;
pub mod remote;
pub mod session;
pub mod sink;
pub mod worker;

// ── Re-exports for ergonomic usage ───────────────────────────────

pub use dispatcher::Dispatcher;
pub use error::RvuError;
pub use framebuffer::{FrameBuffer, PixelBuffer};
pub use remote::{
    DisconnectFlags, EventSender, MouseButtons, PixelFormat, Rect, RemoteConnection,
    RemoteEvent, RemoteLibrary, ScrollAxis,
};
pub use session::{DEFAULT_CANVAS, SessionConfig, SessionHandle, SessionPhase, ViewerSession};
pub use sink::{FrameImage, FrameSink, SharedFrame};
pub use worker::{LibraryWorker, WorkerPhase};
