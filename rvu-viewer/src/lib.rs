//! # rvu-viewer — Remote Desktop Viewer
//!
//! Native viewer window over `rvu-core`. Renders the session's frame
//! buffer into a Win32 window via GDI and forwards local mouse/keyboard
//! input through the session handle. A vendor remote-access library is
//! wrapped in `rvu_core::remote` traits; until one is linked, the
//! in-process loopback peer stands in (see `--demo`).

pub mod config;
pub mod display;
pub mod input;
pub mod window;
