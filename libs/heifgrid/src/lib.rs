// Copyright (c) 2025 Jonathan Fontanez
// SPDX-License-Identifier: BUSL-1.1

//! Host library for HEIF grid/HEVC decoding through a supervised
//! out-of-process worker.
//!
//! The decoding engine is crash-prone native code, so it never runs in the
//! caller's process. A [`Controller`] spawns the `heifgrid-worker` binary,
//! verifies its handshake and speaks a framed call/response protocol to it
//! over the child's pipes. If the worker dies or hangs, the next call
//! respawns it once and the caller gets a typed error instead of a crash.
//!
//! ```no_run
//! use heifgrid::{Controller, OutputFormat, WorkerConfig};
//!
//! # fn main() -> heifgrid::Result<()> {
//! let controller = Controller::new(WorkerConfig::new("heifgrid-worker"));
//! controller.init()?;
//!
//! let container_bytes = std::fs::read("image.bin").map_err(|e| {
//!     heifgrid::HeifError::Transport(e.to_string())
//! })?;
//! let jpeg = controller.render_file(&container_bytes, OutputFormat::Jpg, 0)?;
//! # drop(jpeg);
//! controller.deinit();
//! # Ok(())
//! # }
//! ```

pub mod controller;
pub mod error;
pub mod session;
pub mod subprocess;

pub use controller::{Controller, WorkerConfig};
pub use error::{HeifError, Result};
pub use session::Session;

// Wire types callers see in the API surface.
pub use heifgrid_wire::{OutputFormat, PlanarImage, RemoteError, Subsampling};
