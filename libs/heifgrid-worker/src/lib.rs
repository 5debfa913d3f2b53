// Copyright (c) 2025 Jonathan Fontanez
// SPDX-License-Identifier: BUSL-1.1

//! Decoder worker: the process that actually touches the decoding engine.
//!
//! The host library (`heifgrid`) spawns this crate's binary and speaks the
//! `heifgrid-wire` protocol to it. Everything crash-prone lives here: the
//! native engine binding, the per-stream decoder sessions, grid/tile
//! reconstruction and the render-to-JPEG/PNG path. A fault in any single
//! call is caught at the dispatch boundary and answered as a
//! `RemoteError`; only a full process crash forces the host to respawn.

pub mod container;
pub mod engine;
pub mod fixtures;
pub mod grid;
pub mod render;
pub mod service;
pub mod session;

pub use service::{serve, WorkerService};
pub use session::DecoderSession;
