// Copyright (c) 2025 Jonathan Fontanez
// SPDX-License-Identifier: BUSL-1.1

//! Shared wire layer between the heifgrid host controller and the decoder
//! worker process.
//!
//! Everything that crosses the process boundary lives here: the framed
//! transport ([`framing`]), the call/response message set ([`messages`]),
//! the serializable error taxonomy ([`error`]) and the planar image payload
//! ([`image`]). Both sides depend on this crate and nothing else shared, so
//! a protocol change is a change to exactly one crate.

pub mod error;
pub mod framing;
pub mod image;
pub mod messages;

pub use error::RemoteError;
pub use framing::{read_frame, write_frame, WireError};
pub use image::{PlanarImage, PlanarImageView, Subsampling};
pub use messages::{Handshake, OutputFormat, Request, Response};

/// Protocol version. Bumped on any incompatible change to [`messages`].
pub const PROTOCOL_VERSION: u32 = 1;

/// Environment variable carrying the shared handshake secret to the worker.
pub const COOKIE_ENV: &str = "HEIFGRID_COOKIE";

/// Shared handshake secret. A worker launched without it in the environment
/// refuses to serve; a controller rejects a handshake frame without it.
pub const COOKIE_VALUE: &str = "heifgrid-hevc-worker";

/// Expected reply payload for `Request::Ping`.
pub const PONG: &str = "Pong";
