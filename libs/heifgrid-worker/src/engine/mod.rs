// Copyright (c) 2025 Jonathan Fontanez
// SPDX-License-Identifier: BUSL-1.1

//! Decode engine binding.
//!
//! The engine is an opaque capability: coded units go in, decoded planar
//! pictures come out. [`DecodeEngine`] is the seam between the session
//! state machine and whichever backend is compiled in:
//!
//! - `libde265` (feature `libde265`): raw FFI binding to the native HEVC
//!   decoder.
//! - `planar`: deterministic built-in engine for a trivial tagged planar
//!   payload format. Default when the FFI feature is off; also what the
//!   test suite decodes with.

pub mod planar;

#[cfg(feature = "libde265")]
pub mod libde265;

use heifgrid_wire::PlanarImageView;
use thiserror::Error;

/// A fault inside the engine backend.
#[derive(Debug, Error)]
#[error("{0}")]
pub struct EngineError(pub String);

/// One per-stream decoding context.
///
/// Call order per picture: `push_nal` any number of times, `flush`, then
/// `decode_step` in a loop until it reports no more work or
/// `pending_picture` returns a picture. The picture's plane memory belongs
/// to the engine and stays valid until `release_picture` or `reset`.
pub trait DecodeEngine: Send {
    /// Feed one coded unit (without its length prefix).
    fn push_nal(&mut self, nal: &[u8]) -> Result<(), EngineError>;

    /// Tell the engine no more input is coming for the pending picture.
    fn flush(&mut self) -> Result<(), EngineError>;

    /// Perform one decode step. Returns whether more work is available.
    fn decode_step(&mut self) -> Result<bool, EngineError>;

    /// Drain accumulated non-fatal warnings.
    fn drain_warnings(&mut self) -> Vec<String>;

    /// The decoded picture, if one is ready and undrained.
    fn pending_picture(&self) -> Option<PlanarImageView<'_>>;

    /// Release the pending picture's engine-side resources.
    fn release_picture(&mut self);

    /// Reset all engine-internal stream state.
    fn reset(&mut self);
}

/// The engine backend this build serves.
#[cfg(feature = "libde265")]
pub fn default_engine() -> Result<Box<dyn DecodeEngine>, EngineError> {
    Ok(Box::new(libde265::Libde265Engine::new()?))
}

/// The engine backend this build serves.
#[cfg(not(feature = "libde265"))]
pub fn default_engine() -> Result<Box<dyn DecodeEngine>, EngineError> {
    Ok(Box::new(planar::PlanarEngine::new()))
}
