// Copyright (c) 2025 Jonathan Fontanez
// SPDX-License-Identifier: BUSL-1.1

//! Errors produced inside the worker and carried back over the wire.
//!
//! Every variant here is an ordinary call result, not a channel failure:
//! the worker catches handler faults at the dispatch boundary and answers
//! with one of these, so the connection survives a failed call. Transport
//! and lifecycle failures live host-side in `heifgrid::HeifError`.

use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error, Serialize, Deserialize)]
pub enum RemoteError {
    #[error("no decoder session with the given id")]
    SessionNotFound,

    #[error("invalid NAL framing at byte {offset}: {reason}")]
    InvalidNalFraming { offset: usize, reason: String },

    #[error("decode engine error: {0}")]
    DecodeEngine(String),

    #[error("decoding finished without producing a picture")]
    NoPictureProduced,

    #[error("picture borrow is stale: the session advanced past it")]
    StalePicture,

    #[error("unsupported item type: {0}")]
    UnsupportedItemType(String),

    #[error("primary item has no spatial extents")]
    NoPrimaryExtents,

    #[error("invalid grid descriptor: {0}")]
    InvalidGridDescriptor(String),

    #[error("grid references {got} tiles, descriptor declares {expected}")]
    GridMismatch { expected: usize, got: usize },

    #[error("tile is {got_w}x{got_h}, expected {want_w}x{want_h}")]
    InconsistentTileDimensions {
        want_w: u32,
        want_h: u32,
        got_w: u32,
        got_h: u32,
    },

    #[error("encoded image would exceed the maximum file size")]
    OutputTooLarge,

    #[error("unknown output format: {0}")]
    UnknownOutputFormat(String),

    #[error("container error: {0}")]
    Container(String),

    /// A panic caught at the dispatch boundary.
    #[error("internal worker fault: {0}")]
    Internal(String),
}
