// Copyright (c) 2025 Jonathan Fontanez
// SPDX-License-Identifier: BUSL-1.1

//! Host-side error taxonomy.
//!
//! [`HeifError::Remote`] wraps an error the worker computed and answered
//! over the wire; every other variant is a fault of the link itself
//! (spawning, handshaking, framing, or an answer that does not fit the
//! question).

use heifgrid_wire::RemoteError;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum HeifError {
    #[error("controller is not initialized")]
    NotInitialized,

    #[error("worker handshake failed: {0}")]
    HandshakeFailed(String),

    #[error("worker unreachable: {0}")]
    WorkerUnreachable(String),

    #[error("transport error: {0}")]
    Transport(String),

    #[error("protocol error: {0}")]
    Protocol(String),

    #[error(transparent)]
    Remote(#[from] RemoteError),
}

pub type Result<T> = std::result::Result<T, HeifError>;
