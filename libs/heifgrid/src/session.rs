// Copyright (c) 2025 Jonathan Fontanez
// SPDX-License-Identifier: BUSL-1.1

//! Host-side handle to one decoder session on the worker.

use heifgrid_wire::PlanarImage;

use crate::controller::Controller;
use crate::error::Result;

/// A decoder session. Dropping it closes the worker-side session on a
/// best-effort basis; use [`close`](Self::close) to observe the outcome.
pub struct Session<'c> {
    controller: &'c Controller,
    id: String,
    closed: bool,
}

impl<'c> Session<'c> {
    pub(crate) fn new(controller: &'c Controller, id: String) -> Self {
        Self {
            controller,
            id,
            closed: false,
        }
    }

    /// Worker-side session id. Stable for the session's lifetime, invalid
    /// after the worker is respawned.
    pub fn id(&self) -> &str {
        &self.id
    }

    /// Feed length-prefixed coded units to the decoder.
    pub fn push(&self, data: &[u8]) -> Result<()> {
        self.controller.push_decoder(&self.id, data)
    }

    /// Push `data` (may be empty), flush, and decode the next picture.
    pub fn render(&self, data: &[u8]) -> Result<PlanarImage> {
        self.controller.render_decoder(&self.id, data)
    }

    /// Discard stream state and any pending picture. The session stays
    /// usable for a fresh stream.
    pub fn reset(&self) -> Result<()> {
        self.controller.reset_decoder(&self.id)
    }

    /// Close the session, observing the worker's answer.
    pub fn close(mut self) -> Result<()> {
        self.closed = true;
        self.controller.close_decoder(&self.id)
    }
}

impl Drop for Session<'_> {
    fn drop(&mut self) {
        if !self.closed {
            if let Err(e) = self.controller.close_decoder(&self.id) {
                tracing::debug!("best-effort close of session {} failed: {e}", self.id);
            }
        }
    }
}
