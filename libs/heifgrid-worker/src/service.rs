// Copyright (c) 2025 Jonathan Fontanez
// SPDX-License-Identifier: BUSL-1.1

//! Request dispatch and the blocking serve loop.
//!
//! [`WorkerService`] owns the session table and answers one [`Request`] at a
//! time. A panic anywhere inside a handler is caught at the dispatch
//! boundary and answered as `RemoteError::Internal`, so a single poisoned
//! call cannot take the process (and every other session) down with it.

use std::any::Any;
use std::collections::HashMap;
use std::io::{ErrorKind, Read, Write};
use std::panic::{catch_unwind, AssertUnwindSafe};

use parking_lot::Mutex;
use uuid::Uuid;

use heifgrid_wire::{
    read_frame, write_frame, Handshake, Request, Response, RemoteError, WireError, PONG,
};

use crate::container::memory::MemoryContainerOpener;
use crate::container::ContainerOpener;
use crate::engine::default_engine;
use crate::render;
use crate::session::DecoderSession;

pub struct WorkerService {
    opener: Box<dyn ContainerOpener>,
    sessions: Mutex<HashMap<String, DecoderSession>>,
}

impl Default for WorkerService {
    fn default() -> Self {
        Self::new()
    }
}

impl WorkerService {
    pub fn new() -> Self {
        Self::with_opener(Box::new(MemoryContainerOpener))
    }

    /// Use a different container reader behind the `RenderFile` call.
    pub fn with_opener(opener: Box<dyn ContainerOpener>) -> Self {
        Self {
            opener,
            sessions: Mutex::new(HashMap::new()),
        }
    }

    pub fn session_count(&self) -> usize {
        self.sessions.lock().len()
    }

    /// Answer one request. Never panics outward.
    pub fn handle(&self, request: Request) -> Response {
        match catch_unwind(AssertUnwindSafe(|| self.dispatch(request))) {
            Ok(Ok(response)) => response,
            Ok(Err(err)) => Response::Error(err),
            Err(panic) => {
                let message = panic_message(panic.as_ref());
                tracing::error!("panic in request handler: {message}");
                Response::Error(RemoteError::Internal(message))
            }
        }
    }

    fn dispatch(&self, request: Request) -> Result<Response, RemoteError> {
        match request {
            Request::Ping => Ok(Response::Pong(PONG.to_string())),

            Request::NewDecoder { safe_mode } => {
                let engine =
                    default_engine().map_err(|e| RemoteError::DecodeEngine(e.to_string()))?;
                let id = Uuid::new_v4().to_string();
                self.sessions
                    .lock()
                    .insert(id.clone(), DecoderSession::new(engine, safe_mode));
                tracing::debug!("created decoder session {id} (safe_mode={safe_mode})");
                Ok(Response::DecoderCreated { id })
            }

            Request::CloseDecoder { id } => {
                let session = self
                    .sessions
                    .lock()
                    .remove(&id)
                    .ok_or(RemoteError::SessionNotFound)?;
                session.close();
                tracing::debug!("closed decoder session {id}");
                Ok(Response::DecoderClosed)
            }

            Request::ResetDecoder { id } => {
                let mut sessions = self.sessions.lock();
                let session = sessions.get_mut(&id).ok_or(RemoteError::SessionNotFound)?;
                session.reset();
                Ok(Response::DecoderReset)
            }

            Request::PushDecoder { id, data } => {
                let mut sessions = self.sessions.lock();
                let session = sessions.get_mut(&id).ok_or(RemoteError::SessionNotFound)?;
                session.push(&data)?;
                Ok(Response::Pushed)
            }

            Request::RenderDecoder { id, data } => {
                let mut sessions = self.sessions.lock();
                let session = sessions.get_mut(&id).ok_or(RemoteError::SessionNotFound)?;
                let picture = session.decode_image(&data)?;
                // responses always carry owned planes; the session's plane
                // policy only matters inside the worker
                Ok(Response::Picture(session.snapshot(picture)?))
            }

            Request::RenderFile {
                data,
                format,
                max_file_size,
                safe_mode,
            } => {
                let bytes =
                    render::render_file(&*self.opener, &data, format, max_file_size, safe_mode)?;
                Ok(Response::FileRendered(bytes))
            }
        }
    }
}

fn panic_message(panic: &(dyn Any + Send)) -> String {
    if let Some(s) = panic.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = panic.downcast_ref::<String>() {
        s.clone()
    } else {
        "panic in request handler".to_string()
    }
}

/// Serve requests from `reader` until it closes.
///
/// The first outbound frame is always the handshake. A clean EOF on the
/// request stream (the controller dropped the pipe) is a normal shutdown.
pub fn serve<R: Read, W: Write>(
    service: &WorkerService,
    reader: &mut R,
    writer: &mut W,
) -> anyhow::Result<()> {
    write_frame(writer, &Response::Handshake(Handshake::current()))?;

    loop {
        let request: Request = match read_frame(reader) {
            Ok(request) => request,
            Err(WireError::Io(e)) if e.kind() == ErrorKind::UnexpectedEof => {
                tracing::info!("request stream closed, shutting down");
                return Ok(());
            }
            Err(e) => return Err(e.into()),
        };
        write_frame(writer, &service.handle(request))?;
    }
}
