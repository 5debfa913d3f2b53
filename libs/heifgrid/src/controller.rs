// Copyright (c) 2025 Jonathan Fontanez
// SPDX-License-Identifier: BUSL-1.1

//! Worker supervision and the call surface.
//!
//! The [`Controller`] owns at most one worker process and speaks the framed
//! protocol to it over the child's stdin/stdout. Frames are read on a
//! dedicated thread feeding a channel, so the handshake and (optionally)
//! every call can wait with a deadline instead of blocking on the pipe
//! forever.
//!
//! Every call is preceded by a health check. If the worker stops answering,
//! the controller respawns it exactly once and retries the health check on
//! the fresh process; a second failure surfaces as `WorkerUnreachable`. A
//! respawned worker starts with an empty session table, so calls holding
//! ids from the dead worker come back as `SessionNotFound` rather than
//! silently landing on someone else's session.

use std::path::PathBuf;
use std::process::{ChildStdin, Command, Stdio};
use std::thread::JoinHandle;
use std::time::Duration;

use crossbeam_channel::{Receiver, RecvTimeoutError};
use parking_lot::Mutex;

use heifgrid_wire::{
    read_frame, write_frame, OutputFormat, PlanarImage, Request, Response, WireError, COOKIE_ENV,
    COOKIE_VALUE, PONG,
};

use crate::error::{HeifError, Result};
use crate::session::Session;
use crate::subprocess::ProcessHandle;

const WORKER_NAME: &str = "heifgrid-worker";

/// How a [`Controller`] spawns and talks to its worker.
#[derive(Debug, Clone)]
pub struct WorkerConfig {
    /// Path to the worker binary.
    pub worker_path: PathBuf,
    /// Extra arguments passed to the worker binary.
    pub args: Vec<String>,
    /// Plane memory policy for sessions and whole-file renders.
    pub safe_mode: bool,
    /// How long to wait for the worker's first frame after spawning.
    pub handshake_timeout: Duration,
    /// Optional deadline on every call. `None` waits indefinitely, which is
    /// the right default for large decodes; set it when a hung worker must
    /// be detected mid-call rather than at the next health check.
    pub call_timeout: Option<Duration>,
    /// How long `deinit` waits for a clean exit before killing.
    pub shutdown_timeout: Duration,
}

impl WorkerConfig {
    pub fn new(worker_path: impl Into<PathBuf>) -> Self {
        Self {
            worker_path: worker_path.into(),
            args: Vec::new(),
            safe_mode: true,
            handshake_timeout: Duration::from_secs(10),
            call_timeout: None,
            shutdown_timeout: Duration::from_secs(2),
        }
    }

    pub fn with_args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args = args.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_safe_mode(mut self, safe_mode: bool) -> Self {
        self.safe_mode = safe_mode;
        self
    }

    pub fn with_handshake_timeout(mut self, timeout: Duration) -> Self {
        self.handshake_timeout = timeout;
        self
    }

    pub fn with_call_timeout(mut self, timeout: Duration) -> Self {
        self.call_timeout = Some(timeout);
        self
    }
}

/// One live worker process plus its wire plumbing.
struct WorkerLink {
    process: ProcessHandle,
    stdin: ChildStdin,
    responses: Receiver<std::result::Result<Response, WireError>>,
    reader: Option<JoinHandle<()>>,
}

impl WorkerLink {
    /// Spawn the worker and complete the handshake.
    fn establish(config: &WorkerConfig) -> Result<Self> {
        let mut command = Command::new(&config.worker_path);
        command
            .args(&config.args)
            .env(COOKIE_ENV, COOKIE_VALUE)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::inherit());

        let mut process = ProcessHandle::spawn(command, WORKER_NAME)?;
        let stdin = process
            .take_stdin()
            .ok_or_else(|| HeifError::Transport("worker stdin pipe missing".to_string()))?;
        let mut stdout = process
            .take_stdout()
            .ok_or_else(|| HeifError::Transport("worker stdout pipe missing".to_string()))?;

        let (tx, rx) = crossbeam_channel::unbounded();
        let reader = std::thread::spawn(move || {
            loop {
                let frame = read_frame::<_, Response>(&mut stdout);
                let finished = frame.is_err();
                if tx.send(frame).is_err() || finished {
                    break;
                }
            }
        });

        let mut link = Self {
            process,
            stdin,
            responses: rx,
            reader: Some(reader),
        };

        match link.recv(Some(config.handshake_timeout)) {
            Ok(Response::Handshake(handshake)) if handshake.matches_current() => {
                tracing::debug!(
                    "worker pid {} handshake accepted (protocol v{})",
                    link.process.pid(),
                    handshake.protocol_version
                );
                Ok(link)
            }
            Ok(Response::Handshake(handshake)) => Err(HeifError::HandshakeFailed(format!(
                "incompatible worker: protocol v{}, cookie {:?}",
                handshake.protocol_version, handshake.cookie
            ))),
            Ok(other) => Err(HeifError::HandshakeFailed(format!(
                "first frame was not a handshake: {other:?}"
            ))),
            Err(e) => Err(HeifError::HandshakeFailed(e.to_string())),
        }
    }

    fn recv(&mut self, timeout: Option<Duration>) -> Result<Response> {
        let frame = match timeout {
            Some(deadline) => self.responses.recv_timeout(deadline).map_err(|e| match e {
                RecvTimeoutError::Timeout => {
                    HeifError::Transport(format!("no worker response within {deadline:?}"))
                }
                RecvTimeoutError::Disconnected => {
                    HeifError::Transport("worker closed the pipe".to_string())
                }
            })?,
            None => self
                .responses
                .recv()
                .map_err(|_| HeifError::Transport("worker closed the pipe".to_string()))?,
        };
        frame.map_err(|e| HeifError::Transport(e.to_string()))
    }

    /// Write one request and wait for its answer. A `Response::Error` frame
    /// becomes `HeifError::Remote`.
    fn call(&mut self, request: &Request, timeout: Option<Duration>) -> Result<Response> {
        write_frame(&mut self.stdin, request).map_err(|e| HeifError::Transport(e.to_string()))?;
        match self.recv(timeout)? {
            Response::Error(remote) => Err(HeifError::Remote(remote)),
            response => Ok(response),
        }
    }

    fn ping_ok(&mut self, timeout: Option<Duration>) -> bool {
        matches!(
            self.call(&Request::Ping, timeout),
            Ok(Response::Pong(payload)) if payload == PONG
        )
    }

    /// Close stdin so the worker sees EOF and exits, then reap it.
    fn shutdown(self, timeout: Duration) {
        let Self {
            mut process,
            stdin,
            responses,
            reader,
        } = self;
        drop(stdin);
        drop(responses);
        if let Err(e) = process.shutdown(timeout) {
            tracing::warn!("worker shutdown failed: {e}");
        }
        if let Some(reader) = reader {
            reader.join().ok();
        }
    }
}

/// Supervises the worker process and exposes the decoding API.
pub struct Controller {
    config: WorkerConfig,
    link: Mutex<Option<WorkerLink>>,
}

impl Controller {
    /// Create a controller. No process is spawned until [`init`](Self::init).
    pub fn new(config: WorkerConfig) -> Self {
        Self {
            config,
            link: Mutex::new(None),
        }
    }

    /// Spawn the worker, complete the handshake, and verify it answers a
    /// ping. Idempotent: a second call on a live controller is a no-op.
    pub fn init(&self) -> Result<()> {
        let mut link = self.link.lock();
        if link.is_some() {
            return Ok(());
        }
        let mut fresh = WorkerLink::establish(&self.config).map_err(|e| match e {
            e @ HeifError::HandshakeFailed(_) => e,
            other => HeifError::HandshakeFailed(other.to_string()),
        })?;
        if !fresh.ping_ok(self.config.call_timeout) {
            fresh.shutdown(self.config.shutdown_timeout);
            return Err(HeifError::WorkerUnreachable(
                "worker handshook but failed its first health check".to_string(),
            ));
        }
        *link = Some(fresh);
        Ok(())
    }

    /// Shut the worker down. Idempotent. All session ids become invalid.
    pub fn deinit(&self) {
        if let Some(link) = self.link.lock().take() {
            link.shutdown(self.config.shutdown_timeout);
        }
    }

    /// PID of the live worker, if any. Test and diagnostics hook.
    pub fn worker_pid(&self) -> Option<u32> {
        self.link.lock().as_ref().map(|link| link.process.pid())
    }

    /// Health-check the worker, respawning it at most once, then issue the
    /// call. Holds the link lock for the whole exchange: the protocol is
    /// strictly one call at a time.
    fn call(&self, request: Request) -> Result<Response> {
        let mut guard = self.link.lock();
        let link = guard.as_mut().ok_or(HeifError::NotInitialized)?;

        if !link.ping_ok(self.config.call_timeout) {
            tracing::warn!("worker unresponsive, respawning");
            if let Some(dead) = guard.take() {
                dead.shutdown(self.config.shutdown_timeout);
            }
            let fresh = WorkerLink::establish(&self.config)
                .map_err(|e| HeifError::WorkerUnreachable(e.to_string()))?;
            let link = guard.insert(fresh);
            if !link.ping_ok(self.config.call_timeout) {
                return Err(HeifError::WorkerUnreachable(
                    "respawned worker failed its health check".to_string(),
                ));
            }
        }

        let link = guard.as_mut().ok_or(HeifError::NotInitialized)?;
        link.call(&request, self.config.call_timeout)
    }

    /// Round-trip a ping. Mostly useful to assert liveness from tests.
    pub fn ping(&self) -> Result<()> {
        match self.call(Request::Ping)? {
            Response::Pong(payload) if payload == PONG => Ok(()),
            other => Err(unexpected(&other)),
        }
    }

    /// Open a decoder session with the configured plane policy.
    pub fn open_session(&self) -> Result<Session<'_>> {
        self.open_session_with_mode(self.config.safe_mode)
    }

    /// Open a decoder session, choosing the plane policy per session.
    pub fn open_session_with_mode(&self, safe_mode: bool) -> Result<Session<'_>> {
        match self.call(Request::NewDecoder { safe_mode })? {
            Response::DecoderCreated { id } => Ok(Session::new(self, id)),
            other => Err(unexpected(&other)),
        }
    }

    pub(crate) fn close_decoder(&self, id: &str) -> Result<()> {
        match self.call(Request::CloseDecoder { id: id.to_string() })? {
            Response::DecoderClosed => Ok(()),
            other => Err(unexpected(&other)),
        }
    }

    pub(crate) fn reset_decoder(&self, id: &str) -> Result<()> {
        match self.call(Request::ResetDecoder { id: id.to_string() })? {
            Response::DecoderReset => Ok(()),
            other => Err(unexpected(&other)),
        }
    }

    pub(crate) fn push_decoder(&self, id: &str, data: &[u8]) -> Result<()> {
        match self.call(Request::PushDecoder {
            id: id.to_string(),
            data: data.to_vec(),
        })? {
            Response::Pushed => Ok(()),
            other => Err(unexpected(&other)),
        }
    }

    pub(crate) fn render_decoder(&self, id: &str, data: &[u8]) -> Result<PlanarImage> {
        match self.call(Request::RenderDecoder {
            id: id.to_string(),
            data: data.to_vec(),
        })? {
            Response::Picture(image) => Ok(image),
            other => Err(unexpected(&other)),
        }
    }

    /// Decode a container's primary item and encode it in one worker call.
    /// `max_file_size` of 0 means unbounded.
    pub fn render_file(
        &self,
        data: &[u8],
        format: OutputFormat,
        max_file_size: u64,
    ) -> Result<Vec<u8>> {
        match self.call(Request::RenderFile {
            data: data.to_vec(),
            format,
            max_file_size,
            safe_mode: self.config.safe_mode,
        })? {
            Response::FileRendered(bytes) => Ok(bytes),
            other => Err(unexpected(&other)),
        }
    }
}

impl Drop for Controller {
    fn drop(&mut self) {
        self.deinit();
    }
}

fn unexpected(response: &Response) -> HeifError {
    HeifError::Protocol(format!("response does not answer the request: {response:?}"))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config() -> WorkerConfig {
        WorkerConfig::new("/nonexistent/heifgrid-worker")
            .with_handshake_timeout(Duration::from_millis(100))
    }

    #[test]
    fn test_calls_require_init() {
        let controller = Controller::new(config());
        assert!(matches!(controller.ping(), Err(HeifError::NotInitialized)));
        assert!(matches!(
            controller.open_session(),
            Err(HeifError::NotInitialized)
        ));
        assert!(controller.worker_pid().is_none());
        // deinit without init is a no-op
        controller.deinit();
    }

    #[test]
    fn test_init_with_missing_binary_is_handshake_failure() {
        let controller = Controller::new(config());
        assert!(matches!(
            controller.init(),
            Err(HeifError::HandshakeFailed(_))
        ));
    }

    #[test]
    fn test_config_builders() {
        let config = WorkerConfig::new("worker")
            .with_safe_mode(false)
            .with_handshake_timeout(Duration::from_secs(1))
            .with_call_timeout(Duration::from_secs(5));
        assert!(!config.safe_mode);
        assert_eq!(config.handshake_timeout, Duration::from_secs(1));
        assert_eq!(config.call_timeout, Some(Duration::from_secs(5)));
    }
}
