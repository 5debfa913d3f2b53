// Copyright (c) 2025 Jonathan Fontanez
// SPDX-License-Identifier: BUSL-1.1

//! Worker process lifecycle management.

use std::process::{Child, ChildStdin, ChildStdout, Command, ExitStatus};
use std::time::Duration;

use crate::error::{HeifError, Result};

/// Handle to a running worker process.
#[derive(Debug)]
pub struct ProcessHandle {
    child: Child,
    name: String,
}

impl ProcessHandle {
    /// Spawn a subprocess from a command.
    pub fn spawn(mut command: Command, name: &str) -> Result<Self> {
        let child = command.spawn().map_err(|e| {
            HeifError::WorkerUnreachable(format!("failed to spawn subprocess '{name}': {e}"))
        })?;

        tracing::info!("Spawned subprocess '{}' with PID {}", name, child.id());

        Ok(Self {
            child,
            name: name.to_string(),
        })
    }

    /// Get the process ID.
    pub fn pid(&self) -> u32 {
        self.child.id()
    }

    /// Take ownership of the child's stdin pipe. Yields once.
    pub fn take_stdin(&mut self) -> Option<ChildStdin> {
        self.child.stdin.take()
    }

    /// Take ownership of the child's stdout pipe. Yields once.
    pub fn take_stdout(&mut self) -> Option<ChildStdout> {
        self.child.stdout.take()
    }

    /// Check if the process is still running.
    pub fn is_running(&mut self) -> bool {
        self.child.try_wait().ok().flatten().is_none()
    }

    /// Try to wait for the process without blocking.
    pub fn try_wait(&mut self) -> Result<Option<ExitStatus>> {
        self.child.try_wait().map_err(|e| {
            HeifError::WorkerUnreachable(format!(
                "failed to check subprocess '{}' status: {}",
                self.name, e
            ))
        })
    }

    /// Wait for the process to exit.
    pub fn wait(&mut self) -> Result<ExitStatus> {
        self.child.wait().map_err(|e| {
            HeifError::WorkerUnreachable(format!(
                "failed to wait for subprocess '{}': {}",
                self.name, e
            ))
        })
    }

    /// Force kill the process.
    pub fn kill(&mut self) -> Result<()> {
        tracing::warn!("Force killing subprocess '{}'", self.name);
        self.child.kill().map_err(|e| {
            HeifError::WorkerUnreachable(format!("failed to kill subprocess '{}': {}", self.name, e))
        })
    }

    /// Graceful shutdown with timeout, then force kill. The caller is
    /// expected to have already signaled shutdown (closed the worker's
    /// stdin).
    pub fn shutdown(&mut self, timeout: Duration) -> Result<ExitStatus> {
        let start = std::time::Instant::now();

        while start.elapsed() < timeout {
            if let Some(status) = self.try_wait()? {
                tracing::info!("Subprocess '{}' exited with status: {:?}", self.name, status);
                return Ok(status);
            }
            std::thread::sleep(Duration::from_millis(10));
        }

        tracing::warn!(
            "Subprocess '{}' did not exit within {:?}, force killing",
            self.name,
            timeout
        );
        self.kill()?;
        self.wait()
    }
}

impl Drop for ProcessHandle {
    fn drop(&mut self) {
        if self.is_running() {
            tracing::warn!(
                "ProcessHandle for '{}' dropped while still running, killing",
                self.name
            );
            self.kill().ok();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_spawn_failure_is_worker_unreachable() {
        let err = ProcessHandle::spawn(
            Command::new("/nonexistent/heifgrid-worker-binary"),
            "missing",
        )
        .unwrap_err();
        assert!(matches!(err, HeifError::WorkerUnreachable(_)));
    }

    #[test]
    fn test_spawn_and_wait() {
        let mut command = Command::new("true");
        command.stdout(std::process::Stdio::null());
        let mut handle = ProcessHandle::spawn(command, "true").unwrap();
        let status = handle.wait().unwrap();
        assert!(status.success());
        assert!(!handle.is_running());
    }
}
