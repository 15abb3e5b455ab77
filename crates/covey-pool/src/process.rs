// SPDX-FileCopyrightText: 2026 Covey Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Process control seam for the supervisor.
//!
//! The supervisor never touches OS processes directly; it goes through
//! [`ProcessControl`] so tests can inject a fake backend. The production
//! implementation spawns `covey worker` children that inherit the shared
//! listening socket.

use std::path::PathBuf;

use async_trait::async_trait;
#[cfg(unix)]
use tracing::warn;

use covey_core::CoveyError;

/// A spawned worker process under supervision.
#[async_trait]
pub trait WorkerProcess: Send {
    /// OS pid, or a synthetic id for fake backends.
    fn id(&self) -> u32;

    /// Wait for the process to exit. Returns the exit code, or `None`
    /// when the process was terminated by a signal.
    async fn wait(&mut self) -> Result<Option<i32>, CoveyError>;

    /// Ask the worker to drain: stop accepting, finish in-flight work,
    /// then exit cleanly.
    fn drain(&mut self) -> Result<(), CoveyError>;

    /// Force-terminate the worker.
    async fn kill(&mut self) -> Result<(), CoveyError>;
}

/// Spawns worker processes into pool slots.
#[async_trait]
pub trait ProcessControl: Send + Sync + 'static {
    async fn spawn(&self, slot: usize) -> Result<Box<dyn WorkerProcess>, CoveyError>;
}

/// Environment variable carrying the inherited listener fd to workers.
pub const LISTEN_FD_ENV: &str = "COVEY_LISTEN_FD";

/// Environment variable carrying the slot index to workers.
pub const WORKER_SLOT_ENV: &str = "COVEY_WORKER_SLOT";

/// Production process control: re-executes this binary with the hidden
/// `worker` subcommand.
///
/// The listening socket's fd must already have `FD_CLOEXEC` cleared so
/// children inherit it.
#[cfg(unix)]
pub struct OsProcessControl {
    program: PathBuf,
    listen_fd: i32,
    config_path: Option<PathBuf>,
}

#[cfg(unix)]
impl OsProcessControl {
    pub fn new(program: PathBuf, listen_fd: i32, config_path: Option<PathBuf>) -> Self {
        Self {
            program,
            listen_fd,
            config_path,
        }
    }
}

#[cfg(unix)]
#[async_trait]
impl ProcessControl for OsProcessControl {
    async fn spawn(&self, slot: usize) -> Result<Box<dyn WorkerProcess>, CoveyError> {
        let mut cmd = tokio::process::Command::new(&self.program);
        cmd.arg("worker")
            .env(LISTEN_FD_ENV, self.listen_fd.to_string())
            .env(WORKER_SLOT_ENV, slot.to_string());
        if let Some(path) = &self.config_path {
            cmd.arg("--config").arg(path);
        }
        let child = cmd.spawn().map_err(|e| {
            CoveyError::Internal(format!("failed to spawn worker for slot {slot}: {e}"))
        })?;
        Ok(Box::new(OsWorkerProcess { child }))
    }
}

#[cfg(unix)]
struct OsWorkerProcess {
    child: tokio::process::Child,
}

#[cfg(unix)]
#[async_trait]
impl WorkerProcess for OsWorkerProcess {
    fn id(&self) -> u32 {
        self.child.id().unwrap_or(0)
    }

    async fn wait(&mut self) -> Result<Option<i32>, CoveyError> {
        let status = self
            .child
            .wait()
            .await
            .map_err(|e| CoveyError::Internal(format!("wait on worker failed: {e}")))?;
        Ok(status.code())
    }

    fn drain(&mut self) -> Result<(), CoveyError> {
        // Already reaped: nothing to signal.
        let Some(pid) = self.child.id() else {
            return Ok(());
        };
        let rc = unsafe { libc::kill(pid as libc::pid_t, libc::SIGTERM) };
        if rc != 0 {
            let err = std::io::Error::last_os_error();
            warn!(pid, error = %err, "failed to signal worker for drain");
        }
        Ok(())
    }

    async fn kill(&mut self) -> Result<(), CoveyError> {
        self.child
            .kill()
            .await
            .map_err(|e| CoveyError::Internal(format!("kill on worker failed: {e}")))
    }
}
