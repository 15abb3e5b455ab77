// SPDX-FileCopyrightText: 2026 Covey Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Write serializer implementations.
//!
//! The embedded database offers only file-level locking, so covey layers
//! at-most-one-active-writer semantics on top: every write transaction
//! holds the cross-process lock from `BEGIN` to `COMMIT`/`ROLLBACK`.
//!
//! [`FileLock`] is the production implementation: an advisory `flock` on
//! a dedicated lock file in the instance directory. The lock file is
//! re-opened on every acquisition, so the OS releases the lock when the
//! guard's descriptor closes -- including when the owning process dies
//! mid-transaction.
//!
//! [`LocalLock`] serializes within one process only; it exists for tests
//! and for single-process deployments.
//!
//! Neither implementation is fair: the first acquirer wins, and a
//! starved writer is bounded only by its timeout.

use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use tracing::trace;

use covey_core::{CoveyError, WriteGuard, WriteSerializer};

/// Advisory file lock with bounded exponential backoff.
#[cfg(unix)]
pub struct FileLock {
    path: std::path::PathBuf,
    backoff_initial: Duration,
    backoff_max: Duration,
}

#[cfg(unix)]
impl FileLock {
    pub fn new(
        path: impl Into<std::path::PathBuf>,
        backoff_initial: Duration,
        backoff_max: Duration,
    ) -> Self {
        Self {
            path: path.into(),
            backoff_initial,
            backoff_max,
        }
    }

    /// One non-blocking acquisition attempt.
    ///
    /// Returns `Ok(Some(file))` holding the lock, `Ok(None)` when another
    /// process holds it, `Err` on a real I/O failure.
    fn try_once(&self) -> std::io::Result<Option<std::fs::File>> {
        use std::os::unix::io::AsRawFd;

        let file = std::fs::OpenOptions::new()
            .create(true)
            .read(true)
            .write(true)
            .open(&self.path)?;
        let rc = unsafe { libc::flock(file.as_raw_fd(), libc::LOCK_EX | libc::LOCK_NB) };
        if rc == 0 {
            return Ok(Some(file));
        }
        let err = std::io::Error::last_os_error();
        if err.raw_os_error() == Some(libc::EWOULDBLOCK) {
            Ok(None)
        } else {
            Err(err)
        }
    }
}

/// Holds the flock via the open descriptor; dropping closes it and
/// releases the lock.
#[cfg(unix)]
#[derive(Debug)]
struct FileGuard {
    _file: std::fs::File,
}

#[cfg(unix)]
impl WriteGuard for FileGuard {}

#[cfg(unix)]
#[async_trait]
impl WriteSerializer for FileLock {
    async fn try_acquire(&self, timeout: Duration) -> Result<Box<dyn WriteGuard>, CoveyError> {
        let start = Instant::now();
        let mut delay = self.backoff_initial;

        loop {
            match self.try_once() {
                Ok(Some(file)) => {
                    trace!(path = %self.path.display(), waited = ?start.elapsed(), "write lock acquired");
                    return Ok(Box::new(FileGuard { _file: file }));
                }
                Ok(None) => {}
                Err(e) => {
                    return Err(CoveyError::Io {
                        source: Box::new(e),
                    });
                }
            }

            let elapsed = start.elapsed();
            if elapsed >= timeout {
                return Err(CoveyError::WriteTimeout { waited: elapsed });
            }
            tokio::time::sleep(delay.min(timeout - elapsed)).await;
            delay = (delay * 2).min(self.backoff_max);
        }
    }
}

/// In-process write serializer backed by a tokio mutex.
#[derive(Clone, Default)]
pub struct LocalLock {
    inner: Arc<tokio::sync::Mutex<()>>,
}

impl LocalLock {
    pub fn new() -> Self {
        Self::default()
    }
}

#[derive(Debug)]
struct LocalGuard {
    _permit: tokio::sync::OwnedMutexGuard<()>,
}

impl WriteGuard for LocalGuard {}

#[async_trait]
impl WriteSerializer for LocalLock {
    async fn try_acquire(&self, timeout: Duration) -> Result<Box<dyn WriteGuard>, CoveyError> {
        let start = Instant::now();
        match tokio::time::timeout(timeout, self.inner.clone().lock_owned()).await {
            Ok(permit) => Ok(Box::new(LocalGuard { _permit: permit })),
            Err(_) => Err(CoveyError::WriteTimeout {
                waited: start.elapsed(),
            }),
        }
    }
}
