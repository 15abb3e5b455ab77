// SPDX-FileCopyrightText: 2026 Covey Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Error types for the covey server core.

use std::path::PathBuf;
use std::time::Duration;

use thiserror::Error;

/// The primary error type used across the covey workspace.
#[derive(Debug, Error)]
pub enum CoveyError {
    /// Configuration errors (invalid TOML, missing required fields, bad values).
    #[error("configuration error: {0}")]
    Config(String),

    /// The database file is missing, unwritable, or failed to open.
    ///
    /// Fatal to the affected worker; the lifecycle manager retries the
    /// worker with backoff under crash-loop accounting.
    #[error("storage unavailable at {path}: {source}")]
    StorageUnavailable {
        path: PathBuf,
        source: Box<dyn std::error::Error + Send + Sync>,
    },

    /// A concurrent writer won the race at the storage layer.
    ///
    /// Recovered by retrying the whole transaction from scratch; side
    /// effects of the aborted attempt are not guaranteed visible or absent.
    #[error("write conflict: {message}")]
    Conflict { message: String },

    /// The write lock was not acquired within the deadline.
    #[error("write lock not acquired within {waited:?}")]
    WriteTimeout { waited: Duration },

    /// Disk-level failure mid-operation. The transaction is rolled back.
    #[error("storage I/O error: {source}")]
    Io {
        source: Box<dyn std::error::Error + Send + Sync>,
    },

    /// A storage operation was issued against a finished transaction.
    #[error("invalid transaction state: {0}")]
    InvalidState(&'static str),

    /// A worker slot failed to stay up too many times within the window.
    ///
    /// Process-wide fatal: usually a structurally broken database file.
    #[error("worker slot {slot} crash-looped ({failures} consecutive failures)")]
    CrashLoop { slot: usize, failures: u32 },

    /// Internal or unexpected errors.
    #[error("internal error: {0}")]
    Internal(String),
}

impl CoveyError {
    /// Whether the caller may retry the failed operation.
    ///
    /// `Conflict` is retried by re-running the whole transaction;
    /// `WriteTimeout` is surfaced to the request as a retryable failure.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            CoveyError::Conflict { .. } | CoveyError::WriteTimeout { .. }
        )
    }
}
