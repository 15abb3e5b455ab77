// SPDX-FileCopyrightText: 2026 Covey Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Connection opening, PRAGMA setup, and storage error classification.
//!
//! Every worker process holds two connections to the shared database
//! file: a writer (all mutations, serialized through the write lock) and
//! a reader (snapshot reads in WAL mode, no coordination needed).

use std::path::Path;

use tokio_rusqlite::Connection;
use tracing::debug;

use covey_core::CoveyError;

/// Which role a connection plays inside a [`Handle`](crate::Handle).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum ConnectionRole {
    /// Carries transactions; `synchronous=FULL` so a successful commit
    /// is durable before it returns.
    Writer,
    /// Snapshot reads against the last committed WAL frame.
    Reader,
}

/// Create the instance directory if it does not exist yet.
pub fn ensure_instance_dir(dir: &Path) -> Result<(), CoveyError> {
    std::fs::create_dir_all(dir).map_err(|e| CoveyError::StorageUnavailable {
        path: dir.to_path_buf(),
        source: Box::new(e),
    })
}

/// Open a connection to the database file and apply PRAGMAs for its role.
///
/// Fails with [`CoveyError::StorageUnavailable`] when the file cannot be
/// opened or the PRAGMAs cannot be applied (missing directory, bad
/// permissions, corrupt header).
pub(crate) async fn open_connection(
    path: &Path,
    role: ConnectionRole,
    busy_timeout_ms: u64,
) -> Result<Connection, CoveyError> {
    let unavailable = |e: Box<dyn std::error::Error + Send + Sync>| CoveyError::StorageUnavailable {
        path: path.to_path_buf(),
        source: e,
    };

    let conn = Connection::open(path)
        .await
        .map_err(|e| unavailable(Box::new(e)))?;

    let synchronous = match role {
        ConnectionRole::Writer => "FULL",
        ConnectionRole::Reader => "NORMAL",
    };
    let pragmas = format!(
        "PRAGMA journal_mode=WAL;\n\
         PRAGMA synchronous={synchronous};\n\
         PRAGMA foreign_keys=ON;\n\
         PRAGMA busy_timeout={busy_timeout_ms};"
    );
    conn.call(move |c| {
        c.execute_batch(&pragmas)?;
        Ok::<_, rusqlite::Error>(())
    })
    .await
    .map_err(|e| unavailable(Box::new(e)))?;

    debug!(path = %path.display(), role = ?role, "database connection opened");
    Ok(conn)
}

/// Classify a `tokio_rusqlite` error into the covey taxonomy.
///
/// A busy or locked database means a concurrent writer won the race:
/// the caller retries the whole transaction. Everything else is a
/// disk-level failure.
pub fn map_tr_err(e: tokio_rusqlite::Error) -> CoveyError {
    match e {
        tokio_rusqlite::Error::Error(err) => map_sqlite_err(err),
        other => CoveyError::Io {
            source: Box::new(other),
        },
    }
}

/// Classify a raw `rusqlite` error.
pub fn map_sqlite_err(err: rusqlite::Error) -> CoveyError {
    use rusqlite::ErrorCode;

    match &err {
        rusqlite::Error::SqliteFailure(failure, _)
            if matches!(
                failure.code,
                ErrorCode::DatabaseBusy | ErrorCode::DatabaseLocked
            ) =>
        {
            CoveyError::Conflict {
                message: err.to_string(),
            }
        }
        _ => CoveyError::Io {
            source: Box::new(err),
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn busy_maps_to_conflict() {
        let failure = rusqlite::ffi::Error {
            code: rusqlite::ErrorCode::DatabaseBusy,
            extended_code: 5,
        };
        let err = rusqlite::Error::SqliteFailure(failure, Some("database is locked".into()));
        assert!(matches!(
            map_sqlite_err(err),
            CoveyError::Conflict { .. }
        ));
    }

    #[test]
    fn locked_maps_to_conflict() {
        let failure = rusqlite::ffi::Error {
            code: rusqlite::ErrorCode::DatabaseLocked,
            extended_code: 6,
        };
        let err = rusqlite::Error::SqliteFailure(failure, None);
        assert!(matches!(
            map_sqlite_err(err),
            CoveyError::Conflict { .. }
        ));
    }

    #[test]
    fn other_sqlite_errors_map_to_io() {
        let err = rusqlite::Error::QueryReturnedNoRows;
        assert!(matches!(map_sqlite_err(err), CoveyError::Io { .. }));
    }

    #[tokio::test]
    async fn open_applies_wal_mode() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("wal.db");
        let conn = open_connection(&path, ConnectionRole::Writer, 1000)
            .await
            .unwrap();

        let mode: String = conn
            .call(|c| {
                let mode = c.query_row("PRAGMA journal_mode;", [], |row| row.get(0))?;
                Ok::<_, rusqlite::Error>(mode)
            })
            .await
            .unwrap();
        assert_eq!(mode.to_ascii_lowercase(), "wal");
    }

    #[tokio::test]
    async fn open_fails_when_directory_is_missing() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("no-such-dir").join("covey.db");
        let result = open_connection(&path, ConnectionRole::Writer, 1000).await;
        assert!(matches!(
            result,
            Err(CoveyError::StorageUnavailable { .. })
        ));
    }

    #[test]
    fn ensure_instance_dir_creates_nested_paths() {
        let dir = tempdir().unwrap();
        let nested = dir.path().join("a").join("b");
        ensure_instance_dir(&nested).unwrap();
        assert!(nested.is_dir());
        // Idempotent on an existing directory.
        ensure_instance_dir(&nested).unwrap();
    }
}
