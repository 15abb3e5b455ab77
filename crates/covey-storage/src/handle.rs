// SPDX-FileCopyrightText: 2026 Covey Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! The storage handle: one per worker process.
//!
//! A [`Handle`] owns a writer and a reader connection to the shared
//! database file. Write transactions hold two locks for their whole
//! lifetime: the in-process write gate (serializes tasks within this
//! worker) and the cross-process write lock from the configured
//! [`WriteSerializer`] (serializes workers against each other). Reads
//! go through the reader connection against the last committed WAL
//! snapshot and take no locks.
//!
//! The request-handling layer above must touch persisted state only
//! through this API; it must not open the database file directly.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::sync::OwnedMutexGuard;
use tokio_rusqlite::Connection;
use tracing::{debug, warn};

use covey_config::model::{SerializerConfig, StorageConfig};
use covey_core::{CoveyError, HealthStatus, WriteGuard, WriteSerializer};

use crate::database::{self, ConnectionRole, map_tr_err};

/// Owns this worker's connections to the shared database file.
pub struct Handle {
    writer: Connection,
    reader: Connection,
    write_gate: Arc<tokio::sync::Mutex<()>>,
    serializer: Arc<dyn WriteSerializer>,
    write_timeout: Duration,
    path: PathBuf,
}

impl Handle {
    /// Open the database under the configured instance directory,
    /// creating the directory if absent.
    ///
    /// Uses the advisory file lock as the write serializer. Fails with
    /// [`CoveyError::StorageUnavailable`] when the directory or file
    /// cannot be created or opened.
    #[cfg(unix)]
    pub async fn open(
        storage: &StorageConfig,
        serializer: &SerializerConfig,
    ) -> Result<Handle, CoveyError> {
        let lock = crate::serializer::FileLock::new(
            serializer.lock_path(&storage.instance_dir),
            Duration::from_millis(serializer.backoff_initial_ms),
            Duration::from_millis(serializer.backoff_max_ms),
        );
        Self::open_with_serializer(
            storage,
            Arc::new(lock),
            Duration::from_millis(serializer.write_timeout_ms),
        )
        .await
    }

    /// Open with an explicit write serializer implementation.
    ///
    /// This is the seam that lets the file lock be swapped for an
    /// in-process mutex or a database-native primitive without touching
    /// callers.
    pub async fn open_with_serializer(
        storage: &StorageConfig,
        serializer: Arc<dyn WriteSerializer>,
        write_timeout: Duration,
    ) -> Result<Handle, CoveyError> {
        database::ensure_instance_dir(std::path::Path::new(&storage.instance_dir))?;

        let path = storage.database_path();
        let writer =
            database::open_connection(&path, ConnectionRole::Writer, storage.busy_timeout_ms)
                .await?;
        let reader =
            database::open_connection(&path, ConnectionRole::Reader, storage.busy_timeout_ms)
                .await?;

        debug!(path = %path.display(), "storage handle opened");
        Ok(Handle {
            writer,
            reader,
            write_gate: Arc::new(tokio::sync::Mutex::new(())),
            serializer,
            write_timeout,
            path,
        })
    }

    /// Path of the database file this handle is bound to.
    pub fn path(&self) -> &std::path::Path {
        &self.path
    }

    /// Begin a write transaction.
    ///
    /// Acquires the in-process write gate and the cross-process write
    /// lock, both bounded by the configured write timeout, then issues
    /// `BEGIN IMMEDIATE`. A transaction still waiting when the deadline
    /// elapses fails with [`CoveyError::WriteTimeout`]; nothing has been
    /// written at that point.
    pub async fn begin(&self) -> Result<Transaction, CoveyError> {
        let start = Instant::now();

        let gate = tokio::time::timeout(self.write_timeout, self.write_gate.clone().lock_owned())
            .await
            .map_err(|_| CoveyError::WriteTimeout {
                waited: start.elapsed(),
            })?;

        let remaining = self.write_timeout.saturating_sub(start.elapsed());
        let lock = self.serializer.try_acquire(remaining).await?;

        self.writer
            .call(|c| {
                c.execute_batch("BEGIN IMMEDIATE;")?;
                Ok::<_, rusqlite::Error>(())
            })
            .await
            .map_err(map_tr_err)?;

        Ok(Transaction {
            conn: self.writer.clone(),
            state: TxnState::Active,
            lock: Some(lock),
            gate: Some(gate),
        })
    }

    /// Run a read against the last committed snapshot.
    ///
    /// Never takes the write lock and never observes another worker's
    /// uncommitted transaction.
    pub async fn fetch<T, F>(&self, op: F) -> Result<T, CoveyError>
    where
        F: FnOnce(&rusqlite::Connection) -> rusqlite::Result<T> + Send + 'static,
        T: Send + 'static,
    {
        self.reader
            .call(move |c| op(c))
            .await
            .map_err(map_tr_err)
    }

    /// Probe the database with a trivial query.
    pub async fn health_check(&self) -> HealthStatus {
        let result = self
            .reader
            .call(|c| {
                c.execute_batch("SELECT 1;")?;
                Ok::<_, rusqlite::Error>(())
            })
            .await;
        match result {
            Ok(()) => HealthStatus::Healthy,
            Err(e) => HealthStatus::Unhealthy(e.to_string()),
        }
    }

    /// Flush the WAL into the main database file before shutdown.
    pub async fn close(&self) -> Result<(), CoveyError> {
        self.writer
            .call(|c| {
                c.execute_batch("PRAGMA wal_checkpoint(TRUNCATE);")?;
                Ok::<_, rusqlite::Error>(())
            })
            .await
            .map_err(map_tr_err)?;
        debug!("WAL checkpoint complete");
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum TxnState {
    Active,
    Committed,
    RolledBack,
}

/// A write transaction scoped to a single request.
///
/// Holds the write gate and the cross-process lock until committed or
/// rolled back. Dropping an unfinished transaction rolls it back.
#[derive(Debug)]
pub struct Transaction {
    conn: Connection,
    state: TxnState,
    lock: Option<Box<dyn WriteGuard>>,
    gate: Option<OwnedMutexGuard<()>>,
}

impl Transaction {
    fn ensure_active(&self) -> Result<(), CoveyError> {
        match self.state {
            TxnState::Active => Ok(()),
            TxnState::Committed => Err(CoveyError::InvalidState("transaction already committed")),
            TxnState::RolledBack => {
                Err(CoveyError::InvalidState("transaction already rolled back"))
            }
        }
    }

    /// Run an operation inside the open transaction.
    ///
    /// A [`CoveyError::Conflict`] or [`CoveyError::Io`] failure aborts
    /// the transaction: it is rolled back and the locks released, so a
    /// caller retrying starts from scratch.
    pub async fn execute<T, F>(&mut self, op: F) -> Result<T, CoveyError>
    where
        F: FnOnce(&rusqlite::Connection) -> rusqlite::Result<T> + Send + 'static,
        T: Send + 'static,
    {
        self.ensure_active()?;
        let result = self
            .conn
            .call(move |c| op(c))
            .await
            .map_err(map_tr_err);
        if result.is_err() {
            self.abort().await;
        }
        result
    }

    /// Commit the transaction, durably persisting all of its operations
    /// before returning.
    ///
    /// Fails with [`CoveyError::Conflict`] on a lost race; the
    /// transaction is rolled back and the caller retries it from
    /// scratch.
    pub async fn commit(mut self) -> Result<(), CoveyError> {
        self.ensure_active()?;
        let result = self
            .conn
            .call(|c| {
                c.execute_batch("COMMIT;")?;
                Ok::<_, rusqlite::Error>(())
            })
            .await
            .map_err(map_tr_err);
        match result {
            Ok(()) => {
                self.state = TxnState::Committed;
                self.lock = None;
                self.gate = None;
                Ok(())
            }
            Err(e) => {
                self.abort().await;
                Err(e)
            }
        }
    }

    /// Roll the transaction back, discarding all of its operations.
    pub async fn rollback(mut self) -> Result<(), CoveyError> {
        self.ensure_active()?;
        self.abort().await;
        Ok(())
    }

    async fn abort(&mut self) {
        if let Err(e) = self
            .conn
            .call(|c| {
                c.execute_batch("ROLLBACK;")?;
                Ok::<_, rusqlite::Error>(())
            })
            .await
        {
            warn!(error = %e, "rollback failed");
        }
        self.state = TxnState::RolledBack;
        self.lock = None;
        self.gate = None;
    }
}

impl Drop for Transaction {
    fn drop(&mut self) {
        if self.state != TxnState::Active {
            return;
        }
        // A dropped-but-unfinished transaction must not leave the
        // connection inside an open transaction, and the locks must not
        // release before the ROLLBACK lands on the connection thread.
        let conn = self.conn.clone();
        let lock = self.lock.take();
        let gate = self.gate.take();
        if let Ok(rt) = tokio::runtime::Handle::try_current() {
            rt.spawn(async move {
                let _ = conn
                    .call(|c| {
                        c.execute_batch("ROLLBACK;")?;
                        Ok::<_, rusqlite::Error>(())
                    })
                    .await;
                drop(lock);
                drop(gate);
            });
        }
    }
}

/// Re-run a whole transaction when it fails with [`CoveyError::Conflict`].
///
/// The body receives a fresh transaction on each attempt and is expected
/// to commit (or roll back) before returning. Side effects of an aborted
/// attempt are never visible, so re-executing identical operations yields
/// the same final committed state as a first-attempt success.
pub async fn retry_on_conflict<T, F, Fut>(
    handle: &Handle,
    max_attempts: u32,
    body: F,
) -> Result<T, CoveyError>
where
    F: Fn(Transaction) -> Fut,
    Fut: Future<Output = Result<T, CoveyError>>,
{
    let mut attempt = 0;
    loop {
        attempt += 1;
        let tx = handle.begin().await?;
        match body(tx).await {
            Err(CoveyError::Conflict { .. }) if attempt < max_attempts => {
                debug!(attempt, "write conflict, retrying transaction");
            }
            other => return other,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::serializer::{FileLock, LocalLock};
    use rusqlite::params;
    use std::sync::atomic::{AtomicU32, Ordering};
    use tempfile::{TempDir, tempdir};

    fn storage_config(dir: &TempDir) -> StorageConfig {
        StorageConfig {
            instance_dir: dir.path().join("instance").to_string_lossy().into_owned(),
            database_file: "test.db".to_string(),
            busy_timeout_ms: 1000,
        }
    }

    async fn open_local(dir: &TempDir, timeout: Duration) -> Handle {
        Handle::open_with_serializer(
            &storage_config(dir),
            Arc::new(LocalLock::new()),
            timeout,
        )
        .await
        .unwrap()
    }

    /// Two handles on the same database and the same lock file, as two
    /// worker processes would hold.
    async fn open_pair(dir: &TempDir, timeout: Duration) -> (Handle, Handle) {
        let config = storage_config(dir);
        let lock_path = dir.path().join("instance").join("test.write.lock");
        let make_lock = || {
            Arc::new(FileLock::new(
                lock_path.clone(),
                Duration::from_millis(2),
                Duration::from_millis(20),
            ))
        };
        let a = Handle::open_with_serializer(&config, make_lock(), timeout)
            .await
            .unwrap();
        let b = Handle::open_with_serializer(&config, make_lock(), timeout)
            .await
            .unwrap();
        (a, b)
    }

    async fn create_counter(handle: &Handle) {
        let mut tx = handle.begin().await.unwrap();
        tx.execute(|c| {
            c.execute_batch(
                "CREATE TABLE IF NOT EXISTS counter (id INTEGER PRIMARY KEY, value INTEGER NOT NULL);
                 INSERT OR IGNORE INTO counter (id, value) VALUES (1, 0);",
            )
        })
        .await
        .unwrap();
        tx.commit().await.unwrap();
    }

    async fn read_counter(handle: &Handle) -> i64 {
        handle
            .fetch(|c| c.query_row("SELECT value FROM counter WHERE id = 1", [], |r| r.get(0)))
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn open_creates_instance_dir_and_database_file() {
        let dir = tempdir().unwrap();
        let config = storage_config(&dir);
        let handle = Handle::open_with_serializer(
            &config,
            Arc::new(LocalLock::new()),
            Duration::from_secs(1),
        )
        .await
        .unwrap();

        assert!(config.database_path().exists());
        assert_eq!(handle.health_check().await, HealthStatus::Healthy);
    }

    #[tokio::test]
    async fn committed_writes_are_visible_to_reads() {
        let dir = tempdir().unwrap();
        let handle = open_local(&dir, Duration::from_secs(1)).await;
        create_counter(&handle).await;

        let mut tx = handle.begin().await.unwrap();
        tx.execute(|c| {
            c.execute("UPDATE counter SET value = value + 1 WHERE id = 1", [])
        })
        .await
        .unwrap();
        tx.commit().await.unwrap();

        assert_eq!(read_counter(&handle).await, 1);
    }

    #[tokio::test]
    async fn rolled_back_writes_are_invisible() {
        let dir = tempdir().unwrap();
        let handle = open_local(&dir, Duration::from_secs(1)).await;
        create_counter(&handle).await;

        let mut tx = handle.begin().await.unwrap();
        tx.execute(|c| {
            c.execute("UPDATE counter SET value = 99 WHERE id = 1", [])
        })
        .await
        .unwrap();
        tx.rollback().await.unwrap();

        assert_eq!(read_counter(&handle).await, 0);
    }

    #[tokio::test]
    async fn dropped_transaction_rolls_back() {
        let dir = tempdir().unwrap();
        let handle = open_local(&dir, Duration::from_secs(2)).await;
        create_counter(&handle).await;

        {
            let mut tx = handle.begin().await.unwrap();
            tx.execute(|c| {
                c.execute("UPDATE counter SET value = 42 WHERE id = 1", [])
            })
            .await
            .unwrap();
            // Dropped without commit: rollback happens on the connection
            // thread and only then releases the write gate.
        }

        // begin() waits on the gate, so this observes the rollback.
        let mut tx = handle.begin().await.unwrap();
        let value: i64 = tx
            .execute(|c| c.query_row("SELECT value FROM counter WHERE id = 1", [], |r| r.get(0)))
            .await
            .unwrap();
        assert_eq!(value, 0);
        tx.rollback().await.unwrap();
    }

    #[tokio::test]
    async fn failed_operation_aborts_the_transaction() {
        let dir = tempdir().unwrap();
        let handle = open_local(&dir, Duration::from_secs(1)).await;
        create_counter(&handle).await;

        let mut tx = handle.begin().await.unwrap();
        let err = tx
            .execute(|c| c.execute("UPDATE no_such_table SET x = 1", []))
            .await
            .unwrap_err();
        assert!(matches!(err, CoveyError::Io { .. }));

        // The transaction is finished; further operations are a bug.
        let err = tx.execute(|c| c.execute("SELECT 1", [])).await.unwrap_err();
        assert!(matches!(err, CoveyError::InvalidState(_)));
    }

    #[tokio::test]
    async fn begin_times_out_while_another_transaction_holds_the_lock() {
        let dir = tempdir().unwrap();
        let (a, b) = open_pair(&dir, Duration::from_millis(100)).await;
        create_counter(&a).await;

        let held = a.begin().await.unwrap();
        let err = b.begin().await.unwrap_err();
        assert!(matches!(err, CoveyError::WriteTimeout { .. }));

        held.rollback().await.unwrap();
    }

    #[tokio::test]
    async fn uncommitted_writes_are_invisible_to_other_handles() {
        let dir = tempdir().unwrap();
        let (a, b) = open_pair(&dir, Duration::from_secs(1)).await;
        create_counter(&a).await;

        let mut tx = a.begin().await.unwrap();
        tx.execute(|c| {
            c.execute("UPDATE counter SET value = 7 WHERE id = 1", [])
        })
        .await
        .unwrap();

        // b reads the last committed snapshot, not a's open transaction.
        assert_eq!(read_counter(&b).await, 0);

        tx.commit().await.unwrap();
        assert_eq!(read_counter(&b).await, 7);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_increments_across_handles_lose_no_updates() {
        let dir = tempdir().unwrap();
        let (a, b) = open_pair(&dir, Duration::from_secs(10)).await;
        create_counter(&a).await;

        let a = Arc::new(a);
        let b = Arc::new(b);
        let mut tasks = Vec::new();
        for i in 0..10 {
            let handle = if i % 2 == 0 { a.clone() } else { b.clone() };
            tasks.push(tokio::spawn(async move {
                retry_on_conflict(&handle, 5, |mut tx| async move {
                    tx.execute(|c| {
                        c.execute("UPDATE counter SET value = value + 1 WHERE id = 1", [])
                    })
                    .await?;
                    tx.commit().await?;
                    Ok(())
                })
                .await
            }));
        }
        for task in tasks {
            task.await.unwrap().unwrap();
        }

        // Equivalent to some serial execution of the ten increments.
        assert_eq!(read_counter(&a).await, 10);
    }

    #[tokio::test]
    async fn conflicted_transaction_retries_to_the_same_final_state() {
        let dir = tempdir().unwrap();
        let handle = open_local(&dir, Duration::from_secs(1)).await;
        create_counter(&handle).await;

        // First attempt aborts with a synthetic conflict after running
        // its operations; the retry re-executes them from scratch.
        let attempts = AtomicU32::new(0);
        retry_on_conflict(&handle, 3, |mut tx| {
            let attempt = attempts.fetch_add(1, Ordering::SeqCst);
            async move {
                tx.execute(|c| {
                    c.execute(
                        "UPDATE counter SET value = value + 5 WHERE id = 1",
                        params![],
                    )
                })
                .await?;
                if attempt == 0 {
                    tx.rollback().await?;
                    return Err(CoveyError::Conflict {
                        message: "lost the race".into(),
                    });
                }
                tx.commit().await?;
                Ok(())
            }
        })
        .await
        .unwrap();

        assert_eq!(attempts.load(Ordering::SeqCst), 2);
        // Same final state as if the first attempt had succeeded.
        assert_eq!(read_counter(&handle).await, 5);
    }

    #[tokio::test]
    async fn close_checkpoints_the_wal() {
        let dir = tempdir().unwrap();
        let handle = open_local(&dir, Duration::from_secs(1)).await;
        create_counter(&handle).await;
        handle.close().await.unwrap();

        // Reopening sees the committed state.
        let reopened = open_local(&dir, Duration::from_secs(1)).await;
        assert_eq!(read_counter(&reopened).await, 0);
    }
}
