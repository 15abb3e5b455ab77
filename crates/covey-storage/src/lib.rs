// SPDX-FileCopyrightText: 2026 Covey Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! SQLite persistence core for the covey server.
//!
//! Provides the per-worker storage handle (WAL-mode writer/reader
//! connection pair with a transactional API) and the cross-process write
//! serializer that gives the worker pool at-most-one-active-writer
//! semantics over a single shared database file.

pub mod database;
pub mod handle;
pub mod serializer;

pub use database::{ensure_instance_dir, map_sqlite_err, map_tr_err};
pub use handle::{Handle, Transaction, retry_on_conflict};
#[cfg(unix)]
pub use serializer::FileLock;
pub use serializer::LocalLock;
