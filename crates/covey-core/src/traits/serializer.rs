// SPDX-FileCopyrightText: 2026 Covey Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Cross-process write serialization seam.
//!
//! The embedded database offers only file-level locking, so at most one
//! writer transaction may commit at a time across the whole worker pool.
//! Implementations provide that mutual exclusion; callers never bypass
//! it for writes. Reads do not use this seam at all.

use std::time::Duration;

use async_trait::async_trait;

use crate::error::CoveyError;

/// A held write lock. Dropping the guard releases the lock.
///
/// Guards must release even when the owning process dies mid-transaction;
/// the file-lock implementation gets this from the OS closing the lock
/// file descriptor.
pub trait WriteGuard: Send + std::fmt::Debug {}

/// Provides at-most-one-active-writer semantics across the worker pool.
///
/// Acquisition is bounded: an attempt that cannot get the lock within
/// `timeout` fails with [`CoveyError::WriteTimeout`] rather than
/// blocking indefinitely. There is no fairness guarantee -- the first
/// process to acquire wins, and starvation under sustained write load
/// is bounded only by the timeout.
#[async_trait]
pub trait WriteSerializer: Send + Sync + 'static {
    /// Attempt to acquire the write lock, waiting at most `timeout`.
    async fn try_acquire(&self, timeout: Duration) -> Result<Box<dyn WriteGuard>, CoveyError>;
}
