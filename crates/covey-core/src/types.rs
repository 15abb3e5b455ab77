// SPDX-FileCopyrightText: 2026 Covey Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Common types shared across the covey workspace.

use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};

/// States a worker process moves through from spawn to exit.
///
/// `Starting` opens the storage handle; a failure there is fatal to the
/// worker and reported to the lifecycle manager via its exit code.
/// `Draining` stops accepting new connections, finishes in-flight
/// transactions, and closes storage before `Stopped`.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumString, Serialize, Deserialize,
)]
#[strum(serialize_all = "lowercase")]
pub enum WorkerState {
    Starting,
    Ready,
    Serving,
    Draining,
    Stopped,
}

impl WorkerState {
    pub fn is_terminal(self) -> bool {
        matches!(self, WorkerState::Stopped)
    }
}

/// Health reported by the storage probe and the `/healthz` endpoint.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HealthStatus {
    /// Storage is fully operational.
    Healthy,
    /// Storage is operational but experiencing issues.
    Degraded(String),
    /// Storage is not operational.
    Unhealthy(String),
}

/// Process exit codes shared between the workers and the supervisor.
///
/// The supervisor inspects worker exit codes to distinguish a storage
/// startup failure from an ordinary crash when logging and accounting.
pub mod exit {
    /// Clean exit after a graceful drain.
    pub const OK: i32 = 0;
    /// Fatal configuration error at startup.
    pub const CONFIG: i32 = 1;
    /// Crash-loop exhaustion: a slot would not stay up.
    pub const CRASH_LOOP: i32 = 2;
    /// The worker could not open the storage handle.
    pub const STORAGE: i32 = 3;
}
