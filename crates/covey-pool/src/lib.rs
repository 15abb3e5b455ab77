// SPDX-FileCopyrightText: 2026 Covey Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Worker pool lifecycle management for the covey server.
//!
//! Provides the supervisor that keeps exactly N worker processes alive,
//! the process-control seam that makes it testable without OS processes,
//! and the shared signal-to-CancellationToken shutdown plumbing.

pub mod process;
pub mod shutdown;
pub mod slot;
pub mod supervisor;

#[cfg(unix)]
pub use process::OsProcessControl;
pub use process::{LISTEN_FD_ENV, ProcessControl, WORKER_SLOT_ENV, WorkerProcess};
pub use shutdown::install_signal_handler;
pub use slot::{Slot, SlotState};
pub use supervisor::Supervisor;
