// SPDX-FileCopyrightText: 2026 Covey Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Worker slot records.
//!
//! Each of the N pool slots is an explicit state-tagged record rather
//! than ambient process state, so the supervisor's restart and
//! escalation logic is testable without spawning OS processes.

use std::time::{Duration, Instant};

/// Lifecycle state of one pool slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SlotState {
    /// No process has been spawned into the slot yet.
    #[default]
    Idle,
    /// A worker process occupies the slot.
    Running,
    /// The worker was asked to drain and has not exited yet.
    Draining,
    /// The worker exited; the slot awaits a respawn or final teardown.
    Exited,
}

impl SlotState {
    pub fn is_live(self) -> bool {
        matches!(self, SlotState::Running | SlotState::Draining)
    }
}

/// One of the N fixed process slots, tracked by the supervisor.
#[derive(Debug)]
pub struct Slot {
    pub id: usize,
    pub state: SlotState,
    /// Exits inside the failure window since the last stable run.
    pub consecutive_failures: u32,
    spawned_at: Option<Instant>,
    pub pid: Option<u32>,
}

impl Slot {
    pub fn new(id: usize) -> Self {
        Self {
            id,
            state: SlotState::Idle,
            consecutive_failures: 0,
            spawned_at: None,
            pid: None,
        }
    }

    /// A worker process was spawned into this slot.
    pub fn record_spawn(&mut self, pid: u32) {
        self.state = SlotState::Running;
        self.spawned_at = Some(Instant::now());
        self.pid = Some(pid);
    }

    /// The slot's worker exited. Returns the updated consecutive-failure
    /// count.
    ///
    /// An exit within `failure_window` of the spawn counts as a failure
    /// to stay up, whatever the exit code; a worker that outlived the
    /// window resets the count.
    pub fn record_exit(&mut self, failure_window: Duration) -> u32 {
        let lived = self
            .spawned_at
            .map(|t| t.elapsed())
            .unwrap_or(Duration::ZERO);
        if lived < failure_window {
            self.consecutive_failures += 1;
        } else {
            self.consecutive_failures = 0;
        }
        self.state = SlotState::Exited;
        self.pid = None;
        self.consecutive_failures
    }

    /// The worker was asked to drain.
    pub fn mark_draining(&mut self) {
        self.state = SlotState::Draining;
    }

    /// The worker is gone for good (shutdown teardown).
    pub fn mark_exited(&mut self) {
        self.state = SlotState::Exited;
        self.pid = None;
    }
}
