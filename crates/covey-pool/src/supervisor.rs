// SPDX-FileCopyrightText: 2026 Covey Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! The lifecycle manager: keeps exactly N worker processes alive.
//!
//! On unexpected worker exit the slot is respawned after a short delay.
//! A slot that keeps dying inside the failure window escalates to a
//! process-wide fatal crash-loop error, which protects against spinning
//! forever on a structurally broken database file. On shutdown all
//! workers are drained and given a grace timeout before being
//! force-terminated.

use std::pin::Pin;
use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use covey_config::model::SupervisorConfig;
use covey_core::CoveyError;
use covey_core::types::exit;

use crate::process::{ProcessControl, WorkerProcess};
use crate::slot::{Slot, SlotState};

struct SlotEntry {
    slot: Slot,
    proc: Option<Box<dyn WorkerProcess>>,
}

/// Maintains the fixed-size worker pool.
pub struct Supervisor {
    control: Arc<dyn ProcessControl>,
    config: SupervisorConfig,
    slots: Vec<SlotEntry>,
}

enum Event {
    Cancelled,
    Exited(usize, Result<Option<i32>, CoveyError>),
}

impl Supervisor {
    pub fn new(control: Arc<dyn ProcessControl>, config: SupervisorConfig, workers: usize) -> Self {
        let slots = (0..workers)
            .map(|id| SlotEntry {
                slot: Slot::new(id),
                proc: None,
            })
            .collect();
        Self {
            control,
            config,
            slots,
        }
    }

    /// Number of slots currently holding a live worker process.
    pub fn live_workers(&self) -> usize {
        self.slots.iter().filter(|e| e.proc.is_some()).count()
    }

    /// Per-slot view for logs and tests.
    pub fn snapshot(&self) -> Vec<(usize, SlotState, u32)> {
        self.slots
            .iter()
            .map(|e| (e.slot.id, e.slot.state, e.slot.consecutive_failures))
            .collect()
    }

    /// Run the pool until the token is cancelled or a slot crash-loops.
    ///
    /// Returns `Ok(())` after a graceful drain, or
    /// [`CoveyError::CrashLoop`] when a slot would not stay up.
    pub async fn run(&mut self, cancel: CancellationToken) -> Result<(), CoveyError> {
        for idx in 0..self.slots.len() {
            self.spawn_slot(idx).await?;
        }
        info!(workers = self.slots.len(), "worker pool started");

        loop {
            let mut waits: Vec<
                Pin<Box<dyn Future<Output = (usize, Result<Option<i32>, CoveyError>)> + Send + '_>>,
            > = Vec::new();
            for (idx, entry) in self.slots.iter_mut().enumerate() {
                if let Some(proc) = entry.proc.as_mut() {
                    waits.push(Box::pin(async move { (idx, proc.wait().await) }));
                }
            }

            if waits.is_empty() {
                // Only reachable when cancellation interrupted a respawn
                // delay; fall through to the drain path.
                drop(waits);
                cancel.cancelled().await;
                self.shutdown().await;
                return Ok(());
            }

            let any_exit = futures::future::select_all(waits);
            let event = tokio::select! {
                _ = cancel.cancelled() => Event::Cancelled,
                ((idx, result), _, _) = any_exit => Event::Exited(idx, result),
            };

            match event {
                Event::Cancelled => {
                    self.shutdown().await;
                    return Ok(());
                }
                Event::Exited(idx, result) => {
                    self.handle_exit(idx, result, &cancel).await?;
                }
            }
        }
    }

    async fn spawn_slot(&mut self, idx: usize) -> Result<(), CoveyError> {
        let proc = self.control.spawn(idx).await?;
        let pid = proc.id();
        self.slots[idx].slot.record_spawn(pid);
        self.slots[idx].proc = Some(proc);
        info!(slot = idx, pid, "worker spawned");
        Ok(())
    }

    async fn handle_exit(
        &mut self,
        idx: usize,
        result: Result<Option<i32>, CoveyError>,
        cancel: &CancellationToken,
    ) -> Result<(), CoveyError> {
        let code = match result {
            Ok(code) => code,
            Err(e) => {
                warn!(slot = idx, error = %e, "wait on worker failed");
                None
            }
        };

        self.slots[idx].proc = None;
        let window = Duration::from_secs(self.config.failure_window_secs);
        let failures = self.slots[idx].slot.record_exit(window);

        match code {
            Some(exit::STORAGE) => warn!(
                slot = idx,
                failures, "worker could not open storage; retrying with backoff"
            ),
            Some(0) => info!(slot = idx, "worker exited cleanly; replacing"),
            other => warn!(
                slot = idx,
                code = ?other,
                failures,
                "worker exited unexpectedly"
            ),
        }

        if failures > self.config.max_consecutive_failures {
            error!(
                slot = idx,
                failures,
                max = self.config.max_consecutive_failures,
                "slot will not stay up; giving up"
            );
            self.shutdown().await;
            return Err(CoveyError::CrashLoop {
                slot: idx,
                failures,
            });
        }

        let delay = Duration::from_millis(self.config.respawn_delay_ms);
        tokio::select! {
            _ = cancel.cancelled() => return Ok(()),
            _ = tokio::time::sleep(delay) => {}
        }
        self.spawn_slot(idx).await
    }

    /// Drain all live workers, then force-terminate whatever outlives
    /// the grace timeout.
    async fn shutdown(&mut self) {
        info!("draining worker pool");
        for entry in &mut self.slots {
            if let Some(proc) = entry.proc.as_mut() {
                entry.slot.mark_draining();
                if let Err(e) = proc.drain() {
                    warn!(slot = entry.slot.id, error = %e, "drain signal failed");
                }
            }
        }

        let deadline = Instant::now() + Duration::from_secs(self.config.grace_timeout_secs);
        for entry in &mut self.slots {
            let Some(proc) = entry.proc.as_mut() else {
                continue;
            };
            let remaining = deadline.saturating_duration_since(Instant::now());
            match tokio::time::timeout(remaining, proc.wait()).await {
                Ok(result) => {
                    info!(slot = entry.slot.id, code = ?result.ok().flatten(), "worker drained");
                }
                Err(_) => {
                    warn!(
                        slot = entry.slot.id,
                        "grace timeout expired; force-terminating worker"
                    );
                    if let Err(e) = proc.kill().await {
                        warn!(slot = entry.slot.id, error = %e, "force-terminate failed");
                    }
                }
            }
            entry.slot.mark_exited();
            entry.proc = None;
        }
        info!("worker pool stopped");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tokio::sync::mpsc;

    /// How fake workers behave, standing in for real worker processes.
    #[derive(Clone, Copy)]
    enum Behavior {
        /// Run until told to exit; a drain signal exits cleanly.
        Graceful,
        /// Exit immediately with the given code.
        ExitImmediately(i32),
        /// Ignore the drain signal; only a force-kill ends the worker.
        IgnoreDrain,
    }

    struct FakeControl {
        behavior: Behavior,
        spawned: AtomicUsize,
        drained: Arc<AtomicUsize>,
        killed: Arc<AtomicUsize>,
        exit_txs: Mutex<Vec<mpsc::UnboundedSender<Option<i32>>>>,
    }

    impl FakeControl {
        fn new(behavior: Behavior) -> Arc<Self> {
            Arc::new(Self {
                behavior,
                spawned: AtomicUsize::new(0),
                drained: Arc::new(AtomicUsize::new(0)),
                killed: Arc::new(AtomicUsize::new(0)),
                exit_txs: Mutex::new(Vec::new()),
            })
        }

        fn spawned(&self) -> usize {
            self.spawned.load(Ordering::SeqCst)
        }

        fn drained(&self) -> usize {
            self.drained.load(Ordering::SeqCst)
        }

        fn killed(&self) -> usize {
            self.killed.load(Ordering::SeqCst)
        }

        /// Make the n-th spawned worker exit with `code`.
        fn trigger_exit(&self, n: usize, code: Option<i32>) {
            let txs = self.exit_txs.lock().unwrap();
            txs[n].send(code).unwrap();
        }
    }

    #[async_trait]
    impl ProcessControl for FakeControl {
        async fn spawn(&self, _slot: usize) -> Result<Box<dyn WorkerProcess>, CoveyError> {
            let n = self.spawned.fetch_add(1, Ordering::SeqCst);
            let (tx, rx) = mpsc::unbounded_channel();
            self.exit_txs.lock().unwrap().push(tx.clone());
            Ok(Box::new(FakeWorker {
                id: n as u32 + 1000,
                behavior: self.behavior,
                exit_tx: tx,
                exit_rx: rx,
                drained: self.drained.clone(),
                killed: self.killed.clone(),
            }))
        }
    }

    struct FakeWorker {
        id: u32,
        behavior: Behavior,
        exit_tx: mpsc::UnboundedSender<Option<i32>>,
        exit_rx: mpsc::UnboundedReceiver<Option<i32>>,
        drained: Arc<AtomicUsize>,
        killed: Arc<AtomicUsize>,
    }

    #[async_trait]
    impl WorkerProcess for FakeWorker {
        fn id(&self) -> u32 {
            self.id
        }

        async fn wait(&mut self) -> Result<Option<i32>, CoveyError> {
            if let Behavior::ExitImmediately(code) = self.behavior {
                return Ok(Some(code));
            }
            Ok(self.exit_rx.recv().await.unwrap_or(None))
        }

        fn drain(&mut self) -> Result<(), CoveyError> {
            self.drained.fetch_add(1, Ordering::SeqCst);
            if matches!(self.behavior, Behavior::Graceful) {
                let _ = self.exit_tx.send(Some(0));
            }
            Ok(())
        }

        async fn kill(&mut self) -> Result<(), CoveyError> {
            self.killed.fetch_add(1, Ordering::SeqCst);
            let _ = self.exit_tx.send(None);
            Ok(())
        }
    }

    fn test_config(grace_secs: u64) -> SupervisorConfig {
        SupervisorConfig {
            max_consecutive_failures: 3,
            failure_window_secs: 10,
            respawn_delay_ms: 1,
            grace_timeout_secs: grace_secs,
        }
    }

    async fn wait_until(deadline: Duration, mut cond: impl FnMut() -> bool) {
        tokio::time::timeout(deadline, async {
            while !cond() {
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
        })
        .await
        .expect("condition not reached in time");
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn killed_worker_is_replaced_and_pool_returns_to_n() {
        let control = FakeControl::new(Behavior::Graceful);
        let mut supervisor = Supervisor::new(control.clone(), test_config(5), 3);
        let cancel = CancellationToken::new();

        let task = tokio::spawn({
            let cancel = cancel.clone();
            async move {
                let result = supervisor.run(cancel).await;
                (supervisor, result)
            }
        });

        wait_until(Duration::from_secs(5), || control.spawned() == 3).await;

        // Kill the second worker; exactly one replacement spawns.
        control.trigger_exit(1, Some(1));
        wait_until(Duration::from_secs(5), || control.spawned() == 4).await;

        cancel.cancel();
        let (supervisor, result) = task.await.unwrap();
        result.unwrap();

        // Three live workers were drained at shutdown; the pool was back
        // to full strength when the drain began.
        assert_eq!(control.drained(), 3);
        assert_eq!(supervisor.live_workers(), 0);
        assert!(
            supervisor
                .snapshot()
                .iter()
                .all(|(_, state, _)| *state == SlotState::Exited)
        );
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn crash_looping_slot_escalates_to_fatal() {
        let control = FakeControl::new(Behavior::ExitImmediately(exit::STORAGE));
        let mut supervisor = Supervisor::new(control.clone(), test_config(5), 1);
        let cancel = CancellationToken::new();

        let result = supervisor.run(cancel).await;
        match result {
            Err(CoveyError::CrashLoop { slot, failures }) => {
                assert_eq!(slot, 0);
                assert_eq!(failures, 4);
            }
            other => panic!("expected CrashLoop, got {other:?}"),
        }
        // max 3 tolerated failures: the fourth spawn's exit escalates.
        assert_eq!(control.spawned(), 4);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn shutdown_drains_all_workers() {
        let control = FakeControl::new(Behavior::Graceful);
        let mut supervisor = Supervisor::new(control.clone(), test_config(5), 4);
        let cancel = CancellationToken::new();

        let task = tokio::spawn({
            let cancel = cancel.clone();
            async move { supervisor.run(cancel).await }
        });

        wait_until(Duration::from_secs(5), || control.spawned() == 4).await;
        cancel.cancel();
        task.await.unwrap().unwrap();

        assert_eq!(control.drained(), 4);
        assert_eq!(control.killed(), 0, "graceful workers need no force-kill");
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn stragglers_are_force_killed_after_grace_timeout() {
        let control = FakeControl::new(Behavior::IgnoreDrain);
        // Zero grace: stragglers are force-terminated immediately.
        let mut supervisor = Supervisor::new(control.clone(), test_config(0), 2);
        let cancel = CancellationToken::new();

        let task = tokio::spawn({
            let cancel = cancel.clone();
            async move { supervisor.run(cancel).await }
        });

        wait_until(Duration::from_secs(5), || control.spawned() == 2).await;
        cancel.cancel();
        task.await.unwrap().unwrap();

        assert_eq!(control.drained(), 2);
        assert_eq!(control.killed(), 2);
    }

    #[tokio::test]
    async fn pre_cancelled_token_spawns_then_drains() {
        let control = FakeControl::new(Behavior::Graceful);
        let mut supervisor = Supervisor::new(control.clone(), test_config(5), 2);
        let cancel = CancellationToken::new();
        cancel.cancel();

        supervisor.run(cancel).await.unwrap();
        assert_eq!(control.spawned(), 2);
        assert_eq!(control.drained(), 2);
    }
}
