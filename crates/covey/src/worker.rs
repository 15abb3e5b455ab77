// SPDX-FileCopyrightText: 2026 Covey Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! `covey worker`: one pre-forked worker process.
//!
//! Spawned by the master with the shared listener fd in the
//! environment. The worker moves through
//! Starting -> Ready -> Serving -> Draining -> Stopped: it opens its own
//! storage handle, serves HTTP from the shared socket, and on SIGTERM
//! stops accepting, finishes in-flight transactions, checkpoints, and
//! exits cleanly.

use std::sync::Arc;

use axum::Router;
use tracing::{error, info};

use covey_config::CoveyConfig;
use covey_core::CoveyError;
use covey_core::types::WorkerState;
use covey_gateway::GatewayState;
use covey_pool::{WORKER_SLOT_ENV, install_signal_handler};
use covey_storage::Handle;

use crate::listener;

/// Routes the application layer mounts into every worker.
///
/// The application itself is not part of this repository; until one is
/// mounted here, workers expose only the built-in routes.
fn app_router() -> Router<GatewayState> {
    Router::new()
}

/// Runs the `covey worker` subcommand.
pub async fn run_worker(config: CoveyConfig) -> Result<(), CoveyError> {
    let slot = std::env::var(WORKER_SLOT_ENV)
        .ok()
        .and_then(|s| s.parse::<usize>().ok());

    info!(slot, state = %WorkerState::Starting, "worker starting");

    // A failed open is fatal to this worker; the exit code tells the
    // supervisor it was a storage problem, and the supervisor retries
    // with backoff.
    let handle = Handle::open(&config.storage, &config.serializer)
        .await
        .inspect_err(|e| error!(slot, error = %e, "storage open failed"))?;
    let handle = Arc::new(handle);

    let listener = listener::from_env()?;
    info!(slot, state = %WorkerState::Ready, "storage open, listener adopted");

    let cancel = install_signal_handler();
    let state = GatewayState::new(handle.clone());
    let app = covey_gateway::build_app(state, app_router());

    info!(slot, state = %WorkerState::Serving, "worker serving");
    covey_gateway::serve(listener, app, cancel).await?;

    // serve() returned: the drain is done and no transactions are in
    // flight, so the handle can checkpoint and close.
    info!(slot, state = %WorkerState::Draining, "draining complete, closing storage");
    handle.close().await?;

    info!(slot, state = %WorkerState::Stopped, "worker stopped");
    Ok(())
}
