// SPDX-FileCopyrightText: 2026 Covey Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Worker-side HTTP server built on axum.
//!
//! Each worker serves connections the kernel hands it from the shared
//! listening socket. The gateway owns the built-in `/healthz` route and
//! mounts the application router on top; application handlers reach
//! persisted state only through the storage handle in [`GatewayState`].

use std::sync::Arc;
use std::time::Instant;

use axum::{Router, routing::get};
use tokio_util::sync::CancellationToken;
use tracing::info;

use covey_core::CoveyError;
use covey_storage::Handle;

use crate::handlers;

/// Shared state for request handlers.
#[derive(Clone)]
pub struct GatewayState {
    /// This worker's storage handle; the only path to persisted state.
    pub handle: Arc<Handle>,
    /// Worker start time for uptime reporting.
    pub started_at: Instant,
}

impl GatewayState {
    pub fn new(handle: Arc<Handle>) -> Self {
        Self {
            handle,
            started_at: Instant::now(),
        }
    }
}

/// Build the worker's router: built-in routes merged with the
/// application's routes.
///
/// The application router shares [`GatewayState`] so its handlers go
/// through `begin`/`execute`/`commit`/`rollback` on the handle rather
/// than opening the database file themselves.
pub fn build_app(state: GatewayState, app: Router<GatewayState>) -> Router {
    let builtin = Router::new().route("/healthz", get(handlers::get_healthz));
    builtin
        .merge(app)
        .with_state(state)
        .layer(tower_http::trace::TraceLayer::new_for_http())
}

/// Serve connections from the listener until the token is cancelled.
///
/// Cancellation stops accepting new connections and lets in-flight
/// requests (and their transactions) finish before returning.
pub async fn serve(
    listener: tokio::net::TcpListener,
    app: Router,
    cancel: CancellationToken,
) -> Result<(), CoveyError> {
    if let Ok(addr) = listener.local_addr() {
        info!(%addr, "worker accepting connections");
    }

    axum::serve(listener, app)
        .with_graceful_shutdown(cancel.cancelled_owned())
        .await
        .map_err(|e| CoveyError::Internal(format!("worker server error: {e}")))
}
