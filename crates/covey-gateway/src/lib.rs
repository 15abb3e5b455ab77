// SPDX-FileCopyrightText: 2026 Covey Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! HTTP listener glue for covey workers.
//!
//! The master process binds one listening socket; each worker serves
//! connections from it through this crate: built-in health route, an
//! application router mount point, and graceful drain wired to a
//! cancellation token.

pub mod handlers;
pub mod server;

pub use handlers::error_status;
pub use server::{GatewayState, build_app, serve};
