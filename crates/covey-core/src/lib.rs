// SPDX-FileCopyrightText: 2026 Covey Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Core library for the covey server.
//!
//! This crate provides the error taxonomy, shared types, and trait seams
//! used throughout the covey workspace: a pre-fork pool of worker
//! processes persisting through a single shared embedded database.

pub mod error;
pub mod traits;
pub mod types;

// Re-export key items at crate root for ergonomic imports.
pub use error::CoveyError;
pub use traits::{WriteGuard, WriteSerializer};
pub use types::{HealthStatus, WorkerState};
