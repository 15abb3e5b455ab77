// SPDX-FileCopyrightText: 2026 Covey Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Trait seams between covey crates.
//!
//! Traits live here so implementations can be swapped without touching
//! callers: the write serializer behind the storage handle may be an
//! advisory file lock, an in-process mutex, or a database-native
//! primitive.

pub mod serializer;

pub use serializer::{WriteGuard, WriteSerializer};
