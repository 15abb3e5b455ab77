// SPDX-FileCopyrightText: 2026 Covey Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Configuration loader using Figment for layered config merging.
//!
//! Merge order: compiled defaults, `/etc/covey/covey.toml`, `./covey.toml`,
//! then `COVEY_*` environment variable overrides.

#![allow(clippy::result_large_err)] // figment::Error is external and cannot be boxed without wrapper

use std::path::Path;

use figment::{
    Figment,
    providers::{Env, Format, Serialized, Toml},
};

use crate::model::CoveyConfig;

/// Load configuration from the standard hierarchy with env var overrides.
///
/// Merge order (later overrides earlier):
/// 1. Compiled defaults
/// 2. `/etc/covey/covey.toml` (system-wide)
/// 3. `./covey.toml` (working directory)
/// 4. `COVEY_*` environment variables
pub fn load_config() -> Result<CoveyConfig, figment::Error> {
    Figment::new()
        .merge(Serialized::defaults(CoveyConfig::default()))
        .merge(Toml::file("/etc/covey/covey.toml"))
        .merge(Toml::file("covey.toml"))
        .merge(env_provider())
        .extract()
}

/// Load configuration from a TOML string only (no file lookup).
///
/// Used for testing and explicit config specification.
pub fn load_config_from_str(toml_content: &str) -> Result<CoveyConfig, figment::Error> {
    Figment::new()
        .merge(Serialized::defaults(CoveyConfig::default()))
        .merge(Toml::string(toml_content))
        .extract()
}

/// Load configuration from a specific file path with env var overrides.
pub fn load_config_from_path(path: &Path) -> Result<CoveyConfig, figment::Error> {
    Figment::new()
        .merge(Serialized::defaults(CoveyConfig::default()))
        .merge(Toml::file(path))
        .merge(env_provider())
        .extract()
}

/// Create the environment variable provider using explicit `map()` for
/// section-to-dot mapping.
///
/// Uses `Env::map()` NOT `Env::split("_")` to avoid ambiguity with
/// underscore-containing key names: `COVEY_SERIALIZER_WRITE_TIMEOUT_MS`
/// must map to `serializer.write_timeout_ms`, not `serializer.write.timeout.ms`.
///
/// `COVEY_LISTEN_FD` and `COVEY_WORKER_SLOT` are process-plumbing
/// variables the master passes to workers, not configuration; they are
/// filtered out so `deny_unknown_fields` does not reject them.
fn env_provider() -> Env {
    Env::prefixed("COVEY_").ignore(&["listen_fd", "worker_slot"]).map(|key| {
        // `key` is the lowercased env var name with prefix stripped.
        // Example: COVEY_SERVER_PORT -> "server_port"
        let key_str = key.as_str();
        let mapped = key_str
            .replacen("server_", "server.", 1)
            .replacen("storage_", "storage.", 1)
            .replacen("serializer_", "serializer.", 1)
            .replacen("supervisor_", "supervisor.", 1)
            .replacen("log_", "log.", 1);
        mapped.into()
    })
}
