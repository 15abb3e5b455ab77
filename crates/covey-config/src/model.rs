// SPDX-FileCopyrightText: 2026 Covey Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Configuration model structs for the covey server.
//!
//! All structs use `#[serde(deny_unknown_fields)]` to reject unrecognized
//! config keys at startup, providing actionable error messages.

use serde::{Deserialize, Serialize};

/// Top-level covey configuration.
///
/// Loaded from `covey.toml` with environment variable overrides.
/// All sections are optional and default to sensible values.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct CoveyConfig {
    /// Listener and worker-pool settings.
    #[serde(default)]
    pub server: ServerConfig,

    /// Database file and instance directory settings.
    #[serde(default)]
    pub storage: StorageConfig,

    /// Cross-process write lock settings.
    #[serde(default)]
    pub serializer: SerializerConfig,

    /// Worker supervision and restart policy.
    #[serde(default)]
    pub supervisor: SupervisorConfig,

    /// Logging settings.
    #[serde(default)]
    pub log: LogConfig,
}

/// Listener and worker-pool configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct ServerConfig {
    /// Address to bind the shared listening socket to.
    #[serde(default = "default_host")]
    pub host: String,

    /// Port to bind.
    #[serde(default = "default_port")]
    pub port: u16,

    /// Number of worker processes in the pool.
    #[serde(default = "default_workers")]
    pub workers: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            workers: default_workers(),
        }
    }
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    5000
}

fn default_workers() -> usize {
    4
}

/// Database file and instance directory configuration.
///
/// The instance directory holds the database file and the write-lock
/// file; it is created at startup if absent.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct StorageConfig {
    /// Directory holding the database and lock files.
    #[serde(default = "default_instance_dir")]
    pub instance_dir: String,

    /// Database file name inside the instance directory.
    #[serde(default = "default_database_file")]
    pub database_file: String,

    /// SQLite busy timeout in milliseconds, applied per connection.
    #[serde(default = "default_busy_timeout_ms")]
    pub busy_timeout_ms: u64,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            instance_dir: default_instance_dir(),
            database_file: default_database_file(),
            busy_timeout_ms: default_busy_timeout_ms(),
        }
    }
}

impl StorageConfig {
    /// Full path to the database file.
    pub fn database_path(&self) -> std::path::PathBuf {
        std::path::Path::new(&self.instance_dir).join(&self.database_file)
    }
}

fn default_instance_dir() -> String {
    "instance".to_string()
}

fn default_database_file() -> String {
    "covey.db".to_string()
}

fn default_busy_timeout_ms() -> u64 {
    5000
}

/// Cross-process write lock configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct SerializerConfig {
    /// Lock file name inside the instance directory.
    #[serde(default = "default_lock_file")]
    pub lock_file: String,

    /// Deadline for acquiring the write lock, in milliseconds.
    /// Acquisition past this deadline fails with a write timeout.
    #[serde(default = "default_write_timeout_ms")]
    pub write_timeout_ms: u64,

    /// Initial delay between lock acquisition attempts, in milliseconds.
    #[serde(default = "default_backoff_initial_ms")]
    pub backoff_initial_ms: u64,

    /// Maximum delay between lock acquisition attempts, in milliseconds.
    /// The delay doubles on each failed attempt up to this cap.
    #[serde(default = "default_backoff_max_ms")]
    pub backoff_max_ms: u64,
}

impl Default for SerializerConfig {
    fn default() -> Self {
        Self {
            lock_file: default_lock_file(),
            write_timeout_ms: default_write_timeout_ms(),
            backoff_initial_ms: default_backoff_initial_ms(),
            backoff_max_ms: default_backoff_max_ms(),
        }
    }
}

impl SerializerConfig {
    /// Full path to the lock file.
    pub fn lock_path(&self, instance_dir: &str) -> std::path::PathBuf {
        std::path::Path::new(instance_dir).join(&self.lock_file)
    }
}

fn default_lock_file() -> String {
    "covey.write.lock".to_string()
}

fn default_write_timeout_ms() -> u64 {
    5000
}

fn default_backoff_initial_ms() -> u64 {
    5
}

fn default_backoff_max_ms() -> u64 {
    100
}

/// Worker supervision and restart policy.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct SupervisorConfig {
    /// Consecutive failures before a slot escalates to a fatal crash loop.
    #[serde(default = "default_max_consecutive_failures")]
    pub max_consecutive_failures: u32,

    /// A worker exit within this many seconds of its spawn counts as a
    /// consecutive failure; surviving longer resets the count.
    #[serde(default = "default_failure_window_secs")]
    pub failure_window_secs: u64,

    /// Delay before respawning an exited worker, in milliseconds.
    #[serde(default = "default_respawn_delay_ms")]
    pub respawn_delay_ms: u64,

    /// How long a draining worker may run before being force-terminated,
    /// in seconds.
    #[serde(default = "default_grace_timeout_secs")]
    pub grace_timeout_secs: u64,
}

impl Default for SupervisorConfig {
    fn default() -> Self {
        Self {
            max_consecutive_failures: default_max_consecutive_failures(),
            failure_window_secs: default_failure_window_secs(),
            respawn_delay_ms: default_respawn_delay_ms(),
            grace_timeout_secs: default_grace_timeout_secs(),
        }
    }
}

fn default_max_consecutive_failures() -> u32 {
    5
}

fn default_failure_window_secs() -> u64 {
    10
}

fn default_respawn_delay_ms() -> u64 {
    200
}

fn default_grace_timeout_secs() -> u64 {
    30
}

/// Logging configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct LogConfig {
    /// Logging level (trace, debug, info, warn, error).
    #[serde(default = "default_log_level")]
    pub level: String,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

fn default_log_level() -> String {
    "info".to_string()
}
