// SPDX-FileCopyrightText: 2026 Covey Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Post-deserialization validation for configuration values.
//!
//! Validates semantic constraints that cannot be expressed via serde
//! attributes, such as a valid bind address, a non-empty instance
//! directory, and coherent backoff bounds.

use crate::diagnostic::ConfigError;
use crate::model::CoveyConfig;

/// Validate a deserialized configuration for semantic correctness.
///
/// Returns `Ok(())` if all validations pass, or `Err(Vec<ConfigError>)` with
/// all collected validation errors (does not fail fast).
pub fn validate_config(config: &CoveyConfig) -> Result<(), Vec<ConfigError>> {
    let mut errors = Vec::new();

    // Validate host is not empty and parses as an IP or hostname
    let host = config.server.host.trim();
    if host.is_empty() {
        errors.push(ConfigError::Validation {
            message: "server.host must not be empty".to_string(),
        });
    } else {
        let is_valid_ip = host.parse::<std::net::IpAddr>().is_ok();
        let is_valid_hostname = host
            .chars()
            .all(|c| c.is_alphanumeric() || c == '.' || c == '-' || c == ':');
        if !is_valid_ip && !is_valid_hostname {
            errors.push(ConfigError::Validation {
                message: format!("server.host `{host}` is not a valid IP address or hostname"),
            });
        }
    }

    // The pool must hold at least one worker
    if config.server.workers == 0 {
        errors.push(ConfigError::Validation {
            message: "server.workers must be at least 1".to_string(),
        });
    }

    // Validate instance_dir and file names are not empty
    if config.storage.instance_dir.trim().is_empty() {
        errors.push(ConfigError::Validation {
            message: "storage.instance_dir must not be empty".to_string(),
        });
    }
    if config.storage.database_file.trim().is_empty() {
        errors.push(ConfigError::Validation {
            message: "storage.database_file must not be empty".to_string(),
        });
    }
    if config.serializer.lock_file.trim().is_empty() {
        errors.push(ConfigError::Validation {
            message: "serializer.lock_file must not be empty".to_string(),
        });
    }

    // The lock file and the database file must not collide
    if config.serializer.lock_file == config.storage.database_file {
        errors.push(ConfigError::Validation {
            message: format!(
                "serializer.lock_file `{}` must differ from storage.database_file",
                config.serializer.lock_file
            ),
        });
    }

    // A zero write timeout would make every write fail immediately
    if config.serializer.write_timeout_ms == 0 {
        errors.push(ConfigError::Validation {
            message: "serializer.write_timeout_ms must be greater than 0".to_string(),
        });
    }

    // Backoff bounds must be coherent
    if config.serializer.backoff_initial_ms == 0 {
        errors.push(ConfigError::Validation {
            message: "serializer.backoff_initial_ms must be greater than 0".to_string(),
        });
    }
    if config.serializer.backoff_initial_ms > config.serializer.backoff_max_ms {
        errors.push(ConfigError::Validation {
            message: format!(
                "serializer.backoff_initial_ms ({}) must not exceed serializer.backoff_max_ms ({})",
                config.serializer.backoff_initial_ms, config.serializer.backoff_max_ms
            ),
        });
    }

    // Crash-loop escalation needs at least one tolerated failure
    if config.supervisor.max_consecutive_failures == 0 {
        errors.push(ConfigError::Validation {
            message: "supervisor.max_consecutive_failures must be at least 1".to_string(),
        });
    }

    // Validate log level is one of the known levels
    let level = config.log.level.to_ascii_lowercase();
    if !matches!(
        level.as_str(),
        "trace" | "debug" | "info" | "warn" | "error"
    ) {
        errors.push(ConfigError::Validation {
            message: format!(
                "log.level `{}` is not one of trace, debug, info, warn, error",
                config.log.level
            ),
        });
    }

    if errors.is_empty() { Ok(()) } else { Err(errors) }
}
