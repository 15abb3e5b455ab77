// SPDX-FileCopyrightText: 2026 Covey Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! `covey check`: validate configuration and probe the instance database.
//!
//! Exercises the same startup path a worker takes -- instance directory,
//! storage open, health probe, and one throwaway write transaction -- so
//! a container health check or an operator can verify the deployment
//! before traffic arrives.

use std::path::Path;

use covey_config::CoveyConfig;
use covey_core::{CoveyError, HealthStatus};
use covey_storage::Handle;

/// Runs the `covey check` command.
pub async fn run_check(config: CoveyConfig) -> Result<(), CoveyError> {
    println!("covey check");
    println!(
        "  server     {}:{} ({} workers)",
        config.server.host, config.server.port, config.server.workers
    );
    println!("  instance   {}", config.storage.instance_dir);

    covey_storage::ensure_instance_dir(Path::new(&config.storage.instance_dir))?;
    println!("  directory  ok");

    let handle = Handle::open(&config.storage, &config.serializer).await?;
    match handle.health_check().await {
        HealthStatus::Healthy => {
            println!(
                "  database   ok ({})",
                config.storage.database_path().display()
            );
        }
        HealthStatus::Degraded(detail) => {
            println!("  database   degraded: {detail}");
        }
        HealthStatus::Unhealthy(detail) => {
            println!("  database   unhealthy: {detail}");
            return Err(CoveyError::Internal(format!(
                "database probe failed: {detail}"
            )));
        }
    }

    // Exercise the full write path -- gate, cross-process lock, BEGIN
    // IMMEDIATE -- without leaving anything behind.
    let mut tx = handle.begin().await?;
    tx.execute(|c| {
        c.execute_batch(
            "CREATE TEMP TABLE covey_check_probe (v INTEGER);
             INSERT INTO covey_check_probe (v) VALUES (1);",
        )
    })
    .await?;
    tx.rollback().await?;
    println!("  write path ok (lock acquired and released)");

    handle.close().await?;
    println!("ok");
    Ok(())
}
