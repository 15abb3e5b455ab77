// SPDX-FileCopyrightText: 2026 Covey Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! `covey serve`: the master process.
//!
//! Creates the instance directory, binds the shared listening socket,
//! and runs the supervisor until a termination signal drains the pool
//! or a crash loop gives up. The master serves no HTTP itself; the
//! workers accept directly from the shared socket.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use tracing::info;

use covey_config::CoveyConfig;
use covey_core::CoveyError;
use covey_pool::{OsProcessControl, Supervisor, install_signal_handler};

use crate::listener;

/// Runs the `covey serve` command.
pub async fn run_serve(
    config: CoveyConfig,
    config_path: Option<PathBuf>,
) -> Result<(), CoveyError> {
    info!("starting covey master");

    // Workers open the database on startup; the directory must exist
    // before the first one spawns.
    covey_storage::ensure_instance_dir(Path::new(&config.storage.instance_dir))?;

    let std_listener = listener::bind(&config.server.host, config.server.port)?;
    let fd = listener::make_inheritable(&std_listener)?;
    info!(
        host = config.server.host.as_str(),
        port = config.server.port,
        workers = config.server.workers,
        "listener bound"
    );

    let program = std::env::current_exe()
        .map_err(|e| CoveyError::Internal(format!("cannot locate own executable: {e}")))?;
    let control = Arc::new(OsProcessControl::new(program, fd, config_path));
    let mut supervisor = Supervisor::new(control, config.supervisor.clone(), config.server.workers);

    let cancel = install_signal_handler();
    let result = supervisor.run(cancel).await;

    // The master owns the socket; it stays open until the pool is done.
    drop(std_listener);

    result?;
    info!("covey shutdown complete");
    Ok(())
}
