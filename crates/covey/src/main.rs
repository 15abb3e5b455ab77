// SPDX-FileCopyrightText: 2026 Covey Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! covey - a pre-fork application server over a single-file embedded database.
//!
//! This is the binary entry point for both the master process (`serve`)
//! and the worker processes it spawns (`worker`, hidden).

#[cfg(not(target_env = "msvc"))]
use tikv_jemallocator::Jemalloc;

#[cfg(not(target_env = "msvc"))]
#[global_allocator]
static GLOBAL: Jemalloc = Jemalloc;

use std::path::{Path, PathBuf};

use clap::{Parser, Subcommand};

use covey_config::{ConfigError, CoveyConfig};
use covey_core::CoveyError;
use covey_core::types::exit;

mod check;
mod listener;
mod serve;
mod worker;

/// covey - a pre-fork application server over a single-file embedded database.
#[derive(Parser, Debug)]
#[command(name = "covey", version, about, long_about = None)]
struct Cli {
    /// Path to an explicit config file (overrides the covey.toml hierarchy).
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Option<Commands>,
}

/// Available subcommands.
#[derive(Subcommand, Debug)]
enum Commands {
    /// Start the master: bind the listener and run the worker pool.
    Serve,
    /// Run one worker process (spawned by `serve`).
    #[command(hide = true)]
    Worker,
    /// Validate configuration and probe the instance database.
    Check,
}

fn load(path: Option<&Path>) -> Result<CoveyConfig, Vec<ConfigError>> {
    match path {
        Some(p) => covey_config::load_and_validate_path(p),
        None => covey_config::load_and_validate(),
    }
}

/// Initializes the tracing subscriber with the configured log level.
fn init_tracing(log_level: &str) {
    use tracing_subscriber::EnvFilter;

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        EnvFilter::new(format!(
            "warn,covey={log_level},covey_storage={log_level},covey_pool={log_level},covey_gateway={log_level}"
        ))
    });

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_thread_names(false)
        .init();
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    let config = match load(cli.config.as_deref()) {
        Ok(config) => config,
        Err(errors) => {
            covey_config::render_errors(&errors);
            std::process::exit(exit::CONFIG);
        }
    };

    init_tracing(&config.log.level);

    let result = match cli.command {
        Some(Commands::Serve) => serve::run_serve(config, cli.config.clone()).await,
        Some(Commands::Worker) => worker::run_worker(config).await,
        Some(Commands::Check) => check::run_check(config).await,
        None => {
            println!("covey: use --help for available commands");
            Ok(())
        }
    };

    if let Err(e) = result {
        tracing::error!(error = %e, "fatal");
        let code = match e {
            CoveyError::CrashLoop { .. } => exit::CRASH_LOOP,
            CoveyError::StorageUnavailable { .. } => exit::STORAGE,
            CoveyError::Config(_) => exit::CONFIG,
            _ => 1,
        };
        std::process::exit(code);
    }
}
