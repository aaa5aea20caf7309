// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Cadence scheduler daemon (cadd)
//!
//! Runs one workflow: loads the definition, recovers prior state from
//! the run directory's store, and drives the scheduling loop until the
//! workflow completes, stops, or aborts.

// Allow panic!/unwrap/expect in test code
#![cfg_attr(test, allow(clippy::panic))]
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

use cad_daemon::{exit_code, run_workflow, LifecycleError};
use std::path::PathBuf;
use tracing::{error, info};

#[tokio::main]
async fn main() {
    let mut args = std::env::args().skip(1);
    let first = args.next();

    match first.as_deref() {
        Some("--version") | Some("-V") | Some("-v") => {
            println!("cadd {}", env!("CARGO_PKG_VERSION"));
            return;
        }
        Some("--help") | Some("-h") | None => {
            println!("cadd {}", env!("CARGO_PKG_VERSION"));
            println!("Cadence scheduler daemon - runs one cycling workflow to completion");
            println!();
            println!("USAGE:");
            println!("    cadd <definition.toml> [run-dir]");
            println!();
            println!("The run directory defaults to the definition's parent directory.");
            println!("State persists in <run-dir>/log/db; restarting resumes the run.");
            if first.is_none() {
                std::process::exit(2);
            }
            return;
        }
        _ => {}
    }

    let config_path = PathBuf::from(first.unwrap_or_default());
    let run_dir = args
        .next()
        .map(PathBuf::from)
        .or_else(|| config_path.parent().map(PathBuf::from))
        .unwrap_or_else(|| PathBuf::from("."));

    let _log_guard = match setup_logging(&run_dir) {
        Ok(guard) => Some(guard),
        Err(e) => {
            eprintln!("warning: file logging unavailable: {e}");
            None
        }
    };

    info!(definition = %config_path.display(), "cadd starting");

    let result = run_workflow(&config_path, run_dir).await;
    match &result {
        Ok(outcome) => info!(exit = ?outcome.exit, "workflow finished"),
        Err(LifecycleError::AlreadyRunning(_)) => {
            eprintln!("cadd: a scheduler is already running for this workflow");
        }
        Err(e) => error!(error = %e, "workflow failed"),
    }
    std::process::exit(exit_code(&result));
}

fn setup_logging(
    run_dir: &std::path::Path,
) -> Result<tracing_appender::non_blocking::WorkerGuard, std::io::Error> {
    use tracing_subscriber::{fmt, prelude::*, EnvFilter};

    let log_dir = run_dir.join("log").join("scheduler");
    std::fs::create_dir_all(&log_dir)?;

    let file_appender = tracing_appender::rolling::never(&log_dir, "log");
    let (non_blocking, guard) = tracing_appender::non_blocking(file_appender);

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_writer(non_blocking))
        .init();

    Ok(guard)
}
