// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Startup, run, shutdown: wire the definition, runner, and store into a
//! scheduler and see it through to an exit code.

use crate::contact::ContactFile;
use cad_core::SystemClock;
use cad_engine::{EngineError, Scheduler, SchedulerClient, SchedulerExit, SchedulerPaths};
use cad_platforms::BackgroundRunner;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::{info, warn};

/// Lifecycle errors
#[derive(Debug, Error)]
pub enum LifecycleError {
    #[error("scheduler already running for this workflow (contact file locked)")]
    AlreadyRunning(#[source] std::io::Error),

    #[error("config error: {0}")]
    Config(#[from] cad_config::ConfigError),

    #[error("engine error: {0}")]
    Engine(#[from] EngineError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// How the run ended, with the scheduler's exit detail.
#[derive(Debug)]
pub struct RunOutcome {
    pub exit: SchedulerExit,
}

/// Map a run result to the process exit code: 0 clean, 1 internal
/// error, 2 stall abort, 3 inactivity abort.
pub fn exit_code(result: &Result<RunOutcome, LifecycleError>) -> i32 {
    match result {
        Ok(outcome) => match outcome.exit {
            SchedulerExit::Completed | SchedulerExit::Stopped(_) => 0,
            SchedulerExit::Stalled => 2,
            SchedulerExit::InactivityTimeout => 3,
        },
        Err(_) => 1,
    }
}

/// Load a workflow definition and run it to completion in `run_dir`.
///
/// Writes the contact file for the duration of the run; recovery from a
/// prior run's store is automatic.
pub async fn run_workflow(
    config_path: &Path,
    run_dir: PathBuf,
) -> Result<RunOutcome, LifecycleError> {
    let config = cad_config::load(config_path)?;
    let uuid = uuid::Uuid::new_v4().to_string();

    if let Some(stale) = ContactFile::read(&run_dir) {
        warn!(pid = stale.pid, uuid = %stale.uuid, "stale contact file found, replacing");
    }

    let contact = ContactFile::new(uuid.clone());
    let _contact_guard = contact
        .write(&run_dir)
        .map_err(LifecycleError::AlreadyRunning)?;

    info!(
        workflow = %config.name,
        run_dir = %run_dir.display(),
        uuid = %uuid,
        "starting workflow"
    );

    let paths = SchedulerPaths {
        run_dir,
        config_path: Some(config_path.to_path_buf()),
        uuid: Some(uuid),
    };

    let (scheduler, client) =
        Scheduler::new(config, BackgroundRunner::new(), SystemClock, paths)?;
    spawn_signal_handler(client);

    let exit = scheduler.run().await?;
    Ok(RunOutcome { exit })
}

/// SIGINT/SIGTERM request a clean stop; running jobs are left alone
/// (`stop --kill` is the explicit alternative).
fn spawn_signal_handler(client: SchedulerClient) {
    tokio::spawn(async move {
        use tokio::signal::unix::{signal, SignalKind};
        let mut sigint = match signal(SignalKind::interrupt()) {
            Ok(s) => s,
            Err(_) => return,
        };
        let mut sigterm = match signal(SignalKind::terminate()) {
            Ok(s) => s,
            Err(_) => return,
        };
        tokio::select! {
            _ = sigint.recv() => {}
            _ = sigterm.recv() => {}
        }
        info!("stop signal received");
        let _ = client
            .command_detached(cad_core::Command::Stop {
                mode: cad_core::StopMode::Request,
            })
            .await;
    });
}

#[cfg(test)]
#[path = "lifecycle_tests.rs"]
mod tests;
