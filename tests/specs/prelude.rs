//! Test helpers for behavioral specifications.

#![allow(clippy::unwrap_used, clippy::expect_used, clippy::panic, dead_code)]

use cad_core::{Command, CommandError, CommandOutcome, FakeClock};
use cad_engine::{Scheduler, SchedulerClient, SchedulerExit, SchedulerPaths};
use cad_platforms::FakeRunner;
use std::time::Duration;

/// A workflow under test: a real scheduler over a temp run directory,
/// driven tick by tick.
pub struct Workflow {
    pub scheduler: Scheduler<FakeRunner, FakeClock>,
    pub client: SchedulerClient,
    pub runner: FakeRunner,
    pub clock: FakeClock,
    pub dir: tempfile::TempDir,
}

pub fn start(definition: &str) -> Workflow {
    start_in(definition, tempfile::tempdir().unwrap())
}

/// Start (or restart) a workflow over an existing run directory.
pub fn start_in(definition: &str, dir: tempfile::TempDir) -> Workflow {
    let config = cad_config::load_str(definition).unwrap();
    let runner = FakeRunner::new();
    let clock = FakeClock::at_epoch_ms(1_500_000_000_000);
    let paths = SchedulerPaths {
        run_dir: dir.path().to_path_buf(),
        config_path: None,
        uuid: Some("spec-uuid".to_string()),
    };
    let (scheduler, client) =
        Scheduler::new(config, runner.clone(), clock.clone(), paths).unwrap();
    Workflow {
        scheduler,
        client,
        runner,
        clock,
        dir,
    }
}

impl Workflow {
    /// One scheduling round: tick, let worker tasks run, ingest their
    /// events, then advance the fake clock past the 1-second poll and
    /// retry intervals the spec definitions use.
    pub async fn round(&mut self) {
        self.scheduler.tick().await.unwrap();
        tokio::time::sleep(Duration::from_millis(5)).await;
        self.scheduler.tick().await.unwrap();
        self.clock.advance(Duration::from_secs(2));
    }

    /// Drive rounds until the scheduler exits or the budget runs out.
    pub async fn drive(&mut self, rounds: usize) {
        for _ in 0..rounds {
            if self.scheduler.exit_state().is_some() {
                return;
            }
            self.round().await;
        }
    }

    pub async fn drive_to_exit(&mut self, rounds: usize) -> SchedulerExit {
        self.drive(rounds).await;
        self.scheduler
            .exit_state()
            .cloned()
            .expect("scheduler did not exit within the round budget")
    }

    /// Send a command through the queue and drive the loop until it is
    /// acknowledged.
    pub async fn command(&mut self, command: Command) -> Result<CommandOutcome, CommandError> {
        let client = self.client.clone();
        let handle = tokio::spawn(async move { client.command(command).await });
        for _ in 0..10 {
            self.scheduler.tick().await.unwrap();
            tokio::time::sleep(Duration::from_millis(2)).await;
            if handle.is_finished() {
                break;
            }
        }
        handle.await.unwrap()
    }

    pub fn task_state(&self, cycle: &str, name: &str) -> Option<String> {
        self.scheduler
            .store()
            .load_task_states()
            .unwrap()
            .into_iter()
            .find(|r| r.cycle == cycle && r.name == name)
            .map(|r| r.status)
    }

    pub fn task_pool_rows(&self) -> Vec<cad_store::TaskPoolRow> {
        self.scheduler.store().load_task_pool().unwrap()
    }

    pub fn param(&self, key: &str) -> Option<String> {
        self.scheduler.store().param(key).unwrap()
    }
}

/// The common polling platform block used across scenario definitions.
pub const FAST_PLATFORM: &str = r#"
    [platforms.localhost]
    submission_polling_intervals = ["PT1S"]
    execution_polling_intervals = ["PT1S"]
"#;
