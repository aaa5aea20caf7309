// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! The runner contract shared by all platform adapters.

use async_trait::async_trait;
use cad_core::PollState;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

/// Errors from runner operations.
#[derive(Debug, Error)]
pub enum RunnerError {
    #[error("spawn failed: {0}")]
    SpawnFailed(String),
    #[error("job not found: {0}")]
    NotFound(String),
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

/// Everything a runner needs to submit one job attempt.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobContext {
    pub point: String,
    pub name: String,
    pub submit_num: u32,
    pub platform: String,
    /// The prepared job script (opaque to the scheduler core).
    pub script: String,
    /// Environment, broadcast overrides already merged in.
    pub environment: Vec<(String, String)>,
    /// Per-job directory: `log/job/<point>/<name>/<NN>/`.
    pub job_dir: PathBuf,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub execution_time_limit: Option<Duration>,
}

impl JobContext {
    pub fn task_id(&self) -> String {
        format!("{}/{}", self.point, self.name)
    }
}

/// Reference to a submitted job, sufficient for poll and kill.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobRef {
    pub point: String,
    pub name: String,
    pub submit_num: u32,
    pub job_id: String,
    pub job_dir: PathBuf,
}

/// Result of a submission attempt.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum SubmitOutcome {
    Submitted { job_id: String },
    Failed { error: String },
}

/// One job's polled state.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PollResult {
    pub job: JobRef,
    pub state: PollState,
}

/// Adapter for a job platform (local shell, SSH host, batch system).
#[async_trait]
pub trait JobRunner: Clone + Send + Sync + 'static {
    /// Submit a job; returns the platform-native id or a submission error.
    ///
    /// A submission error here is distinct from an execution failure: it
    /// maps to `submit-failed`, never `failed`.
    async fn submit(&self, ctx: JobContext) -> Result<SubmitOutcome, RunnerError>;

    /// Poll the platform for current job states. Poll results are
    /// authoritative over job messages.
    async fn poll(&self, jobs: &[JobRef]) -> Result<Vec<PollResult>, RunnerError>;

    /// Best-effort kill.
    async fn kill(&self, job: &JobRef) -> Result<(), RunnerError>;

    /// Whether jobs on this platform may vacate (clear their status and
    /// exit non-fatally, to resume later).
    fn supports_vacation(&self) -> bool {
        false
    }

    /// Runner implementation name, recorded in `task_jobs.job_runner_name`.
    fn name(&self) -> &'static str;
}
