// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Local background runner: jobs are detached shell processes on the
//! scheduler host, with lifecycle markers written under the job dir.

use crate::runner::{JobContext, JobRef, JobRunner, PollResult, RunnerError, SubmitOutcome};
use async_trait::async_trait;
use cad_core::PollState;
use std::path::Path;
use std::process::Stdio;
use tracing::{debug, warn};

const STARTED_MARKER: &str = "job.started";
const STATUS_FILE: &str = "job.status";
const OUT_FILE: &str = "job.out";
const ERR_FILE: &str = "job.err";

/// Runs jobs as detached local processes.
///
/// The wrapper script writes `job.started` when execution begins and the
/// exit code to `job.status` when it ends, so poll needs only the job
/// directory and pid.
#[derive(Clone, Default)]
pub struct BackgroundRunner;

impl BackgroundRunner {
    pub fn new() -> Self {
        Self
    }

    fn wrapper(script: &str, job_dir: &Path) -> String {
        // The trap mirrors batch-system behaviour: a signalled job still
        // records a non-zero status rather than vanishing silently.
        format!(
            "cd {dir} || exit 99\n\
             touch {started}\n\
             trap 'echo 143 > {status}; exit 143' TERM XCPU 2>/dev/null || trap 'echo 143 > {status}; exit 143' TERM\n\
             ( {script} ) > {out} 2> {err}\n\
             echo $? > {status}\n",
            dir = shell_quote(&job_dir.display().to_string()),
            started = STARTED_MARKER,
            status = STATUS_FILE,
            out = OUT_FILE,
            err = ERR_FILE,
            script = script,
        )
    }
}

fn shell_quote(s: &str) -> String {
    format!("'{}'", s.replace('\'', "'\\''"))
}

fn pid_alive(pid: u32) -> bool {
    Path::new(&format!("/proc/{pid}")).exists()
}

#[async_trait]
impl JobRunner for BackgroundRunner {
    async fn submit(&self, ctx: JobContext) -> Result<SubmitOutcome, RunnerError> {
        if let Err(e) = tokio::fs::create_dir_all(&ctx.job_dir).await {
            return Ok(SubmitOutcome::Failed {
                error: format!("cannot create job dir: {e}"),
            });
        }

        let wrapper = Self::wrapper(&ctx.script, &ctx.job_dir);
        let mut cmd = tokio::process::Command::new("sh");
        cmd.arg("-c")
            .arg(&wrapper)
            .current_dir(&ctx.job_dir)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .kill_on_drop(false);
        for (key, value) in &ctx.environment {
            cmd.env(key, value);
        }

        let child = match cmd.spawn() {
            Ok(child) => child,
            Err(e) => {
                return Ok(SubmitOutcome::Failed {
                    error: format!("spawn failed: {e}"),
                })
            }
        };

        match child.id() {
            Some(pid) => {
                debug!(task = %ctx.task_id(), submit_num = ctx.submit_num, pid, "job spawned");
                Ok(SubmitOutcome::Submitted {
                    job_id: pid.to_string(),
                })
            }
            None => Ok(SubmitOutcome::Failed {
                error: "process exited before a pid was available".to_string(),
            }),
        }
    }

    async fn poll(&self, jobs: &[JobRef]) -> Result<Vec<PollResult>, RunnerError> {
        let mut results = Vec::with_capacity(jobs.len());
        for job in jobs {
            let status_path = job.job_dir.join(STATUS_FILE);
            let state = match tokio::fs::read_to_string(&status_path).await {
                Ok(text) => match text.trim().parse::<i32>() {
                    Ok(0) => PollState::Succeeded,
                    Ok(code) => PollState::Failed {
                        exit_status: Some(code),
                    },
                    Err(_) => {
                        warn!(path = %status_path.display(), "unreadable job status file");
                        PollState::Failed { exit_status: None }
                    }
                },
                Err(_) => {
                    let pid = job.job_id.parse::<u32>().ok();
                    let alive = pid.map(pid_alive).unwrap_or(false);
                    let started = job.job_dir.join(STARTED_MARKER).exists();
                    match (alive, started) {
                        (true, true) => PollState::Running,
                        (true, false) => PollState::Submitted,
                        // No process, no exit status: the job is lost.
                        (false, _) => PollState::Gone,
                    }
                }
            };
            results.push(PollResult {
                job: job.clone(),
                state,
            });
        }
        Ok(results)
    }

    async fn kill(&self, job: &JobRef) -> Result<(), RunnerError> {
        let status = tokio::process::Command::new("kill")
            .arg("-TERM")
            .arg(&job.job_id)
            .status()
            .await?;
        if !status.success() {
            return Err(RunnerError::NotFound(job.job_id.clone()));
        }
        Ok(())
    }

    fn name(&self) -> &'static str {
        "background"
    }
}

#[cfg(test)]
#[path = "background_tests.rs"]
mod tests;
