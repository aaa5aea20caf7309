// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Scripted in-memory runner for tests.

use crate::runner::{JobContext, JobRef, JobRunner, PollResult, RunnerError, SubmitOutcome};
use async_trait::async_trait;
use cad_core::PollState;
use parking_lot::Mutex;
use std::collections::{HashMap, VecDeque};
use std::sync::Arc;

/// Scripted behaviour for one job attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum JobPlan {
    /// Submit succeeds; the job completes successfully.
    Succeed,
    /// Submit succeeds; the job runs for `polls` polls, then succeeds.
    SucceedAfter { polls: u32 },
    /// Submit succeeds; the job fails with this exit status.
    FailExit(i32),
    /// The submission layer fails before a job id exists.
    SubmitFail(String),
    /// The job runs until killed (reports 143 after a kill).
    RunForever,
    /// First poll reports a vacated slot; the job then runs and succeeds.
    VacateThenSucceed,
    /// The platform loses the job: no exit message, no record.
    Gone,
}

/// A recorded runner call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RunnerCall {
    Submit {
        task: String,
        submit_num: u32,
    },
    Poll {
        job_ids: Vec<String>,
    },
    Kill {
        job_id: String,
    },
}

#[derive(Debug)]
struct FakeJob {
    plan: JobPlan,
    polls_seen: u32,
    killed: bool,
}

#[derive(Default)]
struct FakeState {
    /// Task name → queued plans, consumed per submission.
    plans: HashMap<String, VecDeque<JobPlan>>,
    jobs: HashMap<String, FakeJob>,
    calls: Vec<RunnerCall>,
    next_id: u64,
    /// Environments seen at submit, keyed by job id (for broadcast tests).
    environments: HashMap<String, Vec<(String, String)>>,
}

/// In-memory runner with per-task scripted outcomes. Cloned handles share
/// state.
#[derive(Clone, Default)]
pub struct FakeRunner {
    state: Arc<Mutex<FakeState>>,
}

impl FakeRunner {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue a plan for the next submission of `task`. Unplanned
    /// submissions succeed.
    pub fn plan(&self, task: &str, plan: JobPlan) {
        self.state
            .lock()
            .plans
            .entry(task.to_string())
            .or_default()
            .push_back(plan);
    }

    /// Queue several plans for consecutive submissions of `task`.
    pub fn plan_all(&self, task: &str, plans: impl IntoIterator<Item = JobPlan>) {
        let mut state = self.state.lock();
        let queue = state.plans.entry(task.to_string()).or_default();
        queue.extend(plans);
    }

    pub fn calls(&self) -> Vec<RunnerCall> {
        self.state.lock().calls.clone()
    }

    pub fn submit_count(&self, task: &str) -> usize {
        self.state
            .lock()
            .calls
            .iter()
            .filter(|c| matches!(c, RunnerCall::Submit { task: t, .. } if t == task))
            .count()
    }

    /// Environment the given job was submitted with.
    pub fn environment_of(&self, job_id: &str) -> Option<Vec<(String, String)>> {
        self.state.lock().environments.get(job_id).cloned()
    }
}

#[async_trait]
impl JobRunner for FakeRunner {
    async fn submit(&self, ctx: JobContext) -> Result<SubmitOutcome, RunnerError> {
        let mut state = self.state.lock();
        state.calls.push(RunnerCall::Submit {
            task: ctx.name.clone(),
            submit_num: ctx.submit_num,
        });

        let plan = state
            .plans
            .get_mut(&ctx.name)
            .and_then(|q| q.pop_front())
            .unwrap_or(JobPlan::Succeed);

        if let JobPlan::SubmitFail(error) = plan {
            return Ok(SubmitOutcome::Failed { error });
        }

        state.next_id += 1;
        let job_id = format!("fake-{}", state.next_id);
        state.jobs.insert(
            job_id.clone(),
            FakeJob {
                plan,
                polls_seen: 0,
                killed: false,
            },
        );
        state.environments.insert(job_id.clone(), ctx.environment);
        Ok(SubmitOutcome::Submitted { job_id })
    }

    async fn poll(&self, jobs: &[JobRef]) -> Result<Vec<PollResult>, RunnerError> {
        let mut state = self.state.lock();
        state.calls.push(RunnerCall::Poll {
            job_ids: jobs.iter().map(|j| j.job_id.clone()).collect(),
        });

        let mut results = Vec::with_capacity(jobs.len());
        for job_ref in jobs {
            let poll_state = match state.jobs.get_mut(&job_ref.job_id) {
                None => PollState::Gone,
                Some(job) => {
                    job.polls_seen += 1;
                    if job.killed {
                        PollState::Failed {
                            exit_status: Some(143),
                        }
                    } else {
                        match &job.plan {
                            JobPlan::Succeed => PollState::Succeeded,
                            JobPlan::SucceedAfter { polls } => {
                                if job.polls_seen > *polls {
                                    PollState::Succeeded
                                } else {
                                    PollState::Running
                                }
                            }
                            JobPlan::FailExit(code) => PollState::Failed {
                                exit_status: Some(*code),
                            },
                            JobPlan::RunForever => PollState::Running,
                            JobPlan::VacateThenSucceed => {
                                if job.polls_seen == 1 {
                                    PollState::Vacated
                                } else {
                                    PollState::Succeeded
                                }
                            }
                            JobPlan::Gone => PollState::Gone,
                            JobPlan::SubmitFail(_) => PollState::SubmitFailed,
                        }
                    }
                }
            };
            results.push(PollResult {
                job: job_ref.clone(),
                state: poll_state,
            });
        }
        Ok(results)
    }

    async fn kill(&self, job: &JobRef) -> Result<(), RunnerError> {
        let mut state = self.state.lock();
        state.calls.push(RunnerCall::Kill {
            job_id: job.job_id.clone(),
        });
        match state.jobs.get_mut(&job.job_id) {
            Some(fake) => {
                fake.killed = true;
                Ok(())
            }
            None => Err(RunnerError::NotFound(job.job_id.clone())),
        }
    }

    fn supports_vacation(&self) -> bool {
        true
    }

    fn name(&self) -> &'static str {
        "fake"
    }
}

#[cfg(test)]
#[path = "fake_tests.rs"]
mod tests;
