// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Job dispatcher: bounded per-platform submission queues and polling,
//! run on worker tasks that report back through the event channel.

use cad_config::PlatformConfig;
use cad_core::{CyclePoint, CyclingMode, Event};
use cad_platforms::{JobContext, JobRef, JobRunner, SubmitOutcome};
use std::collections::{HashMap, VecDeque};
use tokio::sync::mpsc;
use tracing::{debug, error, info_span, warn, Instrument};

struct PlatformQueue {
    config: PlatformConfig,
    waiting: VecDeque<JobContext>,
    in_flight: usize,
}

/// Owns per-platform FIFO queues; submission and polling I/O happens on
/// spawned workers, never on the main loop.
pub struct Dispatcher<R: JobRunner> {
    runner: R,
    event_tx: mpsc::Sender<Event>,
    mode: CyclingMode,
    queues: HashMap<String, PlatformQueue>,
}

impl<R: JobRunner> Dispatcher<R> {
    pub fn new(runner: R, event_tx: mpsc::Sender<Event>, mode: CyclingMode) -> Self {
        Self {
            runner,
            event_tx,
            mode,
            queues: HashMap::new(),
        }
    }

    pub fn runner_name(&self) -> &'static str {
        self.runner.name()
    }

    /// Queue a prepared job context for submission on its platform.
    pub fn enqueue_submission(&mut self, platform_config: PlatformConfig, ctx: JobContext) {
        let queue = self
            .queues
            .entry(ctx.platform.clone())
            .or_insert_with(|| PlatformQueue {
                config: platform_config,
                waiting: VecDeque::new(),
                in_flight: 0,
            });
        debug!(task = %ctx.task_id(), platform = %ctx.platform, "submission queued");
        queue.waiting.push_back(ctx);
    }

    /// Start submissions up to each platform's concurrency cap.
    pub fn dispatch(&mut self) {
        for (platform, queue) in self.queues.iter_mut() {
            while queue.in_flight < queue.config.max_concurrent_submits {
                let Some(ctx) = queue.waiting.pop_front() else {
                    break;
                };
                queue.in_flight += 1;

                let runner = self.runner.clone();
                let event_tx = self.event_tx.clone();
                let mode = self.mode;
                let span = info_span!("submit", task = %ctx.task_id(), platform = %platform);
                tokio::spawn(
                    async move {
                        let point = parse_point(&ctx.point, mode);
                        let name = ctx.name.clone();
                        let submit_num = ctx.submit_num;
                        let platform = ctx.platform.clone();

                        let event = match runner.submit(ctx).await {
                            Ok(SubmitOutcome::Submitted { job_id }) => Event::JobSubmitted {
                                point,
                                name,
                                submit_num,
                                platform,
                                job_id,
                            },
                            Ok(SubmitOutcome::Failed { error }) => Event::JobSubmitFailed {
                                point,
                                name,
                                submit_num,
                                platform,
                                error,
                            },
                            Err(e) => Event::JobSubmitFailed {
                                point,
                                name,
                                submit_num,
                                platform,
                                error: e.to_string(),
                            },
                        };
                        if event_tx.send(event).await.is_err() {
                            warn!("scheduler gone, dropping submit outcome");
                        }
                    }
                    .instrument(span),
                );
            }
        }
    }

    /// Note a finished submission so the platform slot frees up.
    pub fn submission_finished(&mut self, platform: &str) {
        if let Some(queue) = self.queues.get_mut(platform) {
            queue.in_flight = queue.in_flight.saturating_sub(1);
        }
    }

    /// Jobs waiting for a submission slot (for quiescence checks).
    pub fn queued_count(&self) -> usize {
        self.queues
            .values()
            .map(|q| q.waiting.len() + q.in_flight)
            .sum()
    }

    /// Poll a batch of jobs on a worker; results arrive as
    /// `Event::JobPolled`.
    pub fn spawn_poll(&self, jobs: Vec<JobRef>) {
        if jobs.is_empty() {
            return;
        }
        let runner = self.runner.clone();
        let event_tx = self.event_tx.clone();
        let mode = self.mode;
        tokio::spawn(async move {
            match runner.poll(&jobs).await {
                Ok(results) => {
                    for result in results {
                        let event = Event::JobPolled {
                            point: parse_point(&result.job.point, mode),
                            name: result.job.name.clone(),
                            submit_num: result.job.submit_num,
                            state: result.state,
                        };
                        if event_tx.send(event).await.is_err() {
                            return;
                        }
                    }
                }
                Err(e) => error!(error = %e, "poll worker failed"),
            }
        });
    }

    /// Kill a job on a worker; the outcome arrives as `Event::JobKilled`.
    pub fn spawn_kill(&self, job: JobRef) {
        let runner = self.runner.clone();
        let event_tx = self.event_tx.clone();
        let mode = self.mode;
        tokio::spawn(async move {
            let error = runner.kill(&job).await.err().map(|e| e.to_string());
            let event = Event::JobKilled {
                point: parse_point(&job.point, mode),
                name: job.name.clone(),
                submit_num: job.submit_num,
                error,
            };
            let _ = event_tx.send(event).await;
        });
    }

}

fn parse_point(s: &str, mode: CyclingMode) -> CyclePoint {
    CyclePoint::parse(s, mode).unwrap_or(CyclePoint::Integer(0))
}

#[cfg(test)]
#[path = "dispatch_tests.rs"]
mod tests;
