// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Job event ingestion and the task state machine's event-driven side.
//!
//! Poll results are authoritative: when a message and a poll disagree,
//! the poll decides the recorded outcome.

use crate::scheduler::Scheduler;
use cad_core::{
    Clock, CyclePoint, Event, JobSeverity, PollState, RetryKind, TaskKey, TaskState, TimerId,
    OUTPUT_FAILED, OUTPUT_STARTED, OUTPUT_SUBMITTED, OUTPUT_SUBMIT_FAILED, OUTPUT_SUCCEEDED,
};
use cad_platforms::{JobRef, JobRunner};
use cad_store::{format_time, parse_time, PendingWrite};
use std::time::Duration;
use tracing::{debug, warn};

impl<R: JobRunner, C: Clock> Scheduler<R, C> {
    pub(crate) fn handle_event(&mut self, event: Event) {
        debug!(event = %event.log_summary(), "event");
        match event {
            Event::JobSubmitted {
                point,
                name,
                submit_num,
                platform,
                job_id,
            } => self.on_job_submitted(point, &name, submit_num, &platform, &job_id),
            Event::JobSubmitFailed {
                point,
                name,
                submit_num,
                platform,
                error,
            } => self.on_job_submit_failed(point, &name, submit_num, Some(&platform), &error),
            Event::JobMessage {
                point,
                name,
                submit_num,
                severity,
                message,
            } => self.on_job_message(point, &name, submit_num, severity, &message),
            Event::JobPolled {
                point,
                name,
                submit_num,
                state,
            } => self.on_job_polled(point, &name, submit_num, state),
            Event::JobKilled {
                point,
                name,
                submit_num,
                error,
            } => {
                let key = TaskKey::new(point, name);
                match error {
                    Some(e) => warn!(task = %key, submit_num, error = %e, "kill failed"),
                    None => self.record_task_event(&key, "killed", ""),
                }
            }
            Event::TimerFired { id } => self.handle_timer(id),
            Event::XtriggerSatisfied { label, point } => {
                self.pool.satisfy_xtrigger(&label, &point);
                self.note_activity();
            }
        }
    }

    /// Ignore events for a submit attempt that is no longer current.
    fn current_attempt(&self, key: &TaskKey, submit_num: u32) -> bool {
        self.pool
            .get(key)
            .map(|p| p.submit_num == submit_num)
            .unwrap_or(false)
    }

    fn on_job_submitted(
        &mut self,
        point: CyclePoint,
        name: &str,
        submit_num: u32,
        platform: &str,
        job_id: &str,
    ) {
        self.dispatcher.submission_finished(platform);
        let key = TaskKey::new(point, name);
        if !self.current_attempt(&key, submit_num) {
            debug!(task = %key, submit_num, "stale submission outcome ignored");
            return;
        }

        let job_dir = self.paths.job_dir(&point, name, submit_num);
        let now_ms = self.clock.epoch_ms();

        let Some(proxy) = self.pool.get_mut(&key) else {
            return;
        };
        if let Err(e) = proxy.transition(TaskState::Submitted) {
            warn!(error = %e, "dropping submission outcome");
            return;
        }
        proxy.job_id = Some(job_id.to_string());

        self.job_refs.insert(
            (key.clone(), submit_num),
            JobRef {
                point: point.to_string(),
                name: name.to_string(),
                submit_num,
                job_id: job_id.to_string(),
                job_dir,
            },
        );

        self.store.push(PendingWrite::UpdateJobSubmitOutcome {
            cycle: point.to_string(),
            name: name.to_string(),
            submit_num,
            submit_status: 0,
            job_id: Some(job_id.to_string()),
            time_submit_exit: format_time(now_ms),
        });

        self.record_output(&key, OUTPUT_SUBMITTED, true);
        self.persist_proxy(&key);
        self.record_task_event(&key, "submitted", "");
        self.arm_poll_timer(&key, submit_num, false, 0);
        self.note_activity();
    }

    fn on_job_submit_failed(
        &mut self,
        point: CyclePoint,
        name: &str,
        submit_num: u32,
        platform: Option<&str>,
        error: &str,
    ) {
        let key = TaskKey::new(point, name);
        // A worker-reported failure frees its platform slot; the
        // poll-reported variant carries no platform and frees nothing
        // (its worker already did).
        if let Some(platform) = platform {
            self.dispatcher.submission_finished(platform);
        }
        if !self.current_attempt(&key, submit_num) {
            return;
        }

        self.store.push(PendingWrite::UpdateJobSubmitOutcome {
            cycle: point.to_string(),
            name: name.to_string(),
            submit_num,
            submit_status: 1,
            job_id: None,
            time_submit_exit: format_time(self.clock.epoch_ms()),
        });
        self.record_task_event(&key, "submission failed", error);

        let retry_delay = self
            .pool
            .get(&key)
            .zip(self.config.task(name))
            .and_then(|(proxy, def)| def.retry_delays.submission_delay(proxy.try_num_submit));

        let Some(proxy) = self.pool.get_mut(&key) else {
            return;
        };
        if proxy.transition(TaskState::SubmitFailed).is_err() {
            return;
        }

        match retry_delay {
            Some(delay) => {
                if proxy.reset_for_retry(RetryKind::Submission).is_ok() {
                    self.schedule_retry(&key, delay);
                }
            }
            None => {
                // Out of submission retries: terminal.
                self.record_output(&key, OUTPUT_SUBMIT_FAILED, true);
                self.persist_proxy(&key);
                self.record_task_event(&key, "submit-failed", error);
            }
        }
        self.note_activity();
    }

    fn on_job_message(
        &mut self,
        point: CyclePoint,
        name: &str,
        submit_num: u32,
        severity: JobSeverity,
        message: &str,
    ) {
        let key = TaskKey::new(point, name);
        if !self.current_attempt(&key, submit_num) {
            debug!(task = %key, submit_num, message, "message for stale attempt ignored");
            return;
        }

        match message {
            OUTPUT_STARTED => self.task_started(&key, submit_num),
            OUTPUT_SUCCEEDED => self.task_succeeded(&key, submit_num),
            OUTPUT_FAILED => self.task_failed(&key, submit_num, None, "failure message"),
            label => {
                let known = self
                    .config
                    .task(name)
                    .map(|d| d.custom_outputs.contains_key(label))
                    .unwrap_or(false);
                if known {
                    let no_spawn = self
                        .pool
                        .get(&key)
                        .map(|p| p.flow_wait)
                        .unwrap_or(false);
                    self.record_output(&key, label, !no_spawn);
                    self.record_task_event(&key, "message", label);
                } else {
                    // Unknown labels never affect state.
                    warn!(task = %key, severity = ?severity, message, "unrecognised job message");
                    self.record_task_event(&key, "message", message);
                }
            }
        }
        self.note_activity();
    }

    fn on_job_polled(&mut self, point: CyclePoint, name: &str, submit_num: u32, state: PollState) {
        let key = TaskKey::new(point, name);
        if !self.current_attempt(&key, submit_num) {
            return;
        }
        let proxy_state = match self.pool.get(&key) {
            Some(p) => p.state,
            None => return,
        };

        match state {
            PollState::Submitted => {}
            PollState::Running => self.task_started(&key, submit_num),
            PollState::Succeeded => self.task_succeeded(&key, submit_num),
            PollState::Failed { exit_status } => {
                let reason = match exit_status {
                    Some(143) => "execution timeout or kill",
                    _ => "non-zero exit",
                };
                self.task_failed(&key, submit_num, exit_status, reason);
            }
            PollState::SubmitFailed => {
                if proxy_state == TaskState::Preparing {
                    self.on_job_submit_failed(point, name, submit_num, None, "reported by poll");
                } else {
                    self.task_failed(&key, submit_num, None, "submission rejected after the fact");
                }
            }
            PollState::Gone => {
                // No exit message and the platform has no record: lost.
                if matches!(proxy_state, TaskState::Submitted | TaskState::Running) {
                    self.record_task_event(&key, "message", "lost contact");
                    self.task_failed(&key, submit_num, None, "lost contact");
                }
            }
            PollState::Vacated => {
                // The job cleared its slot and will resume itself: stay
                // submitted and re-enter the submission polling schedule.
                self.record_task_event(&key, "vacated", "");
                self.arm_poll_timer(&key, submit_num, false, 0);
            }
        }
    }

    /// `submitted -> running` (idempotent against repeats).
    fn task_started(&mut self, key: &TaskKey, submit_num: u32) {
        let now_ms = self.clock.epoch_ms();
        let Some(proxy) = self.pool.get_mut(key) else {
            return;
        };
        if proxy.state != TaskState::Submitted {
            return;
        }
        if proxy.transition(TaskState::Running).is_err() {
            return;
        }

        self.store.push(PendingWrite::UpdateJobRunStart {
            cycle: key.point.to_string(),
            name: key.name.clone(),
            submit_num,
            time_run: format_time(now_ms),
        });
        self.record_output(key, OUTPUT_STARTED, true);
        self.persist_proxy(key);
        self.record_task_event(key, "started", "");

        // Switch the poll chain to the execution schedule.
        self.arm_poll_timer(key, submit_num, true, 0);
        self.arm_time_limit_poll(key, submit_num);
        self.note_activity();
    }

    /// Poll a little after the declared execution time limit passes, so
    /// an overrunning job is caught promptly.
    fn arm_time_limit_poll(&mut self, key: &TaskKey, submit_num: u32) {
        let Some(def) = self.config.task(&key.name) else {
            return;
        };
        let Some(limit) = def.execution_time_limit else {
            return;
        };
        let Some(platform) = self.pool.get(key).and_then(|p| p.platform.clone()) else {
            return;
        };
        let extra = self
            .config
            .platform(&platform)
            .time_limit_poll_interval(0);
        self.timers.set(
            TimerId::poll(&key.point, &key.name, submit_num),
            limit + extra,
            self.clock.now(),
        );
    }

    fn task_succeeded(&mut self, key: &TaskKey, submit_num: u32) {
        let now_ms = self.clock.epoch_ms();
        let flow_wait;
        {
            let Some(proxy) = self.pool.get_mut(key) else {
                return;
            };
            if !matches!(proxy.state, TaskState::Submitted | TaskState::Running) {
                return;
            }
            // A success reported straight from `submitted` implies the
            // start was missed; backfill it.
            if proxy.state == TaskState::Submitted {
                proxy.add_output(OUTPUT_STARTED);
                self.store.push(PendingWrite::UpdateJobRunStart {
                    cycle: key.point.to_string(),
                    name: key.name.clone(),
                    submit_num,
                    time_run: format_time(now_ms),
                });
            }
            let Some(proxy) = self.pool.get_mut(key) else {
                return;
            };
            if proxy.transition(TaskState::Succeeded).is_err() {
                return;
            }
            flow_wait = proxy.flow_wait;
        }

        self.store.push(PendingWrite::UpdateJobRunExit {
            cycle: key.point.to_string(),
            name: key.name.clone(),
            submit_num,
            run_status: 0,
            time_run_exit: format_time(now_ms),
        });

        if flow_wait {
            // Deferred spawning: replay everything now that the run is
            // complete and the new run joins the flow.
            self.replay_outputs_for_spawning(key);
        }
        self.record_output(key, OUTPUT_SUCCEEDED, true);
        self.persist_proxy(key);
        self.record_task_event(key, "succeeded", "");
        self.cancel_job_tracking(key, submit_num);
        self.note_activity();
    }

    fn replay_outputs_for_spawning(&mut self, key: &TaskKey) {
        let outputs: Vec<String> = self
            .pool
            .get(key)
            .map(|p| p.outputs.iter().cloned().collect())
            .unwrap_or_default();
        if let Some(proxy) = self.pool.get_mut(key) {
            proxy.flow_wait = false;
        }
        for label in outputs {
            self.record_output(key, &label, true);
        }
    }

    fn task_failed(&mut self, key: &TaskKey, submit_num: u32, exit: Option<i32>, reason: &str) {
        let now_ms = self.clock.epoch_ms();

        let retry_delay = self
            .pool
            .get(key)
            .zip(self.config.task(&key.name))
            .and_then(|(proxy, def)| def.retry_delays.execution_delay(proxy.try_num_execute));

        let Some(proxy) = self.pool.get_mut(key) else {
            return;
        };
        if !matches!(proxy.state, TaskState::Submitted | TaskState::Running) {
            return;
        }
        if proxy.transition(TaskState::Failed).is_err() {
            return;
        }
        proxy.error = Some(reason.to_string());

        self.store.push(PendingWrite::UpdateJobRunExit {
            cycle: key.point.to_string(),
            name: key.name.clone(),
            submit_num,
            run_status: exit.unwrap_or(1),
            time_run_exit: format_time(now_ms),
        });
        self.record_task_event(key, "failed", reason);
        self.cancel_job_tracking(key, submit_num);

        match retry_delay {
            Some(delay) => {
                let Some(proxy) = self.pool.get_mut(key) else {
                    return;
                };
                if proxy.reset_for_retry(RetryKind::Execution).is_ok() {
                    self.schedule_retry(key, delay);
                }
            }
            None => {
                // Out of execution retries: terminal failure.
                self.record_output(key, OUTPUT_FAILED, true);
                self.persist_proxy(key);
            }
        }
        self.note_activity();
    }

    /// Arm a retry timer and persist its absolute fire time so a restart
    /// can resume it.
    pub(crate) fn schedule_retry(&mut self, key: &TaskKey, delay: Duration) {
        let fire_at_ms = self.clock.epoch_ms() + delay.as_millis() as u64;
        if let Some(proxy) = self.pool.get_mut(key) {
            proxy.retry_at_ms = Some(fire_at_ms);
        }
        self.timers
            .set(TimerId::retry(&key.point, &key.name), delay, self.clock.now());
        self.persist_proxy(key);
        self.record_task_event(key, "retry scheduled", &format_time(fire_at_ms));
        debug!(task = %key, fire_at = %format_time(fire_at_ms), "retry scheduled");
        // Round-trip sanity for the recovery path.
        debug_assert!(parse_time(&format_time(fire_at_ms)).is_some());
    }
}

#[cfg(test)]
#[path = "events_tests.rs"]
mod tests;
