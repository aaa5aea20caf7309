// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Event types for the Cadence scheduler.
//!
//! Events are facts: job outcomes reported by runner workers, timer
//! firings, xtrigger results, and workflow-level transitions. They are
//! drained by the main loop, which owns all state mutation.

use crate::point::CyclePoint;
use crate::timer::TimerId;
use serde::{Deserialize, Serialize};

/// Severity of a job-emitted message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobSeverity {
    Normal,
    Warning,
    Critical,
}

/// Job state as reported by a poll, which is authoritative over messages.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case", tag = "state")]
pub enum PollState {
    Submitted,
    Running,
    Succeeded,
    Failed { exit_status: Option<i32> },
    SubmitFailed,
    /// The platform no longer knows the job and no exit was reported.
    Gone,
    /// The job vacated its slot (e.g. SIGUSR1) and will resume itself.
    Vacated,
}

/// Events that drive the main loop.
///
/// Serializes with `{"type": "event:name", ...fields}` format.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum Event {
    // -- job --
    /// The runner accepted a submission and returned a platform job id.
    #[serde(rename = "job:submitted")]
    JobSubmitted {
        point: CyclePoint,
        name: String,
        submit_num: u32,
        platform: String,
        job_id: String,
    },

    /// The submission layer failed before a job id was returned.
    #[serde(rename = "job:submit-failed")]
    JobSubmitFailed {
        point: CyclePoint,
        name: String,
        submit_num: u32,
        platform: String,
        error: String,
    },

    /// A message emitted by the job itself (lifecycle or custom label).
    #[serde(rename = "job:message")]
    JobMessage {
        point: CyclePoint,
        name: String,
        submit_num: u32,
        severity: JobSeverity,
        message: String,
    },

    /// Result of polling the platform for a job's state.
    #[serde(rename = "job:polled")]
    JobPolled {
        point: CyclePoint,
        name: String,
        submit_num: u32,
        #[serde(flatten)]
        state: PollState,
    },

    /// A kill request completed (successfully or not).
    #[serde(rename = "job:killed")]
    JobKilled {
        point: CyclePoint,
        name: String,
        submit_num: u32,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        error: Option<String>,
    },

    // -- timer --
    #[serde(rename = "timer:fired")]
    TimerFired { id: TimerId },

    // -- xtrigger --
    /// An external trigger reported satisfied (polled or pushed in over
    /// the client).
    #[serde(rename = "xtrigger:satisfied")]
    XtriggerSatisfied { label: String, point: CyclePoint },
}

impl Event {
    pub fn name(&self) -> &str {
        match self {
            Event::JobSubmitted { .. } => "job:submitted",
            Event::JobSubmitFailed { .. } => "job:submit-failed",
            Event::JobMessage { .. } => "job:message",
            Event::JobPolled { .. } => "job:polled",
            Event::JobKilled { .. } => "job:killed",
            Event::TimerFired { .. } => "timer:fired",
            Event::XtriggerSatisfied { .. } => "xtrigger:satisfied",
        }
    }

    pub fn log_summary(&self) -> String {
        let t = self.name();
        match self {
            Event::JobSubmitted {
                point,
                name,
                submit_num,
                platform,
                job_id,
            } => format!("{t} {point}/{name}/{submit_num:02} platform={platform} id={job_id}"),
            Event::JobSubmitFailed {
                point,
                name,
                submit_num,
                platform,
                error,
            } => format!("{t} {point}/{name}/{submit_num:02} platform={platform} error={error}"),
            Event::JobMessage {
                point,
                name,
                submit_num,
                message,
                ..
            } => format!("{t} {point}/{name}/{submit_num:02} msg={message}"),
            Event::JobPolled {
                point,
                name,
                submit_num,
                state,
            } => format!("{t} {point}/{name}/{submit_num:02} state={state:?}"),
            Event::JobKilled {
                point,
                name,
                submit_num,
                error,
            } => match error {
                Some(e) => format!("{t} {point}/{name}/{submit_num:02} error={e}"),
                None => format!("{t} {point}/{name}/{submit_num:02}"),
            },
            Event::TimerFired { id } => format!("{t} id={id}"),
            Event::XtriggerSatisfied { label, point } => {
                format!("{t} label={label} point={point}")
            }
        }
    }
}

#[cfg(test)]
#[path = "event_tests.rs"]
mod tests;
