// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Task proxies and their state machine.

use crate::flow::FlowSet;
use crate::point::CyclePoint;
use crate::prereq::{PrereqAtom, PrereqExpression};
use crate::taskdef::{is_lifecycle_output, CompletionExpr};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;
use thiserror::Error;

/// Task lifecycle states.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum TaskState {
    Waiting,
    Preparing,
    Submitted,
    Running,
    Succeeded,
    Failed,
    SubmitFailed,
    Expired,
}

impl TaskState {
    /// Terminal states: no further transitions.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            TaskState::Succeeded | TaskState::Failed | TaskState::SubmitFailed | TaskState::Expired
        )
    }

    /// Active states: work is in flight somewhere.
    pub fn is_active(&self) -> bool {
        matches!(
            self,
            TaskState::Preparing | TaskState::Submitted | TaskState::Running
        )
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            TaskState::Waiting => "waiting",
            TaskState::Preparing => "preparing",
            TaskState::Submitted => "submitted",
            TaskState::Running => "running",
            TaskState::Succeeded => "succeeded",
            TaskState::Failed => "failed",
            TaskState::SubmitFailed => "submit-failed",
            TaskState::Expired => "expired",
        }
    }

    pub fn parse(s: &str) -> Option<TaskState> {
        Some(match s {
            "waiting" => TaskState::Waiting,
            "preparing" => TaskState::Preparing,
            "submitted" => TaskState::Submitted,
            "running" => TaskState::Running,
            "succeeded" => TaskState::Succeeded,
            "failed" => TaskState::Failed,
            "submit-failed" => TaskState::SubmitFailed,
            "expired" => TaskState::Expired,
            _ => return None,
        })
    }

    /// Permitted transition table.
    fn permits(&self, to: TaskState) -> bool {
        use TaskState::*;
        matches!(
            (self, to),
            (Waiting, Preparing)
                | (Waiting, Expired)
                | (Preparing, Submitted)
                | (Preparing, SubmitFailed)
                | (Submitted, Running)
                | (Submitted, Failed)
                | (Submitted, Succeeded)
                | (Running, Succeeded)
                | (Running, Failed)
                // retry re-entry
                | (SubmitFailed, Waiting)
                | (Failed, Waiting)
        )
    }
}

impl fmt::Display for TaskState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Attempted an illegal state transition.
#[derive(Debug, Error, PartialEq, Eq)]
#[error("illegal transition {from} -> {to} for {task}")]
pub struct TransitionError {
    pub task: String,
    pub from: TaskState,
    pub to: TaskState,
}

/// Identity of a task instance: `point/name`.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct TaskKey {
    pub point: CyclePoint,
    pub name: String,
}

impl TaskKey {
    pub fn new(point: CyclePoint, name: impl Into<String>) -> Self {
        Self {
            point,
            name: name.into(),
        }
    }
}

impl fmt::Display for TaskKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.point, self.name)
    }
}

/// A live task instance at a specific cycle point.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskProxy {
    pub key: TaskKey,
    pub flows: FlowSet,
    pub state: TaskState,
    pub is_held: bool,
    pub is_queued: bool,
    /// Held back by the runahead window rather than by prerequisites.
    pub is_runahead: bool,
    /// Set when a manual trigger caused the current/next submission.
    /// A manually triggered proxy bypasses prerequisite and runahead
    /// checks for its next submission.
    pub is_manual_submit: bool,
    /// Epoch ms before which a retry-waiting proxy must not resubmit.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub retry_at_ms: Option<u64>,
    /// With `Trigger --wait`: downstream spawning deferred to completion.
    pub flow_wait: bool,
    /// Monotonic across all submissions of this instance.
    pub submit_num: u32,
    /// 1-based attempt counters for the current retry chains.
    pub try_num_submit: u32,
    pub try_num_execute: u32,
    /// Prerequisite expression materialised at spawn (and on reload).
    pub prereqs: PrereqExpression,
    /// Atoms observed satisfied so far.
    pub satisfied: BTreeSet<PrereqAtom>,
    /// Output labels completed by this instance.
    pub outputs: BTreeSet<String>,
    /// Platform the current submission went to.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub platform: Option<String>,
    /// Platform-native id of the current job.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub job_id: Option<String>,
    /// Epoch ms of creation (for inactivity accounting).
    #[serde(default)]
    pub created_at_ms: u64,
    /// Last recorded failure reason.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl TaskProxy {
    pub fn new(key: TaskKey, flows: FlowSet, prereqs: PrereqExpression, created_at_ms: u64) -> Self {
        Self {
            key,
            flows,
            state: TaskState::Waiting,
            is_held: false,
            is_queued: false,
            is_runahead: false,
            is_manual_submit: false,
            retry_at_ms: None,
            flow_wait: false,
            submit_num: 0,
            try_num_submit: 1,
            try_num_execute: 1,
            prereqs,
            satisfied: BTreeSet::new(),
            outputs: BTreeSet::new(),
            platform: None,
            job_id: None,
            created_at_ms,
            error: None,
        }
    }

    pub fn name(&self) -> &str {
        &self.key.name
    }

    pub fn point(&self) -> &CyclePoint {
        &self.key.point
    }

    pub fn is_terminal(&self) -> bool {
        self.state.is_terminal()
    }

    pub fn is_active(&self) -> bool {
        self.state.is_active()
    }

    /// Move to a new state, enforcing the transition table.
    pub fn transition(&mut self, to: TaskState) -> Result<(), TransitionError> {
        if !self.state.permits(to) {
            return Err(TransitionError {
                task: self.key.to_string(),
                from: self.state,
                to,
            });
        }
        self.state = to;
        Ok(())
    }

    /// Command-path state override (`set-outputs`), bypassing the
    /// transition table. Never used on the event path.
    pub fn force_state(&mut self, to: TaskState) {
        self.state = to;
    }

    /// Record a completed output label. Append-only within an attempt.
    pub fn add_output(&mut self, label: impl Into<String>) {
        self.outputs.insert(label.into());
    }

    /// Record a satisfied prerequisite atom.
    pub fn satisfy(&mut self, atom: PrereqAtom) {
        self.satisfied.insert(atom);
    }

    /// Whether all prerequisites hold given what this proxy has observed.
    pub fn prereqs_satisfied(&self) -> bool {
        self.prereqs.evaluate(&self.satisfied).satisfied
    }

    /// Re-enter `waiting` for a retry, bumping the relevant try counter.
    ///
    /// Lifecycle outputs reset; custom outputs already emitted survive.
    pub fn reset_for_retry(&mut self, kind: RetryKind) -> Result<(), TransitionError> {
        self.transition(TaskState::Waiting)?;
        match kind {
            RetryKind::Submission => self.try_num_submit += 1,
            RetryKind::Execution => {
                self.try_num_execute += 1;
                // A fresh execution chain restarts submission counting.
                self.try_num_submit = 1;
            }
        }
        self.outputs.retain(|label| !is_lifecycle_output(label));
        self.job_id = None;
        self.error = None;
        Ok(())
    }

    /// Whether the completion expression is met.
    pub fn is_complete(&self, completion: &CompletionExpr) -> bool {
        completion.is_complete(&self.outputs)
    }
}

/// Which retry chain a reset applies to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryKind {
    Submission,
    Execution,
}

#[cfg(test)]
#[path = "task_tests.rs"]
mod tests;
