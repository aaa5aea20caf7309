// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Immutable task definitions and the graph edge table.
//!
//! The external configuration layer produces these; the scheduler core
//! never parses graph text. Edges arrive as records of
//! `(upstream, offset, required output, downstream, sequence)`.

use crate::interval::CycleInterval;
use crate::point::CyclePoint;
use crate::sequence::Sequence;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::time::Duration;

// Standard lifecycle output labels.
pub const OUTPUT_SUBMITTED: &str = "submitted";
pub const OUTPUT_SUBMIT_FAILED: &str = "submit-failed";
pub const OUTPUT_STARTED: &str = "started";
pub const OUTPUT_SUCCEEDED: &str = "succeeded";
pub const OUTPUT_FAILED: &str = "failed";
pub const OUTPUT_EXPIRED: &str = "expired";

/// All standard lifecycle labels, in lifecycle order.
pub const LIFECYCLE_OUTPUTS: &[&str] = &[
    OUTPUT_SUBMITTED,
    OUTPUT_SUBMIT_FAILED,
    OUTPUT_STARTED,
    OUTPUT_SUCCEEDED,
    OUTPUT_FAILED,
    OUTPUT_EXPIRED,
];

pub fn is_lifecycle_output(label: &str) -> bool {
    LIFECYCLE_OUTPUTS.contains(&label)
}

/// How an edge's upstream point relates to the downstream point.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum OffsetSpec {
    /// Same cycle point as the downstream task.
    #[default]
    Zero,
    /// Downstream point plus a (usually negative) interval.
    Interval(CycleInterval),
    /// A fixed absolute point, independent of the downstream point.
    Absolute(CyclePoint),
    /// The workflow's initial cycle point (`^`).
    Initial,
}

/// One instantiable dependency edge.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GraphEdge {
    pub upstream: String,
    #[serde(default)]
    pub offset: OffsetSpec,
    /// Output the upstream must produce; defaults to `succeeded`.
    #[serde(default = "default_output")]
    pub output: String,
    pub downstream: String,
    /// Index into the downstream task's sequence list this edge applies on.
    #[serde(default)]
    pub sequence: usize,
    /// Edges sharing a group OR together; ungrouped edges AND.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub alt_group: Option<u32>,
}

fn default_output() -> String {
    OUTPUT_SUCCEEDED.to_string()
}

/// Retry delay schedules, consumed front to back.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct RetryDelays {
    #[serde(default)]
    pub submission: Vec<CycleInterval>,
    #[serde(default)]
    pub execution: Vec<CycleInterval>,
}

impl RetryDelays {
    /// Delay for the given retry attempt (1-based try number of the
    /// attempt that just failed), if any remain.
    pub fn submission_delay(&self, failed_try: u32) -> Option<Duration> {
        self.submission
            .get((failed_try as usize).saturating_sub(1))
            .and_then(|iv| iv.to_duration())
    }

    pub fn execution_delay(&self, failed_try: u32) -> Option<Duration> {
        self.execution
            .get((failed_try as usize).saturating_sub(1))
            .and_then(|iv| iv.to_duration())
    }
}

/// Boolean expression over output labels defining task completion.
///
/// The configuration layer supplies this pre-structured; the default is
/// plain `succeeded`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum CompletionExpr {
    Output(String),
    All { all: Vec<CompletionExpr> },
    Any { any: Vec<CompletionExpr> },
}

impl Default for CompletionExpr {
    fn default() -> Self {
        CompletionExpr::Output(OUTPUT_SUCCEEDED.to_string())
    }
}

impl CompletionExpr {
    /// Evaluate against the set of completed output labels.
    pub fn is_complete(&self, completed: &std::collections::BTreeSet<String>) -> bool {
        match self {
            CompletionExpr::Output(label) => completed.contains(label),
            CompletionExpr::All { all } => all.iter().all(|e| e.is_complete(completed)),
            CompletionExpr::Any { any } => any.iter().any(|e| e.is_complete(completed)),
        }
    }

    /// True if the expression can still be satisfied given that `label`
    /// will never be produced (used by prune reachability checks).
    pub fn satisfiable_without(&self, label: &str) -> bool {
        match self {
            CompletionExpr::Output(l) => l != label,
            CompletionExpr::All { all } => all.iter().all(|e| e.satisfiable_without(label)),
            CompletionExpr::Any { any } => any.iter().any(|e| e.satisfiable_without(label)),
        }
    }

    /// All output labels the expression references.
    pub fn labels(&self) -> Vec<&str> {
        match self {
            CompletionExpr::Output(l) => vec![l.as_str()],
            CompletionExpr::All { all } => all.iter().flat_map(|e| e.labels()).collect(),
            CompletionExpr::Any { any } => any.iter().flat_map(|e| e.labels()).collect(),
        }
    }
}

/// Immutable per-name task record.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskDef {
    pub name: String,
    /// Recurrences this task runs on.
    pub sequences: Vec<Sequence>,
    /// Family ancestry, nearest first, ending at `root`.
    #[serde(default)]
    pub family_lineage: Vec<String>,
    /// Custom output label → message.
    #[serde(default)]
    pub custom_outputs: BTreeMap<String, String>,
    #[serde(default)]
    pub completion: CompletionExpr,
    #[serde(default)]
    pub retry_delays: RetryDelays,
    /// Platform the job runs on.
    #[serde(default = "default_platform")]
    pub platform: String,
    /// Wall-time limit for execution, if declared.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub execution_time_limit: Option<Duration>,
    /// Expire the task if wall clock passes `point + offset` before submission.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub clock_expire: Option<CycleInterval>,
    /// Xtrigger labels this task waits on.
    #[serde(default)]
    pub xtriggers: Vec<String>,
    /// Event name → handler command templates.
    #[serde(default)]
    pub event_handlers: BTreeMap<String, Vec<String>>,
    /// Job environment.
    #[serde(default)]
    pub environment: BTreeMap<String, String>,
    /// Job script (opaque to the core; handed to the runner).
    #[serde(default)]
    pub script: String,
}

fn default_platform() -> String {
    "localhost".to_string()
}

impl TaskDef {
    pub fn new(name: impl Into<String>, sequences: Vec<Sequence>) -> Self {
        Self {
            name: name.into(),
            sequences,
            family_lineage: Vec::new(),
            custom_outputs: BTreeMap::new(),
            completion: CompletionExpr::default(),
            retry_delays: RetryDelays::default(),
            platform: default_platform(),
            execution_time_limit: None,
            clock_expire: None,
            xtriggers: Vec::new(),
            event_handlers: BTreeMap::new(),
            environment: BTreeMap::new(),
            script: String::new(),
        }
    }

    /// True when `point` is on any of this task's sequences.
    pub fn is_valid_point(&self, point: &CyclePoint) -> bool {
        self.sequences.iter().any(|s| s.contains(point))
    }

    /// Next point this task runs on strictly after `point`.
    pub fn next_point(&self, point: &CyclePoint) -> Option<CyclePoint> {
        self.sequences
            .iter()
            .filter_map(|s| s.next_after(point))
            .min()
    }

    /// First point this task runs on.
    pub fn first_point(&self) -> Option<CyclePoint> {
        self.sequences.iter().filter_map(|s| s.first()).min()
    }

    /// True when `label` is a declared output (lifecycle or custom).
    pub fn knows_output(&self, label: &str) -> bool {
        is_lifecycle_output(label) || self.custom_outputs.contains_key(label)
    }
}

#[cfg(test)]
#[path = "taskdef_tests.rs"]
mod tests;
