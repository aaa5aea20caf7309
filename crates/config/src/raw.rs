// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Serde mirror of the normalised workflow tree.
//!
//! Field names follow the recognised sections: `[scheduling]`,
//! `[runtime]`, `[scheduler]`, `[platforms]`, `[mail]`. Graph strings
//! never appear here — the external parser has already split them into
//! edge records.

use cad_core::CompletionExpr;
use indexmap::IndexMap;
use serde::Deserialize;
use std::collections::BTreeMap;

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(deny_unknown_fields)]
pub struct RawWorkflow {
    #[serde(default)]
    pub name: Option<String>,
    pub scheduling: RawScheduling,
    #[serde(default)]
    pub runtime: IndexMap<String, RawRuntime>,
    #[serde(default)]
    pub scheduler: RawScheduler,
    #[serde(default)]
    pub platforms: IndexMap<String, crate::platform::PlatformConfig>,
    #[serde(default)]
    pub mail: RawMail,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(deny_unknown_fields)]
pub struct RawScheduling {
    #[serde(default)]
    pub initial_cycle_point: Option<String>,
    #[serde(default)]
    pub final_cycle_point: Option<String>,
    #[serde(default)]
    pub cycling_mode: Option<String>,
    /// Cycle-count (`P3`) or interval (`P1D`) runahead limit.
    #[serde(default)]
    pub runahead_limit: Option<String>,
    #[serde(default)]
    pub graph: Vec<RawGraphBlock>,
    /// Xtrigger label → function spec.
    #[serde(default)]
    pub xtriggers: BTreeMap<String, XtriggerSpec>,
}

/// One `recurrence => edges` block of the graph.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RawGraphBlock {
    /// Recurrence expression, e.g. `R1`, `P1D`, `R3/^/P1D`.
    pub recurrence: String,
    #[serde(default)]
    pub edges: Vec<RawEdge>,
    /// Tasks on this recurrence with no in-edges (graph heads).
    #[serde(default)]
    pub tasks: Vec<String>,
}

/// One pre-split dependency edge.
///
/// `upstream` starting with `@` names an xtrigger instead of a task.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RawEdge {
    pub upstream: String,
    /// `-P1D` (interval), `^` (initial point), or an absolute point.
    #[serde(default)]
    pub offset: Option<String>,
    /// Required upstream output; defaults to `succeeded`.
    #[serde(default)]
    pub output: Option<String>,
    pub downstream: String,
    /// Edges sharing a group OR together.
    #[serde(default)]
    pub alt_group: Option<u32>,
}

/// Xtrigger function binding.
#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct XtriggerSpec {
    pub function: String,
    /// Function arguments, opaque to the core.
    #[serde(default)]
    pub args: BTreeMap<String, serde_json::Value>,
    /// Poll interval; defaults to the scheduler tick interval.
    #[serde(default)]
    pub interval: Option<String>,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(deny_unknown_fields)]
pub struct RawRuntime {
    #[serde(default)]
    pub inherits: Vec<String>,
    #[serde(default)]
    pub script: Option<String>,
    #[serde(default)]
    pub platform: Option<String>,
    #[serde(default)]
    pub environment: BTreeMap<String, String>,
    /// Custom output label → message.
    #[serde(default)]
    pub outputs: BTreeMap<String, String>,
    #[serde(default)]
    pub completion: Option<CompletionExpr>,
    #[serde(default)]
    pub submission_retry_delays: Vec<String>,
    #[serde(default)]
    pub execution_retry_delays: Vec<String>,
    #[serde(default)]
    pub execution_time_limit: Option<String>,
    /// Offset from the cycle point after which an unsubmitted task expires.
    #[serde(default)]
    pub clock_expire: Option<String>,
    /// Event name → handler command templates.
    #[serde(default)]
    pub events: BTreeMap<String, Vec<String>>,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(deny_unknown_fields)]
pub struct RawScheduler {
    #[serde(default)]
    pub utc_mode: Option<bool>,
    #[serde(default)]
    pub tick_interval: Option<String>,
    #[serde(default)]
    pub events: RawSchedulerEvents,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(deny_unknown_fields)]
pub struct RawSchedulerEvents {
    /// Abort (non-zero exit) this long after a stall; `PT0S` aborts at once.
    #[serde(default)]
    pub abort_on_stall_timeout: Option<String>,
    /// Abort after this long with no task activity.
    #[serde(default)]
    pub abort_on_inactivity_timeout: Option<String>,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(deny_unknown_fields)]
pub struct RawMail {
    #[serde(default)]
    pub to: Option<String>,
    #[serde(default)]
    pub from: Option<String>,
    #[serde(default)]
    pub footer: Option<String>,
}
