// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Resolution of the raw tree into immutable task definitions:
//! recurrence parsing, runtime inheritance, and setting precedence.

use crate::error::ConfigError;
use crate::platform::PlatformConfig;
use crate::raw::{RawRuntime, RawWorkflow, XtriggerSpec};
use cad_core::{
    CompletionExpr, CycleInterval, CyclePoint, CyclingMode, GraphEdge, OffsetSpec, RetryDelays,
    Sequence, SequenceBounds, TaskDef,
};
use indexmap::IndexMap;
use std::collections::BTreeMap;
use std::time::Duration;

/// Scheduler event policy (stall/inactivity watchdogs).
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EventsConfig {
    /// Abort this long after a stall is declared; `Some(0)` aborts at once.
    pub abort_on_stall_timeout: Option<Duration>,
    /// Abort after this long with no task activity.
    pub abort_on_inactivity_timeout: Option<Duration>,
}

/// The fully resolved workflow definition the scheduler consumes.
#[derive(Debug, Clone)]
pub struct WorkflowConfig {
    pub name: String,
    pub mode: CyclingMode,
    pub bounds: SequenceBounds,
    /// `Steps(n)`: n cycles beyond the base point; interval: time span.
    pub runahead: CycleInterval,
    pub tasks: IndexMap<String, TaskDef>,
    pub edges: Vec<GraphEdge>,
    pub platforms: IndexMap<String, PlatformConfig>,
    pub xtriggers: BTreeMap<String, XtriggerSpec>,
    pub events: EventsConfig,
    pub utc_mode: bool,
    pub tick_interval: Duration,
    pub mail_to: Option<String>,
    pub mail_from: Option<String>,
    /// Namespace → ancestry (nearest first, ending at `root`), persisted
    /// to the `inheritance` table.
    pub lineages: BTreeMap<String, Vec<String>>,
    /// Content hash of the definition text.
    pub hash: String,
}

impl WorkflowConfig {
    pub fn task(&self, name: &str) -> Option<&TaskDef> {
        self.tasks.get(name)
    }

    /// Family ancestry of a task (nearest first), empty if unknown.
    pub fn lineage(&self, name: &str) -> &[String] {
        self.lineages
            .get(name)
            .map(|v| v.as_slice())
            .unwrap_or(&[])
    }

    /// Platform config by name, falling back to defaults.
    pub fn platform(&self, name: &str) -> PlatformConfig {
        self.platforms.get(name).cloned().unwrap_or_default()
    }

    /// Abbreviated content hash for logs.
    pub fn short_hash(&self) -> &str {
        self.hash.get(..12).unwrap_or(&self.hash)
    }
}

pub(crate) fn resolve(raw: RawWorkflow, hash: String) -> Result<WorkflowConfig, ConfigError> {
    let mode = infer_mode(&raw)?;
    let bounds = resolve_bounds(&raw, mode)?;

    let runahead = match &raw.scheduling.runahead_limit {
        Some(s) => CycleInterval::parse(s).map_err(|e| ConfigError::Interval {
            input: s.clone(),
            reason: e.to_string(),
        })?,
        None => CycleInterval::Steps(4),
    };

    let lineages = resolve_lineages(&raw.runtime)?;

    // Walk the graph blocks: collect each task's sequences (in order of
    // appearance) and instantiate edge records against them.
    let mut sequences: IndexMap<String, Vec<Sequence>> = IndexMap::new();
    let mut edges: Vec<GraphEdge> = Vec::new();
    let mut task_xtriggers: BTreeMap<String, Vec<String>> = BTreeMap::new();

    for block in &raw.scheduling.graph {
        let seq = Sequence::parse(&block.recurrence, mode, &bounds)?;

        let mut on_sequence = |name: &str| -> usize {
            let list = sequences.entry(name.to_string()).or_default();
            match list.iter().position(|s| s == &seq) {
                Some(idx) => idx,
                None => {
                    list.push(seq.clone());
                    list.len() - 1
                }
            }
        };

        for name in &block.tasks {
            on_sequence(name);
        }

        for raw_edge in &block.edges {
            let downstream_seq = on_sequence(&raw_edge.downstream);

            if let Some(label) = raw_edge.upstream.strip_prefix('@') {
                task_xtriggers
                    .entry(raw_edge.downstream.clone())
                    .or_default()
                    .push(label.to_string());
                continue;
            }

            on_sequence(&raw_edge.upstream);
            edges.push(GraphEdge {
                upstream: raw_edge.upstream.clone(),
                offset: parse_offset(raw_edge.offset.as_deref(), mode)?,
                output: raw_edge
                    .output
                    .clone()
                    .unwrap_or_else(|| cad_core::OUTPUT_SUCCEEDED.to_string()),
                downstream: raw_edge.downstream.clone(),
                sequence: downstream_seq,
                alt_group: raw_edge.alt_group,
            });
        }
    }

    // Every graph node needs a task definition.
    for name in sequences.keys() {
        if !raw.runtime.contains_key(name) {
            return Err(ConfigError::UndefinedTask(name.clone()));
        }
    }

    // Build a task definition for every graph task.
    let mut tasks: IndexMap<String, TaskDef> = IndexMap::new();
    for (name, seqs) in sequences {
        let settings = ResolvedRuntime::for_namespace(&name, &raw.runtime, &lineages);
        let mut def = TaskDef::new(name.clone(), seqs);
        def.family_lineage = lineages.get(&name).cloned().unwrap_or_default();
        def.script = settings.script.unwrap_or_default();
        def.platform = settings
            .platform
            .unwrap_or_else(|| "localhost".to_string());
        def.environment = settings.environment;
        def.custom_outputs = settings.outputs;
        def.completion = settings.completion.unwrap_or_default();
        def.retry_delays = RetryDelays {
            submission: parse_intervals(&settings.submission_retry_delays)?,
            execution: parse_intervals(&settings.execution_retry_delays)?,
        };
        def.execution_time_limit = settings
            .execution_time_limit
            .as_deref()
            .map(|s| parse_duration(s))
            .transpose()?;
        def.clock_expire = settings
            .clock_expire
            .as_deref()
            .map(|s| {
                CycleInterval::parse(s).map_err(|e| ConfigError::Interval {
                    input: s.to_string(),
                    reason: e.to_string(),
                })
            })
            .transpose()?;
        def.event_handlers = settings.events;
        if let Some(labels) = task_xtriggers.get(&name) {
            def.xtriggers = labels.clone();
        }
        tasks.insert(name, def);
    }

    let events = EventsConfig {
        abort_on_stall_timeout: raw
            .scheduler
            .events
            .abort_on_stall_timeout
            .as_deref()
            .map(parse_duration)
            .transpose()?,
        abort_on_inactivity_timeout: raw
            .scheduler
            .events
            .abort_on_inactivity_timeout
            .as_deref()
            .map(parse_duration)
            .transpose()?,
    };

    let tick_interval = raw
        .scheduler
        .tick_interval
        .as_deref()
        .map(parse_duration)
        .transpose()?
        .unwrap_or(Duration::from_secs(1));

    Ok(WorkflowConfig {
        name: raw.name.unwrap_or_else(|| "workflow".to_string()),
        mode,
        bounds,
        runahead,
        tasks,
        edges,
        platforms: raw.platforms,
        xtriggers: raw.scheduling.xtriggers,
        events,
        utc_mode: raw.scheduler.utc_mode.unwrap_or(true),
        tick_interval,
        mail_to: raw.mail.to,
        mail_from: raw.mail.from,
        lineages,
        hash,
    })
}

fn infer_mode(raw: &RawWorkflow) -> Result<CyclingMode, ConfigError> {
    if let Some(mode) = &raw.scheduling.cycling_mode {
        return match mode.as_str() {
            "integer" => Ok(CyclingMode::Integer),
            "gregorian" => Ok(CyclingMode::Gregorian),
            other => Err(ConfigError::Invalid(format!(
                "unknown cycling mode: {other}"
            ))),
        };
    }
    // No explicit mode: integer when there is no initial point or it reads
    // as a small integer, Gregorian otherwise.
    match &raw.scheduling.initial_cycle_point {
        None => Ok(CyclingMode::Integer),
        Some(icp) => {
            if icp.parse::<i64>().is_ok() && icp.trim_start_matches('-').len() < 8 {
                Ok(CyclingMode::Integer)
            } else {
                Ok(CyclingMode::Gregorian)
            }
        }
    }
}

fn resolve_bounds(raw: &RawWorkflow, mode: CyclingMode) -> Result<SequenceBounds, ConfigError> {
    let initial = match &raw.scheduling.initial_cycle_point {
        Some(s) => CyclePoint::parse(s, mode)?,
        None => match mode {
            CyclingMode::Integer => CyclePoint::integer(1),
            CyclingMode::Gregorian => {
                return Err(ConfigError::Invalid(
                    "datetime cycling requires an initial cycle point".to_string(),
                ))
            }
        },
    };
    let final_point = raw
        .scheduling
        .final_cycle_point
        .as_deref()
        .map(|s| CyclePoint::parse(s, mode))
        .transpose()?;
    Ok(SequenceBounds::new(initial, final_point))
}

fn parse_offset(offset: Option<&str>, mode: CyclingMode) -> Result<OffsetSpec, ConfigError> {
    let Some(s) = offset else {
        return Ok(OffsetSpec::Zero);
    };
    let s = s.trim();
    if s.is_empty() {
        return Ok(OffsetSpec::Zero);
    }
    if s == "^" {
        return Ok(OffsetSpec::Initial);
    }
    if s.starts_with('P') || s.starts_with("-P") || s.starts_with("+P") {
        let iv = CycleInterval::parse(s).map_err(|e| ConfigError::Interval {
            input: s.to_string(),
            reason: e.to_string(),
        })?;
        return Ok(OffsetSpec::Interval(iv));
    }
    Ok(OffsetSpec::Absolute(CyclePoint::parse(s, mode)?))
}

fn parse_intervals(inputs: &[String]) -> Result<Vec<CycleInterval>, ConfigError> {
    inputs
        .iter()
        .map(|s| {
            CycleInterval::parse(s).map_err(|e| ConfigError::Interval {
                input: s.clone(),
                reason: e.to_string(),
            })
        })
        .collect()
}

fn parse_duration(s: &str) -> Result<Duration, ConfigError> {
    CycleInterval::parse(s)
        .ok()
        .and_then(|iv| iv.to_duration())
        .ok_or_else(|| ConfigError::Interval {
            input: s.to_string(),
            reason: "expected a non-negative fixed duration".to_string(),
        })
}

/// Ancestry per namespace: nearest first, ending at `root`.
fn resolve_lineages(
    runtime: &IndexMap<String, RawRuntime>,
) -> Result<BTreeMap<String, Vec<String>>, ConfigError> {
    let mut lineages = BTreeMap::new();
    for name in runtime.keys() {
        if name == "root" {
            continue;
        }
        let mut lineage = Vec::new();
        let mut visiting = vec![name.clone()];
        collect_lineage(name, runtime, &mut lineage, &mut visiting)?;
        if lineage.last().map(String::as_str) != Some("root") {
            lineage.push("root".to_string());
        }
        lineages.insert(name.clone(), lineage);
    }
    Ok(lineages)
}

fn collect_lineage(
    name: &str,
    runtime: &IndexMap<String, RawRuntime>,
    lineage: &mut Vec<String>,
    visiting: &mut Vec<String>,
) -> Result<(), ConfigError> {
    let Some(section) = runtime.get(name) else {
        return Ok(());
    };
    for parent in &section.inherits {
        if visiting.iter().any(|n| n == parent) {
            return Err(ConfigError::InheritanceCycle(parent.clone()));
        }
        if !runtime.contains_key(parent) && parent != "root" {
            return Err(ConfigError::UnknownParent {
                child: name.to_string(),
                parent: parent.clone(),
            });
        }
        if !lineage.iter().any(|n| n == parent) {
            lineage.push(parent.clone());
        }
        visiting.push(parent.clone());
        collect_lineage(parent, runtime, lineage, visiting)?;
        visiting.pop();
    }
    Ok(())
}

/// Settings after walking the inheritance chain (self first, then
/// ancestry). Scalars take the nearest value; maps merge with nearer
/// entries winning.
#[derive(Debug, Default)]
struct ResolvedRuntime {
    script: Option<String>,
    platform: Option<String>,
    environment: BTreeMap<String, String>,
    outputs: BTreeMap<String, String>,
    completion: Option<CompletionExpr>,
    submission_retry_delays: Vec<String>,
    execution_retry_delays: Vec<String>,
    execution_time_limit: Option<String>,
    clock_expire: Option<String>,
    events: BTreeMap<String, Vec<String>>,
}

impl ResolvedRuntime {
    fn for_namespace(
        name: &str,
        runtime: &IndexMap<String, RawRuntime>,
        lineages: &BTreeMap<String, Vec<String>>,
    ) -> Self {
        let mut resolved = Self::default();
        let empty = Vec::new();
        let chain = std::iter::once(name.to_string())
            .chain(lineages.get(name).unwrap_or(&empty).iter().cloned());

        for ns in chain {
            let Some(section) = runtime.get(&ns) else {
                continue;
            };
            resolved.script = resolved.script.or_else(|| section.script.clone());
            resolved.platform = resolved.platform.or_else(|| section.platform.clone());
            resolved.completion = resolved.completion.or_else(|| section.completion.clone());
            resolved.execution_time_limit = resolved
                .execution_time_limit
                .or_else(|| section.execution_time_limit.clone());
            resolved.clock_expire = resolved
                .clock_expire
                .or_else(|| section.clock_expire.clone());
            if resolved.submission_retry_delays.is_empty() {
                resolved.submission_retry_delays = section.submission_retry_delays.clone();
            }
            if resolved.execution_retry_delays.is_empty() {
                resolved.execution_retry_delays = section.execution_retry_delays.clone();
            }
            // Farther ancestors must not override nearer keys.
            for (k, v) in &section.environment {
                resolved
                    .environment
                    .entry(k.clone())
                    .or_insert_with(|| v.clone());
            }
            for (k, v) in &section.outputs {
                resolved
                    .outputs
                    .entry(k.clone())
                    .or_insert_with(|| v.clone());
            }
            for (k, v) in &section.events {
                resolved.events.entry(k.clone()).or_insert_with(|| v.clone());
            }
        }
        resolved
    }
}

#[cfg(test)]
#[path = "resolve_tests.rs"]
mod tests;
