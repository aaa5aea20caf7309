// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Xtrigger registry: named external trigger functions polled by the
//! main loop.

use cad_config::XtriggerSpec;
use cad_core::{CycleInterval, CyclePoint};
use std::collections::BTreeMap;
use std::time::Duration;
use tracing::warn;

/// Result of polling one xtrigger.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum XtriggerOutcome {
    Satisfied,
    Pending,
}

/// A trigger function. Implementations must be cheap and non-blocking;
/// anything slow belongs behind its own worker feeding the result in.
pub trait XtriggerFn: Send + Sync {
    fn poll(&self, point: &CyclePoint, args: &BTreeMap<String, serde_json::Value>, now_ms: u64)
        -> XtriggerOutcome;
}

/// Wall-clock trigger: satisfied once real time passes `point + offset`.
/// The built-in used by clock-gated tasks in datetime workflows.
struct WallClock;

impl XtriggerFn for WallClock {
    fn poll(
        &self,
        point: &CyclePoint,
        args: &BTreeMap<String, serde_json::Value>,
        now_ms: u64,
    ) -> XtriggerOutcome {
        let offset = args
            .get("offset")
            .and_then(|v| v.as_str())
            .and_then(|s| CycleInterval::parse(s).ok());
        let target = match (point.epoch_ms(), offset) {
            (Some(base), Some(iv)) => match point.add(&iv).ok().and_then(|p| p.epoch_ms()) {
                Some(shifted) => shifted,
                None => base,
            },
            (Some(base), None) => base,
            // Integer points have no wall-clock meaning: fire at once.
            (None, _) => 0,
        };
        if now_ms >= target {
            XtriggerOutcome::Satisfied
        } else {
            XtriggerOutcome::Pending
        }
    }
}

/// Registry of xtrigger functions and their declared bindings.
pub struct XtriggerRegistry {
    functions: BTreeMap<String, Box<dyn XtriggerFn>>,
    specs: BTreeMap<String, XtriggerSpec>,
    /// Labels already satisfied, per point string.
    satisfied: BTreeMap<(String, String), bool>,
}

impl XtriggerRegistry {
    pub fn new(specs: BTreeMap<String, XtriggerSpec>) -> Self {
        let mut functions: BTreeMap<String, Box<dyn XtriggerFn>> = BTreeMap::new();
        functions.insert("wall_clock".to_string(), Box::new(WallClock));
        Self {
            functions,
            specs,
            satisfied: BTreeMap::new(),
        }
    }

    /// Register a custom trigger function.
    pub fn register(&mut self, name: impl Into<String>, f: Box<dyn XtriggerFn>) {
        self.functions.insert(name.into(), f);
    }

    /// Replace the declared bindings (reload path).
    pub fn set_specs(&mut self, specs: BTreeMap<String, XtriggerSpec>) {
        self.specs = specs;
    }

    /// Poll interval for a label.
    pub fn poll_interval(&self, label: &str, default: Duration) -> Duration {
        self.specs
            .get(label)
            .and_then(|s| s.interval.as_deref())
            .and_then(|s| CycleInterval::parse(s).ok())
            .and_then(|iv| iv.to_duration())
            .unwrap_or(default)
    }

    /// Poll one labelled trigger at a point. Satisfied results latch.
    pub fn poll(&mut self, label: &str, point: &CyclePoint, now_ms: u64) -> XtriggerOutcome {
        let key = (label.to_string(), point.to_string());
        if self.satisfied.get(&key).copied().unwrap_or(false) {
            return XtriggerOutcome::Satisfied;
        }
        let Some(spec) = self.specs.get(label) else {
            warn!(label, "poll of undeclared xtrigger");
            return XtriggerOutcome::Pending;
        };
        let Some(function) = self.functions.get(&spec.function) else {
            warn!(label, function = %spec.function, "unknown xtrigger function");
            return XtriggerOutcome::Pending;
        };
        let outcome = function.poll(point, &spec.args, now_ms);
        if outcome == XtriggerOutcome::Satisfied {
            self.satisfied.insert(key, true);
        }
        outcome
    }
}

#[cfg(test)]
#[path = "xtrigger_tests.rs"]
mod tests;
