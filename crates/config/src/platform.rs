// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Per-platform dispatch configuration.

use cad_core::CycleInterval;
use serde::{Deserialize, Serialize};
use std::time::Duration;

fn default_max_concurrent_submits() -> usize {
    5
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct PlatformConfig {
    /// Runner implementation name (`background`, `fake`, ...).
    #[serde(default = "default_runner")]
    pub runner: String,
    #[serde(default = "default_max_concurrent_submits")]
    pub max_concurrent_submits: usize,
    /// Poll cadence while a job is submitted but not yet started.
    #[serde(default)]
    pub submission_polling_intervals: Vec<CycleInterval>,
    /// Poll cadence while a job is running.
    #[serde(default)]
    pub execution_polling_intervals: Vec<CycleInterval>,
    /// Poll cadence once wall time exceeds the task's execution time limit.
    #[serde(default)]
    pub execution_time_limit_polling_intervals: Vec<CycleInterval>,
}

fn default_runner() -> String {
    "background".to_string()
}

impl Default for PlatformConfig {
    fn default() -> Self {
        Self {
            runner: default_runner(),
            max_concurrent_submits: default_max_concurrent_submits(),
            submission_polling_intervals: Vec::new(),
            execution_polling_intervals: Vec::new(),
            execution_time_limit_polling_intervals: Vec::new(),
        }
    }
}

impl PlatformConfig {
    /// Nth interval of a schedule; the last interval repeats. Falls back
    /// to `default` when the schedule is empty.
    fn schedule_interval(schedule: &[CycleInterval], n: usize, default: Duration) -> Duration {
        let idx = n.min(schedule.len().saturating_sub(1));
        schedule
            .get(idx)
            .and_then(|iv| iv.to_duration())
            .unwrap_or(default)
    }

    pub fn submission_poll_interval(&self, n: usize) -> Duration {
        Self::schedule_interval(
            &self.submission_polling_intervals,
            n,
            Duration::from_secs(60),
        )
    }

    pub fn execution_poll_interval(&self, n: usize) -> Duration {
        Self::schedule_interval(
            &self.execution_polling_intervals,
            n,
            Duration::from_secs(60),
        )
    }

    pub fn time_limit_poll_interval(&self, n: usize) -> Duration {
        Self::schedule_interval(
            &self.execution_time_limit_polling_intervals,
            n,
            Duration::from_secs(30),
        )
    }
}

#[cfg(test)]
#[path = "platform_tests.rs"]
mod tests;
