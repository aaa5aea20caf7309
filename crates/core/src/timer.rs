// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Timer identities for scheduled wake-ups.
//!
//! Every timer the scheduler arms is one of a small set of kinds: retry
//! release, job polling, clock-expiry, xtrigger polling, and the
//! workflow-level stall/inactivity watchdogs. The identity carries the
//! task or trigger it belongs to, so firing needs no string parsing.

use crate::point::CyclePoint;
use crate::task::TaskKey;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Broad class of a timer, for bulk queries and cancellation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimerKind {
    Retry,
    Poll,
    Expire,
    Xtrigger,
    Stall,
    Inactivity,
}

/// Identity of one scheduled wake-up.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "timer", rename_all = "kebab-case")]
pub enum TimerId {
    /// Releases a task from a retry delay.
    Retry { task: TaskKey },
    /// Drives the polling schedule for one submit attempt.
    Poll { task: TaskKey, submit_num: u32 },
    /// Expires a task whose clock-expire trigger passed unsubmitted.
    Expire { task: TaskKey },
    /// Periodic poll of an external trigger at a point.
    Xtrigger { label: String, point: CyclePoint },
    /// Workflow stall watchdog.
    Stall,
    /// Workflow inactivity watchdog.
    Inactivity,
}

impl TimerId {
    pub fn retry(point: &CyclePoint, name: &str) -> Self {
        TimerId::Retry {
            task: TaskKey::new(*point, name),
        }
    }

    pub fn poll(point: &CyclePoint, name: &str, submit_num: u32) -> Self {
        TimerId::Poll {
            task: TaskKey::new(*point, name),
            submit_num,
        }
    }

    pub fn expire(point: &CyclePoint, name: &str) -> Self {
        TimerId::Expire {
            task: TaskKey::new(*point, name),
        }
    }

    pub fn xtrigger(label: &str, point: &CyclePoint) -> Self {
        TimerId::Xtrigger {
            label: label.to_string(),
            point: *point,
        }
    }

    pub fn stall() -> Self {
        TimerId::Stall
    }

    pub fn inactivity() -> Self {
        TimerId::Inactivity
    }

    pub fn kind(&self) -> TimerKind {
        match self {
            TimerId::Retry { .. } => TimerKind::Retry,
            TimerId::Poll { .. } => TimerKind::Poll,
            TimerId::Expire { .. } => TimerKind::Expire,
            TimerId::Xtrigger { .. } => TimerKind::Xtrigger,
            TimerId::Stall => TimerKind::Stall,
            TimerId::Inactivity => TimerKind::Inactivity,
        }
    }

    /// The task instance this timer belongs to, for task-scoped kinds.
    pub fn task(&self) -> Option<&TaskKey> {
        match self {
            TimerId::Retry { task } | TimerId::Poll { task, .. } | TimerId::Expire { task } => {
                Some(task)
            }
            _ => None,
        }
    }
}

impl fmt::Display for TimerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TimerId::Retry { task } => write!(f, "retry:{}", task),
            TimerId::Poll { task, submit_num } => {
                write!(f, "poll:{}/{:02}", task, submit_num)
            }
            TimerId::Expire { task } => write!(f, "expire:{}", task),
            TimerId::Xtrigger { label, point } => write!(f, "xtrigger:{}:{}", label, point),
            TimerId::Stall => write!(f, "stall"),
            TimerId::Inactivity => write!(f, "inactivity"),
        }
    }
}

#[cfg(test)]
#[path = "timer_tests.rs"]
mod tests;
