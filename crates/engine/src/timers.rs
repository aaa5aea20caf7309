// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Timer and scheduling management.

use cad_core::{TimerId, TimerKind};
use std::collections::HashMap;
use std::time::{Duration, Instant};

/// Timer entry
#[derive(Debug, Clone)]
struct Timer {
    fires_at: Instant,
}

/// Manages the scheduler's pending timers.
#[derive(Debug, Default)]
pub struct Timers {
    timers: HashMap<TimerId, Timer>,
}

impl Timers {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set a timer. Re-setting an id replaces its deadline.
    pub fn set(&mut self, id: TimerId, duration: Duration, now: Instant) {
        let fires_at = now + duration;
        self.timers.insert(id, Timer { fires_at });
    }

    /// Cancel a timer.
    pub fn cancel(&mut self, id: &TimerId) {
        self.timers.remove(id);
    }

    /// Cancel all timers of one kind.
    pub fn cancel_kind(&mut self, kind: TimerKind) {
        self.timers.retain(|id, _| id.kind() != kind);
    }

    /// Remove and return all timers that have fired.
    pub fn fired(&mut self, now: Instant) -> Vec<TimerId> {
        let mut fired: Vec<TimerId> = self
            .timers
            .iter()
            .filter(|(_, t)| t.fires_at <= now)
            .map(|(id, _)| id.clone())
            .collect();
        // Deterministic order for tests and logs
        fired.sort_by_key(|id| id.to_string());
        for id in &fired {
            self.timers.remove(id);
        }
        fired
    }

    /// Earliest pending deadline.
    pub fn next_deadline(&self) -> Option<Instant> {
        self.timers.values().map(|t| t.fires_at).min()
    }

    pub fn has_timers(&self) -> bool {
        !self.timers.is_empty()
    }

    /// Whether any pending timer is of the given kind.
    pub fn has_kind(&self, kind: TimerKind) -> bool {
        self.timers.keys().any(|id| id.kind() == kind)
    }
}

#[cfg(test)]
#[path = "timers_tests.rs"]
mod tests;
