// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Broadcast overlay: ordered runtime overrides keyed by
//! `(point-or-*, namespace-or-*, setting path)`.

use serde::{Deserialize, Serialize};
use std::fmt;

/// One override entry. `point` and `namespace` are `*` or literal values;
/// `namespace` may name a task or a family.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BroadcastEntry {
    pub point: String,
    pub namespace: String,
    /// Opaque setting path, e.g. `[environment]HELLO` or `platform`.
    pub setting: String,
    pub value: serde_json::Value,
    /// Monotonic arrival number, allocated by the scheduler.
    pub seq: u64,
}

/// Selector for `clear`: `None` fields match everything.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BroadcastSelector {
    pub point: Option<String>,
    pub namespace: Option<String>,
    pub setting: Option<String>,
}

impl BroadcastSelector {
    fn matches(&self, entry: &BroadcastEntry) -> bool {
        self.point.as_deref().map_or(true, |p| p == entry.point)
            && self
                .namespace
                .as_deref()
                .map_or(true, |n| n == entry.namespace)
            && self.setting.as_deref().map_or(true, |s| s == entry.setting)
    }
}

impl fmt::Display for BroadcastSelector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}/{}/{}",
            self.point.as_deref().unwrap_or("*"),
            self.namespace.as_deref().unwrap_or("*"),
            self.setting.as_deref().unwrap_or("*"),
        )
    }
}

/// In-memory overlay with the §4.5 lookup precedence. Pure data; the
/// engine mirrors mutations into the durable store.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct BroadcastOverlay {
    entries: Vec<BroadcastEntry>,
}

impl BroadcastOverlay {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert an entry. Re-setting the same `(point, namespace, setting)`
    /// replaces the old value (idempotent under repeated identical sets).
    pub fn set(&mut self, entry: BroadcastEntry) {
        self.entries.retain(|e| {
            !(e.point == entry.point
                && e.namespace == entry.namespace
                && e.setting == entry.setting)
        });
        self.entries.push(entry);
    }

    /// Remove all entries matching the selector, returning them.
    pub fn clear(&mut self, selector: &BroadcastSelector) -> Vec<BroadcastEntry> {
        let (removed, kept) = self
            .entries
            .drain(..)
            .partition(|e| selector.matches(e));
        self.entries = kept;
        removed
    }

    /// Remove entries pinned to `point`, returning them. Used as cycles
    /// pass out of the pool.
    pub fn expire_point(&mut self, point: &str) -> Vec<BroadcastEntry> {
        self.clear(&BroadcastSelector {
            point: Some(point.to_string()),
            namespace: None,
            setting: None,
        })
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn entries(&self) -> &[BroadcastEntry] {
        &self.entries
    }

    /// Effective value of `setting` for a proxy, most specific match first:
    /// `(point, name)`, `(point, family)` by lineage, `(point, *)`,
    /// `(*, name)`, `(*, family)`, `(*, *)`. Within a level the entry with
    /// the highest `seq` wins (last write).
    pub fn lookup(
        &self,
        point: &str,
        name: &str,
        lineage: &[String],
        setting: &str,
    ) -> Option<&serde_json::Value> {
        // Nearer families outrank farther ones, so each lineage entry is
        // its own precedence level.
        let mut levels: Vec<(Option<&str>, &str)> = Vec::with_capacity(2 * (lineage.len() + 2));
        for point_level in [Some(point), None] {
            levels.push((point_level, name));
            for family in lineage {
                levels.push((point_level, family));
            }
            levels.push((point_level, "*"));
        }

        for (point_level, ns_level) in levels {
            let hit = self
                .entries
                .iter()
                .filter(|e| e.setting == setting)
                .filter(|e| match point_level {
                    Some(p) => e.point == p,
                    None => e.point == "*",
                })
                .filter(|e| e.namespace == ns_level)
                .max_by_key(|e| e.seq);
            if let Some(entry) = hit {
                return Some(&entry.value);
            }
        }
        None
    }

    /// All effective `(setting, value)` pairs for a proxy, used when
    /// assembling a job context.
    pub fn effective_settings(
        &self,
        point: &str,
        name: &str,
        lineage: &[String],
    ) -> Vec<(&str, &serde_json::Value)> {
        let mut settings: Vec<&str> = self.entries.iter().map(|e| e.setting.as_str()).collect();
        settings.sort_unstable();
        settings.dedup();
        settings
            .into_iter()
            .filter_map(|s| self.lookup(point, name, lineage, s).map(|v| (s, v)))
            .collect()
    }
}

#[cfg(test)]
#[path = "broadcast_tests.rs"]
mod tests;
