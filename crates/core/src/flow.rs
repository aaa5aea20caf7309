// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Flow identifiers: independent progressions through the graph.

use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;

/// The set of flows a task proxy belongs to.
///
/// An empty set marks a flow-`NONE` proxy: it runs but never spawns
/// downstream work and is exempt from the runahead window.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct FlowSet(BTreeSet<u64>);

impl FlowSet {
    pub fn none() -> Self {
        Self(BTreeSet::new())
    }

    pub fn single(flow: u64) -> Self {
        let mut set = BTreeSet::new();
        set.insert(flow);
        Self(set)
    }

    pub fn from_iter(flows: impl IntoIterator<Item = u64>) -> Self {
        Self(flows.into_iter().collect())
    }

    /// True for flow-`NONE` proxies.
    pub fn is_none(&self) -> bool {
        self.0.is_empty()
    }

    pub fn contains(&self, flow: u64) -> bool {
        self.0.contains(&flow)
    }

    /// True when the two sets share at least one flow.
    pub fn intersects(&self, other: &FlowSet) -> bool {
        self.0.iter().any(|f| other.0.contains(f))
    }

    /// Union-merge with another set. Idempotent and commutative.
    pub fn merge(&mut self, other: &FlowSet) {
        self.0.extend(other.0.iter().copied());
    }

    pub fn iter(&self) -> impl Iterator<Item = u64> + '_ {
        self.0.iter().copied()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Canonical JSON form used for the `flow_nums` store columns.
    pub fn to_json(&self) -> String {
        let nums: Vec<u64> = self.0.iter().copied().collect();
        serde_json::to_string(&nums).unwrap_or_else(|_| "[]".to_string())
    }

    pub fn from_json(s: &str) -> Option<Self> {
        let nums: Vec<u64> = serde_json::from_str(s).ok()?;
        Some(Self::from_iter(nums))
    }
}

impl fmt::Display for FlowSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.0.is_empty() {
            return write!(f, "none");
        }
        let mut first = true;
        for flow in &self.0 {
            if !first {
                write!(f, ",")?;
            }
            write!(f, "{}", flow)?;
            first = false;
        }
        Ok(())
    }
}

#[cfg(test)]
#[path = "flow_tests.rs"]
mod tests;
