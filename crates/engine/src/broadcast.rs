// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Broadcast manager: couples the in-memory overlay to the durable
//! `broadcast_states` mirror and the `broadcast_events` log.

use cad_core::{BroadcastEntry, BroadcastOverlay, BroadcastSelector};
use cad_store::{format_time, BroadcastEventRow, PendingWrite, WorkflowStore};
use std::collections::BTreeMap;

/// In-memory overlay plus persistence. Mutations go through here so the
/// store mirror can never drift from the tree.
#[derive(Debug, Default)]
pub struct BroadcastManager {
    overlay: BroadcastOverlay,
    next_seq: u64,
}

impl BroadcastManager {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn overlay(&self) -> &BroadcastOverlay {
        &self.overlay
    }

    /// Apply a `broadcast set`, mirroring to the store. Returns the
    /// allocated sequence number.
    pub fn set(
        &mut self,
        store: &mut WorkflowStore,
        point: &str,
        namespace: &str,
        setting: &str,
        value: serde_json::Value,
        now_ms: u64,
    ) -> u64 {
        self.next_seq += 1;
        let seq = self.next_seq;
        let value_text = value.to_string();

        self.overlay.set(BroadcastEntry {
            point: point.to_string(),
            namespace: namespace.to_string(),
            setting: setting.to_string(),
            value,
            seq,
        });

        store.push(PendingWrite::UpsertBroadcastState {
            point: point.to_string(),
            namespace: namespace.to_string(),
            key: setting.to_string(),
            value: value_text.clone(),
        });
        store.push(PendingWrite::InsertBroadcastEvent(BroadcastEventRow {
            time: format_time(now_ms),
            change: "+".to_string(),
            point: point.to_string(),
            namespace: namespace.to_string(),
            key: setting.to_string(),
            value: value_text,
        }));
        seq
    }

    /// Apply a `broadcast clear`. Returns the number of entries removed.
    pub fn clear(
        &mut self,
        store: &mut WorkflowStore,
        selector: &BroadcastSelector,
        now_ms: u64,
    ) -> usize {
        let removed = self.overlay.clear(selector);
        for entry in &removed {
            Self::push_removal(store, entry, now_ms);
        }
        removed.len()
    }

    /// Drop entries pinned to a point that has left the pool.
    pub fn expire_point(&mut self, store: &mut WorkflowStore, point: &str, now_ms: u64) -> usize {
        let removed = self.overlay.expire_point(point);
        for entry in &removed {
            Self::push_removal(store, entry, now_ms);
        }
        removed.len()
    }

    fn push_removal(store: &mut WorkflowStore, entry: &BroadcastEntry, now_ms: u64) {
        store.push(PendingWrite::DeleteBroadcastState {
            point: entry.point.clone(),
            namespace: entry.namespace.clone(),
            key: entry.setting.clone(),
        });
        store.push(PendingWrite::InsertBroadcastEvent(BroadcastEventRow {
            time: format_time(now_ms),
            change: "-".to_string(),
            point: entry.point.clone(),
            namespace: entry.namespace.clone(),
            key: entry.setting.clone(),
            value: entry.value.to_string(),
        }));
    }

    /// Rebuild the overlay from the persisted mirror (restart path).
    pub fn recover(&mut self, store: &WorkflowStore) -> Result<(), cad_store::StoreError> {
        let rows = store.load_broadcast_states()?;
        let mut seq = 0u64;
        for row in rows {
            seq += 1;
            let value = serde_json::from_str(&row.value)
                .unwrap_or(serde_json::Value::String(row.value.clone()));
            self.overlay.set(BroadcastEntry {
                point: row.point,
                namespace: row.namespace,
                setting: row.key,
                value,
                seq,
            });
        }
        self.next_seq = seq;
        Ok(())
    }

    /// Effective environment overrides (`[environment]KEY` settings) for
    /// a proxy, merged over the definition environment by the caller.
    pub fn environment_overrides(
        &self,
        point: &str,
        name: &str,
        lineage: &[String],
    ) -> BTreeMap<String, String> {
        let mut env = BTreeMap::new();
        for (setting, value) in self.overlay.effective_settings(point, name, lineage) {
            if let Some(key) = setting
                .strip_prefix("[environment]")
                .filter(|k| !k.is_empty())
            {
                let text = match value {
                    serde_json::Value::String(s) => s.clone(),
                    other => other.to_string(),
                };
                env.insert(key.to_string(), text);
            }
        }
        env
    }

    /// Scalar setting override (e.g. `platform`, `script`) for a proxy.
    pub fn scalar_override(
        &self,
        point: &str,
        name: &str,
        lineage: &[String],
        setting: &str,
    ) -> Option<String> {
        self.overlay
            .lookup(point, name, lineage, setting)
            .map(|v| match v {
                serde_json::Value::String(s) => s.clone(),
                other => other.to_string(),
            })
    }
}

#[cfg(test)]
#[path = "broadcast_tests.rs"]
mod tests;
