// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! The task pool: live proxies, spawn-on-demand, runahead enforcement,
//! flow merging, and pruning.

use cad_config::WorkflowConfig;
use cad_core::prereq::{materialise, PrereqAtom, PrereqExpression};
use cad_core::{CycleInterval, CyclePoint, FlowSet, OffsetSpec, TaskKey, TaskProxy, TaskState};
use std::collections::{BTreeMap, HashMap};
use tracing::{debug, warn};

/// Result of a spawn request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SpawnOutcome {
    Created,
    /// A live proxy already existed; flow sets were merged.
    Merged,
}

/// The live proxy set and its spawning state.
///
/// Owned by the main loop; nothing here is shared or locked.
#[derive(Debug, Default)]
pub struct TaskPool {
    proxies: BTreeMap<TaskKey, TaskProxy>,
    /// Outputs produced so far, with the flows that produced them.
    completed: HashMap<PrereqAtom, FlowSet>,
    /// Next head-spawn candidate point per task.
    frontier: HashMap<String, CyclePoint>,
    /// Current runahead ceiling; points beyond it wait as `is_runahead`.
    limit_point: Option<CyclePoint>,
    /// Highest submit number ever used per instance, so re-spawned
    /// proxies (new flows, restarts) continue the monotonic sequence.
    submit_base: HashMap<TaskKey, u32>,
}

impl TaskPool {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.proxies.len()
    }

    pub fn is_empty(&self) -> bool {
        self.proxies.is_empty()
    }

    pub fn get(&self, key: &TaskKey) -> Option<&TaskProxy> {
        self.proxies.get(key)
    }

    pub fn get_mut(&mut self, key: &TaskKey) -> Option<&mut TaskProxy> {
        self.proxies.get_mut(key)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&TaskKey, &TaskProxy)> {
        self.proxies.iter()
    }

    pub fn iter_mut(&mut self) -> impl Iterator<Item = (&TaskKey, &mut TaskProxy)> {
        self.proxies.iter_mut()
    }

    pub fn keys(&self) -> Vec<TaskKey> {
        self.proxies.keys().cloned().collect()
    }

    pub fn limit_point(&self) -> Option<&CyclePoint> {
        self.limit_point.as_ref()
    }

    /// Insert a recovered proxy verbatim (restart path).
    pub fn insert_recovered(&mut self, proxy: TaskProxy) {
        self.proxies.insert(proxy.key.clone(), proxy);
    }

    /// Record the highest known submit number for an instance (restart
    /// path and ongoing submissions).
    pub fn note_submit_num(&mut self, key: &TaskKey, submit_num: u32) {
        let entry = self.submit_base.entry(key.clone()).or_insert(0);
        if submit_num > *entry {
            *entry = submit_num;
        }
    }

    /// Register an already-produced output without touching proxies
    /// (restart path).
    pub fn register_completed(&mut self, atom: PrereqAtom, flows: FlowSet) {
        self.completed
            .entry(atom)
            .and_modify(|f| f.merge(&flows))
            .or_insert(flows);
    }

    /// Advance a task's head-spawn frontier past `point` (restart path,
    /// so finished cycles are not respawned).
    pub fn advance_frontier_past(&mut self, config: &WorkflowConfig, name: &str, point: &CyclePoint) {
        let Some(def) = config.task(name) else {
            return;
        };
        let next = def.next_point(point);
        match (self.frontier.get(name), next) {
            (_, None) => {
                // Past the end of the task's sequences
                self.frontier.remove(name);
                self.frontier.insert(name.to_string(), *point);
            }
            (Some(current), Some(next)) if *current > next => {}
            (_, Some(next)) => {
                self.frontier.insert(name.to_string(), next);
            }
        }
    }

    /// Create a proxy for `(name, point)` in the given flows, or merge
    /// into a live one. Returns `None` for unknown tasks or off-sequence
    /// points.
    pub fn spawn(
        &mut self,
        config: &WorkflowConfig,
        name: &str,
        point: &CyclePoint,
        flows: FlowSet,
        now_ms: u64,
    ) -> Option<(SpawnOutcome, &mut TaskProxy)> {
        let def = config.task(name)?;
        if !def.is_valid_point(point) {
            debug!(task = name, point = %point, "refusing spawn at off-sequence point");
            return None;
        }

        let key = TaskKey::new(*point, name);
        if let Some(existing) = self.proxies.get(&key) {
            // Flow merge: union flows and satisfied prerequisites.
            let mut union = existing.flows.clone();
            union.merge(&flows);
            let satisfiable = self.satisfiable_atoms(&union);
            let proxy = self.proxies.get_mut(&key)?;
            proxy.flows = union;
            for atom in satisfiable {
                if proxy.prereqs.references(&atom) {
                    proxy.satisfy(atom);
                }
            }
            return Some((SpawnOutcome::Merged, proxy));
        }

        let expr = materialise(def, point, &config.edges, &config.bounds);
        let mut proxy = TaskProxy::new(key.clone(), flows, expr, now_ms);
        proxy.submit_num = self.submit_base.get(&key).copied().unwrap_or(0);
        proxy.is_runahead = self
            .limit_point
            .map_or(false, |limit| *point > limit);

        // Pre-satisfy from outputs already produced in intersecting flows.
        for atom in self.satisfiable_atoms(&proxy.flows) {
            if proxy.prereqs.references(&atom) {
                proxy.satisfy(atom);
            }
        }

        debug!(task = %key, flows = %proxy.flows, "spawned");
        self.proxies.insert(key.clone(), proxy);
        self.proxies.get_mut(&key).map(|p| (SpawnOutcome::Created, p))
    }

    /// Atoms from the completed registry visible to `flows`. Xtrigger
    /// atoms are flow-agnostic.
    fn satisfiable_atoms(&self, flows: &FlowSet) -> Vec<PrereqAtom> {
        self.completed
            .iter()
            .filter(|(atom, produced_by)| {
                atom.task == "xtrigger" || produced_by.intersects(flows)
            })
            .map(|(atom, _)| atom.clone())
            .collect()
    }

    fn expression_satisfied(&self, expr: &PrereqExpression, flows: &FlowSet) -> bool {
        let visible: std::collections::BTreeSet<PrereqAtom> = self
            .satisfiable_atoms(flows)
            .into_iter()
            .filter(|a| expr.references(a))
            .collect();
        expr.evaluate(&visible).satisfied
    }

    /// Record a produced output: update interested live proxies and spawn
    /// downstream children on demand. Returns keys of proxies spawned.
    pub fn record_output(
        &mut self,
        config: &WorkflowConfig,
        name: &str,
        point: &CyclePoint,
        label: &str,
        flows: &FlowSet,
        now_ms: u64,
    ) -> Vec<TaskKey> {
        let atom = PrereqAtom::new(name, *point, label);
        self.register_completed(atom.clone(), flows.clone());

        // Update live proxies whose expressions reference this atom.
        for proxy in self.proxies.values_mut() {
            if proxy.prereqs.references(&atom)
                && (atom.task == "xtrigger" || proxy.flows.intersects(flows))
            {
                proxy.satisfy(atom.clone());
            }
        }

        // Flow-NONE proxies never spawn downstream.
        if flows.is_none() {
            return Vec::new();
        }

        let mut spawned = Vec::new();
        let edges: Vec<_> = config
            .edges
            .iter()
            .filter(|e| e.upstream == name && e.output == label)
            .cloned()
            .collect();

        for edge in edges {
            let child_points: Vec<CyclePoint> = match &edge.offset {
                OffsetSpec::Zero => vec![*point],
                OffsetSpec::Interval(iv) => match point.add(&iv.negated()) {
                    Ok(p) => vec![p],
                    Err(_) => Vec::new(),
                },
                OffsetSpec::Absolute(anchor) => {
                    if point == anchor {
                        self.anchored_child_points(config, &edge.downstream)
                    } else {
                        Vec::new()
                    }
                }
                OffsetSpec::Initial => {
                    if *point == config.bounds.initial {
                        self.anchored_child_points(config, &edge.downstream)
                    } else {
                        Vec::new()
                    }
                }
            };

            for child_point in child_points {
                if !config.bounds.contains(&child_point) {
                    continue;
                }
                let valid = config
                    .task(&edge.downstream)
                    .map_or(false, |d| d.is_valid_point(&child_point));
                if !valid {
                    continue;
                }
                if let Some((outcome, proxy)) =
                    self.spawn(config, &edge.downstream, &child_point, flows.clone(), now_ms)
                {
                    if outcome == SpawnOutcome::Created {
                        spawned.push(proxy.key.clone());
                    }
                }
            }
        }
        spawned
    }

    /// Satisfy an xtrigger atom for every proxy waiting on it at `point`.
    pub fn satisfy_xtrigger(&mut self, label: &str, point: &CyclePoint) {
        let atom = PrereqAtom::new("xtrigger", *point, label);
        self.register_completed(atom.clone(), FlowSet::none());
        for proxy in self.proxies.values_mut() {
            if proxy.prereqs.references(&atom) {
                proxy.satisfy(atom.clone());
            }
        }
    }

    /// All points of `name`'s sequences within the current runahead
    /// window, for absolute-anchored edges.
    fn anchored_child_points(&self, config: &WorkflowConfig, name: &str) -> Vec<CyclePoint> {
        let Some(def) = config.task(name) else {
            return Vec::new();
        };
        let mut points = Vec::new();
        let mut p = def.first_point();
        while let Some(point) = p {
            if let Some(limit) = &self.limit_point {
                if point > *limit {
                    break;
                }
            }
            points.push(point);
            p = def.next_point(&point);
            if points.len() > 10_000 {
                warn!(task = name, "anchored spawn truncated at 10000 points");
                break;
            }
        }
        points
    }

    /// Recompute the runahead window, release proxies that fall inside
    /// it, and head-spawn tasks whose prerequisites need no upstream
    /// within the window. Returns newly spawned keys.
    pub fn release_runahead(
        &mut self,
        config: &WorkflowConfig,
        active_flows: &FlowSet,
        now_ms: u64,
    ) -> Vec<TaskKey> {
        let base = self.runahead_base(config);
        self.limit_point = base.map(|b| Self::limit_from(config, &b));

        if let Some(limit) = self.limit_point {
            for proxy in self.proxies.values_mut() {
                // Flow-NONE proxies are exempt from the window.
                proxy.is_runahead = !proxy.flows.is_none() && *proxy.point() > limit;
            }
        }

        let mut spawned = Vec::new();
        let Some(limit) = self.limit_point else {
            return spawned;
        };

        for name in config.tasks.keys().cloned().collect::<Vec<_>>() {
            let Some(def) = config.task(&name) else {
                continue;
            };
            let mut frontier = match self.frontier.get(&name) {
                Some(p) => *p,
                None => match def.first_point() {
                    Some(p) => p,
                    None => continue,
                },
            };

            loop {
                if frontier > limit {
                    break;
                }
                let key = TaskKey::new(frontier, name.as_str());
                if self.proxies.contains_key(&key) || self.point_is_done(&name, &frontier) {
                    match def.next_point(&frontier) {
                        Some(next) => {
                            frontier = next;
                            continue;
                        }
                        None => break,
                    }
                }

                let expr = materialise(def, &frontier, &config.edges, &config.bounds);
                let spawnable =
                    expr.is_trivial() || self.expression_satisfied(&expr, active_flows);
                if !spawnable {
                    break;
                }
                if let Some((outcome, proxy)) =
                    self.spawn(config, &name, &frontier, active_flows.clone(), now_ms)
                {
                    if outcome == SpawnOutcome::Created {
                        spawned.push(proxy.key.clone());
                    }
                }
                match def.next_point(&frontier) {
                    Some(next) => frontier = next,
                    None => break,
                }
            }
            self.frontier.insert(name.clone(), frontier);
        }
        spawned
    }

    /// A point is done for head-spawning purposes when its succeeded
    /// output is already in the completed registry.
    fn point_is_done(&self, name: &str, point: &CyclePoint) -> bool {
        let atom = PrereqAtom::new(name, *point, cad_core::OUTPUT_SUCCEEDED);
        self.completed.contains_key(&atom)
    }

    /// Base point of the runahead window: the oldest point with an
    /// incomplete proxy, else the oldest head-spawn frontier.
    fn runahead_base(&self, config: &WorkflowConfig) -> Option<CyclePoint> {
        let live_min = self
            .proxies
            .values()
            .filter(|p| !p.flows.is_none())
            .map(|p| *p.point())
            .min();
        if live_min.is_some() {
            return live_min;
        }
        let frontier_min = self.frontier.values().min().copied();
        frontier_min.or(Some(config.bounds.initial))
    }

    fn limit_from(config: &WorkflowConfig, base: &CyclePoint) -> CyclePoint {
        match &config.runahead {
            CycleInterval::Steps(n) => {
                // Count limit: n cycles beyond the base, stepping along
                // the union of task sequences.
                let mut point = *base;
                for _ in 0..*n.max(&0) {
                    let next = config
                        .tasks
                        .values()
                        .filter_map(|def| def.next_point(&point))
                        .min();
                    match next {
                        Some(p) => point = p,
                        None => break,
                    }
                }
                point
            }
            interval => base.add(interval).unwrap_or(*base),
        }
    }

    /// Waiting proxies clear to enter `preparing`.
    pub fn ready_tasks(&self, now_ms: u64, paused: bool) -> Vec<TaskKey> {
        if paused {
            return Vec::new();
        }
        self.proxies
            .values()
            .filter(|p| p.state == TaskState::Waiting)
            .filter(|p| !p.is_held)
            .filter(|p| !p.is_runahead || p.is_manual_submit)
            .filter(|p| p.retry_at_ms.map_or(true, |at| now_ms >= at))
            .filter(|p| p.is_manual_submit || p.prereqs_satisfied())
            .map(|p| p.key.clone())
            .collect()
    }

    /// Remove proxies that are finished with: terminal and either
    /// complete (per the definition's completion expression) or expired.
    /// Incomplete failures stay to keep the stall visible. Returns the
    /// pruned proxies.
    pub fn prune(&mut self, config: &WorkflowConfig) -> Vec<TaskProxy> {
        let prunable: Vec<TaskKey> = self
            .proxies
            .values()
            .filter(|p| p.is_terminal())
            .filter(|p| {
                if p.state == TaskState::Expired {
                    return true;
                }
                match config.task(p.name()) {
                    Some(def) => p.is_complete(&def.completion),
                    None => true,
                }
            })
            .map(|p| p.key.clone())
            .collect();

        let mut removed = Vec::with_capacity(prunable.len());
        for key in &prunable {
            if let Some(proxy) = self.proxies.remove(key) {
                debug!(task = %key, "pruned");
                self.note_submit_num(key, proxy.submit_num);
                removed.push(proxy);
            }
        }
        removed
    }

    /// Remove a proxy outright (the `remove` command).
    pub fn remove(&mut self, key: &TaskKey) -> Option<TaskProxy> {
        let proxy = self.proxies.remove(key);
        if let Some(p) = &proxy {
            self.note_submit_num(key, p.submit_num);
        }
        proxy
    }

    /// Any proxy with work in flight?
    pub fn has_active(&self) -> bool {
        self.proxies.values().any(|p| p.is_active())
    }

    /// Proxies that are neither terminal-complete nor in flight:
    /// the potential stall set.
    pub fn incomplete(&self, config: &WorkflowConfig) -> Vec<TaskKey> {
        self.proxies
            .values()
            .filter(|p| {
                if p.is_active() {
                    return false;
                }
                if p.is_terminal() {
                    match config.task(p.name()) {
                        Some(def) => !p.is_complete(&def.completion),
                        None => false,
                    }
                } else {
                    true
                }
            })
            .map(|p| p.key.clone())
            .collect()
    }

    /// `(min, max)` points over live, non-runahead proxies, for the
    /// runahead invariant.
    pub fn active_span(&self) -> Option<(CyclePoint, CyclePoint)> {
        let points: Vec<CyclePoint> = self
            .proxies
            .values()
            .filter(|p| !p.is_runahead && !p.flows.is_none())
            .map(|p| *p.point())
            .collect();
        let min = points.iter().min()?;
        let max = points.iter().max()?;
        Some((*min, *max))
    }
}

#[cfg(test)]
#[path = "pool_tests.rs"]
mod tests;
