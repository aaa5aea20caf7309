// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Command application: every external mutation, applied atomically with
//! respect to the pool, in arrival order.

use crate::scheduler::Scheduler;
use cad_core::{
    is_lifecycle_output, Clock, Command, CommandError, CommandOutcome, FlowSet, FlowSpec,
    StopMode, TaskKey, TaskMatcher, TaskState,
};
use cad_platforms::JobRunner;
use cad_store::PendingWrite;
use tracing::{info, warn};

impl<R: JobRunner, C: Clock> Scheduler<R, C> {
    pub(crate) fn apply_command(
        &mut self,
        command: Command,
    ) -> Result<CommandOutcome, CommandError> {
        info!(command = command.name(), "applying command");
        match command {
            Command::Hold { matcher } => self.cmd_hold(&matcher, true),
            Command::Release { matcher } => self.cmd_hold(&matcher, false),
            Command::Trigger {
                matcher,
                flow,
                wait,
            } => self.cmd_trigger(&matcher, flow, wait),
            Command::SetOutputs { matcher, labels } => self.cmd_set_outputs(&matcher, &labels),
            Command::Remove { matcher } => self.cmd_remove(&matcher),
            Command::Pause => {
                self.set_paused(true);
                Ok(CommandOutcome::touched(0))
            }
            Command::Resume => {
                self.set_paused(false);
                Ok(CommandOutcome::touched(0))
            }
            Command::Stop { mode } => self.cmd_stop(mode),
            Command::Reload => self.cmd_reload(),
            Command::BroadcastSet {
                point,
                namespace,
                setting,
                value,
            } => {
                let now_ms = self.clock.epoch_ms();
                self.broadcast
                    .set(&mut self.store, &point, &namespace, &setting, value, now_ms);
                Ok(CommandOutcome::touched(1))
            }
            Command::BroadcastClear { selector } => {
                let now_ms = self.clock.epoch_ms();
                let removed = self.broadcast.clear(&mut self.store, &selector, now_ms);
                Ok(CommandOutcome::touched(removed))
            }
            Command::Poll { matcher } => self.cmd_poll(&matcher),
            Command::Kill { matcher } => self.cmd_kill(&matcher),
        }
    }

    fn matching_keys(&self, matcher: &TaskMatcher) -> Vec<TaskKey> {
        self.pool
            .iter()
            .filter(|(key, _)| {
                let lineage = self.config.lineage(&key.name);
                matcher.matches(&key.point.to_string(), &key.name, lineage)
            })
            .map(|(key, _)| key.clone())
            .collect()
    }

    fn cmd_hold(&mut self, matcher: &TaskMatcher, held: bool) -> Result<CommandOutcome, CommandError> {
        matcher.validate()?;
        let keys = self.matching_keys(matcher);
        if keys.is_empty() {
            return Err(CommandError::NoMatch(matcher.to_string()));
        }
        let mut touched = 0;
        for key in keys {
            if let Some(proxy) = self.pool.get_mut(&key) {
                // Repeated hold on a held proxy is a no-op.
                if proxy.is_held != held {
                    proxy.is_held = held;
                    touched += 1;
                    self.persist_proxy(&key);
                    self.record_task_event(&key, if held { "held" } else { "released" }, "");
                }
            }
        }
        Ok(CommandOutcome::touched(touched))
    }

    fn cmd_trigger(
        &mut self,
        matcher: &TaskMatcher,
        flow: FlowSpec,
        wait: bool,
    ) -> Result<CommandOutcome, CommandError> {
        matcher.validate()?;
        let mut keys = self.matching_keys(matcher);

        // A new flow id is allocated once per trigger, not per target.
        let new_flow: Option<FlowSet> = match flow {
            FlowSpec::New => Some(self.resolve_flow_spec(&FlowSpec::New, None)?),
            _ => None,
        };

        // No live match: a literal selector may spawn the instance.
        if keys.is_empty() {
            let key = self.literal_key(matcher)?;
            let flows = match &new_flow {
                Some(f) => f.clone(),
                None => self.resolve_flow_spec(&flow, None)?,
            };
            let now_ms = self.clock.epoch_ms();
            if self
                .pool
                .spawn(&self.config, &key.name, &key.point, flows, now_ms)
                .is_none()
            {
                return Err(CommandError::NoMatch(matcher.to_string()));
            }
            self.after_spawn(&key);
            keys.push(key);
        }

        for key in &keys {
            let Some(proxy) = self.pool.get(key) else {
                continue;
            };
            if proxy.is_active() {
                return Err(CommandError::AlreadyActive(key.to_string()));
            }
        }

        let touched = keys.len();
        for key in keys {
            let flows = match &new_flow {
                Some(f) => f.clone(),
                None => {
                    let current = self.pool.get(&key).map(|p| p.flows.clone());
                    self.resolve_flow_spec(&flow, current)?
                }
            };
            let Some(proxy) = self.pool.get_mut(&key) else {
                continue;
            };

            // Re-run a finished (or incomplete-failed) instance afresh:
            // lifecycle outputs reset, custom outputs stand.
            if proxy.is_terminal() {
                proxy.force_state(TaskState::Waiting);
                proxy.outputs.retain(|label| !is_lifecycle_output(label));
                proxy.error = None;
                proxy.job_id = None;
            }
            proxy.flows = flows;
            proxy.flow_wait = wait;
            proxy.is_manual_submit = true;
            proxy.retry_at_ms = None;

            self.persist_proxy(&key);
            self.record_task_event(&key, "triggered", "");
        }
        self.note_activity();
        Ok(CommandOutcome::touched(touched))
    }

    /// Resolve a flow spec against a proxy's current flows.
    fn resolve_flow_spec(
        &mut self,
        spec: &FlowSpec,
        current: Option<FlowSet>,
    ) -> Result<FlowSet, CommandError> {
        match spec {
            FlowSpec::Same => Ok(current.unwrap_or_else(|| self.active_flows.clone())),
            FlowSpec::None => Ok(FlowSet::none()),
            FlowSpec::New => {
                self.next_flow += 1;
                let id = self.next_flow;
                self.store.push(PendingWrite::SetParam {
                    key: "flow_counter".to_string(),
                    value: id.to_string(),
                });
                info!(flow = id, "new flow started");
                Ok(FlowSet::single(id))
            }
            FlowSpec::Ids(ids) => {
                for id in ids {
                    if *id > self.next_flow {
                        return Err(CommandError::UnknownFlow(*id));
                    }
                }
                Ok(FlowSet::from_iter(ids.iter().copied()))
            }
        }
    }

    /// A matcher with no glob characters names one concrete instance.
    fn literal_key(&self, matcher: &TaskMatcher) -> Result<TaskKey, CommandError> {
        let is_literal = |s: &str| !s.contains(['*', '?', '[']);
        let Some(point_str) = matcher.point.as_deref() else {
            return Err(CommandError::NoMatch(matcher.to_string()));
        };
        if !is_literal(point_str) || !is_literal(&matcher.name) {
            return Err(CommandError::NoMatch(matcher.to_string()));
        }
        let point = cad_core::CyclePoint::parse(point_str, self.config.mode)
            .map_err(|_| CommandError::InvalidSelector(point_str.to_string()))?;
        if self.config.task(&matcher.name).is_none() {
            return Err(CommandError::NoMatch(matcher.to_string()));
        }
        Ok(TaskKey::new(point, matcher.name.clone()))
    }

    fn cmd_set_outputs(
        &mut self,
        matcher: &TaskMatcher,
        labels: &[String],
    ) -> Result<CommandOutcome, CommandError> {
        matcher.validate()?;
        let keys = self.matching_keys(matcher);
        if keys.is_empty() {
            return Err(CommandError::NoMatch(matcher.to_string()));
        }
        for key in &keys {
            for label in labels {
                self.record_output(key, label, true);
                // Forcing a lifecycle outcome also moves the state.
                if label.as_str() == cad_core::OUTPUT_SUCCEEDED {
                    if let Some(proxy) = self.pool.get_mut(key) {
                        proxy.force_state(TaskState::Succeeded);
                    }
                } else if label.as_str() == cad_core::OUTPUT_FAILED {
                    if let Some(proxy) = self.pool.get_mut(key) {
                        proxy.force_state(TaskState::Failed);
                    }
                }
                self.record_task_event(key, "output forced", label);
            }
            self.persist_proxy(key);
        }
        self.note_activity();
        Ok(CommandOutcome::touched(keys.len()))
    }

    fn cmd_remove(&mut self, matcher: &TaskMatcher) -> Result<CommandOutcome, CommandError> {
        matcher.validate()?;
        let keys = self.matching_keys(matcher);
        if keys.is_empty() {
            return Err(CommandError::NoMatch(matcher.to_string()));
        }
        let mut touched = 0;
        for key in keys {
            if let Some(proxy) = self.pool.remove(&key) {
                touched += 1;
                self.store.push(PendingWrite::DeleteTaskPool {
                    cycle: key.point.to_string(),
                    name: key.name.clone(),
                    flow_nums: proxy.flows.to_json(),
                });
                self.record_task_event(&key, "removed", "");
            }
        }
        Ok(CommandOutcome::touched(touched))
    }

    fn set_paused(&mut self, paused: bool) {
        if self.paused != paused {
            self.paused = paused;
            info!(paused, "pause state changed");
        }
        self.store.push(PendingWrite::SetParam {
            key: "paused".to_string(),
            value: if paused { "1" } else { "0" }.to_string(),
        });
    }

    fn cmd_stop(&mut self, mode: StopMode) -> Result<CommandOutcome, CommandError> {
        info!(mode = ?mode, "stop requested");
        self.stop = Some(mode);
        if mode == StopMode::Kill {
            let refs: Vec<_> = self.job_refs.values().cloned().collect();
            for job_ref in refs {
                self.dispatcher.spawn_kill(job_ref);
            }
        }
        Ok(CommandOutcome::touched(0))
    }

    fn cmd_poll(&mut self, matcher: &TaskMatcher) -> Result<CommandOutcome, CommandError> {
        matcher.validate()?;
        let keys = self.matching_keys(matcher);
        let mut refs = Vec::new();
        for key in &keys {
            let Some(proxy) = self.pool.get(key) else {
                continue;
            };
            if !matches!(proxy.state, TaskState::Submitted | TaskState::Running) {
                continue;
            }
            if let Some(job_ref) = self.job_refs.get(&(key.clone(), proxy.submit_num)) {
                refs.push(job_ref.clone());
            }
        }
        if refs.is_empty() {
            return Err(CommandError::NoMatch(matcher.to_string()));
        }
        let touched = refs.len();
        self.dispatcher.spawn_poll(refs);
        Ok(CommandOutcome::touched(touched))
    }

    fn cmd_kill(&mut self, matcher: &TaskMatcher) -> Result<CommandOutcome, CommandError> {
        matcher.validate()?;
        let keys = self.matching_keys(matcher);
        let mut touched = 0;
        for key in &keys {
            let Some(proxy) = self.pool.get(key) else {
                continue;
            };
            if !proxy.is_active() {
                continue;
            }
            if let Some(job_ref) = self.job_refs.get(&(key.clone(), proxy.submit_num)) {
                self.dispatcher.spawn_kill(job_ref.clone());
                touched += 1;
            }
        }
        if touched == 0 {
            warn!(matcher = %matcher, "kill matched no active jobs");
            return Err(CommandError::NoMatch(matcher.to_string()));
        }
        Ok(CommandOutcome::touched(touched))
    }
}
