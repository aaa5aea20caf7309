// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! The scheduler: single-threaded main loop owning the pool, broadcast
//! overlay, timers, dispatcher, and store.
//!
//! One tick drains the command and event queues, fires matured timers,
//! advances ready tasks, hands submissions to the dispatcher, prunes,
//! runs the stall checks, and commits the store — in that order.
//! Workers only ever talk back through the event channel.

use crate::broadcast::BroadcastManager;
use crate::dispatch::Dispatcher;
use crate::error::EngineError;
use crate::pool::TaskPool;
use crate::timers::Timers;
use crate::xtrigger::{XtriggerOutcome, XtriggerRegistry};
use cad_config::WorkflowConfig;
use cad_core::prereq::PrereqAtom;
use cad_core::{
    Clock, Command, CommandError, CommandOutcome, CyclePoint, Event, FlowSet, StopMode, TaskKey,
    TaskState, TimerId, TimerKind,
};
use cad_platforms::{JobContext, JobRef, JobRunner};
use cad_store::{
    format_time, parse_time, JobRow, PendingWrite, TaskEventRow, WorkflowStore,
};
use std::collections::HashMap;
use std::path::PathBuf;
use std::time::Duration;
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, error, info, warn};

const COMMAND_BUDGET: usize = 64;
const EVENT_BUDGET: usize = 256;

/// Filesystem layout for one workflow run.
#[derive(Debug, Clone)]
pub struct SchedulerPaths {
    /// Run directory; the store lives at `log/db` inside it.
    pub run_dir: PathBuf,
    /// Definition file, needed for `reload`.
    pub config_path: Option<PathBuf>,
    /// Scheduler run uuid recorded in `workflow_params`.
    pub uuid: Option<String>,
}

impl SchedulerPaths {
    pub fn new(run_dir: impl Into<PathBuf>) -> Self {
        Self {
            run_dir: run_dir.into(),
            config_path: None,
            uuid: None,
        }
    }

    pub fn db_path(&self) -> PathBuf {
        self.run_dir.join("log").join("db")
    }

    pub fn job_dir(&self, point: &CyclePoint, name: &str, submit_num: u32) -> PathBuf {
        self.run_dir
            .join("log")
            .join("job")
            .join(point.to_string())
            .join(name)
            .join(format!("{:02}", submit_num))
    }
}

/// Why the scheduler stopped.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SchedulerExit {
    /// All expected tasks ran to completion.
    Completed,
    Stopped(StopMode),
    /// Stalled with abort-on-stall configured.
    Stalled,
    InactivityTimeout,
}

pub(crate) struct CommandEnvelope {
    pub command: Command,
    pub reply: Option<oneshot::Sender<Result<CommandOutcome, CommandError>>>,
}

/// Handle for feeding the scheduler: the command queue plus the job
/// message ingress (the transport in front of both is out of scope).
#[derive(Clone)]
pub struct SchedulerClient {
    command_tx: mpsc::Sender<CommandEnvelope>,
    event_tx: mpsc::Sender<Event>,
}

impl SchedulerClient {
    /// Enqueue a command and wait for its outcome.
    pub async fn command(&self, command: Command) -> Result<CommandOutcome, CommandError> {
        let (tx, rx) = oneshot::channel();
        self.command_tx
            .send(CommandEnvelope {
                command,
                reply: Some(tx),
            })
            .await
            .map_err(|_| CommandError::Stopping)?;
        rx.await.map_err(|_| CommandError::Stopping)?
    }

    /// Enqueue a command without waiting.
    pub async fn command_detached(&self, command: Command) -> Result<(), CommandError> {
        self.command_tx
            .send(CommandEnvelope {
                command,
                reply: None,
            })
            .await
            .map_err(|_| CommandError::Stopping)
    }

    /// Inject a job-emitted message (severity, label).
    pub async fn job_message(
        &self,
        point: CyclePoint,
        name: &str,
        submit_num: u32,
        severity: cad_core::JobSeverity,
        message: &str,
    ) -> bool {
        self.event_tx
            .send(Event::JobMessage {
                point,
                name: name.to_string(),
                submit_num,
                severity,
                message: message.to_string(),
            })
            .await
            .is_ok()
    }

    /// Report an external trigger satisfied.
    pub async fn xtrigger_satisfied(&self, label: &str, point: CyclePoint) -> bool {
        self.event_tx
            .send(Event::XtriggerSatisfied {
                label: label.to_string(),
                point,
            })
            .await
            .is_ok()
    }
}

/// The scheduler. Generic over the runner adapter and clock, like every
/// stateful owner in this workspace.
pub struct Scheduler<R: JobRunner, C: Clock> {
    pub(crate) config: WorkflowConfig,
    pub(crate) paths: SchedulerPaths,
    pub(crate) clock: C,
    pub(crate) store: WorkflowStore,
    pub(crate) pool: TaskPool,
    pub(crate) broadcast: BroadcastManager,
    pub(crate) timers: Timers,
    pub(crate) dispatcher: Dispatcher<R>,
    pub(crate) xtriggers: XtriggerRegistry,
    command_rx: mpsc::Receiver<CommandEnvelope>,
    event_rx: mpsc::Receiver<Event>,
    pub(crate) paused: bool,
    pub(crate) stop: Option<StopMode>,
    pub(crate) stalled: bool,
    pub(crate) active_flows: FlowSet,
    pub(crate) next_flow: u64,
    /// Live job references by (task, submit_num), for poll and kill.
    pub(crate) job_refs: HashMap<(TaskKey, u32), JobRef>,
    /// Poll-schedule index per poll timer.
    pub(crate) poll_counts: HashMap<TimerId, usize>,
    /// Poll timers currently following the execution (vs submission)
    /// schedule.
    pub(crate) exec_polling: HashMap<TimerId, bool>,
    pub(crate) exit: Option<SchedulerExit>,
    commands_closed: bool,
    replies: Vec<(
        oneshot::Sender<Result<CommandOutcome, CommandError>>,
        Result<CommandOutcome, CommandError>,
    )>,
}

impl<R: JobRunner, C: Clock> Scheduler<R, C> {
    /// Build a scheduler, recovering from the store if it has prior
    /// state. Returns the scheduler and its client handle.
    pub fn new(
        config: WorkflowConfig,
        runner: R,
        clock: C,
        paths: SchedulerPaths,
    ) -> Result<(Self, SchedulerClient), EngineError> {
        let (command_tx, command_rx) = mpsc::channel(COMMAND_BUDGET);
        let (event_tx, event_rx) = mpsc::channel(EVENT_BUDGET);

        let store = WorkflowStore::open(&paths.db_path())?;
        let dispatcher = Dispatcher::new(runner, event_tx.clone(), config.mode);
        let xtriggers = XtriggerRegistry::new(config.xtriggers.clone());

        let client = SchedulerClient {
            command_tx,
            event_tx,
        };

        let mut scheduler = Self {
            config,
            paths,
            clock,
            store,
            pool: TaskPool::new(),
            broadcast: BroadcastManager::new(),
            timers: Timers::new(),
            dispatcher,
            xtriggers,
            command_rx,
            event_rx,
            paused: false,
            stop: None,
            stalled: false,
            active_flows: FlowSet::single(1),
            next_flow: 1,
            job_refs: HashMap::new(),
            poll_counts: HashMap::new(),
            exec_polling: HashMap::new(),
            exit: None,
            commands_closed: false,
            replies: Vec::new(),
        };
        scheduler.startup()?;
        Ok((scheduler, client))
    }

    pub fn config(&self) -> &WorkflowConfig {
        &self.config
    }

    pub fn pool(&self) -> &TaskPool {
        &self.pool
    }

    pub fn store(&self) -> &WorkflowStore {
        &self.store
    }

    pub fn is_paused(&self) -> bool {
        self.paused
    }

    pub fn exit_state(&self) -> Option<&SchedulerExit> {
        self.exit.as_ref()
    }

    fn startup(&mut self) -> Result<(), EngineError> {
        let had_state = !self.store.load_task_states()?.is_empty();

        self.write_startup_params();
        self.write_inheritance();

        if had_state {
            self.recover()?;
        } else {
            info!(workflow = %self.config.name, "cold start");
        }
        // Startup counts as activity for the inactivity watchdog.
        self.note_activity();
        self.store.flush()?;
        Ok(())
    }

    fn write_startup_params(&mut self) {
        let params: Vec<(&str, String)> = vec![
            ("cadence_version", env!("CARGO_PKG_VERSION").to_string()),
            ("UTC_mode", if self.config.utc_mode { "1" } else { "0" }.to_string()),
            (
                "cycle_point_format",
                match self.config.mode {
                    cad_core::CyclingMode::Integer => "integer".to_string(),
                    cad_core::CyclingMode::Gregorian => "CCYYMMDDThhmmZ".to_string(),
                },
            ),
            ("cycling_mode", self.config.mode.to_string()),
            ("icp", self.config.bounds.initial.to_string()),
            (
                "fcp",
                self.config
                    .bounds
                    .final_point
                    .map(|p| p.to_string())
                    .unwrap_or_default(),
            ),
        ];
        for (key, value) in params {
            self.store.push(PendingWrite::SetParam {
                key: key.to_string(),
                value,
            });
        }
        if let Some(uuid) = &self.paths.uuid {
            self.store.push(PendingWrite::SetParam {
                key: "uuid".to_string(),
                value: uuid.clone(),
            });
        }
    }

    pub(crate) fn write_inheritance(&mut self) {
        for (namespace, lineage) in &self.config.lineages {
            let lineage_json =
                serde_json::to_string(lineage).unwrap_or_else(|_| "[]".to_string());
            self.store.push(PendingWrite::UpsertInheritance {
                namespace: namespace.clone(),
                lineage_json,
            });
        }
    }

    /// Reconstruct pool, broadcast overlay, and timers from the store.
    fn recover(&mut self) -> Result<(), EngineError> {
        let params = self.store.load_params()?;
        if let Some(n) = params.get("flow_counter").and_then(|v| v.parse().ok()) {
            self.next_flow = n;
        }
        self.paused = params.get("paused").map(|v| v == "1").unwrap_or(false);

        // Completed outputs from history, so prerequisites and the
        // head-spawn frontier pick up where the last run stopped.
        let states = self.store.load_task_states()?;
        for row in &states {
            let Ok(point) = CyclePoint::parse(&row.cycle, self.config.mode) else {
                continue;
            };
            self.pool
                .note_submit_num(&TaskKey::new(point, row.name.clone()), row.submit_num);
            let flows = FlowSet::from_json(&row.flow_nums).unwrap_or_else(|| FlowSet::single(1));
            if row.status == TaskState::Succeeded.as_str() {
                self.pool.register_completed(
                    PrereqAtom::new(row.name.clone(), point, cad_core::OUTPUT_SUCCEEDED),
                    flows.clone(),
                );
                self.pool
                    .advance_frontier_past(&self.config, &row.name, &point);
            } else if row.status == TaskState::Expired.as_str() {
                self.pool.register_completed(
                    PrereqAtom::new(row.name.clone(), point, cad_core::OUTPUT_EXPIRED),
                    flows.clone(),
                );
                self.pool
                    .advance_frontier_past(&self.config, &row.name, &point);
            }
        }

        // Custom outputs live in task_events.
        for row in &states {
            for event in self.store.task_events(&row.cycle, &row.name)? {
                if event.event != "output" {
                    continue;
                }
                let Ok(point) = CyclePoint::parse(&event.cycle, self.config.mode) else {
                    continue;
                };
                let flows =
                    FlowSet::from_json(&row.flow_nums).unwrap_or_else(|| FlowSet::single(1));
                self.pool.register_completed(
                    PrereqAtom::new(event.name.clone(), point, event.message.clone()),
                    flows,
                );
            }
        }

        // Live proxies.
        let pool_rows = self.store.load_task_pool()?;
        let now_ms = self.clock.epoch_ms();
        for row in &pool_rows {
            let Ok(point) = CyclePoint::parse(&row.cycle, self.config.mode) else {
                warn!(cycle = %row.cycle, "unparseable cycle in task_pool, skipping");
                continue;
            };
            let flows = FlowSet::from_json(&row.flow_nums).unwrap_or_else(|| FlowSet::single(1));
            let Some((_, proxy)) =
                self.pool
                    .spawn(&self.config, &row.name, &point, flows, now_ms)
            else {
                warn!(task = %row.name, "recovered task no longer in the definition");
                continue;
            };
            if let Some(state) = TaskState::parse(&row.status) {
                proxy.force_state(state);
            }
            proxy.is_held = row.is_held;

            let key = TaskKey::new(point, row.name.clone());
            if let Some(state_row) = states
                .iter()
                .find(|s| s.cycle == row.cycle && s.name == row.name && s.flow_nums == row.flow_nums)
            {
                if let Some(proxy) = self.pool.get_mut(&key) {
                    proxy.submit_num = state_row.submit_num;
                }
            }
        }

        // Active jobs are re-polled at once: polling is authoritative.
        let mut to_poll = Vec::new();
        for key in self.pool.keys() {
            let Some(proxy) = self.pool.get(&key) else {
                continue;
            };
            if !matches!(proxy.state, TaskState::Submitted | TaskState::Running) {
                continue;
            }
            let jobs = self.store.job_rows(&key.point.to_string(), &key.name)?;
            let Some(job) = jobs.iter().rev().find(|j| j.job_id.is_some()) else {
                continue;
            };
            let Some(job_id) = job.job_id.clone() else {
                continue;
            };
            let job_ref = JobRef {
                point: key.point.to_string(),
                name: key.name.clone(),
                submit_num: job.submit_num,
                job_id,
                job_dir: self.paths.job_dir(&key.point, &key.name, job.submit_num),
            };
            if let Some(proxy) = self.pool.get_mut(&key) {
                proxy.platform = Some(job.platform_name.clone());
                proxy.job_id = Some(job_ref.job_id.clone());
            }
            self.job_refs
                .insert((key.clone(), job.submit_num), job_ref.clone());
            self.arm_poll_timer(&key, job.submit_num, false, 0);
            to_poll.push(job_ref);
        }
        self.dispatcher.spawn_poll(to_poll);

        // Broadcast overlay.
        self.broadcast.recover(&self.store)?;

        // Retry timers resume from their persisted fire times.
        for row in self.store.retry_schedules()? {
            let Ok(point) = CyclePoint::parse(&row.cycle, self.config.mode) else {
                continue;
            };
            let key = TaskKey::new(point, row.name.clone());
            let Some(proxy) = self.pool.get_mut(&key) else {
                continue;
            };
            if proxy.state != TaskState::Waiting {
                continue;
            }
            let Some(fire_at_ms) = parse_time(&row.message) else {
                continue;
            };
            proxy.retry_at_ms = Some(fire_at_ms);
            let delay = Duration::from_millis(fire_at_ms.saturating_sub(now_ms));
            self.timers
                .set(TimerId::retry(&point, &row.name), delay, self.clock.now());
        }

        info!(
            proxies = self.pool.len(),
            workflow = %self.config.name,
            "recovered from store"
        );
        Ok(())
    }

    /// Run to completion (or stop/stall/abort).
    pub async fn run(mut self) -> Result<SchedulerExit, EngineError> {
        info!(workflow = %self.config.name, "scheduler starting");
        loop {
            self.tick().await?;
            if let Some(exit) = self.exit.clone() {
                self.shutdown(&exit)?;
                return Ok(exit);
            }
            self.wait_for_wake().await;
        }
    }

    fn shutdown(&mut self, exit: &SchedulerExit) -> Result<(), EngineError> {
        self.store.push(PendingWrite::SetParam {
            key: "paused".to_string(),
            value: if self.paused { "1" } else { "0" }.to_string(),
        });
        self.store.flush()?;
        info!(exit = ?exit, "scheduler shutdown");
        Ok(())
    }

    /// One scheduling pass. Public so tests (and embedding daemons) can
    /// drive the loop deterministically.
    pub async fn tick(&mut self) -> Result<(), EngineError> {
        // 1. Commands, in arrival order, bounded per tick.
        let mut budget = COMMAND_BUDGET;
        while budget > 0 {
            match self.command_rx.try_recv() {
                Ok(envelope) => {
                    let result = self.apply_command(envelope.command);
                    if let Some(reply) = envelope.reply {
                        self.replies.push((reply, result));
                    }
                    budget -= 1;
                }
                Err(_) => break,
            }
        }

        // 2. Job events from workers and the message ingress.
        let mut budget = EVENT_BUDGET;
        while budget > 0 {
            match self.event_rx.try_recv() {
                Ok(event) => {
                    self.handle_event(event);
                    budget -= 1;
                }
                Err(_) => break,
            }
        }

        // 3. Matured timers.
        let fired = self.timers.fired(self.clock.now());
        for id in fired {
            self.handle_timer(id);
        }

        // 4. Runahead window and head spawning.
        let head_flows = self.active_flows.clone();
        let spawned = self
            .pool
            .release_runahead(&self.config, &head_flows, self.clock.epoch_ms());
        for key in spawned {
            self.after_spawn(&key);
        }

        // 5. Ready tasks enter `preparing` and queue for submission.
        if self.stop.is_none() {
            let ready = self.pool.ready_tasks(self.clock.epoch_ms(), self.paused);
            for key in ready {
                self.submit_task(&key);
            }
        }

        // 6. Dispatch to platforms (non-blocking; workers report back).
        self.dispatcher.dispatch();

        // 7. Prune finished proxies.
        let pruned = self.pool.prune(&self.config);
        for proxy in &pruned {
            self.store.push(PendingWrite::DeleteTaskPool {
                cycle: proxy.key.point.to_string(),
                name: proxy.key.name.clone(),
                flow_nums: proxy.flows.to_json(),
            });
            self.cancel_job_tracking(&proxy.key, proxy.submit_num);
            self.timers.cancel(&TimerId::expire(&proxy.key.point, &proxy.key.name));
        }
        if !pruned.is_empty() {
            self.expire_passed_broadcasts();
        }

        // 8. Stall, inactivity, and completion checks.
        self.health_checks();

        // 9. Persist, then acknowledge commands.
        self.store.flush().map_err(|e| {
            error!(error = %e, "store flush failed, aborting to preserve durability");
            e
        })?;
        for (reply, result) in self.replies.drain(..) {
            let _ = reply.send(result);
        }
        Ok(())
    }

    /// Drop broadcast entries pinned to points older than every live
    /// proxy; they can no longer match anything.
    fn expire_passed_broadcasts(&mut self) {
        let Some((oldest, _)) = self.pool.active_span() else {
            return;
        };
        let expired: Vec<String> = self
            .broadcast
            .overlay()
            .entries()
            .iter()
            .filter(|e| e.point != "*")
            .filter_map(|e| {
                CyclePoint::parse(&e.point, self.config.mode)
                    .ok()
                    .filter(|p| *p < oldest)
                    .map(|_| e.point.clone())
            })
            .collect();
        let now_ms = self.clock.epoch_ms();
        for point in expired {
            self.broadcast.expire_point(&mut self.store, &point, now_ms);
        }
    }

    async fn wait_for_wake(&mut self) {
        let now = self.clock.now();
        let wake = self
            .timers
            .next_deadline()
            .map(|d| d.saturating_duration_since(now))
            .unwrap_or(self.config.tick_interval)
            .min(self.config.tick_interval);

        enum Wake {
            Command(Option<CommandEnvelope>),
            Event(Option<Event>),
            Timer,
        }

        // Select into a value first; the channel borrows end before the
        // handler needs the whole scheduler again.
        let woke = tokio::select! {
            envelope = self.command_rx.recv(), if !self.commands_closed => Wake::Command(envelope),
            event = self.event_rx.recv() => Wake::Event(event),
            _ = tokio::time::sleep(wake) => Wake::Timer,
        };

        match woke {
            Wake::Command(Some(envelope)) => {
                let result = self.apply_command(envelope.command);
                if let Some(reply) = envelope.reply {
                    // Acknowledged after the next tick's flush.
                    self.replies.push((reply, result));
                }
            }
            // All clients dropped; sleep-driven from here on.
            Wake::Command(None) => self.commands_closed = true,
            Wake::Event(Some(event)) => self.handle_event(event),
            Wake::Event(None) | Wake::Timer => {}
        }
    }

    // ------------------------------------------------------------------
    // Submission
    // ------------------------------------------------------------------

    /// `waiting -> preparing`: allocate the next submit number, persist
    /// the job row, and queue the context on the dispatcher.
    pub(crate) fn submit_task(&mut self, key: &TaskKey) {
        let now_ms = self.clock.epoch_ms();
        let point_str = key.point.to_string();

        let Some(def) = self.config.task(&key.name).cloned() else {
            return;
        };
        let lineage = def.family_lineage.clone();

        let Some(proxy) = self.pool.get_mut(key) else {
            return;
        };
        if let Err(e) = proxy.transition(TaskState::Preparing) {
            warn!(error = %e, "not submitting");
            return;
        }
        proxy.submit_num += 1;
        proxy.retry_at_ms = None;
        proxy.is_queued = false;

        let submit_num = proxy.submit_num;
        let try_num = proxy.try_num_execute;
        let is_manual = proxy.is_manual_submit;
        proxy.is_manual_submit = false;

        let platform = self
            .broadcast
            .scalar_override(&point_str, &key.name, &lineage, "platform")
            .unwrap_or_else(|| def.platform.clone());
        proxy.platform = Some(platform.clone());
        let script = self
            .broadcast
            .scalar_override(&point_str, &key.name, &lineage, "script")
            .unwrap_or_else(|| def.script.clone());

        let mut environment: Vec<(String, String)> = def
            .environment
            .iter()
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect();
        for (k, v) in self
            .broadcast
            .environment_overrides(&point_str, &key.name, &lineage)
        {
            environment.retain(|(existing, _)| *existing != k);
            environment.push((k, v));
        }

        self.pool.note_submit_num(key, submit_num);

        let job_dir = self.paths.job_dir(&key.point, &key.name, submit_num);
        let ctx = JobContext {
            point: point_str.clone(),
            name: key.name.clone(),
            submit_num,
            platform: platform.clone(),
            script,
            environment,
            job_dir,
            execution_time_limit: def.execution_time_limit,
        };

        self.store.push(PendingWrite::InsertTaskJob(JobRow {
            cycle: point_str,
            name: key.name.clone(),
            submit_num,
            try_num,
            submit_status: None,
            run_status: None,
            platform_name: platform.clone(),
            job_runner_name: self.dispatcher.runner_name().to_string(),
            job_id: None,
            time_submit: Some(format_time(now_ms)),
            time_submit_exit: None,
            time_run: None,
            time_run_exit: None,
            is_manual_submit: is_manual,
        }));

        // Submission is underway; the clock-expire window has closed.
        self.timers.cancel(&TimerId::expire(&key.point, &key.name));

        let platform_config = self.config.platform(&platform);
        self.dispatcher.enqueue_submission(platform_config, ctx);
        self.persist_proxy(key);
        self.note_activity();
    }

    // ------------------------------------------------------------------
    // Spawn bookkeeping
    // ------------------------------------------------------------------

    /// Persist a fresh proxy and arm its expiry/xtrigger timers.
    pub(crate) fn after_spawn(&mut self, key: &TaskKey) {
        self.persist_proxy(key);

        let Some(def) = self.config.task(&key.name) else {
            return;
        };

        if let Some(offset) = &def.clock_expire {
            if let (Ok(expire_point), Some(_)) =
                (key.point.add(offset), key.point.epoch_ms())
            {
                if let Some(expire_ms) = expire_point.epoch_ms() {
                    let now_ms = self.clock.epoch_ms();
                    let delay = Duration::from_millis(expire_ms.saturating_sub(now_ms));
                    self.timers.set(
                        TimerId::expire(&key.point, &key.name),
                        delay,
                        self.clock.now(),
                    );
                }
            }
        }

        // First xtrigger poll happens promptly; handle_timer re-arms the
        // chain at the declared interval while pending.
        for label in def.xtriggers.clone() {
            self.timers.set(
                TimerId::xtrigger(&label, &key.point),
                Duration::ZERO,
                self.clock.now(),
            );
        }
    }

    // ------------------------------------------------------------------
    // Persistence helpers
    // ------------------------------------------------------------------

    /// Mirror a proxy's pool/state rows into the store.
    pub(crate) fn persist_proxy(&mut self, key: &TaskKey) {
        let now_ms = self.clock.epoch_ms();
        let Some(proxy) = self.pool.get(key) else {
            return;
        };
        self.store.push(PendingWrite::UpsertTaskPool {
            cycle: key.point.to_string(),
            name: key.name.clone(),
            flow_nums: proxy.flows.to_json(),
            status: proxy.state.as_str().to_string(),
            is_held: proxy.is_held,
        });
        self.store.push(PendingWrite::UpsertTaskState {
            cycle: key.point.to_string(),
            name: key.name.clone(),
            flow_nums: proxy.flows.to_json(),
            status: proxy.state.as_str().to_string(),
            submit_num: proxy.submit_num,
            time_created: format_time(proxy.created_at_ms),
            time_updated: format_time(now_ms),
        });
    }

    /// Append a task event row and fire any configured handlers.
    pub(crate) fn record_task_event(&mut self, key: &TaskKey, event: &str, message: &str) {
        let submit_num = self.pool.get(key).map(|p| p.submit_num).unwrap_or(0);
        self.store.push(PendingWrite::InsertTaskEvent(TaskEventRow {
            cycle: key.point.to_string(),
            name: key.name.clone(),
            submit_num,
            event: event.to_string(),
            message: message.to_string(),
            time: format_time(self.clock.epoch_ms()),
        }));
        self.fire_event_handlers(key, event, message);
    }

    /// Render configured event handler templates. Execution of handler
    /// commands is external; the rendered invocation is logged and
    /// recorded.
    fn fire_event_handlers(&mut self, key: &TaskKey, event: &str, message: &str) {
        let Some(def) = self.config.task(&key.name) else {
            return;
        };
        let Some(templates) = def.event_handlers.get(event) else {
            return;
        };
        let rendered: Vec<String> = templates
            .iter()
            .map(|t| {
                t.replace("%(task)s", &key.name)
                    .replace("%(point)s", &key.point.to_string())
                    .replace("%(event)s", event)
                    .replace("%(message)s", message)
            })
            .collect();
        for command in rendered {
            info!(task = %key, event, handler = %command, "event handler");
            self.store.push(PendingWrite::InsertTaskEvent(TaskEventRow {
                cycle: key.point.to_string(),
                name: key.name.clone(),
                submit_num: self.pool.get(key).map(|p| p.submit_num).unwrap_or(0),
                event: "handler".to_string(),
                message: command,
                time: format_time(self.clock.epoch_ms()),
            }));
        }
    }

    /// Record a produced output: pool registry, child spawning, store.
    pub(crate) fn record_output(&mut self, key: &TaskKey, label: &str, spawn_children: bool) {
        let Some(proxy) = self.pool.get_mut(key) else {
            return;
        };
        proxy.add_output(label);
        let flows = proxy.flows.clone();
        let now_ms = self.clock.epoch_ms();

        // With spawning suppressed (trigger --wait, mid-run), the output
        // stays private to the proxy until completion replays it.
        let spawned = if spawn_children {
            self.pool
                .record_output(&self.config, &key.name, &key.point, label, &flows, now_ms)
        } else {
            Vec::new()
        };
        for spawned_key in spawned {
            self.after_spawn(&spawned_key);
        }

        if !cad_core::is_lifecycle_output(label) {
            self.store.push(PendingWrite::InsertTaskEvent(TaskEventRow {
                cycle: key.point.to_string(),
                name: key.name.clone(),
                submit_num: self.pool.get(key).map(|p| p.submit_num).unwrap_or(0),
                event: "output".to_string(),
                message: label.to_string(),
                time: format_time(self.clock.epoch_ms()),
            }));
        }
    }

    // ------------------------------------------------------------------
    // Timers
    // ------------------------------------------------------------------

    pub(crate) fn arm_poll_timer(
        &mut self,
        key: &TaskKey,
        submit_num: u32,
        execution: bool,
        index: usize,
    ) {
        let Some(proxy) = self.pool.get(key) else {
            return;
        };
        let platform = proxy
            .platform
            .clone()
            .unwrap_or_else(|| "localhost".to_string());
        let platform_config = self.config.platform(&platform);
        let interval = if execution {
            platform_config.execution_poll_interval(index)
        } else {
            platform_config.submission_poll_interval(index)
        };
        let id = TimerId::poll(&key.point, &key.name, submit_num);
        self.poll_counts.insert(id.clone(), index);
        self.exec_polling.insert(id.clone(), execution);
        self.timers.set(id, interval, self.clock.now());
    }

    pub(crate) fn cancel_job_tracking(&mut self, key: &TaskKey, submit_num: u32) {
        let id = TimerId::poll(&key.point, &key.name, submit_num);
        self.timers.cancel(&id);
        self.poll_counts.remove(&id);
        self.exec_polling.remove(&id);
        self.job_refs.remove(&(key.clone(), submit_num));
    }

    pub(crate) fn handle_timer(&mut self, id: TimerId) {
        debug!(timer = %id, "timer fired");
        match id {
            TimerId::Retry { task } => {
                if let Some(proxy) = self.pool.get_mut(&task) {
                    proxy.retry_at_ms = None;
                }
            }

            TimerId::Expire { task } => self.expire_task(&task),

            TimerId::Poll {
                ref task,
                submit_num,
            } => {
                if let Some(job_ref) = self.job_refs.get(&(task.clone(), submit_num)).cloned() {
                    self.dispatcher.spawn_poll(vec![job_ref]);
                    // Re-arm the next interval in the schedule.
                    let index = self
                        .poll_counts
                        .get(&id)
                        .copied()
                        .unwrap_or(0)
                        .saturating_add(1);
                    let execution = self.exec_polling.get(&id).copied().unwrap_or(false);
                    let task = task.clone();
                    self.arm_poll_timer(&task, submit_num, execution, index);
                }
            }

            TimerId::Xtrigger { label, point } => {
                match self.xtriggers.poll(&label, &point, self.clock.epoch_ms()) {
                    XtriggerOutcome::Satisfied => {
                        self.pool.satisfy_xtrigger(&label, &point);
                        self.note_activity();
                    }
                    XtriggerOutcome::Pending => {
                        let interval = self
                            .xtriggers
                            .poll_interval(&label, self.config.tick_interval);
                        self.timers
                            .set(TimerId::xtrigger(&label, &point), interval, self.clock.now());
                    }
                }
            }

            TimerId::Stall => {
                if self.stalled {
                    error!("aborting on stall timeout");
                    self.exit = Some(SchedulerExit::Stalled);
                }
            }

            TimerId::Inactivity => {
                error!("aborting on inactivity timeout");
                self.exit = Some(SchedulerExit::InactivityTimeout);
            }
        }
    }

    fn expire_task(&mut self, key: &TaskKey) {
        let Some(proxy) = self.pool.get_mut(key) else {
            return;
        };
        if proxy.state != TaskState::Waiting {
            return;
        }
        if proxy.transition(TaskState::Expired).is_ok() {
            warn!(task = %key, "expired: clock passed the expiry trigger before submission");
            self.record_output(key, cad_core::OUTPUT_EXPIRED, true);
            self.persist_proxy(key);
            self.record_task_event(key, "expired", "");
        }
    }

    // ------------------------------------------------------------------
    // Health checks
    // ------------------------------------------------------------------

    /// Record never-spawned downstream instances of an incomplete task
    /// as `waiting` in `task_states`. These are bookkeeping rows for the
    /// stall report, not proxies: spawn-on-demand is unaffected.
    fn record_blocked_downstream(&mut self, key: &TaskKey) {
        let now_ms = self.clock.epoch_ms();
        let flows_json = self
            .pool
            .get(key)
            .map(|p| p.flows.to_json())
            .unwrap_or_else(|| "[1]".to_string());

        let children: Vec<TaskKey> = self
            .config
            .edges
            .iter()
            .filter(|e| e.upstream == key.name)
            .filter_map(|e| {
                let point = match &e.offset {
                    cad_core::OffsetSpec::Zero => Some(key.point),
                    cad_core::OffsetSpec::Interval(iv) => key.point.add(&iv.negated()).ok(),
                    _ => None,
                }?;
                self.config
                    .task(&e.downstream)
                    .filter(|d| d.is_valid_point(&point))
                    .map(|_| TaskKey::new(point, e.downstream.clone()))
            })
            .collect();

        for child in children {
            if self.pool.get(&child).is_some() {
                continue;
            }
            self.store.push(PendingWrite::UpsertTaskState {
                cycle: child.point.to_string(),
                name: child.name.clone(),
                flow_nums: flows_json.clone(),
                status: TaskState::Waiting.as_str().to_string(),
                submit_num: 0,
                time_created: format_time(now_ms),
                time_updated: format_time(now_ms),
            });
        }
    }

    pub(crate) fn note_activity(&mut self) {
        if self.stalled {
            self.stalled = false;
            self.timers.cancel(&TimerId::stall());
        }
        if let Some(timeout) = self.config.events.abort_on_inactivity_timeout {
            self.timers
                .set(TimerId::inactivity(), timeout, self.clock.now());
        }
    }

    fn health_checks(&mut self) {
        // Stop handling.
        if let Some(mode) = self.stop {
            let quiescent = !self.pool.has_active() && self.dispatcher.queued_count() == 0;
            match mode {
                StopMode::Now => {
                    self.exit = Some(SchedulerExit::Stopped(mode));
                    return;
                }
                StopMode::Request | StopMode::Kill => {
                    if quiescent {
                        self.exit = Some(SchedulerExit::Stopped(mode));
                        return;
                    }
                }
            }
        }

        // Work timers only: the stall/inactivity watchdogs must not keep
        // the workflow alive.
        let pending_work_timers = self.timers.has_kind(TimerKind::Retry)
            || self.timers.has_kind(TimerKind::Poll)
            || self.timers.has_kind(TimerKind::Xtrigger)
            || self.timers.has_kind(TimerKind::Expire);

        // Completion: nothing live, nothing queued, nothing pending.
        if self.pool.is_empty()
            && self.dispatcher.queued_count() == 0
            && !pending_work_timers
            && self.stop.is_none()
        {
            info!("workflow complete");
            self.exit = Some(SchedulerExit::Completed);
            return;
        }

        // Stall: no activity possible, incomplete tasks remain.
        let busy = self.pool.has_active()
            || self.dispatcher.queued_count() > 0
            || self.timers.has_kind(TimerKind::Retry)
            || self.timers.has_kind(TimerKind::Xtrigger)
            || self.timers.has_kind(TimerKind::Expire);
        let incomplete = self.pool.incomplete(&self.config);

        if !busy && !incomplete.is_empty() && !self.paused {
            if !self.stalled {
                self.stalled = true;
                warn!(
                    incomplete = incomplete.len(),
                    first = %incomplete[0],
                    "workflow stalled"
                );
                for key in &incomplete {
                    self.record_task_event(key, "stall", "unsatisfied prerequisites");
                    self.record_blocked_downstream(key);
                }
                match self.config.events.abort_on_stall_timeout {
                    Some(timeout) if timeout.is_zero() => {
                        self.exit = Some(SchedulerExit::Stalled);
                    }
                    Some(timeout) => {
                        self.timers.set(TimerId::stall(), timeout, self.clock.now());
                    }
                    None => {}
                }
            }
        } else if self.stalled && busy {
            self.stalled = false;
            self.timers.cancel(&TimerId::stall());
        }
    }
}

#[cfg(test)]
#[path = "scheduler_tests.rs"]
mod tests;
