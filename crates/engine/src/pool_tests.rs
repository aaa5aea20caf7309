// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use cad_core::TaskState;

fn chain_config() -> WorkflowConfig {
    cad_config::load_str(
        r#"
        [scheduling]
        cycling_mode = "integer"

        [[scheduling.graph]]
        recurrence = "R1"
        edges = [
            { upstream = "foo", downstream = "bar" },
            { upstream = "bar", downstream = "baz" },
        ]

        [runtime.root]
        [runtime.foo]
        script = "true"
        [runtime.bar]
        script = "true"
        [runtime.baz]
        script = "true"
        "#,
    )
    .unwrap()
}

fn cycling_config() -> WorkflowConfig {
    cad_config::load_str(
        r#"
        [scheduling]
        cycling_mode = "integer"
        initial_cycle_point = "1"
        final_cycle_point = "10"
        runahead_limit = "P2"

        [[scheduling.graph]]
        recurrence = "P1"
        edges = [
            { upstream = "foo", downstream = "bar" },
            { upstream = "foo", offset = "-P1", downstream = "foo" },
        ]

        [runtime.root]
        [runtime.foo]
        script = "true"
        [runtime.bar]
        script = "true"
        "#,
    )
    .unwrap()
}

fn p(n: i64) -> CyclePoint {
    CyclePoint::integer(n)
}

fn flows1() -> FlowSet {
    FlowSet::single(1)
}

#[test]
fn head_spawning_creates_only_parentless_tasks() {
    let config = chain_config();
    let mut pool = TaskPool::new();

    let spawned = pool.release_runahead(&config, &flows1(), 0);
    let names: Vec<&str> = spawned.iter().map(|k| k.name.as_str()).collect();

    // Only foo has no prerequisites; bar and baz wait for demand.
    assert_eq!(names, vec!["foo"]);
    assert_eq!(pool.len(), 1);
}

#[test]
fn output_completion_spawns_downstream_on_demand() {
    let config = chain_config();
    let mut pool = TaskPool::new();
    pool.release_runahead(&config, &flows1(), 0);

    let spawned = pool.record_output(&config, "foo", &p(1), "succeeded", &flows1(), 0);
    assert_eq!(spawned.len(), 1);
    assert_eq!(spawned[0].name, "bar");

    let bar = pool.get(&spawned[0]).unwrap();
    assert!(bar.prereqs_satisfied());
}

#[test]
fn spawn_on_demand_never_creates_unreferenced_futures() {
    let config = chain_config();
    let mut pool = TaskPool::new();
    pool.release_runahead(&config, &flows1(), 0);
    pool.record_output(&config, "foo", &p(1), "succeeded", &flows1(), 0);

    // baz depends on bar which has produced nothing yet.
    assert!(pool.get(&TaskKey::new(p(1), "baz")).is_none());
}

#[test]
fn bootstrap_cycle_spawns_at_initial_point_only() {
    let config = cycling_config();
    let mut pool = TaskPool::new();

    pool.release_runahead(&config, &flows1(), 0);
    // foo@1 is parentless (its foo[-P1] dependency is pre-initial);
    // foo@2 depends on foo@1 and must wait for demand.
    assert!(pool.get(&TaskKey::new(p(1), "foo")).is_some());
    assert!(pool.get(&TaskKey::new(p(2), "foo")).is_none());
}

#[test]
fn runahead_window_bounds_active_span() {
    let config = cycling_config();
    let mut pool = TaskPool::new();
    pool.release_runahead(&config, &flows1(), 0);

    // Drive foo through several cycles without completing bar.
    for n in 1..=6 {
        pool.record_output(&config, "foo", &p(n), "succeeded", &flows1(), 0);
        pool.release_runahead(&config, &flows1(), 0);
    }

    let (min, max) = pool.active_span().unwrap();
    let span = match max.diff(&min).unwrap() {
        cad_core::CycleInterval::Steps(n) => n,
        other => panic!("unexpected interval {other:?}"),
    };
    assert!(span <= 2, "active span {span} exceeds runahead limit P2");

    // Proxies beyond the window exist but are runahead-limited.
    let beyond: Vec<_> = pool
        .iter()
        .filter(|(_, proxy)| proxy.is_runahead)
        .collect();
    assert!(!beyond.is_empty());
}

#[test]
fn flow_merge_unions_flow_sets() {
    let config = chain_config();
    let mut pool = TaskPool::new();

    pool.spawn(&config, "foo", &p(1), FlowSet::single(1), 0).unwrap();
    let (outcome, proxy) = pool
        .spawn(&config, "foo", &p(1), FlowSet::single(2), 0)
        .unwrap();

    assert_eq!(outcome, SpawnOutcome::Merged);
    assert_eq!(proxy.flows, FlowSet::from_iter([1, 2]));
    assert_eq!(pool.len(), 1);
}

#[test]
fn flow_merge_is_order_independent() {
    let config = chain_config();

    let mut ab = TaskPool::new();
    ab.spawn(&config, "foo", &p(1), FlowSet::single(1), 0).unwrap();
    ab.spawn(&config, "foo", &p(1), FlowSet::single(2), 0).unwrap();

    let mut ba = TaskPool::new();
    ba.spawn(&config, "foo", &p(1), FlowSet::single(2), 0).unwrap();
    ba.spawn(&config, "foo", &p(1), FlowSet::single(1), 0).unwrap();

    assert_eq!(
        ab.get(&TaskKey::new(p(1), "foo")).unwrap().flows,
        ba.get(&TaskKey::new(p(1), "foo")).unwrap().flows,
    );
}

#[test]
fn outputs_from_foreign_flows_do_not_satisfy() {
    let config = chain_config();
    let mut pool = TaskPool::new();

    pool.spawn(&config, "bar", &p(1), FlowSet::single(2), 0).unwrap();
    pool.record_output(&config, "foo", &p(1), "succeeded", &flows1(), 0);

    let bar = pool.get(&TaskKey::new(p(1), "bar")).unwrap();
    assert!(
        !bar.prereqs_satisfied(),
        "flow 1 output must not satisfy a flow 2 proxy"
    );
}

#[test]
fn flow_none_outputs_never_spawn_children() {
    let config = chain_config();
    let mut pool = TaskPool::new();

    pool.spawn(&config, "foo", &p(1), FlowSet::none(), 0).unwrap();
    let spawned = pool.record_output(&config, "foo", &p(1), "succeeded", &FlowSet::none(), 0);
    assert!(spawned.is_empty());
}

#[test]
fn prune_removes_complete_keeps_incomplete() {
    let config = chain_config();
    let mut pool = TaskPool::new();
    pool.release_runahead(&config, &flows1(), 0);

    let key = TaskKey::new(p(1), "foo");
    {
        let proxy = pool.get_mut(&key).unwrap();
        proxy.force_state(TaskState::Failed);
    }
    // Failed without the succeeded output: incomplete, stays.
    assert!(pool.prune(&config).is_empty());
    assert!(pool.get(&key).is_some());

    {
        let proxy = pool.get_mut(&key).unwrap();
        proxy.force_state(TaskState::Succeeded);
        proxy.add_output("succeeded");
    }
    let pruned = pool.prune(&config);
    assert_eq!(pruned.len(), 1);
    assert!(pool.is_empty());
}

#[yare::parameterized(
    expired = { TaskState::Expired, 1 },
    submit_failed_incomplete = { TaskState::SubmitFailed, 0 },
    failed_incomplete = { TaskState::Failed, 0 },
)]
fn prune_policy_by_terminal_state(state: TaskState, pruned: usize) {
    let config = chain_config();
    let mut pool = TaskPool::new();
    pool.release_runahead(&config, &flows1(), 0);

    let key = TaskKey::new(p(1), "foo");
    pool.get_mut(&key).unwrap().force_state(state);
    assert_eq!(pool.prune(&config).len(), pruned);
}

#[test]
fn ready_tasks_respect_hold_and_retry_gates() {
    let config = chain_config();
    let mut pool = TaskPool::new();
    pool.release_runahead(&config, &flows1(), 0);
    let key = TaskKey::new(p(1), "foo");

    assert_eq!(pool.ready_tasks(0, false), vec![key.clone()]);
    assert!(pool.ready_tasks(0, true).is_empty(), "paused blocks readiness");

    pool.get_mut(&key).unwrap().is_held = true;
    assert!(pool.ready_tasks(0, false).is_empty());
    pool.get_mut(&key).unwrap().is_held = false;

    pool.get_mut(&key).unwrap().retry_at_ms = Some(5_000);
    assert!(pool.ready_tasks(4_999, false).is_empty());
    assert_eq!(pool.ready_tasks(5_000, false).len(), 1);
}

#[test]
fn stall_set_is_visible_through_incomplete() {
    let config = chain_config();
    let mut pool = TaskPool::new();
    pool.release_runahead(&config, &flows1(), 0);

    let key = TaskKey::new(p(1), "foo");
    pool.get_mut(&key).unwrap().force_state(TaskState::Failed);
    pool.record_output(&config, "foo", &p(1), "failed", &flows1(), 0);

    assert!(!pool.has_active());
    let incomplete = pool.incomplete(&config);
    assert_eq!(incomplete, vec![key]);
}

#[test]
fn xtrigger_satisfaction_is_flow_agnostic() {
    let config = cad_config::load_str(
        r#"
        [scheduling]
        cycling_mode = "integer"

        [scheduling.xtriggers.ready]
        function = "wall_clock"

        [[scheduling.graph]]
        recurrence = "R1"
        edges = [ { upstream = "@ready", downstream = "obs" } ]

        [runtime.root]
        [runtime.obs]
        script = "true"
        "#,
    )
    .unwrap();

    let mut pool = TaskPool::new();
    pool.spawn(&config, "obs", &p(1), FlowSet::single(2), 0).unwrap();
    assert!(!pool.get(&TaskKey::new(p(1), "obs")).unwrap().prereqs_satisfied());

    pool.satisfy_xtrigger("ready", &p(1));
    assert!(pool.get(&TaskKey::new(p(1), "obs")).unwrap().prereqs_satisfied());
}
