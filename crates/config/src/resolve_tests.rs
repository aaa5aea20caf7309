// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use cad_core::TaskState;

fn chain_workflow() -> WorkflowConfig {
    crate::load_str(
        r#"
        name = "chain"

        [scheduling]
        cycling_mode = "integer"

        [[scheduling.graph]]
        recurrence = "R1"
        edges = [
            { upstream = "foo", downstream = "bar" },
            { upstream = "bar", downstream = "baz" },
        ]

        [runtime.root]
        platform = "localhost"

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

#[test]
fn integer_mode_defaults_icp_to_one() {
    let config = chain_workflow();
    assert_eq!(config.mode, CyclingMode::Integer);
    assert_eq!(config.bounds.initial, CyclePoint::integer(1));
    assert!(config.bounds.final_point.is_none());
}

#[test]
fn graph_tasks_get_definitions_and_edges() {
    let config = chain_workflow();
    assert_eq!(config.tasks.len(), 3);
    assert_eq!(config.edges.len(), 2);

    let bar = config.task("bar").unwrap();
    assert_eq!(bar.sequences.len(), 1);
    assert!(bar.is_valid_point(&CyclePoint::integer(1)));
    assert!(!bar.is_valid_point(&CyclePoint::integer(2)));
}

#[test]
fn platform_inherited_from_root() {
    let config = chain_workflow();
    assert_eq!(config.task("foo").unwrap().platform, "localhost");
}

#[test]
fn cycling_workflow_with_offsets() {
    let config = crate::load_str(
        r#"
        [scheduling]
        initial_cycle_point = "20130924"
        final_cycle_point = "20130926"

        [[scheduling.graph]]
        recurrence = "P1D"
        edges = [
            { upstream = "foo", downstream = "bar" },
            { upstream = "foo", offset = "-P1D", downstream = "foo" },
        ]

        [runtime.root]
        [runtime.foo]
        script = "true"
        [runtime.bar]
        script = "true"
        "#,
    )
    .unwrap();

    assert_eq!(config.mode, CyclingMode::Gregorian);
    assert_eq!(config.bounds.initial.to_string(), "20130924T0000Z");

    let self_edge = config
        .edges
        .iter()
        .find(|e| e.upstream == "foo" && e.downstream == "foo")
        .unwrap();
    assert_eq!(
        self_edge.offset,
        OffsetSpec::Interval(CycleInterval::parse("-P1D").unwrap())
    );
}

#[test]
fn inheritance_resolves_lineage_and_settings() {
    let config = crate::load_str(
        r#"
        [scheduling]
        cycling_mode = "integer"

        [[scheduling.graph]]
        recurrence = "R1"
        tasks = ["sonde"]

        [runtime.root]
        platform = "hpc"
        [runtime.root.environment]
        SITE = "hq"

        [runtime.OBS]
        inherits = ["root"]
        [runtime.OBS.environment]
        KIND = "obs"

        [runtime.sonde]
        inherits = ["OBS"]
        script = "run-sonde"
        [runtime.sonde.environment]
        KIND = "sonde"
        "#,
    )
    .unwrap();

    let sonde = config.task("sonde").unwrap();
    assert_eq!(sonde.family_lineage, vec!["OBS", "root"]);
    assert_eq!(sonde.platform, "hpc");
    // Nearer namespace wins on key collision
    assert_eq!(sonde.environment["KIND"], "sonde");
    assert_eq!(sonde.environment["SITE"], "hq");
    assert_eq!(config.lineage("sonde"), &["OBS", "root"]);
}

#[test]
fn retry_delays_parse_into_intervals() {
    let config = crate::load_str(
        r#"
        [scheduling]
        cycling_mode = "integer"

        [[scheduling.graph]]
        recurrence = "R1"
        tasks = ["t1"]

        [runtime.root]
        [runtime.t1]
        script = "false"
        execution_retry_delays = ["PT1S", "PT1S"]
        "#,
    )
    .unwrap();

    let delays = &config.task("t1").unwrap().retry_delays;
    assert_eq!(delays.execution.len(), 2);
    assert_eq!(
        delays.execution_delay(1),
        Some(std::time::Duration::from_secs(1))
    );
    assert_eq!(delays.execution_delay(3), None);
}

#[test]
fn scheduler_events_and_tick_interval() {
    let config = crate::load_str(
        r#"
        [scheduling]
        cycling_mode = "integer"

        [[scheduling.graph]]
        recurrence = "R1"
        tasks = ["t1"]

        [runtime.root]
        [runtime.t1]
        script = "true"

        [scheduler]
        tick_interval = "PT2S"
        [scheduler.events]
        abort_on_stall_timeout = "PT0S"
        "#,
    )
    .unwrap();

    assert_eq!(config.tick_interval, std::time::Duration::from_secs(2));
    assert_eq!(
        config.events.abort_on_stall_timeout,
        Some(std::time::Duration::ZERO)
    );
    assert_eq!(config.events.abort_on_inactivity_timeout, None);
}

#[test]
fn xtrigger_edges_attach_to_tasks() {
    let config = crate::load_str(
        r#"
        [scheduling]
        cycling_mode = "integer"

        [scheduling.xtriggers.data_ready]
        function = "wall_clock"

        [[scheduling.graph]]
        recurrence = "R1"
        edges = [ { upstream = "@data_ready", downstream = "obs" } ]

        [runtime.root]
        [runtime.obs]
        script = "true"
        "#,
    )
    .unwrap();

    assert_eq!(config.task("obs").unwrap().xtriggers, vec!["data_ready"]);
    assert!(config.xtriggers.contains_key("data_ready"));
}

#[test]
fn content_hash_changes_with_text() {
    let a = crate::content_hash("alpha");
    let b = crate::content_hash("beta");
    assert_ne!(a, b);
    assert_eq!(a, crate::content_hash("alpha"));
}

#[test]
fn state_type_reexport_sanity() {
    // The scheduler relies on terminal-state classification downstream.
    assert!(TaskState::Succeeded.is_terminal());
}
