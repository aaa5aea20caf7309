// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use crate::error::ConfigError;

#[test]
fn missing_runtime_section_for_graph_task_is_fatal() {
    let err = crate::load_str(
        r#"
        [scheduling]
        cycling_mode = "integer"

        [[scheduling.graph]]
        recurrence = "R1"
        edges = [ { upstream = "foo", downstream = "bar" } ]

        [runtime.root]
        [runtime.foo]
        script = "true"
        "#,
    )
    .unwrap_err();
    assert!(matches!(err, ConfigError::UndefinedTask(name) if name == "bar"));
}

#[test]
fn inverted_cycle_range_is_fatal() {
    let err = crate::load_str(
        r#"
        [scheduling]
        initial_cycle_point = "20130926"
        final_cycle_point = "20130924"

        [[scheduling.graph]]
        recurrence = "R1"
        tasks = ["foo"]

        [runtime.root]
        [runtime.foo]
        script = "true"
        "#,
    )
    .unwrap_err();
    assert!(matches!(err, ConfigError::InvertedRange));
}

#[test]
fn undeclared_edge_output_is_fatal() {
    let err = crate::load_str(
        r#"
        [scheduling]
        cycling_mode = "integer"

        [[scheduling.graph]]
        recurrence = "R1"
        edges = [ { upstream = "foo", output = "ready", downstream = "bar" } ]

        [runtime.root]
        [runtime.foo]
        script = "true"
        [runtime.bar]
        script = "true"
        "#,
    )
    .unwrap_err();
    assert!(matches!(err, ConfigError::UndeclaredOutput { .. }));
}

#[test]
fn declared_custom_output_in_edge_is_accepted() {
    let config = crate::load_str(
        r#"
        [scheduling]
        cycling_mode = "integer"

        [[scheduling.graph]]
        recurrence = "R1"
        edges = [ { upstream = "foo", output = "ready", downstream = "bar" } ]

        [runtime.root]
        [runtime.foo]
        script = "true"
        [runtime.foo.outputs]
        ready = "data staged"
        [runtime.bar]
        script = "true"
        "#,
    )
    .unwrap();
    assert_eq!(config.edges[0].output, "ready");
}

#[test]
fn undeclared_xtrigger_is_fatal() {
    let err = crate::load_str(
        r#"
        [scheduling]
        cycling_mode = "integer"

        [[scheduling.graph]]
        recurrence = "R1"
        edges = [ { upstream = "@missing", downstream = "obs" } ]

        [runtime.root]
        [runtime.obs]
        script = "true"
        "#,
    )
    .unwrap_err();
    assert!(matches!(err, ConfigError::UndeclaredXtrigger(_)));
}

#[test]
fn inheritance_cycle_is_fatal() {
    let err = crate::load_str(
        r#"
        [scheduling]
        cycling_mode = "integer"

        [[scheduling.graph]]
        recurrence = "R1"
        tasks = ["a"]

        [runtime.root]
        [runtime.a]
        inherits = ["b"]
        script = "true"
        [runtime.b]
        inherits = ["a"]
        "#,
    )
    .unwrap_err();
    assert!(matches!(err, ConfigError::InheritanceCycle(_)));
}

#[test]
fn unknown_parent_is_fatal() {
    let err = crate::load_str(
        r#"
        [scheduling]
        cycling_mode = "integer"

        [[scheduling.graph]]
        recurrence = "R1"
        tasks = ["a"]

        [runtime.root]
        [runtime.a]
        inherits = ["GHOST"]
        script = "true"
        "#,
    )
    .unwrap_err();
    assert!(matches!(err, ConfigError::UnknownParent { .. }));
}

#[test]
fn completion_expression_must_reference_declared_outputs() {
    let err = crate::load_str(
        r#"
        [scheduling]
        cycling_mode = "integer"

        [[scheduling.graph]]
        recurrence = "R1"
        tasks = ["t1"]

        [runtime.root]
        [runtime.t1]
        script = "true"
        completion = { any = ["succeeded", "archived"] }
        "#,
    )
    .unwrap_err();
    assert!(matches!(err, ConfigError::UndeclaredOutput { .. }));
}
