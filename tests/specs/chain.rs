//! Scenario: a simple non-cycling chain runs to completion.

use crate::prelude::*;
use cad_engine::SchedulerExit;

fn definition() -> String {
    format!(
        r#"
        name = "chain"

        [scheduling]
        cycling_mode = "integer"

        [[scheduling.graph]]
        recurrence = "R1"
        edges = [
            {{ upstream = "foo", downstream = "bar" }},
            {{ upstream = "bar", downstream = "baz" }},
        ]

        [runtime.root]
        [runtime.foo]
        script = "true"
        [runtime.bar]
        script = "true"
        [runtime.baz]
        script = "true"
        {FAST_PLATFORM}
        "#
    )
}

#[tokio::test]
async fn all_tasks_succeed_and_the_pool_drains() {
    let mut w = start(&definition());
    let exit = w.drive_to_exit(30).await;
    assert_eq!(exit, SchedulerExit::Completed);

    for name in ["foo", "bar", "baz"] {
        assert_eq!(w.task_state("1", name).as_deref(), Some("succeeded"), "{name}");
    }
    assert!(w.task_pool_rows().is_empty(), "task_pool must drain on success");
}

#[tokio::test]
async fn workflow_params_record_the_run() {
    let mut w = start(&definition());
    w.drive_to_exit(30).await;

    assert!(w.param("cadence_version").is_some());
    assert_eq!(w.param("UTC_mode").as_deref(), Some("1"));
    assert_eq!(w.param("cycle_point_format").as_deref(), Some("integer"));
    assert_eq!(w.param("uuid").as_deref(), Some("spec-uuid"));
}

#[tokio::test]
async fn tasks_run_in_dependency_order() {
    let mut w = start(&definition());
    w.drive_to_exit(30).await;

    let submits: Vec<String> = w
        .runner
        .calls()
        .into_iter()
        .filter_map(|c| match c {
            cad_platforms::RunnerCall::Submit { task, .. } => Some(task),
            _ => None,
        })
        .collect();
    assert_eq!(submits, vec!["foo", "bar", "baz"]);
}

#[tokio::test]
async fn each_task_submits_exactly_once() {
    let mut w = start(&definition());
    w.drive_to_exit(30).await;

    for name in ["foo", "bar", "baz"] {
        assert_eq!(w.runner.submit_count(name), 1, "{name}");
        let rows = w.scheduler.store().job_rows("1", name).unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].submit_num, 1);
        assert_eq!(rows[0].run_status, Some(0));
        assert!(!rows[0].is_manual_submit);
    }
}
