//! Scenario: triggering a task in a new flow while the first flow is
//! still upstream of it.

use crate::prelude::*;
use cad_core::{Command, FlowSpec, TaskMatcher};
use cad_engine::SchedulerExit;
use cad_platforms::JobPlan;

fn definition() -> String {
    format!(
        r#"
        name = "flows"

        [scheduling]
        cycling_mode = "integer"

        [[scheduling.graph]]
        recurrence = "R1"
        edges = [
            {{ upstream = "a", downstream = "b" }},
            {{ upstream = "b", downstream = "c" }},
            {{ upstream = "c", downstream = "d" }},
        ]

        [runtime.root]
        [runtime.a]
        script = "true"
        [runtime.b]
        script = "true"
        [runtime.c]
        script = "true"
        [runtime.d]
        script = "true"
        {FAST_PLATFORM}
        "#
    )
}

#[tokio::test]
async fn new_flow_trigger_runs_independently_and_never_merges() {
    let mut w = start(&definition());
    // Keep `a` running long enough to trigger `d` out of band.
    w.runner.plan("a", JobPlan::SucceedAfter { polls: 4 });

    w.drive(2).await;
    assert_eq!(w.runner.submit_count("a"), 1);

    // Trigger d in a brand-new flow while a is still running.
    let outcome = w
        .command(Command::Trigger {
            matcher: TaskMatcher::new(Some("1"), "d"),
            flow: FlowSpec::New,
            wait: false,
        })
        .await
        .unwrap();
    assert_eq!(outcome.matched, 1);

    // The whole graph still runs to completion in flow 1.
    let exit = w.drive_to_exit(60).await;
    assert_eq!(exit, SchedulerExit::Completed);

    // Two task_states rows for d, one per flow, which never merged.
    let d_rows: Vec<_> = w
        .scheduler
        .store()
        .load_task_states()
        .unwrap()
        .into_iter()
        .filter(|r| r.name == "d")
        .collect();
    assert_eq!(d_rows.len(), 2, "one row per flow: {d_rows:?}");
    let mut flows: Vec<String> = d_rows.iter().map(|r| r.flow_nums.clone()).collect();
    flows.sort();
    assert_eq!(flows, vec!["[1]".to_string(), "[2]".to_string()]);
    assert!(d_rows.iter().all(|r| r.status == "succeeded"));

    // d ran twice with monotonic submit numbers.
    let jobs = w.scheduler.store().job_rows("1", "d").unwrap();
    assert_eq!(jobs.len(), 2);
    assert_eq!(jobs[0].submit_num, 1);
    assert!(jobs[0].is_manual_submit);
    assert_eq!(jobs[1].submit_num, 2);
    assert!(!jobs[1].is_manual_submit);

    // Flow 2 never touched a, b, or c.
    for name in ["a", "b", "c"] {
        assert_eq!(w.runner.submit_count(name), 1, "{name}");
    }
}

#[tokio::test]
async fn flow_none_trigger_runs_without_spawning_downstream() {
    let mut w = start(&definition());
    w.runner.plan("a", JobPlan::RunForever);
    w.drive(2).await;

    // Run c alone, outside any flow: b and d must not follow.
    w.command(Command::Trigger {
        matcher: TaskMatcher::new(Some("1"), "c"),
        flow: FlowSpec::None,
        wait: false,
    })
    .await
    .unwrap();

    w.drive(10).await;
    assert_eq!(w.runner.submit_count("c"), 1);
    assert_eq!(w.runner.submit_count("d"), 0, "flow-none never spawns downstream");
}
