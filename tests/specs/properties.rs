//! Cross-cutting properties: submit-number monotonicity, the runahead
//! bound, spawn-on-demand accounting, and prerequisite ordering.

use crate::prelude::*;
use cad_engine::SchedulerExit;
use cad_platforms::JobPlan;

fn cycling_definition() -> String {
    format!(
        r#"
        name = "cycling"

        [scheduling]
        cycling_mode = "integer"
        initial_cycle_point = "1"
        final_cycle_point = "6"
        runahead_limit = "P2"

        [[scheduling.graph]]
        recurrence = "P1"
        edges = [
            {{ upstream = "foo", offset = "-P1", downstream = "foo" }},
            {{ upstream = "foo", downstream = "bar" }},
        ]

        [runtime.root]
        [runtime.foo]
        script = "true"
        [runtime.bar]
        script = "true"
        {FAST_PLATFORM}
        "#
    )
}

#[tokio::test]
async fn runahead_bound_holds_at_every_tick() {
    let mut w = start(&cycling_definition());

    for _ in 0..60 {
        if w.scheduler.exit_state().is_some() {
            break;
        }
        w.round().await;

        if let Some((min, max)) = w.scheduler.pool().active_span() {
            let span = match max.diff(&min).unwrap() {
                cad_core::CycleInterval::Steps(n) => n,
                other => panic!("unexpected span interval {other:?}"),
            };
            assert!(span <= 2, "active span {span} exceeded the P2 runahead limit");
        }
    }
    assert_eq!(w.scheduler.exit_state(), Some(&SchedulerExit::Completed));
}

#[tokio::test]
async fn all_cycles_complete_in_order() {
    let mut w = start(&cycling_definition());
    let exit = w.drive_to_exit(80).await;
    assert_eq!(exit, SchedulerExit::Completed);

    for cycle in 1..=6 {
        let cycle = cycle.to_string();
        assert_eq!(w.task_state(&cycle, "foo").as_deref(), Some("succeeded"));
        assert_eq!(w.task_state(&cycle, "bar").as_deref(), Some("succeeded"));
    }

    // foo's cycles submitted in cycle order.
    let foo_submits: Vec<String> = w
        .scheduler
        .store()
        .all_job_rows()
        .unwrap()
        .into_iter()
        .filter(|r| r.name == "foo")
        .map(|r| r.cycle)
        .collect();
    let mut sorted = foo_submits.clone();
    sorted.sort();
    assert_eq!(foo_submits, sorted);
}

#[tokio::test]
async fn submit_numbers_are_monotonic_per_instance() {
    let definition = format!(
        r#"
        [scheduling]
        cycling_mode = "integer"

        [[scheduling.graph]]
        recurrence = "R1"
        tasks = ["t1"]

        [runtime.root]
        [runtime.t1]
        script = "flaky"
        execution_retry_delays = ["PT1S", "PT1S", "PT1S"]
        {FAST_PLATFORM}
        "#
    );
    let mut w = start(&definition);
    w.runner.plan_all(
        "t1",
        [
            JobPlan::FailExit(1),
            JobPlan::FailExit(2),
            JobPlan::FailExit(3),
            JobPlan::Succeed,
        ],
    );
    w.drive_to_exit(60).await;

    let rows = w.scheduler.store().job_rows("1", "t1").unwrap();
    assert_eq!(rows.len(), 4);
    for window in rows.windows(2) {
        assert!(window[0].submit_num < window[1].submit_num);
        assert!(window[0].time_submit <= window[1].time_submit);
    }
}

#[tokio::test]
async fn no_speculative_proxies_are_created() {
    let mut w = start(&cycling_definition());
    w.drive_to_exit(80).await;

    // Exactly the instances that ran have state rows: 6 cycles x 2 tasks.
    let rows = w.scheduler.store().load_task_states().unwrap();
    assert_eq!(rows.len(), 12);
}

#[tokio::test]
async fn downstream_submits_only_after_upstream_exit() {
    let mut w = start(&cycling_definition());
    w.drive_to_exit(80).await;

    let store = w.scheduler.store();
    for cycle in 1..=6 {
        let cycle = cycle.to_string();
        let foo = &store.job_rows(&cycle, "foo").unwrap()[0];
        let bar = &store.job_rows(&cycle, "bar").unwrap()[0];
        assert!(
            bar.time_submit >= foo.time_run_exit,
            "cycle {cycle}: bar submitted before foo finished"
        );
    }
}
