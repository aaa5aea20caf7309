//! Scenario: multicycle run, stop, restart with an extended final point.

use crate::prelude::*;
use cad_engine::SchedulerExit;

fn definition(fcp: &str) -> String {
    format!(
        r#"
        name = "multicycle"

        [scheduling]
        initial_cycle_point = "20130924"
        final_cycle_point = "{fcp}"

        [[scheduling.graph]]
        recurrence = "P1D"
        edges = [
            {{ upstream = "foo", downstream = "bar" }},
            {{ upstream = "foo", offset = "-P1D", downstream = "foo" }},
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
async fn restart_continues_without_resubmitting_earlier_cycles() {
    // First run: a single day.
    let mut w = start(&definition("20130924"));
    let exit = w.drive_to_exit(30).await;
    assert_eq!(exit, SchedulerExit::Completed);
    assert_eq!(w.task_state("20130924T0000Z", "foo").as_deref(), Some("succeeded"));
    assert_eq!(w.task_state("20130924T0000Z", "bar").as_deref(), Some("succeeded"));
    assert_eq!(w.runner.submit_count("foo"), 1);

    let dir = w.dir;
    drop(w.scheduler);

    // Restart with the final point pushed out two days.
    let mut w2 = start_in(&definition("20130926"), dir);
    let exit = w2.drive_to_exit(60).await;
    assert_eq!(exit, SchedulerExit::Completed);

    for cycle in ["20130925T0000Z", "20130926T0000Z"] {
        assert_eq!(w2.task_state(cycle, "foo").as_deref(), Some("succeeded"), "{cycle}");
        assert_eq!(w2.task_state(cycle, "bar").as_deref(), Some("succeeded"), "{cycle}");
    }

    // The completed first cycle was not resubmitted: two new cycles,
    // two submissions per task.
    assert_eq!(w2.runner.submit_count("foo"), 2);
    assert_eq!(w2.runner.submit_count("bar"), 2);
    assert_eq!(
        w2.scheduler
            .store()
            .job_rows("20130924T0000Z", "foo")
            .unwrap()
            .len(),
        1,
        "no duplicate job row for the finished cycle"
    );
    assert!(w2.task_pool_rows().is_empty());
}

#[tokio::test]
async fn mid_run_kill_recovers_to_the_committed_state() {
    let mut w = start(&definition("20130926"));
    // Let the first cycle finish and the second get underway, then drop
    // the scheduler cold (no clean stop).
    w.drive(8).await;
    let committed_states = w.scheduler.store().load_task_states().unwrap();
    let dir = w.dir;
    drop(w.scheduler);

    let w2 = start_in(&definition("20130926"), dir);
    let recovered = w2.scheduler.store().load_task_states().unwrap();

    // Recovery starts from exactly what was committed: every row is
    // still there, byte for byte.
    for row in &committed_states {
        assert!(
            recovered.iter().any(|r| r == row),
            "missing recovered row for {}/{}",
            row.cycle,
            row.name
        );
    }
}
