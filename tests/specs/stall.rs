//! Scenario: an unrecoverable failure stalls the workflow, which aborts
//! under `abort on stall timeout = PT0S`.

use crate::prelude::*;
use cad_engine::SchedulerExit;
use cad_platforms::JobPlan;

fn definition() -> String {
    format!(
        r#"
        name = "stall"

        [scheduling]
        cycling_mode = "integer"

        [[scheduling.graph]]
        recurrence = "R1"
        edges = [ {{ upstream = "foo", downstream = "bar" }} ]

        [runtime.root]
        [runtime.foo]
        script = "false"
        [runtime.bar]
        script = "true"

        [scheduler.events]
        abort_on_stall_timeout = "PT0S"
        {FAST_PLATFORM}
        "#
    )
}

#[tokio::test]
async fn failed_upstream_stalls_and_aborts() {
    let mut w = start(&definition());
    w.runner.plan("foo", JobPlan::FailExit(1));

    let exit = w.drive_to_exit(20).await;
    assert_eq!(exit, SchedulerExit::Stalled);

    assert_eq!(w.task_state("1", "foo").as_deref(), Some("failed"));
    assert_eq!(w.task_state("1", "bar").as_deref(), Some("waiting"));

    // bar never submitted: its prerequisite was never satisfied.
    assert_eq!(w.runner.submit_count("bar"), 0);

    // The stall was recorded against the incomplete task.
    let events = w.scheduler.store().task_events("1", "foo").unwrap();
    assert!(events.iter().any(|e| e.event == "stall"));
}

#[tokio::test]
async fn stall_exit_maps_to_a_nonzero_process_code() {
    // The daemon maps SchedulerExit::Stalled to exit code 2; verified
    // here against the same mapping the binary uses.
    assert_ne!(
        cad_daemon::exit_code(&Ok(cad_daemon::RunOutcome {
            exit: SchedulerExit::Stalled
        })),
        0
    );
}
