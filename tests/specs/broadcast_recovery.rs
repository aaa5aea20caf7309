//! Scenario: recover a failed task by broadcasting an environment fix
//! and re-triggering it.

use crate::prelude::*;
use cad_core::{Command, FlowSpec, TaskMatcher};
use cad_platforms::JobPlan;

fn definition() -> String {
    format!(
        r#"
        name = "broadcast-recovery"

        [scheduling]
        cycling_mode = "integer"

        [[scheduling.graph]]
        recurrence = "R1"
        tasks = ["t1"]

        [runtime.root]
        [runtime.t1]
        script = "echo $HELLO"
        {FAST_PLATFORM}
        "#
    )
}

#[tokio::test]
async fn broadcast_then_trigger_reruns_with_the_override() {
    let mut w = start(&definition());
    // t1 fails first (no HELLO in its environment), succeeds after.
    w.runner.plan_all("t1", [JobPlan::FailExit(1)]);

    w.drive(6).await;
    assert_eq!(w.task_state("1", "t1").as_deref(), Some("failed"));

    // Broadcast the fix to t1, then trigger it again.
    w.command(Command::BroadcastSet {
        point: "1".to_string(),
        namespace: "t1".to_string(),
        setting: "[environment]HELLO".to_string(),
        value: serde_json::json!("Hello"),
    })
    .await
    .unwrap();
    w.command(Command::Trigger {
        matcher: TaskMatcher::new(Some("1"), "t1"),
        flow: FlowSpec::Same,
        wait: false,
    })
    .await
    .unwrap();

    w.drive(20).await;
    assert_eq!(w.task_state("1", "t1").as_deref(), Some("succeeded"));

    // The broadcast mutation was logged.
    let events = w.scheduler.store().load_broadcast_events().unwrap();
    assert_eq!(events.len(), 1);
    assert_eq!(
        (
            events[0].change.as_str(),
            events[0].point.as_str(),
            events[0].namespace.as_str(),
            events[0].key.as_str(),
            events[0].value.as_str(),
        ),
        ("+", "1", "t1", "[environment]HELLO", "\"Hello\"")
    );

    // Two job rows; the second was a manual submission carrying the
    // broadcast environment.
    let rows = w.scheduler.store().job_rows("1", "t1").unwrap();
    assert_eq!(rows.len(), 2);
    assert_eq!(rows[0].submit_num, 1);
    assert!(!rows[0].is_manual_submit);
    assert_eq!(rows[1].submit_num, 2);
    assert!(rows[1].is_manual_submit);
    assert_eq!(rows[1].run_status, Some(0));

    let env = w.runner.environment_of("fake-2").unwrap();
    assert!(env.contains(&("HELLO".to_string(), "Hello".to_string())));
}

#[tokio::test]
async fn broadcast_state_survives_restart() {
    let mut w = start(&definition());
    w.runner.plan_all("t1", [JobPlan::FailExit(1)]);
    w.drive(6).await;

    w.command(Command::BroadcastSet {
        point: "1".to_string(),
        namespace: "t1".to_string(),
        setting: "[environment]HELLO".to_string(),
        value: serde_json::json!("Hello"),
    })
    .await
    .unwrap();

    let dir = w.dir;
    drop(w.scheduler);

    // Restart: the overlay is rebuilt from broadcast_states, so the
    // re-trigger still picks up the fix.
    let mut w2 = start_in(&definition(), dir);
    w2.command(Command::Trigger {
        matcher: TaskMatcher::new(Some("1"), "t1"),
        flow: FlowSpec::Same,
        wait: false,
    })
    .await
    .unwrap();
    w2.drive(20).await;

    assert_eq!(w2.task_state("1", "t1").as_deref(), Some("succeeded"));
    let env = w2.runner.environment_of("fake-1").unwrap();
    assert!(env.contains(&("HELLO".to_string(), "Hello".to_string())));
}
