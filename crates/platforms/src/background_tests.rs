// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use crate::runner::{JobContext, JobRef, JobRunner, SubmitOutcome};
use cad_core::PollState;
use std::time::Duration;

fn ctx(dir: &std::path::Path, script: &str) -> JobContext {
    JobContext {
        point: "1".to_string(),
        name: "t1".to_string(),
        submit_num: 1,
        platform: "localhost".to_string(),
        script: script.to_string(),
        environment: vec![("GREETING".to_string(), "hi".to_string())],
        job_dir: dir.to_path_buf(),
        execution_time_limit: None,
    }
}

fn to_ref(ctx: &JobContext, job_id: &str) -> JobRef {
    JobRef {
        point: ctx.point.clone(),
        name: ctx.name.clone(),
        submit_num: ctx.submit_num,
        job_id: job_id.to_string(),
        job_dir: ctx.job_dir.clone(),
    }
}

async fn poll_until_terminal(runner: &BackgroundRunner, job: &JobRef) -> PollState {
    for _ in 0..100 {
        let results = runner.poll(std::slice::from_ref(job)).await.unwrap();
        match &results[0].state {
            PollState::Running | PollState::Submitted => {
                tokio::time::sleep(Duration::from_millis(20)).await;
            }
            state => return state.clone(),
        }
    }
    panic!("job never reached a terminal poll state");
}

#[tokio::test]
async fn successful_job_writes_zero_status() {
    let dir = tempfile::tempdir().unwrap();
    let ctx = ctx(dir.path(), "true");
    let runner = BackgroundRunner::new();

    let job_id = match runner.submit(ctx.clone()).await.unwrap() {
        SubmitOutcome::Submitted { job_id } => job_id,
        SubmitOutcome::Failed { error } => panic!("submit failed: {error}"),
    };

    let state = poll_until_terminal(&runner, &to_ref(&ctx, &job_id)).await;
    assert_eq!(state, PollState::Succeeded);
}

#[tokio::test]
async fn failing_job_reports_exit_status() {
    let dir = tempfile::tempdir().unwrap();
    let ctx = ctx(dir.path(), "exit 3");
    let runner = BackgroundRunner::new();

    let job_id = match runner.submit(ctx.clone()).await.unwrap() {
        SubmitOutcome::Submitted { job_id } => job_id,
        SubmitOutcome::Failed { error } => panic!("submit failed: {error}"),
    };

    let state = poll_until_terminal(&runner, &to_ref(&ctx, &job_id)).await;
    assert_eq!(
        state,
        PollState::Failed {
            exit_status: Some(3)
        }
    );
}

#[tokio::test]
async fn job_environment_is_passed_through() {
    let dir = tempfile::tempdir().unwrap();
    let ctx = ctx(dir.path(), "test \"$GREETING\" = hi");
    let runner = BackgroundRunner::new();

    let job_id = match runner.submit(ctx.clone()).await.unwrap() {
        SubmitOutcome::Submitted { job_id } => job_id,
        SubmitOutcome::Failed { error } => panic!("submit failed: {error}"),
    };
    let state = poll_until_terminal(&runner, &to_ref(&ctx, &job_id)).await;
    assert_eq!(state, PollState::Succeeded);
}

#[tokio::test]
async fn missing_job_polls_as_gone() {
    let dir = tempfile::tempdir().unwrap();
    let ctx = ctx(dir.path(), "true");
    let runner = BackgroundRunner::new();

    // Never submitted: no pid, no status file
    let job = to_ref(&ctx, "999999999");
    let results = runner.poll(&[job]).await.unwrap();
    assert_eq!(results[0].state, PollState::Gone);
}
