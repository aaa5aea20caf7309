// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use crate::point::CyclePoint;

#[test]
fn retry_timer_carries_its_task() {
    let id = TimerId::retry(&CyclePoint::integer(3), "foo");
    assert_eq!(id.kind(), TimerKind::Retry);
    let task = id.task().unwrap();
    assert_eq!(task.name, "foo");
    assert_eq!(task.point, CyclePoint::integer(3));
}

#[test]
fn poll_timer_carries_submit_num() {
    let id = TimerId::poll(&CyclePoint::integer(1), "bar", 2);
    assert_eq!(id.kind(), TimerKind::Poll);
    assert!(matches!(id, TimerId::Poll { submit_num: 2, .. }));
}

#[test]
fn distinct_submit_nums_are_distinct_timers() {
    let first = TimerId::poll(&CyclePoint::integer(1), "bar", 1);
    let second = TimerId::poll(&CyclePoint::integer(1), "bar", 2);
    assert_ne!(first, second);
}

#[test]
fn xtrigger_timer_carries_label_and_point() {
    let id = TimerId::xtrigger("data_ready", &CyclePoint::integer(2));
    assert_eq!(id.kind(), TimerKind::Xtrigger);
    assert!(id.task().is_none());
    match id {
        TimerId::Xtrigger { label, point } => {
            assert_eq!(label, "data_ready");
            assert_eq!(point, CyclePoint::integer(2));
        }
        other => panic!("unexpected timer: {other:?}"),
    }
}

#[test]
fn watchdog_timers_have_no_task() {
    assert_eq!(TimerId::stall().kind(), TimerKind::Stall);
    assert_eq!(TimerId::inactivity().kind(), TimerKind::Inactivity);
    assert!(TimerId::stall().task().is_none());
}

#[yare::parameterized(
    retry = { TimerId::retry(&CyclePoint::integer(3), "foo"), "retry:3/foo" },
    poll = { TimerId::poll(&CyclePoint::integer(1), "bar", 2), "poll:1/bar/02" },
    expire = { TimerId::expire(&CyclePoint::integer(5), "obs"), "expire:5/obs" },
    xtrigger = { TimerId::xtrigger("ready", &CyclePoint::integer(2)), "xtrigger:ready:2" },
    stall = { TimerId::stall(), "stall" },
)]
fn display_names_the_timer(id: TimerId, expected: &str) {
    assert_eq!(id.to_string(), expected);
}

#[test]
fn serde_round_trip() {
    let id = TimerId::poll(&CyclePoint::integer(1), "bar", 2);
    let json = serde_json::to_string(&id).unwrap();
    let back: TimerId = serde_json::from_str(&json).unwrap();
    assert_eq!(id, back);
}
