// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Typed row structs returned by recovery and history queries.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskPoolRow {
    pub cycle: String,
    pub name: String,
    pub flow_nums: String,
    pub status: String,
    pub is_held: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskStateRow {
    pub cycle: String,
    pub name: String,
    pub flow_nums: String,
    pub status: String,
    pub submit_num: u32,
    pub time_created: String,
    pub time_updated: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobRow {
    pub cycle: String,
    pub name: String,
    pub submit_num: u32,
    pub try_num: u32,
    pub submit_status: Option<i32>,
    pub run_status: Option<i32>,
    pub platform_name: String,
    pub job_runner_name: String,
    pub job_id: Option<String>,
    pub time_submit: Option<String>,
    pub time_submit_exit: Option<String>,
    pub time_run: Option<String>,
    pub time_run_exit: Option<String>,
    pub is_manual_submit: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskEventRow {
    pub cycle: String,
    pub name: String,
    pub submit_num: u32,
    pub event: String,
    pub message: String,
    pub time: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BroadcastStateRow {
    pub point: String,
    pub namespace: String,
    pub key: String,
    pub value: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BroadcastEventRow {
    pub time: String,
    pub change: String,
    pub point: String,
    pub namespace: String,
    pub key: String,
    pub value: String,
}
