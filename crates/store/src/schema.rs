// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Table definitions.

pub(crate) const CREATE_TABLES: &str = "
CREATE TABLE IF NOT EXISTS workflow_params (
    key TEXT PRIMARY KEY,
    value TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS task_pool (
    cycle TEXT NOT NULL,
    name TEXT NOT NULL,
    flow_nums TEXT NOT NULL,
    status TEXT NOT NULL,
    is_held INTEGER NOT NULL DEFAULT 0,
    PRIMARY KEY (cycle, name, flow_nums)
);

CREATE TABLE IF NOT EXISTS task_states (
    cycle TEXT NOT NULL,
    name TEXT NOT NULL,
    flow_nums TEXT NOT NULL,
    status TEXT NOT NULL,
    submit_num INTEGER NOT NULL DEFAULT 0,
    time_created TEXT NOT NULL,
    time_updated TEXT NOT NULL,
    PRIMARY KEY (cycle, name, flow_nums)
);

CREATE TABLE IF NOT EXISTS task_jobs (
    cycle TEXT NOT NULL,
    name TEXT NOT NULL,
    submit_num INTEGER NOT NULL,
    try_num INTEGER NOT NULL DEFAULT 1,
    submit_status INTEGER,
    run_status INTEGER,
    platform_name TEXT NOT NULL DEFAULT '',
    job_runner_name TEXT NOT NULL DEFAULT '',
    job_id TEXT,
    time_submit TEXT,
    time_submit_exit TEXT,
    time_run TEXT,
    time_run_exit TEXT,
    is_manual_submit INTEGER NOT NULL DEFAULT 0,
    PRIMARY KEY (cycle, name, submit_num)
);

CREATE TABLE IF NOT EXISTS task_events (
    cycle TEXT NOT NULL,
    name TEXT NOT NULL,
    submit_num INTEGER NOT NULL DEFAULT 0,
    event TEXT NOT NULL,
    message TEXT NOT NULL DEFAULT '',
    time TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS broadcast_states (
    point TEXT NOT NULL,
    namespace TEXT NOT NULL,
    key TEXT NOT NULL,
    value TEXT NOT NULL,
    PRIMARY KEY (point, namespace, key)
);

CREATE TABLE IF NOT EXISTS broadcast_events (
    time TEXT NOT NULL,
    change TEXT NOT NULL,
    point TEXT NOT NULL,
    namespace TEXT NOT NULL,
    key TEXT NOT NULL,
    value TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS inheritance (
    namespace TEXT PRIMARY KEY,
    lineage_json TEXT NOT NULL
);
";
