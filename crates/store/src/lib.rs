// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

// Allow panic!/unwrap/expect in test code
#![cfg_attr(test, allow(clippy::panic))]
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

//! cad-store: the embedded relational store backing scheduler recovery.
//!
//! Writes are buffered on the main loop and flushed in a single
//! transaction per tick, before any external acknowledgement — the
//! durability point. On restart the pool, broadcast overlay, and
//! workflow parameters are reconstructed from the tables.

mod dao;
mod rows;
mod schema;

pub use dao::{PendingWrite, WorkflowStore};
pub use rows::{
    BroadcastEventRow, BroadcastStateRow, JobRow, TaskEventRow, TaskPoolRow, TaskStateRow,
};

use thiserror::Error;

/// Errors from store operations.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("sqlite error: {0}")]
    Sqlite(#[from] rusqlite::Error),
    #[error("store flush failed after retry: {0}")]
    FlushFailed(String),
    #[error("corrupt row in {table}: {message}")]
    Corrupt { table: String, message: String },
}

/// Format epoch milliseconds as the store's canonical UTC timestamp.
pub fn format_time(epoch_ms: u64) -> String {
    chrono::DateTime::<chrono::Utc>::from_timestamp_millis(epoch_ms as i64)
        .map(|dt| dt.format("%Y-%m-%dT%H:%M:%S%.3fZ").to_string())
        .unwrap_or_else(|| "1970-01-01T00:00:00.000Z".to_string())
}

/// Parse the canonical timestamp back to epoch milliseconds.
pub fn parse_time(s: &str) -> Option<u64> {
    chrono::DateTime::parse_from_rfc3339(s)
        .ok()
        .map(|dt| dt.timestamp_millis().max(0) as u64)
}
