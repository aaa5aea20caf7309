// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! The workflow store: buffered writes, transactional flush, recovery
//! queries.

use crate::rows::{
    BroadcastEventRow, BroadcastStateRow, JobRow, TaskEventRow, TaskPoolRow, TaskStateRow,
};
use crate::{schema, StoreError};
use rusqlite::{params, Connection, OptionalExtension};
use std::collections::BTreeMap;
use std::path::Path;
use tracing::{error, warn};

/// One buffered mutation. Everything the scheduler persists goes through
/// this enum so a tick's writes can be replayed on flush retry.
#[derive(Debug, Clone)]
pub enum PendingWrite {
    SetParam {
        key: String,
        value: String,
    },
    UpsertTaskPool {
        cycle: String,
        name: String,
        flow_nums: String,
        status: String,
        is_held: bool,
    },
    DeleteTaskPool {
        cycle: String,
        name: String,
        flow_nums: String,
    },
    UpsertTaskState {
        cycle: String,
        name: String,
        flow_nums: String,
        status: String,
        submit_num: u32,
        time_created: String,
        time_updated: String,
    },
    InsertTaskJob(JobRow),
    UpdateJobSubmitOutcome {
        cycle: String,
        name: String,
        submit_num: u32,
        submit_status: i32,
        job_id: Option<String>,
        time_submit_exit: String,
    },
    UpdateJobRunStart {
        cycle: String,
        name: String,
        submit_num: u32,
        time_run: String,
    },
    UpdateJobRunExit {
        cycle: String,
        name: String,
        submit_num: u32,
        run_status: i32,
        time_run_exit: String,
    },
    InsertTaskEvent(TaskEventRow),
    UpsertBroadcastState {
        point: String,
        namespace: String,
        key: String,
        value: String,
    },
    DeleteBroadcastState {
        point: String,
        namespace: String,
        key: String,
    },
    InsertBroadcastEvent(BroadcastEventRow),
    UpsertInheritance {
        namespace: String,
        lineage_json: String,
    },
}

/// SQLite-backed store. Owned by the main loop; workers never touch it.
pub struct WorkflowStore {
    conn: Connection,
    pending: Vec<PendingWrite>,
}

impl WorkflowStore {
    /// Open (or create) the store at `path`.
    pub fn open(path: &Path) -> Result<Self, StoreError> {
        if let Some(parent) = path.parent() {
            if let Err(e) = std::fs::create_dir_all(parent) {
                warn!(path = %parent.display(), error = %e, "could not create store directory");
            }
        }
        let conn = Connection::open(path)?;
        Self::init(conn)
    }

    /// In-memory store for tests.
    pub fn open_in_memory() -> Result<Self, StoreError> {
        Self::init(Connection::open_in_memory()?)
    }

    fn init(conn: Connection) -> Result<Self, StoreError> {
        conn.pragma_update(None, "journal_mode", "wal")?;
        conn.pragma_update(None, "synchronous", "normal")?;
        conn.execute_batch(schema::CREATE_TABLES)?;
        Ok(Self {
            conn,
            pending: Vec::new(),
        })
    }

    /// Queue a write for the next flush.
    pub fn push(&mut self, write: PendingWrite) {
        self.pending.push(write);
    }

    pub fn has_pending(&self) -> bool {
        !self.pending.is_empty()
    }

    /// Commit all buffered writes in one transaction.
    ///
    /// This is the durability point. A failed transaction is retried once
    /// (the writes are still buffered); a second failure is returned to
    /// the caller, which aborts the scheduler to preserve the recovery
    /// invariant.
    pub fn flush(&mut self) -> Result<(), StoreError> {
        if self.pending.is_empty() {
            return Ok(());
        }

        match Self::commit(&mut self.conn, &self.pending) {
            Ok(()) => {
                self.pending.clear();
                Ok(())
            }
            Err(first) => {
                error!(error = %first, writes = self.pending.len(), "store flush failed, retrying once");
                match Self::commit(&mut self.conn, &self.pending) {
                    Ok(()) => {
                        self.pending.clear();
                        Ok(())
                    }
                    Err(second) => {
                        error!(error = %second, "store flush failed again");
                        Err(StoreError::FlushFailed(second.to_string()))
                    }
                }
            }
        }
    }

    fn commit(conn: &mut Connection, writes: &[PendingWrite]) -> Result<(), rusqlite::Error> {
        let tx = conn.transaction()?;
        for write in writes {
            if let Err(e) = Self::apply(&tx, write) {
                error!(write = ?write, error = %e, "store write failed");
                return Err(e);
            }
        }
        tx.commit()
    }

    fn apply(tx: &rusqlite::Transaction<'_>, write: &PendingWrite) -> Result<(), rusqlite::Error> {
        match write {
            PendingWrite::SetParam { key, value } => {
                tx.execute(
                    "INSERT INTO workflow_params (key, value) VALUES (?1, ?2)
                     ON CONFLICT(key) DO UPDATE SET value = ?2",
                    params![key, value],
                )?;
            }
            PendingWrite::UpsertTaskPool {
                cycle,
                name,
                flow_nums,
                status,
                is_held,
            } => {
                tx.execute(
                    "INSERT INTO task_pool (cycle, name, flow_nums, status, is_held)
                     VALUES (?1, ?2, ?3, ?4, ?5)
                     ON CONFLICT(cycle, name, flow_nums)
                     DO UPDATE SET status = ?4, is_held = ?5",
                    params![cycle, name, flow_nums, status, is_held],
                )?;
            }
            PendingWrite::DeleteTaskPool {
                cycle,
                name,
                flow_nums,
            } => {
                tx.execute(
                    "DELETE FROM task_pool WHERE cycle = ?1 AND name = ?2 AND flow_nums = ?3",
                    params![cycle, name, flow_nums],
                )?;
            }
            PendingWrite::UpsertTaskState {
                cycle,
                name,
                flow_nums,
                status,
                submit_num,
                time_created,
                time_updated,
            } => {
                tx.execute(
                    "INSERT INTO task_states
                       (cycle, name, flow_nums, status, submit_num, time_created, time_updated)
                     VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
                     ON CONFLICT(cycle, name, flow_nums)
                     DO UPDATE SET status = ?4, submit_num = ?5, time_updated = ?7",
                    params![cycle, name, flow_nums, status, submit_num, time_created, time_updated],
                )?;
            }
            PendingWrite::InsertTaskJob(row) => {
                tx.execute(
                    "INSERT OR REPLACE INTO task_jobs
                       (cycle, name, submit_num, try_num, submit_status, run_status,
                        platform_name, job_runner_name, job_id,
                        time_submit, time_submit_exit, time_run, time_run_exit,
                        is_manual_submit)
                     VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14)",
                    params![
                        row.cycle,
                        row.name,
                        row.submit_num,
                        row.try_num,
                        row.submit_status,
                        row.run_status,
                        row.platform_name,
                        row.job_runner_name,
                        row.job_id,
                        row.time_submit,
                        row.time_submit_exit,
                        row.time_run,
                        row.time_run_exit,
                        row.is_manual_submit,
                    ],
                )?;
            }
            PendingWrite::UpdateJobSubmitOutcome {
                cycle,
                name,
                submit_num,
                submit_status,
                job_id,
                time_submit_exit,
            } => {
                tx.execute(
                    "UPDATE task_jobs
                     SET submit_status = ?4, job_id = ?5, time_submit_exit = ?6
                     WHERE cycle = ?1 AND name = ?2 AND submit_num = ?3",
                    params![cycle, name, submit_num, submit_status, job_id, time_submit_exit],
                )?;
            }
            PendingWrite::UpdateJobRunStart {
                cycle,
                name,
                submit_num,
                time_run,
            } => {
                tx.execute(
                    "UPDATE task_jobs SET time_run = ?4
                     WHERE cycle = ?1 AND name = ?2 AND submit_num = ?3",
                    params![cycle, name, submit_num, time_run],
                )?;
            }
            PendingWrite::UpdateJobRunExit {
                cycle,
                name,
                submit_num,
                run_status,
                time_run_exit,
            } => {
                tx.execute(
                    "UPDATE task_jobs SET run_status = ?4, time_run_exit = ?5
                     WHERE cycle = ?1 AND name = ?2 AND submit_num = ?3",
                    params![cycle, name, submit_num, run_status, time_run_exit],
                )?;
            }
            PendingWrite::InsertTaskEvent(row) => {
                tx.execute(
                    "INSERT INTO task_events (cycle, name, submit_num, event, message, time)
                     VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
                    params![row.cycle, row.name, row.submit_num, row.event, row.message, row.time],
                )?;
            }
            PendingWrite::UpsertBroadcastState {
                point,
                namespace,
                key,
                value,
            } => {
                tx.execute(
                    "INSERT INTO broadcast_states (point, namespace, key, value)
                     VALUES (?1, ?2, ?3, ?4)
                     ON CONFLICT(point, namespace, key) DO UPDATE SET value = ?4",
                    params![point, namespace, key, value],
                )?;
            }
            PendingWrite::DeleteBroadcastState {
                point,
                namespace,
                key,
            } => {
                tx.execute(
                    "DELETE FROM broadcast_states
                     WHERE point = ?1 AND namespace = ?2 AND key = ?3",
                    params![point, namespace, key],
                )?;
            }
            PendingWrite::InsertBroadcastEvent(row) => {
                tx.execute(
                    "INSERT INTO broadcast_events (time, change, point, namespace, key, value)
                     VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
                    params![row.time, row.change, row.point, row.namespace, row.key, row.value],
                )?;
            }
            PendingWrite::UpsertInheritance {
                namespace,
                lineage_json,
            } => {
                tx.execute(
                    "INSERT INTO inheritance (namespace, lineage_json) VALUES (?1, ?2)
                     ON CONFLICT(namespace) DO UPDATE SET lineage_json = ?2",
                    params![namespace, lineage_json],
                )?;
            }
        }
        Ok(())
    }

    // ------------------------------------------------------------------
    // Recovery and history queries
    // ------------------------------------------------------------------

    pub fn param(&self, key: &str) -> Result<Option<String>, StoreError> {
        Ok(self
            .conn
            .query_row(
                "SELECT value FROM workflow_params WHERE key = ?1",
                params![key],
                |row| row.get(0),
            )
            .optional()?)
    }

    pub fn load_params(&self) -> Result<BTreeMap<String, String>, StoreError> {
        let mut stmt = self
            .conn
            .prepare("SELECT key, value FROM workflow_params")?;
        let rows = stmt.query_map([], |row| Ok((row.get(0)?, row.get(1)?)))?;
        let mut out = BTreeMap::new();
        for row in rows {
            let (k, v): (String, String) = row?;
            out.insert(k, v);
        }
        Ok(out)
    }

    pub fn load_task_pool(&self) -> Result<Vec<TaskPoolRow>, StoreError> {
        let mut stmt = self.conn.prepare(
            "SELECT cycle, name, flow_nums, status, is_held FROM task_pool
             ORDER BY cycle, name",
        )?;
        let rows = stmt.query_map([], |row| {
            Ok(TaskPoolRow {
                cycle: row.get(0)?,
                name: row.get(1)?,
                flow_nums: row.get(2)?,
                status: row.get(3)?,
                is_held: row.get(4)?,
            })
        })?;
        rows.collect::<Result<Vec<_>, _>>().map_err(Into::into)
    }

    pub fn load_task_states(&self) -> Result<Vec<TaskStateRow>, StoreError> {
        let mut stmt = self.conn.prepare(
            "SELECT cycle, name, flow_nums, status, submit_num, time_created, time_updated
             FROM task_states ORDER BY cycle, name, flow_nums",
        )?;
        let rows = stmt.query_map([], |row| {
            Ok(TaskStateRow {
                cycle: row.get(0)?,
                name: row.get(1)?,
                flow_nums: row.get(2)?,
                status: row.get(3)?,
                submit_num: row.get(4)?,
                time_created: row.get(5)?,
                time_updated: row.get(6)?,
            })
        })?;
        rows.collect::<Result<Vec<_>, _>>().map_err(Into::into)
    }

    /// Job rows for one task instance, ordered by submit number.
    pub fn job_rows(&self, cycle: &str, name: &str) -> Result<Vec<JobRow>, StoreError> {
        let mut stmt = self.conn.prepare(
            "SELECT cycle, name, submit_num, try_num, submit_status, run_status,
                    platform_name, job_runner_name, job_id,
                    time_submit, time_submit_exit, time_run, time_run_exit, is_manual_submit
             FROM task_jobs WHERE cycle = ?1 AND name = ?2 ORDER BY submit_num",
        )?;
        let rows = stmt.query_map(params![cycle, name], Self::job_row)?;
        rows.collect::<Result<Vec<_>, _>>().map_err(Into::into)
    }

    /// Every job row, ordered by submission time.
    pub fn all_job_rows(&self) -> Result<Vec<JobRow>, StoreError> {
        let mut stmt = self.conn.prepare(
            "SELECT cycle, name, submit_num, try_num, submit_status, run_status,
                    platform_name, job_runner_name, job_id,
                    time_submit, time_submit_exit, time_run, time_run_exit, is_manual_submit
             FROM task_jobs ORDER BY time_submit, cycle, name, submit_num",
        )?;
        let rows = stmt.query_map([], Self::job_row)?;
        rows.collect::<Result<Vec<_>, _>>().map_err(Into::into)
    }

    fn job_row(row: &rusqlite::Row<'_>) -> Result<JobRow, rusqlite::Error> {
        Ok(JobRow {
            cycle: row.get(0)?,
            name: row.get(1)?,
            submit_num: row.get(2)?,
            try_num: row.get(3)?,
            submit_status: row.get(4)?,
            run_status: row.get(5)?,
            platform_name: row.get(6)?,
            job_runner_name: row.get(7)?,
            job_id: row.get(8)?,
            time_submit: row.get(9)?,
            time_submit_exit: row.get(10)?,
            time_run: row.get(11)?,
            time_run_exit: row.get(12)?,
            is_manual_submit: row.get(13)?,
        })
    }

    pub fn task_events(&self, cycle: &str, name: &str) -> Result<Vec<TaskEventRow>, StoreError> {
        let mut stmt = self.conn.prepare(
            "SELECT cycle, name, submit_num, event, message, time
             FROM task_events WHERE cycle = ?1 AND name = ?2 ORDER BY rowid",
        )?;
        let rows = stmt.query_map(params![cycle, name], |row| {
            Ok(TaskEventRow {
                cycle: row.get(0)?,
                name: row.get(1)?,
                submit_num: row.get(2)?,
                event: row.get(3)?,
                message: row.get(4)?,
                time: row.get(5)?,
            })
        })?;
        rows.collect::<Result<Vec<_>, _>>().map_err(Into::into)
    }

    /// Latest `retry scheduled` event per task instance, for re-arming
    /// retry timers on restart. The message holds the absolute fire time.
    pub fn retry_schedules(&self) -> Result<Vec<TaskEventRow>, StoreError> {
        let mut stmt = self.conn.prepare(
            "SELECT cycle, name, submit_num, event, message, MAX(time)
             FROM task_events WHERE event = 'retry scheduled'
             GROUP BY cycle, name",
        )?;
        let rows = stmt.query_map([], |row| {
            Ok(TaskEventRow {
                cycle: row.get(0)?,
                name: row.get(1)?,
                submit_num: row.get(2)?,
                event: row.get(3)?,
                message: row.get(4)?,
                time: row.get(5)?,
            })
        })?;
        rows.collect::<Result<Vec<_>, _>>().map_err(Into::into)
    }

    pub fn load_broadcast_states(&self) -> Result<Vec<BroadcastStateRow>, StoreError> {
        let mut stmt = self.conn.prepare(
            "SELECT point, namespace, key, value FROM broadcast_states
             ORDER BY point, namespace, key",
        )?;
        let rows = stmt.query_map([], |row| {
            Ok(BroadcastStateRow {
                point: row.get(0)?,
                namespace: row.get(1)?,
                key: row.get(2)?,
                value: row.get(3)?,
            })
        })?;
        rows.collect::<Result<Vec<_>, _>>().map_err(Into::into)
    }

    pub fn load_broadcast_events(&self) -> Result<Vec<BroadcastEventRow>, StoreError> {
        let mut stmt = self.conn.prepare(
            "SELECT time, change, point, namespace, key, value FROM broadcast_events
             ORDER BY rowid",
        )?;
        let rows = stmt.query_map([], |row| {
            Ok(BroadcastEventRow {
                time: row.get(0)?,
                change: row.get(1)?,
                point: row.get(2)?,
                namespace: row.get(3)?,
                key: row.get(4)?,
                value: row.get(5)?,
            })
        })?;
        rows.collect::<Result<Vec<_>, _>>().map_err(Into::into)
    }

    pub fn load_inheritance(&self) -> Result<BTreeMap<String, Vec<String>>, StoreError> {
        let mut stmt = self
            .conn
            .prepare("SELECT namespace, lineage_json FROM inheritance")?;
        let rows = stmt.query_map([], |row| Ok((row.get(0)?, row.get(1)?)))?;
        let mut out = BTreeMap::new();
        for row in rows {
            let (ns, json): (String, String) = row?;
            let lineage: Vec<String> =
                serde_json::from_str(&json).map_err(|e| StoreError::Corrupt {
                    table: "inheritance".to_string(),
                    message: e.to_string(),
                })?;
            out.insert(ns, lineage);
        }
        Ok(out)
    }
}

#[cfg(test)]
#[path = "dao_tests.rs"]
mod tests;
