//! Audit history of task field changes.

use super::{Database, now_ms};
use crate::types::{HistoryEntry, TaskId, UserId};
use anyhow::Result;
use rusqlite::{Connection, Row, params};

/// Record one field change. Absent values are stored as empty strings.
pub(crate) fn record_change(
    conn: &Connection,
    task_id: TaskId,
    changed_by: UserId,
    field: &str,
    old_value: Option<&str>,
    new_value: Option<&str>,
) -> Result<()> {
    conn.execute(
        "INSERT INTO task_history (task_id, changed_by, changed_at, field, old_value, new_value)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
        params![
            task_id,
            changed_by,
            now_ms(),
            field,
            old_value.unwrap_or(""),
            new_value.unwrap_or(""),
        ],
    )?;
    Ok(())
}

fn parse_history_row(row: &Row) -> rusqlite::Result<HistoryEntry> {
    Ok(HistoryEntry {
        id: row.get(0)?,
        task_id: row.get(1)?,
        changed_by: row.get(2)?,
        changed_at: row.get(3)?,
        field: row.get(4)?,
        old_value: row.get(5)?,
        new_value: row.get(6)?,
    })
}

impl Database {
    /// History of a task, newest first.
    pub fn get_task_history(&self, task_id: TaskId) -> Result<Vec<HistoryEntry>> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(
                "SELECT id, task_id, changed_by, changed_at, field, old_value, new_value
                 FROM task_history
                 WHERE task_id = ?1
                 ORDER BY changed_at DESC, id DESC",
            )?;

            let entries = stmt
                .query_map(params![task_id], parse_history_row)?
                .collect::<Result<Vec<_>, _>>()?;

            Ok(entries)
        })
    }
}
