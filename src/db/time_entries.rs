//! Logged work and the derived `actual_hours` aggregate.

use super::{Database, now_ms, optional};
use crate::types::{Hours, TaskId, TimeEntry, UserId};
use anyhow::Result;
use chrono::NaiveDate;
use rusqlite::{Connection, Row, params};

const TIME_ENTRY_COLUMNS: &str = "id, task_id, user_id, hours, description, entry_date, created_at";

fn parse_time_entry_row(row: &Row) -> rusqlite::Result<TimeEntry> {
    Ok(TimeEntry {
        id: row.get(0)?,
        task_id: row.get(1)?,
        user_id: row.get(2)?,
        hours: Hours::from_hundredths(row.get(3)?),
        description: row.get(4)?,
        date: row.get(5)?,
        created_at: row.get(6)?,
    })
}

/// Recompute `actual_hours` from the task's entries. Returns the new total.
pub(crate) fn recompute_actual_hours(conn: &Connection, task_id: TaskId) -> Result<Hours> {
    let total: i64 = conn.query_row(
        "SELECT COALESCE(SUM(hours), 0) FROM time_entries WHERE task_id = ?1",
        params![task_id],
        |row| row.get(0),
    )?;
    conn.execute(
        "UPDATE tasks SET actual_hours = ?1 WHERE id = ?2",
        params![total, task_id],
    )?;
    Ok(Hours::from_hundredths(total))
}

pub(crate) fn count_time_entries_internal(conn: &Connection, task_id: TaskId) -> Result<i64> {
    Ok(conn.query_row(
        "SELECT COUNT(*) FROM time_entries WHERE task_id = ?1",
        params![task_id],
        |row| row.get(0),
    )?)
}

impl Database {
    /// Log work on a task and refresh its `actual_hours`.
    pub fn add_time_entry(
        &self,
        task_id: TaskId,
        user_id: UserId,
        hours: Hours,
        description: &str,
        date: NaiveDate,
    ) -> Result<TimeEntry> {
        let now = now_ms();
        self.with_conn_mut(|conn| {
            let tx = conn.transaction()?;

            tx.execute(
                "INSERT INTO time_entries (task_id, user_id, hours, description, entry_date, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
                params![task_id, user_id, hours.hundredths(), description, date, now],
            )?;
            let id = tx.last_insert_rowid();
            let total = recompute_actual_hours(&tx, task_id)?;

            tx.commit()?;
            tracing::debug!(task_id, %hours, %total, "Logged time");

            Ok(TimeEntry {
                id,
                task_id,
                user_id,
                hours,
                description: description.to_string(),
                date,
                created_at: now,
            })
        })
    }

    pub fn get_time_entry(&self, entry_id: i64) -> Result<Option<TimeEntry>> {
        self.with_conn(|conn| {
            let sql = format!("SELECT {} FROM time_entries WHERE id = ?1", TIME_ENTRY_COLUMNS);
            optional(conn.query_row(&sql, params![entry_id], parse_time_entry_row))
        })
    }

    /// Entries of a task, most recent date first.
    pub fn get_time_entries(&self, task_id: TaskId) -> Result<Vec<TimeEntry>> {
        self.with_conn(|conn| {
            let sql = format!(
                "SELECT {} FROM time_entries WHERE task_id = ?1 ORDER BY entry_date DESC, id DESC",
                TIME_ENTRY_COLUMNS
            );
            let mut stmt = conn.prepare(&sql)?;
            let entries = stmt
                .query_map(params![task_id], parse_time_entry_row)?
                .collect::<Result<Vec<_>, _>>()?;
            Ok(entries)
        })
    }

    /// Delete an entry and refresh its task's `actual_hours`.
    pub fn delete_time_entry(&self, entry_id: i64) -> Result<Option<TimeEntry>> {
        self.with_conn_mut(|conn| {
            let tx = conn.transaction()?;

            let sql = format!("SELECT {} FROM time_entries WHERE id = ?1", TIME_ENTRY_COLUMNS);
            let entry = optional(tx.query_row(&sql, params![entry_id], parse_time_entry_row))?;

            if let Some(ref entry) = entry {
                tx.execute("DELETE FROM time_entries WHERE id = ?1", params![entry_id])?;
                recompute_actual_hours(&tx, entry.task_id)?;
            }

            tx.commit()?;
            Ok(entry)
        })
    }
}
