//! Users watching tasks.

use super::{Database, now_ms, optional};
use crate::types::{TaskId, UserId, Watcher};
use anyhow::Result;
use rusqlite::{Connection, params};

pub(crate) fn is_watching_internal(conn: &Connection, task_id: TaskId, user_id: UserId) -> Result<bool> {
    let found = optional(conn.query_row(
        "SELECT 1 FROM task_watchers WHERE task_id = ?1 AND user_id = ?2",
        params![task_id, user_id],
        |_| Ok(()),
    ))?;
    Ok(found.is_some())
}

pub(crate) fn get_watchers_internal(conn: &Connection, task_id: TaskId) -> Result<Vec<Watcher>> {
    let mut stmt = conn.prepare(
        "SELECT task_id, user_id, added_at FROM task_watchers WHERE task_id = ?1 ORDER BY added_at, user_id",
    )?;
    let watchers = stmt
        .query_map(params![task_id], |row| {
            Ok(Watcher {
                task_id: row.get(0)?,
                user_id: row.get(1)?,
                added_at: row.get(2)?,
            })
        })?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(watchers)
}

impl Database {
    /// Add a watcher. Returns false if the user was already watching.
    pub fn add_watcher(&self, task_id: TaskId, user_id: UserId) -> Result<bool> {
        self.with_conn(|conn| {
            let inserted = conn.execute(
                "INSERT OR IGNORE INTO task_watchers (task_id, user_id, added_at) VALUES (?1, ?2, ?3)",
                params![task_id, user_id, now_ms()],
            )?;
            Ok(inserted > 0)
        })
    }

    /// Remove a watcher. Returns false if the user was not watching.
    pub fn remove_watcher(&self, task_id: TaskId, user_id: UserId) -> Result<bool> {
        self.with_conn(|conn| {
            let deleted = conn.execute(
                "DELETE FROM task_watchers WHERE task_id = ?1 AND user_id = ?2",
                params![task_id, user_id],
            )?;
            Ok(deleted > 0)
        })
    }

    pub fn is_watching(&self, task_id: TaskId, user_id: UserId) -> Result<bool> {
        self.with_conn(|conn| is_watching_internal(conn, task_id, user_id))
    }

    pub fn get_watchers(&self, task_id: TaskId) -> Result<Vec<Watcher>> {
        self.with_conn(|conn| get_watchers_internal(conn, task_id))
    }
}
