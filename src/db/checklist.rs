//! Checklist items on tasks.

use super::{Database, now_ms, optional};
use crate::error::ApiError;
use crate::types::{ChecklistItem, TaskId, UserId};
use anyhow::Result;
use rusqlite::{Connection, Row, params};

const CHECKLIST_COLUMNS: &str =
    "id, task_id, item_text, is_completed, item_order, completed_at, completed_by";

fn parse_checklist_row(row: &Row) -> rusqlite::Result<ChecklistItem> {
    Ok(ChecklistItem {
        id: row.get(0)?,
        task_id: row.get(1)?,
        item_text: row.get(2)?,
        is_completed: row.get(3)?,
        order: row.get(4)?,
        completed_at: row.get(5)?,
        completed_by: row.get(6)?,
    })
}

fn get_item_internal(conn: &Connection, item_id: i64) -> Result<Option<ChecklistItem>> {
    let sql = format!("SELECT {} FROM task_checklist WHERE id = ?1", CHECKLIST_COLUMNS);
    optional(conn.query_row(&sql, params![item_id], parse_checklist_row))
}

pub(crate) fn get_checklist_internal(conn: &Connection, task_id: TaskId) -> Result<Vec<ChecklistItem>> {
    let sql = format!(
        "SELECT {} FROM task_checklist WHERE task_id = ?1 ORDER BY item_order, id",
        CHECKLIST_COLUMNS
    );
    let mut stmt = conn.prepare(&sql)?;
    let items = stmt
        .query_map(params![task_id], parse_checklist_row)?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(items)
}

impl Database {
    /// Add a checklist item. Without an explicit order the item goes last.
    pub fn add_checklist_item(
        &self,
        task_id: TaskId,
        item_text: &str,
        order: Option<i32>,
    ) -> Result<ChecklistItem> {
        self.with_conn(|conn| {
            let order = match order {
                Some(order) => order,
                None => conn.query_row(
                    "SELECT COUNT(*) FROM task_checklist WHERE task_id = ?1",
                    params![task_id],
                    |row| row.get(0),
                )?,
            };

            conn.execute(
                "INSERT INTO task_checklist (task_id, item_text, item_order) VALUES (?1, ?2, ?3)",
                params![task_id, item_text, order],
            )?;

            Ok(ChecklistItem {
                id: conn.last_insert_rowid(),
                task_id,
                item_text: item_text.to_string(),
                is_completed: false,
                order,
                completed_at: None,
                completed_by: None,
            })
        })
    }

    pub fn get_checklist_item(&self, item_id: i64) -> Result<Option<ChecklistItem>> {
        self.with_conn(|conn| get_item_internal(conn, item_id))
    }

    /// Items of a task in display order.
    pub fn get_checklist(&self, task_id: TaskId) -> Result<Vec<ChecklistItem>> {
        self.with_conn(|conn| get_checklist_internal(conn, task_id))
    }

    /// Flip an item's completion state, recording who completed it.
    pub fn toggle_checklist_item(&self, item_id: i64, user_id: UserId) -> Result<ChecklistItem> {
        self.with_conn(|conn| {
            let item = get_item_internal(conn, item_id)?
                .ok_or_else(|| ApiError::not_found("Checklist item"))?;

            if item.is_completed {
                conn.execute(
                    "UPDATE task_checklist SET is_completed = 0, completed_at = NULL, completed_by = NULL
                     WHERE id = ?1",
                    params![item_id],
                )?;
            } else {
                conn.execute(
                    "UPDATE task_checklist SET is_completed = 1, completed_at = ?1, completed_by = ?2
                     WHERE id = ?3",
                    params![now_ms(), user_id, item_id],
                )?;
            }

            get_item_internal(conn, item_id)?
                .ok_or_else(|| ApiError::not_found("Checklist item").into())
        })
    }

    /// Delete an item. Returns false if it did not exist.
    pub fn delete_checklist_item(&self, item_id: i64) -> Result<bool> {
        self.with_conn(|conn| {
            let deleted = conn.execute("DELETE FROM task_checklist WHERE id = ?1", params![item_id])?;
            Ok(deleted > 0)
        })
    }
}
