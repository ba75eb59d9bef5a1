//! Attachment metadata. File contents live under the media directory.

use super::{Database, now_ms, optional};
use crate::types::{Attachment, TaskId, UserId};
use anyhow::Result;
use rusqlite::{Connection, Row, params};

const ATTACHMENT_COLUMNS: &str =
    "id, task_id, file_path, file_name, file_size, uploaded_by, uploaded_at";

fn parse_attachment_row(row: &Row) -> rusqlite::Result<Attachment> {
    Ok(Attachment {
        id: row.get(0)?,
        task_id: row.get(1)?,
        file_path: row.get(2)?,
        file_name: row.get(3)?,
        file_size: row.get(4)?,
        uploaded_by: row.get(5)?,
        uploaded_at: row.get(6)?,
    })
}

pub(crate) fn get_attachments_internal(conn: &Connection, task_id: TaskId) -> Result<Vec<Attachment>> {
    let sql = format!(
        "SELECT {} FROM task_attachments WHERE task_id = ?1 ORDER BY uploaded_at DESC, id DESC",
        ATTACHMENT_COLUMNS
    );
    let mut stmt = conn.prepare(&sql)?;
    let attachments = stmt
        .query_map(params![task_id], parse_attachment_row)?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(attachments)
}

impl Database {
    /// Record an uploaded file.
    pub fn add_attachment(
        &self,
        task_id: TaskId,
        file_path: &str,
        file_name: &str,
        file_size: i64,
        uploaded_by: UserId,
    ) -> Result<Attachment> {
        let now = now_ms();
        self.with_conn(|conn| {
            conn.execute(
                "INSERT INTO task_attachments (task_id, file_path, file_name, file_size, uploaded_by, uploaded_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
                params![task_id, file_path, file_name, file_size, uploaded_by, now],
            )?;
            Ok(Attachment {
                id: conn.last_insert_rowid(),
                task_id,
                file_path: file_path.to_string(),
                file_name: file_name.to_string(),
                file_size,
                uploaded_by,
                uploaded_at: now,
            })
        })
    }

    pub fn get_attachment(&self, attachment_id: i64) -> Result<Option<Attachment>> {
        self.with_conn(|conn| {
            let sql = format!(
                "SELECT {} FROM task_attachments WHERE id = ?1",
                ATTACHMENT_COLUMNS
            );
            optional(conn.query_row(&sql, params![attachment_id], parse_attachment_row))
        })
    }

    /// Attachments of a task, newest first.
    pub fn get_attachments(&self, task_id: TaskId) -> Result<Vec<Attachment>> {
        self.with_conn(|conn| get_attachments_internal(conn, task_id))
    }

    /// Delete an attachment record, returning it so the caller can remove the file.
    pub fn delete_attachment(&self, attachment_id: i64) -> Result<Option<Attachment>> {
        self.with_conn_mut(|conn| {
            let tx = conn.transaction()?;
            let sql = format!(
                "SELECT {} FROM task_attachments WHERE id = ?1",
                ATTACHMENT_COLUMNS
            );
            let attachment = optional(tx.query_row(&sql, params![attachment_id], parse_attachment_row))?;
            if attachment.is_some() {
                tx.execute(
                    "DELETE FROM task_attachments WHERE id = ?1",
                    params![attachment_id],
                )?;
            }
            tx.commit()?;
            Ok(attachment)
        })
    }

    /// Stored paths of every attachment on a task and its subtasks.
    ///
    /// Used before deleting a task, since the cascade removes the rows but not the files.
    pub fn get_attachment_paths_in_tree(&self, task_id: TaskId) -> Result<Vec<String>> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(
                "WITH RECURSIVE tree(id) AS (
                    SELECT ?1
                    UNION
                    SELECT t.id FROM tasks t JOIN tree ON t.parent_task_id = tree.id
                 )
                 SELECT a.file_path FROM task_attachments a JOIN tree ON a.task_id = tree.id",
            )?;
            let paths = stmt
                .query_map(params![task_id], |row| row.get(0))?
                .collect::<Result<Vec<_>, _>>()?;
            Ok(paths)
        })
    }
}
