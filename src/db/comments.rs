//! Task comments, including system-generated ones.

use super::{Database, now_ms, optional};
use crate::error::ApiError;
use crate::types::{Comment, TaskId, UserId};
use anyhow::Result;
use rusqlite::{Connection, Row, params};

const COMMENT_COLUMNS: &str = "id, task_id, author_id, text, is_system, created_at, updated_at";

fn parse_comment_row(row: &Row) -> rusqlite::Result<Comment> {
    Ok(Comment {
        id: row.get(0)?,
        task_id: row.get(1)?,
        author_id: row.get(2)?,
        text: row.get(3)?,
        is_system: row.get(4)?,
        created_at: row.get(5)?,
        updated_at: row.get(6)?,
    })
}

pub(crate) fn insert_comment_internal(
    conn: &Connection,
    task_id: TaskId,
    author_id: UserId,
    text: &str,
    is_system: bool,
) -> Result<Comment> {
    let now = now_ms();
    conn.execute(
        "INSERT INTO task_comments (task_id, author_id, text, is_system, created_at, updated_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?5)",
        params![task_id, author_id, text, is_system, now],
    )?;
    Ok(Comment {
        id: conn.last_insert_rowid(),
        task_id,
        author_id,
        text: text.to_string(),
        is_system,
        created_at: now,
        updated_at: now,
    })
}

/// Add an automatic comment describing a change.
pub(crate) fn add_system_comment(
    conn: &Connection,
    task_id: TaskId,
    author_id: UserId,
    text: &str,
) -> Result<Comment> {
    insert_comment_internal(conn, task_id, author_id, text, true)
}

/// Most recent comments, returned oldest first.
pub(crate) fn get_latest_comments_internal(
    conn: &Connection,
    task_id: TaskId,
    limit: usize,
) -> Result<Vec<Comment>> {
    let sql = format!(
        "SELECT {} FROM (
            SELECT {} FROM task_comments WHERE task_id = ?1
            ORDER BY created_at DESC, id DESC LIMIT ?2
         ) ORDER BY created_at ASC, id ASC",
        COMMENT_COLUMNS, COMMENT_COLUMNS
    );
    let mut stmt = conn.prepare(&sql)?;
    let comments = stmt
        .query_map(params![task_id, limit as i64], parse_comment_row)?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(comments)
}

impl Database {
    /// Add a user comment.
    pub fn add_comment(&self, task_id: TaskId, author_id: UserId, text: &str) -> Result<Comment> {
        self.with_conn(|conn| insert_comment_internal(conn, task_id, author_id, text, false))
    }

    pub fn get_comment(&self, comment_id: i64) -> Result<Option<Comment>> {
        self.with_conn(|conn| {
            let sql = format!("SELECT {} FROM task_comments WHERE id = ?1", COMMENT_COLUMNS);
            optional(conn.query_row(&sql, params![comment_id], parse_comment_row))
        })
    }

    /// All comments on a task, oldest first.
    pub fn get_comments(&self, task_id: TaskId) -> Result<Vec<Comment>> {
        self.with_conn(|conn| {
            let sql = format!(
                "SELECT {} FROM task_comments WHERE task_id = ?1 ORDER BY created_at ASC, id ASC",
                COMMENT_COLUMNS
            );
            let mut stmt = conn.prepare(&sql)?;
            let comments = stmt
                .query_map(params![task_id], parse_comment_row)?
                .collect::<Result<Vec<_>, _>>()?;
            Ok(comments)
        })
    }

    /// Replace a comment's text. System comments cannot be edited.
    pub fn update_comment(&self, comment_id: i64, text: &str) -> Result<Comment> {
        self.with_conn(|conn| {
            let sql = format!("SELECT {} FROM task_comments WHERE id = ?1", COMMENT_COLUMNS);
            let mut comment = optional(conn.query_row(&sql, params![comment_id], parse_comment_row))?
                .ok_or_else(|| ApiError::not_found("Comment"))?;

            if comment.is_system {
                return Err(ApiError::forbidden().into());
            }

            let now = now_ms();
            conn.execute(
                "UPDATE task_comments SET text = ?1, updated_at = ?2 WHERE id = ?3",
                params![text, now, comment_id],
            )?;
            comment.text = text.to_string();
            comment.updated_at = now;
            Ok(comment)
        })
    }

    /// Delete a comment. Returns false if it did not exist.
    pub fn delete_comment(&self, comment_id: i64) -> Result<bool> {
        self.with_conn(|conn| {
            let deleted =
                conn.execute("DELETE FROM task_comments WHERE id = ?1", params![comment_id])?;
            Ok(deleted > 0)
        })
    }
}
