//! Tags and task/tag links.

use super::{Database, optional};
use crate::error::ApiError;
use crate::types::{Tag, TaskId, UserId};
use anyhow::Result;
use rusqlite::{Connection, params};

/// Default colour for new tags.
pub const DEFAULT_TAG_COLOR: &str = "#808080";

/// Replace the tag set of a task.
pub(crate) fn sync_task_tags(conn: &Connection, task_id: TaskId, tag_ids: &[i64]) -> Result<()> {
    conn.execute("DELETE FROM task_tag_links WHERE task_id = ?1", params![task_id])?;
    for tag_id in tag_ids {
        conn.execute(
            "INSERT OR IGNORE INTO task_tag_links (task_id, tag_id) VALUES (?1, ?2)",
            params![task_id, tag_id],
        )?;
    }
    Ok(())
}

/// Tag ids from the list that do not exist.
pub(crate) fn missing_tag_ids(conn: &Connection, tag_ids: &[i64]) -> Result<Vec<i64>> {
    let mut missing = Vec::new();
    for tag_id in tag_ids {
        let found = optional(conn.query_row(
            "SELECT 1 FROM task_tags WHERE id = ?1",
            params![tag_id],
            |_| Ok(()),
        ))?;
        if found.is_none() {
            missing.push(*tag_id);
        }
    }
    Ok(missing)
}

pub(crate) fn get_task_tags_internal(conn: &Connection, task_id: TaskId) -> Result<Vec<Tag>> {
    let mut stmt = conn.prepare(
        "SELECT t.id, t.name, t.color, t.created_by
         FROM task_tags t JOIN task_tag_links l ON l.tag_id = t.id
         WHERE l.task_id = ?1
         ORDER BY t.name",
    )?;
    let tags = stmt
        .query_map(params![task_id], |row| {
            Ok(Tag {
                id: row.get(0)?,
                name: row.get(1)?,
                color: row.get(2)?,
                created_by: row.get(3)?,
            })
        })?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(tags)
}

impl Database {
    /// Create a tag. Names are unique.
    pub fn create_tag(&self, name: &str, color: Option<&str>, created_by: UserId) -> Result<Tag> {
        let color = color.unwrap_or(DEFAULT_TAG_COLOR);
        self.with_conn(|conn| {
            let taken = optional(conn.query_row(
                "SELECT 1 FROM task_tags WHERE name = ?1",
                params![name],
                |_| Ok(()),
            ))?;
            if taken.is_some() {
                return Err(ApiError::already_exists("name", "A tag with this name already exists.").into());
            }

            conn.execute(
                "INSERT INTO task_tags (name, color, created_by) VALUES (?1, ?2, ?3)",
                params![name, color, created_by],
            )?;
            Ok(Tag {
                id: conn.last_insert_rowid(),
                name: name.to_string(),
                color: color.to_string(),
                created_by,
            })
        })
    }

    /// All tags, by name.
    pub fn list_tags(&self) -> Result<Vec<Tag>> {
        self.with_conn(|conn| {
            let mut stmt =
                conn.prepare("SELECT id, name, color, created_by FROM task_tags ORDER BY name")?;
            let tags = stmt
                .query_map([], |row| {
                    Ok(Tag {
                        id: row.get(0)?,
                        name: row.get(1)?,
                        color: row.get(2)?,
                        created_by: row.get(3)?,
                    })
                })?
                .collect::<Result<Vec<_>, _>>()?;
            Ok(tags)
        })
    }

    pub fn get_task_tags(&self, task_id: TaskId) -> Result<Vec<Tag>> {
        self.with_conn(|conn| get_task_tags_internal(conn, task_id))
    }
}
