//! Parent/child task links and cycle detection.

use super::{Database, optional};
use crate::error::ApiError;
use crate::types::TaskId;
use anyhow::Result;
use rusqlite::{Connection, params};
use std::collections::HashSet;

/// Check that `parent_id` may become the parent of `task_id`.
///
/// `task_id` is `None` for a task that does not exist yet; such a task has no
/// descendants, so only existence of the parent is checked.
pub(crate) fn check_parent(
    conn: &Connection,
    task_id: Option<TaskId>,
    parent_id: TaskId,
) -> Result<()> {
    if !task_exists(conn, parent_id)? {
        return Err(ApiError::invalid("parent_task", "Parent task not found.").into());
    }

    let Some(task_id) = task_id else {
        return Ok(());
    };

    if task_id == parent_id {
        return Err(ApiError::invalid("parent_task", "A task cannot be its own parent.").into());
    }

    let mut visited: HashSet<TaskId> = HashSet::new();
    let mut current = Some(parent_id);

    while let Some(id) = current {
        if id == task_id || !visited.insert(id) {
            return Err(
                ApiError::invalid("parent_task", "Cycle detected in parent tasks.").into(),
            );
        }
        current = parent_of(conn, id)?;
    }

    Ok(())
}

fn task_exists(conn: &Connection, task_id: TaskId) -> Result<bool> {
    let found = optional(conn.query_row(
        "SELECT 1 FROM tasks WHERE id = ?1",
        params![task_id],
        |_| Ok(()),
    ))?;
    Ok(found.is_some())
}

fn parent_of(conn: &Connection, task_id: TaskId) -> Result<Option<TaskId>> {
    Ok(optional(conn.query_row(
        "SELECT parent_task_id FROM tasks WHERE id = ?1",
        params![task_id],
        |row| row.get::<_, Option<TaskId>>(0),
    ))?
    .flatten())
}

/// IDs of the direct subtasks of a task.
pub(crate) fn get_children_internal(conn: &Connection, task_id: TaskId) -> Result<Vec<TaskId>> {
    let mut stmt = conn.prepare("SELECT id FROM tasks WHERE parent_task_id = ?1 ORDER BY id")?;
    let ids = stmt
        .query_map(params![task_id], |row| row.get(0))?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(ids)
}

impl Database {
    /// Check a proposed parent link without writing anything.
    pub fn check_parent(&self, task_id: Option<TaskId>, parent_id: TaskId) -> Result<()> {
        self.with_conn(|conn| check_parent(conn, task_id, parent_id))
    }

    /// Chain of ancestors from the direct parent up to the root.
    pub fn get_ancestors(&self, task_id: TaskId) -> Result<Vec<TaskId>> {
        self.with_conn(|conn| {
            let mut ancestors = Vec::new();
            let mut visited = HashSet::from([task_id]);
            let mut current = parent_of(conn, task_id)?;
            while let Some(id) = current {
                if !visited.insert(id) {
                    break;
                }
                ancestors.push(id);
                current = parent_of(conn, id)?;
            }
            Ok(ancestors)
        })
    }
}
