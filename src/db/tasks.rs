//! Task CRUD, listing and bulk actions.
//!
//! Every write runs in one transaction together with its side effects:
//! tag links, history rows, system comments and `completed_at`.

use super::comments::add_system_comment;
use super::hierarchy::{check_parent, get_children_internal};
use super::history::record_change;
use super::tags::{missing_tag_ids, sync_task_tags};
use super::users::get_user_internal;
use super::watchers::get_watchers_internal;
use super::{Database, now_ms, optional};
use crate::error::{ApiError, FieldErrors};
use crate::permissions::TaskContext;
use crate::types::{
    Hours, NewTask, Priority, Task, TaskChanges, TaskId, TaskStatus, Timestamp, User, UserId,
    timestamp_to_rfc3339, timestamp_to_short,
};
use crate::validation::check_status_transition;
use anyhow::Result;
use chrono::NaiveDate;
use rusqlite::types::Type;
use rusqlite::{Connection, Row, params};
use serde::Deserialize;

pub(crate) const TASK_COLUMNS: &str = "t.id, t.title, t.description, t.creator_id, t.assignee_id, \
     t.status, t.priority, t.deadline, t.created_at, t.updated_at, t.completed_at, \
     t.estimated_hours, t.actual_hours, t.parent_task_id";

fn parse_enum<T: std::str::FromStr<Err = String>>(row: &Row, idx: usize) -> rusqlite::Result<T> {
    let raw: String = row.get(idx)?;
    raw.parse()
        .map_err(|e: String| rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, e.into()))
}

pub(crate) fn parse_task_row(row: &Row) -> rusqlite::Result<Task> {
    Ok(Task {
        id: row.get(0)?,
        title: row.get(1)?,
        description: row.get(2)?,
        creator_id: row.get(3)?,
        assignee_id: row.get(4)?,
        status: parse_enum(row, 5)?,
        priority: parse_enum(row, 6)?,
        deadline: row.get(7)?,
        created_at: row.get(8)?,
        updated_at: row.get(9)?,
        completed_at: row.get(10)?,
        estimated_hours: row.get::<_, Option<i64>>(11)?.map(Hours::from_hundredths),
        actual_hours: Hours::from_hundredths(row.get(12)?),
        parent_task_id: row.get(13)?,
    })
}

/// Internal helper to get a task using an existing connection (avoids deadlock).
pub(crate) fn get_task_internal(conn: &Connection, task_id: TaskId) -> Result<Option<Task>> {
    let sql = format!("SELECT {} FROM tasks t WHERE t.id = ?1", TASK_COLUMNS);
    optional(conn.query_row(&sql, params![task_id], parse_task_row))
}

fn get_tasks_by_ids(conn: &Connection, ids: &[TaskId]) -> Result<Vec<Task>> {
    let mut tasks = Vec::with_capacity(ids.len());
    for id in ids {
        if let Some(task) = get_task_internal(conn, *id)? {
            tasks.push(task);
        }
    }
    Ok(tasks)
}

/// Check that a user may be assigned tasks.
fn check_assignee(conn: &Connection, assignee_id: UserId, errors: &mut FieldErrors) -> Result<Option<User>> {
    match get_user_internal(conn, assignee_id)? {
        Some(user) if user.is_active => Ok(Some(user)),
        _ => {
            errors.insert(
                "assignee".into(),
                "Select a valid choice. That choice is not one of the available choices.".into(),
            );
            Ok(None)
        }
    }
}

fn check_tags(conn: &Connection, tag_ids: &[i64], errors: &mut FieldErrors) -> Result<()> {
    let missing = missing_tag_ids(conn, tag_ids)?;
    if let Some(id) = missing.first() {
        errors.insert(
            "tags".into(),
            format!("Select a valid choice. {} is not one of the available choices.", id),
        );
    }
    Ok(())
}

/// Run the parent check, moving its field errors into `errors`.
fn check_parent_into(
    conn: &Connection,
    task_id: Option<TaskId>,
    parent_id: TaskId,
    errors: &mut FieldErrors,
) -> Result<()> {
    if let Err(err) = check_parent(conn, task_id, parent_id) {
        let api: ApiError = err.into();
        if api.errors.is_empty() {
            return Err(api.into());
        }
        errors.extend(api.errors);
    }
    Ok(())
}

fn user_name(conn: &Connection, user_id: Option<UserId>) -> Result<String> {
    Ok(match user_id {
        Some(id) => get_user_internal(conn, id)?
            .map(|u| u.display_name())
            .unwrap_or_else(|| "Unassigned".to_string()),
        None => "Unassigned".to_string(),
    })
}

fn user_email(conn: &Connection, user_id: Option<UserId>) -> Result<Option<String>> {
    Ok(match user_id {
        Some(id) => get_user_internal(conn, id)?.map(|u| u.email),
        None => None,
    })
}

fn deadline_text(deadline: Option<Timestamp>) -> String {
    deadline
        .map(timestamp_to_short)
        .unwrap_or_else(|| "Not set".to_string())
}

/// Apply changes to one task inside an open transaction.
///
/// All checks run before the first write, so an error leaves the task untouched.
fn update_task_internal(
    conn: &Connection,
    actor: &User,
    task_id: TaskId,
    changes: &TaskChanges,
) -> Result<Task> {
    let old = get_task_internal(conn, task_id)?.ok_or_else(ApiError::task_not_found)?;

    if let Some(status) = changes.status {
        check_status_transition(old.status, status)?;
    }

    let mut errors = FieldErrors::new();
    if let Some(Some(assignee_id)) = changes.assignee_id {
        if Some(assignee_id) != old.assignee_id {
            check_assignee(conn, assignee_id, &mut errors)?;
        }
    }
    if let Some(ref tag_ids) = changes.tag_ids {
        check_tags(conn, tag_ids, &mut errors)?;
    }
    if let Some(Some(parent_id)) = changes.parent_task_id {
        check_parent_into(conn, Some(task_id), parent_id, &mut errors)?;
    }
    if !errors.is_empty() {
        return Err(ApiError::validation(errors).into());
    }

    let now = now_ms();
    let new = Task {
        id: old.id,
        title: changes.title.clone().unwrap_or_else(|| old.title.clone()),
        description: changes
            .description
            .clone()
            .unwrap_or_else(|| old.description.clone()),
        creator_id: old.creator_id,
        assignee_id: changes.assignee_id.unwrap_or(old.assignee_id),
        status: changes.status.unwrap_or(old.status),
        priority: changes.priority.unwrap_or(old.priority),
        deadline: changes.deadline.unwrap_or(old.deadline),
        created_at: old.created_at,
        updated_at: now,
        completed_at: match old.completed_at {
            Some(ts) => Some(ts),
            None if changes.status == Some(TaskStatus::Completed) => Some(now),
            None => None,
        },
        estimated_hours: changes.estimated_hours.unwrap_or(old.estimated_hours),
        actual_hours: old.actual_hours,
        parent_task_id: changes.parent_task_id.unwrap_or(old.parent_task_id),
    };

    conn.execute(
        "UPDATE tasks SET title = ?1, description = ?2, assignee_id = ?3, status = ?4, priority = ?5,
            deadline = ?6, updated_at = ?7, completed_at = ?8, estimated_hours = ?9, parent_task_id = ?10
         WHERE id = ?11",
        params![
            new.title,
            new.description,
            new.assignee_id,
            new.status.as_str(),
            new.priority.as_str(),
            new.deadline,
            new.updated_at,
            new.completed_at,
            new.estimated_hours.map(Hours::hundredths),
            new.parent_task_id,
            task_id,
        ],
    )?;

    if let Some(ref tag_ids) = changes.tag_ids {
        sync_task_tags(conn, task_id, tag_ids)?;
    }

    // History
    if old.title != new.title {
        record_change(conn, task_id, actor.id, "title", Some(&old.title), Some(&new.title))?;
    }
    if old.status != new.status {
        record_change(
            conn,
            task_id,
            actor.id,
            "status",
            Some(old.status.as_str()),
            Some(new.status.as_str()),
        )?;
    }
    if old.assignee_id != new.assignee_id {
        let old_email = user_email(conn, old.assignee_id)?;
        let new_email = user_email(conn, new.assignee_id)?;
        record_change(
            conn,
            task_id,
            actor.id,
            "assignee",
            old_email.as_deref(),
            new_email.as_deref(),
        )?;
    }
    if old.priority != new.priority {
        record_change(
            conn,
            task_id,
            actor.id,
            "priority",
            Some(old.priority.as_str()),
            Some(new.priority.as_str()),
        )?;
    }
    if old.deadline != new.deadline {
        record_change(
            conn,
            task_id,
            actor.id,
            "deadline",
            old.deadline.map(timestamp_to_rfc3339).as_deref(),
            new.deadline.map(timestamp_to_rfc3339).as_deref(),
        )?;
    }

    // System comments
    if old.status != new.status {
        add_system_comment(
            conn,
            task_id,
            actor.id,
            &format!(
                "Status changed: {} → {}",
                old.status.label(),
                new.status.label()
            ),
        )?;
    }
    if old.assignee_id != new.assignee_id {
        let text = format!(
            "Task reassigned: {} → {}",
            user_name(conn, old.assignee_id)?,
            user_name(conn, new.assignee_id)?
        );
        add_system_comment(conn, task_id, actor.id, &text)?;
    }
    if old.deadline != new.deadline {
        let text = format!(
            "Deadline changed: {} → {}",
            deadline_text(old.deadline),
            deadline_text(new.deadline)
        );
        add_system_comment(conn, task_id, actor.id, &text)?;
    }

    if old.status != new.status {
        tracing::info!(
            task_id,
            actor = %actor.email,
            from = %old.status,
            to = %new.status,
            "Task status changed"
        );
    }

    Ok(new)
}

// =============================================================================
// Listing
// =============================================================================

/// Sortable task list columns.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OrderField {
    CreatedAt,
    Deadline,
    Priority,
    Status,
    Title,
}

/// Ordering for task lists, parsed from `field` or `-field`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TaskOrdering {
    pub field: OrderField,
    pub descending: bool,
}

impl Default for TaskOrdering {
    fn default() -> Self {
        Self {
            field: OrderField::CreatedAt,
            descending: true,
        }
    }
}

impl TaskOrdering {
    /// Parse an ordering parameter; unknown fields yield `None`.
    pub fn parse(value: &str) -> Option<Self> {
        let value = value.trim();
        let (descending, name) = match value.strip_prefix('-') {
            Some(rest) => (true, rest),
            None => (false, value),
        };
        let field = match name {
            "created_at" => OrderField::CreatedAt,
            "deadline" => OrderField::Deadline,
            "priority" => OrderField::Priority,
            "status" => OrderField::Status,
            "title" => OrderField::Title,
            _ => return None,
        };
        Some(Self { field, descending })
    }

    fn sql(&self) -> String {
        let expr = match self.field {
            OrderField::CreatedAt => "t.created_at".to_string(),
            OrderField::Deadline => "t.deadline".to_string(),
            OrderField::Title => "t.title COLLATE NOCASE".to_string(),
            OrderField::Priority => rank_case(
                "t.priority",
                Priority::ALL.iter().map(|p| (p.as_str(), p.rank())),
            ),
            OrderField::Status => rank_case(
                "t.status",
                TaskStatus::ALL.iter().map(|s| (s.as_str(), s.rank())),
            ),
        };
        let dir = if self.descending { "DESC" } else { "ASC" };
        format!("{} {}, t.id {}", expr, dir, dir)
    }
}

fn rank_case<'a>(column: &str, ranks: impl Iterator<Item = (&'a str, i32)>) -> String {
    let arms: Vec<String> = ranks
        .map(|(value, rank)| format!("WHEN '{}' THEN {}", value, rank))
        .collect();
    format!("CASE {} {} END", column, arms.join(" "))
}

/// Filters and paging for the task list.
#[derive(Debug, Clone)]
pub struct TaskQuery {
    pub status: Option<TaskStatus>,
    pub priority: Option<Priority>,
    pub assignee_id: Option<UserId>,
    pub creator_id: Option<UserId>,
    pub deadline_from: Option<NaiveDate>,
    pub deadline_to: Option<NaiveDate>,
    pub search: Option<String>,
    pub tag_ids: Vec<i64>,
    pub ordering: TaskOrdering,
    pub page: i64,
    pub per_page: i64,
    /// Restrict to tasks this user created, is assigned to, or watches.
    pub visible_to: Option<UserId>,
}

impl Default for TaskQuery {
    fn default() -> Self {
        Self {
            status: None,
            priority: None,
            assignee_id: None,
            creator_id: None,
            deadline_from: None,
            deadline_to: None,
            search: None,
            tag_ids: Vec::new(),
            ordering: TaskOrdering::default(),
            page: 1,
            per_page: 20,
            visible_to: None,
        }
    }
}

/// One page of tasks.
#[derive(Debug, Clone)]
pub struct TaskPage {
    pub tasks: Vec<Task>,
    pub total: i64,
    pub page: i64,
    pub per_page: i64,
    pub total_pages: i64,
}

impl TaskPage {
    pub fn has_next(&self) -> bool {
        self.page < self.total_pages
    }

    pub fn has_previous(&self) -> bool {
        self.page > 1
    }
}

fn start_of_day_ms(date: NaiveDate) -> Timestamp {
    date.and_hms_opt(0, 0, 0)
        .map(|dt| dt.and_utc().timestamp_millis())
        .unwrap_or_default()
}

fn escape_like(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    for c in value.chars() {
        if matches!(c, '%' | '_' | '\\') {
            out.push('\\');
        }
        out.push(c);
    }
    out
}

// =============================================================================
// Bulk actions
// =============================================================================

/// Administrative actions applied to many tasks at once.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskBulkAction {
    MarkInProgress,
    MarkReview,
    MarkCompleted,
    SetHighPriority,
    SetLowPriority,
}

impl TaskBulkAction {
    fn changes(&self) -> TaskChanges {
        let mut changes = TaskChanges::default();
        match self {
            TaskBulkAction::MarkInProgress => changes.status = Some(TaskStatus::InProgress),
            TaskBulkAction::MarkReview => changes.status = Some(TaskStatus::Review),
            TaskBulkAction::MarkCompleted => changes.status = Some(TaskStatus::Completed),
            TaskBulkAction::SetHighPriority => changes.priority = Some(Priority::High),
            TaskBulkAction::SetLowPriority => changes.priority = Some(Priority::Low),
        }
        changes
    }
}

impl Database {
    /// Create a task, its tag links and the creation comment.
    pub fn create_task(&self, creator: &User, new_task: &NewTask) -> Result<Task> {
        let now = now_ms();

        self.with_conn_mut(|conn| {
            let tx = conn.transaction()?;

            let mut errors = FieldErrors::new();
            let assignee = check_assignee(&tx, new_task.assignee_id, &mut errors)?;
            check_tags(&tx, &new_task.tag_ids, &mut errors)?;
            if let Some(parent_id) = new_task.parent_task_id {
                check_parent_into(&tx, None, parent_id, &mut errors)?;
            }
            if !errors.is_empty() {
                return Err(ApiError::validation(errors).into());
            }

            let completed_at = (new_task.status == TaskStatus::Completed).then_some(now);

            tx.execute(
                "INSERT INTO tasks (
                    title, description, creator_id, assignee_id, status, priority, deadline,
                    created_at, updated_at, completed_at, estimated_hours, actual_hours, parent_task_id
                ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?8, ?9, ?10, 0, ?11)",
                params![
                    new_task.title,
                    new_task.description,
                    creator.id,
                    new_task.assignee_id,
                    new_task.status.as_str(),
                    new_task.priority.as_str(),
                    new_task.deadline,
                    now,
                    completed_at,
                    new_task.estimated_hours.map(Hours::hundredths),
                    new_task.parent_task_id,
                ],
            )?;
            let task_id = tx.last_insert_rowid();

            sync_task_tags(&tx, task_id, &new_task.tag_ids)?;

            let mut text = format!("Task created by {}", creator.email);
            if let Some(ref assignee) = assignee {
                text.push_str(&format!(" and assigned to {}", assignee.email));
            }
            add_system_comment(&tx, task_id, creator.id, &text)?;

            let task = get_task_internal(&tx, task_id)?
                .ok_or_else(|| anyhow::anyhow!("Task vanished after insert"))?;

            tx.commit()?;
            tracing::info!(task_id, creator = %creator.email, "Task created");
            Ok(task)
        })
    }

    /// Get a task by ID.
    pub fn get_task(&self, task_id: TaskId) -> Result<Option<Task>> {
        self.with_conn(|conn| get_task_internal(conn, task_id))
    }

    /// Load a task with the relations permission checks need.
    pub fn get_task_context(&self, task_id: TaskId) -> Result<Option<TaskContext>> {
        self.with_conn(|conn| {
            let Some(task) = get_task_internal(conn, task_id)? else {
                return Ok(None);
            };
            let watcher_ids = get_watchers_internal(conn, task_id)?
                .into_iter()
                .map(|w| w.user_id)
                .collect();
            let assignee_supervisor_id = match task.assignee_id {
                Some(id) => get_user_internal(conn, id)?.and_then(|u| u.supervisor_id),
                None => None,
            };
            Ok(Some(TaskContext {
                task,
                watcher_ids,
                assignee_supervisor_id,
            }))
        })
    }

    /// Update a task, recording history and system comments.
    pub fn update_task(&self, actor: &User, task_id: TaskId, changes: &TaskChanges) -> Result<Task> {
        self.with_conn_mut(|conn| {
            let tx = conn.transaction()?;
            let task = update_task_internal(&tx, actor, task_id, changes)?;
            tx.commit()?;
            Ok(task)
        })
    }

    /// Delete a task and, by cascade, its subtasks and dependent rows.
    pub fn delete_task(&self, task_id: TaskId) -> Result<bool> {
        self.with_conn(|conn| {
            let deleted = conn.execute("DELETE FROM tasks WHERE id = ?1", params![task_id])?;
            Ok(deleted > 0)
        })
    }

    /// Direct subtasks of a task.
    pub fn get_subtasks(&self, task_id: TaskId) -> Result<Vec<Task>> {
        self.with_conn(|conn| {
            let ids = get_children_internal(conn, task_id)?;
            get_tasks_by_ids(conn, &ids)
        })
    }

    /// Apply a bulk action. Tasks the action cannot apply to are skipped.
    ///
    /// Returns the number of tasks updated.
    pub fn bulk_update_tasks(
        &self,
        actor: &User,
        task_ids: &[TaskId],
        action: TaskBulkAction,
    ) -> Result<usize> {
        let changes = action.changes();
        self.with_conn_mut(|conn| {
            let tx = conn.transaction()?;
            let mut updated = 0;
            for &task_id in task_ids {
                match update_task_internal(&tx, actor, task_id, &changes) {
                    Ok(_) => updated += 1,
                    Err(err) => match err.downcast::<ApiError>() {
                        Ok(api) => {
                            tracing::debug!(task_id, error = %api, "Skipping task in bulk update");
                        }
                        Err(err) => return Err(err),
                    },
                }
            }
            tx.commit()?;
            Ok(updated)
        })
    }

    /// Filtered, ordered, paginated task list.
    ///
    /// A page past the end, or below 1, yields the last page.
    pub fn query_tasks(&self, query: &TaskQuery) -> Result<TaskPage> {
        self.with_conn(|conn| {
            let mut where_sql = String::from(" WHERE 1=1");
            let mut params_vec: Vec<Box<dyn rusqlite::ToSql>> = Vec::new();

            if let Some(user_id) = query.visible_to {
                where_sql.push_str(
                    " AND (t.creator_id = ? OR t.assignee_id = ?
                      OR t.id IN (SELECT task_id FROM task_watchers WHERE user_id = ?))",
                );
                params_vec.push(Box::new(user_id));
                params_vec.push(Box::new(user_id));
                params_vec.push(Box::new(user_id));
            }

            if let Some(status) = query.status {
                where_sql.push_str(" AND t.status = ?");
                params_vec.push(Box::new(status.as_str()));
            }

            if let Some(priority) = query.priority {
                where_sql.push_str(" AND t.priority = ?");
                params_vec.push(Box::new(priority.as_str()));
            }

            if let Some(assignee_id) = query.assignee_id {
                where_sql.push_str(" AND t.assignee_id = ?");
                params_vec.push(Box::new(assignee_id));
            }

            if let Some(creator_id) = query.creator_id {
                where_sql.push_str(" AND t.creator_id = ?");
                params_vec.push(Box::new(creator_id));
            }

            if let Some(from) = query.deadline_from {
                where_sql.push_str(" AND t.deadline >= ?");
                params_vec.push(Box::new(start_of_day_ms(from)));
            }

            if let Some(to) = query.deadline_to {
                // Inclusive of the whole day.
                where_sql.push_str(" AND t.deadline < ?");
                let next_day = to.succ_opt().unwrap_or(to);
                params_vec.push(Box::new(start_of_day_ms(next_day)));
            }

            if let Some(ref search) = query.search {
                let search = search.trim();
                if !search.is_empty() {
                    where_sql.push_str(
                        " AND (LOWER(t.title) LIKE ? ESCAPE '\\'
                          OR LOWER(COALESCE(t.description, '')) LIKE ? ESCAPE '\\')",
                    );
                    let pattern = format!("%{}%", escape_like(&search.to_lowercase()));
                    params_vec.push(Box::new(pattern.clone()));
                    params_vec.push(Box::new(pattern));
                }
            }

            if !query.tag_ids.is_empty() {
                let placeholders = vec!["?"; query.tag_ids.len()].join(", ");
                where_sql.push_str(&format!(
                    " AND t.id IN (SELECT task_id FROM task_tag_links WHERE tag_id IN ({}))",
                    placeholders
                ));
                for tag_id in &query.tag_ids {
                    params_vec.push(Box::new(*tag_id));
                }
            }

            let params_refs: Vec<&dyn rusqlite::ToSql> =
                params_vec.iter().map(|b| b.as_ref()).collect();

            let count_sql = format!("SELECT COUNT(*) FROM tasks t{}", where_sql);
            let total: i64 = conn.query_row(&count_sql, params_refs.as_slice(), |row| row.get(0))?;

            let per_page = query.per_page.max(1);
            let total_pages = ((total + per_page - 1) / per_page).max(1);
            let page = if query.page < 1 {
                total_pages
            } else {
                query.page.min(total_pages)
            };
            let offset = (page - 1) * per_page;

            let sql = format!(
                "SELECT {} FROM tasks t{} ORDER BY {} LIMIT {} OFFSET {}",
                TASK_COLUMNS,
                where_sql,
                query.ordering.sql(),
                per_page,
                offset
            );
            let mut stmt = conn.prepare(&sql)?;
            let tasks = stmt
                .query_map(params_refs.as_slice(), parse_task_row)?
                .collect::<Result<Vec<_>, _>>()?;

            Ok(TaskPage {
                tasks,
                total,
                page,
                per_page,
                total_pages,
            })
        })
    }
}
