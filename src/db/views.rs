//! Read models serialized by the HTTP layer.
//!
//! These resolve user ids into summaries and attach the counts and child
//! collections the list and detail views show.

use super::Database;
use super::attachments::get_attachments_internal;
use super::checklist::get_checklist_internal;
use super::comments::get_latest_comments_internal;
use super::hierarchy::get_children_internal;
use super::tags::get_task_tags_internal;
use super::tasks::get_task_internal;
use super::time_entries::count_time_entries_internal;
use super::users::get_user_internal;
use super::watchers::get_watchers_internal;
use crate::types::{
    Attachment, ChecklistItem, Comment, HistoryEntry, Hours, Priority, Tag, Task, TaskId,
    TaskStatus, TimeEntry, User, UserId, UserTaskStats, Watcher, timestamp_to_rfc3339,
};
use anyhow::Result;
use chrono::NaiveDate;
use rusqlite::{Connection, params};
use serde::Serialize;

/// Short user summary embedded in other objects.
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct UserRef {
    pub id: UserId,
    pub email: String,
    pub full_name: String,
}

impl From<&User> for UserRef {
    fn from(user: &User) -> Self {
        Self {
            id: user.id,
            email: user.email.clone(),
            full_name: user.full_name(),
        }
    }
}

/// A user's own or public profile.
#[derive(Debug, Clone, Serialize)]
pub struct UserView {
    pub id: UserId,
    pub email: String,
    pub first_name: String,
    pub last_name: String,
    pub full_name: String,
    pub roles: Vec<&'static str>,
    pub role_display: String,
    pub is_active: bool,
    pub is_verified: bool,
    pub is_supervisor: bool,
    pub supervisor_id: Option<UserId>,
    pub bio: Option<String>,
    pub timezone: Option<String>,
    pub date_joined: String,
}

impl From<&User> for UserView {
    fn from(user: &User) -> Self {
        Self {
            id: user.id,
            email: user.email.clone(),
            first_name: user.first_name.clone(),
            last_name: user.last_name.clone(),
            full_name: user.full_name(),
            roles: user.roles(),
            role_display: user.role_display(),
            is_active: user.is_active,
            is_verified: user.is_verified,
            is_supervisor: user.is_supervisor,
            supervisor_id: user.supervisor_id,
            bio: user.bio.clone(),
            timezone: user.timezone.clone(),
            date_joined: timestamp_to_rfc3339(user.date_joined),
        }
    }
}

/// User row in the administration list.
#[derive(Debug, Clone, Serialize)]
pub struct AdminUserView {
    #[serde(flatten)]
    pub user: UserView,
    pub is_staff: bool,
    pub is_superuser: bool,
    pub is_moderator: bool,
    pub is_employee: bool,
    pub is_watcher: bool,
    pub task_stats: UserTaskStats,
}

#[derive(Debug, Clone, Serialize)]
pub struct TaskListItem {
    pub id: TaskId,
    pub title: String,
    pub status: TaskStatus,
    pub status_display: &'static str,
    pub priority: Priority,
    pub priority_display: &'static str,
    pub creator: Option<UserRef>,
    pub assignee: Option<UserRef>,
    pub deadline: Option<String>,
    pub created_at: String,
    pub updated_at: String,
    pub completed_at: Option<String>,
    pub estimated_hours: Option<Hours>,
    pub actual_hours: Hours,
    pub tags: Vec<Tag>,
    pub has_subtasks: bool,
    pub comments_count: i64,
    pub attachments_count: i64,
}

#[derive(Debug, Clone, Serialize)]
pub struct TaskDetail {
    #[serde(flatten)]
    pub summary: TaskListItem,
    pub description: Option<String>,
    pub parent_task: Option<TaskId>,
    pub subtasks: Vec<TaskListItem>,
    pub comments: Vec<CommentView>,
    pub attachments: Vec<AttachmentView>,
    pub checklist: Vec<ChecklistView>,
    pub watchers: Vec<WatcherView>,
    pub time_entries_count: i64,
}

#[derive(Debug, Clone, Serialize)]
pub struct CommentView {
    pub id: i64,
    pub task_id: TaskId,
    pub author: Option<UserRef>,
    pub text: String,
    pub is_system: bool,
    pub created_at: String,
    pub updated_at: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct AttachmentView {
    pub id: i64,
    pub task_id: TaskId,
    pub file_name: String,
    pub file_size: i64,
    pub extension: String,
    pub url: String,
    pub uploaded_by: Option<UserRef>,
    pub uploaded_at: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct ChecklistView {
    pub id: i64,
    pub task_id: TaskId,
    pub item_text: String,
    pub is_completed: bool,
    pub order: i32,
    pub completed_at: Option<String>,
    pub completed_by: Option<UserRef>,
}

#[derive(Debug, Clone, Serialize)]
pub struct WatcherView {
    pub user: Option<UserRef>,
    pub added_at: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct TimeEntryView {
    pub id: i64,
    pub task_id: TaskId,
    pub user: Option<UserRef>,
    pub hours: Hours,
    pub description: String,
    pub date: NaiveDate,
    pub created_at: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct HistoryView {
    pub id: i64,
    pub field: String,
    pub old_value: String,
    pub new_value: String,
    pub changed_by: Option<UserRef>,
    pub changed_at: String,
}

fn user_ref(conn: &Connection, user_id: Option<UserId>) -> Result<Option<UserRef>> {
    Ok(match user_id {
        Some(id) => get_user_internal(conn, id)?.as_ref().map(UserRef::from),
        None => None,
    })
}

fn count(conn: &Connection, sql: &str, task_id: TaskId) -> Result<i64> {
    Ok(conn.query_row(sql, params![task_id], |row| row.get(0))?)
}

fn list_item(conn: &Connection, task: &Task) -> Result<TaskListItem> {
    Ok(TaskListItem {
        id: task.id,
        title: task.title.clone(),
        status: task.status,
        status_display: task.status.label(),
        priority: task.priority,
        priority_display: task.priority.label(),
        creator: user_ref(conn, Some(task.creator_id))?,
        assignee: user_ref(conn, task.assignee_id)?,
        deadline: task.deadline.map(timestamp_to_rfc3339),
        created_at: timestamp_to_rfc3339(task.created_at),
        updated_at: timestamp_to_rfc3339(task.updated_at),
        completed_at: task.completed_at.map(timestamp_to_rfc3339),
        estimated_hours: task.estimated_hours,
        actual_hours: task.actual_hours,
        tags: get_task_tags_internal(conn, task.id)?,
        has_subtasks: count(
            conn,
            "SELECT COUNT(*) FROM tasks WHERE parent_task_id = ?1",
            task.id,
        )? > 0,
        comments_count: count(
            conn,
            "SELECT COUNT(*) FROM task_comments WHERE task_id = ?1",
            task.id,
        )?,
        attachments_count: count(
            conn,
            "SELECT COUNT(*) FROM task_attachments WHERE task_id = ?1",
            task.id,
        )?,
    })
}

fn comment_view(conn: &Connection, comment: &Comment) -> Result<CommentView> {
    Ok(CommentView {
        id: comment.id,
        task_id: comment.task_id,
        author: user_ref(conn, Some(comment.author_id))?,
        text: comment.text.clone(),
        is_system: comment.is_system,
        created_at: timestamp_to_rfc3339(comment.created_at),
        updated_at: timestamp_to_rfc3339(comment.updated_at),
    })
}

fn attachment_view(conn: &Connection, attachment: &Attachment) -> Result<AttachmentView> {
    Ok(AttachmentView {
        id: attachment.id,
        task_id: attachment.task_id,
        file_name: attachment.file_name.clone(),
        file_size: attachment.file_size,
        extension: attachment.extension(),
        url: format!("/api/attachments/{}", attachment.id),
        uploaded_by: user_ref(conn, Some(attachment.uploaded_by))?,
        uploaded_at: timestamp_to_rfc3339(attachment.uploaded_at),
    })
}

fn checklist_view(conn: &Connection, item: &ChecklistItem) -> Result<ChecklistView> {
    Ok(ChecklistView {
        id: item.id,
        task_id: item.task_id,
        item_text: item.item_text.clone(),
        is_completed: item.is_completed,
        order: item.order,
        completed_at: item.completed_at.map(timestamp_to_rfc3339),
        completed_by: user_ref(conn, item.completed_by)?,
    })
}

fn watcher_view(conn: &Connection, watcher: &Watcher) -> Result<WatcherView> {
    Ok(WatcherView {
        user: user_ref(conn, Some(watcher.user_id))?,
        added_at: timestamp_to_rfc3339(watcher.added_at),
    })
}

fn time_entry_view(conn: &Connection, entry: &TimeEntry) -> Result<TimeEntryView> {
    Ok(TimeEntryView {
        id: entry.id,
        task_id: entry.task_id,
        user: user_ref(conn, Some(entry.user_id))?,
        hours: entry.hours,
        description: entry.description.clone(),
        date: entry.date,
        created_at: timestamp_to_rfc3339(entry.created_at),
    })
}

fn history_view(conn: &Connection, entry: &HistoryEntry) -> Result<HistoryView> {
    Ok(HistoryView {
        id: entry.id,
        field: entry.field.clone(),
        old_value: entry.old_value.clone(),
        new_value: entry.new_value.clone(),
        changed_by: user_ref(conn, Some(entry.changed_by))?,
        changed_at: timestamp_to_rfc3339(entry.changed_at),
    })
}

impl Database {
    pub fn task_list_items(&self, tasks: &[Task]) -> Result<Vec<TaskListItem>> {
        self.with_conn(|conn| tasks.iter().map(|t| list_item(conn, t)).collect())
    }

    /// Full detail view with the latest `comments_limit` comments.
    pub fn task_detail(&self, task: &Task, comments_limit: usize) -> Result<TaskDetail> {
        self.with_conn(|conn| {
            let mut subtasks = Vec::new();
            for child_id in get_children_internal(conn, task.id)? {
                if let Some(child) = get_task_internal(conn, child_id)? {
                    subtasks.push(list_item(conn, &child)?);
                }
            }

            let comments = get_latest_comments_internal(conn, task.id, comments_limit)?
                .iter()
                .map(|c| comment_view(conn, c))
                .collect::<Result<Vec<_>>>()?;
            let attachments = get_attachments_internal(conn, task.id)?
                .iter()
                .map(|a| attachment_view(conn, a))
                .collect::<Result<Vec<_>>>()?;
            let checklist = get_checklist_internal(conn, task.id)?
                .iter()
                .map(|i| checklist_view(conn, i))
                .collect::<Result<Vec<_>>>()?;
            let watchers = get_watchers_internal(conn, task.id)?
                .iter()
                .map(|w| watcher_view(conn, w))
                .collect::<Result<Vec<_>>>()?;

            Ok(TaskDetail {
                summary: list_item(conn, task)?,
                description: task.description.clone(),
                parent_task: task.parent_task_id,
                subtasks,
                comments,
                attachments,
                checklist,
                watchers,
                time_entries_count: count_time_entries_internal(conn, task.id)?,
            })
        })
    }

    pub fn comment_view(&self, comment: &Comment) -> Result<CommentView> {
        self.with_conn(|conn| comment_view(conn, comment))
    }

    pub fn attachment_view(&self, attachment: &Attachment) -> Result<AttachmentView> {
        self.with_conn(|conn| attachment_view(conn, attachment))
    }

    pub fn checklist_view(&self, item: &ChecklistItem) -> Result<ChecklistView> {
        self.with_conn(|conn| checklist_view(conn, item))
    }

    pub fn watcher_views(&self, watchers: &[Watcher]) -> Result<Vec<WatcherView>> {
        self.with_conn(|conn| watchers.iter().map(|w| watcher_view(conn, w)).collect())
    }

    pub fn time_entry_views(&self, entries: &[TimeEntry]) -> Result<Vec<TimeEntryView>> {
        self.with_conn(|conn| entries.iter().map(|e| time_entry_view(conn, e)).collect())
    }

    pub fn history_views(&self, entries: &[HistoryEntry]) -> Result<Vec<HistoryView>> {
        self.with_conn(|conn| entries.iter().map(|e| history_view(conn, e)).collect())
    }

    /// Every user with their task statistics.
    pub fn admin_user_views(&self) -> Result<Vec<AdminUserView>> {
        let users = self.list_users()?;
        users
            .iter()
            .map(|user| {
                Ok(AdminUserView {
                    user: UserView::from(user),
                    is_staff: user.is_staff,
                    is_superuser: user.is_superuser,
                    is_moderator: user.is_moderator,
                    is_employee: user.is_employee,
                    is_watcher: user.is_watcher,
                    task_stats: self.user_task_stats(user.id)?,
                })
            })
            .collect()
    }
}
