//! Permission predicates.
//!
//! All checks are pure functions over a user and a [`TaskContext`] loaded from
//! the database, so handlers decide access without further queries.

use crate::types::{Attachment, Comment, Task, TimeEntry, User, UserId};

/// A task together with the relations its permission checks need.
#[derive(Debug, Clone)]
pub struct TaskContext {
    pub task: Task,
    pub watcher_ids: Vec<UserId>,
    /// Supervisor of the current assignee, if any.
    pub assignee_supervisor_id: Option<UserId>,
}

impl TaskContext {
    fn supervises_assignee(&self, user: &User) -> bool {
        user.is_supervisor
            && self.task.assignee_id.is_some()
            && self.assignee_supervisor_id == Some(user.id)
    }

    fn is_creator(&self, user: &User) -> bool {
        self.task.creator_id == user.id
    }

    pub fn is_assignee(&self, user: &User) -> bool {
        self.task.assignee_id == Some(user.id)
    }

    fn is_watcher(&self, user: &User) -> bool {
        self.watcher_ids.contains(&user.id)
    }
}

pub fn can_view(user: &User, ctx: &TaskContext) -> bool {
    if !user.is_active {
        return false;
    }
    user.is_admin()
        || ctx.is_creator(user)
        || ctx.is_assignee(user)
        || ctx.is_watcher(user)
        || ctx.supervises_assignee(user)
}

pub fn can_edit(user: &User, ctx: &TaskContext) -> bool {
    if !user.is_active {
        return false;
    }
    user.is_admin() || ctx.is_creator(user) || ctx.supervises_assignee(user)
}

pub fn can_delete(user: &User, ctx: &TaskContext) -> bool {
    if !user.is_active {
        return false;
    }
    user.is_admin() || ctx.is_creator(user)
}

/// Managers see every task in lists.
pub fn is_manager(user: &User) -> bool {
    user.is_active && user.is_supervisor
}

/// Whether the task list is unrestricted for this user.
pub fn sees_all_tasks(user: &User) -> bool {
    user.is_active && (user.is_admin() || is_manager(user))
}

pub fn can_admin(user: &User) -> bool {
    user.is_active && user.is_admin()
}

// Derived resource rules

pub fn can_edit_comment(user: &User, comment: &Comment) -> bool {
    user.is_active && !comment.is_system && comment.author_id == user.id
}

pub fn can_delete_comment(user: &User, comment: &Comment, ctx: &TaskContext) -> bool {
    if !user.is_active {
        return false;
    }
    comment.author_id == user.id || user.is_admin() || can_delete(user, ctx)
}

/// Watchers are managed by editors; anyone who can view may (un)watch themselves.
pub fn can_manage_watcher(user: &User, ctx: &TaskContext, target: UserId) -> bool {
    can_edit(user, ctx) || (target == user.id && can_view(user, ctx))
}

pub fn can_toggle_checklist(user: &User, ctx: &TaskContext) -> bool {
    can_edit(user, ctx) || (user.is_active && ctx.is_assignee(user))
}

pub fn can_delete_attachment(user: &User, attachment: &Attachment, ctx: &TaskContext) -> bool {
    (user.is_active && attachment.uploaded_by == user.id) || can_edit(user, ctx)
}

pub fn can_log_time(user: &User, ctx: &TaskContext) -> bool {
    (user.is_active && ctx.is_assignee(user)) || can_edit(user, ctx)
}

pub fn can_delete_time_entry(user: &User, entry: &TimeEntry) -> bool {
    user.is_active && (entry.user_id == user.id || user.is_admin())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{Hours, Priority, TaskStatus};

    fn user(id: UserId) -> User {
        User {
            id,
            email: format!("user{}@example.com", id),
            password_hash: String::new(),
            first_name: String::new(),
            last_name: String::new(),
            is_active: true,
            is_staff: false,
            is_superuser: false,
            is_moderator: false,
            is_employee: true,
            is_watcher: false,
            is_supervisor: false,
            is_verified: true,
            supervisor_id: None,
            bio: None,
            timezone: None,
            date_joined: 0,
            updated_at: 0,
        }
    }

    fn ctx(creator: UserId, assignee: Option<UserId>) -> TaskContext {
        TaskContext {
            task: Task {
                id: 1,
                title: "t".into(),
                description: None,
                creator_id: creator,
                assignee_id: assignee,
                status: TaskStatus::New,
                priority: Priority::Low,
                deadline: None,
                created_at: 0,
                updated_at: 0,
                completed_at: None,
                estimated_hours: None,
                actual_hours: Hours::ZERO,
                parent_task_id: None,
            },
            watcher_ids: Vec::new(),
            assignee_supervisor_id: None,
        }
    }

    #[test]
    fn test_creator_and_assignee() {
        let c = ctx(1, Some(2));
        assert!(can_view(&user(1), &c));
        assert!(can_edit(&user(1), &c));
        assert!(can_delete(&user(1), &c));

        assert!(can_view(&user(2), &c));
        assert!(!can_edit(&user(2), &c));
        assert!(!can_delete(&user(2), &c));

        assert!(!can_view(&user(3), &c));
    }

    #[test]
    fn test_inactive_user_has_no_access() {
        let c = ctx(1, Some(1));
        let mut u = user(1);
        u.is_active = false;
        u.is_superuser = true;
        assert!(!can_view(&u, &c));
        assert!(!can_edit(&u, &c));
        assert!(!can_delete(&u, &c));
    }

    #[test]
    fn test_admin_has_full_access() {
        let c = ctx(1, Some(2));
        let mut admin = user(9);
        admin.is_staff = true;
        assert!(can_view(&admin, &c));
        assert!(can_edit(&admin, &c));
        assert!(can_delete(&admin, &c));
        assert!(can_admin(&admin));
    }

    #[test]
    fn test_watcher_can_view_only() {
        let mut c = ctx(1, Some(2));
        c.watcher_ids.push(3);
        assert!(can_view(&user(3), &c));
        assert!(!can_edit(&user(3), &c));
    }

    #[test]
    fn test_supervisor_of_assignee() {
        let mut c = ctx(1, Some(2));
        c.assignee_supervisor_id = Some(5);
        let mut sup = user(5);
        sup.is_supervisor = true;
        assert!(can_view(&sup, &c));
        assert!(can_edit(&sup, &c));
        assert!(!can_delete(&sup, &c));
        assert!(is_manager(&sup));

        // Without the supervisor role the link grants nothing.
        assert!(!can_view(&user(5), &c));
    }

    #[test]
    fn test_watcher_management() {
        let c = ctx(1, Some(2));
        // Assignee may watch themselves but not add others.
        assert!(can_manage_watcher(&user(2), &c, 2));
        assert!(!can_manage_watcher(&user(2), &c, 3));
        // Creator may add anyone.
        assert!(can_manage_watcher(&user(1), &c, 3));
        // Outsider may not even add themselves.
        assert!(!can_manage_watcher(&user(4), &c, 4));
    }

    #[test]
    fn test_comment_rules() {
        let c = ctx(1, Some(2));
        let comment = Comment {
            id: 1,
            task_id: 1,
            author_id: 2,
            text: "hi".into(),
            is_system: false,
            created_at: 0,
            updated_at: 0,
        };
        assert!(can_edit_comment(&user(2), &comment));
        assert!(!can_edit_comment(&user(1), &comment));
        assert!(can_delete_comment(&user(1), &comment, &c));
        assert!(!can_delete_comment(&user(3), &comment, &c));

        let system = Comment {
            is_system: true,
            ..comment
        };
        assert!(!can_edit_comment(&user(2), &system));
    }

    #[test]
    fn test_time_and_checklist_rules() {
        let c = ctx(1, Some(2));
        assert!(can_log_time(&user(2), &c));
        assert!(can_log_time(&user(1), &c));
        assert!(!can_log_time(&user(3), &c));
        assert!(can_toggle_checklist(&user(2), &c));
        assert!(!can_toggle_checklist(&user(3), &c));
    }
}
