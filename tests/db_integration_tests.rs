//! Integration tests for the database layer.
//!
//! These tests verify the core database operations using an in-memory SQLite database.
//! Tests are organized by module and functionality.

use chrono::NaiveDate;
use task_tracker::db::Database;
use task_tracker::db::tasks::{TaskBulkAction, TaskOrdering, TaskQuery};
use task_tracker::db::users::UserBulkAction;
use task_tracker::error::{ApiError, ErrorCode};
use task_tracker::types::{
    Hours, NewTask, NewUser, Priority, Task, TaskChanges, TaskStatus, User,
};

/// Helper to create a fresh in-memory database for testing.
fn setup_db() -> Database {
    Database::open_in_memory().expect("Failed to create in-memory database")
}

fn create_user(db: &Database, email: &str) -> User {
    db.create_user(
        &NewUser {
            email: email.to_string(),
            password: "unused".to_string(),
            first_name: "Test".to_string(),
            last_name: email.split('@').next().unwrap_or_default().to_string(),
            ..Default::default()
        },
        "hash",
    )
    .expect("Failed to create user")
}

fn new_task(title: &str, assignee: &User) -> NewTask {
    NewTask {
        title: title.to_string(),
        description: None,
        status: TaskStatus::New,
        priority: Priority::Low,
        assignee_id: assignee.id,
        deadline: None,
        estimated_hours: None,
        tag_ids: Vec::new(),
        parent_task_id: None,
    }
}

fn create_task(db: &Database, creator: &User, title: &str) -> Task {
    db.create_task(creator, &new_task(title, creator))
        .expect("Failed to create task")
}

fn set_parent(db: &Database, actor: &User, task: &Task, parent: Option<&Task>) -> anyhow::Result<Task> {
    db.update_task(
        actor,
        task.id,
        &TaskChanges {
            parent_task_id: Some(parent.map(|p| p.id)),
            ..Default::default()
        },
    )
}

/// The field error carried by a failed db call.
fn field_error(err: anyhow::Error, field: &str) -> String {
    let api: ApiError = err.into();
    assert_eq!(api.code, ErrorCode::ValidationFailed, "unexpected error: {}", api);
    api.errors
        .get(field)
        .cloned()
        .unwrap_or_else(|| panic!("no error on {}: {}", field, api))
}

mod user_tests {
    use super::*;

    #[test]
    fn create_user_normalizes_email_and_sets_defaults() {
        let db = setup_db();
        let user = create_user(&db, "Mixed.Case@Example.COM");

        assert_eq!(user.email, "mixed.case@example.com");
        assert!(user.is_active);
        assert!(user.is_employee);
        assert!(!user.is_verified);
        assert!(!user.is_admin());
    }

    #[test]
    fn duplicate_email_is_rejected_case_insensitively() {
        let db = setup_db();
        create_user(&db, "dup@example.com");

        let err = db
            .create_user(
                &NewUser {
                    email: "DUP@example.com".into(),
                    ..Default::default()
                },
                "hash",
            )
            .unwrap_err();
        let api: ApiError = err.into();
        assert_eq!(api.code, ErrorCode::AlreadyExists);
        assert!(api.errors.contains_key("email"));
    }

    #[test]
    fn get_user_by_email_ignores_case() {
        let db = setup_db();
        let user = create_user(&db, "find@example.com");
        let found = db.get_user_by_email(" FIND@example.com ").unwrap().unwrap();
        assert_eq!(found.id, user.id);
        assert!(db.get_user_by_email("nobody@example.com").unwrap().is_none());
    }

    #[test]
    fn mark_verified_only_once() {
        let db = setup_db();
        let user = create_user(&db, "v@example.com");
        assert!(db.mark_verified(user.id).unwrap());
        assert!(!db.mark_verified(user.id).unwrap());
        assert!(db.get_user(user.id).unwrap().unwrap().is_verified);
    }

    #[test]
    fn supervisor_requires_role_and_forbids_self() {
        let db = setup_db();
        let boss = create_user(&db, "boss@example.com");
        let worker = create_user(&db, "worker@example.com");

        let err = db.set_supervisor(worker.id, Some(boss.id)).unwrap_err();
        assert!(field_error(err, "supervisor_id").contains("supervisor role"));

        db.bulk_update_users(&[boss.id], UserBulkAction::MakeSupervisor)
            .unwrap();
        let err = db.set_supervisor(boss.id, Some(boss.id)).unwrap_err();
        assert!(field_error(err, "supervisor_id").contains("themselves"));

        let updated = db.set_supervisor(worker.id, Some(boss.id)).unwrap();
        assert_eq!(updated.supervisor_id, Some(boss.id));
        assert!(db.is_subordinate(boss.id, worker.id).unwrap());

        let subordinates = db.get_subordinates(boss.id).unwrap();
        assert_eq!(subordinates.len(), 1);
        assert_eq!(subordinates[0].id, worker.id);

        let cleared = db.set_supervisor(worker.id, None).unwrap();
        assert_eq!(cleared.supervisor_id, None);
    }

    #[test]
    fn bulk_deactivate_counts_rows() {
        let db = setup_db();
        let a = create_user(&db, "a@example.com");
        let b = create_user(&db, "b@example.com");

        let updated = db
            .bulk_update_users(&[a.id, b.id, 999], UserBulkAction::Deactivate)
            .unwrap();
        assert_eq!(updated, 2);
        assert!(!db.get_user(a.id).unwrap().unwrap().is_active);
    }

    #[test]
    fn user_task_stats_counts_created_and_assigned() {
        let db = setup_db();
        let a = create_user(&db, "a@example.com");
        let b = create_user(&db, "b@example.com");
        create_task(&db, &a, "mine");
        db.create_task(&a, &new_task("theirs", &b)).unwrap();

        let stats = db.user_task_stats(a.id).unwrap();
        assert_eq!(stats.created, 2);
        assert_eq!(stats.assigned, 1);
        assert_eq!(db.user_task_stats(b.id).unwrap().assigned, 1);
    }
}

mod task_tests {
    use super::*;

    #[test]
    fn create_task_adds_creation_comment() {
        let db = setup_db();
        let creator = create_user(&db, "creator@example.com");
        let assignee = create_user(&db, "assignee@example.com");

        let task = db.create_task(&creator, &new_task("Write docs", &assignee)).unwrap();
        assert_eq!(task.status, TaskStatus::New);
        assert_eq!(task.actual_hours, Hours::ZERO);
        assert!(task.completed_at.is_none());

        let comments = db.get_comments(task.id).unwrap();
        assert_eq!(comments.len(), 1);
        assert!(comments[0].is_system);
        assert_eq!(
            comments[0].text,
            "Task created by creator@example.com and assigned to assignee@example.com"
        );
        assert_eq!(comments[0].author_id, creator.id);
    }

    #[test]
    fn create_task_rejects_inactive_assignee_and_unknown_tags() {
        let db = setup_db();
        let creator = create_user(&db, "creator@example.com");
        let inactive = create_user(&db, "gone@example.com");
        db.bulk_update_users(&[inactive.id], UserBulkAction::Deactivate)
            .unwrap();

        let mut input = new_task("Task", &inactive);
        input.tag_ids = vec![42];
        let api: ApiError = db.create_task(&creator, &input).unwrap_err().into();
        assert!(api.errors.contains_key("assignee"));
        assert!(api.errors.contains_key("tags"));
    }

    #[test]
    fn task_created_completed_gets_completed_at() {
        let db = setup_db();
        let user = create_user(&db, "u@example.com");
        let mut input = new_task("Already done", &user);
        input.status = TaskStatus::Completed;

        let task = db.create_task(&user, &input).unwrap();
        assert!(task.completed_at.is_some());
    }

    #[test]
    fn tags_are_linked_and_replaced() {
        let db = setup_db();
        let user = create_user(&db, "u@example.com");
        let bug = db.create_tag("bug", None, user.id).unwrap();
        let ui = db.create_tag("ui", Some("#FF0000"), user.id).unwrap();
        assert_eq!(bug.color, "#808080");

        let mut input = new_task("Tagged", &user);
        input.tag_ids = vec![bug.id, ui.id];
        let task = db.create_task(&user, &input).unwrap();
        assert_eq!(db.get_task_tags(task.id).unwrap().len(), 2);

        db.update_task(
            &user,
            task.id,
            &TaskChanges {
                tag_ids: Some(vec![ui.id]),
                ..Default::default()
            },
        )
        .unwrap();
        let tags = db.get_task_tags(task.id).unwrap();
        assert_eq!(tags.len(), 1);
        assert_eq!(tags[0].name, "ui");
    }

    #[test]
    fn duplicate_tag_name_conflicts() {
        let db = setup_db();
        let user = create_user(&db, "u@example.com");
        db.create_tag("bug", None, user.id).unwrap();
        let api: ApiError = db.create_tag("bug", None, user.id).unwrap_err().into();
        assert_eq!(api.code, ErrorCode::AlreadyExists);
    }

    #[test]
    fn delete_task_cascades_to_subtasks() {
        let db = setup_db();
        let user = create_user(&db, "u@example.com");
        let parent = create_task(&db, &user, "parent");
        let child = create_task(&db, &user, "child");
        set_parent(&db, &user, &child, Some(&parent)).unwrap();
        db.add_comment(child.id, user.id, "note").unwrap();

        assert!(db.delete_task(parent.id).unwrap());
        assert!(db.get_task(child.id).unwrap().is_none());
        assert!(!db.delete_task(parent.id).unwrap());
    }

    #[test]
    fn attachment_paths_cover_the_whole_tree() {
        let db = setup_db();
        let user = create_user(&db, "u@example.com");
        let parent = create_task(&db, &user, "parent");
        let child = create_task(&db, &user, "child");
        set_parent(&db, &user, &child, Some(&parent)).unwrap();

        db.add_attachment(parent.id, "task_attachments/a_p.txt", "p.txt", 1, user.id)
            .unwrap();
        db.add_attachment(child.id, "task_attachments/b_c.txt", "c.txt", 1, user.id)
            .unwrap();

        let mut paths = db.get_attachment_paths_in_tree(parent.id).unwrap();
        paths.sort();
        assert_eq!(
            paths,
            vec!["task_attachments/a_p.txt", "task_attachments/b_c.txt"]
        );
        assert_eq!(db.get_attachment_paths_in_tree(child.id).unwrap().len(), 1);

        let attachments = db.get_attachments(parent.id).unwrap();
        assert_eq!(attachments.len(), 1);
        assert_eq!(attachments[0].extension(), "txt");
    }
}

mod hierarchy_tests {
    use super::*;

    #[test]
    fn task_cannot_be_its_own_parent() {
        let db = setup_db();
        let user = create_user(&db, "u@example.com");
        let task = create_task(&db, &user, "solo");

        let err = set_parent(&db, &user, &task, Some(&task)).unwrap_err();
        assert!(field_error(err, "parent_task").contains("own parent"));
    }

    #[test]
    fn direct_cycle_is_rejected() {
        let db = setup_db();
        let user = create_user(&db, "u@example.com");
        let a = create_task(&db, &user, "a");
        let b = create_task(&db, &user, "b");
        set_parent(&db, &user, &b, Some(&a)).unwrap();

        let err = set_parent(&db, &user, &a, Some(&b)).unwrap_err();
        assert_eq!(field_error(err, "parent_task"), "Cycle detected in parent tasks.");
        // Nothing was written.
        assert_eq!(db.get_task(a.id).unwrap().unwrap().parent_task_id, None);
    }

    #[test]
    fn indirect_cycle_is_rejected() {
        let db = setup_db();
        let user = create_user(&db, "u@example.com");
        let a = create_task(&db, &user, "a");
        let b = create_task(&db, &user, "b");
        let c = create_task(&db, &user, "c");
        set_parent(&db, &user, &b, Some(&a)).unwrap();
        set_parent(&db, &user, &c, Some(&b)).unwrap();

        let err = set_parent(&db, &user, &a, Some(&c)).unwrap_err();
        assert_eq!(field_error(err, "parent_task"), "Cycle detected in parent tasks.");
        assert_eq!(db.get_ancestors(c.id).unwrap(), vec![b.id, a.id]);

        // Dry-run check agrees and a fresh task may hang anywhere.
        assert!(db.check_parent(Some(a.id), c.id).is_err());
        assert!(db.check_parent(None, c.id).is_ok());
    }

    #[test]
    fn reparenting_within_acyclic_tree_is_allowed() {
        let db = setup_db();
        let user = create_user(&db, "u@example.com");
        let root = create_task(&db, &user, "root");
        let left = create_task(&db, &user, "left");
        let right = create_task(&db, &user, "right");
        let leaf = create_task(&db, &user, "leaf");
        set_parent(&db, &user, &left, Some(&root)).unwrap();
        set_parent(&db, &user, &right, Some(&root)).unwrap();
        set_parent(&db, &user, &leaf, Some(&left)).unwrap();

        let moved = set_parent(&db, &user, &leaf, Some(&right)).unwrap();
        assert_eq!(moved.parent_task_id, Some(right.id));
        assert_eq!(db.get_subtasks(right.id).unwrap().len(), 1);
        assert!(db.get_subtasks(left.id).unwrap().is_empty());

        let detached = set_parent(&db, &user, &leaf, None).unwrap();
        assert_eq!(detached.parent_task_id, None);
    }

    #[test]
    fn missing_parent_is_rejected_on_create() {
        let db = setup_db();
        let user = create_user(&db, "u@example.com");
        let mut input = new_task("orphan", &user);
        input.parent_task_id = Some(404);

        let err = db.create_task(&user, &input).unwrap_err();
        assert_eq!(field_error(err, "parent_task"), "Parent task not found.");
    }
}

mod status_tests {
    use super::*;

    fn set_status(db: &Database, actor: &User, task: &Task, status: TaskStatus) -> anyhow::Result<Task> {
        db.update_task(
            actor,
            task.id,
            &TaskChanges {
                status: Some(status),
                ..Default::default()
            },
        )
    }

    #[test]
    fn completed_task_cannot_be_reopened() {
        let db = setup_db();
        let user = create_user(&db, "u@example.com");
        let task = create_task(&db, &user, "t");

        let done = set_status(&db, &user, &task, TaskStatus::Completed).unwrap();
        let completed_at = done.completed_at.expect("completed_at set");

        for status in [TaskStatus::New, TaskStatus::InProgress, TaskStatus::Rejected] {
            let err = set_status(&db, &user, &task, status).unwrap_err();
            field_error(err, "status");
        }

        // Saving other fields keeps the original completion time.
        let renamed = db
            .update_task(
                &user,
                task.id,
                &TaskChanges {
                    title: Some("renamed".into()),
                    ..Default::default()
                },
            )
            .unwrap();
        assert_eq!(renamed.completed_at, Some(completed_at));
        assert_eq!(renamed.status, TaskStatus::Completed);
    }

    #[test]
    fn other_transitions_are_free() {
        let db = setup_db();
        let user = create_user(&db, "u@example.com");
        let task = create_task(&db, &user, "t");

        for status in [
            TaskStatus::Review,
            TaskStatus::New,
            TaskStatus::Rejected,
            TaskStatus::InProgress,
        ] {
            let updated = set_status(&db, &user, &task, status).unwrap();
            assert_eq!(updated.status, status);
            assert!(updated.completed_at.is_none());
        }
    }

    #[test]
    fn bulk_update_skips_completed_tasks() {
        let db = setup_db();
        let admin = create_user(&db, "admin@example.com");
        let open = create_task(&db, &admin, "open");
        let done = create_task(&db, &admin, "done");
        set_status(&db, &admin, &done, TaskStatus::Completed).unwrap();

        let updated = db
            .bulk_update_tasks(&admin, &[open.id, done.id, 999], TaskBulkAction::MarkInProgress)
            .unwrap();
        assert_eq!(updated, 1);
        assert_eq!(
            db.get_task(open.id).unwrap().unwrap().status,
            TaskStatus::InProgress
        );
        assert_eq!(
            db.get_task(done.id).unwrap().unwrap().status,
            TaskStatus::Completed
        );

        let updated = db
            .bulk_update_tasks(&admin, &[open.id, done.id], TaskBulkAction::SetHighPriority)
            .unwrap();
        assert_eq!(updated, 2);
    }
}

mod history_tests {
    use super::*;

    #[test]
    fn only_changed_tracked_fields_are_recorded() {
        let db = setup_db();
        let user = create_user(&db, "u@example.com");
        let other = create_user(&db, "other@example.com");
        let task = create_task(&db, &user, "original");

        // Same title, new description: nothing tracked changed.
        db.update_task(
            &user,
            task.id,
            &TaskChanges {
                title: Some("original".into()),
                description: Some(Some("details".into())),
                ..Default::default()
            },
        )
        .unwrap();
        assert!(db.get_task_history(task.id).unwrap().is_empty());

        db.update_task(
            &user,
            task.id,
            &TaskChanges {
                title: Some("renamed".into()),
                priority: Some(Priority::Critical),
                assignee_id: Some(Some(other.id)),
                ..Default::default()
            },
        )
        .unwrap();

        let history = db.get_task_history(task.id).unwrap();
        let mut fields: Vec<&str> = history.iter().map(|h| h.field.as_str()).collect();
        fields.sort();
        assert_eq!(fields, vec!["assignee", "priority", "title"]);

        let assignee = history.iter().find(|h| h.field == "assignee").unwrap();
        assert_eq!(assignee.old_value, "u@example.com");
        assert_eq!(assignee.new_value, "other@example.com");
        let priority = history.iter().find(|h| h.field == "priority").unwrap();
        assert_eq!(priority.old_value, "low");
        assert_eq!(priority.new_value, "critical");
        assert!(history.iter().all(|h| h.changed_by == user.id));
    }

    #[test]
    fn status_and_deadline_changes_add_system_comments() {
        let db = setup_db();
        let user = create_user(&db, "u@example.com");
        let task = create_task(&db, &user, "t");
        let deadline = chrono::NaiveDate::from_ymd_opt(2031, 5, 4)
            .unwrap()
            .and_hms_opt(9, 30, 0)
            .unwrap()
            .and_utc()
            .timestamp_millis();

        db.update_task(
            &user,
            task.id,
            &TaskChanges {
                status: Some(TaskStatus::InProgress),
                deadline: Some(Some(deadline)),
                ..Default::default()
            },
        )
        .unwrap();

        let texts: Vec<String> = db
            .get_comments(task.id)
            .unwrap()
            .into_iter()
            .filter(|c| c.is_system)
            .map(|c| c.text)
            .collect();
        assert!(texts.contains(&"Status changed: New → In Progress".to_string()));
        assert!(texts.contains(&"Deadline changed: Not set → 04.05.2031 09:30".to_string()));

        let history = db.get_task_history(task.id).unwrap();
        let deadline_row = history.iter().find(|h| h.field == "deadline").unwrap();
        assert_eq!(deadline_row.old_value, "");
        assert!(deadline_row.new_value.starts_with("2031-05-04T09:30:00"));
    }

    #[test]
    fn reassignment_comment_uses_names() {
        let db = setup_db();
        let user = create_user(&db, "ann@example.com");
        let other = create_user(&db, "bob@example.com");
        let task = create_task(&db, &user, "t");

        db.update_task(
            &user,
            task.id,
            &TaskChanges {
                assignee_id: Some(Some(other.id)),
                ..Default::default()
            },
        )
        .unwrap();

        let last = db.get_comments(task.id).unwrap().pop().unwrap();
        assert_eq!(last.text, "Task reassigned: Test ann → Test bob");
    }
}

mod time_entry_tests {
    use super::*;

    fn hours(s: &str) -> Hours {
        s.parse().unwrap()
    }

    #[test]
    fn actual_hours_tracks_entries() {
        let db = setup_db();
        let user = create_user(&db, "u@example.com");
        let task = create_task(&db, &user, "t");
        let day = NaiveDate::from_ymd_opt(2024, 3, 1).unwrap();

        let first = db
            .add_time_entry(task.id, user.id, hours("1.25"), "setup", day)
            .unwrap();
        db.add_time_entry(task.id, user.id, hours("2.5"), "", day.succ_opt().unwrap())
            .unwrap();
        assert_eq!(
            db.get_task(task.id).unwrap().unwrap().actual_hours,
            hours("3.75")
        );

        let entries = db.get_time_entries(task.id).unwrap();
        assert_eq!(entries.len(), 2);
        // Most recent date first.
        assert!(entries[0].date > entries[1].date);

        let removed = db.delete_time_entry(first.id).unwrap().unwrap();
        assert_eq!(removed.description, "setup");
        assert_eq!(
            db.get_task(task.id).unwrap().unwrap().actual_hours,
            hours("2.5")
        );

        let last = db.get_time_entries(task.id).unwrap().pop().unwrap();
        db.delete_time_entry(last.id).unwrap();
        assert_eq!(
            db.get_task(task.id).unwrap().unwrap().actual_hours,
            Hours::ZERO
        );
        assert!(db.delete_time_entry(last.id).unwrap().is_none());
    }
}

mod checklist_and_watcher_tests {
    use super::*;

    #[test]
    fn checklist_order_and_toggle() {
        let db = setup_db();
        let user = create_user(&db, "u@example.com");
        let task = create_task(&db, &user, "t");

        db.add_checklist_item(task.id, "second", None).unwrap();
        db.add_checklist_item(task.id, "first", Some(-1)).unwrap();
        let third = db.add_checklist_item(task.id, "third", None).unwrap();
        assert_eq!(third.order, 2);

        let items: Vec<String> = db
            .get_checklist(task.id)
            .unwrap()
            .into_iter()
            .map(|i| i.item_text)
            .collect();
        assert_eq!(items, vec!["first", "second", "third"]);

        let done = db.toggle_checklist_item(third.id, user.id).unwrap();
        assert!(done.is_completed);
        assert_eq!(done.completed_by, Some(user.id));
        assert!(done.completed_at.is_some());

        let undone = db.toggle_checklist_item(third.id, user.id).unwrap();
        assert!(!undone.is_completed);
        assert!(undone.completed_by.is_none());

        assert!(db.delete_checklist_item(third.id).unwrap());
        assert!(!db.delete_checklist_item(third.id).unwrap());
    }

    #[test]
    fn watchers_are_unique() {
        let db = setup_db();
        let user = create_user(&db, "u@example.com");
        let watcher = create_user(&db, "w@example.com");
        let task = create_task(&db, &user, "t");

        assert!(db.add_watcher(task.id, watcher.id).unwrap());
        assert!(!db.add_watcher(task.id, watcher.id).unwrap());
        assert!(db.is_watching(task.id, watcher.id).unwrap());
        assert_eq!(db.get_watchers(task.id).unwrap().len(), 1);

        let ctx = db.get_task_context(task.id).unwrap().unwrap();
        assert_eq!(ctx.watcher_ids, vec![watcher.id]);

        assert!(db.remove_watcher(task.id, watcher.id).unwrap());
        assert!(!db.remove_watcher(task.id, watcher.id).unwrap());
    }

    #[test]
    fn system_comments_cannot_be_edited() {
        let db = setup_db();
        let user = create_user(&db, "u@example.com");
        let task = create_task(&db, &user, "t");
        let system = db.get_comments(task.id).unwrap().remove(0);

        let api: ApiError = db.update_comment(system.id, "tampered").unwrap_err().into();
        assert_eq!(api.code, ErrorCode::PermissionDenied);

        let own = db.add_comment(task.id, user.id, "hello").unwrap();
        let edited = db.update_comment(own.id, "hello again").unwrap();
        assert_eq!(edited.text, "hello again");
        assert!(db.delete_comment(own.id).unwrap());
    }
}

mod query_tests {
    use super::*;

    fn titles(tasks: &[Task]) -> Vec<&str> {
        tasks.iter().map(|t| t.title.as_str()).collect()
    }

    #[test]
    fn visibility_covers_creator_assignee_and_watcher() {
        let db = setup_db();
        let alice = create_user(&db, "alice@example.com");
        let bob = create_user(&db, "bob@example.com");
        let carol = create_user(&db, "carol@example.com");

        create_task(&db, &alice, "alice only");
        db.create_task(&alice, &new_task("for bob", &bob)).unwrap();
        let watched = create_task(&db, &alice, "watched by carol");
        db.add_watcher(watched.id, carol.id).unwrap();

        let query = |user: &User| TaskQuery {
            visible_to: Some(user.id),
            ordering: TaskOrdering::parse("title").unwrap(),
            ..Default::default()
        };

        assert_eq!(db.query_tasks(&query(&alice)).unwrap().total, 3);
        assert_eq!(titles(&db.query_tasks(&query(&bob)).unwrap().tasks), vec!["for bob"]);
        assert_eq!(
            titles(&db.query_tasks(&query(&carol)).unwrap().tasks),
            vec!["watched by carol"]
        );
        assert_eq!(db.query_tasks(&TaskQuery::default()).unwrap().total, 3);
    }

    #[test]
    fn filters_combine() {
        let db = setup_db();
        let user = create_user(&db, "u@example.com");
        let other = create_user(&db, "o@example.com");
        let tag = db.create_tag("backend", None, user.id).unwrap();

        let mut input = new_task("Fix 100% CPU", &user);
        input.priority = Priority::High;
        input.description = Some("Spinning LOOP in scheduler".into());
        input.tag_ids = vec![tag.id];
        input.deadline = Some(
            NaiveDate::from_ymd_opt(2030, 6, 15)
                .unwrap()
                .and_hms_opt(23, 0, 0)
                .unwrap()
                .and_utc()
                .timestamp_millis(),
        );
        db.create_task(&user, &input).unwrap();
        db.create_task(&user, &new_task("Write changelog", &other)).unwrap();

        let by_search = |s: &str| {
            db.query_tasks(&TaskQuery {
                search: Some(s.into()),
                ..Default::default()
            })
            .unwrap()
            .total
        };
        assert_eq!(by_search("loop"), 1);
        assert_eq!(by_search("100%"), 1);
        assert_eq!(by_search("%"), 1);
        assert_eq!(by_search("CHANGELOG"), 1);

        let page = db
            .query_tasks(&TaskQuery {
                priority: Some(Priority::High),
                tag_ids: vec![tag.id],
                deadline_from: NaiveDate::from_ymd_opt(2030, 6, 15),
                deadline_to: NaiveDate::from_ymd_opt(2030, 6, 15),
                ..Default::default()
            })
            .unwrap();
        assert_eq!(titles(&page.tasks), vec!["Fix 100% CPU"]);

        let page = db
            .query_tasks(&TaskQuery {
                assignee_id: Some(other.id),
                status: Some(TaskStatus::New),
                ..Default::default()
            })
            .unwrap();
        assert_eq!(titles(&page.tasks), vec!["Write changelog"]);

        let page = db
            .query_tasks(&TaskQuery {
                deadline_to: NaiveDate::from_ymd_opt(2030, 6, 14),
                ..Default::default()
            })
            .unwrap();
        assert_eq!(page.total, 0);
    }

    #[test]
    fn ordering_by_priority_and_title() {
        let db = setup_db();
        let user = create_user(&db, "u@example.com");
        for (title, priority) in [
            ("b", Priority::Medium),
            ("a", Priority::Critical),
            ("c", Priority::Low),
        ] {
            let mut input = new_task(title, &user);
            input.priority = priority;
            db.create_task(&user, &input).unwrap();
        }

        let ordered = |ordering: &str| {
            let page = db
                .query_tasks(&TaskQuery {
                    ordering: TaskOrdering::parse(ordering).unwrap(),
                    ..Default::default()
                })
                .unwrap();
            page.tasks.into_iter().map(|t| t.title).collect::<Vec<_>>()
        };
        assert_eq!(ordered("-priority"), vec!["a", "b", "c"]);
        assert_eq!(ordered("priority"), vec!["c", "b", "a"]);
        assert_eq!(ordered("title"), vec!["a", "b", "c"]);
        // Default: newest first.
        assert_eq!(
            db.query_tasks(&TaskQuery::default())
                .unwrap()
                .tasks
                .into_iter()
                .map(|t| t.title)
                .collect::<Vec<_>>(),
            vec!["c", "a", "b"]
        );
    }

    #[test]
    fn pagination_clamps_to_last_page() {
        let db = setup_db();
        let user = create_user(&db, "u@example.com");
        for i in 0..5 {
            create_task(&db, &user, &format!("task {}", i));
        }

        let page = db
            .query_tasks(&TaskQuery {
                page: 2,
                per_page: 2,
                ..Default::default()
            })
            .unwrap();
        assert_eq!(page.tasks.len(), 2);
        assert_eq!(page.total_pages, 3);
        assert!(page.has_next() && page.has_previous());

        let page = db
            .query_tasks(&TaskQuery {
                page: 99,
                per_page: 2,
                ..Default::default()
            })
            .unwrap();
        assert_eq!(page.page, 3);
        assert_eq!(page.tasks.len(), 1);
        assert!(!page.has_next());

        for below in [0, -4] {
            let page = db
                .query_tasks(&TaskQuery {
                    page: below,
                    per_page: 2,
                    ..Default::default()
                })
                .unwrap();
            assert_eq!(page.page, 3);
            assert_eq!(page.tasks.len(), 1);
        }

        let empty = setup_db();
        let page = empty.query_tasks(&TaskQuery::default()).unwrap();
        assert_eq!((page.page, page.total_pages, page.total), (1, 1, 0));
    }
}
