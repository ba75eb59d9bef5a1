//! User accounts, roles and supervisor relations.

use super::{Database, now_ms, optional};
use crate::error::ApiError;
use crate::types::{NewUser, User, UserId, UserTaskStats};
use anyhow::Result;
use rusqlite::{Connection, Row, params};
use serde::Deserialize;

pub(crate) const USER_COLUMNS: &str = "id, email, password_hash, first_name, last_name, is_active, is_staff, \
     is_superuser, is_moderator, is_employee, is_watcher, is_supervisor, is_verified, supervisor_id, \
     bio, timezone, date_joined, updated_at";

pub(crate) fn parse_user_row(row: &Row) -> rusqlite::Result<User> {
    Ok(User {
        id: row.get("id")?,
        email: row.get("email")?,
        password_hash: row.get("password_hash")?,
        first_name: row.get("first_name")?,
        last_name: row.get("last_name")?,
        is_active: row.get("is_active")?,
        is_staff: row.get("is_staff")?,
        is_superuser: row.get("is_superuser")?,
        is_moderator: row.get("is_moderator")?,
        is_employee: row.get("is_employee")?,
        is_watcher: row.get("is_watcher")?,
        is_supervisor: row.get("is_supervisor")?,
        is_verified: row.get("is_verified")?,
        supervisor_id: row.get("supervisor_id")?,
        bio: row.get("bio")?,
        timezone: row.get("timezone")?,
        date_joined: row.get("date_joined")?,
        updated_at: row.get("updated_at")?,
    })
}

/// Internal helper to get a user using an existing connection (avoids deadlock).
pub(crate) fn get_user_internal(conn: &Connection, user_id: UserId) -> Result<Option<User>> {
    let sql = format!("SELECT {} FROM users WHERE id = ?1", USER_COLUMNS);
    optional(conn.query_row(&sql, params![user_id], parse_user_row))
}

/// Whether `user_id` reports to `supervisor_id`.
pub(crate) fn is_subordinate_internal(
    conn: &Connection,
    supervisor_id: UserId,
    user_id: UserId,
) -> Result<bool> {
    let found = optional(conn.query_row(
        "SELECT 1 FROM users WHERE id = ?1 AND supervisor_id = ?2",
        params![user_id, supervisor_id],
        |_| Ok(()),
    ))?;
    Ok(found.is_some())
}

/// Normalize an e-mail address for storage and lookup.
pub fn normalize_email(email: &str) -> String {
    email.trim().to_lowercase()
}

/// Editable profile fields. Outer `None` = leave unchanged.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ProfileChanges {
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    #[serde(default, deserialize_with = "crate::validation::double_option")]
    pub bio: Option<Option<String>>,
    #[serde(default, deserialize_with = "crate::validation::double_option")]
    pub timezone: Option<Option<String>>,
}

/// Administrative actions applied to many users at once.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UserBulkAction {
    MakeSupervisor,
    RemoveSupervisor,
    Activate,
    Deactivate,
    Verify,
}

impl UserBulkAction {
    fn assignment(&self) -> &'static str {
        match self {
            UserBulkAction::MakeSupervisor => "is_supervisor = 1",
            UserBulkAction::RemoveSupervisor => "is_supervisor = 0",
            UserBulkAction::Activate => "is_active = 1",
            UserBulkAction::Deactivate => "is_active = 0",
            UserBulkAction::Verify => "is_verified = 1",
        }
    }
}

impl Database {
    /// Create a user with an already-hashed password.
    pub fn create_user(&self, new_user: &NewUser, password_hash: &str) -> Result<User> {
        let email = normalize_email(&new_user.email);
        let now = now_ms();

        self.with_conn_mut(|conn| {
            let tx = conn.transaction()?;

            let taken = optional(tx.query_row(
                "SELECT 1 FROM users WHERE email = ?1",
                params![email],
                |_| Ok(()),
            ))?;
            if taken.is_some() {
                return Err(ApiError::already_exists(
                    "email",
                    "This e-mail is already registered.",
                )
                .into());
            }

            tx.execute(
                "INSERT INTO users (
                    email, password_hash, first_name, last_name, is_active, is_staff, is_superuser,
                    is_moderator, is_employee, is_watcher, is_supervisor, is_verified,
                    date_joined, updated_at
                ) VALUES (?1, ?2, ?3, ?4, 1, ?5, ?6, ?7, 1, ?8, ?9, ?10, ?11, ?11)",
                params![
                    email,
                    password_hash,
                    new_user.first_name.trim(),
                    new_user.last_name.trim(),
                    new_user.is_staff,
                    new_user.is_superuser,
                    new_user.is_moderator,
                    new_user.is_watcher,
                    new_user.is_supervisor,
                    new_user.is_verified,
                    now,
                ],
            )?;
            let id = tx.last_insert_rowid();
            let user = get_user_internal(&tx, id)?
                .ok_or_else(|| anyhow::anyhow!("User vanished after insert"))?;

            tx.commit()?;
            Ok(user)
        })
    }

    /// Get a user by ID.
    pub fn get_user(&self, user_id: UserId) -> Result<Option<User>> {
        self.with_conn(|conn| get_user_internal(conn, user_id))
    }

    /// Get a user by e-mail (case-insensitive).
    pub fn get_user_by_email(&self, email: &str) -> Result<Option<User>> {
        let email = normalize_email(email);
        self.with_conn(|conn| {
            let sql = format!("SELECT {} FROM users WHERE email = ?1", USER_COLUMNS);
            optional(conn.query_row(&sql, params![email], parse_user_row))
        })
    }

    /// All users, newest first.
    pub fn list_users(&self) -> Result<Vec<User>> {
        self.with_conn(|conn| {
            let sql = format!(
                "SELECT {} FROM users ORDER BY date_joined DESC, id DESC",
                USER_COLUMNS
            );
            let mut stmt = conn.prepare(&sql)?;
            let users = stmt
                .query_map([], parse_user_row)?
                .collect::<Result<Vec<_>, _>>()?;
            Ok(users)
        })
    }

    /// Users reporting to the given supervisor.
    pub fn get_subordinates(&self, supervisor_id: UserId) -> Result<Vec<User>> {
        self.with_conn(|conn| {
            let sql = format!(
                "SELECT {} FROM users WHERE supervisor_id = ?1 ORDER BY id",
                USER_COLUMNS
            );
            let mut stmt = conn.prepare(&sql)?;
            let users = stmt
                .query_map(params![supervisor_id], parse_user_row)?
                .collect::<Result<Vec<_>, _>>()?;
            Ok(users)
        })
    }

    /// Mark a user's e-mail as verified. Returns false if it already was.
    pub fn mark_verified(&self, user_id: UserId) -> Result<bool> {
        self.with_conn(|conn| {
            let changed = conn.execute(
                "UPDATE users SET is_verified = 1, updated_at = ?1 WHERE id = ?2 AND is_verified = 0",
                params![now_ms(), user_id],
            )?;
            Ok(changed > 0)
        })
    }

    /// Replace a user's password hash.
    pub fn set_password_hash(&self, user_id: UserId, password_hash: &str) -> Result<()> {
        self.with_conn(|conn| {
            let changed = conn.execute(
                "UPDATE users SET password_hash = ?1, updated_at = ?2 WHERE id = ?3",
                params![password_hash, now_ms(), user_id],
            )?;
            if changed == 0 {
                return Err(ApiError::not_found("User").into());
            }
            Ok(())
        })
    }

    /// Update profile fields.
    pub fn update_profile(&self, user_id: UserId, changes: ProfileChanges) -> Result<User> {
        self.with_conn(|conn| {
            let user = get_user_internal(conn, user_id)?.ok_or_else(|| ApiError::not_found("User"))?;

            let first_name = changes
                .first_name
                .map(|s| s.trim().to_string())
                .unwrap_or(user.first_name);
            let last_name = changes
                .last_name
                .map(|s| s.trim().to_string())
                .unwrap_or(user.last_name);
            let bio = changes.bio.unwrap_or(user.bio);
            let timezone = changes.timezone.unwrap_or(user.timezone);

            conn.execute(
                "UPDATE users SET first_name = ?1, last_name = ?2, bio = ?3, timezone = ?4, updated_at = ?5
                 WHERE id = ?6",
                params![first_name, last_name, bio, timezone, now_ms(), user_id],
            )?;

            get_user_internal(conn, user_id)?.ok_or_else(|| ApiError::not_found("User").into())
        })
    }

    /// Set or clear a user's supervisor.
    pub fn set_supervisor(&self, user_id: UserId, supervisor_id: Option<UserId>) -> Result<User> {
        self.with_conn(|conn| {
            get_user_internal(conn, user_id)?.ok_or_else(|| ApiError::not_found("User"))?;

            if let Some(sid) = supervisor_id {
                if sid == user_id {
                    return Err(
                        ApiError::invalid("supervisor_id", "A user cannot supervise themselves.")
                            .into(),
                    );
                }
                let supervisor = get_user_internal(conn, sid)?.ok_or_else(|| {
                    ApiError::invalid("supervisor_id", "Supervisor does not exist.")
                })?;
                if !supervisor.is_supervisor {
                    return Err(ApiError::invalid(
                        "supervisor_id",
                        "Selected user does not have the supervisor role.",
                    )
                    .into());
                }
            }

            conn.execute(
                "UPDATE users SET supervisor_id = ?1, updated_at = ?2 WHERE id = ?3",
                params![supervisor_id, now_ms(), user_id],
            )?;

            get_user_internal(conn, user_id)?.ok_or_else(|| ApiError::not_found("User").into())
        })
    }

    /// Apply an administrative action to many users. Returns the number updated.
    pub fn bulk_update_users(&self, user_ids: &[UserId], action: UserBulkAction) -> Result<usize> {
        let now = now_ms();
        self.with_conn_mut(|conn| {
            let tx = conn.transaction()?;
            let sql = format!(
                "UPDATE users SET {}, updated_at = ?1 WHERE id = ?2",
                action.assignment()
            );
            let mut updated = 0;
            for id in user_ids {
                updated += tx.execute(&sql, params![now, id])?;
            }
            tx.commit()?;
            Ok(updated)
        })
    }

    /// Whether `user_id` reports to `supervisor_id`.
    pub fn is_subordinate(&self, supervisor_id: UserId, user_id: UserId) -> Result<bool> {
        self.with_conn(|conn| is_subordinate_internal(conn, supervisor_id, user_id))
    }

    /// Count tasks created by and assigned to a user.
    pub fn user_task_stats(&self, user_id: UserId) -> Result<UserTaskStats> {
        self.with_conn(|conn| {
            let (created, assigned) = conn.query_row(
                "SELECT
                    (SELECT COUNT(*) FROM tasks WHERE creator_id = ?1),
                    (SELECT COUNT(*) FROM tasks WHERE assignee_id = ?1)",
                params![user_id],
                |row| Ok((row.get(0)?, row.get(1)?)),
            )?;
            Ok(UserTaskStats { created, assigned })
        })
    }
}
