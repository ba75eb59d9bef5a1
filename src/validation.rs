//! Field-level input validation.
//!
//! Request bodies deserialize into the loose `*Input` structs below; the
//! `validate_*` functions turn them into typed values or an [`ApiError`]
//! carrying every field error found.

use crate::error::{ApiError, FieldErrors};
use crate::types::{
    Hours, NewTask, NewUser, Priority, TaskChanges, TaskId, TaskStatus, Timestamp, UserId,
};
use chrono::{DateTime, NaiveDate, NaiveDateTime};
use regex_lite::Regex;
use serde::{Deserialize, Deserializer};
use std::sync::LazyLock;

pub const TITLE_MAX: usize = 255;
pub const COMMENT_MAX: usize = 2000;
pub const CHECKLIST_ITEM_MAX: usize = 500;
pub const TAG_NAME_MAX: usize = 50;

const REQUIRED: &str = "This field is required.";

static EMAIL_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^[A-Za-z0-9._%+\-]+@[A-Za-z0-9\-]+(\.[A-Za-z0-9\-]+)*\.[A-Za-z]{2,}$")
        .expect("email regex is valid")
});

static COLOR_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^#[0-9A-Fa-f]{6}$").expect("color regex is valid"));

/// Distinguish an absent field (`None`) from an explicit `null` (`Some(None)`).
pub fn double_option<'de, T, D>(deserializer: D) -> Result<Option<Option<T>>, D::Error>
where
    T: Deserialize<'de>,
    D: Deserializer<'de>,
{
    Option::<T>::deserialize(deserializer).map(Some)
}

fn max_length(field_len: usize, max: usize) -> Option<String> {
    (field_len > max).then(|| format!("Ensure this value has at most {} characters.", max))
}

/// Trimmed, required, bounded text.
fn required_text(value: Option<&str>, max: usize) -> Result<String, String> {
    let value = value.map(str::trim).unwrap_or_default();
    if value.is_empty() {
        return Err(REQUIRED.to_string());
    }
    if let Some(msg) = max_length(value.chars().count(), max) {
        return Err(msg);
    }
    Ok(value.to_string())
}

fn parse_choice<T: std::str::FromStr>(value: &str) -> Result<T, String> {
    value.parse().map_err(|_| {
        format!(
            "Select a valid choice. {} is not one of the available choices.",
            value
        )
    })
}

/// Parse a deadline: RFC 3339, or a naive `YYYY-MM-DDTHH:MM[:SS]` taken as UTC.
pub fn parse_datetime(value: &str) -> Option<Timestamp> {
    let value = value.trim();
    if let Ok(dt) = DateTime::parse_from_rfc3339(value) {
        return Some(dt.timestamp_millis());
    }
    ["%Y-%m-%dT%H:%M:%S", "%Y-%m-%dT%H:%M", "%Y-%m-%d %H:%M:%S", "%Y-%m-%d %H:%M"]
        .iter()
        .find_map(|fmt| NaiveDateTime::parse_from_str(value, fmt).ok())
        .map(|naive| naive.and_utc().timestamp_millis())
}

/// Parse a `YYYY-MM-DD` date.
pub fn parse_date(value: &str) -> Option<NaiveDate> {
    NaiveDate::parse_from_str(value.trim(), "%Y-%m-%d").ok()
}

fn parse_deadline(value: &str, now: Timestamp) -> Result<Timestamp, String> {
    let deadline = parse_datetime(value).ok_or_else(|| "Enter a valid date/time.".to_string())?;
    if deadline < now {
        return Err("Deadline cannot be in the past.".to_string());
    }
    Ok(deadline)
}

fn parse_hours(value: &serde_json::Value) -> Result<Hours, String> {
    match value {
        serde_json::Value::String(_) | serde_json::Value::Number(_) => {
            Hours::deserialize(value).map_err(|e| e.to_string())
        }
        _ => Err("Enter a number.".to_string()),
    }
}

fn parse_estimated_hours(value: &serde_json::Value) -> Result<Hours, String> {
    let hours = parse_hours(value)?;
    if !hours.is_positive() {
        return Err("Estimated hours must be greater than 0.".to_string());
    }
    if hours > Hours::MAX {
        return Err("Ensure that there are no more than 5 digits in total.".to_string());
    }
    Ok(hours)
}

// =============================================================================
// Tasks
// =============================================================================

/// Task fields as sent by a client.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct TaskInput {
    pub title: Option<String>,
    #[serde(default, deserialize_with = "double_option")]
    pub description: Option<Option<String>>,
    #[serde(default, deserialize_with = "double_option")]
    pub assignee: Option<Option<UserId>>,
    pub status: Option<String>,
    pub priority: Option<String>,
    #[serde(default, deserialize_with = "double_option")]
    pub deadline: Option<Option<String>>,
    #[serde(default, deserialize_with = "double_option")]
    pub estimated_hours: Option<Option<serde_json::Value>>,
    pub tags: Option<Vec<i64>>,
    #[serde(default, deserialize_with = "double_option")]
    pub parent_task: Option<Option<TaskId>>,
}

fn normalize_description(value: Option<String>) -> Option<String> {
    value.filter(|d| !d.trim().is_empty())
}

/// Validate a task creation request.
pub fn validate_new_task(input: TaskInput, now: Timestamp) -> Result<NewTask, ApiError> {
    let mut errors = FieldErrors::new();

    let title = required_text(input.title.as_deref(), TITLE_MAX)
        .map_err(|e| errors.insert("title".into(), e))
        .ok();

    let assignee_id = match input.assignee.flatten() {
        Some(id) => Some(id),
        None => {
            errors.insert("assignee".into(), REQUIRED.into());
            None
        }
    };

    let status = match input.status.as_deref() {
        Some(s) => parse_choice::<TaskStatus>(s)
            .map_err(|e| errors.insert("status".into(), e))
            .unwrap_or_default(),
        None => TaskStatus::default(),
    };

    let priority = match input.priority.as_deref() {
        Some(p) => parse_choice::<Priority>(p)
            .map_err(|e| errors.insert("priority".into(), e))
            .unwrap_or_default(),
        None => Priority::default(),
    };

    let deadline = match input.deadline.flatten() {
        Some(d) => parse_deadline(&d, now)
            .map_err(|e| errors.insert("deadline".into(), e))
            .ok(),
        None => None,
    };

    let estimated_hours = match input.estimated_hours.flatten() {
        Some(v) => parse_estimated_hours(&v)
            .map_err(|e| errors.insert("estimated_hours".into(), e))
            .ok(),
        None => None,
    };

    match (title, assignee_id) {
        (Some(title), Some(assignee_id)) if errors.is_empty() => Ok(NewTask {
            title,
            description: normalize_description(input.description.flatten()),
            status,
            priority,
            assignee_id,
            deadline,
            estimated_hours,
            tag_ids: input.tags.unwrap_or_default(),
            parent_task_id: input.parent_task.flatten(),
        }),
        _ => Err(ApiError::validation(errors)),
    }
}

/// Validate a partial task update. Only fields present in the input are checked.
pub fn validate_task_changes(input: TaskInput, now: Timestamp) -> Result<TaskChanges, ApiError> {
    let mut errors = FieldErrors::new();
    let mut changes = TaskChanges::default();

    if let Some(title) = input.title {
        match required_text(Some(&title), TITLE_MAX) {
            Ok(title) => changes.title = Some(title),
            Err(e) => {
                errors.insert("title".into(), e);
            }
        }
    }

    if let Some(description) = input.description {
        changes.description = Some(normalize_description(description));
    }

    match input.assignee {
        Some(Some(id)) => changes.assignee_id = Some(Some(id)),
        Some(None) => {
            errors.insert("assignee".into(), REQUIRED.into());
        }
        None => {}
    }

    if let Some(status) = input.status {
        match parse_choice::<TaskStatus>(&status) {
            Ok(s) => changes.status = Some(s),
            Err(e) => {
                errors.insert("status".into(), e);
            }
        }
    }

    if let Some(priority) = input.priority {
        match parse_choice::<Priority>(&priority) {
            Ok(p) => changes.priority = Some(p),
            Err(e) => {
                errors.insert("priority".into(), e);
            }
        }
    }

    match input.deadline {
        Some(Some(d)) => match parse_deadline(&d, now) {
            Ok(ts) => changes.deadline = Some(Some(ts)),
            Err(e) => {
                errors.insert("deadline".into(), e);
            }
        },
        Some(None) => changes.deadline = Some(None),
        None => {}
    }

    match input.estimated_hours {
        Some(Some(v)) => match parse_estimated_hours(&v) {
            Ok(h) => changes.estimated_hours = Some(Some(h)),
            Err(e) => {
                errors.insert("estimated_hours".into(), e);
            }
        },
        Some(None) => changes.estimated_hours = Some(None),
        None => {}
    }

    changes.tag_ids = input.tags;
    changes.parent_task_id = input.parent_task;

    if errors.is_empty() {
        Ok(changes)
    } else {
        Err(ApiError::validation(errors))
    }
}

/// A completed task keeps its status.
pub fn check_status_transition(current: TaskStatus, next: TaskStatus) -> Result<(), ApiError> {
    if current == TaskStatus::Completed && next != TaskStatus::Completed {
        return Err(ApiError::invalid(
            "status",
            "A completed task cannot change its status.",
        ));
    }
    Ok(())
}

// =============================================================================
// Task resources
// =============================================================================

pub fn validate_comment_text(text: Option<&str>) -> Result<String, ApiError> {
    required_text(text, COMMENT_MAX).map_err(|e| ApiError::invalid("text", e))
}

pub fn validate_checklist_text(text: Option<&str>) -> Result<String, ApiError> {
    required_text(text, CHECKLIST_ITEM_MAX).map_err(|e| ApiError::invalid("item_text", e))
}

/// Validate a tag name and optional `#RRGGBB` colour.
pub fn validate_tag(name: Option<&str>, color: Option<&str>) -> Result<(String, Option<String>), ApiError> {
    let mut errors = FieldErrors::new();
    let name = required_text(name, TAG_NAME_MAX)
        .map_err(|e| errors.insert("name".into(), e))
        .ok();
    let color = color.map(str::trim).filter(|c| !c.is_empty());
    if color.is_some_and(|c| !COLOR_RE.is_match(c)) {
        errors.insert("color".into(), "Enter a colour in #RRGGBB format.".into());
    }
    match name {
        Some(name) if errors.is_empty() => Ok((name, color.map(str::to_string))),
        _ => Err(ApiError::validation(errors)),
    }
}

/// Time entry fields as sent by a client.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct TimeEntryInput {
    pub hours: Option<serde_json::Value>,
    pub description: Option<String>,
    pub date: Option<String>,
}

/// Validated time entry: hours, description, date.
pub fn validate_time_entry(
    input: TimeEntryInput,
    today: NaiveDate,
) -> Result<(Hours, String, NaiveDate), ApiError> {
    let mut errors = FieldErrors::new();

    let hours = match input.hours {
        Some(v) => match parse_hours(&v) {
            Ok(h) if !h.is_positive() => {
                errors.insert("hours".into(), "Hours must be greater than 0.".into());
                None
            }
            Ok(h) if h > Hours::MAX => {
                errors.insert(
                    "hours".into(),
                    "Ensure that there are no more than 5 digits in total.".into(),
                );
                None
            }
            Ok(h) => Some(h),
            Err(e) => {
                errors.insert("hours".into(), e);
                None
            }
        },
        None => {
            errors.insert("hours".into(), REQUIRED.into());
            None
        }
    };

    let date = match input.date.as_deref() {
        Some(d) => parse_date(d).or_else(|| {
            errors.insert("date".into(), "Enter a valid date.".into());
            None
        }),
        None => Some(today),
    };

    match (hours, date) {
        (Some(hours), Some(date)) if errors.is_empty() => Ok((
            hours,
            input.description.unwrap_or_default().trim().to_string(),
            date,
        )),
        _ => Err(ApiError::validation(errors)),
    }
}

// =============================================================================
// Users
// =============================================================================

pub fn is_valid_email(email: &str) -> bool {
    EMAIL_RE.is_match(email.trim())
}

/// Registration form.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct RegisterInput {
    pub email: Option<String>,
    pub password1: Option<String>,
    pub password2: Option<String>,
    #[serde(default)]
    pub first_name: String,
    #[serde(default)]
    pub last_name: String,
}

/// Check a new password and its confirmation, reporting errors on `confirm_field`.
fn check_password_pair(
    errors: &mut FieldErrors,
    password_field: &str,
    confirm_field: &str,
    password: Option<&str>,
    confirmation: Option<&str>,
    min_length: usize,
) -> Option<String> {
    let password = match password {
        Some(p) if !p.is_empty() => p,
        _ => {
            errors.insert(password_field.into(), REQUIRED.into());
            return None;
        }
    };
    if password.chars().count() < min_length {
        errors.insert(
            password_field.into(),
            format!(
                "This password is too short. It must contain at least {} characters.",
                min_length
            ),
        );
        return None;
    }
    if confirmation != Some(password) {
        errors.insert(
            confirm_field.into(),
            "The two password fields didn't match.".into(),
        );
        return None;
    }
    Some(password.to_string())
}

/// Validate a registration. Uniqueness of the e-mail is checked by the caller.
pub fn validate_registration(input: RegisterInput, min_password_length: usize) -> Result<NewUser, ApiError> {
    let mut errors = FieldErrors::new();

    let email = match input.email.as_deref().map(str::trim) {
        Some(e) if e.is_empty() => {
            errors.insert("email".into(), REQUIRED.into());
            None
        }
        Some(e) if !is_valid_email(e) => {
            errors.insert("email".into(), "Enter a valid email address.".into());
            None
        }
        Some(e) => Some(e.to_lowercase()),
        None => {
            errors.insert("email".into(), REQUIRED.into());
            None
        }
    };

    let password = check_password_pair(
        &mut errors,
        "password1",
        "password2",
        input.password1.as_deref(),
        input.password2.as_deref(),
        min_password_length,
    );

    match (email, password) {
        (Some(email), Some(password)) if errors.is_empty() => Ok(NewUser {
            email,
            password,
            first_name: input.first_name.trim().to_string(),
            last_name: input.last_name.trim().to_string(),
            ..Default::default()
        }),
        _ => Err(ApiError::validation(errors)),
    }
}

/// New password form used by password reset.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct SetPasswordInput {
    pub new_password1: Option<String>,
    pub new_password2: Option<String>,
}

pub fn validate_set_password(input: SetPasswordInput, min_password_length: usize) -> Result<String, ApiError> {
    let mut errors = FieldErrors::new();
    check_password_pair(
        &mut errors,
        "new_password1",
        "new_password2",
        input.new_password1.as_deref(),
        input.new_password2.as_deref(),
        min_password_length,
    )
    .ok_or_else(|| ApiError::validation(errors))
}
