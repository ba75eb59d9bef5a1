//! Core types for the task tracker.

use chrono::{DateTime, NaiveDate, Utc};
use serde::de::{self, Visitor};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::str::FromStr;

pub type UserId = i64;
pub type TaskId = i64;

/// Unix timestamp in milliseconds.
pub type Timestamp = i64;

/// Render a millisecond timestamp as RFC 3339 (UTC).
pub fn timestamp_to_rfc3339(ms: Timestamp) -> String {
    DateTime::<Utc>::from_timestamp_millis(ms)
        .map(|dt| dt.to_rfc3339())
        .unwrap_or_default()
}

/// Render a millisecond timestamp as `dd.mm.YYYY HH:MM`, the format used in system comments.
pub fn timestamp_to_short(ms: Timestamp) -> String {
    DateTime::<Utc>::from_timestamp_millis(ms)
        .map(|dt| dt.format("%d.%m.%Y %H:%M").to_string())
        .unwrap_or_default()
}

// =============================================================================
// Status and priority
// =============================================================================

/// Task status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    #[default]
    New,
    InProgress,
    Review,
    Completed,
    Rejected,
}

impl TaskStatus {
    pub const ALL: [TaskStatus; 5] = [
        TaskStatus::New,
        TaskStatus::InProgress,
        TaskStatus::Review,
        TaskStatus::Completed,
        TaskStatus::Rejected,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            TaskStatus::New => "new",
            TaskStatus::InProgress => "in_progress",
            TaskStatus::Review => "review",
            TaskStatus::Completed => "completed",
            TaskStatus::Rejected => "rejected",
        }
    }

    /// Human-readable label.
    pub fn label(&self) -> &'static str {
        match self {
            TaskStatus::New => "New",
            TaskStatus::InProgress => "In Progress",
            TaskStatus::Review => "Review",
            TaskStatus::Completed => "Completed",
            TaskStatus::Rejected => "Rejected",
        }
    }

    /// Position used when ordering by status.
    pub fn rank(&self) -> i32 {
        match self {
            TaskStatus::New => 0,
            TaskStatus::InProgress => 1,
            TaskStatus::Review => 2,
            TaskStatus::Completed => 3,
            TaskStatus::Rejected => 4,
        }
    }
}

impl fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TaskStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        TaskStatus::ALL
            .into_iter()
            .find(|st| st.as_str() == s)
            .ok_or_else(|| format!("Unknown status: {}", s))
    }
}

/// Task priority.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Priority {
    #[default]
    Low,
    Medium,
    High,
    Critical,
}

impl Priority {
    pub const ALL: [Priority; 4] = [
        Priority::Low,
        Priority::Medium,
        Priority::High,
        Priority::Critical,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Priority::Low => "low",
            Priority::Medium => "medium",
            Priority::High => "high",
            Priority::Critical => "critical",
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            Priority::Low => "Low",
            Priority::Medium => "Medium",
            Priority::High => "High",
            Priority::Critical => "Critical",
        }
    }

    /// Higher rank = more urgent.
    pub fn rank(&self) -> i32 {
        match self {
            Priority::Low => 0,
            Priority::Medium => 1,
            Priority::High => 2,
            Priority::Critical => 3,
        }
    }
}

impl fmt::Display for Priority {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Priority {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Priority::ALL
            .into_iter()
            .find(|p| p.as_str() == s)
            .ok_or_else(|| format!("Unknown priority: {}", s))
    }
}

// =============================================================================
// Hours
// =============================================================================

/// Fixed-point hour quantity with two decimal places, stored as hundredths.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct Hours(i64);

/// Error parsing an hour quantity.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum HoursParseError {
    #[error("Enter a number.")]
    NotANumber,
    #[error("Ensure that there are no more than 2 decimal places.")]
    TooManyDecimals,
    #[error("Value is out of range.")]
    OutOfRange,
}

impl Hours {
    pub const ZERO: Hours = Hours(0);
    /// Largest value a single field accepts (5 digits, 2 decimals).
    pub const MAX: Hours = Hours(99_999);

    pub fn from_hundredths(value: i64) -> Self {
        Hours(value)
    }

    pub fn hundredths(self) -> i64 {
        self.0
    }

    pub fn is_positive(self) -> bool {
        self.0 > 0
    }

    fn from_f64(value: f64) -> Result<Self, HoursParseError> {
        if !value.is_finite() {
            return Err(HoursParseError::NotANumber);
        }
        let scaled = value * 100.0;
        let rounded = scaled.round();
        if (scaled - rounded).abs() > 1e-6 {
            return Err(HoursParseError::TooManyDecimals);
        }
        if rounded.abs() > i64::MAX as f64 / 2.0 {
            return Err(HoursParseError::OutOfRange);
        }
        Ok(Hours(rounded as i64))
    }
}

impl fmt::Display for Hours {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let sign = if self.0 < 0 { "-" } else { "" };
        let abs = self.0.unsigned_abs();
        write!(f, "{}{}.{:02}", sign, abs / 100, abs % 100)
    }
}

impl FromStr for Hours {
    type Err = HoursParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        let (negative, digits) = match s.strip_prefix('-') {
            Some(rest) => (true, rest),
            None => (false, s),
        };
        let (int_part, frac_part) = match digits.split_once('.') {
            Some((i, f)) => (i, f),
            None => (digits, ""),
        };
        if int_part.is_empty() && frac_part.is_empty() {
            return Err(HoursParseError::NotANumber);
        }
        if !int_part.chars().all(|c| c.is_ascii_digit())
            || !frac_part.chars().all(|c| c.is_ascii_digit())
        {
            return Err(HoursParseError::NotANumber);
        }
        if frac_part.len() > 2 {
            return Err(HoursParseError::TooManyDecimals);
        }

        let whole: i64 = if int_part.is_empty() {
            0
        } else {
            int_part.parse().map_err(|_| HoursParseError::OutOfRange)?
        };
        let frac: i64 = match frac_part.len() {
            0 => 0,
            1 => frac_part.parse::<i64>().map_err(|_| HoursParseError::NotANumber)? * 10,
            _ => frac_part.parse().map_err(|_| HoursParseError::NotANumber)?,
        };

        let value = whole
            .checked_mul(100)
            .and_then(|v| v.checked_add(frac))
            .ok_or(HoursParseError::OutOfRange)?;
        Ok(Hours(if negative { -value } else { value }))
    }
}

impl Serialize for Hours {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

struct HoursVisitor;

impl<'de> Visitor<'de> for HoursVisitor {
    type Value = Hours;

    fn expecting(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str("a decimal number of hours as a number or string")
    }

    fn visit_str<E: de::Error>(self, v: &str) -> Result<Hours, E> {
        v.parse().map_err(E::custom)
    }

    fn visit_i64<E: de::Error>(self, v: i64) -> Result<Hours, E> {
        v.checked_mul(100)
            .map(Hours)
            .ok_or_else(|| E::custom(HoursParseError::OutOfRange))
    }

    fn visit_u64<E: de::Error>(self, v: u64) -> Result<Hours, E> {
        i64::try_from(v)
            .ok()
            .and_then(|v| v.checked_mul(100))
            .map(Hours)
            .ok_or_else(|| E::custom(HoursParseError::OutOfRange))
    }

    fn visit_f64<E: de::Error>(self, v: f64) -> Result<Hours, E> {
        Hours::from_f64(v).map_err(E::custom)
    }
}

impl<'de> Deserialize<'de> for Hours {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        deserializer.deserialize_any(HoursVisitor)
    }
}

// =============================================================================
// Users
// =============================================================================

/// A registered user.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct User {
    pub id: UserId,
    pub email: String,
    #[serde(skip)]
    pub password_hash: String,
    pub first_name: String,
    pub last_name: String,
    pub is_active: bool,
    pub is_staff: bool,
    pub is_superuser: bool,
    pub is_moderator: bool,
    pub is_employee: bool,
    pub is_watcher: bool,
    pub is_supervisor: bool,
    pub is_verified: bool,
    pub supervisor_id: Option<UserId>,
    pub bio: Option<String>,
    pub timezone: Option<String>,
    pub date_joined: Timestamp,
    pub updated_at: Timestamp,
}

impl User {
    pub fn full_name(&self) -> String {
        format!("{} {}", self.first_name, self.last_name)
            .trim()
            .to_string()
    }

    /// Full name, or the e-mail when no name is set.
    pub fn display_name(&self) -> String {
        let name = self.full_name();
        if name.is_empty() {
            self.email.clone()
        } else {
            name
        }
    }

    pub fn is_admin(&self) -> bool {
        self.is_staff || self.is_superuser
    }

    pub fn roles(&self) -> Vec<&'static str> {
        let mut roles = Vec::new();
        if self.is_superuser {
            roles.push("Administrator");
        }
        if self.is_moderator {
            roles.push("Moderator");
        }
        if self.is_employee {
            roles.push("Employee");
        }
        if self.is_watcher {
            roles.push("Watcher");
        }
        if self.is_supervisor {
            roles.push("Supervisor");
        }
        roles
    }

    pub fn role_display(&self) -> String {
        let roles = self.roles();
        if roles.is_empty() {
            "No roles".to_string()
        } else {
            roles.join(", ")
        }
    }
}

impl fmt::Display for User {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.email)
    }
}

/// Fields for creating a user.
#[derive(Debug, Clone, Default)]
pub struct NewUser {
    pub email: String,
    pub password: String,
    pub first_name: String,
    pub last_name: String,
    pub is_staff: bool,
    pub is_superuser: bool,
    pub is_moderator: bool,
    pub is_supervisor: bool,
    pub is_watcher: bool,
    pub is_verified: bool,
}

impl NewUser {
    /// A superuser: staff, superuser and moderator flags set, already verified.
    pub fn superuser(email: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            email: email.into(),
            password: password.into(),
            is_staff: true,
            is_superuser: true,
            is_moderator: true,
            is_verified: true,
            ..Default::default()
        }
    }
}

/// Created/assigned counts for a user.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct UserTaskStats {
    pub created: i64,
    pub assigned: i64,
}

// =============================================================================
// Tasks
// =============================================================================

/// A task.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Task {
    pub id: TaskId,
    pub title: String,
    pub description: Option<String>,
    pub creator_id: UserId,
    pub assignee_id: Option<UserId>,
    pub status: TaskStatus,
    pub priority: Priority,
    pub deadline: Option<Timestamp>,
    pub created_at: Timestamp,
    pub updated_at: Timestamp,
    pub completed_at: Option<Timestamp>,
    pub estimated_hours: Option<Hours>,
    pub actual_hours: Hours,
    pub parent_task_id: Option<TaskId>,
}

/// Validated input for creating a task.
#[derive(Debug, Clone)]
pub struct NewTask {
    pub title: String,
    pub description: Option<String>,
    pub status: TaskStatus,
    pub priority: Priority,
    pub assignee_id: UserId,
    pub deadline: Option<Timestamp>,
    pub estimated_hours: Option<Hours>,
    pub tag_ids: Vec<i64>,
    pub parent_task_id: Option<TaskId>,
}

/// Validated partial update of a task. Outer `None` = leave unchanged.
#[derive(Debug, Clone, Default)]
pub struct TaskChanges {
    pub title: Option<String>,
    pub description: Option<Option<String>>,
    pub assignee_id: Option<Option<UserId>>,
    pub status: Option<TaskStatus>,
    pub priority: Option<Priority>,
    pub deadline: Option<Option<Timestamp>>,
    pub estimated_hours: Option<Option<Hours>>,
    pub tag_ids: Option<Vec<i64>>,
    pub parent_task_id: Option<Option<TaskId>>,
}

/// A tag.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Tag {
    pub id: i64,
    pub name: String,
    pub color: String,
    pub created_by: UserId,
}

/// A comment on a task.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Comment {
    pub id: i64,
    pub task_id: TaskId,
    pub author_id: UserId,
    pub text: String,
    pub is_system: bool,
    pub created_at: Timestamp,
    pub updated_at: Timestamp,
}

/// A file attached to a task.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Attachment {
    pub id: i64,
    pub task_id: TaskId,
    /// Path relative to the media directory.
    pub file_path: String,
    pub file_name: String,
    pub file_size: i64,
    pub uploaded_by: UserId,
    pub uploaded_at: Timestamp,
}

impl Attachment {
    /// Lower-case extension without the dot, empty when there is none.
    pub fn extension(&self) -> String {
        std::path::Path::new(&self.file_name)
            .extension()
            .map(|e| e.to_string_lossy().to_lowercase())
            .unwrap_or_default()
    }
}

/// One audited field change.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HistoryEntry {
    pub id: i64,
    pub task_id: TaskId,
    pub changed_by: UserId,
    pub changed_at: Timestamp,
    pub field: String,
    pub old_value: String,
    pub new_value: String,
}

/// A checklist item.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChecklistItem {
    pub id: i64,
    pub task_id: TaskId,
    pub item_text: String,
    pub is_completed: bool,
    pub order: i32,
    pub completed_at: Option<Timestamp>,
    pub completed_by: Option<UserId>,
}

/// A user watching a task.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Watcher {
    pub task_id: TaskId,
    pub user_id: UserId,
    pub added_at: Timestamp,
}

/// Logged work on a task.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TimeEntry {
    pub id: i64,
    pub task_id: TaskId,
    pub user_id: UserId,
    pub hours: Hours,
    pub description: String,
    pub date: NaiveDate,
    pub created_at: Timestamp,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_hours_parse_and_display() {
        assert_eq!("1.5".parse::<Hours>().unwrap(), Hours::from_hundredths(150));
        assert_eq!("2".parse::<Hours>().unwrap().to_string(), "2.00");
        assert_eq!("0.05".parse::<Hours>().unwrap().to_string(), "0.05");
        assert_eq!("-1.25".parse::<Hours>().unwrap().to_string(), "-1.25");
        assert_eq!(
            "1.234".parse::<Hours>(),
            Err(HoursParseError::TooManyDecimals)
        );
        assert_eq!("abc".parse::<Hours>(), Err(HoursParseError::NotANumber));
        assert_eq!("".parse::<Hours>(), Err(HoursParseError::NotANumber));
    }

    #[test]
    fn test_hours_deserialize_number_or_string() {
        let h: Hours = serde_json::from_str("2.25").unwrap();
        assert_eq!(h.hundredths(), 225);
        let h: Hours = serde_json::from_str("\"3.1\"").unwrap();
        assert_eq!(h.hundredths(), 310);
        let h: Hours = serde_json::from_str("4").unwrap();
        assert_eq!(h.hundredths(), 400);
        assert!(serde_json::from_str::<Hours>("1.001").is_err());
        assert_eq!(serde_json::to_string(&h).unwrap(), "\"4.00\"");
    }

    #[test]
    fn test_status_round_trip_labels() {
        for status in TaskStatus::ALL {
            assert_eq!(status.as_str().parse::<TaskStatus>().unwrap(), status);
        }
        assert!("done".parse::<TaskStatus>().is_err());
        assert_eq!(TaskStatus::InProgress.label(), "In Progress");
    }

    #[test]
    fn test_priority_rank_order() {
        assert!(Priority::Critical.rank() > Priority::High.rank());
        assert!(Priority::High.rank() > Priority::Medium.rank());
        assert!(Priority::Medium.rank() > Priority::Low.rank());
    }

    #[test]
    fn test_attachment_extension() {
        let mut a = Attachment {
            id: 1,
            task_id: 1,
            file_path: "task_attachments/x".into(),
            file_name: "Report.PDF".into(),
            file_size: 10,
            uploaded_by: 1,
            uploaded_at: 0,
        };
        assert_eq!(a.extension(), "pdf");
        a.file_name = "README".into();
        assert_eq!(a.extension(), "");
    }

    #[test]
    fn test_user_roles_display() {
        let user = User {
            id: 1,
            email: "a@b.c".into(),
            password_hash: String::new(),
            first_name: " Ann".into(),
            last_name: "".into(),
            is_active: true,
            is_staff: false,
            is_superuser: false,
            is_moderator: false,
            is_employee: false,
            is_watcher: false,
            is_supervisor: false,
            is_verified: false,
            supervisor_id: None,
            bio: None,
            timezone: None,
            date_joined: 0,
            updated_at: 0,
        };
        assert_eq!(user.role_display(), "No roles");
        assert_eq!(user.full_name(), "Ann");
        assert_eq!(user.to_string(), "a@b.c");
    }
}
