use std::cmp::Ordering;

use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum TaskStatus {
    #[default]
    #[serde(rename = "TO-DO")]
    Todo,
    #[serde(rename = "IN-PROGRESS")]
    InProgress,
    #[serde(rename = "COMPLETED")]
    Completed,
}

impl TaskStatus {
    pub const ALL: [TaskStatus; 3] = [TaskStatus::Todo, TaskStatus::InProgress, TaskStatus::Completed];

    /// Value stored in the backend and sent over the wire.
    pub fn as_str(&self) -> &'static str {
        match self {
            TaskStatus::Todo => "TO-DO",
            TaskStatus::InProgress => "IN-PROGRESS",
            TaskStatus::Completed => "COMPLETED",
        }
    }

    /// Section title shown by the list and board views.
    pub fn label(&self) -> &'static str {
        match self {
            TaskStatus::Todo => "To Do",
            TaskStatus::InProgress => "In Progress",
            TaskStatus::Completed => "Completed",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        Self::ALL
            .into_iter()
            .find(|status| status.as_str().eq_ignore_ascii_case(value.trim()))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum TaskCategory {
    #[default]
    Work,
    Personal,
}

impl TaskCategory {
    pub fn as_str(&self) -> &'static str {
        match self {
            TaskCategory::Work => "Work",
            TaskCategory::Personal => "Personal",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        [TaskCategory::Work, TaskCategory::Personal]
            .into_iter()
            .find(|category| category.as_str().eq_ignore_ascii_case(value.trim()))
    }
}

/// File metadata only; the bytes live with an external file store.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Attachment {
    pub name: String,
    #[serde(rename = "type")]
    pub mime_type: String,
    pub size: u64,
    pub last_modified: i64,
    pub path: String,
    pub uploaded_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActivityEntry {
    pub action: String,
    pub timestamp: DateTime<Utc>,
}

impl ActivityEntry {
    pub fn new(action: impl Into<String>, timestamp: DateTime<Utc>) -> Self {
        Self {
            action: action.into(),
            timestamp,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Task {
    pub id: String,
    pub user_id: String,
    pub title: String,
    #[serde(default)]
    pub description: String,
    #[serde(default, deserialize_with = "deserialize_due_date")]
    pub due_date: Option<NaiveDate>,
    pub status: TaskStatus,
    pub category: TaskCategory,
    #[serde(default)]
    pub order: i64,
    #[serde(default)]
    pub attachments: Vec<Attachment>,
    #[serde(default)]
    pub activity_log: Vec<ActivityEntry>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Task {
    /// Completion is derived from the status; it is never stored on its own.
    pub fn is_completed(&self) -> bool {
        self.status == TaskStatus::Completed
    }
}

/// Display order inside a status partition: `order` ascending, ties broken by id.
pub fn display_cmp(a: &Task, b: &Task) -> Ordering {
    a.order.cmp(&b.order).then_with(|| a.id.cmp(&b.id))
}

/// One row of a reorder write-set.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReorderItem {
    pub id: String,
    pub order: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<TaskStatus>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct NewTaskRequest {
    pub title: String,
    #[serde(default)]
    pub description: String,
    #[serde(default, deserialize_with = "deserialize_due_date")]
    pub due_date: Option<NaiveDate>,
    #[serde(default)]
    pub status: TaskStatus,
    #[serde(default)]
    pub category: TaskCategory,
    #[serde(default)]
    pub order: Option<i64>,
    #[serde(default)]
    pub attachments: Vec<Attachment>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct UpdateTaskRequest {
    pub title: Option<String>,
    pub description: Option<String>,
    /// Absent leaves the date alone; `null` or `""` clears it.
    #[serde(default, deserialize_with = "deserialize_due_date_patch")]
    pub due_date: Option<Option<NaiveDate>>,
    pub status: Option<TaskStatus>,
    pub category: Option<TaskCategory>,
    pub attachments: Option<Vec<Attachment>>,
}

/// Accepts `2024-03-15`, `2024-03-15T01:00:00` and RFC 3339 timestamps and
/// keeps the calendar date as written.
pub fn parse_calendar_date(raw: &str) -> Option<NaiveDate> {
    let raw = raw.trim();
    if let Ok(date) = NaiveDate::parse_from_str(raw, "%Y-%m-%d") {
        return Some(date);
    }
    if let Ok(datetime) = raw.parse::<NaiveDateTime>() {
        return Some(datetime.date());
    }
    DateTime::parse_from_rfc3339(raw)
        .ok()
        .map(|datetime| datetime.date_naive())
}

fn parse_optional_date<E: serde::de::Error>(raw: Option<String>) -> Result<Option<NaiveDate>, E> {
    match raw {
        None => Ok(None),
        Some(raw) if raw.trim().is_empty() => Ok(None),
        Some(raw) => parse_calendar_date(&raw)
            .map(Some)
            .ok_or_else(|| E::custom(format!("invalid date: {}", raw))),
    }
}

pub fn deserialize_due_date<'de, D>(deserializer: D) -> Result<Option<NaiveDate>, D::Error>
where
    D: Deserializer<'de>,
{
    parse_optional_date(Option::<String>::deserialize(deserializer)?)
}

fn deserialize_due_date_patch<'de, D>(deserializer: D) -> Result<Option<Option<NaiveDate>>, D::Error>
where
    D: Deserializer<'de>,
{
    parse_optional_date(Option::<String>::deserialize(deserializer)?).map(Some)
}
