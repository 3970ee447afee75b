//! Entity records of the task store.
//!
//! These are plain serde records; the field names and shapes double as the
//! dump wire format (one JSON file per entity, camelCase keys, ISO-8601
//! second-precision dates, null-valued optionals present as `null`).

use std::collections::BTreeMap;

use chrono::{Local, NaiveDateTime, Timelike};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::recurrence::RecurrenceRule;

/// Lowest urgency a task can carry.
pub const URGENCY_MIN: i32 = -99;
/// Highest urgency a task can carry.
pub const URGENCY_MAX: i32 = 100;

/// Prefix of reserved keyword names.
pub const RESERVED_KEYWORD_PREFIX: char = '_';
/// The keyword that turns a task into a note.
pub const NOTE_KEYWORD: &str = "_note";

/// Current local time truncated to second precision, the resolution of
/// every stored timestamp.
pub fn now_second() -> NaiveDateTime {
    let now = Local::now().naive_local();
    now.with_nanosecond(0).unwrap_or(now)
}

/// Task lifecycle status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TaskStatus {
    New,
    Started,
    Done,
}

impl TaskStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            TaskStatus::New => "new",
            TaskStatus::Started => "started",
            TaskStatus::Done => "done",
        }
    }
}

impl std::fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for TaskStatus {
    type Err = crate::error::Error;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value {
            "new" => Ok(TaskStatus::New),
            "started" => Ok(TaskStatus::Started),
            "done" => Ok(TaskStatus::Done),
            _ => Err(crate::error::Error::UserInput(format!(
                "unknown status '{value}'"
            ))),
        }
    }
}

/// A named container owning tasks. `active = false` hides its tasks from
/// default listings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProjectRecord {
    pub uuid: Uuid,
    pub name: String,
    pub active: bool,
}

impl ProjectRecord {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            uuid: Uuid::new_v4(),
            name: name.into(),
            active: true,
        }
    }
}

/// A reusable label. Names starting with `_` are reserved for the system.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct KeywordRecord {
    pub uuid: Uuid,
    pub name: String,
}

impl KeywordRecord {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            uuid: Uuid::new_v4(),
            name: name.into(),
        }
    }

    pub fn is_reserved(&self) -> bool {
        keyword_is_reserved(&self.name)
    }
}

/// Whether a keyword name is reserved (system-visible, hidden from most
/// listings).
pub fn keyword_is_reserved(name: &str) -> bool {
    name.starts_with(RESERVED_KEYWORD_PREFIX)
}

/// The unit of work.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TaskRecord {
    pub uuid: Uuid,
    pub title: String,
    pub project_uuid: Uuid,
    pub creation_date: NaiveDateTime,
    pub due_date: Option<NaiveDateTime>,
    pub done_date: Option<NaiveDateTime>,
    pub description: String,
    pub urgency: i32,
    pub status: TaskStatus,
    #[serde(default)]
    pub recurrence: RecurrenceRule,
    /// Keyword associations with their optional integer value.
    #[serde(default)]
    pub keywords: BTreeMap<String, Option<i64>>,
}

impl TaskRecord {
    pub fn new(project_uuid: Uuid, title: impl Into<String>) -> Self {
        Self {
            uuid: Uuid::new_v4(),
            title: title.into(),
            project_uuid,
            creation_date: now_second(),
            due_date: None,
            done_date: None,
            description: String::new(),
            urgency: 0,
            status: TaskStatus::New,
            recurrence: RecurrenceRule::none(),
            keywords: BTreeMap::new(),
        }
    }

    /// A task tagged `_note` behaves as a note: listed separately, no due
    /// semantics.
    pub fn is_note(&self) -> bool {
        self.keywords.contains_key(NOTE_KEYWORD)
    }
}

/// Expansion of the first token of a user command line.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AliasRecord {
    pub uuid: Uuid,
    pub name: String,
    pub command: String,
}

impl AliasRecord {
    pub fn new(name: impl Into<String>, command: impl Into<String>) -> Self {
        Self {
            uuid: Uuid::new_v4(),
            name: name.into(),
            command: command.into(),
        }
    }
}

/// A configuration row. `system = true` entries are internal bookkeeping.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConfigEntry {
    pub name: String,
    pub value: String,
    pub system: bool,
    pub desc: String,
}

/// Cooperative advisory lock held while an external editor is open on a
/// task description.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TaskLockRecord {
    pub task_uuid: Uuid,
    pub pid: u32,
    pub update_date: NaiveDateTime,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn task_wire_format_uses_camel_case_and_nulls() {
        let project = ProjectRecord::new("work");
        let task = TaskRecord::new(project.uuid, "write report");
        let value = serde_json::to_value(&task).unwrap();

        let obj = value.as_object().unwrap();
        assert!(obj.contains_key("projectUuid"));
        assert!(obj.contains_key("creationDate"));
        assert!(obj["dueDate"].is_null());
        assert!(obj["doneDate"].is_null());
        assert_eq!(obj["status"], "new");
        assert_eq!(obj["recurrence"], serde_json::json!({}));

        let back: TaskRecord = serde_json::from_value(value).unwrap();
        assert_eq!(back, task);
    }

    #[test]
    fn note_detection() {
        let project = ProjectRecord::new("notes");
        let mut task = TaskRecord::new(project.uuid, "idea");
        assert!(!task.is_note());
        task.keywords.insert(NOTE_KEYWORD.to_string(), None);
        assert!(task.is_note());
    }

    #[test]
    fn reserved_keywords() {
        assert!(keyword_is_reserved("_note"));
        assert!(keyword_is_reserved("_severity"));
        assert!(!keyword_is_reserved("home"));
    }
}
