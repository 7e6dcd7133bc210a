// Data models for the task store

use crate::error::{Result, StoreError};
use chrono::NaiveDateTime;
use rusqlite::types::{FromSql, FromSqlError, FromSqlResult, ToSql, ToSqlOutput, ValueRef};
use serde::{Deserialize, Deserializer, Serialize};
use std::str::FromStr;

/// A persisted task
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Task {
    pub id: i64,
    pub title: String,
    pub completed: bool,
    pub deadline: Option<String>,
    pub category: Option<String>,
    pub notes: Option<String>,
    pub priority: Option<Priority>,
    pub created_at: NaiveDateTime,
}

/// A persisted label
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Label {
    pub id: i64,
    pub name: String,
    pub color: Option<String>,
}

/// Task priority, stored as `ASAP`, `1`, `2`, `3` or `4`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Priority {
    #[serde(rename = "ASAP")]
    Asap,
    #[serde(rename = "1")]
    P1,
    #[serde(rename = "2")]
    P2,
    #[serde(rename = "3")]
    P3,
    #[serde(rename = "4")]
    P4,
}

impl Priority {
    pub const ALL: [Priority; 5] = [Priority::Asap, Priority::P1, Priority::P2, Priority::P3, Priority::P4];

    pub fn as_str(self) -> &'static str {
        match self {
            Priority::Asap => "ASAP",
            Priority::P1 => "1",
            Priority::P2 => "2",
            Priority::P3 => "3",
            Priority::P4 => "4",
        }
    }

    /// Numeric rank, 0 being the most urgent
    pub fn rank(self) -> i64 {
        match self {
            Priority::Asap => 0,
            Priority::P1 => 1,
            Priority::P2 => 2,
            Priority::P3 => 3,
            Priority::P4 => 4,
        }
    }

    fn from_rank(rank: i64) -> Option<Self> {
        Self::ALL.into_iter().find(|p| p.rank() == rank)
    }
}

impl FromStr for Priority {
    type Err = StoreError;

    fn from_str(s: &str) -> Result<Self> {
        Self::ALL
            .into_iter()
            .find(|p| p.as_str() == s)
            .ok_or_else(|| StoreError::InvalidPriority(s.to_string()))
    }
}

impl std::fmt::Display for Priority {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl ToSql for Priority {
    fn to_sql(&self) -> rusqlite::Result<ToSqlOutput<'_>> {
        Ok(ToSqlOutput::from(self.as_str()))
    }
}

// Older databases declared `priority INTEGER`, so numeric storage is accepted too.
impl FromSql for Priority {
    fn column_result(value: ValueRef<'_>) -> FromSqlResult<Self> {
        match value {
            ValueRef::Text(bytes) => {
                let s = std::str::from_utf8(bytes).map_err(|e| FromSqlError::Other(Box::new(e)))?;
                s.parse::<Priority>().map_err(|e| FromSqlError::Other(Box::new(e)))
            }
            ValueRef::Integer(n) => Priority::from_rank(n).ok_or(FromSqlError::OutOfRange(n)),
            _ => Err(FromSqlError::InvalidType),
        }
    }
}

/// Input for `Store::add_task`
///
/// Fields arrive unvalidated; the store rejects a missing or blank title and
/// unknown priorities before writing anything.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct NewTask {
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub deadline: Option<String>,
    #[serde(default)]
    pub category: Option<String>,
    #[serde(default)]
    pub notes: Option<String>,
    #[serde(default)]
    pub priority: Option<String>,
}

impl NewTask {
    pub fn new<S: Into<String>>(title: S) -> Self {
        Self {
            title: Some(title.into()),
            ..Self::default()
        }
    }

    pub fn deadline<S: Into<String>>(mut self, deadline: S) -> Self {
        self.deadline = Some(deadline.into());
        self
    }

    pub fn category<S: Into<String>>(mut self, category: S) -> Self {
        self.category = Some(category.into());
        self
    }

    pub fn notes<S: Into<String>>(mut self, notes: S) -> Self {
        self.notes = Some(notes.into());
        self
    }

    pub fn priority<S: Into<String>>(mut self, priority: S) -> Self {
        self.priority = Some(priority.into());
        self
    }
}

/// Input for `Store::add_label`
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct NewLabel {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub color: Option<String>,
}

impl NewLabel {
    pub fn new<S: Into<String>>(name: S) -> Self {
        Self {
            name: Some(name.into()),
            color: None,
        }
    }

    pub fn color<S: Into<String>>(mut self, color: S) -> Self {
        self.color = Some(color.into());
        self
    }
}

/// Sparse update for a task
///
/// Each field is three-state: `None` leaves the column alone, `Some(None)`
/// means the caller sent an explicit null, `Some(Some(v))` sets a value.
/// Keys other than the six below are ignored when deserializing.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct TaskPatch {
    #[serde(default, deserialize_with = "nullable")]
    pub title: Option<Option<String>>,
    #[serde(default, deserialize_with = "nullable")]
    pub completed: Option<Option<bool>>,
    #[serde(default, deserialize_with = "nullable")]
    pub deadline: Option<Option<String>>,
    #[serde(default, deserialize_with = "nullable")]
    pub category: Option<Option<String>>,
    #[serde(default, deserialize_with = "nullable")]
    pub notes: Option<Option<String>>,
    #[serde(default, deserialize_with = "nullable")]
    pub priority: Option<Option<String>>,
}

fn nullable<'de, D, T>(deserializer: D) -> std::result::Result<Option<Option<T>>, D::Error>
where
    D: Deserializer<'de>,
    T: Deserialize<'de>,
{
    Option::<T>::deserialize(deserializer).map(Some)
}

impl TaskPatch {
    pub fn is_empty(&self) -> bool {
        self.title.is_none()
            && self.completed.is_none()
            && self.deadline.is_none()
            && self.category.is_none()
            && self.notes.is_none()
            && self.priority.is_none()
    }

    pub fn title<S: Into<String>>(mut self, title: S) -> Self {
        self.title = Some(Some(title.into()));
        self
    }

    pub fn completed(mut self, completed: bool) -> Self {
        self.completed = Some(Some(completed));
        self
    }

    pub fn deadline<S: Into<String>>(mut self, deadline: Option<S>) -> Self {
        self.deadline = Some(deadline.map(Into::into));
        self
    }

    pub fn category<S: Into<String>>(mut self, category: Option<S>) -> Self {
        self.category = Some(category.map(Into::into));
        self
    }

    pub fn notes<S: Into<String>>(mut self, notes: Option<S>) -> Self {
        self.notes = Some(notes.map(Into::into));
        self
    }

    pub fn priority<S: Into<String>>(mut self, priority: Option<S>) -> Self {
        self.priority = Some(priority.map(Into::into));
        self
    }
}

/// Check a task title: absent is `InvalidTitle`, blank is `EmptyTitle`
pub(crate) fn validate_title(title: Option<&str>) -> Result<&str> {
    match title {
        None => Err(StoreError::InvalidTitle),
        Some(t) if t.trim().is_empty() => Err(StoreError::EmptyTitle),
        Some(t) => Ok(t),
    }
}

/// Check a label name: absent is `InvalidLabel`, blank is `EmptyLabel`
pub(crate) fn validate_label_name(name: Option<&str>) -> Result<&str> {
    match name {
        None => Err(StoreError::InvalidLabel),
        Some(n) if n.trim().is_empty() => Err(StoreError::EmptyLabel),
        Some(n) => Ok(n),
    }
}

pub(crate) fn parse_priority(priority: Option<&str>) -> Result<Option<Priority>> {
    priority.map(str::parse::<Priority>).transpose()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorCode;

    #[test]
    fn test_priority_parse() {
        assert_eq!("ASAP".parse::<Priority>().unwrap(), Priority::Asap);
        assert_eq!("3".parse::<Priority>().unwrap(), Priority::P3);

        for bad in ["99", "0", "asap", "HIGH", "", " 1"] {
            let err = bad.parse::<Priority>().unwrap_err();
            assert_eq!(err.code(), ErrorCode::InvalidPriority, "input {:?}", bad);
        }
    }

    #[test]
    fn test_priority_serialization() {
        assert_eq!(serde_json::to_string(&Priority::Asap).unwrap(), "\"ASAP\"");
        assert_eq!(serde_json::to_string(&Priority::P2).unwrap(), "\"2\"");
        assert_eq!(Priority::P4.to_string(), "4");
    }

    #[test]
    fn test_validate_title() {
        assert_eq!(validate_title(Some("Buy milk")).unwrap(), "Buy milk");
        assert_eq!(validate_title(None).unwrap_err().code(), ErrorCode::InvalidTitle);
        assert_eq!(validate_title(Some("")).unwrap_err().code(), ErrorCode::EmptyTitle);
        assert_eq!(validate_title(Some(" \t\n")).unwrap_err().code(), ErrorCode::EmptyTitle);
    }

    #[test]
    fn test_validate_label_name() {
        assert_eq!(validate_label_name(Some("work")).unwrap(), "work");
        assert_eq!(validate_label_name(None).unwrap_err().code(), ErrorCode::InvalidLabel);
        assert_eq!(validate_label_name(Some("   ")).unwrap_err().code(), ErrorCode::EmptyLabel);
    }

    #[test]
    fn test_patch_distinguishes_absent_and_null() {
        let patch: TaskPatch = serde_json::from_str(r#"{"deadline": null, "notes": "n"}"#).unwrap();
        assert_eq!(patch.deadline, Some(None));
        assert_eq!(patch.notes, Some(Some("n".to_string())));
        assert_eq!(patch.title, None);
        assert!(!patch.is_empty());
    }

    #[test]
    fn test_patch_ignores_unknown_keys() {
        let patch: TaskPatch = serde_json::from_str(r#"{"id": 4, "color": "red"}"#).unwrap();
        assert!(patch.is_empty());
    }

    #[test]
    fn test_new_task_builder() {
        let task = NewTask::new("Write report").category("Work").priority("1");
        assert_eq!(task.title.as_deref(), Some("Write report"));
        assert_eq!(task.category.as_deref(), Some("Work"));
        assert_eq!(task.priority.as_deref(), Some("1"));
        assert!(task.deadline.is_none());
    }

    #[test]
    fn test_new_task_from_json_with_null_title() {
        let task: NewTask = serde_json::from_str(r#"{"title": null}"#).unwrap();
        assert!(task.title.is_none());
    }
}
