//! The five record collections and their closed sets of partial updates.
//!
//! Everything here serializes to the camelCase JSON shapes that live in the
//! remote document and the local cache payload. Dates inside records are ISO
//! calendar dates (`YYYY-MM-DD`); an empty `date` on a log entry means
//! "unscheduled".

use std::collections::BTreeSet;

use chrono::{DateTime, Utc};

#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EntryKind {
    Task,
    Event,
    Note,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TaskStatus {
    Todo,
    Done,
    Migrated,
    Deferred,
    Cancelled,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Priority {
    Low,
    #[default]
    Medium,
    High,
}

/// One record in the rapid log. A single collection backs both the active
/// and the trash views: `deleted_at` present means trash, absent means
/// active, never both.
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LogEntry {
    pub id: String,
    pub kind: EntryKind,
    pub title: String,
    #[serde(default)]
    pub date: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<TaskStatus>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub priority: Option<Priority>,
    /// How many times this task's date has changed due to rescheduling.
    #[serde(default)]
    pub moved_count: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub time_slot: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub duration: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub section_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sort_order: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source_habit_id: Option<String>,
    /// Events only: a display time like "14:30".
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub time: Option<String>,
    #[serde(default, skip_serializing_if = "BTreeSet::is_empty")]
    pub tags: BTreeSet<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub notes: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub links: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub deleted_at: Option<DateTime<Utc>>,
}

impl LogEntry {
    pub fn task(id: impl Into<String>, title: impl Into<String>, date: impl Into<String>) -> Self {
        Self {
            status: Some(TaskStatus::Todo),
            priority: Some(Priority::Medium),
            ..Self::bare(id, EntryKind::Task, title, date)
        }
    }

    pub fn event(id: impl Into<String>, title: impl Into<String>, date: impl Into<String>) -> Self {
        Self::bare(id, EntryKind::Event, title, date)
    }

    pub fn note(id: impl Into<String>, title: impl Into<String>) -> Self {
        Self::bare(id, EntryKind::Note, title, "")
    }

    fn bare(
        id: impl Into<String>,
        kind: EntryKind,
        title: impl Into<String>,
        date: impl Into<String>,
    ) -> Self {
        Self {
            id: id.into(),
            kind,
            title: title.into(),
            date: date.into(),
            status: None,
            priority: None,
            moved_count: 0,
            time_slot: None,
            duration: None,
            section_id: None,
            sort_order: None,
            source_habit_id: None,
            time: None,
            tags: BTreeSet::new(),
            notes: None,
            description: None,
            links: Vec::new(),
            deleted_at: None,
        }
    }

    pub fn is_trashed(&self) -> bool {
        self.deleted_at.is_some()
    }
}

/// The closed set of allowed partial updates to a log entry. Call sites pass
/// any number of these per update; unknown or nonsensical field merges are
/// unrepresentable.
#[derive(Debug, Clone, PartialEq)]
pub enum EntryPatch {
    Title(String),
    /// Changing a scheduled task's date counts as a reschedule and bumps
    /// `moved_count`.
    Date(String),
    Status(TaskStatus),
    Priority(Priority),
    TimeSlot(Option<String>),
    Duration(Option<u32>),
    Section(Option<String>),
    SortOrder(i64),
    Time(Option<String>),
    Tags(BTreeSet<String>),
    Notes(Option<String>),
    Description(Option<String>),
    Links(Vec<String>),
}

#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Habit {
    pub id: String,
    pub name: String,
    /// Derived: the length of the maximal run of consecutive days ending
    /// today (or yesterday) all present in `completed_dates`. Recomputed on
    /// every toggle, never edited directly.
    #[serde(default)]
    pub streak: u32,
    #[serde(default)]
    pub completed_dates: BTreeSet<String>,
    pub color: String,
}

#[derive(Debug, Clone, PartialEq)]
pub enum HabitPatch {
    Name(String),
    Color(String),
}

#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JournalStep {
    pub prompt: String,
    pub answer: String,
}

#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JournalEntry {
    pub id: String,
    pub date: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(default)]
    pub content: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mood: Option<String>,
    #[serde(default, skip_serializing_if = "BTreeSet::is_empty")]
    pub tags: BTreeSet<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub wins: Vec<String>,
    /// Identifier of the guided-journaling method used, if any.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub method: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub steps: Option<Vec<JournalStep>>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum JournalPatch {
    Title(Option<String>),
    Content(String),
    Mood(Option<String>),
    Tags(BTreeSet<String>),
    Wins(Vec<String>),
}

#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CollectionItem {
    pub id: String,
    pub text: String,
    #[serde(default)]
    pub done: bool,
    /// Display sequence within the collection.
    #[serde(default)]
    pub order: i64,
}

#[derive(Debug, Clone, PartialEq)]
pub enum ItemPatch {
    Text(String),
    Done(bool),
}

/// A user-defined checklist.
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Collection {
    pub id: String,
    pub title: String,
    pub created_at: DateTime<Utc>,
    #[serde(default)]
    pub items: Vec<CollectionItem>,
}

/// End-of-day reflection, at most one per calendar date.
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DayDebrief {
    pub date: String,
    /// 1-5: how realistic the day's plan turned out to be.
    pub plan_realism: u8,
    /// 1-5: how much got done.
    pub accomplishment: u8,
    pub mood: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reflection: Option<String>,
}
