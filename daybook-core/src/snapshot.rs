//! The full app state at one instant: five collections, each keyed by id
//! (debriefs by date), plus its document codec, the brand-new-user seed, and
//! the legacy-shape upgrade.

use chrono::{DateTime, Utc};
use serde_json::Value;

use crate::model::{Collection, CollectionItem, DayDebrief, Habit, JournalEntry, LogEntry};

#[derive(Debug, Clone, Default, PartialEq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Snapshot {
    #[serde(default)]
    pub entries: im::HashMap<String, LogEntry>,
    #[serde(default)]
    pub habits: im::HashMap<String, Habit>,
    #[serde(default)]
    pub journal_entries: im::HashMap<String, JournalEntry>,
    #[serde(default)]
    pub collections: im::HashMap<String, Collection>,
    #[serde(default)]
    pub debriefs: im::HashMap<String, DayDebrief>,
}

impl keel::AppSnapshot for Snapshot {
    fn seed(now: DateTime<Utc>) -> Self {
        seed_snapshot(now)
    }

    fn from_document(fields: &Value) -> Option<Self> {
        let mut document = fields.clone();
        upgrade_legacy_shape(&mut document);
        match serde_json::from_value(document) {
            Ok(snapshot) => Some(snapshot),
            Err(e) => {
                log::error!("Failed to decode snapshot document: {e}");
                None
            }
        }
    }

    fn to_document(&self) -> Value {
        serde_json::to_value(self).unwrap_or_else(|e| {
            log::error!("Failed to encode snapshot document: {e}");
            Value::Null
        })
    }

    fn on_load(self, now: DateTime<Utc>) -> Self {
        self.purge_expired(now)
    }
}

/// Documents written before the rapid log grew events and notes keep
/// task-shaped records under a `tasks` field, without a `kind` discriminator.
/// Upgrade them in place; this must never fail on a readable record.
fn upgrade_legacy_shape(document: &mut Value) {
    let Some(root) = document.as_object_mut() else {
        return;
    };
    if root.contains_key("entries") {
        return;
    }
    let Some(mut tasks) = root.remove("tasks") else {
        return;
    };
    if let Some(records) = tasks.as_object_mut() {
        for record in records.values_mut() {
            let Some(fields) = record.as_object_mut() else {
                continue;
            };
            fields.entry("kind").or_insert_with(|| Value::from("task"));
            fields.entry("status").or_insert_with(|| Value::from("todo"));
            fields
                .entry("priority")
                .or_insert_with(|| Value::from("medium"));
            fields.entry("movedCount").or_insert_with(|| Value::from(0));
        }
    }
    root.insert("entries".to_string(), tasks);
}

/// Starter content for a brand-new user. Fixed except for the dates, which
/// anchor to the first session's day.
pub fn seed_snapshot(now: DateTime<Utc>) -> Snapshot {
    let today = now.date_naive().to_string();

    let mut snapshot = Snapshot::default();

    for entry in [
        LogEntry::task("seed-task-plan", "Plan your day in the rapid log", today.clone()),
        LogEntry::task("seed-task-journal", "Write your first journal entry", today.clone()),
        LogEntry::note("seed-note-welcome", "Notes capture anything that isn't a task"),
    ] {
        snapshot.entries = snapshot.entries.update(entry.id.clone(), entry);
    }

    let habit = Habit {
        id: "seed-habit-journal".to_string(),
        name: "Daily reflection".to_string(),
        streak: 0,
        completed_dates: Default::default(),
        color: "#7c9885".to_string(),
    };
    snapshot.habits = snapshot.habits.update(habit.id.clone(), habit);

    let journal = JournalEntry {
        id: "seed-journal-welcome".to_string(),
        date: today,
        title: Some("Welcome to Daybook".to_string()),
        content: "This entry is yours to edit or delete.".to_string(),
        mood: None,
        tags: Default::default(),
        wins: Vec::new(),
        method: None,
        steps: None,
    };
    snapshot.journal_entries = snapshot.journal_entries.update(journal.id.clone(), journal);

    let checklist = Collection {
        id: "seed-collection-start".to_string(),
        title: "Getting started".to_string(),
        created_at: now,
        items: vec![
            CollectionItem {
                id: "seed-item-log".to_string(),
                text: "Add a task to today's log".to_string(),
                done: false,
                order: 0,
            },
            CollectionItem {
                id: "seed-item-habit".to_string(),
                text: "Check off a habit".to_string(),
                done: false,
                order: 1,
            },
            CollectionItem {
                id: "seed-item-debrief".to_string(),
                text: "Debrief your evening".to_string(),
                done: false,
                order: 2,
            },
        ],
    };
    snapshot.collections = snapshot.collections.update(checklist.id.clone(), checklist);

    snapshot
}
