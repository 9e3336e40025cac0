//! Every mutation as a pure function of the previous snapshot. Nothing in
//! this module performs I/O or looks at a real clock; callers pass the
//! current time in, which is what keeps the whole reducer layer trivially
//! testable.
//!
//! Misses are benign: updating, toggling or deleting an id that is not
//! present returns the snapshot unchanged, because concurrent deletions are
//! an expected race, not a bug. The one caller-contract error is adding a
//! record whose id already exists.

use chrono::{DateTime, Duration, NaiveDate, Utc};

use crate::model::{
    Collection, CollectionItem, DayDebrief, EntryKind, EntryPatch, Habit, HabitPatch, ItemPatch,
    JournalEntry, JournalPatch, LogEntry,
};
use crate::snapshot::Snapshot;

/// How long a soft-deleted entry stays recoverable in the trash.
pub const RETENTION_DAYS: i64 = 7;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum StoreError {
    #[error("a record with id {0} already exists")]
    DuplicateId(String),
}

impl Snapshot {
    // --- log entries ---

    pub fn add_entry(&self, entry: LogEntry) -> Result<Self, StoreError> {
        if self.entries.contains_key(&entry.id) {
            return Err(StoreError::DuplicateId(entry.id));
        }
        let mut next = self.clone();
        next.entries = next.entries.update(entry.id.clone(), entry);
        Ok(next)
    }

    pub fn update_entry(&self, id: &str, patches: &[EntryPatch]) -> Self {
        let Some(entry) = self.entries.get(id) else {
            return self.clone();
        };
        let mut entry = entry.clone();
        for patch in patches {
            apply_entry_patch(&mut entry, patch.clone());
        }
        let mut next = self.clone();
        next.entries = next.entries.update(id.to_string(), entry);
        next
    }

    /// Apply all updates as one state transition, so an observer never sees
    /// a partially-updated intermediate snapshot.
    pub fn batch_update_entries(&self, updates: &[(String, Vec<EntryPatch>)]) -> Self {
        let mut next = self.clone();
        for (id, patches) in updates {
            let Some(entry) = next.entries.get(id) else {
                continue;
            };
            let mut entry = entry.clone();
            for patch in patches {
                apply_entry_patch(&mut entry, patch.clone());
            }
            next.entries = next.entries.update(id.clone(), entry);
        }
        next
    }

    /// Stamp `deleted_at`, moving the entry to the trash view. Already
    /// trashed entries keep their original stamp, so repeated deletes cannot
    /// extend the retention countdown.
    pub fn soft_delete_entry(&self, id: &str, now: DateTime<Utc>) -> Self {
        let Some(entry) = self.entries.get(id) else {
            return self.clone();
        };
        if entry.deleted_at.is_some() {
            return self.clone();
        }
        let mut entry = entry.clone();
        entry.deleted_at = Some(now);
        let mut next = self.clone();
        next.entries = next.entries.update(id.to_string(), entry);
        next
    }

    pub fn restore_entry(&self, id: &str) -> Self {
        let Some(entry) = self.entries.get(id) else {
            return self.clone();
        };
        let mut entry = entry.clone();
        entry.deleted_at = None;
        let mut next = self.clone();
        next.entries = next.entries.update(id.to_string(), entry);
        next
    }

    pub fn hard_delete_entry(&self, id: &str) -> Self {
        let mut next = self.clone();
        next.entries = next.entries.without(id);
        next
    }

    /// Drop every entry whose soft-deletion is older than the retention
    /// window. Runs at load, before the collections are exposed.
    pub fn purge_expired(&self, now: DateTime<Utc>) -> Self {
        let cutoff = now - Duration::days(RETENTION_DAYS);
        let mut next = self.clone();
        next.entries = next
            .entries
            .iter()
            .filter(|(_, entry)| match entry.deleted_at {
                Some(deleted_at) => deleted_at >= cutoff,
                None => true,
            })
            .map(|(id, entry)| (id.clone(), entry.clone()))
            .collect();
        next
    }

    pub fn entry(&self, id: &str) -> Option<&LogEntry> {
        self.entries.get(id)
    }

    /// Entries not in the trash. Together with [`Snapshot::trashed_entries`]
    /// this is a partition of the one underlying collection.
    pub fn active_entries(&self) -> impl Iterator<Item = &LogEntry> {
        self.entries.values().filter(|entry| !entry.is_trashed())
    }

    pub fn trashed_entries(&self) -> impl Iterator<Item = &LogEntry> {
        self.entries.values().filter(|entry| entry.is_trashed())
    }

    // --- habits ---

    pub fn add_habit(&self, habit: Habit) -> Result<Self, StoreError> {
        if self.habits.contains_key(&habit.id) {
            return Err(StoreError::DuplicateId(habit.id));
        }
        let mut next = self.clone();
        next.habits = next.habits.update(habit.id.clone(), habit);
        Ok(next)
    }

    pub fn update_habit(&self, id: &str, patches: &[HabitPatch]) -> Self {
        let Some(habit) = self.habits.get(id) else {
            return self.clone();
        };
        let mut habit = habit.clone();
        for patch in patches {
            match patch.clone() {
                HabitPatch::Name(name) => habit.name = name,
                HabitPatch::Color(color) => habit.color = color,
            }
        }
        let mut next = self.clone();
        next.habits = next.habits.update(id.to_string(), habit);
        next
    }

    pub fn delete_habit(&self, id: &str) -> Self {
        let mut next = self.clone();
        next.habits = next.habits.without(id);
        next
    }

    /// Flip `date`'s membership in the habit's completed set, then recompute
    /// the streak relative to `today`.
    pub fn toggle_habit(&self, id: &str, date: &str, today: NaiveDate) -> Self {
        let Some(habit) = self.habits.get(id) else {
            return self.clone();
        };
        let mut habit = habit.clone();
        if !habit.completed_dates.remove(date) {
            habit.completed_dates.insert(date.to_string());
        }
        habit.streak = streak_for(&habit.completed_dates, today);
        let mut next = self.clone();
        next.habits = next.habits.update(id.to_string(), habit);
        next
    }

    // --- journal ---

    pub fn add_journal_entry(&self, entry: JournalEntry) -> Result<Self, StoreError> {
        if self.journal_entries.contains_key(&entry.id) {
            return Err(StoreError::DuplicateId(entry.id));
        }
        let mut next = self.clone();
        next.journal_entries = next.journal_entries.update(entry.id.clone(), entry);
        Ok(next)
    }

    pub fn update_journal_entry(&self, id: &str, patches: &[JournalPatch]) -> Self {
        let Some(entry) = self.journal_entries.get(id) else {
            return self.clone();
        };
        let mut entry = entry.clone();
        for patch in patches {
            match patch.clone() {
                JournalPatch::Title(title) => entry.title = title,
                JournalPatch::Content(content) => entry.content = content,
                JournalPatch::Mood(mood) => entry.mood = mood,
                JournalPatch::Tags(tags) => entry.tags = tags,
                JournalPatch::Wins(wins) => entry.wins = wins,
            }
        }
        let mut next = self.clone();
        next.journal_entries = next.journal_entries.update(id.to_string(), entry);
        next
    }

    pub fn delete_journal_entry(&self, id: &str) -> Self {
        let mut next = self.clone();
        next.journal_entries = next.journal_entries.without(id);
        next
    }

    // --- collections ---

    pub fn add_collection(&self, collection: Collection) -> Result<Self, StoreError> {
        if self.collections.contains_key(&collection.id) {
            return Err(StoreError::DuplicateId(collection.id));
        }
        let mut next = self.clone();
        next.collections = next.collections.update(collection.id.clone(), collection);
        Ok(next)
    }

    pub fn rename_collection(&self, id: &str, title: &str) -> Self {
        self.with_collection(id, |collection| collection.title = title.to_string())
    }

    pub fn delete_collection(&self, id: &str) -> Self {
        let mut next = self.clone();
        next.collections = next.collections.without(id);
        next
    }

    /// Append an item at the end of the display sequence.
    pub fn add_collection_item(&self, collection_id: &str, id: &str, text: &str) -> Self {
        self.with_collection(collection_id, |collection| {
            let order = collection
                .items
                .iter()
                .map(|item| item.order)
                .max()
                .map_or(0, |max| max + 1);
            collection.items.push(CollectionItem {
                id: id.to_string(),
                text: text.to_string(),
                done: false,
                order,
            });
        })
    }

    pub fn update_collection_item(
        &self,
        collection_id: &str,
        item_id: &str,
        patches: &[ItemPatch],
    ) -> Self {
        self.with_collection(collection_id, |collection| {
            let Some(item) = collection.items.iter_mut().find(|item| item.id == item_id) else {
                return;
            };
            for patch in patches {
                match patch.clone() {
                    ItemPatch::Text(text) => item.text = text,
                    ItemPatch::Done(done) => item.done = done,
                }
            }
        })
    }

    pub fn delete_collection_item(&self, collection_id: &str, item_id: &str) -> Self {
        self.with_collection(collection_id, |collection| {
            collection.items.retain(|item| item.id != item_id);
        })
    }

    /// Renumber items to match `ordered_ids`; ids not mentioned keep their
    /// relative order after the mentioned ones.
    pub fn reorder_collection_items(&self, collection_id: &str, ordered_ids: &[String]) -> Self {
        self.with_collection(collection_id, |collection| {
            let position = |id: &str| {
                ordered_ids
                    .iter()
                    .position(|ordered| ordered == id)
                    .unwrap_or(ordered_ids.len())
            };
            collection
                .items
                .sort_by_key(|item| (position(&item.id), item.order));
            for (index, item) in collection.items.iter_mut().enumerate() {
                item.order = index as i64;
            }
        })
    }

    fn with_collection(&self, id: &str, edit: impl FnOnce(&mut Collection)) -> Self {
        let Some(collection) = self.collections.get(id) else {
            return self.clone();
        };
        let mut collection = collection.clone();
        edit(&mut collection);
        let mut next = self.clone();
        next.collections = next.collections.update(id.to_string(), collection);
        next
    }

    // --- day debriefs ---

    /// At most one debrief per calendar date: replace or append.
    pub fn upsert_debrief(&self, debrief: DayDebrief) -> Self {
        let mut next = self.clone();
        next.debriefs = next.debriefs.update(debrief.date.clone(), debrief);
        next
    }
}

fn apply_entry_patch(entry: &mut LogEntry, patch: EntryPatch) {
    match patch {
        EntryPatch::Title(title) => entry.title = title,
        EntryPatch::Date(date) => {
            let rescheduled =
                entry.kind == EntryKind::Task && !entry.date.is_empty() && entry.date != date;
            if rescheduled {
                entry.moved_count += 1;
            }
            entry.date = date;
        }
        EntryPatch::Status(status) => entry.status = Some(status),
        EntryPatch::Priority(priority) => entry.priority = Some(priority),
        EntryPatch::TimeSlot(time_slot) => entry.time_slot = time_slot,
        EntryPatch::Duration(duration) => entry.duration = duration,
        EntryPatch::Section(section_id) => entry.section_id = section_id,
        EntryPatch::SortOrder(sort_order) => entry.sort_order = Some(sort_order),
        EntryPatch::Time(time) => entry.time = time,
        EntryPatch::Tags(tags) => entry.tags = tags,
        EntryPatch::Notes(notes) => entry.notes = notes,
        EntryPatch::Description(description) => entry.description = description,
        EntryPatch::Links(links) => entry.links = links,
    }
}

/// Length of the maximal run of consecutive days ending today (or
/// yesterday) that are all in `completed`.
pub fn streak_for(completed: &std::collections::BTreeSet<String>, today: NaiveDate) -> u32 {
    let contains = |day: NaiveDate| completed.contains(&day.to_string());

    let yesterday = match today.pred_opt() {
        Some(day) => day,
        None => return u32::from(contains(today)),
    };
    let mut cursor = if contains(today) {
        today
    } else if contains(yesterday) {
        yesterday
    } else {
        return 0;
    };

    let mut run = 1;
    while let Some(previous) = cursor.pred_opt() {
        if !contains(previous) {
            break;
        }
        run += 1;
        cursor = previous;
    }
    run
}
