//! State model and sync core for Daybook, a personal journaling and
//! day-planning app.
//!
//! The presentation layer never mutates records in place. It reads the
//! current [`Snapshot`] and calls the typed operations on [`Planner`], each
//! of which is a pure reduction of the previous snapshot followed by exactly
//! one commit into the sync engine: a synchronous local-cache mirror plus a
//! debounced remote write, gated until the initial load has completed. See
//! the `keel` crate for the engine itself.

pub mod model;
pub mod ops;
pub mod snapshot;

pub use ops::{RETENTION_DAYS, StoreError};
pub use snapshot::Snapshot;

use chrono::NaiveDate;

use keel::cache::LocalCache;
use keel::clock::Clock;
use keel::remote::RemoteStore;
use keel::session::{Session, SessionError, SessionState};

use crate::model::{
    Collection, DayDebrief, EntryPatch, Habit, HabitPatch, ItemPatch, JournalEntry, JournalPatch,
    LogEntry,
};

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum PlannerError {
    #[error(transparent)]
    Session(#[from] SessionError),
    #[error(transparent)]
    Store(#[from] StoreError),
}

/// The collaborator-facing mutation API over one user's session.
///
/// Every operation that changes a collection commits exactly once, batches
/// included, so the sync scheduler sees one snapshot per external call.
pub struct Planner<C, R, K> {
    session: Session<Snapshot, C, R, K>,
}

impl<C, R, K> Planner<C, R, K>
where
    C: LocalCache,
    R: RemoteStore,
    K: Clock,
{
    pub fn new(cache: C, remote: R, clock: K) -> Self {
        Self {
            session: Session::new(cache, remote, clock),
        }
    }

    // --- lifecycle ---

    /// Load (or seed) the given user's data and open the write-gate.
    pub async fn sign_in(&mut self, owner_id: &str) -> &Snapshot {
        self.session.sign_in(owner_id).await
    }

    /// Forget the in-memory state and close the write-gate. The local cache
    /// is left untouched for the previous owner's next session.
    pub fn sign_out(&mut self) {
        self.session.sign_out();
    }

    /// Drive the debounced remote flush; the host's event loop calls this.
    pub async fn tick(&mut self) {
        self.session.tick().await;
    }

    /// Best-effort final flush for app teardown.
    pub async fn shutdown(&mut self) {
        self.session.flush().await;
    }

    pub fn state(&self) -> SessionState {
        self.session.state()
    }

    pub fn session(&self) -> &Session<Snapshot, C, R, K> {
        &self.session
    }

    pub fn session_mut(&mut self) -> &mut Session<Snapshot, C, R, K> {
        &mut self.session
    }

    // --- reads ---

    pub fn snapshot(&self) -> Result<&Snapshot, PlannerError> {
        Ok(self.session.snapshot()?)
    }

    pub fn active_entries(&self) -> Result<impl Iterator<Item = &LogEntry>, PlannerError> {
        Ok(self.snapshot()?.active_entries())
    }

    pub fn trashed_entries(&self) -> Result<impl Iterator<Item = &LogEntry>, PlannerError> {
        Ok(self.snapshot()?.trashed_entries())
    }

    /// The miss-tolerant reducers return the snapshot unchanged for absent
    /// ids; only a real change may touch the cache or arm the remote flush.
    fn commit_if_changed(&mut self, next: Snapshot) -> Result<(), PlannerError> {
        if self.session.snapshot()? == &next {
            return Ok(());
        }
        Ok(self.session.commit(next)?)
    }

    // --- log entries ---

    pub fn add_entry(&mut self, entry: LogEntry) -> Result<(), PlannerError> {
        let next = self.session.snapshot()?.add_entry(entry)?;
        Ok(self.session.commit(next)?)
    }

    pub fn update_entry(&mut self, id: &str, patches: &[EntryPatch]) -> Result<(), PlannerError> {
        let next = self.session.snapshot()?.update_entry(id, patches);
        self.commit_if_changed(next)
    }

    pub fn batch_update_entries(
        &mut self,
        updates: &[(String, Vec<EntryPatch>)],
    ) -> Result<(), PlannerError> {
        let next = self.session.snapshot()?.batch_update_entries(updates);
        self.commit_if_changed(next)
    }

    pub fn soft_delete_entry(&mut self, id: &str) -> Result<(), PlannerError> {
        let now = self.session.clock().now();
        let next = self.session.snapshot()?.soft_delete_entry(id, now);
        self.commit_if_changed(next)
    }

    /// Returns `Ok(false)` when the entry no longer exists (for example the
    /// purge already removed it); callers treat that as already resolved.
    pub fn restore_entry(&mut self, id: &str) -> Result<bool, PlannerError> {
        let current = self.session.snapshot()?;
        if current.entry(id).is_none() {
            return Ok(false);
        }
        let next = current.restore_entry(id);
        self.commit_if_changed(next)?;
        Ok(true)
    }

    pub fn hard_delete_entry(&mut self, id: &str) -> Result<(), PlannerError> {
        let next = self.session.snapshot()?.hard_delete_entry(id);
        self.commit_if_changed(next)
    }

    // --- habits ---

    pub fn add_habit(&mut self, habit: Habit) -> Result<(), PlannerError> {
        let next = self.session.snapshot()?.add_habit(habit)?;
        Ok(self.session.commit(next)?)
    }

    pub fn update_habit(&mut self, id: &str, patches: &[HabitPatch]) -> Result<(), PlannerError> {
        let next = self.session.snapshot()?.update_habit(id, patches);
        self.commit_if_changed(next)
    }

    pub fn delete_habit(&mut self, id: &str) -> Result<(), PlannerError> {
        let next = self.session.snapshot()?.delete_habit(id);
        self.commit_if_changed(next)
    }

    /// Flip one date's completion; the streak is recomputed against the
    /// clock's idea of today.
    pub fn toggle_habit(&mut self, id: &str, date: &str) -> Result<(), PlannerError> {
        let today: NaiveDate = self.session.clock().now().date_naive();
        let next = self.session.snapshot()?.toggle_habit(id, date, today);
        self.commit_if_changed(next)
    }

    // --- journal ---

    pub fn add_journal_entry(&mut self, entry: JournalEntry) -> Result<(), PlannerError> {
        let next = self.session.snapshot()?.add_journal_entry(entry)?;
        Ok(self.session.commit(next)?)
    }

    pub fn update_journal_entry(
        &mut self,
        id: &str,
        patches: &[JournalPatch],
    ) -> Result<(), PlannerError> {
        let next = self.session.snapshot()?.update_journal_entry(id, patches);
        self.commit_if_changed(next)
    }

    pub fn delete_journal_entry(&mut self, id: &str) -> Result<(), PlannerError> {
        let next = self.session.snapshot()?.delete_journal_entry(id);
        self.commit_if_changed(next)
    }

    // --- collections ---

    pub fn add_collection(&mut self, collection: Collection) -> Result<(), PlannerError> {
        let next = self.session.snapshot()?.add_collection(collection)?;
        Ok(self.session.commit(next)?)
    }

    pub fn rename_collection(&mut self, id: &str, title: &str) -> Result<(), PlannerError> {
        let next = self.session.snapshot()?.rename_collection(id, title);
        self.commit_if_changed(next)
    }

    pub fn delete_collection(&mut self, id: &str) -> Result<(), PlannerError> {
        let next = self.session.snapshot()?.delete_collection(id);
        self.commit_if_changed(next)
    }

    pub fn add_collection_item(
        &mut self,
        collection_id: &str,
        item_id: &str,
        text: &str,
    ) -> Result<(), PlannerError> {
        let next = self
            .session
            .snapshot()?
            .add_collection_item(collection_id, item_id, text);
        self.commit_if_changed(next)
    }

    pub fn update_collection_item(
        &mut self,
        collection_id: &str,
        item_id: &str,
        patches: &[ItemPatch],
    ) -> Result<(), PlannerError> {
        let next = self
            .session
            .snapshot()?
            .update_collection_item(collection_id, item_id, patches);
        self.commit_if_changed(next)
    }

    pub fn delete_collection_item(
        &mut self,
        collection_id: &str,
        item_id: &str,
    ) -> Result<(), PlannerError> {
        let next = self
            .session
            .snapshot()?
            .delete_collection_item(collection_id, item_id);
        self.commit_if_changed(next)
    }

    pub fn reorder_collection_items(
        &mut self,
        collection_id: &str,
        ordered_ids: &[String],
    ) -> Result<(), PlannerError> {
        let next = self
            .session
            .snapshot()?
            .reorder_collection_items(collection_id, ordered_ids);
        self.commit_if_changed(next)
    }

    // --- day debriefs ---

    pub fn upsert_debrief(&mut self, debrief: DayDebrief) -> Result<(), PlannerError> {
        let next = self.session.snapshot()?.upsert_debrief(debrief);
        self.commit_if_changed(next)
    }
}
