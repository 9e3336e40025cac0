//! The per-login session: owns the authoritative snapshot, the load-gate
//! state machine, and the outbound sync scheduling.
//!
//! All of this runs on a single logical thread. Only `sign_in`, `tick` and
//! `flush` suspend (they touch the remote store); everything else, including
//! the cache mirror on every commit, is synchronous.

use chrono::{DateTime, Duration, Utc};

use crate::AppSnapshot;
use crate::cache::LocalCache;
use crate::clock::Clock;
use crate::reconcile::{CachedSnapshot, Source, cache_key, choose_source};
use crate::remote::{RemoteDocument, RemoteStore};

pub const DEFAULT_DEBOUNCE_MILLIS: i64 = 300;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Unloaded,
    Reconciling,
    Ready,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum SessionError {
    #[error("no user is signed in")]
    SignedOut,
    #[error("the initial load has not completed")]
    NotReady,
}

#[derive(Debug, Clone, Copy)]
struct PendingFlush {
    due: DateTime<Utc>,
}

pub struct Session<S, C, R, K> {
    cache: C,
    remote: R,
    clock: K,
    debounce: Duration,
    owner_id: Option<String>,
    state: SessionState,
    snapshot: Option<S>,
    pending: Option<PendingFlush>,
    last_stamp: Option<DateTime<Utc>>,
}

impl<S, C, R, K> Session<S, C, R, K>
where
    S: AppSnapshot,
    C: LocalCache,
    R: RemoteStore,
    K: Clock,
{
    pub fn new(cache: C, remote: R, clock: K) -> Self {
        Self {
            cache,
            remote,
            clock,
            debounce: Duration::milliseconds(DEFAULT_DEBOUNCE_MILLIS),
            owner_id: None,
            state: SessionState::Unloaded,
            snapshot: None,
            pending: None,
            last_stamp: None,
        }
    }

    pub fn with_debounce(mut self, debounce: Duration) -> Self {
        self.debounce = debounce;
        self
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn clock(&self) -> &K {
        &self.clock
    }

    pub fn cache(&self) -> &C {
        &self.cache
    }

    pub fn remote(&self) -> &R {
        &self.remote
    }

    pub fn remote_mut(&mut self) -> &mut R {
        &mut self.remote
    }

    pub fn snapshot(&self) -> Result<&S, SessionError> {
        match self.state {
            SessionState::Ready => Ok(self
                .snapshot
                .as_ref()
                .unwrap_or_else(|| unreachable!("Ready session always holds a snapshot"))),
            SessionState::Reconciling => Err(SessionError::NotReady),
            SessionState::Unloaded => Err(SessionError::SignedOut),
        }
    }

    /// Run reconciliation for `owner_id` and open the write-gate. Signing in
    /// while another identity is active resets the session first. This never
    /// fails: with no readable source anywhere, the user gets a seeded
    /// snapshot.
    pub async fn sign_in(&mut self, owner_id: &str) -> &S {
        if self.owner_id.is_some() {
            self.sign_out();
        }
        self.owner_id = Some(owner_id.to_string());
        self.state = SessionState::Reconciling;

        let key = cache_key(owner_id);
        let cached = self.read_cache_entry(owner_id, &key);

        // An undecodable remote document is treated the same as an absent
        // one; decoding up front keeps the decision table working on what is
        // actually adoptable.
        let remote = match self.remote.read_document(owner_id).await {
            Ok(Some(document)) => match S::from_document(&document.fields) {
                Some(snapshot) => Ok(Some((document, snapshot))),
                None => {
                    log::error!("Remote document for {owner_id} was undecodable, ignoring it");
                    Ok(None)
                }
            },
            Ok(None) => Ok(None),
            Err(e) => {
                log::warn!("Remote read failed during load for {owner_id}: {e}");
                Err(e)
            }
        };
        let remote_for_choice = match &remote {
            Ok(Some((document, _))) => Ok(Some(document.clone())),
            Ok(None) => Ok(None),
            Err(e) => Err(e.clone()),
        };

        let now = self.clock.now();
        let choice = choose_source(
            cached.as_ref().map(|(entry, _)| entry),
            &remote_for_choice,
        );
        let snapshot = match choice {
            Source::Cache => {
                let (_, snapshot) =
                    cached.unwrap_or_else(|| unreachable!("Cache source implies entry"));
                // The entry is superseded by promotion into memory; it will
                // be rewritten fresh on the next mutation. Arm one debounce
                // cycle so the remote store catches up without waiting for
                // the next user edit.
                self.cache.delete_raw(&key);
                self.pending = Some(PendingFlush {
                    due: now + self.debounce,
                });
                snapshot.on_load(now)
            }
            Source::Remote => {
                let (_, snapshot) = match remote {
                    Ok(Some(decoded)) => decoded,
                    _ => unreachable!("Remote source implies a document"),
                };
                self.cache.delete_raw(&key);
                snapshot.on_load(now)
            }
            Source::Seed => {
                let snapshot = S::seed(now);
                // The establishing write only runs when the remote store
                // confirmed it holds nothing. After a failed read the store
                // may still hold the user's document; writing the seed there
                // would clobber it.
                if matches!(remote, Ok(None)) {
                    let stamp = self.next_stamp();
                    let document = RemoteDocument {
                        fields: snapshot.to_document(),
                        updated_at: stamp,
                    };
                    if let Err(e) = self.remote.write_document(owner_id, document).await {
                        log::warn!("Establishing remote write failed for {owner_id}: {e}");
                    }
                }
                snapshot
            }
        };

        self.snapshot = Some(snapshot);
        self.state = SessionState::Ready;
        self.snapshot
            .as_ref()
            .unwrap_or_else(|| unreachable!("snapshot was just stored"))
    }

    /// Clear in-memory state and close the write-gate. The local cache is
    /// deliberately left alone: an unflushed entry keyed by the previous
    /// owner is that owner's recovery path on their next sign-in.
    pub fn sign_out(&mut self) {
        self.owner_id = None;
        self.state = SessionState::Unloaded;
        self.snapshot = None;
        self.pending = None;
        self.last_stamp = None;
    }

    /// Adopt a new snapshot: mirror it synchronously into the local cache,
    /// then (re)arm the debounced remote flush. The cache mirror always
    /// happens before the timer is re-armed; intermediate snapshots are
    /// coalesced and never individually transmitted.
    pub fn commit(&mut self, next: S) -> Result<(), SessionError> {
        let owner_id = match (&self.owner_id, self.state) {
            (Some(owner_id), SessionState::Ready) => owner_id.clone(),
            (Some(_), _) => return Err(SessionError::NotReady),
            (None, _) => return Err(SessionError::SignedOut),
        };

        let now = self.clock.now();
        let entry = CachedSnapshot {
            fields: next.to_document(),
            written_at_epoch_millis: now.timestamp_millis(),
            owner_id: owner_id.clone(),
        };
        match serde_json::to_vec(&entry) {
            Ok(bytes) => self.cache.write_raw(&cache_key(&owner_id), &bytes),
            Err(e) => log::warn!("Failed to serialize cache entry for {owner_id}: {e}"),
        }

        self.snapshot = Some(next);
        self.pending = Some(PendingFlush {
            due: now + self.debounce,
        });
        Ok(())
    }

    /// When the armed debounce timer is due, if ever.
    pub fn next_flush_due(&self) -> Option<DateTime<Utc>> {
        self.pending.map(|pending| pending.due)
    }

    /// Run the debounced remote write if its quiet period has elapsed. The
    /// host's event loop calls this; it is a no-op while the timer has not
    /// fired.
    pub async fn tick(&mut self) {
        let due = match self.pending {
            Some(pending) => pending.due,
            None => return,
        };
        if self.clock.now() >= due {
            self.flush_pending().await;
        }
    }

    /// Best-effort teardown flush: send any pending snapshot now, ignoring
    /// the remaining quiet period. Opportunistic; the synchronous cache
    /// mirror is the actual durability guarantee.
    pub async fn flush(&mut self) {
        if self.pending.is_some() {
            self.flush_pending().await;
        }
    }

    async fn flush_pending(&mut self) {
        self.pending = None;
        let (owner_id, fields) = match (&self.owner_id, &self.snapshot) {
            (Some(owner_id), Some(snapshot)) => (owner_id.clone(), snapshot.to_document()),
            _ => return,
        };

        let document = RemoteDocument {
            fields,
            updated_at: self.next_stamp(),
        };
        match self.remote.write_document(&owner_id, document).await {
            Ok(()) => {
                // The remote store now holds this snapshot; the cache entry
                // is no longer needed for recovery.
                self.cache.delete_raw(&cache_key(&owner_id));
            }
            Err(e) => {
                // No timer retry. The cache entry stays exactly as written;
                // the next mutation re-arms the debounce, and the next
                // session's reconciliation would adopt the entry anyway.
                log::warn!("Remote write failed for {owner_id}, keeping cache entry: {e}");
            }
        }
    }

    /// Remote stamps are monotonically non-decreasing within a session, so
    /// two writes never need tie-breaking beyond "latest overwrites".
    fn next_stamp(&mut self) -> DateTime<Utc> {
        let now = self.clock.now();
        let stamp = match self.last_stamp {
            Some(last) => now.max(last),
            None => now,
        };
        self.last_stamp = Some(stamp);
        stamp
    }

    /// Read and decode the cache entry for `owner_id`. An entry that is
    /// unreadable, undecodable, or stamped with a different owner is treated
    /// as absent and discarded.
    fn read_cache_entry(&mut self, owner_id: &str, key: &str) -> Option<(CachedSnapshot, S)> {
        let bytes = self.cache.read_raw(key)?;
        let entry: CachedSnapshot = match serde_json::from_slice(&bytes) {
            Ok(entry) => entry,
            Err(e) => {
                log::warn!("Discarding unreadable cache entry for {owner_id}: {e}");
                self.cache.delete_raw(key);
                return None;
            }
        };
        if entry.owner_id != owner_id {
            log::warn!(
                "Discarding cache entry owned by {} while loading {owner_id}",
                entry.owner_id
            );
            self.cache.delete_raw(key);
            return None;
        }
        let Some(snapshot) = S::from_document(&entry.fields) else {
            log::warn!("Discarding undecodable cache snapshot for {owner_id}");
            self.cache.delete_raw(key);
            return None;
        };
        Some((entry, snapshot))
    }
}
