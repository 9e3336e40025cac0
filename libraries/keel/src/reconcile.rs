//! Session-start reconciliation: given what the local cache and the remote
//! store each hold, decide the single authoritative snapshot.
//!
//! The comparison is a timestamp, not "always prefer remote", because the
//! debounced remote write can legitimately lag a local mutation by the
//! debounce window plus network latency. A reload during that window must
//! not discard the user's most recent edits.

use chrono::{DateTime, Utc};

use crate::remote::{RemoteDocument, RemoteError};

/// The payload written to the local cache: the snapshot document plus the
/// wall-clock write time and the owner it belongs to.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CachedSnapshot {
    pub fields: serde_json::Value,
    pub written_at_epoch_millis: i64,
    pub owner_id: String,
}

impl CachedSnapshot {
    pub fn written_at(&self) -> Option<DateTime<Utc>> {
        DateTime::<Utc>::from_timestamp_millis(self.written_at_epoch_millis)
    }
}

/// The cache is keyed per owner, so a stale entry left behind by a previous
/// identity is invisible to the next one.
pub fn cache_key(owner_id: &str) -> String {
    format!("user__{owner_id}")
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Source {
    /// A prior session's write never finished reaching the remote store, or
    /// the remote store was absent or unreachable.
    Cache,
    Remote,
    /// Brand-new user: neither side has anything.
    Seed,
}

/// The decision table, evaluated in order. Inputs are whatever each side
/// produced: the cache entry (if present, owned by this user, and readable)
/// and the remote read result.
pub fn choose_source(
    cache: Option<&CachedSnapshot>,
    remote: &Result<Option<RemoteDocument>, RemoteError>,
) -> Source {
    match (remote, cache) {
        (Ok(Some(document)), Some(cached)) => {
            let cache_is_fresher = cached
                .written_at()
                .is_some_and(|written| written > document.updated_at);
            if cache_is_fresher {
                Source::Cache
            } else {
                Source::Remote
            }
        }
        (Ok(Some(_)), None) => Source::Remote,
        (Ok(None), Some(_)) => Source::Cache,
        (Ok(None), None) => Source::Seed,
        (Err(_), Some(_)) => Source::Cache,
        // Acknowledged edge case: an existing user whose remote store is
        // unreachable and whose cache is gone sees a seeded state.
        (Err(_), None) => Source::Seed,
    }
}
