//! This is a library for keeping a single user's app state alive across three
//! places that can disagree: the in-memory working copy, a synchronous local
//! durable cache, and an asynchronous remote document store. It was created
//! for Daybook, so it doesn't include much that was not needed for that
//! project.
//!
//! Syncing strategy:
//! 1. The app state is held as one snapshot, owned by a [`session::Session`].
//! 2. Every mutation replaces the snapshot, synchronously mirrors it into the
//!    local cache (the durability floor against a crash or reload), and
//!    re-arms a debounce timer.
//! 3. When the timer fires with no intervening mutation, the latest snapshot
//!    is written to the remote store with a fresh update stamp. Success
//!    clears the cache entry; failure leaves it alone, and the next mutation
//!    or the next session's load picks it up. There is no timer-based retry.
//! 4. At session start, both sides are read and the fresher one wins. A
//!    fresher cache means a prior session's remote write never landed; a
//!    brand-new user (neither side present) gets a seeded snapshot and one
//!    establishing remote write.
//!
//! Two devices writing concurrently for the same user is not supported: the
//! reconciliation is last-writer-wins on a single scalar clock, which is only
//! correct with one writer device per user.

pub mod cache;
pub mod clock;
pub mod reconcile;
pub mod remote;
pub mod session;

#[cfg(feature = "rest")]
pub mod rest;

use chrono::{DateTime, Utc};

/// The seam between the engine and the application's state type.
///
/// The engine never looks inside a snapshot; it only asks for the JSON
/// document shape (used for both the cache payload and the remote document),
/// the starter content for a brand-new user, and a post-adoption hook.
pub trait AppSnapshot: Clone {
    /// Starter content for a brand-new user, produced once from the one
    /// reconciliation branch where neither the cache nor the remote store
    /// has anything.
    fn seed(now: DateTime<Utc>) -> Self;

    /// Decode a document's fields, upgrading any legacy on-disk shape.
    /// `None` means the document was unreadable and the source should be
    /// treated as absent.
    fn from_document(fields: &serde_json::Value) -> Option<Self>;

    /// The document shape written to both the cache and the remote store.
    fn to_document(&self) -> serde_json::Value;

    /// Applied after adoption from either persisted source, before the
    /// snapshot is exposed (e.g. a retention purge).
    fn on_load(self, _now: DateTime<Utc>) -> Self {
        self
    }
}
