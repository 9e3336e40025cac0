//! Engine-level tests driven by a manual clock and in-memory stores.

use std::collections::BTreeMap;

use chrono::{DateTime, Duration, TimeZone, Utc};
use futures::executor::block_on;

use keel::AppSnapshot;
use keel::cache::{LocalCache, MemoryCache};
use keel::clock::{Clock, ManualClock};
use keel::reconcile::{CachedSnapshot, cache_key};
use keel::remote::{MemoryRemote, RemoteDocument};
use keel::session::{Session, SessionError, SessionState};

#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
struct Notes {
    items: BTreeMap<String, String>,
}

impl Notes {
    fn with(pairs: &[(&str, &str)]) -> Self {
        Self {
            items: pairs
                .iter()
                .map(|(k, v)| (k.to_string(), v.to_string()))
                .collect(),
        }
    }
}

impl AppSnapshot for Notes {
    fn seed(_now: DateTime<Utc>) -> Self {
        Notes::with(&[("welcome", "Welcome to your notebook")])
    }

    fn from_document(fields: &serde_json::Value) -> Option<Self> {
        serde_json::from_value(fields.clone()).ok()
    }

    fn to_document(&self) -> serde_json::Value {
        serde_json::to_value(self).unwrap()
    }
}

fn base_time() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2026, 3, 10, 9, 0, 0).unwrap()
}

fn new_session(
    cache: MemoryCache,
    remote: MemoryRemote,
) -> (Session<Notes, MemoryCache, MemoryRemote, ManualClock>, ManualClock) {
    let _ = env_logger::builder().is_test(true).try_init();
    let clock = ManualClock::at(base_time());
    (Session::new(cache, remote, clock.clone()), clock)
}

fn cache_entry_bytes(notes: &Notes, written_at: DateTime<Utc>, owner_id: &str) -> Vec<u8> {
    serde_json::to_vec(&CachedSnapshot {
        fields: notes.to_document(),
        written_at_epoch_millis: written_at.timestamp_millis(),
        owner_id: owner_id.to_string(),
    })
    .unwrap()
}

fn remote_with(owner_id: &str, notes: &Notes, updated_at: DateTime<Utc>) -> MemoryRemote {
    MemoryRemote::new().with_document(
        owner_id,
        RemoteDocument {
            fields: notes.to_document(),
            updated_at,
        },
    )
}

#[test]
fn commit_is_rejected_before_any_sign_in() {
    let (mut session, _clock) = new_session(MemoryCache::new(), MemoryRemote::new());

    let result = session.commit(Notes::with(&[("a", "1")]));
    assert_eq!(result, Err(SessionError::SignedOut));
    assert_eq!(session.state(), SessionState::Unloaded);
    assert!(session.snapshot().is_err());

    // The gate held: nothing reached either store.
    assert_eq!(session.cache().write_count(), 0);
    assert_eq!(session.remote().write_count(), 0);
}

#[test]
fn brand_new_user_is_seeded_and_remote_is_established() {
    let (mut session, clock) = new_session(MemoryCache::new(), MemoryRemote::new());

    let snapshot = block_on(session.sign_in("alice")).clone();
    assert_eq!(snapshot, Notes::seed(clock.now()));
    assert_eq!(session.state(), SessionState::Ready);

    // Exactly one establishing write, containing the seed.
    assert_eq!(session.remote().write_count(), 1);
    let document = session.remote().document("alice").unwrap();
    assert_eq!(Notes::from_document(&document.fields).unwrap(), snapshot);
    assert_eq!(document.updated_at, base_time());
}

#[test]
fn fresher_cache_wins_and_remote_converges_within_one_debounce_cycle() {
    let stale = Notes::with(&[("a", "old")]);
    let fresh = Notes::with(&[("a", "new"), ("b", "unsent edit")]);

    let remote = remote_with("alice", &stale, base_time());
    let mut cache = MemoryCache::new();
    cache.write_raw(
        &cache_key("alice"),
        &cache_entry_bytes(&fresh, base_time() + Duration::seconds(10), "alice"),
    );

    let (mut session, clock) = new_session(cache, remote);
    let adopted = block_on(session.sign_in("alice")).clone();
    assert_eq!(adopted, fresh);

    // Promotion cleared the entry.
    assert!(!session.cache().contains(&cache_key("alice")));

    // One debounce cycle later the remote store holds the cache's state.
    clock.advance(Duration::milliseconds(350));
    block_on(session.tick());
    let document = session.remote().document("alice").unwrap();
    assert_eq!(Notes::from_document(&document.fields).unwrap(), fresh);
    assert_eq!(session.remote().write_count(), 1);
}

#[test]
fn fresher_remote_wins_over_stale_cache() {
    let stale = Notes::with(&[("a", "stale cache")]);
    let fresh = Notes::with(&[("a", "remote truth")]);

    let remote = remote_with("alice", &fresh, base_time());
    let mut cache = MemoryCache::new();
    cache.write_raw(
        &cache_key("alice"),
        &cache_entry_bytes(&stale, base_time() - Duration::seconds(10), "alice"),
    );

    let (mut session, clock) = new_session(cache, remote);
    let adopted = block_on(session.sign_in("alice")).clone();
    assert_eq!(adopted, fresh);

    // The redundant cache entry was cleared, and nothing needed flushing.
    assert!(!session.cache().contains(&cache_key("alice")));
    clock.advance(Duration::seconds(5));
    block_on(session.tick());
    assert_eq!(session.remote().write_count(), 0);
}

#[test]
fn remote_read_failure_falls_back_to_cache() {
    let local_only = Notes::with(&[("a", "offline edit")]);

    let mut remote = remote_with("alice", &Notes::with(&[("a", "unreachable")]), base_time());
    remote.set_fail_reads(true);
    let mut cache = MemoryCache::new();
    cache.write_raw(
        &cache_key("alice"),
        &cache_entry_bytes(&local_only, base_time(), "alice"),
    );

    let (mut session, _clock) = new_session(cache, remote);
    let adopted = block_on(session.sign_in("alice")).clone();
    assert_eq!(adopted, local_only);
    assert_eq!(session.state(), SessionState::Ready);
}

#[test]
fn remote_read_failure_without_cache_never_clobbers_the_remote_document() {
    let existing = Notes::with(&[("a", "years of notes")]);
    let mut remote = remote_with("alice", &existing, base_time());
    remote.set_fail_reads(true);

    // No cache entry either: the session falls back to a seeded state, but
    // the unreachable document must survive untouched.
    let (mut session, clock) = new_session(MemoryCache::new(), remote);
    let adopted = block_on(session.sign_in("alice")).clone();
    assert_eq!(adopted, Notes::seed(clock.now()));

    assert_eq!(session.remote().write_count(), 0);
    let document = session.remote().document("alice").unwrap();
    assert_eq!(Notes::from_document(&document.fields).unwrap(), existing);
}

#[test]
fn rapid_commits_coalesce_into_one_remote_write() {
    let remote = remote_with("alice", &Notes::with(&[("a", "0")]), base_time());
    let (mut session, clock) = new_session(MemoryCache::new(), remote);
    block_on(session.sign_in("alice"));

    for i in 1..=5 {
        clock.advance(Duration::milliseconds(50));
        session.commit(Notes::with(&[("a", &i.to_string())])).unwrap();
        block_on(session.tick());
    }
    assert_eq!(session.remote().write_count(), 0);

    clock.advance(Duration::milliseconds(300));
    block_on(session.tick());

    // Exactly one write, carrying the cumulative (latest) snapshot.
    assert_eq!(session.remote().write_count(), 1);
    let document = session.remote().document("alice").unwrap();
    assert_eq!(
        Notes::from_document(&document.fields).unwrap(),
        Notes::with(&[("a", "5")])
    );
}

#[test]
fn each_commit_rearms_the_quiet_period() {
    let remote = remote_with("alice", &Notes::with(&[("a", "0")]), base_time());
    let (mut session, clock) = new_session(MemoryCache::new(), remote);
    block_on(session.sign_in("alice"));

    session.commit(Notes::with(&[("a", "1")])).unwrap();
    clock.advance(Duration::milliseconds(200));
    block_on(session.tick());
    assert_eq!(session.remote().write_count(), 0);

    session.commit(Notes::with(&[("a", "2")])).unwrap();
    clock.advance(Duration::milliseconds(200));
    block_on(session.tick());
    // 400ms since the first commit, but only 200ms of quiet.
    assert_eq!(session.remote().write_count(), 0);

    clock.advance(Duration::milliseconds(150));
    block_on(session.tick());
    assert_eq!(session.remote().write_count(), 1);
}

#[test]
fn failed_remote_write_preserves_the_cache_entry() {
    let remote = remote_with("alice", &Notes::with(&[("a", "0")]), base_time());
    let (mut session, clock) = new_session(MemoryCache::new(), remote);
    block_on(session.sign_in("alice"));

    let edited = Notes::with(&[("a", "edited")]);
    session.commit(edited.clone()).unwrap();
    assert!(session.cache().contains(&cache_key("alice")));

    // The flush fails; the entry written by the commit stays put.
    clock.advance(Duration::milliseconds(350));
    session.remote_mut().set_fail_writes(true);
    block_on(session.tick());
    assert!(session.cache().contains(&cache_key("alice")));
    assert_eq!(session.remote().write_count(), 0);

    // No timer retry: time passing alone changes nothing.
    session.remote_mut().set_fail_writes(false);
    clock.advance(Duration::seconds(60));
    block_on(session.tick());
    assert_eq!(session.remote().write_count(), 0);

    // The next mutation re-arms the debounce and resolves it.
    session.commit(edited.clone()).unwrap();
    clock.advance(Duration::milliseconds(350));
    block_on(session.tick());
    assert_eq!(session.remote().write_count(), 1);
    assert!(!session.cache().contains(&cache_key("alice")));
}

#[test]
fn cache_entry_for_a_different_owner_is_discarded() {
    let remote = remote_with("alice", &Notes::with(&[("a", "remote")]), base_time());
    let mut cache = MemoryCache::new();
    // An entry under alice's key but stamped with another identity.
    cache.write_raw(
        &cache_key("alice"),
        &cache_entry_bytes(
            &Notes::with(&[("a", "someone else's data")]),
            base_time() + Duration::seconds(30),
            "bob",
        ),
    );

    let (mut session, _clock) = new_session(cache, remote);
    let adopted = block_on(session.sign_in("alice")).clone();
    assert_eq!(adopted, Notes::with(&[("a", "remote")]));
    assert!(!session.cache().contains(&cache_key("alice")));
}

#[test]
fn sign_out_clears_memory_but_never_the_cache() {
    let remote = remote_with("alice", &Notes::with(&[("a", "0")]), base_time());
    let (mut session, _clock) = new_session(MemoryCache::new(), remote);
    block_on(session.sign_in("alice"));

    session.commit(Notes::with(&[("a", "unflushed")])).unwrap();
    session.sign_out();

    assert_eq!(session.state(), SessionState::Unloaded);
    assert_eq!(session.snapshot().unwrap_err(), SessionError::SignedOut);
    assert_eq!(
        session.commit(Notes::with(&[("a", "x")])),
        Err(SessionError::SignedOut)
    );
    // The unflushed entry is the previous owner's recovery path.
    assert!(session.cache().contains(&cache_key("alice")));
    assert_eq!(session.remote().write_count(), 0);
}

#[test]
fn teardown_flush_ignores_the_remaining_quiet_period() {
    let remote = remote_with("alice", &Notes::with(&[("a", "0")]), base_time());
    let (mut session, _clock) = new_session(MemoryCache::new(), remote);
    block_on(session.sign_in("alice"));

    let parting = Notes::with(&[("a", "parting edit")]);
    session.commit(parting.clone()).unwrap();
    block_on(session.flush());

    assert_eq!(session.remote().write_count(), 1);
    let document = session.remote().document("alice").unwrap();
    assert_eq!(Notes::from_document(&document.fields).unwrap(), parting);
    assert!(!session.cache().contains(&cache_key("alice")));
}

#[test]
fn remote_stamps_never_go_backwards_within_a_session() {
    let remote = remote_with("alice", &Notes::with(&[("a", "0")]), base_time());
    let (mut session, clock) = new_session(MemoryCache::new(), remote);
    block_on(session.sign_in("alice"));

    session.commit(Notes::with(&[("a", "1")])).unwrap();
    clock.advance(Duration::milliseconds(350));
    block_on(session.tick());
    let first = session.remote().document("alice").unwrap().updated_at;

    // Even if the wall clock misbehaves, the next stamp does not regress.
    clock.set(base_time() - Duration::seconds(30));
    session.commit(Notes::with(&[("a", "2")])).unwrap();
    block_on(session.flush());
    let second = session.remote().document("alice").unwrap().updated_at;
    assert!(second >= first);
}

#[test]
fn switching_users_reloads_for_the_new_identity() {
    let remote = remote_with("bob", &Notes::with(&[("b", "bob's notes")]), base_time());
    let (mut session, _clock) = new_session(MemoryCache::new(), remote);

    block_on(session.sign_in("alice"));
    session.commit(Notes::with(&[("a", "alice unflushed")])).unwrap();

    let adopted = block_on(session.sign_in("bob")).clone();
    assert_eq!(adopted, Notes::with(&[("b", "bob's notes")]));
    // Alice's cache entry survives for her next sign-in.
    assert!(session.cache().contains(&cache_key("alice")));
}
