//! The local durable cache: a synchronous, best-effort byte store.
//!
//! This is the write-ahead safety net. A write that fails (quota, disabled
//! storage, unwritable directory) is logged and dropped; the engine proceeds
//! as if the cache were empty. Nothing here is allowed to surface an error to
//! a mutation caller.

use std::collections::BTreeMap;
use std::path::PathBuf;

pub trait LocalCache {
    fn read_raw(&self, key: &str) -> Option<Vec<u8>>;
    fn write_raw(&mut self, key: &str, bytes: &[u8]);
    fn delete_raw(&mut self, key: &str);
}

/// In-memory cache, used in tests and by hosts that opt out of durability.
#[derive(Debug, Clone, Default)]
pub struct MemoryCache {
    entries: BTreeMap<String, Vec<u8>>,
    writes: usize,
}

impl MemoryCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn contains(&self, key: &str) -> bool {
        self.entries.contains_key(key)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Total number of writes ever performed, including overwrites.
    pub fn write_count(&self) -> usize {
        self.writes
    }
}

impl LocalCache for MemoryCache {
    fn read_raw(&self, key: &str) -> Option<Vec<u8>> {
        self.entries.get(key).cloned()
    }

    fn write_raw(&mut self, key: &str, bytes: &[u8]) {
        self.writes += 1;
        self.entries.insert(key.to_string(), bytes.to_vec());
    }

    fn delete_raw(&mut self, key: &str) {
        self.entries.remove(key);
    }
}

/// Directory-backed cache: one file per key under a root directory.
#[derive(Debug, Clone)]
pub struct DirCache {
    root: PathBuf,
}

impl DirCache {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    fn path_for(&self, key: &str) -> PathBuf {
        // Keys are engine-generated (`user__{owner}`), but owner ids come
        // from an external auth provider, so anything outside a conservative
        // set is escaped.
        let name: String = key
            .chars()
            .map(|c| {
                if c.is_ascii_alphanumeric() || c == '-' || c == '_' || c == '.' {
                    c
                } else {
                    '_'
                }
            })
            .collect();
        self.root.join(format!("{name}.json"))
    }
}

impl LocalCache for DirCache {
    fn read_raw(&self, key: &str) -> Option<Vec<u8>> {
        std::fs::read(self.path_for(key)).ok()
    }

    fn write_raw(&mut self, key: &str, bytes: &[u8]) {
        if let Err(e) = std::fs::create_dir_all(&self.root) {
            log::warn!("Failed to create cache directory {:?}: {e}", self.root);
            return;
        }
        if let Err(e) = std::fs::write(self.path_for(key), bytes) {
            log::warn!("Failed to write cache entry {key}: {e}");
        }
    }

    fn delete_raw(&mut self, key: &str) {
        if let Err(e) = std::fs::remove_file(self.path_for(key)) {
            if e.kind() != std::io::ErrorKind::NotFound {
                log::warn!("Failed to delete cache entry {key}: {e}");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn dir_cache_round_trips_and_deletes() {
        let dir = tempfile::tempdir().unwrap();
        let mut cache = DirCache::new(dir.path());

        assert_eq!(cache.read_raw("user__alice"), None);

        cache.write_raw("user__alice", b"{\"hello\":1}");
        assert_eq!(cache.read_raw("user__alice").as_deref(), Some(&b"{\"hello\":1}"[..]));

        cache.delete_raw("user__alice");
        assert_eq!(cache.read_raw("user__alice"), None);
        // Deleting a missing entry is fine.
        cache.delete_raw("user__alice");
    }

    #[test]
    fn dir_cache_escapes_hostile_keys() {
        let dir = tempfile::tempdir().unwrap();
        let mut cache = DirCache::new(dir.path());

        cache.write_raw("user__../../etc/passwd", b"x");
        assert_eq!(
            cache.read_raw("user__../../etc/passwd").as_deref(),
            Some(&b"x"[..])
        );
        // The escaped file must live inside the root.
        let entries: Vec<_> = std::fs::read_dir(dir.path()).unwrap().collect();
        assert_eq!(entries.len(), 1);
    }
}
