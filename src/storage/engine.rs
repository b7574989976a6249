//! Thread-Safe Key-Value Store with Expiry Support
//!
//! This module implements the core store for LineKV: a map from key to
//! value plus a second map from key to absolute expiration instant for keys
//! that carry a TTL. Both maps sit behind a single `RwLock`, so a reader can
//! never observe a value moved by `rename` without its expiration, or the
//! other way around.
//!
//! ## Design Decisions
//!
//! 1. **One lock, two maps**: every mutation takes the write lock over the
//!    combined state; pure reads take the read lock.
//! 2. **Lazy Expiry**: a read that finds an expired key escalates to the
//!    write lock, re-checks, and removes it before reporting a miss.
//! 3. **Active Expiry**: `sweep_expired` is called periodically by the
//!    background sweeper to reclaim keys nobody reads again.
//! 4. **Wall-clock instants**: expirations are `SystemTime`s read through a
//!    [`Clock`], so they survive a snapshot and tests can fake time.
//!
//! ## State Layout
//!
//! ```text
//! ┌──────────────────────────────────────────────┐
//! │                    Store                     │
//! │  RwLock<Keyspace>                            │
//! │   ├─ values:      HashMap<String, String>    │
//! │   └─ expirations: HashMap<String, SystemTime>│
//! └──────────────────────────────────────────────┘
//! ```
//!
//! Invariant: every key in `expirations` is also in `values`.

use crate::storage::clock::{Clock, SystemClock};
use crate::storage::snapshot::Snapshot;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};
use std::time::{Duration, SystemTime};
use tracing::trace;

/// TTL reply for a key that exists without an expiration.
pub const TTL_NO_EXPIRY: i64 = -1;

/// TTL reply for a key that is absent or already expired.
pub const TTL_MISSING: i64 = -2;

/// The two mappings guarded together by the store lock.
#[derive(Debug, Default)]
struct Keyspace {
    values: HashMap<String, String>,
    expirations: HashMap<String, SystemTime>,
}

impl Keyspace {
    #[inline]
    fn is_expired(&self, key: &str, now: SystemTime) -> bool {
        self.expirations.get(key).is_some_and(|at| *at <= now)
    }

    fn remove(&mut self, key: &str) -> Option<String> {
        self.expirations.remove(key);
        self.values.remove(key)
    }

    /// Removes `key` if its expiration has passed. Returns true if it did.
    fn purge_if_expired(&mut self, key: &str, now: SystemTime) -> bool {
        if self.is_expired(key, now) {
            self.remove(key);
            true
        } else {
            false
        }
    }
}

/// Result of [`Store::rename_if_absent`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RenameOutcome {
    /// The key was moved.
    Renamed,
    /// The target already holds a live value; nothing changed.
    TargetExists,
    /// The source key is absent or expired; nothing changed.
    SourceMissing,
}

/// The main key-value store.
///
/// Designed to be wrapped in an `Arc` and shared by every connection
/// handler, the expiry sweeper and deferred deletions.
///
/// # Example
///
/// ```
/// use linekv::storage::Store;
/// use std::time::Duration;
///
/// let store = Store::new();
///
/// store.set("name", "Ariz");
/// assert_eq!(store.get("name"), Some("Ariz".to_string()));
///
/// store.set_with_ttl("session", "abc123", Duration::from_secs(60));
/// assert!(store.ttl("session") > 0);
/// assert_eq!(store.ttl("name"), -1);
/// assert_eq!(store.ttl("missing"), -2);
/// ```
pub struct Store {
    keyspace: RwLock<Keyspace>,
    clock: Arc<dyn Clock>,
    /// Keys removed by lazy or active expiry since startup
    expired_count: AtomicU64,
}

impl std::fmt::Debug for Store {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let keyspace = self.read_keyspace();
        f.debug_struct("Store")
            .field("keys", &keyspace.values.len())
            .field("expiring", &keyspace.expirations.len())
            .field("expired_count", &self.expired_count.load(Ordering::Relaxed))
            .finish()
    }
}

impl Default for Store {
    fn default() -> Self {
        Self::new()
    }
}

impl Store {
    /// Creates an empty store on the system clock.
    pub fn new() -> Self {
        Self::with_clock(Arc::new(SystemClock))
    }

    /// Creates an empty store reading time from `clock`.
    pub fn with_clock(clock: Arc<dyn Clock>) -> Self {
        Self {
            keyspace: RwLock::new(Keyspace::default()),
            clock,
            expired_count: AtomicU64::new(0),
        }
    }

    fn read_keyspace(&self) -> RwLockReadGuard<'_, Keyspace> {
        self.keyspace.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write_keyspace(&self) -> RwLockWriteGuard<'_, Keyspace> {
        self.keyspace.write().unwrap_or_else(PoisonError::into_inner)
    }

    fn record_expired(&self, count: u64) {
        if count > 0 {
            self.expired_count.fetch_add(count, Ordering::Relaxed);
        }
    }

    /// Runs `read` against a live key.
    ///
    /// Takes the read lock first. If the key turns out to be expired the
    /// read lock is dropped, the write lock taken, and the key re-checked:
    /// another writer may have refreshed it in between.
    fn read_live<T>(&self, key: &str, read: impl FnOnce(&Keyspace, SystemTime) -> T) -> Option<T> {
        {
            let keyspace = self.read_keyspace();
            let now = self.clock.now();
            if !keyspace.values.contains_key(key) {
                return None;
            }
            if !keyspace.is_expired(key, now) {
                return Some(read(&*keyspace, now));
            }
        }

        let mut keyspace = self.write_keyspace();
        let now = self.clock.now();
        if keyspace.purge_if_expired(key, now) {
            self.record_expired(1);
            trace!(key = %key, "Lazily expired key");
            return None;
        }
        if !keyspace.values.contains_key(key) {
            return None;
        }
        Some(read(&*keyspace, now))
    }

    /// Sets a key-value pair without expiry.
    ///
    /// Overwrites any existing value and cancels any TTL the key had.
    pub fn set(&self, key: impl Into<String>, value: impl Into<String>) {
        let key = key.into();
        let mut keyspace = self.write_keyspace();
        keyspace.expirations.remove(&key);
        keyspace.values.insert(key, value.into());
    }

    /// Sets a key-value pair that expires after `ttl`.
    ///
    /// An expiration that cannot be represented (absurdly large `ttl`)
    /// leaves the key without one.
    pub fn set_with_ttl(&self, key: impl Into<String>, value: impl Into<String>, ttl: Duration) {
        let key = key.into();
        let mut keyspace = self.write_keyspace();
        match self.clock.now().checked_add(ttl) {
            Some(at) => keyspace.expirations.insert(key.clone(), at),
            None => keyspace.expirations.remove(&key),
        };
        keyspace.values.insert(key, value.into());
    }

    /// Gets the value for a key.
    ///
    /// Returns `None` if the key doesn't exist or has expired; an expired
    /// key is removed as a side effect.
    pub fn get(&self, key: &str) -> Option<String> {
        self.read_live(key, |keyspace, _| keyspace.values.get(key).cloned())
            .flatten()
    }

    /// Checks if a key exists (and is not expired).
    pub fn contains(&self, key: &str) -> bool {
        self.read_live(key, |_, _| ()).is_some()
    }

    /// Returns the type of a key: `"string"` or `"none"`.
    pub fn key_type(&self, key: &str) -> &'static str {
        if self.contains(key) {
            "string"
        } else {
            "none"
        }
    }

    /// Gets the remaining TTL for a key in whole seconds.
    ///
    /// # Returns
    ///
    /// - seconds remaining (rounded down) if the key has an expiry
    /// - `-1` if the key exists but has no expiry
    /// - `-2` if the key doesn't exist or has expired
    pub fn ttl(&self, key: &str) -> i64 {
        self.read_live(key, |keyspace, now| match keyspace.expirations.get(key) {
            Some(at) => at
                .duration_since(now)
                .map(|remaining| remaining.as_secs() as i64)
                .unwrap_or(0),
            None => TTL_NO_EXPIRY,
        })
        .unwrap_or(TTL_MISSING)
    }

    /// Removes the expiry from a key, keeping its value.
    ///
    /// # Returns
    ///
    /// Returns `true` if an expiry was removed, `false` if the key doesn't
    /// exist or had none.
    pub fn persist(&self, key: &str) -> bool {
        let mut keyspace = self.write_keyspace();
        if keyspace.purge_if_expired(key, self.clock.now()) {
            self.record_expired(1);
            return false;
        }
        keyspace.expirations.remove(key).is_some()
    }

    /// Deletes a key together with its expiry.
    ///
    /// Returns `true` if the key was deleted, `false` if it didn't exist.
    pub fn delete(&self, key: &str) -> bool {
        let mut keyspace = self.write_keyspace();
        if keyspace.purge_if_expired(key, self.clock.now()) {
            self.record_expired(1);
            return false;
        }
        keyspace.remove(key).is_some()
    }

    /// Deletes several keys, returning how many existed.
    pub fn delete_many<S: AsRef<str>>(&self, keys: &[S]) -> usize {
        keys.iter().filter(|key| self.delete(key.as_ref())).count()
    }

    /// Atomically moves a key's value and expiry to `new_key`.
    ///
    /// Any value or expiry previously held by `new_key` is replaced.
    /// Returns `false` if `old_key` doesn't exist.
    pub fn rename(&self, old_key: &str, new_key: &str) -> bool {
        let mut keyspace = self.write_keyspace();
        let now = self.clock.now();
        if keyspace.purge_if_expired(old_key, now) {
            self.record_expired(1);
            return false;
        }
        Self::move_key(&mut keyspace, old_key, new_key)
    }

    /// Like [`rename`](Self::rename), but does nothing if `new_key` holds a
    /// live value.
    pub fn rename_if_absent(&self, old_key: &str, new_key: &str) -> RenameOutcome {
        let mut keyspace = self.write_keyspace();
        let now = self.clock.now();

        let mut expired = 0;
        if keyspace.purge_if_expired(old_key, now) {
            expired += 1;
        }
        if keyspace.purge_if_expired(new_key, now) {
            expired += 1;
        }
        self.record_expired(expired);

        if !keyspace.values.contains_key(old_key) {
            return RenameOutcome::SourceMissing;
        }
        if keyspace.values.contains_key(new_key) {
            return RenameOutcome::TargetExists;
        }
        Self::move_key(&mut keyspace, old_key, new_key);
        RenameOutcome::Renamed
    }

    fn move_key(keyspace: &mut Keyspace, old_key: &str, new_key: &str) -> bool {
        if !keyspace.values.contains_key(old_key) {
            return false;
        }
        if old_key == new_key {
            return true;
        }

        let expiration = keyspace.expirations.remove(old_key);
        let Some(value) = keyspace.values.remove(old_key) else {
            return false;
        };

        keyspace.expirations.remove(new_key);
        if let Some(at) = expiration {
            keyspace.expirations.insert(new_key.to_string(), at);
        }
        keyspace.values.insert(new_key.to_string(), value);
        true
    }

    /// Returns every live key, sorted.
    ///
    /// Sweeps expired keys first so the result never includes a key whose
    /// TTL has lapsed.
    pub fn keys(&self) -> Vec<String> {
        self.sweep_expired();

        let keyspace = self.read_keyspace();
        let mut keys: Vec<String> = keyspace.values.keys().cloned().collect();
        keys.sort_unstable();
        keys
    }

    /// Number of live keys that carry a TTL.
    pub fn keys_with_ttl(&self) -> usize {
        self.sweep_expired();
        self.read_keyspace().expirations.len()
    }

    /// Number of live keys without a TTL.
    pub fn keys_without_ttl(&self) -> usize {
        self.sweep_expired();
        let keyspace = self.read_keyspace();
        keyspace.values.len() - keyspace.expirations.len()
    }

    /// Clears all data from the store.
    pub fn flush(&self) {
        *self.write_keyspace() = Keyspace::default();
    }

    /// Returns the number of stored keys.
    ///
    /// Expired keys that nobody has touched since are still counted until
    /// the next sweep.
    pub fn len(&self) -> usize {
        self.read_keyspace().values.len()
    }

    /// Returns true if the store holds no keys.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Total number of keys removed by expiry since startup.
    pub fn expired_total(&self) -> u64 {
        self.expired_count.load(Ordering::Relaxed)
    }

    /// Removes every key whose expiration has passed.
    ///
    /// This is called by the background expiry sweeper.
    ///
    /// # Returns
    ///
    /// Returns the number of keys that were cleaned up.
    pub fn sweep_expired(&self) -> usize {
        let mut keyspace = self.write_keyspace();
        let now = self.clock.now();

        let expired: Vec<String> = keyspace
            .expirations
            .iter()
            .filter(|(_, at)| **at <= now)
            .map(|(key, _)| key.clone())
            .collect();

        for key in &expired {
            keyspace.remove(key);
        }

        self.record_expired(expired.len() as u64);
        expired.len()
    }

    /// Exports a copy of the full state.
    pub fn snapshot(&self) -> Snapshot {
        let keyspace = self.read_keyspace();
        Snapshot {
            values: keyspace.values.clone(),
            expirations: keyspace.expirations.clone(),
        }
    }

    /// Replaces the full state with `snapshot`.
    ///
    /// Expirations for keys missing from the value map are dropped.
    /// Returns the number of keys now in the store.
    pub fn restore(&self, snapshot: Snapshot) -> usize {
        let Snapshot {
            values,
            mut expirations,
        } = snapshot;
        expirations.retain(|key, _| values.contains_key(key));

        let count = values.len();
        *self.write_keyspace() = Keyspace {
            values,
            expirations,
        };
        count
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::clock::ManualClock;

    fn store_with_clock() -> (Store, Arc<ManualClock>) {
        let clock = Arc::new(ManualClock::new());
        (Store::with_clock(clock.clone()), clock)
    }

    #[test]
    fn test_set_and_get() {
        let store = Store::new();

        store.set("key", "value");
        assert_eq!(store.get("key"), Some("value".to_string()));
    }

    #[test]
    fn test_get_nonexistent() {
        let store = Store::new();
        assert_eq!(store.get("nonexistent"), None);
    }

    #[test]
    fn test_set_clears_ttl() {
        let store = Store::new();

        store.set_with_ttl("key", "v1", Duration::from_secs(100));
        assert!(store.ttl("key") > 0);

        store.set("key", "v2");
        assert_eq!(store.ttl("key"), TTL_NO_EXPIRY);
        assert_eq!(store.get("key"), Some("v2".to_string()));
    }

    #[test]
    fn test_delete() {
        let store = Store::new();

        store.set("key", "value");
        assert!(store.delete("key"));
        assert_eq!(store.get("key"), None);
        assert!(!store.delete("key"));
    }

    #[test]
    fn test_delete_absent_keeps_size() {
        let store = Store::new();
        store.set("a", "1");

        assert!(!store.delete("b"));
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn test_delete_removes_expiry() {
        let store = Store::new();
        store.set_with_ttl("key", "value", Duration::from_secs(100));

        assert!(store.delete("key"));
        assert_eq!(store.keys_with_ttl(), 0);
    }

    #[test]
    fn test_delete_many() {
        let store = Store::new();
        store.set("a", "1");
        store.set("b", "2");

        assert_eq!(store.delete_many(&["a", "b", "c"]), 2);
        assert!(store.is_empty());
    }

    #[test]
    fn test_expiry_with_manual_clock() {
        let (store, clock) = store_with_clock();

        store.set_with_ttl("key", "value", Duration::from_secs(10));
        assert_eq!(store.ttl("key"), 10);

        clock.advance(Duration::from_secs(4));
        assert_eq!(store.ttl("key"), 6);
        assert!(store.contains("key"));

        clock.advance(Duration::from_secs(6));
        assert_eq!(store.get("key"), None);
        assert_eq!(store.ttl("key"), TTL_MISSING);
        assert_eq!(store.len(), 0);
        assert_eq!(store.expired_total(), 1);
    }

    #[test]
    fn test_expired_key_reads_as_absent_everywhere() {
        let (store, clock) = store_with_clock();

        store.set_with_ttl("key", "value", Duration::from_secs(1));
        clock.advance(Duration::from_secs(2));

        assert!(!store.contains("key"));
        assert_eq!(store.key_type("key"), "none");
        assert!(!store.persist("key"));
        assert!(!store.delete("key"));
        assert!(!store.rename("key", "other"));
        assert!(store.keys().is_empty());
    }

    #[test]
    fn test_ttl() {
        let store = Store::new();

        assert_eq!(store.ttl("nonexistent"), TTL_MISSING);

        store.set("persistent", "value");
        assert_eq!(store.ttl("persistent"), TTL_NO_EXPIRY);

        store.set_with_ttl("expiring", "value", Duration::from_secs(100));
        let ttl = store.ttl("expiring");
        assert!((0..=100).contains(&ttl));
    }

    #[test]
    fn test_persist_twice() {
        let store = Store::new();
        store.set_with_ttl("key", "value", Duration::from_secs(60));

        assert!(store.persist("key"));
        assert!(!store.persist("key"));
        assert_eq!(store.ttl("key"), TTL_NO_EXPIRY);
        assert_eq!(store.get("key"), Some("value".to_string()));
    }

    #[test]
    fn test_persist_missing_key() {
        let store = Store::new();
        assert!(!store.persist("missing"));
    }

    #[test]
    fn test_rename_moves_value_and_ttl() {
        let (store, _clock) = store_with_clock();
        store.set_with_ttl("old", "value", Duration::from_secs(30));

        assert!(store.rename("old", "new"));
        assert_eq!(store.get("old"), None);
        assert_eq!(store.get("new"), Some("value".to_string()));
        assert_eq!(store.ttl("new"), 30);
        assert_eq!(store.keys_with_ttl(), 1);
    }

    #[test]
    fn test_rename_overwrites_target_and_its_ttl() {
        let store = Store::new();
        store.set("old", "value");
        store.set_with_ttl("new", "stale", Duration::from_secs(30));

        assert!(store.rename("old", "new"));
        assert_eq!(store.get("new"), Some("value".to_string()));
        assert_eq!(store.ttl("new"), TTL_NO_EXPIRY);
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn test_rename_missing_source() {
        let store = Store::new();
        store.set("new", "keep");

        assert!(!store.rename("old", "new"));
        assert_eq!(store.get("new"), Some("keep".to_string()));
    }

    #[test]
    fn test_rename_onto_itself() {
        let store = Store::new();
        store.set_with_ttl("key", "value", Duration::from_secs(30));

        assert!(store.rename("key", "key"));
        assert_eq!(store.get("key"), Some("value".to_string()));
        assert!(store.ttl("key") > 0);
    }

    #[test]
    fn test_rename_if_absent() {
        let (store, clock) = store_with_clock();
        store.set("a", "1");
        store.set("b", "2");

        assert_eq!(store.rename_if_absent("a", "b"), RenameOutcome::TargetExists);
        assert_eq!(store.get("a"), Some("1".to_string()));
        assert_eq!(store.get("b"), Some("2".to_string()));

        assert_eq!(store.rename_if_absent("a", "c"), RenameOutcome::Renamed);
        assert_eq!(store.get("c"), Some("1".to_string()));

        assert_eq!(
            store.rename_if_absent("missing", "d"),
            RenameOutcome::SourceMissing
        );

        // An expired target does not block the rename
        store.set_with_ttl("e", "dead", Duration::from_secs(1));
        clock.advance(Duration::from_secs(2));
        assert_eq!(store.rename_if_absent("c", "e"), RenameOutcome::Renamed);
        assert_eq!(store.get("e"), Some("1".to_string()));
    }

    #[test]
    fn test_keys_and_flush() {
        let store = Store::new();

        store.set("b", "2");
        store.set("a", "1");
        assert_eq!(store.keys(), vec!["a".to_string(), "b".to_string()]);

        store.flush();
        assert!(store.keys().is_empty());
        assert!(store.is_empty());
    }

    #[test]
    fn test_keys_skips_expired() {
        let (store, clock) = store_with_clock();
        store.set("live", "1");
        store.set_with_ttl("dying", "2", Duration::from_secs(5));

        clock.advance(Duration::from_secs(5));
        assert_eq!(store.keys(), vec!["live".to_string()]);
    }

    #[test]
    fn test_sweep_expired() {
        let (store, clock) = store_with_clock();

        store.set_with_ttl("key1", "value1", Duration::from_secs(1));
        store.set_with_ttl("key2", "value2", Duration::from_secs(1));
        store.set_with_ttl("key3", "value3", Duration::from_secs(100));
        store.set("key4", "value4");

        clock.advance(Duration::from_secs(2));

        assert_eq!(store.sweep_expired(), 2);
        assert_eq!(store.len(), 2);
        assert_eq!(store.keys_with_ttl(), 1);
        assert_eq!(store.keys_without_ttl(), 1);
        assert_eq!(store.expired_total(), 2);
    }

    #[test]
    fn test_snapshot_and_restore() {
        let (store, _clock) = store_with_clock();
        store.set("a", "1");
        store.set_with_ttl("b", "2", Duration::from_secs(50));

        let snapshot = store.snapshot();
        assert_eq!(snapshot.len(), 2);
        assert_eq!(snapshot.expirations.len(), 1);

        let other = Store::with_clock(Arc::new(ManualClock::starting_at(
            snapshot.expirations["b"] - Duration::from_secs(50),
        )));
        other.set("stale", "gone");
        assert_eq!(other.restore(snapshot.clone()), 2);

        assert_eq!(other.get("stale"), None);
        assert_eq!(other.get("a"), Some("1".to_string()));
        assert_eq!(other.ttl("b"), 50);
        assert_eq!(other.snapshot(), snapshot);
    }

    #[test]
    fn test_restore_drops_orphan_expirations() {
        let store = Store::new();
        let mut snapshot = Snapshot::default();
        snapshot.values.insert("a".into(), "1".into());
        snapshot
            .expirations
            .insert("ghost".into(), SystemTime::now() + Duration::from_secs(10));

        store.restore(snapshot);
        assert_eq!(store.keys_with_ttl(), 0);
        assert_eq!(store.keys(), vec!["a".to_string()]);
    }

    #[test]
    fn test_concurrent_distinct_keys() {
        use std::thread;

        let store = Arc::new(Store::new());
        let mut handles = vec![];

        for i in 0..10 {
            let store = Arc::clone(&store);
            handles.push(thread::spawn(move || {
                for j in 0..100 {
                    let key = format!("key-{}-{}", i, j);
                    store.set(key.clone(), "value");
                    store.get(&key);
                }
            }));
        }

        for handle in handles {
            handle.join().unwrap();
        }

        assert_eq!(store.len(), 1000);
    }

    #[test]
    fn test_concurrent_same_key_last_writer_wins() {
        use std::thread;

        let store = Arc::new(Store::new());
        let handles: Vec<_> = (0..16)
            .map(|i| {
                let store = Arc::clone(&store);
                thread::spawn(move || store.set("shared", format!("v{}", i)))
            })
            .collect();

        for handle in handles {
            handle.join().unwrap();
        }

        let value = store.get("shared").unwrap();
        let candidates: Vec<String> = (0..16).map(|i| format!("v{}", i)).collect();
        assert!(candidates.contains(&value));
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn test_concurrent_readers_during_expiry() {
        use std::thread;

        let (store, clock) = store_with_clock();
        let store = Arc::new(store);
        for i in 0..100 {
            store.set_with_ttl(format!("k{}", i), "v", Duration::from_secs(1));
        }
        clock.advance(Duration::from_secs(1));

        let handles: Vec<_> = (0..8)
            .map(|_| {
                let store = Arc::clone(&store);
                thread::spawn(move || {
                    for i in 0..100 {
                        assert_eq!(store.get(&format!("k{}", i)), None);
                    }
                })
            })
            .collect();

        for handle in handles {
            handle.join().unwrap();
        }

        assert!(store.is_empty());
        assert_eq!(store.expired_total(), 100);
    }
}
