//! Storage Engine
//!
//! Composes the in-memory [`Index`] with the [`SnapshotFile`] that backs it.
//!
//! ## Design Decisions
//!
//! 1. **Memory is authoritative**: create/read/update/delete only touch the
//!    index. Disk is brought up to date by [`StorageEngine::flush`], which the
//!    periodic flusher calls on an interval and shutdown calls once more.
//! 2. **One lock**: the index has a single `RwLock`. Reads share it; writes
//!    and the expiry sweep hold it exclusively.
//! 3. **Short flush critical section**: a flush clones the map under the
//!    shared lock and serializes the clone after releasing it, so request
//!    traffic never waits on disk.
//! 4. **One flush at a time**: flushes hold their own mutex from taking the
//!    snapshot until the file is replaced, so an older snapshot can never be
//!    renamed over a newer one.
//! 5. **Blocking restore**: [`StorageEngine::open`] reads the snapshot before
//!    returning; a decode failure fails construction.
//!
//! ## Data Flow
//!
//! ```text
//!   create/update/delete ──► Index (write lock, marks dirty)
//!   read ──────────────────► Index (read lock, returns a copy)
//!   sweep ─────────────────► Index (write lock, drops expired)
//!   flush ─────────────────► Index (read lock, clone) ──► SnapshotFile
//! ```

use crate::storage::entry::{Entry, Patch};
use crate::storage::error::{StorageError, StorageResult};
use crate::storage::index::Index;
use crate::storage::snapshot::SnapshotFile;
use chrono::{DateTime, Utc};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Mutex, PoisonError};
use tracing::{error, info};

/// Outcome of a flush.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Flushed {
    /// Nothing changed since the last flush; the file was left alone
    Clean,
    /// A new snapshot was written
    Written { entries: usize, bytes: usize },
}

/// Counters exposed through `INFO`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StorageStats {
    pub keys: u64,
    pub creates: u64,
    pub reads: u64,
    pub updates: u64,
    pub deletes: u64,
    pub expired: u64,
    pub flushes: u64,
    pub flush_failures: u64,
}

/// The storage engine.
///
/// Wrap it in an `Arc` and share it between connection tasks, the
/// [`ExpirySweeper`](crate::storage::ExpirySweeper) and the
/// [`PeriodicFlusher`](crate::storage::PeriodicFlusher).
///
/// # Example
///
/// ```no_run
/// use stashkv::storage::{Entry, Patch, StorageEngine};
/// use chrono::{Duration, Utc};
///
/// let engine = StorageEngine::open("data.json")?;
/// let now = Utc::now();
///
/// engine.create(Entry::from_parts("a", "1", now, now + Duration::hours(1)))?;
/// assert_eq!(engine.read("a")?.value.data, "1");
///
/// engine.update("a", &Patch::new("2", None))?;
/// engine.delete("a")?;
/// engine.flush()?;
/// # Ok::<(), stashkv::storage::StorageError>(())
/// ```
pub struct StorageEngine {
    index: Index,
    file: SnapshotFile,
    flush_lock: Mutex<()>,

    creates: AtomicU64,
    reads: AtomicU64,
    updates: AtomicU64,
    deletes: AtomicU64,
    expired: AtomicU64,
    flushes: AtomicU64,
    flush_failures: AtomicU64,
}

impl std::fmt::Debug for StorageEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StorageEngine")
            .field("path", &self.file.path())
            .field("keys", &self.index.len())
            .field("dirty", &self.index.is_dirty())
            .finish()
    }
}

impl StorageEngine {
    /// Opens the engine on a backing file, restoring its contents.
    ///
    /// A missing file is created empty. Any read or decode failure is
    /// returned to the caller.
    pub fn open(path: impl Into<PathBuf>) -> StorageResult<Self> {
        let file = SnapshotFile::new(path);
        let entries = file.read().inspect_err(|e| {
            error!(path = %file.path().display(), error = %e, "Failed to restore storage");
        })?;

        info!(
            path = %file.path().display(),
            entries = entries.len(),
            "Storage restored from snapshot"
        );

        Ok(Self {
            index: Index::from_snapshot(entries),
            file,
            flush_lock: Mutex::new(()),
            creates: AtomicU64::new(0),
            reads: AtomicU64::new(0),
            updates: AtomicU64::new(0),
            deletes: AtomicU64::new(0),
            expired: AtomicU64::new(0),
            flushes: AtomicU64::new(0),
            flush_failures: AtomicU64::new(0),
        })
    }

    /// Stores a new entry.
    ///
    /// `updated_at` is set to now; `expires_at` is stored as given.
    ///
    /// # Errors
    ///
    /// [`StorageError::KeyAlreadyExists`] if the key is already stored.
    pub fn create(&self, entry: Entry) -> StorageResult<()> {
        let Entry { key, mut value } = entry;
        value.updated_at = Utc::now();

        self.index.insert_new(key, value)?;
        self.creates.fetch_add(1, Ordering::Relaxed);
        Ok(())
    }

    /// Returns a copy of the entry stored under `key`.
    ///
    /// Entries past their expiry are still returned until the sweeper
    /// removes them.
    pub fn read(&self, key: &str) -> StorageResult<Entry> {
        self.reads.fetch_add(1, Ordering::Relaxed);

        self.index
            .get(key)
            .map(|value| Entry::new(key, value))
            .ok_or(StorageError::KeyNotFound)
    }

    /// Merges `patch` into the entry stored under `key` and returns the
    /// merged entry.
    ///
    /// Empty data keeps the stored data, a missing expiry keeps the stored
    /// expiry. `updated_at` always moves to now. An entry past its expiry
    /// that has not been swept yet can still be updated, including given a
    /// new expiry.
    pub fn update(&self, key: &str, patch: &Patch) -> StorageResult<Entry> {
        let value = self.index.update(key, patch, Utc::now())?;
        self.updates.fetch_add(1, Ordering::Relaxed);
        Ok(Entry::new(key, value))
    }

    /// Removes the entry stored under `key`.
    pub fn delete(&self, key: &str) -> StorageResult<()> {
        self.index.remove(key)?;
        self.deletes.fetch_add(1, Ordering::Relaxed);
        Ok(())
    }

    /// Removes every entry that expired strictly before now.
    ///
    /// Returns the removed keys.
    pub fn sweep_expired(&self) -> Vec<String> {
        self.sweep_expired_at(Utc::now())
    }

    /// Removes every entry that expired strictly before `now`.
    pub fn sweep_expired_at(&self, now: DateTime<Utc>) -> Vec<String> {
        let removed = self.index.remove_expired(now);
        if !removed.is_empty() {
            self.expired
                .fetch_add(removed.len() as u64, Ordering::Relaxed);
        }
        removed
    }

    /// Writes the index to the backing file if it changed since the last
    /// flush.
    ///
    /// Concurrent callers are serialized. On failure the index stays dirty,
    /// so the next flush tries again.
    pub fn flush(&self) -> StorageResult<Flushed> {
        let _flushing = self.flush_lock.lock().unwrap_or_else(PoisonError::into_inner);

        let Some(snapshot) = self.index.take_dirty_snapshot() else {
            return Ok(Flushed::Clean);
        };

        match self.file.write(&snapshot) {
            Ok(bytes) => {
                self.flushes.fetch_add(1, Ordering::Relaxed);
                Ok(Flushed::Written {
                    entries: snapshot.len(),
                    bytes,
                })
            }
            Err(e) => {
                self.index.mark_dirty();
                self.flush_failures.fetch_add(1, Ordering::Relaxed);
                Err(e)
            }
        }
    }

    /// Returns true if there are changes not yet written to disk.
    pub fn is_dirty(&self) -> bool {
        self.index.is_dirty()
    }

    /// Number of stored keys, including expired ones not yet swept.
    pub fn len(&self) -> usize {
        self.index.len()
    }

    pub fn is_empty(&self) -> bool {
        self.index.is_empty()
    }

    /// Path of the backing file.
    pub fn path(&self) -> &Path {
        self.file.path()
    }

    pub fn stats(&self) -> StorageStats {
        StorageStats {
            keys: self.len() as u64,
            creates: self.creates.load(Ordering::Relaxed),
            reads: self.reads.load(Ordering::Relaxed),
            updates: self.updates.load(Ordering::Relaxed),
            deletes: self.deletes.load(Ordering::Relaxed),
            expired: self.expired.load(Ordering::Relaxed),
            flushes: self.flushes.load(Ordering::Relaxed),
            flush_failures: self.flush_failures.load(Ordering::Relaxed),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::entry::Value;
    use chrono::Duration;
    use std::sync::Arc;
    use std::thread;
    use tempfile::TempDir;

    fn open_temp() -> (TempDir, StorageEngine) {
        let dir = TempDir::new().unwrap();
        let engine = StorageEngine::open(dir.path().join("data.json")).unwrap();
        (dir, engine)
    }

    fn entry(key: &str, data: &str, ttl: Duration) -> Entry {
        let now = Utc::now();
        Entry::from_parts(key, data, now, now + ttl)
    }

    #[test]
    fn test_create_and_read() {
        let (_dir, engine) = open_temp();

        engine.create(entry("a", "1", Duration::hours(1))).unwrap();

        let read = engine.read("a").unwrap();
        assert_eq!(read.key, "a");
        assert_eq!(read.value.data, "1");
    }

    #[test]
    fn test_create_sets_updated_at() {
        let (_dir, engine) = open_temp();
        let stale = Utc::now() - Duration::days(3);
        let expires = Utc::now() + Duration::hours(1);

        engine
            .create(Entry::from_parts("a", "1", stale, expires))
            .unwrap();

        let read = engine.read("a").unwrap();
        assert!(read.value.updated_at > stale);
        assert_eq!(read.value.expires_at, expires);
    }

    #[test]
    fn test_create_twice_fails() {
        let (_dir, engine) = open_temp();

        engine.create(entry("a", "1", Duration::hours(1))).unwrap();
        let err = engine
            .create(entry("a", "2", Duration::hours(1)))
            .unwrap_err();

        assert!(matches!(err, StorageError::KeyAlreadyExists));
        assert_eq!(engine.read("a").unwrap().value.data, "1");
    }

    #[test]
    fn test_missing_key_not_found_everywhere() {
        let (_dir, engine) = open_temp();

        assert!(matches!(engine.read("x"), Err(StorageError::KeyNotFound)));
        assert!(matches!(
            engine.update("x", &Patch::new("v", None)),
            Err(StorageError::KeyNotFound)
        ));
        assert!(matches!(engine.delete("x"), Err(StorageError::KeyNotFound)));
    }

    #[test]
    fn test_deleted_key_not_found_everywhere() {
        let (_dir, engine) = open_temp();
        engine.create(entry("x", "1", Duration::hours(1))).unwrap();
        engine.delete("x").unwrap();

        assert!(matches!(engine.read("x"), Err(StorageError::KeyNotFound)));
        assert!(matches!(
            engine.update("x", &Patch::default()),
            Err(StorageError::KeyNotFound)
        ));
        assert!(matches!(engine.delete("x"), Err(StorageError::KeyNotFound)));

        // and the key can be created again
        engine.create(entry("x", "2", Duration::hours(1))).unwrap();
    }

    #[test]
    fn test_update_empty_patch_keeps_value() {
        let (_dir, engine) = open_temp();
        engine.create(entry("k", "v", Duration::hours(1))).unwrap();
        let before = engine.read("k").unwrap().value;

        engine.update("k", &Patch::default()).unwrap();

        let after = engine.read("k").unwrap().value;
        assert_eq!(after.data, before.data);
        assert_eq!(after.expires_at, before.expires_at);
        assert!(after.updated_at >= before.updated_at);
    }

    #[test]
    fn test_update_data_only() {
        let (_dir, engine) = open_temp();
        engine.create(entry("k", "v", Duration::hours(1))).unwrap();
        let expires = engine.read("k").unwrap().value.expires_at;

        let merged = engine.update("k", &Patch::new("v2", None)).unwrap();

        assert_eq!(merged.value.data, "v2");
        assert_eq!(merged.value.expires_at, expires);
        assert_eq!(engine.read("k").unwrap(), merged);
    }

    #[test]
    fn test_update_can_extend_expired_unswept_entry() {
        let (_dir, engine) = open_temp();
        engine.create(entry("k", "v", -Duration::seconds(5))).unwrap();

        // not swept yet, so still present
        assert!(engine.read("k").is_ok());

        let later = Utc::now() + Duration::hours(1);
        engine.update("k", &Patch::new("", Some(later))).unwrap();

        assert!(engine.sweep_expired().is_empty());
        assert_eq!(engine.read("k").unwrap().value.expires_at, later);
    }

    #[test]
    fn test_sweep_removes_only_expired() {
        let (_dir, engine) = open_temp();
        engine.create(entry("old", "1", -Duration::seconds(1))).unwrap();
        engine.create(entry("new", "2", Duration::hours(1))).unwrap();

        let removed = engine.sweep_expired();

        assert_eq!(removed, vec!["old".to_string()]);
        assert!(matches!(engine.read("old"), Err(StorageError::KeyNotFound)));
        assert!(engine.read("new").is_ok());
        assert_eq!(engine.stats().expired, 1);
    }

    #[test]
    fn test_flush_and_reopen() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("data.json");

        let before = {
            let engine = StorageEngine::open(&path).unwrap();
            for i in 0..50 {
                engine
                    .create(entry(&format!("key{i}"), &format!("v{i}"), Duration::hours(1)))
                    .unwrap();
            }
            engine.update("key7", &Patch::new("seven", None)).unwrap();
            engine.delete("key9").unwrap();

            assert!(matches!(
                engine.flush().unwrap(),
                Flushed::Written { entries: 49, .. }
            ));
            engine.index.snapshot()
        };

        let reopened = StorageEngine::open(&path).unwrap();
        assert_eq!(reopened.index.snapshot(), before);
        assert_eq!(reopened.read("key7").unwrap().value.data, "seven");
        assert!(!reopened.is_dirty());
    }

    #[test]
    fn test_unflushed_changes_are_not_on_disk() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("data.json");

        {
            let engine = StorageEngine::open(&path).unwrap();
            engine.create(entry("a", "1", Duration::hours(1))).unwrap();
        }

        assert!(StorageEngine::open(&path).unwrap().is_empty());
    }

    #[test]
    fn test_flush_clean_is_noop() {
        let (_dir, engine) = open_temp();
        assert_eq!(engine.flush().unwrap(), Flushed::Clean);

        engine.create(entry("a", "1", Duration::hours(1))).unwrap();
        assert!(matches!(engine.flush().unwrap(), Flushed::Written { .. }));
        assert_eq!(engine.flush().unwrap(), Flushed::Clean);
        assert_eq!(engine.stats().flushes, 1);
    }

    #[test]
    fn test_failed_flush_stays_dirty() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("data.json");
        let engine = StorageEngine::open(&path).unwrap();
        engine.create(entry("a", "1", Duration::hours(1))).unwrap();

        // a directory in place of the temp file makes the write fail
        let mut tmp = path.clone().into_os_string();
        tmp.push(".tmp");
        std::fs::create_dir(&tmp).unwrap();

        let err = engine.flush().unwrap_err();
        assert!(matches!(err, StorageError::Io(_)));
        assert!(engine.is_dirty());
        assert_eq!(engine.stats().flush_failures, 1);

        std::fs::remove_dir(&tmp).unwrap();
        assert!(matches!(engine.flush().unwrap(), Flushed::Written { .. }));
    }

    #[test]
    fn test_concurrent_flushes_leave_latest_state_on_disk() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("data.json");
        let engine = Arc::new(StorageEngine::open(&path).unwrap());
        let mut handles = vec![];

        for t in 0..4 {
            let engine = Arc::clone(&engine);
            handles.push(thread::spawn(move || {
                let mut failures = 0;
                for i in 0..50 {
                    engine
                        .create(entry(&format!("t{t}:k{i}"), "v", Duration::hours(1)))
                        .unwrap();
                    if engine.flush().is_err() {
                        failures += 1;
                    }
                }
                failures
            }));
        }

        let failures: usize = handles.into_iter().map(|h| h.join().unwrap()).sum();
        assert_eq!(failures, 0);
        assert_eq!(engine.stats().flush_failures, 0);

        // every thread flushed after its last create, so nothing is pending
        assert!(!engine.is_dirty());
        assert_eq!(engine.flush().unwrap(), Flushed::Clean);

        let reopened = StorageEngine::open(&path).unwrap();
        assert_eq!(reopened.len(), 4 * 50);
        assert_eq!(reopened.index.snapshot(), engine.index.snapshot());
    }

    #[test]
    fn test_open_corrupt_file_fails() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("data.json");
        std::fs::write(&path, b"not json").unwrap();

        let err = StorageEngine::open(&path).unwrap_err();
        assert!(err.is_encoding());
    }

    #[test]
    fn test_open_reads_legacy_snapshot() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("data.json");
        std::fs::write(
            &path,
            br#"{"a":{"data":"1","updated_at":"2024-01-01T00:00:00Z","expires_at":"2099-01-01T00:00:00Z"}}"#,
        )
        .unwrap();

        let engine = StorageEngine::open(&path).unwrap();
        assert_eq!(engine.read("a").unwrap().value.data, "1");
    }

    #[test]
    fn test_scenario() {
        let (_dir, engine) = open_temp();

        engine.create(entry("a", "1", Duration::hours(1))).unwrap();
        let created = engine.read("a").unwrap();
        assert_eq!(created.value.data, "1");

        engine.update("a", &Patch::new("2", None)).unwrap();
        let updated = engine.read("a").unwrap();
        assert_eq!(updated.value.data, "2");
        assert_eq!(updated.value.expires_at, created.value.expires_at);

        engine.delete("a").unwrap();
        assert!(matches!(engine.read("a"), Err(StorageError::KeyNotFound)));
    }

    #[test]
    fn test_concurrent_disjoint_keys() {
        let (_dir, engine) = open_temp();
        let engine = Arc::new(engine);
        let mut handles = vec![];

        for t in 0..8 {
            let engine = Arc::clone(&engine);
            handles.push(thread::spawn(move || {
                for i in 0..200 {
                    let key = format!("t{t}:k{i}");
                    engine.create(entry(&key, "0", Duration::hours(1))).unwrap();
                    engine.update(&key, &Patch::new("1", None)).unwrap();
                    assert_eq!(engine.read(&key).unwrap().value.data, "1");
                    if i % 2 == 0 {
                        engine.delete(&key).unwrap();
                    }
                }
            }));
        }

        for handle in handles {
            handle.join().unwrap();
        }

        assert_eq!(engine.len(), 8 * 100);
        assert_eq!(engine.stats().updates, 8 * 200);
    }

    #[test]
    fn test_concurrent_create_same_key() {
        let (_dir, engine) = open_temp();
        let engine = Arc::new(engine);
        let mut handles = vec![];

        for t in 0..16 {
            let engine = Arc::clone(&engine);
            handles.push(thread::spawn(move || {
                engine.create(entry("shared", &t.to_string(), Duration::hours(1)))
            }));
        }

        let results: Vec<_> = handles.into_iter().map(|h| h.join().unwrap()).collect();
        let ok = results.iter().filter(|r| r.is_ok()).count();
        let exists = results
            .iter()
            .filter(|r| matches!(r, Err(StorageError::KeyAlreadyExists)))
            .count();

        assert_eq!(ok, 1);
        assert_eq!(exists, 15);
    }

    #[test]
    fn test_read_copy_cannot_mutate_engine() {
        let (_dir, engine) = open_temp();
        engine.create(entry("a", "1", Duration::hours(1))).unwrap();

        let mut copy = engine.read("a").unwrap();
        copy.value = Value::new("hacked", Utc::now(), Utc::now());

        assert_eq!(engine.read("a").unwrap().value.data, "1");
    }
}
