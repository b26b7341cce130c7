//! In-Memory Index
//!
//! One `HashMap` behind one `RwLock`. Reads take the lock shared; every
//! mutation and the expiry sweep take it exclusive, so each operation sees
//! and leaves the map in a whole state.
//!
//! Callers never get a reference into the map: reads hand back clones.
//!
//! The index also tracks whether it changed since the last snapshot taken
//! for persistence. The flag is raised inside the exclusive section of each
//! mutation and cleared inside the shared section that clones the map, so a
//! flush can never clear a change it did not capture.

use crate::storage::entry::{Patch, Value};
use crate::storage::error::{StorageError, StorageResult};
use crate::storage::snapshot::Snapshot;
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

/// Key → value map guarded by a single reader/writer lock.
#[derive(Debug, Default)]
pub struct Index {
    data: RwLock<HashMap<String, Value>>,
    /// Set when the map differs from the last persisted snapshot
    dirty: AtomicBool,
}

impl Index {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builds an index from a restored snapshot.
    pub fn from_snapshot(entries: Snapshot) -> Self {
        Self {
            data: RwLock::new(entries),
            dirty: AtomicBool::new(false),
        }
    }

    // Every critical section below leaves the map consistent, so a panic in
    // another holder does not invalidate the data.
    fn read(&self) -> RwLockReadGuard<'_, HashMap<String, Value>> {
        self.data.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, HashMap<String, Value>> {
        self.data.write().unwrap_or_else(PoisonError::into_inner)
    }

    /// Inserts a value under a key that must not exist yet.
    pub fn insert_new(&self, key: String, value: Value) -> StorageResult<()> {
        let mut data = self.write();
        if data.contains_key(&key) {
            return Err(StorageError::KeyAlreadyExists);
        }
        data.insert(key, value);
        self.mark_dirty();
        Ok(())
    }

    /// Returns a copy of the value stored under `key`.
    pub fn get(&self, key: &str) -> Option<Value> {
        self.read().get(key).cloned()
    }

    /// Merges `patch` into an existing value and returns the merged copy.
    pub fn update(&self, key: &str, patch: &Patch, now: DateTime<Utc>) -> StorageResult<Value> {
        let mut data = self.write();
        let value = data.get_mut(key).ok_or(StorageError::KeyNotFound)?;
        value.merge(patch, now);
        let merged = value.clone();
        self.mark_dirty();
        Ok(merged)
    }

    /// Removes an existing key.
    pub fn remove(&self, key: &str) -> StorageResult<Value> {
        let mut data = self.write();
        let value = data.remove(key).ok_or(StorageError::KeyNotFound)?;
        self.mark_dirty();
        Ok(value)
    }

    /// Removes every entry whose expiry is strictly before `now`, in one
    /// exclusive critical section. Returns the removed keys.
    pub fn remove_expired(&self, now: DateTime<Utc>) -> Vec<String> {
        let mut data = self.write();
        let mut removed = Vec::new();

        data.retain(|key, value| {
            if value.is_expired_at(now) {
                removed.push(key.clone());
                false
            } else {
                true
            }
        });

        if !removed.is_empty() {
            self.mark_dirty();
        }
        removed
    }

    /// Clones the whole map if it changed since the last call, clearing the
    /// dirty flag while the shared lock is still held.
    pub fn take_dirty_snapshot(&self) -> Option<Snapshot> {
        let data = self.read();
        if !self.dirty.swap(false, Ordering::AcqRel) {
            return None;
        }
        Some(data.clone())
    }

    /// Clones the whole map.
    pub fn snapshot(&self) -> Snapshot {
        self.read().clone()
    }

    /// Flags the map as needing persistence, e.g. after a failed write.
    pub fn mark_dirty(&self) {
        self.dirty.store(true, Ordering::Release);
    }

    /// Returns true if the map changed since the last dirty snapshot.
    pub fn is_dirty(&self) -> bool {
        self.dirty.load(Ordering::Acquire)
    }

    /// Number of stored keys.
    pub fn len(&self) -> usize {
        self.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.read().is_empty()
    }
}
