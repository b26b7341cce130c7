//! Persistent Backing Store
//!
//! Translates the whole index to and from a single JSON file. There is no
//! log and no partial update: every write replaces the file with the full
//! state, every read decodes the full state.
//!
//! ## File Format
//!
//! ```text
//! {
//!   "version": 1,
//!   "entries": {
//!     "<key>": {"data": "...", "updated_at": "<rfc3339>", "expires_at": "<rfc3339>"},
//!     ...
//!   }
//! }
//! ```
//!
//! A bare `{"<key>": {...}}` mapping (the unversioned layout) and a
//! zero-length file are also accepted on read.
//!
//! ## Atomic Replace
//!
//! `write()` serializes into `<file>.tmp`, syncs it, renames it over the
//! target, then syncs the parent directory so the rename itself is durable.
//! After a crash the file holds either the previous snapshot or the new one,
//! never a torn mix. Directory sync is skipped on platforms that cannot open
//! a directory as a file.

use crate::storage::entry::Value;
use crate::storage::error::{StorageError, StorageResult};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fs::{self, File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use tracing::{debug, error};

/// Snapshot format written by this build.
pub const SNAPSHOT_VERSION: u32 = 1;

/// The full key → value mapping as it is persisted.
pub type Snapshot = HashMap<String, Value>;

/// Versioned envelope written to disk.
#[derive(Serialize)]
struct Envelope<'a> {
    version: u32,
    entries: &'a Snapshot,
}

/// Every layout `read()` understands.
#[derive(Deserialize)]
#[serde(untagged)]
enum OnDisk {
    Versioned { version: u32, entries: Snapshot },
    Legacy(Snapshot),
}

/// Owner of the backing file.
#[derive(Debug, Clone)]
pub struct SnapshotFile {
    path: PathBuf,
}

impl SnapshotFile {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Path of the backing file.
    pub fn path(&self) -> &Path {
        &self.path
    }

    fn tmp_path(&self) -> PathBuf {
        let mut name = self.path.as_os_str().to_owned();
        name.push(".tmp");
        PathBuf::from(name)
    }

    /// Reads the whole snapshot.
    ///
    /// A missing file is created empty; an empty file decodes as an empty
    /// mapping.
    pub fn read(&self) -> StorageResult<Snapshot> {
        let raw = match fs::read(&self.path) {
            Ok(raw) => raw,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                self.create_empty()?;
                Vec::new()
            }
            Err(e) => {
                error!(path = %self.path.display(), error = %e, "Failed to read snapshot");
                return Err(e.into());
            }
        };

        if raw.iter().all(u8::is_ascii_whitespace) {
            return Ok(Snapshot::new());
        }

        decode(&raw).inspect_err(|e| {
            error!(path = %self.path.display(), error = %e, "Failed to decode snapshot");
        })
    }

    /// Replaces the file with `entries`.
    ///
    /// Returns the number of bytes written.
    pub fn write(&self, entries: &Snapshot) -> StorageResult<usize> {
        let raw = encode(entries).inspect_err(|e| {
            error!(error = %e, "Failed to encode snapshot");
        })?;

        self.replace(&raw).map_err(|e| {
            error!(path = %self.path.display(), error = %e, "Failed to write snapshot");
            StorageError::Io(e)
        })?;

        debug!(
            path = %self.path.display(),
            entries = entries.len(),
            bytes = raw.len(),
            "Snapshot written"
        );
        Ok(raw.len())
    }

    fn create_empty(&self) -> std::io::Result<()> {
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)?;
        }
        OpenOptions::new()
            .create(true)
            .write(true)
            .truncate(false)
            .open(&self.path)?;
        Ok(())
    }

    fn replace(&self, raw: &[u8]) -> std::io::Result<()> {
        let tmp = self.tmp_path();
        {
            let mut file = File::create(&tmp)?;
            file.write_all(raw)?;
            file.sync_all()?;
        }
        fs::rename(&tmp, &self.path)?;
        self.sync_parent()
    }

    #[cfg(unix)]
    fn sync_parent(&self) -> std::io::Result<()> {
        let parent = match self.path.parent() {
            Some(p) if !p.as_os_str().is_empty() => p,
            _ => Path::new("."),
        };
        File::open(parent)?.sync_all()
    }

    #[cfg(not(unix))]
    fn sync_parent(&self) -> std::io::Result<()> {
        Ok(())
    }
}

/// Encodes a mapping into the current on-disk format.
pub fn encode(entries: &Snapshot) -> StorageResult<Vec<u8>> {
    let envelope = Envelope {
        version: SNAPSHOT_VERSION,
        entries,
    };
    Ok(serde_json::to_vec(&envelope)?)
}

/// Decodes any supported on-disk layout.
pub fn decode(raw: &[u8]) -> StorageResult<Snapshot> {
    match serde_json::from_slice::<OnDisk>(raw) {
        Ok(OnDisk::Versioned { version, entries }) => {
            if version > SNAPSHOT_VERSION {
                return Err(StorageError::UnsupportedVersion {
                    found: version,
                    supported: SNAPSHOT_VERSION,
                });
            }
            Ok(entries)
        }
        Ok(OnDisk::Legacy(entries)) => Ok(entries),
        // The untagged error only says "did not match any variant"; decode
        // again as the current layout to surface a useful message.
        Err(untagged) => {
            #[derive(Deserialize)]
            #[allow(dead_code)]
            struct Strict {
                version: u32,
                entries: Snapshot,
            }
            let err = serde_json::from_slice::<Strict>(raw)
                .err()
                .unwrap_or(untagged);
            Err(err.into())
        }
    }
}
