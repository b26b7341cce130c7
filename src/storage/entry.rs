//! Entry Model
//!
//! The record stored under every key, and the key/value pair handed across
//! the engine boundary.
//!
//! ## Encoding
//!
//! Timestamps are `chrono::DateTime<Utc>` and go through serde as RFC 3339
//! strings, so a record survives a round trip through the snapshot file or
//! a `GET` reply with its sub-second precision and offset intact:
//!
//! ```text
//! {"data":"1","updated_at":"2026-10-18T09:12:44.120391Z","expires_at":"2026-10-19T09:12:44Z"}
//! ```

use crate::storage::error::StorageError;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// The value stored under a key.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Value {
    /// The payload itself
    pub data: String,
    /// Refreshed on every successful create or update
    pub updated_at: DateTime<Utc>,
    /// Absolute expiry; the sweeper removes the entry once this has passed
    pub expires_at: DateTime<Utc>,
}

impl Value {
    /// Creates a value record that was last touched at `updated_at`.
    pub fn new(
        data: impl Into<String>,
        updated_at: DateTime<Utc>,
        expires_at: DateTime<Utc>,
    ) -> Self {
        Self {
            data: data.into(),
            updated_at,
            expires_at,
        }
    }

    /// Returns true if the expiry lies strictly before `now`.
    #[inline]
    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        self.expires_at < now
    }

    /// Merges an update into this record.
    ///
    /// Only non-empty data and a supplied expiry overwrite; `updated_at` is
    /// always moved to `now`.
    pub fn merge(&mut self, patch: &Patch, now: DateTime<Utc>) {
        if !patch.data.is_empty() {
            self.data.clone_from(&patch.data);
        }
        if let Some(expires_at) = patch.expires_at {
            self.expires_at = expires_at;
        }
        self.updated_at = now;
    }
}

/// The fields an update may change.
///
/// Empty `data` and a missing `expires_at` both mean "keep what is stored".
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Patch {
    pub data: String,
    pub expires_at: Option<DateTime<Utc>>,
}

impl Patch {
    pub fn new(data: impl Into<String>, expires_at: Option<DateTime<Utc>>) -> Self {
        Self {
            data: data.into(),
            expires_at,
        }
    }

    /// Returns true if applying this patch would only refresh `updated_at`.
    pub fn is_empty(&self) -> bool {
        self.data.is_empty() && self.expires_at.is_none()
    }
}

/// A key paired with its value record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Entry {
    pub key: String,
    pub value: Value,
}

impl Entry {
    pub fn new(key: impl Into<String>, value: Value) -> Self {
        Self {
            key: key.into(),
            value,
        }
    }

    /// Builds an entry from its raw parts.
    pub fn from_parts(
        key: impl Into<String>,
        data: impl Into<String>,
        updated_at: DateTime<Utc>,
        expires_at: DateTime<Utc>,
    ) -> Self {
        Self::new(key, Value::new(data, updated_at, expires_at))
    }

    /// Encodes the entry as the JSON body of a read reply.
    pub fn to_json(&self) -> Result<String, StorageError> {
        Ok(serde_json::to_string(self)?)
    }

    /// Decodes an entry from a read reply body.
    pub fn from_json(raw: &[u8]) -> Result<Self, StorageError> {
        Ok(serde_json::from_slice(raw)?)
    }
}
