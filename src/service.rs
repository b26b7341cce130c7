//! Request Service
//!
//! Turns raw request fields into engine calls. The engine only ever sees
//! resolved absolute expiry times; this layer owns the TTL syntax and the
//! defaults:
//!
//! | Request | Empty TTL means            | Empty value means |
//! |---------|----------------------------|-------------------|
//! | `ADD`   | now + default TTL (24h)    | stored as empty   |
//! | `SET`   | keep the stored expiry     | keep stored data  |
//!
//! ## TTL Syntax
//!
//! - RFC 3339 absolute time: `2026-10-19T08:00:00Z`, `2026-10-19T10:00:00+02:00`
//! - relative seconds: `90`
//! - relative with a unit: `90s`, `15m`, `1h`, `7d`
//!
//! `0` (with or without a unit) is the same as an empty TTL.

use crate::storage::{Entry, Patch, StorageEngine, StorageError};
use chrono::{DateTime, TimeDelta, Utc};
use std::sync::Arc;
use thiserror::Error;
use tracing::debug;

/// Errors returned by the request service.
#[derive(Debug, Error)]
pub enum ServiceError {
    #[error("key must not be empty")]
    EmptyKey,

    #[error("invalid ttl '{0}'")]
    InvalidTtl(String),

    #[error(transparent)]
    Storage(#[from] StorageError),
}

impl ServiceError {
    /// Returns true if the request itself was at fault.
    pub fn is_client_error(&self) -> bool {
        match self {
            ServiceError::EmptyKey | ServiceError::InvalidTtl(_) => true,
            ServiceError::Storage(e) => e.is_domain(),
        }
    }
}

/// Result type for service operations.
pub type ServiceResult<T> = Result<T, ServiceError>;

/// Translates requests into storage engine operations.
#[derive(Debug, Clone)]
pub struct KvService {
    engine: Arc<StorageEngine>,
    default_ttl: TimeDelta,
}

impl KvService {
    /// Creates a service over `engine`, giving entries added without a TTL a
    /// lifetime of `default_ttl`.
    pub fn new(engine: Arc<StorageEngine>, default_ttl: std::time::Duration) -> Self {
        let default_ttl = TimeDelta::from_std(default_ttl).unwrap_or(TimeDelta::MAX);
        Self {
            engine,
            default_ttl,
        }
    }

    pub fn engine(&self) -> &Arc<StorageEngine> {
        &self.engine
    }

    /// Stores a new key.
    pub fn add(&self, key: &str, value: &str, ttl: &str) -> ServiceResult<()> {
        check_key(key)?;
        let now = Utc::now();
        let expires_at = match resolve_expiry(ttl, now)? {
            Some(at) => at,
            None => now
                .checked_add_signed(self.default_ttl)
                .unwrap_or(DateTime::<Utc>::MAX_UTC),
        };

        self.engine
            .create(Entry::from_parts(key, value, now, expires_at))?;
        Ok(())
    }

    /// Updates an existing key, keeping whatever the request leaves empty.
    pub fn set(&self, key: &str, value: &str, ttl: &str) -> ServiceResult<()> {
        check_key(key)?;
        let expires_at = resolve_expiry(ttl, Utc::now())?;
        let patch = Patch::new(value, expires_at);
        if patch.is_empty() {
            debug!(key, "SET without value or ttl, refreshing updated_at only");
        }

        self.engine.update(key, &patch)?;
        Ok(())
    }

    pub fn get(&self, key: &str) -> ServiceResult<Entry> {
        check_key(key)?;
        Ok(self.engine.read(key)?)
    }

    pub fn delete(&self, key: &str) -> ServiceResult<()> {
        check_key(key)?;
        Ok(self.engine.delete(key)?)
    }
}

fn check_key(key: &str) -> ServiceResult<()> {
    if key.is_empty() {
        return Err(ServiceError::EmptyKey);
    }
    Ok(())
}

/// Resolves a TTL field to an absolute expiry.
///
/// Returns `None` when the field is empty or zero.
pub fn resolve_expiry(raw: &str, now: DateTime<Utc>) -> ServiceResult<Option<DateTime<Utc>>> {
    let raw = raw.trim();
    if raw.is_empty() {
        return Ok(None);
    }

    if let Ok(at) = DateTime::parse_from_rfc3339(raw) {
        return Ok(Some(at.with_timezone(&Utc)));
    }

    let invalid = || ServiceError::InvalidTtl(raw.to_string());

    let (digits, unit) = match raw.find(|c: char| !c.is_ascii_digit()) {
        Some(pos) => raw.split_at(pos),
        None => (raw, "s"),
    };
    if digits.is_empty() {
        return Err(invalid());
    }

    let amount: i64 = digits.parse().map_err(|_| invalid())?;
    let per_unit: i64 = match unit {
        "s" => 1,
        "m" => 60,
        "h" => 60 * 60,
        "d" => 24 * 60 * 60,
        _ => return Err(invalid()),
    };

    if amount == 0 {
        return Ok(None);
    }

    amount
        .checked_mul(per_unit)
        .and_then(TimeDelta::try_seconds)
        .and_then(|delta| now.checked_add_signed(delta))
        .map(Some)
        .ok_or_else(invalid)
}
